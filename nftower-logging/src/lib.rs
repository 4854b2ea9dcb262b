use std::{
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::MakeWriter, prelude::*, registry, EnvFilter};

// --- Custom "Tee" Writer ---
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B, W1, W2> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a, Writer = W1>,
    B: MakeWriter<'a, Writer = W2>,
    W1: Write + 'a,
    W2: Write + 'a,
{
    type Writer = Tee<W1, W2>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    Console,
    File,
    Both,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}

/// Logging knobs read from `LOG_LEVEL`, `LOG_OUTPUT`, `LOG_FORMAT` and `LOG_FILE_PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: String,
    pub output: LogOutput,
    pub format: LogFormat,
    pub file_path: PathBuf,
}

impl LogSettings {
    /// `debug` only changes the default level; an explicit `LOG_LEVEL` wins.
    pub fn from_env(debug: bool) -> Self {
        let default_level = if debug { "debug" } else { "info" };
        let level = env::var("LOG_LEVEL").unwrap_or_else(|_| default_level.to_string());
        let output = match env::var("LOG_OUTPUT").as_deref() {
            Ok("file") => LogOutput::File,
            Ok("both") => LogOutput::Both,
            Ok("off") | Ok("none") => LogOutput::Off,
            _ => LogOutput::Console,
        };
        let format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };
        let file_path = env::var("LOG_FILE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| env::temp_dir().join("nftower.log"));

        Self {
            level,
            output,
            format,
            file_path,
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.level));
        for directive in ["hyper=warn", "hyper_util=warn", "reqwest=warn", "rustls=warn"] {
            if let Ok(directive) = directive.parse() {
                filter = filter.add_directive(directive);
            }
        }
        filter
    }
}

/// Initializes the global tracing subscriber based on environment variables.
///
/// Console output goes to stderr so the dry-run listing on stdout stays
/// machine-readable. The returned guard must be held until exit when file
/// output is enabled. Calling this twice is harmless; the second call is a no-op.
pub fn init_subscriber(debug: bool) -> Option<WorkerGuard> {
    init_with(&LogSettings::from_env(debug))
}

pub fn init_with(settings: &LogSettings) -> Option<WorkerGuard> {
    let is_json = settings.format == LogFormat::Json;
    let subscriber = registry().with(settings.filter());

    let log_dir = settings
        .file_path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(env::temp_dir);
    let log_filename = settings
        .file_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "nftower.log".into());

    let mut guard: Option<WorkerGuard> = None;

    match settings.output {
        LogOutput::Both => {
            let file_appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);

            let tee_writer = MakeTee {
                make_a: io::stderr,
                make_b: non_blocking,
            };

            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(tee_writer);
            if is_json {
                subscriber.with(fmt_layer.json()).try_init().ok();
            } else {
                subscriber.with(fmt_layer.compact()).try_init().ok();
            }
        }
        LogOutput::Console => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
            if is_json {
                subscriber.with(fmt_layer.json()).try_init().ok();
            } else {
                subscriber.with(fmt_layer.compact()).try_init().ok();
            }
        }
        LogOutput::File => {
            let file_appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
            let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
            guard = Some(worker_guard);

            let fmt_layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            if is_json {
                subscriber.with(fmt_layer.json()).try_init().ok();
            } else {
                subscriber.with(fmt_layer.compact()).try_init().ok();
            }
        }
        LogOutput::Off => {
            subscriber.try_init().ok();
        }
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_log_env() {
        for key in ["LOG_LEVEL", "LOG_OUTPUT", "LOG_FORMAT", "LOG_FILE_PATH"] {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults_follow_debug_flag() {
        clear_log_env();
        let settings = LogSettings::from_env(false);
        assert_eq!(settings.level, "info");
        assert_eq!(settings.output, LogOutput::Console);
        assert_eq!(settings.format, LogFormat::Human);

        assert_eq!(LogSettings::from_env(true).level, "debug");
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_log_env();
        env::set_var("LOG_LEVEL", "warn");
        env::set_var("LOG_OUTPUT", "both");
        env::set_var("LOG_FORMAT", "json");
        env::set_var("LOG_FILE_PATH", "/var/log/nftower/run.log");

        let settings = LogSettings::from_env(true);
        assert_eq!(settings.level, "warn");
        assert_eq!(settings.output, LogOutput::Both);
        assert_eq!(settings.format, LogFormat::Json);
        assert_eq!(settings.file_path, PathBuf::from("/var/log/nftower/run.log"));

        clear_log_env();
    }
}
