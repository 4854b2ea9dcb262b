// Command handlers for the provisioner

use tracing::debug;

use nftower_config::Settings;
use nftower_core::error::Result;

use crate::cli::Args;

pub mod dry_run;
pub mod reconcile;

/// Settings file first, then command-line overrides.
pub fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.settings.as_deref())?;
    if let Some(org) = &args.org {
        settings.organization = org.clone();
    }
    if let Some(endpoint) = &args.api_endpoint {
        settings.api_endpoint = Some(endpoint.clone());
    }
    settings.use_teams |= args.use_teams;
    settings.strict_arns |= args.strict_arns;
    debug!(
        organization = %settings.organization,
        use_teams = settings.use_teams,
        strict_arns = settings.strict_arns,
        "Effective settings"
    );
    Ok(settings)
}

/// Main command dispatcher. Returns the process exit code.
#[must_use = "command execution results should be handled"]
pub fn execute_command(args: Args) -> Result<i32> {
    let settings = load_settings(&args)?;
    if args.dry_run {
        debug!("Handling dry run");
        return dry_run::handle_dry_run(&args.projects_dir, &settings);
    }
    reconcile::handle_reconcile(&args.projects_dir, &settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_cli_overrides_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "organization: From File\nuse_teams: false").unwrap();
        let path = file.path().to_string_lossy().to_string();

        let args = Args::parse_from([
            "nftower",
            "config",
            "--settings",
            path.as_str(),
            "--org",
            "From CLI",
            "--use-teams",
        ]);
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings.organization, "From CLI");
        assert!(settings.use_teams);
    }

    #[test]
    fn test_defaults_without_settings_file() {
        let args = Args::parse_from(["nftower", "config"]);
        let settings = load_settings(&args).unwrap();
        assert_eq!(settings, Settings::default());
    }
}
