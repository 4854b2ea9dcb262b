// External crates
use clap::Parser;
use tracing::{debug, info_span};

// Internal imports
use nftower_core::error::TowerError;
use nftower_core::{tower_error, tower_info};
use nftower_messages::MESSAGES;

// Local modules
mod cli;
mod commands;

use cli::Args;
use commands::execute_command;

fn main() {
    let code = run(Args::parse());
    std::process::exit(code);
}

fn run(args: Args) -> i32 {
    // Held until return so buffered file logs are flushed before exit
    let _log_guard = nftower_logging::init_subscriber(args.debug);
    let span = info_span!(
        "nftower",
        projects_dir = %args.projects_dir.display(),
        dry_run = args.dry_run
    );
    let _enter = span.enter();
    debug!("Starting nftower");

    match execute_command(args) {
        Ok(code) => code,
        Err(e) => {
            tower_error!("{}", e);
            if is_missing_token(&e) {
                tower_info!("{}", MESSAGES.config.token_missing_hint);
            } else if is_invalid_descriptor(&e) {
                tower_info!("{}", MESSAGES.config.invalid_descriptor_hint);
            }
            1
        }
    }
}

fn is_missing_token(error: &TowerError) -> bool {
    matches!(error.root(), TowerError::Config(message) if message == MESSAGES.config.token_missing)
}

fn is_invalid_descriptor(error: &TowerError) -> bool {
    matches!(error.root(), TowerError::Config(message) if message.contains(" is invalid: "))
}
