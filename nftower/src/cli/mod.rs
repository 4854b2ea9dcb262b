// CLI argument parsing and definitions

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "nftower")]
#[command(about = "Provision Nextflow Tower organizations, workspaces and compute environments from project files")]
#[command(version)]
pub struct Args {
    /// Directory searched recursively for '*-project.yaml' files
    pub projects_dir: PathBuf,

    /// List the valid project files without contacting Tower or AWS
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Enable debug output
    #[arg(short, long)]
    pub debug: bool,

    /// YAML file overriding the built-in settings
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Tower organization to reconcile into
    #[arg(long, value_name = "NAME")]
    pub org: Option<String>,

    /// Tower API base URL (defaults to TOWER_API_ENDPOINT, then the Route 53 stack)
    #[arg(long, value_name = "URL")]
    pub api_endpoint: Option<String>,

    /// Grant workspace access through one team per access level
    #[arg(long)]
    pub use_teams: bool,

    /// Fail on ARNs without an email-shaped session name instead of skipping them
    #[arg(long)]
    pub strict_arns: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_args_are_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "nftower",
            "config",
            "-n",
            "--org",
            "Acme",
            "--use-teams",
        ]);
        assert_eq!(args.projects_dir, PathBuf::from("config"));
        assert!(args.dry_run);
        assert!(!args.debug);
        assert_eq!(args.org.as_deref(), Some("Acme"));
        assert!(args.use_teams);
        assert!(!args.strict_arns);
    }
}
