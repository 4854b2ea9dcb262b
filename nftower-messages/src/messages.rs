//! Central registry for all user-facing message templates.
//!
//! Organized by domain:
//! - `config` - descriptor discovery, validation and dry-run output
//! - `run` - reconciliation progress and the final report
//!
//! ```rust
//! use nftower_messages::{msg, MESSAGES};
//!
//! let line = msg!(MESSAGES.run.project_start, project = "foo-project");
//! assert!(line.contains("foo-project"));
//! ```

pub struct ConfigMessages {
    // ============================================================================
    // Descriptor Discovery
    // ============================================================================
    pub dry_run_header: &'static str,
    pub dry_run_entry: &'static str,
    pub dry_run_summary: &'static str,
    pub no_projects: &'static str,
    pub invalid_descriptor: &'static str,
    pub invalid_descriptor_hint: &'static str,

    // ============================================================================
    // Identities
    // ============================================================================
    pub arn_skipped: &'static str,
    pub arn_rejected: &'static str,

    // ============================================================================
    // Startup
    // ============================================================================
    pub token_missing: &'static str,
    pub token_missing_hint: &'static str,
}

pub const CONFIG_MESSAGES: ConfigMessages = ConfigMessages {
    dry_run_header: "The following Tower project configurations were discovered and confirmed to be valid:",
    dry_run_entry: "  - {path}",
    dry_run_summary: "      stack '{stack}': {users} user(s), {tags} tag(s)",
    no_projects: "No '*-project.yaml' files found under {dir}",
    invalid_descriptor: "{name} is invalid: {reason}",
    invalid_descriptor_hint: "💡 Project files need 'stack_name', 'template.path: tower-project.j2' and access ARNs under 'parameters'",

    arn_skipped: "Listed ARN ({arn}) doesn't follow expected format: 'arn:aws:sts::<account_id>:assumed-role/<role_name>/<email>'",
    arn_rejected: "ARN ({arn}) has no email-shaped role session name",

    token_missing: "The 'NXF_TOWER_TOKEN' environment variable must be defined with a Nextflow Tower API token.",
    token_missing_hint: "💡 Create a token under 'Your tokens' in Tower and export NXF_TOWER_TOKEN",
};

pub struct RunMessages {
    pub run_start: &'static str,
    pub project_start: &'static str,
    pub project_success: &'static str,
    pub project_failed: &'static str,
    pub ce_busy: &'static str,
    pub ce_deletion_timeout: &'static str,
    pub summary: &'static str,
    pub failures_header: &'static str,
    pub all_succeeded: &'static str,
}

pub const RUN_MESSAGES: RunMessages = RunMessages {
    run_start: "🚀 Reconciling {count} project(s) into '{org}'...",
    project_start: "▶ Reconciling '{project}'",
    project_success: "✅ '{project}' is up to date",
    project_failed: "❌ '{project}' failed: {error}",
    ce_busy: "Skipping the deletion of the '{workspace}/{name}' compute environment due to active jobs...",
    ce_deletion_timeout: "Compute environments in '{workspace}' were still being deleted after {seconds}s",
    summary: "📊 {created} created, {updated} updated, {removed} removed, {skipped} skipped",
    failures_header: "{count} project(s) failed to reconcile:",
    all_succeeded: "✅ All projects reconciled",
};

/// Unified messages struct containing all domain-specific message modules
pub struct Messages {
    pub config: ConfigMessages,
    pub run: RunMessages,
}

/// Global messages constant - main entry point for all message templates
pub const MESSAGES: Messages = Messages {
    config: CONFIG_MESSAGES,
    run: RUN_MESSAGES,
};
