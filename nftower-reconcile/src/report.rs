//! What a reconciliation run did, per project and in total.

use std::ops::AddAssign;

use nftower_core::error::TowerError;

/// Counts of effective changes made while converging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Tally {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    /// Entities left alone on purpose, e.g. a compute environment with active jobs.
    pub skipped: usize,
}

impl Tally {
    pub fn created(&mut self) {
        self.created += 1;
    }

    pub fn updated(&mut self) {
        self.updated += 1;
    }

    pub fn removed(&mut self) {
        self.removed += 1;
    }

    pub fn skipped(&mut self) {
        self.skipped += 1;
    }

    pub fn is_noop(&self) -> bool {
        *self == Tally::default()
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, other: Tally) {
        self.created += other.created;
        self.updated += other.updated;
        self.removed += other.removed;
        self.skipped += other.skipped;
    }
}

#[derive(Debug)]
pub struct ProjectOutcome {
    pub name: String,
    pub tally: Tally,
    pub error: Option<TowerError>,
}

impl ProjectOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub organization: String,
    /// Changes made at organization level: the organization, members, teams.
    pub organization_tally: Tally,
    /// Set when the organization itself could not be ensured.
    pub organization_error: Option<TowerError>,
    pub projects: Vec<ProjectOutcome>,
    /// Projects not attempted because a data-integrity failure halted the run.
    pub not_attempted: Vec<String>,
}

impl RunReport {
    pub fn new(organization: impl Into<String>) -> Self {
        Self {
            organization: organization.into(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, name: &str, tally: Tally, error: Option<TowerError>) {
        self.projects.push(ProjectOutcome {
            name: name.to_string(),
            tally,
            error,
        });
    }

    pub fn outcome(&self, name: &str) -> Option<&ProjectOutcome> {
        self.projects.iter().find(|p| p.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ProjectOutcome> {
        self.projects.iter().filter(|p| !p.succeeded())
    }

    pub fn halted(&self) -> bool {
        !self.not_attempted.is_empty()
    }

    /// Totals across the organization and every project.
    pub fn totals(&self) -> Tally {
        let mut totals = self.organization_tally;
        for project in &self.projects {
            totals += project.tally;
        }
        totals
    }

    pub fn is_success(&self) -> bool {
        self.organization_error.is_none() && self.failures().next().is_none() && !self.halted()
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_include_organization_changes() {
        let mut report = RunReport::new("Sage Bionetworks");
        report.organization_tally.created();
        let mut tally = Tally::default();
        tally.created();
        tally.removed();
        report.record("foo-project", tally, None);
        report.record("bar-project", Tally::default(), None);

        let totals = report.totals();
        assert_eq!(totals.created, 2);
        assert_eq!(totals.removed, 1);
        assert!(report.is_success());
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_failure_sets_exit_code() {
        let mut report = RunReport::new("Sage Bionetworks");
        report.record("foo-project", Tally::default(), None);
        report.record(
            "bar-project",
            Tally::default(),
            Some(TowerError::Api("boom".into())),
        );

        let failed: Vec<&str> = report.failures().map(|p| p.name.as_str()).collect();
        assert_eq!(failed, vec!["bar-project"]);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_halted_run_is_a_failure() {
        let mut report = RunReport::new("Sage Bionetworks");
        report.not_attempted.push("baz-project".into());
        assert!(report.halted());
        assert!(!report.is_success());
    }
}
