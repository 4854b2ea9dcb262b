//! Drives one reconciliation run over every project.

use std::collections::HashMap;

use tracing::{error, info, info_span, warn};
use uuid::Uuid;

use nftower_config::{Project, Projects, Role, Settings};
use nftower_core::error::{Result, ResultExt, TowerError};
use nftower_gateway::{Gateway, OutputMap, SecretStore, StackOutputs};
use nftower_messages::{msg, MESSAGES};

use crate::compute_env;
use crate::credentials;
use crate::labels;
use crate::members::Members;
use crate::organization::{self, Organization};
use crate::participants::{Participants, Target};
use crate::policy::{ComputeEnvironmentPolicy, EnvironmentInputs};
use crate::report::{RunReport, Tally};
use crate::teams::Teams;
use crate::workspace;

/// Converges Tower to the desired projects, one project at a time.
///
/// A failure in one project is recorded and the run moves on to the next
/// project. Data-integrity failures stop the run.
pub struct Engine<'a> {
    gateway: &'a dyn Gateway,
    stacks: &'a dyn StackOutputs,
    secrets: &'a dyn SecretStore,
    settings: &'a Settings,
    vpc_outputs: Option<OutputMap>,
}

impl<'a> Engine<'a> {
    pub fn new(
        gateway: &'a dyn Gateway,
        stacks: &'a dyn StackOutputs,
        secrets: &'a dyn SecretStore,
        settings: &'a Settings,
    ) -> Self {
        Self {
            gateway,
            stacks,
            secrets,
            settings,
            vpc_outputs: None,
        }
    }

    pub fn run(&mut self, projects: &Projects) -> RunReport {
        let span = info_span!("run", run_id = %Uuid::new_v4());
        let _enter = span.enter();

        let org_name = self.settings.organization.clone();
        let mut report = RunReport::new(&org_name);
        info!(
            "{}",
            msg!(MESSAGES.run.run_start, count = projects.len().to_string(), org = &org_name)
        );

        let org = match organization::ensure(self.gateway, &org_name, &mut report.organization_tally)
            .scope(format!("organization '{org_name}' ensure"))
        {
            Ok(org) => org,
            Err(e) => {
                error!("{}", e);
                report.organization_error = Some(e);
                return report;
            }
        };

        let mut members = Members::new(org.id);
        let mut teams: HashMap<&str, Vec<(Target, Role)>> = HashMap::new();
        let mut failed: HashMap<&str, (Tally, TowerError)> = HashMap::new();

        if self.settings.use_teams {
            for project in projects {
                let mut tally = Tally::default();
                match self
                    .ensure_teams(&org, project, &mut members, &mut tally)
                    .scope(format!("project '{}'", project.stack_name))
                {
                    Ok(desired) => {
                        report.organization_tally += tally;
                        teams.insert(&project.stack_name, desired);
                    }
                    Err(e) => {
                        failed.insert(&project.stack_name, (tally, e));
                    }
                }
            }
        }

        let mut remaining = projects.iter();
        while let Some(project) = remaining.next() {
            let name = project.stack_name.as_str();
            let span = info_span!("project", name = %name);
            let _enter = span.enter();

            let (tally, result) = match failed.remove(name) {
                Some((tally, e)) => (tally, Err(e)),
                None => {
                    let mut tally = Tally::default();
                    let result = self
                        .reconcile_project(&org, project, &mut members, teams.get(name), &mut tally)
                        .scope(format!("project '{name}'"));
                    (tally, result)
                }
            };

            match result {
                Ok(()) => {
                    info!("{}", msg!(MESSAGES.run.project_success, project = name));
                    report.record(name, tally, None);
                }
                Err(e) => {
                    error!(
                        "{}",
                        msg!(MESSAGES.run.project_failed, project = name, error = e.to_string())
                    );
                    let halt = e.is_data_integrity();
                    report.record(name, tally, Some(e));
                    if halt {
                        report
                            .not_attempted
                            .extend(remaining.by_ref().map(|p| p.stack_name.clone()));
                        warn!(
                            "Stopping: {} project(s) left untouched",
                            report.not_attempted.len()
                        );
                    }
                }
            }
        }

        report
    }

    /// Team-based grouping: one team per non-empty access bucket, members
    /// synced. Returns the desired participant entries for the workspace.
    fn ensure_teams(
        &self,
        org: &Organization,
        project: &Project,
        members: &mut Members,
        tally: &mut Tally,
    ) -> Result<Vec<(Target, Role)>> {
        let teams = Teams::new(self.gateway, org.id);
        let mut desired = Vec::new();
        for (emails, bucket, role) in project.users.list_teams() {
            let team_name = format!("{}-{}", project.team_prefix(), bucket.as_str());
            let resolved = emails
                .iter()
                .map(|email| members.ensure(self.gateway, email, tally))
                .collect::<Result<Vec<_>>>()
                .scope("member ensure")?;
            let team_id = teams
                .ensure(&team_name, tally)
                .scope(format!("team '{team_name}' ensure"))?;
            teams
                .reconcile_members(team_id, &resolved, tally)
                .scope(format!("team '{team_name}' member reconcile"))?;
            desired.push((Target::Team(team_id), role));
        }
        Ok(desired)
    }

    fn vpc_outputs(&mut self) -> Result<&OutputMap> {
        if self.vpc_outputs.is_none() {
            let outputs = self
                .stacks
                .get_stack_outputs(&self.settings.vpc.stack_name)
                .scope("VPC stack outputs")?;
            self.vpc_outputs = Some(outputs);
        }
        self.vpc_outputs
            .as_ref()
            .ok_or_else(|| TowerError::StackOutputs("VPC stack outputs unavailable".to_string()))
    }

    fn reconcile_project(
        &mut self,
        org: &Organization,
        project: &Project,
        members: &mut Members,
        teams: Option<&Vec<(Target, Role)>>,
        tally: &mut Tally,
    ) -> Result<()> {
        info!("{}", msg!(MESSAGES.run.project_start, project = &project.stack_name));
        let gateway = self.gateway;
        let settings = self.settings;

        let workspace = workspace::ensure(gateway, org.id, &project.stack_name, tally)
            .scope("workspace ensure")?;

        let desired = match teams {
            Some(teams) => teams.clone(),
            None => project
                .users
                .list_users()
                .map(|(email, _, role)| {
                    members
                        .ensure(gateway, email, tally)
                        .map(|m| (Target::Member(m.member_id), role))
                })
                .collect::<Result<Vec<_>>>()
                .scope("member ensure")?,
        };
        Participants::new(gateway, &workspace)
            .reconcile(&desired, tally)
            .scope("participant reconcile")?;

        let policy = ComputeEnvironmentPolicy::new(settings);
        let launchable = project.users.has_launchers();
        let deleting = compute_env::cleanup(gateway, &workspace, &policy, launchable, tally)
            .scope("compute environment cleanup")?;
        if !deleting.is_empty() {
            compute_env::wait_for_deletion(gateway, &workspace, &deleting, &settings.deletion_poll)
                .scope("compute environment cleanup")?;
        }
        if !launchable {
            info!("No launchers in '{}', skipping compute environments", project.stack_name);
            return Ok(());
        }

        let stack_outputs = self
            .stacks
            .get_stack_outputs(&project.stack_name)
            .scope("stack outputs")?;
        let credentials_id = credentials::ensure(
            gateway,
            self.secrets,
            &workspace,
            &project.stack_name,
            &stack_outputs,
            tally,
        )
        .scope("credentials ensure")?;

        let label_ids = project
            .tags
            .iter()
            .map(|(name, value)| {
                labels::ensure(gateway, &workspace, name, value, tally)
                    .scope(format!("resource label '{name}' ensure"))
            })
            .collect::<Result<Vec<u64>>>()?;

        let vpc_outputs = self.vpc_outputs()?;
        let inputs = EnvironmentInputs {
            stack_name: &project.stack_name,
            stack_outputs: &stack_outputs,
            vpc_outputs,
            credentials_id: &credentials_id,
            label_ids: &label_ids,
        };
        compute_env::ensure_set(gateway, &workspace, &policy, &inputs, tally)
            .scope("compute environment ensure")?;
        Ok(())
    }
}
