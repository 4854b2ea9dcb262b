//! Workspace participants: who can see and launch in a project workspace.
//!
//! Reconciliation converges the participant list to the desired
//! `(member or team, role)` pairs. Owners are never removed, even when
//! absent from the desired set.

use std::collections::HashSet;
use std::fmt;

use serde_json::json;
use tracing::{debug, info};

use nftower_config::Role;
use nftower_core::error::{Result, TowerError};
use nftower_gateway::{Deletion, Gateway, Method, Outcome};

use crate::report::Tally;
use crate::workspace::Workspace;
use crate::wire::{decode, decode_pages, expect_success, ParticipantDto};

/// Who a participant entry grants access to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    Member(u64),
    Team(u64),
}

impl Target {
    fn matches(&self, participant: &ParticipantDto) -> bool {
        match self {
            Target::Member(id) => participant.member_id == Some(*id),
            Target::Team(id) => participant.team_id == Some(*id),
        }
    }

    fn add_body(&self) -> serde_json::Value {
        match self {
            Target::Member(id) => json!({ "memberId": id, "teamId": null, "userNameOrEmail": null }),
            Target::Team(id) => json!({ "memberId": null, "teamId": id, "userNameOrEmail": null }),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Member(id) => write!(f, "member {id}"),
            Target::Team(id) => write!(f, "team {id}"),
        }
    }
}

pub struct Participants<'a> {
    gateway: &'a dyn Gateway,
    path: String,
}

impl<'a> Participants<'a> {
    pub fn new(gateway: &'a dyn Gateway, workspace: &Workspace) -> Self {
        Self {
            gateway,
            path: format!(
                "/orgs/{}/workspaces/{}/participants",
                workspace.org_id, workspace.id
            ),
        }
    }

    pub fn list(&self) -> Result<Vec<ParticipantDto>> {
        decode_pages(
            self.gateway.paged_request(Method::Get, &self.path, &[]),
            "participants",
        )
    }

    /// Add the target if needed and give it `role`. Returns the participant id.
    pub fn upsert(&self, target: Target, role: Role, tally: &mut Tally) -> Result<u64> {
        let body = target.add_body();
        let response = self.gateway.request(
            Method::Put,
            &format!("{}/add", self.path),
            &[],
            Some(&body),
        )?;

        let (participant, created) = match Outcome::classify(response, "participant") {
            Outcome::Created(participant) => {
                let participant: ParticipantDto = decode(participant, "participant")?;
                info!("Added {} as participant {}", target, participant.participant_id);
                tally.created();
                (participant, true)
            }
            Outcome::AlreadyExists(reason) => {
                let participant = self
                    .list()?
                    .into_iter()
                    .find(|p| target.matches(p))
                    .ok_or_else(|| {
                        TowerError::UnexpectedResponse(format!(
                            "{target} reported as participant but not listed: {reason}"
                        ))
                    })?;
                (participant, false)
            }
            Outcome::Conflict(reason) => {
                return Err(TowerError::Api(format!(
                    "could not add {target} as participant: {reason}"
                )));
            }
        };

        // Tower assigns its own default role on add, so the role is always set.
        self.set_role(participant.participant_id, role)?;
        if !created && participant.wsp_role != role {
            info!(
                "Changed role of {} from {} to {}",
                target, participant.wsp_role, role
            );
            tally.updated();
        }
        Ok(participant.participant_id)
    }

    pub fn set_role(&self, participant_id: u64, role: Role) -> Result<()> {
        let body = json!({ "role": role.as_str() });
        let response = self.gateway.request(
            Method::Put,
            &format!("{}/{}/role", self.path, participant_id),
            &[],
            Some(&body),
        )?;
        expect_success(&response, &format!("set role of participant {participant_id}"))
    }

    pub fn remove(&self, participant_id: u64) -> Result<()> {
        let response = self.gateway.request(
            Method::Delete,
            &format!("{}/{}", self.path, participant_id),
            &[],
            None,
        )?;
        match Deletion::classify(&response) {
            Deletion::Removed => Ok(()),
            Deletion::Busy(reason) | Deletion::Refused(reason) => Err(TowerError::Api(format!(
                "could not remove participant {participant_id}: {reason}"
            ))),
        }
    }

    /// Converge to exactly `desired` plus the existing owners.
    pub fn reconcile(&self, desired: &[(Target, Role)], tally: &mut Tally) -> Result<()> {
        let mut keep: HashSet<u64> = self
            .list()?
            .into_iter()
            .filter(|p| p.wsp_role == Role::Owner)
            .map(|p| p.participant_id)
            .collect();

        for (target, role) in desired {
            keep.insert(self.upsert(*target, *role, tally)?);
        }

        for stale in self
            .list()?
            .into_iter()
            .filter(|p| !keep.contains(&p.participant_id))
        {
            let who = stale
                .email
                .as_deref()
                .or(stale.team_name.as_deref())
                .unwrap_or("unknown");
            self.remove(stale.participant_id)?;
            info!("Removed participant {} ({})", stale.participant_id, who);
            tally.removed();
        }
        debug!("Participants converged to {} entries", keep.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nftower_gateway::mock::InMemoryTower;

    fn workspace(tower: &InMemoryTower) -> Workspace {
        let org_id = tower.seed_organization("Sage Bionetworks");
        let id = tower.seed_workspace(org_id, "foo-project");
        Workspace {
            id,
            org_id,
            name: "foo-project".into(),
            full_name: "foo-project".into(),
        }
    }

    #[test]
    fn test_upsert_sets_role_on_new_participant() {
        let tower = InMemoryTower::new();
        let ws = workspace(&tower);
        let member = tower.seed_member(ws.org_id, "a@example.org");
        let mut tally = Tally::default();

        Participants::new(&tower, &ws)
            .upsert(Target::Member(member), Role::Maintain, &mut tally)
            .unwrap();

        assert_eq!(
            tower.participant_roles(ws.id),
            vec![("a@example.org".to_string(), "maintain".to_string())]
        );
        assert_eq!(tally.created, 1);
        assert_eq!(tally.updated, 0);
    }

    #[test]
    fn test_upsert_existing_participant_updates_role() {
        let tower = InMemoryTower::new();
        let ws = workspace(&tower);
        let member = tower.seed_member(ws.org_id, "a@example.org");
        tower.seed_member_participant(ws.id, member, "view");
        let mut tally = Tally::default();

        let participants = Participants::new(&tower, &ws);
        participants
            .upsert(Target::Member(member), Role::Launch, &mut tally)
            .unwrap();
        participants
            .upsert(Target::Member(member), Role::Launch, &mut tally)
            .unwrap();

        assert_eq!(tower.created("participant"), 0);
        assert_eq!(tally.updated, 1);
        assert_eq!(
            tower.participant_roles(ws.id),
            vec![("a@example.org".to_string(), "launch".to_string())]
        );
    }

    #[test]
    fn test_reconcile_preserves_owners_and_removes_strays() {
        let tower = InMemoryTower::new();
        let ws = workspace(&tower);
        let a = tower.seed_member(ws.org_id, "a@example.org");
        let b = tower.seed_member(ws.org_id, "b@example.org");
        let c = tower.seed_member(ws.org_id, "c@example.org");
        let d = tower.seed_member(ws.org_id, "d@example.org");
        tower.seed_member_participant(ws.id, a, "view");
        tower.seed_member_participant(ws.id, b, "maintain");
        tower.seed_member_participant(ws.id, c, "owner");
        let mut tally = Tally::default();

        Participants::new(&tower, &ws)
            .reconcile(
                &[
                    (Target::Member(a), Role::Maintain),
                    (Target::Member(d), Role::View),
                ],
                &mut tally,
            )
            .unwrap();

        assert_eq!(
            tower.participant_roles(ws.id),
            vec![
                ("a@example.org".to_string(), "maintain".to_string()),
                ("c@example.org".to_string(), "owner".to_string()),
                ("d@example.org".to_string(), "view".to_string()),
            ]
        );
        assert_eq!(tally.created, 1);
        assert_eq!(tally.updated, 1);
        assert_eq!(tally.removed, 1);
    }

    #[test]
    fn test_team_target_body() {
        assert_eq!(
            Target::Team(9).add_body(),
            json!({ "memberId": null, "teamId": 9, "userNameOrEmail": null })
        );
        assert_eq!(Target::Member(3).to_string(), "member 3");
    }
}
