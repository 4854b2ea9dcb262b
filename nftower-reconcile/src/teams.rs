//! Organization teams, one per project access bucket.

use std::collections::HashSet;

use serde_json::json;
use tracing::{debug, info};

use nftower_core::error::{Result, TowerError};
use nftower_gateway::{Deletion, Gateway, Method, Outcome};

use crate::members::Member;
use crate::report::Tally;
use crate::wire::{decode, decode_pages, MemberDto, TeamDto};

/// Teams of one organization.
#[derive(Clone, Copy)]
pub struct Teams<'a> {
    gateway: &'a dyn Gateway,
    org_id: u64,
}

impl<'a> Teams<'a> {
    pub fn new(gateway: &'a dyn Gateway, org_id: u64) -> Self {
        Self { gateway, org_id }
    }

    fn path(&self) -> String {
        format!("/orgs/{}/teams", self.org_id)
    }

    fn members_path(&self, team_id: u64) -> String {
        format!("{}/{}/members", self.path(), team_id)
    }

    pub fn find(&self, name: &str) -> Result<Option<u64>> {
        let teams: Vec<TeamDto> =
            decode_pages(self.gateway.paged_request(Method::Get, &self.path(), &[]), "teams")?;
        Ok(teams.into_iter().find(|t| t.name == name).map(|t| t.team_id))
    }

    /// Find the team by name, creating it when absent. Returns the team id.
    pub fn ensure(&self, name: &str, tally: &mut Tally) -> Result<u64> {
        if let Some(id) = self.find(name)? {
            return Ok(id);
        }

        let body = json!({
            "team": { "name": name, "description": null, "avatar": null }
        });
        let response = self
            .gateway
            .request(Method::Post, &self.path(), &[], Some(&body))?;
        match Outcome::classify(response, "team") {
            Outcome::Created(team) => {
                let team: TeamDto = decode(team, "team")?;
                info!("Created team '{}' (id {})", name, team.team_id);
                tally.created();
                Ok(team.team_id)
            }
            Outcome::AlreadyExists(reason) => self.find(name)?.ok_or_else(|| {
                TowerError::UnexpectedResponse(format!(
                    "team '{name}' reported as existing but not listed: {reason}"
                ))
            }),
            Outcome::Conflict(reason) => Err(TowerError::Api(format!(
                "could not create team '{name}': {reason}"
            ))),
        }
    }

    pub fn list_members(&self, team_id: u64) -> Result<Vec<MemberDto>> {
        decode_pages(
            self.gateway
                .paged_request(Method::Get, &self.members_path(team_id), &[]),
            "team members",
        )
    }

    /// Make the team's membership exactly `desired`.
    pub fn reconcile_members(&self, team_id: u64, desired: &[Member], tally: &mut Tally) -> Result<()> {
        for member in desired {
            let body = json!({ "userNameOrEmail": member.email });
            let response = self.gateway.request(
                Method::Post,
                &self.members_path(team_id),
                &[],
                Some(&body),
            )?;
            match Outcome::classify(response, "member") {
                Outcome::Created(_) => {
                    debug!("Added {} to team {}", member.email, team_id);
                    tally.created();
                }
                Outcome::AlreadyExists(_) => {}
                Outcome::Conflict(reason) => {
                    return Err(TowerError::Api(format!(
                        "could not add '{}' to team {}: {}",
                        member.email, team_id, reason
                    )));
                }
            }
        }

        let keep: HashSet<u64> = desired.iter().map(|m| m.member_id).collect();
        for stale in self
            .list_members(team_id)?
            .into_iter()
            .filter(|m| !keep.contains(&m.member_id))
        {
            let path = format!("{}/{}/delete", self.members_path(team_id), stale.member_id);
            let response = self.gateway.request(Method::Delete, &path, &[], None)?;
            match Deletion::classify(&response) {
                Deletion::Removed => {
                    info!("Removed {} from team {}", stale.email, team_id);
                    tally.removed();
                }
                Deletion::Busy(reason) | Deletion::Refused(reason) => {
                    return Err(TowerError::Api(format!(
                        "could not remove '{}' from team {}: {}",
                        stale.email, team_id, reason
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::Members;
    use nftower_gateway::mock::InMemoryTower;

    #[test]
    fn test_ensure_team_is_idempotent() {
        let tower = InMemoryTower::new();
        let org = tower.seed_organization("Sage Bionetworks");
        let teams = Teams::new(&tower, org);
        let mut tally = Tally::default();

        let first = teams.ensure("foo-viewers", &mut tally).unwrap();
        let second = teams.ensure("foo-viewers", &mut tally).unwrap();
        assert_eq!(first, second);
        assert_eq!(tower.created("team"), 1);
    }

    #[test]
    fn test_reconcile_members_adds_and_removes() {
        let tower = InMemoryTower::new();
        let org = tower.seed_organization("Sage Bionetworks");
        let mut members = Members::new(org);
        let teams = Teams::new(&tower, org);
        let mut tally = Tally::default();

        let a = members.ensure(&tower, "a@example.org", &mut tally).unwrap();
        let b = members.ensure(&tower, "b@example.org", &mut tally).unwrap();
        let c = members.ensure(&tower, "c@example.org", &mut tally).unwrap();
        let team = teams.ensure("foo-maintainers", &mut tally).unwrap();

        teams
            .reconcile_members(team, &[a.clone(), b], &mut tally)
            .unwrap();
        assert_eq!(
            tower.team_member_emails("foo-maintainers"),
            vec!["a@example.org", "b@example.org"]
        );

        teams.reconcile_members(team, &[a, c], &mut tally).unwrap();
        assert_eq!(
            tower.team_member_emails("foo-maintainers"),
            vec!["a@example.org", "c@example.org"]
        );
        assert_eq!(tower.deleted("team member"), 1);
    }
}
