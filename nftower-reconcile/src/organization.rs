use serde_json::json;
use tracing::{debug, info};

use nftower_core::error::{Result, TowerError};
use nftower_core::get_valid_name;
use nftower_gateway::{Gateway, Method, Outcome};

use crate::report::Tally;
use crate::wire::{decode, decode_list, OrganizationDto};

/// A Tower organization the run works inside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: u64,
    pub name: String,
    pub full_name: String,
}

impl From<OrganizationDto> for Organization {
    fn from(dto: OrganizationDto) -> Self {
        Self {
            id: dto.org_id,
            name: dto.name,
            full_name: dto.full_name,
        }
    }
}

fn find(gateway: &dyn Gateway, full_name: &str) -> Result<Option<Organization>> {
    let name = get_valid_name(full_name);
    let response = gateway.request(Method::Get, "/orgs", &[], None)?;
    let orgs: Vec<OrganizationDto> = decode_list(response, "organizations", "organizations")?;
    Ok(orgs
        .into_iter()
        .find(|org| org.full_name == full_name || org.name == name)
        .map(Organization::from))
}

/// Find the organization by full name, creating it when absent.
pub fn ensure(gateway: &dyn Gateway, full_name: &str, tally: &mut Tally) -> Result<Organization> {
    if let Some(org) = find(gateway, full_name)? {
        debug!("Organization '{}' exists with id {}", full_name, org.id);
        return Ok(org);
    }

    let body = json!({
        "organization": {
            "name": get_valid_name(full_name),
            "fullName": full_name,
            "description": null,
            "location": null,
            "website": null,
            "logo": null
        },
        "logoId": null
    });
    let response = gateway.request(Method::Post, "/orgs", &[], Some(&body))?;
    match Outcome::classify(response, "organization") {
        Outcome::Created(org) => {
            let org: Organization = decode::<OrganizationDto>(org, "organization")?.into();
            info!("Created organization '{}' (id {})", full_name, org.id);
            tally.created();
            Ok(org)
        }
        // Lost a race with another writer; the listing now has it.
        Outcome::AlreadyExists(reason) => find(gateway, full_name)?.ok_or_else(|| {
            TowerError::UnexpectedResponse(format!(
                "organization '{full_name}' reported as existing but not listed: {reason}"
            ))
        }),
        Outcome::Conflict(reason) => Err(TowerError::Api(format!(
            "could not create organization '{full_name}': {reason}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nftower_gateway::mock::InMemoryTower;

    #[test]
    fn test_ensure_creates_once() {
        let tower = InMemoryTower::new();
        let mut tally = Tally::default();

        let first = ensure(&tower, "Sage Bionetworks", &mut tally).unwrap();
        let second = ensure(&tower, "Sage Bionetworks", &mut tally).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.name, "Sage-Bionetworks");
        assert_eq!(tower.organization_count(), 1);
        assert_eq!(tally.created, 1);
    }

    #[test]
    fn test_ensure_finds_seeded_organization() {
        let tower = InMemoryTower::new();
        let id = tower.seed_organization("Sage Bionetworks");
        let mut tally = Tally::default();

        let org = ensure(&tower, "Sage Bionetworks", &mut tally).unwrap();
        assert_eq!(org.id, id);
        assert!(tally.is_noop());
        assert_eq!(tower.creations(), 0);
    }
}
