use std::collections::HashMap;

use serde_json::json;
use tracing::{debug, info};

use nftower_core::error::{Result, TowerError};
use nftower_gateway::{extract_quoted, Gateway, Method, Outcome};

use crate::report::Tally;
use crate::wire::{decode, decode_pages, MemberDto};

/// An organization member resolved to its Tower identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub member_id: u64,
    pub email: String,
    pub user_name: Option<String>,
}

impl From<MemberDto> for Member {
    fn from(dto: MemberDto) -> Self {
        Self {
            member_id: dto.member_id,
            email: dto.email,
            user_name: dto.user_name,
        }
    }
}

/// Organization membership, memoized by email for the length of a run.
#[derive(Debug)]
pub struct Members {
    org_id: u64,
    cache: HashMap<String, Member>,
}

impl Members {
    pub fn new(org_id: u64) -> Self {
        Self {
            org_id,
            cache: HashMap::new(),
        }
    }

    fn path(&self) -> String {
        format!("/orgs/{}/members", self.org_id)
    }

    /// Add `email` to the organization, or resolve the existing member.
    ///
    /// Tower names an existing member only by user name in its conflict
    /// message, so the lookup matches on either email or that user name.
    pub fn ensure(&mut self, gateway: &dyn Gateway, email: &str, tally: &mut Tally) -> Result<Member> {
        if let Some(member) = self.cache.get(email) {
            return Ok(member.clone());
        }

        let body = json!({ "user": email });
        let response = gateway.request(Method::Put, &format!("{}/add", self.path()), &[], Some(&body))?;
        let member = match Outcome::classify(response, "member") {
            Outcome::Created(member) => {
                let member: Member = decode::<MemberDto>(member, "member")?.into();
                info!("Added {} to the organization (member {})", email, member.member_id);
                tally.created();
                member
            }
            Outcome::AlreadyExists(reason) => {
                debug!("{} is already a member: {}", email, reason);
                self.find(gateway, email, extract_quoted(&reason))?
                    .ok_or_else(|| {
                        TowerError::UnexpectedResponse(format!(
                            "member '{email}' reported as existing but not found: {reason}"
                        ))
                    })?
            }
            Outcome::Conflict(reason) => {
                return Err(TowerError::Api(format!("could not add member '{email}': {reason}")));
            }
        };

        self.cache.insert(email.to_string(), member.clone());
        Ok(member)
    }

    /// Search the member listing by email, then by user name.
    pub fn find(&self, gateway: &dyn Gateway, email: &str, user_name: Option<&str>) -> Result<Option<Member>> {
        let matches = |member: &MemberDto| {
            member.email.eq_ignore_ascii_case(email)
                || user_name.is_some_and(|name| member.user_name.as_deref() == Some(name))
        };

        let mut searches = vec![email];
        searches.extend(user_name);
        for search in searches {
            let query = [("search", search.to_string())];
            let listed: Vec<MemberDto> =
                decode_pages(gateway.paged_request(Method::Get, &self.path(), &query), "members")?;
            if let Some(member) = listed.into_iter().find(|m| matches(m)) {
                return Ok(Some(member.into()));
            }
        }
        Ok(None)
    }

    #[cfg(test)]
    fn cached(&self, email: &str) -> Option<&Member> {
        self.cache.get(email)
    }
}
