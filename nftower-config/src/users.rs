//! Workspace roles and the per-project user buckets.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use nftower_core::error::TowerError;
use serde::{Deserialize, Serialize};

/// Tower workspace role, ordered by precedence (`View` lowest, `Owner` highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    View,
    Launch,
    Maintain,
    Admin,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Admin => "admin",
            Role::Maintain => "maintain",
            Role::Launch => "launch",
            Role::View => "view",
        }
    }

    /// Whether the role is allowed to launch workflows.
    pub fn can_launch(&self) -> bool {
        *self >= Role::Launch
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = TowerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "admin" => Ok(Role::Admin),
            "maintain" => Ok(Role::Maintain),
            "launch" => Ok(Role::Launch),
            "view" => Ok(Role::View),
            other => Err(TowerError::Validation(format!("Unknown workspace role: {other}"))),
        }
    }
}

/// A named group of users sharing one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Owners,
    Admins,
    Maintainers,
    Launchers,
    Viewers,
}

impl Bucket {
    /// Buckets in the order users are listed, highest role first.
    pub const ALL: [Bucket; 5] = [
        Bucket::Owners,
        Bucket::Admins,
        Bucket::Maintainers,
        Bucket::Launchers,
        Bucket::Viewers,
    ];

    pub fn role(&self) -> Role {
        match self {
            Bucket::Owners => Role::Owner,
            Bucket::Admins => Role::Admin,
            Bucket::Maintainers => Role::Maintain,
            Bucket::Launchers => Role::Launch,
            Bucket::Viewers => Role::View,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Owners => "owners",
            Bucket::Admins => "admins",
            Bucket::Maintainers => "maintainers",
            Bucket::Launchers => "launchers",
            Bucket::Viewers => "viewers",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Users of one project, stored as emails and grouped by role.
///
/// An email appears in at most one bucket: when a user is listed under
/// several roles only the highest one is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Users {
    pub owners: Vec<String>,
    pub admins: Vec<String>,
    pub maintainers: Vec<String>,
    pub launchers: Vec<String>,
    pub viewers: Vec<String>,
}

impl Users {
    /// The two-list form: read-write ARNs become maintainers, read-only ARNs viewers.
    pub fn from_access_lists(maintainers: Vec<String>, viewers: Vec<String>) -> Self {
        Self::from_buckets(vec![
            (Bucket::Maintainers, maintainers),
            (Bucket::Viewers, viewers),
        ])
    }

    /// Build from any combination of buckets, resolving duplicates by precedence.
    pub fn from_buckets(buckets: Vec<(Bucket, Vec<String>)>) -> Self {
        let mut best: HashMap<String, Role> = HashMap::new();
        for (bucket, emails) in &buckets {
            for email in emails {
                let role = bucket.role();
                best.entry(email.clone())
                    .and_modify(|current| {
                        if role > *current {
                            *current = role;
                        }
                    })
                    .or_insert(role);
            }
        }

        let mut users = Users::default();
        for (bucket, emails) in buckets {
            for email in emails {
                if best.get(&email) != Some(&bucket.role()) {
                    continue;
                }
                let target = users.bucket_mut(bucket);
                if !target.contains(&email) {
                    target.push(email);
                }
            }
        }
        users
    }

    pub fn bucket(&self, bucket: Bucket) -> &[String] {
        match bucket {
            Bucket::Owners => &self.owners,
            Bucket::Admins => &self.admins,
            Bucket::Maintainers => &self.maintainers,
            Bucket::Launchers => &self.launchers,
            Bucket::Viewers => &self.viewers,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<String> {
        match bucket {
            Bucket::Owners => &mut self.owners,
            Bucket::Admins => &mut self.admins,
            Bucket::Maintainers => &mut self.maintainers,
            Bucket::Launchers => &mut self.launchers,
            Bucket::Viewers => &mut self.viewers,
        }
    }

    /// Every user with its bucket and role, highest role first.
    pub fn list_users(&self) -> impl Iterator<Item = (&str, Bucket, Role)> + '_ {
        Bucket::ALL.into_iter().flat_map(move |bucket| {
            self.bucket(bucket)
                .iter()
                .map(move |email| (email.as_str(), bucket, bucket.role()))
        })
    }

    /// Users grouped per non-empty bucket, as used for team-based grouping.
    pub fn list_teams(&self) -> Vec<(Vec<String>, Bucket, Role)> {
        Bucket::ALL
            .into_iter()
            .filter(|bucket| !self.bucket(*bucket).is_empty())
            .map(|bucket| (self.bucket(bucket).to_vec(), bucket, bucket.role()))
            .collect()
    }

    /// Whether at least one user can launch workflows.
    pub fn has_launchers(&self) -> bool {
        self.list_users().any(|(_, _, role)| role.can_launch())
    }

    pub fn len(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.bucket(*b).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
