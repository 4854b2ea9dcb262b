//! In-memory Tower control plane and static AWS fixtures for tests.
//!
//! [`InMemoryTower`] answers the same endpoints as Tower, with the same
//! free-text conflict messages, and counts every entity it creates so tests
//! can assert idempotence.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};

use serde_json::{json, Map, Value};

use nftower_core::error::{Result, TowerError};

use crate::aws::{OutputMap, SecretStore, StackOutputs, STACK_NAME_KEY};
use crate::gateway::{Gateway, Method, Pages, Query};

#[derive(Debug, Clone)]
struct Org {
    id: u64,
    name: String,
    full_name: String,
}

#[derive(Debug, Clone)]
struct Member {
    id: u64,
    org_id: u64,
    email: String,
    user_name: String,
}

#[derive(Debug, Clone)]
struct Team {
    id: u64,
    org_id: u64,
    name: String,
    member_ids: Vec<u64>,
}

#[derive(Debug, Clone)]
struct Workspace {
    id: u64,
    org_id: u64,
    name: String,
    full_name: String,
}

#[derive(Debug, Clone)]
struct Participant {
    id: u64,
    workspace_id: u64,
    member_id: Option<u64>,
    team_id: Option<u64>,
    role: String,
}

#[derive(Debug, Clone)]
struct Credential {
    id: String,
    workspace_id: u64,
    name: String,
    provider: String,
    deleted: bool,
    keys: Value,
}

#[derive(Debug, Clone)]
struct Label {
    id: u64,
    workspace_id: u64,
    name: String,
    value: String,
}

#[derive(Debug, Clone)]
struct ComputeEnv {
    id: String,
    workspace_id: u64,
    name: String,
    platform: String,
    status: String,
    primary: bool,
    request: Value,
    /// Listings left before a `DELETING` environment disappears.
    linger: usize,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    orgs: Vec<Org>,
    members: Vec<Member>,
    teams: Vec<Team>,
    workspaces: Vec<Workspace>,
    participants: Vec<Participant>,
    credentials: Vec<Credential>,
    labels: Vec<Label>,
    compute_envs: Vec<ComputeEnv>,
    busy_compute_envs: HashSet<String>,
    deletion_linger: usize,
    created: BTreeMap<&'static str, usize>,
    deleted: BTreeMap<&'static str, usize>,
    requests: Vec<String>,
}

impl State {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn count_creation(&mut self, kind: &'static str) {
        *self.created.entry(kind).or_default() += 1;
    }

    fn count_deletion(&mut self, kind: &'static str) {
        *self.deleted.entry(kind).or_default() += 1;
    }

    fn member_json(&self, member: &Member) -> Value {
        json!({
            "memberId": member.id,
            "userId": member.id,
            "userName": member.user_name,
            "email": member.email,
            "role": "member"
        })
    }

    fn participant_json(&self, participant: &Participant) -> Value {
        let member = participant
            .member_id
            .and_then(|id| self.members.iter().find(|m| m.id == id));
        let team = participant
            .team_id
            .and_then(|id| self.teams.iter().find(|t| t.id == id));
        let kind = if participant.team_id.is_some() { "TEAM" } else { "MEMBER" };
        json!({
            "participantId": participant.id,
            "memberId": participant.member_id,
            "teamId": participant.team_id,
            "userName": member.map(|m| m.user_name.clone()),
            "email": member.map(|m| m.email.clone()),
            "teamName": team.map(|t| t.name.clone()),
            "type": kind,
            "wspRole": participant.role
        })
    }

    fn compute_env_json(ce: &ComputeEnv) -> Value {
        json!({
            "id": ce.id,
            "name": ce.name,
            "platform": ce.platform,
            "status": ce.status,
            "primary": ce.primary
        })
    }
}

/// Fake Tower API holding all state in memory.
#[derive(Debug, Default)]
pub struct InMemoryTower {
    state: RefCell<State>,
    page_size: Cell<u32>,
}

fn not_found(what: &str) -> Value {
    json!({ "message": format!("{what} not found") })
}

fn query_value<'a>(query: Query<'a>, key: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, v)| v.as_str())
}

fn query_id(query: Query<'_>, key: &str) -> Result<u64> {
    query_value(query, key)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| TowerError::Api(format!("missing or invalid '{key}' query parameter")))
}

fn parse_id(segment: &str) -> Result<u64> {
    segment
        .parse()
        .map_err(|_| TowerError::Api(format!("invalid identifier '{segment}'")))
}

fn body_str<'a>(body: Option<&'a Value>, pointer: &str) -> Option<&'a str> {
    body.and_then(|b| b.pointer(pointer)).and_then(Value::as_str)
}

/// One page of `items` under `key`, honoring `max` and `offset`.
fn page(key: &str, items: Vec<Value>, query: Query<'_>) -> Value {
    let total = items.len();
    let offset = query_value(query, "offset")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);
    let max = query_value(query, "max")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(total);
    let items: Vec<Value> = items.into_iter().skip(offset).take(max).collect();
    let mut fields = Map::new();
    fields.insert(key.to_string(), Value::Array(items));
    fields.insert("totalSize".to_string(), json!(total));
    Value::Object(fields)
}

fn user_name_for(email: &str) -> String {
    email
        .split('@')
        .next()
        .unwrap_or(email)
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

impl InMemoryTower {
    pub fn new() -> Self {
        let tower = Self::default();
        tower.page_size.set(2);
        tower
    }

    /// Deleted compute environments stay listed as `DELETING` for this many listings.
    pub fn set_deletion_linger(&self, listings: usize) {
        self.state.borrow_mut().deletion_linger = listings;
    }

    // ------------------------------------------------------------------
    // Seeding (not counted as creations)
    // ------------------------------------------------------------------

    pub fn seed_organization(&self, full_name: &str) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.orgs.push(Org {
            id,
            name: nftower_core::get_valid_name(full_name),
            full_name: full_name.to_string(),
        });
        id
    }

    pub fn seed_member(&self, org_id: u64, email: &str) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.members.push(Member {
            id,
            org_id,
            email: email.to_string(),
            user_name: user_name_for(email),
        });
        id
    }

    pub fn seed_workspace(&self, org_id: u64, name: &str) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.workspaces.push(Workspace {
            id,
            org_id,
            name: name.to_string(),
            full_name: name.to_string(),
        });
        id
    }

    pub fn seed_member_participant(&self, workspace_id: u64, member_id: u64, role: &str) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id();
        state.participants.push(Participant {
            id,
            workspace_id,
            member_id: Some(member_id),
            team_id: None,
            role: role.to_string(),
        });
        id
    }

    pub fn seed_credential(&self, workspace_id: u64, name: &str, provider: &str, deleted: bool) -> String {
        let mut state = self.state.borrow_mut();
        let id = format!("cred{}", state.next_id());
        state.credentials.push(Credential {
            id: id.clone(),
            workspace_id,
            name: name.to_string(),
            provider: provider.to_string(),
            deleted,
            keys: Value::Null,
        });
        id
    }

    pub fn seed_compute_env(&self, workspace_id: u64, name: &str, status: &str) -> String {
        let mut state = self.state.borrow_mut();
        let id = format!("ce{}", state.next_id());
        state.compute_envs.push(ComputeEnv {
            id: id.clone(),
            workspace_id,
            name: name.to_string(),
            platform: "aws-batch".to_string(),
            status: status.to_string(),
            primary: false,
            request: Value::Null,
            linger: 0,
        });
        id
    }

    /// Make deletions of this compute environment fail with "active jobs".
    pub fn mark_busy(&self, compute_env_id: &str) {
        self.state
            .borrow_mut()
            .busy_compute_envs
            .insert(compute_env_id.to_string());
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Entities created through the API, all kinds together.
    pub fn creations(&self) -> usize {
        self.state.borrow().created.values().sum()
    }

    /// Entities of one kind (`"organization"`, `"member"`, `"participant"`, ...) created.
    pub fn created(&self, kind: &str) -> usize {
        self.state.borrow().created.get(kind).copied().unwrap_or(0)
    }

    pub fn deleted(&self, kind: &str) -> usize {
        self.state.borrow().deleted.get(kind).copied().unwrap_or(0)
    }

    /// `"METHOD path"` of every request received, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.borrow().requests.clone()
    }

    pub fn organization_count(&self) -> usize {
        self.state.borrow().orgs.len()
    }

    pub fn organization_id(&self, full_name: &str) -> Option<u64> {
        self.state
            .borrow()
            .orgs
            .iter()
            .find(|o| o.full_name == full_name)
            .map(|o| o.id)
    }

    pub fn workspace_id(&self, name: &str) -> Option<u64> {
        self.state
            .borrow()
            .workspaces
            .iter()
            .find(|w| w.name == name)
            .map(|w| w.id)
    }

    pub fn workspace_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .workspaces
            .iter()
            .map(|w| w.name.clone())
            .collect()
    }

    pub fn member_emails(&self, org_id: u64) -> Vec<String> {
        self.state
            .borrow()
            .members
            .iter()
            .filter(|m| m.org_id == org_id)
            .map(|m| m.email.clone())
            .collect()
    }

    /// `(email or team name, role)` of every participant, sorted.
    pub fn participant_roles(&self, workspace_id: u64) -> Vec<(String, String)> {
        let state = self.state.borrow();
        let mut roles: Vec<(String, String)> = state
            .participants
            .iter()
            .filter(|p| p.workspace_id == workspace_id)
            .map(|p| {
                let who = state.participant_json(p);
                let name = who["email"]
                    .as_str()
                    .or_else(|| who["teamName"].as_str())
                    .unwrap_or_default()
                    .to_string();
                (name, p.role.clone())
            })
            .collect();
        roles.sort();
        roles
    }

    /// Emails of a team's members, sorted.
    pub fn team_member_emails(&self, team_name: &str) -> Vec<String> {
        let state = self.state.borrow();
        let Some(team) = state.teams.iter().find(|t| t.name == team_name) else {
            return Vec::new();
        };
        let mut emails: Vec<String> = team
            .member_ids
            .iter()
            .filter_map(|id| state.members.iter().find(|m| m.id == *id))
            .map(|m| m.email.clone())
            .collect();
        emails.sort();
        emails
    }

    pub fn team_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .teams
            .iter()
            .map(|t| t.name.clone())
            .collect()
    }

    /// `(name, status, primary)` of every compute environment in a workspace.
    pub fn compute_envs(&self, workspace_id: u64) -> Vec<(String, String, bool)> {
        self.state
            .borrow()
            .compute_envs
            .iter()
            .filter(|ce| ce.workspace_id == workspace_id)
            .map(|ce| (ce.name.clone(), ce.status.clone(), ce.primary))
            .collect()
    }

    /// Body of the request that created the named compute environment.
    pub fn compute_env_request(&self, name: &str) -> Option<Value> {
        self.state
            .borrow()
            .compute_envs
            .iter()
            .find(|ce| ce.name == name)
            .map(|ce| ce.request.clone())
    }

    pub fn credential_names(&self, workspace_id: u64) -> Vec<String> {
        self.state
            .borrow()
            .credentials
            .iter()
            .filter(|c| c.workspace_id == workspace_id)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn credential_keys(&self, workspace_id: u64, name: &str) -> Option<Value> {
        self.state
            .borrow()
            .credentials
            .iter()
            .find(|c| c.workspace_id == workspace_id && c.name == name)
            .map(|c| c.keys.clone())
    }

    /// `(name, value)` of every label in a workspace.
    pub fn labels(&self, workspace_id: u64) -> Vec<(String, String)> {
        self.state
            .borrow()
            .labels
            .iter()
            .filter(|l| l.workspace_id == workspace_id)
            .map(|l| (l.name.clone(), l.value.clone()))
            .collect()
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    fn route(&self, method: Method, path: &str, query: Query<'_>, body: Option<&Value>) -> Result<Value> {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let mut state = self.state.borrow_mut();
        let state = &mut *state;

        match (method, segments.as_slice()) {
            (Method::Get, ["orgs"]) => Ok(json!({
                "organizations": state.orgs.iter().map(|o| json!({
                    "orgId": o.id, "name": o.name, "fullName": o.full_name
                })).collect::<Vec<_>>()
            })),
            (Method::Post, ["orgs"]) => {
                let name = body_str(body, "/organization/name").unwrap_or_default().to_string();
                let full_name = body_str(body, "/organization/fullName").unwrap_or_default().to_string();
                if state.orgs.iter().any(|o| o.name == name) {
                    return Ok(json!({ "message": format!("An organization with name '{name}' already exists") }));
                }
                let id = state.next_id();
                state.orgs.push(Org { id, name: name.clone(), full_name: full_name.clone() });
                state.count_creation("organization");
                Ok(json!({ "organization": { "orgId": id, "name": name, "fullName": full_name } }))
            }

            (Method::Get, ["orgs", org, "members"]) => {
                let org_id = parse_id(org)?;
                let search = query_value(query, "search").unwrap_or_default().to_lowercase();
                let members: Vec<Value> = state
                    .members
                    .iter()
                    .filter(|m| m.org_id == org_id)
                    .filter(|m| {
                        search.is_empty()
                            || m.email.to_lowercase().contains(&search)
                            || m.user_name.to_lowercase().contains(&search)
                    })
                    .map(|m| state.member_json(m))
                    .collect();
                Ok(page("members", members, query))
            }
            (Method::Put, ["orgs", org, "members", "add"]) => {
                let org_id = parse_id(org)?;
                let user = body_str(body, "/user").unwrap_or_default().to_string();
                if let Some(existing) = state
                    .members
                    .iter()
                    .find(|m| m.org_id == org_id && (m.email == user || m.user_name == user))
                {
                    return Ok(json!({
                        "message": format!("User '{}' is already a member of this organization", existing.user_name)
                    }));
                }
                let member = Member {
                    id: state.next_id(),
                    org_id,
                    email: user.clone(),
                    user_name: user_name_for(&user),
                };
                let json = state.member_json(&member);
                state.members.push(member);
                state.count_creation("member");
                Ok(json!({ "member": json }))
            }

            (Method::Get, ["orgs", org, "teams"]) => {
                let org_id = parse_id(org)?;
                let teams: Vec<Value> = state
                    .teams
                    .iter()
                    .filter(|t| t.org_id == org_id)
                    .map(|t| json!({ "teamId": t.id, "name": t.name, "membersCount": t.member_ids.len() }))
                    .collect();
                Ok(page("teams", teams, query))
            }
            (Method::Post, ["orgs", org, "teams"]) => {
                let org_id = parse_id(org)?;
                let name = body_str(body, "/team/name").unwrap_or_default().to_string();
                if state.teams.iter().any(|t| t.org_id == org_id && t.name == name) {
                    return Ok(json!({ "message": format!("A team with name '{name}' already exists") }));
                }
                let id = state.next_id();
                state.teams.push(Team { id, org_id, name: name.clone(), member_ids: Vec::new() });
                state.count_creation("team");
                Ok(json!({ "team": { "teamId": id, "name": name } }))
            }
            (Method::Get, ["orgs", _org, "teams", team, "members"]) => {
                let team_id = parse_id(team)?;
                let Some(team) = state.teams.iter().find(|t| t.id == team_id) else {
                    return Ok(not_found("Team"));
                };
                let members: Vec<Value> = team
                    .member_ids
                    .iter()
                    .filter_map(|id| state.members.iter().find(|m| m.id == *id))
                    .map(|m| state.member_json(m))
                    .collect();
                Ok(page("members", members, query))
            }
            (Method::Post, ["orgs", org, "teams", team, "members"]) => {
                let org_id = parse_id(org)?;
                let team_id = parse_id(team)?;
                let user = body_str(body, "/userNameOrEmail").unwrap_or_default();
                let Some(member) = state
                    .members
                    .iter()
                    .find(|m| m.org_id == org_id && (m.email == user || m.user_name == user))
                    .cloned()
                else {
                    return Ok(not_found("Member"));
                };
                let Some(team) = state.teams.iter_mut().find(|t| t.id == team_id) else {
                    return Ok(not_found("Team"));
                };
                if team.member_ids.contains(&member.id) {
                    return Ok(json!({ "message": "The member is already associated with the team" }));
                }
                team.member_ids.push(member.id);
                state.count_creation("team member");
                Ok(json!({ "member": state.member_json(&member) }))
            }
            (Method::Delete, ["orgs", _org, "teams", team, "members", member, "delete"]) => {
                let team_id = parse_id(team)?;
                let member_id = parse_id(member)?;
                let Some(team) = state.teams.iter_mut().find(|t| t.id == team_id) else {
                    return Ok(not_found("Team"));
                };
                let before = team.member_ids.len();
                team.member_ids.retain(|id| *id != member_id);
                if team.member_ids.len() == before {
                    return Ok(not_found("Team member"));
                }
                state.count_deletion("team member");
                Ok(json!({}))
            }

            (Method::Get, ["orgs", org, "workspaces"]) => {
                let org_id = parse_id(org)?;
                Ok(json!({
                    "workspaces": state.workspaces.iter().filter(|w| w.org_id == org_id).map(|w| json!({
                        "id": w.id, "name": w.name, "fullName": w.full_name, "visibility": "PRIVATE"
                    })).collect::<Vec<_>>()
                }))
            }
            (Method::Post, ["orgs", org, "workspaces"]) => {
                let org_id = parse_id(org)?;
                let name = body_str(body, "/workspace/name").unwrap_or_default().to_string();
                let full_name = body_str(body, "/workspace/fullName").unwrap_or(&name).to_string();
                if state.workspaces.iter().any(|w| w.org_id == org_id && w.name == name) {
                    return Ok(json!({ "message": format!("A workspace with name '{name}' already exists") }));
                }
                let id = state.next_id();
                state.workspaces.push(Workspace { id, org_id, name: name.clone(), full_name: full_name.clone() });
                state.count_creation("workspace");
                Ok(json!({ "workspace": { "id": id, "name": name, "fullName": full_name, "visibility": "PRIVATE" } }))
            }

            (Method::Get, ["orgs", _org, "workspaces", ws, "participants"]) => {
                let ws_id = parse_id(ws)?;
                let participants: Vec<Value> = state
                    .participants
                    .iter()
                    .filter(|p| p.workspace_id == ws_id)
                    .map(|p| state.participant_json(p))
                    .collect();
                Ok(page("participants", participants, query))
            }
            (Method::Put, ["orgs", _org, "workspaces", ws, "participants", "add"]) => {
                let ws_id = parse_id(ws)?;
                let member_id = body.and_then(|b| b.get("memberId")).and_then(Value::as_u64);
                let team_id = body.and_then(|b| b.get("teamId")).and_then(Value::as_u64);
                if member_id.is_none() && team_id.is_none() {
                    return Ok(json!({ "message": "Either a member or a team must be provided" }));
                }
                let exists = state.participants.iter().any(|p| {
                    p.workspace_id == ws_id
                        && ((member_id.is_some() && p.member_id == member_id)
                            || (team_id.is_some() && p.team_id == team_id))
                });
                if exists {
                    return Ok(json!({ "message": "Member is already a participant of this workspace" }));
                }
                let participant = Participant {
                    id: state.next_id(),
                    workspace_id: ws_id,
                    member_id,
                    team_id,
                    role: "launch".to_string(),
                };
                let json = state.participant_json(&participant);
                state.participants.push(participant);
                state.count_creation("participant");
                Ok(json!({ "participant": json }))
            }
            (Method::Put, ["orgs", _org, "workspaces", _ws, "participants", participant, "role"]) => {
                let participant_id = parse_id(participant)?;
                let role = body_str(body, "/role").unwrap_or_default().to_string();
                match state.participants.iter_mut().find(|p| p.id == participant_id) {
                    Some(participant) => {
                        participant.role = role;
                        Ok(json!({}))
                    }
                    None => Ok(not_found("Participant")),
                }
            }
            (Method::Delete, ["orgs", _org, "workspaces", _ws, "participants", participant]) => {
                let participant_id = parse_id(participant)?;
                let before = state.participants.len();
                state.participants.retain(|p| p.id != participant_id);
                if state.participants.len() == before {
                    return Ok(not_found("Participant"));
                }
                state.count_deletion("participant");
                Ok(json!({}))
            }

            (Method::Get, ["credentials"]) => {
                let ws_id = query_id(query, "workspaceId")?;
                let credentials: Vec<Value> = state
                    .credentials
                    .iter()
                    .filter(|c| c.workspace_id == ws_id)
                    .map(|c| {
                        let deleted = if c.deleted { json!(true) } else { Value::Null };
                        json!({ "id": c.id, "name": c.name, "provider": c.provider, "deleted": deleted })
                    })
                    .collect();
                Ok(json!({ "credentials": credentials }))
            }
            (Method::Post, ["credentials"]) => {
                let ws_id = query_id(query, "workspaceId")?;
                let name = body_str(body, "/credentials/name").unwrap_or_default().to_string();
                let provider = body_str(body, "/credentials/provider").unwrap_or_default().to_string();
                if state.credentials.iter().any(|c| c.workspace_id == ws_id && c.name == name) {
                    return Ok(json!({ "message": format!("Credentials with name '{name}' already exist") }));
                }
                let keys = body
                    .and_then(|b| b.pointer("/credentials/keys"))
                    .cloned()
                    .unwrap_or(Value::Null);
                let id = format!("cred{}", state.next_id());
                state.credentials.push(Credential {
                    id: id.clone(),
                    workspace_id: ws_id,
                    name,
                    provider,
                    deleted: false,
                    keys,
                });
                state.count_creation("credentials");
                Ok(json!({ "credentialsId": id }))
            }

            (Method::Get, ["labels"]) => {
                let ws_id = query_id(query, "workspaceId")?;
                let labels: Vec<Value> = state
                    .labels
                    .iter()
                    .filter(|l| l.workspace_id == ws_id)
                    .map(|l| json!({ "id": l.id, "name": l.name, "value": l.value, "resource": true }))
                    .collect();
                Ok(page("labels", labels, query))
            }
            (Method::Post, ["labels"]) => {
                let ws_id = query_id(query, "workspaceId")?;
                let name = body_str(body, "/name").unwrap_or_default().to_string();
                let value = body_str(body, "/value").unwrap_or_default().to_string();
                if state
                    .labels
                    .iter()
                    .any(|l| l.workspace_id == ws_id && l.name == name && l.value == value)
                {
                    return Ok(json!({ "message": "Label already exists" }));
                }
                let id = state.next_id();
                state.labels.push(Label { id, workspace_id: ws_id, name: name.clone(), value: value.clone() });
                state.count_creation("label");
                Ok(json!({ "id": id, "name": name, "value": value, "resource": true }))
            }

            (Method::Get, ["compute-envs"]) => {
                let ws_id = query_id(query, "workspaceId")?;
                let listed: Vec<Value> = state
                    .compute_envs
                    .iter()
                    .filter(|ce| ce.workspace_id == ws_id)
                    .map(State::compute_env_json)
                    .collect();
                // Lingering deletions progress one step per listing.
                for ce in state.compute_envs.iter_mut().filter(|ce| ce.workspace_id == ws_id) {
                    if ce.status == "DELETING" {
                        ce.linger = ce.linger.saturating_sub(1);
                    }
                }
                state
                    .compute_envs
                    .retain(|ce| !(ce.status == "DELETING" && ce.linger == 0));
                Ok(json!({ "computeEnvs": listed }))
            }
            (Method::Post, ["compute-envs"]) => {
                let ws_id = query_id(query, "workspaceId")?;
                let name = body_str(body, "/computeEnv/name").unwrap_or_default().to_string();
                let platform = body_str(body, "/computeEnv/platform").unwrap_or_default().to_string();
                if state
                    .compute_envs
                    .iter()
                    .any(|ce| ce.workspace_id == ws_id && ce.name == name && ce.status != "DELETING")
                {
                    return Ok(json!({ "message": format!("A compute environment with name '{name}' already exists") }));
                }
                let id = format!("ce{}", state.next_id());
                state.compute_envs.push(ComputeEnv {
                    id: id.clone(),
                    workspace_id: ws_id,
                    name,
                    platform,
                    status: "AVAILABLE".to_string(),
                    primary: false,
                    request: body.cloned().unwrap_or(Value::Null),
                    linger: 0,
                });
                state.count_creation("compute environment");
                Ok(json!({ "computeEnvId": id }))
            }
            (Method::Delete, ["compute-envs", ce_id]) => {
                let ce_id = ce_id.to_string();
                if state.busy_compute_envs.contains(&ce_id) {
                    return Ok(json!({
                        "message": format!("Compute environment '{ce_id}' can't be deleted because it has active jobs")
                    }));
                }
                let linger = state.deletion_linger;
                let Some(index) = state.compute_envs.iter().position(|ce| ce.id == ce_id) else {
                    return Ok(not_found("Compute environment"));
                };
                if linger == 0 {
                    state.compute_envs.remove(index);
                } else {
                    let ce = &mut state.compute_envs[index];
                    ce.status = "DELETING".to_string();
                    ce.linger = linger;
                }
                state.count_deletion("compute environment");
                Ok(json!({}))
            }
            (Method::Post, ["compute-envs", ce_id, "primary"]) => {
                let ws_id = query_id(query, "workspaceId")?;
                if !state.compute_envs.iter().any(|ce| ce.id == *ce_id) {
                    return Ok(not_found("Compute environment"));
                }
                for ce in state.compute_envs.iter_mut().filter(|ce| ce.workspace_id == ws_id) {
                    ce.primary = ce.id == *ce_id;
                }
                Ok(json!({}))
            }

            _ => Err(TowerError::Api(format!("no route for {method} {path}"))),
        }
    }
}

impl Gateway for InMemoryTower {
    fn request(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<&Value>,
    ) -> Result<Value> {
        self.state
            .borrow_mut()
            .requests
            .push(format!("{method} {path}"));
        self.route(method, path, query, body)
    }

    fn paged_request(&self, method: Method, path: &str, query: Query<'_>) -> Pages<'_> {
        Pages::new(self, method, path, query, self.page_size.get().max(1))
    }
}

/// Fixed stack outputs keyed by stack name.
#[derive(Debug, Default, Clone)]
pub struct StaticStackOutputs {
    stacks: HashMap<String, OutputMap>,
}

impl StaticStackOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stack<K, V>(mut self, stack_name: &str, outputs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut map: OutputMap = outputs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        map.insert(STACK_NAME_KEY.to_string(), stack_name.to_string());
        self.stacks.insert(stack_name.to_string(), map);
        self
    }

    /// A VPC stack with the default output keys.
    pub fn with_vpc(self, stack_name: &str) -> Self {
        self.with_stack(
            stack_name,
            [
                ("VPCId", "vpc-0123456789"),
                ("PrivateSubnet", "subnet-a"),
                ("PrivateSubnet1", "subnet-b"),
                ("PrivateSubnet2", "subnet-c"),
                ("PrivateSubnet3", "subnet-d"),
            ],
        )
    }

    /// A project stack exporting everything the compute environments need.
    pub fn with_project(self, stack_name: &str) -> Self {
        let account = "arn:aws:iam::035458030717";
        self.with_stack(
            stack_name,
            [
                ("TowerScratch".to_string(), format!("{stack_name}-tower-scratch")),
                (
                    "TowerForgeServiceUserAccessKeySecretArn".to_string(),
                    format!("arn:aws:secretsmanager:us-east-1:035458030717:secret:{stack_name}-forge"),
                ),
                ("TowerForgeServiceRoleArn".to_string(), format!("{account}:role/{stack_name}-forge-service")),
                ("TowerForgeBatchWorkJobRoleArn".to_string(), format!("{account}:role/{stack_name}-work-job")),
                ("TowerForgeBatchHeadJobRoleArn".to_string(), format!("{account}:role/{stack_name}-head-job")),
                ("TowerForgeBatchExecutionRoleArn".to_string(), format!("{account}:role/{stack_name}-execution")),
            ],
        )
    }
}

impl StackOutputs for StaticStackOutputs {
    fn get_stack_outputs(&self, stack_name: &str) -> Result<OutputMap> {
        self.stacks
            .get(stack_name)
            .cloned()
            .ok_or_else(|| TowerError::StackOutputs(format!("stack '{stack_name}' was not found")))
    }
}

/// Returns the same access key pair for every secret and counts reads.
#[derive(Debug, Default)]
pub struct StaticSecrets {
    reads: Cell<usize>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }
}

impl SecretStore for StaticSecrets {
    fn get_secret(&self, _secret_id: &str) -> Result<OutputMap> {
        self.reads.set(self.reads.get() + 1);
        Ok(OutputMap::from([
            ("aws_access_key_id".to_string(), "AKIAEXAMPLE".to_string()),
            ("aws_secret_access_key".to_string(), "example-secret".to_string()),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_add_reports_existing_user_name() {
        let tower = InMemoryTower::new();
        let org = tower.seed_organization("Sage Bionetworks");
        tower.seed_member(org, "tess.thyer@sagebase.org");

        let response = tower
            .request(
                Method::Put,
                &format!("/orgs/{org}/members/add"),
                &[],
                Some(&json!({"user": "tess.thyer@sagebase.org"})),
            )
            .unwrap();
        assert_eq!(
            response["message"],
            "User 'tessthyer' is already a member of this organization"
        );
        assert_eq!(tower.creations(), 0);
    }

    #[test]
    fn test_labels_are_paginated() {
        let tower = InMemoryTower::new();
        let org = tower.seed_organization("Org");
        let ws = tower.seed_workspace(org, "ws");
        for n in 0..5 {
            tower
                .request(
                    Method::Post,
                    "/labels",
                    &[("workspaceId", ws.to_string())],
                    Some(&json!({"name": "k", "value": n.to_string(), "resource": true})),
                )
                .unwrap();
        }
        let labels: Vec<Value> = tower
            .paged_request(Method::Get, "/labels", &[("workspaceId", ws.to_string())])
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(labels.len(), 5);
        let listings = tower
            .requests()
            .iter()
            .filter(|r| r.as_str() == "GET /labels")
            .count();
        assert_eq!(listings, 3);
    }

    #[test]
    fn test_busy_compute_env_refuses_deletion() {
        let tower = InMemoryTower::new();
        let org = tower.seed_organization("Org");
        let ws = tower.seed_workspace(org, "ws");
        let ce = tower.seed_compute_env(ws, "ws-spot-v11", "AVAILABLE");
        tower.mark_busy(&ce);

        let response = tower
            .request(
                Method::Delete,
                &format!("/compute-envs/{ce}"),
                &[("workspaceId", ws.to_string())],
                None,
            )
            .unwrap();
        assert!(response["message"].as_str().unwrap().contains("active jobs"));
        assert_eq!(tower.compute_envs(ws).len(), 1);
    }

    #[test]
    fn test_lingering_deletion_disappears_after_listings() {
        let tower = InMemoryTower::new();
        tower.set_deletion_linger(2);
        let org = tower.seed_organization("Org");
        let ws = tower.seed_workspace(org, "ws");
        let ce = tower.seed_compute_env(ws, "ws-spot-v11", "AVAILABLE");
        let query = [("workspaceId", ws.to_string())];

        tower
            .request(Method::Delete, &format!("/compute-envs/{ce}"), &query, None)
            .unwrap();
        let list = |tower: &InMemoryTower| {
            tower
                .request(Method::Get, "/compute-envs", &query, None)
                .unwrap()["computeEnvs"]
                .as_array()
                .unwrap()
                .len()
        };
        assert_eq!(list(&tower), 1);
        assert_eq!(list(&tower), 1);
        assert_eq!(list(&tower), 0);
    }

    #[test]
    fn test_unknown_route_is_an_error() {
        let tower = InMemoryTower::new();
        assert!(tower.request(Method::Get, "/pipelines", &[], None).is_err());
    }
}
