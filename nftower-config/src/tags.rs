//! Resource tags attached to a project's compute environments.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use nftower_core::sanitize_tag;

/// Tag whose value is reduced to its last path segment.
pub const COST_CENTER_KEY: &str = "CostCenter";

/// Sanitized tags, sorted by key.
pub type Tags = BTreeMap<String, String>;

/// Copy the descriptor's `stack_tags`, add `<project_tag_key>=<stack_name>`
/// and sanitize every key and value.
///
/// ```
/// use indexmap::IndexMap;
/// use nftower_config::tags::derive_tags;
///
/// let mut stack_tags = IndexMap::new();
/// stack_tags.insert("CostCenter".to_string(), "NIH-ITCR / 101600".to_string());
/// let tags = derive_tags("foo-project", &stack_tags, "Project");
/// assert_eq!(tags["CostCenter"], "101600");
/// assert_eq!(tags["Project"], "foo-project");
/// ```
pub fn derive_tags(
    stack_name: &str,
    stack_tags: &IndexMap<String, String>,
    project_tag_key: &str,
) -> Tags {
    let mut raw: IndexMap<String, String> = stack_tags.clone();
    raw.insert(project_tag_key.to_string(), stack_name.to_string());

    if let Some(cost_center) = raw.get_mut(COST_CENTER_KEY) {
        let last = cost_center.rsplit('/').next().unwrap_or_default().trim();
        *cost_center = last.to_string();
    }

    raw.into_iter()
        .map(|(key, value)| (sanitize_tag(&key), sanitize_tag(&value)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_project_tag_is_added() {
        let derived = derive_tags("demo-project", &IndexMap::new(), "Project");
        assert_eq!(derived.len(), 1);
        assert_eq!(derived["Project"], "demo-project");
    }

    #[test]
    fn test_project_tag_key_is_configurable() {
        let derived = derive_tags("demo-project", &IndexMap::new(), "Stack");
        assert_eq!(derived["Stack"], "demo-project");
        assert!(!derived.contains_key("Project"));
    }

    #[test]
    fn test_cost_center_keeps_last_segment() {
        let derived = derive_tags(
            "demo-project",
            &tags(&[("CostCenter", "dept/program-42")]),
            "Project",
        );
        assert_eq!(derived["CostCenter"], "program-42");
    }

    #[test]
    fn test_cost_center_without_slash_is_sanitized() {
        let derived = derive_tags(
            "demo-project",
            &tags(&[("CostCenter", "No Program")]),
            "Project",
        );
        assert_eq!(derived["CostCenter"], "No_Program");
    }

    #[test]
    fn test_keys_and_values_are_sanitized() {
        let derived = derive_tags(
            "demo-project",
            &tags(&[("Cost Center", "program/ABC 123"), ("Owner", "a.b@x.org")]),
            "Project",
        );
        assert_eq!(derived["Cost_Center"], "program_ABC_123");
        assert_eq!(derived["Owner"], "a_b_x_org");
    }

    #[test]
    fn test_descriptor_project_tag_is_overridden_by_stack_name() {
        let derived = derive_tags(
            "demo-project",
            &tags(&[("Project", "something-else")]),
            "Project",
        );
        assert_eq!(derived["Project"], "demo-project");
    }
}
