// Standard library imports
use std::fs;
use std::path::{Path, PathBuf};

// External crate imports
use serde_yaml_ng::Value;
use tracing::debug;
use walkdir::WalkDir;

// Internal imports
use crate::descriptor::ProjectDescriptor;
use nftower_core::error::{Result, ResultExt, TowerError};

/// Suffix identifying Tower project descriptors among other Sceptre configs.
pub const DESCRIPTOR_SUFFIX: &str = "-project.yaml";

/// Finds and parses project descriptors under a configuration directory.
#[derive(Debug, Clone)]
pub struct DescriptorLoader {
    root: PathBuf,
}

impl DescriptorLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All `*-project.yaml` files below the root, recursively, sorted by path.
    pub fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Err(TowerError::Config(format!(
                "Project directory '{}' does not exist or is not a directory",
                self.root.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry.map_err(|e| TowerError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_descriptor = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(DESCRIPTOR_SUFFIX));
            if is_descriptor {
                debug!("Discovered project descriptor: {}", entry.path().display());
                paths.push(entry.into_path());
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Parse one descriptor. Sceptre resolver tags (`!stack_output`, `!ssm`, ...)
    /// are replaced by null since they can only be resolved by Sceptre itself.
    pub fn load_file(&self, path: &Path) -> Result<ProjectDescriptor> {
        let scope = format!("loading {}", path.display());
        let contents = fs::read_to_string(path)
            .map_err(TowerError::from)
            .scope(scope.clone())?;
        let mut value: Value = serde_yaml_ng::from_str(&contents)
            .map_err(TowerError::from)
            .scope(scope.clone())?;
        strip_tags(&mut value);
        if value.is_null() {
            return Ok(ProjectDescriptor::default());
        }
        serde_yaml_ng::from_value(value)
            .map_err(TowerError::from)
            .scope(scope)
    }
}

/// Replace every tagged node with null, recursively.
pub fn strip_tags(value: &mut Value) {
    match value {
        Value::Tagged(_) => *value = Value::Null,
        Value::Sequence(items) => items.iter_mut().for_each(strip_tags),
        Value::Mapping(map) => map.values_mut().for_each(strip_tags),
        _ => {}
    }
}
