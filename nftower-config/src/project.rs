use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use nftower_core::error::{Result, ResultExt, TowerError};

use crate::descriptor::ProjectDescriptor;
use crate::loader::DescriptorLoader;
use crate::settings::Settings;
use crate::tags::{derive_tags, Tags};
use crate::users::Users;

/// Desired state of one Tower project. Built once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    pub stack_name: String,
    pub users: Users,
    pub tags: Tags,
    /// Descriptor the project was read from, if any.
    pub source: Option<PathBuf>,
}

impl Project {
    pub fn new(stack_name: impl Into<String>, users: Users, tags: Tags) -> Self {
        Self {
            stack_name: stack_name.into(),
            users,
            tags,
            source: None,
        }
    }

    /// Validate a descriptor and derive its users and tags.
    pub fn from_descriptor(
        descriptor: &ProjectDescriptor,
        source: &Path,
        settings: &Settings,
    ) -> Result<Self> {
        let stack_name = descriptor.validate(&source.display().to_string())?;
        let users = descriptor.users(settings.arn_policy())?;
        let tags = derive_tags(
            stack_name,
            &descriptor.string_tags(),
            &settings.project_tag_key,
        );
        Ok(Self {
            stack_name: stack_name.to_string(),
            users,
            tags,
            source: Some(source.to_path_buf()),
        })
    }

    /// Prefix shared by the project's team names: the stack name without `-project`.
    pub fn team_prefix(&self) -> &str {
        self.stack_name
            .strip_suffix("-project")
            .unwrap_or(&self.stack_name)
    }
}

/// All projects of one configuration directory, in descriptor path order.
#[derive(Debug, Clone, Default)]
pub struct Projects {
    projects: Vec<Project>,
}

impl Projects {
    /// Discover, validate and convert every descriptor under `dir`.
    ///
    /// Any invalid descriptor fails the whole load so nothing is reconciled
    /// from a half-read configuration.
    pub fn load(dir: &Path, settings: &Settings) -> Result<Self> {
        let loader = DescriptorLoader::new(dir);
        let mut projects = Vec::new();
        for path in loader.discover()? {
            let descriptor = loader.load_file(&path)?;
            let project = Project::from_descriptor(&descriptor, &path, settings)?;
            debug!(
                stack = %project.stack_name,
                users = project.users.len(),
                tags = project.tags.len(),
                "Loaded project descriptor"
            );
            projects.push(project);
        }
        info!("Loaded {} project(s) from {}", projects.len(), dir.display());
        Self::from_projects(projects).scope(format!("loading {}", dir.display()))
    }

    /// Wrap already-built projects, rejecting duplicate stack names.
    pub fn from_projects(projects: Vec<Project>) -> Result<Self> {
        let mut seen = HashSet::new();
        for project in &projects {
            if !seen.insert(project.stack_name.as_str()) {
                return Err(TowerError::Config(format!(
                    "Stack '{}' is described by more than one project file",
                    project.stack_name
                )));
            }
        }
        Ok(Self { projects })
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Project> {
        self.projects.iter()
    }

    pub fn get(&self, stack_name: &str) -> Option<&Project> {
        self.projects.iter().find(|p| p.stack_name == stack_name)
    }

    pub fn len(&self) -> usize {
        self.projects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }
}

impl<'a> IntoIterator for &'a Projects {
    type Item = &'a Project;
    type IntoIter = std::slice::Iter<'a, Project>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
