//! Immutable provisioner settings handed to the reconciliation engine.
//!
//! Defaults are compiled in; a YAML file passed with `--settings` may
//! override any subset of them and CLI flags override the file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use nftower_core::error::{Result, ResultExt, TowerError};

use crate::identity::ArnPolicy;

pub const DEFAULT_ORGANIZATION: &str = "Sage Bionetworks";
pub const DEFAULT_REGION: &str = "us-east-1";
/// Bump when the compute environment template changes so stale ones are replaced.
pub const DEFAULT_CE_VERSION: &str = "v12";

const INSTANCE_SIZES: [&str; 5] = ["large", "xlarge", "2xlarge", "4xlarge", "8xlarge"];
const INSTANCE_FAMILIES: [&str; 9] = [
    "c6a", "c5a", "c6i", "m5a", "m6a", "m6i", "r5a", "r6a", "r6i",
];

/// x86-64, non-GPU C/M/R instance types up to 32 vCPUs, smallest first.
pub fn default_instance_types() -> Vec<String> {
    INSTANCE_SIZES
        .iter()
        .flat_map(|size| {
            INSTANCE_FAMILIES
                .iter()
                .map(move |family| format!("{family}.{size}"))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VpcSettings {
    pub stack_name: String,
    pub vpc_id_output: String,
    pub subnet_outputs: Vec<String>,
}

impl Default for VpcSettings {
    fn default() -> Self {
        Self {
            stack_name: "nextflow-vpc".to_string(),
            vpc_id_output: "VPCId".to_string(),
            subnet_outputs: vec![
                "PrivateSubnet".to_string(),
                "PrivateSubnet1".to_string(),
                "PrivateSubnet2".to_string(),
                "PrivateSubnet3".to_string(),
            ],
        }
    }
}

/// Batch Forge parameters shared by every compute environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ComputeSettings {
    pub version: String,
    pub instance_types: Vec<String>,
    pub min_cpus: u32,
    pub max_cpus: u32,
    pub head_job_cpus: u32,
    pub head_job_memory_mb: u32,
    pub ebs_block_size: u32,
    pub ebs_boot_size: u32,
    pub cli_path: String,
    pub pre_run_script: String,
    pub ecs_config: String,
}

impl Default for ComputeSettings {
    fn default() -> Self {
        Self {
            version: DEFAULT_CE_VERSION.to_string(),
            instance_types: default_instance_types(),
            min_cpus: 0,
            max_cpus: 1000,
            head_job_cpus: 8,
            head_job_memory_mb: 15000,
            ebs_block_size: 1000,
            ebs_boot_size: 1000,
            cli_path: "/home/ec2-user/miniconda/bin/aws".to_string(),
            pre_run_script: "NXF_OPTS='-Xms7g -Xmx14g'".to_string(),
            ecs_config: [
                "ECS_CONTAINER_STOP_TIMEOUT=10m",
                "ECS_CONTAINER_START_TIMEOUT=10m",
                "ECS_CONTAINER_CREATE_TIMEOUT=10m",
            ]
            .join("\n"),
        }
    }
}

/// How long to wait for stale compute environments to disappear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollSettings {
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_secs: 10,
            timeout_secs: 300,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Full (display) name of the Tower organization.
    pub organization: String,
    pub region: String,
    /// Tower API base URL. Resolved from the environment or Route 53 when unset.
    pub api_endpoint: Option<String>,
    pub route53_stack_name: String,
    pub route53_output: String,
    pub vpc: VpcSettings,
    pub compute: ComputeSettings,
    pub project_tag_key: String,
    pub use_teams: bool,
    pub strict_arns: bool,
    pub deletion_poll: PollSettings,
    pub page_size: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            organization: DEFAULT_ORGANIZATION.to_string(),
            region: DEFAULT_REGION.to_string(),
            api_endpoint: None,
            route53_stack_name: "nextflow-r53-alias-record".to_string(),
            route53_output: "Route53RecordSet".to_string(),
            vpc: VpcSettings::default(),
            compute: ComputeSettings::default(),
            project_tag_key: "Project".to_string(),
            use_teams: false,
            strict_arns: false,
            deletion_poll: PollSettings::default(),
            page_size: 100,
        }
    }
}

impl Settings {
    /// Load settings, starting from the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading settings from: {}", path.display());
        let scope = format!("settings file {}", path.display());
        let contents = fs::read_to_string(path)
            .map_err(TowerError::from)
            .scope(scope.clone())?;
        let settings: Self = serde_yaml_ng::from_str(&contents)
            .map_err(|e| TowerError::Config(e.to_string()))
            .scope(scope.clone())?;
        settings.validate().scope(scope)?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.organization.trim().is_empty() {
            return Err(TowerError::Config("'organization' must not be empty".into()));
        }
        if self.compute.version.trim().is_empty() {
            return Err(TowerError::Config("'compute.version' must not be empty".into()));
        }
        if self.compute.instance_types.is_empty() {
            return Err(TowerError::Config(
                "'compute.instance_types' must list at least one type".into(),
            ));
        }
        if self.page_size == 0 {
            return Err(TowerError::Config("'page_size' must be positive".into()));
        }
        Ok(())
    }

    pub fn arn_policy(&self) -> ArnPolicy {
        ArnPolicy::from_strict(self.strict_arns)
    }
}
