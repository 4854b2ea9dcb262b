//! Batch Forge compute environment requests.
//!
//! Building the request is a pure function of the project stack outputs,
//! the shared VPC outputs, the label ids and the compute settings. Nothing
//! here talks to Tower or AWS.

use std::fmt;

use serde_json::{json, Value};

use nftower_config::settings::{ComputeSettings, VpcSettings};
use nftower_config::Settings;
use nftower_core::error::Result;
use nftower_gateway::{require_output, OutputMap};

pub const PLATFORM: &str = "aws-batch";
pub const SCRATCH_BUCKET_OUTPUT: &str = "TowerScratch";
pub const WORK_JOB_ROLE_OUTPUT: &str = "TowerForgeBatchWorkJobRoleArn";
pub const HEAD_JOB_ROLE_OUTPUT: &str = "TowerForgeBatchHeadJobRoleArn";
pub const EXECUTION_ROLE_OUTPUT: &str = "TowerForgeBatchExecutionRoleArn";

/// EC2 pricing model of a compute environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PricingModel {
    Spot,
    OnDemand,
}

impl PricingModel {
    /// Creation order; the first one becomes the workspace's primary environment.
    pub const ALL: [PricingModel; 2] = [PricingModel::Spot, PricingModel::OnDemand];

    /// Infix used in compute environment names.
    pub fn name_tag(&self) -> &'static str {
        match self {
            PricingModel::Spot => "spot",
            PricingModel::OnDemand => "ondemand",
        }
    }

    /// Value of `forge.type` in the request.
    pub fn forge_type(&self) -> &'static str {
        match self {
            PricingModel::Spot => "SPOT",
            PricingModel::OnDemand => "EC2",
        }
    }

    /// SPOT prefers instance types less likely to be interrupted; on-demand
    /// packs jobs onto the smallest instances that fit.
    pub fn alloc_strategy(&self) -> &'static str {
        match self {
            PricingModel::Spot => "SPOT_CAPACITY_OPTIMIZED",
            PricingModel::OnDemand => "BEST_FIT",
        }
    }
}

impl fmt::Display for PricingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.forge_type())
    }
}

/// `<stack>-spot-<version>` or `<stack>-ondemand-<version>`.
pub fn compute_env_name(stack_name: &str, model: PricingModel, version: &str) -> String {
    format!("{}-{}-{}", stack_name, model.name_tag(), version)
}

/// Per-environment inputs that vary between projects.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentInputs<'a> {
    pub stack_name: &'a str,
    pub stack_outputs: &'a OutputMap,
    pub vpc_outputs: &'a OutputMap,
    pub credentials_id: &'a str,
    pub label_ids: &'a [u64],
}

#[derive(Debug, Clone)]
pub struct ComputeEnvironmentPolicy<'a> {
    pub region: &'a str,
    pub compute: &'a ComputeSettings,
    pub vpc: &'a VpcSettings,
}

impl<'a> ComputeEnvironmentPolicy<'a> {
    pub fn new(settings: &'a Settings) -> Self {
        Self {
            region: &settings.region,
            compute: &settings.compute,
            vpc: &settings.vpc,
        }
    }

    pub fn version(&self) -> &str {
        &self.compute.version
    }

    pub fn name(&self, stack_name: &str, model: PricingModel) -> String {
        compute_env_name(stack_name, model, &self.compute.version)
    }

    /// Whether an existing environment belongs to the current template version.
    pub fn is_current(&self, compute_env_name: &str) -> bool {
        compute_env_name.ends_with(&format!("-{}", self.compute.version))
    }

    /// Full creation request for one environment.
    pub fn request(&self, inputs: &EnvironmentInputs<'_>, model: PricingModel) -> Result<Value> {
        let stack = inputs.stack_outputs;
        let subnets = self
            .vpc
            .subnet_outputs
            .iter()
            .map(|key| require_output(inputs.vpc_outputs, key))
            .collect::<Result<Vec<&str>>>()?;
        let vpc_id = require_output(inputs.vpc_outputs, &self.vpc.vpc_id_output)?;
        let scratch = require_output(stack, SCRATCH_BUCKET_OUTPUT)?;
        let compute = self.compute;

        Ok(json!({
            "labelIds": inputs.label_ids,
            "computeEnv": {
                "name": self.name(inputs.stack_name, model),
                "platform": PLATFORM,
                "credentialsId": inputs.credentials_id,
                "config": {
                    "cliPath": compute.cli_path,
                    "computeJobRole": require_output(stack, WORK_JOB_ROLE_OUTPUT)?,
                    "configMode": "Batch Forge",
                    "credentials": null,
                    "environment": null,
                    "executionRole": require_output(stack, EXECUTION_ROLE_OUTPUT)?,
                    "fusion2Enabled": false,
                    "headJobCpus": compute.head_job_cpus,
                    "headJobMemoryMb": compute.head_job_memory_mb,
                    "headJobRole": require_output(stack, HEAD_JOB_ROLE_OUTPUT)?,
                    "logGroup": null,
                    "nvnmeStorageEnabled": false,
                    "postRunScript": null,
                    "preRunScript": compute.pre_run_script,
                    "region": self.region,
                    "resourceLabelIds": inputs.label_ids,
                    "waveEnabled": true,
                    "workDir": format!("s3://{scratch}/work"),
                    "forge": {
                        "allocStrategy": model.alloc_strategy(),
                        "allowBuckets": [],
                        "containerRegIds": null,
                        "disposeOnDeletion": true,
                        "dragenEnabled": null,
                        "ebsAutoScale": true,
                        "ebsBlockSize": compute.ebs_block_size,
                        "ebsBootSize": compute.ebs_boot_size,
                        "ec2KeyPair": null,
                        "ecsConfig": compute.ecs_config.trim(),
                        "efsCreate": false,
                        "gpuEnabled": false,
                        "imageId": null,
                        "instanceTypes": compute.instance_types,
                        "maxCpus": compute.max_cpus,
                        "minCpus": compute.min_cpus,
                        "securityGroups": [],
                        "subnets": subnets,
                        "type": model.forge_type(),
                        "vpcId": vpc_id
                    }
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nftower_core::error::TowerError;
    use nftower_gateway::mock::StaticStackOutputs;
    use nftower_gateway::StackOutputs;

    fn outputs() -> (OutputMap, OutputMap) {
        let stacks = StaticStackOutputs::new()
            .with_project("foo-project")
            .with_vpc("nextflow-vpc");
        (
            stacks.get_stack_outputs("foo-project").unwrap(),
            stacks.get_stack_outputs("nextflow-vpc").unwrap(),
        )
    }

    #[test]
    fn test_names_carry_model_and_version() {
        let settings = Settings::default();
        let policy = ComputeEnvironmentPolicy::new(&settings);
        assert_eq!(policy.name("foo-project", PricingModel::Spot), "foo-project-spot-v12");
        assert_eq!(
            policy.name("foo-project", PricingModel::OnDemand),
            "foo-project-ondemand-v12"
        );
        assert!(policy.is_current("foo-project-spot-v12"));
        assert!(!policy.is_current("foo-project-spot-v11"));
        assert!(!policy.is_current("foo-project-spot-v112"));
    }

    #[test]
    fn test_spot_request() {
        let settings = Settings::default();
        let policy = ComputeEnvironmentPolicy::new(&settings);
        let (stack, vpc) = outputs();
        let inputs = EnvironmentInputs {
            stack_name: "foo-project",
            stack_outputs: &stack,
            vpc_outputs: &vpc,
            credentials_id: "cred1",
            label_ids: &[4, 5],
        };

        let request = policy.request(&inputs, PricingModel::Spot).unwrap();
        let env = &request["computeEnv"];
        assert_eq!(request["labelIds"], json!([4, 5]));
        assert_eq!(env["name"], "foo-project-spot-v12");
        assert_eq!(env["platform"], "aws-batch");
        assert_eq!(env["credentialsId"], "cred1");
        assert_eq!(env["config"]["workDir"], "s3://foo-project-tower-scratch/work");
        assert_eq!(env["config"]["region"], "us-east-1");
        assert_eq!(env["config"]["headJobCpus"], 8);
        assert_eq!(env["config"]["headJobMemoryMb"], 15000);
        assert_eq!(env["config"]["resourceLabelIds"], json!([4, 5]));
        assert_eq!(
            env["config"]["headJobRole"],
            "arn:aws:iam::035458030717:role/foo-project-head-job"
        );

        let forge = &env["config"]["forge"];
        assert_eq!(forge["type"], "SPOT");
        assert_eq!(forge["allocStrategy"], "SPOT_CAPACITY_OPTIMIZED");
        assert_eq!(forge["vpcId"], "vpc-0123456789");
        assert_eq!(
            forge["subnets"],
            json!(["subnet-a", "subnet-b", "subnet-c", "subnet-d"])
        );
        assert_eq!(forge["maxCpus"], 1000);
        assert_eq!(forge["minCpus"], 0);
        assert_eq!(forge["disposeOnDeletion"], true);
        assert_eq!(forge["instanceTypes"].as_array().unwrap().len(), 45);
        assert!(forge["ecsConfig"]
            .as_str()
            .unwrap()
            .starts_with("ECS_CONTAINER_STOP_TIMEOUT=10m"));
    }

    #[test]
    fn test_on_demand_request() {
        let settings = Settings::default();
        let policy = ComputeEnvironmentPolicy::new(&settings);
        let (stack, vpc) = outputs();
        let inputs = EnvironmentInputs {
            stack_name: "foo-project",
            stack_outputs: &stack,
            vpc_outputs: &vpc,
            credentials_id: "cred1",
            label_ids: &[],
        };

        let request = policy.request(&inputs, PricingModel::OnDemand).unwrap();
        let forge = &request["computeEnv"]["config"]["forge"];
        assert_eq!(forge["type"], "EC2");
        assert_eq!(forge["allocStrategy"], "BEST_FIT");
        assert_eq!(request["labelIds"], json!([]));
    }

    #[test]
    fn test_missing_output_is_reported() {
        let settings = Settings::default();
        let policy = ComputeEnvironmentPolicy::new(&settings);
        let (_, vpc) = outputs();
        let stack = OutputMap::new();
        let inputs = EnvironmentInputs {
            stack_name: "foo-project",
            stack_outputs: &stack,
            vpc_outputs: &vpc,
            credentials_id: "cred1",
            label_ids: &[],
        };

        let err = policy.request(&inputs, PricingModel::Spot).unwrap_err();
        assert!(matches!(err, TowerError::StackOutputs(_)));
        assert!(err.to_string().contains("TowerScratch"));
    }
}
