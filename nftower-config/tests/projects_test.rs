use std::fs;
use std::path::Path;

use nftower_config::{Projects, Role, Settings};
use nftower_core::error::TowerError;
use tempfile::TempDir;

const MAINTAINER_ARN: &str =
    "arn:aws:sts::563295687221:assumed-role/AWSReservedSSO_Developer_baa6fed639faf5e7/tess.thyer@sagebase.org";
const VIEWER_ARN: &str =
    "arn:aws:sts::563295687221:assumed-role/AWSReservedSSO_Viewer_19d3ce703c9acf2e/bruno.grande@sagebase.org";
const ROLE_ONLY_ARN: &str =
    "arn:aws:iam::035458030717:role/aws-reserved/sso.amazonaws.com/AWSReservedSSO_Administrator_580e9f32ac55c4e7";

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn demo_descriptor(stack_name: &str) -> String {
    format!(
        r#"template:
  path: tower-project.j2
stack_name: {stack_name}
dependencies:
  - common/nextflow-vpc.yaml
parameters:
  S3ReadWriteAccessArns:
    - {MAINTAINER_ARN}
  S3ReadOnlyAccessArns:
    - {VIEWER_ARN}
  VpcId: !stack_output_external nextflow-vpc::VPCId
stack_tags:
  CostCenter: NIH-ITCR / 101600
  Department: !rcmd "echo IBC"
"#
    )
}

#[test]
fn test_load_directory_of_descriptors() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "prod/demo-project.yaml", &demo_descriptor("demo-project"));
    write(dir.path(), "prod/other-project.yaml", &demo_descriptor("other-project"));
    write(dir.path(), "prod/nextflow-vpc.yaml", "template:\n  path: vpc.j2\n");

    let projects = Projects::load(dir.path(), &Settings::default()).unwrap();
    assert_eq!(projects.len(), 2);

    let names: Vec<&str> = projects.iter().map(|p| p.stack_name.as_str()).collect();
    assert_eq!(names, vec!["demo-project", "other-project"]);

    let demo = projects.get("demo-project").unwrap();
    let users: Vec<(&str, Role)> = demo
        .users
        .list_users()
        .map(|(email, _, role)| (email, role))
        .collect();
    assert_eq!(
        users,
        vec![
            ("tess.thyer@sagebase.org", Role::Maintain),
            ("bruno.grande@sagebase.org", Role::View),
        ]
    );

    assert_eq!(demo.tags["CostCenter"], "101600");
    assert_eq!(demo.tags["Project"], "demo-project");
    assert!(!demo.tags.contains_key("Department"));
    assert!(demo
        .source
        .as_ref()
        .unwrap()
        .ends_with("prod/demo-project.yaml"));
}

#[test]
fn test_invalid_descriptor_fails_the_load() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "demo-project.yaml", &demo_descriptor("demo-project"));
    write(
        dir.path(),
        "broken-project.yaml",
        "template:\n  path: bucket.j2\nstack_name: broken-project\nparameters: {}\n",
    );

    let err = Projects::load(dir.path(), &Settings::default()).unwrap_err();
    assert!(matches!(err.root(), TowerError::Config(_)));
    assert!(err.to_string().contains("broken-project is invalid"));
}

#[test]
fn test_duplicate_stack_names_fail_the_load() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a/demo-project.yaml", &demo_descriptor("demo-project"));
    write(dir.path(), "b/demo-project.yaml", &demo_descriptor("demo-project"));

    let err = Projects::load(dir.path(), &Settings::default()).unwrap_err();
    assert!(err.to_string().contains("more than one project file"));
}

#[test]
fn test_strict_arns_reject_role_arn() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "demo-project.yaml",
        &format!(
            "template:\n  path: tower-project.j2\nstack_name: demo-project\nparameters:\n  S3ReadOnlyAccessArns:\n    - {ROLE_ONLY_ARN}\n"
        ),
    );

    let lenient = Projects::load(dir.path(), &Settings::default()).unwrap();
    assert!(lenient.get("demo-project").unwrap().users.is_empty());

    let strict = Settings {
        strict_arns: true,
        ..Settings::default()
    };
    let err = Projects::load(dir.path(), &strict).unwrap_err();
    assert!(matches!(err.root(), TowerError::Validation(_)));
}

#[test]
fn test_empty_directory_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let projects = Projects::load(dir.path(), &Settings::default()).unwrap();
    assert!(projects.is_empty());
}
