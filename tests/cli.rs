// ABOUTME: Integration tests for the stagecoach CLI commands.
// ABOUTME: Runs the binary against temporary projects and checks output and exit codes.

mod support;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use support::{PROBE_LIVE, Project, START_LIVE, local_environment, local_yaml};

use stagecoach::deploy::Lease;
use stagecoach::types::{Environment, Version};

fn stagecoach_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("stagecoach"))
}

#[test]
fn help_shows_commands() {
    stagecoach_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("rollback"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("stagecoach.yml");

    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--service", "shop"])
        .assert()
        .success();

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("service: shop"));
    assert!(content.contains("environments:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("stagecoach.yml"), "existing: config").unwrap();

    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn seed_and_bump_without_config() {
    let temp_dir = tempfile::tempdir().unwrap();

    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["seed", "dev", "v1.0.9"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(temp_dir.path().join(".env.dev")).unwrap(),
        "service_version=v1.0.9\n"
    );

    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["seed", "dev", "v2.0.0"])
        .assert()
        .code(2);

    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["bump", "dev", "patch", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1.0.9 -> v1.0.10"));
    assert!(fs::read_to_string(temp_dir.path().join(".env.dev")).unwrap().contains("v1.0.9"));

    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["bump", "dev", "patch"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(temp_dir.path().join(".env.dev.bak")).unwrap(),
        "service_version=v1.0.9\n"
    );
    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["bump", "dev", "auto"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v1.0.10 -> v1.1.0"));
}

#[test]
fn forced_seed_waits_for_the_lease() {
    let temp_dir = tempfile::tempdir().unwrap();
    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["seed", "dev", "v1.0.9"])
        .assert()
        .success();

    let held = Lease::acquire(&temp_dir.path().join(".stagecoach"), Environment::Dev, false).unwrap();
    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["seed", "dev", "v2.0.0", "--force"])
        .assert()
        .code(2);
    assert!(fs::read_to_string(temp_dir.path().join(".env.dev")).unwrap().contains("v1.0.9"));

    drop(held);
    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["seed", "dev", "v2.0.0", "--force"])
        .assert()
        .success();
    assert!(fs::read_to_string(temp_dir.path().join(".env.dev")).unwrap().contains("v2.0.0"));
}

#[test]
fn bump_unseeded_environment_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["bump", "prod", "minor"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("seed"));
}

#[test]
fn invalid_arguments_are_rejected() {
    stagecoach_cmd().args(["deploy", "qa", "v1.0.0"]).assert().code(2);
    stagecoach_cmd().args(["seed", "dev", "v1.x.0"]).assert().code(2);
    stagecoach_cmd()
        .args(["deploy", "dev", "v1.0.0", "--increment", "patch"])
        .assert()
        .code(2);
}

#[test]
fn deploy_without_config_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    stagecoach_cmd()
        .current_dir(temp_dir.path())
        .args(["deploy", "dev", "--increment", "patch"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("configuration file not found"));
}

#[test]
fn deploy_success_exits_zero() {
    let project = Project::new(&local_yaml(START_LIVE, PROBE_LIVE, ""));
    project.seed(Environment::Dev, Version::new(0, 3, 1));

    stagecoach_cmd()
        .current_dir(project.path())
        .args(["deploy", "dev", "-i", "minor"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v0.4.0"));

    assert!(project.live(Environment::Dev).contains("v0.4.0"));
}

#[test]
fn rolled_back_deploy_exits_one() {
    let project = Project::new(&local_yaml(START_LIVE, "false", ""));
    project.seed(Environment::Dev, Version::new(0, 3, 1));

    stagecoach_cmd()
        .current_dir(project.path())
        .args(["deploy", "dev", "v0.3.2"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("manual intervention"));
}

#[test]
fn unapproved_deploy_exits_two() {
    let extra = local_environment(Environment::Prod, "    approval: true\n");
    let project = Project::new(&local_yaml(START_LIVE, PROBE_LIVE, &extra));
    project.seed(Environment::Prod, Version::new(1, 0, 0));

    stagecoach_cmd()
        .current_dir(project.path())
        .args(["deploy", "prod", "v1.0.1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("approval"));

    stagecoach_cmd()
        .current_dir(project.path())
        .args(["deploy", "prod", "v1.0.1", "--approve"])
        .assert()
        .success();
}

#[test]
fn explicit_config_path() {
    let project = Project::new(&local_yaml(START_LIVE, PROBE_LIVE, ""));
    project.seed(Environment::Dev, Version::new(1, 0, 0));
    let elsewhere = tempfile::tempdir().unwrap();

    stagecoach_cmd()
        .current_dir(elsewhere.path())
        .arg("--config")
        .arg(project.path().join("stagecoach.yml"))
        .args(["status", "dev"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version:  v1.0.0"));
}

#[test]
fn status_json_output() {
    let project = Project::new(&local_yaml(START_LIVE, PROBE_LIVE, ""));
    project.seed(Environment::Dev, Version::new(1, 0, 0));

    let output = stagecoach_cmd()
        .current_dir(project.path())
        .args(["status", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let line = String::from_utf8(output).unwrap();
    let event: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
    assert_eq!(event["event"], "result");
    assert_eq!(event["data"][0]["environment"], "dev");
    assert_eq!(event["data"][0]["version"], "v1.0.0");
    assert!(event["data"][0]["lease"].is_null());
}

#[test]
fn rollback_without_snapshot_fails() {
    let project = Project::new(&local_yaml(START_LIVE, PROBE_LIVE, ""));
    project.seed(Environment::Dev, Version::new(1, 0, 0));

    stagecoach_cmd()
        .current_dir(project.path())
        .args(["rollback", "dev"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("snapshot"));
}
