use std::fs;
use std::net::TcpListener;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

fn converge_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("converge"));
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("CONVERGE_CONFIG")
        .env_remove("CONVERGE_ADDR")
        .env_remove("CONVERGE_LISTEN_ADDR");
    cmd
}

const CONFIG: &str = "\
interval_secs: 30
projects:
  - name: argo-examples
    repository: https://github.com/maycommit/argo-example.git
  - name: billing
    repository: https://example.com/billing.git
    path: ./checkouts/billing
    apply_command: kubectl apply -f .
";

#[test]
fn projects_lists_configured_projects() {
    let home = TempDir::new().expect("home");
    let config = home.path().join("converge.yaml");
    fs::write(&config, CONFIG).expect("write config");

    converge_cmd(home.path())
        .arg("projects")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(contains("2 projects | interval 30s"))
        .stdout(contains("argo-examples"))
        .stdout(contains("(log only)"))
        .stdout(contains("kubectl apply -f ."));
}

#[test]
fn projects_json_resolves_paths_against_the_config_dir() {
    let home = TempDir::new().expect("home");
    let config = home.path().join("converge.yaml");
    fs::write(&config, CONFIG).expect("write config");
    let base = fs::canonicalize(home.path()).expect("canonical home");

    let output = converge_cmd(home.path())
        .args(["projects", "--json", "--config"])
        .arg(&config)
        .output()
        .expect("run converge");
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(rows[0]["name"], "argo-examples");
    assert_eq!(
        rows[0]["path"],
        base.join("tmp/git/argo-examples").display().to_string()
    );
    assert_eq!(
        rows[1]["path"],
        base.join("checkouts/billing").display().to_string()
    );
}

#[test]
fn projects_reads_default_config_under_home() {
    let home = TempDir::new().expect("home");
    let dir = home.path().join(".converge");
    fs::create_dir_all(&dir).expect("config dir");
    fs::write(dir.join("config.yaml"), CONFIG).expect("write config");

    converge_cmd(home.path())
        .arg("projects")
        .assert()
        .success()
        .stdout(contains("billing"));
}

#[test]
fn missing_config_is_reported() {
    let home = TempDir::new().expect("home");

    converge_cmd(home.path())
        .arg("projects")
        .assert()
        .failure()
        .stderr(contains("config not found"));
}

#[test]
fn invalid_config_is_rejected_before_starting() {
    let home = TempDir::new().expect("home");
    let config = home.path().join("converge.yaml");
    fs::write(
        &config,
        "projects:\n  - name: a\n    repository: x\n  - name: a\n    repository: y\n",
    )
    .expect("write config");

    converge_cmd(home.path())
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("duplicate project name 'a'"));
}

#[test]
fn run_rejects_zero_interval_flag() {
    let home = TempDir::new().expect("home");

    converge_cmd(home.path())
        .args(["run", "--interval", "0"])
        .assert()
        .failure()
        .stderr(contains("--interval"));
}

#[test]
fn sync_without_daemon_reports_unreachable() {
    let home = TempDir::new().expect("home");
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").port()
    };

    converge_cmd(home.path())
        .args(["sync", "--addr", &format!("127.0.0.1:{port}")])
        .assert()
        .failure()
        .stderr(contains("could not reach daemon"));
}
