use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

const FAKE_CVS: &str = r#"#!/bin/sh
if [ "$1" = "-d" ] && [ "$3" = "init" ]; then
    mkdir -p "$2/CVSROOT" || exit 2
    exit 0
fi
exit 1
"#;

fn cvsd_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("cvsd"));
    cmd.env("HOME", home)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .env_remove("CVSD_PASSWORD");
    cmd
}

fn fake_cvs(dir: &Path) -> PathBuf {
    let path = dir.join("cvs");
    fs::write(&path, FAKE_CVS).expect("write fake cvs");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
    path
}

fn repo_args<'a>(repo: &'a Path, exe: &'a Path) -> [&'a std::ffi::OsStr; 4] {
    [
        "--repo".as_ref(),
        repo.as_os_str(),
        "--exec".as_ref(),
        exe.as_os_str(),
    ]
}

#[test]
fn init_creates_repository_with_default_user() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let exe = fake_cvs(work.path());
    let repo = work.path().join("repo");

    cvsd_cmd(home.path())
        .arg("init")
        .args(repo_args(&repo, &exe))
        .assert()
        .success()
        .stdout(contains("Repository ready").and(contains("Default user 'User'")));

    assert!(repo.join("CVSROOT").is_dir());
    assert_eq!(
        fs::read_to_string(repo.join("CVSROOT/readers")).expect("readers"),
        "User\n"
    );
}

#[test]
fn init_save_config_lets_later_commands_omit_flags() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let exe = fake_cvs(work.path());
    let repo = work.path().join("repo");

    cvsd_cmd(home.path())
        .arg("init")
        .args(repo_args(&repo, &exe))
        .arg("--save-config")
        .assert()
        .success()
        .stdout(contains("Saved to:"));
    assert!(home.path().join(".cvsd/config.yaml").is_file());

    cvsd_cmd(home.path())
        .args(["passwd", "--user", "carol", "--password", "hunter2"])
        .assert()
        .success();
    assert_eq!(
        fs::read_to_string(repo.join("CVSROOT/writers")).expect("writers"),
        "carol\n"
    );
}

#[test]
fn passwd_replaces_user_and_status_reports_it() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let exe = fake_cvs(work.path());
    let repo = work.path().join("repo");

    cvsd_cmd(home.path())
        .args(["passwd", "--user", "alice", "--password", "s3cret"])
        .args(repo_args(&repo, &exe))
        .assert()
        .success()
        .stdout(contains("'alice' is now the only authorized user"));

    let output = cvsd_cmd(home.path())
        .args(["status", "--json", "--repo"])
        .arg(&repo)
        .output()
        .expect("run status");
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(status["state"], "initialized");
    assert_eq!(status["users"], serde_json::json!(["alice"]));
    assert_eq!(status["readers"], serde_json::json!(["alice"]));
    assert_eq!(status["writers"], serde_json::json!(["alice"]));
}

#[test]
fn passwd_reads_password_from_env() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let exe = fake_cvs(work.path());
    let repo = work.path().join("repo");

    cvsd_cmd(home.path())
        .env("CVSD_PASSWORD", "from-env")
        .args(["passwd", "--user", "dave"])
        .args(repo_args(&repo, &exe))
        .assert()
        .success();

    let passwd = fs::read_to_string(repo.join("CVSROOT/passwd")).expect("passwd");
    let hash = passwd.split(':').nth(1).expect("hash field");
    assert!(pwhash::unix_crypt::verify("from-env", hash));
}

#[test]
fn passwd_reads_password_from_stdin() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let exe = fake_cvs(work.path());
    let repo = work.path().join("repo");

    assert_cmd::Command::from_std(cvsd_cmd(home.path()))
        .args(["passwd", "--user", "erin"])
        .args(repo_args(&repo, &exe))
        .write_stdin("piped-secret\n")
        .assert()
        .success();

    let passwd = fs::read_to_string(repo.join("CVSROOT/passwd")).expect("passwd");
    assert!(passwd.starts_with("erin:"));
    let hash = passwd.split(':').nth(1).expect("hash field");
    assert!(pwhash::unix_crypt::verify("piped-secret", hash));
}

#[test]
fn passwd_rejects_non_ascii_without_touching_files() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let exe = fake_cvs(work.path());
    let repo = work.path().join("repo");

    cvsd_cmd(home.path())
        .args(["passwd", "--user", "zoë", "--password", "pw"])
        .args(repo_args(&repo, &exe))
        .assert()
        .failure()
        .stderr(contains("invalid username"));
    assert!(!repo.exists(), "repository must not be created");
}

#[test]
fn passwd_rejects_overlong_password() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");
    let exe = fake_cvs(work.path());
    let repo = work.path().join("repo");
    let long = "x".repeat(32);

    cvsd_cmd(home.path())
        .args(["passwd", "--user", "alice", "--password", &long])
        .args(repo_args(&repo, &exe))
        .assert()
        .failure()
        .stderr(contains("invalid password"));
    assert!(!repo.exists());
}

#[test]
fn status_of_missing_repository_is_uninitialized() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");

    cvsd_cmd(home.path())
        .args(["status", "--repo"])
        .arg(work.path().join("nowhere"))
        .assert()
        .success()
        .stdout(contains("uninitialized"));
    assert!(!work.path().join("nowhere").exists());
}

#[test]
fn missing_executable_is_reported() {
    let home = TempDir::new().expect("home");
    let work = TempDir::new().expect("work");

    cvsd_cmd(home.path())
        .args(["init", "--repo"])
        .arg(work.path().join("repo"))
        .assert()
        .failure()
        .stderr(contains("--exec"));
}

#[test]
fn unknown_reaping_mode_is_rejected_by_parser() {
    let home = TempDir::new().expect("home");
    cvsd_cmd(home.path())
        .args(["serve", "--reaping", "sometimes"])
        .assert()
        .failure()
        .stderr(contains("unknown reaping mode"));
}
