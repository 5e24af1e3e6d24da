//! The `imgvals` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use imgvals_cli::test_utils::{ManifestFixture, ProjectFixture, TestGit};

/// `imgvals values ...` isolated from the user's config, cache, and environment.
fn imgvals(project: &ProjectFixture, scratch: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("imgvals").unwrap();
    cmd.current_dir(project.path())
        .env("IMGVALS_CONFIG", scratch.path().join("config.toml"))
        .env("IMGVALS_CACHE_DIR", scratch.path().join("cache"))
        .env_remove("IMGVALS_REPO")
        .env_remove("IMGVALS_ENV")
        .env_remove("IMGVALS_NAMESPACE")
        .env_remove("IMGVALS_STUB_TAGS")
        .env_remove("IMGVALS_USE_CUSTOM_TAG")
        .env_remove("IMGVALS_MANIFEST_PATH")
        .env_remove("RUST_LOG")
        .arg("values");
    cmd
}

fn git_project(fixture: &ManifestFixture) -> Option<(ProjectFixture, String)> {
    if !TestGit::available() {
        eprintln!("git not available, skipping");
        return None;
    }
    let project = ProjectFixture::create(fixture).unwrap();
    let head = TestGit::new(project.path()).init_with_commit().unwrap();
    Some((project, head))
}

#[test]
fn test_stub_values_in_git_repository() {
    let Some((project, head)) = git_project(&ManifestFixture::web_and_worker()) else {
        return;
    };
    let scratch = TempDir::new().unwrap();

    imgvals(&project, &scratch)
        .args(["--stub-tags", "--env", "production"])
        .assert()
        .success()
        .stdout(predicate::str::contains("project: demo"))
        .stdout(predicate::str::contains("namespace: demo-production"))
        .stdout(predicate::str::contains("env: production"))
        .stdout(predicate::str::contains("repository: stub/repository"))
        .stdout(predicate::str::contains("tag: TAG"))
        .stdout(predicate::str::contains("image: stub/repository:TAG"))
        .stdout(predicate::str::contains(format!("commit_hash: {head}")));
}

#[test]
fn test_stub_tags_from_environment() {
    let Some((project, _)) = git_project(&ManifestFixture::single_image()) else {
        return;
    };
    let scratch = TempDir::new().unwrap();

    imgvals(&project, &scratch)
        .env("IMGVALS_STUB_TAGS", "true")
        .assert()
        .success()
        .stdout(predicate::str::contains("stub/repository"));
}

#[test]
fn test_stub_output_is_stable() {
    let Some((project, _)) = git_project(&ManifestFixture::web_and_worker()) else {
        return;
    };
    let scratch = TempDir::new().unwrap();

    let first = imgvals(&project, &scratch).arg("--stub-tags").output().unwrap();
    let second = imgvals(&project, &scratch).arg("--stub-tags").output().unwrap();
    assert!(first.status.success());
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn test_unknown_image_fails_with_empty_stdout() {
    let project = ProjectFixture::create(&ManifestFixture::web_and_worker()).unwrap();
    let scratch = TempDir::new().unwrap();

    imgvals(&project, &scratch)
        .args(["web", "missing", "--stub-tags"])
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Image 'missing' is not defined"));
}

#[test]
fn test_missing_repository_is_reported() {
    let project = ProjectFixture::create(&ManifestFixture::single_image()).unwrap();
    let scratch = TempDir::new().unwrap();

    imgvals(&project, &scratch)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Repository address is required"))
        .stderr(predicate::str::contains("--stub-tags"));
}

#[test]
fn test_missing_manifest_is_reported() {
    let dir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();

    Command::cargo_bin("imgvals")
        .unwrap()
        .current_dir(dir.path())
        .env("IMGVALS_CONFIG", scratch.path().join("config.toml"))
        .env_remove("IMGVALS_MANIFEST_PATH")
        .args(["values", "--stub-tags"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("imgvals.toml not found"));
}

#[test]
fn test_invalid_manifest_is_reported() {
    let project = ProjectFixture::create(&ManifestFixture::invalid_syntax()).unwrap();
    let scratch = TempDir::new().unwrap();

    imgvals(&project, &scratch)
        .arg("--stub-tags")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid project configuration"));
}
