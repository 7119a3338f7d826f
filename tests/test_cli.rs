use assert_cmd::Command;
use tempfile::NamedTempFile;

/// The version flag prints the crate version
#[test]
fn test_version() {
    Command::new(assert_cmd::cargo_bin!())
        .arg("--version")
        .assert()
        .success()
        .stdout(format!("repo-sweep {}\n", env!("CARGO_PKG_VERSION")));
}

/// Without a token flag, config value or environment variable nothing
/// can talk to the platform
#[test]
fn test_missing_token() {
    let empty_dir = tempfile::tempdir().unwrap();

    Command::new(assert_cmd::cargo_bin!())
        .current_dir(empty_dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITEA_TOKEN")
        .args(["status", "--repo", "owner/name"])
        .assert()
        .failure()
        .stderr(predicates::str::contains(
            "either the --token flag or the GITHUB_TOKEN/GITEA_TOKEN environment variable",
        ));
}

/// A run needs either a pull request title or a commit message
#[test]
fn test_run_requires_title_or_commit_message() {
    let empty_dir = tempfile::tempdir().unwrap();

    Command::new(assert_cmd::cargo_bin!())
        .current_dir(empty_dir.path())
        .args([
            "run",
            "some-script",
            "--token",
            "dummy-token",
            "--repo",
            "owner/name",
        ])
        .assert()
        .failure()
        .stderr(predicates::str::contains(
            "pull request title or commit message must be set",
        ));
}

/// Without organizations, users or repositories there is nothing to
/// sweep
#[test]
fn test_no_repositories_targeted() {
    let empty_dir = tempfile::tempdir().unwrap();

    Command::new(assert_cmd::cargo_bin!())
        .current_dir(empty_dir.path())
        .args(["run", "some-script", "--token", "dummy-token", "-m", "msg"])
        .assert()
        .failure()
        .stderr(predicates::str::contains(
            "no repositories are targeted, set --org, --user or --repo",
        ));
}

/// Gitea has no hosted instance, a base URL is mandatory
#[test]
fn test_gitea_requires_base_url() {
    let empty_dir = tempfile::tempdir().unwrap();

    Command::new(assert_cmd::cargo_bin!())
        .current_dir(empty_dir.path())
        .args([
            "close",
            "--platform",
            "gitea",
            "--token",
            "dummy-token",
            "--repo",
            "owner/name",
        ])
        .assert()
        .failure()
        .stderr(predicates::str::contains(
            "--base-url has to be set when using gitea",
        ));
}

/// An invalid repository reference is rejected before any work starts
#[test]
fn test_invalid_repository_reference() {
    let empty_dir = tempfile::tempdir().unwrap();

    Command::new(assert_cmd::cargo_bin!())
        .current_dir(empty_dir.path())
        .args([
            "status",
            "--token",
            "dummy-token",
            "--repo",
            "not-a-reference",
        ])
        .assert()
        .failure()
        .stderr(predicates::str::contains(
            "could not parse repository reference: not-a-reference",
        ));
}

/// Values from the config file are used when the flags are not given
#[test]
fn test_config_file_supplies_defaults() {
    let empty_dir = tempfile::tempdir().unwrap();

    let config = toml::toml! {
        [platform]
        token = "config-token"
        repos = ["owner/name"]
    };

    let config_file = NamedTempFile::new().unwrap();
    std::fs::write(config_file.path(), config.to_string()).unwrap();

    // The token and targets come from the config, the failure is about
    // the missing messages further along
    Command::new(assert_cmd::cargo_bin!())
        .current_dir(empty_dir.path())
        .env_remove("GITHUB_TOKEN")
        .env_remove("GITEA_TOKEN")
        .arg("--config")
        .arg(config_file.path())
        .args(["run", "some-script"])
        .assert()
        .failure()
        .stderr(predicates::str::contains(
            "pull request title or commit message must be set",
        ));
}
