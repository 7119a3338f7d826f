//! # Run
//!
//! The sweep itself: clone every targeted repository, run the changer
//! script in it and turn the resulting changes into a pull request.
//! Repositories are handled one at a time, a failing repository never
//! stops the sweep

use crate::{
    counter::{RepoCounter, RunError},
    filter::{RepoFilters, filter_repositories},
    git::{CommitAuthor, Git},
    platform::{NewPullRequest, Platform, PullRequest, Repository},
    script::Script,
};
use eyre::Context;
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// How a conflict with an already existing feature branch is handled
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictStrategy {
    /// Skip the repository if the branch does already exist
    Skip,
    /// Ignore any existing branch and replace it with the new changes
    Replace,
}

pub struct RunOptions {
    pub script: Script,
    /// Branch the changes are committed to
    pub feature_branch: String,
    /// Branch the changes are based on, the repository default branch
    /// when not set
    pub base_branch: Option<String>,
    pub token: String,
    pub commit_message: String,
    pub pull_request_title: String,
    pub pull_request_body: String,
    pub reviewers: Vec<String>,
    /// When non zero and fewer than the configured reviewers, a random
    /// subset of this size is requested
    pub max_reviewers: usize,
    pub conflict_strategy: ConflictStrategy,
    /// Run without pushing changes or creating pull requests
    pub dry_run: bool,
    /// Push directly to the branch without creating a pull request
    pub skip_pull_request: bool,
    pub commit_author: Option<CommitAuthor>,
    /// Directory the temporary clones are created in
    pub clone_dir: Option<PathBuf>,
    pub plain_output: bool,
}

/// Run the script against every targeted repository, writing the final
/// summary to `output`
pub async fn run(
    platform: &Platform,
    filters: &RepoFilters,
    options: &RunOptions,
    output: &mut dyn std::io::Write,
) -> eyre::Result<()> {
    let repositories = platform.get_repositories().await?;
    let repositories = filter_repositories(repositories, filters);

    tracing::info!("Running on {} repositories", repositories.len());

    let mut counter = RepoCounter::new();

    for repository in &repositories {
        match run_single_repo(platform, repository, options).await {
            Ok(pull_request) => counter.add_success(repository, pull_request),
            Err(error) => {
                tracing::info!(repo = %repository.full_name(), "{error}");
                counter.add_error(&error, repository);
            }
        }
    }

    let info = counter.info(options.plain_output);
    if !info.is_empty() {
        output.write_all(info.as_bytes()).context("failed to write summary")?;
    }

    Ok(())
}

#[tracing::instrument(skip_all, fields(repo = %repository.full_name()))]
async fn run_single_repo(
    platform: &Platform,
    repository: &Repository,
    options: &RunOptions,
) -> eyre::Result<Option<PullRequest>> {
    tracing::info!("Cloning and running script");

    let temp_dir = create_temp_dir(options.clone_dir.as_deref())?;
    let git = Git::new(temp_dir.path());

    let base_branch = options
        .base_branch
        .as_deref()
        .unwrap_or(&repository.default_branch);

    git.clone(&repository.url_with_token(&options.token), base_branch)
        .await?;

    let mut force_push = false;
    if git.branch_exist(&options.feature_branch).await? {
        match options.conflict_strategy {
            ConflictStrategy::Skip => return Err(RunError::BranchExist.into()),
            ConflictStrategy::Replace => {
                tracing::info!("Replacing the existing branch");
                force_push = true;
            }
        }
    }

    git.change_branch(&options.feature_branch).await?;

    options
        .script
        .run(temp_dir.path(), &repository.full_name())
        .await?;

    if !git.changes().await? {
        return Err(RunError::NoChange.into());
    }

    git.commit(options.commit_author.as_ref(), &options.commit_message)
        .await?;

    if options.dry_run {
        tracing::info!("Skipping pushing changes because of dry run");
        return Ok(None);
    }

    git.push(force_push).await?;

    if options.skip_pull_request {
        return Ok(None);
    }

    tracing::info!("Change done, creating pull request");

    let pull_request = platform
        .create_pull_request(
            repository,
            NewPullRequest {
                title: options.pull_request_title.clone(),
                body: options.pull_request_body.clone(),
                head: options.feature_branch.clone(),
                base: base_branch.to_string(),
                reviewers: select_reviewers(&options.reviewers, options.max_reviewers),
            },
        )
        .await?;

    Ok(Some(pull_request))
}

/// Create the temporary clone directory, inside `clone_dir` when one is
/// configured. The directory is removed when the returned handle drops
pub(crate) fn create_temp_dir(clone_dir: Option<&Path>) -> eyre::Result<TempDir> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("repo-sweep-changer-");

    let temp_dir = match clone_dir {
        Some(clone_dir) => {
            let clone_dir = expand_home(clone_dir);
            std::fs::create_dir_all(&clone_dir)
                .context("failed to create the clone directory")?;
            builder.tempdir_in(clone_dir)
        }
        None => builder.tempdir(),
    };

    temp_dir.context("failed to create temporary clone directory")
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &Path) -> PathBuf {
    let Ok(stripped) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match dirs::home_dir() {
        Some(home) => home.join(stripped),
        None => path.to_path_buf(),
    }
}

/// All configured reviewers, or a random subset when more than
/// `max_reviewers` are configured
fn select_reviewers(reviewers: &[String], max_reviewers: usize) -> Vec<String> {
    if max_reviewers == 0 || reviewers.len() <= max_reviewers {
        return reviewers.to_vec();
    }

    let mut rng = rand::thread_rng();
    reviewers
        .choose_multiple(&mut rng, max_reviewers)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{ConflictStrategy, RunOptions, run, select_reviewers};
    use crate::{
        filter::RepoFilters,
        git::CommitAuthor,
        platform::{
            MockPlatformImpl, Platform, PullRequest, PullRequestStatus, Repository,
        },
        script::Script,
    };
    use std::path::Path;

    #[test]
    fn test_select_reviewers() {
        let reviewers: Vec<String> = ["alice", "bob", "carol"]
            .iter()
            .map(ToString::to_string)
            .collect();

        // Zero means everyone
        assert_eq!(select_reviewers(&reviewers, 0), reviewers);
        assert_eq!(select_reviewers(&reviewers, 5), reviewers);

        let subset = select_reviewers(&reviewers, 2);
        assert_eq!(subset.len(), 2);
        assert!(subset.iter().all(|reviewer| reviewers.contains(reviewer)));
    }

    /// Build a bare remote with a single commit on main and return the
    /// repository pointing at it
    async fn seed_remote(remote_dir: &Path) -> Repository {
        let seed_dir = tempfile::tempdir().unwrap();

        run_git(remote_dir, &["init", "--bare", "--initial-branch", "main", "."]).await;
        run_git(seed_dir.path(), &["init", "--initial-branch", "main", "."]).await;

        tokio::fs::write(seed_dir.path().join("README.md"), "I like apple pie\n")
            .await
            .unwrap();

        run_git(seed_dir.path(), &["add", "."]).await;
        run_git(
            seed_dir.path(),
            &[
                "-c",
                "user.name=Seed",
                "-c",
                "user.email=seed@example.com",
                "commit",
                "-m",
                "initial",
            ],
        )
        .await;
        run_git(
            seed_dir.path(),
            &[
                "push",
                &format!("file://{}", remote_dir.display()),
                "HEAD:refs/heads/main",
            ],
        )
        .await;

        Repository {
            owner: "owner".to_string(),
            name: "repo".to_string(),
            clone_url: format!("file://{}", remote_dir.display()),
            default_branch: "main".to_string(),
        }
    }

    async fn run_git(dir: &Path, args: &[&str]) {
        let output = tokio::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .await
            .unwrap();
        assert!(
            output.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
    }

    fn options(script: &str) -> RunOptions {
        RunOptions {
            script: Script::parse(script).unwrap(),
            feature_branch: "repo-sweep-branch".to_string(),
            base_branch: None,
            // file:// remotes ignore the embedded credentials
            token: "token".to_string(),
            commit_message: "Replace apple with orange".to_string(),
            pull_request_title: "Replace apple with orange".to_string(),
            pull_request_body: "Fruit swap".to_string(),
            reviewers: Vec::new(),
            max_reviewers: 0,
            conflict_strategy: ConflictStrategy::Skip,
            dry_run: false,
            skip_pull_request: false,
            commit_author: Some(CommitAuthor {
                name: "Test Author".to_string(),
                email: "author@example.com".to_string(),
            }),
            clone_dir: None,
            plain_output: true,
        }
    }

    /// A full sweep over one repository: the change lands on the feature
    /// branch of the remote and a pull request is created
    #[tokio::test]
    async fn test_run_creates_pull_request() {
        let remote_dir = tempfile::tempdir().unwrap();
        let repository = seed_remote(remote_dir.path()).await;

        let mut mock = MockPlatformImpl::new();
        let listed = vec![repository.clone()];
        mock.expect_get_repositories()
            .return_once(move || Ok(listed));
        mock.expect_create_pull_request()
            .withf(|repository, new_pull_request| {
                repository.full_name() == "owner/repo"
                    && new_pull_request.title == "Replace apple with orange"
                    && new_pull_request.head == "repo-sweep-branch"
                    && new_pull_request.base == "main"
            })
            .return_once(|repository, new_pull_request| {
                Ok(PullRequest {
                    owner: repository.owner.clone(),
                    repo_name: repository.name.clone(),
                    branch: new_pull_request.head,
                    number: 1,
                    web_url: "https://example.com/owner/repo/pull/1".to_string(),
                    status: PullRequestStatus::Unknown,
                })
            });
        let platform = Platform::Mock(mock);

        let mut output = Vec::new();
        run(
            &platform,
            &RepoFilters::default(),
            &options("sh -c \"sed -i 's/apple/orange/' README.md\""),
            &mut output,
        )
        .await
        .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Repositories with a successful run:\n  owner/repo #1\n"
        );

        // The remote feature branch carries the change
        let check_dir = tempfile::tempdir().unwrap();
        run_git(
            check_dir.path(),
            &[
                "clone",
                &format!("file://{}", remote_dir.path().display()),
                "--branch",
                "repo-sweep-branch",
                ".",
            ],
        )
        .await;
        let content = tokio::fs::read_to_string(check_dir.path().join("README.md"))
            .await
            .unwrap();
        assert_eq!(content, "I like orange pie\n");
    }

    /// A script that changes nothing is reported as a no change outcome
    /// and no pull request is created
    #[tokio::test]
    async fn test_run_no_change() {
        let remote_dir = tempfile::tempdir().unwrap();
        let repository = seed_remote(remote_dir.path()).await;

        let mut mock = MockPlatformImpl::new();
        let listed = vec![repository.clone()];
        mock.expect_get_repositories()
            .return_once(move || Ok(listed));
        mock.expect_create_pull_request().never();
        let platform = Platform::Mock(mock);

        let mut output = Vec::new();
        run(
            &platform,
            &RepoFilters::default(),
            &options("sh -c true"),
            &mut output,
        )
        .await
        .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "No data was changed:\n  owner/repo\n"
        );
    }

    /// An existing feature branch skips the repository under the skip
    /// conflict strategy
    #[tokio::test]
    async fn test_run_branch_exists() {
        let remote_dir = tempfile::tempdir().unwrap();
        let repository = seed_remote(remote_dir.path()).await;

        // Pre-create the feature branch on the remote
        let seed_dir = tempfile::tempdir().unwrap();
        run_git(
            seed_dir.path(),
            &[
                "clone",
                &format!("file://{}", remote_dir.path().display()),
                ".",
            ],
        )
        .await;
        run_git(seed_dir.path(), &["checkout", "-b", "repo-sweep-branch"]).await;
        run_git(
            seed_dir.path(),
            &["push", "origin", "repo-sweep-branch"],
        )
        .await;

        let mut mock = MockPlatformImpl::new();
        let listed = vec![repository.clone()];
        mock.expect_get_repositories()
            .return_once(move || Ok(listed));
        mock.expect_create_pull_request().never();
        let platform = Platform::Mock(mock);

        let mut output = Vec::new();
        run(
            &platform,
            &RepoFilters::default(),
            &options("sh -c \"sed -i 's/apple/orange/' README.md\""),
            &mut output,
        )
        .await
        .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "The new branch does already exist:\n  owner/repo\n"
        );
    }

    /// Dry run commits locally but never pushes nor opens a pull request
    #[tokio::test]
    async fn test_run_dry_run() {
        let remote_dir = tempfile::tempdir().unwrap();
        let repository = seed_remote(remote_dir.path()).await;

        let mut mock = MockPlatformImpl::new();
        let listed = vec![repository.clone()];
        mock.expect_get_repositories()
            .return_once(move || Ok(listed));
        mock.expect_create_pull_request().never();
        let platform = Platform::Mock(mock);

        let mut run_options = options("sh -c \"sed -i 's/apple/orange/' README.md\"");
        run_options.dry_run = true;

        let mut output = Vec::new();
        run(&platform, &RepoFilters::default(), &run_options, &mut output)
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Repositories with a successful run:\n  owner/repo\n"
        );

        // The remote must not have gotten the branch
        let git_output = tokio::process::Command::new("git")
            .args(["ls-remote", "-q", "-h", "."])
            .current_dir(remote_dir.path())
            .output()
            .await
            .unwrap();
        let refs = String::from_utf8_lossy(&git_output.stdout).into_owned();
        assert!(!refs.contains("repo-sweep-branch"));
    }

    /// A failing script only fails that repository, the sweep continues
    #[tokio::test]
    async fn test_run_script_failure_does_not_stop_sweep() {
        let first_remote = tempfile::tempdir().unwrap();
        let mut first = seed_remote(first_remote.path()).await;
        first.name = "first".to_string();

        let second_remote = tempfile::tempdir().unwrap();
        let mut second = seed_remote(second_remote.path()).await;
        second.name = "second".to_string();

        let mut mock = MockPlatformImpl::new();
        let listed = vec![first, second];
        mock.expect_get_repositories()
            .return_once(move || Ok(listed));
        mock.expect_create_pull_request()
            .times(1)
            .returning(|repository, new_pull_request| {
                Ok(PullRequest {
                    owner: repository.owner.clone(),
                    repo_name: repository.name.clone(),
                    branch: new_pull_request.head,
                    number: 2,
                    web_url: "https://example.com/owner/second/pull/2".to_string(),
                    status: PullRequestStatus::Unknown,
                })
            });
        let platform = Platform::Mock(mock);

        // Fails in "first", succeeds in "second"
        let script = "sh -c 'if [ \"$REPOSITORY\" = owner/first ]; then exit 1; fi; \
                      sed -i s/apple/orange/ README.md'";

        let mut output = Vec::new();
        run(
            &platform,
            &RepoFilters::default(),
            &options(script),
            &mut output,
        )
        .await
        .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Script exited with 1:\n  owner/first\n\
             Repositories with a successful run:\n  owner/second #2\n"
        );
    }
}
