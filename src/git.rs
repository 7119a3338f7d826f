//! # Git
//!
//! Git operations executed by running the `git` binary inside the
//! per repository clone directory

use eyre::Context;
use regex::Regex;
use std::{
    path::{Path, PathBuf},
    process::Output,
    sync::LazyLock,
};
use tokio::process::Command;

/// Matches the message of `error:` and `fatal:` lines in git stderr
static GIT_ERROR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|\n)(error|fatal): (.+)").expect("git error regex is valid")
});

/// Author and committer identity used when committing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitAuthor {
    pub name: String,
    pub email: String,
}

/// Git working within a single (temporary) directory
pub struct Git {
    directory: PathBuf,
}

impl Git {
    pub fn new(directory: impl Into<PathBuf>) -> Git {
        Git {
            directory: directory.into(),
        }
    }

    /// Run a git command, returning its stdout. A failing command becomes
    /// an error carrying the `error:`/`fatal:` message scraped from
    /// stderr when one is present
    async fn run(&self, command: &mut Command) -> eyre::Result<String> {
        let output: Output = command
            .current_dir(&self.directory)
            .output()
            .await
            .context("failed to run git, is it installed?")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);

            if let Some(captures) = GIT_ERROR_REGEX.captures(&stderr) {
                eyre::bail!("{}", &captures[3]);
            }

            eyre::bail!(
                "git command exited with {} ({})",
                output.status.code().unwrap_or(-1),
                stderr
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Clone `url` into the working directory, limited to `base_branch`
    pub async fn clone(&self, url: &str, base_branch: &str) -> eyre::Result<()> {
        self.run(Command::new("git").args([
            "clone",
            url,
            "--branch",
            base_branch,
            "--single-branch",
            ".",
        ]))
        .await?;

        Ok(())
    }

    /// Create and check out the feature branch
    pub async fn change_branch(&self, branch: &str) -> eyre::Result<()> {
        self.run(Command::new("git").args(["checkout", "-b", branch]))
            .await?;

        Ok(())
    }

    /// Whether any changes have been made in the working directory
    pub async fn changes(&self) -> eyre::Result<bool> {
        let stdout = self
            .run(Command::new("git").args(["status", "-s"]))
            .await?;

        Ok(!stdout.is_empty())
    }

    /// Stage and commit all changes. The optional author overrides both
    /// the author and the committer of the commit
    pub async fn commit(
        &self,
        author: Option<&CommitAuthor>,
        message: &str,
    ) -> eyre::Result<()> {
        self.run(Command::new("git").args(["add", "."])).await?;

        let mut command = Command::new("git");
        command.args(["commit", "--no-verify", "-m", message]);

        if let Some(author) = author {
            command
                .env("GIT_AUTHOR_NAME", &author.name)
                .env("GIT_AUTHOR_EMAIL", &author.email)
                .env("GIT_COMMITTER_NAME", &author.name)
                .env("GIT_COMMITTER_EMAIL", &author.email);
        }

        self.run(&mut command).await?;

        self.log_diff().await?;

        Ok(())
    }

    /// Log the diff of the latest commit at debug level
    async fn log_diff(&self) -> eyre::Result<()> {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return Ok(());
        }

        let diff = self
            .run(Command::new("git").args(["diff", "HEAD~1"]))
            .await?;

        tracing::debug!("{diff}");

        Ok(())
    }

    /// Whether `branch` already exists on the origin remote
    pub async fn branch_exist(&self, branch: &str) -> eyre::Result<bool> {
        let stdout = self
            .run(Command::new("git").args(["ls-remote", "-q", "-h", "origin"]))
            .await?;

        Ok(stdout.contains(&format!("\trefs/heads/{branch}\n")))
    }

    /// Push the committed changes to the origin remote
    pub async fn push(&self, force: bool) -> eyre::Result<()> {
        let mut command = Command::new("git");
        command.args(["push", "--no-verify", "origin"]);

        if force {
            command.arg("--force");
        }

        command.arg("HEAD");

        self.run(&mut command).await?;

        Ok(())
    }

    /// Path of the directory the instance works within
    pub fn directory(&self) -> &Path {
        &self.directory
    }
}
