//! # Counter
//!
//! Collects the per repository outcome of a sweep and turns it into the
//! summary printed once every repository has been handled

use crate::{
    platform::{PullRequest, Repository},
    terminal,
};
use indexmap::IndexMap;
use thiserror::Error;

/// Run outcomes the summary needs to recognize by kind rather than by
/// message alone
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("no data was changed")]
    NoChange,

    #[error("the new branch does already exist")]
    BranchExist,
}

/// A repository that completed its run, together with the pull request
/// when one was created
struct RepoSuccess {
    repository: Repository,
    pull_request: Option<PullRequest>,
}

/// Keeps track of succeeded and failed repositories
#[derive(Default)]
pub struct RepoCounter {
    successes: Vec<RepoSuccess>,
    /// Failed repository names grouped by error message, insertion
    /// ordered so the summary is deterministic
    errors: IndexMap<String, Vec<String>>,
}

impl RepoCounter {
    pub fn new() -> RepoCounter {
        RepoCounter::default()
    }

    /// Record a failing repository together with the error that caused it
    pub fn add_error(&mut self, error: &eyre::Report, repository: &Repository) {
        self.errors
            .entry(error.to_string())
            .or_default()
            .push(repository.full_name());
    }

    pub fn add_success(&mut self, repository: &Repository, pull_request: Option<PullRequest>) {
        self.successes.push(RepoSuccess {
            repository: repository.clone(),
            pull_request,
        });
    }

    /// Formatted summary of every repository, failures grouped by their
    /// error message followed by the successful runs
    pub fn info(&self, plain: bool) -> String {
        let mut info = String::new();

        for (message, repositories) in &self.errors {
            info.push_str(&capitalize(message));
            info.push_str(":\n");

            for repository in repositories {
                info.push_str(&format!("  {repository}\n"));
            }
        }

        if !self.successes.is_empty() {
            info.push_str("Repositories with a successful run:\n");

            for success in &self.successes {
                match &success.pull_request {
                    Some(pull_request) => {
                        let link = terminal::link(
                            &pull_request.to_string(),
                            &pull_request.web_url,
                            plain,
                        );
                        info.push_str(&format!("  {link}\n"));
                    }
                    None => {
                        info.push_str(&format!("  {}\n", success.repository.full_name()));
                    }
                }
            }
        }

        info
    }
}

/// Upper case the first character of a message
fn capitalize(value: &str) -> String {
    let mut characters = value.chars();
    match characters.next() {
        Some(first) => first.to_uppercase().chain(characters).collect(),
        None => String::new(),
    }
}
