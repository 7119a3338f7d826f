//! # Platform
//!
//! Clients for the platforms hosting the repositories. A platform lists
//! the repositories to sweep and manages the pull requests created from
//! the swept changes

use eyre::ContextCompat;
use mockall::automock;
use std::{fmt::Display, str::FromStr};

use crate::platform::{gitea::Gitea, github::Github};

pub mod gitea;
pub mod github;

/// All the information needed about a git repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    /// Owner of the repository, usually a user or organization name
    pub owner: String,
    /// Name of the repository itself
    pub name: String,
    /// HTTPS address the repository can be cloned from
    pub clone_url: String,
    /// Name of the default branch
    pub default_branch: String,
}

impl Repository {
    /// Full id of the repository in the `owner/name` form
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Clone URL with the platform token embedded as https://TOKEN@host/..
    /// so git can authenticate without prompting. Only http(s) URLs can
    /// carry credentials, anything else is returned untouched
    pub fn url_with_token(&self, token: &str) -> String {
        if !self.clone_url.starts_with("http") {
            return self.clone_url.clone();
        }

        self.clone_url
            .replacen("://", &format!("://{token}@"), 1)
    }
}

/// Data needed to create a new pull request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    /// Branch the changes were pushed to
    pub head: String,
    /// Branch the changes should be merged into
    pub base: String,
    /// Usernames of the reviewers to request
    pub reviewers: Vec<String>,
}

/// An existing pull request on the platform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub owner: String,
    pub repo_name: String,
    /// Head branch of the pull request
    pub branch: String,
    pub number: u64,
    /// Address of the pull request in the platform web interface
    pub web_url: String,
    pub status: PullRequestStatus,
}

impl Display for PullRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} #{}", self.owner, self.repo_name, self.number)
    }
}

/// Status of a pull request, including the combined status of the
/// last commit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PullRequestStatus {
    #[default]
    Unknown,
    Success,
    Pending,
    Error,
    Merged,
    Closed,
}

impl Display for PullRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            PullRequestStatus::Unknown => "Unknown",
            PullRequestStatus::Success => "Success",
            PullRequestStatus::Pending => "Pending",
            PullRequestStatus::Error => "Error",
            PullRequestStatus::Merged => "Merged",
            PullRequestStatus::Closed => "Closed",
        })
    }
}

/// Reference to a single repository in the `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReference {
    pub owner: String,
    pub name: String,
}

impl FromStr for RepositoryReference {
    type Err = eyre::Report;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (owner, name) = value
            .split_once('/')
            .filter(|(owner, name)| {
                !owner.is_empty() && !name.is_empty() && !name.contains('/')
            })
            .with_context(|| format!("could not parse repository reference: {value}"))?;

        Ok(RepositoryReference {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

/// Which repositories a platform should operate on
#[derive(Debug, Default, Clone)]
pub struct RepositoryListing {
    /// Organizations to include every repository from
    pub organizations: Vec<String>,
    /// Users to include every repository from
    pub users: Vec<String>,
    /// Explicitly referenced repositories
    pub repositories: Vec<RepositoryReference>,
}

/// The way a pull request is "merged" into the base branch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeType {
    Merge,
    Rebase,
    Squash,
}

impl FromStr for MergeType {
    type Err = eyre::Report;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "merge" => Ok(MergeType::Merge),
            "rebase" => Ok(MergeType::Rebase),
            "squash" => Ok(MergeType::Squash),
            _ => eyre::bail!("not a valid merge type: \"{value}\""),
        }
    }
}

impl MergeType {
    /// Intersection of the configured merge types with the ones a
    /// repository allows. The order of `configured` is preserved
    pub fn intersection(configured: &[MergeType], allowed: &[MergeType]) -> Vec<MergeType> {
        configured
            .iter()
            .filter(|merge_type| allowed.contains(merge_type))
            .copied()
            .collect()
    }
}

/// Parse a list of merge type names
pub fn parse_merge_types(values: &[String]) -> eyre::Result<Vec<MergeType>> {
    values.iter().map(|value| value.parse()).collect()
}

pub enum Platform {
    Github(Github),
    Gitea(Gitea),
    #[cfg(test)]
    Mock(MockPlatformImpl),
}

impl Platform {
    /// Fetch the repositories from all configured sources
    #[tracing::instrument(skip(self))]
    pub async fn get_repositories(&self) -> eyre::Result<Vec<Repository>> {
        match self {
            Platform::Github(platform) => platform.get_repositories().await,
            Platform::Gitea(platform) => platform.get_repositories().await,
            #[cfg(test)]
            Platform::Mock(platform) => platform.get_repositories().await,
        }
    }

    #[tracing::instrument(skip(self, new_pull_request))]
    pub async fn create_pull_request(
        &self,
        repository: &Repository,
        new_pull_request: NewPullRequest,
    ) -> eyre::Result<PullRequest> {
        match self {
            Platform::Github(platform) => {
                platform.create_pull_request(repository, new_pull_request).await
            }
            Platform::Gitea(platform) => {
                platform.create_pull_request(repository, new_pull_request).await
            }
            #[cfg(test)]
            Platform::Mock(platform) => {
                platform.create_pull_request(repository, new_pull_request).await
            }
        }
    }

    /// Find the most recent pull request with `branch` as its head in
    /// every targeted repository
    #[tracing::instrument(skip(self))]
    pub async fn get_pull_requests(&self, branch: &str) -> eyre::Result<Vec<PullRequest>> {
        match self {
            Platform::Github(platform) => platform.get_pull_requests(branch).await,
            Platform::Gitea(platform) => platform.get_pull_requests(branch).await,
            #[cfg(test)]
            Platform::Mock(platform) => platform.get_pull_requests(branch).await,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn merge_pull_request(&self, pull_request: &PullRequest) -> eyre::Result<()> {
        match self {
            Platform::Github(platform) => platform.merge_pull_request(pull_request).await,
            Platform::Gitea(platform) => platform.merge_pull_request(pull_request).await,
            #[cfg(test)]
            Platform::Mock(platform) => platform.merge_pull_request(pull_request).await,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn close_pull_request(&self, pull_request: &PullRequest) -> eyre::Result<()> {
        match self {
            Platform::Github(platform) => platform.close_pull_request(pull_request).await,
            Platform::Gitea(platform) => platform.close_pull_request(pull_request).await,
            #[cfg(test)]
            Platform::Mock(platform) => platform.close_pull_request(pull_request).await,
        }
    }
}

#[automock]
pub trait PlatformImpl {
    async fn get_repositories(&self) -> eyre::Result<Vec<Repository>>;

    async fn create_pull_request(
        &self,
        repository: &Repository,
        new_pull_request: NewPullRequest,
    ) -> eyre::Result<PullRequest>;

    async fn get_pull_requests(&self, branch: &str) -> eyre::Result<Vec<PullRequest>>;

    async fn merge_pull_request(&self, pull_request: &PullRequest) -> eyre::Result<()>;

    async fn close_pull_request(&self, pull_request: &PullRequest) -> eyre::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::{MergeType, Repository, RepositoryReference};

    #[test]
    fn test_parse_repository_reference() {
        let reference: RepositoryReference = "octocat/hello-world".parse().unwrap();
        assert_eq!(reference.owner, "octocat");
        assert_eq!(reference.name, "hello-world");
    }

    #[test]
    fn test_parse_repository_reference_invalid() {
        assert!("octocat".parse::<RepositoryReference>().is_err());
        assert!("octocat/".parse::<RepositoryReference>().is_err());
        assert!("/hello-world".parse::<RepositoryReference>().is_err());
        assert!("a/b/c".parse::<RepositoryReference>().is_err());
    }

    #[test]
    fn test_url_with_token() {
        let repository = Repository {
            owner: "octocat".to_string(),
            name: "hello-world".to_string(),
            clone_url: "https://github.com/octocat/hello-world.git".to_string(),
            default_branch: "main".to_string(),
        };

        assert_eq!(
            repository.url_with_token("secret-token"),
            "https://secret-token@github.com/octocat/hello-world.git"
        );
    }

    /// Non http remotes cannot carry credentials in the URL
    #[test]
    fn test_url_with_token_local_remote() {
        let repository = Repository {
            owner: "octocat".to_string(),
            name: "hello-world".to_string(),
            clone_url: "file:///tmp/hello-world".to_string(),
            default_branch: "main".to_string(),
        };

        assert_eq!(
            repository.url_with_token("secret-token"),
            "file:///tmp/hello-world"
        );
    }

    #[test]
    fn test_parse_merge_type() {
        assert_eq!("merge".parse::<MergeType>().unwrap(), MergeType::Merge);
        assert_eq!("Squash".parse::<MergeType>().unwrap(), MergeType::Squash);
        assert_eq!("REBASE".parse::<MergeType>().unwrap(), MergeType::Rebase);
        assert!("octopus".parse::<MergeType>().is_err());
    }

    /// The intersection keeps the configured order, not the allowed order
    #[test]
    fn test_merge_type_intersection() {
        let configured = [MergeType::Squash, MergeType::Merge, MergeType::Rebase];
        let allowed = [MergeType::Merge, MergeType::Squash];

        assert_eq!(
            MergeType::intersection(&configured, &allowed),
            vec![MergeType::Squash, MergeType::Merge]
        );

        assert!(MergeType::intersection(&configured, &[]).is_empty());
    }
}
