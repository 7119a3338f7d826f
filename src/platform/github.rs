//! # GitHub
//!
//! GitHub REST client, works against github.com and GitHub Enterprise
//! installations through a custom base URL

use crate::platform::{
    MergeType, NewPullRequest, PullRequest, PullRequestStatus, Repository, RepositoryListing,
    RepositoryReference,
};
use eyre::Context;
use indexmap::IndexMap;
use reqwest::{
    Client, Method,
    header::{HeaderMap, HeaderValue},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::json;

/// Default address of the GitHub REST API
const DEFAULT_BASE_URL: &str = "https://api.github.com";

/// Page size used when listing repositories
const PAGE_SIZE: usize = 100;

pub struct Github {
    http: Client,
    base_url: String,
    listing: RepositoryListing,
    merge_types: Vec<MergeType>,
}

impl Github {
    pub fn new(
        token: &str,
        base_url: Option<String>,
        listing: RepositoryListing,
        merge_types: Vec<MergeType>,
    ) -> eyre::Result<Github> {
        let mut headers = HeaderMap::new();

        let mut auth = HeaderValue::from_str(&format!("token {token}"))
            .context("platform token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );

        let http = Client::builder()
            .user_agent(concat!("repo-sweep/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("failed to create HTTP client")?;

        let base_url = base_url
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Github {
            http,
            base_url,
            listing,
            merge_types,
        })
    }

    /// Send a request and decode the JSON response, requests that come
    /// back with a non success status become errors carrying the
    /// response body
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> eyre::Result<T> {
        let url = format!("{}{path}", self.base_url);

        tracing::debug!(%method, %url, "sending GitHub request");

        let mut request = self.http.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("failed to send request to {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            eyre::bail!("GitHub responded to {url} with {status}: {body}");
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read GitHub response from {url}"))?;

        // Deletes and merges respond with an empty body
        if body.is_empty() {
            return serde_json::from_str("null")
                .context("failed to decode empty GitHub response");
        }

        serde_json::from_str(&body)
            .with_context(|| format!("failed to decode GitHub response from {url}"))
    }

    pub async fn get_repositories(&self) -> eyre::Result<Vec<Repository>> {
        let repositories = self.list_repositories().await?;

        Ok(repositories
            .into_values()
            // Archived and disabled repositories cannot take pull
            // requests, repositories we cannot push to are no use either
            .filter(|repository| {
                !repository.archived
                    && !repository.disabled
                    && repository.permissions.as_ref().is_none_or(|permissions| {
                        permissions.pull && permissions.push
                    })
            })
            .map(GithubRepository::into_repository)
            .collect())
    }

    /// List repositories from every configured source, de-duplicated by
    /// full name and ordered by creation time
    async fn list_repositories(&self) -> eyre::Result<IndexMap<String, GithubRepository>> {
        let mut repositories: Vec<GithubRepository> = Vec::new();

        for organization in &self.listing.organizations {
            let path = format!("/orgs/{organization}/repos");
            repositories.extend(self.list_paginated(&path).await?);
        }

        for user in &self.listing.users {
            let path = format!("/users/{user}/repos");
            repositories.extend(self.list_paginated(&path).await?);
        }

        for reference in &self.listing.repositories {
            repositories.push(self.get_repository(reference).await?);
        }

        repositories.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(repositories
            .into_iter()
            .map(|repository| (repository.full_name.clone(), repository))
            .collect())
    }

    async fn list_paginated(&self, path: &str) -> eyre::Result<Vec<GithubRepository>> {
        let mut repositories = Vec::new();

        for page in 1.. {
            let page_path = format!("{path}?per_page={PAGE_SIZE}&page={page}");
            let page_repositories: Vec<GithubRepository> =
                self.request(Method::GET, &page_path, None).await?;

            let last_page = page_repositories.len() < PAGE_SIZE;
            repositories.extend(page_repositories);

            if last_page {
                break;
            }
        }

        Ok(repositories)
    }

    async fn get_repository(
        &self,
        reference: &RepositoryReference,
    ) -> eyre::Result<GithubRepository> {
        let path = format!("/repos/{}/{}", reference.owner, reference.name);
        self.request(Method::GET, &path, None).await
    }

    pub async fn create_pull_request(
        &self,
        repository: &Repository,
        new_pull_request: NewPullRequest,
    ) -> eyre::Result<PullRequest> {
        let path = format!("/repos/{}/{}/pulls", repository.owner, repository.name);
        let pull_request: GithubPullRequest = self
            .request(
                Method::POST,
                &path,
                Some(json!({
                    "title": new_pull_request.title,
                    "body": new_pull_request.body,
                    "head": new_pull_request.head,
                    "base": new_pull_request.base,
                })),
            )
            .await
            .context("could not create pull request")?;

        if !new_pull_request.reviewers.is_empty() {
            let path = format!(
                "/repos/{}/{}/pulls/{}/requested_reviewers",
                repository.owner, repository.name, pull_request.number
            );
            let _: GithubPullRequest = self
                .request(
                    Method::POST,
                    &path,
                    Some(json!({ "reviewers": new_pull_request.reviewers })),
                )
                .await
                .context("could not add reviewers to pull request")?;
        }

        Ok(PullRequest {
            owner: repository.owner.clone(),
            repo_name: repository.name.clone(),
            branch: new_pull_request.head,
            number: pull_request.number,
            web_url: pull_request.html_url,
            status: PullRequestStatus::Unknown,
        })
    }

    pub async fn get_pull_requests(&self, branch: &str) -> eyre::Result<Vec<PullRequest>> {
        let repositories = self.list_repositories().await?;

        let mut pull_requests = Vec::new();
        for repository in repositories.values() {
            let owner = &repository.owner.login;
            let name = &repository.name;

            tracing::debug!(repo = %repository.full_name, "fetching latest pull request");

            // Only the most recent pull request for the branch is relevant
            let path = format!(
                "/repos/{owner}/{name}/pulls?head={owner}:{branch}&state=all&direction=desc&per_page=1"
            );
            let matching: Vec<GithubPullRequest> = self.request(Method::GET, &path, None).await?;

            let Some(pull_request) = matching.into_iter().next() else {
                continue;
            };

            let status = self.pull_request_status(owner, name, &pull_request).await?;

            pull_requests.push(PullRequest {
                owner: owner.clone(),
                repo_name: name.clone(),
                branch: pull_request.head.r#ref,
                number: pull_request.number,
                web_url: pull_request.html_url,
                status,
            });
        }

        Ok(pull_requests)
    }

    async fn pull_request_status(
        &self,
        owner: &str,
        name: &str,
        pull_request: &GithubPullRequest,
    ) -> eyre::Result<PullRequestStatus> {
        if pull_request.merged_at.is_some() {
            return Ok(PullRequestStatus::Merged);
        }

        if pull_request.closed_at.is_some() {
            return Ok(PullRequestStatus::Closed);
        }

        tracing::debug!("fetching the combined status of the pull request");

        let path = format!(
            "/repos/{owner}/{name}/commits/{}/status",
            pull_request.head.sha
        );
        let combined: GithubCombinedStatus = self.request(Method::GET, &path, None).await?;

        // A repository without any commit statuses counts as a success
        if combined.total_count == 0 {
            return Ok(PullRequestStatus::Success);
        }

        Ok(match combined.state.as_str() {
            "pending" => PullRequestStatus::Pending,
            "success" => PullRequestStatus::Success,
            "failure" | "error" => PullRequestStatus::Error,
            _ => PullRequestStatus::Unknown,
        })
    }

    pub async fn merge_pull_request(&self, pull_request: &PullRequest) -> eyre::Result<()> {
        // The repository has to be fetched again since the allowed merge
        // types are not included when listing repositories
        let path = format!("/repos/{}/{}", pull_request.owner, pull_request.repo_name);
        let repository: GithubRepository = self.request(Method::GET, &path, None).await?;

        let merge_types = MergeType::intersection(&self.merge_types, &repository.merge_types());
        let merge_type = merge_types
            .first()
            .ok_or_else(|| eyre::eyre!("none of the configured merge types was permitted"))?;

        let merge_method = match merge_type {
            MergeType::Merge => "merge",
            MergeType::Rebase => "rebase",
            MergeType::Squash => "squash",
        };

        let path = format!(
            "/repos/{}/{}/pulls/{}/merge",
            pull_request.owner, pull_request.repo_name, pull_request.number
        );
        let _: serde_json::Value = self
            .request(
                Method::PUT,
                &path,
                Some(json!({ "merge_method": merge_method })),
            )
            .await
            .with_context(|| format!("could not merge {pull_request}"))?;

        self.delete_branch(pull_request).await
    }

    pub async fn close_pull_request(&self, pull_request: &PullRequest) -> eyre::Result<()> {
        let path = format!(
            "/repos/{}/{}/pulls/{}",
            pull_request.owner, pull_request.repo_name, pull_request.number
        );
        let _: GithubPullRequest = self
            .request(Method::PATCH, &path, Some(json!({ "state": "closed" })))
            .await
            .with_context(|| format!("could not close {pull_request}"))?;

        self.delete_branch(pull_request).await
    }

    async fn delete_branch(&self, pull_request: &PullRequest) -> eyre::Result<()> {
        let path = format!(
            "/repos/{}/{}/git/refs/heads/{}",
            pull_request.owner, pull_request.repo_name, pull_request.branch
        );
        let _: serde_json::Value = self
            .request(Method::DELETE, &path, None)
            .await
            .with_context(|| {
                format!("could not delete the head branch of {pull_request}")
            })?;

        Ok(())
    }
}

#[derive(Deserialize)]
struct GithubRepository {
    name: String,
    full_name: String,
    owner: GithubUser,
    clone_url: String,
    default_branch: String,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    disabled: bool,
    permissions: Option<GithubPermissions>,
    created_at: Option<String>,
    allow_merge_commit: Option<bool>,
    allow_rebase_merge: Option<bool>,
    allow_squash_merge: Option<bool>,
}

impl GithubRepository {
    fn into_repository(self) -> Repository {
        Repository {
            owner: self.owner.login,
            name: self.name,
            clone_url: self.clone_url,
            default_branch: self.default_branch,
        }
    }

    /// The merge types the repository allows, only available when the
    /// repository was fetched directly
    fn merge_types(&self) -> Vec<MergeType> {
        let mut merge_types = Vec::new();
        if self.allow_merge_commit.unwrap_or(true) {
            merge_types.push(MergeType::Merge);
        }
        if self.allow_rebase_merge.unwrap_or(true) {
            merge_types.push(MergeType::Rebase);
        }
        if self.allow_squash_merge.unwrap_or(true) {
            merge_types.push(MergeType::Squash);
        }
        merge_types
    }
}

#[derive(Deserialize)]
struct GithubUser {
    login: String,
}

#[derive(Deserialize)]
struct GithubPermissions {
    #[serde(default)]
    pull: bool,
    #[serde(default)]
    push: bool,
}

#[derive(Deserialize)]
struct GithubPullRequest {
    number: u64,
    html_url: String,
    #[serde(default)]
    merged_at: Option<String>,
    #[serde(default)]
    closed_at: Option<String>,
    head: GithubBranch,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GithubBranch {
    r#ref: String,
    sha: String,
}

#[derive(Deserialize)]
struct GithubCombinedStatus {
    state: String,
    total_count: u64,
}
