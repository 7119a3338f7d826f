//! # Gitea
//!
//! Gitea REST client. Gitea is always self hosted so a base URL is
//! required to create the client

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

/// Page size used when listing repositories
const PAGE_SIZE: usize = 100;

pub struct Gitea {
    http: Client,
    base_url: String,
    listing: RepositoryListing,
    merge_types: Vec<MergeType>,
}

impl Gitea {
    pub fn new(
        token: &str,
        base_url: String,
        listing: RepositoryListing,
        merge_types: Vec<MergeType>,
    ) -> eyre::Result<Gitea> {
        let mut headers = HeaderMap::new();

        let mut auth = HeaderValue::from_str(&format!("token {token}"))
            .context("platform token is not a valid header value")?;
        auth.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth);

        let http = Client::builder()
            .user_agent(concat!("repo-sweep/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()
            .context("failed to create HTTP client")?;

        let base_url = format!("{}/api/v1", base_url.trim_end_matches('/'));

        Ok(Gitea {
            http,
            base_url,
            listing,
            merge_types,
        })
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> eyre::Result<T> {
        let url = format!("{}{path}", self.base_url);

        tracing::debug!(%method, %url, "sending Gitea request");

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
            eyre::bail!("Gitea responded to {url} with {status}: {body}");
        }

        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read Gitea response from {url}"))?;

        // Deletes and merges respond with an empty body
        if body.is_empty() {
            return serde_json::from_str("null")
                .context("failed to decode empty Gitea response");
        }

        serde_json::from_str(&body)
            .with_context(|| format!("failed to decode Gitea response from {url}"))
    }

    pub async fn get_repositories(&self) -> eyre::Result<Vec<Repository>> {
        let repositories = self.list_repositories().await?;

        Ok(repositories
            .into_values()
            .filter(|repository| !repository.archived)
            .map(GiteaRepository::into_repository)
            .collect())
    }

    /// List repositories from every configured source, de-duplicated by
    /// full name and deterministically ordered
    async fn list_repositories(&self) -> eyre::Result<IndexMap<String, GiteaRepository>> {
        let mut repositories: Vec<GiteaRepository> = Vec::new();

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

        repositories.sort_by_key(|repository| repository.id);

        Ok(repositories
            .into_iter()
            .map(|repository| (repository.full_name.clone(), repository))
            .collect())
    }

    async fn list_paginated(&self, path: &str) -> eyre::Result<Vec<GiteaRepository>> {
        let mut repositories = Vec::new();

        for page in 1.. {
            let page_path = format!("{path}?limit={PAGE_SIZE}&page={page}");
            let page_repositories: Vec<GiteaRepository> =
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
    ) -> eyre::Result<GiteaRepository> {
        let path = format!("/repos/{}/{}", reference.owner, reference.name);
        self.request(Method::GET, &path, None).await
    }

    pub async fn create_pull_request(
        &self,
        repository: &Repository,
        new_pull_request: NewPullRequest,
    ) -> eyre::Result<PullRequest> {
        let path = format!("/repos/{}/{}/pulls", repository.owner, repository.name);
        let pull_request: GiteaPullRequest = self
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
            let _: serde_json::Value = self
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

            // The Gitea API cannot filter pull requests by head branch,
            // the most recently updated ones are scanned instead
            let path = format!("/repos/{owner}/{name}/pulls?state=all&sort=recentupdate");
            let recent: Vec<GiteaPullRequest> = self.request(Method::GET, &path, None).await?;

            let Some(pull_request) = recent
                .into_iter()
                .find(|pull_request| pull_request.head.r#ref == branch)
            else {
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
        pull_request: &GiteaPullRequest,
    ) -> eyre::Result<PullRequestStatus> {
        if pull_request.merged {
            return Ok(PullRequestStatus::Merged);
        }

        if pull_request.state == "closed" {
            return Ok(PullRequestStatus::Closed);
        }

        let path = format!(
            "/repos/{owner}/{name}/commits/{}/status",
            pull_request.head.sha
        );
        let combined: GiteaCombinedStatus = self.request(Method::GET, &path, None).await?;

        // No commit statuses at all counts as a success
        if combined.statuses.is_empty() {
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
        // Fetch the repository to learn which merge types it permits
        let path = format!("/repos/{}/{}", pull_request.owner, pull_request.repo_name);
        let repository: GiteaRepository = self.request(Method::GET, &path, None).await?;

        let merge_types = MergeType::intersection(&self.merge_types, &repository.merge_types());
        let merge_type = merge_types
            .first()
            .ok_or_else(|| eyre::eyre!("none of the configured merge types was permitted"))?;

        let style = match merge_type {
            MergeType::Merge => "merge",
            MergeType::Rebase => "rebase",
            MergeType::Squash => "squash",
        };

        let path = format!(
            "/repos/{}/{}/pulls/{}/merge",
            pull_request.owner, pull_request.repo_name, pull_request.number
        );
        let _: serde_json::Value = self
            .request(Method::POST, &path, Some(json!({ "Do": style })))
            .await
            .with_context(|| format!("could not merge {pull_request}"))?;

        self.delete_branch(pull_request).await
    }

    pub async fn close_pull_request(&self, pull_request: &PullRequest) -> eyre::Result<()> {
        let path = format!(
            "/repos/{}/{}/pulls/{}",
            pull_request.owner, pull_request.repo_name, pull_request.number
        );
        let _: GiteaPullRequest = self
            .request(Method::PATCH, &path, Some(json!({ "state": "closed" })))
            .await
            .with_context(|| format!("could not close {pull_request}"))?;

        self.delete_branch(pull_request).await
    }

    async fn delete_branch(&self, pull_request: &PullRequest) -> eyre::Result<()> {
        let path = format!(
            "/repos/{}/{}/branches/{}",
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
struct GiteaRepository {
    id: u64,
    name: String,
    full_name: String,
    owner: GiteaUser,
    clone_url: String,
    default_branch: String,
    #[serde(default)]
    archived: bool,
    allow_merge_commits: Option<bool>,
    allow_rebase: Option<bool>,
    allow_squash_merge: Option<bool>,
}

impl GiteaRepository {
    fn into_repository(self) -> Repository {
        Repository {
            owner: self.owner.login,
            name: self.name,
            clone_url: self.clone_url,
            default_branch: self.default_branch,
        }
    }

    fn merge_types(&self) -> Vec<MergeType> {
        let mut merge_types = Vec::new();
        if self.allow_merge_commits.unwrap_or(true) {
            merge_types.push(MergeType::Merge);
        }
        if self.allow_rebase.unwrap_or(true) {
            merge_types.push(MergeType::Rebase);
        }
        if self.allow_squash_merge.unwrap_or(true) {
            merge_types.push(MergeType::Squash);
        }
        merge_types
    }
}

#[derive(Deserialize)]
struct GiteaUser {
    login: String,
}

#[derive(Deserialize)]
struct GiteaPullRequest {
    number: u64,
    html_url: String,
    #[serde(default)]
    merged: bool,
    #[serde(default)]
    state: String,
    head: GiteaBranch,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct GiteaBranch {
    r#ref: String,
    sha: String,
}

#[derive(Deserialize)]
struct GiteaCombinedStatus {
    #[serde(default)]
    state: String,
    #[serde(default)]
    statuses: Vec<serde_json::Value>,
}
