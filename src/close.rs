//! # Close
//!
//! Closes every still open pull request of the feature branch

use crate::platform::{Platform, PullRequestStatus};

pub async fn close(platform: &Platform, branch: &str) -> eyre::Result<()> {
    let pull_requests = platform.get_pull_requests(branch).await?;

    let open: Vec<_> = pull_requests
        .into_iter()
        .filter(|pull_request| {
            pull_request.status != PullRequestStatus::Closed
                && pull_request.status != PullRequestStatus::Merged
        })
        .collect();

    tracing::info!("Closing {} pull requests", open.len());

    for pull_request in open {
        tracing::info!(pr = %pull_request, "Closing");
        platform.close_pull_request(&pull_request).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::close;
    use crate::platform::{
        MockPlatformImpl, Platform, PullRequest, PullRequestStatus,
    };

    fn pull_request(name: &str, number: u64, status: PullRequestStatus) -> PullRequest {
        PullRequest {
            owner: "owner".to_string(),
            repo_name: name.to_string(),
            branch: "repo-sweep-branch".to_string(),
            number,
            web_url: format!("https://example.com/owner/{name}/pull/{number}"),
            status,
        }
    }

    /// Already closed and merged pull requests are left alone
    #[tokio::test]
    async fn test_close_skips_finished() {
        let mut mock = MockPlatformImpl::new();
        mock.expect_get_pull_requests().return_once(|_branch| {
            Ok(vec![
                pull_request("open", 1, PullRequestStatus::Success),
                pull_request("pending", 2, PullRequestStatus::Pending),
                pull_request("closed", 3, PullRequestStatus::Closed),
                pull_request("merged", 4, PullRequestStatus::Merged),
            ])
        });
        mock.expect_close_pull_request()
            .withf(|pull_request| {
                pull_request.repo_name == "open" || pull_request.repo_name == "pending"
            })
            .times(2)
            .returning(|_pull_request| Ok(()));
        let platform = Platform::Mock(mock);

        close(&platform, "repo-sweep-branch").await.unwrap();
    }
}
