//! # Merge
//!
//! Merges every pull request of the feature branch whose status is
//! a success

use crate::platform::{Platform, PullRequestStatus};

pub async fn merge(platform: &Platform, branch: &str) -> eyre::Result<()> {
    let pull_requests = platform.get_pull_requests(branch).await?;

    let mergeable: Vec<_> = pull_requests
        .into_iter()
        .filter(|pull_request| pull_request.status == PullRequestStatus::Success)
        .collect();

    tracing::info!("Merging {} pull requests", mergeable.len());

    for pull_request in mergeable {
        tracing::info!(pr = %pull_request, "Merging");
        platform.merge_pull_request(&pull_request).await?;
    }

    Ok(())
}
