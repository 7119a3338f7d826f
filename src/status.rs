//! # Status
//!
//! Prints the status of every pull request opened from the feature
//! branch

use crate::{platform::Platform, terminal};
use eyre::Context;

/// Write `owner/repo #N: Status` for every pull request of the feature
/// branch
pub async fn status(
    platform: &Platform,
    branch: &str,
    output: &mut dyn std::io::Write,
    plain: bool,
) -> eyre::Result<()> {
    let pull_requests = platform.get_pull_requests(branch).await?;

    for pull_request in pull_requests {
        let link = terminal::link(&pull_request.to_string(), &pull_request.web_url, plain);
        writeln!(output, "{link}: {}", pull_request.status)
            .context("failed to write status output")?;
    }

    Ok(())
}
