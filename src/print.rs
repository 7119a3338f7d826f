//! # Print
//!
//! Clone every targeted repository and run the script in it, copying the
//! script output verbatim instead of committing anything

use crate::{
    counter::RepoCounter,
    filter::{RepoFilters, filter_repositories},
    git::Git,
    platform::{Platform, Repository},
    run::create_temp_dir,
    script::Script,
};
use eyre::Context;
use std::path::PathBuf;

pub struct PrintOptions {
    pub script: Script,
    pub token: String,
    pub clone_dir: Option<PathBuf>,
    pub plain_output: bool,
}

/// Run the script against every targeted repository, copying its stdout
/// and stderr to the provided writers and writing the summary to
/// `output` afterwards
pub async fn print(
    platform: &Platform,
    filters: &RepoFilters,
    options: &PrintOptions,
    output: &mut dyn std::io::Write,
    error_output: &mut dyn std::io::Write,
) -> eyre::Result<()> {
    let repositories = platform.get_repositories().await?;
    let repositories = filter_repositories(repositories, filters);

    tracing::info!("Running on {} repositories", repositories.len());

    let mut counter = RepoCounter::new();

    for repository in &repositories {
        match print_single_repo(repository, options, output, error_output).await {
            Ok(()) => counter.add_success(repository, None),
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
async fn print_single_repo(
    repository: &Repository,
    options: &PrintOptions,
    output: &mut dyn std::io::Write,
    error_output: &mut dyn std::io::Write,
) -> eyre::Result<()> {
    tracing::info!("Cloning and running script");

    let temp_dir = create_temp_dir(options.clone_dir.as_deref())?;
    let git = Git::new(temp_dir.path());

    git.clone(
        &repository.url_with_token(&options.token),
        &repository.default_branch,
    )
    .await?;

    options
        .script
        .run_with_output(
            temp_dir.path(),
            &repository.full_name(),
            output,
            error_output,
        )
        .await
}
