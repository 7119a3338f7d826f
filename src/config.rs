//! # Config
//!
//! The repo-sweep.toml configuration file. Config values act as defaults,
//! explicitly provided command line flags always win

use std::{
    env::current_dir,
    path::{Path, PathBuf},
};

use eyre::{Context, ContextCompat};
use serde::Deserialize;

/// Configuration structure for repo-sweep.toml
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Which platform to talk to and which repositories to target
    pub platform: PlatformConfig,
    /// Defaults for the run command
    pub run: RunConfig,
    /// Repository filtering applied before any work
    pub filters: FilterConfig,
    /// Logging defaults
    pub log: LogConfig,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct PlatformConfig {
    /// Platform provider, github or gitea
    pub provider: Option<String>,

    /// Base URL of the platform API, required for gitea and GitHub
    /// Enterprise installations
    pub base_url: Option<String>,

    /// Personal access token. Prefer the GITHUB_TOKEN / GITEA_TOKEN
    /// environment variable over storing the token in the config file
    pub token: Option<String>,

    /// Organizations to include every repository from
    pub orgs: Vec<String>,

    /// Users to include every repository from
    pub users: Vec<String>,

    /// Explicit repositories in the owner/name form
    pub repos: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RunConfig {
    /// The name of the branch where changes are committed
    pub branch: Option<String>,

    /// The branch the changes will be based on
    pub base_branch: Option<String>,

    pub commit_message: Option<String>,
    pub pr_title: Option<String>,
    pub pr_body: Option<String>,

    /// Usernames of the reviewers to add to created pull requests
    pub reviewers: Vec<String>,

    /// When set, a random subset of this size is picked from the
    /// configured reviewers
    pub max_reviewers: Option<usize>,

    pub author_name: Option<String>,
    pub author_email: Option<String>,

    /// The directory temporary repository clones are placed in
    pub clone_dir: Option<PathBuf>,

    /// Merge types to attempt, in order, when merging pull requests
    pub merge_types: Vec<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct FilterConfig {
    /// Repositories (owner/name) that should be skipped
    pub skip_repos: Vec<String>,

    /// Regular expression repositories must match to be included
    pub include: Option<String>,

    /// Regular expression matching repositories to exclude
    pub exclude: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LogConfig {
    /// trace, debug, info, warn or error
    pub level: Option<String>,

    /// text or json
    pub format: Option<String>,

    /// File the logs should be written to instead of stderr
    pub file: Option<PathBuf>,
}

/// Name for the config file
const CONFIG_FILE_NAME: &str = "repo-sweep.toml";

/// Searches for the nearest configuration file, checks the current
/// directory then parent directories one by one until a config is found.
/// Running without a config file is fine, so not finding one is not an
/// error
pub async fn discover_nearest_config_file() -> eyre::Result<Option<PathBuf>> {
    let mut path: PathBuf = current_dir().context("failed to determine current directory")?;

    loop {
        let config_path = path.join(CONFIG_FILE_NAME);

        if config_path.is_dir() {
            eyre::bail!("expected repo-sweep.toml to be a file but got a directory");
        }

        if config_path.exists() {
            return Ok(Some(config_path));
        }

        let Some(parent) = path.parent() else {
            return Ok(None);
        };

        path = parent.to_path_buf();
    }
}

/// Parse a config file from bytes of the TOML file
fn parse_config_file(file: &[u8]) -> eyre::Result<Config> {
    toml::from_slice(file).context("failed to parse config file")
}

/// Read a TOML config file from the provided `path`
pub async fn read_config_file(path: &Path) -> eyre::Result<Config> {
    let value = tokio::fs::read(path)
        .await
        .context("failed to read config file")?;
    parse_config_file(&value)
}
