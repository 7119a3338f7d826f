use clap::{Parser, Subcommand, ValueEnum};
use eyre::{Context, ContextCompat};
use regex::Regex;
use repo_sweep::{
    close::close,
    config::{Config, discover_nearest_config_file, read_config_file},
    filter::RepoFilters,
    git::CommitAuthor,
    logging::{CensorItem, LogFormat, LogLevel, LogOptions, init_logging},
    merge::merge,
    platform::{
        Platform, RepositoryListing, RepositoryReference, gitea::Gitea, github::Github,
        parse_merge_types,
    },
    print::{PrintOptions, print},
    run::{ConflictStrategy, RunOptions, run},
    script::Script,
    status::status,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional custom path to the repo-sweep.toml configuration file. By
    /// default repo-sweep.toml is searched for in each parent directory.
    /// Config values are defaults, explicit flags win
    #[arg(long)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(clap::Args, Clone)]
pub struct LogArgs {
    /// The level of logging that should be made
    #[arg(short = 'L', long)]
    log_level: Option<LogLevel>,

    /// The formatting of the logs
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// The file where all logs should be printed to instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Don't use any terminal formatting when printing the output
    #[arg(long, default_value_t = false)]
    plain_output: bool,
}

/// The platform hosting the repositories
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PlatformKind {
    Github,
    Gitea,
}

#[derive(clap::Args, Clone)]
pub struct PlatformArgs {
    /// The platform that is used (defaults to github)
    #[arg(long)]
    platform: Option<PlatformKind>,

    /// The personal access token for the platform. Can also be set
    /// through the GITHUB_TOKEN / GITEA_TOKEN environment variable
    #[arg(short = 'T', long)]
    token: Option<String>,

    /// Base URL of the platform API. Required for gitea and GitHub
    /// Enterprise installations
    #[arg(long)]
    base_url: Option<String>,

    /// The name of an organization, all repositories owned by it are
    /// targeted. May be given multiple times
    #[arg(short = 'O', long = "org")]
    orgs: Vec<String>,

    /// The name of a user, all repositories owned by them are targeted.
    /// May be given multiple times
    #[arg(short = 'U', long = "user")]
    users: Vec<String>,

    /// The name of a single repository in the owner/name form. May be
    /// given multiple times
    #[arg(short = 'R', long = "repo")]
    repos: Vec<String>,
}

#[derive(clap::Args, Clone)]
pub struct FilterArgs {
    /// Repository (owner/name) that should be skipped. May be given
    /// multiple times
    #[arg(long = "skip-repo")]
    skip_repos: Vec<String>,

    /// Only repositories matching the regular expression are included
    #[arg(long)]
    repo_include: Option<String>,

    /// Repositories matching the regular expression are excluded
    #[arg(long)]
    repo_exclude: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clone multiple repositories, run a script in each of them, and
    /// create pull requests with the changes made
    Run {
        /// The script or program to run in each repository
        script: String,

        #[command(flatten)]
        platform: PlatformArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// The name of the branch where changes are committed
        #[arg(short = 'B', long)]
        branch: Option<String>,

        /// The branch which the changes will be based on. Defaults to
        /// the default branch of each repository
        #[arg(long)]
        base_branch: Option<String>,

        /// The title of the PR. Will default to the first line of the
        /// commit message if none is set
        #[arg(short = 't', long)]
        pr_title: Option<String>,

        /// The body of the PR. Will default to everything but the first
        /// line of the commit message if none is set
        #[arg(short = 'b', long)]
        pr_body: Option<String>,

        /// The commit message. Will default to title + body if none is
        /// set
        #[arg(short = 'm', long)]
        commit_message: Option<String>,

        /// The username of a reviewer to be added on the pull request.
        /// May be given multiple times
        #[arg(short = 'r', long = "reviewers")]
        reviewers: Vec<String>,

        /// If this value is set, reviewers will be randomized
        #[arg(short = 'M', long)]
        max_reviewers: Option<usize>,

        /// What to do when the feature branch already exists on a
        /// repository
        #[arg(long, value_enum, default_value_t = ConflictStrategy::Skip)]
        conflict_strategy: ConflictStrategy,

        /// Skip pull request and directly push to the branch
        #[arg(long, default_value_t = false)]
        skip_pr: bool,

        /// Run without pushing changes or creating pull requests
        #[arg(short = 'd', long, default_value_t = false)]
        dry_run: bool,

        /// Name of the committer. If not set, the global git config
        /// setting will be used
        #[arg(long)]
        author_name: Option<String>,

        /// Email of the committer. If not set, the global git config
        /// setting will be used
        #[arg(long)]
        author_email: Option<String>,

        /// The directory where repositories are cloned
        #[arg(long)]
        clone_dir: Option<PathBuf>,

        /// The file that the summary should be written to. "-" means
        /// stdout
        #[arg(short = 'o', long, default_value = "-")]
        output: String,
    },

    /// Clone multiple repositories, run a script in each of them, and
    /// print the output of each run
    Print {
        /// The script or program to run in each repository
        script: String,

        #[command(flatten)]
        platform: PlatformArgs,

        #[command(flatten)]
        filter: FilterArgs,

        /// The directory where repositories are cloned
        #[arg(long)]
        clone_dir: Option<PathBuf>,

        /// The file that the script output should be written to. "-"
        /// means stdout
        #[arg(short = 'o', long, default_value = "-")]
        output: String,

        /// The file that the script error output should be written to.
        /// "-" means stderr
        #[arg(long, default_value = "-")]
        error_output: String,
    },

    /// Get the status of pull requests opened from the feature branch
    Status {
        #[command(flatten)]
        platform: PlatformArgs,

        /// The name of the branch where changes were committed
        #[arg(short = 'B', long)]
        branch: Option<String>,

        /// The file that the statuses should be written to. "-" means
        /// stdout
        #[arg(short = 'o', long, default_value = "-")]
        output: String,
    },

    /// Merge pull requests opened from the feature branch whose status
    /// is a success
    Merge {
        #[command(flatten)]
        platform: PlatformArgs,

        /// The name of the branch where changes were committed
        #[arg(short = 'B', long)]
        branch: Option<String>,

        /// The type of merge that should be done. Multiple types can be
        /// used as backup strategies if the first one is not allowed
        #[arg(long = "merge-type")]
        merge_types: Vec<String>,
    },

    /// Close pull requests opened from the feature branch
    Close {
        #[command(flatten)]
        platform: PlatformArgs,

        /// The name of the branch where changes were committed
        #[arg(short = 'B', long)]
        branch: Option<String>,
    },
}

impl Commands {
    fn platform_args(&self) -> &PlatformArgs {
        match self {
            Commands::Run { platform, .. }
            | Commands::Print { platform, .. }
            | Commands::Status { platform, .. }
            | Commands::Merge { platform, .. }
            | Commands::Close { platform, .. } => platform,
        }
    }
}

/// Name of the branch changes are committed to when nothing else is
/// configured
const DEFAULT_BRANCH: &str = "repo-sweep-branch";

/// Merge types attempted, in order, when none are configured
const DEFAULT_MERGE_TYPES: [&str; 3] = ["merge", "squash", "rebase"];

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let args = Args::parse();

    if !args.log.plain_output {
        // Setup colorful error reports
        color_eyre::install()?;
    }

    app(args).await
}

/// Main logic entrypoint
async fn app(args: Args) -> eyre::Result<()> {
    let config = match &args.config {
        Some(path) => read_config_file(path).await?,
        None => match discover_nearest_config_file().await? {
            Some(path) => {
                let config = read_config_file(&path).await?;
                tracing::debug!(config_path = ?path, "found config file");
                config
            }
            None => Config::default(),
        },
    };

    let token = resolve_token(args.command.platform_args(), &config)?;

    init_logging(resolve_log_options(&args.log, &config, &token)?)?;

    let plain_output = args.log.plain_output;

    match args.command {
        Commands::Run {
            script,
            platform,
            filter,
            branch,
            base_branch,
            pr_title,
            pr_body,
            commit_message,
            reviewers,
            max_reviewers,
            conflict_strategy,
            skip_pr,
            dry_run,
            author_name,
            author_email,
            clone_dir,
            output,
        } => {
            let platform = build_platform(&platform, &config, &token, &[])?;
            let filters = resolve_filters(&filter, &config)?;

            let (commit_message, pull_request_title, pull_request_body) = resolve_messages(
                commit_message.or_else(|| config.run.commit_message.clone()),
                pr_title.or_else(|| config.run.pr_title.clone()),
                pr_body.or_else(|| config.run.pr_body.clone()),
            )?;

            let commit_author = resolve_commit_author(
                author_name.or_else(|| config.run.author_name.clone()),
                author_email.or_else(|| config.run.author_email.clone()),
            )?;

            let options = RunOptions {
                script: Script::parse(&script)?,
                feature_branch: resolve_branch(branch, &config),
                base_branch: base_branch.or_else(|| config.run.base_branch.clone()),
                token,
                commit_message,
                pull_request_title,
                pull_request_body,
                reviewers: if reviewers.is_empty() {
                    config.run.reviewers.clone()
                } else {
                    reviewers
                },
                max_reviewers: max_reviewers.or(config.run.max_reviewers).unwrap_or(0),
                conflict_strategy,
                dry_run,
                skip_pull_request: skip_pr,
                commit_author,
                clone_dir: clone_dir.or_else(|| config.run.clone_dir.clone()),
                plain_output,
            };

            let mut output = file_output(&output, std::io::stdout())?;
            run(&platform, &filters, &options, output.as_mut()).await
        }
        Commands::Print {
            script,
            platform,
            filter,
            clone_dir,
            output,
            error_output,
        } => {
            let platform = build_platform(&platform, &config, &token, &[])?;
            let filters = resolve_filters(&filter, &config)?;

            let options = PrintOptions {
                script: Script::parse(&script)?,
                token,
                clone_dir: clone_dir.or_else(|| config.run.clone_dir.clone()),
                plain_output,
            };

            let mut output = file_output(&output, std::io::stdout())?;
            let mut error_output = file_output(&error_output, std::io::stderr())?;
            print(
                &platform,
                &filters,
                &options,
                output.as_mut(),
                error_output.as_mut(),
            )
            .await
        }
        Commands::Status {
            platform,
            branch,
            output,
        } => {
            let platform = build_platform(&platform, &config, &token, &[])?;
            let branch = resolve_branch(branch, &config);

            let mut output = file_output(&output, std::io::stdout())?;
            status(&platform, &branch, output.as_mut(), plain_output).await
        }
        Commands::Merge {
            platform,
            branch,
            merge_types,
        } => {
            let merge_types = if merge_types.is_empty() {
                config.run.merge_types.clone()
            } else {
                merge_types
            };
            let platform = build_platform(&platform, &config, &token, &merge_types)?;
            let branch = resolve_branch(branch, &config);

            merge(&platform, &branch).await
        }
        Commands::Close { platform, branch } => {
            let platform = build_platform(&platform, &config, &token, &[])?;
            let branch = resolve_branch(branch, &config);

            close(&platform, &branch).await
        }
    }
}

fn resolve_log_options(
    args: &LogArgs,
    config: &Config,
    token: &str,
) -> eyre::Result<LogOptions> {
    let level = match (args.log_level, config.log.level.as_deref()) {
        (Some(level), _) => level,
        (None, Some(value)) => <LogLevel as ValueEnum>::from_str(value, true)
            .map_err(|_| eyre::eyre!("invalid log level \"{value}\""))?,
        (None, None) => LogLevel::default(),
    };

    let format = match (args.log_format, config.log.format.as_deref()) {
        (Some(format), _) => format,
        (None, Some(value)) => <LogFormat as ValueEnum>::from_str(value, true)
            .map_err(|_| eyre::eyre!("invalid log format \"{value}\""))?,
        (None, None) => LogFormat::default(),
    };

    Ok(LogOptions {
        level,
        format,
        file: args.log_file.clone().or_else(|| config.log.file.clone()),
        plain: args.plain_output,
        censor: vec![CensorItem {
            sensitive: token.to_string(),
            replacement: "<TOKEN>",
        }],
    })
}

/// Resolve the platform token, flags win over the config file which
/// wins over the environment
fn resolve_token(args: &PlatformArgs, config: &Config) -> eyre::Result<String> {
    if let Some(token) = &args.token {
        return Ok(token.clone());
    }

    if let Some(token) = &config.platform.token {
        return Ok(token.clone());
    }

    for name in ["GITHUB_TOKEN", "GITEA_TOKEN"] {
        if let Ok(token) = std::env::var(name)
            && !token.is_empty()
        {
            return Ok(token);
        }
    }

    eyre::bail!(
        "either the --token flag or the GITHUB_TOKEN/GITEA_TOKEN environment variable has to be set"
    )
}

fn build_platform(
    args: &PlatformArgs,
    config: &Config,
    token: &str,
    merge_types: &[String],
) -> eyre::Result<Platform> {
    let provider = match args.platform {
        Some(provider) => provider,
        None => match config.platform.provider.as_deref() {
            Some(value) => <PlatformKind as ValueEnum>::from_str(value, true)
                .map_err(|_| eyre::eyre!("unknown platform provider \"{value}\""))?,
            None => PlatformKind::Github,
        },
    };

    let repos = first_non_empty(&args.repos, &config.platform.repos);
    let listing = RepositoryListing {
        organizations: first_non_empty(&args.orgs, &config.platform.orgs),
        users: first_non_empty(&args.users, &config.platform.users),
        repositories: repos
            .iter()
            .map(|value| value.parse::<RepositoryReference>())
            .collect::<eyre::Result<Vec<_>>>()?,
    };

    if listing.organizations.is_empty()
        && listing.users.is_empty()
        && listing.repositories.is_empty()
    {
        eyre::bail!("no repositories are targeted, set --org, --user or --repo");
    }

    let merge_types = if merge_types.is_empty() {
        parse_merge_types(
            &DEFAULT_MERGE_TYPES
                .map(ToString::to_string),
        )?
    } else {
        parse_merge_types(merge_types)?
    };

    let base_url = args
        .base_url
        .clone()
        .or_else(|| config.platform.base_url.clone());

    Ok(match provider {
        PlatformKind::Github => {
            Platform::Github(Github::new(token, base_url, listing, merge_types)?)
        }
        PlatformKind::Gitea => {
            let base_url = base_url.context("--base-url has to be set when using gitea")?;
            Platform::Gitea(Gitea::new(token, base_url, listing, merge_types)?)
        }
    })
}

fn resolve_filters(args: &FilterArgs, config: &Config) -> eyre::Result<RepoFilters> {
    let include = args
        .repo_include
        .clone()
        .or_else(|| config.filters.include.clone())
        .map(|pattern| Regex::new(&pattern))
        .transpose()
        .context("invalid repository include pattern")?;

    let exclude = args
        .repo_exclude
        .clone()
        .or_else(|| config.filters.exclude.clone())
        .map(|pattern| Regex::new(&pattern))
        .transpose()
        .context("invalid repository exclude pattern")?;

    Ok(RepoFilters {
        skip_repositories: first_non_empty(&args.skip_repos, &config.filters.skip_repos),
        include,
        exclude,
    })
}

fn resolve_branch(branch: Option<String>, config: &Config) -> String {
    branch
        .or_else(|| config.run.branch.clone())
        .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
}

/// Set the commit message based on pull request title and body, or the
/// reverse
fn resolve_messages(
    commit_message: Option<String>,
    pr_title: Option<String>,
    pr_body: Option<String>,
) -> eyre::Result<(String, String, String)> {
    match (commit_message, pr_title) {
        (None, None) => eyre::bail!("pull request title or commit message must be set"),
        (None, Some(title)) => {
            let body = pr_body.unwrap_or_default();
            let mut message = title.clone();
            if !body.is_empty() {
                message.push('\n');
                message.push_str(&body);
            }
            Ok((message, title, body))
        }
        (Some(message), title) => {
            let (first_line, rest) = match message.split_once('\n') {
                Some((first_line, rest)) => (first_line.to_string(), rest.to_string()),
                None => (message.clone(), String::new()),
            };
            let title = title.unwrap_or(first_line);
            let body = pr_body.unwrap_or(rest);
            Ok((message, title, body))
        }
    }
}

fn resolve_commit_author(
    name: Option<String>,
    email: Option<String>,
) -> eyre::Result<Option<CommitAuthor>> {
    match (name, email) {
        (None, None) => Ok(None),
        (Some(name), Some(email)) => Ok(Some(CommitAuthor { name, email })),
        _ => eyre::bail!("both author-name and author-email have to be set if the other is set"),
    }
}

fn first_non_empty(primary: &[String], fallback: &[String]) -> Vec<String> {
    if primary.is_empty() {
        fallback.to_vec()
    } else {
        primary.to_vec()
    }
}

/// Open the file that output should be written to, "-" meaning the
/// standard stream
fn file_output(
    value: &str,
    std: impl std::io::Write + 'static,
) -> eyre::Result<Box<dyn std::io::Write>> {
    if value == "-" {
        return Ok(Box::new(std));
    }

    let file = std::fs::File::create(value)
        .with_context(|| format!("could not open file {value}"))?;
    Ok(Box::new(file))
}
