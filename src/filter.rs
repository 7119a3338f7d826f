//! # Filter
//!
//! Repository filtering applied before any repository is worked on

use crate::platform::Repository;
use regex::Regex;

/// Repository filtering options shared across commands
#[derive(Debug, Default, Clone)]
pub struct RepoFilters {
    /// Repositories (owner/name) that should be skipped
    pub skip_repositories: Vec<String>,
    /// When set, only repositories matching are included
    pub include: Option<Regex>,
    /// When set, repositories matching are excluded
    pub exclude: Option<Regex>,
}

/// Filter the repository list, every skipped repository is logged with
/// the reason it was skipped
pub fn filter_repositories(
    repositories: Vec<Repository>,
    filters: &RepoFilters,
) -> Vec<Repository> {
    repositories
        .into_iter()
        .filter(|repository| {
            let full_name = repository.full_name();

            if filters.skip_repositories.contains(&full_name) {
                tracing::info!("Skipping {full_name} since it is in the exclusion list");
                return false;
            }

            if let Some(include) = &filters.include
                && !include.is_match(&full_name)
            {
                tracing::info!("Skipping {full_name} since it does not match the inclusion regexp");
                return false;
            }

            if let Some(exclude) = &filters.exclude
                && exclude.is_match(&full_name)
            {
                tracing::info!("Skipping {full_name} since it matches the exclusion regexp");
                return false;
            }

            true
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{RepoFilters, filter_repositories};
    use crate::platform::Repository;
    use regex::Regex;

    fn repositories() -> Vec<Repository> {
        ["owner/app", "owner/app-docs", "other/lib"]
            .iter()
            .map(|full_name| {
                let (owner, name) = full_name.split_once('/').unwrap();
                Repository {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    clone_url: format!("https://example.com/{full_name}.git"),
                    default_branch: "main".to_string(),
                }
            })
            .collect()
    }

    fn full_names(repositories: &[Repository]) -> Vec<String> {
        repositories.iter().map(Repository::full_name).collect()
    }

    #[test]
    fn test_no_filters_keeps_everything() {
        let filtered = filter_repositories(repositories(), &RepoFilters::default());
        assert_eq!(filtered.len(), 3);
    }

    #[test]
    fn test_skip_list() {
        let filters = RepoFilters {
            skip_repositories: vec!["owner/app".to_string()],
            ..Default::default()
        };

        let filtered = filter_repositories(repositories(), &filters);
        assert_eq!(full_names(&filtered), vec!["owner/app-docs", "other/lib"]);
    }

    #[test]
    fn test_include_regex() {
        let filters = RepoFilters {
            include: Some(Regex::new("^owner/").unwrap()),
            ..Default::default()
        };

        let filtered = filter_repositories(repositories(), &filters);
        assert_eq!(full_names(&filtered), vec!["owner/app", "owner/app-docs"]);
    }

    #[test]
    fn test_exclude_regex() {
        let filters = RepoFilters {
            exclude: Some(Regex::new("-docs$").unwrap()),
            ..Default::default()
        };

        let filtered = filter_repositories(repositories(), &filters);
        assert_eq!(full_names(&filtered), vec!["owner/app", "other/lib"]);
    }
}
