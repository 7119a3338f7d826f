//! # Rewrite
//!
//! Fixed literal replacement against a single text file. Building block
//! for small changer scripts, see the `replace` example

use eyre::Context;
use std::path::Path;

/// Replace the first occurrence of `search` within `content` with
/// `replacement`. Content without a match is returned unchanged
pub fn replace_first(content: &str, search: &str, replacement: &str) -> String {
    content.replacen(search, replacement, 1)
}

/// Rewrite the UTF-8 text file at `path` replacing the first occurrence
/// of `search` with `replacement`. The file is written back to the same
/// path, unmodified when `search` is not present
#[tracing::instrument]
pub async fn rewrite_file(path: &Path, search: &str, replacement: &str) -> eyre::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .context("failed to read file to rewrite")?;

    let content = replace_first(&content, search, replacement);

    tokio::fs::write(path, content)
        .await
        .context("failed to write rewritten file")?;

    Ok(())
}
