//! The canonical changer script: rewrites ./README.md in the current
//! repository, replacing the first occurrence of "apple" with "orange".
//!
//! Run through the sweep with:
//!
//! ```sh
//! repo-sweep run "replace" --org my-org -m "Replace apple with orange"
//! ```

use repo_sweep::rewrite::rewrite_file;
use std::path::Path;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    rewrite_file(Path::new("./README.md"), "apple", "orange").await
}
