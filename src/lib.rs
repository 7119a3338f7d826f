//! repo-sweep runs a changer script against many repositories and turns
//! the resulting changes into pull requests.

pub mod close;
pub mod config;
pub mod counter;
pub mod filter;
pub mod git;
pub mod logging;
pub mod merge;
pub mod platform;
pub mod print;
pub mod rewrite;
pub mod run;
pub mod script;
pub mod status;
pub mod terminal;
