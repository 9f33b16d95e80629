pub mod branches;
pub mod commands;
pub mod config;
pub mod diff;
pub mod error;
pub mod git;
pub mod logging;
pub mod models;
pub mod rewrite;
pub mod utils;
