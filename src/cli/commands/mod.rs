//! CLI command implementations

pub mod cache;
pub mod completions;
pub mod config;
pub mod fill;
pub mod init;
pub mod reset;
pub mod review;
pub mod status;
