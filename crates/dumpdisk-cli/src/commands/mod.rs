//! CLI command implementations

pub mod config;
pub mod hash;
pub mod image;
pub mod list;
