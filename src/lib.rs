//! azperm - Azure RBAC permission resolver
//!
//! Turns Azure CLI command lines into the role-based access control
//! permissions they need, preferring the live provider operations catalog
//! and falling back to a cache and verb-based inference.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

pub mod cache;
pub mod cli;
pub mod command;
pub mod config;
pub mod discover;
pub mod doctor;
pub mod error;
pub mod provider;
pub mod resolve;
pub mod shell;

// Re-export commonly used types
pub use cache::PermissionCache;
pub use command::{extract_az_command, parse, Command};
pub use config::Settings;
pub use error::{AzpermError, Result};
pub use resolve::{Confidence, LiveSources, Resolution, Resolver, Tier};
