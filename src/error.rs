//! Error types for azperm
//!
//! When resolving, only `Parse` and `ResolutionEmpty` ever reach the user
//! as a failure. Credential and catalog errors are absorbed by the resolver
//! and turned into a fall-through to the next tier.

use thiserror::Error;

/// General azperm error type
#[derive(Debug, Error)]
pub enum AzpermError {
    /// Input had fewer than two tokens after stripping `az`
    #[error("Invalid Azure CLI command format: '{input}'")]
    Parse {
        /// The raw input line
        input: String,
    },

    /// No resolution tier produced a permission
    #[error("No permissions found for command: {command}")]
    ResolutionEmpty {
        /// The normalized `service operation` string
        command: String,
    },

    /// No access token could be obtained
    #[error("Credential error: {0}")]
    Credential(String),

    /// Network, HTTP or decoding failure while fetching a provider catalog
    #[error("Catalog fetch error for '{namespace}': {message}")]
    CatalogFetch {
        /// Provider namespace being fetched
        namespace: String,
        /// What went wrong
        message: String,
    },

    /// Cache file could not be read or written
    #[error("Cache I/O error on {path}: {message}")]
    CacheIo {
        /// Path of the cache file
        path: String,
        /// What went wrong
        message: String,
    },

    /// History mode on a shell we cannot read
    #[error("Unsupported shell: {0}")]
    UnsupportedShell(String),

    /// Shell was recognised but its history yielded no `az` command
    #[error("{shell} history: {message}")]
    History {
        /// Shell name
        shell: String,
        /// What went wrong
        message: String,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Command discovery could not run
    #[error("Discovery error: {0}")]
    Discovery(String),
}

impl AzpermError {
    /// Returns true for errors the resolver silently falls through on
    #[must_use]
    pub const fn is_tier_failure(&self) -> bool {
        matches!(self, Self::Credential(_) | Self::CatalogFetch { .. })
    }
}

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, AzpermError>;
