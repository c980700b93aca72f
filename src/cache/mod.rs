//! Permission cache
//!
//! Write-through cache of resolved permissions, consulted as the second
//! and third resolution tiers.

pub mod mapping;

pub use mapping::{CacheState, CachedMapping, PermissionCache, DEFAULT_CACHE_FILE};
