//! Command to permission cache
//!
//! Persists `permissions.json` in the working directory:
//!
//! ```json
//! {"commands": {"vm start": ["Microsoft.Compute/virtualMachines/start/action"]},
//!  "last_updated": "2026-01-01T00:00:00Z", "source": "live-provider-operations"}
//! ```
//!
//! The file is read once and rewritten in full after each live resolution.
//! Concurrent writers race; the last one wins.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AzpermError, Result};

/// Default cache file name, relative to the working directory
pub const DEFAULT_CACHE_FILE: &str = "permissions.json";

/// `source` recorded after a live write-through
pub const LIVE_SOURCE: &str = "live-provider-operations";

/// Serialized cache contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMapping {
    /// `service operation` to permission strings
    #[serde(default)]
    pub commands: BTreeMap<String, Vec<String>>,
    /// When the mapping was last written
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_updated: String,
    /// What produced the mapping
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

impl CachedMapping {
    /// Small built-in table used when no cache file exists
    #[must_use]
    pub fn builtin() -> Self {
        let entries: [(&str, &str); 5] = [
            (
                "group create",
                "Microsoft.Resources/subscriptions/resourceGroups/write",
            ),
            (
                "group delete",
                "Microsoft.Resources/subscriptions/resourceGroups/delete",
            ),
            ("vm start", "Microsoft.Compute/virtualMachines/start/action"),
            ("vm stop", "Microsoft.Compute/virtualMachines/powerOff/action"),
            ("storage account create", "Microsoft.Storage/storageAccounts/write"),
        ];

        Self {
            commands: entries
                .iter()
                .map(|(cmd, perm)| ((*cmd).to_string(), vec![(*perm).to_string()]))
                .collect(),
            last_updated: "built-in".to_string(),
            source: "default-minimal".to_string(),
        }
    }
}

/// What was found at the cache path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheState {
    /// No file at the path
    Absent,
    /// File parsed successfully
    Loaded(CachedMapping),
    /// File exists but could not be read or parsed
    Unreadable(String),
}

/// Inspect the cache file without falling back to defaults.
#[must_use]
pub fn inspect(path: &Path) -> CacheState {
    if !path.exists() {
        return CacheState::Absent;
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<CachedMapping>(&content) {
            Ok(mapping) => CacheState::Loaded(mapping),
            Err(e) => CacheState::Unreadable(format!("invalid JSON: {e}")),
        },
        Err(e) => CacheState::Unreadable(e.to_string()),
    }
}

/// The resolver's cache: an in-memory mapping with optional file backing
#[derive(Debug, Clone)]
pub struct PermissionCache {
    mapping: CachedMapping,
    path: Option<PathBuf>,
}

impl PermissionCache {
    /// Load from `path`. Absent or unreadable files fall back to the
    /// built-in table; an unreadable file is logged.
    #[must_use]
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mapping = match inspect(&path) {
            CacheState::Loaded(mapping) => {
                debug!(path = %path.display(), entries = mapping.commands.len(), "loaded permission cache");
                mapping
            }
            CacheState::Absent => {
                debug!(path = %path.display(), "no permission cache, using built-in defaults");
                CachedMapping::builtin()
            }
            CacheState::Unreadable(reason) => {
                warn!(path = %path.display(), %reason, "failed to read permission cache, using built-in defaults");
                CachedMapping::builtin()
            }
        };

        Self {
            mapping,
            path: Some(path),
        }
    }

    /// Cache that lives only in memory and is never persisted
    #[must_use]
    pub const fn in_memory(mapping: CachedMapping) -> Self {
        Self {
            mapping,
            path: None,
        }
    }

    /// Empty in-memory cache
    #[must_use]
    pub fn empty() -> Self {
        Self::in_memory(CachedMapping::default())
    }

    /// Current mapping
    #[must_use]
    pub const fn mapping(&self) -> &CachedMapping {
        &self.mapping
    }

    /// Backing file, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exact lookup by `service operation`. Empty entries count as misses.
    #[must_use]
    pub fn get(&self, full_command: &str) -> Option<&[String]> {
        self.mapping
            .commands
            .get(full_command)
            .map(Vec::as_slice)
            .filter(|perms| !perms.is_empty())
    }

    /// First entry, in key order, whose key starts with `service` and
    /// contains `operation`.
    #[must_use]
    pub fn find_partial(&self, service: &str, operation: &str) -> Option<(&str, &[String])> {
        self.mapping
            .commands
            .iter()
            .find(|(key, perms)| {
                !perms.is_empty() && key.starts_with(service) && key.contains(operation)
            })
            .map(|(key, perms)| (key.as_str(), perms.as_slice()))
    }

    /// Record a live resolution and persist it. Persistence failures are
    /// logged, never returned.
    pub fn record(&mut self, full_command: &str, permissions: &BTreeSet<String>) {
        self.mapping
            .commands
            .insert(full_command.to_string(), permissions.iter().cloned().collect());
        self.mapping.last_updated = Utc::now().to_rfc3339();
        self.mapping.source = LIVE_SOURCE.to_string();

        if let Err(e) = self.save() {
            warn!(error = %e, "failed to persist permission cache");
        }
    }

    /// Swap in a whole new mapping and persist it
    pub fn replace(&mut self, mapping: CachedMapping) -> Result<()> {
        self.mapping = mapping;
        self.save()
    }

    /// Atomically write the mapping (write to temp, then rename).
    /// A no-op for in-memory caches.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let io_error = |message: String| AzpermError::CacheIo {
            path: path.display().to_string(),
            message,
        };

        let json = serde_json::to_string_pretty(&self.mapping)
            .map_err(|e| io_error(format!("failed to serialize: {e}")))?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json.as_bytes())
            .map_err(|e| io_error(format!("failed to write {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| io_error(format!("failed to rename {}: {e}", tmp_path.display())))?;

        debug!(path = %path.display(), entries = self.mapping.commands.len(), "saved permission cache");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn perms(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_load_absent_file_uses_builtin() {
        let dir = TempDir::new().unwrap();
        let cache = PermissionCache::load(dir.path().join(DEFAULT_CACHE_FILE));
        assert_eq!(cache.mapping().source, "default-minimal");
        assert_eq!(
            cache.get("vm stop"),
            Some(&["Microsoft.Compute/virtualMachines/powerOff/action".to_string()][..])
        );
    }

    #[test]
    fn test_load_corrupt_file_uses_builtin() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CACHE_FILE);
        std::fs::write(&path, "{not json").unwrap();

        let cache = PermissionCache::load(&path);
        assert_eq!(cache.mapping().last_updated, "built-in");
        assert!(matches!(inspect(&path), CacheState::Unreadable(_)));
    }

    #[test]
    fn test_load_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CACHE_FILE);
        std::fs::write(
            &path,
            r#"{"commands": {"aks start": ["Microsoft.ContainerService/managedClusters/start/action"]}, "last_updated": "yesterday", "source": "manual"}"#,
        )
        .unwrap();

        let cache = PermissionCache::load(&path);
        assert_eq!(cache.mapping().source, "manual");
        assert!(cache.get("aks start").is_some());
        assert!(cache.get("vm start").is_none());
    }

    #[test]
    fn test_record_writes_through_to_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CACHE_FILE);
        let mut cache = PermissionCache::load(&path);

        cache.record(
            "vm restart",
            &perms(&["Microsoft.Compute/virtualMachines/restart/action"]),
        );

        let CacheState::Loaded(saved) = inspect(&path) else {
            panic!("cache file should have been written");
        };
        assert_eq!(saved.source, LIVE_SOURCE);
        assert_eq!(
            saved.commands["vm restart"],
            vec!["Microsoft.Compute/virtualMachines/restart/action"]
        );
        // built-in entries survive the rewrite
        assert!(saved.commands.contains_key("group create"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_record_unwritable_path_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-dir").join(DEFAULT_CACHE_FILE);
        let mut cache = PermissionCache::load(&path);

        cache.record("vm list", &perms(&["Microsoft.Compute/virtualMachines/read"]));

        assert!(cache.get("vm list").is_some());
        assert!(cache.save().is_err());
    }

    #[test]
    fn test_replace_rewrites_file_with_new_source() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(DEFAULT_CACHE_FILE);
        let mut cache = PermissionCache::load(&path);
        cache.record("vm restart", &perms(&["Microsoft.Compute/virtualMachines/restart/action"]));

        let mut mapping = CachedMapping {
            source: "azure-cli-discovery".to_string(),
            last_updated: "now".to_string(),
            ..CachedMapping::default()
        };
        mapping.commands.insert(
            "aks start".to_string(),
            vec!["Microsoft.ContainerService/managedClusters/start/action".to_string()],
        );
        cache.replace(mapping.clone()).unwrap();

        assert_eq!(inspect(&path), CacheState::Loaded(mapping));
        assert!(cache.get("vm restart").is_none());
    }

    #[test]
    fn test_in_memory_save_is_noop() {
        let cache = PermissionCache::empty();
        assert!(cache.save().is_ok());
        assert!(cache.path().is_none());
    }

    #[test]
    fn test_find_partial_matches_service_prefix_and_operation() {
        let cache = PermissionCache::in_memory(CachedMapping::builtin());
        let (key, found) = cache.find_partial("vm", "sta").unwrap();
        assert_eq!(key, "vm start");
        assert_eq!(found, ["Microsoft.Compute/virtualMachines/start/action"]);
        assert!(cache.find_partial("aks", "start").is_none());
    }

    #[test]
    fn test_empty_entries_are_misses() {
        let mut mapping = CachedMapping::default();
        mapping.commands.insert("vm start".to_string(), vec![]);
        let cache = PermissionCache::in_memory(mapping);
        assert!(cache.get("vm start").is_none());
        assert!(cache.find_partial("vm", "start").is_none());
    }
}
