//! Permission resolver
//!
//! Walks a fixed chain of tiers, stopping at the first that yields
//! permissions:
//!
//! 1. live provider catalog (High), written through to the cache
//! 2. exact cache entry (Medium)
//! 3. partial cache entry (Low)
//! 4. verb-based inference (Low)
//!
//! Each tier runs at most once per call. Live-tier failures are never
//! returned; credential and catalog failures only show up in debug traces.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use super::matcher::OperationMatcher;
use super::{Confidence, Resolution, Tier};
use crate::cache::PermissionCache;
use crate::command::Command;
use crate::error::{AzpermError, Result};
use crate::provider::{mapper, CatalogSource, CredentialProvider};

/// CLI verb to RBAC action suffix for inference
const INFERRED_ACTIONS: &[(&str, &str)] = &[
    ("create", "write"),
    ("update", "write"),
    ("set", "write"),
    ("delete", "delete"),
    ("remove", "delete"),
    ("list", "read"),
    ("show", "read"),
    ("get", "read"),
    ("start", "start/action"),
    ("stop", "powerOff/action"),
    ("restart", "restart/action"),
    ("scale", "scale/action"),
];

/// Collaborators for the live tier
pub struct LiveSources {
    credentials: Box<dyn CredentialProvider>,
    catalogs: Box<dyn CatalogSource>,
}

impl LiveSources {
    /// Bundle a token source and a catalog source
    pub fn new(
        credentials: impl CredentialProvider + 'static,
        catalogs: impl CatalogSource + 'static,
    ) -> Self {
        Self {
            credentials: Box::new(credentials),
            catalogs: Box::new(catalogs),
        }
    }
}

/// Resolves commands to permissions. Owns the cache for its lifetime.
pub struct Resolver {
    cache: PermissionCache,
    matcher: OperationMatcher,
    live: Option<LiveSources>,
}

impl Resolver {
    /// Resolver without a live tier
    #[must_use]
    pub const fn new(cache: PermissionCache, matcher: OperationMatcher) -> Self {
        Self {
            cache,
            matcher,
            live: None,
        }
    }

    /// Enable the live tier
    #[must_use]
    pub fn with_live(mut self, live: LiveSources) -> Self {
        self.live = Some(live);
        self
    }

    /// The cache, including any entries written during resolution
    #[must_use]
    pub const fn cache(&self) -> &PermissionCache {
        &self.cache
    }

    /// Resolve a command. An empty result means no tier found anything.
    pub async fn resolve(&mut self, cmd: &Command) -> Resolution {
        if self.live.is_some() {
            match self.live_permissions(cmd).await {
                Ok(permissions) if !permissions.is_empty() => {
                    self.cache.record(cmd.full_command(), &permissions);
                    return Resolution::new(permissions, Tier::Live);
                }
                Ok(_) => debug!(command = cmd.full_command(), "live tier found nothing"),
                Err(e) if e.is_tier_failure() => {
                    debug!(
                        command = cmd.full_command(),
                        error = %e,
                        "live lookup failed, falling back"
                    );
                }
                Err(e) => warn!(command = cmd.full_command(), error = %e, "unexpected live tier error"),
            }
        } else {
            debug!("live tier disabled");
        }

        if let Some(permissions) = self.cache.get(cmd.full_command()) {
            debug!(command = cmd.full_command(), "exact cache hit");
            return Resolution::new(permissions.iter().cloned().collect(), Tier::Cache);
        }

        if let Some((key, permissions)) = self.cache.find_partial(cmd.service(), cmd.operation()) {
            debug!(command = cmd.full_command(), matched = key, "partial cache hit");
            return Resolution::new(permissions.iter().cloned().collect(), Tier::PartialCache);
        }

        let inferred = infer_permissions(cmd);
        if inferred.is_empty() {
            info!(command = cmd.full_command(), "no permissions found");
            Resolution::new(inferred, Tier::Unresolved)
        } else {
            debug!(command = cmd.full_command(), "inferred from verb");
            Resolution::new(inferred, Tier::Inference)
        }
    }

    /// Like [`Self::resolve`] but an empty result is an error.
    pub async fn resolve_required(&mut self, cmd: &Command) -> Result<Resolution> {
        let resolution = self.resolve(cmd).await;
        if resolution.is_empty() {
            return Err(AzpermError::ResolutionEmpty {
                command: cmd.full_command().to_string(),
            });
        }
        Ok(resolution)
    }

    async fn live_permissions(&self, cmd: &Command) -> Result<BTreeSet<String>> {
        let Some(live) = &self.live else {
            return Ok(BTreeSet::new());
        };

        let token = live.credentials.access_token().await?;

        let namespace =
            mapper::provider_for(cmd.service()).ok_or_else(|| AzpermError::CatalogFetch {
                namespace: String::new(),
                message: format!("unknown service: {}", cmd.service()),
            })?;
        debug!(service = cmd.service(), namespace, "mapped service to provider");

        let catalog = live.catalogs.fetch_catalog(namespace, &token).await?;
        let permissions = self.matcher.match_operations(cmd, &catalog);
        debug!(count = permissions.len(), "live tier matched permissions");
        Ok(permissions)
    }
}

/// Synthesize `{provider}/{resourceType}/{action}` from the verb. Empty when
/// the verb or the service is unknown.
#[must_use]
pub fn infer_permissions(cmd: &Command) -> BTreeSet<String> {
    let operation = cmd.operation().to_lowercase();
    let Some((_, action)) = INFERRED_ACTIONS.iter().find(|(verb, _)| *verb == operation) else {
        return BTreeSet::new();
    };
    let (Some(provider), Some(resource_type)) = (
        mapper::provider_for(cmd.service()),
        mapper::resource_type_for(cmd.service()),
    ) else {
        return BTreeSet::new();
    };

    BTreeSet::from([format!("{provider}/{resource_type}/{action}")])
}

impl Resolution {
    fn new(permissions: BTreeSet<String>, tier: Tier) -> Self {
        Self { permissions, tier }
    }

    /// Confidence implied by the tier that answered
    #[must_use]
    pub const fn confidence(&self) -> Confidence {
        self.tier.confidence()
    }
}
