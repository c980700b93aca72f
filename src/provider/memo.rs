//! Process-lifetime memoization of live collaborators
//!
//! A run that resolves many commands (piped input, discovery) asks for the
//! same token and the same few provider catalogs over and over. These
//! wrappers answer repeats from memory. Failures are remembered as their
//! message so a dead endpoint is not retried per command.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::catalog::ProviderCatalog;
use super::client::CatalogSource;
use super::credential::CredentialProvider;
use crate::error::{AzpermError, Result};

/// Fetches the token once and hands out copies
pub struct MemoCredential<C> {
    inner: C,
    token: Mutex<Option<std::result::Result<String, String>>>,
}

impl<C: CredentialProvider> MemoCredential<C> {
    /// Wrap a credential provider
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            token: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<C: CredentialProvider> CredentialProvider for MemoCredential<C> {
    async fn access_token(&self) -> Result<String> {
        let mut slot = self.token.lock().await;
        if let Some(known) = slot.as_ref() {
            return known.clone().map_err(AzpermError::Credential);
        }

        let fetched = self.inner.access_token().await;
        *slot = Some(match &fetched {
            Ok(token) => Ok(token.clone()),
            Err(AzpermError::Credential(message)) => Err(message.clone()),
            Err(e) => Err(e.to_string()),
        });
        fetched
    }
}

/// Fetches each provider namespace at most once
pub struct MemoCatalogs<S> {
    inner: S,
    catalogs: Mutex<HashMap<String, std::result::Result<ProviderCatalog, String>>>,
}

impl<S: CatalogSource> MemoCatalogs<S> {
    /// Wrap a catalog source
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            catalogs: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: CatalogSource> CatalogSource for MemoCatalogs<S> {
    async fn fetch_catalog(&self, namespace: &str, token: &str) -> Result<ProviderCatalog> {
        let mut catalogs = self.catalogs.lock().await;
        if let Some(known) = catalogs.get(namespace) {
            debug!(namespace, "provider catalog from memory");
            return known.clone().map_err(|message| AzpermError::CatalogFetch {
                namespace: namespace.to_string(),
                message,
            });
        }

        let fetched = self.inner.fetch_catalog(namespace, token).await;
        let entry = match &fetched {
            Ok(catalog) => Ok(catalog.clone()),
            Err(AzpermError::CatalogFetch { message, .. }) => Err(message.clone()),
            Err(e) => Err(e.to_string()),
        };
        catalogs.insert(namespace.to_string(), entry);
        fetched
    }
}
