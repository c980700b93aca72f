//! Azure Resource Manager client for provider operation catalogs
//!
//! Resolves the management endpoint of the active cloud and fetches one
//! provider's operations metadata per call.

use std::fmt;
use std::process::{Command, Stdio};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::process::Command as TokioCommand;
use tracing::{debug, warn};

use super::catalog::ProviderCatalog;
use super::credential::AZ_PROGRAM;
use crate::error::{AzpermError, Result};

/// Management endpoint of the public Azure cloud
pub const PUBLIC_CLOUD_ENDPOINT: &str = "https://management.azure.com";

/// Default api-version for `Microsoft.Authorization/providerOperations`
pub const DEFAULT_API_VERSION: &str = "2022-04-01";

/// Source of provider operation catalogs
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fetch the catalog for a provider namespace using the given bearer token
    async fn fetch_catalog(&self, namespace: &str, token: &str) -> Result<ProviderCatalog>;
}

/// Where the management endpoint came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointSource {
    /// Explicit flag, environment variable or config file
    Override,
    /// `az cloud show` for the named cloud
    AzureCli {
        /// Cloud name, e.g. `AzureCloud`
        cloud: String,
    },
    /// Nothing else worked
    PublicDefault,
}

impl fmt::Display for EndpointSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Override => write!(f, "override"),
            Self::AzureCli { cloud } => write!(f, "Azure CLI ({cloud})"),
            Self::PublicDefault => write!(f, "public cloud default"),
        }
    }
}

/// Effective management endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagementEndpoint {
    /// Base URL without trailing slash
    pub url: String,
    /// How the URL was determined
    pub source: EndpointSource,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudShow {
    #[serde(default)]
    name: String,
    #[serde(default)]
    endpoints: CloudEndpoints,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloudEndpoints {
    #[serde(default)]
    resource_manager: Option<String>,
    #[serde(default)]
    management: Option<String>,
}

/// Parse `az cloud show --output json`, preferring the Resource Manager
/// endpoint over the classic management endpoint.
pub fn parse_cloud_show(json: &str) -> Option<ManagementEndpoint> {
    let cloud: CloudShow = serde_json::from_str(json).ok()?;
    let url = cloud
        .endpoints
        .resource_manager
        .filter(|u| !u.trim().is_empty())
        .or(cloud.endpoints.management)
        .filter(|u| !u.trim().is_empty())?;

    Some(ManagementEndpoint {
        url: url.trim().trim_end_matches('/').to_string(),
        source: EndpointSource::AzureCli { cloud: cloud.name },
    })
}

/// Build the `az cloud show` invocation.
#[must_use]
pub fn build_cloud_show_command() -> Command {
    let mut cmd = Command::new(AZ_PROGRAM);
    cmd.args(["cloud", "show", "--output", "json"]);
    cmd
}

/// Determine the management endpoint: override, then the Azure CLI's
/// active cloud, then the public cloud.
pub async fn discover_endpoint(override_url: Option<&str>) -> ManagementEndpoint {
    if let Some(url) = override_url.map(str::trim).filter(|u| !u.is_empty()) {
        return ManagementEndpoint {
            url: url.trim_end_matches('/').to_string(),
            source: EndpointSource::Override,
        };
    }

    let output = TokioCommand::from(build_cloud_show_command())
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            if let Some(endpoint) = parse_cloud_show(&String::from_utf8_lossy(&out.stdout)) {
                debug!(url = %endpoint.url, source = %endpoint.source, "resolved management endpoint");
                return endpoint;
            }
            warn!("could not parse 'az cloud show' output, using public cloud");
        }
        Ok(out) => debug!(status = ?out.status.code(), "'az cloud show' failed, using public cloud"),
        Err(e) => debug!(error = %e, "could not run 'az cloud show', using public cloud"),
    }

    ManagementEndpoint {
        url: PUBLIC_CLOUD_ENDPOINT.to_string(),
        source: EndpointSource::PublicDefault,
    }
}

/// HTTP client for the ARM provider operations API
#[derive(Debug, Clone)]
pub struct ArmClient {
    http: Client,
    endpoint: String,
    api_version: String,
}

impl ArmClient {
    /// Create a client for the given endpoint and api-version
    #[must_use]
    pub fn new(endpoint: &str, api_version: &str) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_version: api_version.to_string(),
        }
    }

    /// Catalog URL for one provider namespace
    #[must_use]
    pub fn catalog_url(&self, namespace: &str) -> String {
        format!(
            "{}/providers/Microsoft.Authorization/providerOperations/{namespace}?api-version={}&$expand=resourceTypes",
            self.endpoint, self.api_version
        )
    }

    /// Base endpoint in use
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// api-version in use
    #[must_use]
    pub fn api_version(&self) -> &str {
        &self.api_version
    }
}

#[async_trait]
impl CatalogSource for ArmClient {
    async fn fetch_catalog(&self, namespace: &str, token: &str) -> Result<ProviderCatalog> {
        let fetch_error = |message: String| AzpermError::CatalogFetch {
            namespace: namespace.to_string(),
            message,
        };

        let url = self.catalog_url(namespace);
        debug!(%url, "fetching provider operations");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| fetch_error(format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| fetch_error(format!("failed to read response body: {e}")))?;

        if !status.is_success() {
            return Err(fetch_error(format!(
                "API request failed with status {status}: {}",
                truncate(&body, 300)
            )));
        }

        let catalog = ProviderCatalog::from_json(&body)
            .map_err(|e| fetch_error(format!("failed to decode response: {e}")))?;

        debug!(
            namespace = %catalog.namespace,
            resource_types = catalog.resource_types.len(),
            operations = catalog.operation_count(),
            "retrieved provider catalog"
        );
        Ok(catalog)
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
