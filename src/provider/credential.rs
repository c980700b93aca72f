//! Access token acquisition
//!
//! Tokens come from the logged-in Azure CLI session. Any failure here is
//! non-fatal to resolution: the resolver falls through to its cache tiers.

use std::process::{Command, Stdio};

use async_trait::async_trait;
use tokio::process::Command as TokioCommand;
use tracing::debug;

use crate::error::{AzpermError, Result};

/// Azure CLI executable name
pub const AZ_PROGRAM: &str = if cfg!(windows) { "az.cmd" } else { "az" };

/// Source of bearer tokens for the management API
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain an access token
    async fn access_token(&self) -> Result<String>;
}

/// Fetches tokens via `az account get-access-token`
#[derive(Debug, Clone, Copy, Default)]
pub struct AzCliCredential;

/// Build the `az account get-access-token` invocation.
#[must_use]
pub fn build_token_command() -> Command {
    let mut cmd = Command::new(AZ_PROGRAM);
    cmd.args([
        "account",
        "get-access-token",
        "--query",
        "accessToken",
        "--output",
        "tsv",
    ]);
    cmd
}

#[async_trait]
impl CredentialProvider for AzCliCredential {
    async fn access_token(&self) -> Result<String> {
        let output = TokioCommand::from(build_token_command())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AzpermError::Credential(format!("failed to run Azure CLI: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzpermError::Credential(format!(
                "Azure CLI could not issue a token (run 'az login'): {}",
                stderr.trim()
            )));
        }

        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AzpermError::Credential(
                "empty access token returned from Azure CLI".to_string(),
            ));
        }

        debug!(len = token.len(), "obtained access token from Azure CLI");
        Ok(token)
    }
}

/// Whether the Azure CLI can be spawned at all
pub async fn az_cli_available() -> bool {
    let mut cmd = TokioCommand::new(AZ_PROGRAM);
    cmd.arg("version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    cmd.status().await.is_ok_and(|status| status.success())
}
