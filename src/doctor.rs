//! azperm doctor: environment diagnostics
//!
//! Gathers a snapshot of everything resolution depends on (Azure CLI,
//! login state, endpoint, cache, shell) and turns it into a report with
//! categories: errors (resolution will degrade), warnings (a feature is
//! unavailable), info (what will be used).

use std::path::{Path, PathBuf};

use crate::cache::mapping::{inspect, CacheState};
use crate::config::Settings;
use crate::provider::client::{discover_endpoint, EndpointSource};
use crate::provider::credential::az_cli_available;
use crate::provider::{CredentialProvider, ManagementEndpoint};
use crate::shell::{ShellHistory, ShellKind};

/// Severity level for a diagnostic finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Severity {
    /// Live resolution cannot work
    Error,
    /// A feature is unavailable
    Warning,
    /// What the tool will use
    Info,
}

/// A single diagnostic finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    /// Severity of the finding
    pub severity: Severity,
    /// Short code for the finding (e.g., "D001")
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Suggested fix (optional)
    pub suggestion: Option<String>,
}

/// Diagnostic report from `azperm --doctor`
#[derive(Debug, Clone)]
pub struct DiagnosticReport {
    /// All findings, in order of severity (errors first)
    pub findings: Vec<Finding>,
}

impl DiagnosticReport {
    /// Returns true if nothing needs fixing
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.error_count() == 0
    }

    /// Returns the number of errors
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.count(&Severity::Error)
    }

    /// Returns the number of warnings
    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count(&Severity::Warning)
    }

    /// Returns the number of info items
    #[must_use]
    pub fn info_count(&self) -> usize {
        self.count(&Severity::Info)
    }

    fn count(&self, severity: &Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| &f.severity == severity)
            .count()
    }
}

/// Everything the checks look at, gathered up front so the checks stay pure
#[derive(Debug, Clone)]
pub struct Environment {
    /// `az version` ran successfully
    pub az_available: bool,
    /// Token acquisition outcome; the error message on failure
    pub login: Result<(), String>,
    /// Effective management endpoint
    pub endpoint: ManagementEndpoint,
    /// Effective API version
    pub api_version: String,
    /// Cache file and its state; `None` when caching is disabled
    pub cache: Option<(PathBuf, CacheState)>,
    /// Detected shell and its history file
    pub shell: Result<(ShellKind, PathBuf), String>,
}

/// Collect the environment snapshot. Spawns `az` up to three times.
pub async fn gather_environment(
    settings: &Settings,
    credentials: &dyn CredentialProvider,
) -> Environment {
    let az_available = az_cli_available().await;
    let login = if az_available {
        credentials
            .access_token()
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    } else {
        Err("Azure CLI not available".to_string())
    };
    let endpoint = discover_endpoint(settings.api.management_endpoint.as_deref()).await;
    let cache = settings
        .cache
        .enabled
        .then(|| (settings.cache.path.clone(), inspect(&settings.cache.path)));
    let shell = ShellHistory::detect()
        .map(|history| (history.kind(), history.path().to_path_buf()))
        .map_err(|e| e.to_string());

    Environment {
        az_available,
        login,
        endpoint,
        api_version: settings.api_version().to_string(),
        cache,
        shell,
    }
}

/// Run all diagnostic checks and return a report.
#[must_use]
pub fn diagnose(env: &Environment) -> DiagnosticReport {
    let mut findings = Vec::new();

    check_azure_cli(env, &mut findings);
    check_login(env, &mut findings);
    check_endpoint(env, &mut findings);
    check_cache(env.cache.as_ref(), &mut findings);
    check_shell(env, &mut findings);

    // Sort: errors first, then warnings, then info
    findings.sort_by_key(|f| match f.severity {
        Severity::Error => 0,
        Severity::Warning => 1,
        Severity::Info => 2,
    });

    DiagnosticReport { findings }
}

/// D001: Azure CLI on PATH
fn check_azure_cli(env: &Environment, findings: &mut Vec<Finding>) {
    if !env.az_available {
        findings.push(Finding {
            severity: Severity::Error,
            code: "D001".to_string(),
            message: "Azure CLI ('az') was not found or failed to run".to_string(),
            suggestion: Some(
                "Install the Azure CLI: https://learn.microsoft.com/cli/azure/install-azure-cli"
                    .to_string(),
            ),
        });
    }
}

/// D002: logged in (a token can be issued)
fn check_login(env: &Environment, findings: &mut Vec<Finding>) {
    // D001 already covers a missing CLI
    if !env.az_available {
        return;
    }
    if let Err(reason) = &env.login {
        findings.push(Finding {
            severity: Severity::Error,
            code: "D002".to_string(),
            message: format!("Cannot obtain an access token: {reason}"),
            suggestion: Some("Run `az login`; until then only cached and inferred permissions are available.".to_string()),
        });
    }
}

/// D003: endpoint and API version in use
fn check_endpoint(env: &Environment, findings: &mut Vec<Finding>) {
    findings.push(Finding {
        severity: Severity::Info,
        code: "D003".to_string(),
        message: format!(
            "Management endpoint {} ({}), api-version {}",
            env.endpoint.url, env.endpoint.source, env.api_version
        ),
        suggestion: None,
    });

    if env.az_available && env.endpoint.source == EndpointSource::PublicDefault {
        findings.push(Finding {
            severity: Severity::Warning,
            code: "D003".to_string(),
            message: "Could not read the active cloud from the Azure CLI".to_string(),
            suggestion: Some(
                "Set AZPERM_MANAGEMENT_ENDPOINT if you are not on the public cloud.".to_string(),
            ),
        });
    }
}

/// D004: cache file state
fn check_cache(cache: Option<&(PathBuf, CacheState)>, findings: &mut Vec<Finding>) {
    let Some((path, state)) = cache else {
        findings.push(Finding {
            severity: Severity::Info,
            code: "D004".to_string(),
            message: "Permission cache disabled".to_string(),
            suggestion: None,
        });
        return;
    };

    let finding = match state {
        CacheState::Absent => Finding {
            severity: Severity::Info,
            code: "D004".to_string(),
            message: format!(
                "No cache at {}; built-in defaults will be used",
                path.display()
            ),
            suggestion: None,
        },
        CacheState::Loaded(mapping) => Finding {
            severity: Severity::Info,
            code: "D004".to_string(),
            message: format!(
                "Cache {} has {} entr{} (source: {}, updated: {})",
                path.display(),
                mapping.commands.len(),
                if mapping.commands.len() == 1 { "y" } else { "ies" },
                display_or_unknown(&mapping.source),
                display_or_unknown(&mapping.last_updated),
            ),
            suggestion: None,
        },
        CacheState::Unreadable(reason) => Finding {
            severity: Severity::Warning,
            code: "D004".to_string(),
            message: format!("Cache {} is unreadable: {reason}", path.display()),
            suggestion: Some(unreadable_cache_suggestion(path)),
        },
    };
    findings.push(finding);
}

fn unreadable_cache_suggestion(path: &Path) -> String {
    format!(
        "Delete {} to let the next live resolution rebuild it.",
        path.display()
    )
}

fn display_or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "unknown"
    } else {
        value
    }
}

/// D005: shell history support for `--last`
fn check_shell(env: &Environment, findings: &mut Vec<Finding>) {
    match &env.shell {
        Ok((kind, history)) => findings.push(Finding {
            severity: Severity::Info,
            code: "D005".to_string(),
            message: format!("Shell {kind}, history at {}", history.display()),
            suggestion: None,
        }),
        Err(reason) => findings.push(Finding {
            severity: Severity::Warning,
            code: "D005".to_string(),
            message: format!("--last is unavailable: {reason}"),
            suggestion: Some("Pipe the command on stdin instead.".to_string()),
        }),
    }
}
