//! Shell history lookup for `--last`
//!
//! Reads the detected shell's history file directly and returns the most
//! recent line that is an `az` invocation.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{AzpermError, Result};

/// Shells whose history we know how to read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    /// GNU bash
    Bash,
    /// Z shell
    Zsh,
    /// fish
    Fish,
    /// PowerShell with `PSReadLine`
    PowerShell,
}

impl ShellKind {
    /// Detect from the process environment.
    pub fn detect() -> Result<Self> {
        Self::detect_from(
            std::env::var("SHELL").ok().as_deref(),
            std::env::var("PSModulePath").ok().as_deref(),
        )
    }

    /// Detect from `$SHELL`, then `$PSModulePath`.
    pub fn detect_from(shell: Option<&str>, ps_module_path: Option<&str>) -> Result<Self> {
        let shell = shell.unwrap_or_default();
        if shell.contains("bash") {
            return Ok(Self::Bash);
        }
        if shell.contains("zsh") {
            return Ok(Self::Zsh);
        }
        if shell.contains("fish") {
            return Ok(Self::Fish);
        }
        if ps_module_path.is_some_and(|p| !p.is_empty()) {
            return Ok(Self::PowerShell);
        }

        let name = if shell.is_empty() { "unknown" } else { shell };
        Err(AzpermError::UnsupportedShell(name.to_string()))
    }

    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Zsh => "zsh",
            Self::Fish => "fish",
            Self::PowerShell => "powershell",
        }
    }

    /// Default history file under `home`
    #[must_use]
    pub fn default_history_path(self, home: &Path) -> PathBuf {
        match self {
            Self::Bash => home.join(".bash_history"),
            Self::Zsh => home.join(".zsh_history"),
            Self::Fish => home.join(".local/share/fish/fish_history"),
            Self::PowerShell if cfg!(windows) => home
                .join("AppData/Roaming/Microsoft/Windows/PowerShell/PSReadLine")
                .join("ConsoleHost_history.txt"),
            Self::PowerShell => home.join(".local/share/powershell/PSReadLine/ConsoleHost_history.txt"),
        }
    }

    /// Turn one history line into a command, or `None` for lines that are
    /// not commands (fish metadata, blank lines).
    fn command_from_line(self, line: &str) -> Option<&str> {
        let command = match self {
            Self::Zsh => strip_zsh_extended(line),
            Self::Fish => line.trim_start().strip_prefix("- cmd:")?,
            Self::Bash | Self::PowerShell => line,
        };
        let command = command.trim();
        (!command.is_empty()).then_some(command)
    }
}

impl fmt::Display for ShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `: 1700000000:0;az vm list` -> `az vm list`
fn strip_zsh_extended(line: &str) -> &str {
    line.strip_prefix(": ")
        .and_then(|rest| rest.split_once(';'))
        .map_or(line, |(_, command)| command)
}

/// Last `az` command in a history file's contents
#[must_use]
pub fn last_az_command_in(kind: ShellKind, contents: &str) -> Option<String> {
    contents
        .lines()
        .rev()
        .filter_map(|line| kind.command_from_line(line))
        .find(|command| command.starts_with("az "))
        .map(str::to_string)
}

/// Source of the most recent `az` command
#[async_trait]
pub trait HistoryReader: Send + Sync {
    /// Most recent `az` command line
    async fn last_az_command(&self) -> Result<String>;
}

/// Reads a shell's history file
#[derive(Debug, Clone)]
pub struct ShellHistory {
    kind: ShellKind,
    path: PathBuf,
}

impl ShellHistory {
    /// Reader for an explicit history file
    #[must_use]
    pub fn new(kind: ShellKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
        }
    }

    /// Reader for the current shell. `$HISTFILE` wins over the shell's
    /// default location.
    pub fn detect() -> Result<Self> {
        let kind = ShellKind::detect()?;
        let path = match std::env::var_os("HISTFILE").filter(|p| !p.is_empty()) {
            Some(histfile) => PathBuf::from(histfile),
            None => {
                let home = dirs::home_dir().ok_or_else(|| AzpermError::History {
                    shell: kind.name().to_string(),
                    message: "could not determine home directory".to_string(),
                })?;
                kind.default_history_path(&home)
            }
        };
        Ok(Self::new(kind, path))
    }

    /// Detected shell
    #[must_use]
    pub const fn kind(&self) -> ShellKind {
        self.kind
    }

    /// History file being read
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl HistoryReader for ShellHistory {
    async fn last_az_command(&self) -> Result<String> {
        let history_error = |message: String| AzpermError::History {
            shell: self.kind.name().to_string(),
            message,
        };

        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            history_error(format!(
                "could not read history file {}: {e}",
                self.path.display()
            ))
        })?;
        // zsh metafies non-ASCII bytes; lossy decoding is good enough for `az` lines
        let contents = String::from_utf8_lossy(&bytes);
        debug!(shell = %self.kind, path = %self.path.display(), "read shell history");

        last_az_command_in(self.kind, &contents).ok_or_else(|| {
            history_error("no Azure CLI commands found in recent history".to_string())
        })
    }
}

/// History of whichever shell is running, located on first read
#[derive(Debug, Clone, Copy, Default)]
pub struct CurrentShellHistory;

#[async_trait]
impl HistoryReader for CurrentShellHistory {
    async fn last_az_command(&self) -> Result<String> {
        let history = ShellHistory::detect()?;
        debug!(shell = %history.kind(), path = %history.path().display(), "using shell history");
        history.last_az_command().await
    }
}
