//! Command discovery
//!
//! Enumerates every Azure CLI command by walking `az --help` and the help
//! page of each command group, resolves each command through the normal
//! tier chain and produces a fresh cache mapping tagged
//! [`DISCOVERY_SOURCE`].
//!
//! Help pages list their children in indented sections:
//!
//! ```text
//! Subgroups:
//!     availability-set   : Group resources into availability sets.
//!     image [Preview]    : Manage VM images.
//!
//! Commands:
//!     create             : Create an Azure Virtual Machine.
//!     start              : Start a stopped VM.
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::process::{Command, Stdio};

use async_trait::async_trait;
use chrono::Utc;
use tokio::process::Command as TokioCommand;
use tracing::{debug, info};

use crate::cache::CachedMapping;
use crate::command::parse;
use crate::error::{AzpermError, Result};
use crate::provider::credential::AZ_PROGRAM;
use crate::provider::CredentialProvider;
use crate::resolve::{Resolver, Tier};

/// `source` recorded in a cache written by discovery
pub const DISCOVERY_SOURCE: &str = "azure-cli-discovery";

/// Groups nested deeper than this are not walked
const MAX_GROUP_DEPTH: usize = 6;

/// Children listed on one help page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HelpPage {
    /// Entries under `Subgroups:` (or `Groups:`)
    pub groups: Vec<String>,
    /// Entries under `Commands:`
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
enum Section {
    Groups,
    Commands,
}

fn section_header(line: &str) -> Option<Section> {
    match line {
        "Subgroups:" | "Groups:" => Some(Section::Groups),
        "Commands:" => Some(Section::Commands),
        _ => None,
    }
}

/// `name [Preview] : description` -> `name`. Wrapped description lines and
/// anything else that is not an entry yield `None`.
fn entry_name(line: &str) -> Option<&str> {
    let (left, _) = line.split_once(':')?;
    let mut tokens = left.split_whitespace();
    let name = tokens.next()?;
    let is_name = !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    (is_name && tokens.all(|tag| tag.starts_with('['))).then_some(name)
}

/// Parse the `Subgroups:` and `Commands:` sections of a help page. A
/// section ends at the first blank line.
#[must_use]
pub fn parse_help(text: &str) -> HelpPage {
    let mut page = HelpPage::default();
    let mut section = None;

    for line in text.lines().map(str::trim) {
        if let Some(next) = section_header(line) {
            section = Some(next);
            continue;
        }
        if line.is_empty() {
            section = None;
            continue;
        }
        let (Some(current), Some(name)) = (section, entry_name(line)) else {
            continue;
        };
        match current {
            Section::Groups => page.groups.push(name.to_string()),
            Section::Commands => page.commands.push(name.to_string()),
        }
    }
    page
}

/// Source of CLI help text
#[async_trait]
pub trait HelpSource: Send + Sync {
    /// Output of `az <path...> --help`; an empty path is the top level
    async fn help(&self, path: &[String]) -> Result<String>;
}

/// Runs the installed Azure CLI
#[derive(Debug, Clone, Copy, Default)]
pub struct AzCliHelp;

/// Build the `az <path...> --help` invocation.
#[must_use]
pub fn build_help_command(path: &[String]) -> Command {
    let mut cmd = Command::new(AZ_PROGRAM);
    cmd.args(path).arg("--help");
    cmd
}

#[async_trait]
impl HelpSource for AzCliHelp {
    async fn help(&self, path: &[String]) -> Result<String> {
        let output = TokioCommand::from(build_help_command(path))
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AzpermError::Discovery(format!("failed to run Azure CLI: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzpermError::Discovery(format!(
                "'az {} --help' failed: {}",
                path.join(" "),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Commands found by walking the help tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredCommands {
    /// `group [subgroup...] command`, in walk order
    pub commands: Vec<String>,
    /// Groups whose help page could not be read
    pub skipped_groups: Vec<String>,
}

/// Walk the help tree breadth first. Only the top-level page is required;
/// a group that fails is recorded and skipped.
pub async fn discover_commands(source: &dyn HelpSource) -> Result<DiscoveredCommands> {
    let top = source
        .help(&[])
        .await
        .map_err(|e| AzpermError::Discovery(format!("could not list command groups: {e}")))?;
    let top = parse_help(&top);
    if top.groups.is_empty() {
        return Err(AzpermError::Discovery(
            "no command groups in 'az --help' output".to_string(),
        ));
    }
    debug!(groups = top.groups.len(), "found top-level command groups");

    let mut found = DiscoveredCommands::default();
    let mut pending: VecDeque<Vec<String>> = top.groups.into_iter().map(|g| vec![g]).collect();

    while let Some(path) = pending.pop_front() {
        let group = path.join(" ");
        let page = match source.help(&path).await {
            Ok(text) => parse_help(&text),
            Err(e) => {
                debug!(%group, error = %e, "skipping command group");
                found.skipped_groups.push(group);
                continue;
            }
        };

        found
            .commands
            .extend(page.commands.iter().map(|command| format!("{group} {command}")));
        if path.len() < MAX_GROUP_DEPTH {
            pending.extend(page.groups.into_iter().map(|sub| {
                let mut child = path.clone();
                child.push(sub);
                child
            }));
        }
    }

    Ok(found)
}

/// Outcome of a discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryReport {
    /// Mapping to write to the cache
    pub mapping: CachedMapping,
    /// Number of commands found in help output
    pub discovered: usize,
    /// Mapped commands answered by the live catalog
    pub verified: usize,
    /// Groups whose help page could not be read
    pub skipped_groups: Vec<String>,
}

impl DiscoveryReport {
    /// Number of commands that resolved to at least one permission
    #[must_use]
    pub fn mapped(&self) -> usize {
        self.mapping.commands.len()
    }
}

/// Resolve each command and collect the non-empty results into a mapping
/// tagged [`DISCOVERY_SOURCE`]. Returns the mapping and how many entries
/// came from the live tier.
pub async fn map_commands(resolver: &mut Resolver, commands: &[String]) -> (CachedMapping, usize) {
    let mut entries = BTreeMap::new();
    let mut verified = 0;

    for line in commands {
        let Ok(cmd) = parse(line) else {
            debug!(%line, "skipping unparseable command");
            continue;
        };
        let resolution = resolver.resolve(&cmd).await;
        if resolution.is_empty() {
            continue;
        }
        if resolution.tier == Tier::Live {
            verified += 1;
        }
        entries.insert(
            cmd.full_command().to_string(),
            resolution.permissions.into_iter().collect(),
        );
    }

    let mapping = CachedMapping {
        commands: entries,
        last_updated: Utc::now().to_rfc3339(),
        source: DISCOVERY_SOURCE.to_string(),
    };
    (mapping, verified)
}

/// Full discovery: require a logged-in CLI, walk its help tree and map
/// every command found.
pub async fn discover(
    help: &dyn HelpSource,
    credentials: &dyn CredentialProvider,
    resolver: &mut Resolver,
) -> Result<DiscoveryReport> {
    credentials.access_token().await.map_err(|e| {
        AzpermError::Discovery(format!("not logged in to Azure, run 'az login' first ({e})"))
    })?;

    let found = discover_commands(help).await?;
    info!(
        commands = found.commands.len(),
        skipped = found.skipped_groups.len(),
        "discovered Azure CLI commands"
    );

    let (mapping, verified) = map_commands(resolver, &found.commands).await;
    Ok(DiscoveryReport {
        mapping,
        discovered: found.commands.len(),
        verified,
        skipped_groups: found.skipped_groups,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PermissionCache;
    use crate::resolve::OperationMatcher;
    use std::collections::HashMap;

    const TOP_HELP: &str = "
Group
    az

Subgroups:
    group              : Manage resource groups and template deployments.
    vm                 : Manage Linux or Windows virtual machines.
    broken             : Always fails.

Commands:
    login              : Log in to Azure.
    version            : Show the versions of Azure CLI modules and extensions in JSON
                         format by default or format configured by --output.

To search AI knowledge base for examples, use: az find \"az \"
";

    const VM_HELP: &str = "
Group
    az vm : Manage Linux or Windows virtual machines.

Subgroups:
    image [Preview]    : Information on available virtual-machine images.

Commands:
    create             : Create an Azure Virtual Machine.
                         For an end-to-end tutorial, see https://docs.microsoft.com/azure.
    list               : List details of Virtual Machines.
    start              : Start a stopped VM.
    stop               : Power off (stop) a running VM.
";

    struct StubHelp {
        pages: HashMap<&'static str, &'static str>,
    }

    impl StubHelp {
        fn azure() -> Self {
            Self {
                pages: HashMap::from([
                    ("", TOP_HELP),
                    ("vm", VM_HELP),
                    (
                        "vm image",
                        "Commands:\n    list    [Preview] : List VM images.\n",
                    ),
                    (
                        "group",
                        "Commands:\n    create : Create a new resource group.\n    delete : Delete a resource group.\n",
                    ),
                ]),
            }
        }
    }

    #[async_trait]
    impl HelpSource for StubHelp {
        async fn help(&self, path: &[String]) -> Result<String> {
            let key = path.join(" ");
            self.pages
                .get(key.as_str())
                .map(|page| (*page).to_string())
                .ok_or_else(|| AzpermError::Discovery(format!("no help for '{key}'")))
        }
    }

    struct StubCredential(bool);

    #[async_trait]
    impl CredentialProvider for StubCredential {
        async fn access_token(&self) -> Result<String> {
            if self.0 {
                Ok("token".to_string())
            } else {
                Err(AzpermError::Credential("no subscription found".to_string()))
            }
        }
    }

    fn offline_resolver() -> Resolver {
        Resolver::new(
            PermissionCache::in_memory(CachedMapping::builtin()),
            OperationMatcher::default(),
        )
    }

    #[test]
    fn test_parse_top_level_help() {
        let page = parse_help(TOP_HELP);
        assert_eq!(page.groups, vec!["group", "vm", "broken"]);
        // wrapped description lines are not entries
        assert_eq!(page.commands, vec!["login", "version"]);
    }

    #[test]
    fn test_parse_group_help_with_tags() {
        let page = parse_help(VM_HELP);
        assert_eq!(page.groups, vec!["image"]);
        assert_eq!(page.commands, vec!["create", "list", "start", "stop"]);
    }

    #[test]
    fn test_parse_help_without_sections_is_empty() {
        let page = parse_help("az: 'frobnicate' is not in the 'az' command group.\n");
        assert_eq!(page, HelpPage::default());
    }

    #[test]
    fn test_entry_name_rejects_prose_and_flags() {
        assert_eq!(entry_name("availability-set : Group resources."), Some("availability-set"));
        assert_eq!(entry_name("show [Deprecated] : Show it."), Some("show"));
        assert_eq!(entry_name("For details, see https://aka.ms/x"), None);
        assert_eq!(entry_name("--output -o : Output format."), None);
        assert_eq!(entry_name("no colon here"), None);
    }

    #[test]
    fn test_build_help_command_args() {
        let cmd = build_help_command(&["vm".to_string(), "image".to_string()]);
        assert_eq!(cmd.get_program().to_str().unwrap(), AZ_PROGRAM);
        let args: Vec<&str> = cmd.get_args().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(args, vec!["vm", "image", "--help"]);

        let top = build_help_command(&[]);
        let args: Vec<&str> = top.get_args().map(|a| a.to_str().unwrap()).collect();
        assert_eq!(args, vec!["--help"]);
    }

    #[tokio::test]
    async fn test_discover_commands_walks_subgroups() {
        let found = discover_commands(&StubHelp::azure()).await.unwrap();

        assert_eq!(
            found.commands,
            vec![
                "group create",
                "group delete",
                "vm create",
                "vm list",
                "vm start",
                "vm stop",
                "vm image list",
            ]
        );
        assert_eq!(found.skipped_groups, vec!["broken"]);
    }

    #[tokio::test]
    async fn test_discover_commands_requires_top_level_help() {
        let stub = StubHelp {
            pages: HashMap::new(),
        };
        let err = discover_commands(&stub).await.unwrap_err();
        assert!(err.to_string().contains("could not list command groups"));

        let stub = StubHelp {
            pages: HashMap::from([("", "Commands:\n    login : Log in.\n")]),
        };
        let err = discover_commands(&stub).await.unwrap_err();
        assert!(err.to_string().contains("no command groups"));
    }

    #[tokio::test]
    async fn test_map_commands_keeps_resolved_entries() {
        let mut resolver = offline_resolver();
        let commands = [
            "vm start".to_string(),
            "vm list".to_string(),
            "foo frobnicate".to_string(),
            "login".to_string(),
        ];

        let (mapping, verified) = map_commands(&mut resolver, &commands).await;

        assert_eq!(mapping.source, DISCOVERY_SOURCE);
        assert_eq!(verified, 0);
        assert_eq!(
            mapping.commands["vm start"],
            vec!["Microsoft.Compute/virtualMachines/start/action"]
        );
        assert_eq!(
            mapping.commands["vm list"],
            vec!["Microsoft.Compute/virtualMachines/read"]
        );
        assert!(!mapping.commands.contains_key("foo frobnicate"));
        assert_eq!(mapping.commands.len(), 2);
    }

    #[tokio::test]
    async fn test_discover_builds_report() {
        let mut resolver = offline_resolver();

        let report = discover(&StubHelp::azure(), &StubCredential(true), &mut resolver)
            .await
            .unwrap();

        assert_eq!(report.discovered, 7);
        assert_eq!(report.skipped_groups, vec!["broken"]);
        assert_eq!(report.mapping.source, DISCOVERY_SOURCE);
        assert_eq!(
            report.mapping.commands["group create"],
            vec!["Microsoft.Resources/subscriptions/resourceGroups/write"]
        );
        assert!(report.mapping.commands.contains_key("vm image list"));
        assert_eq!(report.mapped(), report.mapping.commands.len());
    }

    #[tokio::test]
    async fn test_discover_requires_login() {
        let mut resolver = offline_resolver();

        let err = discover(&StubHelp::azure(), &StubCredential(false), &mut resolver)
            .await
            .unwrap_err();

        assert!(matches!(err, AzpermError::Discovery(ref m) if m.contains("az login")));
    }
}
