//! azperm - Azure RBAC permission resolver
//!
//! CLI entry point: collects commands from arguments, stdin or shell
//! history and prints the permissions each one needs.

// Allow multiple crate versions from dependencies (can't easily control)
#![allow(clippy::multiple_crate_versions)]

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use azperm::cache::{CachedMapping, PermissionCache};
use azperm::cli::display;
use azperm::config::{Settings, DEFAULT_CONFIG_FILE};
use azperm::discover::{discover, AzCliHelp};
use azperm::doctor::{diagnose, gather_environment};
use azperm::provider::client::discover_endpoint;
use azperm::provider::credential::az_cli_available;
use azperm::provider::{ArmClient, AzCliCredential, MemoCatalogs, MemoCredential};
use azperm::resolve::{LiveSources, OperationMatcher, Resolver};
use azperm::shell::{CurrentShellHistory, HistoryReader};
use azperm::{extract_az_command, parse};

/// Filter used by `--debug`; HTTP stack internals stay quiet
const DEBUG_FILTER: &str = "debug,hyper=warn,h2=warn,reqwest=warn,rustls=warn";

/// Azure CLI permission resolver
///
/// Prints the Azure RBAC permissions an `az` command needs. Pass the command
/// as arguments, pipe one command per line on stdin, or use `--last` to read
/// it from shell history.
#[derive(Parser, Debug)]
#[command(name = "azperm", version, about, disable_version_flag = true)]
struct Cli {
    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,

    /// Verbose tracing on stderr (overrides RUST_LOG)
    #[arg(short, long)]
    debug: bool,

    /// Analyze the most recent `az` command from shell history
    #[arg(short, long)]
    last: bool,

    /// Skip the live provider catalog; use the cache and inference only
    #[arg(long)]
    offline: bool,

    /// Check the environment and exit
    #[arg(long)]
    doctor: bool,

    /// Discover every Azure CLI command and rewrite the permission cache
    #[arg(long, visible_alias = "update", conflicts_with_all = ["offline", "no_cache"])]
    discover: bool,

    /// Settings file (default: azperm.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Provider operations API version (also: AZPERM_API_VERSION)
    #[arg(long, value_name = "VERSION")]
    api_version: Option<String>,

    /// Management endpoint URL (also: AZPERM_MANAGEMENT_ENDPOINT)
    #[arg(long, value_name = "URL")]
    endpoint: Option<String>,

    /// Do not read or write the permission cache file
    #[arg(long)]
    no_cache: bool,

    /// Azure CLI command, with or without the leading `az`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

/// Filter directives: `--debug` wins, then a non-empty `RUST_LOG`, then `warn`.
fn log_filter(debug: bool, rust_log: Option<&str>) -> String {
    if debug {
        return DEBUG_FILTER.to_string();
    }
    rust_log
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .unwrap_or("warn")
        .to_string()
}

fn init_tracing(debug: bool) {
    let directives = log_filter(debug, std::env::var("RUST_LOG").ok().as_deref());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Settings with file, environment and flag layers applied.
fn load_settings(cli: &Cli) -> Result<Settings> {
    let settings = match &cli.config {
        Some(path) => Settings::from_path(path)
            .with_context(|| format!("Failed to load config from '{}'", path.display()))?,
        None => Settings::load_or_default(DEFAULT_CONFIG_FILE)?,
    };
    let mut settings = settings.with_env(|key| std::env::var(key).ok());

    if let Some(version) = &cli.api_version {
        settings.api.api_version = Some(version.clone());
    }
    if let Some(endpoint) = &cli.endpoint {
        settings.api.management_endpoint = Some(endpoint.clone());
    }
    if cli.no_cache {
        settings.cache.enabled = false;
    }
    Ok(settings)
}

/// Input lines in processing order. Empty when nothing was supplied.
/// `history` is only consulted for `--last`.
async fn collect_inputs(cli: &Cli, history: &dyn HistoryReader) -> Result<Vec<String>> {
    if cli.last {
        let command = history.last_az_command().await?;
        eprintln!("Using last command from shell history: {command}");
        return Ok(vec![command]);
    }

    if !cli.command.is_empty() {
        return Ok(vec![cli.command.join(" ")]);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        return Ok(Vec::new());
    }
    let mut buf = String::new();
    stdin
        .lock()
        .read_to_string(&mut buf)
        .context("Failed to read stdin")?;

    Ok(buf
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            if line.starts_with("az ") {
                line.to_string()
            } else {
                extract_az_command(line).unwrap_or_else(|| line.to_string())
            }
        })
        .collect())
}

/// Token and catalog sources for the active cloud, memoized for the run
async fn live_sources(settings: &Settings) -> LiveSources {
    let endpoint = discover_endpoint(settings.api.management_endpoint.as_deref()).await;
    let client = ArmClient::new(&endpoint.url, settings.api_version());
    debug!(
        endpoint = client.endpoint(),
        api_version = client.api_version(),
        source = %endpoint.source,
        "live tier enabled"
    );
    LiveSources::new(MemoCredential::new(AzCliCredential), MemoCatalogs::new(client))
}

async fn build_resolver(cli: &Cli, settings: &Settings) -> Resolver {
    let cache = if settings.cache.enabled {
        PermissionCache::load(&settings.cache.path)
    } else {
        PermissionCache::in_memory(CachedMapping::builtin())
    };
    let resolver = Resolver::new(cache, OperationMatcher::new(settings.matcher.clone()));

    if cli.offline {
        debug!("offline mode, live tier disabled");
        return resolver;
    }
    resolver.with_live(live_sources(settings).await)
}

/// `--discover`: map every command the installed CLI knows and rewrite the
/// cache file with the result.
async fn run_discovery(settings: &Settings) -> Result<()> {
    if !settings.cache.enabled {
        bail!("the permission cache is disabled in settings; discovery has nowhere to write");
    }
    if !az_cli_available().await {
        bail!("Azure CLI not found. Install it and make sure 'az' is on PATH");
    }

    let mut target = PermissionCache::load(&settings.cache.path);
    // existing entries answer the cache tiers; the file itself is rewritten once at the end
    let working = PermissionCache::in_memory(target.mapping().clone());
    let mut resolver = Resolver::new(working, OperationMatcher::new(settings.matcher.clone()))
        .with_live(live_sources(settings).await);

    let report = discover(&AzCliHelp, &AzCliCredential, &mut resolver).await?;
    target
        .replace(report.mapping.clone())
        .context("Failed to save discovered permissions")?;
    print!("{}", display::render_discovery(&report, target.path()));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let settings = load_settings(&cli)?;
    debug!(?settings, "effective settings");

    if cli.doctor {
        let env = gather_environment(&settings, &AzCliCredential).await;
        let report = diagnose(&env);
        print!("{}", display::render_diagnostic_report(&report));
        if !report.is_healthy() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if cli.discover {
        eprintln!("Discovering Azure CLI commands and permissions...");
        if let Err(e) = run_discovery(&settings).await {
            eprintln!("Error during discovery: {e:#}");
            std::process::exit(1);
        }
        return Ok(());
    }

    let inputs = match collect_inputs(&cli, &CurrentShellHistory).await {
        Ok(inputs) => inputs,
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    };
    if inputs.is_empty() {
        Cli::command().print_help().context("Failed to print help")?;
        std::process::exit(1);
    }

    let mut resolver = build_resolver(&cli, &settings).await;
    let mut failed = false;

    for line in &inputs {
        let resolved = match parse(line) {
            Ok(cmd) => resolver
                .resolve_required(&cmd)
                .await
                .map(|resolution| (cmd, resolution)),
            Err(e) => Err(e),
        };
        match resolved {
            Ok((cmd, resolution)) => display::print_resolution(&cmd, &resolution),
            Err(e) => {
                display::print_error(&e);
                failed = true;
            }
        }
    }

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use azperm::AzpermError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays one history answer and counts reads
    struct StubHistory {
        answer: fn() -> azperm::Result<String>,
        reads: AtomicUsize,
    }

    impl StubHistory {
        fn new(answer: fn() -> azperm::Result<String>) -> Self {
            Self {
                answer,
                reads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl HistoryReader for StubHistory {
        async fn last_az_command(&self) -> azperm::Result<String> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            (self.answer)()
        }
    }

    fn azperm_error(err: &anyhow::Error) -> &AzpermError {
        err.downcast_ref::<AzpermError>().unwrap()
    }

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_trailing_command_keeps_flags() {
        let cli = Cli::try_parse_from(["azperm", "-d", "vm", "start", "--name", "vm1"]).unwrap();
        assert!(cli.debug);
        assert_eq!(cli.command, vec!["vm", "start", "--name", "vm1"]);
    }

    #[test]
    fn test_short_version_flag() {
        let err = Cli::try_parse_from(["azperm", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_flags_override_settings() {
        let cli = Cli::try_parse_from([
            "azperm",
            "--config",
            "/nonexistent/azperm.toml",
            "--no-cache",
        ])
        .unwrap();
        assert!(load_settings(&cli).is_err());

        let cli = Cli::try_parse_from([
            "azperm",
            "--api-version",
            "2020-01-01",
            "--endpoint",
            "https://example.invalid",
            "--no-cache",
            "--offline",
        ])
        .unwrap();
        let settings = load_settings(&cli).unwrap();
        assert_eq!(settings.api_version(), "2020-01-01");
        assert_eq!(
            settings.api.management_endpoint.as_deref(),
            Some("https://example.invalid")
        );
        assert!(!settings.cache.enabled);
        assert!(cli.offline);
    }

    #[test]
    fn test_debug_flag_wins_over_rust_log() {
        assert_eq!(log_filter(true, Some("trace")), DEBUG_FILTER);
        assert_eq!(log_filter(true, None), DEBUG_FILTER);
    }

    #[test]
    fn test_rust_log_used_without_debug_flag() {
        assert_eq!(log_filter(false, Some("azperm=info")), "azperm=info");
        assert_eq!(log_filter(false, Some("  ")), "warn");
        assert_eq!(log_filter(false, None), "warn");
    }

    #[tokio::test]
    async fn test_last_reads_history() {
        let cli = Cli::try_parse_from(["azperm", "--last"]).unwrap();
        let history = StubHistory::new(|| Ok("az vm start --name vm1".to_string()));

        let inputs = collect_inputs(&cli, &history).await.unwrap();

        assert_eq!(inputs, vec!["az vm start --name vm1"]);
        assert_eq!(history.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_last_unsupported_shell_is_an_error() {
        let cli = Cli::try_parse_from(["azperm", "-l"]).unwrap();
        let history = StubHistory::new(|| Err(AzpermError::UnsupportedShell("tcsh".to_string())));

        let err = collect_inputs(&cli, &history).await.unwrap_err();

        assert!(matches!(azperm_error(&err), AzpermError::UnsupportedShell(shell) if shell == "tcsh"));
    }

    #[tokio::test]
    async fn test_last_without_az_history_is_an_error() {
        let cli = Cli::try_parse_from(["azperm", "--last"]).unwrap();
        let history = StubHistory::new(|| {
            Err(AzpermError::History {
                shell: "bash".to_string(),
                message: "no Azure CLI commands found in recent history".to_string(),
            })
        });

        let err = collect_inputs(&cli, &history).await.unwrap_err();

        assert!(matches!(azperm_error(&err), AzpermError::History { shell, .. } if shell == "bash"));
        assert!(format!("{err:#}").contains("no Azure CLI commands"));
    }

    #[tokio::test]
    async fn test_arguments_do_not_touch_history() {
        let cli = Cli::try_parse_from(["azperm", "az", "group", "delete", "--name", "rg"]).unwrap();
        let history = StubHistory::new(|| Ok("az vm list".to_string()));

        let inputs = collect_inputs(&cli, &history).await.unwrap();

        assert_eq!(inputs, vec!["az group delete --name rg"]);
        assert_eq!(history.reads.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_discover_flag_and_update_alias() {
        let cli = Cli::try_parse_from(["azperm", "--discover"]).unwrap();
        assert!(cli.discover);
        let cli = Cli::try_parse_from(["azperm", "--update"]).unwrap();
        assert!(cli.discover);
    }

    #[test]
    fn test_discover_conflicts_with_offline_and_no_cache() {
        for flag in ["--offline", "--no-cache"] {
            let err = Cli::try_parse_from(["azperm", "--discover", flag]).unwrap_err();
            assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
        }
    }
}
