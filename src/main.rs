//! runos: command-line client and MCP server for the RunOS platform
//!
//! Subcommands come from two places: a fixed set (`mcp`, `config`,
//! `version`) and the backend's manifest, which contributes one nested
//! subcommand per operation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Arg, ArgMatches, Command, CommandFactory, Parser};
use thiserror::Error;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use runos::api::{auth, ApiClient, HttpApiClient};
use runos::cli::{self, CommandTree, Executor, STATIC_COMMANDS};
use runos::config::{self, Config, ConfigKey};
use runos::error::{CommandError, ConfigError, ManifestError};
use runos::manifest::loader::{self, ManifestLoader};
use runos::manifest::Manifest;
use runos::mcp::{LineTransport, McpServer, ToolDispatcher};
use runos::request::RuntimeContext;

/// Manage RunOS clusters and services from the command line or over MCP.
#[derive(Parser, Debug)]
#[command(name = "runos")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration directory (default: ~/.runos)
    #[arg(long, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    /// Load the manifest from this file instead of the backend
    #[arg(long, value_name = "FILE", env = "RUNOS_MANIFEST")]
    manifest: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Root flags that take a separate value.
const VALUE_FLAGS: [&str; 2] = ["--config-dir", "--manifest"];

#[derive(Debug, Error)]
enum Failure {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Splits `argv` into the root-flag prefix and the first subcommand name.
///
/// Help and version flags are left out of the prefix so they are handled by
/// the full command, which knows the manifest subcommands.
fn split_globals(argv: &[OsString]) -> (Vec<OsString>, Option<String>) {
    let mut prefix: Vec<OsString> = argv.iter().take(1).cloned().collect();
    let mut rest = argv.iter().skip(1);

    while let Some(token) = rest.next() {
        let Some(text) = token.to_str() else {
            break;
        };
        if text == "--" {
            break;
        }
        if !text.starts_with('-') {
            return (prefix, Some(text.to_string()));
        }
        if matches!(text, "-h" | "--help" | "-V" | "--version") {
            continue;
        }
        prefix.push(token.clone());
        if VALUE_FLAGS.contains(&text) {
            if let Some(value) = rest.next() {
                prefix.push(value.clone());
            }
        }
    }
    (prefix, None)
}

fn static_commands() -> [Command; 3] {
    [
        Command::new("mcp").about("Run the MCP server on stdio"),
        Command::new("config")
            .about("Show or change configuration")
            .subcommand_required(true)
            .arg_required_else_help(true)
            .subcommand(
                Command::new("get")
                    .about("Print one configuration value, or all of them")
                    .arg(Arg::new("key").value_name("KEY").help(KEY_HELP)),
            )
            .subcommand(
                Command::new("set")
                    .about("Change a configuration value")
                    .arg(Arg::new("key").value_name("KEY").required(true).help(KEY_HELP))
                    .arg(Arg::new("value").value_name("VALUE").required(true)),
            ),
        Command::new("version").about("Print version information"),
    ]
}

const KEY_HELP: &str = "One of: cid, account-id, console-url, conductor-url, jobs-endpoint";

fn empty_manifest() -> Manifest {
    Manifest {
        version: String::new(),
        operations: Vec::new(),
    }
}

async fn load_manifest(
    globals: &Cli,
    dir: &Path,
    base_url: &str,
    client: &Arc<dyn ApiClient>,
) -> Result<Manifest, ManifestError> {
    match &globals.manifest {
        Some(path) => loader::load_file(path),
        None => {
            ManifestLoader::new(dir, base_url, Arc::clone(client))
                .load()
                .await
        }
    }
}

fn run_config(matches: &ArgMatches, dir: &Path, cfg: &mut Config) -> Result<(), Failure> {
    match matches.subcommand() {
        Some(("get", sub)) => match sub.get_one::<String>("key") {
            Some(key) => {
                let key: ConfigKey = key.parse()?;
                println!("{}", cfg.get(key).unwrap_or_default());
            }
            None => {
                for key in ConfigKey::ALL {
                    println!("{:<14} {}", format!("{key}:"), cfg.get(key).unwrap_or_default());
                }
            }
        },
        Some(("set", sub)) => {
            let key: ConfigKey = sub
                .get_one::<String>("key")
                .map(String::as_str)
                .unwrap_or_default()
                .parse()?;
            let value = sub.get_one::<String>("value").map(String::as_str).unwrap_or_default();
            cfg.set(key, value)?;
            config::save_config(dir, cfg)?;
            println!("Set {key} to {}", cfg.get(key).unwrap_or_default());
        }
        _ => {}
    }
    Ok(())
}

async fn serve(
    manifest: Manifest,
    client: Arc<dyn ApiClient>,
    ctx: RuntimeContext,
) -> Result<(), Failure> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        operations = manifest.operations.len(),
        base_url = %ctx.base_url,
        "Starting MCP server"
    );

    let tools = ToolDispatcher::new(Arc::new(manifest), client, ctx);
    let mut server = McpServer::new(LineTransport::stdio(), tools);

    match server.run_until_shutdown().await {
        Ok(()) => {
            info!("Server shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Server error");
            Err(e.into())
        }
    }
}

async fn run(
    argv: Vec<OsString>,
    first: Option<&str>,
    globals: &Cli,
    dir: &Path,
    mut cfg: Config,
) -> Result<(), Failure> {
    let client: Arc<dyn ApiClient> =
        Arc::new(HttpApiClient::new(auth::provider_from_config(&cfg))?);

    let base_url = if first == Some("mcp") {
        cfg.conductor_url()
    } else {
        cfg.console_url()
    }
    .to_string();

    let needs_manifest = first.map_or(true, |c| c == "mcp" || !STATIC_COMMANDS.contains(&c));
    let manifest = if needs_manifest {
        match load_manifest(globals, dir, &base_url, &client).await {
            Ok(manifest) => manifest,
            // Help still works without a manifest.
            Err(e) if first.map_or(true, |c| c == "help") => {
                warn!(error = %e, "No manifest available, showing built-in commands only");
                empty_manifest()
            }
            Err(e) => return Err(e.into()),
        }
    } else {
        empty_manifest()
    };

    let tree = CommandTree::from_manifest(&manifest);
    let matches = Cli::command()
        .subcommands(static_commands())
        .subcommands(cli::build_commands(&tree, &manifest))
        .arg_required_else_help(true)
        .try_get_matches_from(argv)
        .unwrap_or_else(|e| e.exit());

    let Some((name, sub)) = matches.subcommand() else {
        return Ok(());
    };

    let ctx = RuntimeContext::new(base_url)
        .with_account_id(cfg.account_id().map(str::to_string))
        .with_cluster_id(cfg.default_cluster_id().map(str::to_string));

    match name {
        "mcp" => serve(manifest, client, ctx).await,
        "config" => run_config(sub, dir, &mut cfg),
        "version" => {
            println!("runos {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        _ => {
            let (op, leaf) = cli::find_leaf(&manifest, name, sub)?;
            let invocation = cli::invocation_from_matches(op, leaf);
            let executor = Executor::new(client, ctx, cfg.jobs_endpoint());

            let stdout = std::io::stdout();
            let mut out = stdout.lock();
            executor.execute(op, &invocation, &mut out).await?;
            Ok(())
        }
    }
}

/// Entry point for the runos binary.
fn main() -> ExitCode {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let (prefix, first) = split_globals(&argv);
    let globals = Cli::try_parse_from(prefix).unwrap_or_else(|e| e.exit());

    let dir = match config::config_dir(globals.config_dir.as_deref()) {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let cfg = match config::load_config(&dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            eprintln!("\nConfig file: {}", dir.join(config::CONFIG_FILE_NAME).display());
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(globals.verbose, globals.quiet, &cfg.logging.level));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to create Tokio runtime");

    match runtime.block_on(run(argv, first.as_deref(), &globals, &dir, cfg)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
