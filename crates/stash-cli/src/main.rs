//! # stash-cli
//!
//! Command-line front end for the stash blob cache.
//!
//! Parses arguments, sets up logging, resolves the store configuration and
//! dispatches to the command handlers. Logs go to stderr so blob contents
//! can be piped through stdout.

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::CommandContext;
use output::errors::ErrorFormatter;

/// Content-addressed blob cache with an action cache
#[derive(Parser)]
#[command(name = "stash", version, about = "Content-addressed blob cache")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Backend to store into (memory or disk)
    #[arg(long, global = true, value_name = "KIND")]
    pub backend: Option<String>,

    /// Root directory of the disk backend
    #[arg(long, global = true, value_name = "DIR")]
    pub dir: Option<String>,

    /// Digest function (sha256 or blake3)
    #[arg(long, global = true, value_name = "FUNCTION")]
    pub digest_function: Option<String>,
}

impl Cli {
    /// Flags that override configuration files and environment
    fn config_overrides(&self) -> HashMap<String, String> {
        [
            ("backend", &self.backend),
            ("dir", &self.dir),
            ("digest-function", &self.digest_function),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.clone().map(|value| (key.to_string(), value)))
        .collect()
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the digest of files, or of every file under a directory
    Digest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Check whether a blob is stored
    Contains {
        /// Digest as <hex>/<size>
        digest: String,
    },
    /// Store a file as a blob and print its digest
    Put { file: PathBuf },
    /// Write a blob to a file, or stdout
    Get {
        /// Digest as <hex>/<size>
        digest: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Action cache commands
    #[command(subcommand)]
    Action(ActionCommand),
}

#[derive(Subcommand)]
pub enum ActionCommand {
    /// Store the contents of a file as the result of an action
    Put { key: String, file: PathBuf },
    /// Write the result of an action to a file, or stdout
    Get {
        key: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Check whether an action has a stored result
    Contains { key: String },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.log_json);
    setup_panic_handler();

    debug!("Starting stash v{}", env!("CARGO_PKG_VERSION"));

    match run_cli(cli) {
        Ok(status) => status.into(),
        Err(err) => {
            eprintln!("{}", ErrorFormatter::new().format_anyhow(&err));
            ExitCode::FAILURE
        }
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<commands::Status> {
    let runtime = tokio::runtime::Runtime::new()?;

    runtime.block_on(async move {
        let ctx = CommandContext::new(&cli.config_overrides()).await?;
        let result = commands::dispatch_command(cli.command, &ctx).await;

        debug!(stats = %serde_json::to_string(&ctx.cache.stats())?, "cache activity");
        ctx.cache.close().await?;
        result
    })
}

fn setup_logging(verbose: bool, json: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "stash_cli={level},stash_cache={level},stash_config={level}"
        ))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        error!("stash encountered an unexpected error: {}", panic_info);
        eprintln!("stash crashed! This is a bug.");
        eprintln!("Please report this at: https://github.com/stash-cache/stash/issues");
        eprintln!("Error: {}", panic_info);
    }));
}
