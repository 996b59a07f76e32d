//! Command implementations and dispatch logic.
//!
//! Each command is an async function taking the shared [`CommandContext`]
//! and returning a [`Status`] that becomes the exit code.

use anyhow::Context;
use camino::Utf8PathBuf;
use stash_cache::BlobCache;
use stash_config::{ConfigLoader, StoreConfig};
use std::collections::HashMap;
use std::path::Path;
use std::process::ExitCode;
use tokio::io::AsyncWrite;
use tracing::info;

pub mod action;
pub mod blob;
pub mod digest;


use crate::output::OutputHandler;
use crate::{ActionCommand, Commands};

/// Shared context for all commands
pub struct CommandContext {
    pub config: StoreConfig,
    pub cache: BlobCache,
    pub output: OutputHandler,
}

impl CommandContext {
    /// Resolve configuration from the working directory and open the store
    pub async fn new(overrides: &HashMap<String, String>) -> anyhow::Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current directory")?;
        let cwd = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|path| anyhow::anyhow!("Working directory is not UTF-8: {}", path.display()))?;

        let config = ConfigLoader::new(cwd).load(overrides).await?;
        Self::with_config(config)
    }

    /// Open the store `config` selects
    pub fn with_config(config: StoreConfig) -> anyhow::Result<Self> {
        let cache = BlobCache::open(&config)?;
        Ok(Self {
            config,
            cache,
            output: OutputHandler::new(),
        })
    }
}

/// Dispatch a command to its handler
pub async fn dispatch_command(command: Commands, ctx: &CommandContext) -> anyhow::Result<Status> {
    match command {
        Commands::Digest { paths } => {
            info!("Computing digests of {} path(s)", paths.len());
            digest::execute(&paths, ctx).await
        }
        Commands::Contains { digest } => blob::contains(&digest, ctx).await,
        Commands::Put { file } => {
            info!("Storing {}", file.display());
            blob::put(&file, ctx).await
        }
        Commands::Get { digest, output } => blob::get(&digest, output.as_deref(), ctx).await,
        Commands::Action(ActionCommand::Put { key, file }) => {
            info!("Storing result of action {}", key);
            action::put(&key, &file, ctx).await
        }
        Commands::Action(ActionCommand::Get { key, output }) => {
            action::get(&key, output.as_deref(), ctx).await
        }
        Commands::Action(ActionCommand::Contains { key }) => action::contains(&key, ctx).await,
    }
}

/// How a command ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    /// The requested record is not stored
    NotFound,
}

impl Status {
    /// Status of a presence check
    pub fn found(found: bool) -> Self {
        if found {
            Status::Success
        } else {
            Status::NotFound
        }
    }
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Success => ExitCode::SUCCESS,
            Status::NotFound => ExitCode::FAILURE,
        }
    }
}

/// Run `fetch` against `output`, or stdout when no path is given.
///
/// A file that was not fully written (absent record or failed transfer) is
/// removed again.
pub async fn write_output<F, Fut>(output: Option<&Path>, fetch: F) -> anyhow::Result<bool>
where
    F: FnOnce(Box<dyn AsyncWrite + Unpin + Send>) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<bool>>,
{
    let Some(path) = output else {
        return fetch(Box::new(tokio::io::stdout())).await;
    };

    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    let result = fetch(Box::new(file)).await;
    if !matches!(result, Ok(true)) {
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}
