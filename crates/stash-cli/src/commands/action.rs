//! `stash action` subcommands.

use anyhow::Context;
use stash_core::ActionKey;
use std::path::Path;

use super::{write_output, CommandContext, Status};

/// Report whether an action has a result; exits non-zero when it has none
pub async fn contains(key: &str, ctx: &CommandContext) -> anyhow::Result<Status> {
    let key = ActionKey::new(key)?;
    let found = ctx.cache.contains_action_result(&key).await?;

    ctx.output.result(if found { "present" } else { "absent" });
    Ok(Status::found(found))
}

/// Store the contents of `file` as the result of `key`
pub async fn put(key: &str, file: &Path, ctx: &CommandContext) -> anyhow::Result<Status> {
    let key = ActionKey::new(key)?;
    let result = tokio::fs::read(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    ctx.cache.put_action_result(&key, result).await?;
    ctx.output.success(&format!("Stored result of {}", key));
    Ok(Status::Success)
}

/// Write the result of `key` to `output` or stdout
pub async fn get(key: &str, output: Option<&Path>, ctx: &CommandContext) -> anyhow::Result<Status> {
    let key = ActionKey::new(key)?;
    let found = write_output(output, |mut sink| {
        let key = key.clone();
        async move { Ok(ctx.cache.get_action_result(&key, &mut sink).await?) }
    })
    .await?;

    if !found {
        ctx.output.warn(&format!("No result stored for {}", key));
    }
    Ok(Status::found(found))
}
