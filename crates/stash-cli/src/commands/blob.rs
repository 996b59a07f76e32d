//! Blob commands: `stash contains`, `stash put` and `stash get`.

use anyhow::Context;
use stash_cache::UploadOutcome;
use stash_core::utils::digest_file;
use stash_core::Digest;
use std::path::Path;

use super::{write_output, CommandContext, Status};

fn parse_digest(text: &str) -> anyhow::Result<Digest> {
    Ok(text.parse::<Digest>()?)
}

/// Report whether a blob is stored; exits non-zero when it is not
pub async fn contains(digest: &str, ctx: &CommandContext) -> anyhow::Result<Status> {
    let digest = parse_digest(digest)?;
    let found = ctx.cache.contains(&digest).await?;

    ctx.output.result(if found { "present" } else { "absent" });
    Ok(Status::found(found))
}

/// Store `file` under its digest and print the digest
pub async fn put(file: &Path, ctx: &CommandContext) -> anyhow::Result<Status> {
    let function = ctx.cache.digest_function();
    let path = file.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || digest_file(function, path))
        .await
        .context("Digest task failed")??;

    match ctx.cache.upload_file(&digest, file).await? {
        UploadOutcome::Stored => ctx.output.success(&format!("Stored {}", file.display())),
        UploadOutcome::AlreadyPresent => ctx.output.info("Blob already present"),
    }
    ctx.output.result(&digest.to_string());
    Ok(Status::Success)
}

/// Write a blob to `output` or stdout; exits non-zero when it is absent
pub async fn get(digest: &str, output: Option<&Path>, ctx: &CommandContext) -> anyhow::Result<Status> {
    let digest = parse_digest(digest)?;
    let found = write_output(output, |mut sink| async move {
        Ok(ctx.cache.get(&digest, &mut sink).await?)
    })
    .await?;

    if !found {
        ctx.output.warn(&format!("Blob {} not found", digest));
    }
    Ok(Status::found(found))
}
