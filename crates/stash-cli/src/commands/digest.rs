//! `stash digest` command implementation.

use anyhow::Context;
use stash_core::utils::{digest_directory, digest_file, digest_files_parallel};
use stash_core::{Digest, DigestFunction, StashResult};
use std::path::PathBuf;

use super::{CommandContext, Status};

/// Print the digest of each path under the configured digest function.
///
/// A single file prints just its digest. Several paths, or a directory,
/// print one `<digest>  <path>` line per file; directories are walked
/// recursively.
pub async fn execute(paths: &[PathBuf], ctx: &CommandContext) -> anyhow::Result<Status> {
    let function = ctx.cache.digest_function();

    if let [path] = paths {
        if !path.is_dir() {
            let path = path.clone();
            let digest = tokio::task::spawn_blocking(move || digest_file(function, path))
                .await
                .context("Digest task failed")??;
            ctx.output.result(&digest.to_string());
            return Ok(Status::Success);
        }
    }

    let paths = paths.to_vec();
    let digests = tokio::task::spawn_blocking(move || digest_all(function, &paths))
        .await
        .context("Digest task failed")??;
    for (path, digest) in digests {
        ctx.output.result(&format!("{}  {}", digest, path.display()));
    }
    Ok(Status::Success)
}

fn digest_all(function: DigestFunction, paths: &[PathBuf]) -> StashResult<Vec<(PathBuf, Digest)>> {
    let (dirs, files): (Vec<&PathBuf>, Vec<&PathBuf>) = paths.iter().partition(|p| p.is_dir());

    let files: Vec<PathBuf> = files.into_iter().cloned().collect();
    let mut digests = digest_files_parallel(function, &files)?;
    for dir in dirs {
        digests.extend(digest_directory(function, dir)?);
    }
    Ok(digests)
}

