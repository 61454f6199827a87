// src/fsops.rs

//! Blocking filesystem operations for classes directories.
//!
//! Copies and deletions run on the blocking pool so graph walking never
//! stalls a runtime worker. Directory contents are opaque to the scheduler.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

/// Recursively copy `src` into `dest`, creating `dest` if needed.
pub async fn copy_directory(src: &Path, dest: &Path) -> Result<()> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || copy_dir_recursive(&src, &dest))
        .await
        .context("copy task aborted")?
}

/// Delete a classes directory. A directory that is already gone is not an
/// error: deletions are idempotent.
pub async fn delete_directory(dir: &Path) -> Result<()> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || match fs::remove_dir_all(&dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "deleted classes directory");
            Ok(())
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("deleting directory {dir:?}")),
    })
    .await
    .context("delete task aborted")?
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("creating directory {dest:?}"))?;

    let mut pending: Vec<(PathBuf, PathBuf)> = vec![(src.to_path_buf(), dest.to_path_buf())];
    while let Some((from, to)) = pending.pop() {
        for entry in fs::read_dir(&from).with_context(|| format!("reading directory {from:?}"))? {
            let entry = entry?;
            let target = to.join(entry.file_name());
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                fs::create_dir_all(&target)
                    .with_context(|| format!("creating directory {target:?}"))?;
                pending.push((entry.path(), target));
            } else {
                fs::copy(entry.path(), &target)
                    .with_context(|| format!("copying {:?} to {target:?}", entry.path()))?;
            }
        }
    }
    Ok(())
}
