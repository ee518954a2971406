//! Filesystem helpers for write-then-publish outputs.
//!
//! Clips are encoded to a sibling temp path and renamed into place. A crashed
//! encode must never leave a truncated file at the final path, since an
//! existing clip is reused as is.

use std::path::Path;
use tokio::fs;

use crate::error::MediaResult;

/// True if `path` is a regular file with at least one byte.
pub async fn nonempty_file_exists(path: impl AsRef<Path>) -> bool {
    match fs::metadata(path.as_ref()).await {
        Ok(metadata) => metadata.is_file() && metadata.len() > 0,
        Err(_) => false,
    }
}

/// Rename `tmp` over `dst`, creating the parent directory if needed.
///
/// Both paths are expected on the same filesystem; `tmp` is removed if the
/// rename fails.
pub async fn publish_file(tmp: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let tmp = tmp.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).await?;
    }

    if let Err(e) = fs::rename(tmp, dst).await {
        tracing::error!(
            "Failed to publish {} -> {}: {}",
            tmp.display(),
            dst.display(),
            e
        );
        remove_if_exists(tmp).await;
        return Err(e.into());
    }

    Ok(())
}

/// Best-effort removal; missing files are fine.
pub async fn remove_if_exists(path: impl AsRef<Path>) {
    let path = path.as_ref();
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}
