//! On-disk spooling of multipart uploads.
//!
//! File parts are streamed into `SPOOL_DIR` chunk by chunk so large videos
//! never sit in memory. The orchestrator then reads them back by path and
//! removes each one when its batch is done with it.

use std::path::{Path, PathBuf};

use axum::extract::multipart::Field;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, AppResult};

/// A multipart file part written to disk.
#[derive(Debug, Clone)]
pub struct SpooledFile {
    /// Unique on-disk location inside the request directory.
    pub path: PathBuf,
    /// Original file name as sent by the client (base name only).
    pub name: String,
    pub size: u64,
}

/// Empty and recreate the spool root. Files left by a previous run are
/// unreachable once the process restarts.
pub async fn prepare_spool_dir(root: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(root).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(root).await
}

/// Stream one file part into `dir`.
pub async fn spool_field(mut field: Field<'_>, dir: &Path) -> AppResult<SpooledFile> {
    let name = sanitize_file_name(field.file_name().unwrap_or_default())
        .ok_or_else(|| AppError::BadRequest("File part is missing a file name".to_string()))?;

    // Parts of one request may share a base name; the uuid keeps them apart.
    let path = dir.join(format!("{}-{name}", uuid::Uuid::new_v4()));
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to create {name}: {e}")))?;

    let mut size: u64 = 0;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        size += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .map_err(|e| AppError::InternalError(format!("Failed to write {name}: {e}")))?;
    }
    file.flush()
        .await
        .map_err(|e| AppError::InternalError(format!("Failed to write {name}: {e}")))?;

    tracing::debug!(file = %name, size, "Spooled upload part");
    Ok(SpooledFile { path, name, size })
}

/// Remove spooled parts that will never reach the orchestrator.
pub async fn discard<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove spooled part");
            }
        }
    }
}

/// Strip directory components from a client-supplied file name.
fn sanitize_file_name(raw: &str) -> Option<String> {
    let base = raw.rsplit(['/', '\\']).next().unwrap_or(raw).trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(base.to_string())
}
