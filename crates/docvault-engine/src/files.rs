//! Deterministic file placement on a local directory tree.
//!
//! The on-disk layout is a durable contract; existing trees must stay
//! readable:
//!
//! ```text
//! root/{id}/{id}{ext}                          primary file, bytes of the current version
//! root/{id}/versions/{id}_v{n}{ext}            historical version files
//! root/backups/{id}/{id}_{yyyyMMdd_HHmmss}{ext} point-in-time backups
//! ```
//!
//! Every operation reports failure as [`Error::Filesystem`] carrying the
//! operation and path, so callers can branch on the outcome.

use std::{
  io::ErrorKind,
  path::{Path, PathBuf},
  time::SystemTime,
};

use chrono::{DateTime, Utc};
use docvault_core::DocumentId;
use tokio::{fs, io::AsyncWriteExt as _};
use tracing::debug;

use crate::{Error, Result};

const VERSIONS_DIR: &str = "versions";
const BACKUPS_DIR: &str = "backups";
const BACKUP_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

/// The lowercased extension of `filename` including its leading dot, or an
/// empty string when there is none.
pub fn extension_of(filename: &str) -> String {
  Path::new(filename)
    .extension()
    .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
    .unwrap_or_default()
}

/// One entry returned by [`FileStore::list_dir`].
#[derive(Debug, Clone)]
pub struct DirEntry {
  pub path:     PathBuf,
  pub is_dir:   bool,
  pub size:     u64,
  pub modified: SystemTime,
}

#[derive(Debug, Clone)]
pub struct FileStore {
  root: PathBuf,
}

impl FileStore {
  pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

  pub fn root(&self) -> &Path { &self.root }

  // ── Layout ────────────────────────────────────────────────────────────────

  pub fn document_dir(&self, id: DocumentId) -> PathBuf {
    self.root.join(id.to_string())
  }

  pub fn primary_path(&self, id: DocumentId, ext: &str) -> PathBuf {
    self.document_dir(id).join(format!("{id}{ext}"))
  }

  pub fn versions_dir(&self, id: DocumentId) -> PathBuf {
    self.document_dir(id).join(VERSIONS_DIR)
  }

  pub fn version_path(&self, id: DocumentId, number: u32, ext: &str) -> PathBuf {
    self.versions_dir(id).join(format!("{id}_v{number}{ext}"))
  }

  pub fn backups_root(&self) -> PathBuf { self.root.join(BACKUPS_DIR) }

  pub fn backup_dir(&self, id: DocumentId) -> PathBuf {
    self.backups_root().join(id.to_string())
  }

  pub fn backup_path(&self, id: DocumentId, at: DateTime<Utc>, ext: &str) -> PathBuf {
    let stamp = at.format(BACKUP_TIMESTAMP);
    self.backup_dir(id).join(format!("{id}_{stamp}{ext}"))
  }

  // ── I/O ───────────────────────────────────────────────────────────────────

  async fn ensure_parent(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)
        .await
        .map_err(|e| Error::fs("create directory", parent, e))?;
    }
    Ok(())
  }

  /// Write `bytes` to `path`, creating parent directories and replacing any
  /// existing file.
  pub async fn write(&self, path: &Path, bytes: &[u8]) -> Result<()> {
    self.ensure_parent(path).await?;

    let mut file = fs::File::create(path)
      .await
      .map_err(|e| Error::fs("create", path, e))?;
    file
      .write_all(bytes)
      .await
      .map_err(|e| Error::fs("write", path, e))?;
    file.sync_all().await.map_err(|e| Error::fs("sync", path, e))?;

    debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
    Ok(())
  }

  /// Write `bytes` to `path` only if nothing is there yet.
  ///
  /// Returns `false` without touching the existing file when `path` is
  /// already taken. A partially written file is removed before an error is
  /// returned.
  pub async fn write_new(&self, path: &Path, bytes: &[u8]) -> Result<bool> {
    self.ensure_parent(path).await?;

    let mut file = match fs::OpenOptions::new()
      .write(true)
      .create_new(true)
      .open(path)
      .await
    {
      Ok(file) => file,
      Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
      Err(e) => return Err(Error::fs("create", path, e)),
    };

    let written = async {
      file.write_all(bytes).await?;
      file.sync_all().await
    }
    .await;

    if let Err(e) = written {
      drop(file);
      let _ = fs::remove_file(path).await;
      return Err(Error::fs("write", path, e));
    }

    debug!(path = %path.display(), bytes = bytes.len(), "wrote new file");
    Ok(true)
  }

  pub async fn read(&self, path: &Path) -> Result<Vec<u8>> {
    fs::read(path).await.map_err(|e| Error::fs("read", path, e))
  }

  pub async fn exists(&self, path: &Path) -> Result<bool> {
    fs::try_exists(path)
      .await
      .map_err(|e| Error::fs("stat", path, e))
  }

  /// Copy `src` to `dst`, creating the destination's parent directories.
  /// Returns the number of bytes copied.
  pub async fn copy(&self, src: &Path, dst: &Path) -> Result<u64> {
    self.ensure_parent(dst).await?;
    let bytes = fs::copy(src, dst)
      .await
      .map_err(|e| Error::fs("copy", src, e))?;
    debug!(src = %src.display(), dst = %dst.display(), bytes, "copied file");
    Ok(bytes)
  }

  pub async fn remove(&self, path: &Path) -> Result<()> {
    fs::remove_file(path)
      .await
      .map_err(|e| Error::fs("remove", path, e))?;
    debug!(path = %path.display(), "removed file");
    Ok(())
  }

  /// Remove `path` if it is an empty directory. Returns whether it was
  /// removed; a missing directory counts as not removed.
  pub async fn remove_empty_dir(&self, path: &Path) -> Result<bool> {
    let mut entries = match fs::read_dir(path).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
      Err(e) => return Err(Error::fs("list", path, e)),
    };
    let has_entries = entries
      .next_entry()
      .await
      .map_err(|e| Error::fs("list", path, e))?
      .is_some();
    if has_entries {
      return Ok(false);
    }

    fs::remove_dir(path)
      .await
      .map_err(|e| Error::fs("remove directory", path, e))?;
    debug!(path = %path.display(), "removed empty directory");
    Ok(true)
  }

  /// List the immediate children of `path`, sorted by path. A missing
  /// directory lists as empty.
  pub async fn list_dir(&self, path: &Path) -> Result<Vec<DirEntry>> {
    let mut entries = match fs::read_dir(path).await {
      Ok(entries) => entries,
      Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(Error::fs("list", path, e)),
    };

    let mut out = Vec::new();
    while let Some(entry) = entries
      .next_entry()
      .await
      .map_err(|e| Error::fs("list", path, e))?
    {
      let entry_path = entry.path();
      let meta = entry
        .metadata()
        .await
        .map_err(|e| Error::fs("stat", &entry_path, e))?;
      let modified = meta
        .modified()
        .map_err(|e| Error::fs("stat", &entry_path, e))?;
      out.push(DirEntry {
        path: entry_path,
        is_dir: meta.is_dir(),
        size: meta.len(),
        modified,
      });
    }
    out.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(out)
  }
}
