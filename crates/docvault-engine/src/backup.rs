//! Point-in-time copies of a document's current file and age-based
//! pruning of the backup tree.

use std::{
  path::{Component, Path, PathBuf},
  sync::Arc,
  time::{Duration, SystemTime},
};

use chrono::{DateTime, Utc};
use docvault_core::{DocumentId, store::DocumentStore};
use serde::Serialize;
use tracing::{info, warn};

use crate::{Error, Result, files::FileStore};

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// One file under a document's backup directory.
#[derive(Debug, Clone, Serialize)]
pub struct BackupFile {
  pub path:     PathBuf,
  pub size:     u64,
  pub modified: DateTime<Utc>,
}

/// What a retention pass did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
  pub deleted:             usize,
  pub directories_removed: usize,
  /// Files or directories that could not be removed; the pass carries on.
  pub failures:            usize,
}

pub struct BackupManager<S> {
  store: Arc<S>,
  files: FileStore,
}

impl<S> Clone for BackupManager<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), files: self.files.clone() }
  }
}

impl<S: DocumentStore> BackupManager<S> {
  pub fn new(store: Arc<S>, files: FileStore) -> Self { Self { store, files } }

  /// Copy the document's current file to a timestamped backup path.
  ///
  /// Two backups of the same document within one second share a path; the
  /// later one replaces the earlier.
  pub async fn create_backup(&self, document_id: DocumentId) -> Result<PathBuf> {
    let document = self
      .store
      .get_document(document_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::DocumentNotFound(document_id))?;
    let file = document.file.ok_or(Error::NoStoredFile(document_id))?;

    let dst = self.files.backup_path(document_id, Utc::now(), &file.extension);
    self.files.copy(&file.path, &dst).await?;

    info!(document_id, path = %dst.display(), "created backup");
    Ok(dst)
  }

  /// Delete backup files last modified more than `retention_days` ago, then
  /// drop any backup directory left empty.
  pub async fn cleanup_old_backups(&self, retention_days: u32) -> Result<CleanupReport> {
    let retention = Duration::from_secs(u64::from(retention_days) * SECS_PER_DAY);
    let cutoff = SystemTime::now()
      .checked_sub(retention)
      .unwrap_or(SystemTime::UNIX_EPOCH);
    self.cleanup_before(cutoff).await
  }

  /// Delete backup files modified strictly before `cutoff`.
  pub async fn cleanup_before(&self, cutoff: SystemTime) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let root = self.files.backups_root();

    for entry in self.files.list_dir(&root).await? {
      if !entry.is_dir {
        self.prune_file(&entry.path, entry.modified, cutoff, &mut report).await;
        continue;
      }

      let children = match self.files.list_dir(&entry.path).await {
        Ok(children) => children,
        Err(e) => {
          warn!(error = %e, "skipping unreadable backup directory");
          report.failures += 1;
          continue;
        }
      };
      for child in children.iter().filter(|c| !c.is_dir) {
        self.prune_file(&child.path, child.modified, cutoff, &mut report).await;
      }

      match self.files.remove_empty_dir(&entry.path).await {
        Ok(true) => report.directories_removed += 1,
        Ok(false) => {}
        Err(e) => {
          warn!(error = %e, "could not remove empty backup directory");
          report.failures += 1;
        }
      }
    }

    info!(
      deleted = report.deleted,
      directories_removed = report.directories_removed,
      failures = report.failures,
      "backup cleanup finished"
    );
    Ok(report)
  }

  async fn prune_file(
    &self,
    path: &Path,
    modified: SystemTime,
    cutoff: SystemTime,
    report: &mut CleanupReport,
  ) {
    if modified >= cutoff {
      return;
    }
    match self.files.remove(path).await {
      Ok(()) => report.deleted += 1,
      Err(e) => {
        warn!(error = %e, "could not delete expired backup");
        report.failures += 1;
      }
    }
  }

  /// Backups of a document, newest first.
  pub async fn list_backups(&self, document_id: DocumentId) -> Result<Vec<BackupFile>> {
    let mut backups: Vec<BackupFile> = self
      .files
      .list_dir(&self.files.backup_dir(document_id))
      .await?
      .into_iter()
      .filter(|e| !e.is_dir)
      .map(|e| BackupFile {
        path:     e.path,
        size:     e.size,
        modified: DateTime::<Utc>::from(e.modified),
      })
      .collect();
    backups.sort_by(|a, b| b.path.cmp(&a.path));
    Ok(backups)
  }

  /// Resolve `path` to a file directly inside the document's backup
  /// directory. A bare file name is taken relative to that directory.
  pub fn resolve_backup(&self, document_id: DocumentId, path: &Path) -> Result<PathBuf> {
    let dir = self.files.backup_dir(document_id);
    let mut components = path.components();
    let bare_name = matches!(
      (components.next(), components.next()),
      (Some(Component::Normal(_)), None)
    );

    let resolved = if bare_name { dir.join(path) } else { path.to_path_buf() };
    if resolved.parent() != Some(dir.as_path()) {
      return Err(Error::Restoration(format!(
        "{} is not a backup of document {document_id}",
        path.display()
      )));
    }
    Ok(resolved)
  }

  /// Read a backup file of `document_id`, returning its resolved path and
  /// bytes.
  pub async fn read_backup(
    &self,
    document_id: DocumentId,
    path: &Path,
  ) -> Result<(PathBuf, Vec<u8>)> {
    let resolved = self.resolve_backup(document_id, path)?;
    if !self.files.exists(&resolved).await? {
      return Err(Error::Restoration(format!(
        "backup {} does not exist",
        resolved.display()
      )));
    }
    let bytes = self.files.read(&resolved).await?;
    Ok((resolved, bytes))
  }
}
