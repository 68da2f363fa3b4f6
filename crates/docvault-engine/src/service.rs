//! The facade handed to the application layer.
//!
//! Every operation returns an [`Outcome`] instead of an error. Failures are
//! written to the error log by the component that detects them; the service
//! records only the ones that originate here.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use chrono::{DateTime, Utc};
use docvault_core::{
  ActorId, DocumentId, VersionId,
  document::NewDocument,
  record::{ErrorCategory, ErrorRecord, HistoryAction, HistoryEntry},
  store::{DocumentStore, ErrorQuery},
  version::Version,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::{
  Error, Result,
  backup::{BackupFile, BackupManager, CleanupReport},
  chain::{Comparison, CreatedVersion, VersionChain, VersionRequest},
  config::EngineConfig,
  files::{FileStore, extension_of},
  integrity::{self, IntegrityVerifier, Verification},
  journal::ErrorJournal,
  outcome::Outcome,
  reconcile::{ReconcileReport, Reconciler},
  sweep::{IntegritySweep, SweepReport},
};

/// A payload handed over by the upload layer.
#[derive(Debug, Clone)]
pub struct Upload {
  pub filename: String,
  pub bytes:    Vec<u8>,
}

impl Upload {
  pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    Self { filename: filename.into(), bytes: bytes.into() }
  }
}

/// Metadata of a freshly stored primary file.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetadata {
  pub document_id:       DocumentId,
  pub path:              PathBuf,
  pub digest:            String,
  pub size:              u64,
  pub extension:         String,
  pub original_filename: String,
  pub verified_at:       DateTime<Utc>,
}

pub struct StorageService<S> {
  store:      Arc<S>,
  files:      FileStore,
  chain:      VersionChain<S>,
  backups:    BackupManager<S>,
  sweep:      IntegritySweep<S>,
  reconciler: Reconciler<S>,
  journal:    ErrorJournal<S>,
}

impl<S> Clone for StorageService<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      files:      self.files.clone(),
      chain:      self.chain.clone(),
      backups:    self.backups.clone(),
      sweep:      self.sweep.clone(),
      reconciler: self.reconciler.clone(),
      journal:    self.journal.clone(),
    }
  }
}

impl<S: DocumentStore> StorageService<S> {
  pub fn new(store: Arc<S>, config: &EngineConfig) -> Self {
    let files = FileStore::new(&config.storage_root);
    let backups = BackupManager::new(Arc::clone(&store), files.clone());
    let sweep = IntegritySweep::new(
      Arc::clone(&store),
      IntegrityVerifier::new(files.clone()),
      backups.clone(),
      config.verification_staleness_hours,
    );
    Self {
      chain: VersionChain::new(
        Arc::clone(&store),
        files.clone(),
        config.max_version_attempts,
      ),
      reconciler: Reconciler::new(Arc::clone(&store), files.clone()),
      journal: ErrorJournal::new(Arc::clone(&store)),
      store,
      files,
      backups,
      sweep,
    }
  }

  /// Swap the reconciler, e.g. for one with a different orphan grace period.
  pub fn with_reconciler(mut self, reconciler: Reconciler<S>) -> Self {
    self.reconciler = reconciler;
    self
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  /// Write an upload to the document's primary path.
  pub async fn save_document(
    &self,
    upload: &Upload,
    document_id: DocumentId,
    actor_id: ActorId,
  ) -> Outcome<FileMetadata> {
    match self.write_primary(upload, document_id).await {
      Ok(meta) => Outcome::ok(format!("stored {}", meta.path.display()), meta),
      Err(e) => {
        self.record(document_id, actor_id, &e).await;
        Outcome::failed(format!("could not store document {document_id}: {e}"))
      }
    }
  }

  async fn write_primary(&self, upload: &Upload, document_id: DocumentId) -> Result<FileMetadata> {
    let extension = extension_of(&upload.filename);
    let path = self.files.primary_path(document_id, &extension);
    self.files.write(&path, &upload.bytes).await?;

    Ok(FileMetadata {
      document_id,
      path,
      digest: integrity::digest(&upload.bytes),
      size: upload.bytes.len() as u64,
      extension,
      original_filename: upload.filename.clone(),
      verified_at: Utc::now(),
    })
  }

  /// Create a document row, store its primary file and attach version 1.
  ///
  /// If the file or version 1 cannot be stored, the row and primary file are
  /// taken back out so the registration can be retried with the same id.
  pub async fn register_document(
    &self,
    upload: &Upload,
    document_id: Option<DocumentId>,
    owner_id: ActorId,
  ) -> Outcome<CreatedVersion> {
    let input = NewDocument { document_id, owner_id };
    let document = match self.store.insert_document(input).await {
      Ok(document) => document,
      Err(e) => {
        let err = Error::store(e);
        self.journal.record_error(None, owner_id, &err).await;
        return Outcome::failed(format!("could not create document: {err}"));
      }
    };
    let id = document.document_id;
    let primary = self.files.primary_path(id, &extension_of(&upload.filename));

    if let Err(e) = self.write_primary(upload, id).await {
      self.record(id, owner_id, &e).await;
      self.unregister(id, &primary, owner_id).await;
      return Outcome::failed(format!("could not store document {id}: {e}"));
    }

    let request = VersionRequest::new(id, &upload.bytes, owner_id)
      .original_filename(upload.filename.clone())
      .comment(Some("Initial version".into()));
    match self.chain.create_version(request).await {
      Ok(created) => {
        info!(document_id = id, "registered document");
        let warnings = created.warnings.clone();
        Outcome::ok(format!("document {id} registered"), created).with_warnings(warnings)
      }
      Err(e) => {
        self.unregister(id, &primary, owner_id).await;
        Outcome::failed(format!("could not create version 1 of document {id}: {e}"))
      }
    }
  }

  /// Undo a registration that never got its first version. A document that
  /// picked up a version in the meantime is left alone.
  async fn unregister(&self, id: DocumentId, primary: &Path, actor_id: ActorId) {
    match self.store.discard_document(id).await {
      Ok(true) => {}
      Ok(false) => {
        warn!(document_id = id, "document gained a version; not rolling back registration");
        return;
      }
      Err(e) => {
        let err = Error::store(e);
        error!(document_id = id, error = %err, "could not roll back document row");
        self.journal.record_error(Some(id), actor_id, &err).await;
        return;
      }
    }

    match self.files.exists(primary).await {
      Ok(false) => {}
      Ok(true) => {
        if let Err(e) = self.files.remove(primary).await {
          error!(document_id = id, error = %e, "could not remove primary file");
          self.journal.record_error(None, actor_id, &e).await;
        }
      }
      Err(e) => self.journal.record_error(None, actor_id, &e).await,
    }
    for dir in [self.files.versions_dir(id), self.files.document_dir(id)] {
      if let Err(e) = self.files.remove_empty_dir(&dir).await {
        warn!(document_id = id, error = %e, "could not remove empty directory");
      }
    }
    info!(document_id = id, "rolled back failed registration");
  }

  pub async fn create_document_version(
    &self,
    upload: &Upload,
    document_id: DocumentId,
    actor_id: ActorId,
    comment: Option<String>,
    change_description: Option<String>,
  ) -> Outcome<CreatedVersion> {
    let request = VersionRequest::new(document_id, &upload.bytes, actor_id)
      .original_filename(upload.filename.clone())
      .comment(comment)
      .change_description(change_description);
    created_outcome(self.chain.create_version(request).await, document_id)
  }

  pub async fn restore_version(
    &self,
    document_id: DocumentId,
    version_id: VersionId,
    actor_id: ActorId,
    comment: Option<String>,
  ) -> Outcome<CreatedVersion> {
    let result = self
      .chain
      .restore_version(document_id, version_id, comment, actor_id)
      .await;
    created_outcome(result, document_id)
  }

  /// Bring the bytes of a backup back as a new version.
  pub async fn restore_from_backup(
    &self,
    document_id: DocumentId,
    backup_path: &Path,
    actor_id: ActorId,
    comment: Option<String>,
  ) -> Outcome<CreatedVersion> {
    match self.store.get_document(document_id).await {
      Ok(Some(_)) => {}
      Ok(None) => return Outcome::failed(Error::DocumentNotFound(document_id).to_string()),
      Err(e) => return Outcome::failed(Error::store(e).to_string()),
    }

    let (resolved, bytes) = match self.backups.read_backup(document_id, backup_path).await {
      Ok(found) => found,
      Err(e) => {
        error!(document_id, error = %e, "could not read backup");
        self
          .journal
          .record(Some(document_id), actor_id, ErrorCategory::Restoration, e.to_string())
          .await;
        return Outcome::failed(format!("could not restore document {document_id}: {e}"));
      }
    };

    let name = resolved
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let comment = match comment {
      Some(c) => format!("{c} (restored from backup {name})"),
      None => format!("Restored from backup {name}"),
    };
    let request = VersionRequest {
      document_id,
      content: &bytes,
      original_filename: None,
      extension: Some(extension_of(&name)),
      comment: Some(comment),
      change_description: Some(format!("Content of backup {name} restored")),
      actor_id,
      action: HistoryAction::BackupRestored,
    };
    created_outcome(self.chain.create_version(request).await, document_id)
  }

  pub async fn create_backup(
    &self,
    document_id: DocumentId,
    actor_id: ActorId,
  ) -> Outcome<PathBuf> {
    match self.backups.create_backup(document_id).await {
      Ok(path) => Outcome::ok(format!("backup written to {}", path.display()), path),
      Err(e) => {
        self.record(document_id, actor_id, &e).await;
        Outcome::failed(format!("could not back up document {document_id}: {e}"))
      }
    }
  }

  pub async fn cleanup_old_backups(&self, retention_days: u32) -> Outcome<CleanupReport> {
    match self.backups.cleanup_old_backups(retention_days).await {
      Ok(report) => Outcome::ok(
        format!("deleted {} backups older than {retention_days} days", report.deleted),
        report,
      ),
      Err(e) => Outcome::failed(format!("backup cleanup failed: {e}")),
    }
  }

  pub async fn resolve_error(&self, error_id: i64, remediation: String) -> Outcome<ErrorRecord> {
    match self.store.resolve_error(error_id, remediation).await {
      Ok(Some(record)) => Outcome::ok(format!("error {error_id} resolved"), record),
      Ok(None) => Outcome::failed(format!("error {error_id} not found")),
      Err(e) => Outcome::failed(Error::store(e).to_string()),
    }
  }

  // ── Checks and maintenance ────────────────────────────────────────────────

  /// Verify the document's file now. `success` carries the verdict; the
  /// payload is present whenever the check itself ran.
  pub async fn verify_document_integrity(&self, document_id: DocumentId) -> Outcome<Verification> {
    match self.sweep.verify_document(document_id).await {
      Ok(v) => Outcome {
        success:  v.valid,
        message:  v.message(),
        warnings: Vec::new(),
        payload:  Some(v),
      },
      Err(e) => Outcome::failed(format!("could not verify document {document_id}: {e}")),
    }
  }

  pub async fn run_integrity_sweep(&self) -> Outcome<SweepReport> {
    match self.sweep.run_once().await {
      Ok(report) => Outcome::ok(
        format!("checked {} documents, {} failed", report.checked, report.failed),
        report,
      ),
      Err(e) => Outcome::failed(format!("integrity sweep failed: {e}")),
    }
  }

  pub async fn reconcile(&self) -> Outcome<ReconcileReport> {
    match self.reconciler.run().await {
      Ok(report) => Outcome::ok(
        format!("reconciled {} documents", report.documents_checked),
        report,
      ),
      Err(e) => Outcome::failed(format!("reconcile failed: {e}")),
    }
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  pub async fn compare_versions(
    &self,
    document_id: DocumentId,
    version_id1: VersionId,
    version_id2: VersionId,
  ) -> Outcome<Comparison> {
    match self
      .chain
      .compare_versions(document_id, version_id1, version_id2)
      .await
    {
      Ok(c) => Outcome::ok(
        format!("{} lines added, {} removed", c.added, c.removed),
        c,
      ),
      Err(e) => Outcome::failed(format!("could not compare versions: {e}")),
    }
  }

  pub async fn list_versions(&self, document_id: DocumentId) -> Outcome<Vec<Version>> {
    match self.chain.list_versions(document_id).await {
      Ok(versions) => Outcome::ok(format!("{} versions", versions.len()), versions),
      Err(e) => Outcome::failed(e.to_string()),
    }
  }

  pub async fn successor(&self, version_id: VersionId) -> Outcome<Option<Version>> {
    match self.chain.successor(version_id).await {
      Ok(Some(v)) => Outcome::ok(format!("superseded by version {}", v.number), Some(v)),
      Ok(None) => Outcome::ok(format!("version {version_id} has no successor"), None),
      Err(e) => Outcome::failed(e.to_string()),
    }
  }

  pub async fn version_content(
    &self,
    document_id: DocumentId,
    version_id: VersionId,
  ) -> Outcome<(Version, Vec<u8>)> {
    match self.chain.version_content(document_id, version_id).await {
      Ok((version, bytes)) => Outcome::ok(
        format!("version {} ({} bytes)", version.number, bytes.len()),
        (version, bytes),
      ),
      Err(e) => Outcome::failed(e.to_string()),
    }
  }

  /// History of a document, newest first. `page` starts at 1.
  pub async fn document_history(
    &self,
    document_id: DocumentId,
    page: usize,
    page_size: usize,
  ) -> Outcome<Vec<HistoryEntry>> {
    let page_size = page_size.max(1);
    let offset = page.saturating_sub(1) * page_size;
    match self.store.list_history(document_id, page_size, offset).await {
      Ok(entries) => Outcome::ok(format!("{} entries", entries.len()), entries),
      Err(e) => Outcome::failed(Error::store(e).to_string()),
    }
  }

  pub async fn list_backups(&self, document_id: DocumentId) -> Outcome<Vec<BackupFile>> {
    match self.backups.list_backups(document_id).await {
      Ok(backups) => Outcome::ok(format!("{} backups", backups.len()), backups),
      Err(e) => Outcome::failed(e.to_string()),
    }
  }

  pub async fn storage_errors(&self, query: &ErrorQuery) -> Outcome<Vec<ErrorRecord>> {
    match self.store.list_errors(query).await {
      Ok(records) => Outcome::ok(format!("{} errors", records.len()), records),
      Err(e) => Outcome::failed(Error::store(e).to_string()),
    }
  }

  /// Record a failure that originated in the service, attaching it to the
  /// document only when the document row exists.
  async fn record(&self, document_id: DocumentId, actor_id: ActorId, err: &Error) {
    if matches!(err, Error::DocumentNotFound(_)) {
      return;
    }
    let known = matches!(self.store.get_document(document_id).await, Ok(Some(_)));
    self
      .journal
      .record_error(known.then_some(document_id), actor_id, err)
      .await;
  }
}

fn created_outcome(result: Result<CreatedVersion>, document_id: DocumentId) -> Outcome<CreatedVersion> {
  match result {
    Ok(created) => {
      let warnings = created.warnings.clone();
      let message = format!(
        "version {} of document {document_id} created",
        created.version.number
      );
      Outcome::ok(message, created).with_warnings(warnings)
    }
    Err(e) => Outcome::failed(format!("could not create version of document {document_id}: {e}")),
  }
}
