//! Creation, restoration and comparison of versions in a [`VersionChain`].
//!
//! # Creating a version
//!
//! 1. Resolve the predecessor: the current version, else the
//!    highest-numbered one, else none (the new version is number 1).
//! 2. Write the payload to its version path. The write is exclusive; a file
//!    already at that path means another writer claimed the number.
//! 3. Clear the predecessor's current flag (best effort).
//! 4. Insert the version row, flag it current and mirror it onto the
//!    document, all in one store transaction guarded by the predecessor id
//!    read in step 1. Failure here deletes the file from step 2 and puts
//!    back the flag cleared in step 3.
//! 5. Refresh the document's primary file and append a history entry (both
//!    best effort).
//!
//! A lost race in step 2 or step 4 re-runs the sequence against the fresh
//! predecessor, up to the configured number of attempts. Best-effort
//! failures are recorded and returned as warnings; the version stands.

use std::{path::Path, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use docvault_core::{
  ActorId, DocumentId, VersionId,
  document::StoredFile,
  record::{ErrorCategory, HistoryAction, NewHistoryEntry},
  store::DocumentStore,
  version::{NewVersion, Version, VersionInsert},
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
  Error, Result, diff,
  files::{FileStore, extension_of},
  integrity,
  journal::ErrorJournal,
};

/// Added before each retry, multiplied by the number of attempts so far.
const RETRY_BACKOFF: Duration = Duration::from_millis(10);

// ─── Requests and results ────────────────────────────────────────────────────

/// Everything needed to append one version to a document.
#[derive(Debug, Clone)]
pub struct VersionRequest<'a> {
  pub document_id:        DocumentId,
  pub content:            &'a [u8],
  pub original_filename:  Option<String>,
  /// Overrides the extension derived from `original_filename`.
  pub extension:          Option<String>,
  pub comment:            Option<String>,
  pub change_description: Option<String>,
  pub actor_id:           ActorId,
  pub action:             HistoryAction,
}

impl<'a> VersionRequest<'a> {
  pub fn new(document_id: DocumentId, content: &'a [u8], actor_id: ActorId) -> Self {
    Self {
      document_id,
      content,
      original_filename: None,
      extension: None,
      comment: None,
      change_description: None,
      actor_id,
      action: HistoryAction::VersionCreated,
    }
  }

  pub fn original_filename(mut self, filename: impl Into<String>) -> Self {
    self.original_filename = Some(filename.into());
    self
  }

  pub fn comment(mut self, comment: Option<String>) -> Self {
    self.comment = comment;
    self
  }

  pub fn change_description(mut self, description: Option<String>) -> Self {
    self.change_description = description;
    self
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedVersion {
  pub version:  Version,
  /// Best-effort steps that failed; the version was still created.
  pub warnings: Vec<String>,
}

/// The metadata shown next to a diff.
#[derive(Debug, Clone, Serialize)]
pub struct VersionSummary {
  pub version_id:         VersionId,
  pub number:             u32,
  pub created_at:         DateTime<Utc>,
  pub created_by:         ActorId,
  pub size:               u64,
  pub comment:            Option<String>,
  pub change_description: Option<String>,
}

impl From<&Version> for VersionSummary {
  fn from(v: &Version) -> Self {
    Self {
      version_id:         v.version_id,
      number:             v.number,
      created_at:         v.created_at,
      created_by:         v.created_by,
      size:               v.file.size,
      comment:            v.comment.clone(),
      change_description: v.change_description.clone(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
  pub version1:  VersionSummary,
  pub version2:  VersionSummary,
  /// Unified diff lines; `None` when either payload is not text.
  pub diff:      Option<Vec<String>>,
  pub added:     usize,
  pub removed:   usize,
  pub is_binary: bool,
}

// ─── Chain ───────────────────────────────────────────────────────────────────

pub struct VersionChain<S> {
  store:        Arc<S>,
  files:        FileStore,
  journal:      ErrorJournal<S>,
  max_attempts: u32,
}

impl<S> Clone for VersionChain<S> {
  fn clone(&self) -> Self {
    Self {
      store:        Arc::clone(&self.store),
      files:        self.files.clone(),
      journal:      self.journal.clone(),
      max_attempts: self.max_attempts,
    }
  }
}

impl<S: DocumentStore> VersionChain<S> {
  pub fn new(store: Arc<S>, files: FileStore, max_attempts: u32) -> Self {
    let journal = ErrorJournal::new(Arc::clone(&store));
    Self { store, files, journal, max_attempts: max_attempts.max(1) }
  }

  /// The version a new version of `document_id` would supersede.
  pub async fn resolve_predecessor(&self, document_id: DocumentId) -> Result<Option<Version>> {
    if let Some(current) = self
      .store
      .current_version(document_id)
      .await
      .map_err(Error::store)?
    {
      return Ok(Some(current));
    }
    self
      .store
      .latest_version(document_id)
      .await
      .map_err(Error::store)
  }

  pub async fn create_version(&self, request: VersionRequest<'_>) -> Result<CreatedVersion> {
    let document_id = request.document_id;
    let actor_id = request.actor_id;

    let document = match self.store.get_document(document_id).await {
      Ok(Some(document)) => document,
      Ok(None) => return Err(Error::DocumentNotFound(document_id)),
      Err(e) => return Err(self.fail(None, actor_id, Error::store(e)).await),
    };

    let extension = request
      .extension
      .clone()
      .or_else(|| request.original_filename.as_deref().map(extension_of))
      .or_else(|| document.file.as_ref().map(|f| f.extension.clone()))
      .unwrap_or_default();
    let digest = integrity::digest(request.content);
    let size = request.content.len() as u64;
    let mut warnings = Vec::new();

    let mut attempt = 0;
    let version = loop {
      attempt += 1;
      if attempt > self.max_attempts {
        let err = Error::Version(format!(
          "could not claim a version number for document {document_id} after {} attempts",
          self.max_attempts
        ));
        return Err(self.fail(Some(document_id), actor_id, err).await);
      }
      if attempt > 1 {
        tokio::time::sleep(RETRY_BACKOFF * (attempt - 1)).await;
      }

      let predecessor = match self.resolve_predecessor(document_id).await {
        Ok(p) => p,
        Err(e) => return Err(self.fail(Some(document_id), actor_id, e).await),
      };
      let number = predecessor.as_ref().map_or(1, |p| p.number + 1);
      let path = self.files.version_path(document_id, number, &extension);

      match self.files.write_new(&path, request.content).await {
        Ok(true) => {}
        Ok(false) => {
          debug!(document_id, number, attempt, "version file already taken; retrying");
          continue;
        }
        Err(e) => return Err(self.fail(Some(document_id), actor_id, e).await),
      }

      let mut cleared = None;
      if let Some(p) = predecessor.as_ref().filter(|p| p.is_current) {
        match self.store.clear_current_flag(p.version_id).await {
          Ok(()) => cleared = Some(p),
          Err(e) => {
            let message = format!(
              "could not clear current flag on version {} of document {document_id}: {e}",
              p.number
            );
            warn!(document_id, "{message}");
            self
              .journal
              .record(Some(document_id), actor_id, ErrorCategory::Version, message.clone())
              .await;
            warnings.push(message);
          }
        }
      }

      let input = NewVersion {
        document_id,
        number,
        file: StoredFile {
          path:      path.clone(),
          digest:    digest.clone(),
          size,
          extension: extension.clone(),
        },
        comment: request.comment.clone(),
        change_description: request.change_description.clone(),
        original_filename: request.original_filename.clone(),
        created_by: actor_id,
      };
      let expected = predecessor.as_ref().map(|p| p.version_id);

      match self.store.insert_version(input, expected).await {
        Ok(VersionInsert::Inserted(version)) => break version,
        Ok(VersionInsert::PredecessorMismatch { expected, found }) => {
          debug!(
            document_id,
            number,
            attempt,
            ?expected,
            ?found,
            "predecessor moved during insert; retrying"
          );
          self.discard(&path, document_id, actor_id).await;
        }
        Ok(VersionInsert::DocumentMissing) => {
          self.discard(&path, document_id, actor_id).await;
          return Err(Error::DocumentNotFound(document_id));
        }
        Err(e) => {
          self.discard(&path, document_id, actor_id).await;
          if let Some(p) = cleared {
            self.reinstate(p, actor_id).await;
          }
          let err = Error::store(e);
          return Err(self.fail(Some(document_id), actor_id, err).await);
        }
      }
    };

    let primary = self.files.primary_path(document_id, &extension);
    if let Err(e) = self.files.write(&primary, request.content).await {
      let message = format!(
        "could not refresh primary file of document {document_id} for version {}: {e}",
        version.number
      );
      warn!(document_id, "{message}");
      self
        .journal
        .record(Some(document_id), actor_id, ErrorCategory::Filesystem, message.clone())
        .await;
      warnings.push(message);
    } else if let Some(old) = document.file.as_ref().filter(|f| f.extension != extension) {
      // One primary file per document.
      let stale = self.files.primary_path(document_id, &old.extension);
      if self.files.exists(&stale).await.unwrap_or(false)
        && let Err(e) = self.files.remove(&stale).await
      {
        warn!(document_id, error = %e, "could not remove primary file with old extension");
      }
    }

    let details = match &version.comment {
      Some(comment) => format!("Version {}: {comment}", version.number),
      None => format!("Version {}", version.number),
    };
    let entry = NewHistoryEntry {
      document_id,
      actor_id,
      action: request.action,
      details: Some(details),
    };
    if let Err(e) = self.store.append_history(entry).await {
      let message = format!(
        "could not append history for version {} of document {document_id}: {e}",
        version.number
      );
      warn!(document_id, "{message}");
      self
        .journal
        .record(Some(document_id), actor_id, ErrorCategory::Version, message.clone())
        .await;
      warnings.push(message);
    }

    info!(
      document_id,
      version_id = version.version_id,
      number = version.number,
      warnings = warnings.len(),
      "created version"
    );
    Ok(CreatedVersion { version, warnings })
  }

  /// Re-submit the bytes of an earlier version as a new version.
  ///
  /// The target's file must still match its recorded digest. The target row
  /// is left as it is; the new version's predecessor is the version that was
  /// current before the call.
  pub async fn restore_version(
    &self,
    document_id: DocumentId,
    version_id: VersionId,
    comment: Option<String>,
    actor_id: ActorId,
  ) -> Result<CreatedVersion> {
    let target = self.version_of(document_id, version_id).await?;

    let bytes = match self.files.read(&target.file.path).await {
      Ok(bytes) => bytes,
      Err(e) => {
        let err = Error::Restoration(format!("version {} is unreadable: {e}", target.number));
        return Err(self.fail(Some(document_id), actor_id, err).await);
      }
    };
    let actual = integrity::digest(&bytes);
    if !actual.eq_ignore_ascii_case(&target.file.digest) {
      let err = Error::Integrity {
        path: target.file.path.clone(),
        expected: target.file.digest.clone(),
        actual,
      };
      return Err(self.fail(Some(document_id), actor_id, err).await);
    }

    let n = target.number;
    let comment = match comment {
      Some(c) => format!("{c} (restored from version {n})"),
      None => format!("Restored from version {n}"),
    };
    let request = VersionRequest {
      document_id,
      content: &bytes,
      original_filename: target.original_filename.clone(),
      extension: Some(target.file.extension.clone()),
      comment: Some(comment),
      change_description: Some(format!("Content of version {n} restored")),
      actor_id,
      action: HistoryAction::VersionRestored,
    };
    self.create_version(request).await
  }

  pub async fn compare_versions(
    &self,
    document_id: DocumentId,
    version_id1: VersionId,
    version_id2: VersionId,
  ) -> Result<Comparison> {
    let first = self.version_of(document_id, version_id1).await?;
    let second = self.version_of(document_id, version_id2).await?;
    let a = self.read_version_file(&first).await?;
    let b = self.read_version_file(&second).await?;

    let version1 = VersionSummary::from(&first);
    let version2 = VersionSummary::from(&second);

    let comparison = match (diff::decode_text(&a), diff::decode_text(&b)) {
      (Some(old), Some(new)) => {
        let d = diff::unified(
          old,
          new,
          &format!("version {}", first.number),
          &format!("version {}", second.number),
        );
        Comparison {
          version1,
          version2,
          diff: Some(d.lines),
          added: d.added,
          removed: d.removed,
          is_binary: false,
        }
      }
      _ => Comparison {
        version1,
        version2,
        diff: None,
        added: 0,
        removed: 0,
        is_binary: true,
      },
    };
    Ok(comparison)
  }

  /// All versions of a document, oldest first.
  pub async fn list_versions(&self, document_id: DocumentId) -> Result<Vec<Version>> {
    self
      .store
      .get_document(document_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::DocumentNotFound(document_id))?;
    self
      .store
      .list_versions(document_id)
      .await
      .map_err(Error::store)
  }

  /// The version that superseded `version_id`, derived from predecessor
  /// links. `None` at the tip of the chain.
  pub async fn successor(&self, version_id: VersionId) -> Result<Option<Version>> {
    self
      .store
      .successor_of(version_id)
      .await
      .map_err(Error::store)
  }

  /// A version row together with the bytes of its file.
  pub async fn version_content(
    &self,
    document_id: DocumentId,
    version_id: VersionId,
  ) -> Result<(Version, Vec<u8>)> {
    let version = self.version_of(document_id, version_id).await?;
    let bytes = self.read_version_file(&version).await?;
    Ok((version, bytes))
  }

  async fn version_of(
    &self,
    document_id: DocumentId,
    version_id: VersionId,
  ) -> Result<Version> {
    match self
      .store
      .get_version(version_id)
      .await
      .map_err(Error::store)?
    {
      Some(v) if v.document_id == document_id => Ok(v),
      _ => Err(Error::VersionNotFound { document_id, version_id }),
    }
  }

  async fn read_version_file(&self, version: &Version) -> Result<Vec<u8>> {
    match self.files.read(&version.file.path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) => Err(self.fail(Some(version.document_id), version.created_by, e).await),
    }
  }

  /// Flag `previous` current again after its successor failed to land,
  /// unless another writer has installed a current version in the meantime.
  async fn reinstate(&self, previous: &Version, actor_id: ActorId) {
    let document_id = previous.document_id;
    let result = match self.store.current_version(document_id).await {
      Ok(Some(_)) => return,
      Ok(None) => self.store.mark_current(previous.version_id).await,
      Err(e) => Err(e),
    };
    if let Err(e) = result {
      let message = format!(
        "could not restore current flag on version {} of document {document_id}: {e}",
        previous.number
      );
      error!(document_id, "{message}");
      self
        .journal
        .record(Some(document_id), actor_id, ErrorCategory::Version, message)
        .await;
    }
  }

  /// Delete a version file whose row was never written.
  async fn discard(&self, path: &Path, document_id: DocumentId, actor_id: ActorId) {
    if let Err(e) = self.files.remove(path).await {
      error!(document_id, error = %e, "could not remove version file after failed insert");
      self
        .journal
        .record_error(Some(document_id), actor_id, &e)
        .await;
    }
  }

  async fn fail(
    &self,
    document_id: Option<DocumentId>,
    actor_id: ActorId,
    err: Error,
  ) -> Error {
    error!(?document_id, error = %err, "version operation failed");
    self.journal.record_error(document_id, actor_id, &err).await;
    err
  }
}
