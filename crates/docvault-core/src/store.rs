//! The `DocumentStore` trait and supporting query types.
//!
//! The trait is the relational side of the engine: documents, their version
//! chains, the storage-error log and the history trail. It is implemented by
//! storage backends (e.g. `docvault-store-sqlite`). The engine depends on
//! this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  DocumentId, VersionId,
  document::{Document, NewDocument, StoredFile},
  record::{ErrorRecord, HistoryEntry, NewErrorRecord, NewHistoryEntry},
  version::{NewVersion, Version, VersionInsert},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`DocumentStore::list_errors`]. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ErrorQuery {
  pub document_id: Option<DocumentId>,
  pub resolved:    Option<bool>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a docvault relational backend.
///
/// Every method is its own unit of work. The one multi-row write that must be
/// atomic, [`DocumentStore::insert_version`], runs in a single transaction.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait DocumentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Documents ─────────────────────────────────────────────────────────

  /// Create a document row with no file attached yet.
  ///
  /// Returns an error if a caller-supplied id is already taken.
  fn insert_document(
    &self,
    input: NewDocument,
  ) -> impl Future<Output = Result<Document, Self::Error>> + Send + '_;

  /// Delete a document that never received a version, together with its
  /// history. Error records that named it are kept with the document id
  /// cleared. Returns `false`, writing nothing, if the document is missing
  /// or has versions.
  fn discard_document(
    &self,
    id: DocumentId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Retrieve a document by id. Returns `None` if not found.
  fn get_document(
    &self,
    id: DocumentId,
  ) -> impl Future<Output = Result<Option<Document>, Self::Error>> + Send + '_;

  /// List documents ordered by id, optionally only the active ones.
  fn list_documents(
    &self,
    active_only: bool,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Active documents that carry a file and were last verified before
  /// `verified_before` (or never).
  fn list_stale_documents(
    &self,
    verified_before: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Document>, Self::Error>> + Send + '_;

  /// Overwrite the denormalised file fields of a document and bump its
  /// modification time. Returns `false` if the document does not exist.
  fn sync_document_file(
    &self,
    id: DocumentId,
    file: StoredFile,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Persist the outcome of an integrity check.
  fn record_verification(
    &self,
    id: DocumentId,
    at: DateTime<Utc>,
    ok: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Versions ──────────────────────────────────────────────────────────

  /// The version flagged current for a document, if any.
  fn current_version(
    &self,
    document_id: DocumentId,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + '_;

  /// The version with the highest number for a document, if any.
  fn latest_version(
    &self,
    document_id: DocumentId,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + '_;

  fn get_version(
    &self,
    id: VersionId,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + '_;

  /// All versions of a document in ascending number order.
  fn list_versions(
    &self,
    document_id: DocumentId,
  ) -> impl Future<Output = Result<Vec<Version>, Self::Error>> + Send + '_;

  /// The version whose `predecessor_id` is `id`.
  fn successor_of(
    &self,
    id: VersionId,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + '_;

  /// Flip `is_current` to false. No-op if it already is.
  fn clear_current_flag(
    &self,
    id: VersionId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Flag `id` as the current version of its document, demoting any other
  /// version of that document still flagged current. Returns `false` if the
  /// version does not exist.
  fn mark_current(
    &self,
    id: VersionId,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Insert `input` as the new current version, atomically.
  ///
  /// Inside one transaction the store re-resolves the predecessor (the
  /// current version, else the highest-numbered one, else none) and compares
  /// its id with `expected_predecessor`. On a match it demotes any version
  /// still flagged current, inserts the new row as current with
  /// `predecessor_id = expected_predecessor`, and mirrors the new file onto
  /// the document row. On a mismatch nothing is written.
  fn insert_version(
    &self,
    input: NewVersion,
    expected_predecessor: Option<VersionId>,
  ) -> impl Future<Output = Result<VersionInsert, Self::Error>> + Send + '_;

  // ── Storage errors ────────────────────────────────────────────────────

  fn record_error(
    &self,
    input: NewErrorRecord,
  ) -> impl Future<Output = Result<ErrorRecord, Self::Error>> + Send + '_;

  fn list_errors<'a>(
    &'a self,
    query: &'a ErrorQuery,
  ) -> impl Future<Output = Result<Vec<ErrorRecord>, Self::Error>> + Send + 'a;

  /// Mark an error resolved with remediation notes. Returns `None` if the
  /// error does not exist.
  fn resolve_error(
    &self,
    error_id: i64,
    remediation: String,
  ) -> impl Future<Output = Result<Option<ErrorRecord>, Self::Error>> + Send + '_;

  // ── History ───────────────────────────────────────────────────────────

  fn append_history(
    &self,
    input: NewHistoryEntry,
  ) -> impl Future<Output = Result<HistoryEntry, Self::Error>> + Send + '_;

  /// History for a document, newest first.
  fn list_history(
    &self,
    document_id: DocumentId,
    limit: usize,
    offset: usize,
  ) -> impl Future<Output = Result<Vec<HistoryEntry>, Self::Error>> + Send + '_;
}
