//! Document: the logical identity that a chain of versions hangs off.
//!
//! The file fields on a document are a denormalised mirror of whichever
//! version is currently flagged as current. The version rows are the source
//! of truth; the mirror exists so readers never have to join.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorId, DocumentId};

// ─── Stored file ─────────────────────────────────────────────────────────────

/// Where a payload lives on disk and what it should hash to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
  pub path:      PathBuf,
  /// SHA-256 hex digest of the exact byte sequence at `path`.
  pub digest:    String,
  pub size:      u64,
  /// Lowercased extension including the leading dot, or empty.
  pub extension: String,
}

// ─── Document ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
  pub document_id:      DocumentId,
  pub owner_id:         ActorId,
  /// `None` until the first file for the document has been stored.
  pub file:             Option<StoredFile>,
  pub created_at:       DateTime<Utc>,
  pub modified_at:      DateTime<Utc>,
  pub last_verified_at: Option<DateTime<Utc>>,
  /// Result of the last integrity check; `None` if never checked.
  pub integrity_ok:     Option<bool>,
  pub active:           bool,
}

/// Input to [`crate::store::DocumentStore::insert_document`].
#[derive(Debug, Clone)]
pub struct NewDocument {
  /// Caller-chosen id; the store assigns one when `None`.
  pub document_id: Option<DocumentId>,
  pub owner_id:    ActorId,
}

impl NewDocument {
  pub fn new(owner_id: ActorId) -> Self { Self { document_id: None, owner_id } }

  pub fn with_id(document_id: DocumentId, owner_id: ActorId) -> Self {
    Self { document_id: Some(document_id), owner_id }
  }
}
