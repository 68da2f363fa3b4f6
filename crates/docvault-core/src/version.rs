//! Version: one immutable snapshot of a document's content.
//!
//! Versions form a singly-linked chain through `predecessor_id`. Only the
//! predecessor is stored; the successor of a version is whichever version
//! names it as predecessor. Once written, the only field that ever changes is
//! `is_current`, and only from `true` to `false`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorId, DocumentId, VersionId, document::StoredFile};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
  pub version_id:         VersionId,
  pub document_id:        DocumentId,
  /// Per-document sequence number, starting at 1 with no gaps.
  pub number:             u32,
  pub file:               StoredFile,
  pub comment:            Option<String>,
  pub change_description: Option<String>,
  /// Filename as uploaded, before it was mapped onto the storage layout.
  pub original_filename:  Option<String>,
  pub created_by:         ActorId,
  /// Server-assigned timestamp; never changes after creation.
  pub created_at:         DateTime<Utc>,
  pub is_current:         bool,
  pub predecessor_id:     Option<VersionId>,
}

/// Input to [`crate::store::DocumentStore::insert_version`].
/// `created_at`, `is_current` and `predecessor_id` are decided by the store.
#[derive(Debug, Clone)]
pub struct NewVersion {
  pub document_id:        DocumentId,
  pub number:             u32,
  pub file:               StoredFile,
  pub comment:            Option<String>,
  pub change_description: Option<String>,
  pub original_filename:  Option<String>,
  pub created_by:         ActorId,
}

/// Result of an optimistic version insert.
#[derive(Debug, Clone)]
pub enum VersionInsert {
  /// The row was inserted as the new current version.
  Inserted(Version),
  /// Another writer moved the chain between read and insert.
  PredecessorMismatch {
    expected: Option<VersionId>,
    found:    Option<VersionId>,
  },
  /// The owning document row does not exist.
  DocumentMissing,
}
