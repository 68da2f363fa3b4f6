//! Append-only records kept alongside the version chain: storage failures and
//! the per-document history trail.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ActorId, DocumentId, Error};

// ─── Storage errors ──────────────────────────────────────────────────────────

/// Which part of the storage subsystem failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
  Filesystem,
  Integrity,
  Version,
  Restoration,
  Db,
}

impl ErrorCategory {
  /// The string stored in the `category` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Filesystem => "filesystem",
      Self::Integrity => "integrity",
      Self::Version => "version",
      Self::Restoration => "restoration",
      Self::Db => "db",
    }
  }
}

impl fmt::Display for ErrorCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ErrorCategory {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "filesystem" => Ok(Self::Filesystem),
      "integrity" => Ok(Self::Integrity),
      "version" => Ok(Self::Version),
      "restoration" => Ok(Self::Restoration),
      "db" => Ok(Self::Db),
      other => Err(Error::UnknownErrorCategory(other.to_owned())),
    }
  }
}

/// One storage-subsystem failure. Rows are only ever updated to mark them
/// resolved by an operator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
  pub error_id:    i64,
  /// Absent when the failure happened before the document row existed.
  pub document_id: Option<DocumentId>,
  pub actor_id:    ActorId,
  pub category:    ErrorCategory,
  pub message:     String,
  pub resolved:    bool,
  /// Free-text notes on what was done about it.
  pub remediation: Option<String>,
  pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewErrorRecord {
  pub document_id: Option<DocumentId>,
  pub actor_id:    ActorId,
  pub category:    ErrorCategory,
  pub message:     String,
}

// ─── History ─────────────────────────────────────────────────────────────────

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
  VersionCreated,
  VersionRestored,
  BackupRestored,
}

impl HistoryAction {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::VersionCreated => "version_created",
      Self::VersionRestored => "version_restored",
      Self::BackupRestored => "backup_restored",
    }
  }
}

impl FromStr for HistoryAction {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "version_created" => Ok(Self::VersionCreated),
      "version_restored" => Ok(Self::VersionRestored),
      "backup_restored" => Ok(Self::BackupRestored),
      other => Err(Error::UnknownHistoryAction(other.to_owned())),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
  pub entry_id:    i64,
  pub document_id: DocumentId,
  pub actor_id:    ActorId,
  pub action:      HistoryAction,
  pub details:     Option<String>,
  pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
  pub document_id: DocumentId,
  pub actor_id:    ActorId,
  pub action:      HistoryAction,
  pub details:     Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn category_strings_roundtrip() {
    for category in [
      ErrorCategory::Filesystem,
      ErrorCategory::Integrity,
      ErrorCategory::Version,
      ErrorCategory::Restoration,
      ErrorCategory::Db,
    ] {
      assert_eq!(category.as_str().parse::<ErrorCategory>().unwrap(), category);
    }
  }

  #[test]
  fn unknown_category_is_rejected() {
    assert!(matches!(
      "integridad".parse::<ErrorCategory>(),
      Err(Error::UnknownErrorCategory(_))
    ));
  }

  #[test]
  fn history_action_strings_roundtrip() {
    for action in [
      HistoryAction::VersionCreated,
      HistoryAction::VersionRestored,
      HistoryAction::BackupRestored,
    ] {
      assert_eq!(action.as_str().parse::<HistoryAction>().unwrap(), action);
    }
  }
}
