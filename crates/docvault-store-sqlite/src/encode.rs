//! Encoding and decoding helpers between Rust domain types and the plain
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-width RFC 3339 UTC strings so that
//! lexical comparison in SQL matches chronological order. Paths are stored
//! as UTF-8 strings; enum-like fields as their lowercase discriminants.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use docvault_core::{
  document::{Document, StoredFile},
  record::{ErrorRecord, HistoryEntry},
  version::Version,
};
use rusqlite::Row;

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Integers ────────────────────────────────────────────────────────────────

pub fn encode_size(size: u64) -> i64 { i64::try_from(size).unwrap_or(i64::MAX) }

pub fn decode_size(column: &'static str, value: i64) -> Result<u64> {
  u64::try_from(value).map_err(|_| Error::OutOfRange { column, value })
}

pub fn decode_number(value: i64) -> Result<u32> {
  u32::try_from(value).map_err(|_| Error::OutOfRange {
    column: "version_number",
    value,
  })
}

// ─── Paths ───────────────────────────────────────────────────────────────────

pub fn encode_path(path: &std::path::Path) -> String {
  path.to_string_lossy().into_owned()
}

// ─── Row types ───────────────────────────────────────────────────────────────

pub const DOCUMENT_COLUMNS: &str = "document_id, owner_id, file_path, \
  file_digest, file_size, file_extension, created_at, modified_at, \
  last_verified_at, integrity_ok, active";

/// Raw values read directly from a `documents` row.
pub struct RawDocument {
  pub document_id:      i64,
  pub owner_id:         i64,
  pub file_path:        Option<String>,
  pub file_digest:      Option<String>,
  pub file_size:        Option<i64>,
  pub file_extension:   Option<String>,
  pub created_at:       String,
  pub modified_at:      String,
  pub last_verified_at: Option<String>,
  pub integrity_ok:     Option<bool>,
  pub active:           bool,
}

impl RawDocument {
  /// Map a row selected with [`DOCUMENT_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      document_id:      row.get(0)?,
      owner_id:         row.get(1)?,
      file_path:        row.get(2)?,
      file_digest:      row.get(3)?,
      file_size:        row.get(4)?,
      file_extension:   row.get(5)?,
      created_at:       row.get(6)?,
      modified_at:      row.get(7)?,
      last_verified_at: row.get(8)?,
      integrity_ok:     row.get(9)?,
      active:           row.get(10)?,
    })
  }

  pub fn into_document(self) -> Result<Document> {
    // The four mirror columns are written together; a partial set is treated
    // as no file at all.
    let file = match (
      self.file_path,
      self.file_digest,
      self.file_size,
      self.file_extension,
    ) {
      (Some(path), Some(digest), Some(size), Some(extension)) => {
        Some(StoredFile {
          path: PathBuf::from(path),
          digest,
          size: decode_size("file_size", size)?,
          extension,
        })
      }
      _ => None,
    };

    Ok(Document {
      document_id: self.document_id,
      owner_id: self.owner_id,
      file,
      created_at: decode_dt(&self.created_at)?,
      modified_at: decode_dt(&self.modified_at)?,
      last_verified_at: self
        .last_verified_at
        .as_deref()
        .map(decode_dt)
        .transpose()?,
      integrity_ok: self.integrity_ok,
      active: self.active,
    })
  }
}

pub const VERSION_COLUMNS: &str = "version_id, document_id, version_number, \
  file_path, file_digest, file_size, file_extension, comment, \
  change_description, original_filename, created_by, created_at, is_current, \
  predecessor_id";

/// Raw values read directly from a `versions` row.
pub struct RawVersion {
  pub version_id:         i64,
  pub document_id:        i64,
  pub version_number:     i64,
  pub file_path:          String,
  pub file_digest:        String,
  pub file_size:          i64,
  pub file_extension:     String,
  pub comment:            Option<String>,
  pub change_description: Option<String>,
  pub original_filename:  Option<String>,
  pub created_by:         i64,
  pub created_at:         String,
  pub is_current:         bool,
  pub predecessor_id:     Option<i64>,
}

impl RawVersion {
  /// Map a row selected with [`VERSION_COLUMNS`].
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:         row.get(0)?,
      document_id:        row.get(1)?,
      version_number:     row.get(2)?,
      file_path:          row.get(3)?,
      file_digest:        row.get(4)?,
      file_size:          row.get(5)?,
      file_extension:     row.get(6)?,
      comment:            row.get(7)?,
      change_description: row.get(8)?,
      original_filename:  row.get(9)?,
      created_by:         row.get(10)?,
      created_at:         row.get(11)?,
      is_current:         row.get(12)?,
      predecessor_id:     row.get(13)?,
    })
  }

  pub fn into_version(self) -> Result<Version> {
    Ok(Version {
      version_id:         self.version_id,
      document_id:        self.document_id,
      number:             decode_number(self.version_number)?,
      file:               StoredFile {
        path:      PathBuf::from(self.file_path),
        digest:    self.file_digest,
        size:      decode_size("file_size", self.file_size)?,
        extension: self.file_extension,
      },
      comment:            self.comment,
      change_description: self.change_description,
      original_filename:  self.original_filename,
      created_by:         self.created_by,
      created_at:         decode_dt(&self.created_at)?,
      is_current:         self.is_current,
      predecessor_id:     self.predecessor_id,
    })
  }
}

pub const ERROR_COLUMNS: &str = "error_id, document_id, actor_id, category, \
  message, resolved, remediation, recorded_at";

/// Raw values read directly from a `storage_errors` row.
pub struct RawErrorRecord {
  pub error_id:    i64,
  pub document_id: Option<i64>,
  pub actor_id:    i64,
  pub category:    String,
  pub message:     String,
  pub resolved:    bool,
  pub remediation: Option<String>,
  pub recorded_at: String,
}

impl RawErrorRecord {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      error_id:    row.get(0)?,
      document_id: row.get(1)?,
      actor_id:    row.get(2)?,
      category:    row.get(3)?,
      message:     row.get(4)?,
      resolved:    row.get(5)?,
      remediation: row.get(6)?,
      recorded_at: row.get(7)?,
    })
  }

  pub fn into_record(self) -> Result<ErrorRecord> {
    Ok(ErrorRecord {
      error_id:    self.error_id,
      document_id: self.document_id,
      actor_id:    self.actor_id,
      category:    self.category.parse()?,
      message:     self.message,
      resolved:    self.resolved,
      remediation: self.remediation,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

pub const HISTORY_COLUMNS: &str =
  "entry_id, document_id, actor_id, action, details, recorded_at";

/// Raw values read directly from a `history` row.
pub struct RawHistoryEntry {
  pub entry_id:    i64,
  pub document_id: i64,
  pub actor_id:    i64,
  pub action:      String,
  pub details:     Option<String>,
  pub recorded_at: String,
}

impl RawHistoryEntry {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:    row.get(0)?,
      document_id: row.get(1)?,
      actor_id:    row.get(2)?,
      action:      row.get(3)?,
      details:     row.get(4)?,
      recorded_at: row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<HistoryEntry> {
    Ok(HistoryEntry {
      entry_id:    self.entry_id,
      document_id: self.document_id,
      actor_id:    self.actor_id,
      action:      self.action.parse()?,
      details:     self.details,
      recorded_at: decode_dt(&self.recorded_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn encoded_timestamps_sort_lexically() {
    let whole = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
    let fractional = Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap();
    let later = Utc.timestamp_opt(1_700_000_001, 0).unwrap();

    let mut encoded = vec![encode_dt(later), encode_dt(fractional), encode_dt(whole)];
    encoded.sort();
    assert_eq!(encoded, vec![
      encode_dt(whole),
      encode_dt(fractional),
      encode_dt(later)
    ]);
    assert!(encode_dt(whole).ends_with('Z'));
  }

  #[test]
  fn timestamps_roundtrip_at_microsecond_precision() {
    let dt = Utc.timestamp_opt(1_700_000_000, 123_456_000).unwrap();
    assert_eq!(decode_dt(&encode_dt(dt)).unwrap(), dt);
  }

  #[test]
  fn negative_sizes_are_rejected() {
    assert!(matches!(
      decode_size("file_size", -1),
      Err(Error::OutOfRange { column: "file_size", value: -1 })
    ));
  }
}
