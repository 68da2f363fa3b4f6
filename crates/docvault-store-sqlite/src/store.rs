//! The SQLite implementation of [`DocumentStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};

use docvault_core::{
  DocumentId, VersionId,
  document::{Document, NewDocument, StoredFile},
  record::{ErrorRecord, HistoryEntry, NewErrorRecord, NewHistoryEntry},
  store::{DocumentStore, ErrorQuery},
  version::{NewVersion, Version, VersionInsert},
};

use crate::{
  Error, Result,
  encode::{
    DOCUMENT_COLUMNS, ERROR_COLUMNS, HISTORY_COLUMNS, RawDocument,
    RawErrorRecord, RawHistoryEntry, RawVersion, VERSION_COLUMNS, encode_dt,
    encode_path, encode_size,
  },
  schema::SCHEMA,
};

/// What the insert transaction decided, before any decoding happens.
enum RawInsert {
  Inserted(i64),
  Mismatch(Option<i64>),
  DocumentMissing,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A docvault store backed by a single SQLite file.
///
/// The inner connection is reference-counted, so clones share it.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run a single-row version query keyed by one integer parameter.
  async fn query_version(
    &self,
    condition: &'static str,
    key: i64,
  ) -> Result<Option<Version>> {
    let raw: Option<RawVersion> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM versions WHERE {condition}");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![key], RawVersion::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawVersion::into_version).transpose()
  }
}

// ─── DocumentStore impl ──────────────────────────────────────────────────────

impl DocumentStore for SqliteStore {
  type Error = Error;

  // ── Documents ─────────────────────────────────────────────────────────────

  async fn insert_document(&self, input: NewDocument) -> Result<Document> {
    let now      = Utc::now();
    let at_str   = encode_dt(now);
    let owner_id = input.owner_id;
    let wanted   = input.document_id;

    let assigned: Option<i64> = self
      .conn
      .call(move |conn| {
        if let Some(id) = wanted {
          let taken = conn
            .query_row(
              "SELECT 1 FROM documents WHERE document_id = ?1",
              rusqlite::params![id],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if taken {
            return Ok(None);
          }
        }

        conn.execute(
          "INSERT INTO documents (document_id, owner_id, created_at, modified_at, active)
           VALUES (?1, ?2, ?3, ?3, 1)",
          rusqlite::params![wanted, owner_id, at_str],
        )?;
        Ok(Some(conn.last_insert_rowid()))
      })
      .await?;

    // `None` only comes back when a caller-chosen id was already taken.
    let Some(document_id) = assigned else {
      return Err(Error::DocumentExists(wanted.unwrap_or_default()));
    };

    Ok(Document {
      document_id,
      owner_id,
      file: None,
      created_at: now,
      modified_at: now,
      last_verified_at: None,
      integrity_ok: None,
      active: true,
    })
  }

  async fn discard_document(&self, id: DocumentId) -> Result<bool> {
    let discarded = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let has_versions = tx
          .query_row(
            "SELECT 1 FROM versions WHERE document_id = ?1 LIMIT 1",
            rusqlite::params![id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if has_versions {
          return Ok(false);
        }

        tx.execute(
          "UPDATE storage_errors SET document_id = NULL WHERE document_id = ?1",
          rusqlite::params![id],
        )?;
        tx.execute("DELETE FROM history WHERE document_id = ?1", rusqlite::params![id])?;
        let deleted = tx.execute(
          "DELETE FROM documents WHERE document_id = ?1",
          rusqlite::params![id],
        )?;

        tx.commit()?;
        Ok(deleted == 1)
      })
      .await?;

    Ok(discarded)
  }

  async fn get_document(&self, id: DocumentId) -> Result<Option<Document>> {
    let raw: Option<RawDocument> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE document_id = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], RawDocument::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawDocument::into_document).transpose()
  }

  async fn list_documents(&self, active_only: bool) -> Result<Vec<Document>> {
    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {DOCUMENT_COLUMNS} FROM documents
           WHERE (?1 = 0 OR active = 1)
           ORDER BY document_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![active_only], RawDocument::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn list_stale_documents(
    &self,
    verified_before: DateTime<Utc>,
  ) -> Result<Vec<Document>> {
    let cutoff_str = encode_dt(verified_before);

    let raws: Vec<RawDocument> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {DOCUMENT_COLUMNS} FROM documents
           WHERE active = 1
             AND file_path IS NOT NULL
             AND (last_verified_at IS NULL OR last_verified_at < ?1)
           ORDER BY document_id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![cutoff_str], RawDocument::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawDocument::into_document).collect()
  }

  async fn sync_document_file(&self, id: DocumentId, file: StoredFile) -> Result<bool> {
    let path_str = encode_path(&file.path);
    let size     = encode_size(file.size);
    let at_str   = encode_dt(Utc::now());

    let changed = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE documents
           SET file_path = ?2, file_digest = ?3, file_size = ?4,
               file_extension = ?5, modified_at = ?6
           WHERE document_id = ?1",
          rusqlite::params![id, path_str, file.digest, size, file.extension, at_str],
        )?)
      })
      .await?;

    Ok(changed > 0)
  }

  async fn record_verification(
    &self,
    id: DocumentId,
    at: DateTime<Utc>,
    ok: bool,
  ) -> Result<()> {
    let at_str = encode_dt(at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE documents SET last_verified_at = ?2, integrity_ok = ?3
           WHERE document_id = ?1",
          rusqlite::params![id, at_str, ok],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Versions ──────────────────────────────────────────────────────────────

  async fn current_version(&self, document_id: DocumentId) -> Result<Option<Version>> {
    self
      .query_version("document_id = ?1 AND is_current = 1", document_id)
      .await
  }

  async fn latest_version(&self, document_id: DocumentId) -> Result<Option<Version>> {
    self
      .query_version(
        "document_id = ?1 ORDER BY version_number DESC LIMIT 1",
        document_id,
      )
      .await
  }

  async fn get_version(&self, id: VersionId) -> Result<Option<Version>> {
    self.query_version("version_id = ?1", id).await
  }

  async fn list_versions(&self, document_id: DocumentId) -> Result<Vec<Version>> {
    let raws: Vec<RawVersion> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {VERSION_COLUMNS} FROM versions
           WHERE document_id = ?1
           ORDER BY version_number"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![document_id], RawVersion::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVersion::into_version).collect()
  }

  async fn successor_of(&self, id: VersionId) -> Result<Option<Version>> {
    self
      .query_version("predecessor_id = ?1 ORDER BY version_number LIMIT 1", id)
      .await
  }

  async fn clear_current_flag(&self, id: VersionId) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE versions SET is_current = 0 WHERE version_id = ?1",
          rusqlite::params![id],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn mark_current(&self, id: VersionId) -> Result<bool> {
    let found = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let document_id: Option<i64> = tx
          .query_row(
            "SELECT document_id FROM versions WHERE version_id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
          )
          .optional()?;
        let Some(document_id) = document_id else {
          return Ok(false);
        };

        // Demote first; the partial unique index allows one current row.
        tx.execute(
          "UPDATE versions SET is_current = 0
           WHERE document_id = ?1 AND is_current = 1 AND version_id != ?2",
          rusqlite::params![document_id, id],
        )?;
        tx.execute(
          "UPDATE versions SET is_current = 1 WHERE version_id = ?1",
          rusqlite::params![id],
        )?;

        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(found)
  }

  async fn insert_version(
    &self,
    input: NewVersion,
    expected_predecessor: Option<VersionId>,
  ) -> Result<VersionInsert> {
    let created_at  = Utc::now();
    let at_str      = encode_dt(created_at);
    let document_id = input.document_id;
    let number      = input.number;
    let path_str    = encode_path(&input.file.path);
    let digest      = input.file.digest.clone();
    let size        = encode_size(input.file.size);
    let extension   = input.file.extension.clone();
    let comment     = input.comment.clone();
    let change      = input.change_description.clone();
    let original    = input.original_filename.clone();
    let created_by  = input.created_by;

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let exists = tx
          .query_row(
            "SELECT 1 FROM documents WHERE document_id = ?1",
            rusqlite::params![document_id],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(RawInsert::DocumentMissing);
        }

        // Same resolution rule the engine used: current, else highest number.
        let current: Option<i64> = tx
          .query_row(
            "SELECT version_id FROM versions WHERE document_id = ?1 AND is_current = 1",
            rusqlite::params![document_id],
            |r| r.get(0),
          )
          .optional()?;
        let found = match current {
          Some(id) => Some(id),
          None => tx
            .query_row(
              "SELECT version_id FROM versions WHERE document_id = ?1
               ORDER BY version_number DESC LIMIT 1",
              rusqlite::params![document_id],
              |r| r.get(0),
            )
            .optional()?,
        };
        if found != expected_predecessor {
          return Ok(RawInsert::Mismatch(found));
        }

        tx.execute(
          "UPDATE versions SET is_current = 0 WHERE document_id = ?1 AND is_current = 1",
          rusqlite::params![document_id],
        )?;

        tx.execute(
          "INSERT INTO versions (
             document_id, version_number, file_path, file_digest, file_size,
             file_extension, comment, change_description, original_filename,
             created_by, created_at, is_current, predecessor_id
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 1, ?12)",
          rusqlite::params![
            document_id,
            number,
            path_str,
            digest,
            size,
            extension,
            comment,
            change,
            original,
            created_by,
            at_str,
            expected_predecessor,
          ],
        )?;
        let version_id = tx.last_insert_rowid();

        // The digest was computed from the bytes just written, so the mirror
        // starts out verified.
        tx.execute(
          "UPDATE documents
           SET file_path = ?2, file_digest = ?3, file_size = ?4,
               file_extension = ?5, modified_at = ?6,
               last_verified_at = ?6, integrity_ok = 1
           WHERE document_id = ?1",
          rusqlite::params![document_id, path_str, digest, size, extension, at_str],
        )?;

        tx.commit()?;
        Ok(RawInsert::Inserted(version_id))
      })
      .await?;

    Ok(match outcome {
      RawInsert::Inserted(version_id) => VersionInsert::Inserted(Version {
        version_id,
        document_id,
        number,
        file: input.file,
        comment: input.comment,
        change_description: input.change_description,
        original_filename: input.original_filename,
        created_by,
        created_at,
        is_current: true,
        predecessor_id: expected_predecessor,
      }),
      RawInsert::Mismatch(found) => VersionInsert::PredecessorMismatch {
        expected: expected_predecessor,
        found,
      },
      RawInsert::DocumentMissing => VersionInsert::DocumentMissing,
    })
  }

  // ── Storage errors ────────────────────────────────────────────────────────

  async fn record_error(&self, input: NewErrorRecord) -> Result<ErrorRecord> {
    let recorded_at  = Utc::now();
    let at_str       = encode_dt(recorded_at);
    let document_id  = input.document_id;
    let actor_id     = input.actor_id;
    let category_str = input.category.as_str();
    let message      = input.message.clone();

    let error_id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO storage_errors (document_id, actor_id, category, message, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![document_id, actor_id, category_str, message, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(ErrorRecord {
      error_id,
      document_id,
      actor_id,
      category: input.category,
      message: input.message,
      resolved: false,
      remediation: None,
      recorded_at,
    })
  }

  async fn list_errors(&self, query: &ErrorQuery) -> Result<Vec<ErrorRecord>> {
    let document_id = query.document_id;
    let resolved    = query.resolved;
    // SQLite treats a negative LIMIT as "no limit".
    let limit_val   = query.limit.map_or(-1, |l| l as i64);
    let offset_val  = query.offset.unwrap_or(0) as i64;

    let raws: Vec<RawErrorRecord> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {ERROR_COLUMNS} FROM storage_errors
           WHERE (?1 IS NULL OR document_id = ?1)
             AND (?2 IS NULL OR resolved = ?2)
           ORDER BY recorded_at DESC, error_id DESC
           LIMIT ?3 OFFSET ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![document_id, resolved, limit_val, offset_val],
            RawErrorRecord::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawErrorRecord::into_record).collect()
  }

  async fn resolve_error(
    &self,
    error_id: i64,
    remediation: String,
  ) -> Result<Option<ErrorRecord>> {
    let raw: Option<RawErrorRecord> = self
      .conn
      .call(move |conn| {
        let changed = conn.execute(
          "UPDATE storage_errors SET resolved = 1, remediation = ?2 WHERE error_id = ?1",
          rusqlite::params![error_id, remediation],
        )?;
        if changed == 0 {
          return Ok(None);
        }
        let sql = format!("SELECT {ERROR_COLUMNS} FROM storage_errors WHERE error_id = ?1");
        Ok(
          conn
            .query_row(&sql, rusqlite::params![error_id], RawErrorRecord::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawErrorRecord::into_record).transpose()
  }

  // ── History ───────────────────────────────────────────────────────────────

  async fn append_history(&self, input: NewHistoryEntry) -> Result<HistoryEntry> {
    let recorded_at = Utc::now();
    let at_str      = encode_dt(recorded_at);
    let document_id = input.document_id;
    let actor_id    = input.actor_id;
    let action_str  = input.action.as_str();
    let details     = input.details.clone();

    let entry_id = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO history (document_id, actor_id, action, details, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![document_id, actor_id, action_str, details, at_str],
        )?;
        Ok(conn.last_insert_rowid())
      })
      .await?;

    Ok(HistoryEntry {
      entry_id,
      document_id,
      actor_id,
      action: input.action,
      details: input.details,
      recorded_at,
    })
  }

  async fn list_history(
    &self,
    document_id: DocumentId,
    limit: usize,
    offset: usize,
  ) -> Result<Vec<HistoryEntry>> {
    let limit_val  = limit as i64;
    let offset_val = offset as i64;

    let raws: Vec<RawHistoryEntry> = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {HISTORY_COLUMNS} FROM history
           WHERE document_id = ?1
           ORDER BY recorded_at DESC, entry_id DESC
           LIMIT ?2 OFFSET ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![document_id, limit_val, offset_val],
            RawHistoryEntry::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawHistoryEntry::into_entry).collect()
  }
}
