//! SQL schema for the docvault SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS documents (
    document_id      INTEGER PRIMARY KEY,
    owner_id         INTEGER NOT NULL,
    file_path        TEXT,             -- mirror of the current version
    file_digest      TEXT,
    file_size        INTEGER,
    file_extension   TEXT,
    created_at       TEXT NOT NULL,
    modified_at      TEXT NOT NULL,
    last_verified_at TEXT,
    integrity_ok     INTEGER,          -- NULL until first verification
    active           INTEGER NOT NULL DEFAULT 1
);

-- Versions are never deleted; the only UPDATE ever issued demotes is_current.
CREATE TABLE IF NOT EXISTS versions (
    version_id         INTEGER PRIMARY KEY,
    document_id        INTEGER NOT NULL REFERENCES documents(document_id),
    version_number     INTEGER NOT NULL CHECK (version_number >= 1),
    file_path          TEXT NOT NULL,
    file_digest        TEXT NOT NULL,
    file_size          INTEGER NOT NULL,
    file_extension     TEXT NOT NULL,
    comment            TEXT,
    change_description TEXT,
    original_filename  TEXT,
    created_by         INTEGER NOT NULL,
    created_at         TEXT NOT NULL,  -- RFC 3339 UTC; server-assigned
    is_current         INTEGER NOT NULL DEFAULT 0,
    predecessor_id     INTEGER REFERENCES versions(version_id),
    UNIQUE (document_id, version_number),
    CHECK  (predecessor_id IS NULL OR predecessor_id != version_id)
);

-- At most one current version per document.
CREATE UNIQUE INDEX IF NOT EXISTS versions_current_idx
    ON versions(document_id) WHERE is_current = 1;
CREATE INDEX IF NOT EXISTS versions_predecessor_idx ON versions(predecessor_id);

CREATE TABLE IF NOT EXISTS storage_errors (
    error_id    INTEGER PRIMARY KEY,
    document_id INTEGER REFERENCES documents(document_id),
    actor_id    INTEGER NOT NULL,
    category    TEXT NOT NULL,   -- 'filesystem' | 'integrity' | 'version' | 'restoration' | 'db'
    message     TEXT NOT NULL,
    resolved    INTEGER NOT NULL DEFAULT 0,
    remediation TEXT,
    recorded_at TEXT NOT NULL
);

-- Append-only.
CREATE TABLE IF NOT EXISTS history (
    entry_id    INTEGER PRIMARY KEY,
    document_id INTEGER NOT NULL REFERENCES documents(document_id),
    actor_id    INTEGER NOT NULL,
    action      TEXT NOT NULL,
    details     TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS documents_verified_idx ON documents(last_verified_at);
CREATE INDEX IF NOT EXISTS storage_errors_document_idx ON storage_errors(document_id);
CREATE INDEX IF NOT EXISTS history_document_idx ON history(document_id, recorded_at);

PRAGMA user_version = 1;
";
