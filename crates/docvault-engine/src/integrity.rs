//! Content digests and verification of a document's stored file.

use chrono::{DateTime, Utc};
use docvault_core::{DocumentId, document::Document};
use serde::Serialize;
use sha2::{Digest as _, Sha256};
use tracing::{debug, warn};

use crate::{Error, Result, files::FileStore};

/// Lowercase hex SHA-256 of `bytes`.
pub fn digest(bytes: &[u8]) -> String { hex::encode(Sha256::digest(bytes)) }

/// The outcome of checking one document's file against its stored digest.
#[derive(Debug, Clone, Serialize)]
pub struct Verification {
  pub document_id: DocumentId,
  pub expected:    String,
  /// Digest of the bytes found on disk; `None` if the file is missing.
  pub actual:      Option<String>,
  pub valid:       bool,
  pub checked_at:  DateTime<Utc>,
}

impl Verification {
  /// A human-readable one-line summary.
  pub fn message(&self) -> String {
    match (&self.actual, self.valid) {
      (_, true) => format!("document {} passed integrity check", self.document_id),
      (None, false) => format!(
        "document {} failed integrity check: file is missing",
        self.document_id
      ),
      (Some(actual), false) => format!(
        "document {} failed integrity check: expected {}, found {actual}",
        self.document_id, self.expected
      ),
    }
  }
}

#[derive(Debug, Clone)]
pub struct IntegrityVerifier {
  files: FileStore,
}

impl IntegrityVerifier {
  pub fn new(files: FileStore) -> Self { Self { files } }

  /// Re-hash the file at the document's current path and compare it with the
  /// stored digest. The document itself is not touched; persisting the
  /// result is up to the caller.
  ///
  /// A missing file is an invalid result, not an error. Any other read
  /// failure is returned as [`Error::Filesystem`].
  pub async fn verify(&self, document: &Document) -> Result<Verification> {
    let file = document
      .file
      .as_ref()
      .ok_or(Error::NoStoredFile(document.document_id))?;

    let actual = if self.files.exists(&file.path).await? {
      Some(digest(&self.files.read(&file.path).await?))
    } else {
      None
    };
    let valid = actual
      .as_deref()
      .is_some_and(|a| a.eq_ignore_ascii_case(&file.digest));

    if valid {
      debug!(document_id = document.document_id, "integrity check passed");
    } else {
      warn!(
        document_id = document.document_id,
        path = %file.path.display(),
        expected = %file.digest,
        actual = actual.as_deref().unwrap_or("<missing>"),
        "integrity check failed"
      );
    }

    Ok(Verification {
      document_id: document.document_id,
      expected: file.digest.clone(),
      actual,
      valid,
      checked_at: Utc::now(),
    })
  }
}

#[cfg(test)]
mod tests {
  use docvault_core::document::StoredFile;
  use tempfile::TempDir;

  use super::*;

  #[test]
  fn digest_is_lowercase_sha256_hex() {
    assert_eq!(
      digest(b""),
      "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
    assert_eq!(
      digest(b"abc"),
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }

  fn document(path: std::path::PathBuf, digest: String) -> Document {
    let now = Utc::now();
    Document {
      document_id: 42,
      owner_id: 1,
      file: Some(StoredFile { path, digest, size: 0, extension: ".txt".into() }),
      created_at: now,
      modified_at: now,
      last_verified_at: None,
      integrity_ok: None,
      active: true,
    }
  }

  #[tokio::test]
  async fn verify_matches_and_detects_corruption() {
    let dir = TempDir::new().unwrap();
    let files = FileStore::new(dir.path());
    let path = files.primary_path(42, ".txt");
    files.write(&path, b"payload").await.unwrap();

    let verifier = IntegrityVerifier::new(files.clone());
    // Stored digests in upper case still match.
    let doc = document(path.clone(), digest(b"payload").to_uppercase());
    assert!(verifier.verify(&doc).await.unwrap().valid);

    files.write(&path, b"pAyload").await.unwrap();
    let result = verifier.verify(&doc).await.unwrap();
    assert!(!result.valid);
    assert_eq!(result.actual.as_deref(), Some(digest(b"pAyload").as_str()));
  }

  #[tokio::test]
  async fn missing_file_is_invalid_not_error() {
    let dir = TempDir::new().unwrap();
    let verifier = IntegrityVerifier::new(FileStore::new(dir.path()));
    let doc = document(dir.path().join("gone.txt"), digest(b"x"));

    let result = verifier.verify(&doc).await.unwrap();
    assert!(!result.valid);
    assert!(result.actual.is_none());
    assert!(result.message().contains("missing"));
  }

  #[tokio::test]
  async fn document_without_file_is_rejected() {
    let dir = TempDir::new().unwrap();
    let verifier = IntegrityVerifier::new(FileStore::new(dir.path()));
    let mut doc = document(dir.path().join("x"), String::new());
    doc.file = None;
    assert!(matches!(
      verifier.verify(&doc).await,
      Err(Error::NoStoredFile(42))
    ));
  }
}
