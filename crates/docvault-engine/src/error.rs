//! Error type for `docvault-engine`.

use std::path::PathBuf;

use docvault_core::{DocumentId, VersionId, record::ErrorCategory};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A read, write, copy or delete on the storage tree failed.
  #[error("failed to {op} {}: {source}", .path.display())]
  Filesystem {
    op:     &'static str,
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("digest mismatch for {}: expected {expected}, found {actual}", .path.display())]
  Integrity {
    path:     PathBuf,
    expected: String,
    actual:   String,
  },

  #[error("version error: {0}")]
  Version(String),

  #[error("restoration error: {0}")]
  Restoration(String),

  #[error("document not found: {0}")]
  DocumentNotFound(DocumentId),

  #[error("version {version_id} not found for document {document_id}")]
  VersionNotFound {
    document_id: DocumentId,
    version_id:  VersionId,
  },

  #[error("document {0} has no stored file")]
  NoStoredFile(DocumentId),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Box a backend error coming through the `DocumentStore` seam.
  pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }

  pub(crate) fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
    Self::Filesystem { op, path: path.into(), source }
  }

  /// The category under which this failure is written to the error log.
  pub fn category(&self) -> ErrorCategory {
    match self {
      Self::Filesystem { .. } => ErrorCategory::Filesystem,
      Self::Integrity { .. } => ErrorCategory::Integrity,
      Self::Restoration(_) => ErrorCategory::Restoration,
      Self::Store(_) => ErrorCategory::Db,
      Self::Version(_)
      | Self::DocumentNotFound(_)
      | Self::VersionNotFound { .. }
      | Self::NoStoredFile(_) => ErrorCategory::Version,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
