//! Error type for `docvault-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] docvault_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A column held a value outside the range of its Rust type.
  #[error("column {column} out of range: {value}")]
  OutOfRange { column: &'static str, value: i64 },

  #[error("document {0} already exists")]
  DocumentExists(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
