//! Error types for `docvault-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown error category: {0:?}")]
  UnknownErrorCategory(String),

  #[error("unknown history action: {0:?}")]
  UnknownHistoryAction(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
