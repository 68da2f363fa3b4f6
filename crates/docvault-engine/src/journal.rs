//! Writes storage failures to the error log.
//!
//! Recording never fails from the caller's point of view: a failure to write
//! the record itself is logged and dropped.

use std::sync::Arc;

use docvault_core::{
  ActorId, DocumentId,
  record::{ErrorCategory, NewErrorRecord},
  store::DocumentStore,
};
use tracing::error;

use crate::Error;

pub struct ErrorJournal<S> {
  store: Arc<S>,
}

impl<S> Clone for ErrorJournal<S> {
  fn clone(&self) -> Self { Self { store: Arc::clone(&self.store) } }
}

impl<S: DocumentStore> ErrorJournal<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  pub async fn record(
    &self,
    document_id: Option<DocumentId>,
    actor_id: ActorId,
    category: ErrorCategory,
    message: impl Into<String>,
  ) {
    let message = message.into();
    let input = NewErrorRecord { document_id, actor_id, category, message };
    if let Err(e) = self.store.record_error(input.clone()).await {
      error!(
        document_id = ?input.document_id,
        category = %input.category,
        message = %input.message,
        error = %e,
        "could not record storage error"
      );
    }
  }

  /// Record `err` under its own category.
  pub async fn record_error(
    &self,
    document_id: Option<DocumentId>,
    actor_id: ActorId,
    err: &Error,
  ) {
    self
      .record(document_id, actor_id, err.category(), err.to_string())
      .await;
  }
}
