//! Periodic re-verification of stale documents.
//!
//! A pass selects every active document whose last verification is older
//! than the staleness window (or missing), verifies each in turn, persists
//! the result and, on a mismatch, records an `integrity` error and takes a
//! backup of the file as found. A pass always runs to completion.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use docvault_core::{
  DocumentId,
  document::Document,
  record::ErrorCategory,
  store::DocumentStore,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
  Error, Result,
  backup::BackupManager,
  integrity::{IntegrityVerifier, Verification},
  journal::ErrorJournal,
};

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
  pub checked:         usize,
  pub passed:          usize,
  pub failed:          usize,
  pub backups_created: usize,
  /// Documents that could not be checked or backed up.
  pub errors:          usize,
}

pub struct IntegritySweep<S> {
  store:     Arc<S>,
  verifier:  IntegrityVerifier,
  backups:   BackupManager<S>,
  journal:   ErrorJournal<S>,
  staleness: Duration,
}

impl<S> Clone for IntegritySweep<S> {
  fn clone(&self) -> Self {
    Self {
      store:     Arc::clone(&self.store),
      verifier:  self.verifier.clone(),
      backups:   self.backups.clone(),
      journal:   self.journal.clone(),
      staleness: self.staleness,
    }
  }
}

impl<S: DocumentStore> IntegritySweep<S> {
  pub fn new(
    store: Arc<S>,
    verifier: IntegrityVerifier,
    backups: BackupManager<S>,
    staleness_hours: u32,
  ) -> Self {
    let journal = ErrorJournal::new(Arc::clone(&store));
    Self {
      store,
      verifier,
      backups,
      journal,
      staleness: Duration::hours(i64::from(staleness_hours)),
    }
  }

  /// Verify one document now and persist the outcome.
  pub async fn verify_document(&self, document_id: DocumentId) -> Result<Verification> {
    let document = self
      .store
      .get_document(document_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::DocumentNotFound(document_id))?;
    self.check(&document).await
  }

  async fn check(&self, document: &Document) -> Result<Verification> {
    let id = document.document_id;
    let verification = self.verifier.verify(document).await?;

    if let Err(e) = self
      .store
      .record_verification(id, verification.checked_at, verification.valid)
      .await
    {
      warn!(document_id = id, error = %e, "could not persist verification result");
      self
        .journal
        .record(
          Some(id),
          document.owner_id,
          ErrorCategory::Db,
          format!("could not persist verification of document {id}: {e}"),
        )
        .await;
    }

    if !verification.valid {
      self
        .journal
        .record(
          Some(id),
          document.owner_id,
          ErrorCategory::Integrity,
          verification.message(),
        )
        .await;
    }
    Ok(verification)
  }

  pub async fn run_once(&self) -> Result<SweepReport> { self.run_at(Utc::now()).await }

  /// Run a pass as if the current time were `now`.
  pub async fn run_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
    let stale = self
      .store
      .list_stale_documents(now - self.staleness)
      .await
      .map_err(Error::store)?;

    let mut report = SweepReport::default();
    for document in &stale {
      let id = document.document_id;
      report.checked += 1;

      match self.check(document).await {
        Ok(v) if v.valid => report.passed += 1,
        Ok(_) => {
          report.failed += 1;
          match self.backups.create_backup(id).await {
            Ok(_) => report.backups_created += 1,
            Err(e) => {
              warn!(document_id = id, error = %e, "backup after failed verification failed");
              self
                .journal
                .record_error(Some(id), document.owner_id, &e)
                .await;
              report.errors += 1;
            }
          }
        }
        Err(e) => {
          warn!(document_id = id, error = %e, "could not verify document");
          self
            .journal
            .record_error(Some(id), document.owner_id, &e)
            .await;
          report.errors += 1;
        }
      }
    }

    info!(
      checked = report.checked,
      passed = report.passed,
      failed = report.failed,
      backups_created = report.backups_created,
      errors = report.errors,
      "integrity sweep finished"
    );
    Ok(report)
  }
}
