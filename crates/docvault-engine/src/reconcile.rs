//! Repair pass over documents and their version chains.
//!
//! For each document the pass checks that numbering runs 1..N, that every
//! predecessor link points at the previous number, that one version is
//! flagged current and that the document mirrors it. Mirrors and missing
//! current flags are repaired; other anomalies are recorded as `version`
//! errors for an operator. Version files that no row references and that are
//! older than a grace period are deleted.

use std::{
  collections::HashSet,
  path::PathBuf,
  sync::Arc,
  time::{Duration, SystemTime},
};

use docvault_core::{
  document::Document,
  record::ErrorCategory,
  store::DocumentStore,
  version::Version,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{Error, Result, files::FileStore, journal::ErrorJournal};

/// Files younger than this may belong to a version still being written.
pub const DEFAULT_ORPHAN_GRACE: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
  pub documents_checked:      usize,
  pub mirrors_repaired:       usize,
  pub current_flags_repaired: usize,
  pub anomalies:              usize,
  pub orphans_removed:        usize,
  pub failures:               usize,
}

pub struct Reconciler<S> {
  store:        Arc<S>,
  files:        FileStore,
  journal:      ErrorJournal<S>,
  orphan_grace: Duration,
}

impl<S> Clone for Reconciler<S> {
  fn clone(&self) -> Self {
    Self {
      store:        Arc::clone(&self.store),
      files:        self.files.clone(),
      journal:      self.journal.clone(),
      orphan_grace: self.orphan_grace,
    }
  }
}

impl<S: DocumentStore> Reconciler<S> {
  pub fn new(store: Arc<S>, files: FileStore) -> Self {
    let journal = ErrorJournal::new(Arc::clone(&store));
    Self { store, files, journal, orphan_grace: DEFAULT_ORPHAN_GRACE }
  }

  pub fn with_orphan_grace(mut self, grace: Duration) -> Self {
    self.orphan_grace = grace;
    self
  }

  pub async fn run(&self) -> Result<ReconcileReport> {
    let documents = self
      .store
      .list_documents(false)
      .await
      .map_err(Error::store)?;

    let mut report = ReconcileReport::default();
    for document in &documents {
      report.documents_checked += 1;
      if let Err(e) = self.reconcile_document(document, &mut report).await {
        warn!(document_id = document.document_id, error = %e, "could not reconcile document");
        report.failures += 1;
      }
    }

    info!(
      documents_checked = report.documents_checked,
      mirrors_repaired = report.mirrors_repaired,
      current_flags_repaired = report.current_flags_repaired,
      anomalies = report.anomalies,
      orphans_removed = report.orphans_removed,
      failures = report.failures,
      "reconcile finished"
    );
    Ok(report)
  }

  async fn reconcile_document(
    &self,
    document: &Document,
    report: &mut ReconcileReport,
  ) -> Result<()> {
    let id = document.document_id;
    let versions = self
      .store
      .list_versions(id)
      .await
      .map_err(Error::store)?;

    for message in chain_anomalies(&versions) {
      warn!(document_id = id, "{message}");
      self
        .journal
        .record(Some(id), document.owner_id, ErrorCategory::Version, message)
        .await;
      report.anomalies += 1;
    }

    if let Some(current) = self.repair_current(document, &versions, report).await?
      && document.file.as_ref() != Some(&current.file)
    {
      self
        .store
        .sync_document_file(id, current.file.clone())
        .await
        .map_err(Error::store)?;
      info!(document_id = id, number = current.number, "re-synced document mirror");
      report.mirrors_repaired += 1;
    }

    let referenced: HashSet<&PathBuf> = versions.iter().map(|v| &v.file.path).collect();
    let now = SystemTime::now();
    for entry in self.files.list_dir(&self.files.versions_dir(id)).await? {
      let age = now.duration_since(entry.modified).unwrap_or(Duration::ZERO);
      if entry.is_dir || referenced.contains(&entry.path) || age < self.orphan_grace {
        continue;
      }
      self.files.remove(&entry.path).await?;
      info!(document_id = id, path = %entry.path.display(), "removed orphan version file");
      report.orphans_removed += 1;
    }

    Ok(())
  }

  /// The current version of the chain, flagging the latest one if none is.
  async fn repair_current<'v>(
    &self,
    document: &Document,
    versions: &'v [Version],
    report: &mut ReconcileReport,
  ) -> Result<Option<&'v Version>> {
    if let Some(current) = versions.iter().find(|v| v.is_current) {
      return Ok(Some(current));
    }
    let Some(latest) = versions.last() else {
      return Ok(None);
    };

    self
      .store
      .mark_current(latest.version_id)
      .await
      .map_err(Error::store)?;
    let message = format!(
      "document {} had no current version; flagged version {} current",
      document.document_id, latest.number
    );
    warn!(document_id = document.document_id, "{message}");
    self
      .journal
      .record(Some(document.document_id), document.owner_id, ErrorCategory::Version, message)
      .await;
    report.current_flags_repaired += 1;
    Ok(Some(latest))
  }
}

/// Numbering gaps and broken predecessor links in a chain listed in
/// ascending number order.
fn chain_anomalies(versions: &[Version]) -> Vec<String> {
  let mut out = Vec::new();
  let mut previous: Option<&Version> = None;
  for (idx, v) in versions.iter().enumerate() {
    let expected_number = idx + 1;
    if v.number as usize != expected_number {
      out.push(format!(
        "document {} version numbering is not contiguous: expected {expected_number}, found {}",
        v.document_id, v.number
      ));
    }
    let expected_predecessor = previous.map(|p| p.version_id);
    if v.predecessor_id != expected_predecessor {
      out.push(format!(
        "document {} version {} has predecessor {:?}, expected {:?}",
        v.document_id, v.number, v.predecessor_id, expected_predecessor
      ));
    }
    previous = Some(v);
  }
  out
}
