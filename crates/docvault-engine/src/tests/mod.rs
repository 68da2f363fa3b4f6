//! End-to-end engine tests over a temporary storage root and a
//! fault-injecting in-memory store.


use std::{
  path::Path,
  sync::Arc,
  time::{Duration as StdDuration, SystemTime},
};

use chrono::{Duration, Utc};
use docvault_core::{
  record::{ErrorCategory, HistoryAction},
  store::{DocumentStore, ErrorQuery},
  version::Version,
};
use tempfile::TempDir;

use self::faulty::FaultyStore;
use crate::{
  EngineConfig, StorageService, Upload,
  backup::BackupManager,
  files::FileStore,
  integrity::{IntegrityVerifier, digest},
  reconcile::Reconciler,
  sweep::IntegritySweep,
};

struct Harness {
  _dir:    TempDir,
  store:   Arc<FaultyStore>,
  files:   FileStore,
  service: StorageService<FaultyStore>,
}

async fn harness() -> Harness {
  let dir = TempDir::new().unwrap();
  let store = Arc::new(FaultyStore::new().await);
  let config = EngineConfig {
    storage_root: dir.path().to_path_buf(),
    ..EngineConfig::default()
  };
  let files = FileStore::new(dir.path());
  let reconciler = Reconciler::new(Arc::clone(&store), files.clone())
    .with_orphan_grace(StdDuration::ZERO);
  let service = StorageService::new(Arc::clone(&store), &config).with_reconciler(reconciler);
  Harness { _dir: dir, store, files, service }
}

fn payload(seed: u8, len: usize) -> Vec<u8> {
  (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

async fn register(h: &Harness, id: i64, filename: &str, bytes: &[u8]) -> Version {
  let outcome = h
    .service
    .register_document(&Upload::new(filename, bytes), Some(id), 7)
    .await;
  assert!(outcome.success, "{}", outcome.message);
  outcome.payload.unwrap().version
}

async fn add_version(h: &Harness, id: i64, filename: &str, bytes: &[u8]) -> Version {
  let outcome = h
    .service
    .create_document_version(&Upload::new(filename, bytes), id, 7, None, None)
    .await;
  assert!(outcome.success, "{}", outcome.message);
  outcome.payload.unwrap().version
}

async fn errors_for(h: &Harness, id: i64) -> Vec<ErrorCategory> {
  h.store
    .list_errors(&ErrorQuery { document_id: Some(id), ..Default::default() })
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.category)
    .collect()
}

// ─── Version chain ───────────────────────────────────────────────────────────

#[tokio::test]
async fn first_version_of_new_document() {
  let h = harness().await;
  let p1 = payload(1, 500);
  let v1 = register(&h, 42, "minutes.pdf", &p1).await;

  assert_eq!(v1.number, 1);
  assert!(v1.is_current);
  assert_eq!(v1.predecessor_id, None);
  assert_eq!(v1.file.digest, digest(&p1));
  assert_eq!(v1.file.path, h.files.version_path(42, 1, ".pdf"));
  assert_eq!(h.files.read(&v1.file.path).await.unwrap(), p1);
  assert!(h.files.exists(&h.files.primary_path(42, ".pdf")).await.unwrap());

  let doc = h.store.get_document(42).await.unwrap().unwrap();
  assert_eq!(doc.file.as_ref(), Some(&v1.file));

  let history = h.service.document_history(42, 1, 10).await.payload.unwrap();
  assert_eq!(history.len(), 1);
  assert_eq!(history[0].action, HistoryAction::VersionCreated);
}

#[tokio::test]
async fn new_version_supersedes_current() {
  let h = harness().await;
  let v1 = register(&h, 42, "minutes.pdf", &payload(1, 500)).await;
  let p2 = payload(2, 300);
  let v2 = add_version(&h, 42, "minutes.pdf", &p2).await;

  assert_eq!(v2.number, 2);
  assert_eq!(v2.predecessor_id, Some(v1.version_id));
  assert!(v2.is_current);
  assert!(!h.store.get_version(v1.version_id).await.unwrap().unwrap().is_current);

  let doc = h.store.get_document(42).await.unwrap().unwrap();
  let mirrored = doc.file.unwrap();
  assert_eq!(mirrored.path, v2.file.path);
  assert_eq!(mirrored.digest, digest(&p2));
  assert_eq!(mirrored.size, 300);

  let successor = h.service.successor(v1.version_id).await.payload.unwrap();
  assert_eq!(successor.map(|v| v.version_id), Some(v2.version_id));
  assert!(h.service.successor(v2.version_id).await.payload.unwrap().is_none());
}

#[tokio::test]
async fn version_for_unknown_document_leaves_nothing_behind() {
  let h = harness().await;
  let outcome = h
    .service
    .create_document_version(&Upload::new("x.txt", b"data".to_vec()), 99, 7, None, None)
    .await;

  assert!(!outcome.success);
  assert!(outcome.payload.is_none());
  assert!(h.store.list_versions(99).await.unwrap().is_empty());
  assert!(!h.files.exists(&h.files.document_dir(99)).await.unwrap());
}

#[tokio::test]
async fn restore_creates_forward_version_with_old_bytes() {
  let h = harness().await;
  let p1 = payload(1, 64);
  let v1 = register(&h, 42, "notes.txt", &p1).await;
  let v2 = add_version(&h, 42, "notes.txt", &payload(9, 80)).await;
  let before = h.store.get_version(v1.version_id).await.unwrap().unwrap();

  let outcome = h.service.restore_version(42, v1.version_id, 3, None).await;
  assert!(outcome.success, "{}", outcome.message);
  let v3 = outcome.payload.unwrap().version;

  assert_eq!(v3.number, 3);
  assert_eq!(v3.predecessor_id, Some(v2.version_id));
  assert_eq!(v3.file.digest, v1.file.digest);
  assert_eq!(h.files.read(&v3.file.path).await.unwrap(), p1);
  assert_eq!(v3.comment.as_deref(), Some("Restored from version 1"));

  let target = h.store.get_version(v1.version_id).await.unwrap().unwrap();
  assert_eq!(target.file, v1.file);
  assert_eq!(target.comment, v1.comment);
  assert_eq!(target.created_at, before.created_at);
  assert!(!target.is_current);

  let history = h.service.document_history(42, 1, 1).await.payload.unwrap();
  assert_eq!(history[0].action, HistoryAction::VersionRestored);
}

#[tokio::test]
async fn restore_refuses_corrupted_target() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"original").await;
  add_version(&h, 42, "notes.txt", b"second").await;
  h.files.write(&v1.file.path, b"tampered").await.unwrap();

  let outcome = h.service.restore_version(42, v1.version_id, 3, None).await;
  assert!(!outcome.success);
  assert_eq!(h.store.list_versions(42).await.unwrap().len(), 2);
  assert!(errors_for(&h, 42).await.contains(&ErrorCategory::Integrity));
}

#[tokio::test]
async fn restore_of_missing_file_is_a_restoration_error() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"original").await;
  add_version(&h, 42, "notes.txt", b"second").await;
  h.files.remove(&v1.file.path).await.unwrap();

  let outcome = h.service.restore_version(42, v1.version_id, 3, None).await;
  assert!(!outcome.success);
  assert!(outcome.message.contains("restoration error"));
  assert_eq!(h.store.list_versions(42).await.unwrap().len(), 2);
  assert_eq!(errors_for(&h, 42).await, vec![ErrorCategory::Restoration]);
}

#[tokio::test]
async fn restore_of_other_documents_version_is_rejected() {
  let h = harness().await;
  let v1 = register(&h, 1, "a.txt", b"a").await;
  register(&h, 2, "b.txt", b"b").await;

  let outcome = h.service.restore_version(2, v1.version_id, 3, None).await;
  assert!(!outcome.success);
  assert_eq!(h.store.list_versions(2).await.unwrap().len(), 1);
}

#[tokio::test]
async fn comparing_a_version_with_itself_is_empty() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"one\ntwo\n").await;

  let c = h
    .service
    .compare_versions(42, v1.version_id, v1.version_id)
    .await
    .payload
    .unwrap();
  assert!(!c.is_binary);
  assert_eq!((c.added, c.removed), (0, 0));
  assert_eq!(c.diff, Some(Vec::new()));
}

#[tokio::test]
async fn compare_text_versions() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"a\nb\n").await;
  let v2 = add_version(&h, 42, "notes.txt", b"a\nc\nd\n").await;

  let c = h
    .service
    .compare_versions(42, v1.version_id, v2.version_id)
    .await
    .payload
    .unwrap();
  assert_eq!((c.added, c.removed), (2, 1));
  assert_eq!(c.version1.number, 1);
  assert_eq!(c.version2.size, 6);
  let diff = c.diff.unwrap();
  assert_eq!(diff[0], "--- version 1");
  assert_eq!(diff[1], "+++ version 2");
}

#[tokio::test]
async fn compare_binary_versions_reports_metadata_only() {
  let h = harness().await;
  let v1 = register(&h, 42, "scan.bin", &[0xff, 0x00, 0xfe]).await;
  let v2 = add_version(&h, 42, "scan.bin", b"text now").await;

  let c = h
    .service
    .compare_versions(42, v1.version_id, v2.version_id)
    .await
    .payload
    .unwrap();
  assert!(c.is_binary);
  assert!(c.diff.is_none());
  assert_eq!(c.version1.size, 3);
}

#[tokio::test]
async fn unreadable_version_files_are_recorded() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"one").await;
  let v2 = add_version(&h, 42, "notes.txt", b"two").await;
  h.files.remove(&v1.file.path).await.unwrap();

  assert!(!h.service.compare_versions(42, v1.version_id, v2.version_id).await.success);
  assert!(!h.service.version_content(42, v1.version_id).await.success);
  assert_eq!(
    errors_for(&h, 42).await,
    vec![ErrorCategory::Filesystem, ErrorCategory::Filesystem]
  );
}

#[tokio::test]
async fn version_content_returns_bytes() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"hello").await;
  let (version, bytes) = h.service.version_content(42, v1.version_id).await.payload.unwrap();
  assert_eq!(version.number, 1);
  assert_eq!(bytes, b"hello");
}

// ─── Staged write-behind ─────────────────────────────────────────────────────

#[tokio::test]
async fn failed_flag_flip_is_a_warning() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"one").await;
  h.store.set(&h.store.faults.clear_flag, true);

  let outcome = h
    .service
    .create_document_version(&Upload::new("notes.txt", b"two".to_vec()), 42, 7, None, None)
    .await;
  assert!(outcome.success);
  assert_eq!(outcome.warnings.len(), 1);

  let current = h.store.current_version(42).await.unwrap().unwrap();
  assert_eq!(current.number, 2);
  assert!(!h.store.get_version(v1.version_id).await.unwrap().unwrap().is_current);
  assert!(errors_for(&h, 42).await.contains(&ErrorCategory::Version));
}

#[tokio::test]
async fn failed_history_append_is_a_warning() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  h.store.set(&h.store.faults.history, true);

  let outcome = h
    .service
    .create_document_version(&Upload::new("notes.txt", b"two".to_vec()), 42, 7, None, None)
    .await;
  assert!(outcome.success);
  assert!(outcome.message.contains("warnings"));
  assert_eq!(outcome.payload.unwrap().version.number, 2);
  assert_eq!(h.store.list_history(42, 10, 0).await.unwrap().len(), 1);
}

#[tokio::test]
async fn failure_to_record_an_error_is_swallowed() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  h.store.set(&h.store.faults.history, true);
  h.store.set(&h.store.faults.record_error, true);

  let outcome = h
    .service
    .create_document_version(&Upload::new("notes.txt", b"two".to_vec()), 42, 7, None, None)
    .await;
  assert!(outcome.success);
  assert!(errors_for(&h, 42).await.is_empty());
}

#[tokio::test]
async fn failed_insert_removes_written_file() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"one").await;
  h.store.set(&h.store.faults.insert, true);

  let outcome = h
    .service
    .create_document_version(&Upload::new("notes.txt", b"two".to_vec()), 42, 7, None, None)
    .await;
  assert!(!outcome.success);
  assert!(outcome.message.contains("injected failure"));
  assert!(!h.files.exists(&h.files.version_path(42, 2, ".txt")).await.unwrap());
  assert_eq!(h.store.list_versions(42).await.unwrap().len(), 1);
  assert!(errors_for(&h, 42).await.contains(&ErrorCategory::Db));

  // The flag cleared before the insert is back on v1.
  let current = h.store.current_version(42).await.unwrap().unwrap();
  assert_eq!(current.version_id, v1.version_id);
  assert_eq!(h.files.read(&h.files.primary_path(42, ".txt")).await.unwrap(), b"one");

  h.store.set(&h.store.faults.insert, false);
  let v2 = add_version(&h, 42, "notes.txt", b"two").await;
  assert_eq!(v2.predecessor_id, Some(v1.version_id));
}

#[tokio::test]
async fn reconcile_restores_missing_current_flag() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  let v2 = add_version(&h, 42, "notes.txt", b"two").await;
  h.store.clear_current_flag(v2.version_id).await.unwrap();

  let report = h.service.reconcile().await.payload.unwrap();
  assert_eq!(report.current_flags_repaired, 1);
  let current = h.store.current_version(42).await.unwrap().unwrap();
  assert_eq!(current.version_id, v2.version_id);
}

#[tokio::test]
async fn new_version_refreshes_primary_file() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  add_version(&h, 42, "notes.txt", b"two").await;
  assert_eq!(h.files.read(&h.files.primary_path(42, ".txt")).await.unwrap(), b"two");

  add_version(&h, 42, "notes.md", b"# three").await;
  assert_eq!(h.files.read(&h.files.primary_path(42, ".md")).await.unwrap(), b"# three");
  assert!(!h.files.exists(&h.files.primary_path(42, ".txt")).await.unwrap());
}

#[tokio::test]
async fn next_version_follows_latest_when_no_current_flag() {
  let h = harness().await;
  let v1 = register(&h, 42, "notes.txt", b"one").await;
  h.store.clear_current_flag(v1.version_id).await.unwrap();

  let v2 = add_version(&h, 42, "notes.txt", b"two").await;
  assert_eq!(v2.number, 2);
  assert_eq!(v2.predecessor_id, Some(v1.version_id));
}

#[tokio::test]
async fn lost_race_retries_against_new_predecessor() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  h.store.set(&h.store.faults.race_once, true);

  let v3 = add_version(&h, 42, "notes.txt", b"mine").await;
  let versions = h.store.list_versions(42).await.unwrap();
  let rival = &versions[1];

  assert_eq!(rival.comment.as_deref(), Some("rival"));
  assert_eq!(v3.number, 3);
  assert_eq!(v3.predecessor_id, Some(rival.version_id));
  // The file written for the lost attempt is gone.
  assert!(!h.files.exists(&h.files.version_path(42, 2, ".txt")).await.unwrap());
  assert_eq!(h.files.read(&v3.file.path).await.unwrap(), b"mine");
}

#[tokio::test]
async fn taken_version_path_exhausts_attempts() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  let squatter = h.files.version_path(42, 2, ".txt");
  h.files.write(&squatter, b"leftover").await.unwrap();

  let outcome = h
    .service
    .create_document_version(&Upload::new("notes.txt", b"two".to_vec()), 42, 7, None, None)
    .await;
  assert!(!outcome.success);
  assert!(outcome.message.contains("could not claim"));
  assert_eq!(h.files.read(&squatter).await.unwrap(), b"leftover");
  assert!(errors_for(&h, 42).await.contains(&ErrorCategory::Version));

  let report = h.service.reconcile().await.payload.unwrap();
  assert_eq!(report.orphans_removed, 1);
  assert_eq!(add_version(&h, 42, "notes.txt", b"two").await.number, 2);
}

// ─── Integrity ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn corrupted_file_fails_verification() {
  let h = harness().await;
  register(&h, 42, "minutes.pdf", &payload(1, 500)).await;
  let doc = h.store.get_document(42).await.unwrap().unwrap();
  h.files.write(&doc.file.unwrap().path, &payload(2, 500)).await.unwrap();

  let outcome = h.service.verify_document_integrity(42).await;
  assert!(!outcome.success);
  assert!(!outcome.payload.unwrap().valid);
  assert!(errors_for(&h, 42).await.contains(&ErrorCategory::Integrity));
  let doc = h.store.get_document(42).await.unwrap().unwrap();
  assert_eq!(doc.integrity_ok, Some(false));
}

#[tokio::test]
async fn intact_file_passes_verification() {
  let h = harness().await;
  register(&h, 42, "minutes.pdf", &payload(1, 500)).await;
  let outcome = h.service.verify_document_integrity(42).await;
  assert!(outcome.success);
  assert!(errors_for(&h, 42).await.is_empty());
}

#[tokio::test]
async fn sweep_backs_up_failed_documents() {
  let h = harness().await;
  register(&h, 1, "a.txt", b"alpha").await;
  let v = register(&h, 2, "b.txt", b"bravo").await;
  h.files.write(&v.file.path, b"broken").await.unwrap();

  let store = Arc::clone(&h.store);
  let backups = BackupManager::new(Arc::clone(&store), h.files.clone());
  let sweep = IntegritySweep::new(
    Arc::clone(&store),
    IntegrityVerifier::new(h.files.clone()),
    backups.clone(),
    24,
  );

  // Freshly written documents are not stale yet.
  let report = sweep.run_once().await.unwrap();
  assert_eq!(report.checked, 0);

  let report = sweep.run_at(Utc::now() + Duration::hours(25)).await.unwrap();
  assert_eq!(report.checked, 2);
  assert_eq!(report.passed, 1);
  assert_eq!(report.failed, 1);
  assert_eq!(report.backups_created, 1);

  let saved = backups.list_backups(2).await.unwrap();
  assert_eq!(saved.len(), 1);
  assert_eq!(h.files.read(&saved[0].path).await.unwrap(), b"broken");
  assert!(errors_for(&h, 2).await.contains(&ErrorCategory::Integrity));
  assert!(errors_for(&h, 1).await.is_empty());
}

#[tokio::test]
async fn unpersisted_verification_is_recorded() {
  let h = harness().await;
  register(&h, 42, "a.txt", b"alpha").await;
  h.store.set(&h.store.faults.verification, true);

  let outcome = h.service.verify_document_integrity(42).await;
  assert!(outcome.success);
  assert!(errors_for(&h, 42).await.contains(&ErrorCategory::Db));
}

// ─── Backups ─────────────────────────────────────────────────────────────────

fn age(path: &Path, days: u64) {
  let when = SystemTime::now() - StdDuration::from_secs(days * 24 * 60 * 60);
  std::fs::File::options()
    .write(true)
    .open(path)
    .unwrap()
    .set_modified(when)
    .unwrap();
}

#[tokio::test]
async fn cleanup_respects_retention_window() {
  let h = harness().await;
  let old = h.files.backup_dir(1).join("1_20200101_000000.txt");
  let fresh = h.files.backup_dir(1).join("1_20250101_000000.txt");
  let lonely = h.files.backup_dir(2).join("2_20200101_000000.txt");
  for path in [&old, &fresh, &lonely] {
    h.files.write(path, b"x").await.unwrap();
  }
  age(&old, 40);
  age(&fresh, 29);
  age(&lonely, 31);

  let report = h.service.cleanup_old_backups(30).await.payload.unwrap();
  assert_eq!(report.deleted, 2);
  assert_eq!(report.directories_removed, 1);
  assert_eq!(report.failures, 0);

  assert!(!h.files.exists(&old).await.unwrap());
  assert!(h.files.exists(&fresh).await.unwrap());
  assert!(!h.files.exists(&h.files.backup_dir(2)).await.unwrap());
}

#[tokio::test]
async fn backup_and_restore_from_backup() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"keep me").await;

  let path = h.service.create_backup(42, 7).await.payload.unwrap();
  assert!(path.starts_with(h.files.backup_dir(42)));
  add_version(&h, 42, "notes.txt", b"overwritten").await;

  let listed = h.service.list_backups(42).await.payload.unwrap();
  assert_eq!(listed.len(), 1);

  let outcome = h.service.restore_from_backup(42, &path, 7, None).await;
  assert!(outcome.success, "{}", outcome.message);
  let v3 = outcome.payload.unwrap().version;
  assert_eq!(v3.number, 3);
  assert_eq!(h.files.read(&v3.file.path).await.unwrap(), b"keep me");
  assert_eq!(v3.file.extension, ".txt");

  let history = h.service.document_history(42, 1, 1).await.payload.unwrap();
  assert_eq!(history[0].action, HistoryAction::BackupRestored);
}

#[tokio::test]
async fn restore_from_foreign_path_is_refused() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"data").await;
  let stray = h.files.root().join("elsewhere.txt");
  h.files.write(&stray, b"not a backup").await.unwrap();

  let outcome = h.service.restore_from_backup(42, &stray, 7, None).await;
  assert!(!outcome.success);
  assert_eq!(h.store.list_versions(42).await.unwrap().len(), 1);
  assert!(errors_for(&h, 42).await.contains(&ErrorCategory::Restoration));
}

#[tokio::test]
async fn backup_of_unknown_document_fails_without_record() {
  let h = harness().await;
  let outcome = h.service.create_backup(5, 7).await;
  assert!(!outcome.success);
  let all = h.store.list_errors(&ErrorQuery::default()).await.unwrap();
  assert!(all.is_empty());
}

// ─── Reconcile, history and the error log ────────────────────────────────────

#[tokio::test]
async fn reconcile_resyncs_document_mirror() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  let v2 = add_version(&h, 42, "notes.txt", b"two").await;

  let mut stale = v2.file.clone();
  stale.digest = "0".repeat(64);
  h.store.sync_document_file(42, stale).await.unwrap();

  let report = h.service.reconcile().await.payload.unwrap();
  assert_eq!(report.documents_checked, 1);
  assert_eq!(report.mirrors_repaired, 1);
  assert_eq!(report.anomalies, 0);
  let doc = h.store.get_document(42).await.unwrap().unwrap();
  assert_eq!(doc.file, Some(v2.file));

  let again = h.service.reconcile().await.payload.unwrap();
  assert_eq!(again.mirrors_repaired, 0);
}

#[tokio::test]
async fn history_pages_newest_first() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  add_version(&h, 42, "notes.txt", b"two").await;
  add_version(&h, 42, "notes.txt", b"three").await;

  let first = h.service.document_history(42, 1, 2).await.payload.unwrap();
  assert_eq!(first.len(), 2);
  assert_eq!(first[0].details.as_deref(), Some("Version 3"));
  let second = h.service.document_history(42, 2, 2).await.payload.unwrap();
  assert_eq!(second.len(), 1);
  assert_eq!(second[0].details.as_deref(), Some("Version 1: Initial version"));
}

#[tokio::test]
async fn storage_errors_can_be_resolved() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  h.store.set(&h.store.faults.history, true);
  add_version(&h, 42, "notes.txt", b"two").await;

  let open = h
    .service
    .storage_errors(&ErrorQuery { resolved: Some(false), ..Default::default() })
    .await
    .payload
    .unwrap();
  assert_eq!(open.len(), 1);

  let resolved = h
    .service
    .resolve_error(open[0].error_id, "history re-entered by hand".into())
    .await;
  assert!(resolved.success);
  assert!(resolved.payload.unwrap().resolved);
  assert!(!h.service.resolve_error(9999, "n/a".into()).await.success);

  let still_open = h
    .service
    .storage_errors(&ErrorQuery { resolved: Some(false), ..Default::default() })
    .await
    .payload
    .unwrap();
  assert!(still_open.is_empty());
}

#[tokio::test]
async fn failed_registration_can_be_retried() {
  let h = harness().await;
  h.store.set(&h.store.faults.insert, true);

  let first = h
    .service
    .register_document(&Upload::new("notes.txt", b"one".to_vec()), Some(42), 7)
    .await;
  assert!(!first.success);
  assert!(h.store.get_document(42).await.unwrap().is_none());
  assert!(!h.files.exists(&h.files.document_dir(42)).await.unwrap());
  let errors = h.store.list_errors(&ErrorQuery::default()).await.unwrap();
  assert_eq!(errors.len(), 1);
  assert_eq!(errors[0].category, ErrorCategory::Db);
  assert_eq!(errors[0].document_id, None);

  h.store.set(&h.store.faults.insert, false);
  let v1 = register(&h, 42, "notes.txt", b"one").await;
  assert_eq!(v1.number, 1);
  assert_eq!(h.files.read(&h.files.primary_path(42, ".txt")).await.unwrap(), b"one");
}

#[tokio::test]
async fn duplicate_registration_is_refused() {
  let h = harness().await;
  register(&h, 42, "notes.txt", b"one").await;
  let outcome = h
    .service
    .register_document(&Upload::new("notes.txt", b"again".to_vec()), Some(42), 7)
    .await;
  assert!(!outcome.success);
  assert_eq!(h.store.list_versions(42).await.unwrap().len(), 1);
}
