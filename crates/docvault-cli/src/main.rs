//! `docvault`: operator binary for the docvault storage engine.
//!
//! Reads `docvault.toml` (or the path given with `--config`) plus
//! `DOCVAULT_*` environment overrides, opens the SQLite store and runs one
//! command. `docvault daemon` keeps running and drives the integrity sweep
//! and backup cleanup on fixed intervals.
//!
//! # Usage
//!
//! ```
//! docvault import ./minutes.pdf --id 42 --owner 7
//! docvault add-version 42 ./minutes-v2.pdf --comment "signed copy"
//! docvault compare 42 1 2
//! docvault daemon
//! ```

mod daemon;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::{Context as _, Result, bail};
use clap::{Parser, Subcommand};
use docvault_core::{ActorId, DocumentId, VersionId, store::ErrorQuery};
use docvault_engine::{EngineConfig, Outcome, StorageService, Upload};
use docvault_store_sqlite::SqliteStore;
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "docvault", author, version, about = "Document storage and versioning engine")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "docvault.toml")]
  config: PathBuf,

  /// Actor id recorded on writes and error records.
  #[arg(long, global = true, default_value_t = 0)]
  actor: ActorId,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run the integrity sweep and backup cleanup on their intervals.
  Daemon,
  /// Re-verify every stale document once.
  Sweep,
  /// Delete backups older than the retention window once.
  Cleanup {
    /// Overrides `backup_retention_days`.
    #[arg(long)]
    retention_days: Option<u32>,
  },
  /// Repair document mirrors and current flags; delete orphan version files.
  Reconcile,
  /// Verify one document's file against its stored digest.
  Verify { document: DocumentId },
  /// Copy a document's current file into the backup tree.
  Backup { document: DocumentId },
  /// List a document's backups, newest first.
  Backups { document: DocumentId },
  /// Register a new document with the file as version 1.
  Import {
    file:  PathBuf,
    /// Use this document id instead of letting the store assign one.
    #[arg(long)]
    id:    Option<DocumentId>,
    #[arg(long, default_value_t = 0)]
    owner: ActorId,
  },
  /// Store a file as the next version of a document.
  AddVersion {
    document:    DocumentId,
    file:        PathBuf,
    #[arg(long)]
    comment:     Option<String>,
    #[arg(long)]
    description: Option<String>,
  },
  /// Bring an earlier version back as a new version.
  Restore {
    document: DocumentId,
    version:  VersionId,
    #[arg(long)]
    comment:  Option<String>,
  },
  /// Bring a backup back as a new version.
  RestoreBackup {
    document: DocumentId,
    backup:   PathBuf,
    #[arg(long)]
    comment:  Option<String>,
  },
  /// Unified diff between two versions of a document.
  Compare {
    document: DocumentId,
    first:    VersionId,
    second:   VersionId,
  },
  /// List a document's versions, oldest first.
  Versions { document: DocumentId },
  /// Show the version that superseded the given one.
  Successor { version: VersionId },
  /// Write the bytes of a version to a file.
  Export {
    document: DocumentId,
    version:  VersionId,
    out:      PathBuf,
  },
  /// Show a document's history, newest first.
  History {
    document:  DocumentId,
    #[arg(long, default_value_t = 1)]
    page:      usize,
    #[arg(long, default_value_t = 10)]
    page_size: usize,
  },
  /// List recorded storage errors, newest first.
  Errors {
    #[arg(long)]
    document: Option<DocumentId>,
    #[arg(long)]
    resolved: Option<bool>,
    #[arg(long)]
    limit:    Option<usize>,
    #[arg(long)]
    offset:   Option<usize>,
  },
  /// Mark a storage error resolved.
  ResolveError { error: i64, notes: String },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let config = load_config(&cli.config)?;

  if let Some(parent) = config.database_path.parent() {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }
  let store = SqliteStore::open(&config.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", config.database_path))?;
  let service = StorageService::new(Arc::new(store), &config);

  run(cli.command, cli.actor, &config, service).await
}

fn load_config(path: &Path) -> Result<EngineConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(config::Environment::with_prefix("DOCVAULT"))
    .build()
    .context("failed to read config file")?;

  let config: EngineConfig = settings
    .try_deserialize()
    .context("failed to deserialise EngineConfig")?;
  Ok(config.expand_paths())
}

async fn run(
  command: Command,
  actor: ActorId,
  config: &EngineConfig,
  service: StorageService<SqliteStore>,
) -> Result<()> {
  match command {
    Command::Daemon => daemon::run(service, config).await,
    Command::Sweep => report(service.run_integrity_sweep().await),
    Command::Cleanup { retention_days } => {
      let days = retention_days.unwrap_or(config.backup_retention_days);
      report(service.cleanup_old_backups(days).await)
    }
    Command::Reconcile => report(service.reconcile().await),
    Command::Verify { document } => report(service.verify_document_integrity(document).await),
    Command::Backup { document } => report(service.create_backup(document, actor).await),
    Command::Backups { document } => report(service.list_backups(document).await),
    Command::Import { file, id, owner } => {
      let upload = read_upload(&file, config.max_upload_size).await?;
      report(service.register_document(&upload, id, owner).await)
    }
    Command::AddVersion { document, file, comment, description } => {
      let upload = read_upload(&file, config.max_upload_size).await?;
      report(
        service
          .create_document_version(&upload, document, actor, comment, description)
          .await,
      )
    }
    Command::Restore { document, version, comment } => {
      report(service.restore_version(document, version, actor, comment).await)
    }
    Command::RestoreBackup { document, backup, comment } => {
      report(service.restore_from_backup(document, &backup, actor, comment).await)
    }
    Command::Compare { document, first, second } => {
      report(service.compare_versions(document, first, second).await)
    }
    Command::Versions { document } => report(service.list_versions(document).await),
    Command::Successor { version } => report(service.successor(version).await),
    Command::Export { document, version, out } => {
      let outcome = service.version_content(document, version).await;
      let (version, bytes) = outcome.into_result().map_err(anyhow::Error::msg)?;
      tokio::fs::write(&out, &bytes)
        .await
        .with_context(|| format!("failed to write {}", out.display()))?;
      tracing::info!(number = version.number, path = %out.display(), "exported version");
      Ok(())
    }
    Command::History { document, page, page_size } => {
      report(service.document_history(document, page, page_size).await)
    }
    Command::Errors { document, resolved, limit, offset } => {
      let query = ErrorQuery { document_id: document, resolved, limit, offset };
      report(service.storage_errors(&query).await)
    }
    Command::ResolveError { error, notes } => report(service.resolve_error(error, notes).await),
  }
}

/// Read a file as an upload, refusing anything over `max_size` bytes.
async fn read_upload(path: &Path, max_size: u64) -> Result<Upload> {
  let meta = tokio::fs::metadata(path)
    .await
    .with_context(|| format!("failed to stat {}", path.display()))?;
  if meta.len() > max_size {
    bail!(
      "{} is {} bytes; the upload limit is {max_size} bytes",
      path.display(),
      meta.len()
    );
  }

  let bytes = tokio::fs::read(path)
    .await
    .with_context(|| format!("failed to read {}", path.display()))?;
  let filename = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .with_context(|| format!("{} has no file name", path.display()))?;
  Ok(Upload::new(filename, bytes))
}

/// Print the outcome as JSON; a failed outcome becomes an error exit.
fn report<T: Serialize>(outcome: Outcome<T>) -> Result<()> {
  println!(
    "{}",
    serde_json::to_string_pretty(&outcome).context("failed to serialise outcome")?
  );
  if !outcome.success {
    bail!("{}", outcome.message);
  }
  Ok(())
}
