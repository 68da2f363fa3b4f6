//! Background maintenance loop.
//!
//! Two independent tickers drive the integrity sweep and backup cleanup. A
//! pass always runs to completion; ticks that fall due while it runs are
//! skipped. Ctrl-C stops both loops between passes.

use std::time::Duration;

use anyhow::{Context as _, Result};
use docvault_core::store::DocumentStore;
use docvault_engine::{EngineConfig, StorageService};
use tokio::{
  sync::watch,
  time::{MissedTickBehavior, interval},
};
use tracing::{info, warn};

pub async fn run<S>(service: StorageService<S>, config: &EngineConfig) -> Result<()>
where
  S: DocumentStore + 'static,
{
  let (shutdown_tx, shutdown_rx) = watch::channel(false);

  let sweep = {
    let service = service.clone();
    let period = Duration::from_secs(config.sweep_interval_secs.max(1));
    tokio::spawn(every(period, shutdown_rx.clone(), "integrity sweep", move || {
      let service = service.clone();
      async move {
        let outcome = service.run_integrity_sweep().await;
        (outcome.success, outcome.message)
      }
    }))
  };

  let cleanup = {
    let service = service.clone();
    let period = Duration::from_secs(config.cleanup_interval_secs.max(1));
    let retention_days = config.backup_retention_days;
    tokio::spawn(every(period, shutdown_rx, "backup cleanup", move || {
      let service = service.clone();
      async move {
        let outcome = service.cleanup_old_backups(retention_days).await;
        (outcome.success, outcome.message)
      }
    }))
  };

  info!(
    sweep_interval_secs = config.sweep_interval_secs,
    cleanup_interval_secs = config.cleanup_interval_secs,
    "maintenance daemon started"
  );

  tokio::signal::ctrl_c()
    .await
    .context("failed to listen for ctrl-c")?;
  info!("shutting down after current passes finish");
  let _ = shutdown_tx.send(true);

  sweep.await.context("sweep task panicked")?;
  cleanup.await.context("cleanup task panicked")?;
  Ok(())
}

/// Call `pass` every `period` until `shutdown` flips to true. The first tick
/// fires immediately.
async fn every<F, Fut>(
  period: Duration,
  mut shutdown: watch::Receiver<bool>,
  name: &'static str,
  mut pass: F,
) where
  F: FnMut() -> Fut,
  Fut: Future<Output = (bool, String)>,
{
  let mut ticker = interval(period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let (success, message) = pass().await;
        if success {
          info!(pass = name, "{message}");
        } else {
          warn!(pass = name, "{message}");
        }
      }
      _ = shutdown.changed() => break,
    }
  }
}
