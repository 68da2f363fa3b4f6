//! Runtime engine configuration.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Engine settings, deserialised from `docvault.toml` and `DOCVAULT_*`
/// environment variables. Every key has a default.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub storage_root:                 PathBuf,
  pub database_path:                PathBuf,
  /// Largest upload accepted by the callers of the engine, in bytes.
  pub max_upload_size:              u64,
  pub verification_staleness_hours: u32,
  pub backup_retention_days:        u32,
  pub sweep_interval_secs:          u64,
  pub cleanup_interval_secs:        u64,
  pub max_version_attempts:         u32,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      storage_root:                 PathBuf::from("./storage/documents"),
      database_path:                PathBuf::from("./storage/docvault.sqlite3"),
      max_upload_size:              10 * 1024 * 1024,
      verification_staleness_hours: 24,
      backup_retention_days:        30,
      sweep_interval_secs:          60 * 60,
      cleanup_interval_secs:        24 * 60 * 60,
      max_version_attempts:         3,
    }
  }
}

impl EngineConfig {
  /// Expand a leading `~/` in both paths.
  pub fn expand_paths(mut self) -> Self {
    self.storage_root = expand_tilde(&self.storage_root);
    self.database_path = expand_tilde(&self.database_path);
    self
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
