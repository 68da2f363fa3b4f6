//! The docvault storage engine.
//!
//! Owns the on-disk layout of document payloads, their digests, the version
//! chain that links them and the maintenance passes that keep disk and store
//! consistent. The relational side is reached only through
//! [`docvault_core::store::DocumentStore`].
//!
//! [`StorageService`] is the entry point for application code; the
//! components below it are public for callers that need finer control.

pub mod backup;
pub mod chain;
pub mod config;
pub mod diff;
mod error;
pub mod files;
pub mod integrity;
pub mod journal;
pub mod outcome;
pub mod reconcile;
pub mod service;
pub mod sweep;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use outcome::Outcome;
pub use service::{StorageService, Upload};

#[cfg(test)]
mod tests;
