//! Core types and trait definitions for the docvault document store.
//!
//! This crate is deliberately free of filesystem and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod document;
pub mod error;
pub mod record;
pub mod store;
pub mod version;

pub use error::{Error, Result};

/// Identifier of a [`document::Document`] row.
pub type DocumentId = i64;
/// Identifier of a [`version::Version`] row.
pub type VersionId = i64;
/// Identifier of the user (or service account) performing an operation.
pub type ActorId = i64;
