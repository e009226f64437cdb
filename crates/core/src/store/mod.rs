//! SQLite-backed Content Store for captured responses and queued requests.
//!
//! This module provides a persistent key-value store using SQLite with async
//! access via tokio-rusqlite. It supports:
//!
//! - Versioned partitions (`static-<version>`, `dynamic-<version>`)
//! - Last-write-wins entries keyed by `(method, url)` within a partition
//! - A replay queue of mutating requests inside the runtime partition
//! - The last activated version, for resuming after a restart
//! - Automatic schema migrations

pub mod activation;
pub mod connection;
pub mod entries;
pub mod key;
pub mod migrations;
pub mod partitions;
pub mod queue;

pub use crate::Error;

pub use connection::ContentStore;
pub use entries::StoredResponse;
pub use key::{RequestKey, fingerprint};
pub use partitions::{PartitionName, Role};
pub use queue::QueuedRequest;
