//! Core types and shared functionality for sous.
//!
//! This crate provides:
//! - Request/response exchange types
//! - Content Store implementation with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod exchange;
pub mod store;

pub use config::{AgentConfig, ConfigError};
pub use error::Error;
pub use exchange::{Headers, Request, Response};
pub use store::{ContentStore, PartitionName, QueuedRequest, RequestKey, Role, StoredResponse};
