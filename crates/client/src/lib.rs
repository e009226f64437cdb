//! Network access for sous.
//!
//! This crate provides the `Network` seam the agent talks through, a
//! reqwest-backed implementation, and URL resolution against the
//! application origin.

pub mod fetch;

pub use fetch::{FetchConfig, HttpNetwork, Network, UrlError, is_same_origin, resolve};
