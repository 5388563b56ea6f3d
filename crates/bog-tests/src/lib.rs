//! Integration and end-to-end tests for bog.
//!
//! This crate provides:
//! - An in-process test node wiring store, log, gossip, and endpoint
//! - A multi-node harness with channel-backed peer connections
//! - Replication, gossip, and directory tests under `tests/`

pub mod harness;
pub mod node;

pub use harness::{connect, settle, TestNetwork};
pub use node::TestNode;
