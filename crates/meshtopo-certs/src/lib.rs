//! # meshtopo-certs
//!
//! Certificate issuance for overlay instances.
//!
//! Handles:
//! - **Generator**: Generator records handed to the executor.
//! - **Graph**: The two-level CA/node-certificate DAG built with `petgraph`.
//! - **Executor**: Memoized, cancellable execution of the DAG on `tokio`.
//! - **Runner**: Invocation of the external certificate tool.
//! - **Store**: Public and secret var storage.
//! - **State**: Fingerprint index that keeps re-evaluation idempotent.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod executor;
pub mod generator;
pub mod graph;
pub mod runner;
pub mod state;
pub mod store;
