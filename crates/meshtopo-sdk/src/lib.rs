//! # meshtopo-sdk
//!
//! Public SDK for using meshtopo as a Rust library.
//!
//! Provides three main entry points:
//! - [`Planner`](planner::Planner): Resolves every instance of a topology, isolating failures per instance.
//! - [`write_artifacts`](artifacts::write_artifacts): Writes daemon configs and hosts blocks to disk.
//! - [`Issuer`](issuer::Issuer): Builds and executes the certificate graph of every resolved instance.
//!
//! # Example
//!
//! ```rust,no_run
//! use meshtopo_common::config::MeshtopoConfig;
//! use meshtopo_sdk::planner::Planner;
//!
//! let plan = Planner::new(MeshtopoConfig::default())
//!     .load(std::path::Path::new("topology.yaml"))
//!     .expect("topology should load");
//! for instance in plan.resolved() {
//!     println!("{}: {} machines", instance.name, instance.configs.len());
//! }
//! ```

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod artifacts;
pub mod issuer;
pub mod planner;
