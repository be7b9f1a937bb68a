//! # meshtopo-topology
//!
//! The topology resolver: a pure, single-pass compiler from a declarative
//! description of overlay-network roles to per-machine daemon configuration.
//!
//! Handles:
//! - **Parser**: Loading topology files and parsing network primitives.
//! - **Model**: Raw and normalized role settings.
//! - **Validator**: Defaulting and normalization of per-machine settings.
//! - **Host map**: The address book shared by every machine of an instance.
//! - **Synth**: Per-role daemon configuration and the hosts table.
//! - **Resolver**: Whole-instance resolution tying the passes together.
//! - **Export**: Routing-priority annotations.
//! - **Render**: Daemon YAML and hosts-file output.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod export;
pub mod hostmap;
pub mod model;
pub mod parser;
pub mod render;
pub mod resolver;
pub mod synth;
pub mod validator;
pub mod warning;
