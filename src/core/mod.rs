//! Core engine for operator-rail
//!
//! This module contains the building blocks every release operation relies on:
//!
//! - **config**: release.toml parsing and the versioned tool configuration
//! - **context**: The captured source tree, loaded once per invocation
//! - **error**: Error types with contextual help messages and exit codes
//! - **executor**: External tool execution against source snapshots
//! - **plan**: Dry-run plans of a release
//! - **snapshot**: Immutable copy-on-write source trees

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod plan;
pub mod snapshot;
