//! Operator release pipeline
//!
//! # Core Invariants
//!
//! 1. **Stages are totally ordered and fail fast**
//!    - manifests, bundle, format, lint, vuln-check, [envtest, test], build, [catalog, publish]
//!    - A failing stage stops the release; no later stage runs
//!
//! 2. **The catalog chain never breaks**
//!    - A release with a predecessor extends `catalog:<previous>`
//!    - Isolated builds (`skip_previous`) start a fresh index
//!    - The catalog is composed only after the bundle is pushed
//!
//! 3. **Source trees are values**
//!    - Each stage receives a snapshot and returns a new one
//!    - The caller's tree is never mutated
//!
//! # Layout
//!
//! - [`version`]: version resolution and the VERSION marker
//! - [`project`], [`manifest`], [`bundle`]: generated manifests and the OLM bundle
//! - [`gate`]: format, lint, vulnerability scan and envtest suite
//! - [`builder`], [`docker`], [`catalog`], [`publish`]: images and registries
//! - [`pipeline`]: the whole release, run or planned

pub mod builder;
pub mod bundle;
pub mod catalog;
pub mod docker;
pub mod gate;
pub mod manifest;
pub mod model;
pub mod pipeline;
pub mod project;
pub mod publish;
pub mod runner;
pub mod stage;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;
