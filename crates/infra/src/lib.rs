//! Infrastructure layer: tenant registry, audit log, row and storage
//! gateways, lifecycle jobs and configuration.
//!
//! Stores sit behind traits with in-memory implementations for tests/dev.

pub mod audit;
pub mod config;
pub mod enforce;
pub mod fence;
pub mod layer;
pub mod lifecycle;
pub mod registry;
pub mod rows;
pub mod schema;
pub mod storage;

pub use config::{ConfigError, IsolationConfig};
pub use enforce::{Enforcer, Evaluator};
pub use layer::IsolationLayer;

#[cfg(test)]
mod integration_tests;
