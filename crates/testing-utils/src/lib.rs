//! # Orchestrator Testing Utils
//!
//! Shared testing utilities for the backup orchestrator workspace:
//! in-memory implementations of every ledger repository, a recording
//! notifier, a scripted backup strategy and builders for test data.
//!
//! ```toml
//! [dev-dependencies]
//! orchestrator-testing-utils = { path = "../testing-utils" }
//! ```

pub mod builders;
pub mod mocks;

pub use builders::*;
pub use mocks::*;
