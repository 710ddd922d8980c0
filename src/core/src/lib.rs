//! Stratum Core - Shared Types
//!
//! Foundational error types and the `Result` alias used across the
//! Stratum build planner.

pub mod error;

// Re-export commonly used types
pub use error::{PlanError, Result};

/// Stratum version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
