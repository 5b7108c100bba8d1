//! Shared building blocks for the gecko-sync workspace.
//!
//! - [`error`]: error classification and the fixed-delay retry helper
//! - [`logging`]: `tracing` subscriber bootstrap driven by environment variables

pub mod error;
pub mod logging;
