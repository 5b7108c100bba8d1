//! Logging bootstrap for the gecko-sync binaries.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Standard tracing filter (e.g., `info`, `gecko_sync=debug`)
//! - `LOG_LEVEL`: Fallback level when `RUST_LOG` is unset (default `info`)
//! - `LOG_FORMAT`: `pretty` (default), `compact`, or `json`
//! - `LOG_TIMESTAMPS`: `local` (default), `utc`, or `none`
//!
//! Components never reach for a global logger by name. They receive a parent
//! [`tracing::Span`] when constructed and open child spans from it.

mod config;

pub use config::{init_logging, LogConfig, LogFormat, TimestampFormat};
