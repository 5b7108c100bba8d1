//! gecko-sync
//!
//! Mirrors CoinGecko reference and market data into PostgreSQL. The
//! [`provider`] module talks to the API, [`storage`] upserts records by
//! natural key, and [`sync`] drives paginated runs between the two.

pub mod cli;
pub mod config;
pub mod provider;
pub mod schema;
pub mod storage;
pub mod sync;

pub use config::Settings;
pub use provider::{Fetcher, ProviderError};
pub use storage::RepositoryError;
pub use sync::{SyncEntity, SyncError, SyncReport, SyncService};
