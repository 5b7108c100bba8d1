//! Storage layer
//!
//! PostgreSQL repositories that upsert records by natural key inside a
//! single transaction per batch, plus the versioned schema migrations.

mod asset_platforms;
mod categories;
mod coin_details;
mod coin_market_data;
mod coins;
mod exchanges;
mod migrations;
mod repository;

pub use asset_platforms::*;
pub use categories::*;
pub use coin_details::*;
pub use coin_market_data::*;
pub use coins::*;
pub use exchanges::*;
pub use migrations::*;
pub use repository::*;
