//! Upstream data providers.
//!
//! [`Fetcher`] is the seam between the sync orchestrator and the HTTP API.
//! [`coingecko::CoinGeckoClient`] is the production implementation and
//! [`mock::MockFetcher`] a scriptable stand-in for tests.

pub mod coingecko;
pub mod mock;
mod traits;

pub use traits::*;
