//! CoinGecko v3 public API.

mod client;
pub mod normalizer;
pub mod types;

pub use client::{ClientConfig, CoinGeckoClient, DEFAULT_BASE_URL, MAX_PER_PAGE, TICKERS_PER_PAGE};
