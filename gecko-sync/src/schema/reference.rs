//! Reference data: asset platforms, coin categories and exchanges.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::NaturalKey;

/// A blockchain network tokens can live on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AssetPlatform {
    /// CoinGecko platform id, also the primary key
    pub id: String,
    /// EVM chain id where one exists
    pub chain_identifier: Option<i64>,
    pub name: String,
    pub short_name: Option<String>,
    pub native_coin_id: Option<String>,
}

impl AssetPlatform {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            chain_identifier: None,
            name: name.into(),
            short_name: None,
            native_coin_id: None,
        }
    }
}

impl NaturalKey for AssetPlatform {
    fn natural_key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CoinCategory {
    pub coingecko_id: String,
    pub name: String,
}

impl CoinCategory {
    pub fn new(coingecko_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            coingecko_id: coingecko_id.into(),
            name: name.into(),
        }
    }
}

impl NaturalKey for CoinCategory {
    fn natural_key(&self) -> String {
        self.coingecko_id.clone()
    }
}

/// A trading venue as listed by `/exchanges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Exchange {
    pub coingecko_id: String,
    pub name: String,
    pub year_established: Option<i32>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image: Option<String>,
    pub has_trading_incentive: Option<bool>,
    pub trust_score: Option<i32>,
    pub trust_score_rank: Option<i32>,
    pub trade_volume_24h_btc: Option<f64>,
    pub trade_volume_24h_btc_normalized: Option<f64>,
}

impl Exchange {
    pub fn new(coingecko_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            coingecko_id: coingecko_id.into(),
            name: name.into(),
            year_established: None,
            country: None,
            description: None,
            url: None,
            image: None,
            has_trading_incentive: None,
            trust_score: None,
            trust_score_rank: None,
            trade_volume_24h_btc: None,
            trade_volume_24h_btc_normalized: None,
        }
    }
}

impl NaturalKey for Exchange {
    fn natural_key(&self) -> String {
        self.coingecko_id.clone()
    }
}
