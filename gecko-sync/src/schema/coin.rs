//! Coin market snapshots and the per-coin data hanging off them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;

use super::NaturalKey;

/// One row of `/coins/markets`, quoted in USD.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Coin {
    pub coingecko_id: String,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    pub current_price: Option<f64>,
    pub market_cap: Option<f64>,
    pub market_cap_rank: Option<i32>,
    pub fully_diluted_valuation: Option<f64>,
    pub total_volume: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub price_change_percentage_24h: Option<f64>,
    pub market_cap_change_24h: Option<f64>,
    pub market_cap_change_percentage_24h: Option<f64>,
    pub circulating_supply: Option<f64>,
    pub total_supply: Option<f64>,
    pub max_supply: Option<f64>,
    pub ath: Option<f64>,
    pub ath_change_percentage: Option<f64>,
    pub ath_date: Option<DateTime<Utc>>,
    pub atl: Option<f64>,
    pub atl_change_percentage: Option<f64>,
    pub atl_date: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl Coin {
    pub fn new(
        coingecko_id: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            coingecko_id: coingecko_id.into(),
            symbol: symbol.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    /// True when the coin's 24h volume is known and at least `threshold`.
    pub fn meets_volume(&self, threshold: f64) -> bool {
        self.total_volume.is_some_and(|volume| volume >= threshold)
    }
}

impl NaturalKey for Coin {
    fn natural_key(&self) -> String {
        self.coingecko_id.clone()
    }
}

/// Price and volume of a coin on one exchange.
///
/// Keyed on `(coin_id, exchange_id)`, both surrogate ids of stored rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CoinMarketData {
    pub coin_id: i64,
    pub exchange_id: i64,
    pub price: f64,
    pub volume_24h: Option<f64>,
    pub volume_percentage: Option<f64>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl CoinMarketData {
    pub fn new(coin_id: i64, exchange_id: i64, price: f64) -> Self {
        Self {
            coin_id,
            exchange_id,
            price,
            volume_24h: None,
            volume_percentage: None,
            last_updated: None,
        }
    }
}

impl NaturalKey for CoinMarketData {
    fn natural_key(&self) -> String {
        format!("{}:{}", self.coin_id, self.exchange_id)
    }

    fn has_natural_key(&self) -> bool {
        self.coin_id > 0 && self.exchange_id > 0
    }
}

/// Full `/coins/{id}` payload plus a few denormalized fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CoinDetail {
    pub coin_id: i64,
    pub coingecko_id: String,
    pub raw_json: JsonValue,
    pub genesis_date: Option<DateTime<Utc>>,
    pub hashing_algorithm: Option<String>,
    pub categories: Option<JsonValue>,
    pub homepage: Option<JsonValue>,
    pub last_updated_at: Option<DateTime<Utc>>,
}

impl NaturalKey for CoinDetail {
    fn natural_key(&self) -> String {
        self.coingecko_id.clone()
    }
}

/// One raw page of `/coins/{id}/tickers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CoinTicker {
    pub coin_id: i64,
    pub page: i32,
    pub raw_json: JsonValue,
}

impl CoinTicker {
    pub fn new(coin_id: i64, page: i32, raw_json: JsonValue) -> Self {
        Self {
            coin_id,
            page,
            raw_json,
        }
    }
}

impl NaturalKey for CoinTicker {
    fn natural_key(&self) -> String {
        format!("{}:{}", self.coin_id, self.page)
    }

    fn has_natural_key(&self) -> bool {
        self.coin_id > 0 && self.page > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meets_volume_is_inclusive() {
        let mut coin = Coin::new("bitcoin", "btc", "Bitcoin");
        assert!(!coin.meets_volume(0.0));

        coin.total_volume = Some(1_000_000.0);
        assert!(coin.meets_volume(1_000_000.0));
        assert!(!coin.meets_volume(1_000_000.01));
    }
}
