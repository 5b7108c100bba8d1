//! Response shapes of the CoinGecko endpoints.
//!
//! Only the fields that are stored or inspected are declared; serde drops
//! everything else. Identifier fields default to empty so that a record
//! with a missing id reaches the repository filter instead of failing the
//! whole page.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// `/asset_platforms` element
#[derive(Debug, Clone, Deserialize)]
pub struct ApiAssetPlatform {
    #[serde(default)]
    pub id: String,
    pub chain_identifier: Option<i64>,
    #[serde(default)]
    pub name: String,
    pub shortname: Option<String>,
    pub native_coin_id: Option<String>,
}

/// `/coins/categories/list` element
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCategory {
    #[serde(default)]
    pub category_id: String,
    #[serde(default)]
    pub name: String,
}

/// `/exchanges` element
#[derive(Debug, Clone, Deserialize)]
pub struct ApiExchange {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
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

/// `/coins/markets` element
#[derive(Debug, Clone, Deserialize)]
pub struct ApiCoinMarket {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
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

/// `/coins/{id}/tickers` body
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiTickersResponse {
    #[serde(default)]
    pub tickers: Vec<ApiTicker>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiTicker {
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub market: ApiTickerMarket,
    pub last: Option<f64>,
    pub volume: Option<f64>,
    #[serde(default)]
    pub converted_last: ConvertedAmounts,
    #[serde(default)]
    pub converted_volume: ConvertedAmounts,
    pub trust_score: Option<String>,
    pub last_traded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_anomaly: bool,
    #[serde(default)]
    pub is_stale: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiTickerMarket {
    #[serde(default)]
    pub name: String,
    /// Exchange id, matches `/exchanges` ids
    #[serde(default)]
    pub identifier: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ConvertedAmounts {
    pub usd: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_id_defaults_to_empty() {
        let platform: ApiAssetPlatform =
            serde_json::from_str(r#"{"name": "Nameless", "chain_identifier": null}"#).unwrap();
        assert!(platform.id.is_empty());
        assert_eq!(platform.name, "Nameless");
        assert!(platform.chain_identifier.is_none());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let category: ApiCategory = serde_json::from_str(
            r#"{"category_id": "defi", "name": "DeFi", "market_cap": 1.0, "extra": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(category.category_id, "defi");
    }

    #[test]
    fn test_ticker_page_without_tickers_key() {
        let body: ApiTickersResponse = serde_json::from_str(r#"{"name": "Bitcoin"}"#).unwrap();
        assert!(body.tickers.is_empty());
    }

    #[test]
    fn test_ticker_decodes_converted_amounts() {
        let ticker: ApiTicker = serde_json::from_str(
            r#"{
                "base": "BTC",
                "target": "USDT",
                "market": {"name": "Binance", "identifier": "binance", "has_trading_incentive": false},
                "last": 67000.5,
                "volume": 12.5,
                "converted_last": {"btc": 1.0, "eth": 20.1, "usd": 67010.0},
                "converted_volume": {"usd": 837625.0},
                "trust_score": "green",
                "last_traded_at": "2024-05-01T12:00:00+00:00",
                "is_anomaly": false,
                "is_stale": false
            }"#,
        )
        .unwrap();

        assert_eq!(ticker.market.identifier, "binance");
        assert_eq!(ticker.converted_last.usd, Some(67010.0));
        assert_eq!(ticker.converted_volume.usd, Some(837625.0));
        assert!(ticker.last_traded_at.is_some());
    }
}
