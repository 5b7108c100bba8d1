//! Conversion from CoinGecko response shapes to stored records.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value as JsonValue;

use super::types::{ApiAssetPlatform, ApiCategory, ApiCoinMarket, ApiExchange, ApiTicker};
use crate::schema::{AssetPlatform, Coin, CoinCategory, CoinDetail, CoinMarketData, Exchange};

impl From<ApiAssetPlatform> for AssetPlatform {
    fn from(api: ApiAssetPlatform) -> Self {
        Self {
            id: api.id,
            chain_identifier: api.chain_identifier,
            name: api.name,
            short_name: api.shortname,
            native_coin_id: api.native_coin_id,
        }
    }
}

impl From<ApiCategory> for CoinCategory {
    fn from(api: ApiCategory) -> Self {
        Self {
            coingecko_id: api.category_id,
            name: api.name,
        }
    }
}

impl From<ApiExchange> for Exchange {
    fn from(api: ApiExchange) -> Self {
        Self {
            coingecko_id: api.id,
            name: api.name,
            year_established: api.year_established,
            country: api.country,
            description: api.description,
            url: api.url,
            image: api.image,
            has_trading_incentive: api.has_trading_incentive,
            trust_score: api.trust_score,
            trust_score_rank: api.trust_score_rank,
            trade_volume_24h_btc: api.trade_volume_24h_btc,
            trade_volume_24h_btc_normalized: api.trade_volume_24h_btc_normalized,
        }
    }
}

impl From<ApiCoinMarket> for Coin {
    fn from(api: ApiCoinMarket) -> Self {
        Self {
            coingecko_id: api.id,
            symbol: api.symbol,
            name: api.name,
            image: api.image,
            current_price: api.current_price,
            market_cap: api.market_cap,
            market_cap_rank: api.market_cap_rank,
            fully_diluted_valuation: api.fully_diluted_valuation,
            total_volume: api.total_volume,
            high_24h: api.high_24h,
            low_24h: api.low_24h,
            price_change_24h: api.price_change_24h,
            price_change_percentage_24h: api.price_change_percentage_24h,
            market_cap_change_24h: api.market_cap_change_24h,
            market_cap_change_percentage_24h: api.market_cap_change_percentage_24h,
            circulating_supply: api.circulating_supply,
            total_supply: api.total_supply,
            max_supply: api.max_supply,
            ath: api.ath,
            ath_change_percentage: api.ath_change_percentage,
            ath_date: api.ath_date,
            atl: api.atl,
            atl_change_percentage: api.atl_change_percentage,
            atl_date: api.atl_date,
            last_updated: api.last_updated,
        }
    }
}

/// Build a [`CoinDetail`] from a raw `/coins/{id}` document.
///
/// Denormalized fields are best effort: a missing or malformed value leaves
/// the column empty and never rejects the document.
pub fn coin_detail_from_json(coin_id: i64, coingecko_id: &str, raw: JsonValue) -> CoinDetail {
    let genesis_date = raw
        .get("genesis_date")
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight));

    let hashing_algorithm = raw
        .get("hashing_algorithm")
        .and_then(JsonValue::as_str)
        .map(str::to_string);

    let categories = raw.get("categories").filter(|v| v.is_array()).cloned();

    let homepage = raw
        .get("links")
        .and_then(|links| links.get("homepage"))
        .filter(|v| v.is_array())
        .cloned();

    let last_updated_at = raw
        .get("last_updated")
        .and_then(JsonValue::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|ts| ts.with_timezone(&Utc));

    CoinDetail {
        coin_id,
        coingecko_id: coingecko_id.to_string(),
        raw_json: raw,
        genesis_date,
        hashing_algorithm,
        categories,
        homepage,
        last_updated_at,
    }
}

/// Collapse a coin's tickers into one market data row per known exchange.
///
/// Tickers flagged anomalous or stale, tickers without a USD price, and
/// tickers on exchanges missing from `exchange_ids` are dropped. Of the
/// rest, the ticker with the highest USD volume represents its exchange.
/// `volume_percentage` is that exchange's share of the kept USD volume.
pub fn resolve_market_data(
    coin_id: i64,
    tickers: &[ApiTicker],
    exchange_ids: &HashMap<String, i64>,
) -> Vec<CoinMarketData> {
    let mut best: BTreeMap<i64, (&ApiTicker, f64, f64)> = BTreeMap::new();

    for ticker in tickers {
        if ticker.is_anomaly || ticker.is_stale {
            continue;
        }
        let Some(price) = ticker.converted_last.usd else {
            continue;
        };
        let Some(&exchange_id) = exchange_ids.get(&ticker.market.identifier) else {
            continue;
        };
        let volume = ticker.converted_volume.usd.unwrap_or(0.0);

        let replace = best
            .get(&exchange_id)
            .map_or(true, |(_, _, current)| volume > *current);
        if replace {
            best.insert(exchange_id, (ticker, price, volume));
        }
    }

    let total_volume: f64 = best.values().map(|(_, _, volume)| volume).sum();

    best.into_iter()
        .map(|(exchange_id, (ticker, price, volume))| CoinMarketData {
            coin_id,
            exchange_id,
            price,
            volume_24h: ticker.converted_volume.usd,
            volume_percentage: (total_volume > 0.0).then(|| volume / total_volume * 100.0),
            last_updated: ticker.last_traded_at,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::coingecko::types::{ApiTickerMarket, ConvertedAmounts};
    use serde_json::json;

    fn ticker(exchange: &str, usd_price: Option<f64>, usd_volume: Option<f64>) -> ApiTicker {
        ApiTicker {
            base: "BTC".into(),
            target: "USDT".into(),
            market: ApiTickerMarket {
                name: exchange.to_uppercase(),
                identifier: exchange.into(),
            },
            last: usd_price,
            volume: None,
            converted_last: ConvertedAmounts { usd: usd_price },
            converted_volume: ConvertedAmounts { usd: usd_volume },
            trust_score: Some("green".into()),
            last_traded_at: None,
            is_anomaly: false,
            is_stale: false,
        }
    }

    fn exchange_ids() -> HashMap<String, i64> {
        [("binance".to_string(), 1), ("kraken".to_string(), 2)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_coin_detail_denormalized_fields() {
        let raw = json!({
            "id": "bitcoin",
            "genesis_date": "2009-01-03",
            "hashing_algorithm": "SHA-256",
            "categories": ["Cryptocurrency", "Layer 1 (L1)"],
            "links": {"homepage": ["http://www.bitcoin.org", "", ""]},
            "last_updated": "2024-05-01T12:34:56.789Z"
        });

        let detail = coin_detail_from_json(42, "bitcoin", raw.clone());

        assert_eq!(detail.coin_id, 42);
        assert_eq!(detail.coingecko_id, "bitcoin");
        assert_eq!(
            detail.genesis_date.unwrap().to_rfc3339(),
            "2009-01-03T00:00:00+00:00"
        );
        assert_eq!(detail.hashing_algorithm.as_deref(), Some("SHA-256"));
        assert_eq!(detail.categories, Some(json!(["Cryptocurrency", "Layer 1 (L1)"])));
        assert_eq!(detail.homepage, Some(json!(["http://www.bitcoin.org", "", ""])));
        assert!(detail.last_updated_at.is_some());
        assert_eq!(detail.raw_json, raw);
    }

    #[test]
    fn test_coin_detail_tolerates_missing_fields() {
        let detail = coin_detail_from_json(
            7,
            "tether",
            json!({"genesis_date": "", "hashing_algorithm": null, "links": {}}),
        );

        assert!(detail.genesis_date.is_none());
        assert!(detail.hashing_algorithm.is_none());
        assert!(detail.categories.is_none());
        assert!(detail.homepage.is_none());
        assert!(detail.last_updated_at.is_none());
    }

    #[test]
    fn test_resolve_keeps_highest_volume_per_exchange() {
        let tickers = vec![
            ticker("binance", Some(100.0), Some(300.0)),
            ticker("binance", Some(101.0), Some(500.0)),
            ticker("kraken", Some(99.0), Some(500.0)),
        ];

        let rows = resolve_market_data(9, &tickers, &exchange_ids());

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].exchange_id, 1);
        assert_eq!(rows[0].price, 101.0);
        assert_eq!(rows[0].volume_24h, Some(500.0));
        assert_eq!(rows[0].volume_percentage, Some(50.0));
        assert_eq!(rows[1].exchange_id, 2);
        assert_eq!(rows[1].volume_percentage, Some(50.0));
        assert!(rows.iter().all(|row| row.coin_id == 9));
    }

    #[test]
    fn test_resolve_skips_unusable_tickers() {
        let mut stale = ticker("kraken", Some(99.0), Some(10.0));
        stale.is_stale = true;

        let tickers = vec![
            ticker("unknown-dex", Some(100.0), Some(1_000.0)),
            ticker("binance", None, Some(50.0)),
            stale,
        ];

        assert!(resolve_market_data(1, &tickers, &exchange_ids()).is_empty());
    }

    #[test]
    fn test_resolve_without_volume_has_no_percentage() {
        let tickers = vec![ticker("binance", Some(1.0), None)];
        let rows = resolve_market_data(3, &tickers, &exchange_ids());

        assert_eq!(rows.len(), 1);
        assert!(rows[0].volume_24h.is_none());
        assert!(rows[0].volume_percentage.is_none());
    }
}
