//! Domain records written by the repositories.
//!
//! Every record carries an externally-defined natural key. Batches are
//! filtered on that key before they reach storage.

mod coin;
mod reference;

pub use coin::*;
pub use reference::*;

/// A record identified by a key defined outside this system.
pub trait NaturalKey {
    /// Key as used in logs and lookups.
    fn natural_key(&self) -> String;

    /// False when the key is blank and the record must not be stored.
    fn has_natural_key(&self) -> bool {
        !self.natural_key().trim().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_keys_are_invalid() {
        let platform = AssetPlatform::new("  ", "Whitespace");
        assert!(!platform.has_natural_key());

        let category = CoinCategory::new("layer-1", "Layer 1 (L1)");
        assert!(category.has_natural_key());
        assert_eq!(category.natural_key(), "layer-1");
    }

    #[test]
    fn test_market_data_key_requires_both_ids() {
        let mut row = CoinMarketData::new(1, 2, 101.5);
        assert!(row.has_natural_key());
        assert_eq!(row.natural_key(), "1:2");

        row.exchange_id = 0;
        assert!(!row.has_natural_key());
    }

    #[test]
    fn test_ticker_key_includes_page() {
        let ticker = CoinTicker::new(7, 3, serde_json::json!({"tickers": []}));
        assert_eq!(ticker.natural_key(), "7:3");
        assert!(ticker.has_natural_key());
        assert!(!CoinTicker::new(7, 0, serde_json::Value::Null).has_natural_key());
    }
}
