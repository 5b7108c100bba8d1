//! Scriptable [`Fetcher`] for tests and dry runs.
//!
//! Pages are served from memory and every call is recorded as a short
//! string such as `"coins_markets:2"` so tests can assert on request order.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::provider::coingecko::types::ApiTickersResponse;
use crate::provider::{Fetcher, PageRequest, ProviderError, ProviderResult, TickerPage};
use crate::schema::{AssetPlatform, Coin, CoinCategory, Exchange};

/// In-memory fetcher with per-call failure injection.
#[derive(Default)]
pub struct MockFetcher {
    ping_status: Option<u16>,
    asset_platforms: Vec<AssetPlatform>,
    coin_categories: Vec<CoinCategory>,
    exchange_pages: Vec<Vec<Exchange>>,
    coin_pages: Vec<Vec<Coin>>,
    details: HashMap<String, JsonValue>,
    ticker_pages: HashMap<String, Vec<JsonValue>>,
    failures: HashSet<String>,
    latency: Duration,
    calls: Mutex<Vec<String>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `ping` answer with this status instead of 200.
    pub fn with_ping_status(mut self, status: u16) -> Self {
        self.ping_status = Some(status);
        self
    }

    pub fn with_asset_platforms(mut self, platforms: Vec<AssetPlatform>) -> Self {
        self.asset_platforms = platforms;
        self
    }

    pub fn with_coin_categories(mut self, categories: Vec<CoinCategory>) -> Self {
        self.coin_categories = categories;
        self
    }

    /// Pages served by `exchanges`; page N is `pages[N - 1]`, past the end is empty.
    pub fn with_exchange_pages(mut self, pages: Vec<Vec<Exchange>>) -> Self {
        self.exchange_pages = pages;
        self
    }

    /// Pages served by `coins_markets`; same indexing as exchanges.
    pub fn with_coin_pages(mut self, pages: Vec<Vec<Coin>>) -> Self {
        self.coin_pages = pages;
        self
    }

    pub fn with_detail(mut self, coingecko_id: &str, body: JsonValue) -> Self {
        self.details.insert(coingecko_id.to_string(), body);
        self
    }

    /// Raw ticker bodies for one coin, page 1 first.
    pub fn with_ticker_pages(mut self, coingecko_id: &str, pages: Vec<JsonValue>) -> Self {
        self.ticker_pages.insert(coingecko_id.to_string(), pages);
        self
    }

    /// Fail the call recorded as `call`, e.g. `"coins_markets:3"` or `"coin_detail:eth"`.
    pub fn with_failure(mut self, call: &str) -> Self {
        self.failures.insert(call.to_string());
        self
    }

    /// Delay every detail and ticker response by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Calls made so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.starts_with(prefix))
            .count()
    }

    fn record(&self, call: String) -> ProviderResult<()> {
        let fail = self.failures.contains(&call);
        self.calls.lock().push(call.clone());
        if fail {
            return Err(ProviderError::Exhausted {
                resource: call,
                attempts: 1,
                source: Box::new(ProviderError::Transport("injected failure".into())),
            });
        }
        Ok(())
    }

    async fn respond_after_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn page<T: Clone>(pages: &[Vec<T>], page: u32) -> Vec<T> {
        page.checked_sub(1)
            .and_then(|index| pages.get(index as usize))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn ping(&self) -> ProviderResult<()> {
        self.record("ping".to_string())?;
        match self.ping_status {
            None | Some(200) => Ok(()),
            Some(status) => Err(ProviderError::Status {
                status,
                body: String::new(),
            }),
        }
    }

    async fn asset_platforms(&self) -> ProviderResult<Vec<AssetPlatform>> {
        self.record("asset_platforms".to_string())?;
        Ok(self.asset_platforms.clone())
    }

    async fn coin_categories(&self) -> ProviderResult<Vec<CoinCategory>> {
        self.record("coin_categories".to_string())?;
        Ok(self.coin_categories.clone())
    }

    async fn exchanges(&self, page: PageRequest) -> ProviderResult<Vec<Exchange>> {
        self.record(format!("exchanges:{}", page.page))?;
        Ok(Self::page(&self.exchange_pages, page.page))
    }

    async fn coins_markets(&self, page: PageRequest) -> ProviderResult<Vec<Coin>> {
        self.record(format!("coins_markets:{}", page.page))?;
        Ok(Self::page(&self.coin_pages, page.page))
    }

    async fn coin_detail(&self, coingecko_id: &str) -> ProviderResult<JsonValue> {
        self.record(format!("coin_detail:{}", coingecko_id))?;
        self.respond_after_latency().await;
        self.details
            .get(coingecko_id)
            .cloned()
            .ok_or_else(|| ProviderError::Status {
                status: 404,
                body: format!("coin not found: {}", coingecko_id),
            })
    }

    async fn coin_tickers(&self, coingecko_id: &str, page: u32) -> ProviderResult<TickerPage> {
        self.record(format!("coin_tickers:{}:{}", coingecko_id, page))?;
        self.respond_after_latency().await;

        let raw = self
            .ticker_pages
            .get(coingecko_id)
            .and_then(|pages| pages.get(page.saturating_sub(1) as usize))
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "tickers": [] }));

        let body = ApiTickersResponse::deserialize(&raw)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(TickerPage {
            raw,
            tickers: body.tickers,
        })
    }
}
