//! HTTP client for the CoinGecko REST API.
//!
//! Every request carries the configured timeout plus fixed `Accept` and
//! `User-Agent` headers. Transport failures and non-2xx responses are
//! retried on a fixed delay; bodies that fail to decode are not.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::{debug, info_span, Instrument, Span};

use gecko_common::error::{retry_with_fixed_delay, RetryPolicy};

use super::types::{ApiAssetPlatform, ApiCategory, ApiCoinMarket, ApiExchange, ApiTickersResponse};
use crate::config::ApiSettings;
use crate::provider::{Fetcher, PageRequest, ProviderError, ProviderResult, TickerPage};
use crate::schema::{AssetPlatform, Coin, CoinCategory, Exchange};

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Largest page size accepted by `/coins/markets` and `/exchanges`.
pub const MAX_PER_PAGE: u32 = 250;

/// Fixed server-side page size of `/coins/{id}/tickers`.
pub const TICKERS_PER_PAGE: usize = 100;

const USER_AGENT: &str = concat!("gecko-sync/", env!("CARGO_PKG_VERSION"));
const API_KEY_HEADER: &str = "x-cg-demo-api-key";
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// Optional demo key; public access needs none
    pub api_key: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            api_key: None,
        }
    }
}

impl From<&ApiSettings> for ClientConfig {
    fn from(settings: &ApiSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            timeout: settings.timeout(),
            retry: RetryPolicy::new(settings.retry_attempts, settings.retry_delay()),
            api_key: settings.api_key.clone().filter(|key| !key.is_empty()),
        }
    }
}

/// CoinGecko API client.
pub struct CoinGeckoClient {
    http: Client,
    config: ClientConfig,
    span: Span,
}

impl CoinGeckoClient {
    /// Build a client whose request spans are children of `parent`.
    pub fn new(config: ClientConfig, parent: &Span) -> ProviderResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::USER_AGENT,
            header::HeaderValue::from_static(USER_AGENT),
        );
        if let Some(key) = &config.api_key {
            let value = header::HeaderValue::from_str(key)
                .map_err(|e| ProviderError::Configuration(format!("Invalid API key: {}", e)))?;
            headers.insert(API_KEY_HEADER, value);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                ProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        let span = info_span!(parent: parent, "coingecko", base_url = %config.base_url);

        Ok(Self { http, config, span })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Single attempt. Any non-2xx status is an error.
    async fn get_once(&self, url: &str) -> ProviderResult<String> {
        debug!("GET {}", url);

        let response = self.http.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: clip(body, MAX_ERROR_BODY),
            });
        }

        Ok(body)
    }

    async fn get_json<T: DeserializeOwned>(&self, resource: &str, path: &str) -> ProviderResult<T> {
        let url = self.url(path);
        let span = info_span!(parent: &self.span, "request", resource);

        let body = retry_with_fixed_delay(resource, self.config.retry, || self.get_once(&url))
            .instrument(span)
            .await
            .map_err(|failure| ProviderError::Exhausted {
                resource: resource.to_string(),
                attempts: failure.attempts,
                source: Box::new(failure.error),
            })?;

        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Decode(format!("{}: {}", resource, e)))
    }
}

/// Cut `body` to at most `max` bytes on a char boundary.
fn clip(mut body: String, max: usize) -> String {
    if body.len() > max {
        let mut end = max;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

#[async_trait]
impl Fetcher for CoinGeckoClient {
    async fn ping(&self) -> ProviderResult<()> {
        let url = self.url("/ping");
        let response = self
            .http
            .get(&url)
            .send()
            .instrument(info_span!(parent: &self.span, "ping"))
            .await?;

        if response.status() != StatusCode::OK {
            return Err(ProviderError::Status {
                status: response.status().as_u16(),
                body: String::new(),
            });
        }
        Ok(())
    }

    async fn asset_platforms(&self) -> ProviderResult<Vec<AssetPlatform>> {
        let platforms: Vec<ApiAssetPlatform> =
            self.get_json("asset_platforms", "/asset_platforms").await?;
        Ok(platforms.into_iter().map(AssetPlatform::from).collect())
    }

    async fn coin_categories(&self) -> ProviderResult<Vec<CoinCategory>> {
        let categories: Vec<ApiCategory> = self
            .get_json("coin_categories", "/coins/categories/list")
            .await?;
        Ok(categories.into_iter().map(CoinCategory::from).collect())
    }

    async fn exchanges(&self, page: PageRequest) -> ProviderResult<Vec<Exchange>> {
        let path = format!("/exchanges?per_page={}&page={}", page.per_page, page.page);
        let exchanges: Vec<ApiExchange> = self
            .get_json(&format!("exchanges page {}", page.page), &path)
            .await?;
        Ok(exchanges.into_iter().map(Exchange::from).collect())
    }

    async fn coins_markets(&self, page: PageRequest) -> ProviderResult<Vec<Coin>> {
        let path = format!(
            "/coins/markets?vs_currency=usd&order=market_cap_desc&per_page={}&page={}&sparkline=false",
            page.per_page, page.page
        );
        let coins: Vec<ApiCoinMarket> = self
            .get_json(&format!("coins_markets page {}", page.page), &path)
            .await?;
        Ok(coins.into_iter().map(Coin::from).collect())
    }

    async fn coin_detail(&self, coingecko_id: &str) -> ProviderResult<JsonValue> {
        self.get_json(
            &format!("coin_detail {}", coingecko_id),
            &format!("/coins/{}", coingecko_id),
        )
        .await
    }

    async fn coin_tickers(&self, coingecko_id: &str, page: u32) -> ProviderResult<TickerPage> {
        let resource = format!("coin_tickers {} page {}", coingecko_id, page);
        let raw: JsonValue = self
            .get_json(
                &resource,
                &format!("/coins/{}/tickers?page={}", coingecko_id, page),
            )
            .await?;

        let body = ApiTickersResponse::deserialize(&raw)
            .map_err(|e| ProviderError::Decode(format!("{}: {}", resource, e)))?;

        Ok(TickerPage {
            raw,
            tickers: body.tickers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    // =========================================================================
    // Canned HTTP server
    // =========================================================================

    /// Serves `responses` in order, repeating the last one, and records
    /// each raw request head.
    async fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = requests.clone();

        tokio::spawn(async move {
            let mut served = 0;
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };

                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                recorded.lock().push(String::from_utf8_lossy(&head).to_lowercase());

                let (status, body) = responses[served.min(responses.len() - 1)];
                served += 1;
                let reply = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = stream.write_all(reply.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        (format!("http://{}/api/v3", addr), requests)
    }

    fn client(base_url: String, retries: u32) -> CoinGeckoClient {
        let config = ClientConfig {
            base_url,
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::new(retries, Duration::ZERO),
            api_key: None,
        };
        CoinGeckoClient::new(config, &Span::none()).unwrap()
    }

    const PLATFORMS: &str = r#"[
        {"id": "ethereum", "chain_identifier": 1, "name": "Ethereum", "shortname": "Ethereum", "native_coin_id": "ethereum"},
        {"id": "solana", "chain_identifier": null, "name": "Solana", "shortname": "", "native_coin_id": "solana"}
    ]"#;

    // =========================================================================
    // Retry behavior
    // =========================================================================

    #[test]
    fn test_clip_respects_char_boundaries() {
        assert_eq!(clip("abcdef".into(), 4), "abcd");
        assert_eq!(clip("short".into(), 512), "short");
        // 'é' is two bytes; cutting at 2 would split it
        assert_eq!(clip("aé".into(), 2), "a");
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let (base_url, requests) = serve(vec![(500, "oops"), (502, ""), (200, PLATFORMS)]).await;
        let client = client(base_url, 3);

        let platforms = client.asset_platforms().await.unwrap();

        assert_eq!(platforms.len(), 2);
        assert_eq!(platforms[0].id, "ethereum");
        assert_eq!(platforms[0].chain_identifier, Some(1));
        assert_eq!(platforms[1].short_name.as_deref(), Some(""));
        assert_eq!(requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_count() {
        let (base_url, requests) = serve(vec![(503, "unavailable")]).await;
        let client = client(base_url, 2);

        let err = client.asset_platforms().await.unwrap_err();

        match err {
            ProviderError::Exhausted {
                resource,
                attempts,
                source,
            } => {
                assert_eq!(resource, "asset_platforms");
                assert_eq!(attempts, 3);
                assert!(matches!(*source, ProviderError::Status { status: 503, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(requests.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_decode_errors_are_not_retried() {
        let (base_url, requests) = serve(vec![(200, "{\"not\": \"a list\"}")]).await;
        let client = client(base_url, 3);

        let err = client.coin_categories().await.unwrap_err();

        assert!(matches!(err, ProviderError::Decode(_)));
        assert_eq!(requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_a_transport_error() {
        // Accepts connections at the socket level but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = ClientConfig {
            base_url: format!("http://{}", listener.local_addr().unwrap()),
            timeout: Duration::from_millis(200),
            retry: RetryPolicy::none(),
            api_key: None,
        };
        let client = CoinGeckoClient::new(config, &Span::none()).unwrap();

        let err = client.asset_platforms().await.unwrap_err();

        match err {
            ProviderError::Exhausted { attempts, source, .. } => {
                assert_eq!(attempts, 1);
                assert!(matches!(*source, ProviderError::Transport(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    // =========================================================================
    // Requests and payloads
    // =========================================================================

    #[tokio::test]
    async fn test_sends_fixed_headers() {
        let (base_url, requests) = serve(vec![(200, "[]")]).await;
        let client = client(base_url, 0);

        client.coin_categories().await.unwrap();

        let head = requests.lock()[0].clone();
        assert!(head.starts_with("get /api/v3/coins/categories/list "));
        assert!(head.contains("accept: application/json"));
        assert!(head.contains("user-agent: gecko-sync/"));
        assert!(!head.contains(API_KEY_HEADER));
    }

    #[tokio::test]
    async fn test_sends_api_key_when_configured() {
        let (base_url, requests) = serve(vec![(200, "[]")]).await;
        let config = ClientConfig {
            base_url,
            api_key: Some("CG-demo".into()),
            retry: RetryPolicy::none(),
            ..Default::default()
        };
        let client = CoinGeckoClient::new(config, &Span::none()).unwrap();

        client.coin_categories().await.unwrap();

        assert!(requests.lock()[0].contains("x-cg-demo-api-key: cg-demo"));
    }

    #[tokio::test]
    async fn test_coins_markets_query() {
        let body = r#"[{"id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "total_volume": 2.5e10, "market_cap_rank": 1, "roi": null}]"#;
        let (base_url, requests) = serve(vec![(200, body)]).await;
        let client = client(base_url, 0);

        let coins = client.coins_markets(PageRequest::new(2, 250)).await.unwrap();

        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].coingecko_id, "bitcoin");
        assert_eq!(coins[0].market_cap_rank, Some(1));
        assert!(requests.lock()[0].starts_with(
            "get /api/v3/coins/markets?vs_currency=usd&order=market_cap_desc&per_page=250&page=2&sparkline=false "
        ));
    }

    #[tokio::test]
    async fn test_coin_tickers_keeps_raw_body() {
        let body = r#"{"name": "Bitcoin", "tickers": [
            {"base": "BTC", "target": "USDT", "market": {"name": "Binance", "identifier": "binance"},
             "converted_last": {"usd": 67000.0}, "converted_volume": {"usd": 1000000.0}}
        ]}"#;
        let (base_url, requests) = serve(vec![(200, body)]).await;
        let client = client(base_url, 0);

        let page = client.coin_tickers("bitcoin", 3).await.unwrap();

        assert_eq!(page.len(), 1);
        assert_eq!(page.raw["name"], "Bitcoin");
        assert_eq!(page.tickers[0].market.identifier, "binance");
        assert!(requests.lock()[0].starts_with("get /api/v3/coins/bitcoin/tickers?page=3 "));
    }

    // =========================================================================
    // Health probe
    // =========================================================================

    #[tokio::test]
    async fn test_ping_requires_200() {
        let (base_url, _) = serve(vec![(200, r#"{"gecko_says": "(V3) To the Moon!"}"#)]).await;
        assert!(client(base_url, 0).ping().await.is_ok());

        let (base_url, _) = serve(vec![(204, "")]).await;
        let err = client(base_url, 0).ping().await.unwrap_err();
        assert!(matches!(err, ProviderError::Status { status: 204, .. }));
    }
}
