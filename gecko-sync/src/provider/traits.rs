//! Provider trait definitions and errors.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use gecko_common::error::{ErrorCategory, ErrorClassification};

use crate::provider::coingecko::types::ApiTicker;
use crate::schema::{AssetPlatform, Coin, CoinCategory, Exchange};

/// Provider error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    /// Connect failure, timeout or body read failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-2xx response
    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Retries used up; wraps the last error
    #[error("{resource} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        resource: String,
        attempts: u32,
        #[source]
        source: Box<ProviderError>,
    },
}

impl ErrorClassification for ProviderError {
    fn category(&self) -> ErrorCategory {
        match self {
            ProviderError::Transport(_) => ErrorCategory::Transient,
            ProviderError::Status { status: 429, .. } => ErrorCategory::ResourceExhausted,
            ProviderError::Status { .. } => ErrorCategory::Transient,
            ProviderError::Decode(_) => ErrorCategory::Permanent,
            ProviderError::Configuration(_) => ErrorCategory::Configuration,
            ProviderError::Exhausted { .. } => ErrorCategory::Permanent,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// One page of a paginated list endpoint. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page + 1,
            ..self
        }
    }
}

/// A `/coins/{id}/tickers` page: the raw body plus the decoded tickers.
#[derive(Debug, Clone)]
pub struct TickerPage {
    pub raw: JsonValue,
    pub tickers: Vec<ApiTicker>,
}

impl TickerPage {
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Read access to the upstream market data API.
///
/// Calls are independent: one request per call, no shared cursor.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Health probe. Succeeds only on HTTP 200.
    async fn ping(&self) -> ProviderResult<()>;

    async fn asset_platforms(&self) -> ProviderResult<Vec<AssetPlatform>>;

    async fn coin_categories(&self) -> ProviderResult<Vec<CoinCategory>>;

    async fn exchanges(&self, page: PageRequest) -> ProviderResult<Vec<Exchange>>;

    /// USD market snapshot ordered by market cap.
    async fn coins_markets(&self, page: PageRequest) -> ProviderResult<Vec<Coin>>;

    /// Full coin document, kept as raw JSON.
    async fn coin_detail(&self, coingecko_id: &str) -> ProviderResult<JsonValue>;

    /// Server-sized ticker page for one coin.
    async fn coin_tickers(&self, coingecko_id: &str, page: u32) -> ProviderResult<TickerPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_classification() {
        let err = ProviderError::Transport("connection refused".into());
        assert!(err.is_transient());

        let err = ProviderError::Status {
            status: 503,
            body: String::new(),
        };
        assert_eq!(err.category(), ErrorCategory::Transient);

        let err = ProviderError::Status {
            status: 404,
            body: "not found".into(),
        };
        assert!(err.is_transient());

        let err = ProviderError::Status {
            status: 429,
            body: "slow down".into(),
        };
        assert_eq!(err.category(), ErrorCategory::ResourceExhausted);
        assert!(err.is_transient());

        let err = ProviderError::Decode("expected array".into());
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn test_exhausted_error_names_resource() {
        let err = ProviderError::Exhausted {
            resource: "coins_markets page 3".into(),
            attempts: 4,
            source: Box::new(ProviderError::Transport("timed out".into())),
        };
        let message = err.to_string();
        assert!(message.contains("coins_markets page 3"));
        assert!(message.contains("4 attempt"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_page_request_next() {
        let page = PageRequest::new(1, 250).next();
        assert_eq!(page, PageRequest::new(2, 250));
    }
}
