//! The sync service: one method per entity plus `sync_all`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use super::{Deadline, SyncEntity, SyncError, SyncReport, SyncResult};
use crate::config::{ApiSettings, SyncSettings};
use crate::provider::coingecko::normalizer::{coin_detail_from_json, resolve_market_data};
use crate::provider::coingecko::types::ApiTicker;
use crate::provider::coingecko::TICKERS_PER_PAGE;
use crate::provider::{Fetcher, PageRequest, ProviderResult, TickerPage};
use crate::schema::{AssetPlatform, Coin, CoinCategory, CoinDetail, CoinTicker, Exchange};
use crate::storage::{
    exchange_id_index, AssetPlatformRepository, AssetPlatformRow, CoinCategoryRepository,
    CoinCategoryRow, CoinDetailRepository, CoinDetailRow, CoinMarketDataRepository,
    CoinRepository, CoinRow, CoinTickerRepository, CoinTickerRow, ExchangeRepository,
    ExchangeRow, MarketDataStore, Repository,
};

/// Pacing, page size and time budgets for the service.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub per_page: u32,
    pub page_delay: Duration,
    pub ticker_page_delay: Duration,
    pub min_total_volume: f64,
    pub reference_timeout: Duration,
    pub coins_timeout: Duration,
    pub details_timeout: Duration,
    pub market_data_timeout: Duration,
}

impl SyncOptions {
    pub fn from_settings(api: &ApiSettings, sync: &SyncSettings) -> Self {
        Self {
            per_page: api.per_page,
            page_delay: Duration::from_millis(sync.page_delay_ms),
            ticker_page_delay: Duration::from_millis(sync.ticker_page_delay_ms),
            min_total_volume: sync.min_total_volume,
            reference_timeout: Duration::from_secs(sync.reference_timeout_secs),
            coins_timeout: Duration::from_secs(sync.coins_timeout_secs),
            details_timeout: Duration::from_secs(sync.details_timeout_secs),
            market_data_timeout: Duration::from_secs(sync.market_data_timeout_secs),
        }
    }

    fn timeout(&self, entity: SyncEntity) -> Duration {
        match entity {
            SyncEntity::AssetPlatforms | SyncEntity::Categories | SyncEntity::Exchanges => {
                self.reference_timeout
            }
            SyncEntity::Coins => self.coins_timeout,
            SyncEntity::CoinDetails => self.details_timeout,
            SyncEntity::MarketData => self.market_data_timeout,
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::from_settings(&ApiSettings::default(), &SyncSettings::default())
    }
}

/// One store per table the service writes.
#[derive(Clone)]
pub struct SyncStores {
    pub asset_platforms: Arc<dyn Repository<AssetPlatform, AssetPlatformRow>>,
    pub categories: Arc<dyn Repository<CoinCategory, CoinCategoryRow>>,
    pub exchanges: Arc<dyn Repository<Exchange, ExchangeRow>>,
    pub coins: Arc<dyn Repository<Coin, CoinRow>>,
    pub coin_details: Arc<dyn Repository<CoinDetail, CoinDetailRow>>,
    pub coin_tickers: Arc<dyn Repository<CoinTicker, CoinTickerRow>>,
    pub market_data: Arc<dyn MarketDataStore>,
}

impl SyncStores {
    /// Postgres repositories sharing one pool.
    pub fn postgres(pool: PgPool, parent: &Span) -> Self {
        Self {
            asset_platforms: Arc::new(AssetPlatformRepository::new(pool.clone(), parent)),
            categories: Arc::new(CoinCategoryRepository::new(pool.clone(), parent)),
            exchanges: Arc::new(ExchangeRepository::new(pool.clone(), parent)),
            coins: Arc::new(CoinRepository::new(pool.clone(), parent)),
            coin_details: Arc::new(CoinDetailRepository::new(pool.clone(), parent)),
            coin_tickers: Arc::new(CoinTickerRepository::new(pool.clone(), parent)),
            market_data: Arc::new(CoinMarketDataRepository::new(pool, parent)),
        }
    }
}

/// Outcome of paging through one coin's tickers.
#[derive(Default)]
struct TickerPages {
    /// Pages held for the caller; empty when pages were stored as read
    pages: Vec<TickerPage>,
    read: u32,
    stored: usize,
    /// Set when pagination stopped on a failed request
    failure: Option<SyncError>,
}

pub struct SyncService {
    fetcher: Arc<dyn Fetcher>,
    stores: SyncStores,
    options: SyncOptions,
    span: Span,
}

impl SyncService {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        stores: SyncStores,
        options: SyncOptions,
        parent: &Span,
    ) -> Self {
        let span = info_span!(parent: parent, "sync_service");
        Self {
            fetcher,
            stores,
            options,
            span,
        }
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Probe the API, then replace the asset platform list.
    pub async fn sync_asset_platforms(&self) -> SyncResult<SyncReport> {
        let entity = SyncEntity::AssetPlatforms;
        let span = info_span!(parent: &self.span, "sync", entity = %entity);
        async {
            let deadline = self.deadline(entity);
            let mut report = SyncReport::new(entity);
            report.before = self.stores.asset_platforms.count().await?;

            self.fetcher
                .ping()
                .await
                .map_err(|source| SyncError::Fetch {
                    entity,
                    page: 1,
                    source,
                })?;

            deadline.check(entity, 1)?;
            let platforms = self
                .fetcher
                .asset_platforms()
                .await
                .map_err(|source| SyncError::Fetch {
                    entity,
                    page: 1,
                    source,
                })?;
            if platforms.is_empty() {
                return Err(SyncError::EmptyResponse(entity));
            }

            report.pages = 1;
            report.fetched = platforms.len();
            report.stored = self
                .stores
                .asset_platforms
                .upsert_batch(&platforms)
                .await
                .map_err(|source| SyncError::Store {
                    entity,
                    page: 1,
                    source,
                })?;

            report.after = self.stores.asset_platforms.count().await?;
            Ok(self.finish(report, &deadline))
        }
        .instrument(span)
        .await
    }

    pub async fn sync_coin_categories(&self) -> SyncResult<SyncReport> {
        let entity = SyncEntity::Categories;
        let span = info_span!(parent: &self.span, "sync", entity = %entity);
        async {
            let deadline = self.deadline(entity);
            let mut report = SyncReport::new(entity);
            report.before = self.stores.categories.count().await?;

            deadline.check(entity, 1)?;
            let categories = self
                .fetcher
                .coin_categories()
                .await
                .map_err(|source| SyncError::Fetch {
                    entity,
                    page: 1,
                    source,
                })?;

            report.pages = 1;
            report.fetched = categories.len();
            report.stored = self
                .stores
                .categories
                .upsert_batch(&categories)
                .await
                .map_err(|source| SyncError::Store {
                    entity,
                    page: 1,
                    source,
                })?;

            report.after = self.stores.categories.count().await?;
            Ok(self.finish(report, &deadline))
        }
        .instrument(span)
        .await
    }

    pub async fn sync_exchanges(&self) -> SyncResult<SyncReport> {
        let entity = SyncEntity::Exchanges;
        let span = info_span!(parent: &self.span, "sync", entity = %entity);
        self.sync_paged(entity, self.stores.exchanges.as_ref(), |page| {
            self.fetcher.exchanges(page)
        })
        .instrument(span)
        .await
    }

    pub async fn sync_coins(&self) -> SyncResult<SyncReport> {
        let entity = SyncEntity::Coins;
        let span = info_span!(parent: &self.span, "sync", entity = %entity);
        self.sync_paged(entity, self.stores.coins.as_ref(), |page| {
            self.fetcher.coins_markets(page)
        })
        .instrument(span)
        .await
    }

    /// Fetch the detail document and raw ticker pages of every stored coin
    /// whose 24h volume is at least `min_total_volume`.
    ///
    /// A coin whose detail or ticker request fails is logged and passed over.
    pub async fn sync_coin_details(&self, min_total_volume: f64) -> SyncResult<SyncReport> {
        let entity = SyncEntity::CoinDetails;
        let span = info_span!(parent: &self.span, "sync", entity = %entity, min_total_volume);
        async {
            let deadline = self.deadline(entity);
            let mut report = SyncReport::new(entity);
            report.before = self.stores.coin_details.count().await?;

            let selected: Vec<CoinRow> = self
                .stores
                .coins
                .get_all()
                .await?
                .into_iter()
                .filter(|row| row.coin.meets_volume(min_total_volume))
                .collect();
            info!(
                "{} coin(s) at or above volume {}",
                selected.len(),
                min_total_volume
            );

            for (index, row) in selected.iter().enumerate() {
                let position = index as u32 + 1;
                deadline.check(entity, position)?;

                let coingecko_id = row.coin.coingecko_id.as_str();
                let raw = match self.fetcher.coin_detail(coingecko_id).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        warn!(coin = coingecko_id, "Skipping coin, detail fetch failed: {}", e);
                        report.skipped += 1;
                        continue;
                    }
                };
                report.pages += 1;
                report.fetched += 1;

                let detail = coin_detail_from_json(row.id, coingecko_id, raw);
                report.stored += self
                    .stores
                    .coin_details
                    .upsert_batch(std::slice::from_ref(&detail))
                    .await
                    .map_err(|source| SyncError::Store {
                        entity,
                        page: position,
                        source,
                    })?;

                let tickers = self
                    .ticker_pages(entity, coingecko_id, Some(row.id), &deadline)
                    .await?;
                if let Some(e) = &tickers.failure {
                    warn!(coin = coingecko_id, "Ticker pagination stopped: {}", e);
                }
                report.pages += tickers.read;
                report.stored += tickers.stored;
            }

            report.after = self.stores.coin_details.count().await?;
            Ok(self.finish(report, &deadline))
        }
        .instrument(span)
        .await
    }

    /// Rebuild one coin's per-exchange price rows from its tickers.
    ///
    /// The coin's previous rows are replaced, so exchanges that no longer
    /// list it disappear.
    pub async fn sync_coin_market_data(&self, coingecko_id: &str) -> SyncResult<SyncReport> {
        let entity = SyncEntity::MarketData;
        let span = info_span!(parent: &self.span, "sync", entity = %entity, coin = coingecko_id);
        async {
            let deadline = self.deadline(entity);
            let mut report = SyncReport::new(entity);
            report.before = self.stores.market_data.count().await?;

            let coin = self
                .stores
                .coins
                .get_by_natural_key(coingecko_id)
                .await?
                .ok_or_else(|| SyncError::CoinNotFound(coingecko_id.to_string()))?;
            let exchange_ids = exchange_id_index(&self.stores.exchanges.get_all().await?);

            let tickers = self
                .ticker_pages(entity, coingecko_id, None, &deadline)
                .await?;
            if let Some(failure) = tickers.failure {
                return Err(failure);
            }

            report.pages = tickers.read;
            let all: Vec<ApiTicker> = tickers
                .pages
                .into_iter()
                .flat_map(|page| page.tickers)
                .collect();
            report.fetched = all.len();

            let rows = resolve_market_data(coin.id, &all, &exchange_ids);
            debug!(
                "Resolved {} ticker(s) to {} exchange row(s)",
                all.len(),
                rows.len()
            );

            let last_page = report.pages;
            report.stored = self
                .stores
                .market_data
                .replace_for_coin(coin.id, &rows)
                .await
                .map_err(|source| SyncError::Store {
                    entity,
                    page: last_page,
                    source,
                })?;

            report.after = self.stores.market_data.count().await?;
            Ok(self.finish(report, &deadline))
        }
        .instrument(span)
        .await
    }

    /// Every entity in dependency order. The first failure ends the run.
    pub async fn sync_all(&self) -> SyncResult<Vec<SyncReport>> {
        info!(parent: &self.span, "Starting full sync");
        let reports = vec![
            self.sync_asset_platforms().await?,
            self.sync_coin_categories().await?,
            self.sync_exchanges().await?,
            self.sync_coins().await?,
            self.sync_coin_details(self.options.min_total_volume).await?,
        ];
        info!(parent: &self.span, "Full sync complete");
        Ok(reports)
    }

    /// Page through a list endpoint, storing each page before asking for the next.
    ///
    /// An empty page ends the run without a store; a short page is stored
    /// and then ends it.
    async fn sync_paged<T, R, F, Fut>(
        &self,
        entity: SyncEntity,
        store: &dyn Repository<T, R>,
        fetch: F,
    ) -> SyncResult<SyncReport>
    where
        T: Send + Sync,
        F: Fn(PageRequest) -> Fut,
        Fut: Future<Output = ProviderResult<Vec<T>>>,
    {
        let deadline = self.deadline(entity);
        let mut report = SyncReport::new(entity);
        report.before = store.count().await?;

        let per_page = self.options.per_page as usize;
        let mut request = PageRequest::new(1, self.options.per_page);

        loop {
            deadline.check(entity, request.page)?;

            let records = fetch(request).await.map_err(|source| SyncError::Fetch {
                entity,
                page: request.page,
                source,
            })?;
            report.pages += 1;

            if records.is_empty() {
                debug!(page = request.page, "Empty page, stopping");
                break;
            }

            report.fetched += records.len();
            report.stored += store
                .upsert_batch(&records)
                .await
                .map_err(|source| SyncError::Store {
                    entity,
                    page: request.page,
                    source,
                })?;
            debug!(
                page = request.page,
                records = records.len(),
                "Stored page"
            );

            if records.len() < per_page {
                break;
            }

            pause(self.options.page_delay).await;
            request = request.next();
        }

        report.after = store.count().await?;
        Ok(self.finish(report, &deadline))
    }

    /// Read ticker pages until an empty or short page.
    ///
    /// With `store_for` set, each page is written to `coin_tickers` under
    /// that coin row before the next one is requested; otherwise pages are
    /// held and returned. A deadline hit or store failure is an error; a
    /// failed request ends pagination and is reported in `failure`.
    async fn ticker_pages(
        &self,
        entity: SyncEntity,
        coingecko_id: &str,
        store_for: Option<i64>,
        deadline: &Deadline,
    ) -> SyncResult<TickerPages> {
        let mut out = TickerPages::default();
        let mut page = 1u32;

        loop {
            deadline.check(entity, page)?;

            let body = match self.fetcher.coin_tickers(coingecko_id, page).await {
                Ok(body) => body,
                Err(source) => {
                    out.failure = Some(SyncError::Fetch {
                        entity,
                        page,
                        source,
                    });
                    return Ok(out);
                }
            };

            if body.is_empty() {
                break;
            }
            out.read += 1;
            let short = body.len() < TICKERS_PER_PAGE;

            match store_for {
                Some(coin_id) => {
                    let record = CoinTicker::new(coin_id, page as i32, body.raw);
                    out.stored += self
                        .stores
                        .coin_tickers
                        .upsert_batch(std::slice::from_ref(&record))
                        .await
                        .map_err(|source| SyncError::Store {
                            entity,
                            page,
                            source,
                        })?;
                    debug!(coin = coingecko_id, page, "Stored ticker page");
                }
                None => out.pages.push(body),
            }

            if short {
                break;
            }

            pause(self.options.ticker_page_delay).await;
            page += 1;
        }

        Ok(out)
    }

    fn deadline(&self, entity: SyncEntity) -> Deadline {
        Deadline::new(self.options.timeout(entity))
    }

    fn finish(&self, mut report: SyncReport, deadline: &Deadline) -> SyncReport {
        report.elapsed = deadline.elapsed();
        info!(
            pages = report.pages,
            fetched = report.fetched,
            stored = report.stored,
            skipped = report.skipped,
            before = report.before,
            after = report.after,
            delta = report.delta(),
            "Synced {}",
            report
        );
        report
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
