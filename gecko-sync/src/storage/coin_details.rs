//! Repositories for `coin_details` and `coin_tickers`, the raw per-coin
//! documents collected by the detail sync.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info_span, Span};

use super::repository::{count_live, soft_delete, upsert_rows, UpsertRow};
use super::{BatchUpserter, RecordSource, RepositoryError, RepositoryResult};
use crate::schema::{CoinDetail, CoinTicker};

#[derive(Debug, Clone, FromRow)]
pub struct CoinDetailRow {
    pub id: i64,
    #[sqlx(flatten)]
    pub detail: CoinDetail,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct CoinTickerRow {
    pub id: i64,
    #[sqlx(flatten)]
    pub ticker: CoinTicker,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpsertRow for CoinDetail {
    const TABLE: &'static str = "coin_details";
    const UPSERT_SQL: &'static str = r#"
        INSERT INTO coin_details (
            coin_id, coingecko_id, raw_json, genesis_date, hashing_algorithm,
            categories, homepage, last_updated_at, created_at, updated_at, deleted_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW(), NULL)
        ON CONFLICT (coingecko_id) DO UPDATE SET
            coin_id = EXCLUDED.coin_id,
            raw_json = EXCLUDED.raw_json,
            genesis_date = EXCLUDED.genesis_date,
            hashing_algorithm = EXCLUDED.hashing_algorithm,
            categories = EXCLUDED.categories,
            homepage = EXCLUDED.homepage,
            last_updated_at = EXCLUDED.last_updated_at,
            updated_at = NOW(),
            deleted_at = NULL
    "#;

    fn bind_upsert<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.coin_id)
            .bind(&self.coingecko_id)
            .bind(&self.raw_json)
            .bind(self.genesis_date)
            .bind(&self.hashing_algorithm)
            .bind(&self.categories)
            .bind(&self.homepage)
            .bind(self.last_updated_at)
    }
}

impl UpsertRow for CoinTicker {
    const TABLE: &'static str = "coin_tickers";
    const UPSERT_SQL: &'static str = r#"
        INSERT INTO coin_tickers (coin_id, page, raw_json, created_at, updated_at, deleted_at)
        VALUES ($1, $2, $3, NOW(), NOW(), NULL)
        ON CONFLICT (coin_id, page) DO UPDATE SET
            raw_json = EXCLUDED.raw_json,
            updated_at = NOW(),
            deleted_at = NULL
    "#;

    fn bind_upsert<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query.bind(self.coin_id).bind(self.page).bind(&self.raw_json)
    }
}

const DETAIL_COLUMNS: &str = r#"
    SELECT id, coin_id, coingecko_id, raw_json, genesis_date, hashing_algorithm,
           categories, homepage, last_updated_at, created_at, updated_at
    FROM coin_details
"#;

const TICKER_COLUMNS: &str = r#"
    SELECT id, coin_id, page, raw_json, created_at, updated_at
    FROM coin_tickers
"#;

#[derive(Clone)]
pub struct CoinDetailRepository {
    pool: PgPool,
    span: Span,
}

impl CoinDetailRepository {
    pub fn new(pool: PgPool, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "repository", table = CoinDetail::TABLE);
        Self { pool, span }
    }

    pub async fn soft_delete(&self, coingecko_id: &str) -> RepositoryResult<bool> {
        soft_delete(&self.pool, CoinDetail::TABLE, "coingecko_id", coingecko_id).await
    }
}

#[async_trait]
impl BatchUpserter<CoinDetail> for CoinDetailRepository {
    async fn upsert_batch(&self, records: &[CoinDetail]) -> RepositoryResult<usize> {
        upsert_rows(&self.pool, &self.span, records).await
    }
}

#[async_trait]
impl RecordSource<CoinDetailRow> for CoinDetailRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<CoinDetailRow>> {
        let sql = format!("{} WHERE deleted_at IS NULL ORDER BY id", DETAIL_COLUMNS);
        let rows = sqlx::query_as::<_, CoinDetailRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_natural_key(&self, key: &str) -> RepositoryResult<Option<CoinDetailRow>> {
        let sql = format!(
            "{} WHERE coingecko_id = $1 AND deleted_at IS NULL",
            DETAIL_COLUMNS
        );
        let row = sqlx::query_as::<_, CoinDetailRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        count_live(&self.pool, CoinDetail::TABLE).await
    }
}

#[derive(Clone)]
pub struct CoinTickerRepository {
    pool: PgPool,
    span: Span,
}

impl CoinTickerRepository {
    pub fn new(pool: PgPool, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "repository", table = CoinTicker::TABLE);
        Self { pool, span }
    }

    pub async fn get_by_coin_id(&self, coin_id: i64) -> RepositoryResult<Vec<CoinTickerRow>> {
        let sql = format!(
            "{} WHERE coin_id = $1 AND deleted_at IS NULL ORDER BY page",
            TICKER_COLUMNS
        );
        let rows = sqlx::query_as::<_, CoinTickerRow>(&sql)
            .bind(coin_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl BatchUpserter<CoinTicker> for CoinTickerRepository {
    async fn upsert_batch(&self, records: &[CoinTicker]) -> RepositoryResult<usize> {
        upsert_rows(&self.pool, &self.span, records).await
    }
}

#[async_trait]
impl RecordSource<CoinTickerRow> for CoinTickerRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<CoinTickerRow>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL ORDER BY coin_id, page",
            TICKER_COLUMNS
        );
        let rows = sqlx::query_as::<_, CoinTickerRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Key format is `"coin_id:page"`.
    async fn get_by_natural_key(&self, key: &str) -> RepositoryResult<Option<CoinTickerRow>> {
        let invalid = || RepositoryError::InvalidData(format!("invalid ticker key '{}'", key));
        let (coin, page) = key.split_once(':').ok_or_else(invalid)?;
        let coin_id: i64 = coin.trim().parse().map_err(|_| invalid())?;
        let page: i32 = page.trim().parse().map_err(|_| invalid())?;

        let sql = format!(
            "{} WHERE coin_id = $1 AND page = $2 AND deleted_at IS NULL",
            TICKER_COLUMNS
        );
        let row = sqlx::query_as::<_, CoinTickerRow>(&sql)
            .bind(coin_id)
            .bind(page)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        count_live(&self.pool, CoinTicker::TABLE).await
    }
}
