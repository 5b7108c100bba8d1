//! Repository for the `exchanges` table.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info_span, Span};

use super::repository::{count_live, soft_delete, upsert_rows, UpsertRow};
use super::{BatchUpserter, RecordSource, RepositoryResult};
use crate::schema::Exchange;

#[derive(Debug, Clone, FromRow)]
pub struct ExchangeRow {
    pub id: i64,
    #[sqlx(flatten)]
    pub exchange: Exchange,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Map of CoinGecko exchange id to surrogate id.
pub fn exchange_id_index(rows: &[ExchangeRow]) -> HashMap<String, i64> {
    rows.iter()
        .map(|row| (row.exchange.coingecko_id.clone(), row.id))
        .collect()
}

impl UpsertRow for Exchange {
    const TABLE: &'static str = "exchanges";
    const UPSERT_SQL: &'static str = r#"
        INSERT INTO exchanges (
            coingecko_id, name, year_established, country, description, url, image,
            has_trading_incentive, trust_score, trust_score_rank, trade_volume_24h_btc,
            trade_volume_24h_btc_normalized, created_at, updated_at, deleted_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW(), NULL)
        ON CONFLICT (coingecko_id) DO UPDATE SET
            name = EXCLUDED.name,
            year_established = EXCLUDED.year_established,
            country = EXCLUDED.country,
            description = EXCLUDED.description,
            url = EXCLUDED.url,
            image = EXCLUDED.image,
            has_trading_incentive = EXCLUDED.has_trading_incentive,
            trust_score = EXCLUDED.trust_score,
            trust_score_rank = EXCLUDED.trust_score_rank,
            trade_volume_24h_btc = EXCLUDED.trade_volume_24h_btc,
            trade_volume_24h_btc_normalized = EXCLUDED.trade_volume_24h_btc_normalized,
            updated_at = NOW(),
            deleted_at = NULL
    "#;

    fn bind_upsert<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(&self.coingecko_id)
            .bind(&self.name)
            .bind(self.year_established)
            .bind(&self.country)
            .bind(&self.description)
            .bind(&self.url)
            .bind(&self.image)
            .bind(self.has_trading_incentive)
            .bind(self.trust_score)
            .bind(self.trust_score_rank)
            .bind(self.trade_volume_24h_btc)
            .bind(self.trade_volume_24h_btc_normalized)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, coingecko_id, name, year_established, country, description, url, image,
           has_trading_incentive, trust_score, trust_score_rank, trade_volume_24h_btc,
           trade_volume_24h_btc_normalized, created_at, updated_at
    FROM exchanges
"#;

#[derive(Clone)]
pub struct ExchangeRepository {
    pool: PgPool,
    span: Span,
}

impl ExchangeRepository {
    pub fn new(pool: PgPool, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "repository", table = Exchange::TABLE);
        Self { pool, span }
    }

    pub async fn soft_delete(&self, coingecko_id: &str) -> RepositoryResult<bool> {
        soft_delete(&self.pool, Exchange::TABLE, "coingecko_id", coingecko_id).await
    }
}

#[async_trait]
impl BatchUpserter<Exchange> for ExchangeRepository {
    async fn upsert_batch(&self, records: &[Exchange]) -> RepositoryResult<usize> {
        upsert_rows(&self.pool, &self.span, records).await
    }
}

#[async_trait]
impl RecordSource<ExchangeRow> for ExchangeRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<ExchangeRow>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL ORDER BY trust_score_rank NULLS LAST, name",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, ExchangeRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_natural_key(&self, key: &str) -> RepositoryResult<Option<ExchangeRow>> {
        let sql = format!(
            "{} WHERE coingecko_id = $1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, ExchangeRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        count_live(&self.pool, Exchange::TABLE).await
    }
}
