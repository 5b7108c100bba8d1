//! Repository for the `coin_market_data` table.
//!
//! Rows are keyed on `(coin_id, exchange_id)`. This is the only table with a
//! hard delete: a refresh replaces all of a coin's venues at once.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info, info_span, Span};

use super::repository::{count_live, partition_valid, upsert_rows, UpsertRow};
use super::{BatchUpserter, RecordSource, Repository, RepositoryError, RepositoryResult};
use crate::schema::CoinMarketData;

#[derive(Debug, Clone, FromRow)]
pub struct CoinMarketDataRow {
    pub id: i64,
    #[sqlx(flatten)]
    pub market_data: CoinMarketData,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpsertRow for CoinMarketData {
    const TABLE: &'static str = "coin_market_data";
    const UPSERT_SQL: &'static str = r#"
        INSERT INTO coin_market_data (
            coin_id, exchange_id, price, volume_24h, volume_percentage, last_updated,
            created_at, updated_at, deleted_at
        ) VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW(), NULL)
        ON CONFLICT (coin_id, exchange_id) DO UPDATE SET
            price = EXCLUDED.price,
            volume_24h = EXCLUDED.volume_24h,
            volume_percentage = EXCLUDED.volume_percentage,
            last_updated = EXCLUDED.last_updated,
            updated_at = NOW(),
            deleted_at = NULL
    "#;

    fn bind_upsert<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(self.coin_id)
            .bind(self.exchange_id)
            .bind(self.price)
            .bind(self.volume_24h)
            .bind(self.volume_percentage)
            .bind(self.last_updated)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, coin_id, exchange_id, price, volume_24h, volume_percentage, last_updated,
           created_at, updated_at
    FROM coin_market_data
"#;

/// Parse a `"coin_id:exchange_id"` key.
pub fn parse_market_data_key(key: &str) -> RepositoryResult<(i64, i64)> {
    let invalid = || RepositoryError::InvalidData(format!("invalid market data key '{}'", key));
    let (coin, exchange) = key.split_once(':').ok_or_else(invalid)?;
    let coin_id = coin.trim().parse().map_err(|_| invalid())?;
    let exchange_id = exchange.trim().parse().map_err(|_| invalid())?;
    Ok((coin_id, exchange_id))
}

/// Market data store with a per-coin replace on top of the keyed upsert.
#[async_trait]
pub trait MarketDataStore: Repository<CoinMarketData, CoinMarketDataRow> {
    /// Drop every row of `coin_id` and write `records` in their place, as
    /// one unit. Returns the number of records written.
    async fn replace_for_coin(
        &self,
        coin_id: i64,
        records: &[CoinMarketData],
    ) -> RepositoryResult<usize>;
}

#[derive(Clone)]
pub struct CoinMarketDataRepository {
    pool: PgPool,
    span: Span,
}

impl CoinMarketDataRepository {
    pub fn new(pool: PgPool, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "repository", table = CoinMarketData::TABLE);
        Self { pool, span }
    }

    pub async fn get_by_coin_id(&self, coin_id: i64) -> RepositoryResult<Vec<CoinMarketDataRow>> {
        let sql = format!(
            "{} WHERE coin_id = $1 AND deleted_at IS NULL ORDER BY volume_24h DESC NULLS LAST",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, CoinMarketDataRow>(&sql)
            .bind(coin_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Hard delete every row for a coin. Returns the number of rows removed.
    pub async fn delete_by_coin_id(&self, coin_id: i64) -> RepositoryResult<u64> {
        let result = sqlx::query("DELETE FROM coin_market_data WHERE coin_id = $1")
            .bind(coin_id)
            .execute(&self.pool)
            .await?;

        info!(parent: &self.span, coin_id, rows = result.rows_affected(), "Deleted market data");
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl MarketDataStore for CoinMarketDataRepository {
    async fn replace_for_coin(
        &self,
        coin_id: i64,
        records: &[CoinMarketData],
    ) -> RepositoryResult<usize> {
        if let Some(stray) = records.iter().find(|r| r.coin_id != coin_id) {
            return Err(RepositoryError::InvalidData(format!(
                "market data for coin {} in a replace of coin {}",
                stray.coin_id, coin_id
            )));
        }
        let (valid, skipped) = partition_valid(records);

        // Dropping `tx` on an early return keeps the old rows.
        let mut tx = self.pool.begin().await?;
        let deleted = sqlx::query("DELETE FROM coin_market_data WHERE coin_id = $1")
            .bind(coin_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        for record in &valid {
            record
                .bind_upsert(sqlx::query(CoinMarketData::UPSERT_SQL))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        info!(
            parent: &self.span,
            coin_id,
            deleted,
            written = valid.len(),
            skipped = skipped.len(),
            "Replaced market data"
        );
        Ok(valid.len())
    }
}

#[async_trait]
impl BatchUpserter<CoinMarketData> for CoinMarketDataRepository {
    async fn upsert_batch(&self, records: &[CoinMarketData]) -> RepositoryResult<usize> {
        upsert_rows(&self.pool, &self.span, records).await
    }
}

#[async_trait]
impl RecordSource<CoinMarketDataRow> for CoinMarketDataRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<CoinMarketDataRow>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL ORDER BY coin_id, exchange_id",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, CoinMarketDataRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_natural_key(&self, key: &str) -> RepositoryResult<Option<CoinMarketDataRow>> {
        let (coin_id, exchange_id) = parse_market_data_key(key)?;
        let sql = format!(
            "{} WHERE coin_id = $1 AND exchange_id = $2 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, CoinMarketDataRow>(&sql)
            .bind(coin_id)
            .bind(exchange_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        count_live(&self.pool, CoinMarketData::TABLE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NaturalKey;

    #[test]
    fn test_market_data_key_round_trips() {
        let row = CoinMarketData::new(12, 34, 1.0);
        assert_eq!(parse_market_data_key(&row.natural_key()).unwrap(), (12, 34));
    }

    #[test]
    fn test_market_data_key_rejects_garbage() {
        assert!(parse_market_data_key("12").is_err());
        assert!(parse_market_data_key("a:b").is_err());
        assert!(parse_market_data_key("").is_err());
    }
}
