//! Repository for the `coins` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info_span, Span};

use super::repository::{count_live, soft_delete, upsert_rows, UpsertRow};
use super::{BatchUpserter, RecordSource, RepositoryResult};
use crate::schema::Coin;

#[derive(Debug, Clone, FromRow)]
pub struct CoinRow {
    pub id: i64,
    #[sqlx(flatten)]
    pub coin: Coin,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpsertRow for Coin {
    const TABLE: &'static str = "coins";
    const UPSERT_SQL: &'static str = r#"
        INSERT INTO coins (
            coingecko_id, symbol, name, image, current_price, market_cap, market_cap_rank,
            fully_diluted_valuation, total_volume, high_24h, low_24h, price_change_24h,
            price_change_percentage_24h, market_cap_change_24h, market_cap_change_percentage_24h,
            circulating_supply, total_supply, max_supply, ath, ath_change_percentage, ath_date,
            atl, atl_change_percentage, atl_date, last_updated,
            created_at, updated_at, deleted_at
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
            $18, $19, $20, $21, $22, $23, $24, $25, NOW(), NOW(), NULL
        )
        ON CONFLICT (coingecko_id) DO UPDATE SET
            symbol = EXCLUDED.symbol,
            name = EXCLUDED.name,
            image = EXCLUDED.image,
            current_price = EXCLUDED.current_price,
            market_cap = EXCLUDED.market_cap,
            market_cap_rank = EXCLUDED.market_cap_rank,
            fully_diluted_valuation = EXCLUDED.fully_diluted_valuation,
            total_volume = EXCLUDED.total_volume,
            high_24h = EXCLUDED.high_24h,
            low_24h = EXCLUDED.low_24h,
            price_change_24h = EXCLUDED.price_change_24h,
            price_change_percentage_24h = EXCLUDED.price_change_percentage_24h,
            market_cap_change_24h = EXCLUDED.market_cap_change_24h,
            market_cap_change_percentage_24h = EXCLUDED.market_cap_change_percentage_24h,
            circulating_supply = EXCLUDED.circulating_supply,
            total_supply = EXCLUDED.total_supply,
            max_supply = EXCLUDED.max_supply,
            ath = EXCLUDED.ath,
            ath_change_percentage = EXCLUDED.ath_change_percentage,
            ath_date = EXCLUDED.ath_date,
            atl = EXCLUDED.atl,
            atl_change_percentage = EXCLUDED.atl_change_percentage,
            atl_date = EXCLUDED.atl_date,
            last_updated = EXCLUDED.last_updated,
            updated_at = NOW(),
            deleted_at = NULL
    "#;

    fn bind_upsert<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(&self.coingecko_id)
            .bind(&self.symbol)
            .bind(&self.name)
            .bind(&self.image)
            .bind(self.current_price)
            .bind(self.market_cap)
            .bind(self.market_cap_rank)
            .bind(self.fully_diluted_valuation)
            .bind(self.total_volume)
            .bind(self.high_24h)
            .bind(self.low_24h)
            .bind(self.price_change_24h)
            .bind(self.price_change_percentage_24h)
            .bind(self.market_cap_change_24h)
            .bind(self.market_cap_change_percentage_24h)
            .bind(self.circulating_supply)
            .bind(self.total_supply)
            .bind(self.max_supply)
            .bind(self.ath)
            .bind(self.ath_change_percentage)
            .bind(self.ath_date)
            .bind(self.atl)
            .bind(self.atl_change_percentage)
            .bind(self.atl_date)
            .bind(self.last_updated)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, coingecko_id, symbol, name, image, current_price, market_cap, market_cap_rank,
           fully_diluted_valuation, total_volume, high_24h, low_24h, price_change_24h,
           price_change_percentage_24h, market_cap_change_24h, market_cap_change_percentage_24h,
           circulating_supply, total_supply, max_supply, ath, ath_change_percentage, ath_date,
           atl, atl_change_percentage, atl_date, last_updated, created_at, updated_at
    FROM coins
"#;

#[derive(Clone)]
pub struct CoinRepository {
    pool: PgPool,
    span: Span,
}

impl CoinRepository {
    pub fn new(pool: PgPool, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "repository", table = Coin::TABLE);
        Self { pool, span }
    }

    pub async fn soft_delete(&self, coingecko_id: &str) -> RepositoryResult<bool> {
        soft_delete(&self.pool, Coin::TABLE, "coingecko_id", coingecko_id).await
    }
}

#[async_trait]
impl BatchUpserter<Coin> for CoinRepository {
    async fn upsert_batch(&self, records: &[Coin]) -> RepositoryResult<usize> {
        upsert_rows(&self.pool, &self.span, records).await
    }
}

#[async_trait]
impl RecordSource<CoinRow> for CoinRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<CoinRow>> {
        let sql = format!(
            "{} WHERE deleted_at IS NULL ORDER BY market_cap_rank NULLS LAST, id",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, CoinRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_natural_key(&self, key: &str) -> RepositoryResult<Option<CoinRow>> {
        let sql = format!(
            "{} WHERE coingecko_id = $1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, CoinRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        count_live(&self.pool, Coin::TABLE).await
    }
}
