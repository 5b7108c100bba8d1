//! Repository for the `coin_categories` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info_span, Span};

use super::repository::{count_live, soft_delete, upsert_rows, UpsertRow};
use super::{BatchUpserter, RecordSource, RepositoryResult};
use crate::schema::CoinCategory;

#[derive(Debug, Clone, FromRow)]
pub struct CoinCategoryRow {
    pub id: i64,
    #[sqlx(flatten)]
    pub category: CoinCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpsertRow for CoinCategory {
    const TABLE: &'static str = "coin_categories";
    const UPSERT_SQL: &'static str = r#"
        INSERT INTO coin_categories (coingecko_id, name, created_at, updated_at, deleted_at)
        VALUES ($1, $2, NOW(), NOW(), NULL)
        ON CONFLICT (coingecko_id) DO UPDATE SET
            name = EXCLUDED.name,
            updated_at = NOW(),
            deleted_at = NULL
    "#;

    fn bind_upsert<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query.bind(&self.coingecko_id).bind(&self.name)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, coingecko_id, name, created_at, updated_at
    FROM coin_categories
"#;

#[derive(Clone)]
pub struct CoinCategoryRepository {
    pool: PgPool,
    span: Span,
}

impl CoinCategoryRepository {
    pub fn new(pool: PgPool, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "repository", table = CoinCategory::TABLE);
        Self { pool, span }
    }

    pub async fn soft_delete(&self, coingecko_id: &str) -> RepositoryResult<bool> {
        soft_delete(&self.pool, CoinCategory::TABLE, "coingecko_id", coingecko_id).await
    }
}

#[async_trait]
impl BatchUpserter<CoinCategory> for CoinCategoryRepository {
    async fn upsert_batch(&self, records: &[CoinCategory]) -> RepositoryResult<usize> {
        upsert_rows(&self.pool, &self.span, records).await
    }
}

#[async_trait]
impl RecordSource<CoinCategoryRow> for CoinCategoryRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<CoinCategoryRow>> {
        let sql = format!("{} WHERE deleted_at IS NULL ORDER BY name", SELECT_COLUMNS);
        let rows = sqlx::query_as::<_, CoinCategoryRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_natural_key(&self, key: &str) -> RepositoryResult<Option<CoinCategoryRow>> {
        let sql = format!(
            "{} WHERE coingecko_id = $1 AND deleted_at IS NULL",
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, CoinCategoryRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        count_live(&self.pool, CoinCategory::TABLE).await
    }
}
