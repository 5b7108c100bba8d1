//! Repository for the `asset_platforms` table.
//!
//! The CoinGecko platform id is the primary key, so there is no surrogate id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info_span, Span};

use super::repository::{count_live, soft_delete, upsert_rows, UpsertRow};
use super::{BatchUpserter, RecordSource, RepositoryResult};
use crate::schema::AssetPlatform;

#[derive(Debug, Clone, FromRow)]
pub struct AssetPlatformRow {
    #[sqlx(flatten)]
    pub platform: AssetPlatform,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UpsertRow for AssetPlatform {
    const TABLE: &'static str = "asset_platforms";
    const UPSERT_SQL: &'static str = r#"
        INSERT INTO asset_platforms (
            id, chain_identifier, name, short_name, native_coin_id,
            created_at, updated_at, deleted_at
        ) VALUES ($1, $2, $3, $4, $5, NOW(), NOW(), NULL)
        ON CONFLICT (id) DO UPDATE SET
            chain_identifier = EXCLUDED.chain_identifier,
            name = EXCLUDED.name,
            short_name = EXCLUDED.short_name,
            native_coin_id = EXCLUDED.native_coin_id,
            updated_at = NOW(),
            deleted_at = NULL
    "#;

    fn bind_upsert<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments> {
        query
            .bind(&self.id)
            .bind(self.chain_identifier)
            .bind(&self.name)
            .bind(&self.short_name)
            .bind(&self.native_coin_id)
    }
}

const SELECT_COLUMNS: &str = r#"
    SELECT id, chain_identifier, name, short_name, native_coin_id, created_at, updated_at
    FROM asset_platforms
"#;

#[derive(Clone)]
pub struct AssetPlatformRepository {
    pool: PgPool,
    span: Span,
}

impl AssetPlatformRepository {
    pub fn new(pool: PgPool, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "repository", table = AssetPlatform::TABLE);
        Self { pool, span }
    }

    /// Tombstone a platform. Returns false if no live row matched.
    pub async fn soft_delete(&self, id: &str) -> RepositoryResult<bool> {
        soft_delete(&self.pool, AssetPlatform::TABLE, "id", id).await
    }
}

#[async_trait]
impl BatchUpserter<AssetPlatform> for AssetPlatformRepository {
    async fn upsert_batch(&self, records: &[AssetPlatform]) -> RepositoryResult<usize> {
        upsert_rows(&self.pool, &self.span, records).await
    }
}

#[async_trait]
impl RecordSource<AssetPlatformRow> for AssetPlatformRepository {
    async fn get_all(&self) -> RepositoryResult<Vec<AssetPlatformRow>> {
        let sql = format!("{} WHERE deleted_at IS NULL ORDER BY name", SELECT_COLUMNS);
        let rows = sqlx::query_as::<_, AssetPlatformRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn get_by_natural_key(&self, key: &str) -> RepositoryResult<Option<AssetPlatformRow>> {
        let sql = format!("{} WHERE id = $1 AND deleted_at IS NULL", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, AssetPlatformRow>(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count(&self) -> RepositoryResult<i64> {
        count_live(&self.pool, AssetPlatform::TABLE).await
    }
}
