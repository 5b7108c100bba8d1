//! Repository errors, capability traits and the shared upsert path.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument, Span};

use gecko_common::error::{ErrorCategory, ErrorClassification};

use crate::config::DatabaseSettings;
use crate::schema::NaturalKey;

/// Repository errors
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl ErrorClassification for RepositoryError {
    fn category(&self) -> ErrorCategory {
        match self {
            RepositoryError::Database(sqlx::Error::PoolTimedOut) => {
                ErrorCategory::ResourceExhausted
            }
            RepositoryError::Database(sqlx::Error::Io(_)) => ErrorCategory::Transient,
            RepositoryError::Database(_) => ErrorCategory::Permanent,
            RepositoryError::Configuration(_) => ErrorCategory::Configuration,
            RepositoryError::Migration(_) => ErrorCategory::Internal,
            RepositoryError::NotFound(_) => ErrorCategory::Permanent,
            RepositoryError::InvalidData(_) => ErrorCategory::Permanent,
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Create the connection pool and verify it with a round trip.
pub async fn connect(settings: &DatabaseSettings) -> RepositoryResult<PgPool> {
    let options = settings
        .connect_options()
        .map_err(|e| RepositoryError::Configuration(e.to_string()))?;

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(settings.acquire_timeout())
        .idle_timeout(Duration::from_secs(600))
        .connect_with(options)
        .await?;

    sqlx::query("SELECT 1").execute(&pool).await?;
    info!(
        max_connections = settings.max_connections,
        "Database connection established"
    );

    Ok(pool)
}

/// Insert-or-update of a batch keyed on the records' natural key.
#[async_trait]
pub trait BatchUpserter<T: Send + Sync>: Send + Sync {
    /// Upsert all records with a usable key in one transaction.
    ///
    /// Records with an empty key are skipped with a warning. Returns the
    /// number of records written; an empty batch touches nothing.
    async fn upsert_batch(&self, records: &[T]) -> RepositoryResult<usize>;

    async fn upsert(&self, record: &T) -> RepositoryResult<()> {
        self.upsert_batch(std::slice::from_ref(record)).await?;
        Ok(())
    }
}

/// Read access to stored rows. Tombstoned rows are never returned.
#[async_trait]
pub trait RecordSource<R>: Send + Sync {
    async fn get_all(&self) -> RepositoryResult<Vec<R>>;

    async fn get_by_natural_key(&self, key: &str) -> RepositoryResult<Option<R>>;

    async fn count(&self) -> RepositoryResult<i64>;
}

/// A store that both writes records `T` and reads rows `R`.
pub trait Repository<T: Send + Sync, R>: BatchUpserter<T> + RecordSource<R> {}

impl<X, T, R> Repository<T, R> for X
where
    T: Send + Sync,
    X: BatchUpserter<T> + RecordSource<R>,
{
}

/// A record with a single-row `INSERT ... ON CONFLICT DO UPDATE` statement.
pub trait UpsertRow: NaturalKey + Send + Sync {
    /// Table name, used for logging
    const TABLE: &'static str;
    const UPSERT_SQL: &'static str;

    fn bind_upsert<'q>(
        &'q self,
        query: Query<'q, Postgres, PgArguments>,
    ) -> Query<'q, Postgres, PgArguments>;
}

/// Split a batch into records with a usable natural key and the indexes of
/// the rest.
pub fn partition_valid<T: NaturalKey>(records: &[T]) -> (Vec<&T>, Vec<usize>) {
    let mut valid = Vec::with_capacity(records.len());
    let mut skipped = Vec::new();

    for (index, record) in records.iter().enumerate() {
        if record.has_natural_key() {
            valid.push(record);
        } else {
            skipped.push(index);
        }
    }

    (valid, skipped)
}

/// Shared upsert path used by every Postgres repository.
pub(crate) async fn upsert_rows<T: UpsertRow>(
    pool: &PgPool,
    span: &Span,
    records: &[T],
) -> RepositoryResult<usize> {
    let (valid, skipped) = partition_valid(records);

    for index in &skipped {
        warn!(
            parent: span,
            table = T::TABLE,
            index,
            "Skipping record with empty natural key"
        );
    }

    if valid.is_empty() {
        return Ok(0);
    }

    let batch_span = info_span!(parent: span, "upsert_batch", table = T::TABLE, size = valid.len());
    async {
        // Dropping `tx` on an early return rolls the batch back.
        let mut tx = pool.begin().await?;
        for record in &valid {
            record
                .bind_upsert(sqlx::query(T::UPSERT_SQL))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        debug!(
            "Upserted {} {} rows ({} skipped)",
            valid.len(),
            T::TABLE,
            skipped.len()
        );
        Ok::<usize, RepositoryError>(valid.len())
    }
    .instrument(batch_span)
    .await
}

/// Count of rows that are not tombstoned.
pub(crate) async fn count_live(pool: &PgPool, table: &str) -> RepositoryResult<i64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE deleted_at IS NULL", table);
    let count: i64 = sqlx::query_scalar(&sql).fetch_one(pool).await?;
    Ok(count)
}

/// Tombstone a row by key. Returns false when no live row matched.
pub(crate) async fn soft_delete(
    pool: &PgPool,
    table: &str,
    key_column: &str,
    key: &str,
) -> RepositoryResult<bool> {
    let sql = format!(
        "UPDATE {} SET deleted_at = NOW(), updated_at = NOW() WHERE {} = $1 AND deleted_at IS NULL",
        table, key_column
    );
    let result = sqlx::query(&sql).bind(key).execute(pool).await?;
    Ok(result.rows_affected() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AssetPlatform, CoinMarketData};
    use crate::storage::AssetPlatformRepository;

    #[test]
    fn test_partition_skips_empty_keys() {
        let records = vec![
            AssetPlatform::new("ethereum", "Ethereum"),
            AssetPlatform::new("", "Nameless"),
            AssetPlatform::new("solana", "Solana"),
            AssetPlatform::new("   ", "Blank"),
        ];

        let (valid, skipped) = partition_valid(&records);

        let ids: Vec<&str> = valid.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["ethereum", "solana"]);
        assert_eq!(skipped, vec![1, 3]);
    }

    #[test]
    fn test_partition_market_data_requires_ids() {
        let records = vec![CoinMarketData::new(1, 2, 10.0), CoinMarketData::new(0, 2, 10.0)];
        let (valid, skipped) = partition_valid(&records);
        assert_eq!(valid.len(), 1);
        assert_eq!(skipped, vec![1]);
    }

    #[test]
    fn test_repository_error_classification() {
        let err = RepositoryError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.category(), ErrorCategory::ResourceExhausted);

        let err = RepositoryError::Database(sqlx::Error::RowNotFound);
        assert!(err.is_permanent());

        let err = RepositoryError::Migration("unknown version 99".into());
        assert_eq!(err.category(), ErrorCategory::Internal);
    }

    // A lazy pool never connects until a query runs, and this URL points at
    // nothing, so these pass only if the pool is left untouched.
    fn unreachable_pool() -> PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://nobody@127.0.0.1:1/none")
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_batch_touches_no_storage() {
        let repo = AssetPlatformRepository::new(unreachable_pool(), &Span::none());
        let empty: Vec<AssetPlatform> = Vec::new();
        assert_eq!(repo.upsert_batch(&empty).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_all_invalid_batch_touches_no_storage() {
        let repo = AssetPlatformRepository::new(unreachable_pool(), &Span::none());
        let records = vec![AssetPlatform::new("", "A"), AssetPlatform::new(" ", "B")];
        assert_eq!(repo.upsert_batch(&records).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_valid_batch_reaches_storage() {
        let repo = AssetPlatformRepository::new(unreachable_pool(), &Span::none());
        let records = vec![AssetPlatform::new("ethereum", "Ethereum")];
        assert!(matches!(
            repo.upsert_batch(&records).await,
            Err(RepositoryError::Database(_))
        ));
    }
}
