//! Versioned schema migrations.
//!
//! Applied versions are recorded in `schema_migrations`. Each migration runs
//! in its own transaction together with its bookkeeping row, so a failed
//! migration leaves no trace.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::{info, info_span, warn, Instrument, Span};

use super::{RepositoryError, RepositoryResult};

/// One schema change and its inverse.
#[derive(Debug)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    up: &'static [&'static str],
    down: &'static [&'static str],
}

/// Applied state of a known migration.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStatus {
    pub version: i64,
    pub description: &'static str,
    pub applied_at: Option<DateTime<Utc>>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create asset_platforms",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS asset_platforms (
                id VARCHAR(50) PRIMARY KEY,
                chain_identifier BIGINT,
                name VARCHAR(255) NOT NULL,
                short_name VARCHAR(100),
                native_coin_id VARCHAR(100),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_asset_platforms_deleted_at ON asset_platforms(deleted_at)",
        ],
        down: &["DROP TABLE IF EXISTS asset_platforms"],
    },
    Migration {
        version: 2,
        description: "index asset_platforms lookups",
        up: &[
            "CREATE INDEX IF NOT EXISTS idx_asset_platforms_chain_identifier ON asset_platforms(chain_identifier)",
            "CREATE INDEX IF NOT EXISTS idx_asset_platforms_name ON asset_platforms(name)",
            "CREATE INDEX IF NOT EXISTS idx_asset_platforms_native_coin_id ON asset_platforms(native_coin_id)",
        ],
        down: &[
            "DROP INDEX IF EXISTS idx_asset_platforms_chain_identifier",
            "DROP INDEX IF EXISTS idx_asset_platforms_name",
            "DROP INDEX IF EXISTS idx_asset_platforms_native_coin_id",
        ],
    },
    Migration {
        version: 3,
        description: "create coin_categories",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS coin_categories (
                id BIGSERIAL PRIMARY KEY,
                coingecko_id VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_coin_categories_deleted_at ON coin_categories(deleted_at)",
        ],
        down: &["DROP TABLE IF EXISTS coin_categories"],
    },
    Migration {
        version: 4,
        description: "create exchanges",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS exchanges (
                id BIGSERIAL PRIMARY KEY,
                coingecko_id VARCHAR(100) NOT NULL UNIQUE,
                name VARCHAR(255) NOT NULL,
                year_established INTEGER,
                country VARCHAR(100),
                description TEXT,
                url VARCHAR(500),
                image VARCHAR(500),
                has_trading_incentive BOOLEAN,
                trust_score INTEGER,
                trust_score_rank INTEGER,
                trade_volume_24h_btc DOUBLE PRECISION,
                trade_volume_24h_btc_normalized DOUBLE PRECISION,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_exchanges_deleted_at ON exchanges(deleted_at)",
        ],
        down: &["DROP TABLE IF EXISTS exchanges"],
    },
    Migration {
        version: 5,
        description: "create coins",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS coins (
                id BIGSERIAL PRIMARY KEY,
                coingecko_id VARCHAR(100) NOT NULL UNIQUE,
                symbol VARCHAR(50) NOT NULL,
                name VARCHAR(255) NOT NULL,
                image VARCHAR(500),
                current_price DOUBLE PRECISION,
                market_cap DOUBLE PRECISION,
                market_cap_rank INTEGER,
                fully_diluted_valuation DOUBLE PRECISION,
                total_volume DOUBLE PRECISION,
                high_24h DOUBLE PRECISION,
                low_24h DOUBLE PRECISION,
                price_change_24h DOUBLE PRECISION,
                price_change_percentage_24h DOUBLE PRECISION,
                market_cap_change_24h DOUBLE PRECISION,
                market_cap_change_percentage_24h DOUBLE PRECISION,
                circulating_supply DOUBLE PRECISION,
                total_supply DOUBLE PRECISION,
                max_supply DOUBLE PRECISION,
                ath DOUBLE PRECISION,
                ath_change_percentage DOUBLE PRECISION,
                ath_date TIMESTAMPTZ,
                atl DOUBLE PRECISION,
                atl_change_percentage DOUBLE PRECISION,
                atl_date TIMESTAMPTZ,
                last_updated TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_coins_deleted_at ON coins(deleted_at)",
            "CREATE INDEX IF NOT EXISTS idx_coins_total_volume ON coins(total_volume)",
        ],
        down: &["DROP TABLE IF EXISTS coins"],
    },
    Migration {
        version: 6,
        description: "create coin_market_data",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS coin_market_data (
                id BIGSERIAL PRIMARY KEY,
                coin_id BIGINT NOT NULL REFERENCES coins(id) ON DELETE CASCADE,
                exchange_id BIGINT NOT NULL REFERENCES exchanges(id) ON DELETE CASCADE,
                price DOUBLE PRECISION NOT NULL,
                volume_24h DOUBLE PRECISION,
                volume_percentage DOUBLE PRECISION,
                last_updated TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ,
                CONSTRAINT uq_coin_market_data_coin_exchange UNIQUE (coin_id, exchange_id)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_coin_market_data_exchange_id ON coin_market_data(exchange_id)",
            "CREATE INDEX IF NOT EXISTS idx_coin_market_data_deleted_at ON coin_market_data(deleted_at)",
        ],
        down: &["DROP TABLE IF EXISTS coin_market_data"],
    },
    Migration {
        version: 7,
        description: "create coin_details",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS coin_details (
                id BIGSERIAL PRIMARY KEY,
                coin_id BIGINT NOT NULL REFERENCES coins(id) ON DELETE CASCADE,
                coingecko_id VARCHAR(100) NOT NULL UNIQUE,
                raw_json JSONB NOT NULL,
                genesis_date TIMESTAMPTZ,
                hashing_algorithm TEXT,
                categories JSONB,
                homepage JSONB,
                last_updated_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_coin_details_coin_id ON coin_details(coin_id)",
            "CREATE INDEX IF NOT EXISTS idx_coin_details_deleted_at ON coin_details(deleted_at)",
        ],
        down: &["DROP TABLE IF EXISTS coin_details"],
    },
    Migration {
        version: 8,
        description: "create coin_tickers",
        up: &[
            r#"
            CREATE TABLE IF NOT EXISTS coin_tickers (
                id BIGSERIAL PRIMARY KEY,
                coin_id BIGINT NOT NULL REFERENCES coins(id) ON DELETE CASCADE,
                page INTEGER NOT NULL,
                raw_json JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                deleted_at TIMESTAMPTZ,
                CONSTRAINT uq_coin_tickers_coin_page UNIQUE (coin_id, page)
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_coin_tickers_deleted_at ON coin_tickers(deleted_at)",
        ],
        down: &["DROP TABLE IF EXISTS coin_tickers"],
    },
];

/// Migrations not yet in `applied`, in version order.
pub fn pending_migrations(applied: &[i64]) -> Vec<&'static Migration> {
    MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .collect()
}

pub struct Migrator {
    pool: PgPool,
    span: Span,
}

impl Migrator {
    pub fn new(pool: PgPool, parent: &Span) -> Self {
        let span = info_span!(parent: parent, "migrator");
        Self { pool, span }
    }

    async fn ensure_table(&self) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn applied(&self) -> RepositoryResult<Vec<(i64, DateTime<Utc>)>> {
        self.ensure_table().await?;
        let rows: Vec<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT version, applied_at FROM schema_migrations ORDER BY version",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Apply every pending migration. Returns the versions applied.
    pub async fn run(&self) -> RepositoryResult<Vec<i64>> {
        async {
            let applied: Vec<i64> = self.applied().await?.into_iter().map(|(v, _)| v).collect();
            let pending = pending_migrations(&applied);

            if pending.is_empty() {
                info!("Schema is up to date");
                return Ok(Vec::new());
            }

            let mut done = Vec::with_capacity(pending.len());
            for migration in pending {
                let mut tx = self.pool.begin().await?;
                for statement in migration.up {
                    sqlx::query(statement).execute(&mut *tx).await?;
                }
                sqlx::query("INSERT INTO schema_migrations (version, description) VALUES ($1, $2)")
                    .bind(migration.version)
                    .bind(migration.description)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;

                info!(version = migration.version, "Applied migration: {}", migration.description);
                done.push(migration.version);
            }
            Ok::<Vec<i64>, RepositoryError>(done)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Revert the most recently applied migration, if any.
    pub async fn rollback_last(&self) -> RepositoryResult<Option<i64>> {
        async {
            let Some((version, _)) = self.applied().await?.pop() else {
                warn!("No migrations to roll back");
                return Ok(None);
            };

            let migration = MIGRATIONS
                .iter()
                .find(|m| m.version == version)
                .ok_or_else(|| {
                    RepositoryError::Migration(format!("unknown applied version {}", version))
                })?;

            let mut tx = self.pool.begin().await?;
            for statement in migration.down {
                sqlx::query(statement).execute(&mut *tx).await?;
            }
            sqlx::query("DELETE FROM schema_migrations WHERE version = $1")
                .bind(version)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            info!(version, "Rolled back migration: {}", migration.description);
            Ok::<Option<i64>, RepositoryError>(Some(version))
        }
        .instrument(self.span.clone())
        .await
    }

    /// Every known migration with the time it was applied, if it was.
    pub async fn status(&self) -> RepositoryResult<Vec<MigrationStatus>> {
        let applied = self.applied().await?;
        Ok(MIGRATIONS
            .iter()
            .map(|m| MigrationStatus {
                version: m.version,
                description: m.description,
                applied_at: applied
                    .iter()
                    .find(|(version, _)| *version == m.version)
                    .map(|(_, at)| *at),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_strictly_increase() {
        assert!(MIGRATIONS
            .windows(2)
            .all(|pair| pair[0].version < pair[1].version));
    }

    #[test]
    fn test_every_migration_can_be_reverted() {
        for migration in MIGRATIONS {
            assert!(!migration.up.is_empty(), "{} has no up", migration.version);
            assert!(!migration.down.is_empty(), "{} has no down", migration.version);
        }
    }

    #[test]
    fn test_pending_migrations() {
        assert_eq!(pending_migrations(&[]).len(), MIGRATIONS.len());

        let pending: Vec<i64> = pending_migrations(&[1, 2, 3])
            .iter()
            .map(|m| m.version)
            .collect();
        assert_eq!(pending, vec![4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_tables_carry_tombstone_column() {
        for migration in MIGRATIONS {
            for statement in migration.up {
                if statement.contains("CREATE TABLE") {
                    assert!(statement.contains("deleted_at TIMESTAMPTZ"));
                    assert!(statement.contains("updated_at TIMESTAMPTZ"));
                }
            }
        }
    }
}
