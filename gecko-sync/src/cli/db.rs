//! Schema migration commands

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{info, Span};

use crate::storage::Migrator;

pub async fn migrate(pool: PgPool, span: &Span) -> Result<()> {
    let applied = Migrator::new(pool, span)
        .run()
        .await
        .context("Migration failed")?;
    info!("Applied {} migration(s)", applied.len());
    Ok(())
}

pub async fn rollback(pool: PgPool, span: &Span) -> Result<()> {
    match Migrator::new(pool, span)
        .rollback_last()
        .await
        .context("Rollback failed")?
    {
        Some(version) => info!(version, "Rollback complete"),
        None => info!("Nothing to roll back"),
    }
    Ok(())
}

pub async fn status(pool: PgPool, span: &Span) -> Result<()> {
    let statuses = Migrator::new(pool, span)
        .status()
        .await
        .context("Failed to read migration status")?;

    println!("{:<8} {:<40} APPLIED", "VERSION", "DESCRIPTION");
    for status in statuses {
        let applied = status
            .applied_at
            .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "pending".to_string());
        println!("{:<8} {:<40} {}", status.version, status.description, applied);
    }
    Ok(())
}
