//! Command-line interface
//!
//! One action per invocation, chosen by mutually exclusive flags. With no
//! action flag the binary runs as a long-lived sync service.

pub mod db;
pub mod serve;
pub mod sync;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser};
use sqlx::PgPool;
use tracing::{info, info_span, Span};

use crate::config::Settings;
use crate::provider::coingecko::{ClientConfig, CoinGeckoClient};
use crate::storage::connect;
use crate::sync::{SyncEntity, SyncOptions, SyncService, SyncStores};

/// CoinGecko sync CLI
#[derive(Parser, Debug)]
#[command(name = "gecko-sync")]
#[command(about = "Synchronize CoinGecko reference and market data into PostgreSQL")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub action: ActionArgs,

    /// Coin to rebuild with `--sync market-data`
    #[arg(long, value_name = "COINGECKO_ID")]
    pub coin: Option<String>,

    /// Override the 24h volume threshold of the detail sync
    #[arg(long, value_name = "USD")]
    pub min_volume: Option<f64>,
}

#[derive(Args, Debug, Default)]
#[group(multiple = false)]
pub struct ActionArgs {
    /// Apply pending schema migrations
    #[arg(long)]
    pub migrate: bool,

    /// Revert the most recent migration
    #[arg(long)]
    pub rollback: bool,

    /// Show migration status
    #[arg(long)]
    pub status: bool,

    /// Sync a single entity and exit
    #[arg(long, value_enum, value_name = "ENTITY")]
    pub sync: Option<SyncEntity>,

    /// Sync every entity in order and exit
    #[arg(long)]
    pub sync_all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Migrate,
    Rollback,
    Status,
    Sync(SyncEntity),
    SyncAll,
    Serve,
}

impl Cli {
    pub fn action(&self) -> Action {
        let args = &self.action;
        if args.migrate {
            Action::Migrate
        } else if args.rollback {
            Action::Rollback
        } else if args.status {
            Action::Status
        } else if let Some(entity) = args.sync {
            Action::Sync(entity)
        } else if args.sync_all {
            Action::SyncAll
        } else {
            Action::Serve
        }
    }

    /// Reject flag combinations clap cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.action() == Action::Sync(SyncEntity::MarketData) && self.coin.is_none() {
            bail!("--sync market-data requires --coin <COINGECKO_ID>");
        }
        if let Some(volume) = self.min_volume {
            if !volume.is_finite() || volume < 0.0 {
                bail!("--min-volume must be a non-negative number");
            }
        }
        Ok(())
    }
}

/// Execute the selected action
pub async fn execute(cli: Cli) -> Result<()> {
    cli.validate()?;

    let mut settings = Settings::load().context("Failed to load settings")?;
    if let Some(volume) = cli.min_volume {
        settings.sync.min_total_volume = volume;
    }

    let span = info_span!("gecko_sync", action = ?cli.action());
    let pool = connect(&settings.database)
        .await
        .context("Failed to connect to database")?;

    match cli.action() {
        Action::Migrate => db::migrate(pool, &span).await,
        Action::Rollback => db::rollback(pool, &span).await,
        Action::Status => db::status(pool, &span).await,
        Action::Sync(entity) => {
            let service = build_service(&settings, pool, &span)?;
            sync::run_one(&service, entity, cli.coin.as_deref()).await
        }
        Action::SyncAll => {
            let service = build_service(&settings, pool, &span)?;
            sync::run_all(&service).await
        }
        Action::Serve => {
            let interval = std::time::Duration::from_secs(settings.sync.interval_secs);
            let service = build_service(&settings, pool, &span)?;
            serve::run(&service, interval).await
        }
    }
}

/// Wire the HTTP client and Postgres repositories into a [`SyncService`].
pub fn build_service(settings: &Settings, pool: PgPool, span: &Span) -> Result<SyncService> {
    let client = CoinGeckoClient::new(ClientConfig::from(&settings.api), span)
        .context("Failed to build CoinGecko client")?;
    info!(base_url = %settings.api.base_url, "CoinGecko client ready");

    Ok(SyncService::new(
        Arc::new(client),
        SyncStores::postgres(pool, span),
        SyncOptions::from_settings(&settings.api, &settings.sync),
        span,
    ))
}
