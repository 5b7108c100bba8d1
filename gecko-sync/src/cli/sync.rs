//! One-shot sync commands

use anyhow::{Context, Result};
use tracing::info;

use crate::sync::{SyncEntity, SyncReport, SyncService};

/// Sync a single entity. `coin` is required for market data.
pub async fn run_one(service: &SyncService, entity: SyncEntity, coin: Option<&str>) -> Result<()> {
    let report = match entity {
        SyncEntity::AssetPlatforms => service.sync_asset_platforms().await,
        SyncEntity::Categories => service.sync_coin_categories().await,
        SyncEntity::Exchanges => service.sync_exchanges().await,
        SyncEntity::Coins => service.sync_coins().await,
        SyncEntity::CoinDetails => {
            service
                .sync_coin_details(service.options().min_total_volume)
                .await
        }
        SyncEntity::MarketData => {
            let coin = coin.context("--coin is required for market data")?;
            service.sync_coin_market_data(coin).await
        }
    }
    .with_context(|| format!("{} sync failed", entity))?;

    print_report(&report);
    Ok(())
}

pub async fn run_all(service: &SyncService) -> Result<()> {
    let reports = service.sync_all().await.context("Full sync failed")?;
    for report in &reports {
        print_report(report);
    }
    info!("Synced {} entities", reports.len());
    Ok(())
}

fn print_report(report: &SyncReport) {
    println!("{}", report);
}
