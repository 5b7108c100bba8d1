use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use serde::Serialize;

/// Entities the orchestrator knows how to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntity {
    AssetPlatforms,
    Categories,
    Exchanges,
    Coins,
    CoinDetails,
    MarketData,
}

impl SyncEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncEntity::AssetPlatforms => "asset_platforms",
            SyncEntity::Categories => "coin_categories",
            SyncEntity::Exchanges => "exchanges",
            SyncEntity::Coins => "coins",
            SyncEntity::CoinDetails => "coin_details",
            SyncEntity::MarketData => "coin_market_data",
        }
    }
}

impl fmt::Display for SyncEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub entity: SyncEntity,
    /// Page requests answered, including a final empty page
    pub pages: u32,
    pub fetched: usize,
    pub stored: usize,
    /// Coins passed over after a fetch failure (detail sync only)
    pub skipped: usize,
    /// Live row count before the run
    pub before: i64,
    pub after: i64,
    pub elapsed: Duration,
}

impl SyncReport {
    pub fn new(entity: SyncEntity) -> Self {
        Self {
            entity,
            pages: 0,
            fetched: 0,
            stored: 0,
            skipped: 0,
            before: 0,
            after: 0,
            elapsed: Duration::ZERO,
        }
    }

    /// Net change in live rows.
    pub fn delta(&self) -> i64 {
        self.after - self.before
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} page(s), {} fetched, {} stored, {} -> {} rows ({:+}) in {:.1}s",
            self.entity,
            self.pages,
            self.fetched,
            self.stored,
            self.before,
            self.after,
            self.delta(),
            self.elapsed.as_secs_f64()
        )?;
        if self.skipped > 0 {
            write!(f, " ({} skipped)", self.skipped)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_display_shows_row_change() {
        let mut report = SyncReport::new(SyncEntity::Coins);
        report.pages = 2;
        report.fetched = 330;
        report.stored = 330;
        report.before = 300;
        report.after = 330;
        assert_eq!(report.delta(), 30);
        assert_eq!(
            report.to_string(),
            "coins: 2 page(s), 330 fetched, 330 stored, 300 -> 330 rows (+30) in 0.0s"
        );

        report.after = 290;
        report.skipped = 1;
        assert!(report.to_string().ends_with("300 -> 290 rows (-10) in 0.0s (1 skipped)"));
    }
}
