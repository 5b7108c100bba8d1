//! gecko-sync binary
//!
//! - `--migrate`, `--rollback`, `--status`: schema management
//! - `--sync <entity>`, `--sync-all`: one-shot sync
//! - no flag: sync service until SIGINT/SIGTERM

use clap::Parser;
use tracing::error;

use gecko_common::logging::{init_logging, LogConfig};
use gecko_sync::cli::{self, Cli};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    if let Err(e) = init_logging(LogConfig::from_env()) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
