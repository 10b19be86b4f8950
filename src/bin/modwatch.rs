//! modwatch - Go module index scraper
//!
//! Scrapes the module index from the newest stored timestamp up to the index
//! head, fetches `go.mod` manifests for release versions and stores everything
//! in SQLite. Exits non-zero on the first fatal error; rerunning resumes from
//! the last committed batch.
//!
//! Usage:
//!   cargo run --release --bin modwatch
//!
//! Environment variables: see `ScraperConfig::from_env`.

use dotenv::dotenv;
use log::{error, info};
use modwatch::scraper::{IndexClient, ProxyClient};
use modwatch::{Pipeline, PipelineSettings, ScraperConfig, Store};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    let config = match ScraperConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("❌ {}", e);
            return Err(e.into());
        }
    };

    info!("🚀 modwatch {}", env!("CARGO_PKG_VERSION"));
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Index: {}", config.index_url);
    info!("   ├─ Proxy: {}", config.proxy_url);
    info!("   ├─ Timeouts: index {:?}, proxy {:?}", config.index_timeout, config.proxy_timeout);
    info!("   ├─ Scrape delay: {:?}", config.scrape_delay);
    info!("   └─ User-Agent: {}", config.user_agent);

    if let Err(e) = run(&config).await {
        error!("❌ {}", e);
        return Err(e.into());
    }

    Ok(())
}

async fn run(config: &ScraperConfig) -> Result<(), modwatch::ScrapeError> {
    let store = Store::open(&config.db_path)?;
    let index = IndexClient::new(&config.index_url, config.index_timeout, &config.user_agent)?;
    let proxy = ProxyClient::new(&config.proxy_url, config.proxy_timeout, &config.user_agent)?;

    let pipeline = Pipeline::new(Arc::new(index), Arc::new(proxy), PipelineSettings::from(config));
    pipeline.run(store).await?;
    Ok(())
}
