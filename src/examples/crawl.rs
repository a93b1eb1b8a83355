//! Crawl a list of URLs through a proxy pool kept in SQLite.
//!
//! ```text
//! PROXY_SEEDS=proxy_list.txt cargo run --example crawl -- http://example.com/ http://example.org/
//! ```

use scrape_proxy_pool::{Crawler, PoolConfig, ProxyPool, SqliteStorage};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let seeds = std::env::var("PROXY_SEEDS").unwrap_or_else(|_| "proxy_list.txt".to_string());
    let urls: Vec<String> = std::env::args().skip(1).collect();
    if urls.is_empty() {
        eprintln!("usage: crawl <url>...");
        return Ok(());
    }

    let config = PoolConfig::builder()
        .request_timeout(Duration::from_secs(4))
        .max_attempts(9)
        .crawl_workers(4)
        .build();

    let storage = Arc::new(SqliteStorage::open("proxy_pool.db").await?);
    let pool = Arc::new(ProxyPool::new(config, storage));

    let ingested = pool.ingest_source(&seeds).await?;
    println!("Ingested {} proxies from {}", ingested, seeds);

    let report = pool.refresh().await?;
    println!(
        "Pool refreshed ({:?}): {} validated, {} promoted",
        report.kind, report.validated, report.promoted
    );

    let crawl = Crawler::new(pool.clone()).run(urls).await?;
    for doc in &crawl.documents {
        println!(
            "{} [{}] {}",
            doc.url,
            doc.status,
            doc.title().unwrap_or_default()
        );
    }
    for skipped in &crawl.skipped {
        println!("skipped {}: {}", skipped.url, skipped.reason);
    }

    let stats = pool.stats().await?;
    println!(
        "Pool: {} working, {} not working, {} unchecked",
        stats.working, stats.not_working, stats.unchecked
    );

    Ok(())
}
