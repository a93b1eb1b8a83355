//! Seed lists of proxy addresses.

use std::collections::HashSet;

use log::info;
use url::Url;

use crate::error::{Error, Result};
use crate::proxy::normalize_address;

/// Load a newline-delimited proxy list from a URL or a file path.
pub async fn load_seed_source(source: &str) -> Result<Vec<String>> {
    let seed_error = |message: String| Error::SeedSource {
        source_name: source.to_string(),
        message,
    };

    let is_remote = Url::parse(source)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false);
    let content = if is_remote {
        let response = reqwest::get(source)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| seed_error(e.to_string()))?;
        response.text().await.map_err(|e| seed_error(e.to_string()))?
    } else {
        tokio::fs::read_to_string(source)
            .await
            .map_err(|e| seed_error(e.to_string()))?
    };

    let proxies = parse_seed_list(&content);
    info!("Loaded {} proxies from {}", proxies.len(), source);
    Ok(proxies)
}

/// Parse `host:port` lines, skipping blanks and `#` comments.
/// Duplicates are dropped, keeping the first occurrence.
pub fn parse_seed_list(content: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(normalize_address)
        .filter(|address| address.contains(':'))
        .filter(|address| seen.insert(address.to_string()))
        .map(str::to_string)
        .collect()
}
