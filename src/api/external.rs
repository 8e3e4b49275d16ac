//! External market aggregates.
//!
//! Supplies the 24h volume term consumed by the signal aggregator. Failures
//! here are never cycle errors: unknown assets and provider hiccups degrade
//! to a zeroed aggregate with a warning.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tracing::{debug, warn};

use super::types::AggregateMarketRow;

const AGGREGATE_BASE: &str = "https://api.coingecko.com/api/v3";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Aggregate-provider asset id for a Kraken pair.
fn coin_id(pair: &str) -> Option<&'static str> {
    let asset = pair.strip_suffix("USD").unwrap_or(pair);
    match asset {
        "XBT" | "XXBT" => Some("bitcoin"),
        "ETH" | "XETH" => Some("ethereum"),
        "ADA" => Some("cardano"),
        "SOL" => Some("solana"),
        "DOT" => Some("polkadot"),
        _ => None,
    }
}

/// Read-only client for the external aggregate feed.
pub struct AggregateClient {
    client: Client,
    base_url: String,
}

impl AggregateClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: AGGREGATE_BASE.to_string(),
        })
    }

    /// 24h traded volume for a pair's base asset, or 0.0 when the asset is
    /// unknown or the provider is unavailable.
    pub async fn volume_24h(&self, pair: &str) -> f64 {
        let Some(id) = coin_id(pair) else {
            warn!(pair, "no aggregate asset mapping, using zero volume");
            return 0.0;
        };

        match self.fetch_volume(id).await {
            Ok(volume) => {
                debug!(pair, volume, "external aggregate");
                volume
            }
            Err(e) => {
                warn!(pair, error = %e, "external aggregate failed, using zero volume");
                0.0
            }
        }
    }

    async fn fetch_volume(&self, id: &str) -> Result<f64> {
        let url = format!("{}/coins/markets", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("vs_currency", "usd"), ("ids", id)])
            .send()
            .await
            .context("Aggregate request failed")?;

        if !response.status().is_success() {
            anyhow::bail!("Aggregate request failed: {}", response.status());
        }

        let rows: Vec<AggregateMarketRow> = response
            .json()
            .await
            .context("Failed to parse aggregate response")?;

        Ok(rows
            .first()
            .and_then(|row| row.total_volume)
            .unwrap_or(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coin_id_maps_known_assets() {
        assert_eq!(coin_id("XBTUSD"), Some("bitcoin"));
        assert_eq!(coin_id("ETHUSD"), Some("ethereum"));
        assert_eq!(coin_id("ADAUSD"), Some("cardano"));
    }

    #[test]
    fn test_coin_id_unknown_asset_degrades() {
        assert_eq!(coin_id("DOGEUSD"), None);
        assert_eq!(coin_id("???"), None);
    }
}
