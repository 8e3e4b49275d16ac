//! Kraken REST client: public market data and signed private calls.
//!
//! Public fetches retry transient transport failures with bounded
//! exponential backoff and surface an explicit error once the budget is
//! spent. Private calls are HMAC-SHA512 signed. In dry-run mode order
//! placement logs the intent and returns a synthetic id, and the quote
//! balance is simulated.

use std::time::Duration;

use anyhow::Context;
use backoff::ExponentialBackoff;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{atr_from_bars, MarketSnapshot, OhlcBar};

use super::types::{AddOrderResult, KrakenResponse};

const API_BASE: &str = "https://api.kraken.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Total time budget for retrying one public fetch.
const RETRY_BUDGET: Duration = Duration::from_secs(30);

/// Short OHLC lookback used for the snapshot ATR: five 5-minute bars.
const ATR_INTERVAL_MIN: u32 = 5;
const ATR_BARS: i64 = 5;

/// Provider failure taxonomy.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("kraken api error: {0:?}")]
    Api(Vec<String>),

    #[error("order rejected: {0:?}")]
    OrderRejected(Vec<String>),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("private endpoint called without credentials")]
    MissingCredentials,
}

fn malformed(what: impl Into<String>) -> ProviderError {
    ProviderError::Malformed(what.into())
}

struct Credentials {
    api_key: String,
    api_secret: Vec<u8>,
}

/// Kraken REST client.
pub struct KrakenClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    dry_run: bool,
    paper_balance: f64,
}

impl KrakenClient {
    /// Build from `KRAKEN_API_KEY` / `KRAKEN_API_SECRET`. Live mode without
    /// credentials is a hard startup error; dry-run tolerates their absence.
    pub fn from_env(dry_run: bool, paper_balance: f64) -> anyhow::Result<Self> {
        let key = std::env::var("KRAKEN_API_KEY").ok();
        let secret = std::env::var("KRAKEN_API_SECRET").ok();

        let credentials = match (key, secret) {
            (Some(api_key), Some(secret)) => {
                let api_secret = B64
                    .decode(secret.trim())
                    .context("KRAKEN_API_SECRET is not valid base64")?;
                Some(Credentials {
                    api_key,
                    api_secret,
                })
            }
            _ if dry_run => None,
            _ => anyhow::bail!(
                "live trading requires KRAKEN_API_KEY and KRAKEN_API_SECRET"
            ),
        };

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: API_BASE.to_string(),
            credentials,
            dry_run,
            paper_balance,
        })
    }

    // ==================== Public endpoints ====================

    async fn public(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ProviderError> {
        let url = format!("{}/0/public/{}", self.base_url, endpoint);
        let policy = ExponentialBackoff {
            max_elapsed_time: Some(RETRY_BUDGET),
            ..ExponentialBackoff::default()
        };

        backoff::future::retry(policy, || async {
            debug!(url = %url, "public fetch");

            let response = self
                .client
                .get(&url)
                .query(params)
                .send()
                .await
                .map_err(|e| backoff::Error::transient(ProviderError::Transport(e)))?;

            let parsed: KrakenResponse<Value> = response
                .json()
                .await
                .map_err(|e| backoff::Error::transient(ProviderError::Transport(e)))?;

            if !parsed.error.is_empty() {
                return Err(backoff::Error::permanent(ProviderError::Api(parsed.error)));
            }

            parsed
                .result
                .ok_or_else(|| backoff::Error::permanent(malformed("missing result field")))
        })
        .await
    }

    /// Price, top-of-book depth volume and a short-window ATR for one pair.
    pub async fn get_market_data(&self, pair: &str) -> Result<MarketSnapshot, ProviderError> {
        let ticker = self
            .public("Ticker", &[("pair", pair.to_string())])
            .await?;
        let price = ticker_price(&ticker)?;

        let depth = self
            .public(
                "Depth",
                &[("pair", pair.to_string()), ("count", "1".to_string())],
            )
            .await?;
        let volume = depth_volume(&depth)?;

        let since = Utc::now().timestamp() - ATR_BARS * (ATR_INTERVAL_MIN as i64) * 60;
        let ohlc = self
            .public(
                "OHLC",
                &[
                    ("pair", pair.to_string()),
                    ("interval", ATR_INTERVAL_MIN.to_string()),
                    ("since", since.to_string()),
                ],
            )
            .await?;
        let bars = parse_ohlc(&ohlc)?;
        let atr = atr_from_bars(&bars);

        Ok(MarketSnapshot { price, volume, atr })
    }

    /// Hourly OHLC bars covering the last `days` days, oldest first.
    pub async fn get_ohlc(&self, pair: &str, days: u32) -> Result<Vec<OhlcBar>, ProviderError> {
        let since = Utc::now().timestamp() - (days as i64) * 86_400;
        let result = self
            .public(
                "OHLC",
                &[
                    ("pair", pair.to_string()),
                    ("interval", "60".to_string()),
                    ("since", since.to_string()),
                ],
            )
            .await?;
        parse_ohlc(&result)
    }

    // ==================== Private endpoints ====================

    async fn private(
        &self,
        endpoint: &str,
        params: Vec<(&str, String)>,
    ) -> Result<Value, ProviderError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ProviderError::MissingCredentials)?;

        let path = format!("/0/private/{}", endpoint);
        let nonce = Utc::now().timestamp_millis().to_string();

        let mut postdata = format!("nonce={}", nonce);
        for (key, value) in &params {
            postdata.push_str(&format!("&{}={}", key, value));
        }

        let signature = sign_request(&credentials.api_secret, &path, &nonce, &postdata)?;

        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("API-Key", credentials.api_key.as_str())
            .header("API-Sign", signature)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(postdata)
            .send()
            .await?;

        let parsed: KrakenResponse<Value> = response.json().await?;
        if !parsed.error.is_empty() {
            return Err(ProviderError::Api(parsed.error));
        }

        parsed
            .result
            .ok_or_else(|| malformed("missing result field"))
    }

    /// Available quote-currency balance. Simulated in dry-run mode.
    pub async fn get_quote_balance(&self) -> Result<f64, ProviderError> {
        if self.dry_run {
            return Ok(self.paper_balance);
        }

        let result = self.private("Balance", Vec::new()).await?;
        let balances = result
            .as_object()
            .ok_or_else(|| malformed("Balance result is not an object"))?;

        // Kraken reports USD as ZUSD.
        let quote = balances
            .iter()
            .find(|(asset, _)| asset.as_str() == "ZUSD" || asset.as_str() == "USD")
            .and_then(|(_, v)| value_f64(v))
            .unwrap_or(0.0);

        Ok(quote)
    }

    /// Available base-asset balance for a pair. Simulated (zero) in dry-run.
    pub async fn get_base_balance(&self, pair: &str) -> Result<f64, ProviderError> {
        if self.dry_run {
            return Ok(0.0);
        }

        let asset = pair.strip_suffix("USD").unwrap_or(pair);
        let result = self.private("Balance", Vec::new()).await?;
        let balances = result
            .as_object()
            .ok_or_else(|| malformed("Balance result is not an object"))?;

        let base = balances
            .iter()
            .find(|(key, _)| key.contains(asset))
            .and_then(|(_, v)| value_f64(v))
            .unwrap_or(0.0);

        Ok(base)
    }

    /// Place a limit buy for the given quote notional. Returns the order id.
    pub async fn place_buy(
        &self,
        pair: &str,
        notional: f64,
        price: f64,
    ) -> Result<String, ProviderError> {
        let volume = if price > 0.0 { notional / price } else { 0.0 };
        self.add_order(pair, "buy", volume, price).await
    }

    /// Place a limit sell for the given base volume. Returns the order id.
    pub async fn place_sell(
        &self,
        pair: &str,
        volume: f64,
        price: f64,
    ) -> Result<String, ProviderError> {
        self.add_order(pair, "sell", volume, price).await
    }

    async fn add_order(
        &self,
        pair: &str,
        side: &str,
        volume: f64,
        price: f64,
    ) -> Result<String, ProviderError> {
        if self.dry_run {
            let order_id = format!("DRY-{}", Uuid::new_v4());
            info!(
                pair,
                side,
                volume,
                price,
                order_id = %order_id,
                "[DRY RUN] would place order"
            );
            return Ok(order_id);
        }

        let result = self
            .private(
                "AddOrder",
                vec![
                    ("pair", pair.to_string()),
                    ("type", side.to_string()),
                    ("ordertype", "limit".to_string()),
                    ("price", format!("{:.2}", price)),
                    ("volume", format!("{:.8}", volume)),
                ],
            )
            .await
            .map_err(|e| match e {
                // An exchange-side rejection carries the provider's payload.
                ProviderError::Api(errors) => ProviderError::OrderRejected(errors),
                other => other,
            })?;

        let ack: AddOrderResult = serde_json::from_value(result)
            .map_err(|e| malformed(format!("AddOrder result: {}", e)))?;

        ack.txid
            .into_iter()
            .next()
            .ok_or_else(|| malformed("AddOrder returned no txid"))
    }
}

// ==================== Response parsing ====================

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// The pair payload inside a result object, skipping bookkeeping keys.
fn pair_payload(result: &Value) -> Result<&Value, ProviderError> {
    result
        .as_object()
        .and_then(|obj| {
            obj.iter()
                .find(|(key, _)| key.as_str() != "last")
                .map(|(_, value)| value)
        })
        .ok_or_else(|| malformed("result holds no pair payload"))
}

/// Last trade price from a Ticker result.
fn ticker_price(result: &Value) -> Result<f64, ProviderError> {
    pair_payload(result)?
        .get("c")
        .and_then(|c| c.get(0))
        .and_then(value_f64)
        .ok_or_else(|| malformed("Ticker result missing last-trade price"))
}

/// Best bid plus best ask volume from a Depth result.
fn depth_volume(result: &Value) -> Result<f64, ProviderError> {
    let book = pair_payload(result)?;
    let side_volume = |side: &str| {
        book.get(side)
            .and_then(|levels| levels.get(0))
            .and_then(|level| level.get(1))
            .and_then(value_f64)
            .unwrap_or(0.0)
    };
    Ok(side_volume("bids") + side_volume("asks"))
}

/// OHLC rows (`[time, open, high, low, close, vwap, volume, count]`) into
/// bars, oldest first as Kraken returns them.
fn parse_ohlc(result: &Value) -> Result<Vec<OhlcBar>, ProviderError> {
    let rows = pair_payload(result)?
        .as_array()
        .ok_or_else(|| malformed("OHLC payload is not an array"))?;

    rows.iter()
        .map(|row| {
            let cells = row
                .as_array()
                .filter(|c| c.len() >= 7)
                .ok_or_else(|| malformed("short OHLC row"))?;

            let cell = |i: usize| {
                value_f64(&cells[i]).ok_or_else(|| malformed(format!("OHLC cell {} invalid", i)))
            };

            Ok(OhlcBar {
                time: value_i64(&cells[0]).ok_or_else(|| malformed("OHLC time invalid"))?,
                open: cell(1)?,
                high: cell(2)?,
                low: cell(3)?,
                close: cell(4)?,
                volume: cell(6)?,
            })
        })
        .collect()
}

/// Kraken request signature: HMAC-SHA512 over `path || SHA256(nonce ||
/// postdata)` keyed with the decoded API secret, base64-encoded.
fn sign_request(
    secret: &[u8],
    path: &str,
    nonce: &str,
    postdata: &str,
) -> Result<String, ProviderError> {
    let mut digest = Sha256::new();
    digest.update(nonce.as_bytes());
    digest.update(postdata.as_bytes());
    let digest = digest.finalize();

    let mut mac = Hmac::<Sha512>::new_from_slice(secret)
        .map_err(|e| malformed(format!("bad signing key: {}", e)))?;
    mac.update(path.as_bytes());
    mac.update(&digest);

    Ok(B64.encode(mac.finalize().into_bytes()))
}
