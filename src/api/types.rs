//! Wire types for the Kraken REST API and the external aggregate feed.

use serde::Deserialize;

/// Envelope shared by every Kraken endpoint: an error list plus an
/// endpoint-specific result payload.
#[derive(Debug, Deserialize)]
pub struct KrakenResponse<T> {
    #[serde(default)]
    pub error: Vec<String>,
    pub result: Option<T>,
}

/// Order acknowledgement from AddOrder.
#[derive(Debug, Deserialize)]
pub struct AddOrderResult {
    #[serde(default)]
    pub txid: Vec<String>,
}

/// One row of the aggregate provider's market listing; only the 24h volume
/// is consumed.
#[derive(Debug, Deserialize)]
pub struct AggregateMarketRow {
    #[serde(default)]
    pub total_volume: Option<f64>,
}
