//! Trade records: the append-only durable history of executed orders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of an executed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> TradeAction {
        match self {
            TradeAction::Buy => TradeAction::Sell,
            TradeAction::Sell => TradeAction::Buy,
        }
    }

    pub fn parse(s: &str) -> Option<TradeAction> {
        match s.to_uppercase().as_str() {
            "BUY" => Some(TradeAction::Buy),
            "SELL" => Some(TradeAction::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One executed order, immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// When the order was confirmed
    pub timestamp: DateTime<Utc>,

    /// Exchange pair, e.g. "XBTUSD"
    pub pair: String,

    pub action: TradeAction,

    /// Quote-currency notional for buys, base volume for sells
    pub amount: f64,

    /// Execution price
    pub price: f64,
}

impl TradeRecord {
    pub fn new(pair: &str, action: TradeAction, amount: f64, price: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            pair: pair.to_string(),
            action,
            amount,
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parse() {
        assert_eq!(TradeAction::parse("buy"), Some(TradeAction::Buy));
        assert_eq!(TradeAction::parse("SELL"), Some(TradeAction::Sell));
        assert_eq!(TradeAction::parse("hold"), None);
        assert_eq!(TradeAction::Buy.as_str(), "BUY");
    }

    #[test]
    fn test_action_opposite() {
        assert_eq!(TradeAction::Buy.opposite(), TradeAction::Sell);
        assert_eq!(TradeAction::Sell.opposite(), TradeAction::Buy);
    }
}
