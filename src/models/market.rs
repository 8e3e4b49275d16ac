//! Market data models: OHLC bars and per-cycle snapshots.

use serde::{Deserialize, Serialize};

/// A single OHLC bar as returned by the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OhlcBar {
    /// Bar open time (unix seconds)
    pub time: i64,

    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,

    /// Base-asset volume traded during the bar
    pub volume: f64,
}

impl OhlcBar {
    /// True range against the previous bar's close.
    pub fn true_range(&self, prev_close: f64) -> f64 {
        (self.high - self.low)
            .max((self.high - prev_close).abs())
            .max((self.low - prev_close).abs())
    }
}

/// Average true range over a bar window.
///
/// Falls back to a small positive constant when fewer than two bars are
/// available, so downstream ratio math never divides by a zero range.
pub fn atr_from_bars(bars: &[OhlcBar]) -> f64 {
    if bars.len() < 2 {
        return 0.01;
    }

    let sum: f64 = bars
        .windows(2)
        .map(|w| w[1].true_range(w[0].close))
        .sum();

    sum / (bars.len() - 1) as f64
}

/// Point-in-time market state for one pair, refreshed every poll cycle.
#[derive(Debug, Clone, Copy)]
pub struct MarketSnapshot {
    /// Last trade price
    pub price: f64,

    /// Top-of-book depth volume (best bid + best ask)
    pub volume: f64,

    /// Short-window average true range
    pub atr: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(high: f64, low: f64, close: f64) -> OhlcBar {
        OhlcBar {
            time: 0,
            open: close,
            high,
            low,
            close,
            volume: 0.0,
        }
    }

    #[test]
    fn test_atr_needs_two_bars() {
        assert_eq!(atr_from_bars(&[]), 0.01);
        assert_eq!(atr_from_bars(&[bar(101.0, 99.0, 100.0)]), 0.01);
    }

    #[test]
    fn test_atr_uses_true_range() {
        // Second bar gaps above the first close: TR = high - prev_close.
        let bars = vec![bar(101.0, 99.0, 100.0), bar(106.0, 104.0, 105.0)];
        assert!((atr_from_bars(&bars) - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_true_range_takes_largest_leg() {
        let b = bar(102.0, 98.0, 100.0);
        // Plain high-low range when prev close sits inside the bar.
        assert_eq!(b.true_range(100.0), 4.0);
        // Gap down: low - prev_close dominates.
        assert_eq!(b.true_range(110.0), 12.0);
    }
}
