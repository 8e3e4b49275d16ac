//! Conviction signal aggregation.
//!
//! Five signals are derived from the same per-pair market inputs each cycle:
//! momentum, sentiment, market-data, meta and a contrarian sandbox probe.
//! Each kind has a hard conviction cap applied to its raw value before the
//! owning agent's weight scales it; since weights never exceed 0.9, the caps
//! hold for the weighted output as well.

use crate::advisor::AdviceBias;
use crate::models::{OhlcBar, TradeAction};

use super::agent::AgentPool;

pub const MOMENTUM_CAP: f64 = 0.30;
pub const SENTIMENT_CAP: f64 = 0.045;
pub const MARKET_CAP: f64 = 0.065;
pub const META_CAP: f64 = 0.125;
pub const SANDBOX_CAP: f64 = 0.08;

/// Closes considered by the momentum up-ratio.
const MOMENTUM_WINDOW: usize = 14;

/// Volume terms are expressed in millions.
const VOLUME_SCALE: f64 = 1e6;

/// The five signal kinds, in aggregation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Momentum,
    Sentiment,
    MarketData,
    Meta,
    Sandbox,
}

impl SignalKind {
    pub fn name(&self) -> &'static str {
        match self {
            SignalKind::Momentum => "momentum",
            SignalKind::Sentiment => "sentiment",
            SignalKind::MarketData => "market-data",
            SignalKind::Meta => "meta",
            SignalKind::Sandbox => "sandbox",
        }
    }

    pub fn cap(&self) -> f64 {
        match self {
            SignalKind::Momentum => MOMENTUM_CAP,
            SignalKind::Sentiment => SENTIMENT_CAP,
            SignalKind::MarketData => MARKET_CAP,
            SignalKind::Meta => META_CAP,
            SignalKind::Sandbox => SANDBOX_CAP,
        }
    }
}

/// One computed signal: non-negative conviction plus a direction bias.
#[derive(Debug, Clone, Copy)]
pub struct Signal {
    pub kind: SignalKind,
    pub conviction: f64,
    pub direction: TradeAction,
}

/// Market inputs for one pair on one cycle.
#[derive(Debug, Clone, Copy)]
pub struct SignalInputs<'a> {
    pub price: f64,
    pub bars: &'a [OhlcBar],
    pub volume: f64,
    pub atr: f64,
    pub external_volume_24h: f64,
}

/// All five signals for one pair, produced atomically every cycle.
#[derive(Debug, Clone, Copy)]
pub struct SignalSet {
    pub momentum: Signal,
    pub sentiment: Signal,
    pub market: Signal,
    pub meta: Signal,
    pub sandbox: Signal,
}

impl SignalSet {
    pub fn iter(&self) -> [&Signal; 5] {
        [
            &self.momentum,
            &self.sentiment,
            &self.market,
            &self.meta,
            &self.sandbox,
        ]
    }

    /// Smallest conviction across the five signals.
    pub fn min_conviction(&self) -> f64 {
        self.iter()
            .iter()
            .map(|s| s.conviction)
            .fold(f64::INFINITY, f64::min)
    }

    /// True when every signal carries momentum's direction.
    pub fn aligned(&self) -> bool {
        self.iter()
            .iter()
            .all(|s| s.direction == self.momentum.direction)
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator.abs() < f64::EPSILON {
        0.0
    } else {
        numerator / denominator
    }
}

/// Fraction of consecutive close pairs that increased; neutral 0.5 when the
/// window holds fewer than two closes.
pub fn up_ratio(closes: &[f64]) -> f64 {
    if closes.len() < 2 {
        return 0.5;
    }
    let ups = closes.windows(2).filter(|w| w[1] > w[0]).count();
    ups as f64 / (closes.len() - 1) as f64
}

/// Capped momentum conviction and direction, before agent weighting.
pub fn momentum_base(inputs: &SignalInputs) -> (f64, TradeAction) {
    let start = inputs.bars.len().saturating_sub(MOMENTUM_WINDOW);
    let closes: Vec<f64> = inputs.bars[start..].iter().map(|b| b.close).collect();
    let u = up_ratio(&closes);

    let conviction = ((u - 0.5).abs()
        + ratio(inputs.atr, inputs.price)
        + inputs.volume / VOLUME_SCALE
        + inputs.external_volume_24h / VOLUME_SCALE)
        .min(MOMENTUM_CAP);

    let direction = if u < 0.4 {
        TradeAction::Sell
    } else {
        TradeAction::Buy
    };
    (conviction, direction)
}

/// Capped sentiment conviction and direction, before agent weighting.
pub fn sentiment_base(inputs: &SignalInputs) -> (f64, TradeAction) {
    let change = inputs
        .bars
        .first()
        .map(|bar| ratio(inputs.price - bar.close, bar.close))
        .unwrap_or(0.0);

    let conviction = change.abs().min(SENTIMENT_CAP);
    let direction = if change > 0.0 {
        TradeAction::Buy
    } else {
        TradeAction::Sell
    };
    (conviction, direction)
}

/// Capped market-data conviction and direction, before agent weighting.
pub fn market_base(inputs: &SignalInputs) -> (f64, TradeAction) {
    let last_change = if inputs.bars.len() >= 2 {
        let last = inputs.bars[inputs.bars.len() - 1].close;
        let prev = inputs.bars[inputs.bars.len() - 2].close;
        ratio(last - prev, prev)
    } else {
        0.0
    };

    let conviction = (last_change.abs()
        + inputs.volume / VOLUME_SCALE
        + ratio(inputs.atr, inputs.price)
        + inputs.external_volume_24h / VOLUME_SCALE)
        .min(MARKET_CAP);

    let direction = if last_change < 0.0 {
        TradeAction::Sell
    } else {
        TradeAction::Buy
    };
    (conviction, direction)
}

/// Computes the five weighted signals; owns the agent pool exclusively.
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    agents: AgentPool,
}

impl SignalAggregator {
    pub fn new() -> Self {
        Self {
            agents: AgentPool::new(),
        }
    }

    /// Forward an advisory feedback pass to the agents.
    pub fn apply_bias(&mut self, bias: AdviceBias) {
        self.agents.apply_bias(bias);
    }

    pub fn agent_weights(&self) -> [(&'static str, f64); 5] {
        [
            (self.agents.momentum.name(), self.agents.momentum.weight()),
            (self.agents.sentiment.name(), self.agents.sentiment.weight()),
            (self.agents.market.name(), self.agents.market.weight()),
            (self.agents.meta.name(), self.agents.meta.weight()),
            (self.agents.sandbox.name(), self.agents.sandbox.weight()),
        ]
    }

    /// Produce all five signals for one pair. Never partial: every kind is
    /// present in the result regardless of input quality.
    pub fn compute(&self, inputs: &SignalInputs) -> SignalSet {
        let (momentum_conv, momentum_dir) = momentum_base(inputs);
        let momentum = Signal {
            kind: SignalKind::Momentum,
            conviction: momentum_conv * self.agents.momentum.weight(),
            direction: momentum_dir,
        };

        let (sentiment_conv, sentiment_dir) = sentiment_base(inputs);
        let sentiment = Signal {
            kind: SignalKind::Sentiment,
            conviction: sentiment_conv * self.agents.sentiment.weight(),
            direction: sentiment_dir,
        };

        let (market_conv, market_dir) = market_base(inputs);
        let market = Signal {
            kind: SignalKind::MarketData,
            conviction: market_conv * self.agents.market.weight(),
            direction: market_dir,
        };

        // Contrarian probe: rides the market-data conviction, fades its call.
        let sandbox = Signal {
            kind: SignalKind::Sandbox,
            conviction: (market.conviction * 0.9).min(SANDBOX_CAP) * self.agents.sandbox.weight(),
            direction: market.direction.opposite(),
        };

        // Meta averages the other four and defers to momentum's call.
        let mean = (momentum.conviction + sentiment.conviction + market.conviction
            + sandbox.conviction)
            / 4.0;
        let meta = Signal {
            kind: SignalKind::Meta,
            conviction: mean.min(META_CAP) * self.agents.meta.weight(),
            direction: momentum.direction,
        };

        SignalSet {
            momentum,
            sentiment,
            market,
            meta,
            sandbox,
        }
    }
}

impl Default for SignalAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bars_with_closes(closes: &[f64]) -> Vec<OhlcBar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| OhlcBar {
                time: i as i64 * 3600,
                open: close,
                high: close,
                low: close,
                close,
                volume: 0.0,
            })
            .collect()
    }

    fn inputs<'a>(bars: &'a [OhlcBar], price: f64, atr: f64) -> SignalInputs<'a> {
        SignalInputs {
            price,
            bars,
            volume: 0.0,
            atr,
            external_volume_24h: 0.0,
        }
    }

    #[test]
    fn test_momentum_strictly_increasing_closes_hits_cap() {
        // 14 strictly increasing closes, atr=1, price=100, no volume terms:
        // |1.0 - 0.5| + 0.01 caps at 0.30, direction BUY.
        let closes: Vec<f64> = (1..=14).map(|i| 100.0 + i as f64).collect();
        let bars = bars_with_closes(&closes);

        let (conviction, direction) = momentum_base(&inputs(&bars, 100.0, 1.0));
        assert!((conviction - 0.30).abs() < 1e-12);
        assert_eq!(direction, TradeAction::Buy);
    }

    #[test]
    fn test_momentum_neutral_with_short_window() {
        let bars = bars_with_closes(&[100.0]);
        let (conviction, direction) = momentum_base(&inputs(&bars, 100.0, 0.0));
        // u = 0.5: only the additive terms remain, all zero here.
        assert_eq!(conviction, 0.0);
        assert_eq!(direction, TradeAction::Buy);
    }

    #[test]
    fn test_momentum_sell_below_threshold_ratio() {
        // 2 ups out of 13 pairs: u ~ 0.154 < 0.4.
        let mut closes = vec![100.0; 14];
        closes[5] = 101.0;
        closes[9] = 102.0;
        let bars = bars_with_closes(&closes);

        let (_, direction) = momentum_base(&inputs(&bars, 100.0, 0.0));
        assert_eq!(direction, TradeAction::Sell);
    }

    #[test]
    fn test_momentum_uses_only_last_fourteen_bars() {
        // 30 bars: long decline followed by 14 strictly increasing closes.
        let mut closes: Vec<f64> = (0..16).map(|i| 200.0 - i as f64).collect();
        closes.extend((1..=14).map(|i| 100.0 + i as f64));
        let bars = bars_with_closes(&closes);

        let (conviction, direction) = momentum_base(&inputs(&bars, 100.0, 1.0));
        assert!((conviction - 0.30).abs() < 1e-12);
        assert_eq!(direction, TradeAction::Buy);
    }

    #[test]
    fn test_sentiment_change_over_window() {
        let bars = bars_with_closes(&[100.0, 101.0, 102.0]);
        // (103 - 100) / 100 = 0.03, capped at 0.045.
        let (conviction, direction) = sentiment_base(&inputs(&bars, 103.0, 0.0));
        assert!((conviction - 0.03).abs() < 1e-12);
        assert_eq!(direction, TradeAction::Buy);

        // Large move caps.
        let (conviction, direction) = sentiment_base(&inputs(&bars, 80.0, 0.0));
        assert!((conviction - 0.045).abs() < 1e-12);
        assert_eq!(direction, TradeAction::Sell);
    }

    #[test]
    fn test_sentiment_no_bars_is_flat_sell() {
        let (conviction, direction) = sentiment_base(&inputs(&[], 100.0, 0.0));
        assert_eq!(conviction, 0.0);
        assert_eq!(direction, TradeAction::Sell);
    }

    #[test]
    fn test_market_last_bar_change() {
        let bars = bars_with_closes(&[100.0, 100.0, 99.0]);
        // last change = -1%, conviction |..| capped at 0.065.
        let (conviction, direction) = market_base(&inputs(&bars, 99.0, 0.0));
        assert!((conviction - 0.01).abs() < 1e-12);
        assert_eq!(direction, TradeAction::Sell);
    }

    #[test]
    fn test_market_single_bar_defaults_buy() {
        let bars = bars_with_closes(&[100.0]);
        let (conviction, direction) = market_base(&inputs(&bars, 100.0, 0.0));
        assert_eq!(conviction, 0.0);
        assert_eq!(direction, TradeAction::Buy);
    }

    #[test]
    fn test_caps_hold_under_extreme_inputs() {
        let closes: Vec<f64> = (1..=14).map(|i| 100.0 * i as f64).collect();
        let bars = bars_with_closes(&closes);
        let extreme = SignalInputs {
            price: 1.0,
            bars: &bars,
            volume: 1e12,
            atr: 1e9,
            external_volume_24h: 1e12,
        };

        let aggregator = SignalAggregator::new();
        let set = aggregator.compute(&extreme);

        for signal in set.iter() {
            assert!(
                signal.conviction <= signal.kind.cap() + 1e-12,
                "{} conviction {} exceeds cap {}",
                signal.kind.name(),
                signal.conviction,
                signal.kind.cap()
            );
            assert!(signal.conviction >= 0.0);
        }
    }

    #[test]
    fn test_meta_follows_momentum_sandbox_fades_market() {
        let mut closes: Vec<f64> = (1..=14).map(|i| 200.0 - i as f64).collect();
        closes.push(199.0); // last change positive while momentum falls
        let bars = bars_with_closes(&closes);

        let aggregator = SignalAggregator::new();
        let set = aggregator.compute(&inputs(&bars, 190.0, 1.0));

        assert_eq!(set.meta.direction, set.momentum.direction);
        assert_eq!(set.sandbox.direction, set.market.direction.opposite());
        assert_ne!(set.momentum.direction, set.market.direction);
    }

    #[test]
    fn test_weighting_scales_base_conviction() {
        let closes: Vec<f64> = (1..=14).map(|i| 100.0 + i as f64).collect();
        let bars = bars_with_closes(&closes);
        let aggregator = SignalAggregator::new();

        let set = aggregator.compute(&inputs(&bars, 100.0, 1.0));
        // Base momentum conviction 0.30 scaled by the default 0.5 weight.
        assert!((set.momentum.conviction - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_all_five_signals_always_present() {
        let aggregator = SignalAggregator::new();
        let set = aggregator.compute(&inputs(&[], 0.0, 0.0));
        assert_eq!(set.iter().len(), 5);
        for signal in set.iter() {
            assert!(signal.conviction.is_finite());
        }
    }

    #[test]
    fn test_min_conviction_and_alignment() {
        let closes: Vec<f64> = (1..=14).map(|i| 100.0 + i as f64).collect();
        let bars = bars_with_closes(&closes);
        let aggregator = SignalAggregator::new();
        let set = aggregator.compute(&inputs(&bars, 115.0, 1.0));

        // Every direction is BUY except sandbox, which fades market-data.
        assert!(!set.aligned());
        assert!(set.min_conviction() >= 0.0);
    }
}
