//! Entry gating and exit rules.
//!
//! The conviction gate turns a pair's five signals into an enter/hold call,
//! with two relaxed fallbacks tied to time of day and daily performance.
//! Exit rules run every cycle while long; take-profit is always evaluated
//! before the stop.

use tracing::debug;

use crate::models::{Position, TradeAction};

use super::config::TraderConfig;
use super::signals::SignalSet;

/// Which gate rule admitted an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRule {
    Primary,
    LateSession,
    RiskOnCatchUp,
}

impl GateRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateRule::Primary => "primary",
            GateRule::LateSession => "late-session",
            GateRule::RiskOnCatchUp => "risk-on",
        }
    }
}

/// Outcome of one gate evaluation.
#[derive(Debug, Clone)]
pub struct EntryDecision {
    pub enter: bool,
    pub rule: Option<GateRule>,
    pub direction: TradeAction,
    pub reason: String,
}

impl EntryDecision {
    fn enter(rule: GateRule, direction: TradeAction) -> Self {
        Self {
            enter: true,
            rule: Some(rule),
            direction,
            reason: format!("{} entry conditions met", rule.as_str()),
        }
    }

    fn hold(direction: TradeAction, reason: impl Into<String>) -> Self {
        Self {
            enter: false,
            rule: None,
            direction,
            reason: reason.into(),
        }
    }
}

/// Per-pair context the gate needs beyond the signals themselves.
#[derive(Debug, Clone, Copy)]
pub struct GateContext {
    /// Local wall-clock hour (0-23)
    pub local_hour: u32,

    /// Trades already recorded today for this pair
    pub trades_today: i64,

    /// Realized fractional PnL accumulated today for this pair
    pub day_pnl: f64,
}

/// Why a long position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take-profit",
            ExitReason::StopLoss => "stop-loss",
        }
    }
}

/// A triggered exit with the PnL to realize.
#[derive(Debug, Clone, Copy)]
pub struct ExitSignal {
    pub reason: ExitReason,
    /// Raw fractional return at the exit price
    pub pnl_pct: f64,
    /// Fraction booked into the daily tracker (fee-netted on take-profit)
    pub realized_pct: f64,
}

/// Conviction gate plus exit rules, configured once at startup.
pub struct Strategy {
    config: TraderConfig,
}

impl Strategy {
    pub fn new(config: TraderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TraderConfig {
        &self.config
    }

    /// One gate evaluation per pair per cycle.
    pub fn evaluate_entry(&self, signals: &SignalSet, ctx: GateContext) -> EntryDecision {
        let direction = signals.momentum.direction;
        let aligned = signals.aligned();
        let min_conviction = signals.min_conviction();

        if !aligned {
            return EntryDecision::hold(direction, "signal directions disagree");
        }

        if min_conviction >= self.config.entry_conviction {
            return EntryDecision::enter(GateRule::Primary, direction);
        }

        if min_conviction >= self.config.fallback_conviction {
            // No fill yet today and the session is nearly over: take the
            // weaker but aligned setup rather than finish the day flat.
            if ctx.trades_today == 0 && ctx.local_hour >= self.config.late_session_hour {
                return EntryDecision::enter(GateRule::LateSession, direction);
            }

            // Behind the daily target with trades on the book: allow one
            // more attempt at the relaxed floor while the session is young.
            if ctx.trades_today >= 1
                && ctx.day_pnl < self.config.daily_target
                && ctx.local_hour < self.config.late_session_hour
            {
                return EntryDecision::enter(GateRule::RiskOnCatchUp, direction);
            }
        }

        debug!(
            min_conviction,
            aligned,
            hour = ctx.local_hour,
            trades_today = ctx.trades_today,
            "gate held"
        );
        EntryDecision::hold(
            direction,
            format!(
                "min conviction {:.4} below floor {:.3}",
                min_conviction, self.config.entry_conviction
            ),
        )
    }

    /// Exit evaluation for a long position. Take-profit is checked before
    /// the stop; both thresholds scale with current volatility.
    pub fn evaluate_exit(&self, position: &Position, price: f64, atr: f64) -> Option<ExitSignal> {
        if !position.is_long() {
            return None;
        }

        let pnl_pct = position.pnl_pct(price);
        let atr_band = if price > 0.0 {
            self.config.atr_exit_multiple * atr / price
        } else {
            0.0
        };

        let take_profit_at = self.config.take_profit_floor.max(atr_band);
        if pnl_pct >= take_profit_at {
            return Some(ExitSignal {
                reason: ExitReason::TakeProfit,
                pnl_pct,
                realized_pct: pnl_pct - self.config.taker_fee,
            });
        }

        let stop_loss_at = self.config.stop_loss_cap.min(atr_band);
        if pnl_pct <= -stop_loss_at {
            return Some(ExitSignal {
                reason: ExitReason::StopLoss,
                pnl_pct,
                realized_pct: pnl_pct,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trading::signals::{Signal, SignalKind};

    fn signal(kind: SignalKind, conviction: f64, direction: TradeAction) -> Signal {
        Signal {
            kind,
            conviction,
            direction,
        }
    }

    /// A fully aligned BUY set at the given conviction, with one signal
    /// optionally lowered.
    fn buy_set(conviction: f64, weakest: Option<f64>) -> SignalSet {
        let c = |kind| signal(kind, conviction, TradeAction::Buy);
        let mut set = SignalSet {
            momentum: c(SignalKind::Momentum),
            sentiment: c(SignalKind::Sentiment),
            market: c(SignalKind::MarketData),
            meta: c(SignalKind::Meta),
            sandbox: c(SignalKind::Sandbox),
        };
        if let Some(low) = weakest {
            set.sentiment.conviction = low;
        }
        set
    }

    fn midday() -> GateContext {
        GateContext {
            local_hour: 12,
            trades_today: 0,
            day_pnl: 0.0,
        }
    }

    fn strategy() -> Strategy {
        Strategy::new(TraderConfig::default())
    }

    #[test]
    fn test_primary_entry_fires_when_aligned_and_strong() {
        let decision = strategy().evaluate_entry(&buy_set(0.04, None), midday());
        assert!(decision.enter);
        assert_eq!(decision.rule, Some(GateRule::Primary));
        assert_eq!(decision.direction, TradeAction::Buy);
    }

    #[test]
    fn test_one_weak_conviction_blocks_primary_entry() {
        // 0.029 on a single signal is below the 0.03 floor.
        let decision = strategy().evaluate_entry(&buy_set(0.04, Some(0.029)), midday());
        assert!(!decision.enter);
    }

    #[test]
    fn test_misaligned_directions_always_hold() {
        let mut set = buy_set(0.05, None);
        set.market.direction = TradeAction::Sell;
        let decision = strategy().evaluate_entry(&set, midday());
        assert!(!decision.enter);
        assert!(decision.reason.contains("disagree"));
    }

    #[test]
    fn test_late_session_fallback() {
        let ctx = GateContext {
            local_hour: 23,
            trades_today: 0,
            day_pnl: 0.0,
        };
        let decision = strategy().evaluate_entry(&buy_set(0.026, None), ctx);
        assert!(decision.enter);
        assert_eq!(decision.rule, Some(GateRule::LateSession));
    }

    #[test]
    fn test_late_session_requires_no_prior_trade() {
        let ctx = GateContext {
            local_hour: 23,
            trades_today: 1,
            day_pnl: 0.02, // also above target, so risk-on stays out too
        };
        let decision = strategy().evaluate_entry(&buy_set(0.026, None), ctx);
        assert!(!decision.enter);
    }

    #[test]
    fn test_risk_on_catch_up_fires_behind_target() {
        let ctx = GateContext {
            local_hour: 14,
            trades_today: 2,
            day_pnl: 0.001,
        };
        let decision = strategy().evaluate_entry(&buy_set(0.026, None), ctx);
        assert!(decision.enter);
        assert_eq!(decision.rule, Some(GateRule::RiskOnCatchUp));
    }

    #[test]
    fn test_risk_on_needs_a_prior_trade_and_early_hour() {
        let strategy = strategy();

        let no_trades = GateContext {
            local_hour: 14,
            trades_today: 0,
            day_pnl: 0.0,
        };
        assert!(!strategy.evaluate_entry(&buy_set(0.026, None), no_trades).enter);

        let too_late = GateContext {
            local_hour: 23,
            trades_today: 2,
            day_pnl: 0.0,
        };
        // At 23:00 risk-on is out; late-session is out too (trades > 0).
        assert!(!strategy.evaluate_entry(&buy_set(0.026, None), too_late).enter);
    }

    #[test]
    fn test_risk_on_stays_out_once_target_met() {
        let ctx = GateContext {
            local_hour: 14,
            trades_today: 2,
            day_pnl: 0.02,
        };
        assert!(!strategy().evaluate_entry(&buy_set(0.026, None), ctx).enter);
    }

    fn long_at(entry: f64) -> Position {
        let mut pos = Position::flat("XBTUSD");
        pos.open(entry, 1000.0).unwrap();
        pos
    }

    #[test]
    fn test_take_profit_nets_fee() {
        // entry 100, price 103, atr 1: pnl 3% >= max(1.5%, 2%) -> realize 2.6%.
        let exit = strategy()
            .evaluate_exit(&long_at(100.0), 103.0, 1.0)
            .expect("take-profit should fire");
        assert_eq!(exit.reason, ExitReason::TakeProfit);
        assert!((exit.pnl_pct - 0.03).abs() < 1e-12);
        assert!((exit.realized_pct - 0.026).abs() < 1e-12);
    }

    #[test]
    fn test_stop_loss_realizes_raw_loss() {
        // entry 100, price 97.5, atr 2: pnl -2.5% <= -min(2%, 4.1%) -> raw.
        let exit = strategy()
            .evaluate_exit(&long_at(100.0), 97.5, 2.0)
            .expect("stop-loss should fire");
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert!((exit.realized_pct + 0.025).abs() < 1e-12);
    }

    #[test]
    fn test_exit_boundaries_and_precedence() {
        let strategy = strategy();

        // Exactly at the take-profit threshold: fires.
        let exit = strategy
            .evaluate_exit(&long_at(100.0), 101.5, 0.5)
            .expect("boundary take-profit");
        assert_eq!(exit.reason, ExitReason::TakeProfit);

        // Exactly at the stop threshold: fires.
        let exit = strategy
            .evaluate_exit(&long_at(100.0), 98.0, 2.0)
            .expect("boundary stop-loss");
        assert_eq!(exit.reason, ExitReason::StopLoss);

        // Degenerate volatility collapses the stop band to zero; the
        // take-profit branch is still consulted first and declines before
        // the stop claims a flat return.
        let exit = strategy
            .evaluate_exit(&long_at(100.0), 100.0, 0.0)
            .expect("zero-band stop");
        assert_eq!(exit.reason, ExitReason::StopLoss);
        assert_eq!(exit.realized_pct, 0.0);
    }

    #[test]
    fn test_no_exit_inside_bands() {
        assert!(strategy()
            .evaluate_exit(&long_at(100.0), 100.5, 1.0)
            .is_none());
        assert!(strategy()
            .evaluate_exit(&long_at(100.0), 99.0, 1.0)
            .is_none());
    }

    #[test]
    fn test_flat_position_never_exits() {
        let pos = Position::flat("XBTUSD");
        assert!(strategy().evaluate_exit(&pos, 200.0, 1.0).is_none());
    }
}
