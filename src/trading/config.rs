//! Trader configuration.
//!
//! Resolved once at startup and passed into the loop immutably; nothing in
//! the bot mutates the pair set or thresholds at runtime.

use serde::{Deserialize, Serialize};

/// Configuration for the conviction gate and position lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraderConfig {
    /// Pairs traded each cycle, in fixed processing order
    pub pairs: Vec<String>,

    /// Minimum conviction on every signal for a primary entry
    pub entry_conviction: f64,

    /// Relaxed conviction floor for the late-session and risk-on fallbacks
    pub fallback_conviction: f64,

    /// Local hour at which the late-session fallback becomes eligible
    pub late_session_hour: u32,

    /// Fractional PnL a pair should reach per day before risk-on kicks in
    pub daily_target: f64,

    /// Taker fee netted out of take-profit exits
    pub taker_fee: f64,

    /// Minimum fractional gain for a take-profit exit
    pub take_profit_floor: f64,

    /// Maximum fractional loss tolerated before the stop fires
    pub stop_loss_cap: f64,

    /// ATR multiple that scales both exit thresholds
    pub atr_exit_multiple: f64,

    /// Minimum quote balance required to open a position
    pub min_quote_balance: f64,

    /// Days of hourly OHLC kept per pair, reloaded on every transition
    pub ohlc_days: u32,
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            pairs: vec![
                "XBTUSD".to_string(),
                "ETHUSD".to_string(),
                "ADAUSD".to_string(),
            ],
            entry_conviction: 0.03,
            fallback_conviction: 0.025,
            late_session_hour: 23,
            daily_target: 0.015,       // 1.5% per pair per day
            taker_fee: 0.004,
            take_profit_floor: 0.015,
            stop_loss_cap: 0.02,
            atr_exit_multiple: 2.0,
            min_quote_balance: 10.0,   // don't open dust positions
            ohlc_days: 30,
        }
    }
}

impl TraderConfig {
    /// Even split of the available quote balance across the pair set.
    pub fn allocation(&self, quote_balance: f64) -> f64 {
        if self.pairs.is_empty() {
            return 0.0;
        }
        quote_balance / self.pairs.len() as f64
    }
}
