//! Daily performance bookkeeping.
//!
//! Tracks realized PnL and trade counts per pair for the current local date.
//! The tracker is pure in-memory state; the bot persists the rows it hands
//! back on rollover and after every close.

use std::collections::HashMap;

use chrono::NaiveDate;
use tracing::info;

/// Accumulated counters for one pair on one date.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PairDay {
    pub pnl: f64,
    pub trade_count: i64,
}

/// Rows flushed when a date boundary is crossed.
#[derive(Debug, Clone)]
pub struct DayFlush {
    pub date: NaiveDate,
    pub rows: Vec<(String, PairDay)>,
}

/// Per-pair daily PnL and trade counters with date-rollover flushing.
#[derive(Debug, Clone)]
pub struct DailyPerformanceTracker {
    date: NaiveDate,
    by_pair: HashMap<String, PairDay>,
    daily_target: f64,
}

impl DailyPerformanceTracker {
    pub fn new(today: NaiveDate, pairs: &[String], daily_target: f64) -> Self {
        Self {
            date: today,
            by_pair: pairs
                .iter()
                .map(|p| (p.clone(), PairDay::default()))
                .collect(),
            daily_target,
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Minimum fractional PnL a pair should achieve per day.
    pub fn daily_target(&self) -> f64 {
        self.daily_target
    }

    pub fn day(&self, pair: &str) -> PairDay {
        self.by_pair.get(pair).copied().unwrap_or_default()
    }

    /// Count one executed trade (entry or exit) for the pair.
    pub fn record_trade(&mut self, pair: &str) {
        self.by_pair.entry(pair.to_string()).or_default().trade_count += 1;
    }

    /// Book realized fractional PnL from a closed position.
    pub fn record_realized(&mut self, pair: &str, pnl_pct: f64) {
        self.by_pair.entry(pair.to_string()).or_default().pnl += pnl_pct;
    }

    /// Compare dates and, on change, hand back the finished day's rows and
    /// reset every counter to zero. Must run before any trade is recorded
    /// for the new date.
    pub fn rollover(&mut self, today: NaiveDate) -> Option<DayFlush> {
        if today == self.date {
            return None;
        }

        let finished = DayFlush {
            date: self.date,
            rows: self
                .by_pair
                .iter()
                .map(|(pair, day)| (pair.clone(), *day))
                .collect(),
        };

        info!(
            finished = %finished.date,
            new = %today,
            "daily rollover, resetting counters"
        );

        self.date = today;
        for day in self.by_pair.values_mut() {
            *day = PairDay::default();
        }

        Some(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs() -> Vec<String> {
        vec!["XBTUSD".to_string(), "ETHUSD".to_string()]
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_counters_accumulate_per_pair() {
        let mut tracker = DailyPerformanceTracker::new(date("2025-03-01"), &pairs(), 0.015);

        tracker.record_trade("XBTUSD");
        tracker.record_trade("XBTUSD");
        tracker.record_realized("XBTUSD", 0.026);
        tracker.record_realized("XBTUSD", -0.01);

        let day = tracker.day("XBTUSD");
        assert_eq!(day.trade_count, 2);
        assert!((day.pnl - 0.016).abs() < 1e-12);

        // Untouched pair stays zeroed.
        assert_eq!(tracker.day("ETHUSD"), PairDay::default());
    }

    #[test]
    fn test_same_date_never_flushes() {
        let mut tracker = DailyPerformanceTracker::new(date("2025-03-01"), &pairs(), 0.015);
        tracker.record_trade("XBTUSD");
        assert!(tracker.rollover(date("2025-03-01")).is_none());
        assert_eq!(tracker.day("XBTUSD").trade_count, 1);
    }

    #[test]
    fn test_rollover_flushes_once_and_resets() {
        let mut tracker = DailyPerformanceTracker::new(date("2025-03-01"), &pairs(), 0.015);
        tracker.record_trade("XBTUSD");
        tracker.record_realized("XBTUSD", 0.02);

        let flush = tracker.rollover(date("2025-03-02")).expect("date changed");
        assert_eq!(flush.date, date("2025-03-01"));

        let xbt = flush
            .rows
            .iter()
            .find(|(pair, _)| pair == "XBTUSD")
            .map(|(_, day)| *day)
            .unwrap();
        assert_eq!(xbt.trade_count, 1);
        assert!((xbt.pnl - 0.02).abs() < 1e-12);

        // Counters reset before any new-date trade.
        assert_eq!(tracker.day("XBTUSD"), PairDay::default());
        assert_eq!(tracker.date(), date("2025-03-02"));

        // Second call on the same new date: nothing further to flush.
        assert!(tracker.rollover(date("2025-03-02")).is_none());
    }

    #[test]
    fn test_new_day_counts_are_independent() {
        let mut tracker = DailyPerformanceTracker::new(date("2025-03-01"), &pairs(), 0.015);
        tracker.record_realized("XBTUSD", 0.05);
        tracker.rollover(date("2025-03-02"));

        tracker.record_realized("XBTUSD", 0.01);
        // Replaced, not summed across the boundary.
        assert!((tracker.day("XBTUSD").pnl - 0.01).abs() < 1e-12);
    }
}
