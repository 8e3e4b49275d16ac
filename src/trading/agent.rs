//! Scoring agents with adaptive weights.
//!
//! Each signal kind is backed by an agent holding a bounded history of past
//! outcome scores; the mean of that history, clamped to [0.1, 0.9], is the
//! weight applied to the signal's conviction. Histories are only touched by
//! the advisory feedback pass.

use std::collections::VecDeque;

use tracing::debug;

use crate::advisor::AdviceBias;

/// Maximum outcome scores retained per agent.
pub const HISTORY_CAP: usize = 100;

const WEIGHT_FLOOR: f64 = 0.1;
const WEIGHT_CEIL: f64 = 0.9;
const NEUTRAL_SCORE: f64 = 0.5;

/// One scoring agent.
#[derive(Debug, Clone)]
pub struct Agent {
    name: &'static str,
    history: VecDeque<f64>,
    weight: f64,
}

impl Agent {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            history: VecDeque::with_capacity(HISTORY_CAP),
            weight: NEUTRAL_SCORE,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Append an outcome score, evicting the oldest entry past the cap, and
    /// recompute the weight.
    pub fn update_history(&mut self, score: f64) {
        self.history.push_back(score.clamp(0.0, 1.0));
        if self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
        self.recompute_weight();
    }

    /// Shift every retained score by `delta`, clamped into [0, 1].
    fn shift_history(&mut self, delta: f64) {
        for score in self.history.iter_mut() {
            *score = (*score + delta).clamp(0.0, 1.0);
        }
        self.recompute_weight();
    }

    fn recompute_weight(&mut self) {
        if self.history.is_empty() {
            self.weight = NEUTRAL_SCORE;
            return;
        }
        let mean = self.history.iter().sum::<f64>() / self.history.len() as f64;
        self.weight = mean.clamp(WEIGHT_FLOOR, WEIGHT_CEIL);
    }
}

/// The fixed set of five agents, one per signal kind.
#[derive(Debug, Clone)]
pub struct AgentPool {
    pub momentum: Agent,
    pub sentiment: Agent,
    pub market: Agent,
    pub meta: Agent,
    pub sandbox: Agent,
}

impl AgentPool {
    pub fn new() -> Self {
        Self {
            momentum: Agent::new("momentum"),
            sentiment: Agent::new("sentiment"),
            market: Agent::new("market-data"),
            meta: Agent::new("meta"),
            sandbox: Agent::new("sandbox"),
        }
    }

    fn each(&mut self, f: impl Fn(&mut Agent)) {
        f(&mut self.momentum);
        f(&mut self.sentiment);
        f(&mut self.market);
        f(&mut self.meta);
        f(&mut self.sandbox);
    }

    /// Apply one advisory feedback pass: shift histories by the bias, then
    /// record a neutral outcome on every agent.
    pub fn apply_bias(&mut self, bias: AdviceBias) {
        match bias {
            AdviceBias::Increase => self.each(|a| a.shift_history(0.1)),
            AdviceBias::Decrease => self.each(|a| a.shift_history(-0.1)),
            AdviceBias::Neutral => {}
        }
        self.each(|a| a.update_history(NEUTRAL_SCORE));

        debug!(
            bias = ?bias,
            momentum = self.momentum.weight(),
            sentiment = self.sentiment.weight(),
            market = self.market.weight(),
            meta = self.meta.weight(),
            sandbox = self.sandbox.weight(),
            "agent weights after feedback"
        );
    }
}

impl Default for AgentPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_defaults_to_neutral_weight() {
        let agent = Agent::new("momentum");
        assert_eq!(agent.weight(), 0.5);
    }

    #[test]
    fn test_weight_stays_clamped() {
        let mut agent = Agent::new("momentum");
        for _ in 0..20 {
            agent.update_history(1.0);
        }
        assert_eq!(agent.weight(), 0.9);

        let mut agent = Agent::new("momentum");
        for _ in 0..20 {
            agent.update_history(0.0);
        }
        assert_eq!(agent.weight(), 0.1);
    }

    #[test]
    fn test_weight_in_bounds_for_any_history() {
        let mut agent = Agent::new("momentum");
        for i in 0..100 {
            agent.update_history((i % 10) as f64 / 9.0);
            let w = agent.weight();
            assert!((0.1..=0.9).contains(&w), "weight {} out of bounds", w);
        }
    }

    #[test]
    fn test_history_evicts_past_cap() {
        let mut agent = Agent::new("momentum");
        for _ in 0..HISTORY_CAP {
            agent.update_history(0.0);
        }
        assert_eq!(agent.history_len(), HISTORY_CAP);
        assert_eq!(agent.weight(), 0.1);

        // 100 further high scores fully displace the zeros.
        for _ in 0..HISTORY_CAP {
            agent.update_history(1.0);
        }
        assert_eq!(agent.history_len(), HISTORY_CAP);
        assert_eq!(agent.weight(), 0.9);
    }

    #[test]
    fn test_increase_bias_shifts_and_appends_neutral() {
        let mut pool = AgentPool::new();
        pool.momentum.update_history(0.5);

        pool.apply_bias(AdviceBias::Increase);

        // One shifted score (0.6) plus one appended neutral (0.5).
        assert_eq!(pool.momentum.history_len(), 2);
        assert!((pool.momentum.weight() - 0.55).abs() < 1e-9);
        // Agents with previously empty histories got the neutral score only.
        assert_eq!(pool.sandbox.history_len(), 1);
        assert_eq!(pool.sandbox.weight(), 0.5);
    }

    #[test]
    fn test_shift_clamps_at_bounds() {
        let mut pool = AgentPool::new();
        pool.meta.update_history(0.95);

        pool.apply_bias(AdviceBias::Increase);
        // 0.95 + 0.1 caps at 1.0; mean of [1.0, 0.5] = 0.75.
        assert!((pool.meta.weight() - 0.75).abs() < 1e-9);

        let mut pool = AgentPool::new();
        pool.meta.update_history(0.05);
        pool.apply_bias(AdviceBias::Decrease);
        // 0.05 - 0.1 floors at 0.0; mean of [0.0, 0.5] = 0.25.
        assert!((pool.meta.weight() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_neutral_bias_only_appends() {
        let mut pool = AgentPool::new();
        pool.apply_bias(AdviceBias::Neutral);
        assert_eq!(pool.momentum.history_len(), 1);
        assert_eq!(pool.momentum.weight(), 0.5);
    }
}
