//! Core trading logic: agents, signal aggregation, gating and bookkeeping.

pub mod agent;
pub mod config;
pub mod performance;
pub mod signals;
pub mod strategy;

pub use agent::{Agent, AgentPool};
pub use config::TraderConfig;
pub use performance::{DailyPerformanceTracker, DayFlush, PairDay};
pub use signals::{SignalAggregator, SignalInputs, SignalSet};
pub use strategy::{EntryDecision, ExitReason, ExitSignal, GateContext, GateRule, Strategy};
