//! Per-pair position lifecycle.
//!
//! Each pair carries exactly one position for the lifetime of the process.
//! Transitions are strictly Flat -> Long -> Flat: re-entry while long and
//! exit while flat are rejected, not silently ignored.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle state of a pair's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionState {
    Flat,
    Long,
}

/// Invalid lifecycle transition.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("{pair}: cannot open, position already long")]
    AlreadyLong { pair: String },

    #[error("{pair}: cannot close, position is flat")]
    NotOpen { pair: String },
}

/// Open/flat exposure for one pair.
#[derive(Debug, Clone)]
pub struct Position {
    pub pair: String,
    state: PositionState,
    entry_price: f64,
    size: f64,
}

impl Position {
    /// A fresh flat position for a pair.
    pub fn flat(pair: &str) -> Self {
        Self {
            pair: pair.to_string(),
            state: PositionState::Flat,
            entry_price: 0.0,
            size: 0.0,
        }
    }

    /// A long position restored from persisted trade history.
    pub fn restored_long(pair: &str, entry_price: f64, size: f64) -> Self {
        Self {
            pair: pair.to_string(),
            state: PositionState::Long,
            entry_price,
            size,
        }
    }

    pub fn state(&self) -> PositionState {
        self.state
    }

    pub fn is_flat(&self) -> bool {
        self.state == PositionState::Flat
    }

    pub fn is_long(&self) -> bool {
        self.state == PositionState::Long
    }

    pub fn entry_price(&self) -> f64 {
        self.entry_price
    }

    pub fn size(&self) -> f64 {
        self.size
    }

    /// Flat -> Long. Entry price and size are only recorded here, after the
    /// caller holds a confirmed order id.
    pub fn open(&mut self, entry_price: f64, size: f64) -> Result<(), TransitionError> {
        if self.state == PositionState::Long {
            return Err(TransitionError::AlreadyLong {
                pair: self.pair.clone(),
            });
        }

        self.state = PositionState::Long;
        self.entry_price = entry_price;
        self.size = size;
        Ok(())
    }

    /// Long -> Flat. Returns the size that was closed.
    pub fn close(&mut self) -> Result<f64, TransitionError> {
        if self.state == PositionState::Flat {
            return Err(TransitionError::NotOpen {
                pair: self.pair.clone(),
            });
        }

        let closed = self.size;
        self.state = PositionState::Flat;
        self.entry_price = 0.0;
        self.size = 0.0;
        Ok(closed)
    }

    /// Fractional return at the given price. Zero while flat or when the
    /// entry price is degenerate.
    pub fn pnl_pct(&self, price: f64) -> f64 {
        if self.state == PositionState::Flat || self.entry_price <= 0.0 {
            return 0.0;
        }
        (price - self.entry_price) / self.entry_price
    }
}
