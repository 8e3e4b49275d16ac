//! Domain models shared across the bot.

pub mod market;
pub mod position;
pub mod trade;

pub use market::{atr_from_bars, MarketSnapshot, OhlcBar};
pub use position::{Position, PositionState, TransitionError};
pub use trade::{TradeAction, TradeRecord};
