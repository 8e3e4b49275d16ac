//! Exchange and market-data clients.

pub mod external;
pub mod kraken;
pub mod types;

pub use external::AggregateClient;
pub use kraken::{KrakenClient, ProviderError};
