//! Kraken conviction trading bot
//!
//! Polls market data for a fixed pair set, aggregates five agent-weighted
//! conviction signals, and drives a FLAT/LONG position lifecycle with
//! take-profit / stop-loss exits and daily PnL bookkeeping.

mod advisor;
mod alerts;
mod api;
mod bot;
mod db;
mod models;
mod trading;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::bot::{BotConfig, TraderBot};
use crate::db::Database;
use crate::trading::TraderConfig;

/// Conviction trading bot CLI.
#[derive(Parser)]
#[command(name = "kraken-conviction-bot")]
#[command(about = "Conviction-gated trading loop for Kraken pairs", long_about = None)]
struct Cli {
    /// Primary database URL
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:./trader.db?mode=rwc")]
    database: String,

    /// Optional mirror database URL (best-effort dual writes)
    #[arg(long, env = "MIRROR_DATABASE_URL")]
    mirror_database: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading loop
    Run {
        /// Pairs to trade, comma separated
        #[arg(short, long, value_delimiter = ',')]
        pairs: Vec<String>,

        /// Polling interval in seconds
        #[arg(short, long, env = "CHECK_INTERVAL", default_value = "60")]
        interval: u64,

        /// Place real orders; requires Kraken credentials. Without this
        /// flag the bot runs dry, logging simulated orders.
        #[arg(long, env = "LIVE_TRADING")]
        live: bool,

        /// Simulated quote balance for dry-run mode
        #[arg(long, default_value = "10000")]
        paper_balance: f64,
    },

    /// Show recent trades and per-pair PnL from the durable store
    Status,

    /// Show the resolved trading configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            pairs,
            interval,
            live,
            paper_balance,
        } => {
            let mut trader = TraderConfig::default();
            if !pairs.is_empty() {
                trader.pairs = pairs;
            }

            let config = BotConfig {
                poll_interval_secs: interval,
                dry_run: !live,
                paper_balance,
                database_url: cli.database.clone(),
                mirror_database_url: cli.mirror_database.clone(),
                trader,
                ..BotConfig::default()
            };

            info!(
                pairs = ?config.trader.pairs,
                interval = config.poll_interval_secs,
                dry_run = config.dry_run,
                "Starting conviction trading bot"
            );

            let mut bot = TraderBot::new(config.clone()).await?;
            bot.initialize().await?;

            println!("\n=== Kraken Conviction Bot ===");
            println!("Pairs:            {}", config.trader.pairs.join(", "));
            println!("Polling interval: {}s", config.poll_interval_secs);
            println!(
                "Mode:             {}",
                if config.dry_run {
                    "DRY RUN (no real orders)"
                } else {
                    "LIVE TRADING"
                }
            );
            println!("\nPress Ctrl+C to stop.\n");

            bot.run().await?;
        }

        Commands::Status => {
            let db = Database::new(&cli.database).await?;

            let trades = db.last_trades(10).await?;
            if trades.is_empty() {
                println!("No trades recorded yet.");
            } else {
                println!("\n=== Recent Trades ===");
                println!("{:<22} {:<8} {:<5} {:>14} {:>12}", "TIME", "PAIR", "SIDE", "AMOUNT", "PRICE");
                println!("{}", "-".repeat(66));
                for trade in &trades {
                    println!(
                        "{:<22} {:<8} {:<5} {:>14.6} {:>12.2}",
                        trade.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        trade.pair,
                        trade.action.as_str(),
                        trade.amount,
                        trade.price
                    );
                }
            }

            let sums = db.sum_pnl_by_pair().await?;
            if !sums.is_empty() {
                println!("\n=== PnL by Pair ===");
                for (pair, pnl) in &sums {
                    println!("  {:<8} {:>+9.4}%", pair, pnl * 100.0);
                }
            }

            let days = db.recent_daily_pnl(9).await?;
            if !days.is_empty() {
                println!("\n=== Recent Daily PnL ===");
                println!("{:<12} {:<8} {:>10} {:>8}", "DATE", "PAIR", "PNL", "TRADES");
                println!("{}", "-".repeat(42));
                for row in &days {
                    println!(
                        "{:<12} {:<8} {:>+9.4}% {:>8}",
                        row.date, row.pair, row.pnl * 100.0, row.trades
                    );
                }
            }
        }

        Commands::Config => {
            let trader = TraderConfig::default();

            println!("\n=== Trading Configuration ===\n");
            println!("Pairs:                {}", trader.pairs.join(", "));
            println!("Entry conviction:     {}", trader.entry_conviction);
            println!("Fallback conviction:  {}", trader.fallback_conviction);
            println!("Late-session hour:    {}:00", trader.late_session_hour);
            println!("Daily target:         {}%", trader.daily_target * 100.0);
            println!("Taker fee:            {}%", trader.taker_fee * 100.0);
            println!("Take-profit floor:    {}%", trader.take_profit_floor * 100.0);
            println!("Stop-loss cap:        {}%", trader.stop_loss_cap * 100.0);
            println!("ATR exit multiple:    {}", trader.atr_exit_multiple);
            println!("Min quote balance:    ${}", trader.min_quote_balance);
            println!("OHLC window:          {} days", trader.ohlc_days);
            println!("\nDatabase:             {}", cli.database);
            if let Some(mirror) = &cli.mirror_database {
                println!("Mirror database:      {}", mirror);
            }
        }
    }

    Ok(())
}
