//! Bot runner: the sequential polling loop.
//!
//! One iteration per poll interval: date rollover, an advisory feedback
//! pass, then each pair in fixed order (market-data fetch, signal
//! aggregation, gate/exit evaluation, order placement, persistence). A cycle
//! failure alerts, sleeps a fixed backoff and restarts from a fresh fetch;
//! trades recorded before the failure stay recorded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, Timelike, Utc};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::advisor::{classify_advice, Advisor, ReviewKind};
use crate::alerts::{Alert, AlertManager};
use crate::api::{AggregateClient, KrakenClient, ProviderError};
use crate::db::DualStore;
use crate::models::{OhlcBar, Position, TradeAction, TradeRecord};
use crate::trading::{
    DailyPerformanceTracker, ExitSignal, GateContext, SignalAggregator, SignalInputs, Strategy,
    TraderConfig,
};

/// Trades inspected at startup when reconstructing open positions.
const RESTORE_LOOKBACK: i64 = 50;

/// Bot configuration.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Polling interval in seconds
    pub poll_interval_secs: u64,

    /// Sleep after a failed cycle before the next fresh fetch
    pub cycle_backoff_secs: u64,

    /// Whether to simulate orders instead of placing them
    pub dry_run: bool,

    /// Simulated quote balance used in dry-run mode
    pub paper_balance: f64,

    /// Primary database URL
    pub database_url: String,

    /// Optional best-effort mirror database URL
    pub mirror_database_url: Option<String>,

    /// Trading configuration
    pub trader: TraderConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            cycle_backoff_secs: 60,
            dry_run: true,
            paper_balance: 10_000.0,
            database_url: "sqlite:./trader.db?mode=rwc".to_string(),
            mirror_database_url: None,
            trader: TraderConfig::default(),
        }
    }
}

/// Main bot runner.
pub struct TraderBot {
    config: BotConfig,
    store: DualStore,
    kraken: KrakenClient,
    aggregates: AggregateClient,
    advisor: Option<Advisor>,
    alerts: AlertManager,

    aggregator: SignalAggregator,
    strategy: Strategy,
    positions: HashMap<String, Position>,
    ohlc_windows: HashMap<String, Vec<OhlcBar>>,
    tracker: DailyPerformanceTracker,

    /// Unix minute of the last advisory feedback pass
    last_feedback_slot: Option<i64>,

    shutdown: Arc<AtomicBool>,
}

impl TraderBot {
    pub async fn new(config: BotConfig) -> Result<Self> {
        let store = DualStore::open(
            &config.database_url,
            config.mirror_database_url.as_deref(),
        )
        .await?;

        let kraken = KrakenClient::from_env(config.dry_run, config.paper_balance)?;
        let aggregates = AggregateClient::new()?;

        let advisor = match Advisor::from_env(vec![
            ReviewKind::TradeReview,
            ReviewKind::StrategyReview,
        ]) {
            Ok(advisor) => Some(advisor),
            Err(e) => {
                warn!("Advisor not configured: {}. Feedback loop disabled.", e);
                None
            }
        };

        let positions = config
            .trader
            .pairs
            .iter()
            .map(|pair| (pair.clone(), Position::flat(pair)))
            .collect();

        let tracker = DailyPerformanceTracker::new(
            Local::now().date_naive(),
            &config.trader.pairs,
            config.trader.daily_target,
        );

        Ok(Self {
            strategy: Strategy::new(config.trader.clone()),
            config,
            store,
            kraken,
            aggregates,
            advisor,
            alerts: AlertManager::from_env(),
            aggregator: SignalAggregator::new(),
            positions,
            ohlc_windows: HashMap::new(),
            tracker,
            last_feedback_slot: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Restore positions from persisted trades and preload OHLC windows.
    pub async fn initialize(&mut self) -> Result<()> {
        info!("Initializing bot...");

        let records = self.store.primary().last_trades(RESTORE_LOOKBACK).await?;
        self.positions = restore_positions(&self.config.trader.pairs, &records);

        for position in self.positions.values() {
            if position.is_long() {
                info!(
                    pair = %position.pair,
                    entry = position.entry_price(),
                    size = position.size(),
                    "restored open long from trade history"
                );
            }
        }

        for pair in self.config.trader.pairs.clone() {
            self.reload_ohlc(&pair).await?;
        }

        self.alerts.notify(Alert::info(
            "startup",
            format!(
                "api connections ready, {} pairs loaded",
                self.config.trader.pairs.len()
            ),
        ));
        self.alerts.notify(Alert::info(
            "startup",
            if self.config.dry_run {
                "dry-run trading starting".to_string()
            } else {
                "live trading starting".to_string()
            },
        ));

        Ok(())
    }

    /// Main run loop; returns only on shutdown signal.
    pub async fn run(&mut self) -> Result<()> {
        info!(
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            pairs = ?self.config.trader.pairs,
            "Starting trading loop"
        );

        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        let mut poll = interval(Duration::from_secs(self.config.poll_interval_secs));

        while !self.shutdown.load(Ordering::SeqCst) {
            poll.tick().await;

            if let Err(e) = self.tick().await {
                error!(error = %e, "trading cycle failed");
                self.alerts.notify(Alert::warning(
                    "cycle error",
                    format!(
                        "{:#}. restarting in {}s",
                        e, self.config.cycle_backoff_secs
                    ),
                ));
                tokio::time::sleep(Duration::from_secs(self.config.cycle_backoff_secs)).await;
            }
        }

        info!("Trading loop stopped");
        Ok(())
    }

    /// One full iteration over the pair set.
    async fn tick(&mut self) -> Result<()> {
        let today = Local::now().date_naive();
        if let Some(flush) = self.tracker.rollover(today) {
            for (pair, day) in &flush.rows {
                self.store
                    .upsert_daily_pnl(flush.date, pair, day.pnl, day.trade_count)
                    .await?;
            }
        }

        self.run_feedback().await;

        for pair in self.config.trader.pairs.clone() {
            self.process_pair(&pair).await?;
        }

        Ok(())
    }

    /// Advisory feedback pass, at most once per completed minute. Advisor
    /// failures never fail the cycle.
    async fn run_feedback(&mut self) {
        let Some(advisor) = &self.advisor else {
            return;
        };
        if !advisor.has_reviewer(ReviewKind::StrategyReview) {
            return;
        }

        let slot = Utc::now().timestamp() / 60;
        if self.last_feedback_slot == Some(slot) {
            return;
        }
        self.last_feedback_slot = Some(slot);

        match advisor.review_strategy(&self.config.trader.pairs).await {
            Ok(text) => {
                let bias = classify_advice(&text);
                info!(bias = ?bias, advice = %text, "strategy review");
                self.aggregator.apply_bias(bias);
            }
            Err(e) => warn!(error = %e, "strategy review failed"),
        }
    }

    /// Process a single pair: exits while long, the conviction gate while
    /// flat.
    async fn process_pair(&mut self, pair: &str) -> Result<()> {
        let snapshot = self.kraken.get_market_data(pair).await?;
        debug!(
            pair,
            price = snapshot.price,
            volume = snapshot.volume,
            atr = snapshot.atr,
            "market snapshot"
        );

        let external_volume = self.aggregates.volume_24h(pair).await;

        // All five signals are produced every cycle, long or flat.
        let signals = {
            let bars = self
                .ohlc_windows
                .get(pair)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let inputs = SignalInputs {
                price: snapshot.price,
                bars,
                volume: snapshot.volume,
                atr: snapshot.atr,
                external_volume_24h: external_volume,
            };
            self.aggregator.compute(&inputs)
        };
        debug!(
            pair,
            min_conviction = signals.min_conviction(),
            aligned = signals.aligned(),
            direction = %signals.momentum.direction,
            "signals"
        );

        let position = self
            .positions
            .get(pair)
            .context("pair missing from position book")?
            .clone();

        if position.is_long() {
            if let Some(exit) = self
                .strategy
                .evaluate_exit(&position, snapshot.price, snapshot.atr)
            {
                self.close_position(pair, &exit, snapshot.price).await?;
            }
            return Ok(());
        }

        let day = self.tracker.day(pair);
        let ctx = GateContext {
            local_hour: Local::now().hour(),
            trades_today: day.trade_count,
            day_pnl: day.pnl,
        };
        let decision = self.strategy.evaluate_entry(&signals, ctx);

        if !decision.enter {
            debug!(pair, reason = %decision.reason, "holding");
            return Ok(());
        }

        if decision.direction != TradeAction::Buy {
            // Conviction aligned on selling, but there is nothing to sell
            // while flat and the book holds no short side.
            debug!(pair, "aligned sell conviction while flat, holding");
            return Ok(());
        }

        let balance = self.kraken.get_quote_balance().await?;
        if balance <= self.config.trader.min_quote_balance {
            debug!(pair, balance, "quote balance below minimum, holding");
            return Ok(());
        }

        let notional = self.config.trader.allocation(balance);
        self.open_position(pair, notional, snapshot.price, &decision.reason)
            .await
    }

    /// Flat -> Long. Position state mutates only after a confirmed order id.
    async fn open_position(
        &mut self,
        pair: &str,
        notional: f64,
        price: f64,
        reason: &str,
    ) -> Result<()> {
        match self.kraken.place_buy(pair, notional, price).await {
            Ok(order_id) => {
                self.positions
                    .get_mut(pair)
                    .context("pair missing from position book")?
                    .open(price, notional)?;

                let record = TradeRecord::new(pair, TradeAction::Buy, notional, price);
                self.store.append_trade(&record).await?;
                self.tracker.record_trade(pair);

                info!(
                    pair,
                    price,
                    notional,
                    order_id = %order_id,
                    reason,
                    "opened long"
                );

                self.reload_ohlc(pair).await?;
                self.review_trade(&record).await;
                Ok(())
            }
            Err(ProviderError::OrderRejected(errors)) => {
                // Abandon this pair's entry for the cycle; nothing mutated.
                warn!(pair, errors = ?errors, "buy order rejected");
                self.alerts.notify(Alert::warning(
                    "order rejected",
                    format!("{}: buy rejected: {:?}", pair, errors),
                ));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Long -> Flat via take-profit or stop-loss.
    async fn close_position(
        &mut self,
        pair: &str,
        exit: &ExitSignal,
        price: f64,
    ) -> Result<()> {
        let (entry_price, notional) = {
            let position = self
                .positions
                .get(pair)
                .context("pair missing from position book")?;
            (position.entry_price(), position.size())
        };
        let mut volume = if entry_price > 0.0 {
            notional / entry_price
        } else {
            0.0
        };

        // Sell the full position, but never more than the exchange reports
        // as actually held.
        if !self.config.dry_run {
            match self.kraken.get_base_balance(pair).await {
                Ok(held) if held > 0.0 => volume = volume.min(held),
                Ok(_) => {}
                Err(e) => warn!(pair, error = %e, "base balance check failed"),
            }
        }

        match self.kraken.place_sell(pair, volume, price).await {
            Ok(order_id) => {
                self.positions
                    .get_mut(pair)
                    .context("pair missing from position book")?
                    .close()?;

                let record = TradeRecord::new(pair, TradeAction::Sell, volume, price);
                self.store.append_trade(&record).await?;
                self.tracker.record_trade(pair);
                self.tracker.record_realized(pair, exit.realized_pct);

                let day = self.tracker.day(pair);
                self.store
                    .upsert_daily_pnl(self.tracker.date(), pair, day.pnl, day.trade_count)
                    .await?;

                info!(
                    pair,
                    entry = entry_price,
                    price,
                    pnl_pct = exit.pnl_pct,
                    realized_pct = exit.realized_pct,
                    reason = exit.reason.as_str(),
                    order_id = %order_id,
                    "closed long"
                );
                self.alerts.notify(Alert::info(
                    "position closed",
                    format!(
                        "{}: {} at {:.2}, realized {:.3}%",
                        pair,
                        exit.reason.as_str(),
                        price,
                        exit.realized_pct * 100.0
                    ),
                ));

                self.reload_ohlc(pair).await?;
                self.review_trade(&record).await;
                Ok(())
            }
            Err(ProviderError::OrderRejected(errors)) => {
                // Stay long; the exit re-evaluates next cycle.
                warn!(pair, errors = ?errors, "sell order rejected");
                self.alerts.notify(Alert::warning(
                    "order rejected",
                    format!("{}: sell rejected: {:?}", pair, errors),
                ));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Full reload of a pair's OHLC window, done on every transition to
    /// reset the technical context.
    async fn reload_ohlc(&mut self, pair: &str) -> Result<()> {
        let bars = self
            .kraken
            .get_ohlc(pair, self.config.trader.ohlc_days)
            .await?;
        debug!(pair, bars = bars.len(), "ohlc window reloaded");
        self.ohlc_windows.insert(pair.to_string(), bars);
        Ok(())
    }

    /// Log advisory commentary on an executed trade; failures are warnings.
    async fn review_trade(&self, record: &TradeRecord) {
        let Some(advisor) = &self.advisor else {
            return;
        };
        if !advisor.has_reviewer(ReviewKind::TradeReview) {
            return;
        }

        match advisor.review_last_trade(record).await {
            Ok(text) => info!(pair = %record.pair, advice = %text, "trade review"),
            Err(e) => warn!(pair = %record.pair, error = %e, "trade review failed"),
        }
    }
}

/// Rebuild the position book from persisted trades (newest first): a pair
/// whose most recent record is a BUY is an open long at that record's price
/// and size; anything else starts flat.
fn restore_positions(
    pairs: &[String],
    records_newest_first: &[TradeRecord],
) -> HashMap<String, Position> {
    pairs
        .iter()
        .map(|pair| {
            let latest = records_newest_first.iter().find(|r| &r.pair == pair);
            let position = match latest {
                Some(r) if r.action == TradeAction::Buy => {
                    Position::restored_long(pair, r.price, r.amount)
                }
                _ => Position::flat(pair),
            };
            (pair.clone(), position)
        })
        .collect()
}
