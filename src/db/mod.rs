//! Durable state: the append-only trade log and per-day per-pair PnL rows.
//!
//! A `Database` wraps one SQLite store. `DualStore` pairs the primary store
//! with an optional mirror; writes are attempted against both together,
//! best effort. A crash between the two writes can leave them inconsistent.
//! That is a known, flagged limitation: discrepancies are logged, there is
//! no two-phase commit.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::warn;

use crate::models::{TradeAction, TradeRecord};

/// One daily PnL row as persisted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DailyPnlRow {
    pub date: NaiveDate,
    pub pair: String,
    pub pnl: f64,
    pub trades: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct TradeRow {
    timestamp: chrono::DateTime<chrono::Utc>,
    pair: String,
    action: String,
    amount: f64,
    price: f64,
}

/// SQLite-backed store for trades and daily PnL.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connect and migrate. A single connection suffices: the trading loop
    /// is strictly sequential.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS trades (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                pair TEXT NOT NULL,
                action TEXT NOT NULL,
                amount REAL NOT NULL,
                price REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS daily_pnl (
                date TEXT NOT NULL,
                pair TEXT NOT NULL,
                pnl REAL NOT NULL DEFAULT 0,
                trades INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (date, pair)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_trades_pair ON trades(pair, id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Append one trade record. Rows are immutable once written.
    pub async fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO trades (timestamp, pair, action, amount, price) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.timestamp)
        .bind(&record.pair)
        .bind(record.action.as_str())
        .bind(record.amount)
        .bind(record.price)
        .execute(&self.pool)
        .await
        .context("Failed to append trade")?;

        Ok(())
    }

    /// Most recent trades, newest first.
    pub async fn last_trades(&self, limit: i64) -> Result<Vec<TradeRecord>> {
        let rows: Vec<TradeRow> = sqlx::query_as(
            "SELECT timestamp, pair, action, amount, price FROM trades ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch trades")?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let Some(action) = TradeAction::parse(&row.action) else {
                    warn!(action = %row.action, "skipping trade row with unknown action");
                    return None;
                };
                Some(TradeRecord {
                    timestamp: row.timestamp,
                    pair: row.pair,
                    action,
                    amount: row.amount,
                    price: row.price,
                })
            })
            .collect())
    }

    /// Upsert one (date, pair) PnL row; last write wins.
    pub async fn upsert_daily_pnl(
        &self,
        date: NaiveDate,
        pair: &str,
        pnl: f64,
        trades: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO daily_pnl (date, pair, pnl, trades)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(date, pair) DO UPDATE SET
                pnl = excluded.pnl,
                trades = excluded.trades
            "#,
        )
        .bind(date)
        .bind(pair)
        .bind(pnl)
        .bind(trades)
        .execute(&self.pool)
        .await
        .context("Failed to upsert daily pnl")?;

        Ok(())
    }

    /// Total recorded PnL per pair across all dates.
    pub async fn sum_pnl_by_pair(&self) -> Result<Vec<(String, f64)>> {
        let rows: Vec<(String, f64)> = sqlx::query_as(
            "SELECT pair, COALESCE(SUM(pnl), 0) FROM daily_pnl GROUP BY pair ORDER BY pair",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to sum pnl by pair")?;

        Ok(rows)
    }

    /// Recent daily PnL rows, newest date first.
    pub async fn recent_daily_pnl(&self, limit: i64) -> Result<Vec<DailyPnlRow>> {
        sqlx::query_as::<_, DailyPnlRow>(
            "SELECT date, pair, pnl, trades FROM daily_pnl ORDER BY date DESC, pair LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch daily pnl")
    }
}

/// Primary store plus an optional best-effort mirror.
pub struct DualStore {
    primary: Database,
    mirror: Option<Database>,
}

impl DualStore {
    pub async fn open(primary_url: &str, mirror_url: Option<&str>) -> Result<Self> {
        let primary = Database::new(primary_url).await?;
        let mirror = match mirror_url {
            Some(url) => Some(
                Database::new(url)
                    .await
                    .context("Failed to open mirror database")?,
            ),
            None => None,
        };

        Ok(Self { primary, mirror })
    }

    /// The primary store, used for all reads.
    pub fn primary(&self) -> &Database {
        &self.primary
    }

    /// Append to both stores together. The mirror write is best effort: its
    /// failure is logged and the stores may diverge until the next write.
    pub async fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        match &self.mirror {
            Some(mirror) => {
                let (primary, mirrored) =
                    futures::join!(self.primary.append_trade(record), mirror.append_trade(record));
                if let Err(e) = mirrored {
                    warn!(pair = %record.pair, error = %e, "mirror trade write failed");
                }
                primary
            }
            None => self.primary.append_trade(record).await,
        }
    }

    /// Upsert against both stores together, mirror best effort.
    pub async fn upsert_daily_pnl(
        &self,
        date: NaiveDate,
        pair: &str,
        pnl: f64,
        trades: i64,
    ) -> Result<()> {
        match &self.mirror {
            Some(mirror) => {
                let (primary, mirrored) = futures::join!(
                    self.primary.upsert_daily_pnl(date, pair, pnl, trades),
                    mirror.upsert_daily_pnl(date, pair, pnl, trades)
                );
                if let Err(e) = mirrored {
                    warn!(pair, %date, error = %e, "mirror pnl write failed");
                }
                primary
            }
            None => self.primary.upsert_daily_pnl(date, pair, pnl, trades).await,
        }
    }
}
