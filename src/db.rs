use crate::api::*;
use crate::config::DatabaseSettings;
use crate::error::{MarketError, Result};
use crate::ledger::{self, Entry};
use crate::settlement::plan_settlement;
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use log::error;
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{query, Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

#[async_trait]
pub trait DB {
    async fn add_prediction(&self, prediction: NewPredictionRequest) -> Result<RowId>;
    async fn get_prediction(&self, prediction: RowId) -> Result<Prediction>;
    async fn get_predictions(&self, filter: PredictionFilter) -> Result<Vec<Prediction>>;
    /// The prediction and its staked amount per option label, read in one
    /// transaction so the pot always equals the totals. Options nobody backed
    /// are missing.
    async fn get_market_snapshot(
        &self,
        prediction: RowId,
    ) -> Result<(Prediction, HashMap<String, Cents>)>;
    /// Persists the bet, grows the pot and debits the user in one transaction.
    async fn place_bet(
        &self,
        user: UserId,
        prediction: RowId,
        option: &str,
        amount: Cents,
    ) -> Result<Bet>;
    async fn get_bets(&self, filter: PredictionUserRequest) -> Result<Vec<Bet>>;
    /// Marks the prediction resolved and pays out in one transaction.
    async fn settle_prediction(
        &self,
        prediction: RowId,
        winning_option: &str,
        fee_rate: Decimal,
    ) -> Result<Settlement>;
    async fn get_balance(&self, user: UserId) -> Result<Cents>;
    async fn get_transactions(&self, user: UserId) -> Result<Vec<LedgerTransaction>>;
    async fn adjust_balance(
        &self,
        user: UserId,
        amount: Cents,
        memo: Option<String>,
    ) -> Result<LedgerTransaction>;
}

const SCHEMA: [&str; 10] = [
    "CREATE TABLE IF NOT EXISTS predictions (\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        title TEXT NOT NULL,\
        options TEXT NOT NULL,\
        entry_fee INTEGER NOT NULL,\
        pot INTEGER NOT NULL DEFAULT 0 CHECK (pot >= 0),\
        resolved INTEGER NOT NULL DEFAULT 0,\
        winning_option TEXT,\
        ends_at INTEGER NOT NULL,\
        created_at INTEGER NOT NULL,\
        resolved_at INTEGER,\
        CHECK (resolved = 0 OR winning_option IS NOT NULL)\
        )",
    "CREATE TABLE IF NOT EXISTS bets (\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        user_id INTEGER NOT NULL,\
        prediction INTEGER NOT NULL REFERENCES predictions(id),\
        option TEXT NOT NULL,\
        amount INTEGER NOT NULL CHECK (amount > 0),\
        created_at INTEGER NOT NULL,\
        UNIQUE (user_id, prediction)\
        )",
    "CREATE TRIGGER IF NOT EXISTS bets_no_update BEFORE UPDATE ON bets \
        BEGIN SELECT RAISE(ABORT, 'bets are immutable'); END",
    "CREATE TRIGGER IF NOT EXISTS bets_no_delete BEFORE DELETE ON bets \
        BEGIN SELECT RAISE(ABORT, 'bets are immutable'); END",
    "CREATE TABLE IF NOT EXISTS ledger_transactions (\
        id INTEGER PRIMARY KEY AUTOINCREMENT,\
        user_id INTEGER NOT NULL,\
        amount INTEGER NOT NULL,\
        kind TEXT NOT NULL,\
        prediction INTEGER,\
        bet INTEGER,\
        share TEXT,\
        memo TEXT,\
        created_at INTEGER NOT NULL\
        )",
    "CREATE UNIQUE INDEX IF NOT EXISTS ledger_transactions_bet_kind \
        ON ledger_transactions (bet, kind) WHERE bet IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS ledger_transactions_user \
        ON ledger_transactions (user_id)",
    "CREATE INDEX IF NOT EXISTS bets_prediction ON bets (prediction)",
    "CREATE TRIGGER IF NOT EXISTS ledger_transactions_no_update \
        BEFORE UPDATE ON ledger_transactions \
        BEGIN SELECT RAISE(ABORT, 'ledger transactions are append-only'); END",
    "CREATE TRIGGER IF NOT EXISTS ledger_transactions_no_delete \
        BEFORE DELETE ON ledger_transactions \
        BEGIN SELECT RAISE(ABORT, 'ledger transactions are append-only'); END",
];

pub struct SQLite {
    connection: SqlitePool,
}
impl SQLite {
    /// Opens `url`, or a fresh in-memory database when `None`.
    pub async fn new(url: Option<String>) -> Result<Self> {
        Self::connect(&DatabaseSettings {
            url,
            ..Default::default()
        })
        .await
    }
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self> {
        let busy_timeout = Duration::from_millis(settings.busy_timeout_ms);
        let mut pool = SqlitePoolOptions::new().max_connections(settings.max_connections);
        let options = match settings.url.as_deref() {
            // every pooled connection shares one in-memory database, it
            // disappears with the last connection
            None => {
                pool = pool.idle_timeout(None).max_lifetime(None);
                SqliteConnectOptions::from_str("sqlite::memory:")?
            }
            Some(url) if url.starts_with("sqlite:") => SqliteConnectOptions::from_str(url)?
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
        }
        .foreign_keys(true)
        .busy_timeout(busy_timeout);
        let connection = pool
            .connect_with(options)
            .await
            .with_context(|| format!("couldn't open database {:?}", settings.url))?;
        for statement in SCHEMA {
            query(statement).execute(&connection).await?;
        }
        Ok(Self { connection })
    }
    pub fn pool(&self) -> &SqlitePool {
        &self.connection
    }
}
#[async_trait]
impl DB for SQLite {
    async fn add_prediction(&self, prediction: NewPredictionRequest) -> Result<RowId> {
        let options =
            serde_json::to_string(&prediction.options).context("couldn't encode options")?;
        let id = query(
            "INSERT INTO predictions (\
            title,\
            options,\
            entry_fee,\
            ends_at,\
            created_at)\
            VALUES (?,?,?,?,?)",
        )
        .bind(prediction.title)
        .bind(options)
        .bind(prediction.entry_fee)
        .bind(to_millis(prediction.ends_at))
        .bind(to_millis(Utc::now()))
        .execute(&self.connection)
        .await?
        .last_insert_rowid();
        Ok(id)
    }
    async fn get_prediction(&self, prediction: RowId) -> Result<Prediction> {
        let mut conn = self.connection.acquire().await?;
        fetch_prediction(&mut conn, prediction).await
    }
    async fn get_predictions(&self, filter: PredictionFilter) -> Result<Vec<Prediction>> {
        let rows = query(
            "SELECT id, title, options, entry_fee, pot, resolved, winning_option, \
            ends_at, created_at, resolved_at \
            FROM predictions \
            WHERE (? IS NULL OR resolved = ?) \
            ORDER BY id",
        )
        .bind(filter.resolved)
        .bind(filter.resolved)
        .fetch_all(&self.connection)
        .await?;
        rows.iter().map(prediction_from_row).collect()
    }
    async fn get_market_snapshot(
        &self,
        prediction: RowId,
    ) -> Result<(Prediction, HashMap<String, Cents>)> {
        let mut tx = self.connection.begin().await?;
        let current = fetch_prediction(&mut tx, prediction).await?;
        let rows = query(
            "SELECT option, SUM(amount) AS total \
            FROM bets \
            WHERE prediction = ? \
            GROUP BY option",
        )
        .bind(prediction)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        let mut totals = HashMap::new();
        for row in rows {
            totals.insert(row.try_get("option")?, row.try_get("total")?);
        }
        Ok((current, totals))
    }
    async fn place_bet(
        &self,
        user: UserId,
        prediction: RowId,
        option: &str,
        amount: Cents,
    ) -> Result<Bet> {
        let mut tx = self.connection.begin().await?;
        let now = Utc::now();
        // writing first takes the write lock before anything is read
        let opened = query(
            "UPDATE predictions SET pot = pot + ? \
            WHERE id = ? AND resolved = 0 AND ends_at > ?",
        )
        .bind(amount)
        .bind(prediction)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if opened != 1 {
            return Err(MarketError::MarketClosed(prediction));
        }
        let inserted = query(
            "INSERT INTO bets ( \
            user_id, \
            prediction, \
            option, \
            amount, \
            created_at) \
            VALUES (?,?,?,?,?)",
        )
        .bind(user)
        .bind(prediction)
        .bind(option)
        .bind(amount)
        .bind(to_millis(now))
        .execute(&mut *tx)
        .await;
        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                return Err(MarketError::AlreadyBet { user, prediction })
            }
            Err(e) => return Err(e.into()),
        };
        let entry = Entry {
            user,
            amount,
            kind: TxKind::PredictionBet,
            prediction: Some(prediction),
            bet: Some(id),
            share: None,
            memo: None,
        };
        ledger::debit(&mut tx, entry, now).await?;
        tx.commit().await?;
        Ok(Bet {
            id,
            user,
            prediction,
            option: option.to_string(),
            amount,
            created_at: from_millis(to_millis(now))?,
        })
    }
    async fn get_bets(&self, filter: PredictionUserRequest) -> Result<Vec<Bet>> {
        let mut conn = self.connection.acquire().await?;
        fetch_bets(&mut conn, filter).await
    }
    async fn settle_prediction(
        &self,
        prediction: RowId,
        winning_option: &str,
        fee_rate: Decimal,
    ) -> Result<Settlement> {
        let mut tx = self.connection.begin().await?;
        let now = Utc::now();
        let flipped = query(
            "UPDATE predictions SET \
            resolved = 1, \
            winning_option = ?, \
            resolved_at = ? \
            WHERE id = ? AND resolved = 0",
        )
        .bind(winning_option)
        .bind(to_millis(now))
        .bind(prediction)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if flipped != 1 {
            // existence check turns NotFound into an error of its own
            fetch_prediction(&mut tx, prediction).await?;
            return Err(MarketError::AlreadyResolved(prediction));
        }
        let pot: Cents = query("SELECT pot FROM predictions WHERE id = ?")
            .bind(prediction)
            .fetch_one(&mut *tx)
            .await?
            .try_get("pot")?;
        let bets = fetch_bets(
            &mut tx,
            PredictionUserRequest {
                prediction: Some(prediction),
                user: None,
            },
        )
        .await?;
        let plan = plan_settlement(prediction, &bets, winning_option, fee_rate)?;
        if plan.settlement.total_pool != pot {
            error!(
                "Prediction {} has a pot of {} but its bets add up to {}",
                prediction, pot, plan.settlement.total_pool
            );
            return Err(anyhow!(
                "pot of prediction {} doesn't match its bets, settlement aborted",
                prediction
            )
            .into());
        }
        for payout in plan.payouts {
            let entry = Entry {
                user: payout.user,
                amount: payout.amount,
                kind: payout.kind,
                prediction: Some(prediction),
                bet: Some(payout.bet),
                share: payout.share,
                memo: None,
            };
            ledger::credit(&mut tx, entry, now).await?;
        }
        tx.commit().await?;
        Ok(plan.settlement)
    }
    async fn get_balance(&self, user: UserId) -> Result<Cents> {
        let mut conn = self.connection.acquire().await?;
        ledger::balance(&mut conn, user).await
    }
    async fn get_transactions(&self, user: UserId) -> Result<Vec<LedgerTransaction>> {
        let mut conn = self.connection.acquire().await?;
        ledger::history(&mut conn, user).await
    }
    async fn adjust_balance(
        &self,
        user: UserId,
        amount: Cents,
        memo: Option<String>,
    ) -> Result<LedgerTransaction> {
        let mut tx = self.connection.begin().await?;
        let now = Utc::now();
        let entry = Entry {
            user,
            amount: amount.checked_abs().ok_or(MarketError::Overflow)?,
            kind: if amount < 0 {
                TxKind::Withdrawal
            } else {
                TxKind::Deposit
            },
            prediction: None,
            bet: None,
            share: None,
            memo,
        };
        let transaction = if amount < 0 {
            ledger::debit(&mut tx, entry, now).await?
        } else {
            ledger::credit(&mut tx, entry, now).await?
        };
        tx.commit().await?;
        Ok(transaction)
    }
}

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}
pub(crate) fn from_millis(millis: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| anyhow!("{} is not a valid timestamp", millis).into())
}
async fn fetch_prediction(conn: &mut SqliteConnection, prediction: RowId) -> Result<Prediction> {
    let row = query(
        "SELECT id, title, options, entry_fee, pot, resolved, winning_option, \
        ends_at, created_at, resolved_at \
        FROM predictions WHERE id = ?",
    )
    .bind(prediction)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or(MarketError::NotFound(prediction))?;
    prediction_from_row(&row)
}
async fn fetch_bets(conn: &mut SqliteConnection, filter: PredictionUserRequest) -> Result<Vec<Bet>> {
    let rows = query(
        "SELECT id, user_id, prediction, option, amount, created_at \
        FROM bets \
        WHERE (? IS NULL OR prediction = ?) AND (? IS NULL OR user_id = ?) \
        ORDER BY id",
    )
    .bind(filter.prediction)
    .bind(filter.prediction)
    .bind(filter.user)
    .bind(filter.user)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(bet_from_row).collect()
}
fn prediction_from_row(row: &SqliteRow) -> Result<Prediction> {
    let options: String = row.try_get("options")?;
    let options: Vec<String> =
        serde_json::from_str(&options).context("options column is not a list of labels")?;
    let resolved: i64 = row.try_get("resolved")?;
    let resolved_at: Option<i64> = row.try_get("resolved_at")?;
    Ok(Prediction {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        options: options.into_boxed_slice(),
        entry_fee: row.try_get("entry_fee")?,
        pot: row.try_get("pot")?,
        resolved: resolved != 0,
        winning_option: row.try_get("winning_option")?,
        ends_at: from_millis(row.try_get("ends_at")?)?,
        created_at: from_millis(row.try_get("created_at")?)?,
        resolved_at: resolved_at.map(from_millis).transpose()?,
    })
}
fn bet_from_row(row: &SqliteRow) -> Result<Bet> {
    Ok(Bet {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        prediction: row.try_get("prediction")?,
        option: row.try_get("option")?,
        amount: row.try_get("amount")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}
