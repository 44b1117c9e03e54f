//! Append-only balance ledger. A user's balance is the sum of their
//! transactions. Every function takes the connection of a transaction the
//! caller already opened, so debits and credits commit or roll back together
//! with the bet or settlement that caused them.
use crate::api::*;
use crate::db::{from_millis, to_millis};
use crate::error::{MarketError, Result};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::{query, Row, SqliteConnection};
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub user: UserId,
    /// Always positive, the direction comes from [`debit`] or [`credit`].
    pub amount: Cents,
    pub kind: TxKind,
    pub prediction: Option<RowId>,
    pub bet: Option<RowId>,
    pub share: Option<Decimal>,
    pub memo: Option<String>,
}

pub async fn balance(conn: &mut SqliteConnection, user: UserId) -> Result<Cents> {
    let balance = query(
        "SELECT COALESCE(SUM(amount), 0) AS balance \
        FROM ledger_transactions WHERE user_id = ?",
    )
    .bind(user)
    .fetch_one(&mut *conn)
    .await?
    .try_get("balance")?;
    Ok(balance)
}
pub async fn debit(
    conn: &mut SqliteConnection,
    entry: Entry,
    now: DateTime<Utc>,
) -> Result<LedgerTransaction> {
    let balance = balance(conn, entry.user).await?;
    if balance < entry.amount {
        return Err(MarketError::InsufficientFunds {
            user: entry.user,
            amount: entry.amount,
            balance,
        });
    }
    let amount = -entry.amount;
    record(conn, entry, amount, now).await
}
pub async fn credit(
    conn: &mut SqliteConnection,
    entry: Entry,
    now: DateTime<Utc>,
) -> Result<LedgerTransaction> {
    let amount = entry.amount;
    record(conn, entry, amount, now).await
}
pub async fn history(conn: &mut SqliteConnection, user: UserId) -> Result<Vec<LedgerTransaction>> {
    let rows = query(
        "SELECT id, user_id, amount, kind, prediction, bet, share, memo, created_at \
        FROM ledger_transactions WHERE user_id = ? ORDER BY id",
    )
    .bind(user)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter().map(transaction_from_row).collect()
}
async fn record(
    conn: &mut SqliteConnection,
    entry: Entry,
    amount: Cents,
    now: DateTime<Utc>,
) -> Result<LedgerTransaction> {
    let id = query(
        "INSERT INTO ledger_transactions ( \
        user_id, \
        amount, \
        kind, \
        prediction, \
        bet, \
        share, \
        memo, \
        created_at) \
        VALUES (?,?,?,?,?,?,?,?)",
    )
    .bind(entry.user)
    .bind(amount)
    .bind(entry.kind.to_string())
    .bind(entry.prediction)
    .bind(entry.bet)
    .bind(entry.share.map(|share| share.to_string()))
    .bind(entry.memo.clone())
    .bind(to_millis(now))
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();
    Ok(LedgerTransaction {
        id,
        user: entry.user,
        amount,
        kind: entry.kind,
        prediction: entry.prediction,
        bet: entry.bet,
        share: entry.share,
        memo: entry.memo,
        created_at: from_millis(to_millis(now))?,
    })
}
fn transaction_from_row(row: &SqliteRow) -> Result<LedgerTransaction> {
    let kind: String = row.try_get("kind")?;
    let share: Option<String> = row.try_get("share")?;
    Ok(LedgerTransaction {
        id: row.try_get("id")?,
        user: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        kind: TxKind::from_str(&kind)?,
        prediction: row.try_get("prediction")?,
        bet: row.try_get("bet")?,
        share: share
            .map(|share| Decimal::from_str(&share).context("share column is not a decimal"))
            .transpose()?,
        memo: row.try_get("memo")?,
        created_at: from_millis(row.try_get("created_at")?)?,
    })
}
