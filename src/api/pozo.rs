use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Amounts are kept in minor units (hundredths of a coin).
pub type Cents = i64;
pub type UserId = i64;
pub type RowId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Prediction {
    pub id: RowId,
    pub title: String,
    /// Captured at creation and never changed afterwards.
    pub options: Box<[String]>,
    pub entry_fee: Cents,
    pub pot: Cents,
    pub resolved: bool,
    pub winning_option: Option<String>,
    pub ends_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}
impl Prediction {
    pub fn option(&self, index: usize) -> Option<&str> {
        self.options.get(index).map(String::as_str)
    }
    /// Bets are only accepted while this holds.
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        !self.resolved && now < self.ends_at
    }
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bet {
    pub id: RowId,
    pub user: UserId,
    pub prediction: RowId,
    pub option: String,
    pub amount: Cents,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub id: RowId,
    pub user: UserId,
    /// Signed: credits are positive, debits negative.
    pub amount: Cents,
    pub kind: TxKind,
    pub prediction: Option<RowId>,
    pub bet: Option<RowId>,
    pub share: Option<Decimal>,
    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    Withdrawal,
    PredictionBet,
    PredictionWin,
    PredictionRefund,
}
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SettlementKind {
    /// Winning pool was backed; winners split the payout pool.
    Payout,
    /// Nobody backed the winning option; every bettor is refunded minus the fee.
    Refund,
    /// No stakes at all.
    Empty,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settlement {
    pub prediction: RowId,
    pub winning_option: String,
    pub kind: SettlementKind,
    pub total_pool: Cents,
    pub platform_fee: Cents,
    pub winners_count: u32,
    pub total_payout: Cents,
}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionTotal {
    pub option: String,
    pub total: Cents,
}
