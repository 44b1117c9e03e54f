use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::*;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct NewPredictionRequest {
    pub title: String,
    pub options: Vec<String>,
    pub entry_fee: Cents,
    pub ends_at: DateTime<Utc>,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PredictionRequest {
    pub prediction: RowId,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PredictionFilter {
    pub resolved: Option<bool>,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlaceBetRequest {
    pub user: UserId,
    pub prediction: RowId,
    pub option: usize,
    pub amount: Cents,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ResolveRequest {
    pub prediction: RowId,
    pub winning_option: usize,
    /// Falls back to the server's configured fee rate.
    pub fee_rate: Option<Decimal>,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct PredictionUserRequest {
    pub prediction: Option<RowId>,
    pub user: Option<UserId>,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UserRequest {
    pub user: UserId,
}
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct AdjustBalanceRequest {
    pub user: UserId,
    pub amount: Cents,
    pub memo: Option<String>,
}
