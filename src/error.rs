use crate::api::*;
use axum::http::StatusCode;
use log::debug;
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T, E = MarketError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Prediction {0} doesn't exist")]
    NotFound(RowId),
    #[error("Prediction {0} doesn't accept bets anymore")]
    MarketClosed(RowId),
    #[error("Prediction {prediction} has no option {option}")]
    InvalidOption { prediction: RowId, option: usize },
    #[error("Bet of {amount} is below the entry fee of {entry_fee}")]
    BelowMinimum { amount: Cents, entry_fee: Cents },
    #[error("User {user} already placed a bet on prediction {prediction}")]
    AlreadyBet { user: UserId, prediction: RowId },
    #[error("User {user} can't cover {amount} with a balance of {balance}")]
    InsufficientFunds {
        user: UserId,
        amount: Cents,
        balance: Cents,
    },
    #[error("Prediction {0} is already resolved")]
    AlreadyResolved(RowId),
    #[error("Storage failed transiently: {0}")]
    TransientStorageFailure(#[source] sqlx::Error),
    #[error("Invalid prediction: {0}")]
    InvalidPrediction(String),
    #[error("Fee rate {0} is not between 0 and 1")]
    InvalidFeeRate(Decimal),
    #[error("Balance adjustments are disabled")]
    AdjustmentsDisabled,
    #[error("Amount calculation overflowed")]
    Overflow,
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
impl MarketError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStorageFailure(_))
    }
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidOption { .. }
            | Self::BelowMinimum { .. }
            | Self::InvalidPrediction(_)
            | Self::InvalidFeeRate(_) => StatusCode::BAD_REQUEST,
            Self::MarketClosed(_) | Self::AlreadyBet { .. } | Self::AlreadyResolved(_) => {
                StatusCode::CONFLICT
            }
            Self::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::AdjustmentsDisabled => StatusCode::FORBIDDEN,
            Self::TransientStorageFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Overflow | Self::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
impl From<sqlx::Error> for MarketError {
    fn from(e: sqlx::Error) -> Self {
        if is_transient(&e) {
            Self::TransientStorageFailure(e)
        } else {
            Self::Storage(e.into())
        }
    }
}
/// SQLITE_BUSY and SQLITE_LOCKED (including their extended codes), pool
/// exhaustion and I/O hiccups go away on their own.
fn is_transient(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
        _ => false,
    }
}

pub fn map_market_err(e: MarketError) -> (StatusCode, String) {
    debug!("Error: {:#}", e);
    (e.status_code(), format!("{:#}", e))
}
