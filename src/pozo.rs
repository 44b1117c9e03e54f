use crate::api::*;
use crate::config::{MarketSettings, RetrySettings};
use crate::db::DB;
use crate::error::{MarketError, Result};
use log::{debug, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// The wagering engine. Registry, wager and settlement operations are
/// implemented on it in their own modules, this one holds the shared parts.
pub struct Pozo {
    pub(crate) db: Arc<Box<dyn DB + Send + Sync>>,
    pub(crate) market: MarketSettings,
    retry: RetrySettings,
}

impl Pozo {
    pub fn new(
        db: Box<dyn DB + Send + Sync>,
        market: MarketSettings,
        retry: RetrySettings,
    ) -> Self {
        Self {
            db: Arc::new(db),
            market,
            retry,
        }
    }
    /// Runs `attempt` until it succeeds, fails for good, or the retry budget
    /// is spent. Only [`MarketError::TransientStorageFailure`] is retried;
    /// each attempt is a whole transaction, so a failed one left nothing behind.
    pub(crate) async fn with_retry<T, F, Fut>(&self, what: &str, mut attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut tries = 1;
        loop {
            match attempt().await {
                Err(e) if e.is_transient() && tries < self.retry.max_attempts => {
                    let delay = self.backoff(tries - 1);
                    warn!(
                        "{} failed on attempt {}/{}, retrying in {:?}: {:#}",
                        what, tries, self.retry.max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
                result => return result,
            }
        }
    }
    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self
            .retry
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay.min(self.retry.max_delay_ms))
    }

    /// Pot and stake per option, in option order.
    pub async fn get_market_state(&self, prediction: RowId) -> Result<MarketStateResponse> {
        let (current, totals) = self
            .with_retry("get_market_state", || self.db.get_market_snapshot(prediction))
            .await?;
        let option_totals = current
            .options
            .iter()
            .map(|option| OptionTotal {
                option: option.clone(),
                total: totals.get(option).copied().unwrap_or(0),
            })
            .collect();
        Ok(MarketStateResponse {
            prediction,
            pot: current.pot,
            option_totals,
            resolved: current.resolved,
            winning_option: current.winning_option,
        })
    }
    pub async fn get_bets(&self, filter: PredictionUserRequest) -> Result<Vec<Bet>> {
        self.db.get_bets(filter).await
    }
    pub async fn get_balance(&self, user: UserId) -> Result<Cents> {
        self.db.get_balance(user).await
    }
    pub async fn get_transactions(&self, user: UserId) -> Result<Vec<LedgerTransaction>> {
        self.db.get_transactions(user).await
    }
    /// Operator deposit (positive `amount`) or withdrawal (negative).
    pub async fn adjust_balance(
        &self,
        user: UserId,
        amount: Cents,
        memo: Option<String>,
    ) -> Result<LedgerTransaction> {
        if !self.market.allow_balance_adjustments {
            return Err(MarketError::AdjustmentsDisabled);
        }
        let transaction = self
            .with_retry("adjust_balance", || {
                self.db.adjust_balance(user, amount, memo.clone())
            })
            .await?;
        debug!("Adjusted balance of user {} by {}", user, amount);
        Ok(transaction)
    }
}
