//! Wager ledger: accepting stakes on an open prediction.
use crate::api::*;
use crate::error::{MarketError, Result};
use crate::pozo::Pozo;
use chrono::Utc;
use log::debug;

impl Pozo {
    /// Stakes `amount` of `user`'s balance on option `option` of `prediction`.
    ///
    /// Checks run in a fixed order and the first failure is returned: unknown
    /// prediction, closed market, bad option, stake below the entry fee. The
    /// one-bet-per-user rule and the balance are checked by the transaction
    /// that writes the bet, so concurrent calls can't both get through.
    pub async fn place_bet(
        &self,
        user: UserId,
        prediction: RowId,
        option: usize,
        amount: Cents,
    ) -> Result<Bet> {
        let current = self.db.get_prediction(prediction).await?;
        if !current.is_open_at(Utc::now()) {
            return Err(MarketError::MarketClosed(prediction));
        }
        let label = current
            .option(option)
            .ok_or(MarketError::InvalidOption { prediction, option })?
            .to_string();
        if amount < current.entry_fee || amount <= 0 {
            return Err(MarketError::BelowMinimum {
                amount,
                entry_fee: current.entry_fee,
            });
        }
        let bet = self
            .with_retry("place_bet", || {
                self.db.place_bet(user, prediction, &label, amount)
            })
            .await?;
        debug!(
            "User {} bet {} on {} of prediction {}",
            user, amount, label, prediction
        );
        Ok(bet)
    }
}
