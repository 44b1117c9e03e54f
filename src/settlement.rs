//! Settlement engine: resolving a prediction and paying out its pot.
//!
//! [`plan_settlement`] decides who gets what and does no I/O, the storage
//! layer applies the plan together with the `resolved` flip in a single
//! transaction.
use crate::api::*;
use crate::error::{MarketError, Result};
use crate::math::{after_fee, check_fee_rate, share, split_proportionally};
use crate::pozo::Pozo;
use log::debug;
use rust_decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub struct Payout {
    pub bet: RowId,
    pub user: UserId,
    pub amount: Cents,
    pub kind: TxKind,
    pub share: Option<Decimal>,
}
#[derive(Debug, Clone, PartialEq)]
pub struct SettlementPlan {
    pub settlement: Settlement,
    /// Zero amounts are left out, they would only add empty ledger rows.
    pub payouts: Vec<Payout>,
}

/// Works out the payouts for `bets` when `winning_option` wins.
///
/// Bets on the winning option split the pot minus the fee in proportion to
/// their stake. If nobody backed it, every bet is refunded minus the fee. An
/// empty pot pays nothing.
pub fn plan_settlement(
    prediction: RowId,
    bets: &[Bet],
    winning_option: &str,
    fee_rate: Decimal,
) -> Result<SettlementPlan> {
    check_fee_rate(fee_rate)?;
    let mut bets: Vec<&Bet> = bets.iter().collect();
    bets.sort_by_key(|bet| bet.id);
    let total_pool = checked_sum(bets.iter().map(|bet| bet.amount))?;
    let winners: Vec<&Bet> = bets
        .iter()
        .copied()
        .filter(|bet| bet.option == winning_option)
        .collect();
    let winning_pool = checked_sum(winners.iter().map(|bet| bet.amount))?;

    let (kind, payouts) = if total_pool == 0 {
        (SettlementKind::Empty, vec![])
    } else if winning_pool > 0 {
        let payout_pool = after_fee(total_pool, fee_rate)?;
        let stakes: Vec<Cents> = winners.iter().map(|bet| bet.amount).collect();
        let amounts = split_proportionally(payout_pool, &stakes)?;
        let payouts = winners
            .iter()
            .zip(amounts)
            .map(|(bet, amount)| Payout {
                bet: bet.id,
                user: bet.user,
                amount,
                kind: TxKind::PredictionWin,
                share: Some(share(bet.amount, winning_pool)),
            })
            .collect();
        (SettlementKind::Payout, payouts)
    } else {
        let payouts = bets
            .iter()
            .map(|bet| {
                Ok(Payout {
                    bet: bet.id,
                    user: bet.user,
                    amount: after_fee(bet.amount, fee_rate)?,
                    kind: TxKind::PredictionRefund,
                    share: None,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        (SettlementKind::Refund, payouts)
    };
    let payouts: Vec<Payout> = payouts.into_iter().filter(|p| p.amount > 0).collect();
    let total_payout = checked_sum(payouts.iter().map(|payout| payout.amount))?;
    let winners_count = winners.iter().filter(|bet| bet.amount > 0).count();
    Ok(SettlementPlan {
        settlement: Settlement {
            prediction,
            winning_option: winning_option.to_string(),
            kind,
            total_pool,
            platform_fee: total_pool - total_payout,
            winners_count: u32::try_from(winners_count).map_err(|_| MarketError::Overflow)?,
            total_payout,
        },
        payouts,
    })
}
fn checked_sum(amounts: impl Iterator<Item = Cents>) -> Result<Cents> {
    amounts.fold(Ok(0), |sum: Result<Cents>, amount| {
        sum?.checked_add(amount).ok_or(MarketError::Overflow)
    })
}

impl Pozo {
    /// Resolves `prediction` in favour of option `winning_option` and pays
    /// out. Only the first call for a prediction has any effect, every later
    /// or concurrent one gets [`MarketError::AlreadyResolved`].
    pub async fn resolve(
        &self,
        prediction: RowId,
        winning_option: usize,
        fee_rate: Option<Decimal>,
    ) -> Result<Settlement> {
        let fee_rate = fee_rate.unwrap_or(self.market.default_fee_rate);
        let current = self.db.get_prediction(prediction).await?;
        if current.resolved {
            return Err(MarketError::AlreadyResolved(prediction));
        }
        let label = current
            .option(winning_option)
            .ok_or(MarketError::InvalidOption {
                prediction,
                option: winning_option,
            })?
            .to_string();
        check_fee_rate(fee_rate)?;
        let settlement = self
            .with_retry("resolve", || {
                self.db.settle_prediction(prediction, &label, fee_rate)
            })
            .await?;
        debug!(
            "Resolved prediction {} to {}: {} pool {}, fee {}, {} winners paid {}",
            prediction,
            settlement.winning_option,
            settlement.kind,
            settlement.total_pool,
            settlement.platform_fee,
            settlement.winners_count,
            settlement.total_payout
        );
        Ok(settlement)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::{MarketSettings, RetrySettings};
    use crate::db::SQLite;
    use chrono::{Duration, Utc};
    use futures_util::future::join_all;
    use rust_decimal_macros::dec;
    use sqlx::query;

    fn bet(id: RowId, user: UserId, option: &str, amount: Cents) -> Bet {
        Bet {
            id,
            user,
            prediction: 1,
            option: option.into(),
            amount,
            created_at: Utc::now(),
        }
    }
    fn amounts(plan: &SettlementPlan) -> Vec<(UserId, Cents)> {
        plan.payouts.iter().map(|p| (p.user, p.amount)).collect()
    }
    async fn market(bets: &[(UserId, usize, Cents)]) -> (Pozo, sqlx::SqlitePool, RowId) {
        let db = SQLite::new(None).await.unwrap();
        let pool = db.pool().clone();
        let pozo = Pozo::new(
            Box::new(db),
            MarketSettings {
                allow_balance_adjustments: true,
                ..Default::default()
            },
            RetrySettings::default(),
        );
        let prediction = pozo
            .new_prediction(
                "Will it rain tomorrow?".into(),
                vec!["Yes".into(), "No".into()],
                1000,
                Utc::now() + Duration::days(1),
            )
            .await
            .unwrap();
        for (user, option, amount) in bets {
            pozo.adjust_balance(*user, 100000, None).await.unwrap();
            pozo.place_bet(*user, prediction, *option, *amount)
                .await
                .unwrap();
        }
        (pozo, pool, prediction)
    }

    async fn ledger_rows(pool: &sqlx::SqlitePool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM ledger_transactions")
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    fn winners_split_the_pot_minus_fee() {
        let bets = [bet(1, 1, "Yes", 10000), bet(2, 2, "No", 5000), bet(3, 3, "Yes", 5000)];
        let plan = plan_settlement(1, &bets, "Yes", dec!(0.05)).unwrap();
        assert_eq!(plan.settlement.kind, SettlementKind::Payout);
        assert_eq!(plan.settlement.total_pool, 20000);
        assert_eq!(plan.settlement.platform_fee, 1000);
        assert_eq!(plan.settlement.winners_count, 2);
        assert_eq!(plan.settlement.total_payout, 19000);
        assert_eq!(amounts(&plan), vec![(1, 12667), (3, 6333)]);
        assert_eq!(plan.payouts[0].share.unwrap().round_dp(4), dec!(0.6667));
        assert!(plan.payouts.iter().all(|p| p.kind == TxKind::PredictionWin));
    }
    #[test]
    fn single_winner_takes_the_payout_pool() {
        let bets = [bet(1, 1, "Yes", 10000), bet(2, 2, "No", 5000), bet(3, 3, "Yes", 5000)];
        let plan = plan_settlement(1, &bets, "No", dec!(0.05)).unwrap();
        assert_eq!(amounts(&plan), vec![(2, 19000)]);
        assert_eq!(plan.payouts[0].share, Some(Decimal::ONE));
        assert_eq!(plan.settlement.winners_count, 1);
    }
    #[test]
    fn nobody_on_the_winner_refunds_everyone() {
        let bets = [bet(1, 1, "Yes", 10000), bet(2, 2, "Yes", 333)];
        let plan = plan_settlement(1, &bets, "No", dec!(0.05)).unwrap();
        assert_eq!(plan.settlement.kind, SettlementKind::Refund);
        assert_eq!(plan.settlement.winners_count, 0);
        assert_eq!(amounts(&plan), vec![(1, 9500), (2, 316)]);
        assert_eq!(plan.settlement.total_payout, 9816);
        assert_eq!(plan.settlement.platform_fee, 517);
        assert!(plan.payouts.iter().all(|p| p.kind == TxKind::PredictionRefund));
    }
    #[test]
    fn empty_pot_pays_nothing() {
        let plan = plan_settlement(1, &[], "No", dec!(0.05)).unwrap();
        assert_eq!(plan.settlement.kind, SettlementKind::Empty);
        assert!(plan.payouts.is_empty());
        assert_eq!(plan.settlement.total_payout, 0);
        assert_eq!(plan.settlement.platform_fee, 0);
    }
    #[test]
    fn plan_does_not_depend_on_input_order() {
        let bets = [bet(3, 3, "Yes", 1), bet(1, 1, "Yes", 1), bet(2, 2, "Yes", 1)];
        let plan = plan_settlement(1, &bets, "Yes", Decimal::ZERO).unwrap();
        assert_eq!(amounts(&plan), vec![(1, 1), (2, 1), (3, 1)]);
        // 2 cents over 3 equal stakes go to the lowest ids
        let plan = plan_settlement(1, &bets, "Yes", dec!(0.3)).unwrap();
        assert_eq!(amounts(&plan), vec![(1, 1), (2, 1)]);
        assert_eq!(plan.settlement.winners_count, 3);
    }
    #[test]
    fn payouts_never_exceed_the_pool() {
        let bets: Vec<Bet> = (1..=50)
            .map(|id| bet(id, id, if id % 3 == 0 { "No" } else { "Yes" }, id * 37 + 11))
            .collect();
        for fee_rate in [dec!(0), dec!(0.01), dec!(0.05), dec!(0.333), dec!(1)] {
            for option in ["Yes", "No", "Maybe"] {
                let plan = plan_settlement(1, &bets, option, fee_rate).unwrap();
                let paid: Cents = plan.payouts.iter().map(|p| p.amount).sum();
                assert_eq!(paid, plan.settlement.total_payout);
                assert!(paid <= plan.settlement.total_pool);
                assert!(plan.settlement.platform_fee >= 0);
            }
        }
    }
    #[test]
    fn fee_rate_out_of_range_is_refused() {
        assert!(matches!(
            plan_settlement(1, &[], "Yes", dec!(1.5)),
            Err(MarketError::InvalidFeeRate(_))
        ));
    }

    #[tokio::test]
    async fn pays_winners_proportionally() {
        let (pozo, _, prediction) = market(&[(1, 0, 10000), (2, 1, 5000), (3, 0, 5000)]).await;
        let settlement = pozo.resolve(prediction, 0, Some(dec!(0.05))).await.unwrap();
        assert_eq!(settlement.winners_count, 2);
        assert_eq!(settlement.total_payout, 19000);
        assert_eq!(settlement.platform_fee, 1000);
        assert_eq!(pozo.get_balance(1).await.unwrap(), 100000 - 10000 + 12667);
        assert_eq!(pozo.get_balance(2).await.unwrap(), 100000 - 5000);
        assert_eq!(pozo.get_balance(3).await.unwrap(), 100000 - 5000 + 6333);
        let win = pozo.get_transactions(1).await.unwrap().pop().unwrap();
        assert_eq!(win.kind, TxKind::PredictionWin);
        assert_eq!(win.prediction, Some(prediction));
        assert!(win.bet.is_some());
        assert_eq!(win.share.unwrap().round_dp(2), dec!(0.67));
        let state = pozo.get_prediction(prediction).await.unwrap();
        assert!(state.resolved);
        assert_eq!(state.winning_option.as_deref(), Some("Yes"));
        assert!(state.resolved_at.is_some());
    }
    #[tokio::test]
    async fn single_winner_takes_payout_pool() {
        let (pozo, _, prediction) = market(&[(1, 0, 10000), (2, 1, 5000), (3, 0, 5000)]).await;
        let settlement = pozo.resolve(prediction, 1, Some(dec!(0.05))).await.unwrap();
        assert_eq!(settlement.winners_count, 1);
        assert_eq!(settlement.total_payout, 19000);
        assert_eq!(pozo.get_balance(2).await.unwrap(), 100000 - 5000 + 19000);
        assert_eq!(pozo.get_balance(1).await.unwrap(), 90000);
    }
    #[tokio::test]
    async fn refunds_all_bettors_without_winners() {
        let (pozo, _, prediction) = market(&[(1, 0, 10000), (2, 0, 5000)]).await;
        let settlement = pozo.resolve(prediction, 1, None).await.unwrap();
        assert_eq!(settlement.kind, SettlementKind::Refund);
        assert_eq!(settlement.winners_count, 0);
        assert_eq!(settlement.total_payout, 14250);
        assert_eq!(pozo.get_balance(1).await.unwrap(), 90000 + 9500);
        assert_eq!(pozo.get_balance(2).await.unwrap(), 95000 + 4750);
        let refund = pozo.get_transactions(2).await.unwrap().pop().unwrap();
        assert_eq!(refund.kind, TxKind::PredictionRefund);
        assert_eq!(refund.share, None);
    }
    #[tokio::test]
    async fn empty_market_resolves_without_money_moving() {
        let (pozo, pool, prediction) = market(&[]).await;
        let settlement = pozo.resolve(prediction, 0, None).await.unwrap();
        assert_eq!(settlement.kind, SettlementKind::Empty);
        assert_eq!(ledger_rows(&pool).await, 0);
        assert!(pozo.get_prediction(prediction).await.unwrap().resolved);
    }
    #[tokio::test]
    async fn second_resolve_changes_nothing() {
        let (pozo, pool, prediction) = market(&[(1, 0, 10000), (2, 1, 5000)]).await;
        pozo.resolve(prediction, 0, None).await.unwrap();
        let before = ledger_rows(&pool).await;
        assert!(matches!(
            pozo.resolve(prediction, 1, None).await,
            Err(MarketError::AlreadyResolved(_))
        ));
        assert_eq!(ledger_rows(&pool).await, before);
        let state = pozo.get_prediction(prediction).await.unwrap();
        assert_eq!(state.winning_option.as_deref(), Some("Yes"));
    }
    #[tokio::test]
    async fn concurrent_resolves_settle_once() {
        let (pozo, _, prediction) = market(&[(1, 0, 10000), (2, 1, 5000), (3, 0, 5000)]).await;
        let results = join_all((0..8).map(|i| pozo.resolve(prediction, i % 2, None))).await;
        let settled = results.iter().filter(|r| r.is_ok()).count();
        let refused = results
            .iter()
            .filter(|r| matches!(r, Err(MarketError::AlreadyResolved(_))))
            .count();
        assert_eq!((settled, refused), (1, 7));
        let paid: Cents = join_all([1, 2, 3].map(|user| pozo.get_balance(user)))
            .await
            .into_iter()
            .map(Result::unwrap)
            .sum();
        // three users started with 100000 each, the platform kept the 5% fee
        assert_eq!(paid, 300000 - 1000);
    }
    #[tokio::test]
    async fn failed_payout_rolls_the_resolution_back() {
        let (pozo, pool, prediction) = market(&[(1, 0, 10000), (2, 1, 5000), (3, 0, 5000)]).await;
        let bets = pozo
            .get_bets(PredictionUserRequest {
                prediction: Some(prediction),
                user: Some(3),
            })
            .await
            .unwrap();
        // a stray win row for the last winner makes its credit collide
        query(
            "INSERT INTO ledger_transactions (user_id, amount, kind, prediction, bet, created_at) \
            VALUES (3, 0, 'prediction_win', ?, ?, 0)",
        )
        .bind(prediction)
        .bind(bets[0].id)
        .execute(&pool)
        .await
        .unwrap();
        let before = pozo.get_prediction(prediction).await.unwrap();
        assert!(pozo.resolve(prediction, 0, None).await.is_err());
        assert_eq!(pozo.get_prediction(prediction).await.unwrap(), before);
        // the first winner's credit was rolled back with everything else
        assert_eq!(pozo.get_balance(1).await.unwrap(), 90000);
        assert_eq!(pozo.get_balance(3).await.unwrap(), 95000);
    }
    #[tokio::test]
    async fn resolve_validates_before_touching_storage() {
        let (pozo, _, prediction) = market(&[(1, 0, 10000)]).await;
        assert!(matches!(
            pozo.resolve(prediction + 1, 0, None).await,
            Err(MarketError::NotFound(_))
        ));
        assert!(matches!(
            pozo.resolve(prediction, 2, None).await,
            Err(MarketError::InvalidOption { option: 2, .. })
        ));
        assert!(matches!(
            pozo.resolve(prediction, 0, Some(dec!(-0.1))).await,
            Err(MarketError::InvalidFeeRate(_))
        ));
        assert!(!pozo.get_prediction(prediction).await.unwrap().resolved);
    }
}
