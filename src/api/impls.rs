use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use anyhow::bail;

use super::*;

impl Display for TxKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::PredictionBet => "prediction_bet",
            Self::PredictionWin => "prediction_win",
            Self::PredictionRefund => "prediction_refund",
        };
        write!(f, "{}", output)
    }
}
impl FromStr for TxKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "withdrawal" => Ok(Self::Withdrawal),
            "prediction_bet" => Ok(Self::PredictionBet),
            "prediction_win" => Ok(Self::PredictionWin),
            "prediction_refund" => Ok(Self::PredictionRefund),
            e => bail!("Couldn't deserialize to TxKind: {}", e),
        }
    }
}
impl Display for SettlementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let output = match self {
            Self::Payout => "Payout",
            Self::Refund => "Refund",
            Self::Empty => "Empty",
        };
        write!(f, "{}", output)
    }
}
