use serde::{Deserialize, Serialize};

use super::*;

#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Eq)]
pub struct MarketStateResponse {
    pub prediction: RowId,
    pub pot: Cents,
    pub option_totals: Vec<OptionTotal>,
    pub resolved: bool,
    pub winning_option: Option<String>,
}
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Eq)]
pub struct BalanceResponse {
    pub user: UserId,
    pub balance: Cents,
}
