use crate::api::*;
use crate::error::{MarketError, Result};
use crate::pozo::Pozo;
use chrono::{DateTime, Utc};
use log::debug;
use std::collections::HashSet;

impl Pozo {
    pub async fn new_prediction(
        &self,
        title: String,
        options: Vec<String>,
        entry_fee: Cents,
        ends_at: DateTime<Utc>,
    ) -> Result<RowId> {
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(MarketError::InvalidPrediction("title is empty".into()));
        }
        if options.len() < 2 {
            return Err(MarketError::InvalidPrediction(format!(
                "needs at least 2 options, got {}",
                options.len()
            )));
        }
        let mut labels = HashSet::new();
        for option in &options {
            if option.trim().is_empty() {
                return Err(MarketError::InvalidPrediction("option label is empty".into()));
            }
            if !labels.insert(option.as_str()) {
                return Err(MarketError::InvalidPrediction(format!(
                    "option {} is listed twice",
                    option
                )));
            }
        }
        if entry_fee < 0 {
            return Err(MarketError::InvalidPrediction(format!(
                "entry fee {} is negative",
                entry_fee
            )));
        }
        if ends_at <= Utc::now() {
            return Err(MarketError::InvalidPrediction(format!(
                "ends at {} which already passed",
                ends_at
            )));
        }
        let id = self
            .db
            .add_prediction(NewPredictionRequest {
                title,
                options,
                entry_fee,
                ends_at,
            })
            .await?;
        debug!("Created prediction {} ending at {}", id, ends_at);
        Ok(id)
    }
    pub async fn get_prediction(&self, prediction: RowId) -> Result<Prediction> {
        self.db.get_prediction(prediction).await
    }
    pub async fn get_predictions(&self, filter: PredictionFilter) -> Result<Vec<Prediction>> {
        self.db.get_predictions(filter).await
    }
}
