use anyhow::{bail, Result};
use reqwest::{Response, StatusCode};
use serde::Serialize;

use crate::api::*;

#[derive(Debug, Clone)]
pub struct Client {
    url: String,
    client: reqwest::Client,
}
impl Client {
    pub fn new(url: String) -> Self {
        let client = reqwest::Client::new();
        Self { url, client }
    }
    async fn post(
        &self,
        path: &'static str,
        request: impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .post(self.url.clone() + path)
            .json(&request)
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    async fn get(
        &self,
        path: &'static str,
        query: impl Serialize,
        expected_code: StatusCode,
    ) -> Result<Response> {
        let response = self
            .client
            .get(self.url.clone() + path)
            .query(&query)
            .send()
            .await?;
        bail_if_err(response, expected_code).await
    }
    pub async fn new_prediction(&self, request: NewPredictionRequest) -> Result<RowId> {
        let response = self
            .post("/new_prediction", request, StatusCode::CREATED)
            .await?;
        Ok(response.json::<RowId>().await?)
    }
    pub async fn get_predictions(&self, filter: PredictionFilter) -> Result<Vec<Prediction>> {
        let response = self.get("/get_predictions", filter, StatusCode::OK).await?;
        Ok(response.json::<Vec<Prediction>>().await?)
    }
    pub async fn get_prediction(&self, request: PredictionRequest) -> Result<Prediction> {
        let response = self
            .post("/get_prediction", request, StatusCode::OK)
            .await?;
        Ok(response.json::<Prediction>().await?)
    }
    pub async fn get_market_state(&self, request: PredictionRequest) -> Result<MarketStateResponse> {
        let response = self
            .post("/get_market_state", request, StatusCode::OK)
            .await?;
        Ok(response.json::<MarketStateResponse>().await?)
    }
    pub async fn place_bet(&self, request: PlaceBetRequest) -> Result<Bet> {
        let response = self
            .post("/place_bet", request, StatusCode::CREATED)
            .await?;
        Ok(response.json::<Bet>().await?)
    }
    pub async fn resolve(&self, request: ResolveRequest) -> Result<Settlement> {
        let response = self.post("/resolve", request, StatusCode::OK).await?;
        Ok(response.json::<Settlement>().await?)
    }
    pub async fn get_bets(&self, request: PredictionUserRequest) -> Result<Vec<Bet>> {
        let response = self.post("/get_bets", request, StatusCode::OK).await?;
        Ok(response.json::<Vec<Bet>>().await?)
    }
    pub async fn get_balance(&self, request: UserRequest) -> Result<BalanceResponse> {
        let response = self.post("/get_balance", request, StatusCode::OK).await?;
        Ok(response.json::<BalanceResponse>().await?)
    }
    pub async fn get_transactions(&self, request: UserRequest) -> Result<Vec<LedgerTransaction>> {
        let response = self
            .post("/get_transactions", request, StatusCode::OK)
            .await?;
        Ok(response.json::<Vec<LedgerTransaction>>().await?)
    }
    pub async fn adjust_balance(&self, request: AdjustBalanceRequest) -> Result<LedgerTransaction> {
        let response = self
            .post("/adjust_balance", request, StatusCode::CREATED)
            .await?;
        Ok(response.json::<LedgerTransaction>().await?)
    }
}

async fn bail_if_err(response: Response, expected_code: StatusCode) -> Result<Response> {
    if response.status() != expected_code {
        bail!("{}: {}", response.status(), response.text().await?)
    } else {
        Ok(response)
    }
}
