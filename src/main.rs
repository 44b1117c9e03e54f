use crate::api::*;
use crate::config::Settings;
use crate::db::SQLite;
use crate::error::map_market_err;
use crate::pozo::Pozo;
use anyhow::{Context, Result};
use axum::extract::{Json, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use axum_macros::debug_handler;
use clap::Parser;
use env_logger::{Builder, WriteStyle};
use log::{error, info, LevelFilter};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;

mod api;
#[cfg(test)]
mod client;
mod config;
mod db;
mod error;
mod ledger;
mod math;
mod pozo;
mod registry;
mod settlement;
mod wager;

#[debug_handler]
async fn new_prediction(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<NewPredictionRequest>,
) -> Result<(StatusCode, Json<RowId>), (StatusCode, String)> {
    let id = state
        .new_prediction(
            request.title,
            request.options,
            request.entry_fee,
            request.ends_at,
        )
        .await
        .map_err(map_market_err)?;
    Ok((StatusCode::CREATED, Json(id)))
}
async fn get_predictions(
    State(state): State<Arc<Pozo>>,
    Query(filter): Query<PredictionFilter>,
) -> Result<Json<Vec<Prediction>>, (StatusCode, String)> {
    let predictions = state
        .get_predictions(filter)
        .await
        .map_err(map_market_err)?;
    Ok(Json(predictions))
}
async fn get_prediction(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<Prediction>, (StatusCode, String)> {
    let prediction = state
        .get_prediction(request.prediction)
        .await
        .map_err(map_market_err)?;
    Ok(Json(prediction))
}
async fn get_market_state(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<PredictionRequest>,
) -> Result<Json<MarketStateResponse>, (StatusCode, String)> {
    let market = state
        .get_market_state(request.prediction)
        .await
        .map_err(map_market_err)?;
    Ok(Json(market))
}
#[debug_handler]
async fn place_bet(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<PlaceBetRequest>,
) -> Result<(StatusCode, Json<Bet>), (StatusCode, String)> {
    let bet = state
        .place_bet(
            request.user,
            request.prediction,
            request.option,
            request.amount,
        )
        .await
        .map_err(map_market_err)?;
    Ok((StatusCode::CREATED, Json(bet)))
}
#[debug_handler]
async fn resolve(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<Settlement>, (StatusCode, String)> {
    let settlement = state
        .resolve(request.prediction, request.winning_option, request.fee_rate)
        .await
        .map_err(map_market_err)?;
    Ok(Json(settlement))
}
async fn get_bets(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<PredictionUserRequest>,
) -> Result<Json<Vec<Bet>>, (StatusCode, String)> {
    let bets = state.get_bets(request).await.map_err(map_market_err)?;
    Ok(Json(bets))
}
async fn get_balance(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<UserRequest>,
) -> Result<Json<BalanceResponse>, (StatusCode, String)> {
    let balance = state
        .get_balance(request.user)
        .await
        .map_err(map_market_err)?;
    Ok(Json(BalanceResponse {
        user: request.user,
        balance,
    }))
}
async fn get_transactions(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<UserRequest>,
) -> Result<Json<Vec<LedgerTransaction>>, (StatusCode, String)> {
    let transactions = state
        .get_transactions(request.user)
        .await
        .map_err(map_market_err)?;
    Ok(Json(transactions))
}
async fn adjust_balance(
    State(state): State<Arc<Pozo>>,
    Json(request): Json<AdjustBalanceRequest>,
) -> Result<(StatusCode, Json<LedgerTransaction>), (StatusCode, String)> {
    let transaction = state
        .adjust_balance(request.user, request.amount, request.memo)
        .await
        .map_err(map_market_err)?;
    Ok((StatusCode::CREATED, Json(transaction)))
}

#[derive(Parser)]
struct Args {
    /// TOML file with settings, defaults to ./pozo.toml when present
    #[arg(short, long)]
    config: Option<String>,
    #[arg(short, long)]
    port: Option<u16>,
    /// Allows balance adjustments
    #[arg(short, long)]
    test: bool,
    /// SQLite url or file, in-memory when not given
    #[arg(short, long)]
    db: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    if cli.db.is_some() {
        settings.database.url = cli.db;
    }
    if cli.test {
        settings.market.allow_balance_adjustments = true;
    }
    Builder::default()
        .filter_level(
            LevelFilter::from_str(&settings.log_level)
                .with_context(|| format!("unknown log level {}", settings.log_level))?,
        )
        .write_style(WriteStyle::Always)
        .init();
    let port = settings.server.port;
    let (_port, handle) = run_server(Some(port), settings).await?;
    handle.await?;
    Ok(())
}

fn router(state: Arc<Pozo>) -> Router {
    Router::new()
        .route("/new_prediction", post(new_prediction))
        .route("/get_predictions", get(get_predictions))
        .route("/get_prediction", post(get_prediction))
        .route("/get_market_state", post(get_market_state))
        .route("/place_bet", post(place_bet))
        .route("/resolve", post(resolve))
        .route("/get_bets", post(get_bets))
        .route("/get_balance", post(get_balance))
        .route("/get_transactions", post(get_transactions))
        .route("/adjust_balance", post(adjust_balance))
        .with_state(state)
}

async fn run_server(port: Option<u16>, settings: Settings) -> Result<(u16, JoinHandle<()>)> {
    let db = SQLite::connect(&settings.database).await?;
    let state = Arc::new(Pozo::new(Box::new(db), settings.market, settings.retry));
    let app = router(state);
    let addr = SocketAddr::from_str(&format!("{}:{}", settings.server.host, port.unwrap_or(0)))
        .with_context(|| format!("invalid listen address {}", settings.server.host))?;
    let server = axum::Server::try_bind(&addr)?.serve(app.into_make_service());
    let port = server.local_addr().port();
    info!("Listening on {}", server.local_addr());
    let handle = tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Server stopped: {}", e);
        }
    });
    Ok((port, handle))
}
