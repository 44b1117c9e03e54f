use anyhow::Result;
use api::*;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use crate::client::Client;

mod api;
mod client;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    #[arg(short, long, default_value = "http://127.0.0.1:8081")]
    url: String,
}
/// Amounts are given in coins, e.g. `12.50`.
#[derive(Subcommand)]
enum Commands {
    NewPrediction {
        #[arg(short, long)]
        title: String,
        /// Repeat once per option, in order
        #[arg(short, long, required = true)]
        option: Vec<String>,
        #[arg(short, long, default_value = "0")]
        entry_fee: Decimal,
        /// RFC 3339, e.g. 2026-12-31T23:59:59Z
        #[arg(long)]
        ends_at: DateTime<Utc>,
    },
    GetPredictions {
        #[arg(short, long)]
        resolved: Option<bool>,
    },
    GetPrediction {
        #[arg(short, long)]
        prediction: RowId,
    },
    PlaceBet {
        #[arg(short, long)]
        user: UserId,
        #[arg(short, long)]
        prediction: RowId,
        /// Index into the prediction's options
        #[arg(short, long)]
        option: usize,
        #[arg(short, long)]
        amount: Decimal,
    },
    Resolve {
        #[arg(short, long)]
        prediction: RowId,
        #[arg(short, long)]
        winning_option: usize,
        /// Defaults to the server's fee rate
        #[arg(short, long)]
        fee_rate: Option<Decimal>,
    },
    GetBets {
        #[arg(short, long)]
        prediction: Option<RowId>,
        #[arg(short, long)]
        user: Option<UserId>,
    },
    GetBalance {
        #[arg(short, long)]
        user: UserId,
    },
    AdjustBalance {
        #[arg(short, long)]
        user: UserId,
        /// Negative to withdraw
        #[arg(short, long, allow_negative_numbers = true)]
        amount: Decimal,
        #[arg(short, long)]
        memo: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    let client = Client::new(cli.url);

    match cli.command {
        Commands::NewPrediction {
            title,
            option,
            entry_fee,
            ends_at,
        } => {
            let request = NewPredictionRequest {
                title,
                options: option,
                entry_fee: to_cents(entry_fee)?,
                ends_at,
            };
            let id = client.new_prediction(request).await?;
            println!("Created new prediction: {}", id);
        }
        Commands::GetPredictions { resolved } => {
            let response = client
                .get_predictions(PredictionFilter { resolved })
                .await?;
            println!("{:#?}", response);
        }
        Commands::GetPrediction { prediction } => {
            let request = PredictionRequest { prediction };
            let response = client.get_prediction(request.clone()).await?;
            println!("{:#?}", response);
            let state = client.get_market_state(request).await?;
            println!("Pot: {}", from_cents(state.pot));
            for total in state.option_totals {
                println!("  {}: {}", total.option, from_cents(total.total));
            }
        }
        Commands::PlaceBet {
            user,
            prediction,
            option,
            amount,
        } => {
            let request = PlaceBetRequest {
                user,
                prediction,
                option,
                amount: to_cents(amount)?,
            };
            let bet = client.place_bet(request).await?;
            println!("Placed bet {} of {} on {}", bet.id, from_cents(bet.amount), bet.option);
        }
        Commands::Resolve {
            prediction,
            winning_option,
            fee_rate,
        } => {
            let request = ResolveRequest {
                prediction,
                winning_option,
                fee_rate,
            };
            let settlement = client.resolve(request).await?;
            println!(
                "{} won ({}): paid {} to {} winners, fee {}",
                settlement.winning_option,
                settlement.kind,
                from_cents(settlement.total_payout),
                settlement.winners_count,
                from_cents(settlement.platform_fee)
            );
        }
        Commands::GetBets { prediction, user } => {
            let response = client
                .get_bets(PredictionUserRequest { prediction, user })
                .await?;
            println!("{:#?}", response);
        }
        Commands::GetBalance { user } => {
            let response = client.get_balance(UserRequest { user }).await?;
            println!("Balance: {}", from_cents(response.balance));
            let transactions = client.get_transactions(UserRequest { user }).await?;
            for tx in transactions {
                println!(
                    "  {} {:>12} {}",
                    tx.created_at,
                    from_cents(tx.amount),
                    tx.kind
                );
            }
        }
        Commands::AdjustBalance { user, amount, memo } => {
            let request = AdjustBalanceRequest {
                user,
                amount: to_cents(amount)?,
                memo,
            };
            let tx = client.adjust_balance(request).await?;
            println!("Recorded {} of {}", tx.kind, from_cents(tx.amount));
        }
    }
    Ok(())
}
