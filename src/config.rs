use anyhow::Result;
use config::{Config, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

const DEFAULT_CONFIG_FILE: &str = "pozo.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub market: MarketSettings,
    pub retry: RetrySettings,
    pub log_level: String,
}
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// In-memory database when unset.
    pub url: Option<String>,
    pub max_connections: u32,
    pub busy_timeout_ms: u64,
}
#[derive(Debug, Clone, Deserialize)]
pub struct MarketSettings {
    pub default_fee_rate: Decimal,
    pub allow_balance_adjustments: bool,
}
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Settings {
    /// Defaults, then the config file (if there is one), then `POZO__*` env vars.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = match path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8081)?
            .set_default("database.max_connections", 5)?
            .set_default("database.busy_timeout_ms", 5000)?
            .set_default("market.default_fee_rate", "0.05")?
            .set_default("market.allow_balance_adjustments", false)?
            .set_default("retry.max_attempts", 5)?
            .set_default("retry.base_delay_ms", 10)?
            .set_default("retry.max_delay_ms", 500)?
            .set_default("log_level", "info")?
            .add_source(file)
            .add_source(
                Environment::with_prefix("POZO")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }
}
impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
            busy_timeout_ms: 5000,
        }
    }
}
impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            default_fee_rate: dec!(0.05),
            allow_balance_adjustments: false,
        }
    }
}
impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 10,
            max_delay_ms: 500,
        }
    }
}
