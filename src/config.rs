use crate::error::TradeError;
use crate::models::Security;
use crate::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const CONFIG_FILE: &str = "spreadbot";
const ENV_PREFIX: &str = "SPREADBOT";

/// Where durable scratch state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Redis,
}

/// Runtime settings
///
/// Layered from serde defaults, an optional `spreadbot.toml` and
/// `SPREADBOT_*` environment variables (e.g. `SPREADBOT_SPREAD_PERCENT=0.01`).
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Buy this fraction below market and sell this fraction above the fill
    #[serde(default = "default_spread_percent")]
    pub spread_percent: f64,
    /// Cash to spend per cycle; falls back to account buying power
    #[serde(default)]
    pub spec_cash: Option<f64>,
    /// Skip volatility ranking and always trade this security
    #[serde(default)]
    pub pinned_security: Option<String>,

    #[serde(default = "default_buy_timeout_secs")]
    pub buy_timeout_secs: u64,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_deadline_extension_secs")]
    pub deadline_extension_secs: u64,
    #[serde(default = "default_insufficient_holdings_delay_secs")]
    pub insufficient_holdings_delay_secs: u64,
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    #[serde(default = "default_max_increment_retries")]
    pub max_increment_retries: u32,

    #[serde(default = "default_candidates")]
    pub candidates: Vec<String>,
    #[serde(default = "default_volatility_window_minutes")]
    pub volatility_window_minutes: u64,
    #[serde(default = "default_ceiling_lookback_minutes")]
    pub ceiling_lookback_minutes: u64,
    #[serde(default = "default_max_bid_fraction")]
    pub max_bid_fraction: f64,
    #[serde(default = "default_quantity_decimals")]
    pub quantity_decimals: u32,

    #[serde(default = "default_broker_base_url")]
    pub broker_base_url: String,
    #[serde(default)]
    pub broker_api_token: String,
    #[serde(default = "default_broker_requests_per_minute")]
    pub broker_requests_per_minute: u32,

    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,
    #[serde(default = "std::env::temp_dir")]
    pub store_dir: PathBuf,
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    #[serde(default = "default_max_upstream_retries")]
    pub max_upstream_retries: u32,

    #[serde(default = "default_ma_short_window")]
    pub ma_short_window: usize,
    #[serde(default = "default_ma_long_window")]
    pub ma_long_window: usize,
    #[serde(default = "default_ma_buy_timeout_secs")]
    pub ma_buy_timeout_secs: u64,
    #[serde(default = "default_ma_poll_interval_secs")]
    pub ma_poll_interval_secs: u64,
    #[serde(default = "default_ma_cycle_secs")]
    pub ma_cycle_secs: u64,

    #[serde(default = "default_sim_ticks")]
    pub sim_ticks: usize,
    #[serde(default = "default_sim_initial_cash")]
    pub sim_initial_cash: f64,
}

fn default_spread_percent() -> f64 {
    0.0051
}
fn default_buy_timeout_secs() -> u64 {
    22 * 60
}
fn default_poll_interval_secs() -> u64 {
    10
}
fn default_deadline_extension_secs() -> u64 {
    180
}
fn default_insufficient_holdings_delay_secs() -> u64 {
    5
}
fn default_settle_delay_secs() -> u64 {
    15
}
fn default_max_increment_retries() -> u32 {
    8
}
fn default_candidates() -> Vec<String> {
    ["LTC", "ETC", "ETH", "BCH", "BSV", "BTC"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_volatility_window_minutes() -> u64 {
    45
}
fn default_ceiling_lookback_minutes() -> u64 {
    6 * 60
}
fn default_max_bid_fraction() -> f64 {
    0.999
}
fn default_quantity_decimals() -> u32 {
    8
}
fn default_broker_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}
fn default_broker_requests_per_minute() -> u32 {
    60
}
fn default_store_backend() -> StoreBackend {
    StoreBackend::File
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_max_upstream_retries() -> u32 {
    5
}
fn default_ma_short_window() -> usize {
    12 // 1 hour of 5-minute bars
}
fn default_ma_long_window() -> usize {
    12 * 6
}
fn default_ma_buy_timeout_secs() -> u64 {
    800
}
fn default_ma_poll_interval_secs() -> u64 {
    15
}
fn default_ma_cycle_secs() -> u64 {
    300
}
fn default_sim_ticks() -> usize {
    12 * 120
}
fn default_sim_initial_cash() -> f64 {
    50.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            spread_percent: default_spread_percent(),
            spec_cash: None,
            pinned_security: None,
            buy_timeout_secs: default_buy_timeout_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            deadline_extension_secs: default_deadline_extension_secs(),
            insufficient_holdings_delay_secs: default_insufficient_holdings_delay_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            max_increment_retries: default_max_increment_retries(),
            candidates: default_candidates(),
            volatility_window_minutes: default_volatility_window_minutes(),
            ceiling_lookback_minutes: default_ceiling_lookback_minutes(),
            max_bid_fraction: default_max_bid_fraction(),
            quantity_decimals: default_quantity_decimals(),
            broker_base_url: default_broker_base_url(),
            broker_api_token: String::new(),
            broker_requests_per_minute: default_broker_requests_per_minute(),
            store_backend: default_store_backend(),
            store_dir: std::env::temp_dir(),
            redis_url: default_redis_url(),
            max_upstream_retries: default_max_upstream_retries(),
            ma_short_window: default_ma_short_window(),
            ma_long_window: default_ma_long_window(),
            ma_buy_timeout_secs: default_ma_buy_timeout_secs(),
            ma_poll_interval_secs: default_ma_poll_interval_secs(),
            ma_cycle_secs: default_ma_cycle_secs(),
            sim_ticks: default_sim_ticks(),
            sim_initial_cash: default_sim_initial_cash(),
        }
    }
}

impl Settings {
    /// Load settings from `spreadbot.toml` (optional) and the environment
    pub fn load() -> Result<Self> {
        let settings: Settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("candidates"),
            )
            .build()?
            .try_deserialize()?;

        settings.normalized().validate()
    }

    /// Spread and cash are taken as magnitudes, like the command line always allowed
    fn normalized(mut self) -> Self {
        self.spread_percent = self.spread_percent.abs();
        self.spec_cash = self.spec_cash.map(f64::abs);
        self
    }

    pub fn validate(self) -> Result<Self> {
        if !(self.spread_percent > 0.0 && self.spread_percent < 1.0) {
            return Err(TradeError::Config(format!(
                "spread_percent must be in (0, 1), got {}",
                self.spread_percent
            )));
        }
        if self.poll_interval_secs == 0 || self.ma_poll_interval_secs == 0 {
            return Err(TradeError::Config(
                "poll intervals must be positive".to_string(),
            ));
        }
        if self.candidates.is_empty() {
            return Err(TradeError::Config("candidate list is empty".to_string()));
        }
        if self.ma_short_window == 0 || self.ma_long_window == 0 {
            return Err(TradeError::Config(
                "moving average windows must be positive".to_string(),
            ));
        }
        if let Some(pinned) = self.pinned() {
            if !self.candidate_securities().contains(&pinned) {
                return Err(TradeError::Config(format!(
                    "pinned security {} not in {:?}",
                    pinned, self.candidates
                )));
            }
        }
        Ok(self)
    }

    pub fn candidate_securities(&self) -> Vec<Security> {
        self.candidates.iter().map(|s| Security::new(s.as_str())).collect()
    }

    pub fn pinned(&self) -> Option<Security> {
        self.pinned_security
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(Security::new)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn buy_timeout(&self) -> Duration {
        Duration::from_secs(self.buy_timeout_secs)
    }

    pub fn deadline_extension(&self) -> Duration {
        Duration::from_secs(self.deadline_extension_secs)
    }

    pub fn insufficient_holdings_delay(&self) -> Duration {
        Duration::from_secs(self.insufficient_holdings_delay_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default().validate().unwrap();
        assert_eq!(settings.spread_percent, 0.0051);
        assert_eq!(settings.buy_timeout(), Duration::from_secs(1320));
        assert_eq!(settings.candidate_securities().len(), 6);
        assert!(settings.pinned().is_none());
    }

    #[test]
    fn test_pinned_security_must_be_a_candidate() {
        let settings = Settings {
            pinned_security: Some("DOGE".to_string()),
            ..Settings::default()
        };
        assert!(matches!(settings.validate(), Err(TradeError::Config(_))));

        let settings = Settings {
            pinned_security: Some("btc".to_string()),
            ..Settings::default()
        };
        let settings = settings.validate().unwrap();
        assert_eq!(settings.pinned(), Some(Security::from("BTC")));
    }

    #[test]
    fn test_spread_is_taken_as_magnitude() {
        let settings = Settings {
            spread_percent: -0.01,
            spec_cash: Some(-25.0),
            ..Settings::default()
        }
        .normalized();
        assert_eq!(settings.spread_percent, 0.01);
        assert_eq!(settings.spec_cash, Some(25.0));
    }

    #[test]
    fn test_rejects_out_of_range_spread() {
        let settings = Settings {
            spread_percent: 1.5,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
