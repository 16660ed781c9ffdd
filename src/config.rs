//! Configuration
//!
//! Layering, lowest priority first: preset defaults, `config.toml`, then
//! `ORACLE__SECTION__KEY` environment variables (after `.env` is loaded).

use crate::client::BatchConfig;
use crate::error::{OracleError, Result};
use crate::evaluation::WalkForwardConfig;
use ::config::builder::DefaultState;
use ::config::{ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Fifty liquid USDT pairs
pub const MAJOR_INSTRUMENTS: &[&str] = &[
    "BTCUSDT", "ETHUSDT", "BNBUSDT", "ADAUSDT", "XRPUSDT", "SOLUSDT", "DOTUSDT", "DOGEUSDT",
    "AVAXUSDT", "MATICUSDT", "LTCUSDT", "UNIUSDT", "LINKUSDT", "ATOMUSDT", "XLMUSDT", "BCHUSDT",
    "TRXUSDT", "ETCUSDT", "XMRUSDT", "EOSUSDT", "AAVEUSDT", "SUSHIUSDT", "COMPUSDT", "YFIUSDT",
    "SNXUSDT", "UMAUSDT", "CRVUSDT", "1INCHUSDT", "ALPHAUSDT", "ZRXUSDT", "BATUSDT", "DASHUSDT",
    "NEOUSDT", "VETUSDT", "ICXUSDT", "ONTUSDT", "QTUMUSDT", "NANOUSDT", "DGBUSDT", "SCUSDT",
    "ZILUSDT", "FTMUSDT", "NEARUSDT", "ALGOUSDT", "ICPUSDT", "THETAUSDT", "FLOWUSDT", "HBARUSDT",
    "EGLDUSDT", "XTZUSDT",
];

/// Long tail added on top of the majors for the `massive` preset
pub const EXTENDED_INSTRUMENTS: &[&str] = &[
    "CAKEUSDT", "MANAUSDT", "SANDUSDT", "AXSUSDT", "CHZUSDT", "ENJUSDT", "GALAUSDT", "ILVUSDT",
    "YGGUSDT", "SLPUSDT", "ALICEUSDT", "TLMUSDT", "REEFUSDT", "DENTUSDT", "HOTUSDT", "WINUSDT",
    "STMXUSDT", "KAVAUSDT", "BANDUSDT", "RENUSDT", "RVNUSDT", "STORJUSDT", "KNCUSDT", "LRCUSDT",
    "OMGUSDT", "ZENUSDT", "SKLUSDT", "GRTUSDT", "LINAUSDT", "ANKRUSDT", "OCEANUSDT", "DODOUSDT",
    "BELUSDT",
];

fn instruments(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Every known instrument, majors first
pub fn all_instruments() -> Vec<String> {
    MAJOR_INSTRUMENTS
        .iter()
        .chain(EXTENDED_INSTRUMENTS)
        .map(|s| s.to_string())
        .collect()
}

/// Named operating profiles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Focused,
    Advanced,
    Aggressive,
    Evolution,
    Massive,
}

impl Preset {
    pub fn instruments(&self) -> Vec<String> {
        match self {
            Preset::Focused | Preset::Advanced | Preset::Aggressive => instruments(MAJOR_INSTRUMENTS),
            Preset::Evolution => instruments(&MAJOR_INSTRUMENTS[..20]),
            Preset::Massive => all_instruments(),
        }
    }

    pub fn candle_limit(&self) -> u32 {
        match self {
            Preset::Focused | Preset::Aggressive => 500,
            Preset::Advanced => 1000,
            Preset::Evolution => 200,
            Preset::Massive => 100,
        }
    }

    pub fn train_fraction(&self) -> f64 {
        match self {
            Preset::Advanced | Preset::Aggressive => 0.7,
            Preset::Focused | Preset::Evolution | Preset::Massive => 0.8,
        }
    }

    pub fn admission_threshold(&self) -> f64 {
        match self {
            Preset::Focused | Preset::Advanced => 0.4,
            Preset::Aggressive | Preset::Evolution | Preset::Massive => 0.3,
        }
    }

    pub fn interval_secs(&self) -> u64 {
        match self {
            Preset::Focused => 30,
            Preset::Advanced => 60,
            Preset::Aggressive => 45,
            Preset::Evolution => 15,
            Preset::Massive => 120,
        }
    }

    pub fn batch_size(&self) -> Option<usize> {
        match self {
            Preset::Massive => Some(50),
            _ => None,
        }
    }

    fn apply_defaults(
        &self,
        builder: ConfigBuilder<DefaultState>,
    ) -> std::result::Result<ConfigBuilder<DefaultState>, ::config::ConfigError> {
        let mut builder = builder
            .set_default("cycle.instruments", self.instruments())?
            .set_default("cycle.interval_secs", self.interval_secs() as i64)?
            .set_default("market_data.limit", self.candle_limit() as i64)?
            .set_default("evaluation.train_fraction", self.train_fraction())?
            .set_default("evaluation.admission_threshold", self.admission_threshold())?;
        if let Some(batch_size) = self.batch_size() {
            builder = builder.set_default("market_data.batch_size", batch_size as i64)?;
        }
        Ok(builder)
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub market_data: MarketDataConfig,
    #[serde(default)]
    pub cycle: CycleSettings,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Profile whose values fill in anything not set explicitly
    #[serde(default)]
    pub preset: Option<Preset>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Candle interval (e.g., "1m")
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Candles requested per instrument per cycle
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_request_delay")]
    pub request_delay_ms: u64,
    #[serde(default = "default_batch_delay")]
    pub batch_delay_ms: u64,
}

fn default_base_url() -> String {
    crate::client::binance::DEFAULT_BASE_URL.to_string()
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_limit() -> u32 {
    500
}

fn default_request_timeout() -> u64 {
    10
}

fn default_batch_size() -> usize {
    10
}

fn default_request_delay() -> u64 {
    50
}

fn default_batch_delay() -> u64 {
    1000
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            interval: default_interval(),
            limit: default_limit(),
            request_timeout_secs: default_request_timeout(),
            batch_size: default_batch_size(),
            request_delay_ms: default_request_delay(),
            batch_delay_ms: default_batch_delay(),
        }
    }
}

impl MarketDataConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            batch_size: self.batch_size,
            request_delay: Duration::from_millis(self.request_delay_ms),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            request_timeout: self.request_timeout(),
        }
    }
}

/// Cycle schedule and universe
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CycleSettings {
    #[serde(default = "default_cycle_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_instruments")]
    pub instruments: Vec<String>,
}

fn default_cycle_interval() -> u64 {
    30
}

fn default_instruments() -> Vec<String> {
    instruments(MAJOR_INSTRUMENTS)
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_cycle_interval(),
            instruments: default_instruments(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvaluationConfig {
    #[serde(default = "default_train_fraction")]
    pub train_fraction: f64,
    #[serde(default = "default_admission_threshold")]
    pub admission_threshold: f64,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
}

fn default_train_fraction() -> f64 {
    0.8
}

fn default_admission_threshold() -> f64 {
    0.4
}

fn default_learning_rate() -> f64 {
    crate::engine::DEFAULT_LEARNING_RATE
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            train_fraction: default_train_fraction(),
            admission_threshold: default_admission_threshold(),
            learning_rate: default_learning_rate(),
        }
    }
}

impl EvaluationConfig {
    pub fn walk_forward(&self) -> WalkForwardConfig {
        WalkForwardConfig {
            train_fraction: self.train_fraction,
            admission_threshold: self.admission_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database file; `~` and `$VARS` are expanded
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "~/.candle-oracle/metrics.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match shellexpand::full(&self.path) {
            Ok(expanded) => PathBuf::from(expanded.as_ref()),
            Err(_) => PathBuf::from(shellexpand::tilde(&self.path).as_ref()),
        }
    }
}

fn file_and_env(
    builder: ConfigBuilder<DefaultState>,
    path: &str,
) -> ConfigBuilder<DefaultState> {
    builder
        .add_source(File::with_name(path).required(false))
        .add_source(
            Environment::with_prefix("ORACLE")
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("cycle.instruments")
                .try_parsing(true),
        )
}

impl Config {
    /// Load from file and environment
    pub fn load(path: &str) -> Result<Self> {
        Self::load_with_preset(path, None)
    }

    /// Load, letting `preset` (if any) override the one named in the file
    pub fn load_with_preset(path: &str, preset: Option<Preset>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let raw: Config = file_and_env(::config::Config::builder(), path)
            .build()?
            .try_deserialize()?;

        let config = match preset.or(raw.preset) {
            Some(preset) => {
                let builder = preset.apply_defaults(::config::Config::builder())?;
                let mut config: Config = file_and_env(builder, path).build()?.try_deserialize()?;
                config.preset = Some(preset);
                config
            }
            None => raw,
        };

        config.validate()?;
        Ok(config)
    }

    /// Config with a preset applied over the built-in defaults
    pub fn from_preset(preset: Preset) -> Self {
        let mut config = Config::default();
        config.preset = Some(preset);
        config.cycle.instruments = preset.instruments();
        config.cycle.interval_secs = preset.interval_secs();
        config.market_data.limit = preset.candle_limit();
        config.evaluation.train_fraction = preset.train_fraction();
        config.evaluation.admission_threshold = preset.admission_threshold();
        if let Some(batch_size) = preset.batch_size() {
            config.market_data.batch_size = batch_size;
        }
        config
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        let eval = &self.evaluation;
        if !(eval.train_fraction > 0.0 && eval.train_fraction < 1.0) {
            return Err(OracleError::Config(format!(
                "evaluation.train_fraction must be in (0, 1), got {}",
                eval.train_fraction
            )));
        }
        if !(0.0..1.0).contains(&eval.admission_threshold) {
            return Err(OracleError::Config(format!(
                "evaluation.admission_threshold must be in [0, 1), got {}",
                eval.admission_threshold
            )));
        }
        if !(eval.learning_rate > 0.0 && eval.learning_rate <= 1.0) {
            return Err(OracleError::Config(format!(
                "evaluation.learning_rate must be in (0, 1], got {}",
                eval.learning_rate
            )));
        }
        if self.cycle.interval_secs == 0 {
            return Err(OracleError::Config("cycle.interval_secs must be positive".into()));
        }
        if self.cycle.instruments.is_empty() {
            return Err(OracleError::Config("cycle.instruments must not be empty".into()));
        }
        if self.market_data.limit == 0 {
            return Err(OracleError::Config("market_data.limit must be positive".into()));
        }
        if self.market_data.batch_size == 0 {
            return Err(OracleError::Config("market_data.batch_size must be positive".into()));
        }
        if self.market_data.request_timeout_secs == 0 {
            return Err(OracleError::Config(
                "market_data.request_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}
