use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{error, info};
use validator::{Validate, ValidationError, ValidationErrors};

/// Default values for configuration
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";
const DEFAULT_ORDER_NUMBER_PREFIX: &str = "OT-";
const DEFAULT_ORDER_NUMBER_WIDTH: usize = 5;
const DEFAULT_TAX_RATE: Decimal = dec!(0.15);
const DEFAULT_OTP_CODE_TTL_SECS: i64 = 300;
const DEFAULT_OTP_MAX_ATTEMPTS: i32 = 5;
const DEFAULT_CONSULTATION_TOKEN_TTL_SECS: i64 = 900;

/// Work order numbering and costing
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct WorkOrderConfig {
    /// Prefix of the human-facing order number (e.g. "OT-")
    #[serde(default = "default_order_number_prefix")]
    #[validate(length(min = 1, max = 10))]
    pub number_prefix: String,

    /// Zero-pad width of the sequential part of the order number
    #[serde(default = "default_order_number_width")]
    #[validate(range(min = 1, max = 12))]
    pub number_width: usize,

    /// Tax (IVA) rate applied to cost subtotals, as a fraction (0.15 = 15%)
    #[serde(default = "default_tax_rate")]
    #[validate(custom = "validate_tax_rate")]
    pub tax_rate: Decimal,
}

impl Default for WorkOrderConfig {
    fn default() -> Self {
        Self {
            number_prefix: default_order_number_prefix(),
            number_width: default_order_number_width(),
            tax_rate: default_tax_rate(),
        }
    }
}

/// One-time code and consultation token lifetimes
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct OtpConfig {
    /// Seconds an issued code stays usable
    #[serde(default = "default_otp_code_ttl_secs")]
    #[validate(range(min = 30, max = 3600))]
    pub code_ttl_secs: i64,

    /// Wrong submissions allowed before a code locks
    #[serde(default = "default_otp_max_attempts")]
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: i32,

    /// Seconds a consultation lookup token stays valid after validation
    #[serde(default = "default_consultation_token_ttl_secs")]
    #[validate(range(min = 60, max = 86400))]
    pub consultation_token_ttl_secs: i64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self {
            code_ttl_secs: default_otp_code_ttl_secs(),
            max_attempts: default_otp_max_attempts(),
            consultation_token_ttl_secs: default_consultation_token_ttl_secs(),
        }
    }
}

/// Outgoing mail identity
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct MailConfig {
    #[serde(default = "default_mail_from")]
    #[validate(email)]
    pub from_address: String,

    /// Shop name used in message subjects and greetings
    #[serde(default = "default_shop_name")]
    #[validate(length(min = 1))]
    pub shop_name: String,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            from_address: default_mail_from(),
            shop_name: default_shop_name(),
        }
    }
}

/// Application configuration structure with validation
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    #[validate(length(min = 1))]
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[validate(length(min = 1))]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    #[validate(custom = "validate_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// Whether to run database migrations on startup
    #[serde(default = "default_true_bool")]
    pub auto_migrate: bool,

    /// DB pool: max connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// DB pool: min connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// DB timeouts (seconds)
    #[serde(default = "default_db_connect_timeout_secs")]
    pub db_connect_timeout_secs: u64,
    #[serde(default = "default_db_acquire_timeout_secs")]
    pub db_acquire_timeout_secs: u64,

    /// Audit event channel capacity
    #[serde(default = "default_event_channel_capacity")]
    #[validate(range(min = 1))]
    pub event_channel_capacity: usize,

    #[serde(default)]
    #[validate]
    pub work_orders: WorkOrderConfig,

    #[serde(default)]
    #[validate]
    pub otp: OtpConfig,

    #[serde(default)]
    #[validate]
    pub mail: MailConfig,
}

impl AppConfig {
    /// Creates a new configuration with defaults for everything but the essentials
    pub fn new(database_url: String, host: String, port: u16, environment: String) -> Self {
        Self {
            database_url,
            host,
            port,
            environment,
            log_level: default_log_level(),
            log_json: false,
            auto_migrate: default_true_bool(),
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            db_connect_timeout_secs: default_db_connect_timeout_secs(),
            db_acquire_timeout_secs: default_db_acquire_timeout_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            work_orders: WorkOrderConfig::default(),
            otp: OtpConfig::default(),
            mail: MailConfig::default(),
        }
    }

    /// Checks if running in production environment
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }

    /// Gets log level reference
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    fn validate_additional_constraints(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.db_min_connections > self.db_max_connections {
            let mut err = ValidationError::new("db_min_connections");
            err.message = Some("db_min_connections cannot exceed db_max_connections".into());
            errors.add("db_min_connections", err);
        }

        if self.otp.consultation_token_ttl_secs < self.otp.code_ttl_secs {
            let mut err = ValidationError::new("consultation_token_ttl_secs");
            err.message =
                Some("The consultation token must outlive the code that mints it".into());
            errors.add("otp", err);
        }

        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Runs field validation plus the cross-field checks
    pub fn validate_all(&self) -> Result<(), AppConfigError> {
        self.validate().map_err(|e| {
            error!("Configuration validation failed: {:?}", e);
            AppConfigError::Validation(e)
        })?;
        self.validate_additional_constraints().map_err(|e| {
            error!("Configuration constraint validation failed: {:?}", e);
            AppConfigError::Validation(e)
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Configuration loading failed: {0}")]
    Load(#[from] ConfigError),

    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Shared, reloadable view of the configuration.
///
/// Services hold a handle and read [`ConfigHandle::current`] per operation,
/// so a successful [`ConfigHandle::reload`] applies to the next call.
#[derive(Clone, Debug)]
pub struct ConfigHandle {
    inner: Arc<RwLock<Arc<AppConfig>>>,
}

impl ConfigHandle {
    pub fn new(config: AppConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub async fn current(&self) -> Arc<AppConfig> {
        self.inner.read().await.clone()
    }

    /// Swaps in `config` if it validates; the previous value stays otherwise.
    pub async fn replace(&self, config: AppConfig) -> Result<Arc<AppConfig>, AppConfigError> {
        config.validate_all()?;
        let fresh = Arc::new(config);
        *self.inner.write().await = fresh.clone();
        info!("Configuration replaced");
        Ok(fresh)
    }

    /// Re-reads every configuration source and swaps the result in.
    pub async fn reload(&self) -> Result<Arc<AppConfig>, AppConfigError> {
        let config = load_config()?;
        self.replace(config).await
    }
}

/// Default value functions
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_true_bool() -> bool {
    true
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_min_connections() -> u32 {
    1
}

fn default_db_connect_timeout_secs() -> u64 {
    30
}

fn default_db_acquire_timeout_secs() -> u64 {
    8
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_order_number_prefix() -> String {
    DEFAULT_ORDER_NUMBER_PREFIX.to_string()
}

fn default_order_number_width() -> usize {
    DEFAULT_ORDER_NUMBER_WIDTH
}

fn default_tax_rate() -> Decimal {
    DEFAULT_TAX_RATE
}

fn default_otp_code_ttl_secs() -> i64 {
    DEFAULT_OTP_CODE_TTL_SECS
}

fn default_otp_max_attempts() -> i32 {
    DEFAULT_OTP_MAX_ATTEMPTS
}

fn default_consultation_token_ttl_secs() -> i64 {
    DEFAULT_CONSULTATION_TOKEN_TTL_SECS
}

fn default_mail_from() -> String {
    "no-reply@repairdesk.local".to_string()
}

fn default_shop_name() -> String {
    "Repair Desk".to_string()
}

/// Validates log level values
fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if valid_levels.contains(&level.to_lowercase().as_str()) {
        Ok(())
    } else {
        let mut err = ValidationError::new("log_level");
        err.message = Some("Must be one of: trace, debug, info, warn, error".into());
        Err(err)
    }
}

fn validate_tax_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if rate.is_sign_negative() || *rate > Decimal::ONE {
        let mut err = ValidationError::new("tax_rate");
        err.message = Some("tax_rate must be between 0 and 1".into());
        return Err(err);
    }
    Ok(())
}

/// Loads application configuration
///
/// Layers configuration sources in this order:
/// 1. Built-in defaults
/// 2. Default config (config/default.toml)
/// 3. Environment-specific config (config/{env}.toml)
/// 4. Environment variables (APP__*)
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    let run_env = env::var("RUN_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| DEFAULT_ENV.to_string());
    info!("Loading configuration for environment: {}", run_env);

    if !Path::new(CONFIG_DIR).exists() {
        info!(
            "Config directory '{}' not found; relying on built-in defaults and environment variables",
            CONFIG_DIR
        );
    }

    let config = Config::builder()
        .set_default("database_url", "sqlite://repairdesk.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", run_env.as_str())?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .set_default("log_json", false)?
        .set_default("work_orders.tax_rate", DEFAULT_TAX_RATE.to_string())?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate_all()?;

    info!("Configuration loaded successfully");
    Ok(app_config)
}
