use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info};
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration, layered from `config/{default,<env>}.toml`
/// and `APP__`-prefixed environment variables.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deployment environment name ("development", "test", "production")
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Log level directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Run embedded migrations at startup
    #[serde(default)]
    pub auto_migrate: bool,

    #[serde(default = "default_db_max_connections")]
    #[validate(range(min = 1, max = 100))]
    pub db_max_connections: u32,

    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,

    /// Default page size for order listings
    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, max = 200))]
    pub default_page_size: u64,

    /// Transactional-mail HTTP endpoint; when unset, confirmation emails
    /// are logged instead of delivered.
    #[serde(default)]
    pub email_endpoint: Option<String>,

    /// Sender address for order confirmations
    #[serde(default = "default_email_from")]
    pub email_from: String,

    /// Timeout for outbound mail requests, in seconds
    #[serde(default = "default_email_timeout_secs")]
    pub email_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}
fn default_page_size() -> u64 {
    20
}
fn default_email_from() -> String {
    "orders@storefront.example".to_string()
}
fn default_email_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    /// Minimal constructor used by tests and tooling.
    pub fn new(database_url: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            database_url: database_url.into(),
            host: host.into(),
            port,
            environment: "test".to_string(),
            log_level: default_log_level(),
            auto_migrate: false,
            db_max_connections: default_db_max_connections(),
            db_min_connections: default_db_min_connections(),
            default_page_size: default_page_size(),
            email_endpoint: None,
            email_from: default_email_from(),
            email_timeout_secs: default_email_timeout_secs(),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("Configuration validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Load configuration for the environment selected by `RUN_ENV`/`APP_ENV`.
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
        .set_default("database_url", "sqlite://storefront.db?mode=rwc")?
        .set_default("host", "0.0.0.0")?
        .set_default("port", DEFAULT_PORT as i64)?
        .set_default("environment", DEFAULT_ENV)?
        .set_default("log_level", DEFAULT_LOG_LEVEL)?
        .add_source(File::with_name(&format!("{}/default", CONFIG_DIR)).required(false))
        .add_source(File::with_name(&format!("{}/{}", CONFIG_DIR, run_env)).required(false))
        .add_source(Environment::with_prefix("APP").separator("__"))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    app_config.validate().map_err(|e| {
        error!("Configuration validation failed: {:?}", e);
        AppConfigError::Validation(e)
    })?;

    Ok(app_config)
}

/// Initialise the tracing subscriber. `RUST_LOG` overrides the configured
/// level when set.
pub fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let default_directive = format!("storefront_api={},tower_http=info", level);
    let filter_directive = env::var("RUST_LOG")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(default_directive);

    let filter = EnvFilter::try_new(filter_directive)
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_applies_defaults() {
        let cfg = AppConfig::new("sqlite::memory:", "127.0.0.1", 9999);
        assert_eq!(cfg.server_addr(), "127.0.0.1:9999");
        assert_eq!(cfg.default_page_size, 20);
        assert_eq!(cfg.db_min_connections, 1);
        assert!(cfg.email_endpoint.is_none());
        assert!(!cfg.is_production());
        assert!(cfg.validate().is_ok());
    }
}
