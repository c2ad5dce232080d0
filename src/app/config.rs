use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Which checkout protocol the storefront drives. Chosen by deployment, never
/// by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMode {
    #[serde(alias = "synchronous")]
    Sync,
    Redirect,
}

impl FromStr for PaymentMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sync" | "synchronous" => Ok(PaymentMode::Sync),
            "redirect" => Ok(PaymentMode::Redirect),
            other => Err(ConfigError::Invalid("PAYMENT_MODE", other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayBackend {
    Http,
    Sandbox,
}

impl FromStr for GatewayBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(GatewayBackend::Http),
            "sandbox" => Ok(GatewayBackend::Sandbox),
            other => Err(ConfigError::Invalid("GATEWAY_BACKEND", other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub payment_mode: PaymentMode,
    pub gateway_backend: GatewayBackend,
    pub gateway_url: String,
    pub gateway_api_key: String,
    pub currency: String,
    pub return_url: String,
    pub cancel_url: String,
    pub sandbox_approve_url: String,
    pub gateway_timeout_ms: u64,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout_secs: u64,
    pub autosave_interval_secs: u64,
    pub autosave_threshold_secs: f64,
    pub cancel_redirect_delay_secs: u64,
    pub pending_order_ttl_secs: u64,
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: 9999,
            payment_mode: PaymentMode::Redirect,
            gateway_backend: GatewayBackend::Http,
            gateway_url: "http://payment-gateway:8080".to_string(),
            gateway_api_key: String::new(),
            currency: "USD".to_string(),
            return_url: "http://localhost:9999/checkout/return".to_string(),
            cancel_url: "http://localhost:9999/checkout/cancel".to_string(),
            sandbox_approve_url: "http://localhost:9999/sandbox/approve".to_string(),
            gateway_timeout_ms: 5000,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout_secs: 30,
            autosave_interval_secs: 10,
            autosave_threshold_secs: 1.0,
            cancel_redirect_delay_secs: 3,
            pending_order_ttl_secs: 3 * 60 * 60,
            database_url: None,
        }
    }
}

/// Optional overrides read from a TOML file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server_port: Option<u16>,
    pub payment_mode: Option<PaymentMode>,
    pub gateway_backend: Option<GatewayBackend>,
    pub gateway_url: Option<String>,
    pub gateway_api_key: Option<String>,
    pub currency: Option<String>,
    pub return_url: Option<String>,
    pub cancel_url: Option<String>,
    pub sandbox_approve_url: Option<String>,
    pub gateway_timeout_ms: Option<u64>,
    pub circuit_breaker_threshold: Option<u32>,
    pub circuit_breaker_timeout_secs: Option<u64>,
    pub autosave_interval_secs: Option<u64>,
    pub autosave_threshold_secs: Option<f64>,
    pub cancel_redirect_delay_secs: Option<u64>,
    pub pending_order_ttl_secs: Option<u64>,
    pub database_url: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let payment_mode = match env::var("PAYMENT_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.payment_mode,
        };
        let gateway_backend = match env::var("GATEWAY_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.gateway_backend,
        };

        Ok(Self {
            server_port: env_or("PORT", defaults.server_port),
            payment_mode,
            gateway_backend,
            gateway_url: env::var("GATEWAY_URL").unwrap_or(defaults.gateway_url),
            gateway_api_key: env::var("GATEWAY_API_KEY").unwrap_or(defaults.gateway_api_key),
            currency: env::var("CURRENCY").unwrap_or(defaults.currency),
            return_url: env::var("CHECKOUT_RETURN_URL").unwrap_or(defaults.return_url),
            cancel_url: env::var("CHECKOUT_CANCEL_URL").unwrap_or(defaults.cancel_url),
            sandbox_approve_url: env::var("SANDBOX_APPROVE_URL")
                .unwrap_or(defaults.sandbox_approve_url),
            gateway_timeout_ms: env_or("GATEWAY_TIMEOUT_MS", defaults.gateway_timeout_ms),
            circuit_breaker_threshold: env_or(
                "CIRCUIT_BREAKER_THRESHOLD",
                defaults.circuit_breaker_threshold,
            ),
            circuit_breaker_timeout_secs: env_or(
                "CIRCUIT_BREAKER_TIMEOUT",
                defaults.circuit_breaker_timeout_secs,
            ),
            autosave_interval_secs: env_or("AUTOSAVE_INTERVAL_SECS", defaults.autosave_interval_secs),
            autosave_threshold_secs: env_or(
                "AUTOSAVE_THRESHOLD_SECS",
                defaults.autosave_threshold_secs,
            ),
            cancel_redirect_delay_secs: env_or(
                "CANCEL_REDIRECT_DELAY_SECS",
                defaults.cancel_redirect_delay_secs,
            ),
            pending_order_ttl_secs: env_or(
                "PENDING_ORDER_TTL_SECS",
                defaults.pending_order_ttl_secs,
            ),
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
        })
    }

    /// Environment first, then the file on top of it.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = Self::from_env()?;
        match path {
            Some(path) => config.with_file(path),
            None => Ok(config),
        }
    }

    pub fn with_file(self, path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&raw)?;
        Ok(self.merge(file))
    }

    pub fn merge(self, file: FileConfig) -> Self {
        Self {
            server_port: file.server_port.unwrap_or(self.server_port),
            payment_mode: file.payment_mode.unwrap_or(self.payment_mode),
            gateway_backend: file.gateway_backend.unwrap_or(self.gateway_backend),
            gateway_url: file.gateway_url.unwrap_or(self.gateway_url),
            gateway_api_key: file.gateway_api_key.unwrap_or(self.gateway_api_key),
            currency: file.currency.unwrap_or(self.currency),
            return_url: file.return_url.unwrap_or(self.return_url),
            cancel_url: file.cancel_url.unwrap_or(self.cancel_url),
            sandbox_approve_url: file.sandbox_approve_url.unwrap_or(self.sandbox_approve_url),
            gateway_timeout_ms: file.gateway_timeout_ms.unwrap_or(self.gateway_timeout_ms),
            circuit_breaker_threshold: file
                .circuit_breaker_threshold
                .unwrap_or(self.circuit_breaker_threshold),
            circuit_breaker_timeout_secs: file
                .circuit_breaker_timeout_secs
                .unwrap_or(self.circuit_breaker_timeout_secs),
            autosave_interval_secs: file
                .autosave_interval_secs
                .unwrap_or(self.autosave_interval_secs),
            autosave_threshold_secs: file
                .autosave_threshold_secs
                .unwrap_or(self.autosave_threshold_secs),
            cancel_redirect_delay_secs: file
                .cancel_redirect_delay_secs
                .unwrap_or(self.cancel_redirect_delay_secs),
            pending_order_ttl_secs: file
                .pending_order_ttl_secs
                .unwrap_or(self.pending_order_ttl_secs),
            database_url: file.database_url.or(self.database_url),
        }
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }

    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave_interval_secs.max(1))
    }

    pub fn pending_order_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_order_ttl_secs)
    }
}
