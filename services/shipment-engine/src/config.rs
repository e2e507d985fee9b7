use config::{ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use shipment_core::{EngineConfig, EngineConfigOverrides};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub chapa: ChapaConfig,
    pub sms: SmsConfig,
    pub payments: PaymentsConfig,
    /// Engine settings that differ from the defaults
    #[serde(default)]
    pub engine: EngineConfigOverrides,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChapaConfig {
    pub base_url: String,
    pub secret_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SmsConfig {
    /// When false, messages are only logged
    pub enabled: bool,
    pub base_url: String,
    pub api_key: String,
    pub sender_id: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PaymentsConfig {
    pub default_currency: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("server.workers", 4)?
            .set_default("database.url", "")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.run_migrations", true)?
            .set_default("auth.jwt_secret", "")?
            .set_default("chapa.base_url", "https://api.chapa.co/v1")?
            .set_default("chapa.secret_key", "")?
            .set_default("chapa.timeout_secs", 15)?
            .set_default("sms.enabled", false)?
            .set_default("sms.base_url", "")?
            .set_default("sms.api_key", "")?
            .set_default("sms.sender_id", "FlightBridge")?
            .set_default("sms.timeout_secs", 10)?
            .set_default("payments.default_currency", "ETB")?;

        // Add environment-specific config file if it exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder.add_source(
                File::with_name(&format!("config/{}", environment)).required(false),
            );
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("SHIPMENT_ENGINE")
                .separator("__")
                .try_parsing(true),
        );

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(secret) = env::var("JWT_SECRET") {
            builder = builder.set_override("auth.jwt_secret", secret)?;
        }

        if let Ok(key) = env::var("CHAPA_SECRET_KEY") {
            builder = builder.set_override("chapa.secret_key", key)?;
        }

        if let Ok(url) = env::var("CHAPA_BASE_URL") {
            builder = builder.set_override("chapa.base_url", url)?;
        }

        if let Ok(key) = env::var("SMS_API_KEY") {
            builder = builder.set_override("sms.api_key", key)?;
        }

        if let Ok(port) = env::var("SHIPMENT_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.auth.jwt_secret.is_empty() {
            return Err("JWT secret is required".to_string());
        }

        if self.chapa.base_url.is_empty() || self.chapa.secret_key.is_empty() {
            return Err("Chapa base URL and secret key are required".to_string());
        }

        if self.sms.enabled && (self.sms.base_url.is_empty() || self.sms.api_key.is_empty()) {
            return Err("SMS base URL and API key are required when SMS is enabled".to_string());
        }

        if self.payments.default_currency.trim().is_empty() {
            return Err("Default payment currency is required".to_string());
        }

        self.engine_config().map(|_| ())
    }

    /// Engine defaults with the `engine` section applied
    pub fn engine_config(&self) -> Result<EngineConfig, String> {
        EngineConfig::default()
            .with_overrides(&self.engine)
            .map_err(|e| e.to_string())
    }
}
