use serde::Deserialize;
use config::{Config, ConfigError, Environment, File};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub return_pages: ReturnPages,
    #[serde(default)]
    pub expiry: ExpiryConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Public address of this service. Gateway callback and IPN URLs are
    /// built from it.
    pub base_url: String,
}

impl ServerConfig {
    pub fn callback_url(&self) -> String {
        format!("{}/payments/gateway/callback", self.base_url.trim_end_matches('/'))
    }

    pub fn ipn_url(&self) -> String {
        format!("{}/payments/gateway/ipn", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub currency: String,
    pub country_code: String,
    pub timeout_secs: u64,
    /// HTTP method the gateway uses when delivering IPNs ("GET" or "POST").
    pub notification_kind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            consumer_key: None,
            consumer_secret: None,
            currency: "KES".to_string(),
            country_code: "KE".to_string(),
            timeout_secs: 30,
            notification_kind: "GET".to_string(),
        }
    }
}

/// Where the payer's browser is sent after the redirect callback. These are
/// pages of the member-facing web app, not routes of this service.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ReturnPages {
    pub success: String,
    pub failure: String,
    pub pending: String,
    pub history: String,
}

const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";

impl ReturnPages {
    /// Return pages that are not absolute http(s) URLs.
    pub fn relative_pages(&self) -> Vec<&str> {
        [&self.success, &self.failure, &self.pending, &self.history]
            .into_iter()
            .map(String::as_str)
            .filter(|page| !(page.starts_with("http://") || page.starts_with("https://")))
            .collect()
    }
}

impl Default for ReturnPages {
    fn default() -> Self {
        Self {
            success: format!("{}/payments/success", DEFAULT_FRONTEND_URL),
            failure: format!("{}/payments/failed", DEFAULT_FRONTEND_URL),
            pending: format!("{}/payments/pending", DEFAULT_FRONTEND_URL),
            history: format!("{}/payments/history", DEFAULT_FRONTEND_URL),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ExpiryConfig {
    pub enabled: bool,
    pub pending_after_hours: i64,
    pub orphan_after_minutes: i64,
    pub sweep_interval_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pending_after_hours: 48,
            orphan_after_minutes: 30,
            sweep_interval_secs: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AdminConfig {
    pub api_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:8080")?
            .set_default("database.url", "sqlite://clubpay.db")?
            .set_default("database.max_connections", 10)?
            .set_default("gateway.base_url", "")?
            .set_default("gateway.currency", "KES")?
            .set_default("gateway.country_code", "KE")?
            .set_default("gateway.timeout_secs", 30)?
            .set_default("gateway.notification_kind", "GET")?
            .set_default("return_pages.success", format!("{}/payments/success", DEFAULT_FRONTEND_URL))?
            .set_default("return_pages.failure", format!("{}/payments/failed", DEFAULT_FRONTEND_URL))?
            .set_default("return_pages.pending", format!("{}/payments/pending", DEFAULT_FRONTEND_URL))?
            .set_default("return_pages.history", format!("{}/payments/history", DEFAULT_FRONTEND_URL))?
            .set_default("expiry.enabled", true)?
            .set_default("expiry.pending_after_hours", 48)?
            .set_default("expiry.orphan_after_minutes", 30)?
            .set_default("expiry.sweep_interval_secs", 600)?

            // Add config file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))

            // Environment variables with CLUBPAY__ prefix, double underscore separates levels
            .add_source(Environment::with_prefix("CLUBPAY").separator("__"))

            .build()?;

        config.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                base_url: "http://localhost:8080".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://clubpay.db".to_string(),
                max_connections: 10,
            },
            gateway: GatewayConfig::default(),
            return_pages: ReturnPages::default(),
            expiry: ExpiryConfig::default(),
            admin: AdminConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}
