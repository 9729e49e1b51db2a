//! Configuration management for the reseller monitor
//!
//! Loads configuration from YAML files and environment variables.
//! Environment variables override YAML values.

use config::{Config, ConfigError, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

/// Upper bound the explorer API accepts for `numberOfTransactions`
pub const MAX_PAGE_SIZE: usize = 100;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Explorer (transaction feed) configuration
    #[serde(default)]
    pub explorer: ExplorerConfig,
    /// Telegram notification configuration
    #[serde(default)]
    pub telegram: TelegramConfig,
    /// Poller configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Registered affiliates
    #[serde(default)]
    pub affiliates: Vec<AffiliateConfig>,
    /// Extra entries for the known-token table
    #[serde(default)]
    pub tokens: Vec<KnownTokenConfig>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    /// Maximum connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/monitor.db")
}

fn default_max_connections() -> u32 {
    5
}

/// Explorer API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ExplorerConfig {
    /// Base URL of the explorer API
    #[serde(default = "default_explorer_url")]
    pub base_url: String,
    /// Bearer token (from environment: RESELLER_EXPLORER__JWT)
    #[serde(default)]
    pub jwt: Option<SecretString>,
    /// Request timeout in seconds
    #[serde(default = "default_explorer_timeout")]
    pub timeout_secs: u64,
}

fn default_explorer_url() -> String {
    "https://explorer.near-intents.org/api".to_string()
}

fn default_explorer_timeout() -> u64 {
    30
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            base_url: default_explorer_url(),
            jwt: None,
            timeout_secs: default_explorer_timeout(),
        }
    }
}

/// Telegram-specific notification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Whether Telegram notifications are enabled
    #[serde(default)]
    pub enabled: bool,
    /// Bot token (from environment: RESELLER_TELEGRAM__BOT_TOKEN)
    #[serde(default)]
    pub bot_token: Option<SecretString>,
    /// Bot API base URL
    #[serde(default = "default_telegram_api_url")]
    pub api_url: String,
    /// Forum group holding one thread per affiliate
    #[serde(default)]
    pub group_id: i64,
    /// Main chat whose description carries the grand total (0 = disabled)
    #[serde(default)]
    pub main_chat_id: i64,
    /// Request timeout in seconds
    #[serde(default = "default_telegram_timeout")]
    pub timeout_secs: u64,
    /// Minimum seconds between two title rewrites of the same thread
    #[serde(default = "default_title_min_interval")]
    pub title_min_interval_secs: u64,
}

fn default_telegram_api_url() -> String {
    "https://api.telegram.org".to_string()
}

fn default_telegram_timeout() -> u64 {
    10
}

fn default_title_min_interval() -> u64 {
    60
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: None,
            api_url: default_telegram_api_url(),
            group_id: 0,
            main_chat_id: 0,
            timeout_secs: default_telegram_timeout(),
            title_min_interval_secs: default_title_min_interval(),
        }
    }
}

/// Poller configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Enable the affiliate pollers
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between poll cycles
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Transactions requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Full pages drained in one cycle before yielding to the next tick
    #[serde(default = "default_max_pages")]
    pub max_pages_per_cycle: usize,
    /// Capacity of the in-memory transaction log
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    /// Rebuild stats from the full history on startup
    #[serde(default = "default_true")]
    pub replay_history_on_start: bool,
    /// Seconds between channel description rewrites
    #[serde(default = "default_description_interval")]
    pub description_interval_secs: u64,
    /// Compact affiliate list: "id=Display Name:thread,..."
    #[serde(default)]
    pub affiliates_spec: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    45
}

fn default_page_size() -> usize {
    MAX_PAGE_SIZE
}

fn default_max_pages() -> usize {
    50
}

fn default_log_capacity() -> usize {
    2000
}

fn default_description_interval() -> u64 {
    300
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
            page_size: default_page_size(),
            max_pages_per_cycle: default_max_pages(),
            log_capacity: default_log_capacity(),
            replay_history_on_start: true,
            description_interval_secs: default_description_interval(),
            affiliates_spec: None,
        }
    }
}

/// One registered affiliate
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AffiliateConfig {
    /// Identifier used by the explorer API
    pub id: String,
    /// Display name used in cards and reports
    pub name: String,
    /// Forum thread receiving this affiliate's cards
    #[serde(default)]
    pub thread_id: Option<i64>,
}

impl AffiliateConfig {
    /// Parse the compact form `id=Display Name:thread,id2=Other`
    pub fn parse_list(spec: &str) -> Result<Vec<Self>, ConfigError> {
        let mut out = Vec::new();
        for item in spec.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let (id, rest) = item.split_once('=').ok_or_else(|| {
                ConfigError::Message(format!("Affiliate entry '{}' is missing '='", item))
            })?;

            let (name, thread_id) = match rest.rsplit_once(':') {
                Some((name, thread)) => {
                    let thread = thread.trim().parse::<i64>().map_err(|e| {
                        ConfigError::Message(format!(
                            "Affiliate '{}' has invalid thread id '{}': {}",
                            id, thread, e
                        ))
                    })?;
                    (name, Some(thread))
                }
                None => (rest, None),
            };

            let (id, name) = (id.trim(), name.trim());
            if id.is_empty() || name.is_empty() {
                return Err(ConfigError::Message(format!(
                    "Affiliate entry '{}' needs both an id and a name",
                    item
                )));
            }

            out.push(Self {
                id: id.to_string(),
                name: name.to_string(),
                thread_id,
            });
        }
        Ok(out)
    }
}

/// Extra known-token entry
#[derive(Debug, Clone, Deserialize)]
pub struct KnownTokenConfig {
    pub asset_id: String,
    pub ticker: String,
    /// Chain code, e.g. "eth" or "tron"
    pub chain: String,
}

impl AppConfig {
    /// Load configuration from files and environment
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (RESELLER_*)
    /// 2. config/config.yaml (if exists)
    /// 3. config.yaml (if exists)
    /// 4. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.path", "data/monitor.db")?
            .set_default("database.max_connections", 5)?
            .add_source(File::with_name("config").required(false))
            .add_source(File::with_name("config/config").required(false))
            // RESELLER_EXPLORER__JWT=... -> explorer.jwt
            // RESELLER_MONITORING__POLL_INTERVAL_SECS=30 -> monitoring.poll_interval_secs
            .add_source(
                Environment::with_prefix("RESELLER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app: AppConfig = config.try_deserialize()?;
        app.merge_affiliates_spec()?;
        Ok(app)
    }

    /// Append affiliates from the compact env form to the structured list
    fn merge_affiliates_spec(&mut self) -> Result<(), ConfigError> {
        if let Some(spec) = self.monitoring.affiliates_spec.as_deref() {
            let parsed = AffiliateConfig::parse_list(spec)?;
            self.affiliates.extend(parsed);
        }
        Ok(())
    }

    /// Whether the Telegram bot token is present and non-empty
    pub fn has_bot_token(&self) -> bool {
        self.telegram
            .bot_token
            .as_ref()
            .map(|t| !t.expose_secret().is_empty())
            .unwrap_or(false)
    }

    /// Whether the explorer bearer token is present and non-empty
    pub fn has_explorer_jwt(&self) -> bool {
        self.explorer
            .jwt
            .as_ref()
            .map(|t| !t.expose_secret().is_empty())
            .unwrap_or(false)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telegram.enabled {
            if !self.has_bot_token() {
                return Err(ConfigError::Message(
                    "Telegram is enabled but RESELLER_TELEGRAM__BOT_TOKEN is not set".to_string(),
                ));
            }
            if self.telegram.group_id == 0 {
                return Err(ConfigError::Message(
                    "Telegram is enabled but telegram.group_id is not set".to_string(),
                ));
            }
        }

        if self.monitoring.enabled {
            if self.affiliates.is_empty() {
                return Err(ConfigError::Message(
                    "Monitoring is enabled but no affiliates are registered".to_string(),
                ));
            }

            if self.explorer.base_url.is_empty() {
                return Err(ConfigError::Message(
                    "Explorer base URL must be set".to_string(),
                ));
            }
        }

        if self.monitoring.page_size == 0 || self.monitoring.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Message(format!(
                "monitoring.page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }

        if self.monitoring.log_capacity == 0 {
            return Err(ConfigError::Message(
                "monitoring.log_capacity must be greater than zero".to_string(),
            ));
        }

        if self.monitoring.poll_interval_secs == 0 {
            return Err(ConfigError::Message(
                "monitoring.poll_interval_secs must be greater than zero".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for affiliate in &self.affiliates {
            if !seen.insert(affiliate.id.as_str()) {
                return Err(ConfigError::Message(format!(
                    "Affiliate '{}' is registered twice",
                    affiliate.id
                )));
            }
        }

        Ok(())
    }
}
