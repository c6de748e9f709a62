use fairhand_engine::rules::TableRules;
use fairhand_engine::types::Address;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8545";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 8080;

/// Knobs of the event pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Contract whose log the watcher follows.
    pub table_address: Address,
    pub ws_url: String,
    /// Wait between a failed or broken subscription and the next attempt.
    pub resubscribe_delay: Duration,
    /// Cache lifetime of a hand waiting for randomness.
    pub pending_ttl: Duration,
    /// Cache lifetime of a resolved hand.
    pub resolved_ttl: Duration,
    /// Tries for writing a computed result before giving up.
    pub persist_attempts: u32,
    pub persist_backoff: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            table_address: Address::default(),
            ws_url: DEFAULT_WS_URL.to_string(),
            resubscribe_delay: Duration::from_secs(5),
            pending_ttl: Duration::from_secs(30 * 60),
            resolved_ttl: Duration::from_secs(15 * 60),
            persist_attempts: 3,
            persist_backoff: Duration::from_millis(500),
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.resubscribe_delay.is_zero() {
            return Err(SettingsError::InvalidValue(
                "resubscribe_delay must be greater than 0".to_string(),
            ));
        }
        if self.persist_attempts == 0 {
            return Err(SettingsError::InvalidValue(
                "persist_attempts must be at least 1".to_string(),
            ));
        }
        if !(self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://")) {
            return Err(SettingsError::InvalidValue(format!(
                "ws_url must use ws:// or wss://, got {}",
                self.ws_url
            )));
        }
        Ok(())
    }
}

/// Process configuration: HTTP bind address, house rules and pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub rules: TableRules,
    pub pipeline: PipelineSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            rules: TableRules::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl AppSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.host.trim().is_empty() {
            return Err(SettingsError::InvalidValue("host cannot be empty".to_string()));
        }
        self.rules
            .validate()
            .map_err(|err| SettingsError::InvalidValue(err.to_string()))?;
        self.pipeline.validate()
    }

    /// Reads `TABLE_ADDRESS`, `RPC_URL`, `WS_RPC_URL`, `HOST` and `PORT`.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppSettings::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut settings = AppSettings::default();

        if let Some(host) = var("HOST") {
            settings.host = host;
        }
        if let Some(port) = var("PORT") {
            settings.port = port
                .trim()
                .parse()
                .map_err(|_| SettingsError::InvalidValue(format!("PORT is not a port: {port}")))?;
        }
        if let Some(address) = var("TABLE_ADDRESS") {
            settings.pipeline.table_address = address.trim().parse().map_err(|err| {
                SettingsError::InvalidValue(format!("TABLE_ADDRESS is not an address: {err}"))
            })?;
        }
        settings.pipeline.ws_url = var("WS_RPC_URL")
            .map(|url| derive_websocket_url(&url))
            .or_else(|| var("RPC_URL").map(|url| derive_websocket_url(&url)))
            .unwrap_or_else(|| DEFAULT_WS_URL.to_string());

        settings.validate()?;
        Ok(settings)
    }
}

/// Websocket form of an RPC endpoint: http becomes ws, https becomes wss,
/// ws/wss pass through and a bare `host:port` gets `ws://`.
pub fn derive_websocket_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with("ws://") || raw.starts_with("wss://") {
        raw.to_string()
    } else if let Some(rest) = raw.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if let Some(rest) = raw.strip_prefix("https://") {
        format!("wss://{rest}")
    } else {
        format!("ws://{raw}")
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid settings value: {0}")]
    InvalidValue(String),
}
