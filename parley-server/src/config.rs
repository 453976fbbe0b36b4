//! Server settings loaded from `PARLEY_*` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;

use parley_core::formatter::{FormatterOptions, DEFAULT_SUPERVISOR_NODE};

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_SERVICE_NAME: &str = "Parley Agent";
pub const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL_NAME: &str = "gpt-4o-mini";

/// Accepted values of `PARLEY_LOG_LEVEL`.
pub const LOG_LEVELS: &[&str] = &["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"];

/// Settings validation and parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Port {0} is outside 1024..=65535")]
    PortOutOfRange(u16),

    #[error("Unknown log level '{0}', expected one of DEBUG, INFO, WARNING, ERROR, CRITICAL")]
    UnknownLogLevel(String),

    #[error("Invalid listen address {0}")]
    InvalidAddress(String),
}

/// Which conversation store backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Memory,
    Sqlite,
}

impl std::str::FromStr for StoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(StoreKind::Memory),
            "sqlite" => Ok(StoreKind::Sqlite),
            _ => Err(()),
        }
    }
}

/// Server settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Upper-cased, one of [`LOG_LEVELS`].
    pub log_level: String,
    /// Explicit tracing filter from `PARLEY_LOG` or `RUST_LOG`.
    pub log_filter: Option<String>,
    pub store: StoreKind,
    pub sqlite_path: PathBuf,
    pub service_name: String,
    pub supervisor_node: Option<String>,
    /// `None` keeps the formatter's default expert nodes.
    pub expert_nodes: Option<Vec<String>>,
    pub model_base_url: String,
    pub model_name: String,
    pub model_api_key: Option<String>,
    pub system_prompt: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_filter: None,
            store: StoreKind::Memory,
            sqlite_path: PathBuf::from(parley_sqlite::DEFAULT_PATH),
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            supervisor_node: Some(DEFAULT_SUPERVISOR_NODE.to_string()),
            expert_nodes: None,
            model_base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            model_api_key: None,
            system_prompt: None,
        }
    }
}

impl Settings {
    /// Load and validate settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load and validate settings from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut settings = Settings::default();

        if let Some(host) = get("PARLEY_HOST") {
            settings.host = host;
        }
        if let Some(port) = get("PARLEY_PORT") {
            settings.port = port.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "PARLEY_PORT",
                value: port.clone(),
            })?;
        }
        if let Some(level) = get("PARLEY_LOG_LEVEL") {
            settings.log_level = level.trim().to_ascii_uppercase();
        }
        settings.log_filter = get("PARLEY_LOG").or_else(|| get("RUST_LOG"));

        if let Some(store) = get("PARLEY_STORE") {
            settings.store = store.parse().map_err(|_| ConfigError::InvalidValue {
                key: "PARLEY_STORE",
                value: store.clone(),
            })?;
        }
        if let Some(path) = get("PARLEY_SQLITE_PATH") {
            settings.sqlite_path = PathBuf::from(path);
        }
        if let Some(name) = get("PARLEY_SERVICE_NAME") {
            settings.service_name = name;
        }
        if let Some(node) = get("PARLEY_SUPERVISOR_NODE") {
            settings.supervisor_node = Some(node);
        }
        if let Some(nodes) = get("PARLEY_EXPERT_NODES") {
            settings.expert_nodes = Some(
                nodes
                    .split(',')
                    .map(str::trim)
                    .filter(|node| !node.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(url) = get("PARLEY_MODEL_BASE_URL") {
            settings.model_base_url = url;
        }
        if let Some(model) = get("PARLEY_MODEL_NAME") {
            settings.model_name = model;
        }
        settings.model_api_key = get("PARLEY_MODEL_API_KEY");
        settings.system_prompt = get("PARLEY_SYSTEM_PROMPT");

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port < 1024 {
            return Err(ConfigError::PortOutOfRange(self.port));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::UnknownLogLevel(self.log_level.clone()));
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(format!("{}:{}", self.host, self.port)))
    }

    /// Tracing filter directive: the explicit filter, else the log level.
    pub fn tracing_filter(&self) -> String {
        if let Some(filter) = &self.log_filter {
            return filter.clone();
        }
        match self.log_level.as_str() {
            "DEBUG" => "debug",
            "WARNING" => "warn",
            "ERROR" | "CRITICAL" => "error",
            _ => "info",
        }
        .to_string()
    }

    pub fn formatter_options(&self) -> FormatterOptions {
        let defaults = FormatterOptions::default();
        FormatterOptions {
            supervisor_node: self.supervisor_node.clone(),
            expert_nodes: self
                .expert_nodes
                .clone()
                .unwrap_or(defaults.expert_nodes),
            stream_tokens: defaults.stream_tokens,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
