use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cli::Cli;

/// Where log output goes. Anything other than stdout/stderr discards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stdout,
    Stderr,
    Off,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Address the coordinator binds to
    #[serde(default = "default_host")]
    pub host: String,

    /// Coordinator port, shared by every invocation
    #[serde(default = "default_port")]
    pub port: u16,

    /// Browser command used instead of the platform opener
    pub browser: Option<String>,

    /// Open the preview in a browser after registering the file
    #[serde(default)]
    pub launch: bool,

    /// Log output (stdout, stderr). Unset discards logs.
    pub logging: Option<String>,

    /// Default tracing filter when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Quiet period after a file event before re-rendering
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Config {
    /// Load configuration from `LIVEMARK_*` environment variables or an app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            // Fallback to .env file
            dotenvy::dotenv().ok();
        }

        envy::prefixed("LIVEMARK_")
            .from_env::<Config>()
            .map_err(ConfigError::EnvError)
    }

    /// Apply command-line flags on top of the loaded values
    pub fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(browser) = &cli.browser {
            self.browser = Some(browser.clone());
        }
        if cli.launch {
            self.launch = true;
        }
        if let Some(logging) = &cli.logging {
            self.logging = Some(logging.clone());
        }
        self
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of the control API
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// URL a browser opens to view a session
    pub fn preview_url(&self, id: &str) -> String {
        format!("{}/?id={}", self.base_url(), id)
    }

    pub fn log_target(&self) -> LogTarget {
        match self.logging.as_deref().map(str::to_lowercase).as_deref() {
            Some("stdout") => LogTarget::Stdout,
            Some("stderr") => LogTarget::Stderr,
            _ => LogTarget::Off,
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            browser: None,
            launch: false,
            logging: None,
            log_filter: default_log_filter(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1337
}

fn default_log_filter() -> String {
    "livemark=debug,tower_http=debug,info".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}
