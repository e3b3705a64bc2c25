//! Structured logging setup on top of `tracing-subscriber`.

use crate::errors::StoryloomError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Environment variable holding a full filter directive; wins over config.
pub const ENV_LOG: &str = EnvFilter::DEFAULT_ENV;

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error, off
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,

    /// Enable colored output (text format only)
    #[serde(default = "default_true")]
    pub color: bool,

    /// Module-specific log levels
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            color: true,
            modules: HashMap::new(),
        }
    }
}

impl LoggingConfig {
    /// Builds the filter: `RUST_LOG` if set, else level plus module
    /// directives.
    pub fn env_filter(&self) -> Result<EnvFilter, StoryloomError> {
        if let Ok(filter) = EnvFilter::try_from_env(ENV_LOG) {
            return Ok(filter);
        }
        self.config_filter()
    }

    fn config_filter(&self) -> Result<EnvFilter, StoryloomError> {
        let mut filter = EnvFilter::try_new(&self.level)
            .map_err(|e| StoryloomError::Logging(format!("invalid level {:?}: {e}", self.level)))?;
        for (module, level) in &self.modules {
            let directive = format!("{module}={level}")
                .parse()
                .map_err(|e| StoryloomError::Logging(format!("invalid directive for {module}: {e}")))?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }
}

/// Installs the global subscriber.
///
/// Fails if the configuration is invalid or a subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<(), StoryloomError> {
    let filter = config.env_filter()?;
    let registry = Registry::default().with(filter);

    let installed = match config.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
        LogFormat::Text => registry
            .with(fmt::layer().with_target(true).with_ansi(config.color))
            .try_init(),
    };
    installed.map_err(|e| StoryloomError::Logging(e.to_string()))
}
