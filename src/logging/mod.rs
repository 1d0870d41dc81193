// Structured logging setup
use serde::{Serialize, Deserialize};
use tracing::info;
use tracing_subscriber::{
    fmt::time::UtcTime,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

pub mod audit;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub enable_colors: bool,
    pub enable_timestamps: bool,
    pub enable_line_numbers: bool,
    /// Emit one audit event per provisioning step.
    pub enable_audit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
    Compact,
    Pretty,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
            enable_colors: true,
            enable_timestamps: true,
            enable_line_numbers: false,
            enable_audit: true,
        }
    }
}

/// Logging manager
pub struct LoggingManager {
    config: LoggingConfig,
}

impl LoggingManager {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    /// Install the global subscriber; `RUST_LOG` wins over the configured level.
    pub fn initialize(&self) -> Result<(), String> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.config.level))
            .map_err(|e| format!("invalid log level {}: {}", self.config.level, e))?;

        let registry = Registry::default().with(filter);
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_ansi(self.config.enable_colors)
            .with_line_number(self.config.enable_line_numbers);

        let result = match (self.config.format, self.config.enable_timestamps) {
            (LogFormat::Json, _) => registry
                .with(fmt_layer.json().with_timer(UtcTime::rfc_3339()))
                .try_init(),
            (LogFormat::Compact, true) => registry
                .with(fmt_layer.compact().with_timer(UtcTime::rfc_3339()))
                .try_init(),
            (LogFormat::Compact, false) => registry
                .with(fmt_layer.compact().without_time())
                .try_init(),
            (LogFormat::Pretty, true) => registry
                .with(fmt_layer.pretty().with_timer(UtcTime::rfc_3339()))
                .try_init(),
            (LogFormat::Pretty, false) => registry
                .with(fmt_layer.pretty().without_time())
                .try_init(),
            (LogFormat::Text, true) => registry
                .with(fmt_layer.with_timer(UtcTime::rfc_3339()))
                .try_init(),
            (LogFormat::Text, false) => registry
                .with(fmt_layer.without_time())
                .try_init(),
        };
        result.map_err(|e| format!("failed to install log subscriber: {}", e))?;

        info!("Logging system initialized with level: {}", self.config.level);
        Ok(())
    }

    /// Create audit logger
    pub fn create_audit_logger(&self) -> audit::AuditLogger {
        audit::AuditLogger::new(self.config.enable_audit)
    }
}
