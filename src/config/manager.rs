// Configuration management and loading
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, debug, warn};

use super::AppConfig;
use crate::error::ConfigError;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Configuration manager for loading, overriding and saving the app configuration
pub struct ConfigManager {
    config_path: PathBuf,
    config: Arc<RwLock<AppConfig>>,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            config_path,
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Load configuration from file, keeping defaults when the file is absent
    pub async fn load(&self) -> Result<(), ConfigError> {
        if !self.config_path.exists() {
            info!("Configuration file not found, using defaults: {:?}", self.config_path);
            return Ok(());
        }

        info!("Loading configuration from: {:?}", self.config_path);

        let content = fs::read_to_string(&self.config_path).map_err(|source| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        })?;
        let loaded = Self::parse(&self.config_path, &content)?;

        *self.config.write().await = loaded;
        debug!("Configuration loaded successfully");

        Ok(())
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<(), ConfigError> {
        info!("Saving configuration to: {:?}", self.config_path);

        if let Some(parent) = self.config_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        let config = self.config.read().await;
        let content = if is_json(&self.config_path) {
            serde_json::to_string_pretty(&*config)?
        } else {
            serde_yaml::to_string(&*config)?
        };

        fs::write(&self.config_path, content).map_err(|source| ConfigError::Io {
            path: self.config_path.clone(),
            source,
        })?;
        debug!("Configuration saved successfully");

        Ok(())
    }

    fn parse(path: &Path, content: &str) -> Result<AppConfig, ConfigError> {
        if is_json(path) {
            Ok(serde_json::from_str(content)?)
        } else {
            // Default to YAML
            Ok(serde_yaml::from_str(content)?)
        }
    }

    /// Get a copy of the current configuration
    pub async fn get_config(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Replace the entire configuration
    pub async fn update_config(&self, new_config: AppConfig) {
        *self.config.write().await = new_config;
    }

    /// Apply `CEE_*` environment overrides on top of the loaded configuration
    pub async fn load_from_env(&self) {
        self.apply_overrides(|key| std::env::var(key).ok()).await;
        info!("Configuration overrides applied from environment variables");
    }

    /// Apply overrides from an arbitrary lookup, e.g. a map in tests
    pub async fn apply_overrides<F>(&self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = self.config.write().await;

        if let Some(url) = lookup("CEE_OS_AUTH_URL") {
            config.control_plane.auth_url = url;
        }
        if let Some(username) = lookup("CEE_OS_USERNAME") {
            config.control_plane.username = username;
        }
        if let Some(password) = lookup("CEE_OS_PASSWORD") {
            config.control_plane.password = Some(password);
        }

        if let Some(host) = lookup("CEE_STORAGE_GATEWAY_HOST") {
            config.storage_gateway.host = host;
        }
        if let Some(port) = lookup("CEE_STORAGE_GATEWAY_PORT") {
            match port.parse() {
                Ok(port) => config.storage_gateway.port = port,
                Err(_) => warn!("Ignoring invalid CEE_STORAGE_GATEWAY_PORT: {}", port),
            }
        }
        if let Some(username) = lookup("CEE_STORAGE_GATEWAY_USER") {
            config.storage_gateway.username = username;
        }
        if let Some(password) = lookup("CEE_STORAGE_GATEWAY_PASSWORD") {
            config.storage_gateway.password = password;
        }

        if let Some(ttl) = lookup("CEE_SUMMARY_TTL_SECS") {
            match ttl.parse() {
                Ok(ttl) => config.health.summary_ttl_secs = ttl,
                Err(_) => warn!("Ignoring invalid CEE_SUMMARY_TTL_SECS: {}", ttl),
            }
        }

        if let Some(level) = lookup("CEE_LOG_LEVEL") {
            config.logging.level = level;
        }
    }

    /// Validate configuration, collecting every violation
    pub async fn validate(&self) -> Result<(), Vec<String>> {
        let config = self.config.read().await;
        let mut errors = Vec::new();

        if config.storage_gateway.host.is_empty() {
            errors.push("Storage gateway host cannot be empty".to_string());
        }
        if config.storage_gateway.request_timeout_secs == 0 {
            errors.push("Storage gateway request timeout must be greater than 0".to_string());
        }

        if config.switch.vsctl_binary.is_empty() {
            errors.push("Switch command binary cannot be empty".to_string());
        }

        if config.health.summary_ttl_secs == 0 {
            errors.push("Summary cache TTL must be greater than 0".to_string());
        }
        if config.health.probe_timeout_secs == 0 {
            errors.push("Probe timeout must be greater than 0".to_string());
        }
        if let Err(e) = config.health.thresholds.validate() {
            errors.push(e.to_string());
        }
        for target in &config.health.reachability_targets {
            if target.rsplit_once(':').and_then(|(_, port)| port.parse::<u16>().ok()).is_none() {
                errors.push(format!("Reachability target must be host:port: {}", target));
            }
        }

        if config.provisioning.tenant_networks.is_empty() {
            errors.push("At least one tenant network must be configured".to_string());
        }
        for template in &config.provisioning.tenant_networks {
            if !looks_like_cidr(&template.cidr) {
                errors.push(format!("Invalid CIDR for tenant network {}: {}", template.suffix, template.cidr));
            }
        }
        for cidr in [&config.provisioning.web_allowed_cidr, &config.provisioning.ssh_allowed_cidr] {
            if !looks_like_cidr(cidr) {
                errors.push(format!("Invalid security group CIDR: {}", cidr));
            }
        }
        if config.provisioning.step_timeout_secs == 0 {
            errors.push("Provisioning step timeout must be greater than 0".to_string());
        }

        if !LOG_LEVELS.contains(&config.logging.level.as_str()) {
            errors.push("Invalid logging level".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Get configuration file path
    pub fn get_config_path(&self) -> &Path {
        &self.config_path
    }
}

impl Clone for ConfigManager {
    fn clone(&self) -> Self {
        Self {
            config_path: self.config_path.clone(),
            config: self.config.clone(),
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|ext| ext.to_str()) == Some("json")
}

fn looks_like_cidr(value: &str) -> bool {
    match value.split_once('/') {
        Some((addr, prefix)) => {
            addr.parse::<std::net::IpAddr>().is_ok()
                && prefix.parse::<u8>().map(|p| p <= 128).unwrap_or(false)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[tokio::test]
    async fn defaults_are_valid() {
        let manager = ConfigManager::new(PathBuf::from("does-not-exist.yaml"));
        manager.load().await.unwrap();
        assert!(manager.validate().await.is_ok());

        let config = manager.get_config().await;
        assert_eq!(config.health.summary_ttl_secs, 300);
        assert_eq!(config.storage_gateway.request_timeout_secs, 30);
        assert_eq!(config.storage_gateway.base_url(), "https://192.168.2.13:4443/api");
    }

    #[tokio::test]
    async fn overrides_replace_selected_fields() {
        let manager = ConfigManager::new(PathBuf::from("unused.yaml"));
        let vars: HashMap<&str, &str> = [
            ("CEE_STORAGE_GATEWAY_HOST", "10.1.1.1"),
            ("CEE_SUMMARY_TTL_SECS", "60"),
            ("CEE_STORAGE_GATEWAY_PORT", "not-a-port"),
        ]
        .into_iter()
        .collect();

        manager.apply_overrides(|key| vars.get(key).map(|v| v.to_string())).await;

        let config = manager.get_config().await;
        assert_eq!(config.storage_gateway.host, "10.1.1.1");
        assert_eq!(config.health.summary_ttl_secs, 60);
        assert_eq!(config.storage_gateway.port, 4443);
    }

    #[tokio::test]
    async fn validation_collects_all_errors() {
        let manager = ConfigManager::new(PathBuf::from("unused.yaml"));
        let mut config = AppConfig::default();
        config.health.summary_ttl_secs = 0;
        config.provisioning.ssh_allowed_cidr = "10.0.0.0".to_string();
        config.logging.level = "verbose".to_string();
        manager.update_config(config).await;

        let errors = manager.validate().await.unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn partial_yaml_falls_back_to_defaults() {
        let yaml = "health:\n  summary_ttl_secs: 120\nstorage_gateway:\n  host: gw.local\n";
        let config = ConfigManager::parse(Path::new("cee.yaml"), yaml).unwrap();
        assert_eq!(config.health.summary_ttl_secs, 120);
        assert_eq!(config.health.thresholds.critical_free_percent, 10.0);
        assert_eq!(config.storage_gateway.host, "gw.local");
        assert_eq!(config.storage_gateway.port, 4443);
    }
}
