//! Configuration module for tasker-agent.
//!
//! Handles loading configuration from the TOML file and CLI overrides, and
//! turns it into the runtime types of `tasker-core`.

pub mod file;

use crate::config::file::{FileConfig, GatewayKind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tasker_core::config::{OfferConfig, TransportConfig};
use tasker_core::session::SessionConfig;
use tasker_core::transport::WorkerIdentity;
use thiserror::Error;
use url::Url;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Where notifications go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayTarget {
    Log,
    Http(Url),
}

/// Loaded configuration result containing all parts.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub session: SessionConfig,
    pub worker: WorkerIdentity,
    pub gateway: GatewayTarget,
    pub settings_path: PathBuf,
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    worker_override: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, worker_override: Option<String>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            worker_override,
        }
    }

    /// Load and process the configuration.
    ///
    /// This will:
    /// 1. Read the TOML file
    /// 2. Apply CLI overrides
    /// 3. Validate the configuration
    /// 4. Build the loaded configuration
    pub fn load(&self) -> Result<LoadedConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, config_content: &str) -> Result<LoadedConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(config_content)?;

        if let Some(worker_id) = &self.worker_override {
            file_config.worker.id = worker_id.clone();
        }

        self.validate(&file_config)?;
        Ok(build_loaded_config(file_config))
    }

    fn validate(&self, config: &FileConfig) -> Result<(), ConfigError> {
        let scheme = config.server.url.scheme();
        if scheme != "ws" && scheme != "wss" {
            return Err(ConfigError::ValidationError(format!(
                "server.url must use ws or wss, got {scheme}"
            )));
        }
        if config.worker.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "worker.id must not be empty".to_string(),
            ));
        }
        if config.transport.channels.is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.channels must name at least one channel".to_string(),
            ));
        }
        if config.transport.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "transport.max_attempts must be at least 1".to_string(),
            ));
        }
        if config.transport.base_delay_ms == 0 {
            return Err(ConfigError::ValidationError(
                "transport.base_delay_ms must be greater than 0".to_string(),
            ));
        }
        if config.offers.window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "offers.window_secs must be greater than 0".to_string(),
            ));
        }
        if config.notifications.gateway == GatewayKind::Http
            && config.notifications.push_url.is_none()
        {
            return Err(ConfigError::ValidationError(
                "notifications.push_url is required when gateway = \"http\"".to_string(),
            ));
        }
        Ok(())
    }
}

fn build_loaded_config(file_config: FileConfig) -> LoadedConfig {
    // First occurrence wins; later repeats are dropped.
    let mut channels = Vec::with_capacity(file_config.transport.channels.len());
    for channel in file_config.transport.channels {
        if !channels.contains(&channel) {
            channels.push(channel);
        }
    }

    let gateway = match (file_config.notifications.gateway, file_config.notifications.push_url) {
        (GatewayKind::Http, Some(url)) => GatewayTarget::Http(url),
        _ => GatewayTarget::Log,
    };

    LoadedConfig {
        session: SessionConfig {
            endpoint: file_config.server.url,
            transport: TransportConfig {
                base_delay: Duration::from_millis(file_config.transport.base_delay_ms),
                max_attempts: file_config.transport.max_attempts,
                channels,
            },
            offers: OfferConfig {
                window: Duration::from_secs(file_config.offers.window_secs),
            },
        },
        worker: WorkerIdentity::new(file_config.worker.id.trim()),
        gateway,
        settings_path: file_config.notifications.settings_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tasker_sdk::objects::SubscriptionChannel;

    const BASE: &str = r#"
[server]
url = "wss://dispatch.example.com/ws"

[worker]
id = "w_42"
"#;

    #[test]
    fn test_defaults_become_runtime_config() {
        let loaded = ConfigLoader::new("unused.toml", None).load_str(BASE).unwrap();
        assert_eq!(loaded.session.transport, TransportConfig::default());
        assert_eq!(loaded.session.offers, OfferConfig::default());
        assert_eq!(loaded.worker, WorkerIdentity::new("w_42"));
        assert_eq!(loaded.gateway, GatewayTarget::Log);
    }

    #[test]
    fn test_worker_override() {
        let loaded = ConfigLoader::new("unused.toml", Some("w_99".to_string()))
            .load_str(BASE)
            .unwrap();
        assert_eq!(loaded.worker.worker_id, "w_99");
    }

    #[test]
    fn test_repeated_channels_are_subscribed_once() {
        let toml_str = format!(
            "{BASE}\n[transport]\nchannels = [\"job_offers\", \"chat_messages\", \"job_offers\"]\n"
        );
        let loaded = ConfigLoader::new("unused.toml", None)
            .load_str(&toml_str)
            .unwrap();
        assert_eq!(
            loaded.session.transport.channels,
            vec![SubscriptionChannel::JobOffers, SubscriptionChannel::ChatMessages]
        );
    }

    #[test]
    fn test_rejects_http_scheme() {
        let toml_str = BASE.replace("wss://", "https://");
        let err = ConfigLoader::new("unused.toml", None)
            .load_str(&toml_str)
            .unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let toml_str = format!("{BASE}\n[transport]\nmax_attempts = 0\n");
        assert!(matches!(
            ConfigLoader::new("unused.toml", None).load_str(&toml_str),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_http_gateway_requires_push_url() {
        let toml_str = format!("{BASE}\n[notifications]\ngateway = \"http\"\n");
        assert!(matches!(
            ConfigLoader::new("unused.toml", None).load_str(&toml_str),
            Err(ConfigError::ValidationError(_))
        ));

        let toml_str = format!(
            "{BASE}\n[notifications]\ngateway = \"http\"\npush_url = \"http://relay.local/push\"\n"
        );
        let loaded = ConfigLoader::new("unused.toml", None)
            .load_str(&toml_str)
            .unwrap();
        assert!(matches!(loaded.gateway, GatewayTarget::Http(_)));
    }
}
