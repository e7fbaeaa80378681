use crate::config::AppConfig;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;

/// Configuration provider trait for extensions
pub trait ConfigProvider: Send + Sync {
    /// Get the configuration for a specific extension
    fn get_extension_config(&self, extension_name: &str) -> Option<&serde_json::Value>;

    /// Get a global config section by key
    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value>;
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration for extension '{extension}'")]
    InvalidExtensionConfig {
        extension: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Deserialize an extension's options, or its defaults when none are configured.
pub fn extension_config_typed<T>(
    provider: &dyn ConfigProvider,
    extension_name: &str,
) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Default,
{
    match provider.get_extension_config(extension_name) {
        None | Some(serde_json::Value::Null) => Ok(T::default()),
        Some(raw) => serde_json::from_value(raw.clone()).map_err(|source| {
            ConfigError::InvalidExtensionConfig {
                extension: extension_name.to_string(),
                source,
            }
        }),
    }
}

/// Implementation of ConfigProvider that uses AppConfig
pub struct AppConfigProvider(Arc<AppConfig>);

impl AppConfigProvider {
    pub fn new(config: AppConfig) -> Self {
        Self(Arc::new(config))
    }
}

impl ConfigProvider for AppConfigProvider {
    fn get_extension_config(&self, extension_name: &str) -> Option<&serde_json::Value> {
        self.0.extensions.get(extension_name)
    }

    fn get_config_raw(&self, key: &str) -> Option<serde_json::Value> {
        match key {
            "environment" => serde_json::to_value(&self.0.environment).ok(),
            "output" => serde_json::to_value(&self.0.output).ok(),
            "logging" => self
                .0
                .logging
                .as_ref()
                .and_then(|v| serde_json::to_value(v).ok()),
            _ => None,
        }
    }
}
