//! Configuration traits and utilities.

use std::net::IpAddr;
use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};
use crate::{LoggingConfig, OscConfig};

/// Trait for bridge configuration types.
///
/// Implement this trait for your bridge's configuration struct to get
/// automatic loading, validation, and access to common config fields.
///
/// # Example
///
/// ```ignore
/// use serde::Deserialize;
/// use polymod_bridge_framework::{BridgeConfig, BridgeError, LoggingConfig, OscConfig};
///
/// #[derive(Debug, Default, Deserialize)]
/// pub struct MyBridgeConfig {
///     #[serde(default)]
///     pub osc: OscConfig,
///     #[serde(default)]
///     pub logging: LoggingConfig,
///     pub devices: Vec<u8>,
/// }
///
/// impl BridgeConfig for MyBridgeConfig {
///     fn osc(&self) -> &OscConfig {
///         &self.osc
///     }
///
///     fn osc_mut(&mut self) -> &mut OscConfig {
///         &mut self.osc
///     }
///
///     fn logging(&self) -> &LoggingConfig {
///         &self.logging
///     }
///
///     fn validate(&self) -> Result<()> {
///         if self.devices.is_empty() {
///             return Err(BridgeError::validation("At least one device required"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait BridgeConfig: Sized + DeserializeOwned {
    /// Get the OSC endpoint configuration.
    fn osc(&self) -> &OscConfig;

    /// Get the OSC endpoint configuration for modification.
    fn osc_mut(&mut self) -> &mut OscConfig;

    /// Get the logging configuration.
    fn logging(&self) -> &LoggingConfig;

    /// Validate the configuration.
    ///
    /// Called automatically after loading. Override to add custom validation.
    fn validate(&self) -> Result<()> {
        self.osc().client_addr()?;
        self.osc().listen_addr()?;
        Ok(())
    }

    /// Load configuration from a file path.
    ///
    /// Supports JSON5 format. Calls [`validate`](Self::validate) after loading.
    fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(BridgeError::ConfigNotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = json5::from_str(&content)?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a file path, falling back to defaults when the
    /// file does not exist.
    fn load_or_default(path: impl AsRef<Path>) -> Result<Self>
    where
        Self: Default,
    {
        match Self::load(path) {
            Err(BridgeError::ConfigNotFound { .. }) => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
            other => other,
        }
    }

    /// Point outbound messages at another IP, keeping the configured port.
    fn with_client_ip(mut self, ip: IpAddr) -> Result<Self> {
        let osc = self.osc().clone().with_client_ip(ip)?;
        *self.osc_mut() = osc;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tokio_test::{assert_err, assert_ok};

    #[derive(Debug, Default, Deserialize)]
    struct TestConfig {
        #[serde(default)]
        osc: OscConfig,
        #[serde(default)]
        logging: LoggingConfig,
    }

    impl BridgeConfig for TestConfig {
        fn osc(&self) -> &OscConfig {
            &self.osc
        }

        fn osc_mut(&mut self) -> &mut OscConfig {
            &mut self.osc
        }

        fn logging(&self) -> &LoggingConfig {
            &self.logging
        }
    }

    #[test]
    fn test_config_not_found() {
        let result = TestConfig::load("/nonexistent/path.json5");
        assert!(matches!(result, Err(BridgeError::ConfigNotFound { .. })));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = assert_ok!(TestConfig::load_or_default("/nonexistent/path.json5"));
        assert_eq!(config.osc, OscConfig::default());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_client_ip_override() {
        let config = assert_ok!(TestConfig::default().with_client_ip("10.1.2.3".parse().unwrap()));
        assert_eq!(config.osc.client, "10.1.2.3:9001");
    }

    #[test]
    fn test_default_validation_checks_addresses() {
        let mut config = TestConfig::default();
        config.osc.listen = "nowhere".to_string();
        assert_err!(config.validate());
    }
}
