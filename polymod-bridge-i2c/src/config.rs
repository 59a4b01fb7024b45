//! Configuration for the I2C bridge.

use std::collections::HashSet;
use std::time::Duration;

use polymod_bridge_framework::{BridgeConfig, BridgeError, LoggingConfig, OscConfig, Result};
use serde::{Deserialize, Serialize};

use crate::bus::MAX_MODULE_ADDRESS;
use crate::decoder::MAX_RECORD_LEN;
use crate::scheduler::PollSettings;

/// Largest record buffer a single I2C block read can return.
pub const MAX_CHANGES_SIZE: u8 = 32;

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct I2cBridgeConfig {
    /// OSC endpoints
    #[serde(default)]
    pub osc: OscConfig,

    /// Bus and polling settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// I2C adapter device (default: "/dev/i2c-1")
    #[serde(default = "default_device")]
    pub device: String,

    /// Module addresses to poll, in polling order
    #[serde(default = "default_modules")]
    pub modules: Vec<u8>,

    /// Record buffer size in bytes (default: 12, four 3-byte records)
    #[serde(default = "default_changes_max_size")]
    pub changes_max_size: u8,

    /// Liveness ticks broadcast per poll cycle
    #[serde(default = "default_tick_count")]
    pub tick_count: u8,

    /// Pause after a bus error before reconfiguring, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_device() -> String {
    "/dev/i2c-1".to_string()
}

fn default_modules() -> Vec<u8> {
    vec![4]
}

fn default_changes_max_size() -> u8 {
    12
}

fn default_tick_count() -> u8 {
    32
}

fn default_backoff_ms() -> u64 {
    1000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            device: default_device(),
            modules: default_modules(),
            changes_max_size: default_changes_max_size(),
            tick_count: default_tick_count(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl BusConfig {
    /// Scheduler settings derived from this configuration.
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            modules: self.modules.clone(),
            changes_max_size: self.changes_max_size,
            tick_count: self.tick_count,
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }

    /// Validate the bus configuration.
    pub fn validate(&self) -> Result<()> {
        if self.device.is_empty() {
            return Err(BridgeError::validation("bus.device cannot be empty"));
        }

        if self.modules.is_empty() {
            return Err(BridgeError::validation(
                "At least one module address must be configured",
            ));
        }

        let mut seen = HashSet::new();
        for &module in &self.modules {
            if module == 0 || module > MAX_MODULE_ADDRESS {
                return Err(BridgeError::validation(format!(
                    "Module address {} must be 1-{}",
                    module, MAX_MODULE_ADDRESS
                )));
            }
            if !seen.insert(module) {
                return Err(BridgeError::validation(format!(
                    "Module address {} is listed twice",
                    module
                )));
            }
        }

        let size = usize::from(self.changes_max_size);
        if size < MAX_RECORD_LEN
            || self.changes_max_size > MAX_CHANGES_SIZE
            || size % MAX_RECORD_LEN != 0
        {
            return Err(BridgeError::validation(format!(
                "changes_max_size {} must be a multiple of {} between {} and {}",
                self.changes_max_size, MAX_RECORD_LEN, MAX_RECORD_LEN, MAX_CHANGES_SIZE
            )));
        }

        if self.tick_count == 0 {
            return Err(BridgeError::validation("tick_count must be at least 1"));
        }

        Ok(())
    }
}

impl BridgeConfig for I2cBridgeConfig {
    fn osc(&self) -> &OscConfig {
        &self.osc
    }

    fn osc_mut(&mut self) -> &mut OscConfig {
        &mut self.osc
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        self.osc.client_addr()?;
        self.osc.listen_addr()?;
        self.bus.validate()
    }
}
