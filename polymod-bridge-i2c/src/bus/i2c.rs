//! Linux I2C bus transport via `/dev/i2c-N`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};

use super::{BusCommand, BusTransport, TransportError};

/// Largest block an I2C block transfer can carry.
pub const MAX_BLOCK_LEN: usize = 32;

/// Bus transport over a Linux I2C adapter.
///
/// One device handle is kept per slave address. A handle whose transaction
/// fails is dropped and reopened on next use.
pub struct I2cBus {
    path: PathBuf,
    devices: HashMap<u8, LinuxI2CDevice>,
}

impl I2cBus {
    /// Open the adapter at `path` (e.g. "/dev/i2c-1").
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        // Fail at startup rather than on the first transaction.
        std::fs::metadata(&path)?;

        tracing::info!(device = %path.display(), "Opened I2C adapter");

        Ok(Self {
            path,
            devices: HashMap::new(),
        })
    }

    fn device(
        &mut self,
        address: u8,
        command: BusCommand,
    ) -> Result<&mut LinuxI2CDevice, TransportError> {
        if !self.devices.contains_key(&address) {
            let device = LinuxI2CDevice::new(&self.path, u16::from(address))
                .map_err(|e| TransportError::new(address, command, e.to_string()))?;
            self.devices.insert(address, device);
        }

        self.devices
            .get_mut(&address)
            .ok_or_else(|| TransportError::new(address, command, "device handle missing"))
    }

    fn fail(&mut self, address: u8, command: BusCommand, err: LinuxI2CError) -> TransportError {
        self.devices.remove(&address);
        TransportError::new(address, command, err.to_string())
    }
}

impl BusTransport for I2cBus {
    fn write_control(
        &mut self,
        address: u8,
        command: BusCommand,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        if payload.len() > MAX_BLOCK_LEN {
            return Err(TransportError::new(
                address,
                command,
                format!("payload of {} bytes exceeds I2C block size", payload.len()),
            ));
        }

        let result = self
            .device(address, command)?
            .smbus_write_i2c_block_data(command.code(), payload);
        result.map_err(|e| self.fail(address, command, e))
    }

    fn read_changes(
        &mut self,
        address: u8,
        command: BusCommand,
        max_bytes: usize,
    ) -> Result<Vec<u8>, TransportError> {
        let len = u8::try_from(max_bytes.min(MAX_BLOCK_LEN)).unwrap_or(MAX_BLOCK_LEN as u8);

        let result = self
            .device(address, command)?
            .smbus_read_i2c_block_data(command.code(), len);
        result.map_err(|e| self.fail(address, command, e))
    }
}
