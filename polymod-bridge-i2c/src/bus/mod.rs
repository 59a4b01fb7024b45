//! Bus transport: addressed block transactions against the shared module bus.

use std::sync::{Arc, Mutex, MutexGuard};

#[cfg(target_os = "linux")]
mod i2c;
pub mod mock;

#[cfg(target_os = "linux")]
pub use i2c::I2cBus;
pub use mock::MockBus;

/// Bus address that every module listens to.
pub const BROADCAST_ADDRESS: u8 = 0;

/// Highest 7-bit bus address.
pub const MAX_MODULE_ADDRESS: u8 = 0x7F;

/// Command codes understood by module firmware.
///
/// The numeric values are part of the wire protocol and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BusCommand {
    /// Liveness tick, broadcast so modules can detect an active master.
    Tick = 0,
    /// Read the pending change records of one module.
    GetChanges = 1,
    /// Ask modules to report their whole state as changes.
    RequestFullState = 2,
    /// Drive a digital output pin.
    WriteDigital = 3,
    /// Set the record buffer size.
    SetConfig = 32,
}

impl BusCommand {
    /// Wire value of the command.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Return the string name for this command.
    pub fn as_str(&self) -> &'static str {
        match self {
            BusCommand::Tick => "tick",
            BusCommand::GetChanges => "get_changes",
            BusCommand::RequestFullState => "request_full_state",
            BusCommand::WriteDigital => "write_digital",
            BusCommand::SetConfig => "set_config",
        }
    }
}

impl std::fmt::Display for BusCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failed bus transaction. No partial data survives a failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("bus {command} at address {address:#04x} failed: {reason}")]
pub struct TransportError {
    pub address: u8,
    pub command: BusCommand,
    pub reason: String,
}

impl TransportError {
    pub fn new(address: u8, command: BusCommand, reason: impl Into<String>) -> Self {
        Self {
            address,
            command,
            reason: reason.into(),
        }
    }
}

/// Low-level access to the module bus.
///
/// Implementations are synchronous: a call occupies the caller until the
/// transaction completes or fails.
pub trait BusTransport: Send {
    /// Block write of `payload` to `address` (0 broadcasts).
    fn write_control(
        &mut self,
        address: u8,
        command: BusCommand,
        payload: &[u8],
    ) -> Result<(), TransportError>;

    /// Block read of up to `max_bytes` from `address`.
    fn read_changes(
        &mut self,
        address: u8,
        command: BusCommand,
        max_bytes: usize,
    ) -> Result<Vec<u8>, TransportError>;
}

/// A write transaction as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportCommand {
    pub address: u8,
    pub command: BusCommand,
    pub payload: Vec<u8>,
}

impl TransportCommand {
    /// Broadcast liveness tick number `index`.
    pub fn tick(index: u8) -> Self {
        Self {
            address: BROADCAST_ADDRESS,
            command: BusCommand::Tick,
            payload: vec![index],
        }
    }

    /// Broadcast the record buffer size.
    pub fn configure(changes_max_size: u8) -> Self {
        Self {
            address: BROADCAST_ADDRESS,
            command: BusCommand::SetConfig,
            payload: vec![changes_max_size],
        }
    }

    /// Broadcast a full state request.
    pub fn request_full_state() -> Self {
        Self {
            address: BROADCAST_ADDRESS,
            command: BusCommand::RequestFullState,
            payload: vec![0],
        }
    }

    /// Set digital `channel` of `module` to `value`.
    pub fn write_digital(module: u8, channel: u8, value: u8) -> Self {
        Self {
            address: module,
            command: BusCommand::WriteDigital,
            payload: vec![channel, value],
        }
    }
}

/// Shared handle to the one bus of the process.
///
/// Cloning yields another handle to the same bus. Every transaction holds the
/// lock for its whole duration, so transactions from the poll loop and the
/// inbound handlers never interleave. The lock is never held across an await.
pub struct BusHandle<B> {
    inner: Arc<Mutex<B>>,
}

impl<B> Clone for BusHandle<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: BusTransport> BusHandle<B> {
    pub fn new(bus: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bus)),
        }
    }

    /// Issue a write transaction.
    pub fn execute(&self, command: &TransportCommand) -> Result<(), TransportError> {
        tracing::trace!(
            address = command.address,
            command = %command.command,
            payload = ?command.payload,
            "Bus write"
        );
        self.lock()
            .write_control(command.address, command.command, &command.payload)
    }

    /// Read the pending change records of `module`.
    ///
    /// The returned buffer never exceeds `max_bytes`.
    pub fn read_changes(&self, module: u8, max_bytes: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = self
            .lock()
            .read_changes(module, BusCommand::GetChanges, max_bytes)?;
        buf.truncate(max_bytes);
        tracing::trace!(address = module, bytes = ?buf, "Bus read");
        Ok(buf)
    }

    fn lock(&self) -> MutexGuard<'_, B> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
