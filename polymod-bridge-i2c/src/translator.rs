//! Mapping between change records, control panel messages and bus writes.

use polymod_common::{ControlMessage, address};

use crate::bus::{MAX_MODULE_ADDRESS, TransportCommand};
use crate::decoder::ChangeRecord;

/// Divisor applied to raw analog samples.
///
/// Samples are 16-bit on the wire, so values above 1024 normalise past 1.0.
pub const ANALOG_SCALE: f32 = 1024.0;

/// Build the outbound message for a decoded record.
pub fn to_outbound(record: &ChangeRecord) -> ControlMessage {
    match *record {
        ChangeRecord::Analog { module, pin, value } => ControlMessage::new(address::MODULE_ANALOG)
            .with_args([module, pin])
            .with_arg(f32::from(value) / ANALOG_SCALE),
        ChangeRecord::Digital { module, pin, level } => {
            ControlMessage::new(address::MODULE_DIGITAL).with_args([module, pin, level])
        }
        ChangeRecord::Connection {
            to_module,
            to_port,
            from_module,
            from_port,
            connected,
        } => {
            let path = if connected {
                address::MATRIX_CONNECT
            } else {
                address::MATRIX_DISCONNECT
            };
            ControlMessage::new(path).with_args([to_module, to_port, from_module, from_port])
        }
    }
}

/// The message telling the panel to drop its matrix view.
pub fn matrix_reset() -> ControlMessage {
    ControlMessage::new(address::MATRIX_RESET)
}

/// What an inbound message asks the bridge to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundRoute {
    /// Drive a digital output.
    DigitalWrite(TransportCommand),
    /// Announce `/matrix/reset` and re-request full state.
    Reset,
    /// Not for the bridge; goes to the catch-all handler.
    Unhandled,
}

/// Malformed inbound message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranslateError {
    #[error("{address}: expected {expected} arguments, got {got}")]
    ArgCount {
        address: String,
        expected: usize,
        got: usize,
    },

    #[error("{address}: argument '{name}' is not an integer")]
    NotInteger { address: String, name: &'static str },

    #[error("{address}: argument '{name}' = {value} is outside 0..={max}")]
    OutOfRange {
        address: String,
        name: &'static str,
        value: i32,
        max: u8,
    },
}

/// Route an inbound message by exact address match.
pub fn from_inbound(message: &ControlMessage) -> Result<InboundRoute, TranslateError> {
    match message.address.as_str() {
        address::MODULE_DIGITAL => digital_write(message).map(InboundRoute::DigitalWrite),
        address::RESET => Ok(InboundRoute::Reset),
        _ => Ok(InboundRoute::Unhandled),
    }
}

fn digital_write(message: &ControlMessage) -> Result<TransportCommand, TranslateError> {
    if message.args.len() != 3 {
        return Err(TranslateError::ArgCount {
            address: message.address.clone(),
            expected: 3,
            got: message.args.len(),
        });
    }

    let module = byte_arg(message, 0, "module", MAX_MODULE_ADDRESS)?;
    let channel = byte_arg(message, 1, "channel", u8::MAX)?;
    let value = byte_arg(message, 2, "value", 1)?;

    Ok(TransportCommand::write_digital(module, channel, value))
}

fn byte_arg(
    message: &ControlMessage,
    index: usize,
    name: &'static str,
    max: u8,
) -> Result<u8, TranslateError> {
    let value = message
        .int_arg(index)
        .ok_or_else(|| TranslateError::NotInteger {
            address: message.address.clone(),
            name,
        })?;

    u8::try_from(value)
        .ok()
        .filter(|v| *v <= max)
        .ok_or_else(|| TranslateError::OutOfRange {
            address: message.address.clone(),
            name,
            value,
            max,
        })
}
