//! OSC bridge for Polymod modules on an I2C bus.
//!
//! The bridge polls every configured module for state changes, decodes the
//! tagged change records and republishes each one to the control panel as an
//! OSC message. Digital writes and resets from the panel go back onto the bus.
//!
//! # Messages
//!
//! ```text
//! bridge -> panel   /module/analog      <module> <pin> <value / 1024>
//!                   /module/digital     <module> <pin> <level>
//!                   /matrix/connect     <to_module> <to_port> <from_module> <from_port>
//!                   /matrix/disconnect  <to_module> <to_port> <from_module> <from_port>
//!                   /matrix/reset
//!
//! panel -> bridge   /module/digital     <module> <channel> <0|1>
//!                   /reset
//! ```
//!
//! Where:
//! - `<module>` - Bus address of the module (1-127)
//! - `<pin>`, `<port>` - Index local to the module

pub mod bus;
pub mod config;
pub mod decoder;
pub mod endpoint;
pub mod scheduler;
pub mod translator;
