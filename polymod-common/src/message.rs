use serde::{Deserialize, Serialize};

/// OSC address paths exchanged with the control panel.
pub mod address {
    /// Analog sample from a module pin (bridge → panel).
    pub const MODULE_ANALOG: &str = "/module/analog";

    /// Digital level of a module pin (both directions).
    pub const MODULE_DIGITAL: &str = "/module/digital";

    /// A patch-matrix edge appeared (bridge → panel).
    pub const MATRIX_CONNECT: &str = "/matrix/connect";

    /// A patch-matrix edge was removed (bridge → panel).
    pub const MATRIX_DISCONNECT: &str = "/matrix/disconnect";

    /// The panel should forget its matrix view (bridge → panel).
    pub const MATRIX_RESET: &str = "/matrix/reset";

    /// The panel asks the bridge for a full state refresh (panel → bridge).
    pub const RESET: &str = "/reset";
}

/// A single message exchanged with the control panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlMessage {
    /// `/`-delimited address path (e.g. "/module/analog").
    pub address: String,

    /// Ordered, typed arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ControlArg>,
}

impl ControlMessage {
    /// Create a message without arguments.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument.
    pub fn with_arg(mut self, arg: impl Into<ControlArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn with_args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ControlArg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Get the argument at `index` as an integer, if present and numeric.
    pub fn int_arg(&self, index: usize) -> Option<i32> {
        self.args.get(index).and_then(ControlArg::as_int)
    }
}

impl std::fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Typed message argument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlArg {
    /// 32-bit integer (module ids, pins, ports, levels).
    Int(i32),

    /// 32-bit float (normalised analog values).
    Float(f32),

    /// Argument of a type the bridge does not interpret (string, blob, ...).
    ///
    /// Holds its slot so later arguments keep their position.
    Other,
}

impl ControlArg {
    /// Integer view of the argument.
    ///
    /// Floats are accepted when they hold a whole number, since some panels
    /// send every numeric value as a float.
    pub fn as_int(&self) -> Option<i32> {
        match *self {
            ControlArg::Int(v) => Some(v),
            ControlArg::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i32),
            ControlArg::Float(_) | ControlArg::Other => None,
        }
    }
}

impl std::fmt::Display for ControlArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControlArg::Int(v) => write!(f, "{}", v),
            ControlArg::Float(v) => write!(f, "{}", v),
            ControlArg::Other => write!(f, "_"),
        }
    }
}

impl From<i32> for ControlArg {
    fn from(v: i32) -> Self {
        ControlArg::Int(v)
    }
}

impl From<u8> for ControlArg {
    fn from(v: u8) -> Self {
        ControlArg::Int(i32::from(v))
    }
}

impl From<f32> for ControlArg {
    fn from(v: f32) -> Self {
        ControlArg::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_builder() {
        let msg = ControlMessage::new(address::MODULE_ANALOG)
            .with_args([4u8, 0u8])
            .with_arg(0.5f32);

        assert_eq!(msg.address, "/module/analog");
        assert_eq!(
            msg.args,
            vec![
                ControlArg::Int(4),
                ControlArg::Int(0),
                ControlArg::Float(0.5)
            ]
        );
        assert_eq!(msg.to_string(), "/module/analog 4 0 0.5");
    }

    #[test]
    fn test_int_view() {
        assert_eq!(ControlArg::Int(7).as_int(), Some(7));
        assert_eq!(ControlArg::Float(1.0).as_int(), Some(1));
        assert_eq!(ControlArg::Float(0.25).as_int(), None);
        assert_eq!(ControlArg::Float(f32::NAN).as_int(), None);
        assert_eq!(ControlArg::Other.as_int(), None);
    }

    #[test]
    fn test_int_arg_out_of_range() {
        let msg = ControlMessage::new(address::RESET);
        assert_eq!(msg.int_arg(0), None);
    }
}
