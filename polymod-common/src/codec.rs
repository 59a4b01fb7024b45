//! OSC wire encoding for [`ControlMessage`].

use rosc::{OscMessage, OscPacket, OscType};

use crate::error::{Error, Result};
use crate::message::{ControlArg, ControlMessage};

/// Encode a message as a single OSC packet.
pub fn encode(message: &ControlMessage) -> Result<Vec<u8>> {
    let packet = OscPacket::Message(OscMessage {
        addr: message.address.clone(),
        args: message.args.iter().map(|arg| to_osc(*arg)).collect(),
    });

    rosc::encoder::encode(&packet).map_err(|e| Error::Codec(e.to_string()))
}

/// Decode one UDP datagram into the messages it carries.
///
/// Bundles are flattened depth-first, keeping their on-wire order. Arguments
/// of types the bridge never consumes (strings, blobs, ...) decode as
/// [`ControlArg::Other`], so every argument keeps its position.
pub fn decode(datagram: &[u8]) -> Result<Vec<ControlMessage>> {
    let (_, packet) =
        rosc::decoder::decode_udp(datagram).map_err(|e| Error::Codec(e.to_string()))?;

    let mut messages = Vec::new();
    flatten(packet, &mut messages);
    Ok(messages)
}

fn flatten(packet: OscPacket, out: &mut Vec<ControlMessage>) {
    match packet {
        OscPacket::Message(msg) => out.push(ControlMessage {
            address: msg.addr,
            args: msg.args.into_iter().map(from_osc).collect(),
        }),
        OscPacket::Bundle(bundle) => {
            for inner in bundle.content {
                flatten(inner, out);
            }
        }
    }
}

fn to_osc(arg: ControlArg) -> OscType {
    match arg {
        ControlArg::Int(v) => OscType::Int(v),
        ControlArg::Float(v) => OscType::Float(v),
        ControlArg::Other => OscType::Nil,
    }
}

fn from_osc(arg: OscType) -> ControlArg {
    match arg {
        OscType::Int(v) => ControlArg::Int(v),
        OscType::Float(v) => ControlArg::Float(v),
        OscType::Long(v) => i32::try_from(v).map_or(ControlArg::Other, ControlArg::Int),
        OscType::Double(v) => ControlArg::Float(v as f32),
        OscType::Bool(v) => ControlArg::Int(i32::from(v)),
        _ => ControlArg::Other,
    }
}
