use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;

use super::{Packet, SocketKind};
use crate::Error;

/// Token marking the position of an attachment inside the JSON payload.
const PLACEHOLDER: &str = "_placeholder";

lazy_static! {
    static ref MESSAGE_RE: Regex = {
        let pattern = r#"^4([0-6])((0|[1-9][0-9]*)-)?((/[^,]*),)?(0|[1-9][0-9]*)?([\[{].*)?$"#;
        Regex::new(pattern).unwrap()
    };
}

impl Packet {
    /// Decodes a single MESSAGE text frame into this packet.
    ///
    /// The packet is reset before parsing and reset again on any failure,
    /// so a packet that fails to parse reads back empty. A successful parse
    /// of a BINARY_EVENT/BINARY_ACK records the declared attachment count
    /// but attaches no bytes; those arrive as later binary frames.
    pub fn parse_message(&mut self, raw: &str) -> Result<(), Error> {
        self.reset();
        parse_into(self, raw).map_err(|e| {
            self.reset();
            e
        })
    }

    /// Decodes a MESSAGE text frame into a fresh packet.
    pub fn from_message(raw: &str) -> Result<Packet, Error> {
        let mut packet = Packet::new();
        packet.parse_message(raw)?;
        Ok(packet)
    }
}

fn parse_into(packet: &mut Packet, raw: &str) -> Result<(), Error> {
    let bytes = raw.as_bytes();
    if bytes.len() < 2 || bytes[0] != b'4' {
        return Err(Error::NotMessage(raw.to_string()));
    }
    let sio =
        SocketKind::from_byte(bytes[1]).ok_or(Error::UnknownSocketType(bytes[1] as char))?;

    let grammar = || Error::Grammar(raw.to_string());
    let captures = MESSAGE_RE.captures(raw).ok_or_else(grammar)?;
    let declared = match captures.get(3) {
        Some(m) => Some(m.as_str().parse::<usize>().map_err(|_| grammar())?),
        None => None,
    };
    let namespace = captures
        .get(5)
        .map(|m| m.as_str())
        .filter(|nsp| *nsp != super::DEFAULT_NAMESPACE);
    let event_id = match captures.get(6) {
        Some(m) => Some(m.as_str().parse::<u64>().map_err(|_| grammar())?),
        None => None,
    };
    let payload = captures.get(7).map(|m| m.as_str());

    if declared.is_some() && !sio.is_binary() {
        return Err(grammar());
    }
    if event_id.is_some() && !sio.carries_id() {
        return Err(grammar());
    }

    let (json, expected) = match sio {
        SocketKind::Connect | SocketKind::ConnectError => {
            (Some(payload_json(sio, payload, "object", Value::is_object)?), 0)
        }
        SocketKind::Disconnect => {
            if payload.is_some() {
                return Err(grammar());
            }
            (None, 0)
        }
        SocketKind::Event | SocketKind::Ack | SocketKind::BinaryEvent | SocketKind::BinaryAck => {
            let expected = if sio.is_binary() {
                let declared = declared.ok_or_else(grammar)?;
                let found = raw.matches(PLACEHOLDER).count();
                if found != declared {
                    return Err(Error::PlaceholderMismatch { declared, found });
                }
                declared
            } else {
                0
            };
            (Some(payload_json(sio, payload, "array", Value::is_array)?), expected)
        }
    };

    packet.set_parsed(sio, namespace.map(str::to_string), event_id, json, expected);
    Ok(())
}

fn payload_json(
    sio: SocketKind,
    payload: Option<&str>,
    expected: &'static str,
    check: impl Fn(&Value) -> bool,
) -> Result<Value, Error> {
    let wrong_kind = || Error::WrongPayloadKind {
        kind: sio.name(),
        expected,
    };
    let payload = payload.ok_or_else(wrong_kind)?;
    let json: Value = serde_json::from_str(payload).map_err(Error::PayloadJson)?;
    if !check(&json) {
        return Err(wrong_kind());
    }
    Ok(json)
}
