//! Engine.IO framing: the single-digit packet types and the OPEN handshake.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

/// Engine.IO packet type, the first byte of every text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl EngineKind {
    pub fn from_byte(byte: u8) -> Option<EngineKind> {
        use EngineKind::*;
        match byte {
            b'0' => Some(Open),
            b'1' => Some(Close),
            b'2' => Some(Ping),
            b'3' => Some(Pong),
            b'4' => Some(Message),
            b'5' => Some(Upgrade),
            b'6' => Some(Noop),
            _ => None,
        }
    }

    pub fn digit(self) -> char {
        use EngineKind::*;
        match self {
            Open => '0',
            Close => '1',
            Ping => '2',
            Pong => '3',
            Message => '4',
            Upgrade => '5',
            Noop => '6',
        }
    }
}

/// The payload of the server's OPEN frame.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    pub sid: String,
    pub ping_interval: u64,
    pub ping_timeout: u64,
    pub max_payload: u64,
}

impl Handshake {
    /// Parses the JSON object following the `'0'` prefix of an OPEN frame.
    ///
    /// Unparseable JSON and a missing or mistyped member are distinct
    /// failures: the former is a malformed frame, the latter a server that
    /// speaks a different revision of the protocol.
    pub fn parse(payload: &str) -> Result<Handshake, Error> {
        let value: Value = serde_json::from_str(payload)?;
        Handshake::from_value(&value)
    }

    /// Extracts the handshake members from an already-parsed OPEN object.
    pub fn from_value(value: &Value) -> Result<Handshake, Error> {
        let member = |name: &'static str| {
            value
                .get(name)
                .and_then(Value::as_u64)
                .ok_or(Error::HandshakeMember(name))
        };
        let sid = value
            .get("sid")
            .and_then(Value::as_str)
            .ok_or(Error::HandshakeMember("sid"))?
            .to_string();
        Ok(Handshake {
            sid,
            ping_interval: member("pingInterval")?,
            ping_timeout: member("pingTimeout")?,
            max_payload: member("maxPayload")?,
        })
    }

    /// Watchdog duration in milliseconds: the server promises a PING every
    /// `ping_interval` and allows `ping_timeout` for the round trip.
    pub fn liveness_ms(&self) -> u64 {
        self.ping_interval + self.ping_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_open() {
        let payload =
            r#"{"sid":"abc","pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#;
        let handshake = Handshake::parse(payload).unwrap();
        assert_eq!(
            handshake,
            Handshake {
                sid: "abc".to_string(),
                ping_interval: 25000,
                ping_timeout: 5000,
                max_payload: 1000000,
            }
        );
        assert_eq!(handshake.liveness_ms(), 30000);
    }

    #[test]
    fn parse_open_ignores_extra_members() {
        let payload = r#"{"sid":"0vtWsEAcESDOoPs8AAAA","upgrades":[],"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#;
        let handshake = Handshake::parse(payload).unwrap();
        assert_eq!(handshake.sid, "0vtWsEAcESDOoPs8AAAA");
    }

    #[test]
    fn parse_open_missing_member() {
        let payload = r#"{"sid":"abc","pingInterval":25000,"pingTimeout":5000}"#;
        match Handshake::parse(payload) {
            Err(Error::HandshakeMember("maxPayload")) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn parse_open_mistyped_member() {
        let payload =
            r#"{"sid":42,"pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#;
        match Handshake::parse(payload) {
            Err(Error::HandshakeMember("sid")) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn parse_open_invalid_json() {
        match Handshake::parse("{\"sid\":") {
            Err(Error::Json(_)) => (),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn reserialize_matches_parsed_members() {
        let payload =
            r#"{"sid":"abc","pingInterval":25000,"pingTimeout":5000,"maxPayload":1000000}"#;
        let handshake = Handshake::parse(payload).unwrap();
        assert_eq!(
            serde_json::to_value(&handshake).unwrap(),
            json!({
                "sid": "abc",
                "pingInterval": 25000,
                "pingTimeout": 5000,
                "maxPayload": 1000000,
            })
        );
    }
}
