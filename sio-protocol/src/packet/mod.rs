//! The Socket.IO packet value: one Engine.IO frame's worth of header,
//! JSON payload, and ordered binary attachments.

use bytes::Bytes;
use serde_json::Value;

use crate::{EngineKind, Error};

mod de;
mod ser;

const DEFAULT_NAMESPACE: &str = "/";

/// Socket.IO packet type, carried as the second digit of a MESSAGE frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl SocketKind {
    pub fn from_byte(byte: u8) -> Option<SocketKind> {
        use SocketKind::*;
        match byte {
            b'0' => Some(Connect),
            b'1' => Some(Disconnect),
            b'2' => Some(Event),
            b'3' => Some(Ack),
            b'4' => Some(ConnectError),
            b'5' => Some(BinaryEvent),
            b'6' => Some(BinaryAck),
            _ => None,
        }
    }

    pub fn digit(self) -> char {
        use SocketKind::*;
        match self {
            Connect => '0',
            Disconnect => '1',
            Event => '2',
            Ack => '3',
            ConnectError => '4',
            BinaryEvent => '5',
            BinaryAck => '6',
        }
    }

    /// Whether attachments follow this packet as separate binary frames.
    pub fn is_binary(self) -> bool {
        matches!(self, SocketKind::BinaryEvent | SocketKind::BinaryAck)
    }

    /// Whether the wire form may carry an event id.
    pub fn carries_id(self) -> bool {
        use SocketKind::*;
        matches!(self, Event | Ack | BinaryEvent | BinaryAck)
    }

    pub(crate) fn name(self) -> &'static str {
        use SocketKind::*;
        match self {
            Connect => "CONNECT",
            Disconnect => "DISCONNECT",
            Event => "EVENT",
            Ack => "ACK",
            ConnectError => "CONNECT_ERROR",
            BinaryEvent => "BINARY_EVENT",
            BinaryAck => "BINARY_ACK",
        }
    }
}

/// An owned, resettable packet.
///
/// A packet starts empty, is populated either by [`Packet::parse_message`]
/// or by the `set_*`/`push_attachment` builders, and is returned to empty
/// by [`Packet::reset`]. Getters never fail; absent fields read back as
/// `None` (or `/` from [`Packet::namespace_or_default`]).
#[derive(Debug, Clone, Default)]
pub struct Packet {
    eio: Option<EngineKind>,
    sio: Option<SocketKind>,
    namespace: Option<String>,
    event_id: Option<u64>,
    json: Option<Value>,
    attachments: Vec<Bytes>,
    expected_attachments: usize,
    wire: Option<String>,
}

impl Packet {
    pub fn new() -> Packet {
        Default::default()
    }

    /// Clears every field, releasing the payload, the attachments, and the
    /// cached wire form.
    pub fn reset(&mut self) {
        *self = Packet::new();
    }

    /// Resets the packet and installs a new header.
    ///
    /// A MESSAGE needs a Socket.IO type; an event id is only meaningful on
    /// EVENT/ACK and their binary variants; a namespace must be a
    /// `/`-prefixed path without `,`. The literal default namespace `/` is
    /// stored as absent.
    pub fn set_header(
        &mut self,
        eio: EngineKind,
        sio: Option<SocketKind>,
        namespace: Option<&str>,
        event_id: Option<u64>,
    ) -> Result<(), Error> {
        if eio == EngineKind::Message && sio.is_none() {
            return Err(Error::InvalidHeader(
                "MESSAGE packets need a Socket.IO type",
            ));
        }
        if event_id.is_some() && !sio.map_or(false, SocketKind::carries_id) {
            return Err(Error::InvalidHeader(
                "event ids are only valid on EVENT and ACK packets",
            ));
        }
        let namespace = match namespace {
            Some(nsp) if !nsp.starts_with('/') || nsp.contains(',') => {
                return Err(Error::InvalidNamespace(nsp.to_string()));
            }
            Some(DEFAULT_NAMESPACE) | None => None,
            Some(nsp) => Some(nsp.to_string()),
        };
        self.reset();
        self.eio = Some(eio);
        self.sio = sio;
        self.namespace = namespace;
        self.event_id = event_id;
        Ok(())
    }

    /// Installs a deep copy of `json` as the payload.
    pub fn set_json(&mut self, json: &Value) {
        self.json = Some(json.clone());
        self.wire = None;
    }

    /// Appends an attachment and returns its 0-based index.
    pub fn push_attachment(&mut self, data: Bytes) -> usize {
        self.attachments.push(data);
        self.wire = None;
        self.attachments.len() - 1
    }

    pub fn eio_type(&self) -> Option<EngineKind> {
        self.eio
    }

    pub fn sio_type(&self) -> Option<SocketKind> {
        self.sio
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn namespace_or_default(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    pub fn event_id(&self) -> Option<u64> {
        self.event_id
    }

    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    pub fn attachments(&self) -> &[Bytes] {
        &self.attachments
    }

    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    /// Attachment count declared by a parsed BINARY_EVENT/BINARY_ACK
    /// header; 0 for everything else.
    pub fn expected_attachments(&self) -> usize {
        self.expected_attachments
    }

    /// Whether every attachment declared by the header has arrived.
    pub fn attachments_complete(&self) -> bool {
        self.attachments.len() == self.expected_attachments
    }

    /// The wire form produced by the last [`Packet::encode`] call.
    pub fn encoded_text(&self) -> Option<&str> {
        self.wire.as_deref()
    }

    pub(crate) fn set_parsed(
        &mut self,
        sio: SocketKind,
        namespace: Option<String>,
        event_id: Option<u64>,
        json: Option<Value>,
        expected_attachments: usize,
    ) {
        self.eio = Some(EngineKind::Message);
        self.sio = Some(sio);
        self.namespace = namespace;
        self.event_id = event_id;
        self.json = json;
        self.expected_attachments = expected_attachments;
    }
}

/// Header and payload equality; the encoder cache and the attachment state
/// are excluded because attachments travel out of band.
impl PartialEq for Packet {
    fn eq(&self, other: &Packet) -> bool {
        self.eio == other.eio
            && self.sio == other.sio
            && self.namespace == other.namespace
            && self.event_id == other.event_id
            && self.json == other.json
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_packet_reads_back_sentinels() {
        let packet = Packet::new();
        assert_eq!(packet.eio_type(), None);
        assert_eq!(packet.sio_type(), None);
        assert_eq!(packet.namespace(), None);
        assert_eq!(packet.namespace_or_default(), "/");
        assert_eq!(packet.event_id(), None);
        assert!(packet.json().is_none());
        assert_eq!(packet.attachment_count(), 0);
        assert_eq!(packet.expected_attachments(), 0);
        assert!(packet.encoded_text().is_none());
    }

    #[test]
    fn set_header_normalizes_default_namespace() {
        let mut packet = Packet::new();
        packet
            .set_header(EngineKind::Message, Some(SocketKind::Event), Some("/"), None)
            .unwrap();
        assert_eq!(packet.namespace(), None);
        assert_eq!(packet.namespace_or_default(), "/");
    }

    #[test]
    fn set_header_rejects_bad_namespaces() {
        let mut packet = Packet::new();
        for nsp in &["chat", "/a,b", ""] {
            let result = packet.set_header(
                EngineKind::Message,
                Some(SocketKind::Event),
                Some(nsp),
                None,
            );
            assert!(matches!(result, Err(Error::InvalidNamespace(_))), "{}", nsp);
        }
    }

    #[test]
    fn set_header_rejects_message_without_socket_type() {
        let mut packet = Packet::new();
        let result = packet.set_header(EngineKind::Message, None, None, None);
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn set_header_rejects_id_on_connect() {
        let mut packet = Packet::new();
        let result = packet.set_header(
            EngineKind::Message,
            Some(SocketKind::Connect),
            None,
            Some(3),
        );
        assert!(matches!(result, Err(Error::InvalidHeader(_))));
    }

    #[test]
    fn attachments_index_in_insertion_order() {
        let mut packet = Packet::new();
        packet
            .set_header(
                EngineKind::Message,
                Some(SocketKind::BinaryEvent),
                Some("/chat"),
                Some(0),
            )
            .unwrap();
        assert_eq!(packet.push_attachment(Bytes::from_static(&[0xde, 0xad])), 0);
        assert_eq!(packet.push_attachment(Bytes::from_static(&[0xbe, 0xef])), 1);
        assert_eq!(packet.attachments()[0].as_ref(), &[0xde, 0xad]);
        assert_eq!(packet.attachments()[1].as_ref(), &[0xbe, 0xef]);
    }

    #[test]
    fn reset_releases_everything() {
        let mut packet = Packet::new();
        packet
            .set_header(EngineKind::Message, Some(SocketKind::Event), Some("/chat"), Some(7))
            .unwrap();
        packet.set_json(&json!(["hello"]));
        packet.push_attachment(Bytes::from_static(b"x"));
        packet.reset();
        assert_eq!(packet, Packet::new());
        assert_eq!(packet.attachment_count(), 0);
        assert_eq!(packet.namespace(), None);
    }

    #[test]
    fn set_header_resets_previous_contents() {
        let mut packet = Packet::new();
        packet
            .set_header(EngineKind::Message, Some(SocketKind::Event), Some("/chat"), None)
            .unwrap();
        packet.set_json(&json!(["hello"]));
        packet
            .set_header(EngineKind::Message, Some(SocketKind::Ack), None, Some(2))
            .unwrap();
        assert!(packet.json().is_none());
        assert_eq!(packet.namespace(), None);
        assert_eq!(packet.event_id(), Some(2));
    }
}
