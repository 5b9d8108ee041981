use std::fmt::Write;

use crate::{EngineKind, Error};

use super::Packet;

impl Packet {
    /// Serializes the packet to its wire text form and caches it.
    ///
    /// Only MESSAGE packets have a text form. The attachment-count segment
    /// is the current attachment list length; keeping the JSON payload's
    /// `_placeholder` entries in step with it is the caller's business.
    /// Attachments are not written here, they are sent as separate binary
    /// frames after the text frame.
    pub fn encode(&mut self) -> Result<&str, Error> {
        if self.eio != Some(EngineKind::Message) {
            return Err(Error::InvalidHeader("only MESSAGE packets can be encoded"));
        }
        let sio = self
            .sio
            .ok_or(Error::InvalidHeader("MESSAGE packets need a Socket.IO type"))?;
        let count = self.attachments.len();
        if count > 0 && !sio.is_binary() {
            return Err(Error::InvalidHeader(
                "attachments require a BINARY_EVENT or BINARY_ACK header",
            ));
        }

        let json = self.json.as_ref().map(serde_json::to_string).transpose()?;

        let mut len = 2;
        if count > 0 {
            len += decimal_width(count as u64) + 1;
        }
        if let Some(nsp) = &self.namespace {
            len += nsp.len() + 1;
        }
        if let Some(id) = self.event_id {
            len += decimal_width(id);
        }
        if let Some(json) = &json {
            len += json.len();
        }

        let mut wire = String::with_capacity(len);
        wire.push(EngineKind::Message.digit());
        wire.push(sio.digit());
        if count > 0 {
            write!(wire, "{}-", count).unwrap();
        }
        if let Some(nsp) = &self.namespace {
            write!(wire, "{},", nsp).unwrap();
        }
        if let Some(id) = self.event_id {
            write!(wire, "{}", id).unwrap();
        }
        if let Some(json) = json {
            wire.push_str(&json);
        }
        debug_assert_eq!(wire.len(), len);

        Ok(self.wire.insert(wire).as_str())
    }
}

fn decimal_width(mut n: u64) -> usize {
    let mut width = 1;
    while n >= 10 {
        n /= 10;
        width += 1;
    }
    width
}
