//! The websocket transport seam.
//!
//! The client core only assumes a bidirectional framed channel that
//! delivers complete TEXT and BINARY messages in order and accepts text
//! and binary sends. [`ws::WsTransport`] is the bundled implementation;
//! anything else (including the test mocks) just implements [`Transport`].

use std::sync::Weak;
use std::time::Duration;

use bytes::Bytes;

use crate::events::EventKind;
use crate::session;
use crate::{Error, Inner};

pub mod ws;

/// Websocket frame opcode, as far as the client cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Text,
    Binary,
    Ping,
    Pong,
    Close,
}

/// One complete websocket message.
#[derive(Debug, Clone)]
pub struct WsFrame {
    pub opcode: Opcode,
    pub payload: Bytes,
}

impl WsFrame {
    pub fn text(text: impl Into<String>) -> WsFrame {
        WsFrame {
            opcode: Opcode::Text,
            payload: Bytes::from(text.into()),
        }
    }

    pub fn binary(payload: impl Into<Bytes>) -> WsFrame {
        WsFrame {
            opcode: Opcode::Binary,
            payload: payload.into(),
        }
    }
}

/// What the client needs from a websocket implementation.
///
/// `start` is handed a [`TransportSink`]; from then on the transport is
/// expected to report connection state changes and deliver every complete
/// inbound message through it, in arrival order. Frames must not be
/// delivered from inside `start` or from inside a send; the client may be
/// holding its transport lock at those points.
pub trait Transport: Send {
    fn start(&mut self, sink: TransportSink) -> Result<(), Error>;
    fn send_text(&mut self, text: &str, timeout: Duration) -> Result<(), Error>;
    fn send_binary(&mut self, data: &[u8], timeout: Duration) -> Result<(), Error>;
    fn close(&mut self, timeout: Duration) -> Result<(), Error>;
}

/// The client-side end of a transport: the transport pushes its callbacks
/// through this handle. Holds the client weakly so an abandoned transport
/// task cannot keep the client alive.
#[derive(Clone)]
pub struct TransportSink {
    inner: Weak<Inner>,
}

impl TransportSink {
    pub(crate) fn new(inner: Weak<Inner>) -> TransportSink {
        TransportSink { inner }
    }

    pub fn connected(&self) {
        if let Some(inner) = self.inner.upgrade() {
            log::debug!("transport connected");
            inner.set_transport_connected(true);
        }
    }

    pub fn disconnected(&self) {
        if let Some(inner) = self.inner.upgrade() {
            log::debug!("transport disconnected");
            inner.set_transport_connected(false);
        }
    }

    /// Delivers one complete inbound message.
    pub fn frame(&self, frame: WsFrame) {
        if let Some(inner) = self.inner.upgrade() {
            session::handle_frame(&inner, frame);
        }
    }

    /// Reports a transport-level failure. Surfaced to listeners as an
    /// `Error` event; the connection itself is left to the transport.
    pub fn error(&self, message: impl AsRef<str>) {
        if let Some(inner) = self.inner.upgrade() {
            log::error!("transport error: {}", message.as_ref());
            inner.dispatch(EventKind::Error, None, None);
        }
    }
}
