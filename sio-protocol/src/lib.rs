//! Wire codec for Socket.IO v5 carried over Engine.IO v4.
//!
//! This crate is transport-agnostic: it turns text frames into [`Packet`]s
//! and packets back into text frames, and parses the Engine.IO OPEN
//! handshake. Attachment bytes travel as separate binary frames and are
//! attached to a packet by whoever owns the transport.

use serde_json::Error as JsonError;

pub mod engine;
mod packet;

pub use engine::{EngineKind, Handshake};
pub use packet::{Packet, SocketKind};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("frame is not an Engine.IO MESSAGE: {0}")]
    NotMessage(String),
    #[error("unknown Socket.IO packet type {0:?}")]
    UnknownSocketType(char),
    #[error("message does not match the Socket.IO framing grammar: {0}")]
    Grammar(String),
    #[error("declared {declared} attachment(s) but found {found} placeholder(s)")]
    PlaceholderMismatch { declared: usize, found: usize },
    #[error("{kind} payload must be a JSON {expected}")]
    WrongPayloadKind {
        kind: &'static str,
        expected: &'static str,
    },
    #[error("invalid JSON in message payload: {0}")]
    PayloadJson(JsonError),
    #[error("missing or mistyped {0:?} member in OPEN payload")]
    HandshakeMember(&'static str),
    #[error("invalid JSON: {0}")]
    Json(#[from] JsonError),
    #[error("namespace must start with '/' and contain no ',': {0}")]
    InvalidNamespace(String),
    #[error("{0}")]
    InvalidHeader(&'static str),
}
