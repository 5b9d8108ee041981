//! The protocol state machine: everything that happens between a raw
//! websocket frame arriving and an event reaching the listeners.
//!
//! Frames are decoded and state is updated under the session lock; events
//! are dispatched after it is released, with the packet moved out of the
//! session first, so listeners can call back into the client freely.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use sio_protocol::{EngineKind, Handshake, Packet, SocketKind};

use crate::events::EventKind;
use crate::registry::Registry;
use crate::transport::{Opcode, WsFrame};
use crate::watchdog;
use crate::Inner;

/// Connection lifecycle. `WaitForBinary` is `Connected` with a partially
/// reassembled binary packet in the rx slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Init,
    Handshake,
    Opened,
    Connected,
    WaitForBinary,
    Disconnected,
    Closed,
}

#[derive(Debug, Default)]
pub(crate) struct Liveness {
    pub epoch: u64,
    pub armed: bool,
    pub duration: Option<Duration>,
}

pub(crate) struct Session {
    pub state: State,
    pub handshake: Option<Handshake>,
    pub registry: Registry,
    pub rx: Packet,
    pub liveness: Liveness,
}

impl Session {
    pub fn new() -> Session {
        Session {
            state: State::Init,
            handshake: None,
            registry: Registry::new(),
            rx: Packet::new(),
            liveness: Liveness::default(),
        }
    }
}

/// An event decided under the session lock, dispatched after it drops.
struct Pending {
    kind: EventKind,
    packet: Option<Packet>,
}

impl Pending {
    fn event(kind: EventKind, packet: Option<Packet>) -> Vec<Pending> {
        vec![Pending { kind, packet }]
    }

    fn error() -> Vec<Pending> {
        Pending::event(EventKind::Error, None)
    }
}

pub(crate) fn handle_frame(inner: &Arc<Inner>, frame: WsFrame) {
    let pending = {
        let mut session = inner.session.lock().unwrap();
        match frame.opcode {
            Opcode::Text => on_text(inner, &mut session, &frame),
            Opcode::Binary => on_binary(&mut session, &frame),
            // Websocket-level control frames are the transport's business.
            Opcode::Ping | Opcode::Pong => Vec::new(),
            Opcode::Close => {
                log::debug!("received websocket close");
                Vec::new()
            }
        }
    };
    for p in pending {
        inner.dispatch(p.kind, Some(&frame), p.packet.as_ref());
    }
}

/// Watchdog expiry. Validates the arming epoch under the session lock so
/// a cancelled or superseded arming cannot fire.
pub(crate) fn liveness_expired(inner: &Arc<Inner>, epoch: u64) {
    let expired = {
        let mut session = inner.session.lock().unwrap();
        if session.liveness.armed && session.liveness.epoch == epoch {
            session.liveness.armed = false;
            true
        } else {
            false
        }
    };
    if expired {
        log::error!("liveness watchdog expired: no PING from the server in time");
        inner.dispatch(EventKind::Error, None, None);
    }
}

fn on_text(inner: &Inner, session: &mut Session, frame: &WsFrame) -> Vec<Pending> {
    let text = match std::str::from_utf8(&frame.payload) {
        Ok(text) => text,
        Err(e) => {
            log::error!("dropping non-utf8 text frame: {}", e);
            return Pending::error();
        }
    };
    let first = match text.as_bytes().first() {
        Some(first) => *first,
        None => {
            log::debug!("ignoring empty text frame");
            return Vec::new();
        }
    };
    match first {
        b'0' if session.state == State::Handshake => on_open(inner, session, &text[1..]),
        b'2' if text.len() == 1 => on_ping(inner, session),
        b'4' if matches!(
            session.state,
            State::Opened | State::Connected | State::WaitForBinary | State::Disconnected
        ) =>
        {
            on_message(session, text)
        }
        b'1' => {
            log::info!("server requested close");
            Vec::new()
        }
        b'3' | b'6' => Vec::new(),
        _ => {
            log::debug!(
                "ignoring frame starting with {:?} in state {:?}",
                first as char,
                session.state
            );
            Vec::new()
        }
    }
}

fn on_open(inner: &Inner, session: &mut Session, payload: &str) -> Vec<Pending> {
    let value: Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            log::error!("unparseable OPEN payload: {}", e);
            return Pending::error();
        }
    };
    let handshake = match Handshake::from_value(&value) {
        Ok(handshake) => handshake,
        Err(e) => {
            log::error!("bad OPEN payload: {}", e);
            return Pending::error();
        }
    };
    log::info!(
        "handshake complete: sid={} pingInterval={}ms pingTimeout={}ms maxPayload={}",
        handshake.sid,
        handshake.ping_interval,
        handshake.ping_timeout,
        handshake.max_payload
    );
    watchdog::arm(
        inner,
        session,
        Duration::from_millis(handshake.liveness_ms()),
    );
    session.handshake = Some(handshake);
    session.state = State::Opened;

    // Hand the raw handshake object to listeners through the rx packet.
    let mut packet = Packet::new();
    if packet
        .set_header(EngineKind::Open, None, None, None)
        .is_ok()
    {
        packet.set_json(&value);
    }
    Pending::event(EventKind::Opened, Some(packet))
}

fn on_ping(inner: &Inner, session: &mut Session) -> Vec<Pending> {
    log::debug!("received PING, sending PONG");
    watchdog::cancel(session);
    if let Err(e) = inner.send_text("3") {
        log::warn!("failed to send PONG: {}", e);
    }
    if let Some(handshake) = &session.handshake {
        let duration = Duration::from_millis(handshake.liveness_ms());
        watchdog::arm(inner, session, duration);
    }
    Vec::new()
}

fn on_message(session: &mut Session, text: &str) -> Vec<Pending> {
    if session.state == State::WaitForBinary {
        // A new header overwrites a partial binary packet.
        log::warn!("text message during binary reassembly, dropping the partial packet");
        session.state = State::Connected;
    }
    if let Err(e) = session.rx.parse_message(text) {
        log::error!("failed to parse message: {}", e);
        return Pending::error();
    }
    let sio = match session.rx.sio_type() {
        Some(sio) => sio,
        None => return Vec::new(),
    };
    match sio {
        SocketKind::Connect => on_connect(session),
        SocketKind::Disconnect => on_disconnect(session),
        SocketKind::Event | SocketKind::Ack => {
            Pending::event(EventKind::Data, Some(take_rx(session)))
        }
        SocketKind::BinaryEvent | SocketKind::BinaryAck => {
            if session.rx.attachments_complete() {
                // Zero declared attachments; nothing to wait for.
                Pending::event(EventKind::Data, Some(take_rx(session)))
            } else {
                session.state = State::WaitForBinary;
                Vec::new()
            }
        }
        SocketKind::ConnectError => {
            log::error!(
                "server refused namespace {:?}: {:?}",
                session.rx.namespace_or_default(),
                session.rx.json()
            );
            Pending::event(EventKind::Error, Some(take_rx(session)))
        }
    }
}

fn on_connect(session: &mut Session) -> Vec<Pending> {
    session.state = State::Connected;
    let sid = session
        .rx
        .json()
        .and_then(|json| json.get("sid"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let sid = match sid {
        Some(sid) => sid,
        None => {
            log::error!("CONNECT without a sid member");
            return Pending::event(EventKind::Error, Some(take_rx(session)));
        }
    };
    let namespace = session.rx.namespace().map(str::to_string);
    match session.registry.add(namespace.as_deref(), &sid) {
        Ok(()) => {
            log::info!(
                "namespace {:?} connected, sid={}",
                namespace.as_deref().unwrap_or("/"),
                sid
            );
            Pending::event(EventKind::NamespaceConnected, Some(take_rx(session)))
        }
        Err(e) => {
            log::error!("{}", e);
            Pending::event(EventKind::Error, Some(take_rx(session)))
        }
    }
}

fn on_disconnect(session: &mut Session) -> Vec<Pending> {
    let namespace = session.rx.namespace().map(str::to_string);
    match session.registry.remove(namespace.as_deref()) {
        Ok(()) => log::info!(
            "namespace {:?} disconnected",
            namespace.as_deref().unwrap_or("/")
        ),
        Err(e) => log::error!("{}", e),
    }
    if session.registry.is_empty() {
        session.state = State::Disconnected;
    }
    Vec::new()
}

fn on_binary(session: &mut Session, frame: &WsFrame) -> Vec<Pending> {
    if session.state != State::WaitForBinary {
        log::debug!(
            "dropping stray binary frame of {} byte(s) in state {:?}",
            frame.payload.len(),
            session.state
        );
        return Vec::new();
    }
    session.rx.push_attachment(frame.payload.clone());
    if session.rx.attachments_complete() {
        session.state = State::Connected;
        Pending::event(EventKind::Data, Some(take_rx(session)))
    } else {
        Vec::new()
    }
}

/// Moves the rx packet out for dispatch, leaving a fresh one behind. The
/// moved packet is dropped once the listeners return.
fn take_rx(session: &mut Session) -> Packet {
    std::mem::take(&mut session.rx)
}
