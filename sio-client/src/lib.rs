//! A Socket.IO v5 client over Engine.IO v4, websocket transport only.
//!
//! The client is driven entirely by transport callbacks: frames arrive
//! through a [`TransportSink`], the session state machine decodes them,
//! and listeners registered with [`Client::register`] observe the results
//! as [`ClientEvent`]s. Sending goes the other way: build a packet (your
//! own, or the reusable one behind [`Client::tx_packet`]) and hand it to
//! [`Client::send_data`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::task::{Spawn, SpawnExt};

mod error;
mod events;
mod registry;
mod session;
mod transport;
mod watchdog;

pub use sio_protocol::{self as protocol, EngineKind, Handshake, Packet, SocketKind};

pub use error::Error;
pub use events::{ClientEvent, EventKind};
pub use registry::Registry;
pub use session::State;
pub use transport::ws::{AsyncStream, UrlError, WsTransport};
pub use transport::{Opcode, Transport, TransportSink, WsFrame};

use events::EventBus;
use session::Session;
use watchdog::Watchdog;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Bound for individual transport sends (PONG, CONNECT, data frames).
    pub send_timeout: Duration,
    /// Bound passed to the transport when the client shuts it down.
    pub close_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> ClientConfig {
        ClientConfig {
            send_timeout: Duration::from_secs(10),
            close_timeout: Duration::from_secs(10),
        }
    }
}

/// Handle to one Socket.IO connection. Cheap to clone; the connection is
/// torn down when the last handle drops.
#[derive(Clone)]
pub struct Client {
    pub(crate) inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) config: ClientConfig,
    connected: AtomicBool,
    pub(crate) session: Mutex<Session>,
    tx: Mutex<Packet>,
    pub(crate) bus: EventBus,
    transport: Mutex<Box<dyn Transport>>,
    pub(crate) watchdog: Watchdog,
}

impl Client {
    /// Builds a client around a transport. The `spawn` handle runs the
    /// liveness watchdog task (and whatever tasks the transport itself
    /// spawns share the same executor by convention).
    pub fn new(
        config: ClientConfig,
        transport: impl Transport + 'static,
        spawn: &impl Spawn,
    ) -> Result<Client, Error> {
        let (commands, receiver) = Watchdog::channel();
        let inner = Arc::new(Inner {
            config,
            connected: AtomicBool::new(false),
            session: Mutex::new(Session::new()),
            tx: Mutex::new(Packet::new()),
            bus: EventBus::new(),
            transport: Mutex::new(Box::new(transport)),
            watchdog: Watchdog::new(commands),
        });
        spawn.spawn(watchdog::run(Arc::downgrade(&inner), receiver))?;
        Ok(Client { inner })
    }

    /// Starts the transport and begins the Engine.IO handshake.
    pub fn start(&self) -> Result<(), Error> {
        {
            let mut session = self.inner.session.lock().unwrap();
            if session.state != State::Init {
                return Err(Error::InvalidState);
            }
            session.state = State::Handshake;
        }
        let sink = TransportSink::new(Arc::downgrade(&self.inner));
        self.inner.transport.lock().unwrap().start(sink)
    }

    /// Asks the server to connect a namespace (`None` or `"/"` for the
    /// default one). The namespace only enters the registry when the
    /// server confirms with a CONNECT reply.
    pub fn connect_namespace(&self, namespace: Option<&str>) -> Result<(), Error> {
        if let Some(nsp) = namespace {
            if !nsp.starts_with('/') || nsp.contains(',') {
                return Err(Error::InvalidNamespace(nsp.to_string()));
            }
        }
        let namespace = namespace.filter(|nsp| *nsp != "/");
        if !self.inner.transport_connected() {
            return Err(Error::NotConnected);
        }
        {
            let session = self.inner.session.lock().unwrap();
            match session.state {
                State::Opened | State::Connected | State::WaitForBinary | State::Disconnected => {}
                _ => return Err(Error::InvalidState),
            }
            if session.registry.contains(namespace) {
                return Err(Error::NamespaceRegistered(
                    namespace.unwrap_or("/").to_string(),
                ));
            }
        }
        let text = match namespace {
            Some(nsp) => format!("40{},", nsp),
            None => "40".to_string(),
        };
        log::debug!("sending connect {:?}", text);
        self.inner.send_text(&text)
    }

    /// Encodes and sends a MESSAGE packet: the text frame first, then each
    /// attachment as a binary frame, in order. The packet's namespace must
    /// already be registered.
    pub fn send_data(&self, packet: &mut Packet) -> Result<(), Error> {
        if !self.inner.transport_connected() {
            return Err(Error::NotConnected);
        }
        {
            let session = self.inner.session.lock().unwrap();
            if !session.registry.contains(packet.namespace()) {
                return Err(Error::NamespaceNotRegistered(
                    packet.namespace_or_default().to_string(),
                ));
            }
        }
        let timeout = self.inner.config.send_timeout;
        let mut transport = self.inner.transport.lock().unwrap();
        transport.send_text(packet.encode()?, timeout)?;
        for attachment in packet.attachments() {
            transport.send_binary(attachment, timeout)?;
        }
        Ok(())
    }

    /// Exclusive access to the preallocated send packet. Build it up and
    /// ship it with [`TxPacket::send`]; reuse it for the next message.
    pub fn tx_packet(&self) -> TxPacket<'_> {
        TxPacket {
            client: self,
            guard: self.inner.tx.lock().unwrap(),
        }
    }

    /// Sends the Engine.IO CLOSE byte (bounded by `timeout`), then closes
    /// the transport and stops the liveness watchdog.
    pub fn close(&self, timeout: Duration) -> Result<(), Error> {
        {
            let mut session = self.inner.session.lock().unwrap();
            watchdog::cancel(&mut session);
            session.state = State::Closed;
        }
        let mut transport = self.inner.transport.lock().unwrap();
        let sent = transport.send_text("1", timeout);
        let closed = transport.close(self.inner.config.close_timeout);
        sent.and(closed)
    }

    /// Attaches a listener. `None` matches every event kind.
    pub fn register(
        &self,
        filter: Option<EventKind>,
        listener: impl FnMut(&ClientEvent<'_>) + Send + 'static,
    ) {
        self.inner.bus.register(filter, Box::new(listener));
    }

    pub fn state(&self) -> State {
        self.inner.session.lock().unwrap().state
    }

    pub fn is_transport_connected(&self) -> bool {
        self.inner.transport_connected()
    }

    /// The Engine.IO session id from the handshake.
    pub fn sid(&self) -> Option<String> {
        let session = self.inner.session.lock().unwrap();
        session.handshake.as_ref().map(|h| h.sid.clone())
    }

    pub fn handshake(&self) -> Option<Handshake> {
        self.inner.session.lock().unwrap().handshake.clone()
    }

    /// The server's payload limit, readable only while the session sits in
    /// `Opened` (after the handshake, before the first namespace connect).
    pub fn max_payload(&self) -> Option<u64> {
        if !self.inner.transport_connected() {
            return None;
        }
        let session = self.inner.session.lock().unwrap();
        if session.state != State::Opened {
            return None;
        }
        session.handshake.as_ref().map(|h| h.max_payload)
    }

    pub fn namespace_sid(&self, namespace: Option<&str>) -> Option<String> {
        let session = self.inner.session.lock().unwrap();
        session.registry.sid(namespace).map(str::to_string)
    }

    pub fn namespace_count(&self) -> usize {
        self.inner.session.lock().unwrap().registry.len()
    }
}

impl Inner {
    pub(crate) fn transport_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn set_transport_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub(crate) fn send_text(&self, text: &str) -> Result<(), Error> {
        self.transport
            .lock()
            .unwrap()
            .send_text(text, self.config.send_timeout)
    }

    /// Runs the listeners for one event. Callers must not hold any client
    /// lock; listeners are allowed to call back into the facade.
    pub(crate) fn dispatch(
        self: &Arc<Self>,
        kind: EventKind,
        frame: Option<&WsFrame>,
        packet: Option<&Packet>,
    ) {
        let client = Client {
            inner: Arc::clone(self),
        };
        let event = ClientEvent {
            kind,
            frame,
            packet,
            client: &client,
        };
        self.bus.dispatch(&event);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(transport) = self.transport.get_mut() {
            let _ = transport.close(self.config.close_timeout);
        }
    }
}

/// Mutable view of the client's reusable send packet.
pub struct TxPacket<'a> {
    client: &'a Client,
    guard: MutexGuard<'a, Packet>,
}

impl std::ops::Deref for TxPacket<'_> {
    type Target = Packet;

    fn deref(&self) -> &Packet {
        &self.guard
    }
}

impl std::ops::DerefMut for TxPacket<'_> {
    fn deref_mut(&mut self) -> &mut Packet {
        &mut self.guard
    }
}

impl TxPacket<'_> {
    /// Encodes and sends the packet, releasing the guard afterwards. The
    /// packet keeps its contents and can be reset and rebuilt for the
    /// next send.
    pub fn send(mut self) -> Result<(), Error> {
        let client = self.client;
        client.send_data(&mut self.guard)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use futures::future::FutureObj;
    use futures::task::{Spawn, SpawnError};

    use crate::transport::{Transport, TransportSink, WsFrame};
    use crate::{Client, ClientConfig, Error};

    /// Recording transport for driving the state machine by hand.
    pub(crate) struct MockShared {
        sink: Mutex<Option<TransportSink>>,
        sent_text: Mutex<Vec<String>>,
        sent_binary: Mutex<Vec<Vec<u8>>>,
    }

    impl MockShared {
        pub fn deliver(&self, frame: WsFrame) {
            self.sink
                .lock()
                .unwrap()
                .as_ref()
                .expect("transport not started")
                .frame(frame);
        }

        pub fn deliver_text(&self, text: &str) {
            self.deliver(WsFrame::text(text));
        }

        pub fn deliver_binary(&self, data: &[u8]) {
            self.deliver(WsFrame::binary(data.to_vec()));
        }

        pub fn sent_text(&self) -> Vec<String> {
            self.sent_text.lock().unwrap().clone()
        }

        pub fn sent_binary(&self) -> Vec<Vec<u8>> {
            self.sent_binary.lock().unwrap().clone()
        }
    }

    pub(crate) struct MockTransport {
        shared: Arc<MockShared>,
    }

    impl MockTransport {
        pub fn new() -> MockTransport {
            MockTransport {
                shared: Arc::new(MockShared {
                    sink: Mutex::new(None),
                    sent_text: Mutex::new(Vec::new()),
                    sent_binary: Mutex::new(Vec::new()),
                }),
            }
        }

        pub fn shared(&self) -> Arc<MockShared> {
            Arc::clone(&self.shared)
        }
    }

    impl Transport for MockTransport {
        fn start(&mut self, sink: TransportSink) -> Result<(), Error> {
            *self.shared.sink.lock().unwrap() = Some(sink.clone());
            sink.connected();
            Ok(())
        }

        fn send_text(&mut self, text: &str, _timeout: Duration) -> Result<(), Error> {
            self.shared.sent_text.lock().unwrap().push(text.to_string());
            Ok(())
        }

        fn send_binary(&mut self, data: &[u8], _timeout: Duration) -> Result<(), Error> {
            self.shared.sent_binary.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        fn close(&mut self, _timeout: Duration) -> Result<(), Error> {
            Ok(())
        }
    }

    /// Spawner that drops the future; for tests that never need the
    /// watchdog task to actually run.
    pub(crate) struct NoopSpawn;

    impl Spawn for NoopSpawn {
        fn spawn_obj(&self, _future: FutureObj<'static, ()>) -> Result<(), SpawnError> {
            Ok(())
        }
    }

    pub(crate) fn noop_client() -> Client {
        Client::new(ClientConfig::default(), MockTransport::new(), &NoopSpawn).unwrap()
    }
}
