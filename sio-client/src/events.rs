//! Listener registration and synchronous event dispatch.

use std::sync::Mutex;

use sio_protocol::Packet;

use crate::transport::WsFrame;
use crate::Client;

/// The four event kinds a client raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// The Engine.IO handshake completed.
    Opened,
    /// The server confirmed a namespace connect.
    NamespaceConnected,
    /// An EVENT/ACK packet (with all of its attachments) arrived.
    Data,
    /// A protocol, transport, or liveness failure. Never fatal by itself.
    Error,
}

/// What a listener sees. `frame` is the websocket event that produced the
/// notification, when there was one; `packet` is only valid for the
/// duration of the callback.
pub struct ClientEvent<'a> {
    pub kind: EventKind,
    pub frame: Option<&'a WsFrame>,
    pub packet: Option<&'a Packet>,
    pub client: &'a Client,
}

pub(crate) type Listener = Box<dyn FnMut(&ClientEvent<'_>) + Send>;

struct Registration {
    filter: Option<EventKind>,
    listener: Listener,
}

/// Listeners are invoked in registration order, on the context that
/// produced the event. No internal lock is held during a callback, so
/// listeners are free to call back into the client.
pub(crate) struct EventBus {
    registrations: Mutex<Vec<Registration>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus {
            registrations: Mutex::new(Vec::new()),
        }
    }

    /// `None` is the match-any filter.
    pub fn register(&self, filter: Option<EventKind>, listener: Listener) {
        self.registrations
            .lock()
            .unwrap()
            .push(Registration { filter, listener });
    }

    pub fn dispatch(&self, event: &ClientEvent<'_>) {
        // Listeners may register further listeners from inside a callback;
        // those start receiving from the next event.
        let mut active = std::mem::take(&mut *self.registrations.lock().unwrap());
        for registration in active.iter_mut() {
            if registration.filter.map_or(true, |f| f == event.kind) {
                (registration.listener)(event);
            }
        }
        let mut guard = self.registrations.lock().unwrap();
        let added = std::mem::replace(&mut *guard, active);
        guard.extend(added);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::test_support::noop_client;

    fn record(
        bus: &EventBus,
        filter: Option<EventKind>,
        log: &Arc<Mutex<Vec<(usize, EventKind)>>>,
        tag: usize,
    ) {
        let log = Arc::clone(log);
        bus.register(
            filter,
            Box::new(move |event| log.lock().unwrap().push((tag, event.kind))),
        );
    }

    #[test]
    fn filters_and_order() {
        let client = noop_client();
        let bus = EventBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        record(&bus, None, &log, 0);
        record(&bus, Some(EventKind::Data), &log, 1);
        record(&bus, Some(EventKind::Error), &log, 2);

        for kind in [EventKind::Opened, EventKind::Data, EventKind::Error].iter() {
            bus.dispatch(&ClientEvent {
                kind: *kind,
                frame: None,
                packet: None,
                client: &client,
            });
        }

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (0, EventKind::Opened),
                (0, EventKind::Data),
                (1, EventKind::Data),
                (0, EventKind::Error),
                (2, EventKind::Error),
            ]
        );
    }

    #[test]
    fn listeners_can_register_listeners() {
        let client = noop_client();
        let bus = Arc::new(EventBus::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        {
            let bus_inner = Arc::clone(&bus);
            let log_inner = Arc::clone(&log);
            bus.register(
                None,
                Box::new(move |_| {
                    let log = Arc::clone(&log_inner);
                    bus_inner.register(
                        Some(EventKind::Data),
                        Box::new(move |event| log.lock().unwrap().push((9, event.kind))),
                    );
                }),
            );
        }

        let event = |kind| ClientEvent {
            kind,
            frame: None,
            packet: None,
            client: &client,
        };
        bus.dispatch(&event(EventKind::Opened));
        assert!(log.lock().unwrap().is_empty());
        bus.dispatch(&event(EventKind::Data));
        assert_eq!(*log.lock().unwrap(), vec![(9, EventKind::Data)]);
    }
}
