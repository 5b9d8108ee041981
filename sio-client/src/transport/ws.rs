//! The bundled websocket transport: `async-tungstenite` over a
//! caller-supplied TCP connection, with TLS handled by `async-tls` for
//! `wss` urls.

use std::error::Error as StdError;
use std::future::Future;
use std::time::Duration;

use async_tungstenite::{async_tls, tungstenite::Message as WsMessage};
use bytes::Bytes;
use futures::{
    channel::{mpsc, oneshot},
    future::{BoxFuture, RemoteHandle},
    io::{AsyncRead, AsyncWrite},
    select,
    sink::SinkExt,
    stream::StreamExt,
    task::{Spawn, SpawnExt},
    FutureExt,
};
use url::Url;

use super::{Opcode, Transport, TransportSink, WsFrame};
use crate::Error;

#[derive(Debug, thiserror::Error)]
pub enum UrlError {
    #[error(transparent)]
    Parse(#[from] url::ParseError),
    #[error("invalid scheme: {0:?}")]
    InvalidScheme(String),
    #[error("no host")]
    NoHost,
}

pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

type BoxedStream = Box<dyn AsyncStream>;
type ConnectorError = Box<dyn StdError + Send>;
type Connector =
    Box<dyn FnMut(String, u16) -> BoxFuture<'static, Result<BoxedStream, ConnectorError>> + Send>;

/// A [`Transport`] that speaks websocket over whatever stream the
/// `connect` closure produces for `(host, port)`. Outbound messages are
/// queued on an unbounded channel and written by the pump task, so the
/// trait's send timeouts never come into play here.
pub struct WsTransport {
    url: Url,
    connector: Connector,
    spawn: Box<dyn Spawn + Send>,
    send: Option<mpsc::UnboundedSender<WsMessage>>,
    close: Option<oneshot::Sender<()>>,
    handle: Option<RemoteHandle<()>>,
}

impl WsTransport {
    pub fn new<C, F, S, E>(
        url: impl AsRef<str>,
        mut connect: C,
        spawn: impl Spawn + Send + 'static,
    ) -> Result<WsTransport, Error>
    where
        C: 'static + Send + FnMut(String, u16) -> F,
        F: 'static + Send + Future<Output = Result<S, E>>,
        S: 'static + AsyncRead + AsyncWrite + Unpin + Send,
        E: 'static + StdError + Send,
    {
        let raw = url.as_ref();
        let url = normalize_url(raw).map_err(|e| Error::Url(raw.to_string(), e))?;
        let connector: Connector = Box::new(move |host, port| {
            let fut = connect(host, port);
            async move {
                match fut.await {
                    Ok(stream) => Ok(Box::new(stream) as BoxedStream),
                    Err(e) => Err(Box::new(e) as ConnectorError),
                }
            }
            .boxed()
        });
        Ok(WsTransport {
            url,
            connector,
            spawn: Box::new(spawn),
            send: None,
            close: None,
            handle: None,
        })
    }

    fn queue(&self, msg: WsMessage) -> Result<(), Error> {
        let send = self.send.as_ref().ok_or(Error::NotConnected)?;
        send.unbounded_send(msg).map_err(|_| Error::NotConnected)
    }
}

impl Transport for WsTransport {
    fn start(&mut self, sink: TransportSink) -> Result<(), Error> {
        if self.send.is_some() {
            return Err(Error::InvalidState);
        }
        let host = self
            .url
            .host_str()
            .ok_or_else(|| Error::Url(self.url.to_string(), UrlError::NoHost))?
            .to_string();
        let port = self.url.port_or_known_default().unwrap_or(80);

        let (send_tx, send_rx) = mpsc::unbounded();
        let (close_tx, close_rx) = oneshot::channel();
        let connect = (self.connector)(host, port);
        let task = run_connection(self.url.to_string(), connect, send_rx, close_rx, sink);
        let handle = self.spawn.spawn_with_handle(task)?;

        self.send = Some(send_tx);
        self.close = Some(close_tx);
        self.handle = Some(handle);
        Ok(())
    }

    fn send_text(&mut self, text: &str, _timeout: Duration) -> Result<(), Error> {
        self.queue(WsMessage::Text(text.to_string()))
    }

    fn send_binary(&mut self, data: &[u8], _timeout: Duration) -> Result<(), Error> {
        self.queue(WsMessage::Binary(data.to_vec()))
    }

    fn close(&mut self, _timeout: Duration) -> Result<(), Error> {
        if let Some(close) = self.close.take() {
            let _ = close.send(());
        }
        Ok(())
    }
}

async fn run_connection(
    url: String,
    connect: BoxFuture<'static, Result<BoxedStream, ConnectorError>>,
    mut send_rx: mpsc::UnboundedReceiver<WsMessage>,
    close_rx: oneshot::Receiver<()>,
    sink: TransportSink,
) {
    let stream = match connect.await {
        Ok(stream) => stream,
        Err(e) => {
            sink.error(format!("failed to open connection: {}", e));
            return;
        }
    };
    let ws = match async_tls::client_async_tls(url, stream).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            sink.error(format!("websocket handshake failed: {}", e));
            return;
        }
    };
    sink.connected();

    let (mut ws_sink, mut ws_stream) = ws.split();
    let mut next = ws_stream.next().fuse();
    let mut closed = close_rx.fuse();
    loop {
        select! {
            result = next => {
                let msg = match result {
                    Some(msg) => msg,
                    None => {
                        log::trace!("websocket stream ended");
                        sink.disconnected();
                        return;
                    }
                };
                next = ws_stream.next().fuse();
                match msg {
                    Ok(msg) => deliver(&sink, msg),
                    Err(e) => {
                        sink.error(format!("websocket error: {}", e));
                        sink.disconnected();
                        return;
                    }
                }
            }
            msg = send_rx.next() => {
                let msg = match msg {
                    Some(msg) => msg,
                    None => break,
                };
                log::trace!("sending websocket message: {:?}", msg);
                if let Err(e) = ws_sink.send(msg).await {
                    sink.error(format!("websocket send failed: {}", e));
                    sink.disconnected();
                    return;
                }
            }
            _ = closed => break,
        }
    }
    drop(next);
    let mut ws = ws_sink.reunite(ws_stream).expect("reunite should succeed");
    log::debug!("sending websocket close");
    let _ = ws.close(None).await;
    // Keep draining so the closing handshake completes cleanly.
    loop {
        match ws.next().await {
            Some(Ok(msg)) => deliver(&sink, msg),
            Some(Err(_)) | None => break,
        }
    }
    sink.disconnected();
}

fn deliver(sink: &TransportSink, msg: WsMessage) {
    log::trace!("received websocket message: {:?}", msg);
    let frame = match msg {
        WsMessage::Text(text) => WsFrame::text(text),
        WsMessage::Binary(data) => WsFrame::binary(data),
        WsMessage::Ping(data) => WsFrame {
            opcode: Opcode::Ping,
            payload: Bytes::from(data),
        },
        WsMessage::Pong(data) => WsFrame {
            opcode: Opcode::Pong,
            payload: Bytes::from(data),
        },
        WsMessage::Close(_) => WsFrame {
            opcode: Opcode::Close,
            payload: Bytes::new(),
        },
    };
    sink.frame(frame);
}

fn normalize_url(raw: &str) -> Result<Url, UrlError> {
    let url = Url::parse(raw)?;
    let (scheme, default_port) = match url.scheme() {
        "http" | "ws" => ("ws", 80),
        "https" | "wss" => ("wss", 443),
        s => return Err(UrlError::InvalidScheme(s.to_string())),
    };
    let host = url.host_str().ok_or(UrlError::NoHost)?;
    let port = url.port_or_known_default().unwrap_or(default_port);
    let query = url
        .query()
        .map(|q| format!("?{}", q))
        .unwrap_or_default();
    Ok(Url::parse(&format!(
        "{}://{}:{}{}{}",
        scheme,
        host,
        port,
        url.path(),
        query
    ))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url() {
        // The url crate drops a port equal to the scheme default.
        let url = normalize_url("https://example.com/").unwrap();
        assert_eq!(url.as_str(), "wss://example.com/");
        assert_eq!(url.port_or_known_default(), Some(443));

        let url = normalize_url("http://example.com/socket.io/?EIO=4").unwrap();
        assert_eq!(url.as_str(), "ws://example.com/socket.io/?EIO=4");
        assert_eq!(url.port_or_known_default(), Some(80));

        let url = normalize_url("ws://example.com:8080/ws").unwrap();
        assert_eq!(url.as_str(), "ws://example.com:8080/ws");
    }

    #[test]
    fn test_normalize_url_rejects_unknown_schemes() {
        assert!(matches!(
            normalize_url("ftp://example.com/"),
            Err(UrlError::InvalidScheme(_))
        ));
    }
}
