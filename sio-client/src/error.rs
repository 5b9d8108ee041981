use std::error::Error as StdError;

use futures::task::SpawnError;

use crate::transport::ws::UrlError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("transport is not connected")]
    NotConnected,
    #[error("operation is not valid in the current client state")]
    InvalidState,
    #[error("namespace {0} is already registered")]
    NamespaceRegistered(String),
    #[error("namespace {0} is not registered")]
    NamespaceNotRegistered(String),
    #[error("namespace must start with '/' and contain no ',': {0}")]
    InvalidNamespace(String),
    #[error(transparent)]
    Protocol(#[from] sio_protocol::Error),
    #[error("failed to parse url {0}: {1}")]
    Url(String, UrlError),
    #[error("transport error: {0}")]
    Transport(Box<dyn StdError + Send + Sync>),
    #[error("failed to spawn task: {0}")]
    Spawn(#[from] SpawnError),
}
