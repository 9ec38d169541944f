use std::io;
use std::net::SocketAddr;

use crud_protocol::{Oid, ProtocolError, RequestType};
use thiserror::Error;

/// Failures moving bytes across a connection.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connection closed by peer")]
    Closed,

    #[error("connection timed out")]
    TimedOut,

    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Self::Closed,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::TimedOut,
            _ => Self::Io(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The store answered with the result bit set.
    #[error("store rejected {request} (oid {oid})")]
    Store { request: RequestType, oid: Oid },

    #[error("configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether reconnecting and repeating the request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self {
        Self::Transport(err.into())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
