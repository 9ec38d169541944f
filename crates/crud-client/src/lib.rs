//! Client side of the CRUD bus.
//!
//! A [`Transport`] moves one encoded request (plus its payload) to the
//! object store and brings one response back. Two transports exist:
//! [`LocalTransport`] drives an in-process [`crud_store::StoreSession`], and
//! [`TcpTransport`] speaks the same framing over a socket to a remote
//! server. [`ObjectStoreClient`] sits on top, adding the INIT handshake,
//! result-bit checking and bounded retry of requests that are safe to
//! repeat.

pub mod client;
pub mod config;
pub mod error;
pub mod local;
pub mod retry;
pub mod tcp;
pub mod transport;

pub use client::ObjectStoreClient;
pub use config::{ClientConfig, DEFAULT_ADDR};
pub use error::{ClientError, ClientResult, TransportError};
pub use local::LocalTransport;
pub use retry::RetryPolicy;
pub use tcp::TcpTransport;
pub use transport::{read_frame, write_frame, Transport};
