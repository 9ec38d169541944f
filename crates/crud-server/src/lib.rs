//! TCP object-store server for the CRUD bus.
//!
//! Every accepted connection gets its own [`crud_store::StoreSession`]; all
//! sessions share one object store. Frames are the bus framing: an 8-byte
//! big-endian header, followed by the payload for CREATE and UPDATE
//! requests and for successful READ responses.

pub mod config;
pub mod error;
pub mod server;

pub use config::{ServerConfig, DEFAULT_BIND_ADDR};
pub use error::{ServerError, ServerResult};
pub use server::CrudServer;
