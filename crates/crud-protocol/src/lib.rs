//! Bus protocol for the CRUD object store.
//!
//! Every request and response on the bus is a single 64-bit value, sent in
//! network byte order and optionally followed by a raw payload:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                               OID                             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |  Req  |                   Length                      |Flags|R|
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! A CREATE or UPDATE request is followed by exactly `length` payload
//! bytes; so is a successful READ response. Nothing else carries a payload.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{BusCodec, HEADER_SIZE};
pub use error::{ProtocolError, ProtocolResult};
pub use message::{BusMessage, Flags, Oid, RequestType, MAX_OBJECT_SIZE};
