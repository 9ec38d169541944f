use crud_protocol::{Oid, RequestType};

/// Errors from object store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// No object with this identifier exists.
    #[error("object not found: {0}")]
    NotFound(Oid),

    /// OID 0 addressed without the priority flag.
    #[error("object id 0 names no object")]
    NullOid,

    /// The priority object was addressed before it was created.
    #[error("priority object does not exist")]
    NoPriorityObject,

    /// A second priority object was requested.
    #[error("priority object already exists: {0}")]
    PriorityObjectExists(Oid),

    /// Objects cannot change size in place.
    #[error("length mismatch for {oid}: stored {stored} bytes, update carries {requested}")]
    LengthMismatch { oid: Oid, stored: u32, requested: u32 },

    /// Object larger than the maximum object size or the caller's buffer.
    #[error("object too large: {length} bytes (limit {limit})")]
    TooLarge { length: usize, limit: u32 },

    /// The payload did not match the length declared in the header.
    #[error("payload carries {actual} bytes, header declares {declared}")]
    PayloadMismatch { declared: u32, actual: usize },

    /// A request other than INIT arrived on an uninitialized session.
    #[error("session not initialized, {0} rejected")]
    NotInitialized(RequestType),

    /// The request type has no operation.
    #[error("unsupported request: {0}")]
    Unsupported(RequestType),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
