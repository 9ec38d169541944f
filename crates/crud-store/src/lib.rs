//! Reference object store for the CRUD bus.
//!
//! The store holds immutable objects of variable size, each named by a
//! 32-bit OID. Objects never grow or shrink: content is replaced in place
//! only by an update of the same length, and a size change means deleting
//! the object and creating a new one. One reserved *priority object* holds
//! the file allocation table of whoever formats the store.
//!
//! [`StoreSession`] is the bus-facing side. It executes decoded requests
//! against an [`ObjectStore`] and builds the responses, enforcing the
//! session rules (INIT first, CLOSE last). The in-process transport and the
//! TCP server both drive one session per connection.

pub mod error;
pub mod memory;
pub mod session;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryObjectStore;
pub use session::{BusReply, StoreSession};
pub use traits::{ObjectStore, StoredObject};
