//! POSIX-like file layer over the CRUD object store.
//!
//! Objects in the store are immutable in size, so this crate maps file
//! semantics onto whole-object operations:
//!
//! - a file is one object, fetched whole on every read and write;
//! - a write that stays within the current length is an UPDATE of the
//!   full object;
//! - a write that crosses the end of the file *grows* it: the old object
//!   is deleted and a new, longer one is created in its place.
//!
//! The path to OID mapping lives in a [`FileTable`] that is persisted as the
//! store's priority object whenever the file system is formatted or
//! unmounted, and loaded back on mount.
//!
//! [`CrudFs`] is the entry point and owns the whole session: the client, its
//! connection and the table.

pub mod error;
pub mod fs;
pub mod table;

pub use error::{ErrorKind, FsError, FsResult};
pub use fs::CrudFs;
pub use table::{FileEntry, FileHandle, FileTable, ENTRY_SIZE, MAX_PATH_LENGTH, MAX_TOTAL_FILES, TABLE_SIZE};

// Re-export key types
pub use crud_client::{ClientConfig, LocalTransport, ObjectStoreClient, TcpTransport, Transport};
pub use crud_protocol::{Oid, MAX_OBJECT_SIZE};
