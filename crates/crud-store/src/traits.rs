use crud_protocol::{Flags, Oid};

use crate::error::StoreResult;

/// An object fetched from the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub oid: Oid,
    pub data: Vec<u8>,
}

impl StoredObject {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Store of immutable, variable-sized objects.
///
/// All implementations must satisfy these invariants:
/// - An object's length is fixed at creation. `update` replaces content of
///   exactly the same length; anything else requires delete and recreate.
/// - OIDs are never zero and never reused.
/// - At most one priority object exists. Operations carrying
///   `Flags::PRIORITY_OBJECT` address it regardless of the OID given.
/// - Every operation is atomic: on error nothing changed.
pub trait ObjectStore: Send + Sync {
    /// Delete every object, the priority object included.
    fn format(&self) -> StoreResult<()>;

    /// Create an object holding `data` and return its new OID.
    fn create(&self, data: &[u8], flags: Flags) -> StoreResult<Oid>;

    /// Fetch a whole object.
    fn read(&self, oid: Oid, flags: Flags) -> StoreResult<StoredObject>;

    /// Replace the content of an object with `data` of identical length.
    /// Returns the OID that was updated.
    fn update(&self, oid: Oid, data: &[u8], flags: Flags) -> StoreResult<Oid>;

    /// Delete an object.
    fn delete(&self, oid: Oid) -> StoreResult<()>;
}
