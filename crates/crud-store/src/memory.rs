use std::collections::HashMap;
use std::sync::RwLock;

use crud_protocol::{Flags, Oid, MAX_OBJECT_SIZE};

use crate::error::{StoreError, StoreResult};
use crate::traits::{ObjectStore, StoredObject};

#[derive(Default)]
struct Inner {
    objects: HashMap<Oid, Vec<u8>>,
    priority: Option<Oid>,
    last_oid: u32,
}

impl Inner {
    fn resolve(&self, oid: Oid, flags: Flags) -> StoreResult<Oid> {
        if flags.is_priority() {
            return self.priority.ok_or(StoreError::NoPriorityObject);
        }
        if oid.is_none() {
            return Err(StoreError::NullOid);
        }
        Ok(oid)
    }
}

/// In-memory, HashMap-based object store.
///
/// Intended for tests, the in-process bus and the reference server. All
/// objects are held in memory behind a `RwLock`; data is copied on read and
/// write.
pub struct InMemoryObjectStore {
    inner: RwLock<Inner>,
}

impl InMemoryObjectStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Number of objects currently stored, the priority object included.
    pub fn len(&self) -> usize {
        self.inner.read().expect("lock poisoned").objects.len()
    }

    /// Returns `true` if the store holds no objects.
    pub fn is_empty(&self) -> bool {
        self.inner.read().expect("lock poisoned").objects.is_empty()
    }

    /// Total bytes across all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.inner
            .read()
            .expect("lock poisoned")
            .objects
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// OID of the priority object, if one exists.
    pub fn priority_oid(&self) -> Option<Oid> {
        self.inner.read().expect("lock poisoned").priority
    }

    /// Sorted list of all OIDs in the store.
    pub fn all_oids(&self) -> Vec<Oid> {
        let inner = self.inner.read().expect("lock poisoned");
        let mut oids: Vec<Oid> = inner.objects.keys().copied().collect();
        oids.sort();
        oids
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn format(&self) -> StoreResult<()> {
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.objects.clear();
        inner.priority = None;
        Ok(())
    }

    fn create(&self, data: &[u8], flags: Flags) -> StoreResult<Oid> {
        if data.len() > MAX_OBJECT_SIZE as usize {
            return Err(StoreError::TooLarge {
                length: data.len(),
                limit: MAX_OBJECT_SIZE,
            });
        }
        let mut inner = self.inner.write().expect("lock poisoned");
        if flags.is_priority() {
            if let Some(existing) = inner.priority {
                return Err(StoreError::PriorityObjectExists(existing));
            }
        }
        inner.last_oid += 1;
        let oid = Oid::new(inner.last_oid);
        inner.objects.insert(oid, data.to_vec());
        if flags.is_priority() {
            inner.priority = Some(oid);
        }
        Ok(oid)
    }

    fn read(&self, oid: Oid, flags: Flags) -> StoreResult<StoredObject> {
        let inner = self.inner.read().expect("lock poisoned");
        let oid = inner.resolve(oid, flags)?;
        let data = inner.objects.get(&oid).ok_or(StoreError::NotFound(oid))?;
        Ok(StoredObject {
            oid,
            data: data.clone(),
        })
    }

    fn update(&self, oid: Oid, data: &[u8], flags: Flags) -> StoreResult<Oid> {
        let mut inner = self.inner.write().expect("lock poisoned");
        let oid = inner.resolve(oid, flags)?;
        let stored = inner.objects.get_mut(&oid).ok_or(StoreError::NotFound(oid))?;
        if stored.len() != data.len() {
            return Err(StoreError::LengthMismatch {
                oid,
                stored: stored.len() as u32,
                requested: data.len() as u32,
            });
        }
        stored.copy_from_slice(data);
        Ok(oid)
    }

    fn delete(&self, oid: Oid) -> StoreResult<()> {
        if oid.is_none() {
            return Err(StoreError::NullOid);
        }
        let mut inner = self.inner.write().expect("lock poisoned");
        inner.objects.remove(&oid).ok_or(StoreError::NotFound(oid))?;
        if inner.priority == Some(oid) {
            inner.priority = None;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryObjectStore")
            .field("object_count", &self.len())
            .field("priority", &self.priority_oid())
            .finish()
    }
}
