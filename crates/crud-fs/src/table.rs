//! The file allocation table.
//!
//! The table is a fixed array of [`MAX_TOTAL_FILES`] slots; a file's handle
//! is its slot index. Serialized, every slot takes exactly [`ENTRY_SIZE`]
//! bytes (big-endian integers):
//!
//! ```text
//! [128 bytes: path, UTF-8, zero padded; all zero marks an empty slot]
//! [4 bytes: oid]
//! [4 bytes: position]
//! [4 bytes: length]
//! [1 byte: open flag]
//! ```

use std::collections::HashMap;
use std::fmt;

use bytes::{Buf, BufMut, BytesMut};
use crud_protocol::Oid;

use crate::error::{FsError, FsResult};

pub const MAX_TOTAL_FILES: usize = 1024;
pub const MAX_PATH_LENGTH: usize = 128;
pub const ENTRY_SIZE: usize = MAX_PATH_LENGTH + 4 + 4 + 4 + 1;
/// Size of the serialized table, and so of the priority object.
pub const TABLE_SIZE: usize = MAX_TOTAL_FILES * ENTRY_SIZE;

/// Index of a file in the allocation table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileHandle(u16);

impl FileHandle {
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One known file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub oid: Oid,
    pub position: u32,
    pub length: u32,
    pub open: bool,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, oid: Oid) -> Self {
        Self {
            path: path.into(),
            oid,
            position: 0,
            length: 0,
            open: true,
        }
    }
}

/// Reject paths the serialized table cannot hold.
pub fn validate_path(path: &str) -> FsResult<()> {
    if path.is_empty() || path.contains('\0') {
        return Err(FsError::InvalidPath(path.to_string()));
    }
    if path.len() > MAX_PATH_LENGTH {
        return Err(FsError::PathTooLong {
            len: path.len(),
            max: MAX_PATH_LENGTH,
        });
    }
    Ok(())
}

/// In-memory allocation table.
///
/// Slots are handed out in order; after a mount the next handle is the
/// first empty slot. Path lookup goes through a map kept in step with the
/// slots.
#[derive(Clone)]
pub struct FileTable {
    slots: Vec<Option<FileEntry>>,
    by_path: HashMap<String, FileHandle>,
    next_handle: usize,
}

impl FileTable {
    /// An all-empty table.
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_TOTAL_FILES],
            by_path: HashMap::new(),
            next_handle: 0,
        }
    }

    /// Number of files in the table.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Handle the next new file will get.
    pub fn next_handle(&self) -> Option<FileHandle> {
        (self.next_handle < MAX_TOTAL_FILES).then(|| FileHandle(self.next_handle as u16))
    }

    pub fn lookup(&self, path: &str) -> Option<FileHandle> {
        self.by_path.get(path).copied()
    }

    pub fn get(&self, handle: FileHandle) -> Option<&FileEntry> {
        self.slots.get(handle.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, handle: FileHandle) -> Option<&mut FileEntry> {
        self.slots.get_mut(handle.index()).and_then(Option::as_mut)
    }

    /// Store a new entry under the next free handle.
    pub fn insert(&mut self, entry: FileEntry) -> FsResult<FileHandle> {
        let handle = self.next_handle().ok_or(FsError::TableFull(MAX_TOTAL_FILES))?;
        self.by_path.insert(entry.path.clone(), handle);
        self.slots[handle.index()] = Some(entry);
        self.next_handle = self.first_empty_from(handle.index() + 1);
        Ok(handle)
    }

    /// Close every file and rewind it.
    pub fn close_all(&mut self) {
        for entry in self.slots.iter_mut().flatten() {
            entry.open = false;
            entry.position = 0;
        }
    }

    /// Handles and entries of all files, in handle order.
    pub fn iter(&self) -> impl Iterator<Item = (FileHandle, &FileEntry)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (FileHandle(i as u16), e)))
    }

    fn first_empty_from(&self, start: usize) -> usize {
        (start..MAX_TOTAL_FILES)
            .find(|&i| self.slots[i].is_none())
            .unwrap_or(MAX_TOTAL_FILES)
    }

    /// Serialize into exactly [`TABLE_SIZE`] bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(TABLE_SIZE);
        for slot in &self.slots {
            match slot {
                Some(entry) => {
                    buf.put_slice(entry.path.as_bytes());
                    buf.put_bytes(0, MAX_PATH_LENGTH - entry.path.len());
                    buf.put_u32(entry.oid.get());
                    buf.put_u32(entry.position);
                    buf.put_u32(entry.length);
                    buf.put_u8(u8::from(entry.open));
                }
                None => buf.put_bytes(0, ENTRY_SIZE),
            }
        }
        buf.to_vec()
    }

    /// Parse a serialized table.
    pub fn decode(data: &[u8]) -> FsResult<Self> {
        if data.len() != TABLE_SIZE {
            return Err(FsError::CorruptTable(format!(
                "expected {TABLE_SIZE} bytes, got {}",
                data.len()
            )));
        }
        let mut table = Self::new();
        let mut cursor = data;
        for index in 0..MAX_TOTAL_FILES {
            let mut raw_path = [0u8; MAX_PATH_LENGTH];
            cursor.copy_to_slice(&mut raw_path);
            let oid = Oid::new(cursor.get_u32());
            let position = cursor.get_u32();
            let length = cursor.get_u32();
            let open = cursor.get_u8() != 0;

            let path_len = raw_path.iter().position(|&b| b == 0).unwrap_or(MAX_PATH_LENGTH);
            if path_len == 0 {
                continue;
            }
            let path = std::str::from_utf8(&raw_path[..path_len])
                .map_err(|e| FsError::CorruptTable(format!("slot {index}: {e}")))?
                .to_string();
            let handle = FileHandle(index as u16);
            if table.by_path.insert(path.clone(), handle).is_some() {
                return Err(FsError::CorruptTable(format!("slot {index}: duplicate path {path:?}")));
            }
            table.slots[index] = Some(FileEntry {
                path,
                oid,
                position,
                length,
                open,
            });
        }
        table.next_handle = table.first_empty_from(0);
        Ok(table)
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTable")
            .field("files", &self.len())
            .field("next_handle", &self.next_handle)
            .finish()
    }
}
