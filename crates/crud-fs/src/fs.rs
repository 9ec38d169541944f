use std::sync::Arc;

use crud_client::{ClientConfig, LocalTransport, ObjectStoreClient, TcpTransport, Transport};
use crud_protocol::{Flags, Oid, MAX_OBJECT_SIZE};
use crud_store::ObjectStore;
use tracing::{debug, info};

use crate::error::{FsError, FsResult};
use crate::table::{validate_path, FileEntry, FileHandle, FileTable};

/// Bytes of payload shown in debug logs.
const PREVIEW_LEN: usize = 16;

fn preview(data: &[u8]) -> String {
    hex::encode(&data[..data.len().min(PREVIEW_LEN)])
}

/// A mounted (or mountable) file system on one object store session.
///
/// Owns the client, and through it the connection, together with the
/// allocation table. Every operation takes `&mut self`, so requests on the
/// bus never interleave.
pub struct CrudFs<T: Transport> {
    client: ObjectStoreClient<T>,
    table: FileTable,
    mounted: bool,
}

impl CrudFs<LocalTransport> {
    /// File system over an in-process store.
    pub fn local(store: Arc<dyn ObjectStore>) -> Self {
        Self::new(ObjectStoreClient::new(LocalTransport::new(store)))
    }
}

impl CrudFs<TcpTransport> {
    /// File system over a remote store. The connection is opened on first use.
    pub fn connect(config: ClientConfig) -> Self {
        let retry = config.retry.clone();
        Self::new(ObjectStoreClient::with_retry(TcpTransport::new(config), retry))
    }
}

impl<T: Transport> CrudFs<T> {
    pub fn new(client: ObjectStoreClient<T>) -> Self {
        Self {
            client,
            table: FileTable::new(),
            mounted: false,
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted
    }

    pub fn table(&self) -> &FileTable {
        &self.table
    }

    pub fn client(&self) -> &ObjectStoreClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut ObjectStoreClient<T> {
        &mut self.client
    }

    /// Handle of `path`, if the file exists. Does not open it.
    pub fn lookup(&self, path: &str) -> Option<FileHandle> {
        self.table.lookup(path)
    }

    /// The table entry behind `handle`, open or not.
    pub fn entry(&self, handle: FileHandle) -> FsResult<&FileEntry> {
        self.table.get(handle).ok_or(FsError::BadHandle(handle))
    }

    // ---- Allocation table ----

    /// Wipe the store and start over with an empty, persisted table.
    pub fn format(&mut self) -> FsResult<()> {
        self.client.format()?;
        // The store is empty now; nothing in the old table is valid.
        self.table = FileTable::new();
        self.mounted = false;
        self.client
            .create(&self.table.encode(), Flags::PRIORITY_OBJECT)?;
        self.mounted = true;
        info!("file system formatted");
        Ok(())
    }

    /// Load the table from the priority object. Every file comes back closed.
    pub fn mount(&mut self) -> FsResult<()> {
        let raw = self.client.read(Oid::NONE, Flags::PRIORITY_OBJECT)?;
        let mut table = FileTable::decode(&raw)?;
        table.close_all();
        info!(files = table.len(), "file system mounted");
        self.table = table;
        self.mounted = true;
        Ok(())
    }

    /// Close every file, persist the table and end the session.
    pub fn unmount(&mut self) -> FsResult<()> {
        if !self.mounted {
            return Err(FsError::NotMounted);
        }
        let mut image = self.table.clone();
        image.close_all();
        self.client
            .update(Oid::NONE, &image.encode(), Flags::PRIORITY_OBJECT)?;
        self.client.close()?;
        self.table = image;
        self.mounted = false;
        info!(files = self.table.len(), "file system unmounted");
        Ok(())
    }

    // ---- Handles ----

    /// Open `path`, creating an empty file if it does not exist. Opening an
    /// existing file rewinds it.
    pub fn open(&mut self, path: &str) -> FsResult<FileHandle> {
        if !self.mounted {
            return Err(FsError::NotMounted);
        }
        validate_path(path)?;

        if let Some(handle) = self.table.lookup(path) {
            if let Some(entry) = self.table.get_mut(handle) {
                entry.open = true;
                entry.position = 0;
            }
            debug!(%handle, path, "reopened file");
            return Ok(handle);
        }

        if self.table.next_handle().is_none() {
            return Err(FsError::TableFull(self.table.len()));
        }
        let oid = self.client.create(&[], Flags::NONE)?;
        let handle = self.table.insert(FileEntry::new(path, oid))?;
        debug!(%handle, path, %oid, "created file");
        Ok(handle)
    }

    pub fn close(&mut self, handle: FileHandle) -> FsResult<()> {
        let entry = self.table.get_mut(handle).ok_or(FsError::BadHandle(handle))?;
        entry.open = false;
        Ok(())
    }

    /// Set the position. Any offset is accepted; reads past the end return
    /// nothing and writes past the end grow the file.
    pub fn seek(&mut self, handle: FileHandle, offset: u32) -> FsResult<()> {
        self.open_entry(handle)?.position = offset;
        Ok(())
    }

    fn open_entry(&mut self, handle: FileHandle) -> FsResult<&mut FileEntry> {
        match self.table.get_mut(handle) {
            Some(entry) if entry.open => Ok(entry),
            Some(_) => Err(FsError::HandleNotOpen(handle)),
            None => Err(FsError::BadHandle(handle)),
        }
    }

    // ---- File I/O ----

    /// Read up to `buf.len()` bytes at the current position.
    pub fn read(&mut self, handle: FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        let (oid, position, length) = {
            let entry = self.open_entry(handle)?;
            (entry.oid, entry.position as usize, entry.length as usize)
        };
        if oid.is_none() {
            return Ok(0);
        }

        let content = self.client.read(oid, Flags::NONE)?;
        let end = length.min(content.len());
        let n = buf.len().min(end.saturating_sub(position));
        if n > 0 {
            buf[..n].copy_from_slice(&content[position..position + n]);
        }

        let entry = self.open_entry(handle)?;
        entry.position += n as u32;
        debug!(%handle, %oid, position, bytes = n, data = %preview(&buf[..n]), "read");
        Ok(n)
    }

    /// Write `data` at the current position, growing the file if the write
    /// crosses its end. Returns the number of bytes written, which is short
    /// only when the file would pass the maximum object size.
    pub fn write(&mut self, handle: FileHandle, data: &[u8]) -> FsResult<usize> {
        let (oid, position, length) = {
            let entry = self.open_entry(handle)?;
            (entry.oid, entry.position, entry.length)
        };
        if data.is_empty() {
            return Ok(0);
        }
        if position >= MAX_OBJECT_SIZE {
            return Err(FsError::FileTooLarge {
                position,
                max: MAX_OBJECT_SIZE,
            });
        }

        let room = (MAX_OBJECT_SIZE - position) as usize;
        let data = &data[..data.len().min(room)];
        let start = position as usize;
        let end = start + data.len();

        let mut content = if oid.is_none() {
            Vec::new()
        } else {
            self.client.read(oid, Flags::NONE)?
        };
        if content.len() < end {
            content.resize(end, 0);
        }
        content[start..end].copy_from_slice(data);

        if end > length as usize {
            // Objects cannot change size: replace the old one.
            if !oid.is_none() {
                self.client.delete(oid)?;
            }
            match self.client.create(&content, Flags::NONE) {
                Ok(new_oid) => {
                    let entry = self.open_entry(handle)?;
                    entry.oid = new_oid;
                    entry.length = end as u32;
                    debug!(%handle, old = %oid, new = %new_oid, length = end, "grew file");
                }
                Err(err) => {
                    let entry = self.open_entry(handle)?;
                    entry.oid = Oid::NONE;
                    entry.length = 0;
                    return Err(err.into());
                }
            }
        } else {
            self.client.update(oid, &content, Flags::NONE)?;
        }

        let entry = self.open_entry(handle)?;
        entry.position = end as u32;
        debug!(%handle, position, bytes = data.len(), data = %preview(data), "write");
        Ok(data.len())
    }
}

impl<T: Transport> std::fmt::Debug for CrudFs<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrudFs")
            .field("mounted", &self.mounted)
            .field("table", &self.table)
            .finish()
    }
}
