//! # In-Memory Store
//!
//! A [`DataStore`] kept in a `BytesMut`. Handy for tests and for embedding the
//! workers without touching the filesystem.

use std::io::{self, Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use parking_lot::Mutex;

use sss_common::SssResult;

use crate::store::DataStore;

/// In-memory shared store.
///
/// The inner lock only keeps the buffer itself consistent; cross-operation
/// exclusivity still comes from the guard.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryState>,
}

#[derive(Debug, Default)]
struct MemoryState {
    data: BytesMut,
    exists: bool,
}

impl MemoryStore {
    /// Creates an empty, not-yet-existing store.
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Returns a copy of the current contents.
    pub fn snapshot(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.lock().data)
    }

    /// Returns true once something opened the store for appending.
    pub fn exists(&self) -> bool {
        self.inner.lock().exists
    }
}

impl DataStore for MemoryStore {
    fn open_append(&self) -> SssResult<Box<dyn Write + Send + '_>> {
        self.inner.lock().exists = true;
        Ok(Box::new(MemoryAppender { store: self }))
    }

    fn open_read(&self) -> SssResult<Box<dyn Read + Send + '_>> {
        Ok(Box::new(self.snapshot().reader()))
    }

    fn remove(&self) -> SssResult<bool> {
        let mut state = self.inner.lock();
        let existed = state.exists;
        state.data.clear();
        state.exists = false;
        Ok(existed)
    }

    fn describe(&self) -> String {
        "memory store".to_string()
    }
}

struct MemoryAppender<'a> {
    store: &'a MemoryStore,
}

impl Write for MemoryAppender<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.store.inner.lock().data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
