//! # Shared Store Interface
//!
//! ## Design Principles
//!
//! 1. **Strategy Pattern**: Abstract the backing resource behind a trait so the
//!    file-backed store and the in-memory store are interchangeable.
//! 2. **Whole Operations Only**: The surface is "append", "read all" and
//!    "remove". No seeking, no partial overwrite.
//! 3. **Handle Per Burst**: An append handle stays open for a whole upload so
//!    the store is opened once per connection, not once per chunk.
//! 4. **No Internal Locking Contract**: Exclusivity is the caller's job, through
//!    [`crate::StoreGuard`].

use std::io::{Read, Write};

use sss_common::SssResult;

/// Strategy pattern: defines the shared byte store the workers write into.
///
/// Implementations must be `Send + Sync` so one instance can sit behind the
/// guard and be reached from every worker thread.
pub trait DataStore: Send + Sync {
    /// Opens an append handle, creating the store if it does not exist yet.
    fn open_append(&self) -> SssResult<Box<dyn Write + Send + '_>>;

    /// Opens a reader positioned at the first byte.
    ///
    /// Each call starts over. An absent store reads as empty.
    fn open_read(&self) -> SssResult<Box<dyn Read + Send + '_>>;

    /// Deletes the backing resource. Returns `false` if it was already absent.
    fn remove(&self) -> SssResult<bool>;

    /// Human-readable name used in logs and error messages.
    fn describe(&self) -> String;
}
