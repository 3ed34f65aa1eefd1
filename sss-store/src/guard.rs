//! # Store Guard
//!
//! The single lock that serializes every access to the shared store.
//!
//! ## Design Principles
//!
//! 1. **Scoped Access**: Callers get the store only inside a closure; the lock
//!    is released when the closure returns, errors or unwinds.
//! 2. **Explicit Retirement**: Shutdown takes the store out of the guard once.
//!    Later access attempts fail instead of touching a removed resource.
//! 3. **No Reentrancy**: A closure must not call back into the same guard.
//!    `parking_lot::Mutex` is not reentrant, so doing so deadlocks.

use parking_lot::Mutex;

use sss_common::{SssError, SssResult};

use crate::store::DataStore;

/// Mutual-exclusion guard around one shared store.
#[derive(Debug)]
pub struct StoreGuard<S> {
    slot: Mutex<Option<S>>,
}

impl<S: DataStore> StoreGuard<S> {
    /// Wraps `store`; the guard lives until [`StoreGuard::retire`].
    pub fn new(store: S) -> Self {
        StoreGuard {
            slot: Mutex::new(Some(store)),
        }
    }

    /// Runs `operation` while holding the guard.
    ///
    /// Returns [`SssError::StoreRetired`] without running `operation` once the
    /// guard has been retired.
    pub fn with_exclusive_access<R>(&self, operation: impl FnOnce(&S) -> R) -> SssResult<R> {
        let slot = self.slot.lock();
        match slot.as_ref() {
            Some(store) => Ok(operation(store)),
            None => Err(SssError::StoreRetired),
        }
    }

    /// Takes the store out of the guard.
    ///
    /// Blocks until the current holder releases it. Returns `None` if the guard
    /// was already retired.
    pub fn retire(&self) -> Option<S> {
        self.slot.lock().take()
    }

    /// Returns true once [`StoreGuard::retire`] has run.
    pub fn is_retired(&self) -> bool {
        self.slot.lock().is_none()
    }
}
