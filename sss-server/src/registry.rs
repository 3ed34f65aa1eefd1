//! # Worker Registry
//!
//! Tracks every spawned worker thread until someone joins it.
//!
//! ## Design Principles
//!
//! 1. **Arena Storage**: Records live in a `Slab`; a [`WorkerId`] is a slot plus a
//!    serial, so a stale identity never matches a reused slot.
//! 2. **Atomic Registration**: A worker is spawned while the registry lock is
//!    held, so its record exists before it can possibly report completion.
//! 3. **Join Outside The Lock**: Reaping detaches a finished record and draining
//!    takes out a join handle; the blocking join happens after the lock is
//!    released. A drained record is removed only after its join returns.
//! 4. **Completion Signal**: `mark_done` notifies a condition variable, so a
//!    reaper waits for work instead of polling.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use slab::Slab;
use tracing::{debug, warn};

use sss_common::{SssError, SssResult};

/// Identity handed to a worker at spawn time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WorkerId {
    slot: usize,
    serial: u64,
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.serial)
    }
}

/// A registered worker: identity, completion flag and join handle.
///
/// While [`Registry::drain_all`] joins a worker its handle is taken out, but
/// the record stays registered until the join returns.
#[derive(Debug)]
pub struct WorkerRecord {
    id: WorkerId,
    name: String,
    done: bool,
    handle: Option<JoinHandle<()>>,
}

impl WorkerRecord {
    /// Identity handed to the worker at spawn time.
    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Thread name given at spawn time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True once the worker has reported completion.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Waits for the worker thread to exit.
    ///
    /// Returns `false` if the worker panicked.
    pub fn join(mut self) -> bool {
        match self.handle.take() {
            Some(handle) => join_worker(self.id, &self.name, handle),
            None => true,
        }
    }

    fn is_draining(&self) -> bool {
        self.handle.is_none()
    }
}

fn join_worker(id: WorkerId, name: &str, handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => {
            debug!(worker = %id, name, "joined worker");
            true
        }
        Err(_) => {
            warn!(worker = %id, name, "worker panicked before joining");
            false
        }
    }
}

/// A worker joined by [`Registry::drain_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedWorker {
    pub id: WorkerId,
    pub name: String,
    /// True if the worker reported completion before its thread exited.
    pub done: bool,
    /// True if the worker thread panicked.
    pub panicked: bool,
}

#[derive(Debug, Default)]
struct RegistryState {
    records: Slab<WorkerRecord>,
    next_serial: u64,
    /// Finished records that `reap_one_done` may still detach.
    done: usize,
}

/// Thread-safe collection of spawned workers.
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
    changed: Condvar,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Spawns `worker` on a named thread and registers it with `done = false`.
    ///
    /// The worker receives its own identity and must report completion through
    /// [`Registry::mark_done`] or [`Registry::done_on_exit`]. If the thread cannot
    /// be started, `worker` is dropped along with everything it owns.
    pub fn spawn<F>(&self, name: impl Into<String>, worker: F) -> SssResult<WorkerId>
    where
        F: FnOnce(WorkerId) + Send + 'static,
    {
        let name = name.into();
        let mut state = self.state.lock();
        let serial = state.next_serial;
        state.next_serial += 1;

        let entry = state.records.vacant_entry();
        let id = WorkerId {
            slot: entry.key(),
            serial,
        };
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker(id))
            .map_err(|source| SssError::Spawn {
                name: name.clone(),
                source,
            })?;

        debug!(worker = %id, name = %name, "registered worker");
        entry.insert(WorkerRecord {
            id,
            name,
            done: false,
            handle: Some(handle),
        });
        Ok(id)
    }

    /// Marks the worker as finished and wakes any reaper.
    ///
    /// An identity that is not registered is logged and ignored.
    pub fn mark_done(&self, id: WorkerId) -> bool {
        let mut state = self.state.lock();
        let reapable = match state.records.get_mut(id.slot) {
            Some(record) if record.id == id => {
                let reapable = !record.done && !record.is_draining();
                record.done = true;
                reapable
            }
            _ => {
                warn!(worker = %id, "mark_done for unknown worker");
                return false;
            }
        };
        if reapable {
            state.done += 1;
            self.changed.notify_all();
        }
        true
    }

    /// Returns a guard that marks `id` done when dropped, including on unwind.
    pub fn done_on_exit(&self, id: WorkerId) -> DoneGuard<'_> {
        DoneGuard { registry: self, id }
    }

    /// Detaches the first finished worker, if any.
    ///
    /// The caller joins the returned record after the registry lock is gone.
    pub fn reap_one_done(&self) -> Option<WorkerRecord> {
        let mut state = self.state.lock();
        if state.done == 0 {
            return None;
        }
        let key = state
            .records
            .iter()
            .find(|(_, record)| record.done && !record.is_draining())
            .map(|(key, _)| key)?;
        state.done -= 1;
        Some(state.records.remove(key))
    }

    /// Joins every worker, finished or not, one at a time until empty.
    ///
    /// A record stays registered while its thread is joined, so a worker that
    /// is still running can report completion normally. It is removed once the
    /// join returns. The lock is not held during the join.
    pub fn drain_all(&self) -> Drain<'_> {
        Drain { registry: self }
    }

    /// Blocks until a finished worker is waiting to be reaped, `running` turns
    /// false, or `deadline` passes. Returns true if a finished worker is waiting.
    pub fn wait_for_done(&self, deadline: Instant, running: &AtomicBool) -> bool {
        let mut state = self.state.lock();
        while state.done == 0 && running.load(Ordering::Acquire) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.done > 0
    }

    /// Wakes every thread blocked in [`Registry::wait_for_done`].
    ///
    /// Taking the lock first means a waiter is either already parked or has not
    /// yet checked its flag, so the wake-up cannot be lost.
    pub fn wake_all(&self) {
        let _state = self.state.lock();
        self.changed.notify_all();
    }

    /// Number of registered workers, including ones being drained.
    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    /// True if no worker is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Marks its worker done on drop.
#[must_use = "the worker is marked done when this guard drops"]
pub struct DoneGuard<'a> {
    registry: &'a Registry,
    id: WorkerId,
}

impl Drop for DoneGuard<'_> {
    fn drop(&mut self) {
        self.registry.mark_done(self.id);
    }
}

/// Iterator returned by [`Registry::drain_all`].
pub struct Drain<'a> {
    registry: &'a Registry,
}

impl Iterator for Drain<'_> {
    type Item = JoinedWorker;

    fn next(&mut self) -> Option<JoinedWorker> {
        let (id, name, handle) = {
            let mut guard = self.registry.state.lock();
            let state = &mut *guard;
            let (_, record) = state
                .records
                .iter_mut()
                .find(|(_, record)| !record.is_draining())?;
            if record.done {
                state.done -= 1;
            }
            let handle = record.handle.take()?;
            (record.id, record.name.clone(), handle)
        };

        let clean = join_worker(id, &name, handle);

        let mut state = self.registry.state.lock();
        let ours = state.records.get(id.slot).is_some_and(|record| record.id == id);
        let done = ours && state.records.remove(id.slot).done;
        Some(JoinedWorker {
            id,
            name,
            done,
            panicked: !clean,
        })
    }
}
