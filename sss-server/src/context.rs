//! Shared state handed to the acceptor and every worker.

use std::sync::atomic::{AtomicBool, Ordering};

use sss_store::{DataStore, StoreGuard};

use crate::config::ServerConfig;
use crate::registry::Registry;
use crate::stats::ServerStats;

/// Registry, store guard and running flag bundled for one server instance.
///
/// Passed as an `Arc` at spawn time; nothing here is global.
#[derive(Debug)]
pub struct ServerContext<S> {
    pub config: ServerConfig,
    pub registry: Registry,
    pub guard: StoreGuard<S>,
    pub stats: ServerStats,
    running: AtomicBool,
}

impl<S: DataStore> ServerContext<S> {
    /// Creates a running context that owns `store` behind a fresh guard.
    pub fn new(config: ServerConfig, store: S) -> Self {
        ServerContext {
            config,
            registry: Registry::new(),
            guard: StoreGuard::new(store),
            stats: ServerStats::new(),
            running: AtomicBool::new(true),
        }
    }

    /// True until shutdown clears the running flag.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The raw flag, for waits that must re-check it under another lock.
    pub fn running_flag(&self) -> &AtomicBool {
        &self.running
    }

    /// Flips the running flag to false and wakes waiting workers.
    ///
    /// Returns `false` if the flag was already cleared.
    pub fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::AcqRel);
        if was_running {
            self.registry.wake_all();
        }
        was_running
    }
}
