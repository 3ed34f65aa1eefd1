//! # Stream Server Lifecycle
//!
//! Starts the timer and the acceptor, and owns the shutdown sequence.
//!
//! ## Shutdown Order
//!
//! 1. Clear the running flag and wake waiting workers.
//! 2. Close the listener and join the acceptor thread.
//! 3. Drain the registry, joining every worker including the timer.
//! 4. Retire the store guard.
//! 5. Remove the shared store.
//!
//! Each step finishes before the next starts. The guard is only retired once
//! no worker can ask for it, and the store is only removed once no append can
//! be in flight.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use sss_common::{SssError, SssResult};
use sss_store::{DataStore, FileStore};

use crate::acceptor;
use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::listener::{ListenerCloser, ServerListener};
use crate::stats::StatsSnapshot;
use crate::timer;

/// What a call to [`StreamServer::shutdown`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// True if an earlier call already ran the shutdown sequence.
    pub already_stopped: bool,
    /// Workers joined while draining the registry (the timer included).
    pub workers_joined: usize,
    /// True if the shared store existed and was removed.
    pub store_removed: bool,
    /// Counters at the end of shutdown.
    pub stats: StatsSnapshot,
}

/// A running server: acceptor thread, timer worker and connection workers.
///
/// Dropping the server runs [`StreamServer::shutdown`].
pub struct StreamServer<S: DataStore + 'static> {
    ctx: Arc<ServerContext<S>>,
    local_addr: SocketAddr,
    closer: ListenerCloser,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

impl StreamServer<FileStore> {
    /// Binds `config.listen_addr` and starts serving into `config.data_path`.
    pub fn serve(config: ServerConfig) -> SssResult<Self> {
        let listener = ServerListener::bind(&config)?;
        let store = FileStore::new(config.data_path.clone());
        StreamServer::start(listener, config, store)
    }
}

impl<S: DataStore + 'static> StreamServer<S> {
    /// Spawns the timer worker and the acceptor on an already bound listener.
    pub fn start(listener: ServerListener, config: ServerConfig, store: S) -> SssResult<Self> {
        let local_addr = listener.local_addr();
        let (listener, closer) = listener.into_parts();
        let server = StreamServer {
            ctx: Arc::new(ServerContext::new(config, store)),
            local_addr,
            closer,
            acceptor: Mutex::new(None),
        };

        let timer_ctx = Arc::clone(&server.ctx);
        if let Err(err) = server
            .ctx
            .registry
            .spawn("timer", move |id| timer::run_timer(&timer_ctx, id))
        {
            server.shutdown();
            return Err(err);
        }

        let acceptor_ctx = Arc::clone(&server.ctx);
        let spawned = thread::Builder::new()
            .name("acceptor".to_string())
            .spawn(move || acceptor::run_acceptor(acceptor_ctx, listener));
        match spawned {
            Ok(handle) => *server.acceptor.lock() = Some(handle),
            Err(source) => {
                server.shutdown();
                return Err(SssError::Spawn {
                    name: "acceptor".to_string(),
                    source,
                });
            }
        }

        info!(addr = %local_addr, store = %server.describe_store(), "server started");
        Ok(server)
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// True until [`StreamServer::shutdown`] starts.
    pub fn is_running(&self) -> bool {
        self.ctx.is_running()
    }

    /// Current counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Stops accepting, joins every worker and removes the shared store.
    ///
    /// Only the first call does anything; later calls return immediately with
    /// `already_stopped` set.
    pub fn shutdown(&self) -> ShutdownReport {
        if !self.ctx.stop() {
            debug!("shutdown already requested");
            return ShutdownReport {
                already_stopped: true,
                workers_joined: 0,
                store_removed: false,
                stats: self.stats(),
            };
        }
        info!("server is stopping");

        self.closer.close();
        if let Some(handle) = self.acceptor.lock().take() {
            if handle.join().is_err() {
                warn!("acceptor thread panicked");
            }
        }

        let workers_joined = self.ctx.registry.drain_all().count();

        let store_removed = match self.ctx.guard.retire() {
            Some(store) => match store.remove() {
                Ok(removed) => removed,
                Err(err) => {
                    warn!(error = %err, "failed to remove shared store");
                    false
                }
            },
            None => {
                warn!("store guard was already retired");
                false
            }
        };

        let stats = self.stats();
        info!(workers_joined, store_removed, ?stats, "server stopped");
        ShutdownReport {
            already_stopped: false,
            workers_joined,
            store_removed,
            stats,
        }
    }

    fn describe_store(&self) -> String {
        self.ctx
            .guard
            .with_exclusive_access(|store| store.describe())
            .unwrap_or_else(|_| "retired store".to_string())
    }
}

impl<S: DataStore + 'static> Drop for StreamServer<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
