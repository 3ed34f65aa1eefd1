//! # Simple Stream Server Error Types
//!
//! ## Design Principles
//!
//! 1. **Categorized Failures**: Each variant belongs to one category (transient,
//!    peer, resource, invariant, shutdown) that decides how the caller reacts.
//! 2. **Source Preservation**: I/O failures keep their `std::io::Error` source so
//!    logs show the OS reason.
//! 3. **Local Containment**: No variant is ever rendered to a client; errors end
//!    at the connection or the shutdown path that observed them.
//! 4. **Recoverability Hints**: Transient errors are explicitly marked as retryable.

use std::io;

use thiserror::Error;

/// Result type used across the simple stream server components.
pub type SssResult<T> = core::result::Result<T, SssError>;

/// High-level category for grouping errors.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum SssErrorCategory {
    /// Timeouts and interrupted calls; retried while the server is running.
    Transient,
    /// The peer closed or reset the stream.
    Peer,
    /// A store, worker or listener could not be acquired.
    Resource,
    /// Internal bookkeeping disagreed with itself.
    Invariant,
    /// Best-effort cleanup during shutdown failed.
    Shutdown,
}

impl SssErrorCategory {
    /// Returns true if the category is safe to retry.
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Errors raised by the store, registry, workers and lifecycle code.
#[derive(Debug, Error)]
pub enum SssError {
    /// A receive or send timed out or was interrupted.
    #[error("transient stream error: {0}")]
    Transient(#[source] io::Error),

    /// The peer went away (reset, broken pipe, unexpected close).
    #[error("peer stream error: {0}")]
    Peer(#[source] io::Error),

    /// The shared store could not be opened.
    #[error("failed to open {store}: {source}")]
    StoreOpen {
        store: String,
        #[source]
        source: io::Error,
    },

    /// Reading from or writing to an open store handle failed.
    #[error("shared store i/o failed: {0}")]
    StoreIo(#[source] io::Error),

    /// The guard was retired during shutdown; the store is no longer reachable.
    #[error("shared store has been retired")]
    StoreRetired,

    /// A worker thread could not be started.
    #[error("failed to spawn worker {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Listener setup (socket, bind, listen) failed.
    #[error("listener setup failed ({op}): {source}")]
    Listener {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    /// An accepted connection could not be configured.
    #[error("failed to configure connection: {0}")]
    Connection(#[source] io::Error),

    /// A worker identity was not present in the registry.
    #[error("unknown worker {0}")]
    UnknownWorker(String),

    /// Cleanup during shutdown failed.
    #[error("shutdown cleanup failed ({op}): {source}")]
    Cleanup {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

impl SssError {
    /// Classifies an error observed on a client stream.
    pub fn from_stream_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => {
                Self::Transient(err)
            }
            _ => Self::Peer(err),
        }
    }

    /// Returns the coarse category of the error.
    pub const fn category(&self) -> SssErrorCategory {
        match self {
            Self::Transient(_) => SssErrorCategory::Transient,
            Self::Peer(_) => SssErrorCategory::Peer,
            Self::StoreOpen { .. }
            | Self::StoreIo(_)
            | Self::StoreRetired
            | Self::Spawn { .. }
            | Self::Listener { .. }
            | Self::Connection(_) => SssErrorCategory::Resource,
            Self::UnknownWorker(_) => SssErrorCategory::Invariant,
            Self::Cleanup { .. } => SssErrorCategory::Shutdown,
        }
    }

    /// Returns true if callers should retry the operation.
    pub const fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{SssError, SssErrorCategory};

    #[test]
    fn classifies_stream_errors() {
        let timeout = SssError::from_stream_io(io::Error::from(io::ErrorKind::WouldBlock));
        assert_eq!(timeout.category(), SssErrorCategory::Transient);

        let timed_out = SssError::from_stream_io(io::Error::from(io::ErrorKind::TimedOut));
        assert!(timed_out.is_retryable());

        let reset = SssError::from_stream_io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert_eq!(reset.category(), SssErrorCategory::Peer);
        assert!(!reset.is_retryable());
    }

    #[test]
    fn maps_error_categories() {
        assert_eq!(SssError::StoreRetired.category(), SssErrorCategory::Resource);
        assert_eq!(
            SssError::UnknownWorker("worker#3".into()).category(),
            SssErrorCategory::Invariant
        );
        let cleanup = SssError::Cleanup {
            op: "remove store",
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(cleanup.category(), SssErrorCategory::Shutdown);
    }

    #[test]
    fn display_keeps_source_reason() {
        let err = SssError::StoreOpen {
            store: "file /tmp/data".into(),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to open file /tmp/data: denied");
    }
}
