//! Stop-signal handling (SIGINT, SIGTERM).

use std::io;

use tokio::signal::unix::{Signal, SignalKind, signal};

/// Which signal asked the server to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Interrupt,
    Terminate,
}

/// Registered handlers for the stop signals.
///
/// Must be created inside a Tokio runtime context. Once installed, the signals
/// no longer terminate the process; they are delivered through [`StopSignals::recv`].
pub struct StopSignals {
    interrupt: Signal,
    terminate: Signal,
}

impl StopSignals {
    pub fn install() -> io::Result<Self> {
        Ok(StopSignals {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Waits for the next stop signal.
    pub async fn recv(&mut self) -> StopReason {
        tokio::select! {
            _ = self.interrupt.recv() => StopReason::Interrupt,
            _ = self.terminate.recv() => StopReason::Terminate,
        }
    }
}
