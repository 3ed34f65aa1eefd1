//! Runtime configuration for the stream server.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use sss_store::DEFAULT_DATA_PATH;

/// Port used when none is configured.
pub const DEFAULT_PORT: u16 = 9000;

/// Pending-connection queue length passed to `listen`.
pub const DEFAULT_BACKLOG: i32 = 10;

/// Bytes read from a stream or the store per step.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Socket timeouts must be non-zero; shorter values are raised to this.
pub const MIN_STREAM_TIMEOUT: Duration = Duration::from_millis(1);

/// Settings shared by the acceptor, the workers and the timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the listener binds to.
    pub listen_addr: SocketAddr,
    /// Backing file of the shared store.
    pub data_path: PathBuf,
    /// Listen backlog.
    pub backlog: i32,
    /// Size of one receive/read step.
    pub chunk_size: usize,
    /// Receive timeout; the running flag is checked after each expiry.
    pub receive_timeout: Duration,
    /// Send timeout; the running flag is checked after each expiry.
    pub send_timeout: Duration,
    /// Interval between timestamp records.
    pub tick_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            listen_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)),
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            backlog: DEFAULT_BACKLOG,
            chunk_size: DEFAULT_CHUNK_SIZE,
            receive_timeout: Duration::from_secs(1),
            send_timeout: Duration::from_secs(1),
            tick_interval: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Sets the address to listen on.
    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    /// Sets the shared store file.
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Sets the receive/send chunk size; zero becomes one.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Sets the per-read timeout; clamped to [`MIN_STREAM_TIMEOUT`].
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout.max(MIN_STREAM_TIMEOUT);
        self
    }

    /// Sets the per-write timeout; clamped to [`MIN_STREAM_TIMEOUT`].
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout.max(MIN_STREAM_TIMEOUT);
        self
    }

    /// Sets the time between timestamp records.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_deployment() {
        let config = ServerConfig::default();
        assert_eq!(config.listen_addr.port(), 9000);
        assert_eq!(config.data_path, PathBuf::from("/var/tmp/simple_stream_serverdata"));
        assert_eq!(config.backlog, 10);
        assert_eq!(config.tick_interval, Duration::from_secs(10));
    }

    #[test]
    fn builders_reject_zero_values() {
        let config = ServerConfig::default()
            .with_chunk_size(0)
            .with_receive_timeout(Duration::ZERO)
            .with_send_timeout(Duration::ZERO);
        assert_eq!(config.chunk_size, 1);
        assert_eq!(config.receive_timeout, MIN_STREAM_TIMEOUT);
        assert_eq!(config.send_timeout, MIN_STREAM_TIMEOUT);
    }
}
