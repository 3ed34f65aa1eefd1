//! # Simple Stream Client
//!
//! Blocking client for the stream server: send one upload, read the reply
//! until the server closes the connection.
//!
//! ## Design Principles
//!
//! 1. **Mirror The Server**: One connection carries one upload and one reply.
//! 2. **Bounded Waits**: Every socket operation has a timeout so a stuck server
//!    fails the call instead of hanging it.
//! 3. **Shared Errors**: Failures use the server's error taxonomy.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use sss_common::{SssError, SssResult};

/// Default connect/read/write timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One connection to the server.
#[derive(Debug)]
pub struct Client {
    stream: TcpStream,
}

impl Client {
    /// Connects to the first reachable address with [`DEFAULT_TIMEOUT`].
    pub fn connect(addr: impl ToSocketAddrs) -> SssResult<Self> {
        Client::connect_timeout(addr, DEFAULT_TIMEOUT)
    }

    /// Connects and applies `timeout` to the connect, reads and writes.
    pub fn connect_timeout(addr: impl ToSocketAddrs, timeout: Duration) -> SssResult<Self> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(SssError::Connection)?
            .collect();
        let mut last_err = std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "no addresses to connect to",
        );
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_read_timeout(Some(timeout))
                        .and_then(|()| stream.set_write_timeout(Some(timeout)))
                        .map_err(SssError::Connection)?;
                    return Ok(Client { stream });
                }
                Err(err) => last_err = err,
            }
        }
        Err(SssError::Connection(last_err))
    }

    /// Sends raw bytes without waiting for anything.
    pub fn send(&mut self, payload: &[u8]) -> SssResult<()> {
        self.stream
            .write_all(payload)
            .map_err(SssError::from_stream_io)
    }

    /// Reads until the server closes the connection.
    pub fn read_reply(&mut self) -> SssResult<Vec<u8>> {
        let mut reply = Vec::new();
        self.stream
            .read_to_end(&mut reply)
            .map_err(SssError::from_stream_io)?;
        Ok(reply)
    }

    /// Sends `payload` and returns the full reply.
    ///
    /// The server only replies once it has seen a line terminator, so
    /// `payload` should contain one.
    pub fn exchange(&mut self, payload: &[u8]) -> SssResult<Vec<u8>> {
        self.send(payload)?;
        self.read_reply()
    }

    /// Closes the write half, telling the server the upload is over.
    pub fn finish(&mut self) -> SssResult<()> {
        self.stream
            .shutdown(Shutdown::Write)
            .map_err(SssError::from_stream_io)
    }

    /// Local end of the connection.
    pub fn local_addr(&self) -> SssResult<SocketAddr> {
        self.stream.local_addr().map_err(SssError::Connection)
    }
}

/// Connects, sends `payload`, and returns the full reply.
pub fn send_line(addr: impl ToSocketAddrs, payload: &[u8]) -> SssResult<Vec<u8>> {
    Client::connect(addr)?.exchange(payload)
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use super::*;

    /// Accepts one connection, reads one line and answers `reply`.
    fn one_shot_server(reply: &'static [u8]) -> (SocketAddr, thread::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            let mut buf = [0u8; 64];
            while !received.contains(&b'\n') {
                let len = stream.read(&mut buf).unwrap();
                if len == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..len]);
            }
            stream.write_all(reply).unwrap();
            received
        });
        (addr, handle)
    }

    #[test]
    fn exchange_reads_until_close() {
        let (addr, server) = one_shot_server(b"hello\nworld\n");
        let reply = send_line(addr, b"world\n").unwrap();
        assert_eq!(reply, b"hello\nworld\n");
        assert_eq!(server.join().unwrap(), b"world\n");
    }

    #[test]
    fn finish_ends_upload_without_reply() {
        let (addr, server) = one_shot_server(b"");
        let mut client = Client::connect(addr).unwrap();
        client.send(b"partial").unwrap();
        client.finish().unwrap();
        assert!(client.read_reply().unwrap().is_empty());
        assert_eq!(server.join().unwrap(), b"partial");
    }

    #[test]
    fn refused_connection_is_an_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };
        let err = Client::connect_timeout(addr, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, SssError::Connection(_)));
    }
}
