//! Listening socket setup and teardown.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use sss_common::{SssError, SssResult};

use crate::config::ServerConfig;

const WAKE_CONNECT_TIMEOUT: Duration = Duration::from_millis(200);

/// A bound, listening socket that has not started accepting yet.
///
/// Binding is separate from starting so the process can daemonize in between.
#[derive(Debug)]
pub struct ServerListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    closer: ListenerCloser,
}

impl ServerListener {
    /// Creates, configures, binds and listens on `config.listen_addr`.
    pub fn bind(config: &ServerConfig) -> SssResult<Self> {
        let addr = config.listen_addr;
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|source| SssError::Listener { op: "socket", source })?;
        socket
            .set_reuse_address(true)
            .map_err(|source| SssError::Listener { op: "setsockopt", source })?;
        socket
            .bind(&addr.into())
            .map_err(|source| SssError::Listener { op: "bind", source })?;
        socket
            .listen(config.backlog)
            .map_err(|source| SssError::Listener { op: "listen", source })?;

        let listener: TcpListener = socket.into();
        let local_addr = listener
            .local_addr()
            .map_err(|source| SssError::Listener { op: "getsockname", source })?;
        let closer = listener
            .try_clone()
            .map(|clone| ListenerCloser {
                socket: Socket::from(clone),
                wake_addr: wake_addr(local_addr),
            })
            .map_err(|source| SssError::Listener { op: "dup", source })?;

        debug!(addr = %local_addr, backlog = config.backlog, "listening");
        Ok(ServerListener {
            listener,
            local_addr,
            closer,
        })
    }

    /// Address the socket is bound to, with the ephemeral port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub(crate) fn into_parts(self) -> (TcpListener, ListenerCloser) {
        (self.listener, self.closer)
    }
}

/// Second handle on the listening socket used to unblock `accept`.
#[derive(Debug)]
pub struct ListenerCloser {
    socket: Socket,
    wake_addr: SocketAddr,
}

impl ListenerCloser {
    /// Makes a thread blocked in `accept` return.
    ///
    /// Linux fails the pending `accept` on `shutdown`; other platforms ignore it,
    /// so a loopback connection is made as well. Both steps are best effort.
    pub fn close(&self) {
        if let Err(err) = self.socket.shutdown(Shutdown::Both) {
            debug!(error = %err, "shutdown on listening socket not supported");
        }
        match TcpStream::connect_timeout(&self.wake_addr, WAKE_CONNECT_TIMEOUT) {
            Ok(_) => debug!("woke acceptor with loopback connection"),
            Err(err) => debug!(error = %err, "loopback wake-up refused"),
        }
    }
}

fn wake_addr(local: SocketAddr) -> SocketAddr {
    let mut addr = local;
    if addr.ip().is_unspecified() {
        let loopback: IpAddr = match addr {
            SocketAddr::V4(_) => Ipv4Addr::LOCALHOST.into(),
            SocketAddr::V6(_) => Ipv6Addr::LOCALHOST.into(),
        };
        addr.set_ip(loopback);
    }
    addr
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn loopback_config() -> ServerConfig {
        ServerConfig::default().with_listen_addr("127.0.0.1:0".parse().unwrap())
    }

    #[test]
    fn wake_addr_maps_unspecified_to_loopback() {
        let v4: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        assert_eq!(wake_addr(v4), "127.0.0.1:9000".parse().unwrap());
        let v6: SocketAddr = "[::]:9000".parse().unwrap();
        assert_eq!(wake_addr(v6), "[::1]:9000".parse().unwrap());
        let bound: SocketAddr = "10.0.0.1:9000".parse().unwrap();
        assert_eq!(wake_addr(bound), bound);
    }

    #[test]
    fn binds_ephemeral_port() {
        let listener = ServerListener::bind(&loopback_config()).unwrap();
        assert_ne!(listener.local_addr().port(), 0);
        TcpStream::connect(listener.local_addr()).unwrap();
    }

    #[test]
    fn close_unblocks_accept() {
        let (listener, closer) = ServerListener::bind(&loopback_config()).unwrap().into_parts();
        let acceptor = thread::spawn(move || listener.accept().map(|_| ()));
        thread::sleep(Duration::from_millis(50));
        closer.close();
        // Either the accept failed or it returned the wake-up connection.
        let _ = acceptor.join().unwrap();
    }
}
