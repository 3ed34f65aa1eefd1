//! Accept loop: one connection worker per accepted stream.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use sss_common::{SssError, SssResult};
use sss_store::DataStore;

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::registry::WorkerId;
use crate::worker;

/// Pause after an accept error so a persistent failure (e.g. out of file
/// descriptors) does not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Accepts connections until the running flag is cleared and the listener is
/// closed underneath it.
pub fn run_acceptor<S>(ctx: Arc<ServerContext<S>>, listener: TcpListener)
where
    S: DataStore + 'static,
{
    info!("accepting connections");
    while ctx.is_running() {
        match listener.accept() {
            Ok((stream, peer)) => {
                if !ctx.is_running() {
                    debug!(peer = %peer, "closing connection accepted during shutdown");
                    break;
                }
                if let Err(err) = dispatch(&ctx, stream, peer) {
                    error!(peer = %peer, error = %err, "dropping connection");
                }
            }
            Err(err) if !ctx.is_running() => {
                debug!(error = %err, "accept ended by shutdown");
                break;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(error = %err, "accept failed");
                thread::sleep(ACCEPT_ERROR_BACKOFF);
            }
        }
    }
    info!("acceptor stopped");
}

/// Configures `stream` and hands it to a new registered worker.
///
/// On any failure the stream is dropped, which closes the connection.
fn dispatch<S>(
    ctx: &Arc<ServerContext<S>>,
    stream: TcpStream,
    peer: SocketAddr,
) -> SssResult<WorkerId>
where
    S: DataStore + 'static,
{
    configure_stream(&stream, &ctx.config).map_err(SssError::Connection)?;

    let worker_ctx = Arc::clone(ctx);
    let id = ctx
        .registry
        .spawn(format!("conn-{peer}"), move |id| {
            worker::run_connection(&worker_ctx, id, stream, peer)
        })
        .inspect_err(|_| ctx.stats.record_spawn_failure())?;
    info!(worker = %id, peer = %peer.ip(), "accepted connection");
    Ok(id)
}

fn configure_stream(stream: &TcpStream, config: &ServerConfig) -> io::Result<()> {
    stream.set_read_timeout(Some(config.receive_timeout))?;
    stream.set_write_timeout(Some(config.send_timeout))?;
    Ok(())
}
