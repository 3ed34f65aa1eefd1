//! # Connection Worker
//!
//! One worker per accepted connection: receive an upload into the shared store,
//! then stream the whole store back.
//!
//! ## Design Principles
//!
//! 1. **State Machine Pattern**: `Receiving -> Replying -> Done`, or straight
//!    from `Receiving` to `Done` when no terminator arrives.
//! 2. **One Burst, One Lock**: The guard is taken when the first chunk arrives
//!    and held until the upload ends, so two uploads never interleave.
//! 3. **Bounded Memory**: Uploads and replies move through a fixed-size chunk
//!    buffer; the store is never loaded whole.
//! 4. **Cooperative Cancellation**: Every receive or send timeout re-checks the
//!    running flag.
//! 5. **Owned Stream**: The worker owns its connection and drops it on every
//!    exit path before reporting completion.

use std::io::{self, Read, Write};
use std::net::SocketAddr;

use tracing::{debug, error, info, warn};

use sss_common::{SssError, SssResult, contains_terminator};
use sss_store::DataStore;

use crate::context::ServerContext;
use crate::registry::WorkerId;

/// How the receive phase of a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// A chunk containing the terminator was appended; a reply follows.
    Terminated { appended: usize },
    /// The peer closed, reset or failed before any terminator arrived.
    Closed { appended: usize },
    /// The server stopped while the upload was in progress.
    Cancelled { appended: usize },
}

impl ReceiveOutcome {
    pub fn appended(self) -> usize {
        match self {
            Self::Terminated { appended }
            | Self::Closed { appended }
            | Self::Cancelled { appended } => appended,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Receiving,
    Replying,
    Done { replied: bool },
}

enum Received {
    Data(usize),
    Closed,
    Cancelled,
}

/// Worker entry point: handles `conn` to completion and marks `id` done.
pub fn run_connection<S, C>(ctx: &ServerContext<S>, id: WorkerId, mut conn: C, peer: SocketAddr)
where
    S: DataStore,
    C: Read + Write,
{
    let _done = ctx.registry.done_on_exit(id);
    ctx.stats.record_connection_start();
    info!(worker = %id, peer = %peer, "new client connection");

    let mut state = ConnectionState::Receiving;
    let replied = loop {
        state = match state {
            ConnectionState::Receiving => match append_until_delimiter(ctx, &mut conn) {
                Ok(ReceiveOutcome::Terminated { appended }) => {
                    debug!(worker = %id, bytes = appended, "upload complete");
                    ConnectionState::Replying
                }
                Ok(outcome) => {
                    debug!(
                        worker = %id,
                        ?outcome,
                        bytes = outcome.appended(),
                        "upload ended without terminator"
                    );
                    ConnectionState::Done { replied: false }
                }
                Err(err) => {
                    error!(worker = %id, error = %err, "failed to store upload");
                    ConnectionState::Done { replied: false }
                }
            },
            ConnectionState::Replying => match read_all_and_send(ctx, &mut conn) {
                Ok(sent) => {
                    debug!(worker = %id, bytes = sent, "reply sent");
                    ConnectionState::Done { replied: true }
                }
                Err(err) => {
                    error!(worker = %id, error = %err, "failed to read shared store");
                    ConnectionState::Done { replied: false }
                }
            },
            ConnectionState::Done { replied } => break replied,
        };
    };

    drop(conn);
    ctx.stats.record_connection_end(replied);
    info!(worker = %id, peer = %peer.ip(), "closed connection");
}

/// Receives chunks from `source` and appends them to the shared store until a
/// chunk containing the terminator has been appended.
///
/// The guard is acquired when the first chunk arrives and released when this
/// returns. A peer that closes before sending anything leaves the store
/// untouched.
pub fn append_until_delimiter<S, R>(
    ctx: &ServerContext<S>,
    source: &mut R,
) -> SssResult<ReceiveOutcome>
where
    S: DataStore,
    R: Read,
{
    let mut buf = vec![0u8; ctx.config.chunk_size];
    let first = match receive_chunk(ctx, source, &mut buf) {
        Received::Data(len) => len,
        Received::Closed => return Ok(ReceiveOutcome::Closed { appended: 0 }),
        Received::Cancelled => return Ok(ReceiveOutcome::Cancelled { appended: 0 }),
    };

    ctx.guard.with_exclusive_access(|store| {
        let mut sink = store.open_append()?;
        let mut appended = 0;
        let mut len = first;
        let outcome = loop {
            sink.write_all(&buf[..len]).map_err(SssError::StoreIo)?;
            appended += len;
            ctx.stats.record_appended(len);
            if contains_terminator(&buf[..len]) {
                break ReceiveOutcome::Terminated { appended };
            }
            len = match receive_chunk(ctx, source, &mut buf) {
                Received::Data(len) => len,
                Received::Closed => break ReceiveOutcome::Closed { appended },
                Received::Cancelled => break ReceiveOutcome::Cancelled { appended },
            };
        };
        sink.flush().map_err(SssError::StoreIo)?;
        Ok(outcome)
    })?
}

/// Streams the whole shared store to `destination`, one chunk at a time, while
/// holding the guard.
///
/// Send failures end the reply early but are not errors: the store is intact
/// and the connection is about to close anyway. Returns the bytes sent.
pub fn read_all_and_send<S, W>(ctx: &ServerContext<S>, destination: &mut W) -> SssResult<usize>
where
    S: DataStore,
    W: Write,
{
    let mut buf = vec![0u8; ctx.config.chunk_size];
    ctx.guard.with_exclusive_access(|store| {
        let mut reader = store.open_read()?;
        let mut sent = 0;
        loop {
            let len = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(len) => len,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(SssError::StoreIo(err)),
            };
            if let Err(err) = send_chunk(ctx, destination, &buf[..len]) {
                warn!(error = %err, bytes = sent, "client stopped accepting the reply");
                break;
            }
            sent += len;
        }
        if let Err(err) = destination.flush() {
            warn!(error = %err, "failed to flush reply");
        }
        ctx.stats.record_sent(sent);
        Ok(sent)
    })?
}

fn receive_chunk<S, R>(ctx: &ServerContext<S>, source: &mut R, buf: &mut [u8]) -> Received
where
    S: DataStore,
    R: Read,
{
    loop {
        if !ctx.is_running() {
            return Received::Cancelled;
        }
        match source.read(buf) {
            Ok(0) => {
                debug!("connection closed by peer");
                return Received::Closed;
            }
            Ok(len) => return Received::Data(len),
            Err(err) => {
                let err = SssError::from_stream_io(err);
                if err.is_retryable() {
                    continue;
                }
                warn!(error = %err, "receive failed");
                return Received::Closed;
            }
        }
    }
}

fn send_chunk<S, W>(ctx: &ServerContext<S>, destination: &mut W, mut data: &[u8]) -> SssResult<()>
where
    S: DataStore,
    W: Write,
{
    while !data.is_empty() {
        match destination.write(data) {
            Ok(0) => return Err(SssError::Peer(io::ErrorKind::WriteZero.into())),
            Ok(len) => data = &data[len..],
            Err(err) => {
                let err = SssError::from_stream_io(err);
                if !err.is_retryable() || !ctx.is_running() {
                    return Err(err);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use parking_lot::Mutex;
    use sss_store::MemoryStore;

    use super::*;
    use crate::config::ServerConfig;

    type Ctx = ServerContext<MemoryStore>;

    enum Step {
        Data(&'static [u8]),
        Fail(io::ErrorKind),
    }

    /// Stream that replays a fixed script of reads and records writes.
    struct ScriptedStream {
        incoming: VecDeque<Step>,
        outgoing: Arc<Mutex<Vec<u8>>>,
        refuse_writes: bool,
        stop_when_drained: Option<Arc<Ctx>>,
    }

    impl ScriptedStream {
        fn new(steps: Vec<Step>) -> Self {
            ScriptedStream {
                incoming: steps.into(),
                outgoing: Arc::new(Mutex::new(Vec::new())),
                refuse_writes: false,
                stop_when_drained: None,
            }
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.incoming.pop_front() {
                Some(Step::Data(bytes)) => {
                    buf[..bytes.len()].copy_from_slice(bytes);
                    Ok(bytes.len())
                }
                Some(Step::Fail(kind)) => Err(kind.into()),
                None => match &self.stop_when_drained {
                    Some(ctx) => {
                        ctx.stop();
                        Err(io::ErrorKind::WouldBlock.into())
                    }
                    None => Ok(0),
                },
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.refuse_writes {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.outgoing.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn context() -> Arc<Ctx> {
        let config = ServerConfig::default().with_chunk_size(16);
        Arc::new(ServerContext::new(config, MemoryStore::new()))
    }

    fn stored(ctx: &Ctx) -> Vec<u8> {
        ctx.guard
            .with_exclusive_access(|store| store.snapshot().to_vec())
            .unwrap()
    }

    fn peer() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    /// Store whose next append fails to open; otherwise it is a memory store.
    struct FlakyStore {
        inner: MemoryStore,
        fail_next_append: AtomicBool,
    }

    impl DataStore for FlakyStore {
        fn open_append(&self) -> SssResult<Box<dyn Write + Send + '_>> {
            if self.fail_next_append.swap(false, Ordering::SeqCst) {
                return Err(SssError::StoreOpen {
                    store: self.describe(),
                    source: io::ErrorKind::PermissionDenied.into(),
                });
            }
            self.inner.open_append()
        }

        fn open_read(&self) -> SssResult<Box<dyn Read + Send + '_>> {
            self.inner.open_read()
        }

        fn remove(&self) -> SssResult<bool> {
            self.inner.remove()
        }

        fn describe(&self) -> String {
            "flaky store".to_string()
        }
    }

    /// Runs one connection worker to completion and returns what it sent.
    fn serve<S>(ctx: &Arc<ServerContext<S>>, stream: ScriptedStream) -> Vec<u8>
    where
        S: DataStore + 'static,
    {
        let outgoing = Arc::clone(&stream.outgoing);
        let worker_ctx = Arc::clone(ctx);
        ctx.registry
            .spawn("conn-test", move |id| {
                run_connection(&worker_ctx, id, stream, peer())
            })
            .unwrap();
        for worker in ctx.registry.drain_all() {
            assert!(worker.done);
            assert!(!worker.panicked);
        }
        let sent = outgoing.lock().clone();
        sent
    }

    #[test]
    fn appends_whole_chunk_containing_terminator() {
        let ctx = context();
        let mut stream = ScriptedStream::new(vec![
            Step::Data(b"hel"),
            Step::Data(b"lo\nextra"),
            Step::Data(b"never read"),
        ]);
        let outcome = append_until_delimiter(&ctx, &mut stream).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Terminated { appended: 11 });
        assert_eq!(stored(&ctx), b"hello\nextra");
        assert_eq!(stream.incoming.len(), 1);
    }

    #[test]
    fn retries_timeouts_while_running() {
        let ctx = context();
        let mut stream = ScriptedStream::new(vec![
            Step::Fail(io::ErrorKind::WouldBlock),
            Step::Data(b"a"),
            Step::Fail(io::ErrorKind::TimedOut),
            Step::Fail(io::ErrorKind::Interrupted),
            Step::Data(b"b\n"),
        ]);
        let outcome = append_until_delimiter(&ctx, &mut stream).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Terminated { appended: 3 });
        assert_eq!(stored(&ctx), b"ab\n");
    }

    #[test]
    fn early_close_keeps_partial_upload() {
        let ctx = context();
        let mut stream = ScriptedStream::new(vec![Step::Data(b"partial")]);
        let outcome = append_until_delimiter(&ctx, &mut stream).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Closed { appended: 7 });
        assert_eq!(stored(&ctx), b"partial");
    }

    #[test]
    fn reset_is_treated_as_close() {
        let ctx = context();
        let mut stream = ScriptedStream::new(vec![
            Step::Data(b"abc"),
            Step::Fail(io::ErrorKind::ConnectionReset),
        ]);
        let outcome = append_until_delimiter(&ctx, &mut stream).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Closed { appended: 3 });
    }

    #[test]
    fn silent_close_never_creates_store() {
        let ctx = context();
        let mut stream = ScriptedStream::new(Vec::new());
        let outcome = append_until_delimiter(&ctx, &mut stream).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Closed { appended: 0 });
        let exists = ctx.guard.with_exclusive_access(|store| store.exists()).unwrap();
        assert!(!exists);
    }

    #[test]
    fn stop_cancels_before_and_during_upload() {
        let ctx = context();
        let mut stream = ScriptedStream::new(vec![Step::Data(b"half")]);
        stream.stop_when_drained = Some(Arc::clone(&ctx));
        let outcome = append_until_delimiter(&ctx, &mut stream).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Cancelled { appended: 4 });
        assert!(!ctx.is_running());

        let mut late = ScriptedStream::new(vec![Step::Data(b"late\n")]);
        let outcome = append_until_delimiter(&ctx, &mut late).unwrap();
        assert_eq!(outcome, ReceiveOutcome::Cancelled { appended: 0 });
        assert_eq!(stored(&ctx), b"half");
    }

    #[test]
    fn retired_guard_fails_upload() {
        let ctx = context();
        assert!(ctx.guard.retire().is_some());
        let mut stream = ScriptedStream::new(vec![Step::Data(b"x\n")]);
        let err = append_until_delimiter(&ctx, &mut stream).unwrap_err();
        assert!(matches!(err, SssError::StoreRetired));
    }

    #[test]
    fn reply_streams_store_in_chunks() {
        let ctx = context();
        let body: Vec<u8> = (0..100u8).map(|i| b'a' + i % 26).collect();
        ctx.guard
            .with_exclusive_access(|store| store.open_append().unwrap().write_all(&body).unwrap())
            .unwrap();

        let mut stream = ScriptedStream::new(Vec::new());
        let sent = read_all_and_send(&ctx, &mut stream).unwrap();
        assert_eq!(sent, 100);
        assert_eq!(*stream.outgoing.lock(), body);
        assert_eq!(ctx.stats.snapshot().bytes_sent, 100);
    }

    #[test]
    fn send_failure_leaves_store_intact() {
        let ctx = context();
        ctx.guard
            .with_exclusive_access(|store| {
                store.open_append().unwrap().write_all(b"kept\n").unwrap()
            })
            .unwrap();

        let mut stream = ScriptedStream::new(Vec::new());
        stream.refuse_writes = true;
        assert_eq!(read_all_and_send(&ctx, &mut stream).unwrap(), 0);
        assert_eq!(stored(&ctx), b"kept\n");
    }

    #[test]
    fn replies_with_everything_stored_so_far() {
        let ctx = context();
        let first = serve(&ctx, ScriptedStream::new(vec![Step::Data(b"hello\n")]));
        assert_eq!(first, b"hello\n");

        let second = serve(&ctx, ScriptedStream::new(vec![Step::Data(b"world\n")]));
        assert_eq!(second, b"hello\nworld\n");

        let silent = serve(&ctx, ScriptedStream::new(Vec::new()));
        assert!(silent.is_empty());
        assert_eq!(stored(&ctx), b"hello\nworld\n");

        let snap = ctx.stats.snapshot();
        assert_eq!(snap.connections_accepted, 3);
        assert_eq!(snap.connections_replied, 2);
        assert_eq!(snap.connections_unterminated, 1);
        assert_eq!(snap.inflight, 0);
    }

    #[test]
    fn store_open_failure_aborts_only_that_connection() {
        let config = ServerConfig::default().with_chunk_size(16);
        let store = FlakyStore {
            inner: MemoryStore::new(),
            fail_next_append: AtomicBool::new(true),
        };
        let ctx = Arc::new(ServerContext::new(config, store));

        let failed = serve(&ctx, ScriptedStream::new(vec![Step::Data(b"lost\n")]));
        assert!(failed.is_empty());
        let snap = ctx.stats.snapshot();
        assert_eq!(snap.connections_unterminated, 1);
        assert_eq!(snap.connections_replied, 0);
        assert_eq!(snap.bytes_appended, 0);

        let next = serve(&ctx, ScriptedStream::new(vec![Step::Data(b"kept\n")]));
        assert_eq!(next, b"kept\n");
        let snap = ctx.stats.snapshot();
        assert_eq!(snap.connections_accepted, 2);
        assert_eq!(snap.connections_replied, 1);
        assert_eq!(snap.inflight, 0);
        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn unterminated_upload_gets_no_reply() {
        let ctx = context();
        let sent = serve(&ctx, ScriptedStream::new(vec![Step::Data(b"no newline")]));
        assert!(sent.is_empty());
        assert_eq!(stored(&ctx), b"no newline");
    }
}
