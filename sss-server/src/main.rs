//! # Simple Stream Server
//!
//! Accept TCP connections, append each client's upload to a shared file and
//! answer with the whole file. A timer appends a timestamp line every tick.
//!
//! ## Design Principles
//!
//! 1. **Thread Per Connection**: Each client owns one blocking worker thread.
//! 2. **Bind Before Detach**: Bind errors reach the terminal; threads and the
//!    signal runtime are only created after the optional fork.
//! 3. **Signals As Events**: SIGINT/SIGTERM are received on a small Tokio
//!    runtime and turned into one orderly shutdown.
//! 4. **Clean Exit**: Every worker is joined and the data file removed before
//!    the process exits with status 0.

use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sss_server::daemon::{self, Daemon};
use sss_server::{ServerConfig, ServerListener, StopSignals, StreamServer};
use sss_store::{DEFAULT_DATA_PATH, FileStore};

#[derive(Debug, Parser)]
#[command(name = "simple-stream-server", version, about)]
struct Cli {
    /// Run detached from the controlling terminal.
    #[arg(short = 'd', long)]
    daemon: bool,

    /// Address to listen on.
    #[arg(long, env = "SSS_ADDR", default_value = "0.0.0.0:9000")]
    addr: SocketAddr,

    /// File that collects uploads and timestamps; removed on stop.
    #[arg(long, env = "SSS_DATA_FILE", default_value = DEFAULT_DATA_PATH)]
    data_file: PathBuf,

    /// Seconds between timestamp records.
    #[arg(
        long,
        env = "SSS_TICK_SECS",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    tick_secs: u64,

    /// Write logs here instead of stderr (stderr is discarded in daemon mode).
    #[arg(long, env = "SSS_LOG_FILE")]
    log_file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let config = ServerConfig::default()
        .with_listen_addr(cli.addr)
        .with_data_path(&cli.data_file)
        .with_tick_interval(Duration::from_secs(cli.tick_secs));
    let listener = ServerListener::bind(&config).context("starting server failed")?;
    info!(addr = %listener.local_addr(), "server listening");

    if cli.daemon {
        info!("running in daemon mode");
        if daemon::daemonize().context("failed to daemonize")? == Daemon::Parent {
            return Ok(());
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    let mut signals = {
        let _enter = runtime.enter();
        StopSignals::install().context("failed to install signal handlers")?
    };

    let server = StreamServer::start(listener, config, FileStore::new(cli.data_file))?;
    let reason = runtime.block_on(signals.recv());
    info!(?reason, "caught signal, exiting");

    let report = server.shutdown();
    info!(
        workers_joined = report.workers_joined,
        store_removed = report.store_removed,
        connections = report.stats.connections_accepted,
        "shutdown complete"
    );
    Ok(())
}

fn init_logging(log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_thread_names(true);
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
