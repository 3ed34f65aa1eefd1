pub mod acceptor;
pub mod config;
pub mod context;
pub mod daemon;
pub mod listener;
pub mod registry;
pub mod server;
pub mod signal;
pub mod stats;
pub mod timer;
pub mod worker;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use listener::ServerListener;
pub use registry::{JoinedWorker, Registry, WorkerId, WorkerRecord};
pub use server::{ShutdownReport, StreamServer};
pub use signal::{StopReason, StopSignals};
pub use stats::StatsSnapshot;
