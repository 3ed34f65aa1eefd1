//! # Timer Worker
//!
//! Appends a timestamp record every tick and joins finished workers in between.
//!
//! The wait between ticks is a condition-variable wait on the registry, so a
//! finished connection worker is joined as soon as it reports completion and a
//! shutdown request ends the wait immediately.

use std::io::Write;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info};

use sss_common::{SssError, SssResult, timestamp_record};
use sss_store::DataStore;

use crate::context::ServerContext;
use crate::registry::WorkerId;

/// Shortest accepted tick interval.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Worker entry point: ticks until the running flag is cleared.
pub fn run_timer<S: DataStore>(ctx: &ServerContext<S>, id: WorkerId) {
    let _done = ctx.registry.done_on_exit(id);
    let interval = ctx.config.tick_interval.max(MIN_TICK_INTERVAL);
    info!(worker = %id, ?interval, "timer started");

    let mut next_tick = Instant::now() + interval;
    while ctx.is_running() {
        if ctx.registry.wait_for_done(next_tick, ctx.running_flag()) {
            let reaped = reap_finished(ctx);
            debug!(worker = %id, reaped, "joined finished workers");
        }
        if !ctx.is_running() {
            break;
        }

        let now = Instant::now();
        if now >= next_tick {
            if let Err(err) = write_timestamp(ctx) {
                error!(worker = %id, error = %err, "failed to append timestamp");
            }
            next_tick += interval;
            if next_tick <= now {
                // Fell behind (e.g. a long upload held the guard); skip missed ticks.
                next_tick = now + interval;
            }
        }
    }

    info!(worker = %id, "exiting timer");
}

/// Joins every worker that has reported completion. Returns how many.
pub fn reap_finished<S: DataStore>(ctx: &ServerContext<S>) -> usize {
    let mut reaped = 0;
    while let Some(record) = ctx.registry.reap_one_done() {
        record.join();
        reaped += 1;
    }
    reaped
}

/// Appends one `timestamp:<date>` line under the guard.
pub fn write_timestamp<S: DataStore>(ctx: &ServerContext<S>) -> SssResult<()> {
    let record = timestamp_record(&Local::now());
    info!(record = record.trim_end(), "appending timestamp");
    ctx.guard.with_exclusive_access(|store| {
        let mut sink = store.open_append()?;
        sink.write_all(record.as_bytes())
            .and_then(|()| sink.flush())
            .map_err(SssError::StoreIo)
    })??;
    ctx.stats.record_timestamp();
    Ok(())
}
