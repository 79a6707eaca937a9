//! Background maintenance jobs.
//!
//! Two long-lived threads wake on a timer: the merge job compacts the
//! datafiles under the engine's write lock, while the snapshot job persists
//! the keydir so the next startup can skip replay — it only needs the read
//! lock, since saving a snapshot does not mutate engine state. Both select
//! on a shutdown channel and exit as soon as it closes.

use crossbeam_channel::{select, tick, Receiver};
use engine::Keg;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Runs `merge()` every `interval` until `shutdown` closes.
pub fn merge_job(engine: Arc<RwLock<Keg>>, interval: Duration, shutdown: Receiver<()>) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                tracing::info!("periodic merge starting");
                if let Err(e) = engine.write().merge() {
                    tracing::error!(error = %e, "periodic merge failed");
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    tracing::debug!("merge job stopped");
}

/// Runs `save_snapshot()` every `interval` until `shutdown` closes.
pub fn snapshot_job(engine: Arc<RwLock<Keg>>, interval: Duration, shutdown: Receiver<()>) {
    let ticker = tick(interval);
    loop {
        select! {
            recv(ticker) -> _ => {
                if let Err(e) = engine.read().save_snapshot() {
                    tracing::error!(error = %e, "periodic snapshot failed");
                }
            }
            recv(shutdown) -> _ => break,
        }
    }
    tracing::debug!("snapshot job stopped");
}
