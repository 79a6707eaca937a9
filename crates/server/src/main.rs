//! The `kegdb` server binary.
//!
//! Opens the store, spawns the periodic merge and snapshot jobs, and serves
//! RESP until a shutdown signal arrives. Exits 0 on graceful shutdown, 1 on
//! a fatal startup error.

use anyhow::{Context, Result};
use clap::Parser;
use engine::{Keg, DEFAULT_FILE_SIZE_LIMIT};
use parking_lot::RwLock;
use server::{jobs, Server};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

/// How often the keydir snapshot is refreshed.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "kegdb", version, about = "A Bitcask-style key-value store speaking RESP")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value_t = 5678)]
    port: u16,

    /// Directory where the datafiles live
    #[arg(long, default_value = "data")]
    dir: PathBuf,

    /// Interval between periodic merges, in hours
    #[arg(long, default_value_t = 24)]
    merge_interval: u64,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        tracing::error!(error = ?e, "fatal");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let keg = Keg::open(&args.dir, DEFAULT_FILE_SIZE_LIMIT)
        .with_context(|| format!("failed to open store in {}", args.dir.display()))?;
    tracing::info!(dir = %args.dir.display(), keys = keg.len(), "store opened");
    let engine = Arc::new(RwLock::new(keg));

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || {
            tracing::info!("shutdown signal received");
            shutdown.store(true, Ordering::Relaxed);
        })
        .context("failed to install signal handler")?;
    }

    // Background jobs: both exit when the stop channel closes.
    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(0);
    let merge_interval = Duration::from_secs(args.merge_interval * 60 * 60);
    let merge_handle = thread::Builder::new().name("kegdb-merge".into()).spawn({
        let engine = Arc::clone(&engine);
        let stop = stop_rx.clone();
        move || jobs::merge_job(engine, merge_interval, stop)
    })?;
    let snapshot_handle = thread::Builder::new().name("kegdb-snapshot".into()).spawn({
        let engine = Arc::clone(&engine);
        let stop = stop_rx;
        move || jobs::snapshot_job(engine, SNAPSHOT_INTERVAL, stop)
    })?;

    let server = Server::bind(
        format!("0.0.0.0:{}", args.port),
        Arc::clone(&engine),
        Arc::clone(&shutdown),
    )?;
    server.run()?;

    // Graceful shutdown: stop the jobs, persist a fresh snapshot so the next
    // startup skips replay, release every handle.
    drop(stop_tx);
    let _ = merge_handle.join();
    let _ = snapshot_handle.join();

    let mut keg = engine.write();
    if let Err(e) = keg.save_snapshot() {
        tracing::warn!(error = %e, "failed to save final snapshot");
    }
    keg.close()?;

    tracing::info!("shutdown complete");
    Ok(())
}
