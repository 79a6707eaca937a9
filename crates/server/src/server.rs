//! TCP accept loop and per-connection command dispatch.
//!
//! The listener polls in non-blocking mode so the shutdown flag is honored
//! promptly; each accepted connection gets its own named thread. Connection
//! threads read with a timeout for the same reason — a quiet client must not
//! keep the process alive past shutdown.
//!
//! Locking follows the engine's single-writer / multi-reader contract:
//! `GET`, `KEYS`, and `INFO` take the read lock, everything that mutates the
//! keydir or the datafiles (`PUT`, `DEL`, `INDEX`, `MERGE`) takes the write
//! lock.

use anyhow::{Context, Result};
use engine::Keg;
use parking_lot::RwLock;
use std::io::{self, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::resp::{self, RespError};
use crate::VERSION;

/// How long the accept loop sleeps when no connection is pending.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Read timeout on client sockets; bounds how long a connection thread can
/// go without checking the shutdown flag.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// The RESP server: owns the listener and shares the engine with every
/// connection thread.
pub struct Server {
    listener: TcpListener,
    engine: Arc<RwLock<Keg>>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Binds the listener. The server does not accept connections until
    /// [`run`](Server::run) is called.
    pub fn bind<A: ToSocketAddrs + std::fmt::Debug>(
        addr: A,
        engine: Arc<RwLock<Keg>>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<Server> {
        let listener =
            TcpListener::bind(&addr).with_context(|| format!("failed to bind {:?}", addr))?;
        listener.set_nonblocking(true)?;

        Ok(Server {
            listener,
            engine,
            shutdown,
        })
    }

    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the shutdown flag flips, then waits for the
    /// connection threads to drain.
    pub fn run(&self) -> Result<()> {
        tracing::info!(addr = %self.listener.local_addr()?, "server listening");

        let mut workers: Vec<JoinHandle<()>> = Vec::new();
        let mut conn_id = 0u64;

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    conn_id += 1;
                    tracing::debug!(%peer, conn_id, "accepted connection");

                    let engine = Arc::clone(&self.engine);
                    let shutdown = Arc::clone(&self.shutdown);
                    let handle = thread::Builder::new()
                        .name(format!("kegdb-conn-{}", conn_id))
                        .spawn(move || {
                            if let Err(e) = handle_connection(stream, &engine, &shutdown) {
                                tracing::debug!(error = %e, "connection ended with error");
                            }
                        })?;
                    workers.push(handle);
                    workers.retain(|h| !h.is_finished());
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        tracing::info!("shutting down, draining connections");
        for handle in workers {
            let _ = handle.join();
        }
        Ok(())
    }
}

/// Serves one client: read a command, dispatch it, write the reply.
fn handle_connection(
    stream: TcpStream,
    engine: &Arc<RwLock<Keg>>,
    shutdown: &Arc<AtomicBool>,
) -> Result<()> {
    stream.set_read_timeout(Some(READ_TIMEOUT))?;
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut writer = BufWriter::new(stream);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            return Ok(());
        }

        let args = match resp::read_command(&mut reader) {
            Ok(None) => return Ok(()), // client closed
            Ok(Some(args)) => args,
            Err(RespError::Io(e))
                if e.kind() == io::ErrorKind::WouldBlock
                    || e.kind() == io::ErrorKind::TimedOut =>
            {
                continue; // idle; re-check the shutdown flag
            }
            Err(RespError::Io(e)) => return Err(e.into()),
            Err(RespError::Protocol(msg)) => {
                resp::write_error(&mut writer, &format!("ERR protocol error: {}", msg))?;
                writer.flush()?;
                return Ok(());
            }
        };

        if args.is_empty() {
            continue;
        }

        let quit = dispatch(&args, engine, &mut writer)?;
        writer.flush()?;
        if quit {
            return Ok(());
        }
    }
}

/// Executes one command against the engine. Returns `true` when the
/// connection should close (`QUIT`).
fn dispatch<W: Write>(
    args: &[Vec<u8>],
    engine: &Arc<RwLock<Keg>>,
    out: &mut W,
) -> Result<bool> {
    let cmd = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();

    match cmd.as_str() {
        "INFO" => {
            resp::write_simple(out, &format!("KegDB version {}", VERSION))?;
        }
        "PUT" => {
            if args.len() != 3 {
                wrong_arity(out, "put")?;
            } else {
                match engine.write().put(args[1].clone(), args[2].clone()) {
                    Ok(()) => resp::write_simple(out, "OK")?,
                    Err(e) => engine_error(out, &e)?,
                }
            }
        }
        "GET" => {
            if args.len() != 2 {
                wrong_arity(out, "get")?;
            } else {
                match engine.read().get(&args[1]) {
                    Ok(Some(value)) => resp::write_bulk(out, &value)?,
                    Ok(None) => resp::write_null_bulk(out)?,
                    Err(e) => engine_error(out, &e)?,
                }
            }
        }
        "DEL" => {
            if args.len() != 2 {
                wrong_arity(out, "del")?;
            } else {
                match engine.write().delete(&args[1]) {
                    Ok(deleted) => resp::write_integer(out, deleted as i64)?,
                    Err(e) => engine_error(out, &e)?,
                }
            }
        }
        "KEYS" => {
            if args.len() != 1 {
                wrong_arity(out, "keys")?;
            } else {
                resp::write_array(out, &engine.read().keys())?;
            }
        }
        "INDEX" => {
            if args.len() != 1 {
                wrong_arity(out, "index")?;
            } else {
                match engine.write().reindex() {
                    Ok(()) => resp::write_simple(out, "OK")?,
                    Err(e) => engine_error(out, &e)?,
                }
            }
        }
        "MERGE" => {
            if args.len() != 1 {
                wrong_arity(out, "merge")?;
            } else {
                match engine.write().merge() {
                    Ok(()) => resp::write_simple(out, "OK")?,
                    Err(e) => engine_error(out, &e)?,
                }
            }
        }
        "QUIT" => {
            resp::write_simple(out, "OK")?;
            return Ok(true);
        }
        _ => {
            resp::write_error(
                out,
                &format!("ERR unknown command '{}'", String::from_utf8_lossy(&args[0])),
            )?;
        }
    }

    Ok(false)
}

fn wrong_arity<W: Write>(out: &mut W, cmd: &str) -> io::Result<()> {
    resp::write_error(
        out,
        &format!("ERR wrong number of arguments for '{}' command", cmd),
    )
}

fn engine_error<W: Write>(out: &mut W, e: &anyhow::Error) -> io::Result<()> {
    resp::write_error(out, &format!("ERR {}", e))
}
