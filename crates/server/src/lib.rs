//! # Server — the KegDB network front-end
//!
//! Speaks the RESP wire protocol (the framing Redis uses), so any RESP
//! client can talk to a KegDB server:
//!
//! ```text
//! PUT key value    +OK
//! GET key          bulk string, or nil when absent
//! DEL key          :1 deleted / :0 absent
//! KEYS             array of bulk strings
//! INDEX            rebuild the keydir from the log, +OK
//! MERGE            compact the datafiles, +OK
//! INFO             +KegDB version ...
//! QUIT             +OK, then the connection closes
//! ```
//!
//! ## Architecture
//!
//! - [`resp`] — protocol framing: command parser and reply writers.
//! - [`server`] — accept loop and per-connection dispatch. The engine is
//!   shared as `Arc<RwLock<Keg>>`: lookups run under the read lock,
//!   mutations (including merge and reindex) under the write lock, which is
//!   the engine's single-writer / multi-reader contract.
//! - [`jobs`] — background merge and snapshot timers.

pub mod jobs;
pub mod resp;
pub mod server;

pub use server::Server;

/// Version reported by the `INFO` command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
