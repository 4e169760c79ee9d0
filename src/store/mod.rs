//! Local stash storage
//!
//! Layout under the store root:
//!
//! ```text
//! <root>/<hash>_<version>/...          committed stashes
//! <root>/.transactions/<dir>.lock      per-marker commit/delete locks
//! <root>/.transactions/<uuid>/.lock    lock of an open transaction
//! <root>/.transactions/<uuid>/data/... staged entries
//! ```
//!
//! Other tools may read this layout but must not modify it.

pub mod gc;
pub mod local;
pub mod lock;
pub mod stash;

pub use gc::{GarbageCollector, GcHandle, GcReport};
pub use local::LocalStashStore;
pub use lock::{CancellationToken, FileLock, LockWait};
pub use stash::Stash;

/// Directory holding locks and open transactions
pub const TRANSACTIONS_DIR: &str = ".transactions";

/// Lock file inside a transaction directory
pub const TRANSACTION_LOCK: &str = ".lock";

/// Staging tree inside a transaction directory
pub const TRANSACTION_DATA: &str = "data";
