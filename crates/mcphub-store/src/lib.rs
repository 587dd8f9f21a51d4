//! On-disk primitives shared between mcphub processes.
//!
//! - [`FileLock`]: advisory, exclusive, bounded-wait lock on a lock file
//! - [`write_atomic`]: temp-file-then-rename writes
//! - [`StatusCache`]: TTL cache of entity status in a single JSON file

mod atomic;
mod cache;
mod error;
mod lock;

pub use atomic::write_atomic;
pub use cache::{CacheEntry, StatusCache, DEFAULT_LOCK_TIMEOUT, DEFAULT_TTL};
pub use error::CacheError;
pub use lock::FileLock;
