//! Cooperative cancellation for long-running index operations
//!
//! The engine never imposes timeouts. Callers hand a [`CancelToken`] to the
//! scanner, persistence codec and validator; those check it at every
//! suspension point (file opens, directory enumeration, writes, stats,
//! checksum reads) and abandon in-progress work when it trips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Returned when an operation observed a tripped [`CancelToken`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Shared cancellation flag
///
/// Cloning is cheap; all clones observe the same flag. A token that is
/// never cancelled costs one relaxed atomic load per checkpoint.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a fresh, untripped token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; visible to every clone
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// Has cancellation been requested?
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Checkpoint: error out if cancellation has been requested
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}
