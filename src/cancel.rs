//! Cooperative cancellation.
//!
//! Long computations poll the token between keys (loader) or between updates
//! (engine), never in the middle of building a node.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TrieError;

/// A cloneable cancellation flag.
///
/// All clones observe the same flag, so a host can keep one clone and hand
/// another to a running computation.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns true once `cancel` was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns `Err(TrieError::Cancelled)` if cancellation was requested.
    #[inline]
    pub fn check(&self) -> Result<(), TrieError> {
        if self.is_cancelled() {
            Err(TrieError::Cancelled)
        } else {
            Ok(())
        }
    }
}
