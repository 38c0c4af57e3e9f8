//! Process-wide cooperative cancellation.
//!
//! A [`CancelToken`] is a shared flag: the Ctrl-C handler (or a test) sets
//! it, and every mission state polls it once per control tick.  There is no
//! rollback; cancellation only asks the active state to stop the robot and
//! return its exit outcome.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

/// Shared cancellation flag.  Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.  Idempotent.
    pub fn cancel(&self) {
        if !self.flag.swap(true, Ordering::SeqCst) {
            info!("cancellation requested");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
