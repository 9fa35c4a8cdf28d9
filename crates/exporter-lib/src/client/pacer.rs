//! Global spacing of outbound monitoring calls
//!
//! The monitoring API allows 10 requests per second per tenancy. A single
//! pacer is shared by every worker so the spacing holds process-wide.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};

/// Default minimum gap between two outbound calls
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(100);

/// Enforces a minimum interval between consecutive calls
#[derive(Debug)]
pub struct RequestPacer {
    min_spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl Default for RequestPacer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SPACING)
    }
}

impl RequestPacer {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            next_slot: Mutex::new(None),
        }
    }

    /// Wait until the next call may be issued and reserve the slot.
    ///
    /// The lock is held across the wait so callers are released one at a
    /// time, in arrival order.
    pub async fn acquire(&self) {
        let mut next_slot = self.next_slot.lock().await;

        if let Some(at) = *next_slot {
            if at > Instant::now() {
                sleep_until(at).await;
            }
        }

        *next_slot = Some(Instant::now() + self.min_spacing);
    }
}
