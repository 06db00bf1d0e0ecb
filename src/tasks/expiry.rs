//! Expiry Timer Task
//!
//! One tokio task per TTL entry that removes the key once its TTL elapses,
//! without waiting for a read.

use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::cache::{current_timestamp_ms, TableState, TimerCheck};

/// Spawns a task that removes `key` after `ttl` if it still holds the
/// entry version identified by `generation`. A wake-up before the entry's
/// expiry instant sleeps again for the rest.
///
/// The task only holds a weak reference, so a dropped table is never kept
/// alive by its pending timers.
///
/// # Returns
/// The task handle, used to cancel the timer on overwrite, delete, or
/// clear. `None` when no tokio runtime is running on this thread; the entry
/// then expires lazily on its next read or export.
pub(crate) fn spawn_expiry_timer<V>(
    table: Weak<Mutex<TableState<V>>>,
    key: String,
    generation: u64,
    ttl: Duration,
) -> Option<JoinHandle<()>>
where
    V: Send + 'static,
{
    let Ok(runtime) = Handle::try_current() else {
        trace!(key = %key, "No runtime, expiry is lazy only");
        return None;
    };

    Some(runtime.spawn(async move {
        let mut wait = ttl;
        loop {
            tokio::time::sleep(wait).await;

            let Some(shared) = table.upgrade() else {
                return;
            };
            let check = shared.lock().expire(&key, generation, current_timestamp_ms());
            match check {
                TimerCheck::Removed => {
                    debug!(key = %key, ttl = ?ttl, "Expiry timer removed entry");
                    return;
                }
                TimerCheck::Pending(rest) => wait = rest,
                TimerCheck::Stale => return,
            }
        }
    }))
}
