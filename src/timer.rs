use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

/// A one-shot timer bound to a single key and a generation token.
///
/// The teacher crate has no equivalent — its TTL is checked lazily on read
/// (`CacheEntry::is_expired`). spec.md §4.2/§9 requires a proactive timer
/// that *posts* an expiry event, plus a generation token so a delivered
/// `Expired` event can be recognized as stale after `restart_timer`
/// replaces it. The token is a plain `u64` snapshot taken at spawn time;
/// staleness is detected by the receiving worker comparing it against
/// whatever generation is current for that key in `ActiveTier` at delivery
/// time (see `controller::CacheController::handle_expired`), not by the
/// timer itself tracking live state.
pub struct ExpiryTimer {
    generation: u64,
}

/// Event posted by a fired `ExpiryTimer` to the controller's worker thread.
pub struct Expired<K> {
    pub key: K,
    pub generation: u64,
}

impl ExpiryTimer {
    /// Spawns the background thread and returns a handle carrying the
    /// generation it was armed with. `sender` delivers the `Expired` event
    /// after `ttl_ms` elapses.
    pub fn spawn<K>(key: K, ttl_ms: u64, generation: u64, sender: Sender<Expired<K>>) -> Self
    where
        K: Send + 'static,
    {
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(ttl_ms));
            let _ = sender.send(Expired { key, generation });
        });
        Self { generation }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
