use crate::error::{CtfError, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-track exclusive sections keyed by track id.
///
/// Waiters queue in FIFO order, so operations on one track run in the order
/// they asked for the section. A slot is dropped from the map once its last
/// holder releases it with nobody waiting.
#[derive(Debug, Clone, Default)]
pub struct TrackLocks {
    slots: Slots,
}

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Held for the whole read-modify-write of one track's record.
#[derive(Debug)]
pub struct TrackGuard {
    track: String,
    slots: Slots,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TrackGuard {
    pub fn track(&self) -> &str {
        &self.track
    }
}

impl Drop for TrackGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Every acquirer clones the slot under the map lock, so a lone
        // reference here means nobody holds or waits for it.
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if slots
            .get(&self.track)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.track);
        }
    }
}

impl TrackLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, track: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        slots.entry(track.to_string()).or_default().clone()
    }

    fn guard(&self, track: &str, guard: OwnedMutexGuard<()>) -> TrackGuard {
        TrackGuard {
            track: track.to_string(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.slots.lock().unwrap().len()
    }

    /// Take the section without waiting; `StateConflict` when it is held.
    pub fn try_acquire(&self, track: &str) -> Result<TrackGuard> {
        let guard = self
            .slot(track)
            .try_lock_owned()
            .map_err(|_| CtfError::StateConflict(track.to_string()))?;
        Ok(self.guard(track, guard))
    }

    /// Take the section, queueing behind the current holder if needed.
    pub async fn acquire(&self, track: &str) -> TrackGuard {
        match self.try_acquire(track) {
            Ok(guard) => guard,
            Err(conflict) => {
                tracing::info!(track = %track, "{conflict}; waiting for it to finish");
                let slot = self.slot(track);
                self.guard(track, slot.lock_owned().await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn held_section_is_a_state_conflict() {
        let locks = TrackLocks::new();
        let guard = locks.try_acquire("web").unwrap();
        assert_eq!(guard.track(), "web");

        let err = locks.try_acquire("web").unwrap_err();
        assert!(matches!(err, CtfError::StateConflict(ref t) if t == "web"));

        locks.try_acquire("other").unwrap();
        drop(guard);
        locks.try_acquire("web").unwrap();
    }

    #[tokio::test]
    async fn conflicting_acquire_queues_instead_of_failing() {
        let locks = TrackLocks::new();
        let first = locks.try_acquire("web").unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("web").await.track().to_string() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        assert_eq!(waiter.await.unwrap(), "web");
        assert_eq!(locks.tracked(), 0);
    }

    #[test]
    fn released_slots_are_evicted() {
        let locks = TrackLocks::new();
        let a = locks.try_acquire("alpha").unwrap();
        let b = locks.try_acquire("beta").unwrap();
        assert_eq!(locks.tracked(), 2);

        drop(a);
        assert_eq!(locks.tracked(), 1);
        drop(b);
        assert_eq!(locks.tracked(), 0);

        // A failed try_acquire leaves nothing behind either.
        let held = locks.try_acquire("alpha").unwrap();
        assert!(locks.try_acquire("alpha").is_err());
        drop(held);
        assert_eq!(locks.tracked(), 0);
    }
}
