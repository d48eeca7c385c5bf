use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;

use common::{DeliveryMode, GameSnapshot, ObserverId, log};

use crate::server_config::{clamp_observer_buffer_size, Clamped};
use crate::spectator_channel::{ObserverSlot, SpectatorChannel};

#[derive(Debug, Clone, Serialize)]
pub struct ObserverRegistration {
    pub id: ObserverId,
    pub kind: DeliveryMode,
    pub connected_since: DateTime<Utc>,
    pub buffered: usize,
    pub dropped: u64,
}

struct Registration {
    slot: Arc<ObserverSlot>,
    connected_since: DateTime<Utc>,
}

struct Registry {
    entries: HashMap<ObserverId, Registration>,
    buffer_capacity: usize,
    closed: bool,
}

pub(crate) struct BroadcasterInner {
    registry: Mutex<Registry>,
    latest: RwLock<Arc<GameSnapshot>>,
    next_observer_id: AtomicU64,
}

/// The subject every viewer observes. Holds the latest snapshot and the
/// table of push registrations.
///
/// `publish`, `register_push` and `unregister_push` all go through the
/// registry lock, so a fan-out never interleaves with a registration: an
/// observer registered while a publish is in flight is seeded with that
/// publish's snapshot and does not receive it a second time.
#[derive(Clone)]
pub struct Broadcaster {
    inner: Arc<BroadcasterInner>,
}

impl std::fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broadcaster").finish()
    }
}

impl Broadcaster {
    pub fn new(initial: GameSnapshot, buffer_capacity: usize) -> Self {
        let registry = Registry {
            entries: HashMap::new(),
            buffer_capacity: clamp_observer_buffer_size(buffer_capacity).applied,
            closed: false,
        };

        Self {
            inner: Arc::new(BroadcasterInner {
                registry: Mutex::new(registry),
                latest: RwLock::new(Arc::new(initial)),
                next_observer_id: AtomicU64::new(1),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<BroadcasterInner>) -> Self {
        Self { inner }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes `snapshot` the latest and offers it to every push observer.
    /// Never waits on an observer.
    pub fn publish(&self, snapshot: GameSnapshot) -> Arc<GameSnapshot> {
        let snapshot = Arc::new(snapshot);
        let registry = self.registry();

        *self.inner.latest.write().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();

        for registration in registry.entries.values() {
            registration.slot.offer(snapshot.clone());
        }

        snapshot
    }

    pub fn latest(&self) -> Arc<GameSnapshot> {
        self.inner.latest.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn register_push(&self) -> SpectatorChannel {
        let mut registry = self.registry();
        let id = ObserverId::new(self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed));
        let slot = Arc::new(ObserverSlot::new(registry.buffer_capacity));

        if registry.closed {
            slot.close();
        } else {
            slot.offer(self.latest());
            registry.entries.insert(
                id,
                Registration {
                    slot: slot.clone(),
                    connected_since: Utc::now(),
                },
            );
        }

        SpectatorChannel::new(id, slot, Arc::downgrade(&self.inner))
    }

    /// Returns `false` when `id` was not registered (already removed).
    pub fn unregister_push(&self, id: ObserverId) -> bool {
        let removed = self.registry().entries.remove(&id);
        match removed {
            Some(registration) => {
                registration.slot.close();
                log!(
                    "Unregistered {} (dropped {} snapshots)",
                    id,
                    registration.slot.dropped()
                );
                true
            }
            None => false,
        }
    }

    pub fn spectator_count(&self) -> usize {
        self.registry().entries.len()
    }

    pub fn registrations(&self) -> Vec<ObserverRegistration> {
        let registry = self.registry();
        let mut registrations: Vec<ObserverRegistration> = registry
            .entries
            .iter()
            .map(|(id, registration)| ObserverRegistration {
                id: *id,
                kind: DeliveryMode::Push,
                connected_since: registration.connected_since,
                buffered: registration.slot.buffered(),
                dropped: registration.slot.dropped(),
            })
            .collect();
        registrations.sort_by_key(|r| r.id);
        registrations
    }

    pub fn buffer_capacity(&self) -> usize {
        self.registry().buffer_capacity
    }

    /// Applies to new and existing registrations; existing buffers keep
    /// their newest snapshots.
    pub fn set_buffer_capacity(&self, requested: usize) -> Clamped<usize> {
        let clamped = clamp_observer_buffer_size(requested);
        let mut registry = self.registry();
        registry.buffer_capacity = clamped.applied;
        for registration in registry.entries.values() {
            registration.slot.resize(clamped.applied);
        }
        clamped
    }

    /// Ends every push channel. Later registrations come back already closed.
    pub fn close_all(&self) {
        let mut registry = self.registry();
        registry.closed = true;
        for (_, registration) in registry.entries.drain() {
            registration.slot.close();
        }
    }
}
