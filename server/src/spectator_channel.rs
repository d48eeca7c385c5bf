use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use ringbuffer::{AllocRingBuffer, RingBuffer};
use tokio::sync::Notify;

use common::{GameSnapshot, ObserverId};

use crate::broadcaster::{Broadcaster, BroadcasterInner};

/// Per-observer bounded buffer. Offering into a full buffer overwrites the
/// oldest entry, so the publisher never waits on a slow viewer.
pub(crate) struct ObserverSlot {
    buffer: Mutex<AllocRingBuffer<Arc<GameSnapshot>>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl ObserverSlot {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(AllocRingBuffer::new(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, AllocRingBuffer<Arc<GameSnapshot>>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn offer(&self, snapshot: Arc<GameSnapshot>) {
        {
            let mut buffer = self.buffer();
            if buffer.is_full() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            buffer.enqueue(snapshot);
        }
        self.notify.notify_one();
    }

    fn take(&self) -> Option<Arc<GameSnapshot>> {
        self.buffer().dequeue()
    }

    /// Moves buffered snapshots into a buffer of the new capacity, keeping
    /// the newest ones.
    pub(crate) fn resize(&self, capacity: usize) {
        let mut buffer = self.buffer();
        let mut resized = AllocRingBuffer::new(capacity);
        while let Some(snapshot) = buffer.dequeue() {
            if resized.is_full() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            resized.enqueue(snapshot);
        }
        *buffer = resized;
    }

    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.buffer().clear();
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn buffered(&self) -> usize {
        self.buffer().len()
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// One viewer's push subscription. Snapshots come out in the order they
/// were published; gaps appear when the buffer overflowed. Dropping the
/// channel removes its registration.
pub struct SpectatorChannel {
    id: ObserverId,
    slot: Arc<ObserverSlot>,
    hub: Weak<BroadcasterInner>,
    last_delivered: Option<(u64, u64)>,
    unregistered: bool,
}

impl SpectatorChannel {
    pub(crate) fn new(id: ObserverId, slot: Arc<ObserverSlot>, hub: Weak<BroadcasterInner>) -> Self {
        Self {
            id,
            slot,
            hub,
            last_delivered: None,
            unregistered: false,
        }
    }

    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Waits for the next snapshot. `None` once the channel has been
    /// unregistered or the broadcaster shut down.
    pub async fn recv(&mut self) -> Option<Arc<GameSnapshot>> {
        loop {
            while let Some(snapshot) = self.slot.take() {
                if self.accept(&snapshot) {
                    return Some(snapshot);
                }
            }
            if self.slot.is_closed() {
                return None;
            }
            self.slot.notify.notified().await;
        }
    }

    /// Everything currently buffered, without waiting.
    pub fn drain(&mut self) -> Vec<Arc<GameSnapshot>> {
        let mut snapshots = Vec::new();
        while let Some(snapshot) = self.slot.take() {
            if self.accept(&snapshot) {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    fn accept(&mut self, snapshot: &GameSnapshot) -> bool {
        let key = snapshot.order_key();
        if self.last_delivered.is_some_and(|last| key <= last) {
            return false;
        }
        self.last_delivered = Some(key);
        true
    }

    pub fn dropped_count(&self) -> u64 {
        self.slot.dropped()
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }

    pub fn close(mut self) {
        self.unregister();
    }

    fn unregister(&mut self) {
        if self.unregistered {
            return;
        }
        self.unregistered = true;
        if let Some(inner) = self.hub.upgrade() {
            Broadcaster::from_inner(inner).unregister_push(self.id);
        } else {
            self.slot.close();
        }
    }
}

impl Drop for SpectatorChannel {
    fn drop(&mut self) {
        self.unregister();
    }
}
