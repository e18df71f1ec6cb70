//! Connected viewers and their outbound queues.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::board::markup;

/// Maximum fragments buffered for one viewer before the oldest are dropped.
pub const VIEWER_QUEUE_CAPACITY: usize = 100;

/// One rendered fragment, shared by every viewer it is sent to.
pub type Payload = Arc<str>;

/// Bounded per-viewer queue. Pushing never blocks; a full queue sheds its
/// oldest entry so a slow viewer cannot stall the broadcaster.
pub struct ViewerQueue {
    id: Uuid,
    queue: Mutex<VecDeque<Payload>>,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

pub type ViewerHandle = Arc<ViewerQueue>;

impl ViewerQueue {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            queue: Mutex::new(VecDeque::with_capacity(VIEWER_QUEUE_CAPACITY)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn push(&self, payload: Payload) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        {
            let mut queue = self.queue.lock();
            if queue.len() >= VIEWER_QUEUE_CAPACITY {
                queue.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!("viewer {} is behind, dropped {dropped} fragments so far", self.id);
            }
            queue.push_back(payload);
        }
        self.notify.notify_one();
    }

    pub fn try_recv(&self) -> Option<Payload> {
        self.queue.lock().pop_front()
    }

    /// Wait for the next fragment. Returns `None` once the queue is closed.
    pub async fn recv(&self) -> Option<Payload> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(payload) = self.try_recv() {
                return Some(payload);
            }
            self.notify.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// All currently connected viewers.
#[derive(Default)]
pub struct ViewerRegistry {
    viewers: RwLock<HashMap<Uuid, ViewerHandle>>,
}

impl ViewerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a viewer and tell everyone the new viewer count.
    pub fn register(&self) -> ViewerHandle {
        let viewer = Arc::new(ViewerQueue::new(Uuid::new_v4()));
        let count = {
            let mut viewers = self.viewers.write();
            viewers.insert(viewer.id(), viewer.clone());
            viewers.len()
        };
        tracing::debug!("viewer {} connected ({count} total)", viewer.id());
        self.broadcast(Arc::from(markup::viewer_count(count)));
        viewer
    }

    pub fn unregister(&self, id: Uuid) {
        let (removed, count) = {
            let mut viewers = self.viewers.write();
            (viewers.remove(&id), viewers.len())
        };
        let Some(viewer) = removed else {
            return;
        };
        viewer.close();
        tracing::debug!(
            "viewer {id} disconnected ({count} remaining, {} fragments dropped)",
            viewer.dropped()
        );
        self.broadcast(Arc::from(markup::viewer_count(count)));
    }

    /// Queue a fragment for every registered viewer. Returns how many
    /// viewers it was queued for.
    pub fn broadcast(&self, payload: Payload) -> usize {
        let viewers = self.viewers.read();
        for viewer in viewers.values() {
            viewer.push(payload.clone());
        }
        viewers.len()
    }

    pub fn len(&self) -> usize {
        self.viewers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.read().is_empty()
    }
}
