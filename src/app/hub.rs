use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;
use uuid::Uuid;

use crate::domain::live::LiveEvent;

struct Subscriber {
    id: u64,
    sender: mpsc::Sender<LiveEvent>,
}

/// In-process registry of live subscribers, keyed by user. Best-effort: a
/// subscriber whose buffer is full misses the event and is expected to
/// reconcile against the sync log.
pub struct PubSubHub {
    subscribers: RwLock<HashMap<Uuid, Vec<Subscriber>>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl PubSubHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    pub fn register_subscription(&self, user_id: Uuid, sender: mpsc::Sender<LiveEvent>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers
            .entry(user_id)
            .or_default()
            .push(Subscriber { id, sender });
        id
    }

    pub fn unregister_subscription(&self, user_id: Uuid, subscription_id: u64) -> bool {
        let mut subscribers = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(list) = subscribers.get_mut(&user_id) else {
            return false;
        };
        let before = list.len();
        list.retain(|subscriber| subscriber.id != subscription_id);
        let removed = list.len() < before;
        if list.is_empty() {
            subscribers.remove(&user_id);
        }
        removed
    }

    /// Creates a bounded channel and registers it. Dropping the returned
    /// subscription unregisters it.
    pub fn subscribe(self: &Arc<Self>, user_id: Uuid) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.register_subscription(user_id, sender);
        Subscription {
            id,
            user_id,
            receiver,
            hub: Arc::clone(self),
        }
    }

    /// Never blocks. Returns how many subscribers accepted the event.
    pub fn broadcast_to_user(&self, user_id: Uuid, event: &LiveEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self
                .subscribers
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            let Some(list) = subscribers.get(&user_id) else {
                return 0;
            };
            for subscriber in list {
                match subscriber.sender.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        debug!(user_id = %user_id, subscription = subscriber.id, "live buffer full, dropping event");
                    }
                    Err(TrySendError::Closed(_)) => closed.push(subscriber.id),
                }
            }
        }

        for id in closed {
            self.unregister_subscription(user_id, id);
        }
        delivered
    }

    pub fn subscriber_count(&self, user_id: Uuid) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .map_or(0, Vec::len)
    }
}

pub struct Subscription {
    id: u64,
    user_id: Uuid,
    receiver: mpsc::Receiver<LiveEvent>,
    hub: Arc<PubSubHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<LiveEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<LiveEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unregister_subscription(self.user_id, self.id);
    }
}
