use fluxwatch_core::{LogEntry, LogHistory};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identifier handed out to each connected log consumer
pub type SubscriberId = u64;

/// One consumer's end of the log stream, created by
/// [`LogBroadcaster::subscribe`]. The receiver is pre-loaded with the full
/// history replay.
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::Receiver<LogEntry>,
}

struct BroadcasterInner {
    history: LogHistory,
    subscribers: HashMap<SubscriberId, mpsc::Sender<LogEntry>>,
}

/// Single point of truth for what the watcher has said and who is
/// listening. Appends record history and fan out to every subscriber;
/// a failed delivery removes that subscriber only.
pub struct LogBroadcaster {
    inner: Mutex<BroadcasterInner>,
    next_id: AtomicU64,
    channel_capacity: usize,
}

impl LogBroadcaster {
    /// `subscriber_buffer` is headroom beyond a full history replay, so a
    /// fresh subscriber channel can always hold the replay plus some live
    /// lines before the consumer starts draining.
    pub fn new(history_capacity: usize, subscriber_buffer: usize) -> Self {
        Self {
            inner: Mutex::new(BroadcasterInner {
                history: LogHistory::new(history_capacity),
                subscribers: HashMap::new(),
            }),
            next_id: AtomicU64::new(0),
            channel_capacity: history_capacity + subscriber_buffer.max(1),
        }
    }

    /// Record a captured line and fan it out to every current subscriber.
    /// The history write always succeeds; a subscriber whose channel is
    /// closed or full is pruned without affecting the remaining
    /// deliveries.
    pub fn append(&self, entry: LogEntry) {
        let mut inner = self.inner.lock().unwrap();
        inner.history.push(entry.clone());

        let mut dead = Vec::new();
        for (id, sender) in &inner.subscribers {
            if sender.try_send(entry.clone()).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            inner.subscribers.remove(&id);
            warn!(subscriber = id, "Removed log subscriber after failed delivery");
        }
    }

    /// Register a new consumer: replay the entire current history into its
    /// channel in insertion order, then mark it live for future appends.
    /// Both happen under one lock acquisition, so relative to concurrent
    /// appends the subscriber sees every line exactly once, in order.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.channel_capacity);

        let mut inner = self.inner.lock().unwrap();
        for entry in inner.history.iter() {
            // A fresh channel always has room for a full replay.
            let _ = sender.try_send(entry.clone());
        }
        inner.subscribers.insert(id, sender);
        debug!(
            subscriber = id,
            replayed = inner.history.len(),
            "Log subscriber registered"
        );

        Subscription { id, receiver }
    }

    /// Explicit removal; idempotent.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if self.inner.lock().unwrap().subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "Log subscriber removed");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().unwrap().subscribers.len()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().unwrap().history.len()
    }
}
