use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tracing::trace;

/// Lines buffered for late subscribers.
pub const LOG_HISTORY_MAX: usize = 2000;
/// Suffix of history replayed to a newly attached subscriber.
pub const REPLAY_MAX: usize = 500;
/// Per-subscriber channel capacity; a consumer further behind is dropped.
pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug)]
struct BroadcasterState {
    history: VecDeque<String>,
    subscribers: HashMap<u64, mpsc::Sender<String>>,
}

#[derive(Debug)]
struct BroadcasterInner {
    state: Mutex<BroadcasterState>,
    history_max: usize,
    replay_max: usize,
    next_subscriber_id: AtomicU64,
}

impl BroadcasterInner {
    fn lock_state(&self) -> MutexGuard<'_, BroadcasterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn unsubscribe(&self, id: u64) {
        self.lock_state().subscribers.remove(&id);
    }
}

/// Fan-out of job output lines: a bounded rolling history plus any number of
/// live subscribers, each behind its own bounded channel.
///
/// Cloning is cheap; all clones share the same history and subscriber set.
#[derive(Debug, Clone)]
pub struct LogBroadcaster {
    inner: Arc<BroadcasterInner>,
}

impl LogBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(LOG_HISTORY_MAX, REPLAY_MAX)
    }

    pub fn with_capacity(history_max: usize, replay_max: usize) -> Self {
        Self {
            inner: Arc::new(BroadcasterInner {
                state: Mutex::new(BroadcasterState {
                    history: VecDeque::with_capacity(history_max.min(LOG_HISTORY_MAX)),
                    subscribers: HashMap::new(),
                }),
                history_max,
                replay_max,
                next_subscriber_id: AtomicU64::new(0),
            }),
        }
    }

    /// Appends a line to history and delivers it to every live subscriber.
    ///
    /// Never blocks: delivery is `try_send` per subscriber, and a subscriber
    /// whose channel is full or closed is removed from the set on the spot.
    pub fn append(&self, line: &str) {
        let line = line.trim_end_matches('\n').trim_end_matches('\r');
        let mut state = self.inner.lock_state();
        state.history.push_back(line.to_string());
        while state.history.len() > self.inner.history_max {
            state.history.pop_front();
        }
        state.subscribers.retain(|id, tx| {
            if tx.try_send(line.to_string()).is_err() {
                trace!(subscriber = id, "dropping slow or disconnected subscriber");
                false
            } else {
                true
            }
        });
    }

    /// Registers a new subscriber and snapshots the replay window in the same
    /// critical section, so no line is lost or duplicated across the
    /// replay/live boundary.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let mut state = self.inner.lock_state();
        let skip = state.history.len().saturating_sub(self.inner.replay_max);
        let replay: VecDeque<String> = state.history.iter().skip(skip).cloned().collect();
        state.subscribers.insert(id, tx);
        drop(state);
        Subscription {
            id,
            replay,
            rx,
            inner: Arc::clone(&self.inner),
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.inner.lock_state().subscribers.len()
    }
}

impl Default for LogBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

/// One live viewer's receive side: replayed history first, then live lines.
///
/// Dropping the subscription unregisters it from the broadcaster.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    replay: VecDeque<String>,
    rx: mpsc::Receiver<String>,
    inner: Arc<BroadcasterInner>,
}

impl Subscription {
    /// Next line in delivery order, or `None` once this subscriber has been
    /// dropped by the broadcaster and its channel drained.
    pub async fn next_line(&mut self) -> Option<String> {
        if let Some(line) = self.replay.pop_front() {
            return Some(line);
        }
        self.rx.recv().await
    }

    /// Lines still pending from the replay window.
    pub fn replay_len(&self) -> usize {
        self.replay.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.inner.unsubscribe(self.id);
    }
}
