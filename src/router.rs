//! Message router: the glue run for every inbound message.
//!
//! ```text
//! session ──► route() ──► inbound broadcast (dashboard, sees everything)
//!                │
//!            [filter] ──rejected──► dropped
//!                │
//!          TopicStore append ──► accepted broadcast (explorer views)
//! ```
//!
//! Store, filter and history limit live together behind one lock, so a
//! filter change never interleaves with a half-done append and a history read
//! never sees a partially evicted list.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::error::ExportError;
use crate::mqtt::MqttMessage;
use crate::topics::export::ExportSnapshot;
use crate::topics::{HistoryLimit, TopicFilter, TopicPath, TopicStore};

/// Buffered notifications per listener before it starts lagging and loses
/// the oldest ones
const NOTIFY_CAPACITY: usize = 256;

/// State shared between the session task and the foreground.
#[derive(Debug, Default)]
pub struct ExplorerState {
    pub store: TopicStore,
    pub filter: TopicFilter,
    pub history_limit: HistoryLimit,
}

/// Cheap to clone; clones share the same state and listeners.
#[derive(Clone, Debug)]
pub struct MessageRouter {
    state: Arc<Mutex<ExplorerState>>,
    accepted: broadcast::Sender<MqttMessage>,
    inbound: broadcast::Sender<MqttMessage>,
}

impl Default for MessageRouter {
    fn default() -> Self {
        Self::new(HistoryLimit::default())
    }
}

impl MessageRouter {
    pub fn new(history_limit: HistoryLimit) -> Self {
        let (accepted, _) = broadcast::channel(NOTIFY_CAPACITY);
        let (inbound, _) = broadcast::channel(NOTIFY_CAPACITY);

        MessageRouter {
            state: Arc::new(Mutex::new(ExplorerState {
                history_limit,
                ..ExplorerState::default()
            })),
            accepted,
            inbound,
        }
    }

    /// Listener for messages that passed the filter and were stored.
    ///
    /// Notifications are best effort. A listener that falls more than
    /// 256 messages behind loses the oldest ones and sees
    /// `RecvError::Lagged` with the number skipped. Stored history is not
    /// affected; re-read it after a lag.
    pub fn subscribe(&self) -> broadcast::Receiver<MqttMessage> {
        self.accepted.subscribe()
    }

    /// Listener for every inbound message, filter or not.
    ///
    /// Same lag behavior as [`subscribe`](Self::subscribe): slow listeners
    /// skip messages and are told how many.
    pub fn subscribe_inbound(&self) -> broadcast::Receiver<MqttMessage> {
        self.inbound.subscribe()
    }

    /// Filters, stores and announces one inbound message.
    ///
    /// Returns whether the message was accepted.
    pub async fn route(&self, message: MqttMessage) -> bool {
        // No listener is fine, nobody asked for the notification
        let _ = self.inbound.send(message.clone());

        {
            let mut state = self.state.lock().await;
            if !state.filter.matches(&message.topic) {
                debug!(
                    "Dropping message on {} (filter '{}')",
                    message.topic,
                    state.filter.as_str()
                );
                return false;
            }

            let limit = state.history_limit;
            state
                .store
                .resolve_or_create(&TopicPath::parse(&message.topic))
                .append_message(message.payload.clone(), limit);
        }

        debug!("Stored {} bytes on {}", message.payload.len(), message.topic);
        let _ = self.accepted.send(message);
        true
    }

    /// Only topics below `filter` are accepted from now on. Wire
    /// subscriptions stay untouched.
    pub async fn set_filter(&self, filter: impl Into<String>) {
        let filter = TopicFilter::new(filter);
        info!("Topic filter set to '{}'", filter.as_str());
        self.state.lock().await.filter = filter;
    }

    pub async fn reset_filter(&self) {
        info!("Topic filter cleared");
        self.state.lock().await.filter.clear();
    }

    pub async fn filter(&self) -> TopicFilter {
        self.state.lock().await.filter.clone()
    }

    /// Takes effect lazily: stored histories shrink on their next read or append.
    pub async fn set_history_limit(&self, limit: HistoryLimit) {
        info!("History limit set to {:?}", limit.get());
        self.state.lock().await.history_limit = limit;
    }

    pub async fn history_limit(&self) -> HistoryLimit {
        self.state.lock().await.history_limit
    }

    /// History of the topic at `path`, oldest first; `None` for unknown topics.
    pub async fn messages(&self, path: &TopicPath) -> Option<Vec<Vec<u8>>> {
        let mut state = self.state.lock().await;
        let limit = state.history_limit;
        let node = state.store.find_mut(path)?;
        Some(node.messages(limit).map(<[u8]>::to_vec).collect())
    }

    pub async fn last_message(&self, path: &TopicPath) -> Option<Vec<u8>> {
        let state = self.state.lock().await;
        state.store.find(path)?.last_message().map(<[u8]>::to_vec)
    }

    /// Exclusive access to the whole state, for tree views and other walks.
    pub async fn lock(&self) -> MutexGuard<'_, ExplorerState> {
        self.state.lock().await
    }

    /// Dumps the tree below `directory`. The tree is copied under the lock
    /// and written without holding it.
    pub async fn export(&self, directory: &Path) -> Result<usize, ExportError> {
        let snapshot = ExportSnapshot::capture(&self.state.lock().await.store);
        snapshot.write_to(directory).await
    }
}
