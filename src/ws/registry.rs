#![expect(
    clippy::module_name_repetitions,
    reason = "Registry types deliberately include the module name for clarity"
)]

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::Result;
use crate::error::Error;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Push handle into one subscription's stream.
///
/// The registry holds sinks, never the consumer: once every clone of a sink is dropped the
/// matching [`ChannelStream`](super::subscription::ChannelStream) ends.
pub struct ChannelSink<M> {
    tx: mpsc::UnboundedSender<Result<M>>,
    id: u64,
}

impl<M> ChannelSink<M> {
    /// Create a sink and the receiver it feeds.
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Result<M>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed);
        (Self { tx, id }, rx)
    }

    /// Identifier shared by every clone feeding the same stream.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Push a value. Returns `false` if the consumer is gone.
    pub fn next(&self, message: M) -> bool {
        self.tx.send(Ok(message)).is_ok()
    }

    /// Push an error scoped to this subscription. Returns `false` if the consumer is gone.
    pub fn error<E: Into<Error>>(&self, error: E) -> bool {
        self.tx.send(Err(error.into())).is_ok()
    }

    /// Whether the consumer side has been dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Whether both handles feed the same stream.
    #[must_use]
    pub fn same_stream(&self, other: &Self) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

impl<M> Clone for ChannelSink<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            id: self.id,
        }
    }
}

impl<M> fmt::Debug for ChannelSink<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Concurrent map from channel key to the sink of the subscription listening on it.
///
/// Shared between the connection task, which looks sinks up for every inbound message, and
/// callers subscribing or cancelling from any thread. Access is sharded, so a lookup on the
/// read path only contends with writers touching the same shard.
pub struct ChannelRegistry<M> {
    channels: DashMap<String, ChannelSink<M>>,
}

impl<M> ChannelRegistry<M> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Register `sink` under `key`, replacing and returning any previous sink.
    pub fn put<K: Into<String>>(&self, key: K, sink: ChannelSink<M>) -> Option<ChannelSink<M>> {
        self.channels.insert(key.into(), sink)
    }

    /// Remove the entry for `key`, if any.
    pub fn remove(&self, key: &str) -> Option<ChannelSink<M>> {
        self.channels.remove(key).map(|(_, sink)| sink)
    }

    /// Remove the entry for `key` only if it still feeds the stream identified by `id`.
    ///
    /// A stream that was replaced under the same key must not tear down its successor.
    pub fn remove_stream(&self, key: &str, id: u64) -> bool {
        self.channels
            .remove_if(key, |_, sink| sink.id() == id)
            .is_some()
    }

    /// Sink registered under `key`.
    ///
    /// The returned handle is a clone, so no shard lock is held while delivering.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<ChannelSink<M>> {
        self.channels.get(key).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.channels.contains_key(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.channels.clear();
    }

    /// Remove every entry and hand the sinks back, e.g. to fail them.
    pub fn drain(&self) -> Vec<(String, ChannelSink<M>)> {
        let keys: Vec<String> = self.channels.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter_map(|key| self.channels.remove(&key))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Keys of all registered channels, in no particular order.
    #[must_use]
    pub fn channels(&self) -> Vec<String> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }
}

impl<M> Default for ChannelRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for ChannelRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("channels", &self.channels())
            .finish()
    }
}
