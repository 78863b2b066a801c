#![expect(
    clippy::module_name_repetitions,
    reason = "Subscription types deliberately include the module name for clarity"
)]

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use super::connection::ConnectionManager;
use super::error::WsError;
use super::registry::ChannelSink;
use super::traits::ProtocolAdapter;
use crate::Result;
use crate::error::Error;

struct CancelState {
    fired: AtomicBool,
    on_cancel: Box<dyn Fn() + Send + Sync>,
}

/// Cloneable handle that cancels one subscription.
///
/// Every clone shares the same flag, so the unsubscribe hook runs at most once no matter how
/// many handles race to cancel.
#[derive(Clone)]
pub struct CancelHandle {
    state: Arc<CancelState>,
}

impl CancelHandle {
    fn new<F: Fn() + Send + Sync + 'static>(on_cancel: F) -> Self {
        Self {
            state: Arc::new(CancelState {
                fired: AtomicBool::new(false),
                on_cancel: Box::new(on_cancel),
            }),
        }
    }

    /// Handle for a stream that never registered anything.
    fn noop() -> Self {
        let handle = Self::new(|| {});
        handle.state.fired.store(true, Ordering::Release);
        handle
    }

    /// Cancel the subscription. Returns `true` only for the call that ran the hook.
    pub fn cancel(&self) -> bool {
        if self.state.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        (self.state.on_cancel)();
        true
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state.fired.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Stream of values and channel-scoped errors for one subscription.
///
/// The stream ends when the subscription is cancelled, replaced by a newer subscription on
/// the same channel, or dropped from the registry by `disconnect`. Dropping the stream
/// cancels it.
pub struct ChannelStream<M> {
    rx: mpsc::UnboundedReceiver<Result<M>>,
    cancel: CancelHandle,
}

impl<M> ChannelStream<M> {
    fn new(rx: mpsc::UnboundedReceiver<Result<M>>, cancel: CancelHandle) -> Self {
        Self { rx, cancel }
    }

    /// A stream that yields `error` once and ends.
    fn failed(error: Error) -> Self {
        let (sink, rx) = ChannelSink::channel();
        sink.error(error);
        Self::new(rx, CancelHandle::noop())
    }

    /// Send the unsubscribe command and deregister the channels.
    ///
    /// Idempotent; returns `true` for the call that actually cancelled.
    pub fn cancel(&self) -> bool {
        self.cancel.cancel()
    }

    /// Handle that cancels this stream from elsewhere.
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }
}

impl<M> Stream for ChannelStream<M> {
    type Item = Result<M>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<M> Drop for ChannelStream<M> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<M> fmt::Debug for ChannelStream<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelStream")
            .field("cancel", &self.cancel)
            .finish_non_exhaustive()
    }
}

/// Creates channel subscriptions on a shared connection and hands back their streams.
///
/// Subscribing registers the stream's sink under one or more channel keys *before* the
/// subscribe command is written, so replies that follow the command immediately are routed.
pub struct SubscriptionManager<A: ProtocolAdapter> {
    connection: ConnectionManager<A>,
}

impl<A: ProtocolAdapter> SubscriptionManager<A> {
    #[must_use]
    pub fn new(connection: ConnectionManager<A>) -> Self {
        Self { connection }
    }

    /// Subscribe to `channel` with the adapter-built subscribe command.
    ///
    /// If the connection is not open the stream yields [`WsError::NotConnected`] and ends.
    /// Cancelling sends the adapter's unsubscribe command for `channel`.
    pub fn subscribe(&self, channel: &str, params: &[String]) -> ChannelStream<A::Message> {
        self.activate(channel, &[channel.to_owned()], |adapter| {
            adapter.subscribe_command(channel, params)
        })
    }

    /// Subscribe one stream to several channel keys with a single command for `external`.
    ///
    /// For protocols where one subscription yields messages on several channels. Cancelling
    /// sends one unsubscribe for `external` and removes every key in `internal`.
    pub fn subscribe_batch(
        &self,
        external: &str,
        internal: &[String],
        params: &[String],
    ) -> ChannelStream<A::Message> {
        if internal.is_empty() {
            return ChannelStream::failed(Error::validation(format!(
                "batch subscription `{external}` needs at least one channel"
            )));
        }

        self.activate(external, internal, |adapter| {
            adapter.subscribe_command(external, params)
        })
    }

    /// Subscribe to `channel` by writing `command` verbatim.
    ///
    /// Used for requests the adapter does not model as a channel subscription, such as a
    /// login whose reply arrives on a channel of its own.
    pub fn send_and_subscribe(&self, command: String, channel: &str) -> ChannelStream<A::Message> {
        self.activate(channel, &[channel.to_owned()], |_| Ok(command))
    }

    /// Number of registered channel keys.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.connection.registry().len()
    }

    /// Registered channel keys, in no particular order.
    #[must_use]
    pub fn active_channels(&self) -> Vec<String> {
        self.connection.registry().channels()
    }

    fn activate<F>(&self, external: &str, keys: &[String], command: F) -> ChannelStream<A::Message>
    where
        F: FnOnce(&A) -> Result<String>,
    {
        if !self.connection.state().is_connected() {
            return ChannelStream::failed(WsError::NotConnected.into());
        }

        let command = match command(self.connection.adapter()) {
            Ok(command) => command,
            Err(e) => return ChannelStream::failed(e),
        };

        let registry = self.connection.registry();
        let (sink, rx) = ChannelSink::channel();
        let id = sink.id();
        for key in keys {
            registry.put(key.clone(), sink.clone());
        }
        drop(sink);

        if let Err(e) = self.connection.send(command) {
            for key in keys {
                registry.remove_stream(key, id);
            }
            return ChannelStream::failed(e);
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(channel = %external, ?keys, "Subscribed");

        let connection = self.connection.clone();
        let external = external.to_owned();
        let keys = keys.to_vec();
        let cancel = CancelHandle::new(move || unsubscribe(&connection, &external, &keys, id));

        ChannelStream::new(rx, cancel)
    }
}

/// Deregister the stream's keys and, if any were still its own, tell the server.
fn unsubscribe<A: ProtocolAdapter>(
    connection: &ConnectionManager<A>,
    external: &str,
    keys: &[String],
    id: u64,
) {
    let registry = connection.registry();
    let removed = keys
        .iter()
        .filter(|key| registry.remove_stream(key, id))
        .count();

    if removed == 0 {
        // Replaced by a newer subscription or dropped by disconnect
        return;
    }

    let sent = connection
        .adapter()
        .unsubscribe_command(external)
        .and_then(|command| connection.send(command));

    match sent {
        Ok(()) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(channel = %external, "Unsubscribed");
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(channel = %external, error = %e, "Failed to send unsubscribe");
            #[cfg(not(feature = "tracing"))]
            let _ = &e;
        }
    }
}

impl<A: ProtocolAdapter> fmt::Debug for SubscriptionManager<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("connection", &self.connection)
            .finish()
    }
}
