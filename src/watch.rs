//! Change notifications for the server list.
//!
//! The table view subscribes once and re-reads the list whenever an event
//! arrives. Events describe what changed; they do not carry the list itself.

use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;

use crate::server::SteamId;

/// Type of change that occurred to the server list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    /// Persisted state was loaded into the store.
    Hydrated,
    /// The whole list was replaced.
    Replaced,
    /// One server was replaced in place.
    Updated,
    /// One server was appended.
    Inserted,
    /// One server was removed.
    Removed,
}

/// An event representing a change to the server list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEvent {
    /// Type of change.
    pub event_type: EventType,
    /// The affected server, for single-record changes.
    pub steamid: Option<SteamId>,
    /// Number of servers in the list after the change.
    pub len: usize,
}

impl StoreEvent {
    /// A whole-list event (hydration or replacement).
    pub fn list(event_type: EventType, len: usize) -> Self {
        Self {
            event_type,
            steamid: None,
            len,
        }
    }

    /// A single-record event.
    pub fn server(event_type: EventType, steamid: SteamId, len: usize) -> Self {
        Self {
            event_type,
            steamid: Some(steamid),
            len,
        }
    }
}

/// A stream of store events.
///
/// A slow subscriber that falls behind skips the missed events; since every
/// event means "re-read the list", only the latest one matters.
pub struct ServerListStream {
    inner: BroadcastStream<StoreEvent>,
}

impl ServerListStream {
    fn new(receiver: broadcast::Receiver<StoreEvent>) -> Self {
        Self {
            inner: BroadcastStream::new(receiver),
        }
    }
}

impl Stream for ServerListStream {
    type Item = StoreEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => return Poll::Ready(Some(event)),
                // Lagged: keep going with what is still buffered
                Poll::Ready(Some(Err(_))) => continue,
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Handle for sending store events to subscribers.
#[derive(Clone)]
pub struct WatchSender {
    sender: broadcast::Sender<StoreEvent>,
}

impl WatchSender {
    /// Create a new watch sender with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Send an event to all subscribers.
    pub fn send(&self, event: StoreEvent) {
        // Ignore send errors (no subscribers)
        let _ = self.sender.send(event);
    }

    /// Subscribe to events sent from now on.
    pub fn subscribe(&self) -> ServerListStream {
        ServerListStream::new(self.sender.subscribe())
    }

    /// Get the number of current subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for WatchSender {
    fn default() -> Self {
        Self::new(256)
    }
}
