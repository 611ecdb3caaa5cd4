//! # Event Bus System
//!
//! Typed events for the cache subsystem, published over `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! - **Event Types**: `CoreEvent` wraps one enum per domain (cache, playback)
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! Emitting never blocks and never fails the operation that emitted: an event
//! with no subscribers is simply dropped.
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Cache(CacheEvent::DownloadQueued {
//!         track_key: "3135556".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Download queued");
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::SendError};

pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published and received through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Download, promotion and eviction events
    Cache(CacheEvent),
    /// Playback routing decisions
    Playback(PlaybackEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Playback(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Cache(CacheEvent::DownloadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Playback(PlaybackEvent::Unavailable { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::EntryEvicted { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::DownloadCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::Cleared { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events emitted by the download coordinator, store and evictor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A job was registered for a key with no entry and no job.
    DownloadQueued { track_key: String },
    /// A worker picked the job up.
    DownloadStarted { track_key: String, attempt: u32 },
    /// The fetched file was promoted into the store.
    DownloadCompleted { track_key: String, size_bytes: u64 },
    /// All attempts failed; the partial artifact was discarded.
    DownloadFailed {
        track_key: String,
        message: String,
        attempts: u32,
    },
    /// An entry was removed to bring the cache under budget.
    EntryEvicted { track_key: String, size_bytes: u64 },
    /// An entry was removed on request.
    EntryRemoved { track_key: String },
    /// The whole cache was emptied.
    Cleared { entries_removed: usize },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::DownloadQueued { .. } => "Download queued",
            CacheEvent::DownloadStarted { .. } => "Download started",
            CacheEvent::DownloadCompleted { .. } => "Download completed",
            CacheEvent::DownloadFailed { .. } => "Download failed",
            CacheEvent::EntryEvicted { .. } => "Cache entry evicted",
            CacheEvent::EntryRemoved { .. } => "Cache entry removed",
            CacheEvent::Cleared { .. } => "Cache cleared",
        }
    }
}

// ============================================================================
// Playback Events
// ============================================================================

/// How a playback request was answered.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PlaybackEvent {
    /// Served from a complete local entry.
    ServedLocal { track_key: String },
    /// Served from the resolver's direct URL.
    ServedRemote { track_key: String },
    /// Caller was told to come back later.
    Deferred { track_key: String },
    /// The resolver could not produce a source.
    Unavailable { track_key: String, message: String },
}

impl PlaybackEvent {
    fn description(&self) -> &str {
        match self {
            PlaybackEvent::ServedLocal { .. } => "Served from cache",
            PlaybackEvent::ServedRemote { .. } => "Served from remote source",
            PlaybackEvent::Deferred { .. } => "Playback deferred",
            PlaybackEvent::Unavailable { .. } => "Track unavailable",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with optional filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let errors = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Error);
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.as_ref().map_or(true, |keep| keep(&event)) {
                return Ok(event);
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(key: &str) -> CoreEvent {
        CoreEvent::Cache(CacheEvent::DownloadQueued {
            track_key: key.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(queued("1")).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.emit(queued("42")).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), queued("42"));
        assert_eq!(sub2.recv().await.unwrap(), queued("42"));
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Error);

        let failed = CoreEvent::Cache(CacheEvent::DownloadFailed {
            track_key: "7".to_string(),
            message: "resolver timeout".to_string(),
            attempts: 3,
        });
        bus.emit(queued("7")).unwrap();
        bus.emit(failed.clone()).unwrap();

        assert_eq!(stream.recv().await.unwrap(), failed);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(queued(&i.to_string())).ok();
        }

        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_event_stream_reports_closed() {
        let bus = EventBus::default();
        let mut stream = EventStream::new(bus.subscribe());
        drop(bus);
        assert!(matches!(stream.recv().await, Err(RecvError::Closed)));
    }

    #[test]
    fn test_event_severity() {
        let evicted = CoreEvent::Cache(CacheEvent::EntryEvicted {
            track_key: "1".to_string(),
            size_bytes: 10,
        });
        let local = CoreEvent::Playback(PlaybackEvent::ServedLocal {
            track_key: "1".to_string(),
        });

        assert_eq!(evicted.severity(), EventSeverity::Info);
        assert_eq!(local.severity(), EventSeverity::Debug);
        assert_eq!(local.description(), "Served from cache");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Cache(CacheEvent::DownloadCompleted {
            track_key: "abc".to_string(),
            size_bytes: 1000,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Cache");
        assert_eq!(json["payload"]["event"], "DownloadCompleted");
        assert_eq!(json["payload"]["size_bytes"], 1000);

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
