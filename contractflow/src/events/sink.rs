//! Event sink trait and implementations.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn, Level};

use super::WorkflowEvent;

/// Receives workflow events.
///
/// Sinks observe; they never influence control flow. Failures inside a
/// sink are logged and suppressed.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers an event, waiting for capacity where the sink has any.
    async fn emit(&self, event: &WorkflowEvent) {
        self.try_emit(event);
    }

    /// Delivers an event without waiting.
    fn try_emit(&self, event: &WorkflowEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

impl EventSink for NoOpEventSink {
    fn try_emit(&self, _event: &WorkflowEvent) {}
}

/// Forwards events to `tracing`.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Logs at `level`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs at debug level.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Logs at info level.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }
}

impl EventSink for LoggingEventSink {
    fn try_emit(&self, event: &WorkflowEvent) {
        let name = event.name();
        let workflow_id = event.workflow_id();
        let data = serde_json::to_string(event).unwrap_or_default();
        match self.level {
            Level::TRACE => trace!(event = name, %workflow_id, %data, "Event: {name}"),
            Level::DEBUG => debug!(event = name, %workflow_id, %data, "Event: {name}"),
            Level::WARN | Level::ERROR => warn!(event = name, %workflow_id, %data, "Event: {name}"),
            _ => info!(event = name, %workflow_id, %data, "Event: {name}"),
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: RwLock<Vec<WorkflowEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All collected events.
    #[must_use]
    pub fn events(&self) -> Vec<WorkflowEvent> {
        self.events.read().clone()
    }

    /// Names of collected events, in order.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.events.read().iter().map(WorkflowEvent::name).collect()
    }

    /// Events whose name starts with `prefix`.
    #[must_use]
    pub fn events_named(&self, prefix: &str) -> Vec<WorkflowEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.name().starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// True when nothing was collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Drops everything collected.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl EventSink for CollectingEventSink {
    fn try_emit(&self, event: &WorkflowEvent) {
        self.events.write().push(event.clone());
    }
}

/// Sends events over a bounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelEventSink {
    sender: mpsc::Sender<WorkflowEvent>,
}

impl ChannelEventSink {
    /// Creates a sink and the receiving half of its channel.
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WorkflowEvent>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Wraps an existing sender.
    #[must_use]
    pub fn from_sender(sender: mpsc::Sender<WorkflowEvent>) -> Self {
        Self { sender }
    }
}

/// Never waits for the receiver: when the channel is full the event is
/// dropped with a warning, so a slow subscriber cannot stall a run.
impl EventSink for ChannelEventSink {
    fn try_emit(&self, event: &WorkflowEvent) {
        match self.sender.try_send(event.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(event = event.name(), "Event channel full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(event = event.name(), "Event receiver dropped");
            }
        }
    }
}

/// Invokes a callback per event.
pub struct FnEventSink {
    callback: Box<dyn Fn(&WorkflowEvent) + Send + Sync>,
}

impl FnEventSink {
    /// Wraps `callback`.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl std::fmt::Debug for FnEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEventSink").finish_non_exhaustive()
    }
}

impl EventSink for FnEventSink {
    fn try_emit(&self, event: &WorkflowEvent) {
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| (self.callback)(event))).is_err() {
            warn!(event = event.name(), "Event callback panicked");
        }
    }
}

/// Fans each event out to every subscribed sink, in subscription order.
#[derive(Default)]
pub struct EventBus {
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a subscriber.
    pub fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().push(sink);
    }

    /// Builder form of [`EventBus::subscribe`].
    #[must_use]
    pub fn with(self, sink: Arc<dyn EventSink>) -> Self {
        self.subscribe(sink);
        self
    }

    /// Number of subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sinks.read().len()
    }

    /// True when nobody is subscribed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sinks.read().is_empty()
    }

    fn subscribers(&self) -> Vec<Arc<dyn EventSink>> {
        self.sinks.read().clone()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").field("sinks", &self.len()).finish()
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, event: &WorkflowEvent) {
        // Snapshot so the lock is not held across awaits.
        for sink in self.subscribers() {
            sink.emit(event).await;
        }
    }

    fn try_emit(&self, event: &WorkflowEvent) {
        for sink in self.subscribers() {
            sink.try_emit(event);
        }
    }
}
