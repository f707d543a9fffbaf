//! Workflow observability events.
//!
//! The executor reports every lifecycle change as a typed
//! [`WorkflowEvent`] delivered to an [`EventSink`]. Sinks can be combined
//! with an [`EventBus`].

mod event;
mod sink;

pub use event::WorkflowEvent;
pub use sink::{
    ChannelEventSink, CollectingEventSink, EventBus, EventSink, FnEventSink, LoggingEventSink,
    NoOpEventSink,
};
