//! Event emission plumbing.
//!
//! The controller reports lifecycle events through an `EventEmitter`, which
//! forwards them to a pluggable `EventSink` over a bounded queue. Emission
//! never blocks the loop and never fails it: when the queue is full the
//! event is dropped and logged at debug.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::EventRecord;

/// Destination for loop lifecycle events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Record one event. Failures stay inside the sink.
    async fn record(&self, event: &EventRecord);
}

/// Sink that logs every event through `tracing`.
#[derive(Debug, Default)]
pub struct TracingSink;

#[async_trait]
impl EventSink for TracingSink {
    async fn record(&self, event: &EventRecord) {
        tracing::info!(
            event_type = %event.event_type,
            session = %event.session_id,
            iteration = ?event.iteration,
            payload = %event.payload,
            "loop event"
        );
    }
}

/// Sink that collects events in memory, for tests and embedding callers.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<EventRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event recorded so far, in arrival order
    pub fn events(&self) -> Vec<EventRecord> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Event type strings in arrival order
    pub fn event_types(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .map(|e| e.event_type)
            .collect()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn record(&self, event: &EventRecord) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event.clone());
    }
}

/// Non-blocking front end over an `EventSink`.
///
/// Events are pushed onto a bounded queue and drained by a spawned task, so
/// a slow sink can delay delivery but never the loop itself.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: Option<mpsc::Sender<EventRecord>>,
}

impl EventEmitter {
    /// Create an emitter draining into the given sink.
    pub fn new(sink: Arc<dyn EventSink>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<EventRecord>(capacity.max(1));

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sink.record(&event).await;
            }
        });

        Self { tx: Some(tx) }
    }

    /// Create an emitter that discards everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Returns true when events actually go anywhere
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Queue one event for delivery. Never blocks.
    pub fn emit(&self, event: EventRecord) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                tracing::debug!(
                    event_type = %event.event_type,
                    "event queue full, dropping event"
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                tracing::debug!(
                    event_type = %event.event_type,
                    "event drain task gone, dropping event"
                );
            }
        }
    }
}
