//! Async event bus for streaming agent observations.
//!
//! Every node publishes `AgentEvent` records; renderers, history loggers,
//! and cost meters subscribe. Each subscriber gets its own bounded FIFO
//! queue so a slow consumer can never block the planner or dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::warn;

/// Default per-subscriber queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Kinds of events the agent core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StepStart,
    ToolCall,
    ToolResult,
    LlmUsage,
    Reasoning,
    GoalCheck,
    IterationComplete,
    HumanCheckRequired,
    Log,
    Error,
    RunEnd,
}

/// An immutable observation published to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub kind: EventKind,
    pub run_id: String,
    pub iteration: u32,
    /// Free-form payload; shape depends on `kind`.
    pub payload: Value,
}

impl AgentEvent {
    pub fn new(
        kind: EventKind,
        run_id: impl Into<String>,
        iteration: u32,
        payload: Value,
    ) -> Self {
        AgentEvent {
            kind,
            run_id: run_id.into(),
            iteration,
            payload,
        }
    }
}

enum BusMessage {
    Event(AgentEvent),
    Closed,
}

struct SubscriberSlot {
    sender: mpsc::Sender<BusMessage>,
    /// Events dropped since the last successful delivery to this subscriber.
    dropped: u64,
}

/// Fan-out bus with per-subscriber bounded queues.
///
/// Publishers never block: when a subscriber's queue is full the event is
/// dropped for that subscriber and a warning is recorded on the next
/// successful publish. Closing the bus terminates every live subscription
/// after it drains.
pub struct EventBus {
    slots: Mutex<Vec<SubscriberSlot>>,
    closed: AtomicBool,
    capacity: usize,
}

/// A single subscriber's view of the bus.
pub struct Subscription {
    receiver: mpsc::Receiver<BusMessage>,
}

impl Subscription {
    /// Receive the next event in publication order.
    ///
    /// Returns `None` once the bus has been closed and the queue drained.
    pub async fn next(&mut self) -> Option<AgentEvent> {
        match self.receiver.recv().await {
            Some(BusMessage::Event(event)) => Some(event),
            Some(BusMessage::Closed) | None => None,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a bus with a custom per-subscriber queue depth.
    pub fn with_capacity(capacity: usize) -> Self {
        EventBus {
            slots: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            capacity: capacity.max(1),
        }
    }

    /// Register a new subscriber with its own queue.
    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        if self.closed.load(Ordering::SeqCst) {
            // Deliver the close sentinel immediately so the loop terminates.
            let _ = sender.try_send(BusMessage::Closed);
        } else {
            self.slots
                .lock()
                .expect("event bus lock poisoned")
                .push(SubscriberSlot { sender, dropped: 0 });
        }
        Subscription { receiver }
    }

    /// Deliver an event to every current subscriber without blocking.
    pub fn publish(&self, event: AgentEvent) {
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        let mut slots = self.slots.lock().expect("event bus lock poisoned");
        slots.retain_mut(|slot| {
            match slot.sender.try_send(BusMessage::Event(event.clone())) {
                Ok(()) => {
                    if slot.dropped > 0 {
                        warn!(
                            dropped = slot.dropped,
                            "event bus dropped events for a slow subscriber"
                        );
                        slot.dropped = 0;
                    }
                    true
                }
                Err(mpsc::error::TrySendError::Full(_)) => {
                    slot.dropped += 1;
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Close the bus. Every live subscription terminates after draining;
    /// subsequent publishes are no-ops.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut slots = self.slots.lock().expect("event bus lock poisoned");
        for slot in slots.iter() {
            // Best effort: if the queue is full, dropping the sender below
            // still terminates the subscription once it drains.
            let _ = slot.sender.try_send(BusMessage::Closed);
        }
        slots.clear();
    }

    /// Whether `close()` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.slots.lock().expect("event bus lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(n: u32) -> AgentEvent {
        AgentEvent::new(EventKind::Log, "run-1", n, json!({ "n": n }))
    }

    #[tokio::test]
    async fn delivers_in_publication_order() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        for i in 0..5 {
            bus.publish(ev(i));
        }
        bus.close();
        let mut seen = Vec::new();
        while let Some(event) = sub.next().await {
            seen.push(event.iteration);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn slow_subscriber_drops_without_blocking_publisher() {
        let bus = EventBus::with_capacity(2);
        let mut sub = bus.subscribe();
        for i in 0..10 {
            bus.publish(ev(i));
        }
        bus.close();
        let mut seen = Vec::new();
        while let Some(event) = sub.next().await {
            seen.push(event.iteration);
        }
        // Only the first two fit; the rest were dropped, not queued.
        assert_eq!(seen, vec![0, 1]);
    }

    #[tokio::test]
    async fn close_terminates_subscriptions() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(ev(1));
        bus.close();
        assert_eq!(sub.next().await.map(|e| e.iteration), Some(1));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn publish_after_close_is_noop() {
        let bus = EventBus::new();
        bus.close();
        bus.publish(ev(1));
        let mut sub = bus.subscribe();
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn independent_subscriber_queues() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.publish(ev(7));
        bus.close();
        assert_eq!(a.next().await.map(|e| e.iteration), Some(7));
        assert_eq!(b.next().await.map(|e| e.iteration), Some(7));
    }
}
