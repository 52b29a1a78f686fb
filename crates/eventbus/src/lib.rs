//! Event Bus (C10): in-process pub/sub for evaluated decisions. Every
//! subscriber owns a bounded `tokio::sync::broadcast` receiver; a slow
//! subscriber falls behind and loses events rather than ever
//! back-pressuring the publisher — `broadcast`'s `Lagged` signal is
//! exactly the drop-on-overflow accounting the design calls for.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Duration;

use gov_domain::trace::TraceEvent;

/// Event kinds delivered to subscribers.
#[derive(Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GovEvent {
    Connected,
    ActionEvaluated {
        action_id: String,
        tool: String,
        decision: gov_domain::Decision,
        risk_score: u8,
        agent_id: Option<String>,
        timestamp: DateTime<Utc>,
    },
    Heartbeat,
}

pub struct EventBus {
    tx: broadcast::Sender<GovEvent>,
    next_subscriber_id: AtomicU64,
}

impl EventBus {
    pub fn new(subscriber_buffer_size: usize) -> Self {
        let (tx, _rx) = broadcast::channel(subscriber_buffer_size.max(1));
        Self { tx, next_subscriber_id: AtomicU64::new(1) }
    }

    /// Registers a new subscriber. The returned `Subscription` immediately
    /// observes a `Connected` event is NOT sent automatically — callers
    /// that want one should publish it themselves after subscribing, since
    /// a bus-wide `Connected` event would be delivered to every other
    /// subscriber too.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        Subscription { id, rx: self.tx.subscribe(), dropped_count: 0 }
    }

    /// Delivers `event` to every live subscriber. Never blocks: if a
    /// subscriber's buffer is full, `broadcast` evicts its oldest
    /// unread event rather than stalling this call.
    pub fn publish(&self, event: GovEvent) {
        // No live receivers is not an error — the event simply has no audience.
        let _ = self.tx.send(event);
    }

    /// Number of currently live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Spawns a background task that publishes a `Heartbeat` every
    /// `interval_secs` seconds until the bus is dropped. Idle subscribers
    /// use this to detect liveness without the publisher doing anything
    /// request-path related.
    pub fn spawn_heartbeat(&self, interval_secs: u64) -> tokio::task::JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            loop {
                ticker.tick().await;
                let _ = tx.send(GovEvent::Heartbeat);
            }
        })
    }
}

/// One subscriber's view of the bus. Tracks how many events it has
/// missed due to falling behind.
pub struct Subscription {
    id: u64,
    rx: broadcast::Receiver<GovEvent>,
    dropped_count: u64,
}

impl Subscription {
    /// Awaits the next event, transparently skipping past any gap left by
    /// a lag and folding it into `dropped_count`. Returns `None` once the
    /// bus itself has been dropped.
    pub async fn recv(&mut self) -> Option<GovEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    self.dropped_count += skipped;
                    TraceEvent::SubscriberDropped { subscriber_id: self.id, dropped_count: self.dropped_count }.emit();
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_sees_every_event_in_order() {
        let bus = EventBus::new(64);
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        for i in 0..3 {
            bus.publish(GovEvent::ActionEvaluated {
                action_id: format!("a{i}"),
                tool: "noop".to_string(),
                decision: gov_domain::Decision::Allow,
                risk_score: 0,
                agent_id: None,
                timestamp: Utc::now(),
            });
        }

        for sub in [&mut sub_a, &mut sub_b] {
            for i in 0..3 {
                match sub.recv().await.unwrap() {
                    GovEvent::ActionEvaluated { action_id, .. } => assert_eq!(action_id, format!("a{i}")),
                    other => panic!("unexpected event: {other:?}"),
                }
            }
        }
    }

    #[tokio::test]
    async fn overflowing_buffer_drops_for_the_slow_subscriber_without_blocking_publish() {
        let bus = EventBus::new(2);
        let mut slow = bus.subscribe();

        for i in 0..5 {
            bus.publish(GovEvent::ActionEvaluated {
                action_id: format!("a{i}"),
                tool: "noop".to_string(),
                decision: gov_domain::Decision::Allow,
                risk_score: 0,
                agent_id: None,
                timestamp: Utc::now(),
            });
        }

        // Only the last 2 of 5 events survive in a 2-slot buffer; recv()
        // surfaces the gap as dropped_count rather than erroring out.
        let first = slow.recv().await.unwrap();
        assert!(matches!(first, GovEvent::ActionEvaluated { ref action_id, .. } if action_id == "a3"));
        assert_eq!(slow.dropped_count(), 3);
    }

    #[tokio::test]
    async fn unsubscribed_bus_has_zero_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        // receiver_count() reflects drops synchronously.
        assert_eq!(bus.subscriber_count(), 0);
    }
}

impl std::fmt::Debug for GovEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GovEvent::Connected => write!(f, "Connected"),
            GovEvent::ActionEvaluated { action_id, .. } => write!(f, "ActionEvaluated({action_id})"),
            GovEvent::Heartbeat => write!(f, "Heartbeat"),
        }
    }
}
