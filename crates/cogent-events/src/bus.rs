//! Channel-partitioned publish/subscribe bus for debug events.
//!
//! Uses [`tokio::sync::broadcast`] channels so that every subscriber receives
//! every event without any single subscriber blocking the emitting agent.
//!
//! # Lanes
//!
//! Every [`Channel`] has its own broadcast lane, so a profiler that only
//! cares about [`Channel::QueryStart`] / [`Channel::QueryEnd`] never sees
//! insert traffic.  A global lane carries every event regardless of channel.
//!
//! Publishing is fire-and-forget: no subscribers is a normal condition, and
//! slow subscribers lag instead of applying back-pressure.

use std::collections::HashMap;
use std::sync::Arc;

use cogent_types::{AgentId, Channel, Event, EventSink};
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 1024;

/// Shared event bus.  Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    global: broadcast::Sender<Event>,
    lanes: Arc<HashMap<Channel, broadcast::Sender<Event>>>,
}

impl EventBus {
    /// Create a new bus with the given capacity for every lane.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (global, _) = broadcast::channel(capacity);
        let lanes = Channel::ALL
            .iter()
            .map(|channel| (*channel, broadcast::channel(capacity).0))
            .collect();
        Self {
            global,
            lanes: Arc::new(lanes),
        }
    }

    /// Publish `event` on its channel lane and on the global lane.
    ///
    /// Returns the number of receivers that were handed the event (0 when
    /// nobody listens).
    pub fn publish(&self, event: Event) -> usize {
        let mut delivered = 0;
        if let Some(lane) = self.lanes.get(&event.channel) {
            delivered += lane.send(event.clone()).unwrap_or(0);
        }
        delivered + self.global.send(event).unwrap_or(0)
    }

    /// Subscribe to one [`Channel`] lane.
    pub fn subscribe_to(&self, channel: Channel) -> ChannelReceiver {
        let receiver = match self.lanes.get(&channel) {
            Some(lane) => lane.subscribe(),
            // Every channel gets a lane in `new`; an orphan receiver is
            // simply never fed.
            None => broadcast::channel(1).1,
        };
        ChannelReceiver { channel, receiver }
    }

    /// Subscribe to every event on the global lane.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.global.subscribe()
    }

    /// Subscribe to the global lane, filtered to the events of one agent.
    pub fn subscribe_agent(&self, agent: AgentId) -> AgentSubscriber {
        AgentSubscriber {
            agent,
            receiver: self.global.subscribe(),
        }
    }

    /// Number of active subscribers on the global lane.
    pub fn subscriber_count(&self) -> usize {
        self.global.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: Event) {
        self.publish(event);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel receiver
// ─────────────────────────────────────────────────────────────────────────────

/// An async receiver bound to a single [`Channel`] lane.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct ChannelReceiver {
    channel: Channel,
    receiver: broadcast::Receiver<Event>,
}

impl ChannelReceiver {
    /// Wait for the next event on this lane.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   events were dropped.
    /// * `Err(RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-agent subscriber
// ─────────────────────────────────────────────────────────────────────────────

/// A subscriber that only delivers events emitted by one agent.
pub struct AgentSubscriber {
    agent: AgentId,
    receiver: broadcast::Receiver<Event>,
}

impl AgentSubscriber {
    /// Wait for the next event of this subscriber's agent.
    ///
    /// Returns `None` when the bus is closed and no further events will arrive.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.agent == self.agent => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(agent = %self.agent, lagged_by = n, "AgentSubscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn make_event(agent: &str, channel: Channel) -> Event {
        Event::new(&AgentId::new(agent), channel, "p(1)", "test")
    }

    #[tokio::test]
    async fn publish_reaches_lane_and_global() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut lane = bus.subscribe_to(Channel::Insert);
        let mut all = bus.subscribe();

        let event = make_event("alice", Channel::Insert);
        assert_eq!(bus.publish(event.clone()), 2);

        assert_eq!(lane.recv().await?.id, event.id);
        assert_eq!(all.recv().await?.id, event.id);
        Ok(())
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = EventBus::default();
        assert_eq!(bus.publish(make_event("alice", Channel::Adopt)), 0);
    }

    #[tokio::test]
    async fn lane_does_not_receive_other_channels() {
        let bus = EventBus::default();
        let mut drops = bus.subscribe_to(Channel::Drop);
        bus.emit(make_event("alice", Channel::Adopt));

        let result = tokio::time::timeout(Duration::from_millis(50), drops.recv()).await;
        assert!(result.is_err(), "drop lane must not receive an adopt event");
        assert!(drops.try_recv().is_err());
        assert_eq!(drops.channel(), Channel::Drop);
    }

    #[tokio::test]
    async fn agent_subscriber_filters() {
        let bus = EventBus::default();
        let mut bob = bus.subscribe_agent(AgentId::new("bob"));

        bus.publish(make_event("alice", Channel::Insert));
        let good = make_event("bob", Channel::Insert);
        bus.publish(good.clone());

        let received = bob.recv().await.map(|e| e.id);
        assert_eq!(received, Some(good.id));
    }

    #[tokio::test]
    async fn slow_subscriber_lags() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Channel::QueryStart);
        for _ in 0..100 {
            bus.publish(make_event("alice", Channel::QueryStart));
        }
        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[test]
    fn clones_share_lanes() {
        let bus = EventBus::default();
        let clone = bus.clone();
        let _rx = bus.subscribe();
        assert_eq!(clone.subscriber_count(), 1);
    }
}
