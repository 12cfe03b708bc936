//! Composable [`EventSink`] implementations.

use std::sync::Arc;

use cogent_types::{Channel, Event, EventSink};
use tracing::{debug, trace};

/// Forwards every event to `tracing`.
///
/// High-volume channels (query start/end, rule conditions) go to `TRACE`,
/// everything else to `DEBUG`, so `RUST_LOG=cogent=debug` shows state
/// changes without drowning in query traffic.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: Event) {
        let location = event.source.as_ref().map(ToString::to_string);
        match event.channel {
            Channel::QueryStart | Channel::QueryEnd | Channel::RuleCondition => trace!(
                agent = %event.agent,
                channel = %event.channel,
                subject = %event.subject,
                source = location.as_deref(),
                "{}",
                event.message
            ),
            _ => debug!(
                agent = %event.agent,
                channel = %event.channel,
                subject = %event.subject,
                source = location.as_deref(),
                "{}",
                event.message
            ),
        }
    }
}

/// Duplicates every event to each of its sinks, in order.
#[derive(Clone, Default)]
pub struct FanOut {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanOut {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl EventSink for FanOut {
    fn emit(&self, event: Event) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventBus;
    use cogent_types::{AgentId, CollectingSink};

    #[test]
    fn fan_out_duplicates_events() {
        let a = Arc::new(CollectingSink::new());
        let b = Arc::new(CollectingSink::new());
        let fan = FanOut::new()
            .with(a.clone())
            .with(b.clone())
            .with(Arc::new(TracingSink));
        assert_eq!(fan.len(), 3);

        fan.emit(Event::new(&AgentId::new("alice"), Channel::Adopt, "p(2)", "adopted"));
        assert_eq!(a.events().len(), 1);
        assert_eq!(b.on(Channel::Adopt).len(), 1);
    }

    #[test]
    fn empty_fan_out_discards() {
        let fan = FanOut::new();
        assert!(fan.is_empty());
        fan.emit(Event::new(&AgentId::new("alice"), Channel::Drop, "p", "dropped"));
    }

    #[tokio::test]
    async fn fan_out_feeds_bus() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        let fan = FanOut::new().with(Arc::new(bus.clone()));
        let event = Event::new(&AgentId::new("bob"), Channel::ModuleEntry, "main", "enter");
        fan.emit(event.clone());
        let received = rx.recv().await?;
        assert_eq!(received.id, event.id);
        let json = serde_json::to_string(&received)?;
        assert!(json.contains("module_entry") || json.contains("ModuleEntry"));
        Ok(())
    }
}
