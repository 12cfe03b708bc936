//! Debug events emitted by the mental-state engine and the runtime.
//!
//! Events are fire-and-continue: an [`EventSink`] must never block or fail
//! back into the caller.  Debuggers, profilers and log tailers consume them
//! from the event bus in `cogent-events`.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AgentId, SourceInfo};

/// Named notification lanes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    QueryStart,
    QueryEnd,
    Insert,
    Delete,
    Percept,
    MessageReceived,
    MessageSent,
    Adopt,
    Drop,
    GoalAchieved,
    Focus,
    Defocus,
    ModuleEntry,
    ModuleExit,
    RuleCondition,
    ActionExecuted,
    ReasoningCycle,
    Sleep,
    Wakeup,
    AgentTerminated,
}

impl Channel {
    pub const ALL: [Channel; 20] = [
        Channel::QueryStart,
        Channel::QueryEnd,
        Channel::Insert,
        Channel::Delete,
        Channel::Percept,
        Channel::MessageReceived,
        Channel::MessageSent,
        Channel::Adopt,
        Channel::Drop,
        Channel::GoalAchieved,
        Channel::Focus,
        Channel::Defocus,
        Channel::ModuleEntry,
        Channel::ModuleExit,
        Channel::RuleCondition,
        Channel::ActionExecuted,
        Channel::ReasoningCycle,
        Channel::Sleep,
        Channel::Wakeup,
        Channel::AgentTerminated,
    ];
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::QueryStart => "query_start",
            Channel::QueryEnd => "query_end",
            Channel::Insert => "insert",
            Channel::Delete => "delete",
            Channel::Percept => "percept",
            Channel::MessageReceived => "message_received",
            Channel::MessageSent => "message_sent",
            Channel::Adopt => "adopt",
            Channel::Drop => "drop",
            Channel::GoalAchieved => "goal_achieved",
            Channel::Focus => "focus",
            Channel::Defocus => "defocus",
            Channel::ModuleEntry => "module_entry",
            Channel::ModuleExit => "module_exit",
            Channel::RuleCondition => "rule_condition",
            Channel::ActionExecuted => "action_executed",
            Channel::ReasoningCycle => "reasoning_cycle",
            Channel::Sleep => "sleep",
            Channel::Wakeup => "wakeup",
            Channel::AgentTerminated => "agent_terminated",
        };
        f.write_str(name)
    }
}

/// One debug notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// Agent whose engine emitted the event.
    pub agent: AgentId,
    pub channel: Channel,
    /// Display form of the associated object (formula, goal, module, ...).
    pub subject: String,
    pub source: Option<SourceInfo>,
    pub message: String,
}

impl Event {
    pub fn new(
        agent: &AgentId,
        channel: Channel,
        subject: impl fmt::Display,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            agent: agent.clone(),
            channel,
            subject: subject.to_string(),
            source: None,
            message: message.into(),
        }
    }

    pub fn with_source(mut self, source: Option<&SourceInfo>) -> Self {
        self.source = source.cloned();
        self
    }
}

/// Receiver of debug events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: Event) {}
}

/// Keeps every event in memory.  Handy for tests and for post-mortem dumps.
#[derive(Debug, Default)]
pub struct CollectingSink {
    events: Mutex<Vec<Event>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Events on one channel, in emission order.
    pub fn on(&self, channel: Channel) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| e.channel == channel)
            .collect()
    }
}

impl EventSink for CollectingSink {
    fn emit(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collecting_sink_filters_by_channel() {
        let sink = CollectingSink::new();
        let me = AgentId::new("alice");
        sink.emit(Event::new(&me, Channel::Insert, "p(1)", "inserted"));
        sink.emit(Event::new(&me, Channel::Adopt, "p(2)", "adopted"));
        assert_eq!(sink.events().len(), 2);
        let adopts = sink.on(Channel::Adopt);
        assert_eq!(adopts.len(), 1);
        assert_eq!(adopts[0].subject, "p(2)");
    }

    #[test]
    fn event_roundtrip() {
        let source = SourceInfo::new("blocks.mod2g", 12, 4);
        let event = Event::new(&AgentId::new("bob"), Channel::ModuleEntry, "main", "entering")
            .with_source(Some(&source));
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.source, Some(source));
        assert_eq!(back.channel, Channel::ModuleEntry);
    }

    #[test]
    fn channel_display_is_snake_case() {
        assert_eq!(Channel::QueryStart.to_string(), "query_start");
        assert_eq!(Channel::ALL.len(), 20);
    }
}
