//! [`AgentRegistry`] – directory of live agents and their channels.
//!
//! The registry is an explicitly owned service object: the multi-agent
//! system creates one and hands an `Arc` to every agent task.  It holds the
//! only state that several agent tasks mutate concurrently, so each of its
//! two maps sits behind its own mutex:
//!
//! | Map | Key | Value |
//! |---|---|---|
//! | directory | agent | inbox sender |
//! | channels | channel name | subscribed agents |
//!
//! Membership changes are broadcast as [`RegistryEvent`]s so that agents can
//! start or stop modelling each other.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use cogent_types::{AgentId, CogentError, Message, Mood, Term};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Receiving end of an agent's message queue.
pub type Inbox = mpsc::UnboundedReceiver<Message>;

/// Default capacity of the membership broadcast.  Subscribers that fall
/// further behind must resynchronise from [`AgentRegistry::agents`].
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    Joined(AgentId),
    Left(AgentId),
}

struct Entry {
    inbox: mpsc::UnboundedSender<Message>,
    joined: u64,
}

/// Process-wide directory of live agents.
///
/// # Example
///
/// ```
/// use cogent_kernel::AgentRegistry;
/// use cogent_types::{AgentId, Message, Mood, Term};
///
/// let registry = AgentRegistry::new();
/// let mut inbox = registry.register(AgentId::new("bob")).unwrap();
///
/// let msg = Message::new(AgentId::new("alice"), vec![AgentId::new("bob")], Mood::Indicative, Term::atom("hello"));
/// assert_eq!(registry.deliver(&msg), 1);
/// assert_eq!(inbox.try_recv().unwrap().content, Term::atom("hello"));
/// ```
pub struct AgentRegistry {
    directory: Mutex<HashMap<AgentId, Entry>>,
    channels: Mutex<HashMap<String, BTreeSet<AgentId>>>,
    events: broadcast::Sender<RegistryEvent>,
    joined: Mutex<u64>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// A registry whose membership broadcast buffers `capacity` changes.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            directory: Mutex::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            events,
            joined: Mutex::new(0),
        }
    }

    // ────────────────────────────────────────────────────────────────────
    // Directory
    // ────────────────────────────────────────────────────────────────────

    /// Register `agent` and return its inbox.
    ///
    /// # Errors
    ///
    /// [`CogentError::Launch`] when an agent with that name is already live.
    pub fn register(&self, agent: AgentId) -> Result<Inbox, CogentError> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut directory = self.directory.lock().unwrap_or_else(PoisonError::into_inner);
            if directory.contains_key(&agent) {
                return Err(CogentError::Launch {
                    agent: agent.to_string(),
                    details: "an agent with this name is already registered".to_string(),
                });
            }
            let joined = {
                let mut counter = self.joined.lock().unwrap_or_else(PoisonError::into_inner);
                *counter += 1;
                *counter
            };
            directory.insert(agent.clone(), Entry { inbox: tx, joined });
        }
        debug!(%agent, "agent registered");
        let _ = self.events.send(RegistryEvent::Joined(agent));
        Ok(rx)
    }

    /// Remove `agent` and all its channel subscriptions.  Returns `false`
    /// when it was not registered.
    pub fn unregister(&self, agent: &AgentId) -> bool {
        let removed = self
            .directory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent)
            .is_some();
        if removed {
            let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
            for members in channels.values_mut() {
                members.remove(agent);
            }
            channels.retain(|_, members| !members.is_empty());
            drop(channels);
            debug!(%agent, "agent unregistered");
            let _ = self.events.send(RegistryEvent::Left(agent.clone()));
        }
        removed
    }

    pub fn contains(&self, agent: &AgentId) -> bool {
        self.directory
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(agent)
    }

    /// Live agents in registration order.
    pub fn agents(&self) -> Vec<AgentId> {
        let directory = self.directory.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries: Vec<(&AgentId, u64)> = directory.iter().map(|(id, e)| (id, e.joined)).collect();
        entries.sort_by_key(|(_, joined)| *joined);
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.directory.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Watch membership changes.
    pub fn subscribe_events(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    // ────────────────────────────────────────────────────────────────────
    // Messages
    // ────────────────────────────────────────────────────────────────────

    /// Put `message` in the inbox of one agent.
    ///
    /// # Errors
    ///
    /// [`CogentError::UnknownAgent`] when `receiver` is not live.
    pub fn send_to(&self, receiver: &AgentId, message: Message) -> Result<(), CogentError> {
        let directory = self.directory.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = directory
            .get(receiver)
            .ok_or_else(|| CogentError::UnknownAgent(receiver.clone()))?;
        entry
            .inbox
            .send(message)
            .map_err(|_| CogentError::UnknownAgent(receiver.clone()))
    }

    /// Deliver `message` to each of its receivers.  Receivers that are not
    /// live are skipped with a warning.  Returns the number of inboxes
    /// reached.
    pub fn deliver(&self, message: &Message) -> usize {
        let mut delivered = 0;
        for receiver in &message.receivers {
            match self.send_to(receiver, message.clone()) {
                Ok(()) => delivered += 1,
                Err(error) => warn!(sender = %message.sender, %receiver, %error, "message not delivered"),
            }
        }
        delivered
    }

    // ────────────────────────────────────────────────────────────────────
    // Channels
    // ────────────────────────────────────────────────────────────────────

    /// Subscribe `agent` to `channel`.  Returns `false` when it already was.
    pub fn subscribe(&self, agent: &AgentId, channel: &str) -> bool {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .insert(agent.clone())
    }

    /// Unsubscribe `agent` from `channel`.  Returns `false` when it was not
    /// subscribed.
    pub fn unsubscribe(&self, agent: &AgentId, channel: &str) -> bool {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(members) = channels.get_mut(channel) else {
            return false;
        };
        let removed = members.remove(agent);
        if members.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    /// Agents subscribed to `channel`, in name order.
    pub fn subscribers(&self, channel: &str) -> Vec<AgentId> {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Send `content` to every subscriber of `channel` except `sender`.
    /// Returns the message that was delivered, if anyone listened.
    pub fn publish(&self, sender: &AgentId, channel: &str, mood: Mood, content: Term) -> Option<Message> {
        let receivers: Vec<AgentId> = self
            .subscribers(channel)
            .into_iter()
            .filter(|a| a != sender)
            .collect();
        if receivers.is_empty() {
            debug!(%sender, channel, "publish without subscribers");
            return None;
        }
        let message = Message::new(sender.clone(), receivers, mood, content);
        self.deliver(&message);
        Some(message)
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("agents", &self.agents())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> AgentId {
        AgentId::new(name)
    }

    fn msg(from: &str, to: &[&str]) -> Message {
        Message::new(id(from), to.iter().map(|n| id(n)).collect(), Mood::Indicative, Term::atom("ping"))
    }

    #[test]
    fn duplicate_registration_is_a_launch_failure() {
        let registry = AgentRegistry::new();
        let _inbox = registry.register(id("alice")).unwrap();
        assert!(matches!(registry.register(id("alice")), Err(CogentError::Launch { .. })));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn agents_keep_registration_order() {
        let registry = AgentRegistry::new();
        let _c = registry.register(id("carol")).unwrap();
        let _a = registry.register(id("alice")).unwrap();
        let _b = registry.register(id("bob")).unwrap();
        assert_eq!(registry.agents(), vec![id("carol"), id("alice"), id("bob")]);
    }

    #[test]
    fn deliver_skips_unknown_receivers() {
        let registry = AgentRegistry::new();
        let mut bob = registry.register(id("bob")).unwrap();
        assert_eq!(registry.deliver(&msg("alice", &["bob", "ghost"])), 1);
        assert_eq!(bob.try_recv().unwrap().sender, id("alice"));
        assert!(matches!(
            registry.send_to(&id("ghost"), msg("alice", &["ghost"])),
            Err(CogentError::UnknownAgent(_))
        ));
    }

    #[test]
    fn unregister_drops_subscriptions() {
        let registry = AgentRegistry::new();
        let _bob = registry.register(id("bob")).unwrap();
        assert!(registry.subscribe(&id("bob"), "news"));
        assert!(!registry.subscribe(&id("bob"), "news"));
        assert!(registry.unregister(&id("bob")));
        assert!(!registry.unregister(&id("bob")));
        assert!(registry.subscribers("news").is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn publish_reaches_other_subscribers_only() {
        let registry = AgentRegistry::new();
        let mut alice = registry.register(id("alice")).unwrap();
        let mut bob = registry.register(id("bob")).unwrap();
        registry.subscribe(&id("alice"), "news");
        registry.subscribe(&id("bob"), "news");

        let sent = registry.publish(&id("alice"), "news", Mood::Indicative, Term::atom("rain"));
        assert_eq!(sent.map(|m| m.receivers), Some(vec![id("bob")]));
        assert_eq!(bob.try_recv().unwrap().content, Term::atom("rain"));
        assert!(alice.try_recv().is_err());

        assert!(registry.unsubscribe(&id("bob"), "news"));
        assert!(registry.publish(&id("alice"), "news", Mood::Indicative, Term::atom("sun")).is_none());
    }

    #[tokio::test]
    async fn membership_changes_are_broadcast() {
        let registry = AgentRegistry::new();
        let mut events = registry.subscribe_events();
        let _alice = registry.register(id("alice")).unwrap();
        registry.unregister(&id("alice"));
        assert_eq!(events.recv().await.unwrap(), RegistryEvent::Joined(id("alice")));
        assert_eq!(events.recv().await.unwrap(), RegistryEvent::Left(id("alice")));
    }

    #[test]
    fn slow_subscribers_lag_past_the_event_capacity() {
        let registry = AgentRegistry::with_event_capacity(2);
        let mut events = registry.subscribe_events();
        let _inboxes: Vec<_> = ["a", "b", "c"].iter().map(|n| registry.register(id(n)).unwrap()).collect();
        assert!(matches!(events.try_recv(), Err(broadcast::error::TryRecvError::Lagged(1))));
        assert_eq!(events.try_recv().unwrap(), RegistryEvent::Joined(id("b")));
    }
}
