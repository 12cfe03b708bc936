//! `cogent-types` – shared vocabulary of the Cogent agent runtime.
//!
//! # Modules
//!
//! - [`term`] – [`Term`], [`Substitution`] and unification ([`mgu`]).
//! - [`formula`] – KR-level [`Query`], [`Update`], [`DatabaseFormula`] and
//!   [`KrLiteral`] values exchanged with a KR engine.
//! - [`event`] – debug [`Event`]s, [`Channel`] lanes and the [`EventSink`]
//!   capability.
//!
//! The crate root holds agent identities, the mental base tags, messages and
//! the crate-spanning [`CogentError`].

pub mod event;
pub mod formula;
pub mod term;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use event::{Channel, CollectingSink, Event, EventSink, NoopSink};
pub use formula::{DatabaseFormula, KrLiteral, Query, Update};
pub use term::{Substitution, Term, mgu, unify};

// ─────────────────────────────────────────────────────────────────────────────
// Agent identity
// ─────────────────────────────────────────────────────────────────────────────

/// Unique, stable name of an agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The agent name as a KR atom.
    pub fn to_term(&self) -> Term {
        Term::atom(self.0.clone())
    }

    /// Interpret a ground atom as an agent name.
    pub fn from_term(term: &Term) -> Option<Self> {
        match term {
            Term::Atom(name) => Some(Self(name.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Base types
// ─────────────────────────────────────────────────────────────────────────────

/// Tag of a mental store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseType {
    /// Immutable after creation.
    Knowledge,
    Belief,
    Percept,
    Message,
    /// Attention sets (goal bases).
    Goal,
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BaseType::Knowledge => "knowledgebase",
            BaseType::Belief => "beliefbase",
            BaseType::Percept => "perceptbase",
            BaseType::Message => "messagebase",
            BaseType::Goal => "goalbase",
        };
        f.write_str(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Sentence mood of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Mood {
    /// `:content` – the sender believes the content.
    Indicative,
    /// `!content` – the sender wants the content.
    Imperative,
    /// `?content` – the sender asks about the content.
    Interrogative,
}

impl Mood {
    /// Functor used to wrap message content in the message base.
    pub fn functor(&self) -> &'static str {
        match self {
            Mood::Indicative => "indicative",
            Mood::Imperative => "imperative",
            Mood::Interrogative => "interrogative",
        }
    }

    /// Wrap `content` as `mood(content)`.
    pub fn wrap(&self, content: Term) -> Term {
        Term::compound(self.functor(), vec![content])
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Mood::Indicative => ":",
            Mood::Imperative => "!",
            Mood::Interrogative => "?",
        };
        f.write_str(symbol)
    }
}

/// A message exchanged between agents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Message {
    pub sender: AgentId,
    pub receivers: Vec<AgentId>,
    pub mood: Mood,
    pub content: Term,
}

impl Message {
    pub fn new(sender: AgentId, receivers: Vec<AgentId>, mood: Mood, content: Term) -> Self {
        Self {
            sender,
            receivers,
            mood,
            content,
        }
    }

    /// `received(Sender, mood(Content))`.
    pub fn received_formula(&self) -> DatabaseFormula {
        DatabaseFormula::fact(Term::compound(
            "received",
            vec![self.sender.to_term(), self.mood.wrap(self.content.clone())],
        ))
    }

    /// `sent(Receiver, mood(Content))` for one receiver.
    pub fn sent_formula(&self, receiver: &AgentId) -> DatabaseFormula {
        DatabaseFormula::fact(Term::compound(
            "sent",
            vec![receiver.to_term(), self.mood.wrap(self.content.clone())],
        ))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> [", self.sender)?;
        for (i, receiver) in self.receivers.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{receiver}")?;
        }
        write!(f, "] {}{}", self.mood, self.content)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────────────

/// Location of a program element, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInfo {
    pub source: String,
    pub line: u32,
    pub column: u32,
}

impl SourceInfo {
    pub fn new(source: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            source: source.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.column)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// How an action failure affects the agent that attempted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    /// Warn and continue (environment paused, explicit failure).
    Soft,
    /// Kill the agent.
    Hard,
}

/// Global error type spanning KR databases, query evaluation, actions and
/// agent lifecycle.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CogentError {
    #[error("Database error in {database}: {details}")]
    Database { database: String, details: String },

    #[error("Query error: {0}")]
    Query(String),

    #[error("Incompatible result merge: {0}")]
    IncompatibleMerge(String),

    #[error("Action {action} failed: {reason}")]
    ActionFailed {
        action: String,
        reason: String,
        severity: Severity,
    },

    #[error("Launch failure for {agent}: {details}")]
    Launch { agent: String, details: String },

    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("Parse error at offset {offset}: {details}")]
    Parse { offset: usize, details: String },

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
}

impl CogentError {
    pub fn database(database: impl Into<String>, details: impl Into<String>) -> Self {
        CogentError::Database {
            database: database.into(),
            details: details.into(),
        }
    }

    /// `true` for errors that must terminate the operation (and the agent, when
    /// raised from its reasoning cycle).  Soft action failures and lookups
    /// of unknown agents are recoverable.
    pub fn is_fatal(&self) -> bool {
        match self {
            CogentError::ActionFailed { severity, .. } => *severity == Severity::Hard,
            CogentError::UnknownAgent(_) | CogentError::Lifecycle(_) => false,
            CogentError::Database { .. }
            | CogentError::Query(_)
            | CogentError::IncompatibleMerge(_)
            | CogentError::Launch { .. }
            | CogentError::UnknownModule(_)
            | CogentError::Parse { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_term_roundtrip() {
        let id = AgentId::new("alice");
        assert_eq!(AgentId::from_term(&id.to_term()), Some(id));
        assert_eq!(AgentId::from_term(&Term::int(1)), None);
    }

    #[test]
    fn message_formulas() {
        let msg = Message::new(
            AgentId::new("alice"),
            vec![AgentId::new("bob")],
            Mood::Imperative,
            Term::compound("on", vec![Term::atom("a"), Term::atom("b")]),
        );
        assert_eq!(
            msg.received_formula().to_string(),
            "received(alice, imperative(on(a, b)))"
        );
        assert_eq!(
            msg.sent_formula(&AgentId::new("bob")).to_string(),
            "sent(bob, imperative(on(a, b)))"
        );
        assert_eq!(msg.to_string(), "alice -> [bob] !on(a, b)");
    }

    #[test]
    fn fatal_classification() {
        assert!(CogentError::Query("bad".into()).is_fatal());
        assert!(CogentError::database("beliefbase", "gone").is_fatal());
        let soft = CogentError::ActionFailed {
            action: "move(a)".into(),
            reason: "environment paused".into(),
            severity: Severity::Soft,
        };
        assert!(!soft.is_fatal());
        let hard = CogentError::ActionFailed {
            action: "move(a)".into(),
            reason: "crashed".into(),
            severity: Severity::Hard,
        };
        assert!(hard.is_fatal());
    }

    #[test]
    fn cogent_error_display() {
        let err = CogentError::database("knowledgebase", "immutable");
        assert!(err.to_string().contains("knowledgebase"));
        let err = CogentError::UnknownAgent(AgentId::new("ghost"));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn base_type_display() {
        assert_eq!(BaseType::Belief.to_string(), "beliefbase");
        assert_eq!(BaseType::Goal.to_string(), "goalbase");
    }
}
