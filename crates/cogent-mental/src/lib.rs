//! `cogent-mental` – The mental-state engine.
//!
//! Evaluates queries and applies updates over an agent's belief, goal,
//! percept and message stores, and over the models the agent keeps of other
//! agents.  The engine never schedules anything: every call is
//! request/response from the reasoning cycle.
//!
//! # Layers
//!
//! | Type | Role |
//! |---|---|
//! | [`MentalBase`] | one typed store over one KR database |
//! | [`GoalBase`] | one attention set of independently stored goals |
//! | [`MentalModel`] | the bases plus the attention-set stack of one agent |
//! | [`MentalState`] | my model plus models of known agents; selector fan-out, condition evaluation, goal lifecycle |
//!
//! Every mutation returns a [`MentalDiff`] describing what changed.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cogent_kr::{parse_query, parse_theory, parse_update, InMemoryKr};
//! use cogent_mental::{MentalLiteral, MentalState, Selector};
//! use cogent_types::{AgentId, NoopSink};
//!
//! let mut ms = MentalState::new(AgentId::new("alice"), Arc::new(InMemoryKr::new()));
//! ms.initialize(Vec::new(), parse_theory("p(1).").unwrap(), Vec::new(), &NoopSink).unwrap();
//! ms.adopt(&parse_update("p(2)").unwrap(), false, &Selector::SelfAgent, &NoopSink).unwrap();
//! assert!(ms.has_goals());
//!
//! ms.insert(&parse_update("p(2)").unwrap(), &Selector::SelfAgent, &NoopSink).unwrap();
//! ms.update_goal_state(&NoopSink).unwrap();
//! assert!(!ms.has_goals());
//!
//! let answers = ms.query(&MentalLiteral::bel(parse_query("p(X)").unwrap()), &NoopSink).unwrap();
//! assert_eq!(answers.len(), 2);
//! ```

pub mod base;
pub mod diff;
pub mod goal;
pub mod literal;
pub mod model;
pub mod selector;
pub mod state;

pub use base::MentalBase;
pub use diff::MentalDiff;
pub use goal::{GoalBase, SingleGoal};
pub use literal::{
    Direction, FanOut, LiteralKind, MentalLiteral, MentalStateCondition, MscResult, Selector,
    SentLiteral,
};
pub use model::{MAIN_ATTENTION_SET, MentalModel};
pub use selector::Resolution;
pub use state::MentalState;
