//! `cogent-kernel` – Lifecycle & Orchestration
//!
//! The process-wide services every agent task shares.  Nothing in here
//! reasons; it starts, stops and connects agents.
//!
//! # Modules
//!
//! - [`controller`] – [`Controller`][controller::Controller]: the
//!   created → running → terminating → terminated → disposed state machine,
//!   with overridable [`ControllerHooks`][controller::ControllerHooks].
//! - [`registry`] – [`AgentRegistry`][registry::AgentRegistry]: the
//!   directory of live agents, message delivery to their inboxes, and
//!   publish/subscribe channel bookkeeping.

pub mod controller;
pub mod registry;

pub use controller::{Controller, ControllerHooks, ControllerState, LifecycleHandle};
pub use registry::{AgentRegistry, DEFAULT_EVENT_CAPACITY, Inbox, RegistryEvent};
