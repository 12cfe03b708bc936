//! `cogent-events` – Debug event distribution.
//!
//! The mental-state engine and the reasoning cycle report what they do
//! through an [`EventSink`](cogent_types::EventSink).  This crate provides the
//! sinks a running system plugs in.
//!
//! # Modules
//!
//! - [`bus`] – [`EventBus`]: one Tokio broadcast lane per debug
//!   [`Channel`](cogent_types::Channel) plus a global lane.  Debuggers,
//!   profilers and log tailers subscribe to it.
//! - [`sink`] – [`TracingSink`] (forwards events to `tracing`) and
//!   [`FanOut`] (duplicates events to several sinks).

pub mod bus;
pub mod sink;

pub use bus::{AgentSubscriber, ChannelReceiver, EventBus};
pub use sink::{FanOut, TracingSink};
