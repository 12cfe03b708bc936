//! `cogent-runtime` – The Reasoning Cycle
//!
//! Runs agent programs on top of the mental-state engine: every agent is a
//! tokio task stepping its own [`RunState`] one round at a time.
//!
//! # Modules
//!
//! - [`program`] – [`AgentProgram`], [`Module`], [`Rule`], [`Action`] and
//!   [`ActionSpecification`]: the pre-parsed program an agent runs.
//! - [`environment`] – the [`Environment`] capability agents perceive and
//!   act through, plus [`NoEnvironment`] and [`ScriptedEnvironment`].
//! - [`run_state`] – [`RunState`]: percept and message intake, sleeping,
//!   module entry and exit, rule evaluation and blind commitment.
//! - [`stack`] – [`CallStack`][stack::CallStack]: module and action-combo
//!   continuations, so a round can end anywhere and resume next round.
//! - [`timer`] – [`TimerManager`][timer::TimerManager]: `timer(Name)`
//!   percepts.
//! - [`scheduler`] – [`Scheduler`]: pool interleaving or sequential
//!   turn-passing between agents.
//! - [`agent`] – [`Agent`]: one agent under a
//!   [`Controller`](cogent_kernel::Controller).
//! - [`system`] – [`MultiAgentSystem`]: launch, start, stop, reset and
//!   dispose a group of agents sharing a registry and an environment.
//! - [`config`] – [`RuntimeConfig`] and [`SchedulingMode`].
//! - [`telemetry`] – [`init_tracing`]: global `tracing` subscriber with an
//!   optional OTLP span exporter.

pub mod agent;
pub mod config;
pub mod environment;
mod execute;
pub mod program;
pub mod run_state;
pub mod scheduler;
pub mod stack;
pub mod system;
pub mod telemetry;
pub mod timer;

pub use agent::{Agent, AgentController};
pub use config::{RuntimeConfig, SchedulingMode};
pub use environment::{Environment, NoEnvironment, PerceptUpdate, ScriptedEnvironment};
pub use program::{
    Action, ActionSpecification, AgentProgram, ExitCondition, FocusMethod, Module, ModuleKind, Rule, RuleKind,
    RuleOrder,
};
pub use run_state::{AgentServices, FinishReason, Progress, RunContext, RunState, StepOutcome};
pub use scheduler::{Scheduler, TurnManager};
pub use system::MultiAgentSystem;
pub use telemetry::{LogFormat, TelemetryConfig, TracerProviderGuard, init_tracing};
