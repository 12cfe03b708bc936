//! Agent scheduling: pool interleaving or sequential turn-passing.
//!
//! | Mode | Between two rounds of one agent |
//! |---|---|
//! | [`Pool`](Scheduler::Pool) | the task yields to the tokio scheduler, or sleeps one poll interval when idle |
//! | [`Sequential`](Scheduler::Sequential) | the agent passes the turn to the next agent in launch order, then sleeps one poll interval when idle |
//!
//! Waiting for the turn is a polling loop with [`RuntimeConfig::sleep_poll`]
//! granularity.
//!
//! [`RuntimeConfig::sleep_poll`]: crate::RuntimeConfig::sleep_poll

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cogent_types::AgentId;
use tracing::trace;

use crate::config::SchedulingMode;

#[derive(Debug, Default)]
struct Turns {
    order: Vec<AgentId>,
    current: usize,
}

/// Round-robin turn bookkeeping for sequential scheduling.
#[derive(Debug, Default)]
pub struct TurnManager {
    turns: Mutex<Turns>,
}

impl TurnManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `agent` to the turn order.
    pub fn join(&self, agent: &AgentId) {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        if !turns.order.contains(agent) {
            turns.order.push(agent.clone());
        }
    }

    /// Remove `agent`; if it held the turn, the next agent gets it.
    pub fn leave(&self, agent: &AgentId) {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(index) = turns.order.iter().position(|a| a == agent) else {
            return;
        };
        turns.order.remove(index);
        if index < turns.current {
            turns.current -= 1;
        }
        if turns.current >= turns.order.len() {
            turns.current = 0;
        }
    }

    pub fn has_turn(&self, agent: &AgentId) -> bool {
        let turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        turns.order.get(turns.current) == Some(agent)
    }

    /// The agent holding the turn.
    pub fn current(&self) -> Option<AgentId> {
        let turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        turns.order.get(turns.current).cloned()
    }

    /// Hand the turn to the next agent.  No-op unless `agent` holds it.
    pub fn pass(&self, agent: &AgentId) {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        if turns.order.get(turns.current) == Some(agent) {
            turns.current = (turns.current + 1) % turns.order.len();
            trace!(from = %agent, to = ?turns.order.get(turns.current), "turn passed");
        }
    }

    // TODO: hand the turn over through a `tokio::sync::Notify` per agent
    // instead of polling.
    /// Poll until `agent` holds the turn.  Returns `false` when `stop` was
    /// raised first.
    pub async fn acquire(&self, agent: &AgentId, poll: Duration, stop: &AtomicBool) -> bool {
        loop {
            if stop.load(Ordering::Acquire) {
                return false;
            }
            if self.has_turn(agent) {
                return true;
            }
            tokio::time::sleep(poll).await;
        }
    }
}

/// Scheduling discipline shared by every agent of a system.
#[derive(Debug, Clone)]
pub enum Scheduler {
    Pool,
    Sequential(Arc<TurnManager>),
}

impl Scheduler {
    pub fn new(mode: SchedulingMode) -> Self {
        match mode {
            SchedulingMode::Pool => Scheduler::Pool,
            SchedulingMode::Sequential => Scheduler::Sequential(Arc::new(TurnManager::new())),
        }
    }

    pub fn mode(&self) -> SchedulingMode {
        match self {
            Scheduler::Pool => SchedulingMode::Pool,
            Scheduler::Sequential(_) => SchedulingMode::Sequential,
        }
    }

    pub fn join(&self, agent: &AgentId) {
        if let Scheduler::Sequential(turns) = self {
            turns.join(agent);
        }
    }

    pub fn leave(&self, agent: &AgentId) {
        if let Scheduler::Sequential(turns) = self {
            turns.leave(agent);
        }
    }

    /// Wait until `agent` may run its next step.  Returns `false` when the
    /// agent was stopped while waiting.
    pub async fn begin_step(&self, agent: &AgentId, poll: Duration, stop: &AtomicBool) -> bool {
        match self {
            Scheduler::Pool => !stop.load(Ordering::Acquire),
            Scheduler::Sequential(turns) => turns.acquire(agent, poll, stop).await,
        }
    }

    /// Release the executor after a step.  `idle` steps ran no round.
    pub async fn end_step(&self, agent: &AgentId, idle: bool, poll: Duration) {
        match self {
            Scheduler::Pool if idle => tokio::time::sleep(poll).await,
            Scheduler::Pool => tokio::task::yield_now().await,
            Scheduler::Sequential(turns) => {
                turns.pass(agent);
                if idle {
                    tokio::time::sleep(poll).await;
                } else {
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}
