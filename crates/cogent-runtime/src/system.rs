//! [`MultiAgentSystem`] – launches agents into one shared registry,
//! environment and event bus, and controls them as a group.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use cogent_events::{EventBus, FanOut, TracingSink};
use cogent_kernel::{AgentRegistry, ControllerState};
use cogent_kr::{InMemoryKr, KrInterface};
use cogent_types::{AgentId, CogentError, EventSink, Message};
use tracing::{info, warn};

use crate::agent::Agent;
use crate::config::RuntimeConfig;
use crate::environment::Environment;
use crate::program::AgentProgram;
use crate::run_state::{AgentServices, RunState};
use crate::scheduler::Scheduler;

const EVENT_BUS_CAPACITY: usize = 1024;

pub struct MultiAgentSystem {
    config: RuntimeConfig,
    kr: Arc<dyn KrInterface>,
    env: Arc<dyn Environment>,
    registry: Arc<AgentRegistry>,
    bus: EventBus,
    extra_sinks: Vec<Arc<dyn EventSink>>,
    scheduler: Scheduler,
    agents: Mutex<Vec<Agent>>,
}

impl MultiAgentSystem {
    /// A system with the in-memory KR engine, logging every debug event
    /// through `tracing` and publishing it on [`bus`](Self::bus).
    pub fn new(config: RuntimeConfig, env: Arc<dyn Environment>) -> Self {
        Self {
            scheduler: Scheduler::new(config.scheduling),
            registry: Arc::new(AgentRegistry::with_event_capacity(config.membership_capacity)),
            config,
            kr: Arc::new(InMemoryKr::new()),
            env,
            bus: EventBus::new(EVENT_BUS_CAPACITY),
            extra_sinks: Vec::new(),
            agents: Mutex::new(Vec::new()),
        }
    }

    /// Use another KR engine for agents launched from now on.
    pub fn with_kr(mut self, kr: Arc<dyn KrInterface>) -> Self {
        self.kr = kr;
        self
    }

    /// Also send debug events to `sink`.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    fn services(&self) -> AgentServices {
        let sink = self
            .extra_sinks
            .iter()
            .cloned()
            .fold(
                FanOut::new()
                    .with(Arc::new(TracingSink))
                    .with(Arc::new(self.bus.clone())),
                FanOut::with,
            );
        AgentServices {
            kr: self.kr.clone(),
            env: self.env.clone(),
            registry: self.registry.clone(),
            sink: Arc::new(sink),
            config: self.config.clone(),
        }
    }

    fn agents(&self) -> std::sync::MutexGuard<'_, Vec<Agent>> {
        self.agents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn agent(&self, id: &AgentId) -> Result<Agent, CogentError> {
        self.agents()
            .iter()
            .find(|a| a.id() == id)
            .cloned()
            .ok_or_else(|| CogentError::UnknownAgent(id.clone()))
    }

    // ────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ────────────────────────────────────────────────────────────────────

    /// Build and register an agent running `program`.  The agent starts
    /// with the next [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`CogentError::Launch`] when `name` is taken or the program cannot be
    /// loaded.  Agents already launched are unaffected.
    pub fn launch(&self, program: AgentProgram, name: impl Into<String>) -> Result<AgentId, CogentError> {
        let id = AgentId::new(name);
        let agent = Agent::launch(id.clone(), Arc::new(program), self.services(), self.scheduler.clone())?;
        self.agents().push(agent);
        info!(agent = %id, "launched");
        Ok(id)
    }

    /// Start every agent that is not running yet.
    pub async fn start(&self) -> Result<(), CogentError> {
        let agents = self.agents().clone();
        for agent in agents {
            agent.start().await?;
        }
        Ok(())
    }

    pub async fn start_agent(&self, id: &AgentId) -> Result<(), CogentError> {
        self.agent(id)?.start().await
    }

    /// Ask every agent to stop.  Returns immediately.
    pub fn stop(&self) {
        for agent in self.agents().iter() {
            agent.stop();
        }
    }

    pub fn stop_agent(&self, id: &AgentId) -> Result<(), CogentError> {
        self.agent(id)?.stop();
        Ok(())
    }

    /// Wait until every agent has terminated.
    pub async fn await_termination(&self) {
        let agents = self.agents().clone();
        for agent in agents {
            agent.await_termination().await;
        }
    }

    /// Like [`await_termination`](Self::await_termination), giving up after
    /// `timeout`.  Returns `true` when every agent terminated in time.
    pub async fn await_termination_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.await_termination())
            .await
            .is_ok()
    }

    /// Stop every agent, rebuild each from its program and start again.
    pub async fn reset(&self) -> Result<(), CogentError> {
        self.stop();
        self.await_termination().await;
        let agents = self.agents().clone();
        for agent in agents {
            agent.reset().await?;
        }
        Ok(())
    }

    /// Stop and release every agent, then the environment.
    pub async fn dispose(&self) -> Result<(), CogentError> {
        let agents: Vec<Agent> = std::mem::take(&mut *self.agents());
        for agent in &agents {
            agent.stop();
        }
        for agent in agents {
            if let Err(error) = agent.dispose().await {
                warn!(agent = %agent.id(), %error, "dispose failed");
            }
        }
        self.env.dispose().await
    }

    // ────────────────────────────────────────────────────────────────────
    // Introspection
    // ────────────────────────────────────────────────────────────────────

    /// Launched agents, in launch order.
    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.agents().iter().map(|a| a.id().clone()).collect()
    }

    pub fn handle(&self, id: &AgentId) -> Result<Agent, CogentError> {
        self.agent(id)
    }

    pub fn state(&self, id: &AgentId) -> Result<ControllerState, CogentError> {
        Ok(self.agent(id)?.state())
    }

    pub fn round(&self, id: &AgentId) -> Result<u64, CogentError> {
        Ok(self.agent(id)?.round())
    }

    pub fn stack_depth(&self, id: &AgentId) -> Result<usize, CogentError> {
        Ok(self.agent(id)?.stack_depth())
    }

    /// The error that killed the agent, if any.
    pub fn failure(&self, id: &AgentId) -> Result<Option<CogentError>, CogentError> {
        Ok(self.agent(id)?.failure())
    }

    /// Run `f` against an agent's state between two of its steps.
    pub async fn inspect<T>(&self, id: &AgentId, f: impl FnOnce(&RunState) -> T) -> Result<T, CogentError> {
        self.agent(id)?
            .inspect(f)
            .await
            .ok_or_else(|| CogentError::Lifecycle(format!("{id} has been disposed")))
    }

    /// Hand a message from outside the system to its receivers.  Returns the
    /// number of inboxes it reached.
    pub fn deliver(&self, message: &Message) -> usize {
        self.registry.deliver(message)
    }
}

impl std::fmt::Debug for MultiAgentSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiAgentSystem")
            .field("scheduling", &self.scheduler.mode())
            .field("agents", &self.agent_ids())
            .finish()
    }
}
