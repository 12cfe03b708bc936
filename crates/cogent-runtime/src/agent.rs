//! [`Agent`] – one launched agent under a [`Controller`].
//!
//! The agent's [`RunState`] lives behind an async mutex.  While the agent
//! runs, its task holds the lock for one step at a time, so hosts can
//! inspect the mental state between rounds with [`Agent::inspect`].
//!
//! Terminating an agent raises its stop flag; the task notices it at the next
//! step boundary (or inside a running `sleep` action), runs the shutdown
//! module and reports terminated to the controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cogent_kernel::{Controller, ControllerHooks, ControllerState, LifecycleHandle};
use cogent_types::{AgentId, CogentError};
use tracing::{debug, error, info, warn};

use crate::program::AgentProgram;
use crate::run_state::{AgentServices, Progress, RunState, StepOutcome};
use crate::scheduler::Scheduler;

type SharedState = Arc<tokio::sync::Mutex<Option<RunState>>>;

/// Lifecycle hooks that drive a [`RunState`] on its own tokio task.
pub struct AgentController {
    id: AgentId,
    program: Arc<AgentProgram>,
    services: AgentServices,
    scheduler: Scheduler,
    state: SharedState,
    stop: Mutex<Arc<AtomicBool>>,
    progress: Mutex<Arc<Progress>>,
}

impl AgentController {
    fn new(id: AgentId, program: Arc<AgentProgram>, services: AgentServices, scheduler: Scheduler) -> Result<Self, CogentError> {
        let state = RunState::new(id.clone(), program.clone(), services.clone())?;
        Ok(Self {
            id,
            program,
            services,
            scheduler,
            stop: Mutex::new(state.stop_flag()),
            progress: Mutex::new(state.progress()),
            state: Arc::new(tokio::sync::Mutex::new(Some(state))),
        })
    }

    fn adopt_flags(&self, state: &RunState) {
        *self.stop.lock().unwrap_or_else(PoisonError::into_inner) = state.stop_flag();
        *self.progress.lock().unwrap_or_else(PoisonError::into_inner) = state.progress();
    }

    fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn progress(&self) -> Arc<Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    async fn release_state(&self) -> Result<(), CogentError> {
        match self.state.lock().await.take() {
            Some(mut state) => state.dispose(),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ControllerHooks for AgentController {
    async fn start(&self, handle: LifecycleHandle) -> Result<(), CogentError> {
        {
            let mut guard = self.state.lock().await;
            if guard.as_ref().is_none_or(RunState::is_finished) {
                if let Some(mut old) = guard.take()
                    && let Err(error) = old.dispose()
                {
                    warn!(agent = %self.id, %error, "could not dispose previous run");
                }
                *guard = Some(RunState::new(self.id.clone(), self.program.clone(), self.services.clone())?);
            }
            if let Some(state) = guard.as_ref() {
                self.adopt_flags(state);
            }
        }

        let stop = self.stop_flag();
        stop.store(false, Ordering::Release);
        self.scheduler.join(&self.id);

        let id = self.id.clone();
        let state = self.state.clone();
        let scheduler = self.scheduler.clone();
        let poll = self.services.config.sleep_poll;
        tokio::spawn(async move {
            drive(&id, &state, &scheduler, &stop, poll, &handle).await;
            if let Some(state) = state.lock().await.as_mut() {
                state.shutdown().await;
            }
            scheduler.leave(&id);
            handle.set_terminated();
        });
        debug!(agent = %self.id, "agent task spawned");
        Ok(())
    }

    fn on_terminate(&self) {
        self.stop_flag().store(true, Ordering::Release);
    }

    async fn on_reset(&self) -> Result<(), CogentError> {
        self.release_state().await?;
        let state = RunState::new(self.id.clone(), self.program.clone(), self.services.clone())?;
        self.adopt_flags(&state);
        *self.state.lock().await = Some(state);
        info!(agent = %self.id, "agent reset");
        Ok(())
    }

    async fn on_dispose(&self) -> Result<(), CogentError> {
        self.release_state().await
    }
}

/// Step the agent until it finishes, fails or is stopped.
async fn drive(
    id: &AgentId,
    state: &SharedState,
    scheduler: &Scheduler,
    stop: &AtomicBool,
    poll: Duration,
    handle: &LifecycleHandle,
) {
    loop {
        if !handle.is_running() || !scheduler.begin_step(id, poll, stop).await {
            debug!(agent = %id, "agent stopped");
            return;
        }
        let outcome = match state.lock().await.as_mut() {
            Some(state) => state.step().await,
            None => return,
        };
        match outcome {
            Ok(StepOutcome::Idle) => scheduler.end_step(id, true, poll).await,
            Ok(StepOutcome::Round(_)) => scheduler.end_step(id, false, poll).await,
            Ok(StepOutcome::Finished(reason)) => {
                debug!(agent = %id, ?reason, "agent finished");
                return;
            }
            Err(error) => {
                error!(agent = %id, %error, "agent killed");
                handle.record_failure(error);
                return;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to one launched agent.  Clones share the agent.
#[derive(Clone)]
pub struct Agent {
    id: AgentId,
    controller: Controller<AgentController>,
}

impl Agent {
    /// Build and register the agent.  It does not run until
    /// [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`CogentError::Launch`] when the name is taken or the program cannot
    /// be loaded.
    pub fn launch(id: AgentId, program: Arc<AgentProgram>, services: AgentServices, scheduler: Scheduler) -> Result<Self, CogentError> {
        let hooks = AgentController::new(id.clone(), program, services, scheduler)?;
        Ok(Self {
            controller: Controller::new(id.as_str(), hooks),
            id,
        })
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn state(&self) -> ControllerState {
        self.controller.state()
    }

    pub fn is_running(&self) -> bool {
        self.controller.is_running()
    }

    /// The error that killed the agent, if any.
    pub fn failure(&self) -> Option<CogentError> {
        self.controller.failure()
    }

    /// Rounds completed so far.
    pub fn round(&self) -> u64 {
        self.controller.hooks().progress().round()
    }

    /// Call stack depth after the last completed round.
    pub fn stack_depth(&self) -> usize {
        self.controller.hooks().progress().stack_depth()
    }

    pub async fn start(&self) -> Result<(), CogentError> {
        self.controller.run().await
    }

    /// Ask the agent to stop.  Returns immediately.
    pub fn stop(&self) {
        self.controller.terminate();
    }

    pub async fn await_termination(&self) {
        self.controller.await_termination().await;
    }

    pub async fn await_termination_timeout(&self, timeout: Duration) -> bool {
        self.controller.await_termination_timeout(timeout).await
    }

    /// Stop, rebuild the agent from its program and start it again.
    pub async fn reset(&self) -> Result<(), CogentError> {
        self.controller.reset().await
    }

    pub async fn dispose(&self) -> Result<(), CogentError> {
        self.controller.dispose().await
    }

    /// Run `f` against the agent's state between two steps.  `None` after
    /// disposal.
    pub async fn inspect<T>(&self, f: impl FnOnce(&RunState) -> T) -> Option<T> {
        let guard = self.controller.hooks().state.lock().await;
        guard.as_ref().map(f)
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("round", &self.round())
            .finish()
    }
}
