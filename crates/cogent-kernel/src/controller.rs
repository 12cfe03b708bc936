//! [`Controller`] – generic start/terminate/reset/dispose lifecycle.
//!
//! ```text
//! Created ──run──▶ Running ──terminate──▶ Terminating ──set_terminated──▶ Terminated
//!                     ▲                                                      │
//!                     └──────────────────────── run / reset ◀───────────────┘
//!                                                                            │
//!                                                                dispose ──▶ Disposed
//! ```
//!
//! * [`Controller::run`] is idempotent while the controller is running.
//! * [`Controller::terminate`] only flips the state and calls
//!   [`ControllerHooks::on_terminate`]; it never waits.  The work started by
//!   [`ControllerHooks::start`] observes the flag through its
//!   [`LifecycleHandle`] and calls [`LifecycleHandle::set_terminated`] once
//!   its cleanup has run.
//! * [`Controller::await_termination`] waits for exactly that call.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cogent_types::CogentError;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Lifecycle state of a [`Controller`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Created,
    Running,
    /// Termination requested; the work has not finished its cleanup yet.
    Terminating,
    Terminated,
    Disposed,
}

impl ControllerState {
    /// `true` once the work has finished (or never started).
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            ControllerState::Created | ControllerState::Terminated | ControllerState::Disposed
        )
    }
}

/// Overridable behaviour of a [`Controller`].
#[async_trait]
pub trait ControllerHooks: Send + Sync + 'static {
    /// Start the controlled work.  Called by [`Controller::run`] after the
    /// state has become [`ControllerState::Running`].  The work must call
    /// [`LifecycleHandle::set_terminated`] when it stops.
    async fn start(&self, handle: LifecycleHandle) -> Result<(), CogentError>;

    /// Called synchronously by [`Controller::terminate`].  Must not block.
    fn on_terminate(&self) {}

    /// Called by [`Controller::reset`] between termination and restart.
    async fn on_reset(&self) -> Result<(), CogentError> {
        Ok(())
    }

    /// Called by [`Controller::dispose`] after termination.
    async fn on_dispose(&self) -> Result<(), CogentError> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// LifecycleHandle
// ────────────────────────────────────────────────────────────────────────────

struct Core {
    name: String,
    state: watch::Sender<ControllerState>,
    failure: Mutex<Option<CogentError>>,
}

/// Shared view of a controller's state, handed to the controlled work.
#[derive(Clone)]
pub struct LifecycleHandle {
    core: Arc<Core>,
}

impl LifecycleHandle {
    fn new(name: String) -> Self {
        let (state, _) = watch::channel(ControllerState::Created);
        Self {
            core: Arc::new(Core {
                name,
                state,
                failure: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.core.name
    }

    pub fn state(&self) -> ControllerState {
        *self.core.state.borrow()
    }

    /// `true` while the work should keep going.
    pub fn is_running(&self) -> bool {
        self.state() == ControllerState::Running
    }

    /// Report that the work has stopped and its cleanup has run.
    pub fn set_terminated(&self) {
        self.core.state.send_if_modified(|state| match state {
            ControllerState::Running | ControllerState::Terminating => {
                *state = ControllerState::Terminated;
                true
            }
            _ => false,
        });
        debug!(controller = %self.core.name, "terminated");
    }

    /// Keep `error` for later inspection through [`failure`](Self::failure).
    pub fn record_failure(&self, error: CogentError) {
        warn!(controller = %self.core.name, %error, "recording failure");
        let mut failure = self.core.failure.lock().unwrap_or_else(PoisonError::into_inner);
        *failure = Some(error);
    }

    /// The error that stopped the work, if any.
    pub fn failure(&self) -> Option<CogentError> {
        self.core
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Watch every state change.
    pub fn subscribe(&self) -> watch::Receiver<ControllerState> {
        self.core.state.subscribe()
    }

    /// Wait until the work has settled.
    pub async fn await_termination(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `core`, which `self` keeps alive.
        let _ = rx.wait_for(ControllerState::is_settled).await;
    }

    fn transition(&self, from: &[ControllerState], to: ControllerState) -> bool {
        self.core.state.send_if_modified(|state| {
            if from.contains(state) {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl std::fmt::Debug for LifecycleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleHandle")
            .field("name", &self.core.name)
            .field("state", &self.state())
            .finish()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Controller
// ────────────────────────────────────────────────────────────────────────────

/// Drives the lifecycle of one piece of work described by `H`.
pub struct Controller<H: ControllerHooks> {
    handle: LifecycleHandle,
    hooks: Arc<H>,
}

impl<H: ControllerHooks> Clone for Controller<H> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            hooks: self.hooks.clone(),
        }
    }
}

impl<H: ControllerHooks> Controller<H> {
    pub fn new(name: impl Into<String>, hooks: H) -> Self {
        Self {
            handle: LifecycleHandle::new(name.into()),
            hooks: Arc::new(hooks),
        }
    }

    pub fn hooks(&self) -> &Arc<H> {
        &self.hooks
    }

    pub fn handle(&self) -> LifecycleHandle {
        self.handle.clone()
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn state(&self) -> ControllerState {
        self.handle.state()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_running()
    }

    pub fn failure(&self) -> Option<CogentError> {
        self.handle.failure()
    }

    /// Start the work unless it is already running.
    ///
    /// # Errors
    ///
    /// [`CogentError::Lifecycle`] after disposal, or whatever
    /// [`ControllerHooks::start`] reports (the controller then settles as
    /// terminated with the failure recorded).
    pub async fn run(&self) -> Result<(), CogentError> {
        match self.state() {
            ControllerState::Running | ControllerState::Terminating => return Ok(()),
            ControllerState::Disposed => {
                return Err(CogentError::Lifecycle(format!("{} has been disposed", self.name())));
            }
            ControllerState::Created | ControllerState::Terminated => {}
        }
        if !self
            .handle
            .transition(&[ControllerState::Created, ControllerState::Terminated], ControllerState::Running)
        {
            // Lost a race against a concurrent run().
            return Ok(());
        }
        debug!(controller = %self.name(), "running");
        if let Err(error) = self.hooks.start(self.handle.clone()).await {
            self.handle.record_failure(error.clone());
            self.handle.set_terminated();
            return Err(error);
        }
        Ok(())
    }

    /// Ask the work to stop.  Returns immediately.
    pub fn terminate(&self) {
        if self.handle.transition(&[ControllerState::Running], ControllerState::Terminating) {
            debug!(controller = %self.name(), "termination requested");
            self.hooks.on_terminate();
        }
    }

    /// Wait until the work has settled.
    pub async fn await_termination(&self) {
        self.handle.await_termination().await;
    }

    /// Like [`await_termination`](Self::await_termination), giving up after
    /// `timeout`.  Returns `true` when the work settled in time.
    pub async fn await_termination_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.await_termination())
            .await
            .is_ok()
    }

    /// Terminate, wait, run the reset hook and start again.
    pub async fn reset(&self) -> Result<(), CogentError> {
        self.terminate();
        self.await_termination().await;
        self.hooks.on_reset().await?;
        self.run().await
    }

    /// Terminate, wait and release everything.  Later calls to
    /// [`run`](Self::run) fail.
    pub async fn dispose(&self) -> Result<(), CogentError> {
        if self.state() == ControllerState::Disposed {
            return Ok(());
        }
        self.terminate();
        self.await_termination().await;
        self.hooks.on_dispose().await?;
        self.handle.core.state.send_replace(ControllerState::Disposed);
        debug!(controller = %self.name(), "disposed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Spawns a task that ticks until terminated.
    #[derive(Default)]
    struct Ticker {
        starts: AtomicUsize,
        terminations: AtomicUsize,
        resets: AtomicUsize,
        disposals: AtomicUsize,
        fail_start: bool,
    }

    #[async_trait]
    impl ControllerHooks for Ticker {
        async fn start(&self, handle: LifecycleHandle) -> Result<(), CogentError> {
            if self.fail_start {
                return Err(CogentError::Launch {
                    agent: handle.name().to_string(),
                    details: "no environment".into(),
                });
            }
            self.starts.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                while handle.is_running() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                handle.set_terminated();
            });
            Ok(())
        }

        fn on_terminate(&self) {
            self.terminations.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_reset(&self) -> Result<(), CogentError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_dispose(&self) -> Result<(), CogentError> {
            self.disposals.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_is_idempotent() {
        let controller = Controller::new("alice", Ticker::default());
        assert_eq!(controller.state(), ControllerState::Created);
        controller.run().await.unwrap();
        controller.run().await.unwrap();
        assert_eq!(controller.hooks().starts.load(Ordering::SeqCst), 1);
        assert!(controller.is_running());
        controller.terminate();
        controller.await_termination().await;
    }

    #[tokio::test]
    async fn terminate_does_not_block_and_await_waits_for_cleanup() {
        let controller = Controller::new("alice", Ticker::default());
        controller.run().await.unwrap();
        controller.terminate();
        assert!(matches!(
            controller.state(),
            ControllerState::Terminating | ControllerState::Terminated
        ));
        assert!(controller.await_termination_timeout(Duration::from_secs(2)).await);
        assert_eq!(controller.state(), ControllerState::Terminated);
        assert_eq!(controller.hooks().terminations.load(Ordering::SeqCst), 1);
        // A second terminate is a no-op.
        controller.terminate();
        assert_eq!(controller.hooks().terminations.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn await_termination_before_run_returns_immediately() {
        let controller = Controller::new("idle", Ticker::default());
        assert!(controller.await_termination_timeout(Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn reset_restarts_the_work() {
        let controller = Controller::new("alice", Ticker::default());
        controller.run().await.unwrap();
        controller.reset().await.unwrap();
        assert!(controller.is_running());
        assert_eq!(controller.hooks().starts.load(Ordering::SeqCst), 2);
        assert_eq!(controller.hooks().resets.load(Ordering::SeqCst), 1);
        controller.terminate();
        controller.await_termination().await;
    }

    #[tokio::test]
    async fn dispose_is_final() {
        let controller = Controller::new("alice", Ticker::default());
        controller.run().await.unwrap();
        controller.dispose().await.unwrap();
        controller.dispose().await.unwrap();
        assert_eq!(controller.state(), ControllerState::Disposed);
        assert_eq!(controller.hooks().disposals.load(Ordering::SeqCst), 1);
        assert!(matches!(controller.run().await, Err(CogentError::Lifecycle(_))));
    }

    #[tokio::test]
    async fn failed_start_is_recorded() {
        let controller = Controller::new(
            "broken",
            Ticker {
                fail_start: true,
                ..Ticker::default()
            },
        );
        let err = controller.run().await.unwrap_err();
        assert!(matches!(err, CogentError::Launch { .. }));
        assert_eq!(controller.state(), ControllerState::Terminated);
        assert_eq!(controller.failure(), Some(err));
    }
}
