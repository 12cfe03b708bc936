//! Action execution for [`RunState`].
//!
//! | Action | Effect |
//! |---|---|
//! | insert / delete | belief update of the selected agents' models |
//! | adopt / drop | goal update (adopt goes into the current focus) |
//! | send / publish | delivery through the registry, recorded as `sent(..)` |
//! | call / inline | push a module frame |
//! | user | precondition, environment, postcondition |
//! | sleep | suspend the agent, observing the stop flag |
//! | starttimer / canceltimer | timer percepts |
//! | exit-module | pop up to and including the innermost named module |

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use cogent_mental::{MentalLiteral, Selector};
use cogent_types::{
    Channel, CogentError, Message, Mood, SourceInfo, Substitution, Term, Update, unify,
};
use tracing::{debug, info, warn};

use crate::program::{Action, ModuleKind};
use crate::run_state::RunState;
use crate::stack::Frame;

/// What became of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActionResult {
    Done,
    /// The precondition did not hold; the rest of the combo is skipped.
    Disabled,
    /// The environment refused softly; the combo continues.
    Failed,
    /// A module frame was pushed.
    Entered,
    /// Module frames were popped.
    Exited,
}

fn not_closed(action: &Action) -> CogentError {
    CogentError::Query(format!("action {action} is not closed"))
}

impl RunState {
    pub(crate) async fn execute(
        &mut self,
        action: Action,
        subst: &Substitution,
        focus_goal: Option<Update>,
        source: Option<SourceInfo>,
    ) -> Result<ActionResult, CogentError> {
        let sink = self.sink.clone();
        let result = match &action {
            Action::Insert { update, selector } => {
                if !update.is_closed() {
                    return Err(not_closed(&action));
                }
                self.mental.insert(update, selector, sink.as_ref())?;
                ActionResult::Done
            }
            Action::Delete { update, selector } => {
                if !update.is_closed() {
                    return Err(not_closed(&action));
                }
                self.mental.delete(update, selector, sink.as_ref())?;
                ActionResult::Done
            }
            Action::Adopt { goal, selector } => {
                if !goal.is_closed() {
                    return Err(not_closed(&action));
                }
                self.mental.adopt(goal, true, selector, sink.as_ref())?;
                ActionResult::Done
            }
            Action::Drop { goal, selector } => {
                self.mental.drop(goal, selector, sink.as_ref())?;
                ActionResult::Done
            }
            Action::Send { to, mood, content } => {
                if !content.is_ground() {
                    return Err(not_closed(&action));
                }
                self.send(to, *mood, content)?;
                ActionResult::Done
            }
            Action::Print(term) => {
                info!(target: "cogent::print", agent = %self.me, "{term}");
                ActionResult::Done
            }
            Action::Log(text) => {
                debug!(agent = %self.me, round = self.round(), "{text}");
                ActionResult::Done
            }
            Action::Call(name) => {
                let module = self
                    .program
                    .find_module(name)
                    .cloned()
                    .ok_or_else(|| CogentError::UnknownModule(name.clone()))?;
                self.stack.push_module(module, Substitution::new(), focus_goal);
                ActionResult::Entered
            }
            Action::Inline(module) => {
                self.stack.push_module(module.clone(), subst.clone(), focus_goal);
                ActionResult::Entered
            }
            Action::User { name, params } => self.perform(name, params).await?,
            Action::Sleep(ms) => {
                self.sleep_for(Duration::from_millis(*ms)).await;
                ActionResult::Done
            }
            Action::StartTimer {
                name,
                interval_ms,
                duration_ms,
            } => {
                self.timers.start(
                    name.clone(),
                    Duration::from_millis(*interval_ms),
                    Duration::from_millis(*duration_ms),
                    Instant::now(),
                );
                ActionResult::Done
            }
            Action::CancelTimer(name) => {
                if !self.timers.cancel(name) {
                    debug!(agent = %self.me, timer = %name, "no such timer");
                }
                ActionResult::Done
            }
            Action::ExitModule => {
                self.exit_innermost_module()?;
                ActionResult::Exited
            }
            Action::Subscribe(channel) => {
                self.registry.subscribe(&self.me, channel);
                ActionResult::Done
            }
            Action::Unsubscribe(channel) => {
                self.registry.unsubscribe(&self.me, channel);
                ActionResult::Done
            }
            Action::Publish { channel, mood, content } => {
                if !content.is_ground() {
                    return Err(not_closed(&action));
                }
                if let Some(message) = self.registry.publish(&self.me, channel, *mood, content.clone()) {
                    self.mental.record_sent(&message, sink.as_ref())?;
                }
                ActionResult::Done
            }
        };

        match result {
            ActionResult::Done | ActionResult::Entered | ActionResult::Exited => {
                self.emit(Channel::ActionExecuted, &action, "performed", source.as_ref());
            }
            ActionResult::Disabled => {
                self.emit(Channel::ActionExecuted, &action, "not enabled", source.as_ref());
            }
            ActionResult::Failed => {
                self.emit(Channel::ActionExecuted, &action, "failed", source.as_ref());
            }
        }
        Ok(result)
    }

    fn send(&mut self, to: &Selector, mood: Mood, content: &Term) -> Result<(), CogentError> {
        let resolution = self.mental.resolve(to, self.sink.as_ref())?;
        if let Some(var) = resolution.variable {
            return Err(CogentError::Query(format!("receiver variable {var} of send is unbound")));
        }
        if resolution.agents.is_empty() {
            debug!(agent = %self.me, selector = %to, "send without receivers");
            return Ok(());
        }
        let message = Message::new(self.me.clone(), resolution.agents, mood, content.clone());
        self.registry.deliver(&message);
        self.mental.record_sent(&message, self.sink.as_ref())?;
        Ok(())
    }

    /// Perform a user action through its specification.
    async fn perform(&mut self, name: &str, params: &[Term]) -> Result<ActionResult, CogentError> {
        let action = if params.is_empty() {
            Term::atom(name)
        } else {
            Term::compound(name, params.to_vec())
        };
        if !action.is_ground() {
            return Err(CogentError::Query(format!("action {action} is not closed")));
        }
        let spec = self
            .program
            .action_spec(name, params.len())
            .cloned()
            .ok_or_else(|| CogentError::Query(format!("no action specification for {name}/{}", params.len())))?;

        let mut binding = Substitution::new();
        for (formal, actual) in spec.params.iter().zip(params) {
            if !unify(formal, actual, &mut binding) {
                return Ok(ActionResult::Disabled);
            }
        }

        let precondition = spec.precondition.apply_subst(&binding);
        if !precondition.literals.is_empty() {
            let answers = self
                .mental
                .query(&MentalLiteral::bel(precondition), self.sink.as_ref())?;
            let Some(answer) = answers.into_iter().next() else {
                debug!(agent = %self.me, %action, "precondition does not hold");
                return Ok(ActionResult::Disabled);
            };
            binding = binding.combine(&answer).unwrap_or(answer);
        }

        if spec.external {
            match self.env.perform_action(&self.me, &action).await {
                Ok(()) => {}
                Err(error) if !error.is_fatal() => {
                    warn!(agent = %self.me, %action, %error, "action failed");
                    return Ok(ActionResult::Failed);
                }
                Err(error) => return Err(error),
            }
        }

        let postcondition = spec.postcondition.apply_subst(&binding);
        if !postcondition.is_empty() {
            self.mental
                .insert(&postcondition, &Selector::SelfAgent, self.sink.as_ref())?;
        }
        Ok(ActionResult::Done)
    }

    /// Sleep in poll-sized slices so that a stop request ends the sleep.
    async fn sleep_for(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let slice = self.config.sleep_poll.max(Duration::from_millis(1));
        loop {
            if self.stop.load(Ordering::Acquire) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            tokio::time::sleep(slice.min(deadline - now)).await;
        }
    }

    /// Pop frames up to and including the innermost named module.
    fn exit_innermost_module(&mut self) -> Result<(), CogentError> {
        while let Some(frame) = self.stack.pop() {
            if let Frame::Module(frame) = frame {
                self.exit_module(&frame)?;
                if frame.module.kind != ModuleKind::Anonymous {
                    break;
                }
            }
        }
        Ok(())
    }
}
