//! [`RunState`] – the reasoning cycle of one agent.
//!
//! Each call to [`RunState::step`] either runs one round or reports that the
//! agent is asleep:
//!
//! 1. fetch percept changes and fire due timers;
//! 2. drain the inbox and registry membership changes;
//! 3. if nothing changed, and nothing happened in the previous round
//!    either, sleep (return [`StepOutcome::Idle`]) until something changes
//!    or the sleep timeout passes;
//! 4. increment the round counter;
//! 5. apply percepts, messages and membership to the mental state;
//! 6. push the event module (on change) and the init module (first round
//!    only) above the module already on the stack;
//! 7. execute frames until a module finishes a pass without exiting, or the
//!    stack is empty;
//! 8. drop goals that are now believed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use cogent_kernel::{AgentRegistry, Inbox, RegistryEvent};
use cogent_kr::KrInterface;
use cogent_mental::MentalState;
use cogent_types::{AgentId, Channel, CogentError, DatabaseFormula, Event, EventSink, Message, SourceInfo, Substitution, Update};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, trace, warn};

use crate::config::RuntimeConfig;
use crate::environment::{Environment, PerceptUpdate};
use crate::execute::ActionResult;
use crate::program::{Action, AgentProgram, ExitCondition, FocusMethod, Module, ModuleKind, Rule, RuleKind, RuleOrder};
use crate::stack::{ActionFrame, CallStack, Frame, ModuleFrame};
use crate::timer::TimerManager;

/// Deepest call stack an agent may build.
const MAX_STACK_DEPTH: usize = 1024;

/// Shared collaborators every agent of a system is built with.
#[derive(Clone)]
pub struct AgentServices {
    pub kr: Arc<dyn KrInterface>,
    pub env: Arc<dyn Environment>,
    pub registry: Arc<AgentRegistry>,
    pub sink: Arc<dyn EventSink>,
    pub config: RuntimeConfig,
}

/// Round counter and stack depth, readable while the agent runs.
#[derive(Debug, Default)]
pub struct Progress {
    round: AtomicU64,
    stack_depth: AtomicUsize,
}

impl Progress {
    pub fn round(&self) -> u64 {
        self.round.load(Ordering::Acquire)
    }

    pub fn stack_depth(&self) -> usize {
        self.stack_depth.load(Ordering::Acquire)
    }

    fn record(&self, round: u64, stack_depth: usize) {
        self.round.store(round, Ordering::Release);
        self.stack_depth.store(stack_depth, Ordering::Release);
    }
}

/// Built-in module the agent is currently running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunContext {
    Init,
    Event,
    Main,
    Shutdown,
}

impl RunContext {
    fn of(kind: ModuleKind) -> Option<Self> {
        match kind {
            ModuleKind::Init => Some(RunContext::Init),
            ModuleKind::Event => Some(RunContext::Event),
            ModuleKind::Main => Some(RunContext::Main),
            ModuleKind::Shutdown => Some(RunContext::Shutdown),
            ModuleKind::User | ModuleKind::Anonymous => None,
        }
    }
}

/// Why an agent stopped reasoning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The stack emptied: the main module exited.
    MainExited,
    MaxRounds,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Asleep: nothing changed.
    Idle,
    /// Round `n` completed.
    Round(u64),
    Finished(FinishReason),
}

#[derive(Debug, Default)]
struct Intake {
    percepts: PerceptUpdate,
    messages: Vec<Message>,
    membership: Vec<RegistryEvent>,
    resync: bool,
}

impl Intake {
    fn is_empty(&self) -> bool {
        self.percepts.is_empty() && self.messages.is_empty() && self.membership.is_empty() && !self.resync
    }
}

enum ModuleStep {
    Continue,
    EndOfRound,
}

/// One agent: its program, mental state, call stack and cycle bookkeeping.
pub struct RunState {
    pub(crate) me: AgentId,
    pub(crate) program: Arc<AgentProgram>,
    pub(crate) mental: MentalState,
    pub(crate) env: Arc<dyn Environment>,
    pub(crate) registry: Arc<AgentRegistry>,
    pub(crate) sink: Arc<dyn EventSink>,
    pub(crate) config: RuntimeConfig,
    pub(crate) timers: TimerManager,
    pub(crate) stack: CallStack,
    pub(crate) stop: Arc<AtomicBool>,
    inbox: Inbox,
    membership: broadcast::Receiver<RegistryEvent>,
    progress: Arc<Progress>,
    round: u64,
    context: Option<RunContext>,
    init_done: bool,
    idle_last_round: bool,
    sleeping_since: Option<Instant>,
    fired_timers: Vec<DatabaseFormula>,
    finished: bool,
}

impl RunState {
    /// Register `me` and build its initial mental state from `program`.
    ///
    /// # Errors
    ///
    /// [`CogentError::Launch`] when the name is taken or the initial mental
    /// state cannot be built.
    pub fn new(me: AgentId, program: Arc<AgentProgram>, services: AgentServices) -> Result<Self, CogentError> {
        let launch_error = |error: CogentError| CogentError::Launch {
            agent: me.to_string(),
            details: error.to_string(),
        };
        program.validate().map_err(launch_error)?;

        let membership = services.registry.subscribe_events();
        let inbox = services.registry.register(me.clone())?;

        let mut mental = MentalState::new(me.clone(), services.kr.clone());
        let initialised = mental
            .initialize(
                program.knowledge.clone(),
                program.beliefs.clone(),
                program.goals.clone(),
                services.sink.as_ref(),
            )
            .and_then(|()| {
                for other in services.registry.agents() {
                    if other != me {
                        mental.add_agent_model(&other, services.sink.as_ref())?;
                    }
                }
                Ok(())
            });
        if let Err(error) = initialised {
            services.registry.unregister(&me);
            return Err(launch_error(error));
        }

        let mut stack = CallStack::new();
        if let Some(main) = &program.main {
            stack.push_module(main.clone(), Substitution::new(), None);
        }
        debug!(agent = %me, program = %program.name, "agent launched");

        Ok(Self {
            me,
            program,
            mental,
            env: services.env,
            registry: services.registry,
            sink: services.sink,
            config: services.config,
            timers: TimerManager::new(),
            stack,
            stop: Arc::new(AtomicBool::new(false)),
            inbox,
            membership,
            progress: Arc::new(Progress::default()),
            round: 0,
            context: None,
            init_done: false,
            idle_last_round: false,
            sleeping_since: None,
            fired_timers: Vec::new(),
            finished: false,
        })
    }

    // ────────────────────────────────────────────────────────────────────
    // Introspection
    // ────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> &AgentId {
        &self.me
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn context(&self) -> Option<RunContext> {
        self.context
    }

    pub fn mental_state(&self) -> &MentalState {
        &self.mental
    }

    pub fn mental_state_mut(&mut self) -> &mut MentalState {
        &mut self.mental
    }

    pub fn progress(&self) -> Arc<Progress> {
        self.progress.clone()
    }

    /// Raising this flag makes running actions and turn waits give up.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn is_sleeping(&self) -> bool {
        self.sleeping_since.is_some()
    }

    pub(crate) fn emit(&self, channel: Channel, subject: impl std::fmt::Display, message: impl Into<String>, source: Option<&SourceInfo>) {
        self.sink
            .emit(Event::new(&self.me, channel, subject, message).with_source(source));
    }

    // ────────────────────────────────────────────────────────────────────
    // Cycle
    // ────────────────────────────────────────────────────────────────────

    /// Run one round, or report that the agent is asleep.
    ///
    /// # Errors
    ///
    /// Fatal errors from the mental state, the environment or an action.
    /// Soft action failures are logged and do not surface here.
    pub async fn step(&mut self) -> Result<StepOutcome, CogentError> {
        if self.finished {
            return Err(CogentError::Lifecycle(format!("{} has finished", self.me)));
        }

        let intake = self.intake().await?;
        let changed = !intake.is_empty();
        if !changed && self.idle_last_round && self.config.sleep_on_no_change {
            if self.sleeping_since.is_none() {
                trace!(agent = %self.me, round = self.round, "going to sleep");
                self.emit(Channel::Sleep, &self.me, "nothing changed", None);
                self.sleeping_since = Some(Instant::now());
            }
            if let Some(since) = self.sleeping_since
                && since.elapsed() < self.config.sleep_timeout
            {
                return Ok(StepOutcome::Idle);
            }
            self.sleeping_since = None;
            self.emit(Channel::Wakeup, &self.me, "sleep timeout", None);
        } else if self.sleeping_since.take().is_some() {
            trace!(agent = %self.me, "woken up");
            self.emit(Channel::Wakeup, &self.me, "change observed", None);
        }

        self.round += 1;
        let round = self.round;
        self.emit(Channel::ReasoningCycle, &self.me, format!("round {round}"), None);

        self.apply_intake(intake)?;
        if changed && let Some(event) = self.program.event.clone() {
            self.stack.push_module(event, Substitution::new(), None);
        }
        if !self.init_done {
            self.init_done = true;
            if let Some(init) = self.program.init.clone() {
                self.stack.push_module(init, Substitution::new(), None);
            }
        }

        let performed = self.run_round().await?;
        self.mental.update_goal_state(self.sink.as_ref())?;
        self.idle_last_round = !changed && performed == 0;
        self.progress.record(round, self.stack.depth());

        if let Some(reward) = self.env.get_reward(&self.me).await {
            trace!(agent = %self.me, round, reward, "reward");
        }

        if self.stack.is_empty() {
            info!(agent = %self.me, round, "main module exited");
            return Ok(StepOutcome::Finished(FinishReason::MainExited));
        }
        if let Some(max) = self.config.max_rounds
            && round >= max
        {
            info!(agent = %self.me, round, "round limit reached");
            return Ok(StepOutcome::Finished(FinishReason::MaxRounds));
        }
        Ok(StepOutcome::Round(round))
    }

    async fn intake(&mut self) -> Result<Intake, CogentError> {
        let mut intake = Intake::default();

        match self.env.get_percepts(&self.me).await {
            Ok(update) => intake.percepts = update,
            Err(error) if !error.is_fatal() => warn!(agent = %self.me, %error, "percepts unavailable"),
            Err(error) => return Err(error),
        }

        // Timer percepts last one round.
        intake.percepts.delete.append(&mut self.fired_timers);
        for name in self.timers.due(Instant::now()) {
            let percept = TimerManager::percept(&name);
            intake.percepts.add.push(percept.clone());
            self.fired_timers.push(percept);
        }

        while let Ok(message) = self.inbox.try_recv() {
            intake.messages.push(message);
        }

        loop {
            match self.membership.try_recv() {
                Ok(event) => intake.membership.push(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    debug!(agent = %self.me, skipped, "membership changes lagged; resynchronising");
                    intake.resync = true;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        Ok(intake)
    }

    fn apply_intake(&mut self, intake: Intake) -> Result<(), CogentError> {
        let sink = self.sink.clone();
        if !intake.percepts.is_empty() {
            self.mental
                .apply_percepts(intake.percepts.add, intake.percepts.delete, sink.as_ref())?;
        }
        for message in &intake.messages {
            self.mental.receive_message(message, sink.as_ref())?;
        }
        if intake.resync {
            // The registry is the current membership; the buffered events
            // are already reflected in it.
            let registered = self.registry.agents();
            let departed: Vec<AgentId> = self
                .mental
                .known_agents()
                .iter()
                .filter(|agent| **agent != self.me && !registered.contains(agent))
                .cloned()
                .collect();
            for agent in &departed {
                self.mental.remove_agent_model(agent, sink.as_ref())?;
            }
            for agent in registered {
                if agent != self.me {
                    self.mental.add_agent_model(&agent, sink.as_ref())?;
                }
            }
            return Ok(());
        }
        for event in intake.membership {
            match event {
                RegistryEvent::Joined(agent) if agent != self.me => {
                    self.mental.add_agent_model(&agent, sink.as_ref())?;
                }
                RegistryEvent::Left(agent) if agent != self.me => {
                    self.mental.remove_agent_model(&agent, sink.as_ref())?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────
    // Stack execution
    // ────────────────────────────────────────────────────────────────────

    /// Execute frames until the round ends.  Returns the number of actions
    /// performed.
    pub(crate) async fn run_round(&mut self) -> Result<usize, CogentError> {
        let mut performed = 0;
        loop {
            if self.stack.depth() > MAX_STACK_DEPTH {
                return Err(CogentError::Query(format!(
                    "call stack of {} exceeds {MAX_STACK_DEPTH} frames",
                    self.me
                )));
            }
            let next = match self.stack.top_mut() {
                None => return Ok(performed),
                Some(Frame::Module(_)) => None,
                Some(Frame::Actions(frame)) => Some(
                    frame
                        .advance()
                        .map(|action| (action, frame.subst.clone(), frame.focus_goal.clone(), frame.source.clone())),
                ),
            };
            match next {
                None => match self.module_step()? {
                    ModuleStep::Continue => {}
                    ModuleStep::EndOfRound => return Ok(performed),
                },
                Some(None) => {
                    self.stack.pop();
                }
                Some(Some((action, subst, focus_goal, source))) => {
                    match self.execute(action, &subst, focus_goal, source).await? {
                        ActionResult::Done | ActionResult::Entered | ActionResult::Exited => performed += 1,
                        ActionResult::Failed => {}
                        ActionResult::Disabled => {
                            // The rest of the combo is skipped.
                            self.stack.pop();
                        }
                    }
                }
            }
        }
    }

    fn top_module(&mut self) -> Option<&mut ModuleFrame> {
        match self.stack.top_mut() {
            Some(Frame::Module(frame)) => Some(frame),
            _ => None,
        }
    }

    /// Advance the module on top of the stack: enter it, try its next rule,
    /// or finish its pass.
    fn module_step(&mut self) -> Result<ModuleStep, CogentError> {
        let Some(frame) = self.top_module() else {
            return Ok(ModuleStep::Continue);
        };
        let module = frame.module.clone();
        let seed = frame.seed.clone();
        let entry = (!frame.entered).then(|| frame.focus_goal.clone());

        if let Some(focus_goal) = entry {
            let focused = self.enter_module(&module, focus_goal)?;
            if let Some(frame) = self.top_module() {
                frame.entered = true;
                frame.focused = focused;
            }
        }

        let mut pass = self.top_module().and_then(|f| f.pass).unwrap_or_default();
        while pass.next_rule < module.rules.len() {
            let rule = &module.rules[pass.next_rule];
            pass.next_rule += 1;
            let frames = self.evaluate_rule(rule, &seed)?;
            if frames.is_empty() {
                continue;
            }
            pass.fired = true;
            if module.order == RuleOrder::Linear {
                pass.next_rule = module.rules.len();
            }
            if let Some(frame) = self.top_module() {
                frame.pass = Some(pass);
            }
            for frame in frames.into_iter().rev() {
                self.stack.push(Frame::Actions(frame));
            }
            return Ok(ModuleStep::Continue);
        }

        let exit = match module.exit {
            ExitCondition::Always => true,
            ExitCondition::NoGoals => !self.mental.has_goals(),
            ExitCondition::NoAction => !pass.fired,
            ExitCondition::Never => false,
        };
        if exit {
            if let Some(Frame::Module(frame)) = self.stack.pop() {
                self.exit_module(&frame)?;
            }
            Ok(ModuleStep::Continue)
        } else {
            if let Some(frame) = self.top_module() {
                frame.pass = None;
            }
            Ok(ModuleStep::EndOfRound)
        }
    }

    /// Entry bookkeeping.  Returns `true` when an attention set was pushed.
    fn enter_module(&mut self, module: &Module, focus_goal: Option<Update>) -> Result<bool, CogentError> {
        if module.kind == ModuleKind::Anonymous {
            return Ok(false);
        }
        if let Some(context) = RunContext::of(module.kind) {
            self.context = Some(context);
        }
        self.emit(Channel::ModuleEntry, module, format!("entering {module}"), module.source.as_ref());

        if module.focus == FocusMethod::None {
            return Ok(false);
        }
        let mut goals = self.mental.new_attention_set(module.name.clone())?;
        if matches!(module.focus, FocusMethod::Filter | FocusMethod::Select)
            && let Some(goal) = focus_goal.filter(|g| !g.add.is_empty())
        {
            goals.insert(&goal)?;
        }
        self.mental
            .push_focus(goals, module.source.as_ref(), self.sink.as_ref())?;
        Ok(true)
    }

    pub(crate) fn exit_module(&mut self, frame: &ModuleFrame) -> Result<(), CogentError> {
        let module = &frame.module;
        if module.kind == ModuleKind::Anonymous || !frame.entered {
            return Ok(());
        }
        if frame.focused {
            self.mental.defocus(self.sink.as_ref())?;
        }
        self.emit(Channel::ModuleExit, module, format!("leaving {module}"), module.source.as_ref());
        if module.kind.is_builtin() {
            self.context = self.innermost_context();
        }
        Ok(())
    }

    fn innermost_context(&self) -> Option<RunContext> {
        self.stack.module_kinds().into_iter().rev().find_map(RunContext::of)
    }

    /// Evaluate `rule` and build the action frames it fires, in execution
    /// order.
    fn evaluate_rule(&mut self, rule: &Rule, seed: &Substitution) -> Result<Vec<ActionFrame>, CogentError> {
        let method = self.target_focus(rule);
        let sink = self.sink.clone();
        let result = match method {
            FocusMethod::Filter => self.mental.filter_evaluate(&rule.condition, seed, sink.as_ref())?,
            FocusMethod::Select => self.mental.focus_evaluate(&rule.condition, seed, sink.as_ref())?,
            FocusMethod::None | FocusMethod::New => self.mental.evaluate(&rule.condition, seed, sink.as_ref())?,
        };
        self.emit(
            Channel::RuleCondition,
            &rule.condition,
            format!("{} answer(s)", result.answers.len()),
            rule.source.as_ref(),
        );

        let answers: Vec<&Substitution> = match rule.kind {
            RuleKind::IfThen => result.answers.iter().take(1).collect(),
            RuleKind::ForAll => result.answers.iter().collect(),
        };
        let actions: Arc<[Action]> = Arc::from(rule.actions.clone());
        Ok(answers
            .into_iter()
            .map(|answer| {
                let focus_goal = match method {
                    FocusMethod::Filter | FocusMethod::Select => result
                        .goal_for(answer)
                        .map(|goal| goal.goal_update().apply_subst(answer)),
                    FocusMethod::None | FocusMethod::New => None,
                };
                ActionFrame::new(actions.clone(), answer.clone(), focus_goal, rule.source.clone())
            })
            .collect())
    }

    /// Focus method of the module the rule's first call enters.
    fn target_focus(&self, rule: &Rule) -> FocusMethod {
        rule.actions
            .iter()
            .find_map(|action| match action {
                Action::Call(name) => self.program.find_module(name).map(|m| m.focus),
                Action::Inline(module) => Some(module.focus),
                _ => None,
            })
            .unwrap_or_default()
    }

    // ────────────────────────────────────────────────────────────────────
    // Teardown
    // ────────────────────────────────────────────────────────────────────

    /// Unwind the stack, run the shutdown module once and leave the
    /// registry.  Later calls do nothing.
    pub async fn shutdown(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.unwind();

        if let Some(shutdown) = self.program.shutdown.clone() {
            self.stack.push_module(shutdown, Substitution::new(), None);
            if let Err(error) = self.run_round().await {
                warn!(agent = %self.me, %error, "shutdown module failed");
            }
            self.unwind();
        }

        self.timers.clear();
        self.registry.unregister(&self.me);
        self.progress.record(self.round, 0);
        self.emit(Channel::AgentTerminated, &self.me, format!("terminated after {} round(s)", self.round), None);
        info!(agent = %self.me, rounds = self.round, "agent terminated");
    }

    fn unwind(&mut self) {
        while let Some(frame) = self.stack.pop() {
            if let Frame::Module(frame) = frame
                && let Err(error) = self.exit_module(&frame)
            {
                warn!(agent = %self.me, %error, "error while unwinding module");
            }
        }
    }

    /// Destroy the mental state.  The agent cannot run afterwards.
    pub fn dispose(&mut self) -> Result<(), CogentError> {
        self.finished = true;
        self.stack.clear();
        self.registry.unregister(&self.me);
        self.mental.dispose()
    }
}

impl std::fmt::Debug for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunState")
            .field("agent", &self.me)
            .field("round", &self.round)
            .field("stack_depth", &self.stack.depth())
            .field("finished", &self.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use cogent_kr::{InMemoryKr, parse_clause, parse_query, parse_update};
    use cogent_mental::{MentalLiteral, MentalStateCondition};
    use cogent_types::{CollectingSink, Mood, Term};

    use super::*;
    use crate::environment::NoEnvironment;
    use crate::program::{FocusMethod, Rule};

    fn services(registry: Arc<AgentRegistry>, sink: Arc<CollectingSink>, config: RuntimeConfig) -> AgentServices {
        AgentServices {
            kr: Arc::new(InMemoryKr::new()),
            env: Arc::new(NoEnvironment),
            registry,
            sink,
            config,
        }
    }

    fn launch(name: &str, program: AgentProgram, config: RuntimeConfig) -> (RunState, Arc<CollectingSink>) {
        let sink = Arc::new(CollectingSink::new());
        let state = RunState::new(
            AgentId::new(name),
            Arc::new(program),
            services(Arc::new(AgentRegistry::new()), sink.clone(), config),
        )
        .unwrap();
        (state, sink)
    }

    fn cond(literals: Vec<MentalLiteral>) -> MentalStateCondition {
        MentalStateCondition::new(literals)
    }

    fn bel(src: &str) -> MentalLiteral {
        MentalLiteral::bel(parse_query(src).unwrap())
    }

    fn goal(src: &str) -> MentalLiteral {
        MentalLiteral::goal(parse_query(src).unwrap())
    }

    fn insert(src: &str) -> Action {
        Action::insert(parse_update(src).unwrap())
    }

    fn believes(state: &RunState, clause: &str) -> bool {
        state
            .mental_state()
            .beliefs()
            .unwrap()
            .contains(&parse_clause(clause).unwrap())
    }

    #[tokio::test]
    async fn achieved_goals_are_dropped_and_the_agent_falls_asleep() {
        let program = AgentProgram::new("p")
            .goal(parse_update("done").unwrap())
            .main(Module::main().rule(Rule::if_then(cond(vec![goal("done")]), vec![insert("done")])));
        let (mut state, sink) = launch("alice", program, RuntimeConfig::default());

        assert_eq!(state.step().await.unwrap(), StepOutcome::Round(1));
        assert!(believes(&state, "done"));
        assert!(!state.mental_state().has_goals());
        assert_eq!(sink.on(Channel::GoalAchieved).len(), 1);

        // Nothing fires in round 2, so the third step sleeps.
        assert_eq!(state.step().await.unwrap(), StepOutcome::Round(2));
        assert_eq!(state.step().await.unwrap(), StepOutcome::Idle);
        assert!(state.is_sleeping());
        assert_eq!(state.round(), 2);
        assert_eq!(sink.on(Channel::Sleep).len(), 1);
    }

    #[tokio::test]
    async fn sleeping_agent_wakes_after_the_timeout() {
        let config = RuntimeConfig::default().sleep_timeout(Duration::from_millis(5));
        let (mut state, sink) = launch("alice", AgentProgram::new("p").main(Module::main()), config);
        // Round 1 observes the agent's own registration.
        assert_eq!(state.step().await.unwrap(), StepOutcome::Round(1));
        assert_eq!(state.step().await.unwrap(), StepOutcome::Round(2));
        assert_eq!(state.step().await.unwrap(), StepOutcome::Idle);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(state.step().await.unwrap(), StepOutcome::Round(3));
        assert_eq!(sink.on(Channel::Wakeup).len(), 1);
    }

    #[tokio::test]
    async fn init_runs_once_before_main() {
        let program = AgentProgram::new("p")
            .init(Module::init().rule(Rule::if_then(cond(vec![]), vec![insert("ready")])))
            .main(Module::main().rule(Rule::if_then(cond(vec![bel("ready")]), vec![insert("started")])));
        let config = RuntimeConfig::default().sleep_on_no_change(false);
        let (mut state, sink) = launch("alice", program, config);

        state.step().await.unwrap();
        assert!(believes(&state, "ready"));
        assert!(believes(&state, "started"));
        assert_eq!(state.context(), Some(RunContext::Main));
        state.step().await.unwrap();
        let inits = sink
            .on(Channel::ModuleEntry)
            .into_iter()
            .filter(|e| e.subject == "init")
            .count();
        assert_eq!(inits, 1);
    }

    #[tokio::test]
    async fn exiting_main_finishes_and_runs_shutdown() {
        let program = AgentProgram::new("p")
            .main(Module::main().rule(Rule::if_then(cond(vec![]), vec![Action::ExitModule])))
            .shutdown(Module::shutdown().rule(Rule::if_then(cond(vec![]), vec![insert("bye")])));
        let (mut state, sink) = launch("alice", program, RuntimeConfig::default());
        let registry = state.registry.clone();

        assert_eq!(
            state.step().await.unwrap(),
            StepOutcome::Finished(FinishReason::MainExited)
        );
        state.shutdown().await;
        assert!(state.is_finished());
        assert!(believes(&state, "bye"));
        assert!(!registry.contains(&AgentId::new("alice")));
        assert_eq!(sink.on(Channel::AgentTerminated).len(), 1);
        assert!(state.step().await.is_err());
    }

    #[tokio::test]
    async fn round_limit_finishes_the_agent() {
        let config = RuntimeConfig::default().max_rounds(2).sleep_on_no_change(false);
        let (mut state, _) = launch("alice", AgentProgram::new("p").main(Module::main()), config);
        assert_eq!(state.step().await.unwrap(), StepOutcome::Round(1));
        assert_eq!(
            state.step().await.unwrap(),
            StepOutcome::Finished(FinishReason::MaxRounds)
        );
    }

    #[tokio::test]
    async fn timers_fire_as_percepts() {
        let program = AgentProgram::new("p")
            .init(Module::init().rule(Rule::if_then(
                cond(vec![]),
                vec![Action::StartTimer {
                    name: "tick".into(),
                    interval_ms: 1,
                    duration_ms: 10_000,
                }],
            )))
            .main(Module::main().rule(Rule::if_then(
                cond(vec![MentalLiteral::percept(parse_query("timer(tick)").unwrap())]),
                vec![insert("ticked")],
            )));
        let (mut state, _) = launch("alice", program, RuntimeConfig::default());
        state.step().await.unwrap();
        assert!(!believes(&state, "ticked"));
        tokio::time::sleep(Duration::from_millis(5)).await;
        state.step().await.unwrap();
        assert!(believes(&state, "ticked"));
    }

    #[tokio::test]
    async fn messages_and_membership_reach_the_mental_state() {
        let registry = Arc::new(AgentRegistry::new());
        let sink = Arc::new(CollectingSink::new());
        let bob_program = AgentProgram::new("bob").main(Module::main());
        let alice_program = AgentProgram::new("alice").main(Module::main().rule(Rule::if_then(
            cond(vec![]),
            vec![
                Action::send(
                    cogent_mental::Selector::AllOther,
                    Mood::Indicative,
                    Term::atom("hello"),
                ),
                Action::ExitModule,
            ],
        )));
        let config = RuntimeConfig::default();

        let mut alice = RunState::new(
            AgentId::new("alice"),
            Arc::new(alice_program),
            services(registry.clone(), sink.clone(), config.clone()),
        )
        .unwrap();
        let mut bob = RunState::new(
            AgentId::new("bob"),
            Arc::new(bob_program),
            services(registry.clone(), sink.clone(), config),
        )
        .unwrap();
        assert!(bob.mental_state().known_agents().contains(&AgentId::new("alice")));

        // Alice learns about bob from the registry before her first round.
        alice.step().await.unwrap();
        assert!(alice.mental_state().known_agents().contains(&AgentId::new("bob")));

        bob.step().await.unwrap();
        assert!(
            bob.mental_state()
                .messages()
                .unwrap()
                .contains(&parse_clause("received(alice, indicative(hello))").unwrap())
        );
    }

    #[tokio::test]
    async fn lagged_membership_resync_forgets_departed_agents() {
        let registry = Arc::new(AgentRegistry::with_event_capacity(4));
        let sink = Arc::new(CollectingSink::new());
        let quiet = || Arc::new(AgentProgram::new("quiet").main(Module::main()));
        let config = RuntimeConfig::default();

        let mut alice = RunState::new(
            AgentId::new("alice"),
            quiet(),
            services(registry.clone(), sink.clone(), config.clone()),
        )
        .unwrap();
        let _bob = RunState::new(AgentId::new("bob"), quiet(), services(registry.clone(), sink.clone(), config)).unwrap();
        alice.step().await.unwrap();
        assert!(alice.mental_state().known_agents().contains(&AgentId::new("bob")));

        // Bob's departure is pushed out of the buffer by later arrivals.
        assert!(registry.unregister(&AgentId::new("bob")));
        let _inboxes: Vec<_> = (0..10)
            .map(|i| registry.register(AgentId::new(format!("n{i}"))).unwrap())
            .collect();

        alice.step().await.unwrap();
        let known = alice.mental_state().known_agents();
        assert!(!known.contains(&AgentId::new("bob")));
        assert!(known.contains(&AgentId::new("n0")));
        assert!(known.contains(&AgentId::new("n9")));
        assert!(!believes(&alice, "agent(bob)"));
        assert!(believes(&alice, "agent(n9)"));
    }

    #[tokio::test]
    async fn select_focus_narrows_the_attention_set() {
        let handle = Module::user("handle").focus(FocusMethod::Select).rule(Rule::for_all(
            cond(vec![goal("deliver(Y)")]),
            vec![insert("seen(Y)")],
        ));
        let program = AgentProgram::new("p")
            .goal(parse_update("deliver(a)").unwrap())
            .goal(parse_update("deliver(b)").unwrap())
            .module(handle)
            .main(Module::main().rule(Rule::if_then(cond(vec![goal("deliver(X)")]), vec![Action::call("handle")])));
        let (mut state, sink) = launch("alice", program, RuntimeConfig::default());
        let depth = state.mental_state().focus_depth();

        state.step().await.unwrap();
        let seen = ["seen(a)", "seen(b)"]
            .iter()
            .filter(|c| believes(&state, c))
            .count();
        assert_eq!(seen, 1);
        assert_eq!(state.mental_state().focus_depth(), depth);
        assert_eq!(sink.on(Channel::Focus).len(), 1);
        assert_eq!(sink.on(Channel::Defocus).len(), 1);
    }
}
