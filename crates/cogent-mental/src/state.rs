//! The mental state: my model plus the models I keep of other agents.
//!
//! Every read goes through [`MentalState::query`] (one literal) or
//! [`MentalState::evaluate`] (a conjunction).  Selectors fan a literal out
//! over several models:
//!
//! | Selector | Combination |
//! |---|---|
//! | `all`, `allother` | every agent must agree; answers are combined agent by agent and the fan-out stops at the first agent without an answer |
//! | variable, parameter list | union of every agent's answers |
//! | `self`, `this`, `some`, `someother` | the first agent with an answer |
//!
//! Models of other agents are owned by this mental state and only ever
//! touched by the owning agent's task, so fan-out reads need no locking.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use cogent_kr::{KrInterface, Theory};
use cogent_types::{
    AgentId, BaseType, Channel, CogentError, DatabaseFormula, Event, EventSink, Message, Mood,
    SourceInfo, Substitution, Term, Update,
};
use tracing::{debug, trace};

use crate::selector::{Resolution, resolve};
use crate::{
    FanOut, GoalBase, LiteralKind, MentalDiff, MentalLiteral, MentalModel, MentalStateCondition,
    MscResult, Selector, SentLiteral,
};

/// One agent's complete mental state.
pub struct MentalState {
    me: AgentId,
    kr: Arc<dyn KrInterface>,
    knowledge: Theory,
    models: HashMap<AgentId, MentalModel>,
    /// Known agents in the order they became known, me first.
    order: Vec<AgentId>,
}

impl MentalState {
    /// An uninitialised mental state for `me`.
    pub fn new(me: AgentId, kr: Arc<dyn KrInterface>) -> Self {
        Self {
            me,
            kr,
            knowledge: cogent_kr::empty_theory(),
            models: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Create my own model from the initial knowledge, beliefs and goals.
    pub fn initialize(
        &mut self,
        knowledge: Vec<DatabaseFormula>,
        beliefs: Vec<DatabaseFormula>,
        goals: Vec<Update>,
        sink: &dyn EventSink,
    ) -> Result<(), CogentError> {
        if self.models.contains_key(&self.me) {
            return Err(CogentError::Lifecycle(format!(
                "mental state of {} is already initialised",
                self.me
            )));
        }
        self.knowledge = Arc::from(knowledge);
        let model = MentalModel::own(self.kr.clone(), self.me.clone(), self.knowledge.clone(), beliefs)?;
        self.models.insert(self.me.clone(), model);
        self.order.insert(0, self.me.clone());

        let me_fact = Update::facts(vec![Term::compound("me", vec![self.me.to_term()])]);
        self.insert(&me_fact, &Selector::SelfAgent, sink)?;
        for goal in &goals {
            self.adopt(goal, false, &Selector::SelfAgent, sink)?;
        }
        debug!(agent = %self.me, goals = goals.len(), "mental state initialised");
        Ok(())
    }

    pub fn me(&self) -> &AgentId {
        &self.me
    }

    pub fn knowledge(&self) -> &Theory {
        &self.knowledge
    }

    /// Known agents, me first, then in the order they became known.
    pub fn known_agents(&self) -> &[AgentId] {
        &self.order
    }

    pub fn model(&self, agent: &AgentId) -> Result<&MentalModel, CogentError> {
        self.models
            .get(agent)
            .ok_or_else(|| CogentError::UnknownAgent(agent.clone()))
    }

    fn model_mut(&mut self, agent: &AgentId) -> Result<&mut MentalModel, CogentError> {
        self.models
            .get_mut(agent)
            .ok_or_else(|| CogentError::UnknownAgent(agent.clone()))
    }

    pub fn my_model(&self) -> Result<&MentalModel, CogentError> {
        self.model(&self.me)
    }

    fn emit(&self, sink: &dyn EventSink, channel: Channel, subject: impl std::fmt::Display, message: String) {
        sink.emit(Event::new(&self.me, channel, subject, message));
    }

    fn emit_diff(&self, sink: &dyn EventSink, agent: &AgentId, diff: &MentalDiff, on_add: Channel, on_remove: Channel) {
        for formula in &diff.added {
            self.emit(sink, on_add, formula, format!("{} in {}", on_add, model_label(agent, diff)));
        }
        for formula in &diff.removed {
            self.emit(sink, on_remove, formula, format!("{} from {}", on_remove, model_label(agent, diff)));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Known agents
    // ─────────────────────────────────────────────────────────────────────

    /// Start modelling `agent`.  Returns `false` when it is already known.
    pub fn add_agent_model(&mut self, agent: &AgentId, sink: &dyn EventSink) -> Result<bool, CogentError> {
        if self.models.contains_key(agent) {
            return Ok(false);
        }
        let model = MentalModel::other(self.kr.clone(), agent.clone(), self.knowledge.clone())?;
        self.models.insert(agent.clone(), model);
        self.order.push(agent.clone());
        let fact = Update::facts(vec![Term::compound("agent", vec![agent.to_term()])]);
        self.insert(&fact, &Selector::SelfAgent, sink)?;
        trace!(agent = %self.me, known = %agent, "agent model created");
        Ok(true)
    }

    /// Forget `agent`.  Returns `false` when it was not known.
    pub fn remove_agent_model(&mut self, agent: &AgentId, sink: &dyn EventSink) -> Result<bool, CogentError> {
        if agent == &self.me {
            return Err(CogentError::Query(format!("{} cannot forget itself", self.me)));
        }
        let Some(mut model) = self.models.remove(agent) else {
            return Ok(false);
        };
        model.destroy()?;
        self.order.retain(|a| a != agent);
        let fact = Update::facts(vec![Term::compound("agent", vec![agent.to_term()])]);
        self.delete(&fact, &Selector::SelfAgent, sink)?;
        trace!(agent = %self.me, forgotten = %agent, "agent model removed");
        Ok(true)
    }

    /// Resolve `selector`, creating models for named agents not yet known.
    pub fn resolve(&mut self, selector: &Selector, sink: &dyn EventSink) -> Result<Resolution, CogentError> {
        let resolution = resolve(selector, &self.me, &self.order)?;
        for agent in &resolution.agents {
            if !self.models.contains_key(agent) {
                self.add_agent_model(agent, sink)?;
            }
        }
        Ok(resolution)
    }

    fn resolve_for_update(&mut self, selector: &Selector, sink: &dyn EventSink) -> Result<Vec<AgentId>, CogentError> {
        let resolution = self.resolve(selector, sink)?;
        if let Some(var) = resolution.variable {
            return Err(CogentError::Query(format!(
                "cannot update the mental state through unbound agent variable {var}"
            )));
        }
        Ok(resolution.agents)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// All answers of one literal.
    pub fn query(&mut self, literal: &MentalLiteral, sink: &dyn EventSink) -> Result<BTreeSet<Substitution>, CogentError> {
        let source = literal.source.as_ref();
        sink.emit(Event::new(&self.me, Channel::QueryStart, literal, "query").with_source(source));

        let answers = match &literal.kind {
            LiteralKind::Sent(sent) => {
                let positive = self.message_literal(sent, sink)?;
                negate(literal.positive, positive)
            }
            kind => {
                let resolution = self.resolve(&literal.selector, sink)?;
                self.fan_out(literal.selector.fan_out(), &resolution.agents, |state, agent, specialise| {
                    let kind = if specialise.is_empty() {
                        kind.clone()
                    } else {
                        literal.apply_subst(specialise).kind
                    };
                    let model = state.model(agent)?;
                    let answers = negate(literal.positive, model.query(&kind, agent == &state.me)?);
                    Ok(bind_agent(answers, resolution.variable.as_deref(), agent))
                })?
            }
        };

        sink.emit(
            Event::new(&self.me, Channel::QueryEnd, literal, format!("{} answer(s)", answers.len()))
                .with_source(source),
        );
        Ok(answers)
    }

    /// Positive answers of a message literal against my message base.
    fn message_literal(&mut self, sent: &SentLiteral, sink: &dyn EventSink) -> Result<BTreeSet<Substitution>, CogentError> {
        if let Selector::Variable(var) = &sent.counterpart {
            // The counterpart variable is bound by the message itself.
            return self.my_model()?.message_query(&sent.query_for(Term::var(var.clone())));
        }
        let resolution = self.resolve(&sent.counterpart, sink)?;
        self.fan_out(sent.counterpart.fan_out(), &resolution.agents, |state, agent, specialise| {
            let content = specialise.apply(&sent.content);
            let query = SentLiteral {
                content,
                ..sent.clone()
            }
            .query_for(agent.to_term());
            state.my_model()?.message_query(&query)
        })
    }

    /// Combine per-agent answers according to `mode`.
    ///
    /// `eval(state, agent, specialise)` answers for one agent with the
    /// literal specialised by an answer already found for earlier agents.
    fn fan_out<F>(&self, mode: FanOut, agents: &[AgentId], mut eval: F) -> Result<BTreeSet<Substitution>, CogentError>
    where
        F: FnMut(&Self, &AgentId, &Substitution) -> Result<BTreeSet<Substitution>, CogentError>,
    {
        let empty = Substitution::new();
        match mode {
            FanOut::All => {
                let Some((first, rest)) = agents.split_first() else {
                    return Ok(BTreeSet::new());
                };
                let mut current = eval(self, first, &empty)?;
                for agent in rest {
                    if current.is_empty() {
                        break;
                    }
                    let mut next = BTreeSet::new();
                    for held in &current {
                        for answer in eval(self, agent, held)? {
                            if let Some(combined) = held.combine(&answer) {
                                next.insert(combined);
                            }
                        }
                    }
                    current = next;
                }
                Ok(current)
            }
            FanOut::List => {
                let mut union = BTreeSet::new();
                for agent in agents {
                    union.extend(eval(self, agent, &empty)?);
                }
                Ok(union)
            }
            FanOut::Single => {
                for agent in agents {
                    let answers = eval(self, agent, &empty)?;
                    if !answers.is_empty() {
                        return Ok(answers);
                    }
                }
                Ok(BTreeSet::new())
            }
        }
    }

    /// Evaluate a conjunction left to right, starting from `seed`.
    pub fn evaluate(
        &mut self,
        condition: &MentalStateCondition,
        seed: &Substitution,
        sink: &dyn EventSink,
    ) -> Result<MscResult, CogentError> {
        let mut current = BTreeSet::from([seed.clone()]);
        for literal in &condition.literals {
            let mut next = BTreeSet::new();
            for held in &current {
                let specialised = literal.apply_subst(held);
                for answer in self.query(&specialised, sink)? {
                    if let Some(combined) = held.combine(&answer) {
                        next.insert(combined);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }
        Ok(MscResult {
            answers: current,
            focus_goals: Vec::new(),
        })
    }

    /// Evaluate `condition` once per goal of the current attention set, each
    /// time with that goal alone in focus.
    pub fn focus_evaluate(
        &mut self,
        condition: &MentalStateCondition,
        seed: &Substitution,
        sink: &dyn EventSink,
    ) -> Result<MscResult, CogentError> {
        let goals = self.my_model()?.attention_set(true).goals();
        let mut result = MscResult::default();
        for goal in goals {
            let mut single = self.my_model()?.new_attention_set(format!("focus:{goal}"));
            single.insert(&goal)?;
            let answers = self.with_temporary_focus(single, |state| state.evaluate(condition, seed, sink))?;
            if answers.holds() {
                result.answers.extend(answers.answers.iter().cloned());
                result
                    .focus_goals
                    .push((MentalStateCondition::single_goal(&goal), answers.answers));
            }
        }
        Ok(result)
    }

    /// Evaluate `condition` once and key the answers by its positive goal
    /// literals.
    pub fn filter_evaluate(
        &mut self,
        condition: &MentalStateCondition,
        seed: &Substitution,
        sink: &dyn EventSink,
    ) -> Result<MscResult, CogentError> {
        let mut result = self.evaluate(condition, seed, sink)?;
        let filter = MentalStateCondition::new(condition.positive_goal_literals().into_iter().cloned().collect());
        if result.holds() && !filter.is_empty() {
            result.focus_goals.push((filter, result.answers.clone()));
        }
        Ok(result)
    }

    /// Run `f` with `goals` as my current focus.  The focus is removed again
    /// whether or not `f` succeeds.
    pub fn with_temporary_focus<T>(
        &mut self,
        goals: GoalBase,
        f: impl FnOnce(&mut Self) -> Result<T, CogentError>,
    ) -> Result<T, CogentError> {
        let me = self.me.clone();
        self.model_mut(&me)?.focus(goals);
        let outcome = f(self);
        let restored = self.model_mut(&me).and_then(MentalModel::defocus);
        match (outcome, restored) {
            (Ok(value), Ok(_)) => Ok(value),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    /// `true` when `query` follows from my beliefs.
    pub fn believes(&mut self, query: &cogent_types::Query, sink: &dyn EventSink) -> Result<bool, CogentError> {
        Ok(!self.query(&MentalLiteral::bel(query.clone()), sink)?.is_empty())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Beliefs
    // ─────────────────────────────────────────────────────────────────────

    /// Apply `update` to the belief base of every selected agent.
    pub fn insert(&mut self, update: &Update, selector: &Selector, sink: &dyn EventSink) -> Result<Vec<MentalDiff>, CogentError> {
        self.change_beliefs(update, selector, sink, true)
    }

    /// Retract `update` from the belief base of every selected agent.
    pub fn delete(&mut self, update: &Update, selector: &Selector, sink: &dyn EventSink) -> Result<Vec<MentalDiff>, CogentError> {
        self.change_beliefs(update, selector, sink, false)
    }

    fn change_beliefs(
        &mut self,
        update: &Update,
        selector: &Selector,
        sink: &dyn EventSink,
        inserting: bool,
    ) -> Result<Vec<MentalDiff>, CogentError> {
        let agents = self.resolve_for_update(selector, sink)?;
        let mut diffs = Vec::with_capacity(agents.len());
        for agent in agents {
            let base = self.model_mut(&agent)?.base_mut(BaseType::Belief)?;
            let diff = if inserting { base.insert(update)? } else { base.delete(update)? };
            self.emit_diff(sink, &agent, &diff, Channel::Insert, Channel::Delete);
            diffs.push(diff);
        }
        Ok(diffs)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Goals
    // ─────────────────────────────────────────────────────────────────────

    /// Adopt `goal` in every selected agent's model.  For my own model the
    /// goal goes into the current focus when `use_focus`, otherwise into
    /// the main attention set.
    pub fn adopt(
        &mut self,
        goal: &Update,
        use_focus: bool,
        selector: &Selector,
        sink: &dyn EventSink,
    ) -> Result<Vec<MentalDiff>, CogentError> {
        let agents = self.resolve_for_update(selector, sink)?;
        let mut diffs = Vec::with_capacity(agents.len());
        for agent in agents {
            let focused = use_focus && agent == self.me;
            let diff = self.model_mut(&agent)?.attention_set_mut(focused).insert(goal)?;
            if !diff.is_empty() {
                self.emit(sink, Channel::Adopt, goal, format!("adopted in {}", model_label(&agent, &diff)));
            }
            diffs.push(diff);
        }
        Ok(diffs)
    }

    /// Drop every goal entailing `goal`, at every attention-set level of
    /// every selected agent's model.
    pub fn drop(&mut self, goal: &Update, selector: &Selector, sink: &dyn EventSink) -> Result<Vec<MentalDiff>, CogentError> {
        let agents = self.resolve_for_update(selector, sink)?;
        let mut diffs = Vec::with_capacity(agents.len());
        for agent in agents {
            let mut merged = MentalDiff::new(BaseType::Goal, None);
            for level in self.model_mut(&agent)?.attention_sets_mut() {
                let mut diff = level.drop(goal)?;
                diff.focus = None;
                merged.merge(diff)?;
            }
            if !merged.is_empty() {
                self.emit(sink, Channel::Drop, goal, format!("dropped from {}", model_label(&agent, &merged)));
            }
            diffs.push(merged);
        }
        Ok(diffs)
    }

    /// Blind commitment: remove every goal, in every model, that the
    /// corresponding beliefs already entail.
    pub fn update_goal_state(&mut self, sink: &dyn EventSink) -> Result<Vec<MentalDiff>, CogentError> {
        let mut diffs = Vec::new();
        for agent in self.order.clone() {
            let changes = self.model_mut(&agent)?.update_goal_state()?;
            for (diff, achieved) in changes {
                for goal in &achieved {
                    self.emit(sink, Channel::GoalAchieved, goal, format!("achieved in {}", model_label(&agent, &diff)));
                }
                diffs.push(diff);
            }
        }
        Ok(diffs)
    }

    /// `true` when my current attention set holds a goal.
    pub fn has_goals(&self) -> bool {
        self.my_model().map(MentalModel::has_goals).unwrap_or(false)
    }

    /// My current attention set (`use_focus`) or my main attention set.
    pub fn attention_set(&self, use_focus: bool) -> Result<&GoalBase, CogentError> {
        Ok(self.my_model()?.attention_set(use_focus))
    }

    /// An empty attention set that can be pushed with [`push_focus`](Self::push_focus).
    pub fn new_attention_set(&self, name: impl Into<String>) -> Result<GoalBase, CogentError> {
        Ok(self.my_model()?.new_attention_set(name))
    }

    pub fn focus_depth(&self) -> usize {
        self.my_model().map(MentalModel::focus_depth).unwrap_or(0)
    }

    /// Push `goals` as my current focus.
    pub fn push_focus(&mut self, goals: GoalBase, source: Option<&SourceInfo>, sink: &dyn EventSink) -> Result<(), CogentError> {
        let me = self.me.clone();
        let name = goals.name().to_string();
        let count = goals.len();
        self.model_mut(&me)?.focus(goals);
        sink.emit(
            Event::new(&self.me, Channel::Focus, &name, format!("focus on {name} with {count} goal(s)"))
                .with_source(source),
        );
        Ok(())
    }

    /// Pop my current focus.
    pub fn defocus(&mut self, sink: &dyn EventSink) -> Result<MentalDiff, CogentError> {
        let me = self.me.clone();
        let diff = self.model_mut(&me)?.defocus()?;
        let name = diff.focus.clone().unwrap_or_default();
        self.emit(sink, Channel::Defocus, &name, format!("defocus {name}"));
        Ok(diff)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Percepts
    // ─────────────────────────────────────────────────────────────────────

    /// Delete `delete`, then add `add` to my percept base.
    pub fn apply_percepts(
        &mut self,
        add: Vec<DatabaseFormula>,
        delete: Vec<DatabaseFormula>,
        sink: &dyn EventSink,
    ) -> Result<MentalDiff, CogentError> {
        let me = self.me.clone();
        let update = Update::new(add, delete);
        let diff = self.model_mut(&me)?.base_mut(BaseType::Percept)?.insert(&update)?;
        self.emit_diff(sink, &me, &diff, Channel::Percept, Channel::Percept);
        Ok(diff)
    }

    pub fn percepts(&self) -> Result<Vec<DatabaseFormula>, CogentError> {
        self.base_formulas(BaseType::Percept)
    }

    pub fn beliefs(&self) -> Result<Vec<DatabaseFormula>, CogentError> {
        self.base_formulas(BaseType::Belief)
    }

    fn base_formulas(&self, base_type: BaseType) -> Result<Vec<DatabaseFormula>, CogentError> {
        Ok(self
            .my_model()?
            .base(base_type)
            .map(|b| b.formulas())
            .unwrap_or_default())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Messages
    // ─────────────────────────────────────────────────────────────────────

    /// Store an incoming message and update my model of its sender.
    ///
    /// | Mood | Effect on the sender's model |
    /// |---|---|
    /// | indicative | the sender believes the content |
    /// | imperative | the sender wants the content |
    /// | interrogative | none |
    pub fn receive_message(&mut self, message: &Message, sink: &dyn EventSink) -> Result<Vec<MentalDiff>, CogentError> {
        let me = self.me.clone();
        let sender = message.sender.clone();
        if sender != me {
            self.add_agent_model(&sender, sink)?;
        }

        let received = self
            .model_mut(&me)?
            .base_mut(BaseType::Message)?
            .insert_formula(&message.received_formula())?;
        self.emit(sink, Channel::MessageReceived, message, format!("received from {sender}"));
        let mut diffs = vec![received];

        if sender == me {
            return Ok(diffs);
        }
        let content = Update::facts(vec![message.content.clone()]);
        let to_sender = Selector::Parameters(vec![sender.to_term()]);
        match message.mood {
            Mood::Indicative => diffs.extend(self.insert(&content, &to_sender, sink)?),
            Mood::Imperative => diffs.extend(self.adopt(&content, false, &to_sender, sink)?),
            Mood::Interrogative => {}
        }
        Ok(diffs)
    }

    /// Record that I sent `message`.
    pub fn record_sent(&mut self, message: &Message, sink: &dyn EventSink) -> Result<MentalDiff, CogentError> {
        let me = self.me.clone();
        let base = self.model_mut(&me)?.base_mut(BaseType::Message)?;
        let mut diff = MentalDiff::new(BaseType::Message, None);
        for receiver in &message.receivers {
            diff.merge(base.insert_formula(&message.sent_formula(receiver))?)?;
        }
        self.emit(sink, Channel::MessageSent, message, format!("sent to {} receiver(s)", message.receivers.len()));
        Ok(diff)
    }

    /// Every formula of my message base.
    pub fn messages(&self) -> Result<Vec<DatabaseFormula>, CogentError> {
        self.base_formulas(BaseType::Message)
    }

    pub fn remove_message(&mut self, formula: &DatabaseFormula, sink: &dyn EventSink) -> Result<MentalDiff, CogentError> {
        let me = self.me.clone();
        let diff = self.model_mut(&me)?.base_mut(BaseType::Message)?.delete_formula(formula)?;
        self.emit_diff(sink, &me, &diff, Channel::Insert, Channel::Delete);
        Ok(diff)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────────────

    /// Destroy every model and its databases.
    pub fn dispose(&mut self) -> Result<(), CogentError> {
        for (_, mut model) in self.models.drain() {
            model.destroy()?;
        }
        self.order.clear();
        Ok(())
    }
}

impl std::fmt::Debug for MentalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentalState")
            .field("me", &self.me)
            .field("known", &self.order)
            .finish()
    }
}

/// Negative literals succeed with the empty substitution exactly when the
/// positive literal has no answer.
fn negate(positive: bool, answers: BTreeSet<Substitution>) -> BTreeSet<Substitution> {
    if positive {
        answers
    } else if answers.is_empty() {
        BTreeSet::from([Substitution::new()])
    } else {
        BTreeSet::new()
    }
}

/// Bind a free agent variable to the agent that produced the answers.
fn bind_agent(answers: BTreeSet<Substitution>, variable: Option<&str>, agent: &AgentId) -> BTreeSet<Substitution> {
    let Some(var) = variable else {
        return answers;
    };
    let binding = Substitution::singleton(var, agent.to_term());
    answers
        .into_iter()
        .filter_map(|answer| answer.combine(&binding))
        .collect()
}

fn model_label(agent: &AgentId, diff: &MentalDiff) -> String {
    match &diff.focus {
        Some(focus) => format!("{agent}.{}[{focus}]", diff.base_type),
        None => format!("{agent}.{}", diff.base_type),
    }
}
