//! Pre-parsed agent programs.
//!
//! The runtime never reads source text.  A front-end (or a test) builds an
//! [`AgentProgram`] out of [`Module`]s, [`Rule`]s and [`Action`]s and hands
//! it to [`MultiAgentSystem::launch`](crate::MultiAgentSystem::launch).
//!
//! | Module kind | Default order | Default exit |
//! |---|---|---|
//! | `init` | linearall | always |
//! | `event` | linearall | always |
//! | `main` | linear | never |
//! | `shutdown` | linearall | always |
//! | user | linear | always |
//! | anonymous | linear | always |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cogent_mental::{MentalStateCondition, Selector};
use cogent_types::{CogentError, DatabaseFormula, Mood, Query, SourceInfo, Substitution, Term, Update};

// ─────────────────────────────────────────────────────────────────────────────
// Module attributes
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleKind {
    Init,
    Event,
    Main,
    Shutdown,
    /// A named module entered through [`Action::Call`].
    User,
    /// A nested rule set entered through [`Action::Inline`].
    Anonymous,
}

impl ModuleKind {
    /// `true` for the modules that set the top-level run context.
    pub fn is_builtin(&self) -> bool {
        matches!(
            self,
            ModuleKind::Init | ModuleKind::Event | ModuleKind::Main | ModuleKind::Shutdown
        )
    }

    fn default_order(&self) -> RuleOrder {
        match self {
            ModuleKind::Init | ModuleKind::Event | ModuleKind::Shutdown => RuleOrder::LinearAll,
            ModuleKind::Main | ModuleKind::User | ModuleKind::Anonymous => RuleOrder::Linear,
        }
    }

    fn default_exit(&self) -> ExitCondition {
        match self {
            ModuleKind::Main => ExitCondition::Never,
            _ => ExitCondition::Always,
        }
    }
}

/// How the rules of a module are tried in one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOrder {
    /// Stop after the first rule whose condition holds.
    Linear,
    /// Try every rule.
    LinearAll,
}

/// When a finished pass leaves the module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCondition {
    Always,
    /// The module's attention set is empty.
    NoGoals,
    /// No rule fired during the pass.
    NoAction,
    /// Only [`Action::ExitModule`] leaves the module.
    Never,
}

/// Attention set pushed when the module is entered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FocusMethod {
    /// Keep the caller's attention set.
    #[default]
    None,
    /// Start from an empty attention set.
    New,
    /// The positive goal literals of the calling rule.
    Filter,
    /// The single goal through which the calling rule's condition held.
    Select,
}

// ─────────────────────────────────────────────────────────────────────────────
// Actions
// ─────────────────────────────────────────────────────────────────────────────

/// One step of a rule's action combo.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Insert { update: Update, selector: Selector },
    Delete { update: Update, selector: Selector },
    Adopt { goal: Update, selector: Selector },
    Drop { goal: Update, selector: Selector },
    Send { to: Selector, mood: Mood, content: Term },
    /// Write a term to the agent's log output.
    Print(Term),
    Log(String),
    /// Enter a named module of the program.
    Call(String),
    /// Enter a nested rule set with the current bindings.
    Inline(Arc<Module>),
    /// A user-specified action, matched against the program's
    /// [`ActionSpecification`]s.
    User { name: String, params: Vec<Term> },
    /// Suspend this agent for the given number of milliseconds.
    Sleep(u64),
    StartTimer { name: String, interval_ms: u64, duration_ms: u64 },
    CancelTimer(String),
    /// Leave the innermost named module.
    ExitModule,
    Subscribe(String),
    Unsubscribe(String),
    Publish { channel: String, mood: Mood, content: Term },
}

impl Action {
    pub fn insert(update: Update) -> Self {
        Action::Insert { update, selector: Selector::SelfAgent }
    }

    pub fn delete(update: Update) -> Self {
        Action::Delete { update, selector: Selector::SelfAgent }
    }

    pub fn adopt(goal: Update) -> Self {
        Action::Adopt { goal, selector: Selector::SelfAgent }
    }

    pub fn drop(goal: Update) -> Self {
        Action::Drop { goal, selector: Selector::SelfAgent }
    }

    pub fn send(to: Selector, mood: Mood, content: Term) -> Self {
        Action::Send { to, mood, content }
    }

    pub fn user(name: impl Into<String>, params: Vec<Term>) -> Self {
        Action::User { name: name.into(), params }
    }

    pub fn call(module: impl Into<String>) -> Self {
        Action::Call(module.into())
    }

    pub fn inline(module: Module) -> Self {
        Action::Inline(Arc::new(module))
    }

    /// Short name used in diagnostics.
    pub fn name(&self) -> &str {
        match self {
            Action::Insert { .. } => "insert",
            Action::Delete { .. } => "delete",
            Action::Adopt { .. } => "adopt",
            Action::Drop { .. } => "drop",
            Action::Send { .. } => "send",
            Action::Print(_) => "print",
            Action::Log(_) => "log",
            Action::Call(_) => "call",
            Action::Inline(_) => "inline",
            Action::User { name, .. } => name,
            Action::Sleep(_) => "sleep",
            Action::StartTimer { .. } => "starttimer",
            Action::CancelTimer(_) => "canceltimer",
            Action::ExitModule => "exit-module",
            Action::Subscribe(_) => "subscribe",
            Action::Unsubscribe(_) => "unsubscribe",
            Action::Publish { .. } => "publish",
        }
    }

    /// Instantiate the action with the bindings of the rule that fired.
    /// Nested rule sets are left alone: they receive the bindings as their
    /// seed instead.
    pub fn apply_subst(&self, subst: &Substitution) -> Self {
        match self {
            Action::Insert { update, selector } => Action::Insert {
                update: update.apply_subst(subst),
                selector: selector.apply_subst(subst),
            },
            Action::Delete { update, selector } => Action::Delete {
                update: update.apply_subst(subst),
                selector: selector.apply_subst(subst),
            },
            Action::Adopt { goal, selector } => Action::Adopt {
                goal: goal.apply_subst(subst),
                selector: selector.apply_subst(subst),
            },
            Action::Drop { goal, selector } => Action::Drop {
                goal: goal.apply_subst(subst),
                selector: selector.apply_subst(subst),
            },
            Action::Send { to, mood, content } => Action::Send {
                to: to.apply_subst(subst),
                mood: *mood,
                content: subst.apply(content),
            },
            Action::Print(term) => Action::Print(subst.apply(term)),
            Action::User { name, params } => Action::User {
                name: name.clone(),
                params: params.iter().map(|p| subst.apply(p)).collect(),
            },
            Action::Publish { channel, mood, content } => Action::Publish {
                channel: channel.clone(),
                mood: *mood,
                content: subst.apply(content),
            },
            other => other.clone(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Insert { update, selector } | Action::Delete { update, selector } => {
                write!(f, "{selector}.{}({update})", self.name())
            }
            Action::Adopt { goal, selector } | Action::Drop { goal, selector } => {
                write!(f, "{selector}.{}({goal})", self.name())
            }
            Action::Send { to, mood, content } => write!(f, "{to}.send({mood}{content})"),
            Action::Print(term) => write!(f, "print({term})"),
            Action::Log(text) => write!(f, "log({text:?})"),
            Action::Call(module) => write!(f, "{module}"),
            Action::Inline(module) => write!(f, "{{ {} rule(s) }}", module.rules.len()),
            Action::User { name, params } => {
                write!(f, "{name}")?;
                if !params.is_empty() {
                    write!(f, "(")?;
                    for (i, p) in params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{p}")?;
                    }
                    write!(f, ")")?;
                }
                Ok(())
            }
            Action::Sleep(ms) => write!(f, "sleep({ms})"),
            Action::StartTimer { name, interval_ms, duration_ms } => {
                write!(f, "starttimer({name}, {interval_ms}, {duration_ms})")
            }
            Action::CancelTimer(name) => write!(f, "canceltimer({name})"),
            Action::ExitModule => write!(f, "exit-module"),
            Action::Subscribe(channel) => write!(f, "subscribe({channel})"),
            Action::Unsubscribe(channel) => write!(f, "unsubscribe({channel})"),
            Action::Publish { channel, mood, content } => write!(f, "{channel}.publish({mood}{content})"),
        }
    }
}

/// Declares a user action: when it is enabled, whether the environment
/// performs it, and what the agent believes afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSpecification {
    pub name: String,
    pub params: Vec<Term>,
    /// Checked against the belief base before the action is performed.
    pub precondition: Query,
    /// Applied to the belief base after the action was performed.
    pub postcondition: Update,
    /// Sent to the environment when `true`.
    pub external: bool,
}

impl ActionSpecification {
    pub fn new(name: impl Into<String>, params: Vec<Term>) -> Self {
        Self {
            name: name.into(),
            params,
            precondition: Query::default(),
            postcondition: Update::default(),
            external: true,
        }
    }

    pub fn with_precondition(mut self, precondition: Query) -> Self {
        self.precondition = precondition;
        self
    }

    pub fn with_postcondition(mut self, postcondition: Update) -> Self {
        self.postcondition = postcondition;
        self
    }

    /// Purely internal: only the postcondition is applied.
    pub fn internal(mut self) -> Self {
        self.external = false;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rules and modules
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Act on the first answer of the condition.
    IfThen,
    /// Act on every answer of the condition.
    ForAll,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub kind: RuleKind,
    pub condition: MentalStateCondition,
    pub actions: Vec<Action>,
    pub source: Option<SourceInfo>,
}

impl Rule {
    pub fn if_then(condition: MentalStateCondition, actions: Vec<Action>) -> Self {
        Self {
            kind: RuleKind::IfThen,
            condition,
            actions,
            source: None,
        }
    }

    pub fn for_all(condition: MentalStateCondition, actions: Vec<Action>) -> Self {
        Self {
            kind: RuleKind::ForAll,
            ..Self::if_then(condition, actions)
        }
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub kind: ModuleKind,
    pub rules: Vec<Rule>,
    pub order: RuleOrder,
    pub exit: ExitCondition,
    pub focus: FocusMethod,
    pub source: Option<SourceInfo>,
}

impl Module {
    pub fn new(name: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            kind,
            rules: Vec::new(),
            order: kind.default_order(),
            exit: kind.default_exit(),
            focus: FocusMethod::None,
            source: None,
        }
    }

    pub fn init() -> Self {
        Self::new("init", ModuleKind::Init)
    }

    pub fn event() -> Self {
        Self::new("event", ModuleKind::Event)
    }

    pub fn main() -> Self {
        Self::new("main", ModuleKind::Main)
    }

    pub fn shutdown() -> Self {
        Self::new("shutdown", ModuleKind::Shutdown)
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self::new(name, ModuleKind::User)
    }

    pub fn anonymous() -> Self {
        Self::new("", ModuleKind::Anonymous)
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn order(mut self, order: RuleOrder) -> Self {
        self.order = order;
        self
    }

    pub fn exit(mut self, exit: ExitCondition) -> Self {
        self.exit = exit;
        self
    }

    pub fn focus(mut self, focus: FocusMethod) -> Self {
        self.focus = focus;
        self
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }

    fn calls(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for rule in &self.rules {
            for action in &rule.actions {
                match action {
                    Action::Call(name) => out.push(name.as_str()),
                    Action::Inline(nested) => out.extend(nested.calls()),
                    _ => {}
                }
            }
        }
        out
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind == ModuleKind::Anonymous {
            write!(f, "<anonymous>")
        } else {
            write!(f, "{}", self.name)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// AgentProgram
// ─────────────────────────────────────────────────────────────────────────────

/// Everything an agent is launched from.
#[derive(Debug, Clone, Default)]
pub struct AgentProgram {
    pub name: String,
    pub knowledge: Vec<DatabaseFormula>,
    pub beliefs: Vec<DatabaseFormula>,
    pub goals: Vec<Update>,
    pub init: Option<Arc<Module>>,
    pub event: Option<Arc<Module>>,
    pub main: Option<Arc<Module>>,
    pub shutdown: Option<Arc<Module>>,
    pub modules: HashMap<String, Arc<Module>>,
    pub action_specs: Vec<ActionSpecification>,
}

impl AgentProgram {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn knowledge(mut self, knowledge: impl IntoIterator<Item = DatabaseFormula>) -> Self {
        self.knowledge.extend(knowledge);
        self
    }

    pub fn beliefs(mut self, beliefs: impl IntoIterator<Item = DatabaseFormula>) -> Self {
        self.beliefs.extend(beliefs);
        self
    }

    pub fn goal(mut self, goal: Update) -> Self {
        self.goals.push(goal);
        self
    }

    pub fn init(mut self, module: Module) -> Self {
        self.init = Some(Arc::new(module));
        self
    }

    pub fn event(mut self, module: Module) -> Self {
        self.event = Some(Arc::new(module));
        self
    }

    pub fn main(mut self, module: Module) -> Self {
        self.main = Some(Arc::new(module));
        self
    }

    pub fn shutdown(mut self, module: Module) -> Self {
        self.shutdown = Some(Arc::new(module));
        self
    }

    /// Add a module that rules can enter with [`Action::Call`].
    pub fn module(mut self, module: Module) -> Self {
        self.modules.insert(module.name.clone(), Arc::new(module));
        self
    }

    pub fn action(mut self, spec: ActionSpecification) -> Self {
        self.action_specs.push(spec);
        self
    }

    pub fn find_module(&self, name: &str) -> Option<&Arc<Module>> {
        self.modules.get(name)
    }

    /// The specification for a user action of the given arity.
    pub fn action_spec(&self, name: &str, arity: usize) -> Option<&ActionSpecification> {
        self.action_specs
            .iter()
            .find(|spec| spec.name == name && spec.params.len() == arity)
    }

    /// Every module of the program, built-in ones first.
    pub fn all_modules(&self) -> impl Iterator<Item = &Arc<Module>> {
        [&self.init, &self.event, &self.main, &self.shutdown]
            .into_iter()
            .flatten()
            .chain(self.modules.values())
    }

    /// Check that every called module exists.
    ///
    /// # Errors
    ///
    /// [`CogentError::UnknownModule`] naming the first missing module.
    pub fn validate(&self) -> Result<(), CogentError> {
        for module in self.all_modules() {
            if let Some(missing) = module.calls().into_iter().find(|name| !self.modules.contains_key(*name)) {
                return Err(CogentError::UnknownModule(missing.to_string()));
            }
        }
        Ok(())
    }
}
