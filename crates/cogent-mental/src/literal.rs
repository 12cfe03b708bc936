//! Mental literals, selectors and mental-state conditions.
//!
//! | Literal | Asks |
//! |---|---|
//! | `bel(Q)` | does the belief base entail `Q`? |
//! | `percept(Q)` | does the percept base entail `Q`? |
//! | `goal(Q)` | does some goal of the attention set entail `Q`? |
//! | `a-goal(Q)` | `goal(Q)` and not yet `bel(Q)` |
//! | `goal-a(Q)` | `goal(Q)` and already `bel(Q)` |
//! | `sent(S, mood(C))` / `received(S, mood(C))` | is there such a message? |
//!
//! Every literal carries a [`Selector`] deciding whose model answers it and
//! may be negated.

use std::collections::BTreeSet;
use std::fmt;

use cogent_types::{Mood, Query, SourceInfo, Substitution, Term, Update};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Selector
// ─────────────────────────────────────────────────────────────────────────────

/// Which agents' models a literal or update applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Selector {
    /// The owner of the mental state.
    #[default]
    SelfAgent,
    /// Same as `SelfAgent`; names the agent executing the current module.
    This,
    /// Every known agent, including me.
    All,
    /// Every known agent except me.
    AllOther,
    /// Some known agent, including me.
    Some,
    /// Some known agent other than me.
    SomeOther,
    /// An agent variable.  Free: any known agent (bound by the answer).
    Variable(String),
    /// Explicit agent names.  Variables in it must be bound before use.
    Parameters(Vec<Term>),
}

/// How the per-agent answers of a selector fan-out are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanOut {
    /// Every agent must agree (answers are combined across agents).
    All,
    /// Union of every agent's answers.
    List,
    /// First agent with an answer wins.
    Single,
}

impl Selector {
    pub fn fan_out(&self) -> FanOut {
        match self {
            Selector::All | Selector::AllOther => FanOut::All,
            Selector::Variable(_) | Selector::Parameters(_) => FanOut::List,
            Selector::SelfAgent | Selector::This | Selector::Some | Selector::SomeOther => {
                FanOut::Single
            }
        }
    }

    pub fn parameters<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Selector::Parameters(names.into_iter().map(|n| Term::atom(n)).collect())
    }

    /// A bound variable selector becomes a parameter list naming its value.
    pub fn apply_subst(&self, subst: &Substitution) -> Self {
        match self {
            Selector::Variable(var) => match subst.apply(&Term::var(var.clone())) {
                Term::Var(name) => Selector::Variable(name),
                bound => Selector::Parameters(vec![bound]),
            },
            Selector::Parameters(terms) => {
                Selector::Parameters(terms.iter().map(|t| subst.apply(t)).collect())
            }
            other => other.clone(),
        }
    }

    pub fn collect_vars(&self, out: &mut BTreeSet<String>) {
        match self {
            Selector::Variable(var) => {
                out.insert(var.clone());
            }
            Selector::Parameters(terms) => terms.iter().for_each(|t| t.collect_vars(out)),
            _ => {}
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::SelfAgent => write!(f, "self"),
            Selector::This => write!(f, "this"),
            Selector::All => write!(f, "all"),
            Selector::AllOther => write!(f, "allother"),
            Selector::Some => write!(f, "some"),
            Selector::SomeOther => write!(f, "someother"),
            Selector::Variable(var) => write!(f, "{var}"),
            Selector::Parameters(terms) => {
                write!(f, "(")?;
                for (i, term) in terms.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{term}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Literals
// ─────────────────────────────────────────────────────────────────────────────

/// Direction of a message literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Sent,
    Received,
}

impl Direction {
    pub fn functor(&self) -> &'static str {
        match self {
            Direction::Sent => "sent",
            Direction::Received => "received",
        }
    }
}

/// `sent(To, mood(Content))` or `received(From, mood(Content))`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SentLiteral {
    pub direction: Direction,
    /// The other party, resolved like any selector.
    pub counterpart: Selector,
    pub mood: Mood,
    pub content: Term,
}

impl SentLiteral {
    /// The message-base query for one counterpart term.
    pub fn query_for(&self, counterpart: Term) -> Query {
        Query::atom(Term::compound(
            self.direction.functor(),
            vec![counterpart, self.mood.wrap(self.content.clone())],
        ))
    }
}

/// What a literal asks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    Belief(Query),
    Percept(Query),
    Goal(Query),
    AGoal(Query),
    GoalA(Query),
    Sent(SentLiteral),
}

impl LiteralKind {
    /// `true` for goal, a-goal and goal-a literals.
    pub fn is_goal(&self) -> bool {
        matches!(self, LiteralKind::Goal(_) | LiteralKind::AGoal(_) | LiteralKind::GoalA(_))
    }

    /// The KR query, for every kind except message literals.
    pub fn query(&self) -> Option<&Query> {
        match self {
            LiteralKind::Belief(q)
            | LiteralKind::Percept(q)
            | LiteralKind::Goal(q)
            | LiteralKind::AGoal(q)
            | LiteralKind::GoalA(q) => Some(q),
            LiteralKind::Sent(_) => None,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            LiteralKind::Belief(_) => "bel",
            LiteralKind::Percept(_) => "percept",
            LiteralKind::Goal(_) => "goal",
            LiteralKind::AGoal(_) => "a-goal",
            LiteralKind::GoalA(_) => "goal-a",
            LiteralKind::Sent(s) => s.direction.functor(),
        }
    }

    fn apply_subst(&self, subst: &Substitution) -> Self {
        match self {
            LiteralKind::Belief(q) => LiteralKind::Belief(q.apply_subst(subst)),
            LiteralKind::Percept(q) => LiteralKind::Percept(q.apply_subst(subst)),
            LiteralKind::Goal(q) => LiteralKind::Goal(q.apply_subst(subst)),
            LiteralKind::AGoal(q) => LiteralKind::AGoal(q.apply_subst(subst)),
            LiteralKind::GoalA(q) => LiteralKind::GoalA(q.apply_subst(subst)),
            LiteralKind::Sent(s) => LiteralKind::Sent(SentLiteral {
                direction: s.direction,
                counterpart: s.counterpart.apply_subst(subst),
                mood: s.mood,
                content: subst.apply(&s.content),
            }),
        }
    }
}

/// One possibly negated, selector-scoped literal of a condition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MentalLiteral {
    pub positive: bool,
    pub selector: Selector,
    pub kind: LiteralKind,
    pub source: Option<SourceInfo>,
}

impl MentalLiteral {
    pub fn new(kind: LiteralKind) -> Self {
        Self {
            positive: true,
            selector: Selector::SelfAgent,
            kind,
            source: None,
        }
    }

    pub fn bel(query: Query) -> Self {
        Self::new(LiteralKind::Belief(query))
    }

    pub fn percept(query: Query) -> Self {
        Self::new(LiteralKind::Percept(query))
    }

    pub fn goal(query: Query) -> Self {
        Self::new(LiteralKind::Goal(query))
    }

    pub fn a_goal(query: Query) -> Self {
        Self::new(LiteralKind::AGoal(query))
    }

    pub fn goal_a(query: Query) -> Self {
        Self::new(LiteralKind::GoalA(query))
    }

    pub fn received(from: Selector, mood: Mood, content: Term) -> Self {
        Self::new(LiteralKind::Sent(SentLiteral {
            direction: Direction::Received,
            counterpart: from,
            mood,
            content,
        }))
    }

    pub fn sent(to: Selector, mood: Mood, content: Term) -> Self {
        Self::new(LiteralKind::Sent(SentLiteral {
            direction: Direction::Sent,
            counterpart: to,
            mood,
            content,
        }))
    }

    /// Negate the literal.
    pub fn not(mut self) -> Self {
        self.positive = !self.positive;
        self
    }

    pub fn with_selector(mut self, selector: Selector) -> Self {
        self.selector = selector;
        self
    }

    pub fn with_source(mut self, source: SourceInfo) -> Self {
        self.source = Some(source);
        self
    }

    pub fn apply_subst(&self, subst: &Substitution) -> Self {
        Self {
            positive: self.positive,
            selector: self.selector.apply_subst(subst),
            kind: self.kind.apply_subst(subst),
            source: self.source.clone(),
        }
    }

    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.selector.collect_vars(&mut out);
        match &self.kind {
            LiteralKind::Sent(s) => {
                s.counterpart.collect_vars(&mut out);
                s.content.collect_vars(&mut out);
            }
            other => {
                if let Some(q) = other.query() {
                    out.extend(q.vars());
                }
            }
        }
        out
    }
}

impl fmt::Display for MentalLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.positive {
            write!(f, "not(")?;
        }
        if self.selector != Selector::SelfAgent {
            write!(f, "{}.", self.selector)?;
        }
        match &self.kind {
            LiteralKind::Sent(s) => write!(
                f,
                "{}({}, {}{})",
                s.direction.functor(),
                s.counterpart,
                s.mood,
                s.content
            )?,
            other => {
                let query = other.query().map(ToString::to_string).unwrap_or_default();
                write!(f, "{}({})", other.keyword(), query)?
            }
        }
        if !self.positive {
            write!(f, ")")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conditions
// ─────────────────────────────────────────────────────────────────────────────

/// A conjunction of mental literals, evaluated left to right.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MentalStateCondition {
    pub literals: Vec<MentalLiteral>,
}

impl MentalStateCondition {
    pub fn new(literals: Vec<MentalLiteral>) -> Self {
        Self { literals }
    }

    /// The condition `goal(G)` for one goal.
    pub fn single_goal(goal: &Update) -> Self {
        Self::new(vec![MentalLiteral::goal(goal.to_query())])
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }

    pub fn vars(&self) -> BTreeSet<String> {
        self.literals.iter().flat_map(MentalLiteral::vars).collect()
    }

    pub fn apply_subst(&self, subst: &Substitution) -> Self {
        Self::new(self.literals.iter().map(|l| l.apply_subst(subst)).collect())
    }

    /// The positive goal and a-goal literals, in order.
    pub fn positive_goal_literals(&self) -> Vec<&MentalLiteral> {
        self.literals
            .iter()
            .filter(|l| l.positive && matches!(l.kind, LiteralKind::Goal(_) | LiteralKind::AGoal(_)))
            .collect()
    }

    /// The goal described by this condition's positive goal literals: the
    /// conjunction of their queries, read as an update.
    pub fn goal_update(&self) -> Update {
        let mut literals = Vec::new();
        for literal in self.positive_goal_literals() {
            if let Some(q) = literal.kind.query() {
                literals.extend(q.literals.iter().cloned());
            }
        }
        Query::new(literals).to_update()
    }
}

impl fmt::Display for MentalStateCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.literals.is_empty() {
            return write!(f, "true");
        }
        for (i, literal) in self.literals.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{literal}")?;
        }
        Ok(())
    }
}

/// Result of evaluating a condition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MscResult {
    /// Every substitution under which the condition holds.
    pub answers: BTreeSet<Substitution>,
    /// Answer sets keyed by the goal condition that produced them (filled by
    /// focus and filter evaluation).
    pub focus_goals: Vec<(MentalStateCondition, BTreeSet<Substitution>)>,
}

impl MscResult {
    pub fn holds(&self) -> bool {
        !self.answers.is_empty()
    }

    /// The focus goal whose answer set contains `answer`.
    pub fn goal_for(&self, answer: &Substitution) -> Option<&MentalStateCondition> {
        self.focus_goals
            .iter()
            .find(|(_, answers)| answers.contains(answer))
            .map(|(condition, _)| condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogent_kr::parse_query;

    #[test]
    fn bound_variable_selector_becomes_parameter() {
        let selector = Selector::Variable("A".into());
        let bound = selector.apply_subst(&Substitution::singleton("A", Term::atom("bob")));
        assert_eq!(bound, Selector::parameters(["bob"]));
        assert_eq!(bound.fan_out(), FanOut::List);
        let free = selector.apply_subst(&Substitution::new());
        assert_eq!(free, selector);
    }

    #[test]
    fn literal_display() {
        let lit = MentalLiteral::bel(parse_query("on(X, b)").unwrap())
            .with_selector(Selector::All)
            .not();
        assert_eq!(lit.to_string(), "not(all.bel(on(X, b)))");
        let msg = MentalLiteral::received(Selector::Variable("S".into()), Mood::Imperative, Term::atom("p"));
        assert_eq!(msg.to_string(), "received(S, !p)");
    }

    #[test]
    fn literal_vars_include_selector() {
        let lit = MentalLiteral::goal(parse_query("p(X)").unwrap()).with_selector(Selector::Variable("A".into()));
        let vars = lit.vars();
        assert!(vars.contains("A") && vars.contains("X"));
    }

    #[test]
    fn goal_update_collects_goal_literals() {
        let condition = MentalStateCondition::new(vec![
            MentalLiteral::bel(parse_query("block(X)").unwrap()),
            MentalLiteral::a_goal(parse_query("on(X, table)").unwrap()),
            MentalLiteral::goal(parse_query("clear(X)").unwrap()).not(),
        ]);
        assert_eq!(condition.positive_goal_literals().len(), 1);
        assert_eq!(condition.goal_update().add.len(), 1);
        assert_eq!(MentalStateCondition::default().to_string(), "true");
    }

    #[test]
    fn sent_literal_query() {
        let lit = SentLiteral {
            direction: Direction::Sent,
            counterpart: Selector::All,
            mood: Mood::Indicative,
            content: Term::atom("done"),
        };
        assert_eq!(lit.query_for(Term::atom("bob")).to_string(), "sent(bob, indicative(done))");
    }
}
