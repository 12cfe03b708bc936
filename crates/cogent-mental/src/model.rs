//! One agent's bundle of mental bases plus its attention-set stack.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use cogent_kr::{KrInterface, Theory};
use cogent_types::{AgentId, BaseType, CogentError, DatabaseFormula, Query, Substitution, Update};

use crate::{GoalBase, LiteralKind, MentalBase, MentalDiff};

/// Name of the bottom attention set.
pub const MAIN_ATTENTION_SET: &str = "main";

/// The mental bases and goals of one agent, as seen by the owner of the
/// mental state.
///
/// The owner's own model has all four bases; a model of another agent only
/// tracks what the owner believes that agent believes and wants.
pub struct MentalModel {
    agent: AgentId,
    bases: BTreeMap<BaseType, MentalBase>,
    main: GoalBase,
    focused: Vec<GoalBase>,
}

impl MentalModel {
    /// Model of the owner itself: knowledge, belief, percept and message
    /// bases plus the main attention set.
    pub fn own(
        kr: Arc<dyn KrInterface>,
        agent: AgentId,
        knowledge: Theory,
        beliefs: Vec<DatabaseFormula>,
    ) -> Result<Self, CogentError> {
        let mut model = Self::empty(kr.clone(), agent, knowledge.clone());
        model.add_base(kr.as_ref(), BaseType::Knowledge, knowledge.to_vec(), cogent_kr::empty_theory())?;
        model.add_base(kr.as_ref(), BaseType::Belief, beliefs, knowledge.clone())?;
        model.add_base(kr.as_ref(), BaseType::Percept, Vec::new(), knowledge.clone())?;
        model.add_base(kr.as_ref(), BaseType::Message, Vec::new(), knowledge)?;
        Ok(model)
    }

    /// Model of another agent: beliefs and goals only, reasoning with the
    /// owner's knowledge.
    pub fn other(kr: Arc<dyn KrInterface>, agent: AgentId, knowledge: Theory) -> Result<Self, CogentError> {
        let mut model = Self::empty(kr.clone(), agent, knowledge.clone());
        model.add_base(kr.as_ref(), BaseType::Belief, Vec::new(), knowledge)?;
        Ok(model)
    }

    fn empty(kr: Arc<dyn KrInterface>, agent: AgentId, knowledge: Theory) -> Self {
        let main = GoalBase::new(MAIN_ATTENTION_SET, agent.as_str(), kr, knowledge);
        Self {
            agent,
            bases: BTreeMap::new(),
            main,
            focused: Vec::new(),
        }
    }

    fn add_base(
        &mut self,
        kr: &dyn KrInterface,
        base_type: BaseType,
        content: Vec<DatabaseFormula>,
        knowledge: Theory,
    ) -> Result<(), CogentError> {
        let base = MentalBase::new(kr, self.agent.as_str(), base_type, content, knowledge)?;
        self.bases.insert(base_type, base);
        Ok(())
    }

    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    pub fn base(&self, base_type: BaseType) -> Option<&MentalBase> {
        self.bases.get(&base_type)
    }

    /// Mutable access to one base.
    ///
    /// # Errors
    ///
    /// [`CogentError::Database`] when this model has no such base.
    pub fn base_mut(&mut self, base_type: BaseType) -> Result<&mut MentalBase, CogentError> {
        let agent = &self.agent;
        self.bases
            .get_mut(&base_type)
            .ok_or_else(|| CogentError::database(format!("{agent}.{base_type}"), "no such base in this model"))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Attention sets
    // ─────────────────────────────────────────────────────────────────────

    /// The current focus when `use_focus`, otherwise the main attention set.
    pub fn attention_set(&self, use_focus: bool) -> &GoalBase {
        match self.focused.last() {
            Some(top) if use_focus => top,
            _ => &self.main,
        }
    }

    pub fn attention_set_mut(&mut self, use_focus: bool) -> &mut GoalBase {
        match self.focused.last_mut() {
            Some(top) if use_focus => top,
            _ => &mut self.main,
        }
    }

    /// Every attention set, bottom first.
    pub fn attention_sets(&self) -> impl Iterator<Item = &GoalBase> {
        std::iter::once(&self.main).chain(self.focused.iter())
    }

    pub fn attention_sets_mut(&mut self) -> impl Iterator<Item = &mut GoalBase> {
        std::iter::once(&mut self.main).chain(self.focused.iter_mut())
    }

    /// Number of attention sets on the stack (at least 1).
    pub fn focus_depth(&self) -> usize {
        1 + self.focused.len()
    }

    /// An empty attention set for this model, ready to be focused.
    pub fn new_attention_set(&self, name: impl Into<String>) -> GoalBase {
        self.main.sibling(name)
    }

    /// Push `goals` as the new current focus.
    pub fn focus(&mut self, goals: GoalBase) {
        self.focused.push(goals);
    }

    /// Pop the current focus, dropping every goal it held.
    ///
    /// # Errors
    ///
    /// [`CogentError::Query`] when only the main attention set remains.
    pub fn defocus(&mut self) -> Result<MentalDiff, CogentError> {
        let Some(mut top) = self.focused.pop() else {
            return Err(CogentError::Query(format!(
                "cannot defocus the main attention set of {}",
                self.agent
            )));
        };
        top.clean_up()
    }

    /// `true` when the current attention set holds at least one goal.
    pub fn has_goals(&self) -> bool {
        !self.attention_set(true).is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────

    /// Positive answers of a non-message literal against this model.
    pub fn query(&self, kind: &LiteralKind, use_focus: bool) -> Result<BTreeSet<Substitution>, CogentError> {
        match kind {
            LiteralKind::Belief(q) => self.base_query(BaseType::Belief, q),
            LiteralKind::Percept(q) => self.base_query(BaseType::Percept, q),
            LiteralKind::Goal(q) => self.attention_set(use_focus).query(q),
            LiteralKind::AGoal(q) => self.goal_filtered(q, use_focus, false),
            LiteralKind::GoalA(q) => self.goal_filtered(q, use_focus, true),
            LiteralKind::Sent(_) => Err(CogentError::Query(
                "message literals are answered by the message base".to_string(),
            )),
        }
    }

    /// Answers of `query` against the message base.
    pub fn message_query(&self, query: &Query) -> Result<BTreeSet<Substitution>, CogentError> {
        self.base_query(BaseType::Message, query)
    }

    /// Answers of `query` against one base.  A missing base answers nothing.
    pub fn base_query(&self, base_type: BaseType, query: &Query) -> Result<BTreeSet<Substitution>, CogentError> {
        match self.bases.get(&base_type) {
            Some(base) => base.query(query),
            None => Ok(BTreeSet::new()),
        }
    }

    fn believes(&self, query: &Query) -> Result<bool, CogentError> {
        Ok(!self.base_query(BaseType::Belief, query)?.is_empty())
    }

    /// Goal answers whose instantiated query is (`believed`) or is not
    /// (`!believed`) entailed by the beliefs.
    fn goal_filtered(
        &self,
        query: &Query,
        use_focus: bool,
        believed: bool,
    ) -> Result<BTreeSet<Substitution>, CogentError> {
        let mut out = BTreeSet::new();
        for answer in self.attention_set(use_focus).query(query)? {
            let instance = query.apply_subst(&answer);
            if !instance.is_closed() {
                return Err(CogentError::Query(format!(
                    "goal answer {answer} leaves {instance} open"
                )));
            }
            if self.believes(&instance)? == believed {
                out.insert(answer);
            }
        }
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Goal maintenance
    // ─────────────────────────────────────────────────────────────────────

    /// Remove every goal, at every attention-set level, that the beliefs
    /// already entail.  Returns one diff per level that changed together
    /// with the achieved goals.
    pub fn update_goal_state(&mut self) -> Result<Vec<(MentalDiff, Vec<Update>)>, CogentError> {
        let mut achieved_per_level = Vec::new();
        for level in self.attention_sets() {
            let mut achieved = Vec::new();
            for goal in level.goals() {
                if self.believes(&goal.to_query())? {
                    achieved.push(goal);
                }
            }
            achieved_per_level.push(achieved);
        }

        let mut changes = Vec::new();
        for (level, achieved) in self.attention_sets_mut().zip(achieved_per_level) {
            if achieved.is_empty() {
                continue;
            }
            let mut diff = MentalDiff::new(BaseType::Goal, Some(level.name().to_string()));
            for goal in &achieved {
                diff.merge(level.remove(goal)?)?;
            }
            changes.push((diff, achieved));
        }
        Ok(changes)
    }

    /// Release every database of this model.
    pub fn destroy(&mut self) -> Result<(), CogentError> {
        while !self.focused.is_empty() {
            self.defocus()?;
        }
        self.main.clean_up()?;
        for base in self.bases.values_mut() {
            base.destroy()?;
        }
        self.bases.clear();
        Ok(())
    }
}

impl std::fmt::Debug for MentalModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentalModel")
            .field("agent", &self.agent)
            .field("bases", &self.bases.keys().collect::<Vec<_>>())
            .field("focus_depth", &self.focus_depth())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogent_kr::{InMemoryKr, parse_query, parse_theory, parse_update};

    fn model(beliefs: &str) -> MentalModel {
        let knowledge: Theory = Arc::from(parse_theory("clear(X) :- block(X), not(on(_, X)).").unwrap());
        MentalModel::own(
            Arc::new(InMemoryKr::new()),
            AgentId::new("alice"),
            knowledge,
            parse_theory(beliefs).unwrap(),
        )
        .unwrap()
    }

    fn q(src: &str) -> Query {
        parse_query(src).unwrap()
    }

    #[test]
    fn beliefs_reason_with_knowledge() {
        let m = model("block(a). block(b). on(a, b).");
        let answers = m.query(&LiteralKind::Belief(q("clear(X)")), true).unwrap();
        assert_eq!(answers.len(), 1);
        assert!(m.base(BaseType::Knowledge).is_some());
    }

    #[test]
    fn focus_then_defocus_restores_attention_set() {
        let mut m = model("");
        m.attention_set_mut(false).insert(&parse_update("p(1)").unwrap()).unwrap();
        let before = (m.attention_set(true).name().to_string(), m.attention_set(true).goals());

        let mut focus = m.new_attention_set("build");
        focus.insert(&parse_update("q").unwrap()).unwrap();
        m.focus(focus);
        assert_eq!(m.attention_set(true).name(), "build");
        assert_eq!(m.focus_depth(), 2);

        let diff = m.defocus().unwrap();
        assert_eq!(diff.removed.len(), 1);
        let after = (m.attention_set(true).name().to_string(), m.attention_set(true).goals());
        assert_eq!(before, after);
    }

    #[test]
    fn defocus_of_main_is_an_error() {
        let mut m = model("");
        assert!(matches!(m.defocus(), Err(CogentError::Query(_))));
    }

    #[test]
    fn a_goal_and_goal_a_split_on_beliefs() {
        let mut m = model("on(a, b).");
        m.attention_set_mut(false)
            .insert(&parse_update("on(a, b), on(b, c)").unwrap())
            .unwrap();
        let a_goal = m.query(&LiteralKind::AGoal(q("on(X, Y)")), true).unwrap();
        let goal_a = m.query(&LiteralKind::GoalA(q("on(X, Y)")), true).unwrap();
        assert_eq!(a_goal.len(), 1);
        assert_eq!(goal_a.len(), 1);
        assert_eq!(a_goal.iter().next().unwrap().get("X").unwrap().to_string(), "b");
    }

    #[test]
    fn update_goal_state_drops_achieved_goals_only() {
        let mut m = model("p(1). p(2).");
        m.attention_set_mut(false).insert(&parse_update("p(2)").unwrap()).unwrap();
        m.attention_set_mut(false).insert(&parse_update("p(3)").unwrap()).unwrap();
        let changes = m.update_goal_state().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].1, vec![parse_update("p(2)").unwrap()]);
        assert_eq!(m.attention_set(false).goals(), vec![parse_update("p(3)").unwrap()]);
    }

    #[test]
    fn other_agent_models_have_no_percepts() {
        let mut m = MentalModel::other(Arc::new(InMemoryKr::new()), AgentId::new("bob"), cogent_kr::empty_theory())
            .unwrap();
        assert!(m.query(&LiteralKind::Percept(q("p")), true).unwrap().is_empty());
        assert!(m.base_mut(BaseType::Percept).is_err());
        assert!(m.base_mut(BaseType::Belief).is_ok());
    }
}
