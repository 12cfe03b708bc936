//! Goals and attention sets.
//!
//! Every goal lives in its own KR database so that asking whether a goal is
//! pursued never mixes the content of unrelated goals: holding `on(a, b)`
//! and `on(b, c)` as two goals is not the same as holding the single goal
//! `on(a, b), on(b, c)`.

use std::collections::BTreeSet;
use std::sync::Arc;

use cogent_kr::{Database, KrInterface, Theory};
use cogent_types::{BaseType, CogentError, Query, Substitution, Update};

use crate::MentalDiff;

// ─────────────────────────────────────────────────────────────────────────────
// SingleGoal
// ─────────────────────────────────────────────────────────────────────────────

/// One goal with its own database.
pub struct SingleGoal {
    goal: Update,
    database: Box<dyn Database>,
}

impl SingleGoal {
    fn new(kr: &dyn KrInterface, name: &str, goal: Update, knowledge: Theory) -> Result<Self, CogentError> {
        let database = kr.create_database(name, goal.add.clone(), knowledge)?;
        Ok(Self { goal, database })
    }

    pub fn goal(&self) -> &Update {
        &self.goal
    }

    pub fn query(&self, query: &Query) -> Result<BTreeSet<Substitution>, CogentError> {
        self.database.query(query)
    }

    fn destroy(&mut self) -> Result<(), CogentError> {
        self.database.destroy()
    }
}

impl std::fmt::Debug for SingleGoal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SingleGoal({})", self.goal)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// GoalBase
// ─────────────────────────────────────────────────────────────────────────────

/// One attention set: an insertion-ordered set of distinct goals.
pub struct GoalBase {
    name: String,
    owner: String,
    kr: Arc<dyn KrInterface>,
    knowledge: Theory,
    goals: Vec<SingleGoal>,
    created: usize,
}

impl GoalBase {
    pub fn new(name: impl Into<String>, owner: impl Into<String>, kr: Arc<dyn KrInterface>, knowledge: Theory) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            kr,
            knowledge,
            goals: Vec::new(),
            created: 0,
        }
    }

    /// An empty attention set sharing this one's owner, engine and knowledge.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.owner.clone(), self.kr.clone(), self.knowledge.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.goals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.goals.is_empty()
    }

    pub fn contains(&self, goal: &Update) -> bool {
        self.goals.iter().any(|g| &g.goal == goal)
    }

    /// The goals in insertion order.
    pub fn goals(&self) -> Vec<Update> {
        self.goals.iter().map(|g| g.goal.clone()).collect()
    }

    /// Add `goal` unless an equal goal is already present.
    pub fn insert(&mut self, goal: &Update) -> Result<MentalDiff, CogentError> {
        let mut diff = self.diff();
        if goal.add.is_empty() {
            return Err(CogentError::Query(format!("cannot adopt empty goal {goal}")));
        }
        if self.contains(goal) {
            return Ok(diff);
        }
        self.created += 1;
        let db_name = format!("{}.{}.goal{}", self.owner, self.name, self.created);
        self.goals
            .push(SingleGoal::new(self.kr.as_ref(), &db_name, goal.clone(), self.knowledge.clone())?);
        diff.added.extend(goal.add.iter().cloned());
        Ok(diff)
    }

    /// Remove every goal that entails `target`.
    pub fn drop(&mut self, target: &Update) -> Result<MentalDiff, CogentError> {
        let query = target.to_query();
        let mut matching = Vec::new();
        for (index, goal) in self.goals.iter().enumerate() {
            if !goal.query(&query)?.is_empty() {
                matching.push(index);
            }
        }
        self.remove_indices(&matching)
    }

    /// Remove exactly the goal equal to `goal`, if present.
    pub fn remove(&mut self, goal: &Update) -> Result<MentalDiff, CogentError> {
        let matching: Vec<usize> = self
            .goals
            .iter()
            .position(|g| &g.goal == goal)
            .into_iter()
            .collect();
        self.remove_indices(&matching)
    }

    /// Answers of `query` against the goals.  With several goals the answer
    /// sets of every goal are united: any single goal may satisfy the query.
    pub fn query(&self, query: &Query) -> Result<BTreeSet<Substitution>, CogentError> {
        if let [only] = self.goals.as_slice() {
            return only.query(query);
        }
        let mut answers = BTreeSet::new();
        for goal in &self.goals {
            answers.extend(goal.query(query)?);
        }
        Ok(answers)
    }

    /// Answers of `query` per goal, in goal order.  Goals without an answer
    /// are omitted.
    pub fn query_per_goal(&self, query: &Query) -> Result<Vec<(Update, BTreeSet<Substitution>)>, CogentError> {
        let mut out = Vec::new();
        for goal in &self.goals {
            let answers = goal.query(query)?;
            if !answers.is_empty() {
                out.push((goal.goal.clone(), answers));
            }
        }
        Ok(out)
    }

    /// Remove and destroy every goal.
    pub fn clean_up(&mut self) -> Result<MentalDiff, CogentError> {
        let all: Vec<usize> = (0..self.goals.len()).collect();
        self.remove_indices(&all)
    }

    fn remove_indices(&mut self, indices: &[usize]) -> Result<MentalDiff, CogentError> {
        let mut diff = self.diff();
        for &index in indices.iter().rev() {
            let mut goal = self.goals.remove(index);
            goal.destroy()?;
            diff.removed.splice(0..0, goal.goal.add);
        }
        Ok(diff)
    }

    fn diff(&self) -> MentalDiff {
        MentalDiff::new(BaseType::Goal, Some(self.name.clone()))
    }
}

impl std::fmt::Debug for GoalBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoalBase")
            .field("name", &self.name)
            .field("goals", &self.goals)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogent_kr::{InMemoryKr, empty_theory, parse_query, parse_update};

    fn goal_base() -> GoalBase {
        GoalBase::new("main", "alice", Arc::new(InMemoryKr::new()), empty_theory())
    }

    fn u(src: &str) -> Update {
        parse_update(src).unwrap()
    }

    #[test]
    fn adopting_twice_is_idempotent() {
        let mut gb = goal_base();
        assert!(!gb.insert(&u("p(2)")).unwrap().is_empty());
        let second = gb.insert(&u("p(2)")).unwrap();
        assert!(second.is_empty());
        assert_eq!(gb.len(), 1);
        assert_eq!(second.focus.as_deref(), Some("main"));
    }

    #[test]
    fn drop_removes_entailing_goals_only() {
        let mut gb = goal_base();
        gb.insert(&u("on(a, b), on(b, c)")).unwrap();
        gb.insert(&u("on(a, b)")).unwrap();
        gb.insert(&u("on(c, d)")).unwrap();

        let diff = gb.drop(&u("on(a, b)")).unwrap();
        assert_eq!(diff.removed.len(), 3);
        assert_eq!(gb.goals(), vec![u("on(c, d)")]);
    }

    #[test]
    fn dropping_absent_goal_is_noop() {
        let mut gb = goal_base();
        gb.insert(&u("p(1)")).unwrap();
        assert!(gb.drop(&u("q")).unwrap().is_empty());
        assert_eq!(gb.len(), 1);
    }

    #[test]
    fn query_unites_goals_without_conjoining_them() {
        let mut gb = goal_base();
        gb.insert(&u("on(a, b)")).unwrap();
        gb.insert(&u("on(b, c)")).unwrap();
        assert_eq!(gb.query(&parse_query("on(X, Y)").unwrap()).unwrap().len(), 2);
        // No single goal holds both facts.
        assert!(gb.query(&parse_query("on(a, b), on(b, c)").unwrap()).unwrap().is_empty());
        assert_eq!(gb.query_per_goal(&parse_query("on(a, X)").unwrap()).unwrap().len(), 1);
    }

    #[test]
    fn empty_goal_is_rejected() {
        let mut gb = goal_base();
        assert!(gb.insert(&Update::default()).is_err());
    }

    #[test]
    fn clean_up_empties_the_set() {
        let mut gb = goal_base();
        gb.insert(&u("p")).unwrap();
        gb.insert(&u("q")).unwrap();
        let diff = gb.clean_up().unwrap();
        assert_eq!(diff.removed.len(), 2);
        assert!(gb.is_empty());
    }

    #[test]
    fn remove_exact_goal() {
        let mut gb = goal_base();
        gb.insert(&u("p, q")).unwrap();
        assert!(gb.remove(&u("p")).unwrap().is_empty());
        assert_eq!(gb.remove(&u("p, q")).unwrap().removed.len(), 2);
    }
}
