//! In-process KR engine.
//!
//! Every [`InMemoryDatabase`] keeps its clauses in a vector and answers
//! queries by SLD resolution over its own clauses plus the shared knowledge
//! theory.
//!
//! ## Semantics
//!
//! * Clauses are tried in order: knowledge first, then the database's own
//!   formulas in insertion order.
//! * Every clause use gets fresh variables (`X` becomes `X#17`), so clause
//!   variables never capture query variables.
//! * `not(A)` succeeds when `A` has no answer (negation as failure).
//! * Built-ins: `true`, `X = Y`, `X \= Y`, and `<`, `>`, `=<`, `>=` on
//!   integers.  Comparing unbound or non-integer arguments is a query error.
//! * Resolution depth is bounded; exceeding it is a query error rather than
//!   a stack overflow.
//! * Facts must be ground.  Inserting `p(Y)`, or creating a database whose
//!   knowledge holds such a fact, is a database error.
//!
//! # Example
//!
//! ```
//! use cogent_kr::{empty_theory, parse_query, parse_theory, Database, InMemoryKr, KrInterface};
//!
//! let kr = InMemoryKr::new();
//! let facts = parse_theory("on(a, b). on(b, table).").unwrap();
//! let db = kr.create_database("beliefs", facts, empty_theory()).unwrap();
//!
//! let answers = db.query(&parse_query("on(a, X)").unwrap()).unwrap();
//! assert_eq!(answers.len(), 1);
//! ```

use std::collections::BTreeSet;

use cogent_types::{CogentError, DatabaseFormula, KrLiteral, Query, Substitution, Term, unify};
use tracing::trace;

use crate::{Database, KrInterface, Theory};

/// Default bound on resolution depth.
const DEFAULT_MAX_DEPTH: usize = 1024;

// ─────────────────────────────────────────────────────────────────────────────
// InMemoryKr
// ─────────────────────────────────────────────────────────────────────────────

/// Factory for [`InMemoryDatabase`]s.
#[derive(Debug, Clone)]
pub struct InMemoryKr {
    max_depth: usize,
}

impl InMemoryKr {
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the resolution depth bound.
    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }
}

impl Default for InMemoryKr {
    fn default() -> Self {
        Self::new()
    }
}

impl KrInterface for InMemoryKr {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn create_database(
        &self,
        name: &str,
        content: Vec<DatabaseFormula>,
        knowledge: Theory,
    ) -> Result<Box<dyn Database>, CogentError> {
        if let Some(fact) = knowledge.iter().find(|f| !is_ground_or_rule(f)) {
            return Err(non_ground(name, fact));
        }
        let mut db = InMemoryDatabase {
            name: name.to_string(),
            content: Vec::with_capacity(content.len()),
            knowledge,
            max_depth: self.max_depth,
            destroyed: false,
        };
        for formula in content {
            db.insert(&formula)?;
        }
        trace!(database = name, "created in-memory database");
        Ok(Box::new(db))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// InMemoryDatabase
// ─────────────────────────────────────────────────────────────────────────────

/// A clause store answered by SLD resolution.
#[derive(Debug)]
pub struct InMemoryDatabase {
    name: String,
    content: Vec<DatabaseFormula>,
    knowledge: Theory,
    max_depth: usize,
    destroyed: bool,
}

impl InMemoryDatabase {
    fn ensure_alive(&self) -> Result<(), CogentError> {
        if self.destroyed {
            Err(CogentError::database(&self.name, "database has been destroyed"))
        } else {
            Ok(())
        }
    }
}

impl Database for InMemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn query(&self, query: &Query) -> Result<BTreeSet<Substitution>, CogentError> {
        self.ensure_alive()?;
        let clauses: Vec<&DatabaseFormula> =
            self.knowledge.iter().chain(self.content.iter()).collect();
        let mut solver = Solver {
            clauses,
            counter: 0,
            max_depth: self.max_depth,
        };
        let mut raw = Vec::new();
        solver.solve(&query.literals, Substitution::new(), 0, &mut raw)?;
        let vars = query.vars();
        Ok(raw.into_iter().map(|s| s.restrict(&vars)).collect())
    }

    fn insert(&mut self, formula: &DatabaseFormula) -> Result<bool, CogentError> {
        self.ensure_alive()?;
        if !is_ground_or_rule(formula) {
            return Err(non_ground(&self.name, formula));
        }
        if self.content.contains(formula) {
            return Ok(false);
        }
        self.content.push(formula.clone());
        Ok(true)
    }

    fn delete(&mut self, formula: &DatabaseFormula) -> Result<bool, CogentError> {
        self.ensure_alive()?;
        match self.content.iter().position(|f| f == formula) {
            Some(index) => {
                self.content.remove(index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn formulas(&self) -> Vec<DatabaseFormula> {
        self.content.clone()
    }

    fn destroy(&mut self) -> Result<(), CogentError> {
        self.ensure_alive()?;
        self.content.clear();
        self.destroyed = true;
        Ok(())
    }
}

fn is_ground_or_rule(formula: &DatabaseFormula) -> bool {
    !formula.is_fact() || formula.head.is_ground()
}

fn non_ground(database: &str, fact: &DatabaseFormula) -> CogentError {
    CogentError::database(database, format!("fact {fact} is not ground"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Resolution
// ─────────────────────────────────────────────────────────────────────────────

struct Solver<'a> {
    clauses: Vec<&'a DatabaseFormula>,
    counter: usize,
    max_depth: usize,
}

impl Solver<'_> {
    fn solve(
        &mut self,
        goals: &[KrLiteral],
        subst: Substitution,
        depth: usize,
        out: &mut Vec<Substitution>,
    ) -> Result<(), CogentError> {
        if depth > self.max_depth {
            return Err(CogentError::Query(format!(
                "resolution depth {} exceeded",
                self.max_depth
            )));
        }
        let Some((first, rest)) = goals.split_first() else {
            out.push(subst);
            return Ok(());
        };
        let atom = subst.apply(&first.atom);

        if !first.positive {
            let mut probe = Vec::new();
            self.solve(&[KrLiteral::positive(atom)], subst.clone(), depth + 1, &mut probe)?;
            if probe.is_empty() {
                self.solve(rest, subst, depth + 1, out)?;
            }
            return Ok(());
        }

        if let Some(outcome) = builtin(&atom, &subst)? {
            if let Some(next) = outcome {
                self.solve(rest, next, depth + 1, out)?;
            }
            return Ok(());
        }

        let signature = match atom.signature() {
            Some(sig) => sig,
            None if atom.is_var() => {
                return Err(CogentError::Query(format!(
                    "cannot resolve unbound goal {atom}"
                )));
            }
            None => return Ok(()),
        };

        let candidates: Vec<&DatabaseFormula> = self
            .clauses
            .iter()
            .copied()
            .filter(|c| c.head.signature() == Some(signature))
            .collect();
        for clause in candidates {
            self.counter += 1;
            let renamed = clause.rename(&format!("#{}", self.counter));
            let mut extended = subst.clone();
            if unify(&atom, &renamed.head, &mut extended) {
                let mut next_goals = renamed.body;
                next_goals.extend_from_slice(rest);
                self.solve(&next_goals, extended, depth + 1, out)?;
            }
        }
        Ok(())
    }
}

/// Evaluate a built-in predicate.
///
/// Returns `Ok(None)` when `atom` is not a built-in, `Ok(Some(None))` when the
/// built-in fails and `Ok(Some(Some(s)))` when it succeeds with `s`.
fn builtin(atom: &Term, subst: &Substitution) -> Result<Option<Option<Substitution>>, CogentError> {
    let Some((name, arity)) = atom.signature() else {
        return Ok(None);
    };
    match (name, arity) {
        ("true", 0) => Ok(Some(Some(subst.clone()))),
        ("=", 2) => {
            let mut extended = subst.clone();
            let args = atom.args();
            if unify(&args[0], &args[1], &mut extended) {
                Ok(Some(Some(extended)))
            } else {
                Ok(Some(None))
            }
        }
        ("\\=", 2) => {
            let mut probe = subst.clone();
            let args = atom.args();
            if unify(&args[0], &args[1], &mut probe) {
                Ok(Some(None))
            } else {
                Ok(Some(Some(subst.clone())))
            }
        }
        ("<", 2) | (">", 2) | ("=<", 2) | (">=", 2) => {
            let args = atom.args();
            let (Term::Int(a), Term::Int(b)) = (subst.apply(&args[0]), subst.apply(&args[1])) else {
                return Err(CogentError::Query(format!(
                    "arguments of {atom} are not sufficiently instantiated integers"
                )));
            };
            let holds = match name {
                "<" => a < b,
                ">" => a > b,
                "=<" => a <= b,
                _ => a >= b,
            };
            Ok(Some(holds.then(|| subst.clone())))
        }
        _ => Ok(None),
    }
}
