//! KR-level formulas: literals, queries, updates and database formulas.
//!
//! These are the opaque values the mental-state engine hands to a KR
//! engine.  The engine decides what they mean; the mental state only relies
//! on the conversions between them:
//!
//! | From | Method | To |
//! |---|---|---|
//! | [`Update`] | [`Update::to_query`] | positive literals for the add-list, negated literals for the delete-list |
//! | [`Query`] | [`Query::to_update`] | the inverse of the above |
//! | [`DatabaseFormula`] | [`DatabaseFormula::to_query`] / [`DatabaseFormula::to_update`] | single-formula query / update |

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::term::{Substitution, Term};

// ─────────────────────────────────────────────────────────────────────────────
// KrLiteral
// ─────────────────────────────────────────────────────────────────────────────

/// A possibly negated atomic formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KrLiteral {
    pub positive: bool,
    pub atom: Term,
}

impl KrLiteral {
    pub fn positive(atom: Term) -> Self {
        Self { positive: true, atom }
    }

    pub fn negative(atom: Term) -> Self {
        Self {
            positive: false,
            atom,
        }
    }

    pub fn apply_subst(&self, subst: &Substitution) -> Self {
        Self {
            positive: self.positive,
            atom: subst.apply(&self.atom),
        }
    }
}

impl fmt::Display for KrLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            write!(f, "{}", self.atom)
        } else {
            write!(f, "not({})", self.atom)
        }
    }
}

fn write_conjunction(f: &mut fmt::Formatter<'_>, literals: &[KrLiteral]) -> fmt::Result {
    if literals.is_empty() {
        return write!(f, "true");
    }
    for (i, literal) in literals.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{literal}")?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Query
// ─────────────────────────────────────────────────────────────────────────────

/// A conjunctive query.  The empty query is `true`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Query {
    pub literals: Vec<KrLiteral>,
}

impl Query {
    pub fn new(literals: Vec<KrLiteral>) -> Self {
        Self { literals }
    }

    /// A query consisting of one positive atom.
    pub fn atom(atom: Term) -> Self {
        Self {
            literals: vec![KrLiteral::positive(atom)],
        }
    }

    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for literal in &self.literals {
            literal.atom.collect_vars(&mut out);
        }
        out
    }

    /// `true` when the query contains no free variables.
    pub fn is_closed(&self) -> bool {
        self.literals.iter().all(|l| l.atom.is_ground())
    }

    pub fn apply_subst(&self, subst: &Substitution) -> Self {
        Self {
            literals: self.literals.iter().map(|l| l.apply_subst(subst)).collect(),
        }
    }

    /// Positive literals become additions, negated literals deletions.
    pub fn to_update(&self) -> Update {
        let mut update = Update::default();
        for literal in &self.literals {
            let formula = DatabaseFormula::fact(literal.atom.clone());
            if literal.positive {
                update.add.push(formula);
            } else {
                update.delete.push(formula);
            }
        }
        update
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_conjunction(f, &self.literals)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DatabaseFormula
// ─────────────────────────────────────────────────────────────────────────────

/// A clause `head :- body`.  A clause with an empty body is a fact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseFormula {
    pub head: Term,
    pub body: Vec<KrLiteral>,
}

impl DatabaseFormula {
    pub fn fact(head: Term) -> Self {
        Self {
            head,
            body: Vec::new(),
        }
    }

    pub fn rule(head: Term, body: Vec<KrLiteral>) -> Self {
        Self { head, body }
    }

    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = self.head.vars();
        for literal in &self.body {
            literal.atom.collect_vars(&mut out);
        }
        out
    }

    pub fn apply_subst(&self, subst: &Substitution) -> Self {
        Self {
            head: subst.apply(&self.head),
            body: self.body.iter().map(|l| l.apply_subst(subst)).collect(),
        }
    }

    /// Rename every variable by appending `suffix`.
    pub fn rename(&self, suffix: &str) -> Self {
        Self {
            head: self.head.rename(suffix),
            body: self
                .body
                .iter()
                .map(|l| KrLiteral {
                    positive: l.positive,
                    atom: l.atom.rename(suffix),
                })
                .collect(),
        }
    }

    /// The head as a single-atom query.
    pub fn to_query(&self) -> Query {
        Query::atom(self.head.clone())
    }

    /// An update adding this formula.
    pub fn to_update(&self) -> Update {
        Update {
            add: vec![self.clone()],
            delete: Vec::new(),
        }
    }
}

impl fmt::Display for DatabaseFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            write_conjunction(f, &self.body)?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Update
// ─────────────────────────────────────────────────────────────────────────────

/// A database change: formulas to add and formulas to delete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Update {
    pub add: Vec<DatabaseFormula>,
    pub delete: Vec<DatabaseFormula>,
}

impl Update {
    pub fn new(add: Vec<DatabaseFormula>, delete: Vec<DatabaseFormula>) -> Self {
        Self { add, delete }
    }

    /// An update adding the given facts.
    pub fn facts(atoms: Vec<Term>) -> Self {
        Self {
            add: atoms.into_iter().map(DatabaseFormula::fact).collect(),
            delete: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty()
    }

    pub fn vars(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for formula in self.add.iter().chain(self.delete.iter()) {
            out.extend(formula.vars());
        }
        out
    }

    pub fn is_closed(&self) -> bool {
        self.vars().is_empty()
    }

    pub fn apply_subst(&self, subst: &Substitution) -> Self {
        Self {
            add: self.add.iter().map(|f| f.apply_subst(subst)).collect(),
            delete: self.delete.iter().map(|f| f.apply_subst(subst)).collect(),
        }
    }

    /// Positive literals for additions, negated literals for deletions.
    pub fn to_query(&self) -> Query {
        let positive = self
            .add
            .iter()
            .map(|f| KrLiteral::positive(f.head.clone()));
        let negative = self
            .delete
            .iter()
            .map(|f| KrLiteral::negative(f.head.clone()));
        Query::new(positive.chain(negative).collect())
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_query())
    }
}
