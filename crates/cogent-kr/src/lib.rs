//! `cogent-kr` – The Knowledge Representation layer.
//!
//! The mental-state engine never evaluates logic itself.  It talks to a KR
//! engine through two capability traits:
//!
//! - [`KrInterface`] – creates databases for a given KR language.
//! - [`Database`] – one store: query, insert, delete, destroy.
//!
//! # Modules
//!
//! - [`memory`] – [`InMemoryKr`][memory::InMemoryKr]: a small Prolog-like
//!   engine (facts, rules, negation as failure, comparison built-ins) that
//!   keeps every database in process memory.
//! - [`parse`] – text syntax for terms, queries, updates and clauses, used by
//!   program builders and tests.

pub mod memory;
pub mod parse;

use std::collections::BTreeSet;
use std::sync::Arc;

use cogent_types::{CogentError, DatabaseFormula, Query, Substitution};

pub use memory::{InMemoryDatabase, InMemoryKr};
pub use parse::{parse_clause, parse_query, parse_term, parse_theory, parse_update};

/// Immutable, shared set of formulas visible to every database of an agent
/// (its knowledge).
pub type Theory = Arc<[DatabaseFormula]>;

/// A theory without formulas.
pub fn empty_theory() -> Theory {
    Arc::from(Vec::new())
}

/// Factory for databases of one KR language.
pub trait KrInterface: Send + Sync {
    /// Human-readable name of the KR language.
    fn name(&self) -> &str;

    /// Create a database holding `content` that can also see `knowledge`.
    ///
    /// # Errors
    ///
    /// Returns [`CogentError::Database`] when the store cannot be created.
    fn create_database(
        &self,
        name: &str,
        content: Vec<DatabaseFormula>,
        knowledge: Theory,
    ) -> Result<Box<dyn Database>, CogentError>;
}

/// One KR store.
pub trait Database: Send + Sync {
    fn name(&self) -> &str;

    /// All answers to `query`, restricted to the query's variables.  The
    /// empty set means "no answer".
    fn query(&self, query: &Query) -> Result<BTreeSet<Substitution>, CogentError>;

    /// Add `formula`.  Returns `false` when it was already present.
    fn insert(&mut self, formula: &DatabaseFormula) -> Result<bool, CogentError>;

    /// Remove `formula`.  Returns `false` when it was not present.
    fn delete(&mut self, formula: &DatabaseFormula) -> Result<bool, CogentError>;

    /// The database's own formulas (knowledge excluded), in insertion order.
    fn formulas(&self) -> Vec<DatabaseFormula>;

    /// Release the store.  Every later operation fails.
    fn destroy(&mut self) -> Result<(), CogentError>;
}
