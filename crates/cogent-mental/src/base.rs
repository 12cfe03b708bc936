//! A single typed store backed by one KR database.

use std::collections::BTreeSet;

use cogent_kr::{Database, KrInterface, Theory};
use cogent_types::{BaseType, CogentError, DatabaseFormula, Query, Substitution, Update};

use crate::MentalDiff;

/// One knowledge, belief, percept or message store.
///
/// Knowledge bases are immutable: their content is fixed at creation and
/// every insert or delete fails with a database error.
pub struct MentalBase {
    base_type: BaseType,
    database: Box<dyn Database>,
}

impl MentalBase {
    /// Create a store named after `owner` and `base_type`.
    pub fn new(
        kr: &dyn KrInterface,
        owner: &str,
        base_type: BaseType,
        content: Vec<DatabaseFormula>,
        knowledge: Theory,
    ) -> Result<Self, CogentError> {
        let name = format!("{owner}.{base_type}");
        let database = kr.create_database(&name, content, knowledge)?;
        Ok(Self {
            base_type,
            database,
        })
    }

    pub fn base_type(&self) -> BaseType {
        self.base_type
    }

    pub fn name(&self) -> &str {
        self.database.name()
    }

    pub fn query(&self, query: &Query) -> Result<BTreeSet<Substitution>, CogentError> {
        self.database.query(query)
    }

    /// `true` when `query` has at least one answer.
    pub fn holds(&self, query: &Query) -> Result<bool, CogentError> {
        Ok(!self.query(query)?.is_empty())
    }

    pub fn formulas(&self) -> Vec<DatabaseFormula> {
        self.database.formulas()
    }

    pub fn insert_formula(&mut self, formula: &DatabaseFormula) -> Result<MentalDiff, CogentError> {
        self.ensure_mutable("insert")?;
        let mut diff = MentalDiff::new(self.base_type, None);
        if self.database.insert(formula)? {
            diff.added.push(formula.clone());
        }
        Ok(diff)
    }

    pub fn delete_formula(&mut self, formula: &DatabaseFormula) -> Result<MentalDiff, CogentError> {
        self.ensure_mutable("delete")?;
        let mut diff = MentalDiff::new(self.base_type, None);
        if self.database.delete(formula)? {
            diff.removed.push(formula.clone());
        }
        Ok(diff)
    }

    /// Delete the update's delete-list, then insert its add-list.  A formula
    /// on both lists ends up inserted.
    pub fn insert(&mut self, update: &Update) -> Result<MentalDiff, CogentError> {
        let mut diff = MentalDiff::new(self.base_type, None);
        for formula in &update.delete {
            diff.merge(self.delete_formula(formula)?)?;
        }
        for formula in &update.add {
            diff.merge(self.insert_formula(formula)?)?;
        }
        Ok(diff)
    }

    /// The inverse of [`insert`](Self::insert): delete the add-list, then
    /// insert the delete-list.
    pub fn delete(&mut self, update: &Update) -> Result<MentalDiff, CogentError> {
        let mut diff = MentalDiff::new(self.base_type, None);
        for formula in &update.add {
            diff.merge(self.delete_formula(formula)?)?;
        }
        for formula in &update.delete {
            diff.merge(self.insert_formula(formula)?)?;
        }
        Ok(diff)
    }

    /// Release the underlying database.
    pub fn destroy(&mut self) -> Result<(), CogentError> {
        self.database.destroy()
    }

    fn ensure_mutable(&self, operation: &str) -> Result<(), CogentError> {
        if self.base_type == BaseType::Knowledge {
            Err(CogentError::database(
                self.name(),
                format!("cannot {operation} into an immutable knowledge base"),
            ))
        } else {
            Ok(())
        }
    }
}

impl std::fmt::Debug for MentalBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MentalBase")
            .field("base_type", &self.base_type)
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cogent_kr::{InMemoryKr, empty_theory, parse_clause, parse_query, parse_theory, parse_update};

    fn beliefs(src: &str) -> MentalBase {
        MentalBase::new(
            &InMemoryKr::new(),
            "alice",
            BaseType::Belief,
            parse_theory(src).unwrap(),
            empty_theory(),
        )
        .unwrap()
    }

    #[test]
    fn insert_update_deletes_before_adding() {
        let mut base = beliefs("on(a, table).");
        let diff = base.insert(&parse_update("on(a, b), not(on(a, table))").unwrap()).unwrap();
        assert_eq!(diff.added.len(), 1);
        assert_eq!(diff.removed.len(), 1);
        assert!(base.holds(&parse_query("on(a, b)").unwrap()).unwrap());
        assert!(!base.holds(&parse_query("on(a, table)").unwrap()).unwrap());
    }

    #[test]
    fn formula_on_both_lists_ends_up_inserted() {
        let mut base = beliefs("");
        let p = parse_clause("p").unwrap();
        let update = Update::new(vec![p.clone()], vec![p.clone()]);
        base.insert(&update).unwrap();
        assert_eq!(base.formulas(), vec![p]);
    }

    #[test]
    fn delete_update_is_inverse() {
        let mut base = beliefs("p.");
        let diff = base.delete(&parse_update("p, not(q)").unwrap()).unwrap();
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.added.len(), 1);
        assert!(base.holds(&parse_query("q").unwrap()).unwrap());
    }

    #[test]
    fn repeated_insert_reports_nothing() {
        let mut base = beliefs("p.");
        assert!(base.insert_formula(&parse_clause("p").unwrap()).unwrap().is_empty());
    }

    #[test]
    fn knowledge_is_immutable() {
        let mut base = MentalBase::new(
            &InMemoryKr::new(),
            "alice",
            BaseType::Knowledge,
            parse_theory("block(a).").unwrap(),
            empty_theory(),
        )
        .unwrap();
        let err = base.insert_formula(&parse_clause("block(b)").unwrap()).unwrap_err();
        assert!(matches!(err, CogentError::Database { .. }));
        assert!(base.delete_formula(&parse_clause("block(a)").unwrap()).is_err());
        assert_eq!(base.name(), "alice.knowledgebase");
    }
}
