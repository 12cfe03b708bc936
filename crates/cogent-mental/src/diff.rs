//! Change records produced by every mutating mental-state operation.

use std::fmt;

use cogent_types::{BaseType, CogentError, DatabaseFormula};
use serde::{Deserialize, Serialize};

/// What one mutation did to one store.
///
/// `focus` names the attention set for goal-base changes and is `None` for
/// every other store (or for a goal change spanning several attention sets).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentalDiff {
    pub base_type: BaseType,
    pub focus: Option<String>,
    pub added: Vec<DatabaseFormula>,
    pub removed: Vec<DatabaseFormula>,
}

impl MentalDiff {
    pub fn new(base_type: BaseType, focus: Option<String>) -> Self {
        Self {
            base_type,
            focus,
            added: Vec::new(),
            removed: Vec::new(),
        }
    }

    /// `true` when the operation changed nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Fold `other` into this record.
    ///
    /// # Errors
    ///
    /// [`CogentError::IncompatibleMerge`] when the base types differ, or when
    /// both records name a focus and the names differ.
    pub fn merge(&mut self, other: MentalDiff) -> Result<(), CogentError> {
        if self.base_type != other.base_type {
            return Err(CogentError::IncompatibleMerge(format!(
                "cannot merge {} change into {} change",
                other.base_type, self.base_type
            )));
        }
        match (&self.focus, &other.focus) {
            (Some(mine), Some(theirs)) if mine != theirs => {
                return Err(CogentError::IncompatibleMerge(format!(
                    "cannot merge change on attention set {theirs} into {mine}"
                )));
            }
            (None, Some(_)) => self.focus = other.focus,
            _ => {}
        }
        self.added.extend(other.added);
        self.removed.extend(other.removed);
        Ok(())
    }
}

impl fmt::Display for MentalDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base_type)?;
        if let Some(focus) = &self.focus {
            write!(f, "[{focus}]")?;
        }
        write!(f, " +{} -{}", self.added.len(), self.removed.len())
    }
}
