//! [`Environment`] – the world agents perceive and act in.
//!
//! Percept fetches and actions are awaited inline by the agent's reasoning
//! cycle and are expected to return quickly.  Failures are reported as
//! [`CogentError::ActionFailed`]; the severity decides whether the agent
//! warns and continues ([`Severity::Soft`]) or is killed
//! ([`Severity::Hard`]).

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use cogent_types::{AgentId, CogentError, DatabaseFormula, Severity, Term};

/// Percepts that appeared and disappeared since the previous fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerceptUpdate {
    pub add: Vec<DatabaseFormula>,
    pub delete: Vec<DatabaseFormula>,
}

impl PerceptUpdate {
    pub fn new(add: Vec<DatabaseFormula>, delete: Vec<DatabaseFormula>) -> Self {
        Self { add, delete }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.delete.is_empty()
    }

    pub fn merge(&mut self, other: PerceptUpdate) {
        self.add.extend(other.add);
        self.delete.extend(other.delete);
    }
}

#[async_trait]
pub trait Environment: Send + Sync {
    /// Percept changes for `agent` since its last fetch.
    async fn get_percepts(&self, agent: &AgentId) -> Result<PerceptUpdate, CogentError>;

    /// Perform `action` on behalf of `agent`.
    async fn perform_action(&self, agent: &AgentId, action: &Term) -> Result<(), CogentError>;

    /// Reward signal for `agent`, when the environment provides one.
    async fn get_reward(&self, _agent: &AgentId) -> Option<f64> {
        None
    }

    async fn dispose(&self) -> Result<(), CogentError> {
        Ok(())
    }
}

/// Used when no environment is attached: nothing is ever perceived and every
/// external action fails hard.
#[derive(Debug, Default)]
pub struct NoEnvironment;

#[async_trait]
impl Environment for NoEnvironment {
    async fn get_percepts(&self, _agent: &AgentId) -> Result<PerceptUpdate, CogentError> {
        Ok(PerceptUpdate::default())
    }

    async fn perform_action(&self, _agent: &AgentId, action: &Term) -> Result<(), CogentError> {
        Err(CogentError::ActionFailed {
            action: action.to_string(),
            reason: "no environment attached".to_string(),
            severity: Severity::Hard,
        })
    }
}

/// In-process environment driven by the host: percepts are queued per agent
/// with [`push_percepts`](Self::push_percepts) and performed actions are
/// recorded for inspection.
#[derive(Debug, Default)]
pub struct ScriptedEnvironment {
    pending: Mutex<HashMap<AgentId, PerceptUpdate>>,
    performed: Mutex<Vec<(AgentId, Term)>>,
    paused: Mutex<bool>,
}

impl ScriptedEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue percept changes for the next fetch of `agent`.
    pub fn push_percepts(&self, agent: &AgentId, update: PerceptUpdate) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(agent.clone())
            .or_default()
            .merge(update);
    }

    /// While paused every action fails softly.
    pub fn set_paused(&self, paused: bool) {
        *self.paused.lock().unwrap_or_else(PoisonError::into_inner) = paused;
    }

    /// Every action performed so far, oldest first.
    pub fn performed(&self) -> Vec<(AgentId, Term)> {
        self.performed.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Environment for ScriptedEnvironment {
    async fn get_percepts(&self, agent: &AgentId) -> Result<PerceptUpdate, CogentError> {
        Ok(self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(agent)
            .unwrap_or_default())
    }

    async fn perform_action(&self, agent: &AgentId, action: &Term) -> Result<(), CogentError> {
        if *self.paused.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(CogentError::ActionFailed {
                action: action.to_string(),
                reason: "environment paused".to_string(),
                severity: Severity::Soft,
            });
        }
        self.performed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((agent.clone(), action.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(name: &str) -> DatabaseFormula {
        DatabaseFormula::fact(Term::atom(name))
    }

    #[tokio::test]
    async fn scripted_percepts_are_consumed_once() {
        let env = ScriptedEnvironment::new();
        let alice = AgentId::new("alice");
        env.push_percepts(&alice, PerceptUpdate::new(vec![fact("light")], Vec::new()));
        env.push_percepts(&alice, PerceptUpdate::new(Vec::new(), vec![fact("dark")]));

        let update = env.get_percepts(&alice).await.unwrap();
        assert_eq!(update.add, vec![fact("light")]);
        assert_eq!(update.delete, vec![fact("dark")]);
        assert!(env.get_percepts(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn paused_environment_fails_softly() {
        let env = ScriptedEnvironment::new();
        let alice = AgentId::new("alice");
        env.set_paused(true);
        let err = env.perform_action(&alice, &Term::atom("go")).await.unwrap_err();
        assert!(!err.is_fatal());

        env.set_paused(false);
        env.perform_action(&alice, &Term::atom("go")).await.unwrap();
        assert_eq!(env.performed(), vec![(alice, Term::atom("go"))]);
    }

    #[tokio::test]
    async fn no_environment_rejects_actions() {
        let err = NoEnvironment
            .perform_action(&AgentId::new("a"), &Term::atom("go"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(NoEnvironment.get_reward(&AgentId::new("a")).await, None);
    }
}
