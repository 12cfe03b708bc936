//! Selector resolution.
//!
//! Turns a [`Selector`] into the ordered list of agents whose models answer
//! a literal or receive an update:
//!
//! | Selector | Agents |
//! |---|---|
//! | `self`, `this` | me |
//! | `all`, `some` | every known agent, me first |
//! | `allother`, `someother` | every known agent except me |
//! | free variable `X` | every known agent, me first; answers bind `X` |
//! | bound variable / parameter list | the named agents, known or not |

use cogent_types::{AgentId, CogentError, Term};

use crate::Selector;

/// Outcome of resolving a selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Agents to consult, in order.  May name agents without a model yet.
    pub agents: Vec<AgentId>,
    /// Set when the selector was a free variable that answers must bind.
    pub variable: Option<String>,
}

/// Resolve `selector` for `me`, given the known agents in order (me first).
///
/// # Errors
///
/// [`CogentError::Query`] when a parameter is not a ground agent name.
pub fn resolve(selector: &Selector, me: &AgentId, known: &[AgentId]) -> Result<Resolution, CogentError> {
    let everyone = || {
        let mut agents = vec![me.clone()];
        agents.extend(known.iter().filter(|a| *a != me).cloned());
        agents
    };
    let others = || known.iter().filter(|a| *a != me).cloned().collect::<Vec<_>>();

    let resolution = match selector {
        Selector::SelfAgent | Selector::This => Resolution {
            agents: vec![me.clone()],
            variable: None,
        },
        Selector::All | Selector::Some => Resolution {
            agents: everyone(),
            variable: None,
        },
        Selector::AllOther | Selector::SomeOther => Resolution {
            agents: others(),
            variable: None,
        },
        Selector::Variable(var) => Resolution {
            agents: everyone(),
            variable: Some(var.clone()),
        },
        Selector::Parameters(terms) => {
            let mut agents: Vec<AgentId> = Vec::with_capacity(terms.len());
            for term in terms {
                let agent = agent_name(term)?;
                if !agents.contains(&agent) {
                    agents.push(agent);
                }
            }
            Resolution {
                agents,
                variable: None,
            }
        }
    };
    Ok(resolution)
}

fn agent_name(term: &Term) -> Result<AgentId, CogentError> {
    AgentId::from_term(term)
        .ok_or_else(|| CogentError::Query(format!("{term} does not name an agent")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::new(*n)).collect()
    }

    #[test]
    fn self_and_this_resolve_to_me() {
        let me = AgentId::new("alice");
        let known = ids(&["alice", "bob"]);
        for selector in [Selector::SelfAgent, Selector::This] {
            let r = resolve(&selector, &me, &known).unwrap();
            assert_eq!(r.agents, ids(&["alice"]));
            assert_eq!(r.variable, None);
        }
    }

    #[test]
    fn all_puts_me_first() {
        let me = AgentId::new("bob");
        let known = ids(&["alice", "bob", "carol"]);
        assert_eq!(resolve(&Selector::All, &me, &known).unwrap().agents, ids(&["bob", "alice", "carol"]));
        assert_eq!(
            resolve(&Selector::SomeOther, &me, &known).unwrap().agents,
            ids(&["alice", "carol"])
        );
    }

    #[test]
    fn free_variable_reports_itself() {
        let me = AgentId::new("alice");
        let r = resolve(&Selector::Variable("A".into()), &me, &ids(&["alice", "bob"])).unwrap();
        assert_eq!(r.agents.len(), 2);
        assert_eq!(r.variable.as_deref(), Some("A"));
    }

    #[test]
    fn parameters_may_name_unknown_agents() {
        let me = AgentId::new("alice");
        let r = resolve(&Selector::parameters(["dave", "dave"]), &me, &ids(&["alice"])).unwrap();
        assert_eq!(r.agents, ids(&["dave"]));
    }

    #[test]
    fn unbound_parameter_is_an_error() {
        let me = AgentId::new("alice");
        let selector = Selector::Parameters(vec![Term::var("X")]);
        assert!(matches!(resolve(&selector, &me, &[]), Err(CogentError::Query(_))));
    }

    #[test]
    fn allother_without_other_agents_is_empty() {
        let me = AgentId::new("alice");
        let r = resolve(&Selector::AllOther, &me, &ids(&["alice"])).unwrap();
        assert!(r.agents.is_empty());
    }
}
