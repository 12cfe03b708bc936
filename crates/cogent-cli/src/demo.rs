//! The relay ring run by the `cogent` binary.
//!
//! `relay1` sends `token(1)` to `relay2`, every agent forwards each token to
//! its successor, and `relay1` starts the next lap with `token(L+1)` when a
//! token comes back.  Forwarders leave main after passing on the last token;
//! `relay1` leaves when it receives it.

use cogent_kr::{parse_query, parse_term, parse_theory};
use cogent_mental::{MentalLiteral, MentalStateCondition, Selector};
use cogent_runtime::{Action, AgentProgram, Module, Rule};
use cogent_types::{CogentError, Mood, Term};

/// Name of the `i`-th agent, counting from one.
pub fn relay_name(i: usize) -> String {
    format!("relay{i}")
}

/// `(name, program)` for every agent of a ring of `size` agents passing the
/// token `laps` times round.
///
/// # Errors
///
/// [`CogentError::Launch`] when the ring has fewer than two agents or no
/// laps.
pub fn relay_ring(size: usize, laps: u32) -> Result<Vec<(String, AgentProgram)>, CogentError> {
    if size < 2 {
        return Err(ring_error(format!("a relay ring needs two agents, got {size}")));
    }
    if laps == 0 {
        return Err(ring_error("a relay ring needs at least one lap".to_string()));
    }

    let mut knowledge = format!("last({laps}).");
    for lap in 1..laps {
        knowledge.push_str(&format!(" next({lap}, {}).", lap + 1));
    }

    (1..=size)
        .map(|i| {
            let prev = relay_name(if i == 1 { size } else { i - 1 });
            let next = relay_name(if i == size { 1 } else { i + 1 });
            let program = if i == 1 {
                starter(&prev, &next, &knowledge)?
            } else {
                forwarder(&prev, &next, &knowledge)?
            };
            Ok((relay_name(i), program))
        })
        .collect()
}

fn ring_error(details: String) -> CogentError {
    CogentError::Launch {
        agent: "relay".to_string(),
        details,
    }
}

fn agent(name: &str) -> Selector {
    Selector::Parameters(vec![Term::atom(name)])
}

fn token(var: &str) -> Result<Term, CogentError> {
    parse_term(&format!("token({var})"))
}

fn starter(prev: &str, next: &str, knowledge: &str) -> Result<AgentProgram, CogentError> {
    let got = MentalLiteral::received(agent(prev), Mood::Indicative, token("L")?);
    let passed_on = MentalLiteral::sent(agent(next), Mood::Indicative, token("M")?).not();

    Ok(AgentProgram::new("relay-starter")
        .knowledge(parse_theory(knowledge)?)
        .init(Module::init().rule(Rule::if_then(
            MentalStateCondition::new(vec![]),
            vec![Action::send(agent(next), Mood::Indicative, parse_term("token(1)")?)],
        )))
        .main(
            Module::main()
                .rule(Rule::if_then(
                    MentalStateCondition::new(vec![got.clone(), MentalLiteral::bel(parse_query("last(L)")?)]),
                    vec![Action::ExitModule],
                ))
                .rule(Rule::if_then(
                    MentalStateCondition::new(vec![
                        got,
                        MentalLiteral::bel(parse_query("next(L, M)")?),
                        passed_on,
                    ]),
                    vec![Action::send(agent(next), Mood::Indicative, token("M")?)],
                )),
        ))
}

fn forwarder(prev: &str, next: &str, knowledge: &str) -> Result<AgentProgram, CogentError> {
    let got = MentalLiteral::received(agent(prev), Mood::Indicative, token("L")?);
    let passed_on = MentalLiteral::sent(agent(next), Mood::Indicative, token("L")?).not();

    Ok(AgentProgram::new("relay-forwarder")
        .knowledge(parse_theory(knowledge)?)
        .main(
            Module::main()
                .rule(Rule::if_then(
                    MentalStateCondition::new(vec![got.clone(), MentalLiteral::bel(parse_query("last(L)")?)]),
                    vec![
                        Action::send(agent(next), Mood::Indicative, token("L")?),
                        Action::ExitModule,
                    ],
                ))
                .rule(Rule::if_then(
                    MentalStateCondition::new(vec![got, passed_on]),
                    vec![Action::send(agent(next), Mood::Indicative, token("L")?)],
                )),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use cogent_kernel::ControllerState;
    use cogent_kr::parse_clause;
    use cogent_runtime::{MultiAgentSystem, NoEnvironment, RuntimeConfig, SchedulingMode};
    use cogent_types::AgentId;

    #[test]
    fn rings_need_two_agents_and_a_lap() {
        assert!(matches!(relay_ring(1, 2), Err(CogentError::Launch { .. })));
        assert!(matches!(relay_ring(3, 0), Err(CogentError::Launch { .. })));
        let ring = relay_ring(4, 1).unwrap();
        let names: Vec<_> = ring.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["relay1", "relay2", "relay3", "relay4"]);
    }

    async fn run_ring(mode: SchedulingMode) {
        let mas = MultiAgentSystem::new(RuntimeConfig::default().scheduling(mode), Arc::new(NoEnvironment));
        for (name, program) in relay_ring(3, 2).unwrap() {
            mas.launch(program, name).unwrap();
        }
        mas.start().await.unwrap();
        assert!(mas.await_termination_timeout(Duration::from_secs(10)).await, "{mode:?} ring did not finish");

        for id in mas.agent_ids() {
            assert_eq!(mas.state(&id).unwrap(), ControllerState::Terminated);
            assert!(mas.failure(&id).unwrap().is_none(), "{id} failed");
        }
        let messages = mas
            .inspect(&AgentId::new("relay1"), |s| s.mental_state().messages().unwrap())
            .await
            .unwrap();
        assert!(messages.contains(&parse_clause("sent(relay2, indicative(token(2)))").unwrap()));
        assert!(messages.contains(&parse_clause("received(relay3, indicative(token(2)))").unwrap()));
    }

    #[tokio::test]
    async fn token_goes_round_on_the_pool() {
        run_ring(SchedulingMode::Pool).await;
    }

    #[tokio::test]
    async fn token_goes_round_taking_turns() {
        run_ring(SchedulingMode::Sequential).await;
    }
}
