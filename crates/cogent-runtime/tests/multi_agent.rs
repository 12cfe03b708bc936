//! Whole systems of agents running on the tokio pool.

use std::sync::Arc;
use std::time::Duration;

use cogent_kernel::ControllerState;
use cogent_kr::{parse_clause, parse_query, parse_term, parse_theory, parse_update};
use cogent_mental::{MentalLiteral, MentalStateCondition, Selector};
use cogent_runtime::{
    Action, ActionSpecification, AgentProgram, ExitCondition, Module, MultiAgentSystem, NoEnvironment, PerceptUpdate,
    Rule, RuntimeConfig, SchedulingMode, ScriptedEnvironment,
};
use cogent_types::{AgentId, Channel, CogentError, Message, Mood, Term};

const WAIT: Duration = Duration::from_secs(10);

fn when(literals: Vec<MentalLiteral>) -> MentalStateCondition {
    MentalStateCondition::new(literals)
}

fn always() -> MentalStateCondition {
    MentalStateCondition::new(vec![])
}

fn received(from: Selector, content: &str) -> MentalLiteral {
    MentalLiteral::received(from, Mood::Indicative, parse_term(content).unwrap())
}

fn to(agent: &str) -> Selector {
    Selector::Parameters(vec![Term::atom(agent)])
}

fn system(config: RuntimeConfig) -> MultiAgentSystem {
    MultiAgentSystem::new(config, Arc::new(NoEnvironment))
}

/// Works on its goals until none is left, then leaves main.
fn achiever() -> AgentProgram {
    AgentProgram::new("achiever")
        .beliefs(parse_theory("p(1).").unwrap())
        .goal(parse_update("p(2)").unwrap())
        .main(
            Module::main()
                .exit(ExitCondition::NoGoals)
                .rule(Rule::if_then(
                    when(vec![MentalLiteral::goal(parse_query("p(X)").unwrap())]),
                    vec![Action::insert(parse_update("p(X)").unwrap())],
                )),
        )
}

fn pinger() -> AgentProgram {
    AgentProgram::new("pinger")
        .init(Module::init().rule(Rule::if_then(
            always(),
            vec![Action::send(to("bob"), Mood::Indicative, Term::atom("ping"))],
        )))
        .main(Module::main().rule(Rule::if_then(
            when(vec![received(to("bob"), "pong")]),
            vec![Action::ExitModule],
        )))
}

fn ponger() -> AgentProgram {
    AgentProgram::new("ponger").main(Module::main().rule(Rule::if_then(
        when(vec![received(Selector::Variable("From".into()), "ping")]),
        vec![
            Action::send(Selector::Variable("From".into()), Mood::Indicative, Term::atom("pong")),
            Action::ExitModule,
        ],
    )))
}

fn endless() -> AgentProgram {
    AgentProgram::new("endless").main(Module::main().rule(Rule::if_then(
        always(),
        vec![Action::insert(parse_update("alive").unwrap())],
    )))
}

#[tokio::test]
async fn blind_commitment_lets_main_exit() {
    let mas = system(RuntimeConfig::default());
    let alice = mas.launch(achiever(), "alice").unwrap();
    mas.start().await.unwrap();
    assert!(mas.await_termination_timeout(WAIT).await);

    assert_eq!(mas.state(&alice).unwrap(), ControllerState::Terminated);
    assert!(mas.failure(&alice).unwrap().is_none());
    assert_eq!(mas.round(&alice).unwrap(), 2);
    let (believes, has_goals) = mas
        .inspect(&alice, |s| {
            let believes = s.mental_state().beliefs().unwrap().contains(&parse_clause("p(2)").unwrap());
            (believes, s.mental_state().has_goals())
        })
        .await
        .unwrap();
    assert!(believes);
    assert!(!has_goals);
}

async fn ping_pong(mode: SchedulingMode) {
    let mas = system(RuntimeConfig::default().scheduling(mode));
    let alice = mas.launch(pinger(), "alice").unwrap();
    let bob = mas.launch(ponger(), "bob").unwrap();
    mas.start().await.unwrap();
    assert!(mas.await_termination_timeout(WAIT).await, "{mode:?} system did not terminate");

    for agent in [&alice, &bob] {
        assert_eq!(mas.state(agent).unwrap(), ControllerState::Terminated);
        assert!(mas.failure(agent).unwrap().is_none());
    }
    let messages = mas
        .inspect(&alice, |s| s.mental_state().messages().unwrap())
        .await
        .unwrap();
    assert!(messages.contains(&parse_clause("sent(bob, indicative(ping))").unwrap()));
    assert!(messages.contains(&parse_clause("received(bob, indicative(pong))").unwrap()));
    assert!(mas.registry().is_empty());
}

#[tokio::test]
async fn ping_pong_on_the_pool() {
    ping_pong(SchedulingMode::Pool).await;
}

#[tokio::test]
async fn ping_pong_taking_turns() {
    ping_pong(SchedulingMode::Sequential).await;
}

#[tokio::test]
async fn round_limit_applies_to_every_agent() {
    let mas = system(RuntimeConfig::default().max_rounds(5));
    let ids = [
        mas.launch(endless(), "a").unwrap(),
        mas.launch(endless(), "b").unwrap(),
    ];
    mas.start().await.unwrap();
    assert!(mas.await_termination_timeout(WAIT).await);
    for id in &ids {
        assert_eq!(mas.round(id).unwrap(), 5);
    }
}

#[tokio::test]
async fn stop_terminates_endless_agents() {
    let mas = system(RuntimeConfig::default());
    let id = mas.launch(endless(), "a").unwrap();
    mas.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    mas.stop();
    assert!(mas.await_termination_timeout(WAIT).await);
    assert!(mas.round(&id).unwrap() > 0);
    assert!(mas.failure(&id).unwrap().is_none());
}

#[tokio::test]
async fn one_agent_failing_leaves_the_others_running() {
    let mas = system(RuntimeConfig::default().max_rounds(3));
    let broken = AgentProgram::new("broken").main(Module::main().rule(Rule::if_then(
        always(),
        vec![Action::user("undeclared", vec![])],
    )));
    let bad = mas.launch(broken, "bad").unwrap();
    let good = mas.launch(endless(), "good").unwrap();
    mas.start().await.unwrap();
    assert!(mas.await_termination_timeout(WAIT).await);

    assert!(matches!(mas.failure(&bad).unwrap(), Some(CogentError::Query(_))));
    assert!(mas.failure(&good).unwrap().is_none());
    assert_eq!(mas.round(&good).unwrap(), 3);
}

#[tokio::test]
async fn messages_from_outside_wake_the_agent() {
    let mas = system(RuntimeConfig::default());
    let alice = mas
        .launch(
            AgentProgram::new("listener").main(Module::main().rule(Rule::if_then(
                when(vec![received(Selector::Variable("Who".into()), "halt")]),
                vec![Action::ExitModule],
            ))),
            "alice",
        )
        .unwrap();
    mas.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mas.state(&alice).unwrap(), ControllerState::Running);

    let halt = Message::new(AgentId::new("operator"), vec![alice.clone()], Mood::Indicative, Term::atom("halt"));
    assert_eq!(mas.deliver(&halt), 1);
    assert!(mas.await_termination_timeout(WAIT).await);
    assert!(mas.failure(&alice).unwrap().is_none());
}

#[tokio::test]
async fn percepts_drive_external_actions() {
    let env = Arc::new(ScriptedEnvironment::new());
    let mas = MultiAgentSystem::new(RuntimeConfig::default(), env.clone());
    let program = AgentProgram::new("switcher")
        .action(
            ActionSpecification::new("flip", vec![Term::var("X")])
                .with_postcondition(parse_update("switched(X)").unwrap()),
        )
        .main(Module::main().rule(Rule::if_then(
            when(vec![MentalLiteral::percept(parse_query("light(on)").unwrap())]),
            vec![Action::user("flip", vec![Term::atom("off")]), Action::ExitModule],
        )));
    let alice = mas.launch(program, "alice").unwrap();
    env.push_percepts(&alice, PerceptUpdate::new(vec![parse_clause("light(on)").unwrap()], vec![]));

    mas.start().await.unwrap();
    assert!(mas.await_termination_timeout(WAIT).await);
    assert_eq!(env.performed(), vec![(alice.clone(), parse_term("flip(off)").unwrap())]);
    let switched = mas
        .inspect(&alice, |s| s.mental_state().beliefs().unwrap().contains(&parse_clause("switched(off)").unwrap()))
        .await
        .unwrap();
    assert!(switched);
}

#[tokio::test]
async fn duplicate_names_are_rejected() {
    let mas = system(RuntimeConfig::default());
    mas.launch(endless(), "a").unwrap();
    assert!(matches!(mas.launch(endless(), "a"), Err(CogentError::Launch { .. })));
    assert_eq!(mas.agent_ids(), vec![AgentId::new("a")]);
}

#[tokio::test]
async fn reset_then_dispose() {
    let mas = system(RuntimeConfig::default().max_rounds(2));
    let mut terminated = mas.bus().subscribe_to(Channel::AgentTerminated);
    let id = mas.launch(endless(), "a").unwrap();
    mas.start().await.unwrap();
    assert!(mas.await_termination_timeout(WAIT).await);

    mas.reset().await.unwrap();
    assert!(mas.await_termination_timeout(WAIT).await);
    assert_eq!(mas.round(&id).unwrap(), 2);
    assert_eq!(mas.state(&id).unwrap(), ControllerState::Terminated);

    let mut events = 0;
    while terminated.try_recv().is_ok() {
        events += 1;
    }
    assert_eq!(events, 2);

    mas.dispose().await.unwrap();
    assert!(mas.agent_ids().is_empty());
    assert!(mas.registry().is_empty());
    assert!(matches!(mas.round(&id), Err(CogentError::UnknownAgent(_))));
}
