//! End-to-end scenarios over a full mental state.

use std::collections::BTreeSet;
use std::sync::Arc;

use cogent_kr::{InMemoryKr, parse_query, parse_theory, parse_update};
use cogent_mental::{MentalLiteral, MentalState, MentalStateCondition, Selector};
use cogent_types::{AgentId, Channel, CollectingSink, Message, Mood, NoopSink, Substitution, Term};

fn agent(name: &str, knowledge: &str, beliefs: &str) -> MentalState {
    let mut ms = MentalState::new(AgentId::new(name), Arc::new(InMemoryKr::new()));
    ms.initialize(
        parse_theory(knowledge).unwrap(),
        parse_theory(beliefs).unwrap(),
        Vec::new(),
        &NoopSink,
    )
    .unwrap();
    ms
}

#[test]
fn adopting_twice_changes_nothing_the_second_time() {
    let mut ms = agent("alice", "", "");
    let goal = parse_update("on(a, b)").unwrap();
    let first = ms.adopt(&goal, false, &Selector::SelfAgent, &NoopSink).unwrap();
    let second = ms.adopt(&goal, false, &Selector::SelfAgent, &NoopSink).unwrap();
    assert!(!first[0].is_empty());
    assert!(second[0].is_empty());
    assert_eq!(ms.attention_set(false).unwrap().goals(), vec![goal]);
}

#[test]
fn dropping_an_absent_goal_is_a_noop() {
    let mut ms = agent("alice", "", "");
    ms.adopt(&parse_update("p").unwrap(), false, &Selector::SelfAgent, &NoopSink)
        .unwrap();
    let diffs = ms
        .drop(&parse_update("q").unwrap(), &Selector::SelfAgent, &NoopSink)
        .unwrap();
    assert!(diffs.iter().all(|d| d.is_empty()));
    assert_eq!(ms.attention_set(false).unwrap().len(), 1);
}

#[test]
fn goal_is_dropped_once_believed() {
    let mut ms = agent("alice", "", "p(1).");
    ms.adopt(&parse_update("p(2)").unwrap(), false, &Selector::SelfAgent, &NoopSink)
        .unwrap();
    assert!(ms.has_goals());

    ms.update_goal_state(&NoopSink).unwrap();
    assert!(ms.has_goals(), "p(2) is not believed yet");

    ms.insert(&parse_update("p(2)").unwrap(), &Selector::SelfAgent, &NoopSink)
        .unwrap();
    ms.update_goal_state(&NoopSink).unwrap();
    assert!(!ms.has_goals());
}

#[test]
fn all_selector_over_two_agents() {
    let mut ms = agent("alice", "", "");
    let both = Selector::parameters(["a", "b"]);
    ms.insert(&parse_update("q").unwrap(), &both, &NoopSink).unwrap();

    // Only the two tracked agents, not alice herself.
    let literal = MentalLiteral::bel(parse_query("q").unwrap()).with_selector(Selector::AllOther);
    assert_eq!(
        ms.query(&literal, &NoopSink).unwrap(),
        BTreeSet::from([Substitution::new()])
    );

    ms.delete(&parse_update("q").unwrap(), &Selector::parameters(["b"]), &NoopSink)
        .unwrap();
    assert!(ms.query(&literal, &NoopSink).unwrap().is_empty());
}

#[test]
fn message_bookkeeping_across_cycles() {
    let mut ms = agent("carol", "", "");
    let alice = AgentId::new("alice");
    let bob = AgentId::new("bob");
    let me = vec![AgentId::new("carol")];

    // Cycle 1: two messages.
    ms.receive_message(&Message::new(alice.clone(), me.clone(), Mood::Indicative, Term::atom("hot")), &NoopSink)
        .unwrap();
    ms.receive_message(&Message::new(bob.clone(), me.clone(), Mood::Imperative, Term::atom("open")), &NoopSink)
        .unwrap();
    // Cycle 2: one more.
    ms.receive_message(&Message::new(alice.clone(), me.clone(), Mood::Imperative, Term::atom("close")), &NoopSink)
        .unwrap();

    let messages = ms.messages().unwrap();
    assert_eq!(messages.len(), 3);

    let sink = CollectingSink::new();
    ms.remove_message(&messages[0], &sink).unwrap();
    assert_eq!(ms.messages().unwrap().len(), 2);
    assert_eq!(sink.on(Channel::Delete).len(), 1);

    // Both senders are now known.
    assert_eq!(ms.known_agents().len(), 3);
}

#[test]
fn knowledge_rules_drive_goal_selection() {
    let mut ms = agent(
        "builder",
        "clear(X) :- block(X), not(on(_, X)). block(a). block(b). block(c).",
        "on(a, b). on(b, table). on(c, table).",
    );
    ms.adopt(&parse_update("on(a, table), on(b, table), on(c, a)").unwrap(), false, &Selector::SelfAgent, &NoopSink)
        .unwrap();

    // Move a block onto the table when that is wanted and the block is clear.
    let condition = MentalStateCondition::new(vec![
        MentalLiteral::a_goal(parse_query("on(X, table)").unwrap()),
        MentalLiteral::bel(parse_query("clear(X)").unwrap()),
    ]);
    let result = ms.evaluate(&condition, &Substitution::new(), &NoopSink).unwrap();
    let xs: Vec<Term> = result.answers.iter().filter_map(|s| s.get("X").cloned()).collect();
    assert_eq!(xs, vec![Term::atom("a")]);
}

#[test]
fn negation_is_exact_complement() {
    let mut ms = agent("alice", "", "p.");
    for (src, holds) in [("p", true), ("q", false)] {
        let positive = MentalLiteral::bel(parse_query(src).unwrap());
        let negative = positive.clone().not();
        let pos = ms.query(&positive, &NoopSink).unwrap();
        let neg = ms.query(&negative, &NoopSink).unwrap();
        assert_eq!(!pos.is_empty(), holds);
        assert_eq!(neg.is_empty(), holds);
        if !holds {
            assert_eq!(neg, BTreeSet::from([Substitution::new()]));
        }
    }
}
