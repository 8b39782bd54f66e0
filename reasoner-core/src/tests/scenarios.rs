use crossbeam::channel::bounded;
use reasoner_types::ahash::AHashSet;
use reasoner_types::rule::{Rule, RuleId, Unifier};
use reasoner_types::types::{Bounds, Concept, ConceptMap};

use crate::producer::{Producer, QueueItem};

use super::fixtures::{
    answers, ends_with_done, pattern, row, run_query, var, World,
};

#[test]
fn linear_chain_forwards_answers_and_done() {
    let mut world = World::new();
    let p_a = pattern(1, &["x"]);
    let p_b = pattern(2, &["x"]);
    let p_c = pattern(3, &["x"]);
    world
        .storage
        .insert(&p_c, vec![row(&[("x", 1)]), row(&[("x", 2)])]);
    let plan_c = world.planner.retrievable_plan(&p_c);
    let plan_b = world.planner.concludable_plan(&p_b);
    let plan_a = world.planner.concludable_plan(&p_a);
    world.planner.add_rule(
        Rule::new(RuleId(1), "b-from-c"),
        Unifier::identity([var("x")]),
        &p_b,
        plan_c,
    );
    world.planner.add_rule(
        Rule::new(RuleId(2), "a-from-b"),
        Unifier::identity([var("x")]),
        &p_a,
        plan_b,
    );

    let items = run_query(world.registry(), plan_a, Bounds::none(), 3);
    assert_eq!(answers(&items), vec![row(&[("x", 1)]), row(&[("x", 2)])]);
    assert!(ends_with_done(&items), "unexpected trace: {items:?}");
}

#[test]
fn self_loop_terminates_with_no_answers() {
    let mut world = World::new();
    let p_a = pattern(1, &["x"]);
    let plan_a = world.planner.concludable_plan(&p_a);
    world.planner.add_rule(
        Rule::new(RuleId(1), "a-from-a"),
        Unifier::identity([var("x")]),
        &p_a,
        plan_a,
    );

    let items = run_query(world.registry(), plan_a, Bounds::none(), 1);
    assert_eq!(answers(&items), Vec::<ConceptMap>::new());
    assert!(ends_with_done(&items), "unexpected trace: {items:?}");
    assert_eq!(items.len(), 1);
}

#[test]
fn two_node_scc_with_finite_output() {
    let mut world = World::new();
    let p_a = pattern(1, &["x"]);
    let p_b = pattern(2, &["x"]);
    // the seed leaf: b's direct retrieval yields one answer
    world.storage.insert(&p_b, vec![row(&[("x", 1)])]);
    let plan_a = world.planner.concludable_plan(&p_a);
    let plan_b = world.planner.concludable_plan(&p_b);
    world.planner.add_rule(
        Rule::new(RuleId(1), "a-from-b"),
        Unifier::identity([var("x")]),
        &p_a,
        plan_b,
    );
    world.planner.add_rule(
        Rule::new(RuleId(2), "b-from-a"),
        Unifier::identity([var("x")]),
        &p_b,
        plan_a,
    );

    let items = run_query(world.registry(), plan_a, Bounds::none(), 5);
    assert_eq!(answers(&items), vec![row(&[("x", 1)])]);
    assert!(ends_with_done(&items), "unexpected trace: {items:?}");
}

#[test]
fn diamond_deduplicates_and_completes() {
    let mut world = World::new();
    let p_a = pattern(1, &["y"]);
    let p_b = pattern(2, &["y"]);
    let p_c = pattern(3, &["y"]);
    let p_d = pattern(4, &["y"]);
    world.storage.insert(&p_d, vec![row(&[("y", 10)])]);
    let plan_d = world.planner.retrievable_plan(&p_d);
    let plan_b = world.planner.concludable_plan(&p_b);
    let plan_c = world.planner.concludable_plan(&p_c);
    let plan_a = world.planner.concludable_plan(&p_a);
    world.planner.add_rule(
        Rule::new(RuleId(1), "b-from-d"),
        Unifier::identity([var("y")]),
        &p_b,
        plan_d,
    );
    world.planner.add_rule(
        Rule::new(RuleId(2), "c-from-d"),
        Unifier::identity([var("y")]),
        &p_c,
        plan_d,
    );
    world.planner.add_rule(
        Rule::new(RuleId(3), "a-from-b"),
        Unifier::identity([var("y")]),
        &p_a,
        plan_b,
    );
    world.planner.add_rule(
        Rule::new(RuleId(4), "a-from-c"),
        Unifier::identity([var("y")]),
        &p_a,
        plan_c,
    );

    let items = run_query(world.registry(), plan_a, Bounds::none(), 5);
    // the answer reaches a through both paths but is recorded once
    assert_eq!(answers(&items), vec![row(&[("y", 10)])]);
    assert!(ends_with_done(&items), "unexpected trace: {items:?}");
}

#[test]
fn cycle_with_external_feed_saturates() {
    let mut world = World::new();
    let p_a = pattern(1, &["x"]);
    let p_b = pattern(2, &["x"]);
    let feed: Vec<ConceptMap> = (0..100).map(|v| row(&[("x", v)])).collect();
    world.storage.insert(&p_a, feed.clone());
    let plan_a = world.planner.concludable_plan(&p_a);
    let plan_b = world.planner.concludable_plan(&p_b);
    world.planner.add_rule(
        Rule::new(RuleId(1), "a-from-b"),
        Unifier::identity([var("x")]),
        &p_a,
        plan_b,
    );
    world.planner.add_rule(
        Rule::new(RuleId(2), "b-from-a"),
        Unifier::identity([var("x")]),
        &p_b,
        plan_a,
    );

    let items = run_query(world.registry(), plan_a, Bounds::none(), 200);
    let produced = answers(&items);
    assert_eq!(produced.len(), 100, "unexpected trace: {items:?}");
    let distinct: AHashSet<ConceptMap> = produced.into_iter().collect();
    assert_eq!(distinct, feed.into_iter().collect::<AHashSet<_>>());
    assert!(ends_with_done(&items), "unexpected trace: {items:?}");
}

#[test]
fn demand_less_than_available_resumes() {
    let mut world = World::new();
    let p = pattern(1, &["x"]);
    world
        .storage
        .insert(&p, (1..=5).map(|v| row(&[("x", v)])).collect());
    let plan = world.planner.retrievable_plan(&p);
    let registry = world.registry();

    let mut producer = Producer::new(registry, plan, Bounds::none()).unwrap();
    let (queue, items) = bounded(16);

    producer.produce(&queue, 1).unwrap();
    let first: Vec<QueueItem> = items.try_iter().collect();
    assert_eq!(answers(&first), vec![row(&[("x", 1)])]);
    assert!(!ends_with_done(&first));

    // resumes without reproducing earlier answers
    producer.produce(&queue, 2).unwrap();
    let second: Vec<QueueItem> = items.try_iter().collect();
    assert_eq!(answers(&second), vec![row(&[("x", 2)]), row(&[("x", 3)])]);

    // recycling replays the stream from the first answer
    producer.recycle();
    producer.produce(&queue, 2).unwrap();
    let replayed: Vec<QueueItem> = items.try_iter().collect();
    assert_eq!(answers(&replayed), vec![row(&[("x", 1)]), row(&[("x", 2)])]);
}

#[test]
fn bounds_filter_retrieved_answers() {
    let mut world = World::new();
    let p = pattern(1, &["x"]);
    world
        .storage
        .insert(&p, (1..=3).map(|v| row(&[("x", v)])).collect());
    let plan = world.planner.retrievable_plan(&p);

    let bounds = Bounds::none().with(var("x"), Concept::long(2));
    let items = run_query(world.registry(), plan, bounds, 5);
    assert_eq!(answers(&items), vec![row(&[("x", 2)])]);
    assert!(ends_with_done(&items), "unexpected trace: {items:?}");
}

#[test]
fn rule_unifier_renames_conclusion_variables() {
    let mut world = World::new();
    let p_a = pattern(1, &["x"]);
    let p_b = pattern(2, &["y"]);
    world.storage.insert(&p_b, vec![row(&[("y", 7)])]);
    let plan_b = world.planner.retrievable_plan(&p_b);
    let plan_a = world.planner.concludable_plan(&p_a);
    world.planner.add_rule(
        Rule::new(RuleId(1), "a-from-b"),
        Unifier::mapped([(var("x"), var("y"))]),
        &p_a,
        plan_b,
    );

    let items = run_query(world.registry(), plan_a, Bounds::none(), 2);
    assert_eq!(answers(&items), vec![row(&[("x", 7)])]);
    assert!(ends_with_done(&items), "unexpected trace: {items:?}");
}

#[test]
fn traversal_failure_aborts_the_query() {
    let mut world = World::new();
    let p = pattern(1, &["x"]);
    world.storage.fail(&p);
    let plan = world.planner.retrievable_plan(&p);
    let registry = world.registry();

    let items = run_query(registry.clone(), plan, Bounds::none(), 1);
    assert!(
        matches!(items.last(), Some(QueueItem::Failed(_))),
        "unexpected trace: {items:?}"
    );
    assert!(registry.failure().is_some());
}

#[test]
fn compile_classifies_patterns_by_rule_applicability() {
    use reasoner_types::rule::{Conjunction, Resolvable};

    use crate::plan::Planner;

    let world = World::new();
    let p_plain = pattern(1, &["x"]);
    let p_ruled = pattern(2, &["x"]);
    let condition = world.planner.retrievable_plan(&p_plain);
    world.planner.add_rule(
        Rule::new(RuleId(1), "ruled"),
        Unifier::identity([var("x")]),
        &p_ruled,
        condition,
    );

    let conjunction = Conjunction {
        patterns: vec![p_plain.clone(), p_ruled.clone()],
    };
    let compiled = world.planner.compile(&conjunction).unwrap();
    assert!(matches!(&compiled[0], Resolvable::Retrievable(r) if r.pattern == p_plain));
    assert!(matches!(&compiled[1], Resolvable::Concludable(c) if c.pattern == p_ruled));
}
