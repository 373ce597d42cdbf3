//! Query-membership correctness (testable property #1) and back-edge
//! integrity (#4) driven entirely through the public `World` API.

use reactive_ecs::prelude::*;

#[derive(Clone, Default, Debug, PartialEq)]
struct Health(u32);
impl Component for Health {}

#[derive(Clone, Default, Debug, PartialEq)]
struct Poisoned;
impl Component for Poisoned {}

#[derive(Clone, Default, Debug, PartialEq)]
struct Shielded;
impl Component for Shielded {}

fn matches(world: &World, query: QueryId, entity: Entity) -> bool {
    world.query_entities(query).contains(&entity)
}

#[test]
fn query_membership_tracks_every_component_of_a_multi_term_query() {
    let mut world = World::new();
    let q = world.query::<(Health, Poisoned, Not<Shielded>)>();
    let e = world.create_entity();

    assert!(!matches(&world, q, e));

    world.entity_mut(e).add_component(Health(10));
    assert!(!matches(&world, q, e), "still missing Poisoned");

    world.entity_mut(e).add_component(Poisoned);
    assert!(matches(&world, q, e), "now has Health + Poisoned, no Shielded");

    world.entity_mut(e).add_component(Shielded);
    assert!(!matches(&world, q, e), "Shielded disqualifies it");

    world.entity_mut(e).remove_component::<Shielded>(true);
    assert!(matches(&world, q, e), "removing Shielded re-qualifies it");
}

#[test]
fn a_structurally_identical_spec_resolves_to_the_same_query_id() {
    let mut world = World::new();
    let q1 = world.query::<(Health, Poisoned)>();
    let q2 = world.query::<(Poisoned, Health)>();
    assert_eq!(q1, q2);
}

#[test]
fn removing_an_entity_clears_it_from_every_query_it_belonged_to() {
    let mut world = World::new();
    let q_all = world.query::<(Health,)>();
    let q_poisoned = world.query::<(Health, Poisoned)>();

    let e = world.create_entity();
    world.entity_mut(e).add_component(Health(1)).add_component(Poisoned);
    assert!(matches(&world, q_all, e));
    assert!(matches(&world, q_poisoned, e));

    world.remove_entity(e, true).unwrap();
    assert!(!matches(&world, q_all, e));
    assert!(!matches(&world, q_poisoned, e));
}

#[test]
fn removing_one_component_only_drops_queries_that_require_it() {
    let mut world = World::new();
    let q_health = world.query::<(Health,)>();
    let q_both = world.query::<(Health, Poisoned)>();

    let e = world.create_entity();
    world.entity_mut(e).add_component(Health(5)).add_component(Poisoned);

    world.entity_mut(e).remove_component::<Poisoned>(true);
    assert!(matches(&world, q_health, e), "Health-only query keeps it");
    assert!(!matches(&world, q_both, e), "the joint query loses it");
}
