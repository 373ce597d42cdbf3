//! Property-based checks for testable properties #1 (query-membership
//! correctness) and #5 (pool conservation) over arbitrary add/remove
//! sequences, run purely through the public `World` API against a
//! small in-test reference model.

use std::collections::HashSet;

use proptest::prelude::*;
use reactive_ecs::prelude::*;

#[derive(Clone, Default, Debug, PartialEq)]
struct Tag0;
impl Component for Tag0 {}

#[derive(Clone, Default, Debug, PartialEq)]
struct Tag1;
impl Component for Tag1 {}

#[derive(Clone, Copy, Debug)]
enum Op {
    Add(usize, bool),
    Remove(usize, bool, bool),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..4usize, any::<bool>()).prop_map(|(e, c)| Op::Add(e, c)),
        (0..4usize, any::<bool>(), any::<bool>()).prop_map(|(e, c, f)| Op::Remove(e, c, f)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn query_membership_matches_a_reference_model(ops in prop::collection::vec(op_strategy(), 0..64)) {
        let mut world = World::new();
        let q = world.query::<(Tag0,)>();

        let entities: Vec<Entity> = (0..4).map(|_| world.create_entity()).collect();
        // Reference model: which entities currently have Tag0 attached
        // (component 0) according to the same add/remove semantics the
        // world itself implements (idempotent add, force-vs-staged
        // remove both drop membership immediately).
        let mut has_tag0: HashSet<usize> = HashSet::new();

        for op in ops {
            match op {
                Op::Add(idx, which) => {
                    let e = entities[idx];
                    if which {
                        world.entity_mut(e).add_component(Tag0);
                        has_tag0.insert(idx);
                    } else {
                        world.entity_mut(e).add_component(Tag1);
                    }
                }
                Op::Remove(idx, which, force) => {
                    let e = entities[idx];
                    if which {
                        world.entity_mut(e).remove_component::<Tag0>(force);
                        has_tag0.remove(&idx);
                    } else {
                        world.entity_mut(e).remove_component::<Tag1>(force);
                    }
                }
            }

            let actual: HashSet<usize> = world
                .query_entities(q)
                .iter()
                .map(|e| entities.iter().position(|x| x == e).unwrap())
                .collect();
            prop_assert_eq!(&actual, &has_tag0);
        }

        // Pool conservation: used instances never exceed the pool's
        // manufactured size, regardless of how interleaved the
        // add/remove sequence was.
        for pool_stats in world.stats().pools {
            prop_assert!(pool_stats.pool.used <= pool_stats.pool.size);
        }
    }

    #[test]
    fn deferred_removal_always_clears_by_the_next_frame(
        ops in prop::collection::vec(op_strategy(), 0..32)
    ) {
        let mut world = World::new();
        let entities: Vec<Entity> = (0..4).map(|_| world.create_entity()).collect();

        for op in ops {
            match op {
                Op::Add(idx, which) => {
                    let e = entities[idx];
                    if which {
                        world.entity_mut(e).add_component(Tag0);
                    } else {
                        world.entity_mut(e).add_component(Tag1);
                    }
                }
                Op::Remove(idx, which, force) => {
                    let e = entities[idx];
                    if which {
                        world.entity_mut(e).remove_component::<Tag0>(force);
                    } else {
                        world.entity_mut(e).remove_component::<Tag1>(force);
                    }
                }
            }
        }

        world.execute(0.016, 0.0).unwrap();

        for &e in &entities {
            prop_assert!(world.entity_ref(e).get_removed_component::<Tag0>().is_none());
            prop_assert!(world.entity_ref(e).get_removed_component::<Tag1>().is_none());
        }
    }
}
