//! A short tour of `reactive_ecs`: register components, attach them
//! to entities, keep a query current as the world changes, and react
//! to a mutation through a listener.

use reactive_ecs::prelude::*;

#[derive(Clone, Default, Debug, reactive_ecs::Component)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Clone, Default, Debug, reactive_ecs::Component)]
struct Velocity {
    dx: f32,
    dy: f32,
}

// A tag component: no fields, so the derive just emits a no-op reset.
#[derive(Clone, Default, reactive_ecs::Component)]
struct Frozen;

fn main() {
    tracing_subscriber::fmt::init();

    let mut world = World::new();

    world.add_event_listener(world_events::COMPONENT_ADDED, |_payload| {
        println!("a component was attached");
    });

    let movers: Vec<_> = (0..4)
        .map(|i| {
            let e = world.create_entity();
            world
                .entity_mut(e)
                .add_component(Position { x: i as f32, y: 0.0 })
                .add_component(Velocity { dx: 1.0, dy: 0.0 });
            e
        })
        .collect();

    let statue = world.create_entity();
    world
        .entity_mut(statue)
        .add_component(Position::default())
        .add_component(Frozen);

    let moving = world.query::<(Position, Velocity, Not<Frozen>)>();
    println!(
        "{} entities are moving out of {} total",
        world.query_entities(moving).len(),
        world.entity_count()
    );

    for _ in 0..3 {
        for &e in &world.query_entities(moving).to_vec() {
            let dx = world.entity_ref(e).get_component::<Velocity>().unwrap().dx;
            let dy = world.entity_ref(e).get_component::<Velocity>().unwrap().dy;
            if let Some(pos) = world.entity_mut(e).get_mutable_component::<Position>() {
                pos.x += dx;
                pos.y += dy;
            }
        }
        world.execute(0.016, 0.0).unwrap();
    }

    for &e in &movers {
        let pos = world.entity_ref(e).get_component::<Position>().unwrap();
        println!("entity {} is now at ({}, {})", e, pos.x, pos.y);
    }

    let stats = world.stats();
    println!(
        "world has {} entities across {} registered component pools",
        stats.entity_count,
        stats.pools.len()
    );
}
