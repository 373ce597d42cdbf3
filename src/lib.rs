//! A data-oriented entity-component-system runtime.
//!
//! Application state is partitioned into small plain-data records
//! (**components**) attached to opaque identifiers (**entities**);
//! behavior is expressed as **systems** that iterate over entities
//! whose component shape matches a declarative **query**. Unlike
//! archetype/chunk-based ECS designs, this crate indexes components
//! per-entity and keeps every registered query's matched-entity set
//! incrementally up to date as components are attached and detached.
//!
//! # Getting started
//!
//! ```rust
//! use reactive_ecs::prelude::*;
//!
//! #[derive(Clone, Default, Debug)]
//! struct Position {
//!     x: f32,
//!     y: f32,
//! }
//! impl Component for Position {}
//!
//! #[derive(Clone, Default, Debug)]
//! struct Velocity {
//!     dx: f32,
//!     dy: f32,
//! }
//! impl Component for Velocity {}
//!
//! let mut world = World::new();
//! let e = world.create_entity();
//! world
//!     .entity_mut(e)
//!     .add_component(Position::default())
//!     .add_component(Velocity { dx: 1.0, dy: 0.0 });
//!
//! // A query over (Position, Velocity) stays current as entities'
//! // component sets change — no re-scan needed on each frame.
//! let moving = world.query::<(Position, Velocity)>();
//! assert_eq!(world.query_entities(moving), &[e]);
//!
//! world.execute(0.016, 0.0).unwrap();
//! ```
//!
//! # Systems
//!
//! A [`System`] declares the queries and events it needs once, from
//! `init`, and the [`system::Scheduler`] resolves and buffers them
//! automatically for every subsequent `execute` call:
//!
//! ```rust,ignore
//! use reactive_ecs::prelude::*;
//!
//! struct Movement;
//!
//! impl System for Movement {
//!     fn init(&mut self) -> SystemConfig {
//!         let mut config = SystemConfig::default();
//!         config.queries.insert(
//!             "moving".into(),
//!             QueryBinding {
//!                 spec: vec![QueryTerm::With(position_id), QueryTerm::With(velocity_id)],
//!                 mandatory: false,
//!                 events: vec![],
//!             },
//!         );
//!         config
//!     }
//!
//!     fn execute(&mut self, _delta: f32, _time: f64, ctx: &mut SystemContext<'_>) {
//!         for entity in ctx.query("moving") {
//!             // mutate components through ctx.entity_mut(*entity)
//!         }
//!     }
//! }
//! ```
//!
//! A binding's `spec` needs the `ComponentId`s `World::register_component`
//! returned, which a system's `init` doesn't have direct access to
//! today — in practice a system captures them at construction time
//! (see `system.rs` module docs) rather than inside `init` itself.
//! `World::query::<(A, Not<B>)>()` is the ergonomic path for ad hoc
//! queries called from outside a system; the snippet above sketches
//! `SystemConfig`'s shape, not a literal recommended pattern.
#![allow(dead_code)]

pub mod component;
pub mod entity;
pub mod error;
pub mod event;
pub mod pool;
pub mod query;
pub mod system;
pub mod world;

/// `#[derive(Component)]`, generating [`component::Component::reset`] and
/// [`component::Component::copy_from`] from each field's declared or
/// inferred default. Requires the `derive` feature; the macro and the
/// trait share the name `Component` but live in separate namespaces, so
/// both can be brought in with one `use`.
#[cfg(feature = "derive")]
pub use reactive_ecs_derive::Component;

pub mod prelude {
    pub use crate::component::{Component, ComponentId};
    pub use crate::entity::Entity;
    pub use crate::error::{EcsError, EcsResult};
    pub use crate::event::{DispatcherStats, ListenerId};
    pub use crate::pool::PoolStats;
    pub use crate::query::{with, without, Not, QueryId, QueryTerm};
    pub use crate::system::{
        QueryBinding, RemoveSystemKey, System, SystemAttrs, SystemConfig, SystemContext,
        SystemEvent, SystemEventPayload,
    };
    pub use crate::world::{
        world_events, ComponentPoolStats, EntityMut, EntityRef, QueryStats, World, WorldConfig,
        WorldStats,
    };
    #[cfg(feature = "derive")]
    pub use reactive_ecs_derive::Component;
}
