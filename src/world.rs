//! The `World` façade: owns the component registry, entity store,
//! query engine and scheduler, and drives one frame via `execute`.
//!
//! Everything that actually mutates the entity/component/query graph
//! lives in the free functions at the bottom of this module
//! (`do_add_component` and friends) rather than as methods on `World`
//! or `EntityMut` directly. Both types only ever hold the four managers
//! as separate `&mut` fields — never a single `&mut World` — so the
//! mutation logic is written once against those four references and
//! shared by both callers.

use std::any::Any;
use std::sync::Arc;

use tracing::{info, span, Level};

use crate::component::{Component, ComponentId, ComponentRegistry, ComponentTypeList};
use crate::entity::{Entity, EntityStore};
use crate::error::{EcsError, EcsResult};
use crate::event::{DispatcherStats, EventDispatcher, ListenerId};
use crate::pool::PoolStats;
use crate::query::{QueryEngine, QueryId, QuerySpec, QueryTerm};
use crate::system::{RemoveSystemKey, Scheduler, System, SystemAttrs};

/// World-level event names, fired by the core itself (as opposed to
/// the per-query `EntityAdded`/`EntityRemoved`/`ComponentChanged`
/// names a `Query`'s own dispatcher uses). Consumers bind these in a
/// system's `SystemConfig::events` map, or listen directly via
/// `World::add_event_listener`.
pub mod world_events {
    /// Fired once, synchronously, from `World::with_config` — the
    /// closest single-process equivalent of the source's ambient
    /// "world created" signal on its external event bus.
    pub const WORLD_CREATED: &str = "WORLD_CREATED";
    pub const ENTITY_CREATED: &str = "ENTITY_CREATED";
    pub const COMPONENT_ADDED: &str = "COMPONENT_ADDED";
    pub const COMPONENT_REMOVE: &str = "COMPONENT_REMOVE";
    pub const ENTITY_REMOVED: &str = "ENTITY_REMOVED";
}

/// Construction-time knobs for a `World`. Kept as a struct rather than
/// bare constructor parameters so future knobs don't churn call sites.
#[derive(Debug, Clone, Default)]
pub struct WorldConfig {
    /// Purely a tracing label; has no effect on behavior. Useful when
    /// a process runs more than one `World` and wants its frame spans
    /// distinguishable in logs.
    pub label: Option<String>,
}

/// Per-query snapshot returned from `World::stats()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryStats {
    pub id: QueryId,
    pub num_components: usize,
    pub num_entities: usize,
}

/// Per-component-type pool snapshot returned from `World::stats()`.
#[derive(Debug, Clone, Copy)]
pub struct ComponentPoolStats {
    pub type_name: &'static str,
    pub pool: PoolStats,
}

/// Diagnostic snapshot. No stable wire format is promised beyond these
/// field names (mirrors the source's own stats contract).
#[derive(Debug, Clone)]
pub struct WorldStats {
    pub entity_count: usize,
    pub queries: Vec<QueryStats>,
    pub pools: Vec<ComponentPoolStats>,
    pub events: DispatcherStats,
}

/// Owns every live entity, registered component type, query, and
/// system. The only aggregate a consumer constructs directly.
pub struct World {
    config: WorldConfig,
    running: bool,
    components: ComponentRegistry,
    entities: EntityStore,
    queries: QueryEngine,
    scheduler: Scheduler,
    dispatcher: EventDispatcher,
}

impl Default for World {
    fn default() -> Self {
        Self::with_config(WorldConfig::default())
    }
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WorldConfig) -> Self {
        let mut world = Self {
            config,
            running: true,
            components: ComponentRegistry::new(),
            entities: EntityStore::new(),
            queries: QueryEngine::new(),
            scheduler: Scheduler::new(),
            dispatcher: EventDispatcher::new(),
        };
        info!(label = ?world.config.label, "world created");
        // No listener could have been registered before this call
        // returns, so nothing is ever delivered — the counters on
        // `World::stats().events` are this event's only observer, same
        // as `reset_event_counters` (see DESIGN.md).
        world.dispatcher.dispatch(world_events::WORLD_CREATED, &());
        world
    }

    // -- component registration -------------------------------------

    pub fn register_component<T: Component>(&mut self) -> ComponentId {
        self.components.register::<T>()
    }

    // -- systems ------------------------------------------------------

    pub fn register_system<S: System + 'static>(&mut self, system: S) {
        self.register_system_with(system, SystemAttrs::default());
    }

    pub fn register_system_with<S: System + 'static>(&mut self, system: S, attrs: SystemAttrs) {
        self.scheduler.register_system(system, attrs);
    }

    pub fn remove_system(&mut self, key: RemoveSystemKey) -> bool {
        self.scheduler.remove_system(key)
    }

    pub fn get_system<S: System>(&self) -> Option<&S> {
        self.scheduler.get_system::<S>()
    }

    pub fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.scheduler.get_system_mut::<S>()
    }

    pub fn system_count(&self) -> usize {
        self.scheduler.len()
    }

    /// `TypeId`s of every registered system, in their current execution
    /// order. Identity-only — use [`World::get_system`] to reach a
    /// particular system's state.
    pub fn systems(&self) -> Vec<std::any::TypeId> {
        self.scheduler.type_ids().collect()
    }

    // -- entities -----------------------------------------------------

    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.create_entity();
        self.dispatcher
            .dispatch(world_events::ENTITY_CREATED, &entity);
        entity
    }

    pub fn is_live(&self, entity: Entity) -> bool {
        self.entities.is_live(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.live_count()
    }

    pub fn entity_mut(&mut self, entity: Entity) -> EntityMut<'_> {
        EntityMut::new(
            &mut self.entities,
            &mut self.components,
            &mut self.queries,
            &mut self.dispatcher,
            entity,
        )
    }

    pub fn entity_ref(&self, entity: Entity) -> EntityRef<'_> {
        EntityRef::new(&self.entities, &self.components, entity)
    }

    /// Fails (`EcsError::UnknownEntity`) if `entity` is not currently
    /// live in this world — a programming-contract failure, per §7.
    pub fn remove_entity(&mut self, entity: Entity, force: bool) -> EcsResult<()> {
        do_remove_entity(
            &mut self.entities,
            &mut self.components,
            &mut self.queries,
            &mut self.dispatcher,
            entity,
            force,
        )
    }

    // -- queries --------------------------------------------------------

    /// Resolves (or creates and seeds) the query named by `Q`, a tuple
    /// of `Component` types and/or `Not<T>` clauses. Returns the same
    /// `QueryId` every time for the same multiset of clauses,
    /// regardless of order — see `QuerySpec`/signature normalization.
    pub fn query<Q: QuerySpec>(&mut self) -> QueryId {
        self.query_with_terms(&Q::terms(&mut self.components))
            .expect("QuerySpec always produces at least one positive term")
    }

    /// The dynamic equivalent of `query::<Q>()`, for callers building
    /// a spec at runtime rather than as a fixed tuple type. Fails if
    /// `terms` has no positive (`With`) entry.
    pub fn query_with_terms(&mut self, terms: &[QueryTerm]) -> EcsResult<QueryId> {
        let entities = &self.entities;
        self.queries
            .get_query(terms, entities.live_entities(), |e, cid| entities.has_component(e, cid))
    }

    pub fn query_entities(&self, id: QueryId) -> &[Entity] {
        self.queries.query(id).entities()
    }

    // -- scheduling -----------------------------------------------------

    /// No-op while stopped. Otherwise runs every enabled, eligible
    /// system in priority order, clears each system's per-frame event
    /// buffers, then commits deferred component/entity removal.
    pub fn execute(&mut self, delta: f32, time: f64) -> EcsResult<()> {
        if !self.running {
            return Ok(());
        }
        let frame = span!(Level::TRACE, "world_execute", label = ?self.config.label);
        let _guard = frame.enter();

        self.scheduler.execute(
            delta,
            time,
            &mut self.entities,
            &mut self.components,
            &mut self.queries,
            &mut self.dispatcher,
        )?;
        self.commit_deferred();
        Ok(())
    }

    /// Releases every component handle staged by a non-forced
    /// `remove_component`/`remove_entity` since the last commit, and
    /// frees every entity slot staged by a non-forced `remove_entity`.
    /// `World::execute` calls this automatically; exposed so a driver
    /// that calls `World::stop()` mid-frame can still flush staged
    /// work deterministically.
    pub fn commit_deferred(&mut self) {
        let (released, _destroyed) = self.entities.commit_deferred();
        for (id, handle) in released {
            self.components.release_erased(id, handle);
        }
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn play(&mut self) {
        self.running = true;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    // -- events -----------------------------------------------------------

    pub fn add_event_listener<F>(&mut self, name: &str, listener: F) -> ListenerId
    where
        F: Fn(&dyn Any) + Send + Sync + 'static,
    {
        self.dispatcher.add(name, listener)
    }

    pub fn remove_event_listener(&mut self, id: ListenerId) -> bool {
        self.dispatcher.remove(id)
    }

    /// Dispatches `payload` under `name` on the world-level
    /// dispatcher. A system binds these via `SystemConfig::events` to
    /// receive them in its per-frame event buffer.
    pub fn emit_event<T: Send + Sync + 'static>(&mut self, name: &str, payload: T) {
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(payload);
        self.dispatcher.dispatch(name, &payload);
    }

    pub fn reset_event_counters(&mut self) {
        self.dispatcher.reset_counters();
    }

    // -- diagnostics --------------------------------------------------------

    pub fn stats(&self) -> WorldStats {
        let queries = self
            .queries
            .stats()
            .into_iter()
            .map(|(id, num_components, num_entities)| QueryStats {
                id,
                num_components,
                num_entities,
            })
            .collect();
        let pools = self
            .components
            .iter_ids()
            .map(|id| ComponentPoolStats {
                type_name: self.components.type_name(id),
                pool: self.components.pool_stats(id),
            })
            .collect();
        WorldStats {
            entity_count: self.entities.live_count(),
            queries,
            pools,
            events: self.dispatcher.stats(),
        }
    }
}

/// Read-only view of one entity's component set.
pub struct EntityRef<'a> {
    entities: &'a EntityStore,
    components: &'a ComponentRegistry,
    entity: Entity,
}

impl<'a> EntityRef<'a> {
    pub(crate) fn new(entities: &'a EntityStore, components: &'a ComponentRegistry, entity: Entity) -> Self {
        Self { entities, components, entity }
    }

    pub fn id(&self) -> Entity {
        self.entity
    }

    pub fn has_component<T: Component>(&self) -> bool {
        match self.components.id_of::<T>() {
            Some(id) => self.entities.has_component(self.entity, id),
            None => false,
        }
    }

    pub fn has_all_components<L: ComponentTypeList>(&self) -> bool {
        has_all(self.entities, self.entity, &L::ids(self.components))
    }

    pub fn has_any_components<L: ComponentTypeList>(&self) -> bool {
        has_any(self.entities, self.entity, &L::ids(self.components))
    }

    pub fn get_component<T: Component>(&self) -> Option<&T> {
        let id = self.components.id_of::<T>()?;
        let handle = self.entities.component_handle(self.entity, id)?;
        Some(self.components.get::<T>(id, handle))
    }

    /// The staged-for-removal instance of `T`, if `T` is currently
    /// pending a deferred `remove_component`. `None` once committed.
    pub fn get_removed_component<T: Component>(&self) -> Option<&T> {
        let id = self.components.id_of::<T>()?;
        let handle = self.entities.pending_removal_handle(self.entity, id)?;
        Some(self.components.get::<T>(id, handle))
    }
}

/// Mutable view of one entity, through which components are attached,
/// detached, and read. Borrows the `World`'s four managers for as long
/// as it's held — drop it (or let it go out of scope) before doing
/// anything else with the `World` it came from.
pub struct EntityMut<'a> {
    entities: &'a mut EntityStore,
    components: &'a mut ComponentRegistry,
    queries: &'a mut QueryEngine,
    dispatcher: &'a mut EventDispatcher,
    entity: Entity,
}

impl<'a> EntityMut<'a> {
    pub(crate) fn new(
        entities: &'a mut EntityStore,
        components: &'a mut ComponentRegistry,
        queries: &'a mut QueryEngine,
        dispatcher: &'a mut EventDispatcher,
        entity: Entity,
    ) -> Self {
        Self { entities, components, queries, dispatcher, entity }
    }

    pub fn id(&self) -> Entity {
        self.entity
    }

    pub fn has_component<T: Component>(&self) -> bool {
        match self.components.id_of::<T>() {
            Some(id) => self.entities.has_component(self.entity, id),
            None => false,
        }
    }

    pub fn has_all_components<L: ComponentTypeList>(&self) -> bool {
        has_all(self.entities, self.entity, &L::ids(self.components))
    }

    pub fn has_any_components<L: ComponentTypeList>(&self) -> bool {
        has_any(self.entities, self.entity, &L::ids(self.components))
    }

    /// Attaches `values` under type `T`. A no-op (§7 silent idempotence)
    /// if `T` is already attached — the existing instance is left
    /// untouched, `values` is dropped.
    pub fn add_component<T: Component>(&mut self, values: T) -> &mut Self {
        do_add_component(self.entities, self.components, self.queries, self.dispatcher, self.entity, values);
        self
    }

    /// `add_component(T::default())`, for tag components and data
    /// components a caller wants to fill in afterward via
    /// `get_mutable_component`.
    pub fn add_component_default<T: Component>(&mut self) -> &mut Self {
        self.add_component(T::default())
    }

    /// A no-op if `T` is not attached. `force = true` releases the
    /// component to its pool immediately; `force = false` stages it —
    /// `get_removed_component::<T>()` still sees it until the next
    /// `World::execute`/`commit_deferred`.
    pub fn remove_component<T: Component>(&mut self, force: bool) -> &mut Self {
        if let Some(id) = self.components.id_of::<T>() {
            do_remove_component(self.entities, self.components, self.queries, self.dispatcher, self.entity, id, force);
        }
        self
    }

    pub fn remove_all_components(&mut self, force: bool) -> &mut Self {
        do_remove_all_components(self.entities, self.components, self.queries, self.dispatcher, self.entity, force);
        self
    }

    pub fn get_component<T: Component>(&self) -> Option<&T> {
        let id = self.components.id_of::<T>()?;
        let handle = self.entities.component_handle(self.entity, id)?;
        Some(self.components.get::<T>(id, handle))
    }

    /// Fires `ComponentChanged` on every reactive query this entity
    /// currently belongs to, then returns the mutable instance. Firing
    /// is unconditional on access, not on whether the borrow is
    /// actually written through — this crate has no content-based
    /// dirty detection (§4.3).
    pub fn get_mutable_component<T: Component>(&mut self) -> Option<&mut T> {
        let id = self.components.id_of::<T>()?;
        let handle = self.entities.component_handle(self.entity, id)?;
        self.queries.on_component_changed(self.entity, id);
        Some(self.components.get_mut::<T>(id, handle))
    }

    pub fn get_removed_component<T: Component>(&self) -> Option<&T> {
        let id = self.components.id_of::<T>()?;
        let handle = self.entities.pending_removal_handle(self.entity, id)?;
        Some(self.components.get::<T>(id, handle))
    }

    /// Fails (`EcsError::UnknownEntity`) if this entity is not live.
    /// Consumes the view since there is nothing left to mutate once
    /// removal (forced or staged) has been requested.
    pub fn remove(self, force: bool) -> EcsResult<()> {
        do_remove_entity(self.entities, self.components, self.queries, self.dispatcher, self.entity, force)
    }
}

fn has_all(entities: &EntityStore, entity: Entity, ids: &[Option<ComponentId>]) -> bool {
    ids.iter().all(|id| matches!(id, Some(id) if entities.has_component(entity, *id)))
}

fn has_any(entities: &EntityStore, entity: Entity, ids: &[Option<ComponentId>]) -> bool {
    ids.iter().any(|id| matches!(id, Some(id) if entities.has_component(entity, *id)))
}

/// Attaches `values` under `T`, registering `T` if this is the first
/// time it's been seen. No-op if `T` is already attached. Notifies the
/// `QueryEngine` and maintains `entity`'s back-edge list so a later
/// removal stays O(queries it's actually in).
fn do_add_component<T: Component>(
    entities: &mut EntityStore,
    components: &mut ComponentRegistry,
    queries: &mut QueryEngine,
    dispatcher: &mut EventDispatcher,
    entity: Entity,
    values: T,
) {
    if !entities.is_live(entity) {
        return;
    }
    let id = components.register::<T>();
    if entities.has_component(entity, id) {
        return;
    }
    // A same-frame `remove(T, false)` leaves `id` staged in
    // `pending_removal` rather than released. Reclaim that handle
    // instead of acquiring a fresh one, or `id` would end up attached
    // *and* pending removal at once (§3).
    let handle = match entities.cancel_pending_removal(entity, id) {
        Some(handle) => {
            let slot = components.get_mut::<T>(id, handle);
            slot.copy_from(&values);
            handle
        }
        None => {
            let (handle, slot) = components.acquire::<T>(id);
            slot.copy_from(&values);
            components.component_added_to_entity(id);
            handle
        }
    };
    entities.attach_component(entity, id, handle);

    let change = {
        let entities = &*entities;
        queries.on_component_added(entity, id, |e, cid| entities.has_component(e, cid))
    };
    for query_id in &change.entered {
        entities.add_query_back_edge(entity, *query_id);
    }
    for query_id in &change.left {
        entities.remove_query_back_edge(entity, *query_id);
    }

    dispatcher.dispatch(world_events::COMPONENT_ADDED, &(entity, id));
}

/// Logically detaches `id` from `entity` — query membership updates
/// immediately regardless of `force`. `force = true` also releases the
/// handle to its pool synchronously; `force = false` only stages it
/// (released at the next `commit_deferred`). A no-op if `id` is not
/// currently attached.
fn do_remove_component(
    entities: &mut EntityStore,
    components: &mut ComponentRegistry,
    queries: &mut QueryEngine,
    dispatcher: &mut EventDispatcher,
    entity: Entity,
    id: ComponentId,
    force: bool,
) {
    if !entities.has_component(entity, id) {
        return;
    }
    dispatcher.dispatch(world_events::COMPONENT_REMOVE, &(entity, id));

    if force {
        if let Some(handle) = entities.detach_component_immediate(entity, id) {
            components.release_erased(id, handle);
        }
    } else if let Some(displaced) = entities.stage_component_removal(entity, id) {
        // Already staged once this frame; the handle being displaced
        // from `pending_removal` would otherwise leak its pool slot.
        components.release_erased(id, displaced);
    }

    let change = {
        let entities = &*entities;
        queries.on_component_removed(entity, id, |e, cid| entities.has_component(e, cid))
    };
    for query_id in &change.entered {
        entities.add_query_back_edge(entity, *query_id);
    }
    for query_id in &change.left {
        entities.remove_query_back_edge(entity, *query_id);
    }
}

/// Removes every attached component, in reverse attachment order, per
/// §4.2.
fn do_remove_all_components(
    entities: &mut EntityStore,
    components: &mut ComponentRegistry,
    queries: &mut QueryEngine,
    dispatcher: &mut EventDispatcher,
    entity: Entity,
    force: bool,
) {
    let mut attached = entities.attached_components(entity);
    attached.reverse();
    for id in attached {
        do_remove_component(entities, components, queries, dispatcher, entity, id, force);
    }
}

/// Fails if `entity` is not live. Otherwise removes it from every
/// query it belongs to, detaches (or stages detachment of) every
/// attached component, and either destroys the slot immediately
/// (`force`) or stages it for the next `commit_deferred`.
fn do_remove_entity(
    entities: &mut EntityStore,
    components: &mut ComponentRegistry,
    queries: &mut QueryEngine,
    dispatcher: &mut EventDispatcher,
    entity: Entity,
    force: bool,
) -> EcsResult<()> {
    if !entities.is_live(entity) {
        return Err(EcsError::UnknownEntity);
    }
    dispatcher.dispatch(world_events::ENTITY_REMOVED, &entity);

    let back_edges = entities.query_back_edges(entity).to_vec();
    queries.on_entity_removed(entity, &back_edges);
    for query_id in &back_edges {
        entities.remove_query_back_edge(entity, *query_id);
    }

    do_remove_all_components(entities, components, queries, dispatcher, entity, force);

    if force {
        entities.destroy_immediate(entity);
    } else {
        entities.stage_entity_removal(entity);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default, PartialEq, Debug)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Clone, Default)]
    struct Frozen;
    impl Component for Frozen {
        fn reset(&mut self) {}
    }

    #[test]
    fn create_entity_is_live_and_has_no_components() {
        let mut world = World::new();
        let e = world.create_entity();
        assert!(world.is_live(e));
        assert!(!world.entity_ref(e).has_component::<Position>());
    }

    #[test]
    fn add_component_is_idempotent() {
        let mut world = World::new();
        let e = world.create_entity();
        world.entity_mut(e).add_component(Position { x: 1.0, y: 2.0 });
        world.entity_mut(e).add_component(Position { x: 9.0, y: 9.0 });
        assert_eq!(
            world.entity_ref(e).get_component::<Position>(),
            Some(&Position { x: 1.0, y: 2.0 })
        );
    }

    #[test]
    fn forced_remove_releases_immediately() {
        let mut world = World::new();
        let e = world.create_entity();
        world.entity_mut(e).add_component(Position::default());
        world.entity_mut(e).remove_component::<Position>(true);
        assert!(!world.entity_ref(e).has_component::<Position>());
    }

    #[test]
    fn deferred_remove_keeps_removed_component_until_commit() {
        let mut world = World::new();
        let e = world.create_entity();
        world.entity_mut(e).add_component(Position::default());
        world.entity_mut(e).remove_component::<Position>(false);

        assert!(!world.entity_ref(e).has_component::<Position>());
        assert!(world.entity_ref(e).get_removed_component::<Position>().is_some());

        world.execute(0.016, 0.0).unwrap();
        assert!(world.entity_ref(e).get_removed_component::<Position>().is_none());
    }

    #[test]
    fn remove_entity_on_unknown_entity_fails_loudly() {
        let mut world = World::new();
        let e = world.create_entity();
        world.remove_entity(e, true).unwrap();
        assert_eq!(world.remove_entity(e, true), Err(EcsError::UnknownEntity));
    }

    #[test]
    fn query_tracks_membership_through_add_and_remove() {
        let mut world = World::new();
        let id = world.query::<(Position,)>();
        let e = world.create_entity();
        assert!(world.query_entities(id).is_empty());

        world.entity_mut(e).add_component(Position::default());
        assert_eq!(world.query_entities(id), &[e]);

        world.entity_mut(e).remove_component::<Position>(true);
        assert!(world.query_entities(id).is_empty());
    }

    #[test]
    fn stop_suspends_execute_until_play() {
        let mut world = World::new();
        world.stop();
        assert!(!world.is_running());
        world.execute(0.016, 0.0).unwrap();
        world.play();
        assert!(world.is_running());
    }

    #[test]
    fn stats_reports_entity_and_pool_counts() {
        let mut world = World::new();
        world.register_component::<Position>();
        let e = world.create_entity();
        world.entity_mut(e).add_component(Position::default());
        let stats = world.stats();
        assert_eq!(stats.entity_count, 1);
        assert_eq!(stats.pools.len(), 1);
        assert_eq!(stats.pools[0].pool.used, 1);
    }

    #[test]
    fn operations_on_a_destroyed_entity_handle_are_silent_no_ops() {
        let mut world = World::new();
        let e = world.create_entity();
        world.remove_entity(e, true).unwrap();

        // `e` is now a stale handle (its slot may even have been
        // recycled by a later `create_entity`, but here it hasn't).
        // Every operation short of `remove`/`remove_entity` must no-op
        // rather than panic, per §7.
        world.entity_mut(e).add_component(Position { x: 1.0, y: 1.0 });
        world.entity_mut(e).remove_component::<Position>(true);
        world.entity_mut(e).remove_all_components(false);
        assert!(world.entity_ref(e).get_component::<Position>().is_none());
        assert!(world.entity_mut(e).get_mutable_component::<Position>().is_none());
        assert!(!world.is_live(e));
    }

    #[test]
    fn re_adding_a_staged_removal_in_the_same_frame_does_not_duplicate_it() {
        let mut world = World::new();
        let e = world.create_entity();
        world.entity_mut(e).add_component(Position { x: 1.0, y: 2.0 });

        world.entity_mut(e).remove_component::<Position>(false);
        assert!(!world.entity_ref(e).has_component::<Position>());
        assert_eq!(
            world.entity_ref(e).get_removed_component::<Position>(),
            Some(&Position { x: 1.0, y: 2.0 })
        );

        world.entity_mut(e).add_component(Position { x: 3.0, y: 4.0 });

        // `T` must be attached again and gone from pending-removal, never both.
        assert!(world.entity_ref(e).has_component::<Position>());
        assert!(world.entity_ref(e).get_removed_component::<Position>().is_none());
        assert_eq!(
            world.entity_ref(e).get_component::<Position>(),
            Some(&Position { x: 3.0, y: 4.0 })
        );

        let name = std::any::type_name::<Position>();
        let stats = world.stats();
        let pool = stats.pools.iter().find(|p| p.type_name == name).unwrap();
        assert_eq!(pool.pool.used, 1);
    }

    #[test]
    fn restaging_a_removal_in_the_same_frame_does_not_leak_the_first_handle() {
        let mut world = World::new();
        let e = world.create_entity();
        world.entity_mut(e).add_component(Position { x: 1.0, y: 2.0 });

        world.entity_mut(e).remove_component::<Position>(false);
        world.entity_mut(e).add_component(Position { x: 5.0, y: 6.0 });
        world.entity_mut(e).remove_component::<Position>(false);

        assert_eq!(
            world.entity_ref(e).get_removed_component::<Position>(),
            Some(&Position { x: 5.0, y: 6.0 })
        );

        let name = std::any::type_name::<Position>();
        let stats = world.stats();
        let pool = stats.pools.iter().find(|p| p.type_name == name).unwrap();
        assert_eq!(pool.pool.used, 1);
    }

    #[test]
    fn tag_component_can_be_attached() {
        let mut world = World::new();
        let e = world.create_entity();
        world.entity_mut(e).add_component(Frozen);
        assert!(world.entity_ref(e).has_component::<Frozen>());
    }
}
