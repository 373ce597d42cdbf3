//! Entity identity and the store that owns live entities, their
//! attached/pending-removal component sets, and deferred destruction.

use smallvec::SmallVec;

use crate::component::{ComponentHandle, ComponentId};
use crate::pool::grow_amount;
use crate::query::QueryId;
use fxhash::FxHashMap;

/// A handle to an entity: a pool slot index plus a generation counter
/// that is bumped every time the slot is freed. Two `Entity` values
/// with the same index but different generations never refer to the
/// same logical entity — this is what lets a slot be recycled without
/// stale handles silently resolving to whatever was allocated into it
/// next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub(crate) fn from_raw_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// A `u64` identity unique for as long as this entity is live and
    /// for as long as its slot is not recycled by a later
    /// `create_entity`. Not stable across a slot's reuse: once an
    /// entity is destroyed, a future entity may reuse its index with a
    /// different generation, and therefore a different `id()`.
    pub fn id(&self) -> u64 {
        (u64::from(self.index) << 32) | u64::from(self.generation)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.index, self.generation)
    }
}

#[derive(Default)]
struct EntityRecord {
    attached: FxHashMap<ComponentId, ComponentHandle>,
    pending_removal: FxHashMap<ComponentId, ComponentHandle>,
    query_back_edges: SmallVec<[QueryId; 4]>,
}

/// Owns entity slots, the free-list allocator recycling them, and each
/// live entity's component bookkeeping.
///
/// Component instance pooling lives in `ComponentRegistry`; removal
/// staging lives here, since deferred commit is a property of the
/// entity's lifecycle rather than of any one component type.
#[derive(Default)]
pub(crate) struct EntityStore {
    generations: Vec<u32>,
    records: Vec<Option<EntityRecord>>,
    free: Vec<u32>,
    pool_size: usize,

    live: Vec<Entity>,
    live_position: FxHashMap<Entity, usize>,

    entities_to_remove: Vec<Entity>,
    entities_with_pending_components: Vec<Entity>,
}

impl EntityStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn allocate_index(&mut self) -> u32 {
        if self.free.is_empty() {
            let grow_by = grow_amount(self.pool_size);
            let start = self.generations.len() as u32;
            for offset in 0..grow_by as u32 {
                self.generations.push(0);
                self.records.push(None);
                self.free.push(start + offset);
            }
            self.pool_size += grow_by;
        }
        self.free.pop().expect("entity pool grown but still empty")
    }

    pub(crate) fn create_entity(&mut self) -> Entity {
        let index = self.allocate_index();
        let generation = self.generations[index as usize];
        self.records[index as usize] = Some(EntityRecord::default());

        let entity = Entity::from_raw_parts(index, generation);
        self.live_position.insert(entity, self.live.len());
        self.live.push(entity);
        entity
    }

    pub(crate) fn is_live(&self, entity: Entity) -> bool {
        (entity.index as usize) < self.generations.len()
            && self.generations[entity.index as usize] == entity.generation
            && self.records[entity.index as usize].is_some()
    }

    pub(crate) fn live_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.live.iter().copied()
    }

    pub(crate) fn live_count(&self) -> usize {
        self.live.len()
    }

    /// `None` for any entity that is not currently live — an out-of-range
    /// index, a stale generation, or a freed slot all collapse to the
    /// same "not live" case, so every caller can treat a destroyed or
    /// never-allocated `Entity` as a safe no-op rather than a panic (§7
    /// "silent no-ops", everything short of `remove` on an unknown
    /// entity).
    fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        if !self.is_live(entity) {
            return None;
        }
        self.records[entity.index as usize].as_ref()
    }

    fn record_mut(&mut self, entity: Entity) -> Option<&mut EntityRecord> {
        if !self.is_live(entity) {
            return None;
        }
        self.records[entity.index as usize].as_mut()
    }

    pub(crate) fn has_component(&self, entity: Entity, id: ComponentId) -> bool {
        self.record(entity)
            .map(|record| record.attached.contains_key(&id))
            .unwrap_or(false)
    }

    pub(crate) fn attached_components(&self, entity: Entity) -> Vec<ComponentId> {
        self.record(entity)
            .map(|record| record.attached.keys().copied().collect())
            .unwrap_or_default()
    }

    pub(crate) fn component_handle(&self, entity: Entity, id: ComponentId) -> Option<ComponentHandle> {
        self.record(entity)?.attached.get(&id).copied()
    }

    pub(crate) fn pending_removal_handle(
        &self,
        entity: Entity,
        id: ComponentId,
    ) -> Option<ComponentHandle> {
        self.record(entity)?.pending_removal.get(&id).copied()
    }

    /// Records that `handle` for `id` is now attached to `entity`.
    /// Caller must already have confirmed `id` was not attached and
    /// `entity` is live.
    pub(crate) fn attach_component(&mut self, entity: Entity, id: ComponentId, handle: ComponentHandle) {
        if let Some(record) = self.record_mut(entity) {
            record.attached.insert(id, handle);
        }
    }

    /// Removes `id` from the attached set immediately and returns its
    /// handle, for the `force = true` removal path. `None` if `entity`
    /// is not live or `id` was not attached.
    pub(crate) fn detach_component_immediate(
        &mut self,
        entity: Entity,
        id: ComponentId,
    ) -> Option<ComponentHandle> {
        self.record_mut(entity)?.attached.remove(&id)
    }

    /// Moves `id`'s handle from the attached set to the pending-removal
    /// set. `None` if `entity` is not live or `id` was not attached.
    /// If `id` was already staged for removal, returns the handle it
    /// displaces — the caller must release that handle to its pool
    /// rather than drop it, or it leaks a slot.
    pub(crate) fn stage_component_removal(
        &mut self,
        entity: Entity,
        id: ComponentId,
    ) -> Option<ComponentHandle> {
        let handle = self.record_mut(entity)?.attached.remove(&id)?;
        let record = self.record_mut(entity).expect("entity was live immediately above");
        let displaced = record.pending_removal.insert(id, handle);
        if !self.entities_with_pending_components.contains(&entity) {
            self.entities_with_pending_components.push(entity);
        }
        displaced
    }

    /// Reverses a staged (non-force) removal: moves `id`'s handle back
    /// out of the pending-removal set, for reuse by a same-frame
    /// re-`add`. `None` if `entity` is not live or `id` was not staged.
    pub(crate) fn cancel_pending_removal(
        &mut self,
        entity: Entity,
        id: ComponentId,
    ) -> Option<ComponentHandle> {
        self.record_mut(entity)?.pending_removal.remove(&id)
    }

    /// Marks `entity` for destruction at the next `commit_deferred`.
    pub(crate) fn stage_entity_removal(&mut self, entity: Entity) {
        if !self.entities_to_remove.contains(&entity) {
            self.entities_to_remove.push(entity);
        }
    }

    /// Splices `entity` out of the live vector and frees its slot
    /// immediately, for the `force = true` removal path. The caller is
    /// responsible for releasing any still-attached component handles
    /// to their pools first.
    pub(crate) fn destroy_immediate(&mut self, entity: Entity) {
        if let Some(pos) = self.live_position.remove(&entity) {
            let last = self.live.len() - 1;
            self.live.swap_remove(pos);
            if pos != last {
                let moved = self.live[pos];
                self.live_position.insert(moved, pos);
            }
        }
        self.generations[entity.index as usize] =
            self.generations[entity.index as usize].wrapping_add(1);
        self.records[entity.index as usize] = None;
        self.free.push(entity.index);
    }

    pub(crate) fn add_query_back_edge(&mut self, entity: Entity, query: QueryId) {
        if let Some(record) = self.record_mut(entity) {
            if !record.query_back_edges.contains(&query) {
                record.query_back_edges.push(query);
            }
        }
    }

    pub(crate) fn remove_query_back_edge(&mut self, entity: Entity, query: QueryId) {
        if let Some(record) = self.record_mut(entity) {
            record.query_back_edges.retain(|q| *q != query);
        }
    }

    pub(crate) fn query_back_edges(&self, entity: Entity) -> &[QueryId] {
        self.record(entity)
            .map(|record| record.query_back_edges.as_slice())
            .unwrap_or(&[])
    }

    /// Reclaims everything staged by `stage_component_removal` and
    /// `stage_entity_removal` since the last commit. Returns the
    /// component handles to release (caller releases them to their
    /// typed pools) and the entities whose slots were just freed; both
    /// worklists are empty afterward.
    pub(crate) fn commit_deferred(&mut self) -> (Vec<(ComponentId, ComponentHandle)>, Vec<Entity>) {
        let mut released_components = Vec::new();
        for entity in self.entities_with_pending_components.drain(..) {
            if let Some(record) = self.records[entity.index as usize].as_mut() {
                for (id, handle) in record.pending_removal.drain() {
                    released_components.push((id, handle));
                }
            }
        }

        let destroyed: Vec<Entity> = self.entities_to_remove.drain(..).collect();
        for entity in &destroyed {
            self.destroy_immediate(*entity);
        }

        (released_components, destroyed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_entity_assigns_increasing_generations_on_reuse() {
        let mut store = EntityStore::new();
        let a = store.create_entity();
        store.destroy_immediate(a);
        let b = store.create_entity();
        assert_eq!(a.index, b.index);
        assert_ne!(a.generation, b.generation);
        assert!(!store.is_live(a));
        assert!(store.is_live(b));
    }

    #[test]
    fn pool_grows_by_twenty_percent_plus_one() {
        let mut store = EntityStore::new();
        let _first = store.create_entity();
        assert_eq!(store.pool_size, 1);
        let _second = store.create_entity();
        assert_eq!(store.pool_size, 2);
    }

    #[test]
    fn stale_handle_is_not_live_after_destruction() {
        let mut store = EntityStore::new();
        let entity = store.create_entity();
        store.destroy_immediate(entity);
        assert!(!store.is_live(entity));
    }

    #[test]
    fn stage_component_removal_moves_handle_to_pending() {
        let mut store = EntityStore::new();
        let entity = store.create_entity();
        let id = ComponentId(0);
        let handle = ComponentHandle(0);
        store.attach_component(entity, id, handle);
        assert!(store.has_component(entity, id));

        assert_eq!(store.stage_component_removal(entity, id), None);
        assert!(!store.has_component(entity, id));
        assert_eq!(store.pending_removal_handle(entity, id), Some(handle));
    }

    #[test]
    fn restaging_a_pending_removal_returns_the_displaced_handle() {
        let mut store = EntityStore::new();
        let entity = store.create_entity();
        let id = ComponentId(0);
        let first = ComponentHandle(0);
        let second = ComponentHandle(1);

        store.attach_component(entity, id, first);
        assert_eq!(store.stage_component_removal(entity, id), None);

        assert_eq!(store.cancel_pending_removal(entity, id), Some(first));
        store.attach_component(entity, id, second);
        assert_eq!(store.stage_component_removal(entity, id), None);
        assert_eq!(store.pending_removal_handle(entity, id), Some(second));
    }

    #[test]
    fn commit_deferred_drains_both_worklists() {
        let mut store = EntityStore::new();
        let keep = store.create_entity();
        let doomed = store.create_entity();
        let id = ComponentId(0);
        let handle = ComponentHandle(0);
        store.attach_component(keep, id, handle);
        store.stage_component_removal(keep, id);
        store.stage_entity_removal(doomed);

        let (released, destroyed) = store.commit_deferred();
        assert_eq!(released, vec![(id, handle)]);
        assert_eq!(destroyed, vec![doomed]);
        assert!(!store.is_live(doomed));
        assert!(store.is_live(keep));
    }
}
