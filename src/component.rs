//! Component type registration and per-type storage.

use std::any::TypeId;

use fxhash::FxHashMap;
use tracing::warn;

use crate::pool::{grow_amount, PoolStats};

/// A plain data record attachable to at most one entity at a time.
///
/// Data components carry attributes and must be able to restore
/// themselves to a pool-clean state (`reset`); tag components carry no
/// attributes and implement `reset` as a no-op. `copy_from` defaults
/// to cloning `src` wholesale; types with partial-copy semantics can
/// override it.
///
/// Set `POOLED = false` to opt a type out of pooling (a fresh instance
/// is allocated on every attach and discarded on every detach). Rust
/// has no way to detect "did the user define a meaningful reset" at
/// compile time, so this is an explicit opt-out rather than inferred.
pub trait Component: Clone + Default + Send + Sync + 'static {
    const POOLED: bool = true;

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn copy_from(&mut self, src: &Self) {
        *self = src.clone();
    }
}

/// Dense integer identity assigned to a `Component` type at
/// registration, used everywhere in place of hashing `TypeId`
/// repeatedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) u32);

/// An index into a component type's slab, identifying one live (or
/// pending-removal) instance. Opaque outside this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ComponentHandle(pub(crate) u32);

struct ComponentMeta {
    type_name: &'static str,
    live_count: usize,
}

/// Backing storage for one component type: either a recycled slab
/// (`Pooled`) or a grow-only slab whose freed slots are never reused
/// (`Degenerate`, for component types that opt out of pooling).
enum Slab<T> {
    Pooled { items: Vec<T>, free: Vec<u32> },
    Degenerate { items: Vec<Option<T>> },
}

/// Object-safe face of `ComponentStore<T>` so the registry can hold
/// heterogeneous stores in one `Vec` and still ask each for its stats
/// without knowing `T`. Downcasting back to the concrete
/// `ComponentStore<T>` happens through `downcast-rs` in
/// `ComponentRegistry::store`/`store_mut`.
trait ErasedStore: downcast_rs::DowncastSync {
    fn stats(&self) -> PoolStats;
    fn release_erased(&mut self, handle: ComponentHandle);
}
downcast_rs::impl_downcast!(sync ErasedStore);

struct ComponentStore<T> {
    slab: Slab<T>,
    size: usize,
    used: usize,
}

impl<T: Component> ErasedStore for ComponentStore<T> {
    fn stats(&self) -> PoolStats {
        ComponentStore::stats(self)
    }

    fn release_erased(&mut self, handle: ComponentHandle) {
        ComponentStore::release(self, handle);
    }
}

impl<T: Component> ComponentStore<T> {
    fn new() -> Self {
        let slab = if T::POOLED {
            Slab::Pooled {
                items: Vec::new(),
                free: Vec::new(),
            }
        } else {
            Slab::Degenerate { items: Vec::new() }
        };
        Self {
            slab,
            size: 0,
            used: 0,
        }
    }

    fn acquire(&mut self) -> (ComponentHandle, &mut T) {
        self.used += 1;
        match &mut self.slab {
            Slab::Pooled { items, free } => {
                if free.is_empty() {
                    let grow_by = grow_amount(self.size);
                    for _ in 0..grow_by {
                        items.push(T::default());
                        free.push((items.len() - 1) as u32);
                    }
                    self.size += grow_by;
                }
                let index = free.pop().expect("pool grown but still empty");
                (ComponentHandle(index), &mut items[index as usize])
            }
            Slab::Degenerate { items } => {
                items.push(Some(T::default()));
                let index = (items.len() - 1) as u32;
                self.size += 1;
                (
                    ComponentHandle(index),
                    items[index as usize].as_mut().unwrap(),
                )
            }
        }
    }

    fn get(&self, handle: ComponentHandle) -> &T {
        match &self.slab {
            Slab::Pooled { items, .. } => &items[handle.0 as usize],
            Slab::Degenerate { items } => items[handle.0 as usize]
                .as_ref()
                .expect("handle points at a released degenerate slot"),
        }
    }

    fn get_mut(&mut self, handle: ComponentHandle) -> &mut T {
        match &mut self.slab {
            Slab::Pooled { items, .. } => &mut items[handle.0 as usize],
            Slab::Degenerate { items } => items[handle.0 as usize]
                .as_mut()
                .expect("handle points at a released degenerate slot"),
        }
    }

    fn release(&mut self, handle: ComponentHandle) {
        self.used = self.used.saturating_sub(1);
        match &mut self.slab {
            Slab::Pooled { items, free } => {
                items[handle.0 as usize].reset();
                free.push(handle.0);
            }
            Slab::Degenerate { items } => {
                items[handle.0 as usize] = None;
            }
        }
    }

    fn stats(&self) -> PoolStats {
        match &self.slab {
            Slab::Pooled { .. } => PoolStats {
                used: self.used,
                size: self.size,
            },
            // Free count is effectively unbounded for a degenerate slab;
            // report usize::MAX rather than tracking a real free count.
            Slab::Degenerate { .. } => PoolStats {
                used: self.used,
                size: usize::MAX,
            },
        }
    }
}

/// Registers component types and owns their per-type storage.
#[derive(Default)]
pub(crate) struct ComponentRegistry {
    ids: FxHashMap<TypeId, ComponentId>,
    meta: Vec<ComponentMeta>,
    stores: Vec<Box<dyn ErasedStore>>,
}

impl ComponentRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Registers `T`, idempotently. Returns the stable `ComponentId`
    /// assigned on first registration.
    pub(crate) fn register<T: Component>(&mut self) -> ComponentId {
        if let Some(id) = self.ids.get(&TypeId::of::<T>()) {
            return *id;
        }
        let id = ComponentId(self.meta.len() as u32);
        self.ids.insert(TypeId::of::<T>(), id);
        self.meta.push(ComponentMeta {
            type_name: std::any::type_name::<T>(),
            live_count: 0,
        });
        self.stores.push(Box::new(ComponentStore::<T>::new()));
        if !T::POOLED {
            warn!(
                component = self.meta[id.0 as usize].type_name,
                "component type is not pooled; a fresh instance is allocated on every attach"
            );
        }
        id
    }

    pub(crate) fn id_of<T: Component>(&self) -> Option<ComponentId> {
        self.ids.get(&TypeId::of::<T>()).copied()
    }

    pub(crate) fn type_name(&self, id: ComponentId) -> &'static str {
        self.meta[id.0 as usize].type_name
    }

    pub(crate) fn live_count(&self, id: ComponentId) -> usize {
        self.meta[id.0 as usize].live_count
    }

    pub(crate) fn component_added_to_entity(&mut self, id: ComponentId) {
        self.meta[id.0 as usize].live_count += 1;
    }

    pub(crate) fn component_removed_from_entity(&mut self, id: ComponentId) {
        let count = &mut self.meta[id.0 as usize].live_count;
        *count = count.saturating_sub(1);
    }

    fn store<T: Component>(&self, id: ComponentId) -> &ComponentStore<T> {
        self.stores[id.0 as usize]
            .downcast_ref::<ComponentStore<T>>()
            .expect("ComponentId did not match the registered type")
    }

    fn store_mut<T: Component>(&mut self, id: ComponentId) -> &mut ComponentStore<T> {
        self.stores[id.0 as usize]
            .downcast_mut::<ComponentStore<T>>()
            .expect("ComponentId did not match the registered type")
    }

    pub(crate) fn acquire<T: Component>(&mut self, id: ComponentId) -> (ComponentHandle, &mut T) {
        self.store_mut::<T>(id).acquire()
    }

    pub(crate) fn release<T: Component>(&mut self, id: ComponentId, handle: ComponentHandle) {
        self.store_mut::<T>(id).release(handle);
        self.component_removed_from_entity(id);
    }

    /// Releases `handle` back to `id`'s pool without knowing its
    /// concrete type. Used at deferred-commit time, when the store
    /// only has a `ComponentId` to go on, and by the immediate
    /// (`force`) removal path so both share one release site.
    pub(crate) fn release_erased(&mut self, id: ComponentId, handle: ComponentHandle) {
        self.stores[id.0 as usize].release_erased(handle);
        self.component_removed_from_entity(id);
    }

    pub(crate) fn get<T: Component>(&self, id: ComponentId, handle: ComponentHandle) -> &T {
        self.store::<T>(id).get(handle)
    }

    pub(crate) fn get_mut<T: Component>(
        &mut self,
        id: ComponentId,
        handle: ComponentHandle,
    ) -> &mut T {
        self.store_mut::<T>(id).get_mut(handle)
    }

    pub(crate) fn pool_stats(&self, id: ComponentId) -> PoolStats {
        self.stores[id.0 as usize].stats()
    }

    pub(crate) fn iter_ids(&self) -> impl Iterator<Item = ComponentId> + '_ {
        (0..self.meta.len()).map(|i| ComponentId(i as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Clone, Default)]
    struct ExternalHandle(u64);
    impl Component for ExternalHandle {
        const POOLED: bool = false;
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = ComponentRegistry::new();
        let a = registry.register::<Position>();
        let b = registry.register::<Position>();
        assert_eq!(a, b);
    }

    #[test]
    fn pooled_acquire_release_roundtrips_through_reset() {
        let mut registry = ComponentRegistry::new();
        let id = registry.register::<Position>();
        let (handle, pos) = registry.acquire::<Position>(id);
        pos.x = 5.0;
        registry.release::<Position>(id, handle);

        let (handle2, pos2) = registry.acquire::<Position>(id);
        assert_eq!(pos2.x, 0.0, "reset should restore default state");
        let _ = handle2;
    }

    #[test]
    fn degenerate_components_never_reuse_slots() {
        let mut registry = ComponentRegistry::new();
        let id = registry.register::<ExternalHandle>();
        let (h1, _) = registry.acquire::<ExternalHandle>(id);
        registry.release::<ExternalHandle>(id, h1);
        let (h2, _) = registry.acquire::<ExternalHandle>(id);
        assert_ne!(h1, h2);
    }

    #[test]
    fn live_count_tracks_attach_and_release() {
        let mut registry = ComponentRegistry::new();
        let id = registry.register::<Position>();
        registry.component_added_to_entity(id);
        registry.component_added_to_entity(id);
        assert_eq!(registry.live_count(id), 2);
        registry.component_removed_from_entity(id);
        assert_eq!(registry.live_count(id), 1);
    }
}

/// A fixed list of component types, used by `World`/`EntityMut` for
/// `has_all_components`/`has_any_components` without requiring a
/// heterogeneous runtime list. Implemented for tuples of `Component`
/// types up to arity 8, the same convention the teacher's query
/// module used for tuple-of-type traits.
///
/// Deliberately sealed (`pub(crate)`): its method signature leaks the
/// crate-private `ComponentRegistry`, so it can only ever be used as a
/// bound on this crate's own public methods, never implemented by a
/// downstream crate.
pub(crate) trait ComponentTypeList {
    /// `None` for any type in the list that was never registered —
    /// such a type can never be attached, so it never satisfies
    /// `has_all_components`/contributes to `has_any_components`.
    fn ids(registry: &ComponentRegistry) -> Vec<Option<ComponentId>>;
}

macro_rules! impl_component_type_list {
    ($($t:ident),+) => {
        impl<$($t: Component),+> ComponentTypeList for ($($t,)+) {
            fn ids(registry: &ComponentRegistry) -> Vec<Option<ComponentId>> {
                vec![$(registry.id_of::<$t>()),+]
            }
        }
    };
}

impl_component_type_list!(A);
impl_component_type_list!(A, B);
impl_component_type_list!(A, B, C);
impl_component_type_list!(A, B, C, D);
impl_component_type_list!(A, B, C, D, E);
impl_component_type_list!(A, B, C, D, E, F);
impl_component_type_list!(A, B, C, D, E, F, G);
impl_component_type_list!(A, B, C, D, E, F, G, H);
