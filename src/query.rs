//! Declarative component-set queries and the engine that keeps their
//! matched-entity sets in sync with the live component graph.

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::component::{Component, ComponentId, ComponentRegistry};
use crate::entity::Entity;
use crate::event::EventDispatcher;

/// One clause of a query: either "has this component" or "does not
/// have this component".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTerm {
    With(ComponentId),
    Without(ComponentId),
}

/// Opaque handle to a registered query, stable for the lifetime of the
/// `World` that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QueryId(pub(crate) u32);

/// The de-duplication key for a query: its positive and negated
/// component sets, each sorted. Two term lists that name the same
/// components in any order, with any duplicate terms, collapse to the
/// same signature and therefore the same `Query` object. Component
/// identity is already a canonical, per-type `ComponentId` assigned
/// once at registration, so sorting integers is sufficient — there is
/// no separate name-casing step to get consistent across call sites.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct QuerySignature {
    positive: Vec<ComponentId>,
    negated: Vec<ComponentId>,
}

impl QuerySignature {
    fn build(terms: &[QueryTerm]) -> Result<Self, crate::error::EcsError> {
        let mut positive: Vec<ComponentId> = terms
            .iter()
            .filter_map(|t| match t {
                QueryTerm::With(id) => Some(*id),
                QueryTerm::Without(_) => None,
            })
            .collect();
        let mut negated: Vec<ComponentId> = terms
            .iter()
            .filter_map(|t| match t {
                QueryTerm::Without(id) => Some(*id),
                QueryTerm::With(_) => None,
            })
            .collect();
        if positive.is_empty() {
            return Err(crate::error::EcsError::EmptyQuery);
        }
        positive.sort_unstable();
        positive.dedup();
        negated.sort_unstable();
        negated.dedup();
        Ok(Self { positive, negated })
    }
}

/// A live, incrementally maintained view over entities whose component
/// set satisfies a fixed set of positive/negated terms.
pub(crate) struct Query {
    id: QueryId,
    positive: SmallVec<[ComponentId; 4]>,
    negated: SmallVec<[ComponentId; 4]>,
    entities: Vec<Entity>,
    position: rustc_hash_shim::FxIndex,
    dispatcher: EventDispatcher,
    reactive: bool,
}

// `FxHashMap<Entity, usize>` would pull in the exact same dependency
// twice under two different names; reuse the one already in scope.
mod rustc_hash_shim {
    use crate::entity::Entity;
    use fxhash::FxHashMap;

    pub(crate) type FxIndex = FxHashMap<Entity, usize>;
}

impl Query {
    fn new(id: QueryId, signature: &QuerySignature) -> Self {
        Self {
            id,
            positive: signature.positive.iter().copied().collect(),
            negated: signature.negated.iter().copied().collect(),
            entities: Vec::new(),
            position: Default::default(),
            dispatcher: EventDispatcher::new(),
            reactive: false,
        }
    }

    pub(crate) fn id(&self) -> QueryId {
        self.id
    }

    pub(crate) fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub(crate) fn contains(&self, entity: Entity) -> bool {
        self.position.contains_key(&entity)
    }

    pub(crate) fn dispatcher_mut(&mut self) -> &mut EventDispatcher {
        &mut self.dispatcher
    }

    pub(crate) fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub(crate) fn set_reactive(&mut self) {
        self.reactive = true;
    }

    pub(crate) fn is_reactive(&self) -> bool {
        self.reactive
    }

    fn matches(&self, has: impl Fn(ComponentId) -> bool) -> bool {
        self.positive.iter().all(|id| has(*id)) && self.negated.iter().all(|id| !has(*id))
    }

    fn insert(&mut self, entity: Entity) {
        if self.position.contains_key(&entity) {
            return;
        }
        self.position.insert(entity, self.entities.len());
        self.entities.push(entity);
        self.dispatcher.dispatch("EntityAdded", &entity);
    }

    /// Swap-removes `entity`, keeping `position` consistent in O(1).
    fn remove(&mut self, entity: Entity) {
        let Some(index) = self.position.remove(&entity) else {
            return;
        };
        let last = self.entities.len() - 1;
        self.entities.swap_remove(index);
        if index != last {
            let moved = self.entities[index];
            self.position.insert(moved, index);
        }
        self.dispatcher.dispatch("EntityRemoved", &entity);
    }

    fn notify_changed(&mut self, entity: Entity, changed: ComponentId) {
        if self.reactive && self.position.contains_key(&entity) {
            self.dispatcher.dispatch("ComponentChanged", &(entity, changed));
        }
    }
}

/// Which queries an entity entered or left as the result of one
/// component mutation, so a caller can keep its own back-edge list
/// (entity -> queries it currently belongs to) in sync in O(changed)
/// rather than O(all queries).
#[derive(Debug, Default, Clone)]
pub(crate) struct MembershipChange {
    pub(crate) entered: SmallVec<[QueryId; 2]>,
    pub(crate) left: SmallVec<[QueryId; 2]>,
}

/// Owns every registered `Query` and keeps their matched-entity sets
/// current as components are added to, or removed from, live entities.
#[derive(Default)]
pub(crate) struct QueryEngine {
    queries: Vec<Query>,
    by_signature: IndexMap<QuerySignature, QueryId>,
}

impl QueryEngine {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the `QueryId` for `terms`, creating and seeding a new
    /// `Query` the first time this signature is seen. `live_entities`
    /// and `has_component` are supplied by the caller (the
    /// `EntityStore`) so this engine never needs to know how component
    /// membership is actually stored.
    pub(crate) fn get_query(
        &mut self,
        terms: &[QueryTerm],
        live_entities: impl Iterator<Item = Entity>,
        has_component: impl Fn(Entity, ComponentId) -> bool,
    ) -> Result<QueryId, crate::error::EcsError> {
        let signature = QuerySignature::build(terms)?;
        if let Some(id) = self.by_signature.get(&signature) {
            return Ok(*id);
        }

        let id = QueryId(self.queries.len() as u32);
        let mut query = Query::new(id, &signature);
        for entity in live_entities {
            if query.matches(|cid| has_component(entity, cid)) {
                // Seeding never fires `EntityAdded`; membership at
                // construction time is not a change.
                let index = query.entities.len();
                query.entities.push(entity);
                query.position.insert(entity, index);
            }
        }
        self.queries.push(query);
        self.by_signature.insert(signature, id);
        Ok(id)
    }

    pub(crate) fn query(&self, id: QueryId) -> &Query {
        &self.queries[id.0 as usize]
    }

    pub(crate) fn query_mut(&mut self, id: QueryId) -> &mut Query {
        &mut self.queries[id.0 as usize]
    }

    /// `(id, term_count, entity_count)` for every registered query, in
    /// registration order, for `World::stats()`.
    pub(crate) fn stats(&self) -> Vec<(QueryId, usize, usize)> {
        self.queries
            .iter()
            .map(|q| (q.id, q.positive.len() + q.negated.len(), q.entities.len()))
            .collect()
    }

    /// Called after `component_id` is attached to `entity`. Every query
    /// is visited in the order its signature was first seen, matching
    /// the deterministic event-ordering guarantee.
    pub(crate) fn on_component_added(
        &mut self,
        entity: Entity,
        component_id: ComponentId,
        has_component: impl Fn(Entity, ComponentId) -> bool,
    ) -> MembershipChange {
        let mut change = MembershipChange::default();
        for query in &mut self.queries {
            if query.negated.contains(&component_id) {
                if query.contains(entity) {
                    query.remove(entity);
                    change.left.push(query.id());
                }
            } else if query.positive.contains(&component_id)
                && !query.contains(entity)
                && query.matches(|cid| has_component(entity, cid))
            {
                query.insert(entity);
                change.entered.push(query.id());
            }
        }
        change
    }

    /// Called after `component_id` is logically detached from `entity`
    /// (the moment `remove_component` returns, not at deferred-commit
    /// time).
    pub(crate) fn on_component_removed(
        &mut self,
        entity: Entity,
        component_id: ComponentId,
        has_component: impl Fn(Entity, ComponentId) -> bool,
    ) -> MembershipChange {
        let mut change = MembershipChange::default();
        for query in &mut self.queries {
            if query.negated.contains(&component_id)
                && !query.contains(entity)
                && query.matches(|cid| has_component(entity, cid))
            {
                query.insert(entity);
                change.entered.push(query.id());
            } else if query.positive.contains(&component_id) && query.contains(entity) {
                query.remove(entity);
                change.left.push(query.id());
            }
        }
        change
    }

    /// Removes `entity` from every query named in its back-edge list.
    /// The caller (`EntityStore`) owns that list; walking it instead
    /// of every registered query is what makes removal O(queries the
    /// entity actually belonged to) rather than O(all queries).
    pub(crate) fn on_entity_removed(&mut self, entity: Entity, back_edges: &[QueryId]) {
        for &id in back_edges {
            self.queries[id.0 as usize].remove(entity);
        }
    }

    /// Fires `ComponentChanged` on every reactive query currently
    /// containing `entity`, in response to a `get_mut::<T>()` access.
    pub(crate) fn on_component_changed(&mut self, entity: Entity, changed: ComponentId) {
        for query in &mut self.queries {
            query.notify_changed(entity, changed);
        }
    }
}

/// Builds a positive [`QueryTerm`] for `T`, registering it against
/// `world` first if this is the first time it's named. For assembling
/// a runtime-determined `Vec<QueryTerm>` to hand to
/// [`crate::world::World::query_with_terms`]; the tuple form
/// (`world.query::<(A, Not<B>)>()`) is the more ergonomic choice when
/// the clause set is known at compile time.
pub fn with<T: Component>(world: &mut crate::world::World) -> QueryTerm {
    QueryTerm::With(world.register_component::<T>())
}

/// As [`with`], but for a negated term.
pub fn without<T: Component>(world: &mut crate::world::World) -> QueryTerm {
    QueryTerm::Without(world.register_component::<T>())
}

/// Negates a clause in a typed query spec: `Not::<Frozen>` rather than
/// `Frozen` asserts the entity must *not* carry that component.
pub struct Not<T>(std::marker::PhantomData<fn() -> T>);

/// One clause of a typed query spec — a bare `T: Component` clause
/// asserts presence, `Not<T>` asserts absence.
///
/// Sealed on the crate-private `ComponentRegistry`, mirroring
/// [`crate::component::ComponentTypeList`]: it exists only to let
/// `World::query` accept tuples of component types, not as an
/// extension point for downstream types.
pub(crate) trait QueryClause {
    fn term(registry: &mut ComponentRegistry) -> QueryTerm;
}

impl<T: Component> QueryClause for T {
    fn term(registry: &mut ComponentRegistry) -> QueryTerm {
        QueryTerm::With(registry.register::<T>())
    }
}

impl<T: Component> QueryClause for Not<T> {
    fn term(registry: &mut ComponentRegistry) -> QueryTerm {
        QueryTerm::Without(registry.register::<T>())
    }
}

/// A typed query spec: a tuple of clauses, each either a component
/// type (positive) or `Not<T>` (negated). `World::query::<(A, Not<B>)>()`
/// reads the same way the spec's own query-spec sequences do, without
/// the caller ever touching a `ComponentId` or building a `Vec`
/// themselves. Implemented for tuples up to arity 8, matching
/// [`crate::component::ComponentTypeList`]'s ceiling.
pub(crate) trait QuerySpec {
    fn terms(registry: &mut ComponentRegistry) -> Vec<QueryTerm>;
}

macro_rules! impl_query_spec_tuple {
    ($($t:ident),+) => {
        impl<$($t: QueryClause),+> QuerySpec for ($($t,)+) {
            fn terms(registry: &mut ComponentRegistry) -> Vec<QueryTerm> {
                vec![$($t::term(registry)),+]
            }
        }
    };
}

impl_query_spec_tuple!(A);
impl_query_spec_tuple!(A, B);
impl_query_spec_tuple!(A, B, C);
impl_query_spec_tuple!(A, B, C, D);
impl_query_spec_tuple!(A, B, C, D, E);
impl_query_spec_tuple!(A, B, C, D, E, F);
impl_query_spec_tuple!(A, B, C, D, E, F, G);
impl_query_spec_tuple!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Entity;

    fn e(index: u32) -> Entity {
        Entity::from_raw_parts(index, 0)
    }

    fn c(value: u32) -> ComponentId {
        ComponentId(value)
    }

    #[test]
    fn identical_terms_in_different_order_share_one_query() {
        let a = c(1);
        let b = c(2);
        let mut engine = QueryEngine::new();
        let q1 = engine
            .get_query(
                &[QueryTerm::With(a), QueryTerm::With(b)],
                std::iter::empty(),
                |_, _| false,
            )
            .unwrap();
        let q2 = engine
            .get_query(
                &[QueryTerm::With(b), QueryTerm::With(a)],
                std::iter::empty(),
                |_, _| false,
            )
            .unwrap();
        assert_eq!(q1, q2);
    }

    #[test]
    fn duplicate_terms_do_not_change_the_signature() {
        let a = c(1);
        let mut engine = QueryEngine::new();
        let q1 = engine
            .get_query(&[QueryTerm::With(a)], std::iter::empty(), |_, _| false)
            .unwrap();
        let q2 = engine
            .get_query(
                &[QueryTerm::With(a), QueryTerm::With(a)],
                std::iter::empty(),
                |_, _| false,
            )
            .unwrap();
        assert_eq!(q1, q2);
    }

    #[test]
    fn empty_positive_set_is_rejected() {
        let b = c(2);
        let mut engine = QueryEngine::new();
        let result = engine.get_query(&[QueryTerm::Without(b)], std::iter::empty(), |_, _| false);
        assert!(matches!(result, Err(crate::error::EcsError::EmptyQuery)));
    }

    #[test]
    fn seeding_matches_existing_entities_without_firing_events() {
        let a = c(1);
        let mut engine = QueryEngine::new();
        let entity = e(0);
        let id = engine
            .get_query(&[QueryTerm::With(a)], std::iter::once(entity), |_, _| true)
            .unwrap();
        assert_eq!(engine.query(id).entities(), &[entity]);
        assert_eq!(engine.query(id).dispatcher().stats().fired, 0);
    }

    #[test]
    fn add_then_remove_toggles_membership() {
        let a = c(1);
        let mut engine = QueryEngine::new();
        let id = engine
            .get_query(&[QueryTerm::With(a)], std::iter::empty(), |_, _| false)
            .unwrap();
        let entity = e(0);

        engine.on_component_added(entity, a, |_, cid| cid == a);
        assert!(engine.query(id).contains(entity));

        engine.on_component_removed(entity, a, |_, _| false);
        assert!(!engine.query(id).contains(entity));
    }

    #[test]
    fn negated_term_flips_membership_on_toggle() {
        let a = c(1);
        let mut engine = QueryEngine::new();
        let entity = e(0);
        let id = engine
            .get_query(
                &[QueryTerm::With(a), QueryTerm::Without(a)],
                std::iter::empty(),
                |_, _| false,
            )
            .unwrap();
        // unreachable in practice (With+Without same id never matches),
        // exercised here purely to pin down the evaluation order.
        let _ = id;

        let b = c(2);
        let mut engine = QueryEngine::new();
        let id = engine
            .get_query(
                &[QueryTerm::With(a), QueryTerm::Without(b)],
                std::iter::once(entity),
                |_, cid| cid == a,
            )
            .unwrap();
        assert!(engine.query(id).contains(entity));

        engine.on_component_added(entity, b, |_, cid| cid == a || cid == b);
        assert!(!engine.query(id).contains(entity));

        engine.on_component_removed(entity, b, |_, cid| cid == a);
        assert!(engine.query(id).contains(entity));
    }
}
