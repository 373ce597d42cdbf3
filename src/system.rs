//! Systems, their declared query/event bindings, and the scheduler
//! that runs them in priority order once per frame.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use downcast_rs::{impl_downcast, Downcast};
use fxhash::FxHashMap;
use parking_lot::Mutex;
use tracing::{debug, span, Level};

use crate::component::ComponentId;
use crate::entity::{Entity, EntityStore};
use crate::event::EventDispatcher;
use crate::query::{QueryEngine, QueryId, QueryTerm};
use crate::world::EntityMut;

/// A unit of per-frame behavior. Implemented by user types and
/// registered with a `World`.
///
/// `init` is called once, the first time the scheduler runs this
/// system, and declares the queries and events the system wants bound
/// for every subsequent `execute` call.
pub trait System: Downcast {
    fn init(&mut self) -> SystemConfig {
        SystemConfig::default()
    }

    fn execute(&mut self, delta: f32, time: f64, ctx: &mut SystemContext<'_>);
}
impl_downcast!(System);

/// Registration-time attributes for a system.
#[derive(Debug, Clone, Copy)]
pub struct SystemAttrs {
    /// Lower runs first. Ties broken by registration order.
    pub priority: i32,
}

impl Default for SystemAttrs {
    fn default() -> Self {
        Self { priority: 0 }
    }
}

/// The reactive events a query binding can forward into a system's
/// per-frame event buffer.
#[derive(Debug, Clone)]
pub enum SystemEvent {
    EntityAdded,
    EntityRemoved,
    /// Equivalent to subscribing to every component's change stream.
    EntityChanged,
    /// Only entities whose *changed* component is in this allow-list.
    ComponentChanged(Vec<ComponentId>),
}

/// One named query a system wants resolved and kept live across
/// frames, plus the reactive events it wants buffered from that query.
#[derive(Debug, Clone)]
pub struct QueryBinding {
    pub spec: Vec<QueryTerm>,
    /// If true, this system's `can_execute` fails whenever this query
    /// is empty.
    pub mandatory: bool,
    pub events: Vec<SystemEvent>,
}

/// What a system declares it needs, returned from `System::init`.
#[derive(Debug, Clone, Default)]
pub struct SystemConfig {
    pub queries: HashMap<String, QueryBinding>,
    /// Binding name -> world-level event name to forward into it.
    pub events: HashMap<String, String>,
}

/// One entity (or entity/component pair) delivered through a query
/// event binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventPayload {
    EntityAdded(Entity),
    EntityRemoved(Entity),
    ComponentChanged(Entity, ComponentId),
}

enum BufferedEvent {
    Query(SystemEventPayload),
    World(Arc<dyn Any + Send + Sync>),
}

type EventBuffers = Arc<Mutex<FxHashMap<String, Vec<BufferedEvent>>>>;

/// Borrowed view into the `World` handed to `System::execute`.
///
/// Exposes the system's resolved query bindings and event buffers by
/// name, plus entity mutation through the same `EntityMut` handle
/// `World` itself hands out.
pub struct SystemContext<'a> {
    entities: &'a mut EntityStore,
    components: &'a mut crate::component::ComponentRegistry,
    queries: &'a mut QueryEngine,
    dispatcher: &'a mut EventDispatcher,
    query_ids: &'a FxHashMap<String, QueryId>,
    event_buffers: &'a EventBuffers,
}

impl<'a> SystemContext<'a> {
    /// The live entity set currently matching the query bound under
    /// `name`. Empty (not a panic) if no such binding exists.
    pub fn query(&self, name: &str) -> &[Entity] {
        match self.query_ids.get(name) {
            Some(id) => self.queries.query(*id).entities(),
            None => &[],
        }
    }

    /// Entity/component events buffered for the binding named `name`
    /// since the system's last turn.
    pub fn events(&self, name: &str) -> impl Iterator<Item = SystemEventPayload> + '_ {
        let buffers = self.event_buffers.lock();
        let items: Vec<SystemEventPayload> = buffers
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|e| match e {
                BufferedEvent::Query(payload) => Some(*payload),
                BufferedEvent::World(_) => None,
            })
            .collect();
        items.into_iter()
    }

    /// World-level events of type `T` forwarded into the binding named
    /// `name` via `SystemConfig::events`.
    pub fn world_events<T: 'static + Clone>(&self, name: &str) -> Vec<T> {
        let buffers = self.event_buffers.lock();
        buffers
            .get(name)
            .into_iter()
            .flatten()
            .filter_map(|e| match e {
                BufferedEvent::World(payload) => payload.downcast_ref::<T>().cloned(),
                BufferedEvent::Query(_) => None,
            })
            .collect()
    }

    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.create_entity();
        self.dispatcher.dispatch("EntityCreated", &entity);
        entity
    }

    pub fn entity_mut(&mut self, entity: Entity) -> EntityMut<'_> {
        EntityMut::new(self.entities, self.components, self.queries, self.dispatcher, entity)
    }

    pub fn emit_event<T: Send + Sync + 'static>(&mut self, name: &str, payload: T) {
        let payload: Arc<dyn Any + Send + Sync> = Arc::new(payload);
        self.dispatcher.dispatch(name, &payload);
    }
}

struct SystemEntry {
    system: Box<dyn System>,
    type_id: TypeId,
    order: usize,
    priority: i32,
    enabled: bool,
    initialized: bool,
    config: SystemConfig,
    query_ids: FxHashMap<String, QueryId>,
    event_buffers: EventBuffers,
    execute_time: Option<Duration>,
}

/// Resolves a system's `init()` output against the live `QueryEngine`
/// and wires up the listeners that fill its per-frame event buffers.
fn initialize_system(
    entry: &mut SystemEntry,
    entities: &EntityStore,
    queries: &mut QueryEngine,
    world_dispatcher: &mut EventDispatcher,
) -> Result<(), crate::error::EcsError> {
    entry.config = entry.system.init();

    for (name, binding) in &entry.config.queries {
        let id = queries.get_query(&binding.spec, entities.live_entities(), |e, cid| {
            entities.has_component(e, cid)
        })?;
        entry.query_ids.insert(name.clone(), id);

        if !binding.events.is_empty() {
            let query = queries.query_mut(id);
            for event in &binding.events {
                match event {
                    SystemEvent::EntityAdded => {
                        let buffers = Arc::clone(&entry.event_buffers);
                        let binding_name = name.clone();
                        query.dispatcher_mut().add("EntityAdded", move |payload| {
                            let entity = *payload.downcast_ref::<Entity>().unwrap();
                            buffers
                                .lock()
                                .entry(binding_name.clone())
                                .or_default()
                                .push(BufferedEvent::Query(SystemEventPayload::EntityAdded(
                                    entity,
                                )));
                        });
                    }
                    SystemEvent::EntityRemoved => {
                        let buffers = Arc::clone(&entry.event_buffers);
                        let binding_name = name.clone();
                        query.dispatcher_mut().add("EntityRemoved", move |payload| {
                            let entity = *payload.downcast_ref::<Entity>().unwrap();
                            buffers
                                .lock()
                                .entry(binding_name.clone())
                                .or_default()
                                .push(BufferedEvent::Query(SystemEventPayload::EntityRemoved(
                                    entity,
                                )));
                        });
                    }
                    SystemEvent::EntityChanged => {
                        query.set_reactive();
                        let buffers = Arc::clone(&entry.event_buffers);
                        let binding_name = name.clone();
                        query.dispatcher_mut().add("ComponentChanged", move |payload| {
                            let (entity, changed) =
                                *payload.downcast_ref::<(Entity, ComponentId)>().unwrap();
                            buffers
                                .lock()
                                .entry(binding_name.clone())
                                .or_default()
                                .push(BufferedEvent::Query(SystemEventPayload::ComponentChanged(
                                    entity, changed,
                                )));
                        });
                    }
                    SystemEvent::ComponentChanged(allow) => {
                        query.set_reactive();
                        let buffers = Arc::clone(&entry.event_buffers);
                        let binding_name = name.clone();
                        let allow = allow.clone();
                        query.dispatcher_mut().add("ComponentChanged", move |payload| {
                            let (entity, changed) =
                                *payload.downcast_ref::<(Entity, ComponentId)>().unwrap();
                            if allow.contains(&changed) {
                                buffers
                                    .lock()
                                    .entry(binding_name.clone())
                                    .or_default()
                                    .push(BufferedEvent::Query(
                                        SystemEventPayload::ComponentChanged(entity, changed),
                                    ));
                            }
                        });
                    }
                }
            }
        }
    }

    for (binding_name, world_event_name) in &entry.config.events {
        let buffers = Arc::clone(&entry.event_buffers);
        let binding_name = binding_name.clone();
        world_dispatcher.add(world_event_name, move |payload: &dyn Any| {
            if let Some(cloneable) = downcast_to_arc(payload) {
                buffers
                    .lock()
                    .entry(binding_name.clone())
                    .or_default()
                    .push(BufferedEvent::World(cloneable));
            }
        });
    }

    entry.initialized = true;
    Ok(())
}

/// `EventDispatcher::dispatch` only ever gives listeners a borrowed
/// `&dyn Any`; world-level event payloads must already be reachable as
/// a cheaply-clonable `Arc` for a listener to buffer one past the
/// dispatch call. `World::emit_event` is the only producer and always
/// supplies one.
fn downcast_to_arc(payload: &dyn Any) -> Option<Arc<dyn Any + Send + Sync>> {
    payload
        .downcast_ref::<Arc<dyn Any + Send + Sync>>()
        .cloned()
}

/// Either an instance's runtime type, or a type named directly.
/// Removing a system by `&dyn System` and removing it by `S::type_id()`
/// both resolve to the same comparison, so `remove_system` can never be
/// handed an ambiguous key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveSystemKey {
    Instance(TypeId),
    Type(TypeId),
}

impl RemoveSystemKey {
    pub fn of<S: System>() -> Self {
        RemoveSystemKey::Type(TypeId::of::<S>())
    }

    pub fn instance(system: &dyn System) -> Self {
        RemoveSystemKey::Instance(system.as_any().type_id())
    }

    fn type_id(&self) -> TypeId {
        match self {
            RemoveSystemKey::Instance(id) | RemoveSystemKey::Type(id) => *id,
        }
    }
}

/// Ordered collection of systems, executed once per frame in
/// `(priority asc, registration order asc)` order.
#[derive(Default)]
pub(crate) struct Scheduler {
    systems: Vec<SystemEntry>,
    next_order: usize,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register_system<S: System + 'static>(&mut self, system: S, attrs: SystemAttrs) {
        let entry = SystemEntry {
            system: Box::new(system),
            type_id: TypeId::of::<S>(),
            order: self.next_order,
            priority: attrs.priority,
            enabled: true,
            initialized: false,
            config: SystemConfig::default(),
            query_ids: FxHashMap::default(),
            event_buffers: Arc::new(Mutex::new(FxHashMap::default())),
            execute_time: None,
        };
        self.next_order += 1;
        self.systems.push(entry);
        self.systems
            .sort_by_key(|e| (e.priority, e.order));
    }

    pub(crate) fn remove_system(&mut self, key: RemoveSystemKey) -> bool {
        let target = key.type_id();
        if let Some(pos) = self.systems.iter().position(|e| e.type_id == target) {
            self.systems.remove(pos);
            true
        } else {
            false
        }
    }

    pub(crate) fn get_system<S: System>(&self) -> Option<&S> {
        self.systems
            .iter()
            .find_map(|e| e.system.as_any().downcast_ref::<S>())
    }

    pub(crate) fn get_system_mut<S: System>(&mut self) -> Option<&mut S> {
        self.systems
            .iter_mut()
            .find_map(|e| e.system.as_any_mut().downcast_mut::<S>())
    }

    pub(crate) fn len(&self) -> usize {
        self.systems.len()
    }

    /// `TypeId`s of every registered system, in the order they will run
    /// this frame (`priority` asc, then registration order asc).
    pub(crate) fn type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
        self.systems.iter().map(|e| e.type_id)
    }

    fn can_execute(entry: &SystemEntry, queries: &QueryEngine) -> bool {
        entry.config.queries.iter().all(|(name, binding)| {
            if !binding.mandatory {
                return true;
            }
            match entry.query_ids.get(name) {
                Some(id) => !queries.query(*id).entities().is_empty(),
                None => false,
            }
        })
    }

    pub(crate) fn execute(
        &mut self,
        delta: f32,
        time: f64,
        entities: &mut EntityStore,
        components: &mut crate::component::ComponentRegistry,
        queries: &mut QueryEngine,
        dispatcher: &mut EventDispatcher,
    ) -> Result<(), crate::error::EcsError> {
        let frame = span!(Level::TRACE, "world_execute_frame");
        let _guard = frame.enter();

        for index in 0..self.systems.len() {
            let should_run = {
                let entry = &mut self.systems[index];
                if !entry.initialized {
                    initialize_system(entry, entities, queries, dispatcher)?;
                }
                entry.enabled && Self::can_execute(entry, queries)
            };

            if should_run {
                let entry = &mut self.systems[index];
                let mut ctx = SystemContext {
                    entities,
                    components,
                    queries,
                    dispatcher,
                    query_ids: &entry.query_ids,
                    event_buffers: &entry.event_buffers,
                };
                let started = Instant::now();
                entry.system.execute(delta, time, &mut ctx);
                entry.execute_time = Some(started.elapsed());
                debug!(elapsed = ?entry.execute_time, "system executed");
            }

            for bucket in self.systems[index].event_buffers.lock().values_mut() {
                bucket.clear();
            }
        }
        Ok(())
    }
}
