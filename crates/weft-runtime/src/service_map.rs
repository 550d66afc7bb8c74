//! The service registry
//!
//! `ServiceMap` tracks which service types are currently present and who
//! provides them. Plain services have exactly one provider; container
//! services delegate to a lazily-created aggregator and are published only
//! while populated. Presence transitions fire [`ServiceEvent`]s exactly
//! once per absent/present flip, which is what drives resolution
//! propagation.
//!
//! A map may chain to a parent map: `contains`/`get` fall through when a
//! service is absent locally, and parent transitions are re-broadcast to
//! the child's listeners so one propagation mechanism covers nested scopes.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;
use weft_domain::{
    ContainerService, Error, InstanceKey, MakeContainerFn, ProvidedService, ProviderKind, Result,
    ServiceContainer, ServiceEvent, ServiceEventKind, ServiceHandle, ServiceLookup, ServiceTypeId,
    SubscriptionId,
};

type Listener = Rc<dyn Fn(&ServiceEvent)>;

#[derive(Clone)]
enum ServiceEntry {
    Plain(ServiceHandle),
    Container {
        container: Rc<dyn ServiceContainer>,
        handle: ServiceHandle,
    },
}

struct MapInner {
    entries: RefCell<HashMap<ServiceTypeId, ServiceEntry>>,
    listeners: RefCell<Vec<(SubscriptionId, Listener)>>,
    next_subscription: Cell<u64>,
    parent: Option<ServiceMap>,
    parent_subscription: Cell<Option<SubscriptionId>>,
}

impl Drop for MapInner {
    fn drop(&mut self) {
        if let (Some(parent), Some(subscription)) = (&self.parent, self.parent_subscription.take())
        {
            parent.unsubscribe(subscription);
        }
    }
}

/// Service type to provider mapping, with presence events
#[derive(Clone)]
pub struct ServiceMap {
    inner: Rc<MapInner>,
}

impl ServiceMap {
    /// Create an empty root map
    pub fn new() -> Self {
        Self {
            inner: Rc::new(MapInner {
                entries: RefCell::new(HashMap::new()),
                listeners: RefCell::new(Vec::new()),
                next_subscription: Cell::new(0),
                parent: None,
                parent_subscription: Cell::new(None),
            }),
        }
    }

    /// Create a map chained to a parent.
    ///
    /// Lookups fall through to the parent; parent presence transitions are
    /// re-broadcast to this map's listeners.
    pub fn with_parent(parent: &Self) -> Self {
        let map = Self {
            inner: Rc::new(MapInner {
                entries: RefCell::new(HashMap::new()),
                listeners: RefCell::new(Vec::new()),
                next_subscription: Cell::new(0),
                parent: Some(parent.clone()),
                parent_subscription: Cell::new(None),
            }),
        };
        let weak = Rc::downgrade(&map.inner);
        let subscription = parent.subscribe(Rc::new(move |event: &ServiceEvent| {
            if let Some(inner) = weak.upgrade() {
                ServiceMap { inner }.emit(*event);
            }
        }));
        map.inner.parent_subscription.set(Some(subscription));
        map
    }

    /// Subscribe to presence transitions
    pub fn subscribe(&self, listener: Listener) -> SubscriptionId {
        let raw = self.inner.next_subscription.get();
        self.inner.next_subscription.set(raw + 1);
        let id = SubscriptionId::from_raw(raw);
        self.inner.listeners.borrow_mut().push((id, listener));
        id
    }

    /// Remove a presence listener
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Publish a projected provider handle under a provided-service
    /// declaration
    pub fn register_published(
        &self,
        provided: &ProvidedService,
        handle: ServiceHandle,
    ) -> Result<()> {
        match provided.kind() {
            ProviderKind::Plain => self.register_handle(provided.service(), handle),
            ProviderKind::Container { make } => {
                self.register_member_with(provided.service(), make, &handle)
            }
        }
    }

    /// Withdraw a previously published provider handle
    pub fn unregister_published(
        &self,
        provided: &ProvidedService,
        handle: &ServiceHandle,
    ) -> Result<()> {
        match provided.kind() {
            ProviderKind::Plain => self.unregister_handle(provided.service(), handle.key()),
            ProviderKind::Container { .. } => {
                self.unregister_member_inner(provided.service(), handle)
            }
        }
    }

    /// Register a plain provider handle under a service type.
    ///
    /// A plain service type has at most one provider; a second registration
    /// without an intervening unregister is a configuration error.
    pub fn register_handle(&self, service: ServiceTypeId, handle: ServiceHandle) -> Result<()> {
        {
            let mut entries = self.inner.entries.borrow_mut();
            if entries.contains_key(&service) {
                return Err(Error::already_registered(service));
            }
            entries.insert(service, ServiceEntry::Plain(handle));
        }
        debug!(service = %service, "registering service");
        self.emit(ServiceEvent {
            service,
            kind: ServiceEventKind::Registered,
        });
        Ok(())
    }

    /// Unregister the plain provider of a service type.
    ///
    /// The key must identify the currently registered provider.
    pub fn unregister_handle(&self, service: ServiceTypeId, key: InstanceKey) -> Result<()> {
        {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get(&service) {
                None => return Err(Error::not_registered(service)),
                Some(ServiceEntry::Plain(handle)) => {
                    if handle.key() != key {
                        return Err(Error::provider_mismatch(service));
                    }
                }
                Some(ServiceEntry::Container { .. }) => {
                    return Err(Error::contract(format!(
                        "service {service} is provided by a container"
                    )));
                }
            }
            entries.remove(&service);
        }
        debug!(service = %service, "unregistering service");
        self.emit(ServiceEvent {
            service,
            kind: ServiceEventKind::Unregistered,
        });
        Ok(())
    }

    /// Add a member to the container service `Ctr`, constructing the
    /// container on first need.
    pub fn register_member<Ctr: ContainerService + 'static>(
        &self,
        member: ServiceHandle,
    ) -> Result<()> {
        let make: MakeContainerFn = Rc::new(|| {
            let container = Ctr::make();
            let handle = ServiceHandle::new::<Ctr>(container.clone());
            (container as Rc<dyn ServiceContainer>, handle)
        });
        self.register_member_with(ServiceTypeId::of::<Ctr>(), &make, &member)
    }

    /// Remove a member from the container service `Ctr`
    pub fn unregister_member<Ctr: ContainerService + 'static>(
        &self,
        member: &ServiceHandle,
    ) -> Result<()> {
        self.unregister_member_inner(ServiceTypeId::of::<Ctr>(), member)
    }

    fn register_member_with(
        &self,
        service: ServiceTypeId,
        make: &MakeContainerFn,
        member: &ServiceHandle,
    ) -> Result<()> {
        let existing = self.inner.entries.borrow().get(&service).cloned();
        match existing {
            Some(ServiceEntry::Container { container, .. }) => container.register(member),
            Some(ServiceEntry::Plain(_)) => Err(Error::contract(format!(
                "service {service} has a plain provider and cannot accept members"
            ))),
            None => {
                let (container, handle) = (make.as_ref())();
                container.register(member)?;
                // Publish only once the container confirms itself populated,
                // so an empty container never satisfies a dependent.
                if container.populated() {
                    self.inner
                        .entries
                        .borrow_mut()
                        .insert(service, ServiceEntry::Container { container, handle });
                    debug!(service = %service, "registering container service");
                    self.emit(ServiceEvent {
                        service,
                        kind: ServiceEventKind::Registered,
                    });
                }
                Ok(())
            }
        }
    }

    fn unregister_member_inner(
        &self,
        service: ServiceTypeId,
        member: &ServiceHandle,
    ) -> Result<()> {
        let existing = self.inner.entries.borrow().get(&service).cloned();
        match existing {
            None => Err(Error::not_registered(service)),
            Some(ServiceEntry::Plain(_)) => Err(Error::contract(format!(
                "service {service} has a plain provider, not a container"
            ))),
            Some(ServiceEntry::Container { container, .. }) => {
                container.unregister(member)?;
                if !container.populated() {
                    self.inner.entries.borrow_mut().remove(&service);
                    debug!(service = %service, "unregistering container service");
                    self.emit(ServiceEvent {
                        service,
                        kind: ServiceEventKind::Unregistered,
                    });
                }
                Ok(())
            }
        }
    }

    /// Whether a service type is present here or in a parent scope
    pub fn contains(&self, service: ServiceTypeId) -> bool {
        if self.inner.entries.borrow().contains_key(&service) {
            return true;
        }
        match &self.inner.parent {
            Some(parent) => parent.contains(service),
            None => false,
        }
    }

    /// Whether every listed service type is present
    pub fn contains_all(&self, services: &[ServiceTypeId]) -> bool {
        services.iter().all(|service| self.contains(*service))
    }

    /// Fetch the provider handle for a service type, falling through to the
    /// parent scope when absent locally
    pub fn get_handle(&self, service: ServiceTypeId) -> Result<ServiceHandle> {
        let local = {
            let entries = self.inner.entries.borrow();
            entries.get(&service).map(|entry| match entry {
                ServiceEntry::Plain(handle) => handle.clone(),
                ServiceEntry::Container { handle, .. } => handle.clone(),
            })
        };
        if let Some(handle) = local {
            return Ok(handle);
        }
        match &self.inner.parent {
            Some(parent) => parent.get_handle(service),
            None => Err(Error::not_registered(service)),
        }
    }

    /// Fetch the aggregator behind a container service, if one is
    /// published. Useful for introspection; downcast to the concrete
    /// container type for typed access.
    pub fn get_container(&self, service: ServiceTypeId) -> Option<Rc<dyn ServiceContainer>> {
        {
            let entries = self.inner.entries.borrow();
            match entries.get(&service) {
                Some(ServiceEntry::Container { container, .. }) => {
                    return Some(Rc::clone(container));
                }
                // A local plain provider shadows any parent container.
                Some(ServiceEntry::Plain(_)) => return None,
                None => {}
            }
        }
        self.inner
            .parent
            .as_ref()
            .and_then(|parent| parent.get_container(service))
    }

    /// Fetch a typed provider for service type `S`
    pub fn get<S: ?Sized + 'static>(&self) -> Result<Rc<S>> {
        let id = ServiceTypeId::of::<S>();
        self.get_handle(id)?
            .downcast::<S>()
            .ok_or_else(|| Error::contract(format!("provider for {id} has the wrong type")))
    }

    /// Number of service types present locally (excludes parent scopes)
    pub fn service_count(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    fn emit(&self, event: ServiceEvent) {
        // Snapshot the listener list so a listener may re-enter the map or
        // change subscriptions while the event is being delivered.
        let snapshot: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();
        for listener in snapshot {
            listener(&event);
        }
    }
}

impl Default for ServiceMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceLookup for ServiceMap {
    fn lookup(&self, service: ServiceTypeId) -> Result<ServiceHandle> {
        self.get_handle(service)
    }

    fn contains(&self, service: ServiceTypeId) -> bool {
        ServiceMap::contains(self, service)
    }
}

impl fmt::Debug for ServiceMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceMap")
            .field("service_count", &self.service_count())
            .field(
                "services",
                &self
                    .inner
                    .entries
                    .borrow()
                    .keys()
                    .map(|id| id.name())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
