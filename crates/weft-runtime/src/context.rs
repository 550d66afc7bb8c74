//! The resolution engine
//!
//! A [`Context`] owns a service map, an instance map and a per-type
//! resolved flag, and drives the activate/deactivate transition protocol:
//! a concrete type is Resolved while every service it requires is present,
//! and every registered instance of it is activated on the flip to Resolved
//! and deactivated on the flip back. Presence transitions propagate through
//! the contract cache's reverse index — only the types that require the
//! flipped service are re-checked — and recurse until the graph is stable.
//!
//! ## Ownership
//!
//! The engine is single-logical-owner: all mutations are expected from one
//! cooperative scheduling domain, so the context is `!Send` and instances
//! are `Rc`. Suspending activate callbacks are driven with
//! [`tokio::task::spawn_local`]; register instances of asynchronous
//! components only from within a [`tokio::task::LocalSet`].
//!
//! ## Ordering guarantees
//!
//! - An instance registered into an already-Resolved type activates
//!   immediately.
//! - Deactivation withdraws the instance's published services (propagating
//!   to dependents) *before* its deactivate callback runs: dependents lose
//!   access before the provider considers itself torn down.
//! - Instances of the same concrete type have no defined relative order.
//!
//! ## Failure isolation
//!
//! A failing activate callback is logged and swallowed; the engine's own
//! bookkeeping proceeds as if the activation published nothing, and other
//! instances and types are unaffected.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, error, warn};
use weft_domain::{
    ActivationOutcome, Component, ContainerService, ContextOptions, Contract, Error,
    InstanceHandle, InstanceKey, Result, ServiceEvent, ServiceHandle, ServiceTypeId,
    SubscriptionId,
};

use crate::contract_cache::ContractCache;
use crate::instance_map::{InstanceEntry, InstanceMap};
use crate::service_map::ServiceMap;

struct TypeEntry {
    contract: Rc<Contract>,
    resolved: Cell<bool>,
}

struct ContextInner {
    options: ContextOptions,
    cache: Rc<ContractCache>,
    services: ServiceMap,
    instances: InstanceMap,
    entries: RefCell<HashMap<TypeId, TypeEntry>>,
    subscription: Cell<Option<SubscriptionId>>,
    handle_key: Cell<Option<InstanceKey>>,
    disposed: Cell<bool>,
}

/// The resolution engine. Cheap to clone; clones share one engine.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

/// Injectable reference to the engine an instance is registered against.
///
/// Published into every context's own service map at construction, so
/// components may require the engine itself (for example to register
/// further instances from an activate callback). Holds a weak reference;
/// it never keeps its engine alive.
pub struct ContextHandle {
    inner: Weak<ContextInner>,
}

impl ContextHandle {
    /// The engine this handle belongs to, if it is still alive
    pub fn context(&self) -> Result<Context> {
        self.inner
            .upgrade()
            .map(|inner| Context { inner })
            .ok_or_else(|| Error::internal("context has been dropped"))
    }
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

/// RAII registration: dropping the guard unregisters the instance.
///
/// The engine-side rendition of an external destruction hook — tie the
/// guard's lifetime to whatever owns the instance.
pub struct RegistrationGuard {
    release: Option<Box<dyn FnOnce()>>,
}

impl RegistrationGuard {
    /// Unregister now instead of at drop time
    pub fn release(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }

    /// Disarm the guard; the instance stays registered
    pub fn forget(mut self) {
        self.release = None;
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for RegistrationGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationGuard")
            .field("armed", &self.release.is_some())
            .finish()
    }
}

impl Context {
    /// Create an engine with default options and a fresh contract cache
    pub fn new() -> Self {
        Self::build(ContextOptions::default(), None, None)
    }

    /// Create an engine with the given options
    pub fn with_options(options: ContextOptions) -> Self {
        Self::build(options, None, None)
    }

    /// Create an engine sharing an existing contract cache.
    ///
    /// Contracts are pure functions of type shape, so a cache may be shared
    /// read-only between engines; resolved flags stay per-engine.
    pub fn with_cache(options: ContextOptions, cache: Rc<ContractCache>) -> Self {
        Self::build(options, None, Some(cache))
    }

    /// Create a child engine.
    ///
    /// The child's service lookups fall through to the parent, parent
    /// registrations propagate into the child, and the contract cache is
    /// shared.
    pub fn with_parent(parent: &Self) -> Self {
        Self::build(ContextOptions::default(), Some(parent), None)
    }

    /// Create a child engine with its own options
    pub fn with_parent_options(parent: &Self, options: ContextOptions) -> Self {
        Self::build(options, Some(parent), None)
    }

    fn build(options: ContextOptions, parent: Option<&Self>, cache: Option<Rc<ContractCache>>) -> Self {
        let cache = cache
            .or_else(|| parent.map(|parent| Rc::clone(&parent.inner.cache)))
            .unwrap_or_default();
        let services = match parent {
            Some(parent) => ServiceMap::with_parent(&parent.inner.services),
            None => ServiceMap::new(),
        };
        let inner = Rc::new(ContextInner {
            options,
            cache,
            services,
            instances: InstanceMap::new(),
            entries: RefCell::new(HashMap::new()),
            subscription: Cell::new(None),
            handle_key: Cell::new(None),
            disposed: Cell::new(false),
        });

        let weak = Rc::downgrade(&inner);
        let subscription = inner.services.subscribe(Rc::new(move |event: &ServiceEvent| {
            if let Some(inner) = weak.upgrade() {
                ContextInner::service_presence_changed(&inner, event);
            }
        }));
        inner.subscription.set(Some(subscription));

        // The engine itself is a service: components may require a
        // ContextHandle to reach the context they live in.
        let handle = Rc::new(ContextHandle {
            inner: Rc::downgrade(&inner),
        });
        let key = InstanceKey::of_rc(&handle);
        match inner
            .services
            .register_handle(ServiceTypeId::of::<ContextHandle>(), ServiceHandle::new::<ContextHandle>(handle))
        {
            Ok(()) => inner.handle_key.set(Some(key)),
            Err(err) => error!(context = %inner.options.name, %err, "failed to publish context handle"),
        }

        Self { inner }
    }

    /// Engine options
    pub fn options(&self) -> &ContextOptions {
        &self.inner.options
    }

    /// The engine's contract cache
    pub fn contract_cache(&self) -> &Rc<ContractCache> {
        &self.inner.cache
    }

    /// Register a live instance.
    ///
    /// Inert types (nothing provided, no callbacks) are skipped entirely.
    /// If the type is already Resolved the instance activates immediately.
    /// Registering the same instance twice is a soft warning (an error
    /// under `strict_instances`).
    pub fn register<C: Component>(&self, instance: Rc<C>) -> Result<()> {
        let inner = &self.inner;
        if inner.disposed.get() {
            return Err(Error::internal("context is disposed"));
        }

        let contract = inner.cache.get::<C>();
        if contract.is_inert() {
            return Ok(());
        }

        let resolved = inner.ensure_type_entry(&contract);
        let handle: InstanceHandle = instance;
        let key = InstanceKey::of(&handle);

        if inner.instances.contains(contract.type_id(), key) {
            if inner.options.strict_instances {
                return Err(Error::contract(format!(
                    "instance of {} is already registered",
                    contract.type_name()
                )));
            }
            warn!(
                context = %inner.options.name,
                component = contract.type_name(),
                "instance is already registered"
            );
            return Ok(());
        }

        let entry = inner.instances.add(contract.type_id(), handle);
        debug!(
            context = %inner.options.name,
            component = contract.type_name(),
            "instance registered"
        );

        if resolved {
            ContextInner::activate_instance(inner, &contract, &entry);
        }
        Ok(())
    }

    /// Register an instance and receive a guard that unregisters it on drop
    pub fn register_guarded<C: Component>(&self, instance: Rc<C>) -> Result<RegistrationGuard> {
        self.register(Rc::clone(&instance))?;
        let weak = Rc::downgrade(&self.inner);
        let release = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                let context = Context { inner };
                if let Err(err) = context.unregister(&instance) {
                    warn!(%err, "guarded unregistration failed");
                }
            }
        });
        Ok(RegistrationGuard {
            release: Some(release),
        })
    }

    /// Unregister a live instance.
    ///
    /// An active instance is deactivated first: its published services are
    /// withdrawn (cascading to dependents) and then its deactivate callback
    /// runs. Unregistering an unknown instance is a soft warning (an error
    /// under `strict_instances`).
    pub fn unregister<C: Component>(&self, instance: &Rc<C>) -> Result<()> {
        let inner = &self.inner;
        let contract = inner.cache.get::<C>();
        if contract.is_inert() {
            return Ok(());
        }

        let key = InstanceKey::of_rc(instance);
        let Some(entry) = inner.instances.get(contract.type_id(), key) else {
            if inner.options.strict_instances {
                return Err(Error::contract(format!(
                    "instance of {} is not registered",
                    contract.type_name()
                )));
            }
            warn!(
                context = %inner.options.name,
                component = contract.type_name(),
                "instance is not registered"
            );
            return Ok(());
        };

        inner.deactivate_instance(&contract, &entry);
        inner.instances.remove(contract.type_id(), key);
        debug!(
            context = %inner.options.name,
            component = contract.type_name(),
            "instance unregistered"
        );
        Ok(())
    }

    /// Publish a plain service directly, outside any activation
    pub fn register_service<S: ?Sized + 'static>(&self, service: Rc<S>) -> Result<()> {
        self.inner
            .services
            .register_handle(ServiceTypeId::of::<S>(), ServiceHandle::new::<S>(service))
    }

    /// Withdraw a directly published plain service
    pub fn unregister_service<S: ?Sized + 'static>(&self, service: &Rc<S>) -> Result<()> {
        self.inner
            .services
            .unregister_handle(ServiceTypeId::of::<S>(), InstanceKey::of_rc(service))
    }

    /// Add a member to the container service `Ctr` directly
    pub fn register_member<Ctr, T>(&self, member: Rc<T>) -> Result<()>
    where
        Ctr: ContainerService + 'static,
        T: ?Sized + 'static,
    {
        self.inner
            .services
            .register_member::<Ctr>(ServiceHandle::new::<T>(member))
    }

    /// Remove a member from the container service `Ctr` directly
    pub fn unregister_member<Ctr, T>(&self, member: &Rc<T>) -> Result<()>
    where
        Ctr: ContainerService + 'static,
        T: ?Sized + 'static,
    {
        self.inner
            .services
            .unregister_member::<Ctr>(&ServiceHandle::new::<T>(Rc::clone(member)))
    }

    /// Whether a service type is currently present
    pub fn contains_service(&self, service: ServiceTypeId) -> bool {
        self.inner.services.contains(service)
    }

    /// Fetch the current provider of service type `S`
    pub fn get_service<S: ?Sized + 'static>(&self) -> Result<Rc<S>> {
        self.inner.services.get::<S>()
    }

    /// Whether the concrete type `C` is currently Resolved in this engine
    pub fn is_resolved<C: Component>(&self) -> bool {
        let contract = self.inner.cache.get::<C>();
        self.inner.ensure_type_entry(&contract)
    }

    /// Number of registered instances of `C`
    pub fn instance_count<C: Component>(&self) -> usize {
        self.inner.instances.count(TypeId::of::<C>())
    }

    /// Tear the engine down: force-unregister every remaining instance.
    ///
    /// Instances still registered at dispose time are a caller bug and are
    /// reported as errors before being unregistered. Also invoked
    /// best-effort when the last handle drops (without cross-type
    /// propagation at that point; call `dispose` explicitly for a fully
    /// ordered teardown).
    pub fn dispose(&self) {
        self.inner.dispose_internal();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.inner.options.name)
            .field("services", &self.inner.services.service_count())
            .field("contracts", &self.inner.cache.contract_count())
            .field("disposed", &self.inner.disposed.get())
            .finish()
    }
}

impl ContextInner {
    /// Look up (or create) the per-type entry, returning the current
    /// resolved flag. A fresh entry seeds the flag from the current
    /// registry state, so a type with no requirements is Resolved from its
    /// first sighting.
    fn ensure_type_entry(&self, contract: &Rc<Contract>) -> bool {
        let mut entries = self.entries.borrow_mut();
        if let Some(entry) = entries.get(&contract.type_id()) {
            return entry.resolved.get();
        }
        let resolved = self.services.contains_all(contract.required());
        entries.insert(
            contract.type_id(),
            TypeEntry {
                contract: Rc::clone(contract),
                resolved: Cell::new(resolved),
            },
        );
        resolved
    }

    /// A service type flipped presence: re-check exactly the types whose
    /// contracts require it.
    fn service_presence_changed(this: &Rc<Self>, event: &ServiceEvent) {
        for type_id in this.cache.dependents_of(event.service) {
            Self::update_resolved_state(this, type_id);
        }
    }

    fn update_resolved_state(this: &Rc<Self>, type_id: TypeId) {
        let flip = {
            let mut entries = this.entries.borrow_mut();
            match entries.get(&type_id) {
                Some(entry) => {
                    let next = this.services.contains_all(entry.contract.required());
                    if entry.resolved.get() == next {
                        None
                    } else {
                        entry.resolved.set(next);
                        Some((Rc::clone(&entry.contract), next))
                    }
                }
                None => {
                    // First sighting of this type in this engine (the cache
                    // is shared): seed the flag, nothing can flip yet.
                    if let Some(contract) = this.cache.get_by_id(type_id) {
                        let resolved = this.services.contains_all(contract.required());
                        entries.insert(
                            type_id,
                            TypeEntry {
                                contract,
                                resolved: Cell::new(resolved),
                            },
                        );
                    }
                    None
                }
            }
        };

        let Some((contract, resolved)) = flip else {
            return;
        };
        debug!(
            context = %this.options.name,
            component = contract.type_name(),
            resolved,
            "resolved state changed"
        );

        for entry in this.instances.snapshot(type_id) {
            // A re-entrant registry mutation may have reversed this flip
            // mid-iteration; the newer transition already handled the rest.
            if this.type_resolved(type_id) != resolved {
                break;
            }
            if resolved {
                Self::activate_instance(this, &contract, &entry);
            } else {
                this.deactivate_instance(&contract, &entry);
            }
        }
    }

    fn type_resolved(&self, type_id: TypeId) -> bool {
        self.entries
            .borrow()
            .get(&type_id)
            .is_some_and(|entry| entry.resolved.get())
    }

    fn activate_instance(this: &Rc<Self>, contract: &Rc<Contract>, entry: &Rc<InstanceEntry>) {
        if entry.set_active() {
            warn!(
                context = %this.options.name,
                component = contract.type_name(),
                "instance is already active"
            );
            return;
        }
        let token = entry.bump_generation();
        debug!(
            context = %this.options.name,
            component = contract.type_name(),
            "activating instance"
        );

        let outcome = contract.run_activate(entry.handle(), &this.services);

        match outcome {
            Ok(ActivationOutcome::Completed) => this.finish_activation(contract, entry, token),
            Ok(ActivationOutcome::Pending(future)) => {
                let this = Rc::clone(this);
                let contract = Rc::clone(contract);
                let entry = Rc::clone(entry);
                drop(tokio::task::spawn_local(async move {
                    match future.await {
                        Ok(()) => this.finish_activation(&contract, &entry, token),
                        Err(err) => error!(
                            context = %this.options.name,
                            component = contract.type_name(),
                            %err,
                            "activate callback failed; instance left inactive"
                        ),
                    }
                }));
            }
            Err(err) => error!(
                context = %this.options.name,
                component = contract.type_name(),
                %err,
                "activate callback failed; instance left inactive"
            ),
        }
    }

    /// Publish an activated instance's provided services.
    ///
    /// For suspended activations this runs on resumption, so it re-checks
    /// liveness first: an instance that was unregistered, deactivated or
    /// re-activated while the activation was in flight publishes nothing
    /// (the stale generation token catches the latter two).
    fn finish_activation(&self, contract: &Rc<Contract>, entry: &Rc<InstanceEntry>, token: u64) {
        if !self.instances.contains(contract.type_id(), entry.key()) {
            debug!(
                context = %self.options.name,
                component = contract.type_name(),
                "instance unregistered during activation; publishing nothing"
            );
            return;
        }
        if entry.generation() != token {
            debug!(
                context = %self.options.name,
                component = contract.type_name(),
                "stale activation; publishing nothing"
            );
            return;
        }

        for (index, provided) in contract.provided().iter().enumerate() {
            let handle = match provided.project_from(entry.handle()) {
                Ok(handle) => handle,
                Err(err) => {
                    error!(
                        context = %self.options.name,
                        component = contract.type_name(),
                        service = %provided.service(),
                        %err,
                        "failed to project provided service"
                    );
                    continue;
                }
            };
            // Record the publication before the registry event fires so a
            // re-entrant teardown withdraws it too.
            entry.push_published(index, handle.clone());
            if let Err(err) = self.services.register_published(provided, handle) {
                entry.retract_published(index);
                error!(
                    context = %self.options.name,
                    component = contract.type_name(),
                    service = %provided.service(),
                    %err,
                    "failed to publish provided service"
                );
            }
        }
    }

    /// Withdraw an instance's published services, then run its deactivate
    /// callback. Withdrawal propagates first: dependents observe the
    /// services disappearing before the provider tears down.
    fn deactivate_instance(&self, contract: &Rc<Contract>, entry: &Rc<InstanceEntry>) {
        if !entry.take_active() {
            return;
        }
        // Invalidate any activation still in flight for this instance.
        entry.bump_generation();
        debug!(
            context = %self.options.name,
            component = contract.type_name(),
            "deactivating instance"
        );

        for (index, handle) in entry.take_published() {
            let provided = &contract.provided()[index];
            if let Err(err) = self.services.unregister_published(provided, &handle) {
                error!(
                    context = %self.options.name,
                    component = contract.type_name(),
                    service = %provided.service(),
                    %err,
                    "failed to withdraw provided service"
                );
            }
        }

        contract.run_deactivate(entry.handle());
    }

    fn dispose_internal(&self) {
        if self.disposed.replace(true) {
            return;
        }

        for type_id in self.instances.types() {
            let snapshot = self.instances.snapshot(type_id);
            if snapshot.is_empty() {
                continue;
            }
            let contract = self
                .entries
                .borrow()
                .get(&type_id)
                .map(|entry| Rc::clone(&entry.contract));
            let Some(contract) = contract else { continue };

            error!(
                context = %self.options.name,
                component = contract.type_name(),
                count = snapshot.len(),
                "instances still registered while disposing context; unregistering"
            );
            for entry in snapshot {
                self.deactivate_instance(&contract, &entry);
                self.instances.remove(type_id, entry.key());
            }
        }

        if let Some(key) = self.handle_key.take() {
            if let Err(err) = self
                .services
                .unregister_handle(ServiceTypeId::of::<ContextHandle>(), key)
            {
                debug!(%err, "context handle already withdrawn");
            }
        }
        if let Some(subscription) = self.subscription.take() {
            self.services.unsubscribe(subscription);
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        self.dispose_internal();
    }
}
