//! Type contracts and the contract builder
//!
//! A [`Contract`] is the immutable description of one concrete type's
//! interaction with the wiring runtime: the service types it requires, the
//! service types it provides, and its activate/deactivate callbacks. A
//! contract is a pure function of the type's static shape, built once and
//! cached for the process lifetime.
//!
//! Contracts are declared explicitly through [`Component::contract`] — the
//! declaration-in-code rendition of contract discovery. Whatever the
//! declared synchrony of the activate callback, it is normalized to the
//! uniform [`ActivationOutcome`] interface: activation may always suspend.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use tracing::error;

use crate::container::{ContainerService, ServiceContainer};
use crate::deps::{ServiceDeps, ServiceLookup};
use crate::error::{Error, Result};
use crate::service_type::{InstanceHandle, ServiceHandle, ServiceTypeId};

/// How an activation concluded when control returned to the engine
pub enum ActivationOutcome {
    /// The activate callback ran to completion synchronously
    Completed,
    /// The activate callback suspended; the future completes it
    Pending(LocalBoxFuture<'static, Result<()>>),
}

impl fmt::Debug for ActivationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("Completed"),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Normalized activate callback: fetches dependencies from the lookup and
/// runs (or begins) the user callback
pub type ActivateFn = Rc<dyn Fn(&InstanceHandle, &dyn ServiceLookup) -> Result<ActivationOutcome>>;

/// Deactivate callback: synchronous, never suspends
pub type DeactivateFn = Rc<dyn Fn(&InstanceHandle)>;

/// Projection from a registered instance to the handle published for one of
/// its provided services
pub type ProjectFn = Rc<dyn Fn(&InstanceHandle) -> Result<ServiceHandle>>;

/// Lazy constructor for a container service: the container trait object plus
/// the handle under which the container itself is published
pub type MakeContainerFn = Rc<dyn Fn() -> (Rc<dyn ServiceContainer>, ServiceHandle)>;

/// What kind of provider a provided-service declaration creates
#[derive(Clone)]
pub enum ProviderKind {
    /// The instance itself is the single provider
    Plain,
    /// The instance becomes a member of a lazily-created container
    Container {
        /// Constructor invoked when the container does not exist yet
        make: MakeContainerFn,
    },
}

/// One provided-service declaration of a contract
#[derive(Clone)]
pub struct ProvidedService {
    service: ServiceTypeId,
    project: ProjectFn,
    kind: ProviderKind,
}

impl ProvidedService {
    /// The service type being provided
    pub fn service(&self) -> ServiceTypeId {
        self.service
    }

    /// Project the provider handle out of a registered instance.
    ///
    /// The projection should be a cheap view of the same allocation (a
    /// clone or unsizing coercion); its result identifies the provider for
    /// the lifetime of the publication.
    pub fn project_from(&self, instance: &InstanceHandle) -> Result<ServiceHandle> {
        (self.project.as_ref())(instance)
    }

    /// The provider kind
    pub fn kind(&self) -> &ProviderKind {
        &self.kind
    }
}

impl fmt::Debug for ProvidedService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ProviderKind::Plain => "plain",
            ProviderKind::Container { .. } => "container",
        };
        write!(f, "{} ({kind})", self.service)
    }
}

/// A concrete type's immutable dependency contract
pub struct Contract {
    type_id: TypeId,
    type_name: &'static str,
    required: Vec<ServiceTypeId>,
    provided: Vec<ProvidedService>,
    activate: Option<ActivateFn>,
    deactivate: Option<DeactivateFn>,
}

impl Contract {
    /// Build the contract for component type `C`
    pub fn build<C: Component>() -> Self {
        let mut builder = ContractBuilder::<C>::new();
        C::contract(&mut builder);
        builder.finish()
    }

    /// Identity of the concrete type
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Name of the concrete type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Service types that must be present for this type to resolve
    pub fn required(&self) -> &[ServiceTypeId] {
        &self.required
    }

    /// Service declarations published on successful activation
    pub fn provided(&self) -> &[ProvidedService] {
        &self.provided
    }

    /// Whether an activate callback was declared
    pub fn has_activate(&self) -> bool {
        self.activate.is_some()
    }

    /// Whether a deactivate callback was declared
    pub fn has_deactivate(&self) -> bool {
        self.deactivate.is_some()
    }

    /// Run (or begin) the activate callback against the given registry
    /// view. Without a declared callback this completes immediately.
    pub fn run_activate(
        &self,
        instance: &InstanceHandle,
        lookup: &dyn ServiceLookup,
    ) -> Result<ActivationOutcome> {
        match &self.activate {
            Some(activate) => (activate.as_ref())(instance, lookup),
            None => Ok(ActivationOutcome::Completed),
        }
    }

    /// Run the deactivate callback, if declared
    pub fn run_deactivate(&self, instance: &InstanceHandle) {
        if let Some(deactivate) = &self.deactivate {
            (deactivate.as_ref())(instance);
        }
    }

    /// An inert type neither provides services nor has callbacks; the
    /// engine skips it entirely.
    pub fn is_inert(&self) -> bool {
        self.provided.is_empty() && self.activate.is_none() && self.deactivate.is_none()
    }
}

impl fmt::Debug for Contract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Contract")
            .field("type", &self.type_name)
            .field("required", &self.required)
            .field("provided", &self.provided)
            .field("activate", &self.activate.is_some())
            .field("deactivate", &self.deactivate.is_some())
            .finish()
    }
}

/// A type that declares a wiring contract.
pub trait Component: Any {
    /// Declare required services, provided services and lifecycle callbacks
    fn contract(builder: &mut ContractBuilder<Self>)
    where
        Self: Sized;
}

/// Single declaration point for a component type's contract.
pub struct ContractBuilder<C> {
    type_id: TypeId,
    type_name: &'static str,
    required: Vec<ServiceTypeId>,
    provided: Vec<ProvidedService>,
    activate: Option<ActivateFn>,
    deactivate: Option<DeactivateFn>,
    _component: std::marker::PhantomData<fn(C)>,
}

impl<C: Component> ContractBuilder<C> {
    fn new() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            type_name: type_name::<C>(),
            required: Vec::new(),
            provided: Vec::new(),
            activate: None,
            deactivate: None,
            _component: std::marker::PhantomData,
        }
    }

    /// Declare a plain single-provider service.
    ///
    /// The projection doubles as the assignability proof: it is only
    /// writable when `C` actually satisfies `S`.
    pub fn provides<S>(&mut self, project: impl Fn(Rc<C>) -> Rc<S> + 'static) -> &mut Self
    where
        S: ?Sized + 'static,
    {
        let project = project_handle::<C, S, _>(project);
        self.provided.push(ProvidedService {
            service: ServiceTypeId::of::<S>(),
            project,
            kind: ProviderKind::Plain,
        });
        self
    }

    /// Declare membership in the container service `Ctr`.
    ///
    /// The container is constructed lazily when the first member arrives;
    /// dependents require `Ctr` itself.
    pub fn provides_in<Ctr, T>(&mut self, project: impl Fn(Rc<C>) -> Rc<T> + 'static) -> &mut Self
    where
        Ctr: ContainerService + 'static,
        T: ?Sized + 'static,
    {
        let project = project_handle::<C, T, _>(project);
        let make: MakeContainerFn = Rc::new(|| {
            let container = Ctr::make();
            let handle = ServiceHandle::new::<Ctr>(container.clone());
            (container as Rc<dyn ServiceContainer>, handle)
        });
        self.provided.push(ProvidedService {
            service: ServiceTypeId::of::<Ctr>(),
            project,
            kind: ProviderKind::Container { make },
        });
        self
    }

    /// Declare the synchronous activate callback.
    ///
    /// `D` names the required services; they are fetched from the current
    /// registry when activation starts. Declaring a second activate
    /// callback is a configuration error: reported once, first wins.
    pub fn on_activate<D, F>(&mut self, callback: F) -> &mut Self
    where
        D: ServiceDeps + 'static,
        F: Fn(Rc<C>, D) -> Result<()> + 'static,
    {
        if self.activate.is_some() {
            error!(
                component = self.type_name,
                "duplicate activate declaration ignored; first declaration wins"
            );
            return self;
        }
        self.set_required(D::ids());
        let type_name = self.type_name;
        self.activate = Some(Rc::new(
            move |instance: &InstanceHandle, lookup: &dyn ServiceLookup| {
                let concrete = downcast_instance::<C>(instance, type_name)?;
                let deps = D::resolve(lookup)?;
                callback(concrete, deps)?;
                Ok(ActivationOutcome::Completed)
            },
        ));
        self
    }

    /// Declare the asynchronous activate callback.
    ///
    /// Dependencies are still fetched synchronously when activation starts;
    /// only the callback body suspends. Between suspension and resumption
    /// arbitrary other registrations may interleave.
    pub fn on_activate_async<D, F, Fut>(&mut self, callback: F) -> &mut Self
    where
        D: ServiceDeps + 'static,
        F: Fn(Rc<C>, D) -> Fut + 'static,
        Fut: Future<Output = Result<()>> + 'static,
    {
        if self.activate.is_some() {
            error!(
                component = self.type_name,
                "duplicate activate declaration ignored; first declaration wins"
            );
            return self;
        }
        self.set_required(D::ids());
        let type_name = self.type_name;
        self.activate = Some(Rc::new(
            move |instance: &InstanceHandle, lookup: &dyn ServiceLookup| {
                let concrete = downcast_instance::<C>(instance, type_name)?;
                let deps = D::resolve(lookup)?;
                Ok(ActivationOutcome::Pending(callback(concrete, deps).boxed_local()))
            },
        ));
        self
    }

    /// Declare the deactivate callback (synchronous only).
    pub fn on_deactivate(&mut self, callback: impl Fn(Rc<C>) + 'static) -> &mut Self {
        if self.deactivate.is_some() {
            error!(
                component = self.type_name,
                "duplicate deactivate declaration ignored; first declaration wins"
            );
            return self;
        }
        let type_name = self.type_name;
        self.deactivate = Some(Rc::new(move |instance: &InstanceHandle| {
            match downcast_instance::<C>(instance, type_name) {
                Ok(concrete) => callback(concrete),
                Err(err) => error!(component = type_name, %err, "deactivate skipped"),
            }
        }));
        self
    }

    fn set_required(&mut self, ids: Vec<ServiceTypeId>) {
        for id in ids {
            if !self.required.contains(&id) {
                self.required.push(id);
            }
        }
    }

    fn finish(self) -> Contract {
        Contract {
            type_id: self.type_id,
            type_name: self.type_name,
            required: self.required,
            provided: self.provided,
            activate: self.activate,
            deactivate: self.deactivate,
        }
    }
}

fn downcast_instance<C: Component>(
    instance: &InstanceHandle,
    type_name: &'static str,
) -> Result<Rc<C>> {
    instance
        .clone()
        .downcast::<C>()
        .map_err(|_| Error::contract(format!("registered instance is not a {type_name}")))
}

fn project_handle<C, S, F>(project: F) -> ProjectFn
where
    C: Component,
    S: ?Sized + 'static,
    F: Fn(Rc<C>) -> Rc<S> + 'static,
{
    let type_name = type_name::<C>();
    Rc::new(move |instance: &InstanceHandle| {
        let concrete = downcast_instance::<C>(instance, type_name)?;
        Ok(ServiceHandle::new::<S>(project(concrete)))
    })
}
