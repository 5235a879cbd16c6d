//! Participant descriptors and injection slots.
//!
//! A participant type describes itself once through [`Participant::descriptor`]:
//! its component name, whether it is the process entry point, the service
//! interfaces it exports, the extra types it can be looked up as, and the
//! slots the container fills during wiring.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use tether_client::RemoteInterface;
use tether_common::protocol::{Result, TetherError};
use tether_server::{bind, ServiceInterface, Skeleton, DEFAULT_WEIGHT};

use crate::container::{Component, Wiring};

/// Which side of a connection a process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

struct Slot<T: ?Sized> {
    cell: OnceLock<Arc<T>>,
}

impl<T: ?Sized> Slot<T> {
    fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    fn get(&self) -> Result<Arc<T>> {
        self.cell
            .get()
            .cloned()
            .ok_or_else(|| TetherError::NotWired(std::any::type_name::<T>().to_string()))
    }

    fn fill(&self, value: Arc<T>) {
        // Wiring runs once; a second fill keeps the first value
        let _ = self.cell.set(value);
    }
}

/// A dependency resolved from the container, by name first and then by
/// unique type.
///
/// The slot holds a weak handle; the container owns its components, so
/// participants that autowire each other are still released with it.
pub struct Autowired<T: ?Sized> {
    cell: OnceLock<Weak<T>>,
}

impl<T: ?Sized> Autowired<T> {
    /// The wired component; `NotWired` before wiring or once the
    /// container is released.
    pub fn get(&self) -> Result<Arc<T>> {
        self.cell
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| TetherError::NotWired(std::any::type_name::<T>().to_string()))
    }

    pub fn is_wired(&self) -> bool {
        self.cell.get().is_some()
    }

    pub(crate) fn fill(&self, value: Arc<T>) {
        let _ = self.cell.set(Arc::downgrade(&value));
    }
}

impl<T: ?Sized> Default for Autowired<T> {
    fn default() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }
}

impl<T: ?Sized> fmt::Debug for Autowired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autowired")
            .field("type", &std::any::type_name::<T>())
            .field("wired", &self.is_wired())
            .finish()
    }
}

/// A remote interface, filled with a client stand-in on the client side.
pub struct Reference<T: ?Sized> {
    slot: Slot<T>,
}

impl<T: ?Sized> Reference<T> {
    /// The stand-in; `NotWired` before wiring or on the server side.
    pub fn get(&self) -> Result<Arc<T>> {
        self.slot.get()
    }

    pub fn is_wired(&self) -> bool {
        self.slot.cell.get().is_some()
    }

    pub(crate) fn fill(&self, value: Arc<T>) {
        self.slot.fill(value)
    }
}

impl<T: ?Sized> Default for Reference<T> {
    fn default() -> Self {
        Self { slot: Slot::new() }
    }
}

impl<T: ?Sized> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("type", &std::any::type_name::<T>())
            .field("wired", &self.is_wired())
            .finish()
    }
}

pub(crate) type View = Box<dyn Any + Send + Sync>;
type ViewFn<T> = Box<dyn Fn(&Arc<T>) -> (TypeId, View) + Send + Sync>;
type ExportFn<T> = Box<dyn Fn(&Arc<T>) -> Arc<dyn Skeleton> + Send + Sync>;
type SlotFn<T> = Box<dyn Fn(&T, &Wiring<'_>) -> Result<()> + Send + Sync>;

/// Static description of a participant type.
///
/// # Example
///
/// ```
/// use tether_container::{Autowired, Descriptor, Participant};
/// use tether_common::WorkerPool;
///
/// #[derive(Default)]
/// struct Reporter {
///     pool: Autowired<WorkerPool>,
/// }
///
/// impl Participant for Reporter {
///     fn descriptor() -> Descriptor<Self> {
///         Descriptor::<Self>::new()
///             .named("dailyReporter")
///             .autowired("pool", |r| &r.pool)
///     }
/// }
///
/// assert_eq!(Reporter::descriptor().name(), "dailyReporter");
/// ```
pub struct Descriptor<T> {
    type_name: &'static str,
    name: Option<String>,
    role: Option<Role>,
    service: bool,
    weight: u32,
    views: Vec<ViewFn<T>>,
    exports: Vec<ExportFn<T>>,
    slots: Vec<SlotFn<T>>,
}

impl<T: Participant> Descriptor<T> {
    pub fn new() -> Self {
        Self {
            type_name: short_type_name(std::any::type_name::<T>()),
            name: None,
            role: None,
            service: false,
            weight: DEFAULT_WEIGHT,
            views: Vec::new(),
            exports: Vec::new(),
            slots: Vec::new(),
        }
    }

    /// Explicit component name; otherwise the type name with a lower-cased
    /// first letter.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = Some(name);
        }
        self
    }

    /// Marks the participant as the client process entry point.
    pub fn client_entry(mut self) -> Self {
        self.role = Some(Role::Client);
        self
    }

    /// Marks the participant as the server process entry point.
    pub fn server_entry(mut self) -> Self {
        self.role = Some(Role::Server);
        self
    }

    /// Selection weight used when several services share an interface.
    pub fn weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    /// Makes the component findable as `I` as well as its own type.
    pub fn provides<I>(mut self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ?Sized + Send + Sync + 'static,
    {
        self.views.push(Box::new(move |instance: &Arc<T>| {
            let view: View = Box::new(cast(instance.clone()));
            (TypeId::of::<I>(), view)
        }));
        self
    }

    /// Exports the component as a remotely invocable implementation of `I`.
    pub fn service<I>(mut self, cast: fn(Arc<T>) -> Arc<I>) -> Self
    where
        I: ServiceInterface + ?Sized,
    {
        self.service = true;
        self.exports
            .push(Box::new(move |instance: &Arc<T>| bind::<I>(cast(instance.clone()))));
        self.provides(cast)
    }

    /// An autowired slot looked up by its field name, then by type.
    pub fn autowired<D>(self, field: &'static str, slot: fn(&T) -> &Autowired<D>) -> Self
    where
        D: ?Sized + Send + Sync + 'static,
    {
        self.autowired_named(field, field, slot)
    }

    /// An autowired slot looked up by `name`, then by type.
    pub fn autowired_named<D>(
        mut self,
        field: &'static str,
        name: &'static str,
        slot: fn(&T) -> &Autowired<D>,
    ) -> Self
    where
        D: ?Sized + Send + Sync + 'static,
    {
        self.slots
            .push(Box::new(move |target: &T, wiring: &Wiring<'_>| {
                slot(target).fill(wiring.resolve::<D>(field, name)?);
                Ok(())
            }));
        self
    }

    /// A remote reference filled with a stand-in for `I`.
    pub fn reference<I>(mut self, field: &'static str, slot: fn(&T) -> &Reference<I>) -> Self
    where
        I: RemoteInterface + ?Sized,
    {
        self.slots
            .push(Box::new(move |target: &T, wiring: &Wiring<'_>| {
                if let Some(client) = wiring.client() {
                    tracing::debug!(owner = wiring.owner(), field, interface = I::ID, "Wiring remote reference");
                    slot(target).fill(I::stand_in(client.clone()));
                }
                Ok(())
            }));
        self
    }

    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| lower_camel(self.type_name))
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn is_service(&self) -> bool {
        self.service
    }
}

impl<T: Participant> Default for Descriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A type the container can instantiate and wire.
pub trait Participant: Default + Send + Sync + 'static {
    fn descriptor() -> Descriptor<Self>;
}

type Wire = Box<dyn FnOnce(&Wiring<'_>) -> Result<()> + Send>;

/// A freshly created component plus the wiring it still needs.
pub(crate) struct Instantiated {
    pub(crate) component: Component,
    pub(crate) wire: Wire,
}

fn instantiate<T: Participant>() -> Instantiated {
    let descriptor = T::descriptor();
    let instance = Arc::new(T::default());

    let mut views: Vec<(TypeId, View)> = vec![(TypeId::of::<T>(), Box::new(instance.clone()))];
    views.extend(descriptor.views.iter().map(|view| view(&instance)));
    let exports = descriptor
        .exports
        .iter()
        .map(|export| export(&instance))
        .collect();

    let component = Component::new(
        descriptor.name(),
        descriptor.type_name,
        descriptor.role,
        descriptor.weight,
        views,
        exports,
    );
    let slots = descriptor.slots;
    let wire: Wire = Box::new(move |wiring: &Wiring<'_>| {
        for slot in &slots {
            slot(&instance, wiring)?;
        }
        Ok(())
    });

    Instantiated { component, wire }
}

struct Registration {
    type_name: &'static str,
    role: Option<Role>,
    instantiate: fn() -> Instantiated,
}

/// The participant types of one process, in registration order.
#[derive(Default)]
pub struct Participants {
    registrations: Vec<Registration>,
}

impl Participants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: Participant>(mut self) -> Self {
        self.add::<T>();
        self
    }

    pub fn add<T: Participant>(&mut self) {
        let descriptor = T::descriptor();
        self.registrations.push(Registration {
            type_name: descriptor.type_name,
            role: descriptor.role,
            instantiate: instantiate::<T>,
        });
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// The process role named by the entry participant.
    pub fn role(&self) -> Result<Role> {
        let mut entries = self
            .registrations
            .iter()
            .filter_map(|r| r.role.map(|role| (r.type_name, role)));

        let Some((first, role)) = entries.next() else {
            return Err(TetherError::NoEntryPoint);
        };
        if let Some((other, other_role)) = entries.find(|(_, r)| *r != role) {
            return Err(TetherError::InvalidConfig(format!(
                "{} is a {:?} entry point but {} is a {:?} entry point",
                first, role, other, other_role
            )));
        }
        Ok(role)
    }

    pub(crate) fn instantiate_all(&self) -> Vec<Instantiated> {
        self.registrations
            .iter()
            .map(|r| (r.instantiate)())
            .collect()
    }
}

/// `tether_cli::person::PersonServiceImpl` becomes `PersonServiceImpl`.
fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

fn lower_camel(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
