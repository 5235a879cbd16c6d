use std::any::TypeId;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use tether_client::RpcClient;
use tether_common::protocol::{Result, TetherError};
use tether_server::{Skeleton, DEFAULT_WEIGHT};

use crate::component::{Participants, Role, View};

/// One named instance held by a [`Container`].
pub struct Component {
    name: String,
    type_name: &'static str,
    role: Option<Role>,
    weight: u32,
    views: HashMap<TypeId, View>,
    exports: Vec<Arc<dyn Skeleton>>,
}

impl Component {
    pub(crate) fn new(
        name: String,
        type_name: &'static str,
        role: Option<Role>,
        weight: u32,
        views: Vec<(TypeId, View)>,
        exports: Vec<Arc<dyn Skeleton>>,
    ) -> Self {
        Self {
            name,
            type_name,
            role,
            weight,
            views: views.into_iter().collect(),
            exports,
        }
    }

    /// An infrastructure component only findable as `T`.
    pub(crate) fn infrastructure<T: Send + Sync + 'static>(name: &str, instance: Arc<T>) -> Self {
        let type_name = std::any::type_name::<T>();
        let view: View = Box::new(instance);
        Self::new(
            name.to_string(),
            type_name.rsplit("::").next().unwrap_or(type_name),
            None,
            DEFAULT_WEIGHT,
            vec![(TypeId::of::<T>(), view)],
            Vec::new(),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn is_service(&self) -> bool {
        !self.exports.is_empty()
    }

    pub fn exports(&self) -> &[Arc<dyn Skeleton>] {
        &self.exports
    }

    /// Whether the component can be used as a `T`.
    pub fn provides<T: ?Sized + 'static>(&self) -> bool {
        self.views.contains_key(&TypeId::of::<T>())
    }

    /// The component as a `T`, if it is one.
    pub fn view<T: ?Sized + Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.views
            .get(&TypeId::of::<T>())
            .and_then(|view| view.downcast_ref::<Arc<T>>())
            .cloned()
    }
}

/// Named components of one process.
///
/// Built in a single pass: every participant is instantiated and named,
/// then every injection slot is wired. The map is not mutated afterwards.
pub struct Container {
    components: Vec<Component>,
    index: HashMap<String, usize>,
}

impl Container {
    /// Instantiates and wires `participants` next to `infrastructure`.
    /// Remote references are only filled when `client` is given.
    pub(crate) fn assemble(
        participants: &Participants,
        infrastructure: Vec<Component>,
        client: Option<&RpcClient>,
    ) -> Result<Self> {
        let mut container = Container {
            components: Vec::new(),
            index: HashMap::new(),
        };
        for component in infrastructure {
            container.insert(component)?;
        }

        let mut pending = Vec::new();
        for instantiated in participants.instantiate_all() {
            let owner = instantiated.component.name().to_string();
            container.insert(instantiated.component)?;
            pending.push((owner, instantiated.wire));
        }

        for (owner, wire) in pending {
            let wiring = Wiring {
                container: &container,
                client,
                owner: &owner,
            };
            wire(&wiring)?;
        }

        tracing::debug!(components = container.len(), "Container assembled");
        Ok(container)
    }

    fn insert(&mut self, component: Component) -> Result<()> {
        match self.index.entry(component.name.clone()) {
            Entry::Occupied(entry) => Err(TetherError::DuplicateName(entry.key().clone())),
            Entry::Vacant(entry) => {
                tracing::trace!(name = %component.name, type_name = component.type_name, "Component created");
                entry.insert(self.components.len());
                self.components.push(component);
                Ok(())
            }
        }
    }

    pub fn component(&self, name: &str) -> Option<&Component> {
        self.index.get(name).map(|&i| &self.components[i])
    }

    /// The component called `name` as a `T`. A component of another type
    /// under that name is a `NameTypeConflict`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, name: &str) -> Result<Option<Arc<T>>> {
        match self.component(name) {
            None => Ok(None),
            Some(component) => component.view::<T>().map(Some).ok_or_else(|| {
                TetherError::NameTypeConflict {
                    name: name.to_string(),
                    type_name: std::any::type_name::<T>().to_string(),
                }
            }),
        }
    }

    /// The single component usable as a `T`.
    pub fn get_by_type<T: ?Sized + Send + Sync + 'static>(&self) -> Result<Option<Arc<T>>> {
        let candidates = self.candidates::<T>();
        match candidates.as_slice() {
            [] => Ok(None),
            [only] => Ok(only.view::<T>()),
            _ => Err(TetherError::AmbiguousDependency {
                owner: "container".to_string(),
                field: String::new(),
                type_name: std::any::type_name::<T>().to_string(),
                candidates: candidates.iter().map(|c| c.name.clone()).collect(),
            }),
        }
    }

    fn candidates<T: ?Sized + 'static>(&self) -> Vec<&Component> {
        self.components
            .iter()
            .filter(|c| c.provides::<T>())
            .collect()
    }

    /// Components exporting at least one service interface.
    pub fn services(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|c| c.is_service())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// What a slot sees while it is being wired.
pub struct Wiring<'a> {
    container: &'a Container,
    client: Option<&'a RpcClient>,
    owner: &'a str,
}

impl<'a> Wiring<'a> {
    pub(crate) fn client(&self) -> Option<&'a RpcClient> {
        self.client
    }

    pub(crate) fn owner(&self) -> &'a str {
        self.owner
    }

    /// Name first, then unique type.
    pub(crate) fn resolve<T: ?Sized + Send + Sync + 'static>(
        &self,
        field: &str,
        name: &str,
    ) -> Result<Arc<T>> {
        if let Some(found) = self.container.get::<T>(name)? {
            tracing::trace!(owner = self.owner, field, name, "Wired by name");
            return Ok(found);
        }

        let candidates = self.container.candidates::<T>();
        match candidates.as_slice() {
            [only] => {
                tracing::trace!(owner = self.owner, field, candidate = %only.name, "Wired by type");
                only.view::<T>().ok_or_else(|| self.not_found::<T>(field))
            }
            [] => Err(self.not_found::<T>(field)),
            _ => Err(TetherError::AmbiguousDependency {
                owner: self.owner.to_string(),
                field: field.to_string(),
                type_name: std::any::type_name::<T>().to_string(),
                candidates: candidates.iter().map(|c| c.name.clone()).collect(),
            }),
        }
    }

    fn not_found<T: ?Sized>(&self, field: &str) -> TetherError {
        TetherError::DependencyNotFound {
            owner: self.owner.to_string(),
            field: field.to_string(),
            type_name: std::any::type_name::<T>().to_string(),
        }
    }
}
