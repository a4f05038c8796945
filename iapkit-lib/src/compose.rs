//! Dependency composer.
//!
//! A [`ServiceGraph`] maps a requested type to either a ready instance or a
//! recipe that builds it from other entries. Recipes run lazily on first
//! [`get`](ServiceGraph::get) and their result is cached, so every type
//! resolves to one singleton per graph.
//!
//! Registering the same type twice is rejected: one graph describes exactly
//! one product service and a second registration is always a wiring mistake.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::{CompositionError, Result};

type Service = Box<dyn Any + Send + Sync>;
type Recipe = Arc<dyn Fn(&ServiceGraph) -> Result<Service> + Send + Sync>;

enum Registration {
    Instance(Service),
    Recipe(Recipe),
}

struct Entry {
    type_name: &'static str,
    registration: Registration,
}

/// Type-keyed registry of instances and construction recipes.
///
/// # Example
///
/// ```ignore
/// use iapkit_lib::compose::ServiceGraph;
/// use iapkit_lib::retry::RetryService;
///
/// let mut graph = ServiceGraph::new();
/// graph
///     .add_instance(RetryService::default())?
///     .add_service(|g| Ok(FetchProductsUseCase::new(g.get()?, g.get()?)))?;
///
/// let fetch: FetchProductsUseCase = graph.get()?;
/// ```
#[derive(Default)]
pub struct ServiceGraph {
    entries: HashMap<TypeId, Entry>,
    singletons: Mutex<HashMap<TypeId, Service>>,
    resolving: Mutex<Vec<TypeId>>,
}

impl ServiceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn register<T: 'static>(&mut self, registration: Registration) -> Result<&mut Self> {
        let id = TypeId::of::<T>();
        if self.entries.contains_key(&id) {
            return Err(CompositionError::Duplicate {
                type_name: type_name::<T>(),
            }
            .into());
        }
        self.entries.insert(
            id,
            Entry {
                type_name: type_name::<T>(),
                registration,
            },
        );
        Ok(self)
    }

    /// Register a ready instance of `T`.
    pub fn add_instance<T>(&mut self, value: T) -> Result<&mut Self>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.register::<T>(Registration::Instance(Box::new(value)))
    }

    /// Register a recipe that builds `T` from the rest of the graph.
    pub fn add_service<T, F>(&mut self, recipe: F) -> Result<&mut Self>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn(&ServiceGraph) -> Result<T> + Send + Sync + 'static,
    {
        let recipe: Recipe =
            Arc::new(move |graph: &ServiceGraph| recipe(graph).map(|v| Box::new(v) as Service));
        self.register::<T>(Registration::Recipe(recipe))
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve `T`, building it and its dependencies on first use.
    pub fn get<T>(&self) -> Result<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let id = TypeId::of::<T>();
        let missing = || CompositionError::Missing {
            type_name: type_name::<T>(),
        };

        let entry = self.entries.get(&id).ok_or_else(missing)?;
        let recipe = match &entry.registration {
            Registration::Instance(value) => {
                return value.downcast_ref::<T>().cloned().ok_or_else(|| missing().into());
            }
            Registration::Recipe(recipe) => recipe.clone(),
        };

        if let Some(cached) = self.cached::<T>(id) {
            return Ok(cached);
        }

        {
            let mut resolving = self.resolving.lock().unwrap_or_else(|e| e.into_inner());
            if resolving.contains(&id) {
                return Err(CompositionError::Cycle {
                    type_name: entry.type_name,
                }
                .into());
            }
            resolving.push(id);
        }

        // No lock is held here: the recipe resolves its own dependencies.
        let built = recipe(self);

        self.resolving
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|pending| *pending != id);

        let built = built?;
        let value = built.downcast_ref::<T>().cloned().ok_or_else(missing)?;
        self.singletons
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(id)
            .or_insert(built);
        Ok(value)
    }

    fn cached<T: Clone + 'static>(&self, id: TypeId) -> Option<T> {
        self.singletons
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }
}
