//! Product service factory.
//!
//! The factory maps a backend name to the recipe that composes its product
//! service. Names without a recipe get the generic service. It is an ordinary
//! value owned by the boot sequence: register recipes at startup through
//! `&mut self`, then call [`create`](ProductServiceFactory::create).
//!
//! # Built-in recipes
//!
//! | Name | Service | Precondition |
//! |---|---|---|
//! | `AppleAppStore`, `MacAppStore` | [`AppleStoreExtendedProductService`] | Apple native store attached |
//! | `AmazonApps` | [`AmazonAppsExtendedProductService`] | Amazon native store attached |
//! | anything else | [`GenericProductService`] | none |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::billing::BackendClient;
use crate::compose::ServiceGraph;
use crate::config::IapConfig;
use crate::product::{
    AmazonAppsExtendedProductService, AppleStoreExtendedProductService, ExtensibleProductService,
    GenericProductService, ProductService,
};
use crate::retry::{RetryPolicy, RetryService};
use crate::store::{AmazonNativeStore, AppleNativeStore, StoreDescriptor, StoreInstance, StoreName};
use crate::telemetry::{NoopTelemetry, Telemetry};
use crate::use_cases::{
    AcknowledgePurchaseUseCase, ConsumePurchaseUseCase, ContinuePromotionalPurchasesUseCase,
    FetchProductsUseCase, FetchStorePromotionOrderUseCase, FetchStorePromotionVisibilityUseCase,
    GetIntroductoryPriceDictionaryUseCase, PurchaseProductUseCase, QueryPurchasesUseCase,
    SetStorePromotionOrderUseCase, SetStorePromotionVisibilityUseCase,
};
use crate::{CompositionError, Result};

type Recipe =
    Arc<dyn Fn(&StoreDescriptor, &FactoryContext) -> Result<Arc<dyn ProductService>> + Send + Sync>;

/// Collaborators shared by every recipe.
#[derive(Clone)]
pub struct FactoryContext {
    pub retry_policy: RetryPolicy,
    pub telemetry: Arc<dyn Telemetry>,
}

impl FactoryContext {
    pub fn new(retry_policy: RetryPolicy, telemetry: Arc<dyn Telemetry>) -> Self {
        Self {
            retry_policy,
            telemetry,
        }
    }

    /// Build a context from configuration.
    pub fn from_config(config: &IapConfig, telemetry: Arc<dyn Telemetry>) -> Result<Self> {
        config.retry.validate()?;
        Ok(Self::new(config.retry.to_policy(), telemetry))
    }

    fn retry_service(&self) -> RetryService {
        RetryService::with_telemetry(self.retry_policy.clone(), self.telemetry.clone())
    }
}

impl Default for FactoryContext {
    fn default() -> Self {
        Self::new(RetryPolicy::default(), Arc::new(NoopTelemetry))
    }
}

impl fmt::Debug for FactoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryContext")
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

/// Selects and runs the composition recipe for a backend.
///
/// # Example
///
/// ```ignore
/// use iapkit_lib::product::{FactoryContext, ProductServiceFactory};
/// use iapkit_lib::store::{StoreDescriptor, StoreInstance};
///
/// let mut factory = ProductServiceFactory::new(FactoryContext::default());
/// factory.register_new_extended_service("GooglePlay", |generic| {
///     Some(Arc::new(AnalyticsProductService::new(generic)))
/// });
///
/// let service = factory.create(&StoreDescriptor::new("GooglePlay", instance))?;
/// ```
pub struct ProductServiceFactory {
    context: FactoryContext,
    recipes: HashMap<String, Recipe>,
}

impl ProductServiceFactory {
    /// Creates a factory with the built-in recipes registered.
    pub fn new(context: FactoryContext) -> Self {
        let mut factory = Self {
            context,
            recipes: HashMap::new(),
        };

        let apple: Recipe = Arc::new(create_apple_product_service);
        factory
            .recipes
            .insert(StoreName::APPLE_APP_STORE.to_string(), apple.clone());
        factory
            .recipes
            .insert(StoreName::MAC_APP_STORE.to_string(), apple);
        factory.recipes.insert(
            StoreName::AMAZON_APPS.to_string(),
            Arc::new(create_amazon_product_service),
        );

        factory
    }

    pub fn context(&self) -> &FactoryContext {
        &self.context
    }

    /// Register a recipe for `name`, replacing any previous one.
    ///
    /// A factory that returns `None` makes [`create`](Self::create) fail with
    /// [`CompositionError::NoInstance`].
    pub fn register_new_service<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(&StoreDescriptor) -> Option<Arc<dyn ProductService>> + Send + Sync + 'static,
    {
        let name = name.into();
        let key = name.clone();
        let recipe: Recipe = Arc::new(
            move |store: &StoreDescriptor, _: &FactoryContext| -> Result<Arc<dyn ProductService>> {
                factory(store).ok_or_else(|| CompositionError::NoInstance { name: key.clone() }.into())
            },
        );
        self.insert_recipe(name, recipe);
    }

    /// Register a recipe for `name` that wraps the generic service built for the
    /// store, replacing any previous recipe.
    pub fn register_new_extended_service<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Arc<dyn ProductService>) -> Option<Arc<dyn ProductService>> + Send + Sync + 'static,
    {
        let name = name.into();
        let key = name.clone();
        let recipe: Recipe = Arc::new(
            move |store: &StoreDescriptor, context: &FactoryContext| -> Result<Arc<dyn ProductService>> {
                let generic = build_generic(store, context)?;
                factory(generic).ok_or_else(|| CompositionError::NoInstance { name: key.clone() }.into())
            },
        );
        self.insert_recipe(name, recipe);
    }

    fn insert_recipe(&mut self, name: String, recipe: Recipe) {
        #[cfg(feature = "tracing")]
        if self.recipes.contains_key(&name) {
            tracing::info!(store = %name, "product service recipe overridden");
        }
        self.recipes.insert(name, recipe);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.recipes.contains_key(name)
    }

    /// Names with a registered recipe, sorted.
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.recipes.keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the product service for `store`.
    ///
    /// Uses the recipe registered under the exact store name, or the generic
    /// recipe when there is none.
    pub fn create(&self, store: &StoreDescriptor) -> Result<Arc<dyn ProductService>> {
        match self.recipes.get(store.name.as_str()) {
            Some(recipe) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(store = %store.name, "composing registered product service");
                recipe(store, &self.context)
            }
            None => self.create_generic(store),
        }
    }

    /// Build the generic product service regardless of registrations.
    pub fn create_generic(&self, store: &StoreDescriptor) -> Result<Arc<dyn ProductService>> {
        #[cfg(feature = "tracing")]
        tracing::debug!(store = %store.name, "composing generic product service");
        build_generic(store, &self.context)
    }
}

impl Default for ProductServiceFactory {
    fn default() -> Self {
        Self::new(FactoryContext::default())
    }
}

impl fmt::Debug for ProductServiceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductServiceFactory")
            .field("context", &self.context)
            .field("recipes", &self.registered_names())
            .finish()
    }
}

/// Graph holding the store, shared collaborators and the common use-cases.
fn generic_graph(store: &StoreDescriptor, context: &FactoryContext) -> Result<ServiceGraph> {
    let mut graph = ServiceGraph::new();
    graph
        .add_instance(store.name.clone())?
        .add_instance(store.instance.clone())?
        .add_instance(context.telemetry.clone())?
        .add_instance(context.retry_service())?
        .add_service(|g| Ok(g.get::<StoreInstance>()?.client()))?
        .add_service(|g| {
            let client: Arc<dyn BackendClient> = g.get()?;
            Ok(FetchProductsUseCase::new(client, g.get()?))
        })?
        .add_service(|g| {
            let client: Arc<dyn BackendClient> = g.get()?;
            Ok(PurchaseProductUseCase::new(client))
        })?
        .add_service(|g| {
            let client: Arc<dyn BackendClient> = g.get()?;
            Ok(ConsumePurchaseUseCase::new(client, g.get()?, g.get()?))
        })?
        .add_service(|g| {
            let client: Arc<dyn BackendClient> = g.get()?;
            Ok(AcknowledgePurchaseUseCase::new(client, g.get()?, g.get()?))
        })?
        .add_service(|g| {
            let client: Arc<dyn BackendClient> = g.get()?;
            Ok(QueryPurchasesUseCase::new(client, g.get()?))
        })?
        .add_service(|g| {
            Ok(GenericProductService::new(
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
            ))
        })?;
    Ok(graph)
}

fn build_generic(
    store: &StoreDescriptor,
    context: &FactoryContext,
) -> Result<Arc<dyn ProductService>> {
    let graph = generic_graph(store, context)?;
    let service: GenericProductService = graph.get()?;
    Ok(Arc::new(service))
}

fn create_apple_product_service(
    store: &StoreDescriptor,
    context: &FactoryContext,
) -> Result<Arc<dyn ProductService>> {
    let apple = store
        .instance
        .apple_store()
        .ok_or_else(|| CompositionError::Precondition {
            store: store.name.to_string(),
            requirement: "Apple native store must be attached to the store instance",
        })?;

    let mut graph = generic_graph(store, context)?;
    graph
        .add_instance(apple)?
        .add_service(|g| {
            let generic: GenericProductService = g.get()?;
            Ok(ExtensibleProductService::new(Arc::new(generic)))
        })?
        .add_service(|g| Ok(ContinuePromotionalPurchasesUseCase::new(apple_handle(g)?)))?
        .add_service(|g| Ok(FetchStorePromotionOrderUseCase::new(apple_handle(g)?)))?
        .add_service(|g| Ok(SetStorePromotionOrderUseCase::new(apple_handle(g)?)))?
        .add_service(|g| Ok(FetchStorePromotionVisibilityUseCase::new(apple_handle(g)?)))?
        .add_service(|g| Ok(SetStorePromotionVisibilityUseCase::new(apple_handle(g)?)))?
        .add_service(|g| Ok(GetIntroductoryPriceDictionaryUseCase::new(apple_handle(g)?)))?
        .add_service(|g| {
            Ok(AppleStoreExtendedProductService::new(
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
                g.get()?,
            ))
        })?;

    let service: AppleStoreExtendedProductService = graph.get()?;
    Ok(Arc::new(service))
}

fn apple_handle(graph: &ServiceGraph) -> Result<Arc<dyn AppleNativeStore>> {
    graph.get()
}

fn create_amazon_product_service(
    store: &StoreDescriptor,
    context: &FactoryContext,
) -> Result<Arc<dyn ProductService>> {
    let amazon = store
        .instance
        .amazon_store()
        .ok_or_else(|| CompositionError::Precondition {
            store: store.name.to_string(),
            requirement: "Amazon native store must be attached to the store instance",
        })?;

    let mut graph = generic_graph(store, context)?;
    graph
        .add_instance(amazon)?
        .add_service(|g| {
            let generic: GenericProductService = g.get()?;
            Ok(ExtensibleProductService::new(Arc::new(generic)))
        })?
        .add_service(|g| {
            let native: Arc<dyn AmazonNativeStore> = g.get()?;
            Ok(AmazonAppsExtendedProductService::new(g.get()?, native, g.get()?))
        })?;

    let service: AmazonAppsExtendedProductService = graph.get()?;
    Ok(Arc::new(service))
}
