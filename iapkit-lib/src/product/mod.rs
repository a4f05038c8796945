//! Product services: the facade applications call.
//!
//! A [`ProductService`] exposes the same operations for every backend.
//! [`GenericProductService`] covers the common contract; the extended
//! services in [`extended`] add backend-specific capabilities, reachable
//! through [`ProductService::as_any`].

pub mod extended;
pub mod factory;
pub mod generic;

pub use extended::{
    AmazonAppsExtendedProductService, AppleStoreExtendedProductService, ExtensibleProductService,
};
pub use factory::{FactoryContext, ProductServiceFactory};
pub use generic::GenericProductService;
pub use crate::use_cases::TokenOutcome;

use async_trait::async_trait;
use std::any::Any;
use tokio::sync::broadcast;

use crate::billing::{
    ConnectionState, ProductDetails, ProductType, ProrationMode, Purchase, PurchaseUpdate,
};
use crate::store::StoreName;
use crate::Result;

/// Unified product/purchase surface over one backend.
///
/// Failures reaching the caller are `Permanent` errors or exhausted
/// `Transient`/`NotReady` ones. Already-handled tokens are reported as
/// [`TokenOutcome::AlreadyHandled`], not as errors.
#[async_trait]
pub trait ProductService: Send + Sync {
    /// Name of the backend this service was built for.
    fn store_name(&self) -> &StoreName;

    fn connection_state(&self) -> ConnectionState;

    async fn fetch_products(
        &self,
        product_ids: &[String],
        product_type: ProductType,
    ) -> Result<Vec<ProductDetails>>;

    /// Start a new purchase. The outcome arrives on [`purchase_updates`](Self::purchase_updates).
    fn purchase(&self, product: &ProductDetails) -> Result<()>;

    /// Replace an owned subscription with `product`.
    fn change_subscription(
        &self,
        product: &ProductDetails,
        old_purchase_token: &str,
        proration_mode: Option<ProrationMode>,
    ) -> Result<()>;

    async fn consume(&self, purchase_token: &str) -> Result<TokenOutcome>;

    async fn acknowledge(&self, purchase_token: &str) -> Result<TokenOutcome>;

    /// Every owned purchase, one-time and subscription.
    async fn restore_purchases(&self) -> Result<Vec<Purchase>>;

    fn purchase_updates(&self) -> broadcast::Receiver<PurchaseUpdate>;

    /// Application lifecycle hook.
    ///
    /// Pausing does nothing. On resume the connection is re-established if it
    /// dropped, and purchases completed while the app was away are cached and
    /// delivered on [`purchase_updates`](Self::purchase_updates).
    async fn on_pause(&self, paused: bool) -> Result<()>;

    /// Downcast hook for backend-specific capabilities.
    fn as_any(&self) -> &dyn Any;
}
