//! Extended product services.
//!
//! [`ExtensibleProductService`] forwards the common contract to the product
//! service it wraps. Backend-specific services embed one and add their own
//! operations next to it.

use async_trait::async_trait;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::billing::{
    ConnectionState, ProductDetails, ProductType, ProrationMode, Purchase, PurchaseUpdate,
};
use crate::product::{ProductService, TokenOutcome};
use crate::store::{AmazonNativeStore, PromotionVisibility, StoreName};
use crate::telemetry::Telemetry;
use crate::use_cases::{
    ContinuePromotionalPurchasesUseCase, FetchStorePromotionOrderUseCase,
    FetchStorePromotionVisibilityUseCase, GetIntroductoryPriceDictionaryUseCase,
    SetStorePromotionOrderUseCase, SetStorePromotionVisibilityUseCase,
};
use crate::Result;

/// Implements [`ProductService`] for a type by forwarding to one of its fields.
macro_rules! delegate_product_service {
    ($ty:ty, $field:ident) => {
        #[async_trait]
        impl ProductService for $ty {
            fn store_name(&self) -> &StoreName {
                self.$field.store_name()
            }

            fn connection_state(&self) -> ConnectionState {
                self.$field.connection_state()
            }

            async fn fetch_products(
                &self,
                product_ids: &[String],
                product_type: ProductType,
            ) -> Result<Vec<ProductDetails>> {
                self.$field.fetch_products(product_ids, product_type).await
            }

            fn purchase(&self, product: &ProductDetails) -> Result<()> {
                self.$field.purchase(product)
            }

            fn change_subscription(
                &self,
                product: &ProductDetails,
                old_purchase_token: &str,
                proration_mode: Option<ProrationMode>,
            ) -> Result<()> {
                self.$field
                    .change_subscription(product, old_purchase_token, proration_mode)
            }

            async fn consume(&self, purchase_token: &str) -> Result<TokenOutcome> {
                self.$field.consume(purchase_token).await
            }

            async fn acknowledge(&self, purchase_token: &str) -> Result<TokenOutcome> {
                self.$field.acknowledge(purchase_token).await
            }

            async fn restore_purchases(&self) -> Result<Vec<Purchase>> {
                self.$field.restore_purchases().await
            }

            fn purchase_updates(&self) -> broadcast::Receiver<PurchaseUpdate> {
                self.$field.purchase_updates()
            }

            async fn on_pause(&self, paused: bool) -> Result<()> {
                self.$field.on_pause(paused).await
            }

            fn as_any(&self) -> &dyn Any {
                self
            }
        }
    };
}

/// Delegating base for extended product services.
#[derive(Clone)]
pub struct ExtensibleProductService {
    inner: Arc<dyn ProductService>,
}

impl ExtensibleProductService {
    pub fn new(inner: Arc<dyn ProductService>) -> Self {
        Self { inner }
    }

    /// The wrapped service.
    pub fn inner(&self) -> &Arc<dyn ProductService> {
        &self.inner
    }
}

delegate_product_service!(ExtensibleProductService, inner);

/// Apple storefront product service.
///
/// Adds promotional purchase continuation, storefront promotion ordering and
/// visibility, and introductory price lookup.
#[derive(Clone)]
pub struct AppleStoreExtendedProductService {
    base: ExtensibleProductService,
    continue_promotional_purchases: ContinuePromotionalPurchasesUseCase,
    fetch_promotion_order: FetchStorePromotionOrderUseCase,
    set_promotion_order: SetStorePromotionOrderUseCase,
    fetch_promotion_visibility: FetchStorePromotionVisibilityUseCase,
    set_promotion_visibility: SetStorePromotionVisibilityUseCase,
    introductory_prices: GetIntroductoryPriceDictionaryUseCase,
    telemetry: Arc<dyn Telemetry>,
}

impl AppleStoreExtendedProductService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        base: ExtensibleProductService,
        continue_promotional_purchases: ContinuePromotionalPurchasesUseCase,
        fetch_promotion_order: FetchStorePromotionOrderUseCase,
        set_promotion_order: SetStorePromotionOrderUseCase,
        fetch_promotion_visibility: FetchStorePromotionVisibilityUseCase,
        set_promotion_visibility: SetStorePromotionVisibilityUseCase,
        introductory_prices: GetIntroductoryPriceDictionaryUseCase,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            base,
            continue_promotional_purchases,
            fetch_promotion_order,
            set_promotion_order,
            fetch_promotion_visibility,
            set_promotion_visibility,
            introductory_prices,
            telemetry,
        }
    }

    pub fn continue_promotional_purchases(&self) {
        self.continue_promotional_purchases.execute();
    }

    pub async fn fetch_storefront_promotion_order(&self) -> Result<Vec<String>> {
        self.fetch_promotion_order.execute().await
    }

    pub fn set_storefront_promotion_order(&self, product_ids: &[String]) -> Result<()> {
        self.set_promotion_order.execute(product_ids)
    }

    pub async fn fetch_storefront_promotion_visibility(
        &self,
        product_id: &str,
    ) -> Result<PromotionVisibility> {
        self.fetch_promotion_visibility.execute(product_id).await
    }

    pub fn set_storefront_promotion_visibility(
        &self,
        product_id: &str,
        visibility: PromotionVisibility,
    ) -> Result<()> {
        self.set_promotion_visibility.execute(product_id, visibility)
    }

    /// Introductory price info keyed by product id.
    pub fn introductory_price_dictionary(&self) -> Result<HashMap<String, String>> {
        self.introductory_prices.execute().map_err(|err| {
            self.telemetry
                .on_diagnostic(self.base.store_name().as_str(), &err.to_string());
            err
        })
    }
}

delegate_product_service!(AppleStoreExtendedProductService, base);

/// Amazon Appstore product service.
#[derive(Clone)]
pub struct AmazonAppsExtendedProductService {
    base: ExtensibleProductService,
    store: Arc<dyn AmazonNativeStore>,
    telemetry: Arc<dyn Telemetry>,
}

impl AmazonAppsExtendedProductService {
    pub fn new(
        base: ExtensibleProductService,
        store: Arc<dyn AmazonNativeStore>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            base,
            store,
            telemetry,
        }
    }

    pub async fn user_id(&self) -> Result<String> {
        self.store.user_id().await
    }

    /// Report a purchase that could not be delivered to the user.
    pub fn notify_unable_to_fulfill(&self, product_id: &str) {
        self.telemetry.on_diagnostic(
            self.base.store_name().as_str(),
            &format!("unable to fulfill {product_id}"),
        );
        self.store.notify_unable_to_fulfill(product_id);
    }
}

delegate_product_service!(AmazonAppsExtendedProductService, base);
