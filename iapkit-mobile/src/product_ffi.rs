//! Callback-style product service.
//!
//! [`CallbackProductService`] asks the core `ProductServiceFactory` for the
//! product service of a named store and exposes it to hosts. Stores that need
//! native handles the host cannot attach through FFI (the Apple storefronts)
//! fail at construction with a composition error.

use std::sync::Arc;

use iapkit_lib::config::IapConfig;
use iapkit_lib::product::{FactoryContext, ProductService, ProductServiceFactory};
use iapkit_lib::store::{StoreDescriptor, StoreInstance};
use iapkit_lib::telemetry::NoopTelemetry;
use tokio::sync::broadcast::error::RecvError;

use crate::async_bridge::{AsyncRuntime, ResultCallback};
use crate::billing_ffi::CallbackBillingClient;
use crate::callbacks::{
    CompletionCallback, ForeignCallback, ProductDetailsCallback, PurchaseUpdateCallback,
    PurchasesCallback, TokenOutcomeCallback,
};
use crate::{
    ConnectionStateFFI, MobileError, ProductDetailsFFI, ProductTypeFFI, ProrationModeFFI,
    PurchaseFFI, Result, TokenOutcomeFFI,
};

/// Product service for hosts without Rust futures.
#[derive(uniffi::Object)]
pub struct CallbackProductService {
    runtime: Arc<AsyncRuntime>,
    service: Arc<dyn ProductService>,
}

impl CallbackProductService {
    fn compose(
        client: &CallbackBillingClient,
        store_name: String,
        context: FactoryContext,
    ) -> Result<Arc<Self>> {
        let factory = ProductServiceFactory::new(context);
        let store = StoreDescriptor::new(store_name, StoreInstance::new(client.backend()));
        let service = factory.create(&store)?;
        Ok(Arc::new(Self {
            runtime: client.runtime().clone(),
            service,
        }))
    }

    /// The composed core service.
    pub fn service(&self) -> &Arc<dyn ProductService> {
        &self.service
    }
}

#[uniffi::export]
impl CallbackProductService {
    /// Compose the product service for `store_name` with default settings.
    #[uniffi::constructor]
    pub fn new(client: Arc<CallbackBillingClient>, store_name: String) -> Result<Arc<Self>> {
        Self::compose(&client, store_name, FactoryContext::default())
    }

    /// Compose with retry settings from a JSON configuration.
    #[uniffi::constructor]
    pub fn with_config(
        client: Arc<CallbackBillingClient>,
        store_name: String,
        config_json: String,
    ) -> Result<Arc<Self>> {
        let config = IapConfig::from_json_str(&config_json)?;
        let context = FactoryContext::from_config(&config, Arc::new(NoopTelemetry))?;
        Self::compose(&client, store_name, context)
    }

    pub fn store_name(&self) -> String {
        self.service.store_name().to_string()
    }

    pub fn connection_state(&self) -> ConnectionStateFFI {
        self.service.connection_state().into()
    }

    pub fn fetch_products_async(
        &self,
        product_ids: Vec<String>,
        product_type: ProductTypeFFI,
        callback: Box<dyn ProductDetailsCallback>,
    ) {
        let service = self.service.clone();
        let callback: Arc<dyn ResultCallback<Vec<ProductDetailsFFI>>> =
            Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move {
                let details = service
                    .fetch_products(&product_ids, product_type.into())
                    .await?;
                Ok::<_, MobileError>(details.into_iter().map(ProductDetailsFFI::from).collect())
            },
            callback,
        );
    }

    pub fn purchase(&self, product: ProductDetailsFFI) -> Result<()> {
        Ok(self.service.purchase(&product.into())?)
    }

    pub fn change_subscription(
        &self,
        product: ProductDetailsFFI,
        old_purchase_token: String,
        proration_mode: Option<ProrationModeFFI>,
    ) -> Result<()> {
        Ok(self.service.change_subscription(
            &product.into(),
            &old_purchase_token,
            proration_mode.map(Into::into),
        )?)
    }

    /// Consume a purchase; an already-consumed token succeeds with
    /// `AlreadyHandled`.
    pub fn consume_async(&self, purchase_token: String, callback: Box<dyn TokenOutcomeCallback>) {
        let service = self.service.clone();
        let callback: Arc<dyn ResultCallback<TokenOutcomeFFI>> =
            Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move {
                let outcome = service.consume(&purchase_token).await?;
                Ok::<_, MobileError>(outcome.into())
            },
            callback,
        );
    }

    pub fn acknowledge_async(
        &self,
        purchase_token: String,
        callback: Box<dyn TokenOutcomeCallback>,
    ) {
        let service = self.service.clone();
        let callback: Arc<dyn ResultCallback<TokenOutcomeFFI>> =
            Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move {
                let outcome = service.acknowledge(&purchase_token).await?;
                Ok::<_, MobileError>(outcome.into())
            },
            callback,
        );
    }

    /// Owned one-time products followed by subscriptions.
    pub fn restore_purchases_async(&self, callback: Box<dyn PurchasesCallback>) {
        let service = self.service.clone();
        let callback: Arc<dyn ResultCallback<Vec<PurchaseFFI>>> =
            Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move {
                let purchases = service.restore_purchases().await?;
                Ok::<_, MobileError>(purchases.into_iter().map(PurchaseFFI::from).collect())
            },
            callback,
        );
    }

    /// Report the app moving to the background (`true`) or foreground.
    ///
    /// On resume, purchases completed while the app was away reach
    /// `subscribe_purchase_updates` subscribers.
    pub fn on_pause_async(&self, paused: bool, callback: Box<dyn CompletionCallback>) {
        let service = self.service.clone();
        let callback: Arc<dyn ResultCallback<()>> = Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move {
                service.on_pause(paused).await?;
                Ok::<_, MobileError>(())
            },
            callback,
        );
    }

    /// Forward purchase updates to `callback` until the client goes away.
    pub fn subscribe_purchase_updates(&self, callback: Box<dyn PurchaseUpdateCallback>) {
        let mut updates = self.service.purchase_updates();
        self.runtime.spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(update) => callback.on_purchases_updated(
                        update.result.into(),
                        update.purchases.into_iter().map(PurchaseFFI::from).collect(),
                    ),
                    Err(RecvError::Lagged(_skipped)) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(skipped = _skipped, "purchase update subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
