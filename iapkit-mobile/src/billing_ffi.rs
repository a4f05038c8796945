//! Callback-style billing client.
//!
//! [`CallbackBillingClient`] wraps a core `BackendClient` and exposes its async
//! operations as `*_async` methods that report through host callbacks.
//! Connection management and purchase launch stay synchronous.

use std::sync::Arc;

use iapkit_lib::billing::{BackendClient, BillingClient, ConnectionState, ProductDetails};

use crate::async_bridge::{AsyncRuntime, ResultCallback};
use crate::callbacks::{
    CompletionCallback, ConnectionStateCallback, ForeignCallback, ProductDetailsCallback,
    PurchasesCallback,
};
use crate::channel_ffi::{NativeBillingChannelBridge, NativeBillingChannelFFI};
use crate::{
    ConnectionStateFFI, MobileError, ProductDetailsFFI, ProductTypeFFI, ProrationModeFFI,
    PurchaseFFI, Result,
};

/// Billing client for hosts without Rust futures.
#[derive(uniffi::Object)]
pub struct CallbackBillingClient {
    runtime: Arc<AsyncRuntime>,
    client: Arc<dyn BackendClient>,
}

impl CallbackBillingClient {
    /// Wrap an existing backend client. Used by Rust hosts and tests.
    pub fn with_backend(runtime: Arc<AsyncRuntime>, client: Arc<dyn BackendClient>) -> Arc<Self> {
        Arc::new(Self { runtime, client })
    }

    /// The wrapped backend client.
    pub fn backend(&self) -> Arc<dyn BackendClient> {
        self.client.clone()
    }

    pub fn runtime(&self) -> &Arc<AsyncRuntime> {
        &self.runtime
    }
}

#[uniffi::export]
impl CallbackBillingClient {
    /// Create a client over the host's native billing channel.
    #[uniffi::constructor]
    pub fn new(channel: Box<dyn NativeBillingChannelFFI>) -> Result<Arc<Self>> {
        let runtime = Arc::new(AsyncRuntime::new()?);
        let bridge = Arc::new(NativeBillingChannelBridge::new(channel));
        let client: Arc<dyn BackendClient> = Arc::new(BillingClient::new(bridge));
        Ok(Self::with_backend(runtime, client))
    }

    /// Start connecting and report every state change to `callback` until the
    /// connection is closed.
    pub fn start_connection(&self, callback: Box<dyn ConnectionStateCallback>) -> Result<()> {
        let mut states = self.client.state_changes();
        self.runtime.spawn(async move {
            loop {
                let state = *states.borrow_and_update();
                callback.on_state_changed(state.into());
                if state == ConnectionState::Closed || states.changed().await.is_err() {
                    break;
                }
            }
        });
        self.client.start_connection().map_err(MobileError::from)
    }

    /// Close the connection. The client cannot be restarted afterwards.
    pub fn end_connection(&self) {
        self.client.end_connection();
    }

    pub fn connection_state(&self) -> ConnectionStateFFI {
        self.client.connection_state().into()
    }

    pub fn is_ready(&self) -> bool {
        self.client.is_ready()
    }

    /// Launch the purchase UI. The outcome arrives as a purchase update.
    pub fn launch_billing_flow(
        &self,
        product: ProductDetailsFFI,
        old_purchase_token: Option<String>,
        proration_mode: Option<ProrationModeFFI>,
    ) -> Result<()> {
        let details = ProductDetails::from(product);
        self.client
            .launch_billing_flow(
                &details,
                old_purchase_token.as_deref(),
                proration_mode.map(Into::into),
            )
            .map_err(MobileError::from)
    }

    pub fn query_purchases_async(
        &self,
        product_type: ProductTypeFFI,
        callback: Box<dyn PurchasesCallback>,
    ) {
        let client = self.client.clone();
        let callback: Arc<dyn ResultCallback<Vec<PurchaseFFI>>> =
            Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move {
                let purchases = client.query_purchases(product_type.into()).await?;
                Ok::<_, MobileError>(purchases.into_iter().map(PurchaseFFI::from).collect())
            },
            callback,
        );
    }

    pub fn query_product_details_async(
        &self,
        product_ids: Vec<String>,
        product_type: ProductTypeFFI,
        callback: Box<dyn ProductDetailsCallback>,
    ) {
        let client = self.client.clone();
        let callback: Arc<dyn ResultCallback<Vec<ProductDetailsFFI>>> =
            Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move {
                let details = client
                    .query_product_details(&product_ids, product_type.into())
                    .await?;
                Ok::<_, MobileError>(details.into_iter().map(ProductDetailsFFI::from).collect())
            },
            callback,
        );
    }

    /// Consume a purchase. A second consume of the same token reports an
    /// already-handled error.
    pub fn consume_async(&self, purchase_token: String, callback: Box<dyn CompletionCallback>) {
        let client = self.client.clone();
        let callback: Arc<dyn ResultCallback<()>> = Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move { Ok::<_, MobileError>(client.consume(&purchase_token).await?) },
            callback,
        );
    }

    pub fn acknowledge_purchase_async(
        &self,
        purchase_token: String,
        callback: Box<dyn CompletionCallback>,
    ) {
        let client = self.client.clone();
        let callback: Arc<dyn ResultCallback<()>> = Arc::new(ForeignCallback(callback));
        self.runtime.spawn_with_callback(
            async move {
                Ok::<_, MobileError>(client.acknowledge_purchase(&purchase_token).await?)
            },
            callback,
        );
    }

    pub fn set_obfuscation_account_id(&self, account_id: String) {
        self.client.set_obfuscation_account_id(account_id);
    }

    pub fn set_obfuscation_profile_id(&self, profile_id: String) {
        self.client.set_obfuscation_profile_id(profile_id);
    }
}
