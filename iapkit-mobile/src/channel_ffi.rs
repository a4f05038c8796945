//! Native Billing Channel FFI
//!
//! Mobile apps implement [`NativeBillingChannelFFI`] in Swift/Kotlin over the
//! platform billing library. [`NativeBillingChannelBridge`] adapts it to the
//! core `BillingChannel` trait so the regular `BillingClient` state machine,
//! readiness gating and token bookkeeping apply unchanged.
//!
//! Platform callbacks (setup finished, service disconnected, purchases
//! updated) are reported back through the [`BillingEventSink`] handed to
//! `start_connection`.
//!
//! # Example (Kotlin)
//!
//! ```kotlin
//! class PlayBillingChannel(context: Context) : NativeBillingChannelFfi {
//!     override fun startConnection(events: BillingEventSink) {
//!         billingClient.startConnection(object : BillingClientStateListener {
//!             override fun onBillingSetupFinished(result: BillingResult) =
//!                 events.onBillingSetupFinished(result.toFfi())
//!             override fun onBillingServiceDisconnected() =
//!                 events.onBillingServiceDisconnected()
//!         })
//!     }
//!     // ... other methods
//! }
//! ```

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use iapkit_lib::billing::{
    BillingChannel, BillingClientStateListener, BillingFlowParams, BillingResult, ProductDetails,
    ProductType, Purchase, PurchasesUpdatedListener,
};

use crate::{
    BillingFlowParamsFFI, BillingResultFFI, ProductDetailsResultFFI, ProductTypeFFI, PurchaseFFI,
    PurchasesResultFFI,
};

/// Platform billing library implemented by the host.
///
/// Methods may block; they are called from runtime worker threads, never
/// from the host's main thread.
#[uniffi::export(callback_interface)]
pub trait NativeBillingChannelFFI: Send + Sync {
    /// Begin connecting. Report the outcome through `events`.
    fn start_connection(&self, events: Arc<BillingEventSink>);

    fn end_connection(&self);

    fn query_purchases(&self, product_type: ProductTypeFFI) -> PurchasesResultFFI;

    fn query_product_details(
        &self,
        product_ids: Vec<String>,
        product_type: ProductTypeFFI,
    ) -> ProductDetailsResultFFI;

    /// Show the purchase UI. The outcome arrives through
    /// `BillingEventSink::on_purchases_updated`.
    fn launch_billing_flow(&self, params: BillingFlowParamsFFI) -> BillingResultFFI;

    fn consume(&self, purchase_token: String) -> BillingResultFFI;

    fn acknowledge_purchase(&self, purchase_token: String) -> BillingResultFFI;
}

/// Receives platform billing events from the host.
#[derive(uniffi::Object)]
pub struct BillingEventSink {
    state_listener: Arc<dyn BillingClientStateListener>,
    purchases_listener: Option<Arc<dyn PurchasesUpdatedListener>>,
}

#[uniffi::export]
impl BillingEventSink {
    pub fn on_billing_setup_finished(&self, result: BillingResultFFI) {
        self.state_listener.on_billing_setup_finished(result.into());
    }

    pub fn on_billing_service_disconnected(&self) {
        self.state_listener.on_billing_service_disconnected();
    }

    pub fn on_purchases_updated(&self, result: BillingResultFFI, purchases: Vec<PurchaseFFI>) {
        match &self.purchases_listener {
            Some(listener) => listener.on_purchases_updated(
                result.into(),
                purchases.into_iter().map(Purchase::from).collect(),
            ),
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!("purchase update received before a listener was installed");
            }
        }
    }
}

/// Bridges a host [`NativeBillingChannelFFI`] to the core `BillingChannel`.
pub struct NativeBillingChannelBridge {
    ffi: Box<dyn NativeBillingChannelFFI>,
    purchases_listener: Mutex<Option<Arc<dyn PurchasesUpdatedListener>>>,
}

impl NativeBillingChannelBridge {
    pub fn new(ffi: Box<dyn NativeBillingChannelFFI>) -> Self {
        Self {
            ffi,
            purchases_listener: Mutex::new(None),
        }
    }
}

impl std::fmt::Debug for NativeBillingChannelBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBillingChannelBridge")
            .field("ffi", &"<callback>")
            .finish()
    }
}

#[async_trait]
impl BillingChannel for NativeBillingChannelBridge {
    fn start_connection(&self, listener: Arc<dyn BillingClientStateListener>) {
        let purchases_listener = self
            .purchases_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let sink = Arc::new(BillingEventSink {
            state_listener: listener,
            purchases_listener,
        });
        self.ffi.start_connection(sink);
    }

    fn end_connection(&self) {
        self.ffi.end_connection();
    }

    fn set_purchases_updated_listener(&self, listener: Arc<dyn PurchasesUpdatedListener>) {
        *self
            .purchases_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(listener);
    }

    async fn query_purchases(&self, product_type: ProductType) -> (BillingResult, Vec<Purchase>) {
        let response = self.ffi.query_purchases(product_type.into());
        (
            response.result.into(),
            response.purchases.into_iter().map(Purchase::from).collect(),
        )
    }

    async fn query_product_details(
        &self,
        product_ids: &[String],
        product_type: ProductType,
    ) -> (BillingResult, Vec<ProductDetails>) {
        let response = self
            .ffi
            .query_product_details(product_ids.to_vec(), product_type.into());
        (
            response.result.into(),
            response
                .details
                .into_iter()
                .map(ProductDetails::from)
                .collect(),
        )
    }

    fn launch_billing_flow(&self, params: &BillingFlowParams) -> BillingResult {
        let update = params.subscription_update.as_ref();
        let ffi_params = BillingFlowParamsFFI {
            product: params.product_details.clone().into(),
            obfuscated_account_id: params.obfuscation.account_id.clone(),
            obfuscated_profile_id: params.obfuscation.profile_id.clone(),
            old_purchase_token: update.map(|u| u.old_purchase_token.clone()),
            proration_mode: update.and_then(|u| u.proration_mode).map(Into::into),
        };
        self.ffi.launch_billing_flow(ffi_params).into()
    }

    async fn consume(&self, purchase_token: &str) -> BillingResult {
        self.ffi.consume(purchase_token.to_string()).into()
    }

    async fn acknowledge_purchase(&self, purchase_token: &str) -> BillingResult {
        self.ffi
            .acknowledge_purchase(purchase_token.to_string())
            .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ProductDetailsFFI, ProrationModeFFI};
    use iapkit_lib::billing::{
        BackendClient, BillingClient, BillingResponseCode, ConnectionState, ProrationMode,
    };

    /// Host channel that finishes setup synchronously and records flows.
    #[derive(Default)]
    struct FakeHostChannel {
        sink: Mutex<Option<Arc<BillingEventSink>>>,
        flows: Mutex<Vec<BillingFlowParamsFFI>>,
    }

    struct SharedHost(Arc<FakeHostChannel>);

    impl NativeBillingChannelFFI for SharedHost {
        fn start_connection(&self, events: Arc<BillingEventSink>) {
            *self.0.sink.lock().unwrap() = Some(events.clone());
            events.on_billing_setup_finished(BillingResultFFI::ok());
        }

        fn end_connection(&self) {}

        fn query_purchases(&self, _product_type: ProductTypeFFI) -> PurchasesResultFFI {
            PurchasesResultFFI {
                result: BillingResultFFI::ok(),
                purchases: vec![PurchaseFFI::from(Purchase::new("t1", "gems_100"))],
            }
        }

        fn query_product_details(
            &self,
            product_ids: Vec<String>,
            product_type: ProductTypeFFI,
        ) -> ProductDetailsResultFFI {
            ProductDetailsResultFFI {
                result: BillingResultFFI::ok(),
                details: product_ids
                    .into_iter()
                    .map(|id| ProductDetailsFFI {
                        product_id: id,
                        product_type,
                        title: String::new(),
                        description: String::new(),
                        raw_json: "{}".into(),
                    })
                    .collect(),
            }
        }

        fn launch_billing_flow(&self, params: BillingFlowParamsFFI) -> BillingResultFFI {
            self.0.flows.lock().unwrap().push(params);
            BillingResultFFI::ok()
        }

        fn consume(&self, _purchase_token: String) -> BillingResultFFI {
            BillingResultFFI::ok()
        }

        fn acknowledge_purchase(&self, _purchase_token: String) -> BillingResultFFI {
            BillingResult::from_code(BillingResponseCode::ItemNotOwned).into()
        }
    }

    fn client() -> (Arc<FakeHostChannel>, BillingClient<NativeBillingChannelBridge>) {
        let host = Arc::new(FakeHostChannel::default());
        let bridge = NativeBillingChannelBridge::new(Box::new(SharedHost(host.clone())));
        let client = BillingClient::new(Arc::new(bridge));
        client.start_connection().unwrap();
        (host, client)
    }

    #[test]
    fn test_host_setup_callback_connects_client() {
        let (_, client) = client();
        assert_eq!(client.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn test_flow_params_reach_host_unmodified() {
        let (host, client) = client();
        let details = ProductDetails::new("premium_yearly", ProductType::Subs);

        client.set_obfuscation_account_id("acct".into());
        client
            .launch_billing_flow(&details, None, Some(ProrationMode::Deferred))
            .unwrap();
        client
            .launch_billing_flow(&details, Some("old"), Some(ProrationMode::Deferred))
            .unwrap();

        let flows = host.flows.lock().unwrap();
        assert_eq!(flows[0].old_purchase_token, None);
        assert_eq!(flows[0].proration_mode, None);
        assert_eq!(flows[0].obfuscated_account_id.as_deref(), Some("acct"));
        assert_eq!(flows[1].old_purchase_token.as_deref(), Some("old"));
        assert_eq!(flows[1].proration_mode, Some(ProrationModeFFI::Deferred));
    }

    #[test]
    fn test_host_purchase_updates_reach_subscribers() {
        let (host, client) = client();
        let mut updates = client.purchase_updates();

        let sink = host.sink.lock().unwrap().clone().unwrap();
        sink.on_purchases_updated(
            BillingResultFFI::ok(),
            vec![PurchaseFFI::from(Purchase::new("t9", "gems_500"))],
        );

        let update = updates.try_recv().unwrap();
        assert_eq!(update.purchases[0].purchase_token, "t9");
        assert!(client.cached_purchase("t9").is_some());
    }

    #[test]
    fn test_host_disconnect_moves_client_to_disconnected() {
        let (host, client) = client();
        let sink = host.sink.lock().unwrap().clone().unwrap();

        sink.on_billing_service_disconnected();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }
}
