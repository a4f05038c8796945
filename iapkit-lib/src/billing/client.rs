//! Backend client: readiness-gated async calls over a native billing channel.
//!
//! [`BackendClient`] is the contract every backend implements. [`BillingClient`]
//! is the primary implementation over any [`BillingChannel`].
//!
//! # Readiness
//!
//! Every call other than `start_connection`/`end_connection` checks the
//! connection state first and fails with [`IapError::NotReady`] without
//! touching the channel. Retrying is the caller's business (see
//! [`crate::retry::RetryService`]).
//!
//! # Concurrency
//!
//! Consume and acknowledge are serialized per purchase token. Identical
//! queries running at the same time share one channel call and its result.
//!
//! # Thread Safety
//!
//! Native callbacks may arrive on any thread. They only touch the client
//! through lock-guarded shared state, and no lock is held across a channel
//! call.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{broadcast, watch};

use crate::billing::{
    BillingChannel, BillingClientStateListener, BillingFlowParams, BillingResponseCode,
    BillingResult, ConnectionEvent, ConnectionState, InFlightTokens, ObfuscationIdentifiers,
    ProductDetails, ProductType, ProrationMode, Purchase, PurchaseUpdate,
    PurchasesUpdatedListener, SharedConnectionState, SingleFlight, Transition,
};
use crate::config::ClientConfig;
use crate::{IapError, Result};

/// Async call surface of one commerce backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Begin `Disconnected -> Connecting`.
    ///
    /// A no-op while already connecting or connected. Fails with `NotReady`
    /// once the client is closed.
    fn start_connection(&self) -> Result<()>;

    /// Close the connection for good. Idempotent.
    fn end_connection(&self);

    fn connection_state(&self) -> ConnectionState;

    fn is_ready(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Reconnect policy: start a connection if disconnected, otherwise leave it.
    fn ensure_connection(&self) -> Result<()> {
        match self.connection_state() {
            ConnectionState::Disconnected => self.start_connection(),
            ConnectionState::Closed => Err(IapError::not_ready(
                "ensure_connection",
                ConnectionState::Closed,
            )),
            ConnectionState::Connecting | ConnectionState::Connected => Ok(()),
        }
    }

    /// Watch the connection state.
    fn state_changes(&self) -> watch::Receiver<ConnectionState>;

    /// Wait for `Connected`; fails fast once closed.
    async fn wait_until_ready(&self) -> Result<()>;

    /// Purchases of `product_type` currently known to the backend, unordered.
    async fn query_purchases(&self, product_type: ProductType) -> Result<Vec<Purchase>>;

    /// Re-query purchases of `product_type` and broadcast the ones this client
    /// has not seen before as one purchase update.
    ///
    /// Returns only the newly seen purchases. Catches purchases completed
    /// outside the app, e.g. while it was in the background.
    async fn refresh_purchases(&self, product_type: ProductType) -> Result<Vec<Purchase>>;

    /// Details for the requested products. Unknown ids are simply absent.
    async fn query_product_details(
        &self,
        product_ids: &[String],
        product_type: ProductType,
    ) -> Result<Vec<ProductDetails>>;

    /// Launch the purchase UI.
    ///
    /// Without `old_purchase_token` this is a new purchase and `proration_mode`
    /// is ignored. The purchase outcome arrives through
    /// [`purchase_updates`](Self::purchase_updates).
    fn launch_billing_flow(
        &self,
        product_details: &ProductDetails,
        old_purchase_token: Option<&str>,
        proration_mode: Option<ProrationMode>,
    ) -> Result<()>;

    /// Consume a purchase. A token is consumed at most once; later calls fail
    /// with `AlreadyHandled`.
    async fn consume(&self, purchase_token: &str) -> Result<()>;

    /// Acknowledge a purchase, with the same at-most-once rules as consume.
    async fn acknowledge_purchase(&self, purchase_token: &str) -> Result<()>;

    /// Applies to later purchase flows only.
    fn set_obfuscation_account_id(&self, account_id: String);

    /// Applies to later purchase flows only.
    fn set_obfuscation_profile_id(&self, profile_id: String);

    fn obfuscation_identifiers(&self) -> ObfuscationIdentifiers;

    /// Subscribe to purchase-updated notifications.
    fn purchase_updates(&self) -> broadcast::Receiver<PurchaseUpdate>;

    /// Last known purchase for `purchase_token`, from queries or updates.
    fn cached_purchase(&self, purchase_token: &str) -> Option<Purchase>;
}

/// State shared between the client and the listeners it hands to the channel.
struct ClientShared {
    state: SharedConnectionState,
    consumed: Mutex<HashSet<String>>,
    acknowledged: Mutex<HashSet<String>>,
    purchases: Mutex<HashMap<String, Purchase>>,
    updates: broadcast::Sender<PurchaseUpdate>,
    obfuscation: RwLock<ObfuscationIdentifiers>,
    in_flight: InFlightTokens,
    purchase_queries: SingleFlight<ProductType, Result<Vec<Purchase>>>,
    detail_queries: SingleFlight<(ProductType, Vec<String>), Result<Vec<ProductDetails>>>,
}

impl ClientShared {
    fn cache_purchases(&self, purchases: &[Purchase]) {
        let mut cache = self.purchases.lock().unwrap_or_else(|e| e.into_inner());
        for purchase in purchases {
            cache.insert(purchase.purchase_token.clone(), purchase.clone());
        }
    }

    fn is_consumed(&self, token: &str) -> bool {
        self.consumed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(token)
    }

    fn is_acknowledged(&self, token: &str) -> bool {
        self.acknowledged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(token)
    }

    fn mark_consumed(&self, token: &str) {
        self.consumed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.to_string());
    }

    fn mark_acknowledged(&self, token: &str) {
        self.acknowledged
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.to_string());
        let mut cache = self.purchases.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(purchase) = cache.get_mut(token) {
            purchase.acknowledged = true;
        }
    }
}

/// Listener handed to the native channel. Holds only the shared state, so the
/// channel never keeps the client itself alive.
struct ChannelListener {
    shared: Arc<ClientShared>,
}

impl BillingClientStateListener for ChannelListener {
    fn on_billing_setup_finished(&self, result: BillingResult) {
        // Late callbacks after end_connection are expected and dropped.
        if let Err(_rejected) = self
            .shared
            .state
            .apply(ConnectionEvent::SetupFinished(result))
        {
            #[cfg(feature = "tracing")]
            tracing::debug!(%_rejected, "ignoring setup-finished callback");
        }
    }

    fn on_billing_service_disconnected(&self) {
        if let Err(_rejected) = self.shared.state.apply(ConnectionEvent::ServiceDisconnected) {
            #[cfg(feature = "tracing")]
            tracing::debug!(%_rejected, "ignoring service-disconnected callback");
        }
    }
}

impl PurchasesUpdatedListener for ChannelListener {
    fn on_purchases_updated(&self, result: BillingResult, purchases: Vec<Purchase>) {
        self.shared.cache_purchases(&purchases);
        // No subscribers is fine.
        let _ = self.shared.updates.send(PurchaseUpdate { result, purchases });
    }
}

/// Primary [`BackendClient`] over a native [`BillingChannel`].
///
/// # Example
///
/// ```ignore
/// use iapkit_lib::billing::{BackendClient, BillingClient, MockBillingChannel};
/// use std::sync::Arc;
///
/// let client = BillingClient::new(Arc::new(MockBillingChannel::new()));
/// client.start_connection()?;
/// client.wait_until_ready().await?;
/// ```
pub struct BillingClient<C: BillingChannel> {
    channel: Arc<C>,
    shared: Arc<ClientShared>,
    listener: Arc<ChannelListener>,
}

impl<C: BillingChannel> BillingClient<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self::with_config(channel, &ClientConfig::default())
    }

    pub fn with_config(channel: Arc<C>, config: &ClientConfig) -> Self {
        let (updates, _) = broadcast::channel(config.purchase_update_capacity.max(1));
        let shared = Arc::new(ClientShared {
            state: SharedConnectionState::new(config.transition_capacity),
            consumed: Mutex::new(HashSet::new()),
            acknowledged: Mutex::new(HashSet::new()),
            purchases: Mutex::new(HashMap::new()),
            updates,
            obfuscation: RwLock::new(ObfuscationIdentifiers::default()),
            in_flight: InFlightTokens::new(),
            purchase_queries: SingleFlight::new(),
            detail_queries: SingleFlight::new(),
        });
        let listener = Arc::new(ChannelListener {
            shared: shared.clone(),
        });
        channel.set_purchases_updated_listener(listener.clone());

        Self {
            channel,
            shared,
            listener,
        }
    }

    /// The underlying native channel.
    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    /// Subscribe to every state transition applied after this call.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<Transition> {
        self.shared.state.subscribe_transitions()
    }

    fn require_ready(&self, operation: &'static str) -> Result<()> {
        match self.shared.state.state() {
            ConnectionState::Connected => Ok(()),
            state => Err(IapError::not_ready(operation, state)),
        }
    }
}

#[async_trait]
impl<C: BillingChannel + 'static> BackendClient for BillingClient<C> {
    fn start_connection(&self) -> Result<()> {
        match self.shared.state.apply(ConnectionEvent::StartConnection) {
            Ok(_) => {
                // The transition is applied first so a synchronous setup
                // callback from the channel finds the machine in Connecting.
                self.channel.start_connection(self.listener.clone());
                Ok(())
            }
            Err(rejected) if rejected.state == ConnectionState::Closed => Err(
                IapError::not_ready("start_connection", ConnectionState::Closed),
            ),
            Err(_) => Ok(()),
        }
    }

    fn end_connection(&self) {
        if self.shared.state.apply(ConnectionEvent::EndConnection).is_ok() {
            self.channel.end_connection();
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.shared.state.state()
    }

    fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.watch()
    }

    async fn wait_until_ready(&self) -> Result<()> {
        self.shared.state.wait_until_ready("wait_until_ready").await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    async fn query_purchases(&self, product_type: ProductType) -> Result<Vec<Purchase>> {
        self.require_ready("query_purchases")?;

        let channel = &self.channel;
        let shared = &self.shared;
        self.shared
            .purchase_queries
            .run(product_type, || async move {
                let (result, purchases) = channel.query_purchases(product_type).await;
                if !result.is_ok() {
                    return Err(IapError::from_billing_result("query_purchases", result));
                }
                shared.cache_purchases(&purchases);
                Ok(purchases)
            })
            .await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    async fn refresh_purchases(&self, product_type: ProductType) -> Result<Vec<Purchase>> {
        self.require_ready("refresh_purchases")?;

        let known: HashSet<String> = self
            .shared
            .purchases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        let unseen: Vec<Purchase> = self
            .query_purchases(product_type)
            .await?
            .into_iter()
            .filter(|p| !known.contains(&p.purchase_token))
            .collect();

        if !unseen.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::info!(count = unseen.len(), "purchases found outside a purchase flow");
            let _ = self.shared.updates.send(PurchaseUpdate {
                result: BillingResult::ok(),
                purchases: unseen.clone(),
            });
        }
        Ok(unseen)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, product_ids), fields(requested = product_ids.len())))]
    async fn query_product_details(
        &self,
        product_ids: &[String],
        product_type: ProductType,
    ) -> Result<Vec<ProductDetails>> {
        self.require_ready("query_product_details")?;

        let unique: Vec<String> = product_ids
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let channel = &self.channel;
        self.shared
            .detail_queries
            .run((product_type, unique.clone()), || async move {
                let (result, details) = channel.query_product_details(&unique, product_type).await;
                if !result.is_ok() {
                    return Err(IapError::from_billing_result("query_product_details", result));
                }
                Ok(details)
            })
            .await
    }

    fn launch_billing_flow(
        &self,
        product_details: &ProductDetails,
        old_purchase_token: Option<&str>,
        proration_mode: Option<ProrationMode>,
    ) -> Result<()> {
        self.require_ready("launch_billing_flow")?;

        let params = BillingFlowParams::new(
            product_details.clone(),
            self.obfuscation_identifiers(),
            old_purchase_token,
            proration_mode,
        );
        let result = self.channel.launch_billing_flow(&params);
        if result.is_ok() {
            Ok(())
        } else {
            Err(IapError::from_billing_result("launch_billing_flow", result))
        }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    async fn consume(&self, purchase_token: &str) -> Result<()> {
        let _permit = self.shared.in_flight.acquire(purchase_token).await;
        self.require_ready("consume")?;
        if self.shared.is_consumed(purchase_token) {
            return Err(IapError::already_handled(purchase_token));
        }

        let result = self.channel.consume(purchase_token).await;
        match result.response_code {
            BillingResponseCode::Ok => {
                self.shared.mark_consumed(purchase_token);
                Ok(())
            }
            BillingResponseCode::ItemNotOwned => {
                self.shared.mark_consumed(purchase_token);
                Err(IapError::already_handled(purchase_token))
            }
            _ => Err(IapError::from_billing_result("consume", result)),
        }
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self)))]
    async fn acknowledge_purchase(&self, purchase_token: &str) -> Result<()> {
        let _permit = self.shared.in_flight.acquire(purchase_token).await;
        self.require_ready("acknowledge_purchase")?;
        // A consumed purchase is gone, so acknowledging it is moot too.
        if self.shared.is_acknowledged(purchase_token) || self.shared.is_consumed(purchase_token)
        {
            return Err(IapError::already_handled(purchase_token));
        }

        let result = self.channel.acknowledge_purchase(purchase_token).await;
        match result.response_code {
            BillingResponseCode::Ok => {
                self.shared.mark_acknowledged(purchase_token);
                Ok(())
            }
            BillingResponseCode::ItemNotOwned | BillingResponseCode::ItemAlreadyOwned => {
                self.shared.mark_acknowledged(purchase_token);
                Err(IapError::already_handled(purchase_token))
            }
            _ => Err(IapError::from_billing_result("acknowledge_purchase", result)),
        }
    }

    fn set_obfuscation_account_id(&self, account_id: String) {
        let mut ids = self
            .shared
            .obfuscation
            .write()
            .unwrap_or_else(|e| e.into_inner());
        ids.account_id = Some(account_id);
    }

    fn set_obfuscation_profile_id(&self, profile_id: String) {
        let mut ids = self
            .shared
            .obfuscation
            .write()
            .unwrap_or_else(|e| e.into_inner());
        ids.profile_id = Some(profile_id);
    }

    fn obfuscation_identifiers(&self) -> ObfuscationIdentifiers {
        self.shared
            .obfuscation
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn purchase_updates(&self) -> broadcast::Receiver<PurchaseUpdate> {
        self.shared.updates.subscribe()
    }

    fn cached_purchase(&self, purchase_token: &str) -> Option<Purchase> {
        self.shared
            .purchases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(purchase_token)
            .cloned()
    }
}
