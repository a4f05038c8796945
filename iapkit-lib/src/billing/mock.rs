//! Scripted in-memory billing channel.
//!
//! `MockBillingChannel` stands in for a platform billing client in tests and
//! demos. It owns a catalog of products and purchases, records every call,
//! and lets a test script the next result of any operation.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::billing::{
    BillingChannel, BillingClientStateListener, BillingFlowParams, BillingResponseCode,
    BillingResult, ProductDetails, ProductType, Purchase, PurchasesUpdatedListener,
};

/// Channel operations, used for call counts and scripted results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    StartConnection,
    EndConnection,
    QueryPurchases,
    QueryProductDetails,
    LaunchBillingFlow,
    Consume,
    AcknowledgePurchase,
}

#[derive(Default)]
struct MockState {
    auto_setup: Option<BillingResult>,
    state_listener: Option<Arc<dyn BillingClientStateListener>>,
    purchases_listener: Option<Arc<dyn PurchasesUpdatedListener>>,
    products: Vec<ProductDetails>,
    purchases: Vec<(ProductType, Purchase)>,
    scripted: HashMap<MockOperation, VecDeque<BillingResult>>,
    calls: HashMap<MockOperation, usize>,
    launched: Vec<BillingFlowParams>,
    requested_product_ids: Vec<Vec<String>>,
    latency: Option<Duration>,
}

impl MockState {
    fn record(&mut self, op: MockOperation) -> Option<BillingResult> {
        *self.calls.entry(op).or_insert(0) += 1;
        self.scripted.get_mut(&op).and_then(VecDeque::pop_front)
    }
}

/// Mock billing channel for testing.
///
/// By default the channel finishes setup successfully as soon as
/// `start_connection` is called. Use [`MockBillingChannel::manual`] to drive
/// setup by hand with [`finish_setup`](MockBillingChannel::finish_setup).
pub struct MockBillingChannel {
    state: Mutex<MockState>,
}

impl MockBillingChannel {
    /// A channel whose setup succeeds immediately.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                auto_setup: Some(BillingResult::ok()),
                ..MockState::default()
            }),
        }
    }

    /// A channel whose setup only finishes through `finish_setup`.
    pub fn manual() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_product(self, product: ProductDetails) -> Self {
        self.lock().products.push(product);
        self
    }

    /// Add an owned one-time purchase.
    pub fn with_purchase(self, purchase: Purchase) -> Self {
        self.lock().purchases.push((ProductType::InApp, purchase));
        self
    }

    /// Add an owned subscription.
    pub fn with_subscription(self, purchase: Purchase) -> Self {
        self.lock().purchases.push((ProductType::Subs, purchase));
        self
    }

    /// Add an owned one-time purchase without notifying the purchases
    /// listener, as when it was bought on another device.
    pub fn grant_purchase(&self, purchase: Purchase) {
        self.lock().purchases.push((ProductType::InApp, purchase));
    }

    /// Delay every async operation, to widen race windows in tests.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = Some(latency);
        self
    }

    /// Queue the result of the next call to `op`.
    ///
    /// A scripted failure is returned as-is. A scripted `Ok` falls through to
    /// the default behavior.
    pub fn push_result(&self, op: MockOperation, result: BillingResult) {
        self.lock().scripted.entry(op).or_default().push_back(result);
    }

    /// Report setup-finished to the registered listener.
    pub fn finish_setup(&self, result: BillingResult) {
        let listener = self.lock().state_listener.clone();
        if let Some(listener) = listener {
            listener.on_billing_setup_finished(result);
        }
    }

    /// Report a dropped service connection.
    pub fn disconnect(&self) {
        let listener = self.lock().state_listener.clone();
        if let Some(listener) = listener {
            listener.on_billing_service_disconnected();
        }
    }

    /// Deliver a purchase-updated notification.
    pub fn emit_purchases_updated(&self, result: BillingResult, purchases: Vec<Purchase>) {
        let listener = {
            let mut state = self.lock();
            if result.is_ok() {
                for purchase in &purchases {
                    state.purchases.push((ProductType::InApp, purchase.clone()));
                }
            }
            state.purchases_listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_purchases_updated(result, purchases);
        }
    }

    pub fn call_count(&self, op: MockOperation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Parameters of every launched flow, in order.
    pub fn launched_flows(&self) -> Vec<BillingFlowParams> {
        self.lock().launched.clone()
    }

    /// Product id lists passed to `query_product_details`, in order.
    pub fn requested_product_ids(&self) -> Vec<Vec<String>> {
        self.lock().requested_product_ids.clone()
    }

    pub fn owns(&self, purchase_token: &str) -> bool {
        self.lock()
            .purchases
            .iter()
            .any(|(_, p)| p.purchase_token == purchase_token)
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockBillingChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BillingChannel for MockBillingChannel {
    fn start_connection(&self, listener: Arc<dyn BillingClientStateListener>) {
        let setup = {
            let mut state = self.lock();
            let scripted = state.record(MockOperation::StartConnection);
            state.state_listener = Some(listener.clone());
            scripted.or_else(|| state.auto_setup.clone())
        };
        if let Some(result) = setup {
            listener.on_billing_setup_finished(result);
        }
    }

    fn end_connection(&self) {
        let mut state = self.lock();
        state.record(MockOperation::EndConnection);
        state.state_listener = None;
    }

    fn set_purchases_updated_listener(&self, listener: Arc<dyn PurchasesUpdatedListener>) {
        self.lock().purchases_listener = Some(listener);
    }

    async fn query_purchases(&self, product_type: ProductType) -> (BillingResult, Vec<Purchase>) {
        self.simulate_latency().await;
        let mut state = self.lock();
        if let Some(result) = state.record(MockOperation::QueryPurchases) {
            if !result.is_ok() {
                return (result, Vec::new());
            }
        }
        let purchases = state
            .purchases
            .iter()
            .filter(|(kind, _)| *kind == product_type)
            .map(|(_, p)| p.clone())
            .collect();
        (BillingResult::ok(), purchases)
    }

    async fn query_product_details(
        &self,
        product_ids: &[String],
        product_type: ProductType,
    ) -> (BillingResult, Vec<ProductDetails>) {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.requested_product_ids.push(product_ids.to_vec());
        if let Some(result) = state.record(MockOperation::QueryProductDetails) {
            if !result.is_ok() {
                return (result, Vec::new());
            }
        }
        let details = state
            .products
            .iter()
            .filter(|p| p.product_type == product_type && product_ids.contains(&p.product_id))
            .cloned()
            .collect();
        (BillingResult::ok(), details)
    }

    fn launch_billing_flow(&self, params: &BillingFlowParams) -> BillingResult {
        let mut state = self.lock();
        let scripted = state.record(MockOperation::LaunchBillingFlow);
        state.launched.push(params.clone());
        scripted.unwrap_or_else(BillingResult::ok)
    }

    async fn consume(&self, purchase_token: &str) -> BillingResult {
        self.simulate_latency().await;
        let mut state = self.lock();
        if let Some(result) = state.record(MockOperation::Consume) {
            if !result.is_ok() {
                return result;
            }
        }
        let before = state.purchases.len();
        state
            .purchases
            .retain(|(_, p)| p.purchase_token != purchase_token);
        if state.purchases.len() < before {
            BillingResult::ok()
        } else {
            BillingResult::new(BillingResponseCode::ItemNotOwned, "purchase not owned")
        }
    }

    async fn acknowledge_purchase(&self, purchase_token: &str) -> BillingResult {
        self.simulate_latency().await;
        let mut state = self.lock();
        if let Some(result) = state.record(MockOperation::AcknowledgePurchase) {
            if !result.is_ok() {
                return result;
            }
        }
        match state
            .purchases
            .iter_mut()
            .find(|(_, p)| p.purchase_token == purchase_token)
        {
            Some((_, purchase)) if purchase.acknowledged => BillingResult::new(
                BillingResponseCode::ItemAlreadyOwned,
                "purchase already acknowledged",
            ),
            Some((_, purchase)) => {
                purchase.acknowledged = true;
                BillingResult::ok()
            }
            None => BillingResult::new(BillingResponseCode::ItemNotOwned, "purchase not owned"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failure_then_default() {
        let channel = MockBillingChannel::new().with_purchase(Purchase::new("t1", "gems"));
        channel.push_result(
            MockOperation::Consume,
            BillingResult::from_code(BillingResponseCode::ServiceUnavailable),
        );

        let first = channel.consume("t1").await;
        assert_eq!(first.response_code, BillingResponseCode::ServiceUnavailable);
        assert!(channel.owns("t1"));

        assert!(channel.consume("t1").await.is_ok());
        assert!(!channel.owns("t1"));
        assert_eq!(
            channel.consume("t1").await.response_code,
            BillingResponseCode::ItemNotOwned
        );
        assert_eq!(channel.call_count(MockOperation::Consume), 3);
    }

    #[tokio::test]
    async fn test_query_filters_by_type() {
        let channel = MockBillingChannel::new()
            .with_purchase(Purchase::new("t1", "gems"))
            .with_subscription(Purchase::new("s1", "premium"));

        let (result, subs) = channel.query_purchases(ProductType::Subs).await;
        assert!(result.is_ok());
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].purchase_token, "s1");
    }
}
