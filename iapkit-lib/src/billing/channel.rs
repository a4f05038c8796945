//! Native billing channel interface.
//!
//! A [`BillingChannel`] is the platform's own billing client. Hosts implement it
//! over their SDK; [`super::BillingClient`] drives it and never talks to the
//! platform directly.

use async_trait::async_trait;
use std::sync::Arc;

use crate::billing::{BillingFlowParams, BillingResult, ProductDetails, ProductType, Purchase};

/// Receives connection lifecycle notifications from the native channel.
///
/// Callbacks may arrive on any thread.
pub trait BillingClientStateListener: Send + Sync {
    fn on_billing_setup_finished(&self, result: BillingResult);

    fn on_billing_service_disconnected(&self);
}

/// Receives purchase results after a purchase flow completes.
pub trait PurchasesUpdatedListener: Send + Sync {
    fn on_purchases_updated(&self, result: BillingResult, purchases: Vec<Purchase>);
}

/// The platform billing client.
///
/// Every async method completes exactly once. Failures are reported in the
/// returned [`BillingResult`], never as panics.
#[async_trait]
pub trait BillingChannel: Send + Sync {
    /// Begin connecting. The outcome is reported to `listener`.
    fn start_connection(&self, listener: Arc<dyn BillingClientStateListener>);

    fn end_connection(&self);

    fn set_purchases_updated_listener(&self, listener: Arc<dyn PurchasesUpdatedListener>);

    async fn query_purchases(&self, product_type: ProductType) -> (BillingResult, Vec<Purchase>);

    async fn query_product_details(
        &self,
        product_ids: &[String],
        product_type: ProductType,
    ) -> (BillingResult, Vec<ProductDetails>);

    /// Launch the purchase UI. Returns the launch result only.
    fn launch_billing_flow(&self, params: &BillingFlowParams) -> BillingResult;

    async fn consume(&self, purchase_token: &str) -> BillingResult;

    async fn acknowledge_purchase(&self, purchase_token: &str) -> BillingResult;
}
