//! Test fixtures and data generators.

use std::sync::Arc;
use std::time::Duration;

use crate::billing::{
    BackendClient, BillingClient, MockBillingChannel, ProductDetails, ProductType, Purchase,
};
use crate::retry::{RetryPolicy, RetryService};
use crate::store::{StoreDescriptor, StoreInstance, StoreName};

/// Collection of commonly used test fixtures.
pub struct TestFixtures;

impl TestFixtures {
    /// One-time products in the sample catalog.
    pub const PRODUCT_IDS: &'static [&'static str] = &["gems_100", "gems_500", "remove_ads"];

    /// Subscriptions in the sample catalog.
    pub const SUBSCRIPTION_IDS: &'static [&'static str] = &["premium_monthly", "premium_yearly"];

    pub fn product_ids() -> Vec<String> {
        Self::PRODUCT_IDS.iter().map(|s| s.to_string()).collect()
    }

    pub fn subscription_ids() -> Vec<String> {
        Self::SUBSCRIPTION_IDS.iter().map(|s| s.to_string()).collect()
    }

    /// Details for a catalog product.
    pub fn product(product_id: &str) -> ProductDetails {
        let product_type = if Self::SUBSCRIPTION_IDS.iter().any(|id| *id == product_id) {
            ProductType::Subs
        } else {
            ProductType::InApp
        };
        ProductDetails::new(product_id, product_type).with_title(product_id.replace('_', " "))
    }

    /// An owned, unacknowledged purchase of `product_id`.
    pub fn purchase(purchase_token: &str, product_id: &str) -> Purchase {
        Purchase::new(purchase_token, product_id).with_order_id(format!("GPA.{purchase_token}"))
    }

    /// A channel that knows every catalog product and owns nothing.
    pub fn catalog_channel() -> MockBillingChannel {
        Self::PRODUCT_IDS
            .iter()
            .chain(Self::SUBSCRIPTION_IDS)
            .fold(MockBillingChannel::new(), |channel, id| {
                channel.with_product(Self::product(id))
            })
    }
}

/// A client over `channel` that has already finished setup.
///
/// # Panics
/// Panics if the channel does not finish setup synchronously.
pub fn connected_client(
    channel: MockBillingChannel,
) -> (Arc<MockBillingChannel>, Arc<BillingClient<MockBillingChannel>>) {
    let channel = Arc::new(channel);
    let client = Arc::new(BillingClient::new(channel.clone()));
    assert!(
        client.start_connection().is_ok() && client.is_ready(),
        "mock channel did not finish setup"
    );
    (channel, client)
}

/// A retry service with millisecond delays.
pub fn fast_retry(max_attempts: u32) -> RetryService {
    RetryService::new(RetryPolicy::fixed(max_attempts, Duration::from_millis(1)))
}

/// A descriptor for `name` over `client` with no native handles.
pub fn store_descriptor(name: &str, client: Arc<dyn BackendClient>) -> StoreDescriptor {
    StoreDescriptor::new(StoreName::new(name), StoreInstance::new(client))
}
