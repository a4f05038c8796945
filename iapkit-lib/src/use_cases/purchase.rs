use std::sync::Arc;

use crate::billing::{BackendClient, ProductDetails, ProrationMode};
use crate::Result;

/// Launch a purchase flow.
///
/// Never retried: the flow involves UI and a second launch would show it
/// twice. A client that is not connected fails with `NotReady`.
#[derive(Clone)]
pub struct PurchaseProductUseCase {
    client: Arc<dyn BackendClient>,
}

impl PurchaseProductUseCase {
    pub fn new(client: Arc<dyn BackendClient>) -> Self {
        Self { client }
    }

    /// Start a new purchase.
    pub fn execute(&self, product: &ProductDetails) -> Result<()> {
        self.client.launch_billing_flow(product, None, None)
    }

    /// Replace the subscription identified by `old_purchase_token`.
    pub fn change_subscription(
        &self,
        product: &ProductDetails,
        old_purchase_token: &str,
        proration_mode: Option<ProrationMode>,
    ) -> Result<()> {
        self.client
            .launch_billing_flow(product, Some(old_purchase_token), proration_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{BillingClient, MockBillingChannel, MockOperation, ProductType};
    use crate::ErrorKind;

    #[test]
    fn test_launch_requires_connection() {
        let channel = Arc::new(MockBillingChannel::new());
        let client = Arc::new(BillingClient::new(channel.clone()));
        let use_case = PurchaseProductUseCase::new(client.clone());
        let product = ProductDetails::new("premium", ProductType::Subs);

        let err = use_case.execute(&product).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotReady);
        assert_eq!(channel.call_count(MockOperation::LaunchBillingFlow), 0);

        client.start_connection().unwrap();
        use_case
            .change_subscription(&product, "old", Some(ProrationMode::Deferred))
            .unwrap();
        let flow = &channel.launched_flows()[0];
        let update = flow.subscription_update.as_ref().unwrap();
        assert_eq!(update.old_purchase_token, "old");
        assert_eq!(update.proration_mode, Some(ProrationMode::Deferred));
    }
}
