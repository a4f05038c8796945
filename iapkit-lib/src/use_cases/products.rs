use std::sync::Arc;

use crate::billing::{BackendClient, ProductDetails, ProductType};
use crate::retry::RetryService;
use crate::use_cases::prepare_attempt;
use crate::Result;

/// Resolve product details for a set of product ids.
#[derive(Clone)]
pub struct FetchProductsUseCase {
    client: Arc<dyn BackendClient>,
    retry: RetryService,
}

impl FetchProductsUseCase {
    pub fn new(client: Arc<dyn BackendClient>, retry: RetryService) -> Self {
        Self { client, retry }
    }

    /// Unknown ids are absent from the result. An empty request returns
    /// nothing without calling the backend.
    pub async fn execute(
        &self,
        product_ids: &[String],
        product_type: ProductType,
    ) -> Result<Vec<ProductDetails>> {
        if product_ids.is_empty() {
            return Ok(Vec::new());
        }

        let client = self.client.as_ref();
        self.retry
            .run("fetch_products", |attempt| async move {
                prepare_attempt(client, attempt)?;
                client.query_product_details(product_ids, product_type).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{
        BillingClient, BillingResponseCode, BillingResult, MockBillingChannel, MockOperation,
    };
    use crate::retry::RetryPolicy;
    use std::time::Duration;

    fn retry() -> RetryService {
        RetryService::new(RetryPolicy::fixed(3, Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_reconnects_after_not_ready() {
        let channel = Arc::new(
            MockBillingChannel::new().with_product(ProductDetails::new("gems", ProductType::InApp)),
        );
        let client = Arc::new(BillingClient::new(channel.clone()));
        let use_case = FetchProductsUseCase::new(client.clone(), retry());

        let details = use_case
            .execute(&["gems".to_string()], ProductType::InApp)
            .await
            .unwrap();

        assert_eq!(details.len(), 1);
        assert!(client.is_ready());
        assert_eq!(channel.call_count(MockOperation::QueryProductDetails), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_retried() {
        let channel = Arc::new(
            MockBillingChannel::new().with_product(ProductDetails::new("gems", ProductType::InApp)),
        );
        let client = Arc::new(BillingClient::new(channel.clone()));
        client.start_connection().unwrap();
        channel.push_result(
            MockOperation::QueryProductDetails,
            BillingResult::from_code(BillingResponseCode::ServiceTimeout),
        );

        let use_case = FetchProductsUseCase::new(client, retry());
        let details = use_case
            .execute(&["gems".to_string()], ProductType::InApp)
            .await
            .unwrap();

        assert_eq!(details.len(), 1);
        assert_eq!(channel.call_count(MockOperation::QueryProductDetails), 2);
    }

    #[tokio::test]
    async fn test_empty_request_skips_backend() {
        let channel = Arc::new(MockBillingChannel::new());
        let client = Arc::new(BillingClient::new(channel.clone()));
        let use_case = FetchProductsUseCase::new(client, retry());

        assert!(use_case.execute(&[], ProductType::Subs).await.unwrap().is_empty());
        assert_eq!(channel.call_count(MockOperation::QueryProductDetails), 0);
    }
}
