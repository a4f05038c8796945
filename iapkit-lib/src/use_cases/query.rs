use std::sync::Arc;

use crate::billing::{BackendClient, ProductType, Purchase};
use crate::retry::RetryService;
use crate::use_cases::prepare_attempt;
use crate::Result;

/// Query owned purchases.
#[derive(Clone)]
pub struct QueryPurchasesUseCase {
    client: Arc<dyn BackendClient>,
    retry: RetryService,
}

impl QueryPurchasesUseCase {
    pub fn new(client: Arc<dyn BackendClient>, retry: RetryService) -> Self {
        Self { client, retry }
    }

    /// Purchases of one type, unordered.
    pub async fn execute(&self, product_type: ProductType) -> Result<Vec<Purchase>> {
        let client = self.client.as_ref();
        self.retry
            .run("query_purchases", |attempt| async move {
                prepare_attempt(client, attempt)?;
                client.query_purchases(product_type).await
            })
            .await
    }

    /// One-time purchases followed by subscriptions.
    pub async fn execute_all(&self) -> Result<Vec<Purchase>> {
        let mut purchases = self.execute(ProductType::InApp).await?;
        purchases.extend(self.execute(ProductType::Subs).await?);
        Ok(purchases)
    }

    /// Re-query both product types and broadcast purchases not seen before.
    pub async fn refresh_all(&self) -> Result<Vec<Purchase>> {
        let mut unseen = self.refresh(ProductType::InApp).await?;
        unseen.extend(self.refresh(ProductType::Subs).await?);
        Ok(unseen)
    }

    async fn refresh(&self, product_type: ProductType) -> Result<Vec<Purchase>> {
        let client = self.client.as_ref();
        self.retry
            .run("refresh_purchases", |attempt| async move {
                prepare_attempt(client, attempt)?;
                client.refresh_purchases(product_type).await
            })
            .await
    }
}
