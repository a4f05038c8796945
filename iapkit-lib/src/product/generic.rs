use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::billing::{
    BackendClient, ConnectionState, ProductDetails, ProductType, ProrationMode, Purchase,
    PurchaseUpdate,
};
use crate::product::{ProductService, TokenOutcome};
use crate::store::StoreName;
use crate::use_cases::{
    AcknowledgePurchaseUseCase, ConsumePurchaseUseCase, FetchProductsUseCase,
    PurchaseProductUseCase, QueryPurchasesUseCase,
};
use crate::Result;

/// Product service over the common use-cases only.
#[derive(Clone)]
pub struct GenericProductService {
    store_name: StoreName,
    client: Arc<dyn BackendClient>,
    fetch_products: FetchProductsUseCase,
    purchase: PurchaseProductUseCase,
    consume: ConsumePurchaseUseCase,
    acknowledge: AcknowledgePurchaseUseCase,
    query_purchases: QueryPurchasesUseCase,
}

impl GenericProductService {
    pub fn new(
        store_name: StoreName,
        client: Arc<dyn BackendClient>,
        fetch_products: FetchProductsUseCase,
        purchase: PurchaseProductUseCase,
        consume: ConsumePurchaseUseCase,
        acknowledge: AcknowledgePurchaseUseCase,
        query_purchases: QueryPurchasesUseCase,
    ) -> Self {
        Self {
            store_name,
            client,
            fetch_products,
            purchase,
            consume,
            acknowledge,
            query_purchases,
        }
    }

    /// The backend client this service drives.
    pub fn client(&self) -> &Arc<dyn BackendClient> {
        &self.client
    }
}

#[async_trait]
impl ProductService for GenericProductService {
    fn store_name(&self) -> &StoreName {
        &self.store_name
    }

    fn connection_state(&self) -> ConnectionState {
        self.client.connection_state()
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self, product_ids), fields(store = %self.store_name)))]
    async fn fetch_products(
        &self,
        product_ids: &[String],
        product_type: ProductType,
    ) -> Result<Vec<ProductDetails>> {
        self.fetch_products.execute(product_ids, product_type).await
    }

    fn purchase(&self, product: &ProductDetails) -> Result<()> {
        self.purchase.execute(product)
    }

    fn change_subscription(
        &self,
        product: &ProductDetails,
        old_purchase_token: &str,
        proration_mode: Option<ProrationMode>,
    ) -> Result<()> {
        self.purchase
            .change_subscription(product, old_purchase_token, proration_mode)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(store = %self.store_name)))]
    async fn consume(&self, purchase_token: &str) -> Result<TokenOutcome> {
        self.consume.execute(purchase_token).await
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(store = %self.store_name)))]
    async fn acknowledge(&self, purchase_token: &str) -> Result<TokenOutcome> {
        self.acknowledge.execute(purchase_token).await
    }

    async fn restore_purchases(&self) -> Result<Vec<Purchase>> {
        self.query_purchases.execute_all().await
    }

    fn purchase_updates(&self) -> broadcast::Receiver<PurchaseUpdate> {
        self.client.purchase_updates()
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), fields(store = %self.store_name)))]
    async fn on_pause(&self, paused: bool) -> Result<()> {
        if paused {
            return Ok(());
        }
        self.client.ensure_connection()?;
        self.query_purchases.refresh_all().await?;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
