//! Apple storefront use-cases.
//!
//! Thin units over [`AppleNativeStore`], registered only in the Apple recipe.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::billing::{BillingResponseCode, BillingResult};
use crate::store::{AppleNativeStore, PromotionVisibility};
use crate::{IapError, Result};

#[derive(Clone)]
pub struct ContinuePromotionalPurchasesUseCase {
    store: Arc<dyn AppleNativeStore>,
}

impl ContinuePromotionalPurchasesUseCase {
    pub fn new(store: Arc<dyn AppleNativeStore>) -> Self {
        Self { store }
    }

    pub fn execute(&self) {
        self.store.continue_promotional_purchases();
    }
}

#[derive(Clone)]
pub struct FetchStorePromotionOrderUseCase {
    store: Arc<dyn AppleNativeStore>,
}

impl FetchStorePromotionOrderUseCase {
    pub fn new(store: Arc<dyn AppleNativeStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self) -> Result<Vec<String>> {
        self.store.fetch_storefront_promotion_order().await
    }
}

#[derive(Clone)]
pub struct SetStorePromotionOrderUseCase {
    store: Arc<dyn AppleNativeStore>,
}

impl SetStorePromotionOrderUseCase {
    pub fn new(store: Arc<dyn AppleNativeStore>) -> Self {
        Self { store }
    }

    pub fn execute(&self, product_ids: &[String]) -> Result<()> {
        self.store.set_storefront_promotion_order(product_ids)
    }
}

#[derive(Clone)]
pub struct FetchStorePromotionVisibilityUseCase {
    store: Arc<dyn AppleNativeStore>,
}

impl FetchStorePromotionVisibilityUseCase {
    pub fn new(store: Arc<dyn AppleNativeStore>) -> Self {
        Self { store }
    }

    pub async fn execute(&self, product_id: &str) -> Result<PromotionVisibility> {
        self.store
            .fetch_storefront_promotion_visibility(product_id)
            .await
    }
}

#[derive(Clone)]
pub struct SetStorePromotionVisibilityUseCase {
    store: Arc<dyn AppleNativeStore>,
}

impl SetStorePromotionVisibilityUseCase {
    pub fn new(store: Arc<dyn AppleNativeStore>) -> Self {
        Self { store }
    }

    pub fn execute(&self, product_id: &str, visibility: PromotionVisibility) -> Result<()> {
        self.store
            .set_storefront_promotion_visibility(product_id, visibility)
    }
}

/// Introductory price info keyed by product id.
#[derive(Clone)]
pub struct GetIntroductoryPriceDictionaryUseCase {
    store: Arc<dyn AppleNativeStore>,
}

impl GetIntroductoryPriceDictionaryUseCase {
    pub fn new(store: Arc<dyn AppleNativeStore>) -> Self {
        Self { store }
    }

    /// Nested objects are returned as their JSON text. An empty payload is an
    /// empty dictionary.
    pub fn execute(&self) -> Result<HashMap<String, String>> {
        let raw = self.store.introductory_price_dictionary();
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }

        let parsed: HashMap<String, Value> =
            serde_json::from_str(&raw).map_err(|err| IapError::Permanent {
                operation: "introductory_price_dictionary",
                result: BillingResult::new(BillingResponseCode::Error, err.to_string()),
            })?;

        Ok(parsed
            .into_iter()
            .map(|(product_id, value)| {
                let text = match value {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                (product_id, text)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockAppleNativeStore;

    #[tokio::test]
    async fn test_promotion_order_round_trip() {
        let store: Arc<dyn AppleNativeStore> = Arc::new(MockAppleNativeStore::new());
        let set = SetStorePromotionOrderUseCase::new(store.clone());
        let fetch = FetchStorePromotionOrderUseCase::new(store);

        set.execute(&["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(fetch.execute().await.unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_visibility_defaults() {
        let store: Arc<dyn AppleNativeStore> = Arc::new(MockAppleNativeStore::new());
        let set = SetStorePromotionVisibilityUseCase::new(store.clone());
        let fetch = FetchStorePromotionVisibilityUseCase::new(store);

        assert_eq!(fetch.execute("gems").await.unwrap(), PromotionVisibility::Default);
        set.execute("gems", PromotionVisibility::Hide).unwrap();
        assert_eq!(fetch.execute("gems").await.unwrap(), PromotionVisibility::Hide);
    }

    #[test]
    fn test_introductory_prices() {
        let store = Arc::new(MockAppleNativeStore::new().with_introductory_prices(
            r#"{"premium": {"price": "0.99", "periods": 3}, "basic": "free week"}"#,
        ));
        let use_case = GetIntroductoryPriceDictionaryUseCase::new(store);

        let prices = use_case.execute().unwrap();
        assert_eq!(prices["basic"], "free week");
        assert!(prices["premium"].contains("0.99"));
    }

    #[test]
    fn test_malformed_introductory_prices() {
        let store = Arc::new(MockAppleNativeStore::new().with_introductory_prices("[1, 2"));
        let err = GetIntroductoryPriceDictionaryUseCase::new(store)
            .execute()
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
