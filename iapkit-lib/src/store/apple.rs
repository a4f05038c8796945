//! Apple storefront native handle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::Result;

/// Visibility of a promoted in-app purchase on the storefront.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromotionVisibility {
    #[default]
    Default,
    Show,
    Hide,
}

/// Apple-only capabilities beyond the common billing contract.
#[async_trait]
pub trait AppleNativeStore: Send + Sync {
    /// Resume purchases started from the storefront that were deferred at launch.
    fn continue_promotional_purchases(&self);

    /// Product ids in their storefront promotion order.
    async fn fetch_storefront_promotion_order(&self) -> Result<Vec<String>>;

    fn set_storefront_promotion_order(&self, product_ids: &[String]) -> Result<()>;

    async fn fetch_storefront_promotion_visibility(
        &self,
        product_id: &str,
    ) -> Result<PromotionVisibility>;

    fn set_storefront_promotion_visibility(
        &self,
        product_id: &str,
        visibility: PromotionVisibility,
    ) -> Result<()>;

    /// Introductory price info as a JSON object keyed by product id.
    fn introductory_price_dictionary(&self) -> String;
}

#[derive(Default)]
struct MockAppleState {
    order: Vec<String>,
    visibility: HashMap<String, PromotionVisibility>,
    continued: usize,
    intro_prices: String,
}

/// In-memory Apple native store.
pub struct MockAppleNativeStore {
    state: Mutex<MockAppleState>,
}

impl MockAppleNativeStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockAppleState {
                intro_prices: "{}".to_string(),
                ..MockAppleState::default()
            }),
        }
    }

    /// Set the raw introductory price JSON returned by the store.
    pub fn with_introductory_prices(self, json: impl Into<String>) -> Self {
        self.lock().intro_prices = json.into();
        self
    }

    /// How many times promotional purchases were continued.
    pub fn continued_count(&self) -> usize {
        self.lock().continued
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockAppleState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockAppleNativeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AppleNativeStore for MockAppleNativeStore {
    fn continue_promotional_purchases(&self) {
        self.lock().continued += 1;
    }

    async fn fetch_storefront_promotion_order(&self) -> Result<Vec<String>> {
        Ok(self.lock().order.clone())
    }

    fn set_storefront_promotion_order(&self, product_ids: &[String]) -> Result<()> {
        self.lock().order = product_ids.to_vec();
        Ok(())
    }

    async fn fetch_storefront_promotion_visibility(
        &self,
        product_id: &str,
    ) -> Result<PromotionVisibility> {
        Ok(self
            .lock()
            .visibility
            .get(product_id)
            .copied()
            .unwrap_or_default())
    }

    fn set_storefront_promotion_visibility(
        &self,
        product_id: &str,
        visibility: PromotionVisibility,
    ) -> Result<()> {
        self.lock()
            .visibility
            .insert(product_id.to_string(), visibility);
        Ok(())
    }

    fn introductory_price_dictionary(&self) -> String {
        self.lock().intro_prices.clone()
    }
}
