//! Amazon Appstore native handle.

use async_trait::async_trait;
use std::sync::Mutex;

use crate::Result;

/// Amazon-only capabilities beyond the common billing contract.
#[async_trait]
pub trait AmazonNativeStore: Send + Sync {
    /// The Amazon user id of the signed-in customer.
    async fn user_id(&self) -> Result<String>;

    /// Tell the store a purchase of `product_id` could not be fulfilled.
    fn notify_unable_to_fulfill(&self, product_id: &str);
}

/// In-memory Amazon native store.
pub struct MockAmazonNativeStore {
    user_id: String,
    unfulfilled: Mutex<Vec<String>>,
}

impl MockAmazonNativeStore {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            unfulfilled: Mutex::new(Vec::new()),
        }
    }

    /// Product ids reported as unfulfillable, in order.
    pub fn unfulfilled(&self) -> Vec<String> {
        self.unfulfilled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl AmazonNativeStore for MockAmazonNativeStore {
    async fn user_id(&self) -> Result<String> {
        Ok(self.user_id.clone())
    }

    fn notify_unable_to_fulfill(&self, product_id: &str) {
        self.unfulfilled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(product_id.to_string());
    }
}
