//! Purchase and product data shared between the client and its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::billing::BillingResult;

/// Kind of product being queried or purchased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductType {
    /// One-time product (`"inapp"`).
    InApp,
    /// Subscription (`"subs"`).
    Subs,
}

impl ProductType {
    /// Backend string for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "inapp",
            Self::Subs => "subs",
        }
    }

    /// Parse a backend string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "inapp" => Some(Self::InApp),
            "subs" => Some(Self::Subs),
            _ => None,
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseState {
    Unspecified,
    Purchased,
    Pending,
}

/// A purchase known to the backend.
///
/// `purchase_token` is the key for consume and acknowledge. `original_json`
/// keeps the backend-native payload untouched for receipt validation done
/// elsewhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub purchase_token: String,
    pub product_ids: Vec<String>,
    pub order_id: Option<String>,
    pub purchase_state: PurchaseState,
    pub acknowledged: bool,
    pub purchase_time: DateTime<Utc>,
    #[serde(default)]
    pub original_json: Value,
}

impl Purchase {
    pub fn new(purchase_token: impl Into<String>, product_id: impl Into<String>) -> Self {
        Self {
            purchase_token: purchase_token.into(),
            product_ids: vec![product_id.into()],
            order_id: None,
            purchase_state: PurchaseState::Purchased,
            acknowledged: false,
            purchase_time: Utc::now(),
            original_json: Value::Null,
        }
    }

    pub fn with_order_id(mut self, order_id: impl Into<String>) -> Self {
        self.order_id = Some(order_id.into());
        self
    }

    pub fn with_acknowledged(mut self, acknowledged: bool) -> Self {
        self.acknowledged = acknowledged;
        self
    }

    pub fn with_state(mut self, state: PurchaseState) -> Self {
        self.purchase_state = state;
        self
    }
}

/// Backend-native product descriptor keyed by product id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub product_id: String,
    pub product_type: ProductType,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub raw: Value,
}

impl ProductDetails {
    pub fn new(product_id: impl Into<String>, product_type: ProductType) -> Self {
        Self {
            product_id: product_id.into(),
            product_type,
            title: String::new(),
            description: String::new(),
            raw: Value::Null,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// How credit is applied when a subscription changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ProrationMode {
    ImmediateWithTimeProration = 1,
    ImmediateAndChargeProratedPrice = 2,
    ImmediateWithoutProration = 3,
    Deferred = 4,
    ImmediateAndChargeFullPrice = 5,
}

impl ProrationMode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(Self::ImmediateWithTimeProration),
            2 => Some(Self::ImmediateAndChargeProratedPrice),
            3 => Some(Self::ImmediateWithoutProration),
            4 => Some(Self::Deferred),
            5 => Some(Self::ImmediateAndChargeFullPrice),
            _ => None,
        }
    }
}

/// Account/profile identifiers attached to later purchase flows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObfuscationIdentifiers {
    pub account_id: Option<String>,
    pub profile_id: Option<String>,
}

/// Subscription change details passed alongside a purchase flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionUpdateParams {
    pub old_purchase_token: String,
    pub proration_mode: Option<ProrationMode>,
}

/// Everything handed to the native channel when launching a purchase flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingFlowParams {
    pub product_details: ProductDetails,
    pub obfuscation: ObfuscationIdentifiers,
    pub subscription_update: Option<SubscriptionUpdateParams>,
}

impl BillingFlowParams {
    /// Build flow parameters.
    ///
    /// Without an old purchase token this is a new purchase and the proration
    /// mode is dropped. With a token, token and mode are passed as given.
    pub fn new(
        product_details: ProductDetails,
        obfuscation: ObfuscationIdentifiers,
        old_purchase_token: Option<&str>,
        proration_mode: Option<ProrationMode>,
    ) -> Self {
        let subscription_update = old_purchase_token.map(|token| SubscriptionUpdateParams {
            old_purchase_token: token.to_string(),
            proration_mode,
        });
        Self {
            product_details,
            obfuscation,
            subscription_update,
        }
    }

    pub fn is_subscription_update(&self) -> bool {
        self.subscription_update.is_some()
    }
}

/// Purchase-updated notification delivered after a flow completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseUpdate {
    pub result: BillingResult,
    pub purchases: Vec<Purchase>,
}
