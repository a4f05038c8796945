//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and traits for
//! quick setup. Import everything with:
//!
//! ```rust,ignore
//! use iapkit_lib::prelude::*;
//! ```
//!
//! ## What's Included
//!
//! - Error types: `IapError`, `IapErrorCode`, `ErrorKind`, `Result`
//! - Billing: `BackendClient`, `BillingClient`, `BillingChannel`, `ConnectionState`
//! - Products: `ProductService`, `ProductServiceFactory`, `FactoryContext`
//! - Stores: `StoreName`, `StoreInstance`, `StoreDescriptor`

// Error handling
pub use crate::errors::{CompositionError, ErrorKind, IapError, IapErrorCode};
pub use crate::Result;

// Billing connection
pub use crate::billing::{
    BackendClient, BillingChannel, BillingClient, BillingFlowParams, BillingResponseCode,
    BillingResult, ConnectionState, ProductDetails, ProductType, ProrationMode, Purchase,
    PurchaseUpdate,
};

// Product services
pub use crate::product::{
    AmazonAppsExtendedProductService, AppleStoreExtendedProductService, FactoryContext,
    GenericProductService, ProductService, ProductServiceFactory, TokenOutcome,
};

// Stores
pub use crate::store::{
    AmazonNativeStore, AppleNativeStore, PromotionVisibility, StoreDescriptor, StoreInstance,
    StoreName,
};

// Configuration and retry
pub use crate::config::{BackoffStrategy, ClientConfig, IapConfig, RetryConfig};
pub use crate::retry::{RetryPolicy, RetryService};
pub use crate::telemetry::{NoopTelemetry, Telemetry};
