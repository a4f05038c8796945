//! iapkit library.
//!
//! One product/purchase API for an application, routed at runtime to one of
//! several commerce backends. The caller never learns which backend is active:
//! it asks a [`product::ProductServiceFactory`] for a product service keyed by
//! the store name and talks to the returned [`product::ProductService`].
//!
//! # Features
//!
//! - **Billing connection**: a reconnect-capable [`billing::BillingClient`] gated
//!   by an explicit [`billing::ConnectionState`] machine
//! - **Retry**: bounded retry with backoff for idempotent backend calls
//! - **Composition**: a small [`compose::ServiceGraph`] that wires use-cases into
//!   backend-specific product services
//!
//! # Example
//!
//! ```ignore
//! use iapkit_lib::billing::{BillingClient, ProductType};
//! use iapkit_lib::product::{FactoryContext, ProductServiceFactory};
//! use iapkit_lib::store::{StoreDescriptor, StoreInstance, StoreName};
//! use std::sync::Arc;
//!
//! let client = Arc::new(BillingClient::new(Arc::new(native_channel)));
//! client.start_connection()?;
//!
//! let factory = ProductServiceFactory::new(FactoryContext::default());
//! let store = StoreDescriptor::new(StoreName::google_play(), StoreInstance::new(client));
//! let service = factory.create(&store)?;
//!
//! let products = service
//!     .fetch_products(&["gems_100".to_string()], ProductType::InApp)
//!     .await?;
//! ```

pub mod billing;
pub mod compose;
pub mod config;
pub mod errors;
pub mod prelude;
pub mod product;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod use_cases;

/// Test utilities for purchase-flow testing.
///
/// This module is only available with the `test-utils` feature or in test builds.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use errors::{CompositionError, ErrorKind, IapError, IapErrorCode};

/// Common result alias for iapkit operations.
pub type Result<T> = std::result::Result<T, IapError>;
