//! Test utilities for iapkit.
//!
//! Fixtures for a small product catalog, pre-connected clients over
//! [`MockBillingChannel`](crate::billing::MockBillingChannel), fast retry
//! policies, and assertion helpers for error classification.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use iapkit_lib::test_utils::{connected_client, TestFixtures};
//!
//! let (channel, client) = connected_client(TestFixtures::catalog_channel());
//! let details = client
//!     .query_product_details(&TestFixtures::product_ids(), ProductType::InApp)
//!     .await?;
//! ```

mod assertions;
mod fixtures;

pub use assertions::{assert_already_handled, assert_error_kind, assert_not_ready};
pub use fixtures::{connected_client, fast_retry, store_descriptor, TestFixtures};
