//! Application-level operations.
//!
//! Each use-case is one operation over a backend client, small enough to be
//! resolved from a [`ServiceGraph`](crate::compose::ServiceGraph) and shared
//! between product services. Idempotent calls go through the
//! [`RetryService`](crate::retry::RetryService) and ask the client to reconnect
//! before every retried attempt.

pub mod apple;
pub mod consume;
pub mod products;
pub mod purchase;
pub mod query;

pub use apple::{
    ContinuePromotionalPurchasesUseCase, FetchStorePromotionOrderUseCase,
    FetchStorePromotionVisibilityUseCase, GetIntroductoryPriceDictionaryUseCase,
    SetStorePromotionOrderUseCase, SetStorePromotionVisibilityUseCase,
};
pub use consume::{AcknowledgePurchaseUseCase, ConsumePurchaseUseCase, TokenOutcome};
pub use products::FetchProductsUseCase;
pub use purchase::PurchaseProductUseCase;
pub use query::QueryPurchasesUseCase;

use crate::billing::BackendClient;
use crate::Result;

/// Reconnect before a retried attempt. The first attempt runs as-is so a
/// client that was never started still reports `NotReady`.
pub(crate) fn prepare_attempt(client: &dyn BackendClient, attempt: u32) -> Result<()> {
    if attempt > 1 {
        client.ensure_connection()?;
    }
    Ok(())
}
