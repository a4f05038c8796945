use std::sync::Arc;

use crate::billing::BackendClient;
use crate::retry::RetryService;
use crate::telemetry::Telemetry;
use crate::use_cases::prepare_attempt;
use crate::{IapError, Result};

/// How a consume or acknowledge call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOutcome {
    /// The backend performed the operation now.
    Completed,
    /// The token had already been handled; nothing was done.
    AlreadyHandled,
}

fn absorb_already_handled(
    result: Result<()>,
    operation: &str,
    purchase_token: &str,
    telemetry: &dyn Telemetry,
) -> Result<TokenOutcome> {
    match result {
        Ok(()) => Ok(TokenOutcome::Completed),
        Err(IapError::AlreadyHandled { .. }) => {
            #[cfg(feature = "tracing")]
            tracing::info!(operation, purchase_token, "purchase token already handled");
            telemetry.on_already_handled(operation, purchase_token);
            Ok(TokenOutcome::AlreadyHandled)
        }
        Err(err) => Err(err),
    }
}

/// Consume a purchase, absorbing already-handled tokens.
#[derive(Clone)]
pub struct ConsumePurchaseUseCase {
    client: Arc<dyn BackendClient>,
    retry: RetryService,
    telemetry: Arc<dyn Telemetry>,
}

impl ConsumePurchaseUseCase {
    pub fn new(
        client: Arc<dyn BackendClient>,
        retry: RetryService,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            client,
            retry,
            telemetry,
        }
    }

    pub async fn execute(&self, purchase_token: &str) -> Result<TokenOutcome> {
        let client = self.client.as_ref();
        let result = self
            .retry
            .run("consume", |attempt| async move {
                prepare_attempt(client, attempt)?;
                client.consume(purchase_token).await
            })
            .await;
        absorb_already_handled(result, "consume", purchase_token, self.telemetry.as_ref())
    }
}

/// Acknowledge a purchase, absorbing already-handled tokens.
#[derive(Clone)]
pub struct AcknowledgePurchaseUseCase {
    client: Arc<dyn BackendClient>,
    retry: RetryService,
    telemetry: Arc<dyn Telemetry>,
}

impl AcknowledgePurchaseUseCase {
    pub fn new(
        client: Arc<dyn BackendClient>,
        retry: RetryService,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            client,
            retry,
            telemetry,
        }
    }

    pub async fn execute(&self, purchase_token: &str) -> Result<TokenOutcome> {
        let client = self.client.as_ref();
        let result = self
            .retry
            .run("acknowledge_purchase", |attempt| async move {
                prepare_attempt(client, attempt)?;
                client.acknowledge_purchase(purchase_token).await
            })
            .await;
        absorb_already_handled(
            result,
            "acknowledge_purchase",
            purchase_token,
            self.telemetry.as_ref(),
        )
    }
}
