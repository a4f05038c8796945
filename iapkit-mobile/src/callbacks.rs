//! Callback interfaces implemented by the host application.
//!
//! Each async operation on the FFI surface takes one of these callbacks and
//! invokes exactly one of its methods exactly once.
//!
//! # Example (Kotlin)
//!
//! ```kotlin
//! client.consumeAsync(token, object : CompletionCallback {
//!     override fun onSuccess() { grantEntitlement() }
//!     override fun onError(error: ErrorInfoFfi) { showRetry(error.retryable) }
//! })
//! ```

use crate::async_bridge::ResultCallback;
use crate::{
    BillingResultFFI, ConnectionStateFFI, ErrorInfoFFI, MobileError, ProductDetailsFFI,
    PurchaseFFI, TokenOutcomeFFI,
};

/// Receives the result of a purchase query.
#[uniffi::export(callback_interface)]
pub trait PurchasesCallback: Send + Sync {
    fn on_success(&self, purchases: Vec<PurchaseFFI>);
    fn on_error(&self, error: ErrorInfoFFI);
}

/// Receives the result of a product details query.
#[uniffi::export(callback_interface)]
pub trait ProductDetailsCallback: Send + Sync {
    fn on_success(&self, details: Vec<ProductDetailsFFI>);
    fn on_error(&self, error: ErrorInfoFFI);
}

/// Receives the result of a client-level consume or acknowledge, or of a
/// lifecycle notification.
#[uniffi::export(callback_interface)]
pub trait CompletionCallback: Send + Sync {
    fn on_success(&self);
    fn on_error(&self, error: ErrorInfoFFI);
}

/// Receives the result of a product-service consume or acknowledge.
#[uniffi::export(callback_interface)]
pub trait TokenOutcomeCallback: Send + Sync {
    fn on_success(&self, outcome: TokenOutcomeFFI);
    fn on_error(&self, error: ErrorInfoFFI);
}

/// Observes connection state changes.
///
/// Intermediate states may be coalesced when they change faster than the
/// host consumes them; the latest state is always delivered.
#[uniffi::export(callback_interface)]
pub trait ConnectionStateCallback: Send + Sync {
    fn on_state_changed(&self, state: ConnectionStateFFI);
}

/// Observes purchase updates that follow a billing flow.
#[uniffi::export(callback_interface)]
pub trait PurchaseUpdateCallback: Send + Sync {
    fn on_purchases_updated(&self, result: BillingResultFFI, purchases: Vec<PurchaseFFI>);
}

/// Adapts a host callback to [`ResultCallback`].
pub(crate) struct ForeignCallback<C: ?Sized>(pub(crate) Box<C>);

impl ResultCallback<Vec<PurchaseFFI>> for ForeignCallback<dyn PurchasesCallback> {
    fn on_success(&self, value: Vec<PurchaseFFI>) {
        self.0.on_success(value);
    }

    fn on_error(&self, error: MobileError) {
        self.0.on_error(ErrorInfoFFI::from(&error));
    }
}

impl ResultCallback<Vec<ProductDetailsFFI>> for ForeignCallback<dyn ProductDetailsCallback> {
    fn on_success(&self, value: Vec<ProductDetailsFFI>) {
        self.0.on_success(value);
    }

    fn on_error(&self, error: MobileError) {
        self.0.on_error(ErrorInfoFFI::from(&error));
    }
}

impl ResultCallback<()> for ForeignCallback<dyn CompletionCallback> {
    fn on_success(&self, _value: ()) {
        self.0.on_success();
    }

    fn on_error(&self, error: MobileError) {
        self.0.on_error(ErrorInfoFFI::from(&error));
    }
}

impl ResultCallback<TokenOutcomeFFI> for ForeignCallback<dyn TokenOutcomeCallback> {
    fn on_success(&self, value: TokenOutcomeFFI) {
        self.0.on_success(value);
    }

    fn on_error(&self, error: MobileError) {
        self.0.on_error(ErrorInfoFFI::from(&error));
    }
}
