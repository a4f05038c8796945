//! iapkit Mobile FFI Bindings
//!
//! This crate provides UniFFI bindings for iapkit, enabling integration
//! with iOS (Swift) and Android (Kotlin) applications.
//!
//! # Architecture
//!
//! The FFI layer wraps the core iapkit functionality:
//! - Native billing channel supplied by the host (`NativeBillingChannelFFI`)
//! - Callback-style billing client (`CallbackBillingClient`)
//! - Callback-style product services (`CallbackProductService`)
//!
//! # Thread Safety
//!
//! All exposed types are thread-safe and can be used from any thread.
//! Async operations run on an owned Tokio runtime and report back through
//! callbacks, each of which fires exactly once.

pub mod async_bridge;
pub mod billing_ffi;
pub mod callbacks;
pub mod channel_ffi;
pub mod product_ffi;

pub use async_bridge::{AsyncHandle, AsyncRuntime, CompletionSlot, FfiCallback, ResultCallback};
pub use billing_ffi::CallbackBillingClient;
pub use callbacks::{
    CompletionCallback, ConnectionStateCallback, ProductDetailsCallback, PurchaseUpdateCallback,
    PurchasesCallback, TokenOutcomeCallback,
};
pub use channel_ffi::{BillingEventSink, NativeBillingChannelBridge, NativeBillingChannelFFI};
pub use product_ffi::CallbackProductService;

use iapkit_lib::billing::{
    BillingResponseCode, BillingResult, ConnectionState, ProductDetails, ProductType,
    ProrationMode, Purchase, PurchaseState,
};
use iapkit_lib::product::TokenOutcome;
use iapkit_lib::{ErrorKind, IapError, IapErrorCode};

// UniFFI scaffolding
uniffi::setup_scaffolding!();

// ============================================================================
// Error Types
// ============================================================================

/// Mobile-friendly error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
pub enum MobileError {
    /// The billing connection is not ready.
    #[error("Not ready: {msg}")]
    NotReady { code: i32, msg: String },

    /// Temporary backend failure; retrying may succeed.
    #[error("Transient error: {msg}")]
    Transient { code: i32, msg: String },

    /// The purchase token was already consumed or acknowledged.
    #[error("Already handled: {msg}")]
    AlreadyHandled { code: i32, msg: String },

    /// Permanent backend or configuration failure.
    #[error("Permanent error: {msg}")]
    Permanent { code: i32, msg: String },

    /// The product service could not be composed.
    #[error("Composition error: {msg}")]
    Composition { code: i32, msg: String },

    /// Internal error (runtime failure, dropped operation).
    #[error("Internal error: {msg}")]
    Internal { msg: String },
}

impl MobileError {
    /// Numeric code, matching `IapErrorCode` for errors that come from the core.
    pub fn code(&self) -> i32 {
        match self {
            Self::NotReady { code, .. }
            | Self::Transient { code, .. }
            | Self::AlreadyHandled { code, .. }
            | Self::Permanent { code, .. }
            | Self::Composition { code, .. } => *code,
            Self::Internal { .. } => -1,
        }
    }

    /// Whether a host-side retry may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotReady { code, .. } => *code != IapErrorCode::ConnectionClosed as i32,
            Self::Transient { .. } => true,
            _ => false,
        }
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { msg: msg.into() }
    }
}

impl From<IapError> for MobileError {
    fn from(e: IapError) -> Self {
        let code = e.code() as i32;
        let msg = e.to_string();
        match e.kind() {
            ErrorKind::NotReady => Self::NotReady { code, msg },
            ErrorKind::Transient => Self::Transient { code, msg },
            ErrorKind::AlreadyHandled => Self::AlreadyHandled { code, msg },
            ErrorKind::Permanent => Self::Permanent { code, msg },
            ErrorKind::Composition => Self::Composition { code, msg },
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for MobileError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::internal(format!("Unexpected callback error: {}", e.reason))
    }
}

/// Result type for mobile operations.
pub type Result<T> = std::result::Result<T, MobileError>;

// ============================================================================
// FFI Records
// ============================================================================

/// Error details handed to host callbacks.
#[derive(Clone, Debug, PartialEq, Eq, uniffi::Record)]
pub struct ErrorInfoFFI {
    /// Numeric error code.
    pub code: i32,
    /// Human-readable description.
    pub message: String,
    /// Whether retrying may succeed.
    pub retryable: bool,
}

impl From<&MobileError> for ErrorInfoFFI {
    fn from(e: &MobileError) -> Self {
        Self {
            code: e.code(),
            message: e.to_string(),
            retryable: e.is_retryable(),
        }
    }
}

/// Backend result code plus debug message.
#[derive(Clone, Debug, PartialEq, Eq, uniffi::Record)]
pub struct BillingResultFFI {
    pub response_code: i32,
    pub debug_message: String,
}

impl BillingResultFFI {
    /// A successful result.
    pub fn ok() -> Self {
        Self {
            response_code: BillingResponseCode::Ok.code(),
            debug_message: String::new(),
        }
    }
}

impl From<BillingResultFFI> for BillingResult {
    fn from(r: BillingResultFFI) -> Self {
        BillingResult::new(BillingResponseCode::from_code(r.response_code), r.debug_message)
    }
}

impl From<BillingResult> for BillingResultFFI {
    fn from(r: BillingResult) -> Self {
        Self {
            response_code: r.response_code.code(),
            debug_message: r.debug_message,
        }
    }
}

/// Kind of product.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum ProductTypeFFI {
    InApp,
    Subs,
}

impl From<ProductTypeFFI> for ProductType {
    fn from(t: ProductTypeFFI) -> Self {
        match t {
            ProductTypeFFI::InApp => ProductType::InApp,
            ProductTypeFFI::Subs => ProductType::Subs,
        }
    }
}

impl From<ProductType> for ProductTypeFFI {
    fn from(t: ProductType) -> Self {
        match t {
            ProductType::InApp => ProductTypeFFI::InApp,
            ProductType::Subs => ProductTypeFFI::Subs,
        }
    }
}

/// Billing connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum ConnectionStateFFI {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl From<ConnectionState> for ConnectionStateFFI {
    fn from(s: ConnectionState) -> Self {
        match s {
            ConnectionState::Disconnected => Self::Disconnected,
            ConnectionState::Connecting => Self::Connecting,
            ConnectionState::Connected => Self::Connected,
            ConnectionState::Closed => Self::Closed,
        }
    }
}

/// Subscription change proration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum ProrationModeFFI {
    ImmediateWithTimeProration,
    ImmediateAndChargeProratedPrice,
    ImmediateWithoutProration,
    Deferred,
    ImmediateAndChargeFullPrice,
}

impl From<ProrationModeFFI> for ProrationMode {
    fn from(m: ProrationModeFFI) -> Self {
        match m {
            ProrationModeFFI::ImmediateWithTimeProration => Self::ImmediateWithTimeProration,
            ProrationModeFFI::ImmediateAndChargeProratedPrice => {
                Self::ImmediateAndChargeProratedPrice
            }
            ProrationModeFFI::ImmediateWithoutProration => Self::ImmediateWithoutProration,
            ProrationModeFFI::Deferred => Self::Deferred,
            ProrationModeFFI::ImmediateAndChargeFullPrice => Self::ImmediateAndChargeFullPrice,
        }
    }
}

impl From<ProrationMode> for ProrationModeFFI {
    fn from(m: ProrationMode) -> Self {
        match m {
            ProrationMode::ImmediateWithTimeProration => Self::ImmediateWithTimeProration,
            ProrationMode::ImmediateAndChargeProratedPrice => {
                Self::ImmediateAndChargeProratedPrice
            }
            ProrationMode::ImmediateWithoutProration => Self::ImmediateWithoutProration,
            ProrationMode::Deferred => Self::Deferred,
            ProrationMode::ImmediateAndChargeFullPrice => Self::ImmediateAndChargeFullPrice,
        }
    }
}

/// How a consume or acknowledge call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum TokenOutcomeFFI {
    Completed,
    AlreadyHandled,
}

impl From<TokenOutcome> for TokenOutcomeFFI {
    fn from(o: TokenOutcome) -> Self {
        match o {
            TokenOutcome::Completed => Self::Completed,
            TokenOutcome::AlreadyHandled => Self::AlreadyHandled,
        }
    }
}

/// Product details (FFI-compatible).
#[derive(Clone, Debug, PartialEq, Eq, uniffi::Record)]
pub struct ProductDetailsFFI {
    pub product_id: String,
    pub product_type: ProductTypeFFI,
    pub title: String,
    pub description: String,
    /// Backend-native payload as JSON text.
    pub raw_json: String,
}

impl From<ProductDetails> for ProductDetailsFFI {
    fn from(d: ProductDetails) -> Self {
        Self {
            product_id: d.product_id,
            product_type: d.product_type.into(),
            title: d.title,
            description: d.description,
            raw_json: d.raw.to_string(),
        }
    }
}

impl From<ProductDetailsFFI> for ProductDetails {
    fn from(d: ProductDetailsFFI) -> Self {
        let mut details = ProductDetails::new(d.product_id, d.product_type.into())
            .with_title(d.title)
            .with_description(d.description);
        // Unparseable payloads are carried as null rather than rejected.
        details.raw = serde_json::from_str(&d.raw_json).unwrap_or_default();
        details
    }
}

/// Purchase state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, uniffi::Enum)]
pub enum PurchaseStateFFI {
    Unspecified,
    Purchased,
    Pending,
}

/// A purchase (FFI-compatible).
#[derive(Clone, Debug, PartialEq, Eq, uniffi::Record)]
pub struct PurchaseFFI {
    pub purchase_token: String,
    pub product_ids: Vec<String>,
    pub order_id: Option<String>,
    pub purchase_state: PurchaseStateFFI,
    pub acknowledged: bool,
    /// Milliseconds since the Unix epoch.
    pub purchase_time_ms: i64,
    /// Backend-native payload as JSON text.
    pub original_json: String,
}

impl From<Purchase> for PurchaseFFI {
    fn from(p: Purchase) -> Self {
        Self {
            purchase_token: p.purchase_token,
            product_ids: p.product_ids,
            order_id: p.order_id,
            purchase_state: match p.purchase_state {
                PurchaseState::Unspecified => PurchaseStateFFI::Unspecified,
                PurchaseState::Purchased => PurchaseStateFFI::Purchased,
                PurchaseState::Pending => PurchaseStateFFI::Pending,
            },
            acknowledged: p.acknowledged,
            purchase_time_ms: p.purchase_time.timestamp_millis(),
            original_json: p.original_json.to_string(),
        }
    }
}

impl From<PurchaseFFI> for Purchase {
    fn from(p: PurchaseFFI) -> Self {
        let state = match p.purchase_state {
            PurchaseStateFFI::Unspecified => PurchaseState::Unspecified,
            PurchaseStateFFI::Purchased => PurchaseState::Purchased,
            PurchaseStateFFI::Pending => PurchaseState::Pending,
        };
        let mut purchase = Purchase::new(p.purchase_token, String::new())
            .with_acknowledged(p.acknowledged)
            .with_state(state);
        purchase.product_ids = p.product_ids;
        purchase.order_id = p.order_id;
        let time_ms = p.purchase_time_ms;
        purchase.purchase_time =
            chrono::DateTime::from_timestamp_millis(time_ms).unwrap_or_else(|| {
                #[cfg(feature = "tracing")]
                tracing::warn!(time_ms, "purchase time out of range, using the epoch");
                chrono::DateTime::UNIX_EPOCH
            });
        purchase.original_json = serde_json::from_str(&p.original_json).unwrap_or_default();
        purchase
    }
}

/// Result of a native purchase query.
#[derive(Clone, Debug, uniffi::Record)]
pub struct PurchasesResultFFI {
    pub result: BillingResultFFI,
    pub purchases: Vec<PurchaseFFI>,
}

/// Result of a native product details query.
#[derive(Clone, Debug, uniffi::Record)]
pub struct ProductDetailsResultFFI {
    pub result: BillingResultFFI,
    pub details: Vec<ProductDetailsFFI>,
}

/// Parameters of a native purchase flow.
#[derive(Clone, Debug, PartialEq, Eq, uniffi::Record)]
pub struct BillingFlowParamsFFI {
    pub product: ProductDetailsFFI,
    pub obfuscated_account_id: Option<String>,
    pub obfuscated_profile_id: Option<String>,
    /// Set only when replacing an existing subscription.
    pub old_purchase_token: Option<String>,
    /// Set only together with `old_purchase_token`.
    pub proration_mode: Option<ProrationModeFFI>,
}

// ============================================================================
// Free functions
// ============================================================================

/// Get the library version.
#[uniffi::export]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
