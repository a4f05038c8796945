//! Error types for iapkit operations.
//!
//! Every failure reported by a backend is classified into one [`ErrorKind`] at
//! the backend client boundary and travels upward as a value. Composition
//! errors are the only kind that halts service construction.

use crate::billing::{BillingResponseCode, BillingResult, ConnectionState};

/// Classification shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The billing connection is not `Connected`.
    NotReady,
    /// The backend reported a temporary failure.
    Transient,
    /// The purchase token was already consumed or acknowledged.
    AlreadyHandled,
    /// Developer/configuration error, unsupported feature, unavailable item.
    Permanent,
    /// A required registration or precondition is missing at construction time.
    Composition,
}

/// Error codes for FFI and mobile integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum IapErrorCode {
    /// Connection is not ready
    NotReady = 1000,
    /// Connection was closed for good
    ConnectionClosed = 1001,
    /// Temporary backend failure
    Transient = 2000,
    /// Token already consumed or acknowledged
    AlreadyHandled = 3000,
    /// Permanent backend failure
    Permanent = 4000,
    /// User canceled the purchase flow
    UserCanceled = 4001,
    /// Item is not available for purchase
    ItemUnavailable = 4002,
    /// Developer error reported by the backend
    DeveloperError = 4003,
    /// Requested feature is not supported
    FeatureNotSupported = 4004,
    /// Service graph could not be built
    Composition = 5000,
    /// Invalid configuration
    Config = 6000,
}

/// Failures raised while building a product service graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompositionError {
    /// Nothing registered for the requested type.
    #[error("no registration for {type_name}")]
    Missing {
        /// Requested type.
        type_name: &'static str,
    },

    /// The same type was registered twice in one graph.
    #[error("{type_name} registered twice in the same service graph")]
    Duplicate {
        /// Type registered twice.
        type_name: &'static str,
    },

    /// A recipe (indirectly) depends on itself.
    #[error("dependency cycle while resolving {type_name}")]
    Cycle {
        /// Type whose resolution re-entered itself.
        type_name: &'static str,
    },

    /// A registered product service factory returned nothing.
    #[error("product service factory for '{name}' returned no instance")]
    NoInstance {
        /// Store name the factory was registered under.
        name: String,
    },

    /// A backend-specific precondition is unmet.
    #[error("store '{store}' is missing a required precondition: {requirement}")]
    Precondition {
        /// Store being composed.
        store: String,
        /// What must be in place before composing.
        requirement: &'static str,
    },
}

/// Comprehensive error type for iapkit operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum IapError {
    /// Operation attempted while the connection is not `Connected`.
    #[error("{operation} attempted while billing connection is {state}")]
    NotReady {
        /// Operation that was rejected.
        operation: &'static str,
        /// Connection state at the time of the call.
        state: ConnectionState,
    },

    /// Temporary backend failure.
    #[error("{operation} failed transiently: {result}")]
    Transient {
        /// Operation that failed.
        operation: &'static str,
        /// Result reported by the backend.
        result: BillingResult,
    },

    /// Consume/acknowledge on a token that was already handled.
    #[error("purchase {purchase_token} was already consumed or acknowledged")]
    AlreadyHandled {
        /// The handled token.
        purchase_token: String,
    },

    /// Permanent backend failure.
    #[error("{operation} failed: {result}")]
    Permanent {
        /// Operation that failed.
        operation: &'static str,
        /// Result reported by the backend.
        result: BillingResult,
    },

    /// Service graph could not be built.
    #[error("service composition failed: {0}")]
    Composition(#[from] CompositionError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl IapError {
    /// Translates a non-`Ok` backend result into a `Transient` or `Permanent` error.
    pub fn from_billing_result(operation: &'static str, result: BillingResult) -> Self {
        if result.response_code.is_transient() {
            Self::Transient { operation, result }
        } else {
            Self::Permanent { operation, result }
        }
    }

    /// Create a not-ready error.
    pub fn not_ready(operation: &'static str, state: ConnectionState) -> Self {
        Self::NotReady { operation, state }
    }

    /// Create an already-handled error.
    pub fn already_handled(purchase_token: impl Into<String>) -> Self {
        Self::AlreadyHandled {
            purchase_token: purchase_token.into(),
        }
    }

    /// Get the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotReady { .. } => ErrorKind::NotReady,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::AlreadyHandled { .. } => ErrorKind::AlreadyHandled,
            Self::Permanent { .. } | Self::Config(_) => ErrorKind::Permanent,
            Self::Composition(_) => ErrorKind::Composition,
        }
    }

    /// Get the error code for FFI/mobile integration.
    pub fn code(&self) -> IapErrorCode {
        match self {
            Self::NotReady {
                state: ConnectionState::Closed,
                ..
            } => IapErrorCode::ConnectionClosed,
            Self::NotReady { .. } => IapErrorCode::NotReady,
            Self::Transient { .. } => IapErrorCode::Transient,
            Self::AlreadyHandled { .. } => IapErrorCode::AlreadyHandled,
            Self::Permanent { result, .. } => match result.response_code {
                BillingResponseCode::UserCanceled => IapErrorCode::UserCanceled,
                BillingResponseCode::ItemUnavailable => IapErrorCode::ItemUnavailable,
                BillingResponseCode::DeveloperError => IapErrorCode::DeveloperError,
                BillingResponseCode::FeatureNotSupported => IapErrorCode::FeatureNotSupported,
                _ => IapErrorCode::Permanent,
            },
            Self::Composition(_) => IapErrorCode::Composition,
            Self::Config(_) => IapErrorCode::Config,
        }
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// A closed connection never comes back, so `NotReady` is only retryable
    /// while the client can still reconnect.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NotReady { state, .. } => *state != ConnectionState::Closed,
            Self::Transient { .. } => true,
            _ => false,
        }
    }

    /// Returns true if the error should reach the end user.
    pub fn is_user_visible(&self) -> bool {
        self.kind() != ErrorKind::AlreadyHandled
    }

    /// Render this error as the backend result shape callback hosts expect.
    pub fn to_billing_result(&self) -> BillingResult {
        match self {
            Self::Transient { result, .. } | Self::Permanent { result, .. } => result.clone(),
            Self::NotReady { .. } => {
                BillingResult::new(BillingResponseCode::ServiceDisconnected, self.to_string())
            }
            Self::AlreadyHandled { .. } => {
                BillingResult::new(BillingResponseCode::ItemNotOwned, self.to_string())
            }
            Self::Composition(_) | Self::Config(_) => {
                BillingResult::new(BillingResponseCode::DeveloperError, self.to_string())
            }
        }
    }
}

impl From<serde_json::Error> for IapError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
