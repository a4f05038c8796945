//! Uniform result wrapper returned by every backend call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Response codes reported by the primary billing backend.
///
/// Numeric values match the backend's wire values so results coming from a
/// host bridge can be decoded with [`BillingResponseCode::from_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BillingResponseCode {
    ServiceTimeout,
    FeatureNotSupported,
    ServiceDisconnected,
    Ok,
    UserCanceled,
    ServiceUnavailable,
    BillingUnavailable,
    ItemUnavailable,
    DeveloperError,
    Error,
    ItemAlreadyOwned,
    ItemNotOwned,
    NetworkError,
}

impl BillingResponseCode {
    /// Decode a backend numeric code. Unknown codes map to [`BillingResponseCode::Error`].
    pub fn from_code(code: i32) -> Self {
        match code {
            -3 => Self::ServiceTimeout,
            -2 => Self::FeatureNotSupported,
            -1 => Self::ServiceDisconnected,
            0 => Self::Ok,
            1 => Self::UserCanceled,
            2 => Self::ServiceUnavailable,
            3 => Self::BillingUnavailable,
            4 => Self::ItemUnavailable,
            5 => Self::DeveloperError,
            7 => Self::ItemAlreadyOwned,
            8 => Self::ItemNotOwned,
            12 => Self::NetworkError,
            _ => Self::Error,
        }
    }

    /// The backend numeric code.
    pub fn code(self) -> i32 {
        match self {
            Self::ServiceTimeout => -3,
            Self::FeatureNotSupported => -2,
            Self::ServiceDisconnected => -1,
            Self::Ok => 0,
            Self::UserCanceled => 1,
            Self::ServiceUnavailable => 2,
            Self::BillingUnavailable => 3,
            Self::ItemUnavailable => 4,
            Self::DeveloperError => 5,
            Self::Error => 6,
            Self::ItemAlreadyOwned => 7,
            Self::ItemNotOwned => 8,
            Self::NetworkError => 12,
        }
    }

    /// Codes worth another attempt after a backoff.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ServiceTimeout
                | Self::ServiceUnavailable
                | Self::ServiceDisconnected
                | Self::NetworkError
                | Self::Error
        )
    }
}

impl fmt::Display for BillingResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.code())
    }
}

/// Outcome of a single backend call.
///
/// Immutable once built. Two results compare equal when their response codes
/// match; the debug message is diagnostic only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingResult {
    pub response_code: BillingResponseCode,
    pub debug_message: String,
}

impl BillingResult {
    pub fn new(response_code: BillingResponseCode, debug_message: impl Into<String>) -> Self {
        Self {
            response_code,
            debug_message: debug_message.into(),
        }
    }

    /// A successful result with an empty debug message.
    pub fn ok() -> Self {
        Self::new(BillingResponseCode::Ok, "")
    }

    /// Shorthand for a result with no debug message.
    pub fn from_code(response_code: BillingResponseCode) -> Self {
        Self::new(response_code, "")
    }

    pub fn is_ok(&self) -> bool {
        self.response_code == BillingResponseCode::Ok
    }
}

impl PartialEq for BillingResult {
    fn eq(&self, other: &Self) -> bool {
        self.response_code == other.response_code
    }
}

impl Eq for BillingResult {}

impl fmt::Display for BillingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.debug_message.is_empty() {
            write!(f, "{}", self.response_code)
        } else {
            write!(f, "{}: {}", self.response_code, self.debug_message)
        }
    }
}
