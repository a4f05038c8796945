//! Billing connection and backend client.
//!
//! This module holds everything that talks to a native billing channel:
//!
//! - [`BillingResult`] and [`BillingResponseCode`]: the value every backend call returns
//! - [`ConnectionStateMachine`]: the `Disconnected -> Connecting -> Connected -> Closed` lifecycle
//! - [`BillingChannel`]: the native channel the client drives
//! - [`BackendClient`] / [`BillingClient`]: readiness-gated async calls over the channel
//! - [`MockBillingChannel`]: scripted channel for tests

pub mod channel;
pub mod client;
pub mod inflight;
pub mod mock;
pub mod result;
pub mod state;
pub mod types;

pub use channel::{BillingChannel, BillingClientStateListener, PurchasesUpdatedListener};
pub use client::{BackendClient, BillingClient};
pub use inflight::{InFlightTokens, SingleFlight, TokenPermit};
pub use mock::{MockBillingChannel, MockOperation};
pub use result::{BillingResponseCode, BillingResult};
pub use state::{
    ConnectionEvent, ConnectionState, ConnectionStateMachine, InvalidTransition,
    SharedConnectionState, Transition,
};
pub use types::{
    BillingFlowParams, ObfuscationIdentifiers, ProductDetails, ProductType, ProrationMode,
    Purchase, PurchaseState, PurchaseUpdate, SubscriptionUpdateParams,
};
