//! Assertions on error classification.

use std::fmt::Debug;

use crate::billing::ConnectionState;
use crate::{ErrorKind, IapError, Result};

/// Assert that `result` failed with an error of `kind`.
///
/// # Panics
/// Panics if the result is `Ok` or the error has another kind.
pub fn assert_error_kind<T: Debug>(result: &Result<T>, kind: ErrorKind) {
    match result {
        Ok(value) => panic!("expected {kind:?} error, got Ok({value:?})"),
        Err(err) => assert_eq!(err.kind(), kind, "unexpected error: {err}"),
    }
}

/// Assert that `result` failed with `NotReady` in `state`.
///
/// # Panics
/// Panics on any other outcome.
pub fn assert_not_ready<T: Debug>(result: &Result<T>, state: ConnectionState) {
    match result {
        Err(IapError::NotReady { state: actual, .. }) => assert_eq!(
            *actual, state,
            "NotReady reported the wrong connection state"
        ),
        other => panic!("expected NotReady({state}), got {other:?}"),
    }
}

/// Assert that `result` failed because `purchase_token` was already handled.
///
/// # Panics
/// Panics on any other outcome.
pub fn assert_already_handled<T: Debug>(result: &Result<T>, purchase_token: &str) {
    match result {
        Err(IapError::AlreadyHandled {
            purchase_token: actual,
        }) => assert_eq!(actual, purchase_token),
        other => panic!("expected AlreadyHandled({purchase_token}), got {other:?}"),
    }
}
