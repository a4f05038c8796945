//! Async Bridge for Mobile Platforms
//!
//! This module provides callback-based async patterns for mobile platforms
//! that may not natively support Rust futures.
//!
//! # Overview
//!
//! Mobile platforms have different async models:
//! - iOS: Uses completion handlers and async/await (Swift 5.5+)
//! - Android: Uses callbacks, coroutines, or RxJava
//!
//! This module bridges Rust's async/await to callback-style APIs. Every
//! operation started through [`AsyncRuntime::spawn_with_callback`] reports
//! exactly once: success, failure, cancellation, or, if the task is dropped
//! before it finishes, an internal error.
//!
//! # Example (Callback Style)
//!
//! ```ignore
//! // From Swift/Kotlin
//! client.queryPurchasesAsync(productType: .inApp, callback: PurchasesHandler { result in
//!     switch result {
//!     case .success(let purchases):
//!         // Handle purchases
//!     case .failure(let error):
//!         // Handle error
//!     }
//! })
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::{MobileError, Result};

/// Result callback interface.
///
/// Implemented by adapters around host callbacks to receive async results.
pub trait ResultCallback<T>: Send + Sync {
    fn on_success(&self, value: T);
    fn on_error(&self, error: MobileError);
}

/// Holds a callback until it has been invoked once.
///
/// Whatever happens to the operation, the callback fires exactly once. If the
/// slot is dropped without a result (runtime shutdown, panicking task), the
/// callback receives an internal error.
pub struct CompletionSlot<T> {
    callback: Mutex<Option<Arc<dyn ResultCallback<T>>>>,
}

impl<T> CompletionSlot<T> {
    pub fn new(callback: Arc<dyn ResultCallback<T>>) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
        }
    }

    /// Deliver `result`. Returns false if a result was already delivered.
    pub fn complete(&self, result: Result<T>) -> bool {
        let callback = self
            .callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        match callback {
            Some(callback) => {
                match result {
                    Ok(value) => callback.on_success(value),
                    Err(error) => callback.on_error(error),
                }
                true
            }
            None => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.callback
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_none()
    }
}

impl<T> Drop for CompletionSlot<T> {
    fn drop(&mut self) {
        let callback = self
            .callback
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(callback) = callback {
            callback.on_error(MobileError::internal("operation dropped before completion"));
        }
    }
}

/// Async operation handle.
///
/// Can be used to cancel pending operations. Dropping the handle does not
/// cancel the operation.
pub struct AsyncHandle {
    cancel_tx: Option<oneshot::Sender<()>>,
}

impl AsyncHandle {
    /// Create a new handle with a cancellation sender.
    pub fn new(cancel_tx: oneshot::Sender<()>) -> Self {
        Self {
            cancel_tx: Some(cancel_tx),
        }
    }

    /// Cancel the operation. Its callback receives an internal error unless it
    /// has already completed.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Check if the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_tx.is_none()
    }
}

/// Async runtime wrapper for mobile.
///
/// Manages the Tokio runtime and provides async execution utilities.
pub struct AsyncRuntime {
    runtime: tokio::runtime::Runtime,
}

impl AsyncRuntime {
    /// Create a new async runtime.
    pub fn new() -> Result<Self> {
        tokio::runtime::Runtime::new()
            .map(|runtime| Self { runtime })
            .map_err(|e| MobileError::internal(format!("Failed to create runtime: {}", e)))
    }

    /// Create with custom configuration.
    pub fn with_threads(num_threads: usize) -> Result<Self> {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(num_threads)
            .enable_all()
            .build()
            .map(|runtime| Self { runtime })
            .map_err(|e| MobileError::internal(format!("Failed to create runtime: {}", e)))
    }

    /// Run a future to completion, blocking the current thread until complete.
    ///
    /// # Usage Restrictions
    ///
    /// Must be called from host threads that are not managed by Tokio (iOS
    /// dispatch queues, Android executor threads, FFI entry points). Calling it
    /// from inside an async context panics.
    pub fn block_on<F, T>(&self, future: F) -> T
    where
        F: Future<Output = T>,
    {
        self.runtime.block_on(future)
    }

    /// Spawn an async task whose outcome is reported to `callback` exactly once.
    ///
    /// Returns a handle that can be used to cancel the operation.
    pub fn spawn_with_callback<F, T>(
        &self,
        future: F,
        callback: Arc<dyn ResultCallback<T>>,
    ) -> AsyncHandle
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let slot = CompletionSlot::new(callback);

        self.runtime.spawn(async move {
            tokio::select! {
                // A dropped handle closes the channel; only an explicit cancel matches.
                Ok(()) = cancel_rx => {
                    slot.complete(Err(MobileError::internal("operation cancelled")));
                }
                result = future => {
                    slot.complete(result);
                }
            }
        });

        AsyncHandle::new(cancel_tx)
    }

    /// Spawn an async task (fire and forget).
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future);
    }
}

/// Callback wrapper for Rust hosts.
///
/// This provides a simple way to bridge callbacks from closures.
#[derive(Clone)]
pub struct FfiCallback<T> {
    success_fn: Arc<dyn Fn(T) + Send + Sync>,
    error_fn: Arc<dyn Fn(MobileError) + Send + Sync>,
}

impl<T> FfiCallback<T> {
    /// Create a new callback.
    pub fn new<S, E>(success_fn: S, error_fn: E) -> Self
    where
        S: Fn(T) + Send + Sync + 'static,
        E: Fn(MobileError) + Send + Sync + 'static,
    {
        Self {
            success_fn: Arc::new(success_fn),
            error_fn: Arc::new(error_fn),
        }
    }
}

impl<T: Send + Sync + 'static> ResultCallback<T> for FfiCallback<T> {
    fn on_success(&self, value: T) {
        (self.success_fn)(value);
    }

    fn on_error(&self, error: MobileError) {
        (self.error_fn)(error);
    }
}
