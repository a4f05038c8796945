//! Telemetry hook.
//!
//! What gets emitted is up to the host. The library only calls the hook at
//! well-defined points: each retry, exhausted retries, absorbed
//! already-handled tokens and backend diagnostics.

use std::sync::Mutex;

use crate::IapError;

/// Receives library events. Every method defaults to a no-op.
pub trait Telemetry: Send + Sync {
    /// A retryable failure is about to be retried after `delay_ms`.
    fn on_retry(&self, _operation: &str, _attempt: u32, _delay_ms: u64, _error: &IapError) {}

    /// The last attempt failed and no further retry will happen.
    fn on_retries_exhausted(&self, _operation: &str, _attempts: u32, _error: &IapError) {}

    /// A consume/acknowledge found its token already handled.
    fn on_already_handled(&self, _operation: &str, _purchase_token: &str) {}

    /// Free-form diagnostic from a backend-specific service.
    fn on_diagnostic(&self, _store: &str, _message: &str) {}
}

/// Telemetry that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {}

/// One event captured by [`RecordingTelemetry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelemetryEvent {
    Retry {
        operation: String,
        attempt: u32,
        delay_ms: u64,
    },
    RetriesExhausted {
        operation: String,
        attempts: u32,
    },
    AlreadyHandled {
        operation: String,
        purchase_token: String,
    },
    Diagnostic {
        store: String,
        message: String,
    },
}

/// Telemetry that keeps every event in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct RecordingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl RecordingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn retry_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, TelemetryEvent::Retry { .. }))
            .count()
    }

    fn push(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}

impl Telemetry for RecordingTelemetry {
    fn on_retry(&self, operation: &str, attempt: u32, delay_ms: u64, _error: &IapError) {
        self.push(TelemetryEvent::Retry {
            operation: operation.to_string(),
            attempt,
            delay_ms,
        });
    }

    fn on_retries_exhausted(&self, operation: &str, attempts: u32, _error: &IapError) {
        self.push(TelemetryEvent::RetriesExhausted {
            operation: operation.to_string(),
            attempts,
        });
    }

    fn on_already_handled(&self, operation: &str, purchase_token: &str) {
        self.push(TelemetryEvent::AlreadyHandled {
            operation: operation.to_string(),
            purchase_token: purchase_token.to_string(),
        });
    }

    fn on_diagnostic(&self, store: &str, message: &str) {
        self.push(TelemetryEvent::Diagnostic {
            store: store.to_string(),
            message: message.to_string(),
        });
    }
}
