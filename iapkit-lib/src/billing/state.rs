//! Billing connection state machine.
//!
//! [`ConnectionStateMachine`] is the pure transition function.
//! [`SharedConnectionState`] wraps it for use from the caller and from native
//! callback threads, and publishes every applied transition.
//!
//! # Thread Safety
//!
//! Events are applied under a single `std::sync::Mutex`, so transitions are
//! strictly ordered per connection. Publication happens while the lock is
//! held, which keeps the broadcast order identical to the applied order.

use crate::billing::BillingResult;
use crate::{IapError, Result};
use std::fmt;
use std::sync::Mutex;
use tokio::sync::{broadcast, watch};

/// Connection lifecycle of a backend client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Terminal. A new client is required to reconnect.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    StartConnection,
    SetupFinished(BillingResult),
    ServiceDisconnected,
    EndConnection,
}

/// An applied `from -> to` change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// An event that is not valid in the current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{event:?} is not valid while {state}")]
pub struct InvalidTransition {
    pub state: ConnectionState,
    pub event: ConnectionEvent,
}

/// Pure connection state machine.
#[derive(Debug, Clone, Default)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Apply one event.
    ///
    /// Rejected events leave the state untouched. Once `Closed`, every event is
    /// rejected, including a second `EndConnection`.
    pub fn apply(
        &mut self,
        event: ConnectionEvent,
    ) -> std::result::Result<Transition, InvalidTransition> {
        use ConnectionState::*;

        let next = match (self.state, &event) {
            (Closed, _) => None,
            (_, ConnectionEvent::EndConnection) => Some(Closed),
            (Disconnected, ConnectionEvent::StartConnection) => Some(Connecting),
            (Connecting, ConnectionEvent::SetupFinished(result)) if result.is_ok() => {
                Some(Connected)
            }
            (Connecting, ConnectionEvent::SetupFinished(_)) => Some(Disconnected),
            (Connected, ConnectionEvent::ServiceDisconnected) => Some(Disconnected),
            _ => None,
        };

        match next {
            Some(to) => {
                let transition = Transition {
                    from: self.state,
                    to,
                };
                self.state = to;
                Ok(transition)
            }
            None => Err(InvalidTransition {
                state: self.state,
                event,
            }),
        }
    }
}

/// Lock-guarded state machine with transition publication.
pub struct SharedConnectionState {
    machine: Mutex<ConnectionStateMachine>,
    current: watch::Sender<ConnectionState>,
    transitions: broadcast::Sender<Transition>,
}

impl SharedConnectionState {
    /// Creates a state in `Disconnected` whose transition channel keeps up to
    /// `transition_capacity` unread transitions per subscriber.
    pub fn new(transition_capacity: usize) -> Self {
        let (current, _) = watch::channel(ConnectionState::Disconnected);
        let (transitions, _) = broadcast::channel(transition_capacity.max(1));
        Self {
            machine: Mutex::new(ConnectionStateMachine::new()),
            current,
            transitions,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.machine
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .state()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Apply an event and publish the transition if it was accepted.
    pub fn apply(
        &self,
        event: ConnectionEvent,
    ) -> std::result::Result<Transition, InvalidTransition> {
        let mut machine = self.machine.lock().unwrap_or_else(|e| e.into_inner());
        let transition = machine.apply(event)?;

        self.current.send_replace(transition.to);
        // No subscribers is fine.
        let _ = self.transitions.send(transition);

        #[cfg(feature = "tracing")]
        tracing::debug!(from = %transition.from, to = %transition.to, "billing connection transition");

        Ok(transition)
    }

    /// Subscribe to every transition applied after this call.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<Transition> {
        self.transitions.subscribe()
    }

    /// Watch the current state.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.current.subscribe()
    }

    /// Wait until the connection is `Connected`.
    ///
    /// Fails with `NotReady { state: Closed }` as soon as the connection is
    /// closed, so waiters never hang past `end_connection`.
    pub async fn wait_until_ready(&self, operation: &'static str) -> Result<()> {
        let mut rx = self.watch();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closed => return Err(IapError::not_ready(operation, state)),
                _ => {}
            }
            if rx.changed().await.is_err() {
                return Err(IapError::not_ready(operation, ConnectionState::Closed));
            }
        }
    }
}

impl fmt::Debug for SharedConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnectionState")
            .field("state", &self.state())
            .finish()
    }
}

impl Default for SharedConnectionState {
    fn default() -> Self {
        Self::new(32)
    }
}
