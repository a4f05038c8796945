//! In-flight guards.
//!
//! [`InFlightTokens`] keeps consume and acknowledge of the same purchase token
//! from overlapping. Each token gets its own async lock, created on first use
//! and dropped once nobody holds or waits on it, so the map only contains
//! tokens currently in flight.
//!
//! [`SingleFlight`] coalesces concurrent identical queries: the first caller
//! runs the call and every caller that joins while it is running receives a
//! clone of the same result.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Debug)]
struct Slot {
    lock: Arc<AsyncMutex<()>>,
    /// Holders plus waiters.
    users: usize,
}

type TokenLocks = Arc<Mutex<HashMap<String, Slot>>>;

/// Serializes work per purchase token.
#[derive(Debug, Clone, Default)]
pub struct InFlightTokens {
    locks: TokenLocks,
}

impl InFlightTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `token`.
    ///
    /// Different tokens never block each other. Dropping the returned future
    /// before it resolves gives up the claim on the token.
    pub async fn acquire(&self, token: &str) -> TokenPermit {
        let (lock, claim) = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            let slot = locks.entry(token.to_string()).or_insert_with(|| Slot {
                lock: Arc::new(AsyncMutex::new(())),
                users: 0,
            });
            slot.users += 1;
            let claim = Claim {
                token: token.to_string(),
                locks: self.locks.clone(),
            };
            (slot.lock.clone(), claim)
        };
        let guard = lock.lock_owned().await;
        TokenPermit {
            _guard: guard,
            claim,
        }
    }

    /// Number of tokens with a holder or waiter.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One holder's or waiter's share of a token slot.
#[derive(Debug)]
struct Claim {
    token: String,
    locks: TokenLocks,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = locks.get_mut(&self.token) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                locks.remove(&self.token);
            }
        }
    }
}

/// Exclusive access to one token, released on drop.
#[derive(Debug)]
pub struct TokenPermit {
    // Field order matters: the lock is released before the claim goes away.
    _guard: OwnedMutexGuard<()>,
    claim: Claim,
}

impl TokenPermit {
    pub fn token(&self) -> &str {
        &self.claim.token
    }
}

type Flights<K, V> = Mutex<HashMap<K, broadcast::Sender<V>>>;

enum Role<V> {
    Leader(broadcast::Sender<V>),
    Follower(broadcast::Receiver<V>),
}

/// Shares one running call among concurrent callers with the same key.
///
/// Calls are not cached: a caller arriving after the running call finished
/// starts a new one.
pub struct SingleFlight<K, V> {
    flights: Flights<K, V>,
}

impl<K, V> SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Run `call` for `key`, or wait for the call already running for it.
    ///
    /// If the running caller is dropped before finishing, one of the waiting
    /// callers runs its own call instead.
    pub async fn run<F, Fut>(&self, key: K, call: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        loop {
            match self.join(&key) {
                Role::Follower(mut leader) => {
                    if let Ok(value) = leader.recv().await {
                        return value;
                    }
                }
                Role::Leader(followers) => {
                    let flight = Flight {
                        flights: &self.flights,
                        key: &key,
                    };
                    let value = call().await;
                    // Late arrivals start a new call rather than miss this one.
                    drop(flight);
                    let _ = followers.send(value.clone());
                    return value;
                }
            }
        }
    }

    /// Number of keys with a running call.
    pub fn len(&self) -> usize {
        self.flights.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn join(&self, key: &K) -> Role<V> {
        let mut flights = self.flights.lock().unwrap_or_else(|e| e.into_inner());
        match flights.get(key) {
            Some(leader) => Role::Follower(leader.subscribe()),
            None => {
                let (followers, _) = broadcast::channel(1);
                flights.insert(key.clone(), followers.clone());
                Role::Leader(followers)
            }
        }
    }
}

impl<K, V> Default for SingleFlight<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for SingleFlight<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self.flights.lock().unwrap_or_else(|e| e.into_inner()).len();
        f.debug_struct("SingleFlight")
            .field("running", &running)
            .finish()
    }
}

/// Removes the leader's entry when its call finishes or is dropped.
struct Flight<'a, K: Eq + Hash, V> {
    flights: &'a Flights<K, V>,
    key: &'a K,
}

impl<K: Eq + Hash, V> Drop for Flight<'_, K, V> {
    fn drop(&mut self) {
        self.flights
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(self.key);
    }
}
