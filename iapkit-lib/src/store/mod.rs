//! Store descriptors and native store handles.
//!
//! A [`StoreDescriptor`] names the active backend and carries the
//! [`StoreInstance`] a product service is built around: the backend client
//! plus, for storefronts with capabilities beyond the common contract, a
//! native handle from the closed set in [`NativeStore`].

pub mod amazon;
pub mod apple;

pub use amazon::{AmazonNativeStore, MockAmazonNativeStore};
pub use apple::{AppleNativeStore, MockAppleNativeStore, PromotionVisibility};

use std::fmt;
use std::sync::Arc;

use crate::billing::BackendClient;

/// Backend name, used as the factory dispatch key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreName(pub String);

impl StoreName {
    /// Primary app-store billing backend.
    pub const GOOGLE_PLAY: &'static str = "GooglePlay";
    /// Apple App Store (iOS).
    pub const APPLE_APP_STORE: &'static str = "AppleAppStore";
    /// Mac App Store.
    pub const MAC_APP_STORE: &'static str = "MacAppStore";
    /// Amazon Appstore.
    pub const AMAZON_APPS: &'static str = "AmazonApps";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn google_play() -> Self {
        Self::new(Self::GOOGLE_PLAY)
    }

    pub fn apple_app_store() -> Self {
        Self::new(Self::APPLE_APP_STORE)
    }

    pub fn mac_app_store() -> Self {
        Self::new(Self::MAC_APP_STORE)
    }

    pub fn amazon_apps() -> Self {
        Self::new(Self::AMAZON_APPS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StoreName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for StoreName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Native handle attached to a store instance.
#[derive(Clone)]
pub enum NativeStore {
    Apple(Arc<dyn AppleNativeStore>),
    Amazon(Arc<dyn AmazonNativeStore>),
}

impl fmt::Debug for NativeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Apple(_) => f.write_str("NativeStore::Apple"),
            Self::Amazon(_) => f.write_str("NativeStore::Amazon"),
        }
    }
}

/// The store handle a product service graph is built around.
#[derive(Clone)]
pub struct StoreInstance {
    client: Arc<dyn BackendClient>,
    native: Option<NativeStore>,
}

impl StoreInstance {
    pub fn new(client: Arc<dyn BackendClient>) -> Self {
        Self {
            client,
            native: None,
        }
    }

    /// Attach the Apple native store.
    pub fn with_apple_store(mut self, store: Arc<dyn AppleNativeStore>) -> Self {
        self.native = Some(NativeStore::Apple(store));
        self
    }

    /// Attach the Amazon native store.
    pub fn with_amazon_store(mut self, store: Arc<dyn AmazonNativeStore>) -> Self {
        self.native = Some(NativeStore::Amazon(store));
        self
    }

    pub fn client(&self) -> Arc<dyn BackendClient> {
        self.client.clone()
    }

    pub fn native(&self) -> Option<&NativeStore> {
        self.native.as_ref()
    }

    pub fn apple_store(&self) -> Option<Arc<dyn AppleNativeStore>> {
        match &self.native {
            Some(NativeStore::Apple(store)) => Some(store.clone()),
            _ => None,
        }
    }

    pub fn amazon_store(&self) -> Option<Arc<dyn AmazonNativeStore>> {
        match &self.native {
            Some(NativeStore::Amazon(store)) => Some(store.clone()),
            _ => None,
        }
    }
}

impl fmt::Debug for StoreInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreInstance")
            .field("state", &self.client.connection_state())
            .field("native", &self.native)
            .finish()
    }
}

/// Identifies the backend one product service graph is built for.
#[derive(Clone, Debug)]
pub struct StoreDescriptor {
    pub name: StoreName,
    pub instance: StoreInstance,
}

impl StoreDescriptor {
    pub fn new(name: impl Into<StoreName>, instance: StoreInstance) -> Self {
        Self {
            name: name.into(),
            instance,
        }
    }
}
