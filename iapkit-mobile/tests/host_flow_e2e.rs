//! Host Flow E2E Tests
//!
//! Drives the FFI surface the way a mobile app does:
//! - The host implements `NativeBillingChannelFFI` over its billing library
//! - The app talks to `CallbackBillingClient` and `CallbackProductService`
//! - Every async result arrives through a host callback, exactly once

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use iapkit_lib::IapErrorCode;
use iapkit_mobile::{
    BillingEventSink, BillingFlowParamsFFI, BillingResultFFI, CallbackBillingClient,
    CallbackProductService, CompletionCallback, ConnectionStateCallback, ConnectionStateFFI,
    ErrorInfoFFI, NativeBillingChannelFFI, ProductDetailsCallback, ProductDetailsFFI,
    ProductDetailsResultFFI, ProductTypeFFI, PurchaseFFI, PurchaseStateFFI, PurchasesResultFFI,
    TokenOutcomeCallback, TokenOutcomeFFI,
};

const TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Simulated platform billing library
// ============================================================================

#[derive(Default)]
struct StoreState {
    sink: Option<Arc<BillingEventSink>>,
    owned: HashMap<String, PurchaseFFI>,
    consumed: Vec<String>,
    next_order: u32,
    /// How long a consume blocks before the store answers.
    latency: Duration,
}

/// In-process stand-in for a platform billing library.
#[derive(Clone, Default)]
struct SimulatedStore {
    state: Arc<Mutex<StoreState>>,
}

impl SimulatedStore {
    fn product(id: &str) -> ProductDetailsFFI {
        ProductDetailsFFI {
            product_id: id.to_string(),
            product_type: ProductTypeFFI::InApp,
            title: id.replace('_', " "),
            description: String::new(),
            raw_json: format!(r#"{{"productId":"{id}"}}"#),
        }
    }

    /// Completes the pending purchase flow, as the platform UI would.
    fn complete_purchase(&self, product_id: &str) -> String {
        let (sink, purchase) = {
            let mut state = self.state.lock().unwrap();
            state.next_order += 1;
            let token = format!("token-{}", state.next_order);
            let purchase = PurchaseFFI {
                purchase_token: token.clone(),
                product_ids: vec![product_id.to_string()],
                order_id: Some(format!("GPA.{}", state.next_order)),
                purchase_state: PurchaseStateFFI::Purchased,
                acknowledged: false,
                purchase_time_ms: 1_700_000_000_000,
                original_json: "{}".into(),
            };
            state.owned.insert(token, purchase.clone());
            (state.sink.clone().unwrap(), purchase)
        };
        let token = purchase.purchase_token.clone();
        sink.on_purchases_updated(BillingResultFFI::ok(), vec![purchase]);
        token
    }

    fn set_latency(&self, latency: Duration) {
        self.state.lock().unwrap().latency = latency;
    }

    /// Drops the service connection, as the platform does when its billing
    /// service dies.
    fn disconnect(&self) {
        let sink = self.state.lock().unwrap().sink.clone();
        if let Some(sink) = sink {
            sink.on_billing_service_disconnected();
        }
    }
}

impl NativeBillingChannelFFI for SimulatedStore {
    fn start_connection(&self, events: Arc<BillingEventSink>) {
        self.state.lock().unwrap().sink = Some(events.clone());
        events.on_billing_setup_finished(BillingResultFFI::ok());
    }

    fn end_connection(&self) {
        self.state.lock().unwrap().sink = None;
    }

    fn query_purchases(&self, product_type: ProductTypeFFI) -> PurchasesResultFFI {
        let purchases = match product_type {
            ProductTypeFFI::InApp => self.state.lock().unwrap().owned.values().cloned().collect(),
            ProductTypeFFI::Subs => Vec::new(),
        };
        PurchasesResultFFI {
            result: BillingResultFFI::ok(),
            purchases,
        }
    }

    fn query_product_details(
        &self,
        product_ids: Vec<String>,
        _product_type: ProductTypeFFI,
    ) -> ProductDetailsResultFFI {
        ProductDetailsResultFFI {
            result: BillingResultFFI::ok(),
            details: product_ids.iter().map(|id| Self::product(id)).collect(),
        }
    }

    fn launch_billing_flow(&self, _params: BillingFlowParamsFFI) -> BillingResultFFI {
        BillingResultFFI::ok()
    }

    fn consume(&self, purchase_token: String) -> BillingResultFFI {
        let latency = self.state.lock().unwrap().latency;
        std::thread::sleep(latency);
        let mut state = self.state.lock().unwrap();
        match state.owned.remove(&purchase_token) {
            Some(_) => {
                state.consumed.push(purchase_token);
                BillingResultFFI::ok()
            }
            None => BillingResultFFI {
                response_code: 8,
                debug_message: "item not owned".into(),
            },
        }
    }

    fn acknowledge_purchase(&self, purchase_token: String) -> BillingResultFFI {
        let mut state = self.state.lock().unwrap();
        match state.owned.get_mut(&purchase_token) {
            Some(purchase) => {
                purchase.acknowledged = true;
                BillingResultFFI::ok()
            }
            None => BillingResultFFI {
                response_code: 8,
                debug_message: "item not owned".into(),
            },
        }
    }
}

// ============================================================================
// Host callbacks
// ============================================================================

struct Channel<T>(Mutex<mpsc::Sender<T>>);

impl<T> Channel<T> {
    fn pair() -> (Box<Self>, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel();
        (Box::new(Self(Mutex::new(tx))), rx)
    }

    fn send(&self, value: T) {
        let _ = self.0.lock().unwrap().send(value);
    }
}

impl ConnectionStateCallback for Channel<ConnectionStateFFI> {
    fn on_state_changed(&self, state: ConnectionStateFFI) {
        self.send(state);
    }
}

impl ProductDetailsCallback for Channel<Result<Vec<ProductDetailsFFI>, ErrorInfoFFI>> {
    fn on_success(&self, details: Vec<ProductDetailsFFI>) {
        self.send(Ok(details));
    }

    fn on_error(&self, error: ErrorInfoFFI) {
        self.send(Err(error));
    }
}

impl TokenOutcomeCallback for Channel<Result<TokenOutcomeFFI, ErrorInfoFFI>> {
    fn on_success(&self, outcome: TokenOutcomeFFI) {
        self.send(Ok(outcome));
    }

    fn on_error(&self, error: ErrorInfoFFI) {
        self.send(Err(error));
    }
}

impl CompletionCallback for Channel<Result<(), ErrorInfoFFI>> {
    fn on_success(&self) {
        self.send(Ok(()));
    }

    fn on_error(&self, error: ErrorInfoFFI) {
        self.send(Err(error));
    }
}

fn connect(store: &SimulatedStore) -> Arc<CallbackBillingClient> {
    let client = CallbackBillingClient::new(Box::new(store.clone())).unwrap();
    let (states, rx) = Channel::pair();
    client.start_connection(states).unwrap();

    let mut seen = Vec::new();
    while let Ok(state) = rx.recv_timeout(TIMEOUT) {
        seen.push(state);
        if state == ConnectionStateFFI::Connected {
            break;
        }
    }
    assert_eq!(seen.last(), Some(&ConnectionStateFFI::Connected));
    client
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_fetch_purchase_consume_flow() {
    let store = SimulatedStore::default();
    let client = connect(&store);
    let service = CallbackProductService::new(client, "GooglePlay".into()).unwrap();

    let (details_cb, details_rx) = Channel::pair();
    service.fetch_products_async(vec!["gems_100".into()], ProductTypeFFI::InApp, details_cb);
    let details = details_rx.recv_timeout(TIMEOUT).unwrap().unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].title, "gems 100");

    service.purchase(details[0].clone()).unwrap();
    let token = store.complete_purchase("gems_100");

    let (outcome_cb, outcome_rx) = Channel::pair();
    service.consume_async(token.clone(), outcome_cb);
    assert_eq!(
        outcome_rx.recv_timeout(TIMEOUT).unwrap(),
        Ok(TokenOutcomeFFI::Completed)
    );

    let (outcome_cb, outcome_rx) = Channel::pair();
    service.consume_async(token.clone(), outcome_cb);
    assert_eq!(
        outcome_rx.recv_timeout(TIMEOUT).unwrap(),
        Ok(TokenOutcomeFFI::AlreadyHandled)
    );

    assert_eq!(store.state.lock().unwrap().consumed, vec![token]);
}

#[test]
fn test_concurrent_consumes_fire_each_callback_once() {
    let store = SimulatedStore::default();
    let client = connect(&store);
    let tokens: Vec<String> = (0..4).map(|_| store.complete_purchase("gems_500")).collect();

    let (tx, rx) = mpsc::channel();
    let mut expected = 0;
    for token in &tokens {
        for _ in 0..3 {
            let callback: Box<Channel<Result<(), ErrorInfoFFI>>> =
                Box::new(Channel(Mutex::new(tx.clone())));
            client.consume_async(token.clone(), callback);
            expected += 1;
        }
    }
    drop(tx);

    let outcomes: Vec<_> = rx.iter().take(expected).collect();
    assert_eq!(outcomes.len(), expected);
    // Every sender is gone once every callback has fired.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    let successes = outcomes.iter().filter(|o| o.is_ok()).count();
    assert_eq!(successes, tokens.len());
    assert!(outcomes
        .iter()
        .filter_map(|o| o.as_ref().err())
        .all(|e| e.code == IapErrorCode::AlreadyHandled as i32 && !e.retryable));
    assert_eq!(store.state.lock().unwrap().consumed.len(), tokens.len());
}

#[test]
fn test_end_connection_fails_later_calls_fast() {
    let store = SimulatedStore::default();
    let client = connect(&store);
    client.end_connection();
    assert_eq!(client.connection_state(), ConnectionStateFFI::Closed);

    let (callback, rx) = Channel::pair();
    client.consume_async("token-1".into(), callback);
    let err = rx.recv_timeout(TIMEOUT).unwrap().unwrap_err();
    assert_eq!(err.code, IapErrorCode::ConnectionClosed as i32);
    assert!(!err.retryable);

    let (states, _rx) = Channel::<ConnectionStateFFI>::pair();
    assert!(client.start_connection(states).is_err());
}

#[test]
fn test_disconnect_during_consume_reports_once() {
    let store = SimulatedStore::default();
    let client = connect(&store);
    let token = store.complete_purchase("gems_100");
    store.set_latency(Duration::from_millis(50));

    let (callback, rx) = Channel::<Result<(), ErrorInfoFFI>>::pair();
    client.consume_async(token.clone(), callback);
    std::thread::sleep(Duration::from_millis(10));
    store.disconnect();

    // The store already took the consume, so it succeeds.
    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Ok(()));
    // The callback was released after firing once.
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(200)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    );
    assert_eq!(client.connection_state(), ConnectionStateFFI::Disconnected);
    assert_eq!(store.state.lock().unwrap().consumed, vec![token]);
}

#[test]
fn test_end_connection_during_consume_reports_once() {
    let store = SimulatedStore::default();
    let client = connect(&store);
    let token = store.complete_purchase("gems_100");
    store.set_latency(Duration::from_millis(50));

    let (callback, rx) = Channel::<Result<(), ErrorInfoFFI>>::pair();
    client.consume_async(token.clone(), callback);
    std::thread::sleep(Duration::from_millis(10));
    client.end_connection();

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), Ok(()));
    assert_eq!(
        rx.recv_timeout(Duration::from_millis(200)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    );
    assert_eq!(client.connection_state(), ConnectionStateFFI::Closed);
    assert_eq!(store.state.lock().unwrap().consumed, vec![token.clone()]);

    // Later calls fail fast without reaching the store.
    let (callback, rx) = Channel::<Result<(), ErrorInfoFFI>>::pair();
    client.consume_async(token, callback);
    let err = rx.recv_timeout(TIMEOUT).unwrap().unwrap_err();
    assert_eq!(err.code, IapErrorCode::ConnectionClosed as i32);
    assert_eq!(store.state.lock().unwrap().consumed.len(), 1);
}
