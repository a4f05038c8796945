//! End-to-end purchase flows against the scripted billing channel.
//!
//! These tests drive the public API only: a `BillingClient` over a
//! `MockBillingChannel`, the retry service, and product services built by the
//! factory.

use std::sync::Arc;
use std::time::Duration;

use iapkit_lib::billing::{
    BackendClient, BillingClient, BillingResponseCode, BillingResult, ConnectionEvent,
    ConnectionState, ConnectionStateMachine, MockBillingChannel, MockOperation, ProductDetails,
    ProductType, ProrationMode, Purchase, Transition,
};
use iapkit_lib::product::{ProductServiceFactory, TokenOutcome};
use iapkit_lib::retry::{RetryPolicy, RetryService};
use iapkit_lib::store::{StoreDescriptor, StoreInstance, StoreName};
use iapkit_lib::telemetry::RecordingTelemetry;
use iapkit_lib::{ErrorKind, IapError};
use proptest::prelude::*;

// ============================================================================
// Helpers
// ============================================================================

type MockClient = BillingClient<MockBillingChannel>;

fn client_over(channel: MockBillingChannel) -> (Arc<MockBillingChannel>, Arc<MockClient>) {
    let channel = Arc::new(channel);
    let client = Arc::new(BillingClient::new(channel.clone()));
    (channel, client)
}

fn gems() -> ProductDetails {
    ProductDetails::new("gems_100", ProductType::InApp)
}

fn premium() -> ProductDetails {
    ProductDetails::new("premium_yearly", ProductType::Subs)
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn test_connection_lifecycle_publishes_each_state_once() {
    let (_, client) = client_over(MockBillingChannel::new());
    let mut transitions = client.subscribe_transitions();

    client.start_connection().unwrap();
    client.end_connection();

    let mut observed = vec![ConnectionState::Disconnected];
    while let Ok(Transition { from, to }) = transitions.try_recv() {
        assert_eq!(from, *observed.last().unwrap());
        observed.push(to);
    }

    assert_eq!(
        observed,
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected,
            ConnectionState::Closed,
        ]
    );
}

#[tokio::test]
async fn test_manual_setup_wakes_waiters() {
    let (channel, client) = client_over(MockBillingChannel::manual());
    client.start_connection().unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Connecting);

    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.wait_until_ready().await })
    };
    tokio::task::yield_now().await;

    channel.finish_setup(BillingResult::ok());
    waiter.await.unwrap().unwrap();
    assert!(client.is_ready());
}

#[tokio::test]
async fn test_calls_before_connect_never_reach_channel() {
    let (channel, client) = client_over(
        MockBillingChannel::new().with_purchase(Purchase::new("t1", "gems_100")),
    );

    let results = [
        client.query_purchases(ProductType::InApp).await.map(|_| ()),
        client
            .query_product_details(&["gems_100".to_string()], ProductType::InApp)
            .await
            .map(|_| ()),
        client.launch_billing_flow(&gems(), None, None),
        client.consume("t1").await,
        client.acknowledge_purchase("t1").await,
    ];

    for result in &results {
        assert!(matches!(
            result,
            Err(IapError::NotReady {
                state: ConnectionState::Disconnected,
                ..
            })
        ));
    }
    for op in [
        MockOperation::QueryPurchases,
        MockOperation::QueryProductDetails,
        MockOperation::LaunchBillingFlow,
        MockOperation::Consume,
        MockOperation::AcknowledgePurchase,
    ] {
        assert_eq!(channel.call_count(op), 0, "{op:?} reached the channel");
    }
}

#[tokio::test]
async fn test_closed_client_rejects_reconnect() {
    let (channel, client) = client_over(MockBillingChannel::new());
    client.start_connection().unwrap();
    client.end_connection();

    let err = client.start_connection().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
    assert!(!err.is_retryable());
    assert_eq!(channel.call_count(MockOperation::StartConnection), 1);
}

// ============================================================================
// Purchase tokens
// ============================================================================

#[tokio::test]
async fn test_double_consume_is_already_handled() {
    let (channel, client) = client_over(
        MockBillingChannel::new().with_purchase(Purchase::new("t1", "gems_100")),
    );
    client.start_connection().unwrap();

    client.consume("t1").await.unwrap();
    let second = client.consume("t1").await.unwrap_err();

    assert_eq!(second.kind(), ErrorKind::AlreadyHandled);
    assert_eq!(channel.call_count(MockOperation::Consume), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumes_of_one_token_are_serialized() {
    let (channel, client) = client_over(
        MockBillingChannel::new()
            .with_purchase(Purchase::new("t1", "gems_100"))
            .with_latency(Duration::from_millis(20)),
    );
    client.start_connection().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.consume("t1").await })
        })
        .collect();

    let mut completed = 0;
    let mut already_handled = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => completed += 1,
            Err(err) if err.kind() == ErrorKind::AlreadyHandled => already_handled += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }

    assert_eq!(completed, 1);
    assert_eq!(already_handled, 3);
    assert_eq!(channel.call_count(MockOperation::Consume), 1);
}

#[tokio::test]
async fn test_purchase_update_feeds_acknowledge() {
    let (channel, client) = client_over(MockBillingChannel::new());
    client.start_connection().unwrap();
    let mut updates = client.purchase_updates();

    client.launch_billing_flow(&premium(), None, None).unwrap();
    channel.emit_purchases_updated(
        BillingResult::ok(),
        vec![Purchase::new("sub-1", "premium_yearly")],
    );

    let update = updates.recv().await.unwrap();
    assert!(update.result.is_ok());
    let token = update.purchases[0].purchase_token.clone();

    client.acknowledge_purchase(&token).await.unwrap();
    assert!(client.cached_purchase(&token).unwrap().acknowledged);
}

// ============================================================================
// Launch parameters
// ============================================================================

#[tokio::test]
async fn test_new_purchase_carries_no_proration() {
    let (channel, client) = client_over(MockBillingChannel::new());
    client.start_connection().unwrap();

    client
        .launch_billing_flow(&premium(), None, Some(ProrationMode::Deferred))
        .unwrap();

    let flows = channel.launched_flows();
    assert_eq!(flows.len(), 1);
    assert!(flows[0].subscription_update.is_none());
}

#[tokio::test]
async fn test_subscription_change_passes_token_and_mode() {
    let (channel, client) = client_over(MockBillingChannel::new());
    client.start_connection().unwrap();

    client
        .launch_billing_flow(
            &premium(),
            Some("old-token"),
            Some(ProrationMode::ImmediateAndChargeProratedPrice),
        )
        .unwrap();

    let update = channel.launched_flows()[0]
        .subscription_update
        .clone()
        .unwrap();
    assert_eq!(update.old_purchase_token, "old-token");
    assert_eq!(
        update.proration_mode,
        Some(ProrationMode::ImmediateAndChargeProratedPrice)
    );
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn test_transient_failures_then_success_take_k_attempts() {
    for k in 1..=4u32 {
        let (channel, client) = client_over(MockBillingChannel::new().with_product(gems()));
        client.start_connection().unwrap();
        for _ in 1..k {
            channel.push_result(
                MockOperation::QueryProductDetails,
                BillingResult::from_code(BillingResponseCode::ServiceUnavailable),
            );
        }

        let telemetry = Arc::new(RecordingTelemetry::new());
        let retry = RetryService::with_telemetry(
            RetryPolicy::fixed(4, Duration::from_millis(1)),
            telemetry.clone(),
        );
        let ids = vec!["gems_100".to_string()];
        let details = retry
            .run("fetch_products", |_| {
                let client = client.clone();
                let ids = ids.clone();
                async move { client.query_product_details(&ids, ProductType::InApp).await }
            })
            .await
            .unwrap();

        assert_eq!(details.len(), 1);
        assert_eq!(
            channel.call_count(MockOperation::QueryProductDetails),
            k as usize
        );
        assert_eq!(telemetry.retry_count(), (k - 1) as usize);
    }
}

#[tokio::test]
async fn test_product_service_restores_both_product_types() {
    let (_, client) = client_over(
        MockBillingChannel::new()
            .with_purchase(Purchase::new("t1", "gems_100"))
            .with_subscription(Purchase::new("s1", "premium_yearly")),
    );
    client.start_connection().unwrap();

    let store = StoreDescriptor::new(StoreName::google_play(), StoreInstance::new(client));
    let service = ProductServiceFactory::default().create(&store).unwrap();

    let restored = service.restore_purchases().await.unwrap();
    let tokens: Vec<_> = restored.iter().map(|p| p.purchase_token.as_str()).collect();
    assert_eq!(tokens, vec!["t1", "s1"]);

    assert_eq!(service.consume("t1").await.unwrap(), TokenOutcome::Completed);
    assert_eq!(
        service.consume("t1").await.unwrap(),
        TokenOutcome::AlreadyHandled
    );
}

#[tokio::test]
async fn test_product_service_on_closed_client_is_not_ready() {
    let (channel, client) = client_over(
        MockBillingChannel::new().with_purchase(Purchase::new("t1", "gems_100")),
    );
    client.start_connection().unwrap();
    let store = StoreDescriptor::new(StoreName::google_play(), StoreInstance::new(client.clone()));
    let service = ProductServiceFactory::default().create(&store).unwrap();

    assert_eq!(service.consume("t1").await.unwrap(), TokenOutcome::Completed);
    client.end_connection();

    let err = service.consume("t1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
    assert!(!err.is_retryable());
    let err = service.acknowledge("t1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotReady);
    assert_eq!(channel.call_count(MockOperation::Consume), 1);
}

// ============================================================================
// Application lifecycle
// ============================================================================

#[tokio::test]
async fn test_resume_reconnects_and_delivers_outside_purchases() {
    let (channel, client) = client_over(
        MockBillingChannel::new().with_purchase(Purchase::new("t1", "gems_100")),
    );
    client.start_connection().unwrap();
    let store = StoreDescriptor::new(StoreName::google_play(), StoreInstance::new(client.clone()));
    let service = ProductServiceFactory::default().create(&store).unwrap();
    service.restore_purchases().await.unwrap();
    let mut updates = service.purchase_updates();

    service.on_pause(true).await.unwrap();
    channel.disconnect();
    channel.grant_purchase(Purchase::new("t2", "gems_100"));
    assert_eq!(channel.call_count(MockOperation::StartConnection), 1);

    service.on_pause(false).await.unwrap();
    assert_eq!(service.connection_state(), ConnectionState::Connected);
    assert_eq!(channel.call_count(MockOperation::StartConnection), 2);

    let update = updates.recv().await.unwrap();
    let tokens: Vec<_> = update.purchases.iter().map(|p| p.purchase_token.as_str()).collect();
    assert_eq!(tokens, vec!["t2"]);
    assert!(client.cached_purchase("t2").is_some());

    // Nothing new on a second resume.
    service.on_pause(false).await.unwrap();
    assert!(updates.try_recv().is_err());
}

#[tokio::test]
async fn test_pause_leaves_backend_untouched() {
    let (channel, client) = client_over(MockBillingChannel::new());
    client.start_connection().unwrap();
    let store = StoreDescriptor::new(StoreName::google_play(), StoreInstance::new(client));
    let service = ProductServiceFactory::default().create(&store).unwrap();

    service.on_pause(true).await.unwrap();
    assert_eq!(channel.call_count(MockOperation::QueryPurchases), 0);
}

// ============================================================================
// State machine properties
// ============================================================================

fn event_strategy() -> impl Strategy<Value = ConnectionEvent> {
    prop_oneof![
        Just(ConnectionEvent::StartConnection),
        Just(ConnectionEvent::SetupFinished(BillingResult::ok())),
        Just(ConnectionEvent::SetupFinished(BillingResult::from_code(
            BillingResponseCode::BillingUnavailable
        ))),
        Just(ConnectionEvent::ServiceDisconnected),
        Just(ConnectionEvent::EndConnection),
    ]
}

proptest! {
    #[test]
    fn test_closed_is_terminal(events in prop::collection::vec(event_strategy(), 0..40)) {
        let mut machine = ConnectionStateMachine::new();
        let mut closed = false;

        for event in events {
            let before = machine.state();
            let applied = machine.apply(event);

            if closed {
                prop_assert!(applied.is_err());
                prop_assert_eq!(machine.state(), ConnectionState::Closed);
            }
            if let Ok(transition) = applied {
                prop_assert_eq!(transition.from, before);
                prop_assert_ne!(transition.from, transition.to);
            } else {
                prop_assert_eq!(machine.state(), before);
            }

            closed = machine.state() == ConnectionState::Closed;
            prop_assert_eq!(machine.is_ready(), machine.state() == ConnectionState::Connected);
        }
    }
}
