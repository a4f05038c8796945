//! Product service composition through the public factory API.

use std::sync::Arc;

use iapkit_lib::billing::{
    BackendClient, BillingClient, MockBillingChannel, MockOperation, ProductDetails, ProductType,
};
use iapkit_lib::product::{
    AppleStoreExtendedProductService, ExtensibleProductService, FactoryContext,
    GenericProductService, ProductService, ProductServiceFactory,
};
use iapkit_lib::store::{
    MockAppleNativeStore, PromotionVisibility, StoreDescriptor, StoreInstance, StoreName,
};
use iapkit_lib::telemetry::{RecordingTelemetry, TelemetryEvent};
use iapkit_lib::{CompositionError, IapError};

fn connected(channel: &Arc<MockBillingChannel>) -> Arc<dyn BackendClient> {
    let client = Arc::new(BillingClient::new(channel.clone()));
    client.start_connection().unwrap();
    client
}

fn descriptor(name: &str, channel: &Arc<MockBillingChannel>) -> StoreDescriptor {
    StoreDescriptor::new(name, StoreInstance::new(connected(channel)))
}

fn sku() -> ProductDetails {
    ProductDetails::new("gems_100", ProductType::InApp)
}

#[test]
fn test_registered_name_uses_recipe_and_other_names_fall_back() {
    let channel = Arc::new(MockBillingChannel::new());
    let mut factory = ProductServiceFactory::default();
    factory.register_new_extended_service("X", |generic| {
        Some(Arc::new(ExtensibleProductService::new(generic)) as Arc<dyn ProductService>)
    });

    let x = factory.create(&descriptor("X", &channel)).unwrap();
    let y = factory.create(&descriptor("Y", &channel)).unwrap();

    assert!(x.as_any().is::<ExtensibleProductService>());
    assert!(y.as_any().is::<GenericProductService>());
    assert_eq!(y.store_name().as_str(), "Y");
}

#[test]
fn test_reregistration_overwrites_previous_recipe() {
    let first = Arc::new(MockBillingChannel::new());
    let second = Arc::new(MockBillingChannel::new());
    let store_channel = Arc::new(MockBillingChannel::new());
    let context = FactoryContext::default();

    let mut factory = ProductServiceFactory::new(context.clone());
    {
        let factory_for_recipe = ProductServiceFactory::new(context.clone());
        let first = first.clone();
        factory.register_new_service("Custom", move |store| {
            let rebound =
                StoreDescriptor::new(store.name.clone(), StoreInstance::new(connected(&first)));
            factory_for_recipe.create_generic(&rebound).ok()
        });
    }
    {
        let factory_for_recipe = ProductServiceFactory::new(context);
        let second = second.clone();
        factory.register_new_service("Custom", move |store| {
            let rebound =
                StoreDescriptor::new(store.name.clone(), StoreInstance::new(connected(&second)));
            factory_for_recipe.create_generic(&rebound).ok()
        });
    }

    let service = factory.create(&descriptor("Custom", &store_channel)).unwrap();
    service.purchase(&sku()).unwrap();

    assert_eq!(first.call_count(MockOperation::LaunchBillingFlow), 0);
    assert_eq!(second.call_count(MockOperation::LaunchBillingFlow), 1);
    assert_eq!(store_channel.call_count(MockOperation::LaunchBillingFlow), 0);
}

#[test]
fn test_recipe_returning_nothing_fails_composition() {
    let channel = Arc::new(MockBillingChannel::new());
    let mut factory = ProductServiceFactory::default();
    factory.register_new_service("Empty", |_| None);

    let err = factory.create(&descriptor("Empty", &channel)).err().unwrap();
    assert!(matches!(
        err,
        IapError::Composition(CompositionError::NoInstance { ref name }) if name == "Empty"
    ));
}

#[test]
fn test_apple_recipe_without_native_store_names_the_requirement() {
    let channel = Arc::new(MockBillingChannel::new());
    let factory = ProductServiceFactory::default();

    let err = factory
        .create(&descriptor(StoreName::APPLE_APP_STORE, &channel))
        .err()
        .unwrap();
    match err {
        IapError::Composition(CompositionError::Precondition { store, requirement }) => {
            assert_eq!(store, StoreName::APPLE_APP_STORE);
            assert!(requirement.contains("Apple native store"));
        }
        other => panic!("expected precondition failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_apple_service_exposes_storefront_operations() {
    let channel = Arc::new(MockBillingChannel::new());
    let apple = Arc::new(
        MockAppleNativeStore::new().with_introductory_prices(r#"{"premium_yearly":"P1W"}"#),
    );
    let store = StoreDescriptor::new(
        StoreName::apple_app_store(),
        StoreInstance::new(connected(&channel)).with_apple_store(apple.clone()),
    );
    let factory = ProductServiceFactory::default();
    let service = factory.create(&store).unwrap();
    let apple_service = service
        .as_any()
        .downcast_ref::<AppleStoreExtendedProductService>()
        .unwrap();

    apple_service.continue_promotional_purchases();
    assert_eq!(apple.continued_count(), 1);

    let order = vec!["gems_100".to_string(), "premium_yearly".to_string()];
    apple_service.set_storefront_promotion_order(&order).unwrap();
    assert_eq!(
        apple_service.fetch_storefront_promotion_order().await.unwrap(),
        order
    );

    apple_service
        .set_storefront_promotion_visibility("gems_100", PromotionVisibility::Hide)
        .unwrap();
    assert_eq!(
        apple_service
            .fetch_storefront_promotion_visibility("gems_100")
            .await
            .unwrap(),
        PromotionVisibility::Hide
    );

    let prices = apple_service.introductory_price_dictionary().unwrap();
    assert_eq!(prices.get("premium_yearly").map(String::as_str), Some("P1W"));

    // Common operations still reach the billing channel.
    service.purchase(&sku()).unwrap();
    assert_eq!(channel.call_count(MockOperation::LaunchBillingFlow), 1);
}

#[test]
fn test_bad_introductory_prices_report_a_diagnostic() {
    let channel = Arc::new(MockBillingChannel::new());
    let telemetry = Arc::new(RecordingTelemetry::new());
    let context = FactoryContext::new(Default::default(), telemetry.clone());
    let apple = Arc::new(MockAppleNativeStore::new().with_introductory_prices("not json"));
    let store = StoreDescriptor::new(
        StoreName::mac_app_store(),
        StoreInstance::new(connected(&channel)).with_apple_store(apple),
    );

    let service = ProductServiceFactory::new(context).create(&store).unwrap();
    let apple_service = service
        .as_any()
        .downcast_ref::<AppleStoreExtendedProductService>()
        .unwrap();

    assert!(apple_service.introductory_price_dictionary().is_err());
    assert!(matches!(
        telemetry.events().as_slice(),
        [TelemetryEvent::Diagnostic { store, .. }] if store == StoreName::MAC_APP_STORE
    ));
}
