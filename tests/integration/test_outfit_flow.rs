//! End-to-end outfit composition against a mock backend.
//!
//! Each test drives a `Composer` over the real HTTP client and checks both
//! the resulting session and what the backend actually received.

mod mock_backend;

use std::sync::atomic::Ordering;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tryon_core::{
    find_by_id, selectable_entries, CatalogFilter, Composer, Config, Garment, HttpBackend,
    ImagePayload, MediaType, OutfitEvent, OutfitStatus, RecommendationOutcome, TryOnBackend,
    TryOnError, LOWER_BODY, UPPER_BODY,
};

use crate::mock_backend::{result_bytes, spawn, static_bytes, MockBackend};

fn photo() -> ImagePayload {
    ImagePayload::from_bytes(b"person photo".to_vec())
}

async fn composer_for(server: &MockBackend) -> Composer<HttpBackend> {
    let backend = HttpBackend::from_config(&server.config()).expect("backend");
    let composer = Composer::new(backend, &server.config());
    composer.set_base_image(photo()).await;
    composer
}

/// Top, then a second top (refused), then a bottom.
#[tokio::test]
async fn test_scenario_top_rejected_top_bottom() {
    let server = spawn().await;
    let composer = composer_for(&server).await;
    let catalog = composer
        .catalog(&CatalogFilter::default())
        .await
        .expect("catalog");

    // A: first top onto the photo
    let top = find_by_id(&catalog, "top-1").expect("top-1").clone();
    composer.select(top).await.expect("select A");
    let after_a = composer.try_on().await.expect("try on A");
    assert_eq!(after_a.status(), OutfitStatus::Composed(1));
    assert_eq!(
        after_a.current_image().expect("image").as_bytes(),
        result_bytes(1).as_slice()
    );

    // B: another top is shown disabled and refused before any request
    let entries = selectable_entries(
        &catalog,
        &CatalogFilter::default(),
        after_a.worn_categories(),
        None,
    );
    let disabled: Vec<&str> = entries
        .iter()
        .filter(|entry| !entry.selectable)
        .map(|entry| entry.item.id.as_str())
        .collect();
    assert_eq!(disabled, vec!["top-1", "top-2"]);

    let second_top = find_by_id(&catalog, "top-2").expect("top-2").clone();
    let err = composer.select(second_top).await.unwrap_err();
    assert!(matches!(err, TryOnError::DuplicateCategory { .. }));

    // C: bottom onto the prior result
    let bottom = find_by_id(&catalog, "bottom-1").expect("bottom-1").clone();
    composer.select(bottom).await.expect("select C");
    let after_c = composer.try_on().await.expect("try on C");

    let categories: Vec<&str> = after_c.worn_categories().collect();
    assert_eq!(categories, vec![UPPER_BODY, LOWER_BODY]);
    assert_eq!(
        after_c.current_image().expect("image").as_bytes(),
        result_bytes(2).as_slice()
    );
    assert_eq!(
        after_c.current_image().expect("image").media_type(),
        MediaType::Png
    );

    // what the backend saw: one first-garment call, one incremental call
    let tryon = server.state.tryon_bodies.lock().unwrap().clone();
    let add = server.state.add_bodies.lock().unwrap().clone();
    assert_eq!(tryon.len(), 1);
    assert_eq!(add.len(), 1);
    assert_eq!(tryon[0]["human_image"], STANDARD.encode(b"person photo"));
    assert_eq!(
        tryon[0]["garment_image"],
        STANDARD.encode(static_bytes("images/top-1.jpg"))
    );
    assert_eq!(tryon[0]["garment_description"], "white Linen Shirt");
    assert_eq!(add[0]["current_outfit_image"], STANDARD.encode(result_bytes(1)));
    assert_eq!(add[0]["item_description"], "blue Slim Jeans");
}

#[tokio::test]
async fn test_add_item_with_worn_category_sends_nothing() {
    let server = spawn().await;
    let composer = composer_for(&server).await;

    let shirt = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt");
    composer.apply_first(shirt.clone()).await.expect("first");

    let err = composer.add_item(shirt).await.unwrap_err();
    assert!(matches!(err, TryOnError::DuplicateCategory { .. }));
    assert_eq!(server.state.composition_count(), 1);
}

#[tokio::test]
async fn test_failed_add_item_keeps_outfit() {
    let server = spawn().await;
    let composer = composer_for(&server).await;

    let shirt = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt");
    let before = composer.apply_first(shirt).await.expect("first");

    server.state.fail_compositions.store(true, Ordering::SeqCst);
    let jeans = Garment::new(ImagePayload::from_bytes(b"jeans".to_vec()), LOWER_BODY, "Jeans");
    let err = composer.add_item(jeans).await.unwrap_err();
    assert!(
        matches!(&err, TryOnError::CompositionFailed { message } if message.contains("500")),
        "unexpected error: {err:?}"
    );

    let after = composer.snapshot().await;
    assert_eq!(after.worn_items().len(), 1);
    assert_eq!(after.current_image(), before.current_image());
    assert_eq!(after.generation(), before.generation());
}

#[tokio::test]
async fn test_timeout_leaves_ready() {
    let server = spawn().await;
    server.state.delay_ms.store(1_000, Ordering::SeqCst);
    let composer = composer_for(&server)
        .await
        .with_composition_timeout(Duration::from_millis(100));
    let mut events = composer.subscribe();

    let shirt = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt");
    let err = composer.apply_first(shirt).await.unwrap_err();
    assert!(
        matches!(&err, TryOnError::CompositionFailed { message } if message.contains("timed out")),
        "unexpected error: {err:?}"
    );

    let snapshot = composer.snapshot().await;
    assert_eq!(snapshot.status(), OutfitStatus::Ready);
    assert!(snapshot.current_image().is_none());

    assert!(matches!(
        events.recv().await,
        Ok(OutfitEvent::CompositionStarted(_))
    ));
    assert!(matches!(
        events.recv().await,
        Ok(OutfitEvent::CompositionFailed(_))
    ));
}

#[tokio::test]
async fn test_concurrent_composition_single_request() {
    let server = spawn().await;
    server.state.delay_ms.store(200, Ordering::SeqCst);
    let composer = composer_for(&server).await;

    let shirt = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt");
    let jeans = Garment::new(ImagePayload::from_bytes(b"jeans".to_vec()), LOWER_BODY, "Jeans");

    let (first, second) = tokio::join!(composer.apply_first(shirt), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        composer.apply_first(jeans).await
    });

    assert!(first.is_ok());
    assert!(matches!(second, Err(TryOnError::CompositionInFlight)));
    assert_eq!(server.state.composition_count(), 1);
}

#[tokio::test]
async fn test_reset_returns_to_first_endpoint() {
    let server = spawn().await;
    let composer = composer_for(&server).await;

    let shirt = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt");
    composer.apply_first(shirt.clone()).await.expect("first");

    let reset = composer.reset().await;
    assert_eq!(reset.status(), OutfitStatus::Ready);
    assert_eq!(reset.base_image(), Some(&photo()));

    composer.apply_first(shirt).await.expect("first again");
    assert_eq!(server.state.tryon_bodies.lock().unwrap().len(), 2);
    assert!(server.state.add_bodies.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_recommendations_after_composition() {
    let server = spawn().await;
    let composer = composer_for(&server).await;

    let shirt = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt")
        .with_name("Linen Shirt")
        .with_color("white");
    composer.apply_first(shirt).await.expect("first");

    let outcome = composer.request_recommendations().await.expect("ticket");
    let RecommendationOutcome::Updated(items) = outcome else {
        panic!("expected updated recommendations, got {outcome:?}");
    };
    assert!(items.iter().all(|item| item.category != UPPER_BODY));
    assert_eq!(composer.recommendations().await, items);

    // clicking a recommendation selects the catalog item behind it
    let catalog = composer
        .catalog(&CatalogFilter::default())
        .await
        .expect("catalog");
    let picked = composer
        .select_recommendation(&items[0].id, &catalog)
        .await
        .expect("select");
    assert_eq!(picked.map(|item| item.id), Some(items[0].id.clone()));
}

#[tokio::test]
async fn test_stale_recommendations_discarded() {
    let server = spawn().await;
    let composer = composer_for(&server).await;

    let shirt = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt");
    composer.apply_first(shirt).await.expect("first");

    // issued after the first garment
    let ticket = composer.begin_recommendations().await.expect("ticket");
    let response = composer.backend().recommend(ticket.request()).await;

    // the second garment lands before the response is applied
    let jeans = Garment::new(ImagePayload::from_bytes(b"jeans".to_vec()), LOWER_BODY, "Jeans");
    composer.add_item(jeans).await.expect("add");

    let outcome = composer.finish_recommendations(ticket, response).await;
    assert!(outcome.is_stale(), "expected stale outcome, got {outcome:?}");

    // what is stored came from the request that followed the second garment
    let recommended: Vec<String> = composer
        .recommendations()
        .await
        .into_iter()
        .map(|item| item.category)
        .collect();
    assert!(!recommended.is_empty());
    assert!(!recommended.contains(&UPPER_BODY.to_string()));
    assert!(!recommended.contains(&LOWER_BODY.to_string()));
}

#[tokio::test]
async fn test_each_try_on_requests_recommendations() {
    let server = spawn().await;
    let composer = composer_for(&server).await;
    let catalog = composer
        .catalog(&CatalogFilter::default())
        .await
        .expect("catalog");

    let top = find_by_id(&catalog, "top-1").expect("top-1").clone();
    composer.select(top).await.expect("select");
    composer.try_on().await.expect("try on");

    let bodies = server.state.recommend_bodies.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["worn_items"][0]["category"], UPPER_BODY);
    assert_eq!(bodies[0]["current_outfit_image"], STANDARD.encode(result_bytes(1)));

    let stored = composer.recommendations().await;
    assert!(!stored.is_empty());
    assert!(stored.iter().all(|item| item.category != UPPER_BODY));
}

#[tokio::test]
async fn test_longer_composition_timeout_is_honoured() {
    let server = spawn().await;
    server.state.delay_ms.store(1_500, Ordering::SeqCst);
    let config = Config {
        request_timeout_secs: 1,
        ..server.config()
    };
    let backend = HttpBackend::from_config(&config).expect("backend");
    let composer =
        Composer::new(backend, &config).with_composition_timeout(Duration::from_secs(5));
    composer.set_base_image(photo()).await;

    let shirt = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt");
    let composed = composer.apply_first(shirt).await.expect("slow composition");
    assert_eq!(composed.status(), OutfitStatus::Composed(1));
}
