//! Integration tests for the HTTP backend client.
//!
//! These tests exercise the wire protocol end to end: request shapes as the
//! server receives them, status and decode failures, catalog queries, and
//! static image fetches.

mod mock_backend;

use std::sync::atomic::Ordering;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tryon_core::{
    BackendError, CatalogFilter, Composer, Config, Garment, HttpBackend, ImagePayload,
    RecommendRequest, TryOnBackend, TryOnError, TryOnRequest, UPPER_BODY,
};

use crate::mock_backend::{result_bytes, spawn, static_bytes};

fn first_request() -> TryOnRequest {
    TryOnRequest {
        human_image: STANDARD.encode(b"photo"),
        garment_image: STANDARD.encode(b"shirt"),
        garment_description: "White linen shirt".to_string(),
        category: UPPER_BODY.to_string(),
    }
}

#[tokio::test]
async fn test_compose_first_round_trip() {
    let server = spawn().await;
    let backend = HttpBackend::from_config(&server.config()).expect("backend");

    let response = backend
        .compose_first(&first_request())
        .await
        .expect("compose_first should succeed");

    let image = response.decode_image().expect("decodable image");
    assert_eq!(image.as_bytes(), result_bytes(1).as_slice());
    assert_eq!(response.echoed_categories(), vec![UPPER_BODY.to_string()]);

    let bodies = server.state.tryon_bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["human_image"], STANDARD.encode(b"photo"));
    assert_eq!(bodies[0]["garment_description"], "White linen shirt");
    assert_eq!(bodies[0]["category"], "upper_body");
}

#[tokio::test]
async fn test_server_error_is_status_error() {
    let server = spawn().await;
    server.state.fail_compositions.store(true, Ordering::SeqCst);
    let backend = HttpBackend::from_config(&server.config()).expect("backend");

    let err = backend.compose_first(&first_request()).await.unwrap_err();
    match err {
        BackendError::Status { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "model overloaded");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_result_image_is_malformed() {
    let server = spawn().await;
    server.state.malformed.store(true, Ordering::SeqCst);
    let backend = HttpBackend::from_config(&server.config()).expect("backend");

    let err = backend.compose_first(&first_request()).await.unwrap_err();
    assert!(
        matches!(err, BackendError::Malformed(_)),
        "expected malformed response, got {err:?}"
    );
}

#[tokio::test]
async fn test_loose_base64_is_accepted() {
    let server = spawn().await;
    server.state.loose_base64.store(true, Ordering::SeqCst);
    let backend = HttpBackend::from_config(&server.config()).expect("backend");

    let response = backend.compose_first(&first_request()).await.expect("response");
    assert!(response.result_image.starts_with("data:image/png;base64,"));
    let image = response.decode_image().expect("tolerant decode");
    assert_eq!(image.as_bytes(), result_bytes(1).as_slice());
}

#[tokio::test]
async fn test_catalog_category_query() {
    let server = spawn().await;
    let backend = HttpBackend::from_config(&server.config()).expect("backend");

    let all = backend.catalog(None).await.expect("catalog");
    assert_eq!(all.len(), 4);

    let tops = backend.catalog(Some(UPPER_BODY)).await.expect("catalog");
    assert_eq!(tops.len(), 2);
    assert!(tops.iter().all(|item| item.category == UPPER_BODY));

    let queries = server.state.catalog_queries.lock().unwrap();
    assert_eq!(*queries, vec![None, Some("upper_body".to_string())]);
}

#[tokio::test]
async fn test_composer_catalog_filters_gender_locally() {
    let server = spawn().await;
    let backend = HttpBackend::from_config(&server.config()).expect("backend");
    let composer = Composer::new(backend, &server.config());

    let items = composer
        .catalog(&CatalogFilter::category(UPPER_BODY).with_gender("women"))
        .await
        .expect("catalog");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].id, "top-2");
}

#[tokio::test]
async fn test_fetch_static_image() {
    let server = spawn().await;
    let backend = HttpBackend::from_config(&server.config()).expect("backend");

    let image = backend
        .fetch_image("images/top-1.jpg")
        .await
        .expect("static image");
    assert_eq!(image.as_bytes(), static_bytes("images/top-1.jpg").as_slice());
    assert_eq!(server.state.static_hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_recommend_request_shape() {
    let server = spawn().await;
    let backend = HttpBackend::from_config(&server.config()).expect("backend");

    let session = tryon_core::OutfitSession::new()
        .with_base_image(ImagePayload::from_bytes(b"photo".to_vec()));
    let garment = Garment::new(ImagePayload::from_bytes(b"shirt".to_vec()), UPPER_BODY, "Shirt")
        .with_color("white");
    let plan = session.plan(garment).expect("plan");
    let session = session
        .commit(&plan, ImagePayload::from_bytes(result_bytes(1)))
        .expect("commit");

    let request = RecommendRequest::from_session(&session).expect("composed session");
    let recommendations = backend.recommend(&request).await.expect("recommend");

    assert!(!recommendations.is_empty());
    assert!(recommendations.iter().all(|r| r.category != UPPER_BODY));

    let bodies = server.state.recommend_bodies.lock().unwrap();
    assert_eq!(
        bodies[0]["worn_items"],
        serde_json::json!([{"category": "upper_body", "name": "Shirt", "color": "white"}])
    );
    assert_eq!(bodies[0]["current_outfit_image"], STANDARD.encode(result_bytes(1)));
}

#[tokio::test]
async fn test_unreachable_backend() {
    let config = Config {
        backend_url: "http://127.0.0.1:9".to_string(),
        ..Default::default()
    };
    let backend = HttpBackend::from_config(&config).expect("backend");
    let composer = Composer::new(backend, &config);

    let err = composer
        .catalog(&CatalogFilter::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, TryOnError::CatalogUnavailable { .. }),
        "expected catalog error, got {err:?}"
    );
}
