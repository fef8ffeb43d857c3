//! In-process stand-in for the try-on backend.
//!
//! Serves the four JSON endpoints and static images on an ephemeral port,
//! records every request body, and can be told to fail, stall, or answer in
//! the loose base64 dialects real backends produce.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use serde_json::{json, Value};
use tryon_core::{CatalogItem, Config, LOWER_BODY, SHOES, UPPER_BODY};

/// Everything the mock saw and how it should behave next.
#[derive(Default)]
pub struct MockState {
    pub tryon_bodies: Mutex<Vec<Value>>,
    pub add_bodies: Mutex<Vec<Value>>,
    pub recommend_bodies: Mutex<Vec<Value>>,
    pub catalog_queries: Mutex<Vec<Option<String>>>,
    pub static_hits: AtomicUsize,
    compositions: AtomicUsize,
    /// Answer compositions with HTTP 500.
    pub fail_compositions: AtomicBool,
    /// Answer compositions with a body missing `result_image`.
    pub malformed: AtomicBool,
    /// Answer with a data URL in the URL-safe alphabet without padding.
    pub loose_base64: AtomicBool,
    /// Stall compositions by this many milliseconds.
    pub delay_ms: AtomicU64,
}

impl MockState {
    pub fn composition_count(&self) -> usize {
        self.tryon_bodies.lock().unwrap().len() + self.add_bodies.lock().unwrap().len()
    }
}

/// A running mock backend.
pub struct MockBackend {
    pub url: String,
    pub state: Arc<MockState>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockBackend {
    /// Config pointing at this server.
    pub fn config(&self) -> Config {
        Config {
            backend_url: self.url.clone(),
            ..Default::default()
        }
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Bytes the mock returns for the `n`th composition.
pub fn result_bytes(n: usize) -> Vec<u8> {
    format!("result-{n}").into_bytes()
}

/// Bytes served for a static image path.
pub fn static_bytes(path: &str) -> Vec<u8> {
    format!("garment:{path}").into_bytes()
}

pub fn catalog_item(id: &str, name: &str, category: &str, gender: &str, color: &str) -> CatalogItem {
    CatalogItem {
        id: id.to_string(),
        name: name.to_string(),
        category: category.to_string(),
        subcategory: String::new(),
        color: color.to_string(),
        style: vec!["casual".to_string()],
        image_path: format!("images/{id}.jpg"),
        description: format!("{color} {name}"),
        gender: gender.to_string(),
        brand: "Acme".to_string(),
    }
}

/// Catalog served by the mock.
pub fn catalog() -> Vec<CatalogItem> {
    vec![
        catalog_item("top-1", "Linen Shirt", UPPER_BODY, "men", "white"),
        catalog_item("top-2", "Wrap Blouse", UPPER_BODY, "women", "red"),
        catalog_item("bottom-1", "Slim Jeans", LOWER_BODY, "men", "blue"),
        catalog_item("shoes-1", "Canvas Sneakers", SHOES, "women", "white"),
    ]
}

/// Helper to find an available port for testing.
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the mock backend and returns a handle to it.
pub async fn spawn() -> MockBackend {
    let state = Arc::new(MockState::default());
    let port = find_available_port();
    let addr = format!("127.0.0.1:{port}");

    let router = Router::new()
        .route("/api/tryon", post(tryon))
        .route("/api/tryon/add-item", post(add_item))
        .route("/api/recommend", post(recommend))
        .route("/api/catalog", get(list_catalog))
        .route("/static/*path", get(static_image))
        .with_state(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    MockBackend {
        url: format!("http://{addr}"),
        state,
        handle,
    }
}

async fn compose_response(state: &MockState, category: Option<&str>) -> Response {
    let delay = state.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if state.fail_compositions.load(Ordering::SeqCst) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded").into_response();
    }
    if state.malformed.load(Ordering::SeqCst) {
        return Json(json!({"status": "ok"})).into_response();
    }

    let n = state.compositions.fetch_add(1, Ordering::SeqCst) + 1;
    let bytes = result_bytes(n);
    let result_image = if state.loose_base64.load(Ordering::SeqCst) {
        format!("data:image/png;base64,{}", URL_SAFE_NO_PAD.encode(&bytes))
    } else {
        STANDARD.encode(&bytes)
    };

    let worn: Vec<Value> = category
        .map(|c| vec![json!({"category": c})])
        .unwrap_or_default();
    Json(json!({
        "result_image": result_image,
        "outfit_state": {"worn_items": worn}
    }))
    .into_response()
}

async fn tryon(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    let category = body["category"].as_str().map(str::to_string);
    state.tryon_bodies.lock().unwrap().push(body);
    compose_response(&state, category.as_deref()).await
}

async fn add_item(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    state.add_bodies.lock().unwrap().push(body);
    compose_response(&state, None).await
}

async fn recommend(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Json<Value> {
    let worn: Vec<String> = body["worn_items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["category"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    state.recommend_bodies.lock().unwrap().push(body);

    let recommendations: Vec<Value> = catalog()
        .into_iter()
        .filter(|item| !worn.contains(&item.category))
        .map(|item| {
            json!({
                "id": item.id,
                "name": item.name,
                "image_url": item.image_path,
                "category": item.category,
                "reason": "Completes the look"
            })
        })
        .collect();
    Json(json!({ "recommendations": recommendations }))
}

async fn list_catalog(
    State(state): State<Arc<MockState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let category = params.get("category").cloned();
    state.catalog_queries.lock().unwrap().push(category.clone());
    let items: Vec<CatalogItem> = catalog()
        .into_iter()
        .filter(|item| category.as_ref().map_or(true, |c| &item.category == c))
        .collect();
    Json(json!({ "items": items }))
}

async fn static_image(State(state): State<Arc<MockState>>, Path(path): Path<String>) -> Vec<u8> {
    state.static_hits.fetch_add(1, Ordering::SeqCst);
    static_bytes(&path)
}
