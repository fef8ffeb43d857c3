//! Wire protocol of the try-on backend.
//!
//! # Endpoints
//!
//! - `POST /api/tryon` - Compose the first garment onto the photo
//! - `POST /api/tryon/add-item` - Compose another garment onto a prior result
//! - `POST /api/recommend` - Suggest complementary catalog items
//! - `GET /api/catalog` - List catalog items, optionally by `category`
//!
//! All images are bare base64 strings (no data-URL prefix).

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogItem, RecommendationItem};
use crate::error::BackendError;
use crate::image::ImagePayload;
use crate::session::{CompositionKind, CompositionPlan, OutfitSession};

/// Path of the first-garment endpoint.
pub const TRYON_PATH: &str = "/api/tryon";
/// Path of the incremental endpoint.
pub const ADD_ITEM_PATH: &str = "/api/tryon/add-item";
/// Path of the recommendation endpoint.
pub const RECOMMEND_PATH: &str = "/api/recommend";
/// Path of the catalog listing.
pub const CATALOG_PATH: &str = "/api/catalog";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/tryon`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TryOnRequest {
    /// The person photo.
    pub human_image: String,
    /// The garment image.
    pub garment_image: String,
    /// Free-text garment description.
    pub garment_description: String,
    /// Composition category.
    pub category: String,
}

/// Request body for `POST /api/tryon/add-item`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddItemRequest {
    /// The previously composed result.
    pub current_outfit_image: String,
    /// The garment image.
    pub new_item_image: String,
    /// Free-text garment description.
    pub item_description: String,
}

/// Response body of both composition endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionResponse {
    /// The composed image.
    pub result_image: String,
    /// Backend's view of the outfit. Informational only.
    #[serde(default)]
    pub outfit_state: serde_json::Value,
}

impl CompositionResponse {
    /// Decodes the composed image.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::InvalidImage` for an empty or undecodable payload.
    pub fn decode_image(&self) -> Result<ImagePayload, BackendError> {
        if self.result_image.trim().is_empty() {
            return Err(BackendError::InvalidImage("empty result image".to_string()));
        }
        ImagePayload::from_base64(&self.result_image)
            .map_err(|e| BackendError::InvalidImage(e.to_string()))
    }

    /// Categories the backend claims are worn, if it reported any.
    #[must_use]
    pub fn echoed_categories(&self) -> Vec<String> {
        self.outfit_state
            .get("worn_items")
            .and_then(serde_json::Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("category").and_then(serde_json::Value::as_str))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// A worn item as sent to the recommendation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendSeed {
    /// Composition category.
    pub category: String,
    /// Display name.
    pub name: String,
    /// Colour, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Request body for `POST /api/recommend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendRequest {
    /// The current composed result.
    pub current_outfit_image: String,
    /// Everything worn so far, in order.
    pub worn_items: Vec<RecommendSeed>,
}

impl RecommendRequest {
    /// Seeds a request from a session snapshot.
    ///
    /// Returns `None` when nothing has been composed yet.
    #[must_use]
    pub fn from_session(session: &OutfitSession) -> Option<Self> {
        let image = session.current_image()?;
        Some(Self {
            current_outfit_image: image.to_base64(),
            worn_items: session
                .worn_items()
                .iter()
                .map(|item| RecommendSeed {
                    category: item.category.clone(),
                    name: item.name.clone(),
                    color: item.color.clone(),
                })
                .collect(),
        })
    }
}

/// Response body for `POST /api/recommend`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendResponse {
    /// Suggested items.
    pub recommendations: Vec<RecommendationItem>,
}

/// Response body for `GET /api/catalog`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogResponse {
    /// Catalog items.
    pub items: Vec<CatalogItem>,
}

/// One outbound composition call, shaped for its endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositionRequest {
    /// Body for `POST /api/tryon`.
    First(TryOnRequest),
    /// Body for `POST /api/tryon/add-item`.
    Add(AddItemRequest),
}

impl From<&CompositionPlan> for CompositionRequest {
    fn from(plan: &CompositionPlan) -> Self {
        let garment = plan.garment();
        match plan.kind() {
            CompositionKind::First => Self::First(TryOnRequest {
                human_image: plan.source_image().to_base64(),
                garment_image: garment.image.to_base64(),
                garment_description: garment.description.clone(),
                category: garment.category.clone(),
            }),
            CompositionKind::Add => Self::Add(AddItemRequest {
                current_outfit_image: plan.source_image().to_base64(),
                new_item_image: garment.image.to_base64(),
                item_description: garment.description.clone(),
            }),
        }
    }
}

// ============================================================================
// Backend trait
// ============================================================================

/// The external collaborator behind the composer.
///
/// Implementations perform exactly one round trip per call and never retry.
#[async_trait]
pub trait TryOnBackend: Send + Sync {
    /// Composes the first garment onto the photo.
    async fn compose_first(&self, request: &TryOnRequest)
        -> Result<CompositionResponse, BackendError>;

    /// Composes another garment onto a prior result.
    async fn compose_add(&self, request: &AddItemRequest)
        -> Result<CompositionResponse, BackendError>;

    /// Fetches recommendations for the current outfit.
    async fn recommend(
        &self,
        request: &RecommendRequest,
    ) -> Result<Vec<RecommendationItem>, BackendError>;

    /// Lists the catalog, optionally restricted to one category.
    async fn catalog(&self, category: Option<&str>) -> Result<Vec<CatalogItem>, BackendError>;

    /// Fetches a static garment image by its server-relative path.
    async fn fetch_image(&self, image_path: &str) -> Result<ImagePayload, BackendError>;

    /// Sends a composition to the endpoint matching its shape.
    async fn compose(
        &self,
        request: &CompositionRequest,
    ) -> Result<CompositionResponse, BackendError> {
        match request {
            CompositionRequest::First(body) => self.compose_first(body).await,
            CompositionRequest::Add(body) => self.compose_add(body).await,
        }
    }
}

#[async_trait]
impl<T: TryOnBackend + ?Sized> TryOnBackend for Arc<T> {
    async fn compose_first(
        &self,
        request: &TryOnRequest,
    ) -> Result<CompositionResponse, BackendError> {
        (**self).compose_first(request).await
    }

    async fn compose_add(
        &self,
        request: &AddItemRequest,
    ) -> Result<CompositionResponse, BackendError> {
        (**self).compose_add(request).await
    }

    async fn recommend(
        &self,
        request: &RecommendRequest,
    ) -> Result<Vec<RecommendationItem>, BackendError> {
        (**self).recommend(request).await
    }

    async fn catalog(&self, category: Option<&str>) -> Result<Vec<CatalogItem>, BackendError> {
        (**self).catalog(category).await
    }

    async fn fetch_image(&self, image_path: &str) -> Result<ImagePayload, BackendError> {
        (**self).fetch_image(image_path).await
    }
}

// ============================================================================
// Tests
// ============================================================================
