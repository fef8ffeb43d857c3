//! HTTP implementation of [`TryOnBackend`] over reqwest.
//!
//! No request timeout is set here; calls are bounded by the
//! [`Composer`](crate::Composer) timeouts.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::catalog::{static_image_url, CatalogItem, RecommendationItem};
use crate::config::Config;
use crate::error::{BackendError, Result, TryOnError};
use crate::image::ImagePayload;
use crate::protocol::{
    AddItemRequest, CatalogResponse, CompositionResponse, RecommendRequest, RecommendResponse,
    TryOnBackend, TryOnRequest, ADD_ITEM_PATH, CATALOG_PATH, RECOMMEND_PATH, TRYON_PATH,
};

/// Longest error body kept in a `BackendError::Status`.
const MAX_ERROR_BODY: usize = 512;

/// Talks to the try-on backend over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    http: Client,
    base_url: String,
    static_path: String,
}

impl HttpBackend {
    /// Creates a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigValidationError` if the HTTP client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        debug!(backend_url = %config.backend_url, "from_config: called");
        let http = Client::builder().build().map_err(|e| {
            TryOnError::config_validation(
                format!("cannot build HTTP client: {e}"),
                "Check the TLS configuration of this machine",
            )
        })?;

        Ok(Self {
            http,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            static_path: config.static_path.clone(),
        })
    }

    /// Base URL requests are sent to.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Sends a request and returns the response if its status is a success.
    async fn send(&self, request: RequestBuilder) -> std::result::Result<Response, BackendError> {
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY),
            });
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, BackendError> {
        let response = self.send(request).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl TryOnBackend for HttpBackend {
    async fn compose_first(
        &self,
        request: &TryOnRequest,
    ) -> std::result::Result<CompositionResponse, BackendError> {
        debug!(category = %request.category, "compose_first: POST {TRYON_PATH}");
        let builder = self.http.post(self.url(TRYON_PATH)).json(request);
        self.send_json(builder).await
    }

    async fn compose_add(
        &self,
        request: &AddItemRequest,
    ) -> std::result::Result<CompositionResponse, BackendError> {
        debug!(description = %request.item_description, "compose_add: POST {ADD_ITEM_PATH}");
        let builder = self.http.post(self.url(ADD_ITEM_PATH)).json(request);
        self.send_json(builder).await
    }

    async fn recommend(
        &self,
        request: &RecommendRequest,
    ) -> std::result::Result<Vec<RecommendationItem>, BackendError> {
        debug!(worn = request.worn_items.len(), "recommend: POST {RECOMMEND_PATH}");
        let builder = self.http.post(self.url(RECOMMEND_PATH)).json(request);
        let response: RecommendResponse = self.send_json(builder).await?;
        Ok(response.recommendations)
    }

    async fn catalog(
        &self,
        category: Option<&str>,
    ) -> std::result::Result<Vec<CatalogItem>, BackendError> {
        debug!(?category, "catalog: GET {CATALOG_PATH}");
        let mut builder = self.http.get(self.url(CATALOG_PATH));
        if let Some(category) = category.filter(|c| !c.is_empty()) {
            builder = builder.query(&[("category", category)]);
        }
        let response: CatalogResponse = self.send_json(builder).await?;
        Ok(response.items)
    }

    async fn fetch_image(
        &self,
        image_path: &str,
    ) -> std::result::Result<ImagePayload, BackendError> {
        let url = static_image_url(&self.base_url, &self.static_path, image_path);
        debug!(%url, "fetch_image: GET");
        let response = self.send(self.http.get(url)).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(BackendError::InvalidImage(format!("empty body for {image_path}")));
        }
        Ok(ImagePayload::from_bytes(bytes.to_vec()))
    }
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
