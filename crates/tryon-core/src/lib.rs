//! Virtual Try-On Outfit Composer
//!
//! Builds an outfit one garment at a time against a remote try-on backend,
//! keeping the composited result and asking for follow-up recommendations.

pub mod catalog;
pub mod composer;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod image;
pub mod protocol;
pub mod session;

pub use catalog::{
    find_by_id, selectable_entries, static_image_url, CatalogEntry, CatalogFilter, CatalogItem,
    RecommendationItem, CATEGORY_LABELS, GENDER_LABELS, LOWER_BODY, SHOES, UPPER_BODY,
};
pub use composer::{Composer, PendingSelection, RecommendationOutcome, RecommendationTicket};
pub use config::Config;
pub use error::{BackendError, Result, TryOnError};
pub use events::{EventBroadcaster, OutfitEvent};
pub use http::HttpBackend;
pub use image::{ImagePayload, MediaType};
pub use protocol::{
    AddItemRequest, CompositionRequest, CompositionResponse, RecommendRequest, RecommendSeed,
    TryOnBackend, TryOnRequest,
};
pub use session::{CompositionKind, CompositionPlan, Garment, OutfitSession, OutfitStatus, WornItem};
