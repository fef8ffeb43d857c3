//! Outfit session state machine.
//!
//! An [`OutfitSession`] is an immutable snapshot. Every transition returns a
//! new snapshot and leaves the old one untouched, so a failed backend call
//! can never leave a half-applied outfit behind.
//!
//! Compositions happen in two steps. First the snapshot *plans* the call
//! ([`OutfitSession::plan`]), validating preconditions and picking the
//! first-garment or incremental endpoint. Then, once the backend has
//! answered, the plan is *committed* ([`OutfitSession::commit`]). The plan
//! records the snapshot generation it was made against; committing onto a
//! snapshot that has moved on is refused.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogItem;
use crate::error::{Result, TryOnError};
use crate::image::ImagePayload;

// ============================================================================
// OutfitStatus
// ============================================================================

/// Where the session is in its lifecycle.
///
/// The status transitions through these states:
/// - `Empty` -> `Ready` (photo supplied)
/// - `Ready` -> `Composed(1)` (first garment applied)
/// - `Composed(n)` -> `Composed(n + 1)` (garment added)
/// - any -> `Ready` (reset, photo kept) or fresh `Ready` (new photo)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "worn", rename_all = "snake_case")]
pub enum OutfitStatus {
    /// No photo yet.
    #[default]
    Empty,
    /// Photo present, nothing worn.
    Ready,
    /// `n >= 1` garments worn.
    Composed(usize),
}

impl OutfitStatus {
    /// Returns `true` if at least one garment is worn.
    ///
    /// # Examples
    ///
    /// ```
    /// use tryon_core::OutfitStatus;
    ///
    /// assert!(OutfitStatus::Composed(2).is_composed());
    /// assert!(!OutfitStatus::Ready.is_composed());
    /// ```
    #[must_use]
    pub const fn is_composed(&self) -> bool {
        matches!(self, Self::Composed(_))
    }

    /// Number of garments worn in this state.
    #[must_use]
    pub const fn worn_count(&self) -> usize {
        match self {
            Self::Empty | Self::Ready => 0,
            Self::Composed(n) => *n,
        }
    }
}

impl fmt::Display for OutfitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Ready => write!(f, "ready"),
            Self::Composed(n) => write!(f, "composed({n})"),
        }
    }
}

// ============================================================================
// Garment and WornItem
// ============================================================================

/// A garment about to be composed onto the outfit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Garment {
    /// Garment image, already fetched.
    pub image: ImagePayload,
    /// Composition category (e.g. `upper_body`).
    pub category: String,
    /// Free-text description sent to the backend.
    pub description: String,
    /// Display name recorded on the worn item.
    pub name: String,
    /// Colour, forwarded to recommendations when known.
    pub color: Option<String>,
}

impl Garment {
    /// Creates a garment with the description doubling as its name.
    #[must_use]
    pub fn new(
        image: ImagePayload,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let description = description.into();
        Self {
            image,
            category: category.into(),
            name: description.clone(),
            description,
            color: None,
        }
    }

    /// Builds a garment from a catalog item and its fetched image.
    #[must_use]
    pub fn from_catalog(item: &CatalogItem, image: ImagePayload) -> Self {
        Self {
            image,
            category: item.category.clone(),
            description: item.description.clone(),
            name: item.name.clone(),
            color: Some(item.color.clone()).filter(|c| !c.is_empty()),
        }
    }

    /// Overrides the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the colour.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// A garment that is part of the composed result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WornItem {
    /// Composition category.
    pub category: String,
    /// Display name.
    pub name: String,
    /// Description that was sent to the backend.
    pub description: String,
    /// Colour, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// When the garment was committed to the outfit.
    pub worn_at: DateTime<Utc>,
}

impl WornItem {
    fn from_garment(garment: &Garment) -> Self {
        Self {
            category: garment.category.clone(),
            name: garment.name.clone(),
            description: garment.description.clone(),
            color: garment.color.clone(),
            worn_at: Utc::now(),
        }
    }
}

// ============================================================================
// CompositionPlan
// ============================================================================

/// Which backend endpoint a composition goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionKind {
    /// Garment onto the raw photo.
    First,
    /// Garment onto an already-rendered result.
    Add,
}

impl fmt::Display for CompositionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::First => write!(f, "first"),
            Self::Add => write!(f, "add"),
        }
    }
}

/// A validated composition, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionPlan {
    kind: CompositionKind,
    source_image: ImagePayload,
    garment: Garment,
    generation: u64,
}

impl CompositionPlan {
    /// Endpoint this plan targets.
    #[must_use]
    pub const fn kind(&self) -> CompositionKind {
        self.kind
    }

    /// The photo (for `First`) or the prior result (for `Add`).
    #[must_use]
    pub const fn source_image(&self) -> &ImagePayload {
        &self.source_image
    }

    /// The garment being applied.
    #[must_use]
    pub const fn garment(&self) -> &Garment {
        &self.garment
    }

    /// Snapshot generation the plan was made against.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

// ============================================================================
// OutfitSession
// ============================================================================

/// Immutable snapshot of an outfit in progress.
#[derive(Debug, Clone)]
pub struct OutfitSession {
    base_image: Option<ImagePayload>,
    current_image: Option<ImagePayload>,
    worn_items: Vec<WornItem>,
    generation: u64,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Default for OutfitSession {
    fn default() -> Self {
        Self::new()
    }
}

impl OutfitSession {
    /// Creates an `Empty` session.
    ///
    /// # Examples
    ///
    /// ```
    /// use tryon_core::{OutfitSession, OutfitStatus};
    ///
    /// let session = OutfitSession::new();
    /// assert_eq!(session.status(), OutfitStatus::Empty);
    /// assert_eq!(session.generation(), 0);
    /// assert!(session.worn_items().is_empty());
    /// ```
    #[must_use]
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            base_image: None,
            current_image: None,
            worn_items: Vec::new(),
            generation: 0,
            started_at: now,
            updated_at: now,
        }
    }

    /// Starts a fresh `Ready` session around a photo.
    ///
    /// Any worn garments are dropped; the generation keeps counting up so
    /// responses issued against the old photo are recognised as stale.
    #[must_use]
    pub fn with_base_image(&self, image: ImagePayload) -> Self {
        let now = Utc::now();
        Self {
            base_image: Some(image),
            current_image: None,
            worn_items: Vec::new(),
            generation: self.generation + 1,
            started_at: now,
            updated_at: now,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> OutfitStatus {
        match (&self.base_image, self.worn_items.len()) {
            (None, _) => OutfitStatus::Empty,
            (Some(_), 0) => OutfitStatus::Ready,
            (Some(_), n) => OutfitStatus::Composed(n),
        }
    }

    /// The person photo.
    #[must_use]
    pub const fn base_image(&self) -> Option<&ImagePayload> {
        self.base_image.as_ref()
    }

    /// The latest composited result.
    #[must_use]
    pub const fn current_image(&self) -> Option<&ImagePayload> {
        self.current_image.as_ref()
    }

    /// Garments worn, in application order.
    #[must_use]
    pub fn worn_items(&self) -> &[WornItem] {
        &self.worn_items
    }

    /// Monotonic version tag.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// When this photo's session started.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the snapshot last changed.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Categories currently worn.
    pub fn worn_categories(&self) -> impl Iterator<Item = &str> {
        self.worn_items.iter().map(|item| item.category.as_str())
    }

    /// Returns `true` if a garment of this category is worn.
    #[must_use]
    pub fn is_category_worn(&self, category: &str) -> bool {
        self.worn_categories().any(|worn| worn == category)
    }

    /// Checks that a garment of `category` could be composed next.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrecondition` without a photo and `DuplicateCategory`
    /// if the category is already worn.
    pub fn ensure_can_wear(&self, category: &str) -> Result<()> {
        if self.base_image.is_none() {
            return Err(missing_photo());
        }
        if self.is_category_worn(category) {
            return Err(TryOnError::duplicate_category(category));
        }
        Ok(())
    }

    /// Plans a composition, choosing the endpoint from the current state.
    ///
    /// # Errors
    ///
    /// See [`OutfitSession::plan_first`] and [`OutfitSession::plan_add`].
    pub fn plan(&self, garment: Garment) -> Result<CompositionPlan> {
        match self.status() {
            OutfitStatus::Composed(_) => self.plan_add(garment),
            OutfitStatus::Empty | OutfitStatus::Ready => self.plan_first(garment),
        }
    }

    /// Plans the first garment onto the photo. Valid only in `Ready`.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrecondition` without a photo and
    /// `InvalidStateTransition` once something is worn.
    pub fn plan_first(&self, garment: Garment) -> Result<CompositionPlan> {
        let status = self.status();
        match (&self.base_image, status) {
            (None, _) => Err(missing_photo()),
            (Some(photo), OutfitStatus::Ready) => Ok(CompositionPlan {
                kind: CompositionKind::First,
                source_image: photo.clone(),
                garment,
                generation: self.generation,
            }),
            (Some(_), _) => Err(TryOnError::invalid_transition(
                status,
                OutfitStatus::Composed(1),
            )),
        }
    }

    /// Plans an additional garment onto the current result. Valid only in
    /// `Composed(n)`.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrecondition` without a photo, `InvalidStateTransition`
    /// before the first garment, and `DuplicateCategory` if the garment's
    /// category is already worn.
    pub fn plan_add(&self, garment: Garment) -> Result<CompositionPlan> {
        let status = self.status();
        if self.base_image.is_none() {
            return Err(missing_photo());
        }
        let Some(current) = self.current_image.as_ref().filter(|_| status.is_composed()) else {
            return Err(TryOnError::invalid_transition(
                status,
                OutfitStatus::Composed(status.worn_count() + 1),
            ));
        };
        if self.is_category_worn(&garment.category) {
            return Err(TryOnError::duplicate_category(garment.category));
        }
        Ok(CompositionPlan {
            kind: CompositionKind::Add,
            source_image: current.clone(),
            garment,
            generation: self.generation,
        })
    }

    /// Applies a successful composition result.
    ///
    /// # Errors
    ///
    /// Returns `CompositionFailed` if the snapshot moved on since the plan
    /// was made (reset, new photo, or another composition).
    pub fn commit(&self, plan: &CompositionPlan, result: ImagePayload) -> Result<Self> {
        if plan.generation != self.generation {
            return Err(TryOnError::composition_failed(format!(
                "session changed while composition was in flight (planned at generation {}, now {})",
                plan.generation, self.generation
            )));
        }
        if self.is_category_worn(&plan.garment.category) {
            return Err(TryOnError::duplicate_category(plan.garment.category.clone()));
        }

        let mut next = self.clone();
        next.worn_items.push(WornItem::from_garment(&plan.garment));
        next.current_image = Some(result);
        next.generation += 1;
        next.updated_at = Utc::now();
        Ok(next)
    }

    /// Clears the outfit, keeping the photo.
    #[must_use]
    pub fn reset(&self) -> Self {
        let mut next = self.clone();
        next.current_image = None;
        next.worn_items.clear();
        next.generation += 1;
        next.updated_at = Utc::now();
        next
    }

    /// Checks the structural invariants of the snapshot.
    ///
    /// Worn items and a current image come and go together, no category
    /// repeats, and nothing is worn without a photo.
    #[must_use]
    pub fn invariants_hold(&self) -> bool {
        let image_matches_items = self.worn_items.is_empty() == self.current_image.is_none();
        let photo_present = self.base_image.is_some() || self.worn_items.is_empty();
        let unique_categories = self
            .worn_items
            .iter()
            .enumerate()
            .all(|(i, item)| !self.worn_items[..i].iter().any(|w| w.category == item.category));
        image_matches_items && photo_present && unique_categories
    }
}

fn missing_photo() -> TryOnError {
    TryOnError::missing("no photo uploaded", "Upload a photo before trying on garments")
}

// ============================================================================
// Tests
// ============================================================================
