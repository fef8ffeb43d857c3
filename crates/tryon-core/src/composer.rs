//! The composer coordinates one user's try-on session with the backend.
//!
//! It owns the current [`OutfitSession`] snapshot, the pending catalog
//! selection, and the latest accepted recommendations. All methods take
//! `&self`; the state lock is never held across a backend call.
//!
//! At most one composition is in flight at a time. A second attempt fails
//! fast with `CompositionInFlight` and sends nothing. Responses that arrive
//! after the session moved on (reset, new photo, another composition) are
//! discarded instead of applied.
//!
//! Unless turned off, every committed composition is followed by a
//! recommendation request seeded with the new worn list. The `composed`
//! event goes out before that request is sent, and its failure never fails
//! the composition.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::catalog::{find_by_id, CatalogFilter, CatalogItem, RecommendationItem};
use crate::config::Config;
use crate::error::{BackendError, Result, TryOnError};
use crate::events::{EventBroadcaster, OutfitEvent};
use crate::image::{ImagePayload, MediaType};
use crate::protocol::{CompositionRequest, RecommendRequest, TryOnBackend};
use crate::session::{CompositionPlan, Garment, OutfitSession, OutfitStatus};

/// Picks the endpoint for a garment against a snapshot.
type Planner = fn(&OutfitSession, Garment) -> Result<CompositionPlan>;

// ============================================================================
// Public types
// ============================================================================

/// A catalog item chosen but not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSelection {
    /// The chosen item.
    pub item: CatalogItem,
    /// When it was chosen.
    pub selected_at: DateTime<Utc>,
}

impl PendingSelection {
    fn new(item: CatalogItem) -> Self {
        Self {
            item,
            selected_at: Utc::now(),
        }
    }
}

/// An issued recommendation request, tagged with the generation it was
/// issued against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecommendationTicket {
    generation: u64,
    request: RecommendRequest,
}

impl RecommendationTicket {
    /// Session generation at issue time.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Body to send to the recommendation endpoint.
    #[must_use]
    pub const fn request(&self) -> &RecommendRequest {
        &self.request
    }
}

/// What happened to a recommendation response.
#[derive(Debug)]
pub enum RecommendationOutcome {
    /// The batch was stored and replaces the previous one.
    Updated(Vec<RecommendationItem>),
    /// The session advanced while the call was outstanding; nothing stored.
    Stale {
        /// Generation the request was issued at.
        requested_at: u64,
        /// Generation when the response arrived.
        current: u64,
    },
    /// The call failed. Composition state is unaffected.
    Failed(TryOnError),
}

impl RecommendationOutcome {
    /// Returns `true` if recommendations were stored.
    #[must_use]
    pub const fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }

    /// Returns `true` if the response was discarded as stale.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        matches!(self, Self::Stale { .. })
    }
}

// ============================================================================
// Composer
// ============================================================================

#[derive(Debug, Default)]
struct ComposerState {
    session: OutfitSession,
    pending: Option<PendingSelection>,
    recommendations: Vec<RecommendationItem>,
}

/// Clears the single-flight flag when the composition ends, however it ends.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives an outfit session against a [`TryOnBackend`].
#[derive(Debug)]
pub struct Composer<B> {
    backend: B,
    state: Mutex<ComposerState>,
    in_flight: AtomicBool,
    events: EventBroadcaster,
    composition_timeout: Duration,
    lookup_timeout: Duration,
    result_media_type: MediaType,
    auto_recommend: bool,
}

impl<B: TryOnBackend> Composer<B> {
    /// Creates a composer with an `Empty` session.
    #[must_use]
    pub fn new(backend: B, config: &Config) -> Self {
        Self {
            backend,
            state: Mutex::new(ComposerState::default()),
            in_flight: AtomicBool::new(false),
            events: EventBroadcaster::new(config.event_capacity),
            composition_timeout: config.request_timeout(),
            lookup_timeout: config.recommendation_timeout(),
            result_media_type: config.result_media_type,
            auto_recommend: config.auto_recommend,
        }
    }

    /// Overrides the composition timeout.
    #[must_use]
    pub fn with_composition_timeout(mut self, timeout: Duration) -> Self {
        self.composition_timeout = timeout;
        self
    }

    /// Overrides the timeout for recommendation, catalog, and image lookups.
    #[must_use]
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Turns the recommendation request after each composition on or off.
    #[must_use]
    pub fn with_auto_recommend(mut self, enabled: bool) -> Self {
        self.auto_recommend = enabled;
        self
    }

    /// The backend this composer talks to.
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Subscribes to outfit events.
    pub fn subscribe(&self) -> broadcast::Receiver<OutfitEvent> {
        self.events.subscribe()
    }

    /// The current session snapshot.
    pub async fn snapshot(&self) -> OutfitSession {
        self.state.lock().await.session.clone()
    }

    /// The current lifecycle state.
    pub async fn status(&self) -> OutfitStatus {
        self.state.lock().await.session.status()
    }

    /// The most recent accepted recommendations.
    pub async fn recommendations(&self) -> Vec<RecommendationItem> {
        self.state.lock().await.recommendations.clone()
    }

    /// The catalog item chosen but not yet applied.
    pub async fn pending_selection(&self) -> Option<PendingSelection> {
        self.state.lock().await.pending.clone()
    }

    /// Returns `true` while a composition call is outstanding.
    pub fn is_composing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------------
    // Photo and selection
    // ------------------------------------------------------------------------

    /// Starts a fresh session around a new photo.
    ///
    /// Clears the outfit, the selection, and recommendations. A composition
    /// still in flight will be discarded when it returns.
    pub async fn set_base_image(&self, image: ImagePayload) -> OutfitSession {
        let bytes = image.len();
        let next = {
            let mut state = self.state.lock().await;
            state.session = state.session.with_base_image(image);
            state.pending = None;
            state.recommendations.clear();
            state.session.clone()
        };
        info!(generation = next.generation(), bytes, "Photo set, session ready");
        self.events
            .send(OutfitEvent::base_image_set(next.generation(), bytes));
        next
    }

    /// Chooses a catalog item to try on next, replacing any previous choice.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCategory` if the item's category is already worn.
    pub async fn select(&self, item: CatalogItem) -> Result<()> {
        let id = item.id.clone();
        {
            let mut state = self.state.lock().await;
            if state.session.is_category_worn(&item.category) {
                return Err(TryOnError::duplicate_category(item.category));
            }
            state.pending = Some(PendingSelection::new(item));
        }
        debug!(item_id = %id, "Selection changed");
        self.events.send(OutfitEvent::selection_changed(Some(id)));
        Ok(())
    }

    /// Selects the catalog item behind a clicked recommendation.
    ///
    /// Returns `Ok(None)` and leaves the selection alone when `id` is not in
    /// `catalog`.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateCategory` if the item's category is already worn.
    pub async fn select_recommendation(
        &self,
        id: &str,
        catalog: &[CatalogItem],
    ) -> Result<Option<CatalogItem>> {
        let Some(item) = find_by_id(catalog, id) else {
            debug!(item_id = %id, "Recommendation not in catalog, ignoring");
            return Ok(None);
        };
        self.select(item.clone()).await?;
        Ok(Some(item.clone()))
    }

    /// Drops the pending selection.
    pub async fn clear_selection(&self) {
        let had_selection = self.state.lock().await.pending.take().is_some();
        if had_selection {
            self.events.send(OutfitEvent::selection_changed(None));
        }
    }

    /// Lists catalog items matching `filter`.
    ///
    /// The category goes to the backend as a query; gender is filtered here.
    ///
    /// # Errors
    ///
    /// Returns `CatalogUnavailable` if the backend call fails or times out.
    pub async fn catalog(&self, filter: &CatalogFilter) -> Result<Vec<CatalogItem>> {
        let category = filter.category.as_deref().filter(|c| !c.is_empty());
        let items = with_timeout(self.lookup_timeout, self.backend.catalog(category))
            .await
            .map_err(|e| {
                warn!(error = %e, "Catalog request failed");
                TryOnError::catalog_unavailable(e.to_string())
            })?;
        debug!(count = items.len(), ?category, "Catalog loaded");
        Ok(items.into_iter().filter(|item| filter.matches(item)).collect())
    }

    // ------------------------------------------------------------------------
    // Composition
    // ------------------------------------------------------------------------

    /// Fetches the pending selection's image and composes it.
    ///
    /// Uses the first-garment endpoint in `Ready` and the incremental one in
    /// `Composed(n)`. The selection is cleared on success.
    ///
    /// # Errors
    ///
    /// Returns `CompositionInFlight`, `MissingPrecondition` (no photo or
    /// nothing selected), `DuplicateCategory`, or `CompositionFailed`.
    pub async fn try_on(&self) -> Result<OutfitSession> {
        let composed = {
            let _flight = self.begin_flight()?;
            self.compose_pending().await
        };
        self.recommend_after(composed).await
    }

    async fn compose_pending(&self) -> Result<OutfitSession> {
        let item = {
            let state = self.state.lock().await;
            let Some(pending) = state.pending.as_ref() else {
                return Err(TryOnError::missing(
                    "no garment selected",
                    "Select a catalog item before trying it on",
                ));
            };
            state.session.ensure_can_wear(&pending.item.category)?;
            pending.item.clone()
        };

        let fetch = self.backend.fetch_image(&item.image_path);
        let image = match with_timeout(self.lookup_timeout, fetch).await {
            Ok(image) => image,
            Err(e) => {
                return Err(self.composition_failed(format!(
                    "cannot fetch garment image '{}': {e}",
                    item.image_path
                )));
            }
        };

        self.compose(Garment::from_catalog(&item, image), OutfitSession::plan)
            .await
    }

    /// Composes the first garment onto the photo. Valid only in `Ready`.
    ///
    /// # Errors
    ///
    /// Returns `CompositionInFlight`, `MissingPrecondition`,
    /// `InvalidStateTransition`, or `CompositionFailed`.
    pub async fn apply_first(&self, garment: Garment) -> Result<OutfitSession> {
        let composed = {
            let _flight = self.begin_flight()?;
            self.compose(garment, OutfitSession::plan_first).await
        };
        self.recommend_after(composed).await
    }

    /// Composes another garment onto the current result. Valid only in
    /// `Composed(n)`.
    ///
    /// # Errors
    ///
    /// Returns `CompositionInFlight`, `MissingPrecondition`,
    /// `InvalidStateTransition`, `DuplicateCategory` (before any request), or
    /// `CompositionFailed`.
    pub async fn add_item(&self, garment: Garment) -> Result<OutfitSession> {
        let composed = {
            let _flight = self.begin_flight()?;
            self.compose(garment, OutfitSession::plan_add).await
        };
        self.recommend_after(composed).await
    }

    /// Clears the outfit and keeps the photo.
    pub async fn reset(&self) -> OutfitSession {
        let next = {
            let mut state = self.state.lock().await;
            state.session = state.session.reset();
            state.pending = None;
            state.recommendations.clear();
            state.session.clone()
        };
        info!(generation = next.generation(), status = %next.status(), "Outfit reset");
        self.events.send(OutfitEvent::reset(next.generation()));
        next
    }

    fn begin_flight(&self) -> Result<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| FlightGuard {
                flag: &self.in_flight,
            })
            .map_err(|_| {
                warn!("Composition already in progress, rejecting");
                TryOnError::CompositionInFlight
            })
    }

    /// Plans, calls the backend, and commits. The caller holds the flight guard.
    async fn compose(&self, garment: Garment, planner: Planner) -> Result<OutfitSession> {
        let plan = {
            let state = self.state.lock().await;
            planner(&state.session, garment)?
        };

        info!(
            kind = %plan.kind(),
            category = %plan.garment().category,
            generation = plan.generation(),
            "Composition started"
        );
        self.events.send(OutfitEvent::composition_started(
            plan.kind(),
            plan.garment().category.clone(),
            plan.generation(),
        ));

        let request = CompositionRequest::from(&plan);
        let image = match self.request_composition(&request).await {
            Ok(image) => image,
            Err(e) => return Err(self.composition_failed(e.to_string())),
        };

        let committed = {
            let mut state = self.state.lock().await;
            state.session.commit(&plan, image).map(|next| {
                state.session = next.clone();
                state.pending = None;
                state.recommendations.clear();
                next
            })
        };

        match committed {
            Ok(next) => {
                info!(
                    status = %next.status(),
                    generation = next.generation(),
                    "Garment composed"
                );
                self.events.send(OutfitEvent::composed(
                    next.status(),
                    next.worn_items().to_vec(),
                    next.generation(),
                ));
                Ok(next)
            }
            Err(err) => {
                warn!(error = %err, "Discarding composition result");
                self.events.send(OutfitEvent::composition_failed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn request_composition(
        &self,
        request: &CompositionRequest,
    ) -> std::result::Result<ImagePayload, BackendError> {
        let response =
            with_timeout(self.composition_timeout, self.backend.compose(request)).await?;
        debug!(echoed = ?response.echoed_categories(), "Backend outfit state");

        let image = response.decode_image()?;
        if image.media_type() == MediaType::Unknown {
            return Ok(ImagePayload::with_media_type(
                image.as_bytes().to_vec(),
                self.result_media_type,
            ));
        }
        Ok(image)
    }

    /// Follows a committed composition with a recommendation request.
    ///
    /// Runs after the flight guard is released. The outcome is logged and
    /// stored by `finish_recommendations`; it never changes `composed`.
    async fn recommend_after(&self, composed: Result<OutfitSession>) -> Result<OutfitSession> {
        let next = composed?;
        if self.auto_recommend {
            match self.request_recommendations().await {
                Ok(outcome) => debug!(
                    updated = outcome.is_updated(),
                    stale = outcome.is_stale(),
                    "Recommendations settled after composition"
                ),
                Err(e) => debug!(error = %e, "Recommendations skipped"),
            }
        }
        Ok(next)
    }

    fn composition_failed(&self, message: String) -> TryOnError {
        warn!(%message, "Composition failed, outfit unchanged");
        self.events
            .send(OutfitEvent::composition_failed(message.clone()));
        TryOnError::composition_failed(message)
    }

    // ------------------------------------------------------------------------
    // Recommendations
    // ------------------------------------------------------------------------

    /// Issues a recommendation ticket for the current outfit.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrecondition` until something has been composed.
    pub async fn begin_recommendations(&self) -> Result<RecommendationTicket> {
        let state = self.state.lock().await;
        let request = RecommendRequest::from_session(&state.session).ok_or_else(|| {
            TryOnError::missing(
                "no composed outfit yet",
                "Try on a garment before asking for recommendations",
            )
        })?;
        Ok(RecommendationTicket {
            generation: state.session.generation(),
            request,
        })
    }

    /// Accepts or discards a recommendation response.
    ///
    /// A response is stored only if the session has not advanced since the
    /// ticket was issued. Failures are reported, never raised.
    pub async fn finish_recommendations(
        &self,
        ticket: RecommendationTicket,
        result: std::result::Result<Vec<RecommendationItem>, BackendError>,
    ) -> RecommendationOutcome {
        let current = {
            let mut state = self.state.lock().await;
            let current = state.session.generation();
            if ticket.generation == current {
                if let Ok(items) = &result {
                    state.recommendations.clone_from(items);
                }
            }
            current
        };

        if ticket.generation != current {
            warn!(
                requested_at = ticket.generation,
                current, "Discarding stale recommendations"
            );
            self.events.send(OutfitEvent::recommendations_discarded(
                ticket.generation,
                current,
            ));
            return RecommendationOutcome::Stale {
                requested_at: ticket.generation,
                current,
            };
        }

        match result {
            Ok(items) => {
                info!(count = items.len(), generation = current, "Recommendations updated");
                self.events
                    .send(OutfitEvent::recommendations_updated(items.len(), current));
                RecommendationOutcome::Updated(items)
            }
            Err(e) => {
                warn!(error = %e, "Recommendation request failed");
                self.events
                    .send(OutfitEvent::recommendations_failed(e.to_string()));
                RecommendationOutcome::Failed(TryOnError::recommendation_failed(e.to_string()))
            }
        }
    }

    /// Fetches recommendations for the current outfit.
    ///
    /// # Errors
    ///
    /// Returns `MissingPrecondition` until something has been composed.
    /// Backend failures come back as `RecommendationOutcome::Failed`.
    pub async fn request_recommendations(&self) -> Result<RecommendationOutcome> {
        let ticket = self.begin_recommendations().await?;
        debug!(
            generation = ticket.generation(),
            worn = ticket.request().worn_items.len(),
            "Requesting recommendations"
        );
        let result = with_timeout(self.lookup_timeout, self.backend.recommend(ticket.request())).await;
        Ok(self.finish_recommendations(ticket, result).await)
    }
}

/// Bounds a backend call; expiry becomes `BackendError::Timeout`.
async fn with_timeout<T, F>(limit: Duration, call: F) -> std::result::Result<T, BackendError>
where
    F: Future<Output = std::result::Result<T, BackendError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(BackendError::Timeout(limit)),
    }
}

// ============================================================================
// Tests
// ============================================================================
