//! The view-sync controller: one dispatch point that classifies each
//! trigger and fans out to the fetch coordinator, viewport bridge and marker
//! state machine, so that no component's output re-triggers itself.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::events::{HostEffect, PopupAction, SearchMode, ViewEvent};
use crate::map::{CameraTarget, MapWidget, MarkerStateMachine, ViewportBridge};
use crate::models::{ListingId, ResultSet, SearchQuery, Viewport};
use crate::query::{codec, ParamSet};
use crate::search::{
    FetchCoordinator, FetchOutcome, FetchTicket, SearchBackend, SearchError, SearchResponse,
};

/// How a new query differs from the last one acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Nothing material changed; no fetch, no camera move
    NoOp,
    /// Only the viewport moved and there is no destination
    CameraDriven,
    /// The destination, picked place or its viewport changed
    DestinationDriven,
    PageOnly,
    /// Dates or occupancy changed
    FiltersChanged,
}

impl Trigger {
    fn mode(self) -> Option<SearchMode> {
        match self {
            Trigger::CameraDriven => Some(SearchMode::CameraDriven),
            Trigger::DestinationDriven => Some(SearchMode::DestinationDriven),
            Trigger::NoOp | Trigger::PageOnly | Trigger::FiltersChanged => None,
        }
    }
}

/// Where a candidate query came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Navigation, pagination or a retry
    Params,
    /// A settled user drag or zoom
    Camera,
}

/// Camera action to take once the pending fetch lands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraPlan {
    Hold,
    /// Fit the viewport that came with the query, ignoring the results
    FitPlace(Viewport),
    /// Fit whatever the result page contains
    FitResults,
}

pub fn classify(previous: Option<&SearchQuery>, next: &SearchQuery) -> Trigger {
    // First load restores whatever the parameters describe
    let Some(previous) = previous else {
        return Trigger::DestinationDriven;
    };

    if previous == next {
        return Trigger::NoOp;
    }
    if previous.same_filters(next) {
        return Trigger::PageOnly;
    }

    let place_changed =
        previous.destination != next.destination || previous.location != next.location;
    let viewport_changed = previous.viewport != next.viewport;

    if viewport_changed && next.destination.is_none() && next.location.is_none() {
        return Trigger::CameraDriven;
    }
    if place_changed || viewport_changed {
        return Trigger::DestinationDriven;
    }
    Trigger::FiltersChanged
}

/// A drag-driven search never moves the camera afterwards, and neither do
/// page or filter changes made while the map is in camera-driven mode.
pub fn plan_camera(trigger: Trigger, mode: SearchMode, query: &SearchQuery) -> CameraPlan {
    match trigger {
        Trigger::NoOp | Trigger::CameraDriven => CameraPlan::Hold,
        Trigger::DestinationDriven => match query.viewport {
            Some(viewport) => CameraPlan::FitPlace(viewport),
            None => CameraPlan::FitResults,
        },
        Trigger::PageOnly | Trigger::FiltersChanged => match mode {
            SearchMode::CameraDriven => CameraPlan::Hold,
            SearchMode::DestinationDriven => CameraPlan::FitResults,
        },
    }
}

pub struct ViewSyncController<W: MapWidget> {
    config: SyncConfig,
    widget: W,
    params: ParamSet,
    last_query: Option<SearchQuery>,
    mode: SearchMode,
    camera_plan: CameraPlan,
    pending_bounds: Option<Viewport>,
    authenticated: bool,
    error_shown: bool,
    fetch: FetchCoordinator,
    bridge: ViewportBridge,
    markers: MarkerStateMachine,
    effects: UnboundedSender<HostEffect>,
}

impl<W: MapWidget> ViewSyncController<W> {
    /// `events` must feed back into [`ViewSyncController::handle`]; the
    /// controller's own timers and fetches report through it.
    pub fn new(
        config: SyncConfig,
        backend: Arc<dyn SearchBackend>,
        widget: W,
        events: UnboundedSender<ViewEvent>,
        effects: UnboundedSender<HostEffect>,
    ) -> Self {
        let fetch = FetchCoordinator::new(
            backend,
            events.clone(),
            config.page_size,
            config.max_pages,
        );
        let bridge = ViewportBridge::new(
            events.clone(),
            config.settle_delay(),
            config.bounds_epsilon,
        );
        let markers = MarkerStateMachine::new(events, config.heal_interval());

        Self {
            config,
            widget,
            params: ParamSet::new(),
            last_query: None,
            mode: SearchMode::DestinationDriven,
            camera_plan: CameraPlan::Hold,
            pending_bounds: None,
            authenticated: false,
            error_shown: false,
            fetch,
            bridge,
            markers,
            effects,
        }
    }

    pub fn handle(&mut self, event: ViewEvent) {
        match event {
            ViewEvent::WidgetReady => self.on_widget_ready(),
            ViewEvent::Navigated(params) => self.on_navigated(params),
            ViewEvent::PageRequested(page) => self.on_page_requested(page),
            ViewEvent::CameraIdle => self.bridge.on_camera_idle(&self.widget),
            ViewEvent::SettleElapsed { generation } => {
                if let Some(bounds) = self.bridge.on_settle_elapsed(generation, &self.widget) {
                    self.on_bounds_changed(bounds);
                }
            }
            ViewEvent::FetchCompleted { ticket, outcome } => {
                self.on_fetch_completed(ticket, outcome)
            }
            ViewEvent::MarkerHovered(id) => self.markers.set_hovered(&mut self.widget, id),
            ViewEvent::MarkerClicked(id) => self.markers.set_selected(&mut self.widget, Some(id)),
            ViewEvent::PopupClosed(id) => self.markers.on_popup_closed(&mut self.widget, id),
            ViewEvent::PopupAction { listing_id, action } => {
                self.on_popup_action(listing_id, action)
            }
            ViewEvent::HealTick { generation } => {
                self.markers.on_heal_tick(&mut self.widget, generation);
            }
            ViewEvent::AuthChanged(authenticated) => self.authenticated = authenticated,
            ViewEvent::DismissError => {
                self.fetch.clear_error();
                if std::mem::take(&mut self.error_shown) {
                    self.emit(HostEffect::ClearError);
                }
            }
            ViewEvent::Retry => self.on_retry(),
        }
    }

    pub fn results(&self) -> &ResultSet {
        self.fetch.results()
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn last_query(&self) -> Option<&SearchQuery> {
        self.last_query.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.fetch.error()
    }

    pub fn markers(&self) -> &MarkerStateMachine {
        &self.markers
    }

    pub fn bridge(&self) -> &ViewportBridge {
        &self.bridge
    }

    /// Host-side access to the widget, e.g. for embedding or replaying input.
    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn widget_mut(&mut self) -> &mut W {
        &mut self.widget
    }

    fn on_widget_ready(&mut self) {
        info!("Map widget ready");
        self.bridge.mark_ready(&mut self.widget);
        self.markers.mark_ready(&mut self.widget);
    }

    fn on_navigated(&mut self, params: ParamSet) {
        self.params = params;
        let query = codec::decode(&self.params);
        self.reconcile(query, Origin::Params);
    }

    fn on_page_requested(&mut self, page: u32) {
        let Some(current) = self.last_query.clone() else {
            debug!("Page {} requested before any search", page);
            return;
        };
        let total_pages = self.fetch.results().total_pages;
        let page = if total_pages > 0 {
            page.min(total_pages - 1)
        } else {
            page
        };

        let query = current.with_page(page);
        self.write_params(&query);
        self.reconcile(query, Origin::Params);
    }

    fn on_bounds_changed(&mut self, bounds: Viewport) {
        if self.fetch.in_flight_mode() == Some(SearchMode::CameraDriven) {
            debug!("Camera search in flight, coalescing bounds change");
            self.pending_bounds = Some(bounds);
            return;
        }

        let base = self
            .last_query
            .clone()
            .unwrap_or_else(|| codec::decode(&self.params));
        let query = SearchQuery {
            destination: None,
            location: None,
            viewport: Some(bounds),
            page: 0,
            ..base
        };
        self.write_params(&query);
        self.reconcile(query, Origin::Camera);
    }

    /// Classify `query` against the last one acted on and start a fetch
    /// unless nothing material changed.
    fn reconcile(&mut self, query: SearchQuery, origin: Origin) {
        if self.fetch.failed().is_some_and(|(failed, _)| *failed != query) {
            self.fetch.forget_failure();
        }

        let trigger = match classify(self.last_query.as_ref(), &query) {
            Trigger::NoOp => {
                debug!("No material change, skipping fetch");
                return;
            }
            _ if origin == Origin::Camera => Trigger::CameraDriven,
            trigger => trigger,
        };
        if trigger != Trigger::CameraDriven && self.pending_bounds.take().is_some() {
            debug!("Discarding coalesced bounds superseded by a {:?} search", trigger);
        }

        let mode = self.plan(trigger, &query);
        let requested = self.fetch.search(query.clone(), mode);
        if requested != query {
            self.write_params(&requested);
        }
        self.last_query = Some(requested);
    }

    /// Settle the search mode and the post-fetch camera action for `query`.
    fn plan(&mut self, trigger: Trigger, query: &SearchQuery) -> SearchMode {
        let mode = trigger.mode().unwrap_or(self.mode);
        self.mode = mode;
        self.camera_plan = plan_camera(trigger, mode, query);
        debug!(?trigger, %mode, plan = ?self.camera_plan, "Classified search trigger");
        mode
    }

    /// Re-issue the failed query, planned as if it had just been navigated to.
    fn on_retry(&mut self) {
        let Some((failed, mode)) = self.fetch.failed() else {
            debug!("Nothing to retry");
            return;
        };
        let failed = failed.clone();
        let trigger = match classify(self.last_query.as_ref(), &failed) {
            _ if mode == SearchMode::CameraDriven => Trigger::CameraDriven,
            trigger => trigger,
        };
        self.plan(trigger, &failed);

        if let Some(requested) = self.fetch.retry() {
            self.write_params(&requested);
            self.last_query = Some(requested);
        }
    }

    fn on_fetch_completed(
        &mut self,
        ticket: FetchTicket,
        outcome: Result<SearchResponse, SearchError>,
    ) {
        match self.fetch.apply(ticket, outcome) {
            FetchOutcome::Applied { .. } => {
                if std::mem::take(&mut self.error_shown) {
                    self.emit(HostEffect::ClearError);
                }
                self.emit(HostEffect::ResultsChanged);

                let plan = std::mem::replace(&mut self.camera_plan, CameraPlan::Hold);
                self.apply_camera_plan(plan);
                self.markers
                    .on_result_set_changed(&mut self.widget, self.fetch.results());
                self.flush_pending_bounds();
            }
            FetchOutcome::Failed { message, .. } => {
                // The failed query was never acted on
                self.last_query = self.fetch.applied_query().cloned();
                self.camera_plan = CameraPlan::Hold;
                self.error_shown = true;
                self.emit(HostEffect::ShowError(message));
                self.flush_pending_bounds();
            }
            FetchOutcome::Stale => {}
        }
    }

    fn apply_camera_plan(&mut self, plan: CameraPlan) {
        let padding = self.config.fit_padding;
        let target = match plan {
            CameraPlan::Hold => None,
            CameraPlan::FitPlace(bounds) => Some(CameraTarget::FitBounds { bounds, padding }),
            CameraPlan::FitResults => {
                let points = self.fetch.results().coordinates();
                match points.as_slice() {
                    [] => None,
                    [only] => Some(CameraTarget::CenterAndZoom {
                        center: *only,
                        zoom: self.config.single_listing_zoom,
                    }),
                    many => Viewport::enclosing(many)
                        .map(|bounds| CameraTarget::FitBounds { bounds, padding }),
                }
            }
        };

        if let Some(target) = target {
            self.bridge.move_camera_to(&mut self.widget, target);
        }
    }

    fn flush_pending_bounds(&mut self) {
        if let Some(bounds) = self.pending_bounds.take() {
            self.on_bounds_changed(bounds);
        }
    }

    fn on_popup_action(&mut self, listing_id: ListingId, action: PopupAction) {
        if !self.markers.popup_allows(listing_id, action) {
            debug!("Ignoring {:?} from a closed popup", action);
            return;
        }

        match action {
            PopupAction::OpenDetail => self.emit(HostEffect::OpenListing(listing_id)),
            PopupAction::ToggleWishlist => {
                if !self.authenticated {
                    self.emit(HostEffect::RequireLogin);
                    return;
                }
                let Some(wishlisted) = self.fetch.toggle_wishlist(listing_id) else {
                    return;
                };
                if let Some(listing) = self.fetch.results().listing(listing_id) {
                    self.markers.update_listing(&mut self.widget, listing);
                }
                self.emit(HostEffect::ToggleWishlist {
                    listing_id,
                    wishlisted,
                });
            }
        }
    }

    /// Persist `query` over the canonical parameters, keeping foreign keys.
    fn write_params(&mut self, query: &SearchQuery) {
        self.params = codec::merge_into(query, &self.params);
        self.emit(HostEffect::ReplaceParams(self.params.clone()));
    }

    fn emit(&self, effect: HostEffect) {
        let _ = self.effects.send(effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Coordinate, Occupancy};

    fn seoul() -> SearchQuery {
        SearchQuery {
            destination: Some("Seoul".to_string()),
            viewport: Some(Viewport::new(37.7, 37.4, 127.2, 126.8)),
            ..SearchQuery::default()
        }
    }

    #[test]
    fn classifies_each_kind_of_delta() {
        let base = seoul();

        assert_eq!(classify(None, &base), Trigger::DestinationDriven);
        assert_eq!(classify(Some(&base), &base.clone()), Trigger::NoOp);
        assert_eq!(classify(Some(&base), &base.clone().with_page(2)), Trigger::PageOnly);

        let dragged = SearchQuery {
            destination: None,
            viewport: Some(Viewport::new(37.6, 37.3, 127.1, 126.7)),
            ..base.clone()
        };
        assert_eq!(classify(Some(&base), &dragged), Trigger::CameraDriven);

        let picked = SearchQuery {
            destination: Some("Busan".to_string()),
            location: Some(Coordinate::new(35.18, 129.08)),
            viewport: None,
            ..base.clone()
        };
        assert_eq!(classify(Some(&base), &picked), Trigger::DestinationDriven);

        let more_guests = SearchQuery {
            occupancy: Occupancy {
                adults: 4,
                ..Occupancy::default()
            },
            ..base.clone()
        };
        assert_eq!(classify(Some(&base), &more_guests), Trigger::FiltersChanged);
    }

    #[test]
    fn camera_plans_follow_mode_exclusivity() {
        let query = seoul();
        let viewport = query.viewport.unwrap();

        assert_eq!(
            plan_camera(Trigger::DestinationDriven, SearchMode::DestinationDriven, &query),
            CameraPlan::FitPlace(viewport)
        );
        assert_eq!(
            plan_camera(Trigger::CameraDriven, SearchMode::CameraDriven, &query),
            CameraPlan::Hold
        );
        assert_eq!(
            plan_camera(Trigger::PageOnly, SearchMode::DestinationDriven, &query),
            CameraPlan::FitResults
        );
        assert_eq!(
            plan_camera(Trigger::PageOnly, SearchMode::CameraDriven, &query),
            CameraPlan::Hold
        );
        assert_eq!(
            plan_camera(Trigger::FiltersChanged, SearchMode::CameraDriven, &query),
            CameraPlan::Hold
        );
    }
}
