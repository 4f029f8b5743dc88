use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::events::{PopupAction, ViewEvent};
use crate::map::widget::{MarkerState, MarkerSurface, PopupContent};
use crate::models::{Listing, ListingId, ResultSet};

/// Actions every listing popup exposes
const POPUP_ACTIONS: [PopupAction; 2] = [PopupAction::OpenDetail, PopupAction::ToggleWishlist];

/// Callback registrations owned by an open popup. Dropped when the popup
/// closes, after which its actions are no longer routed anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupSession {
    listing_id: ListingId,
    actions: Vec<PopupAction>,
}

impl PopupSession {
    pub fn listing_id(&self) -> ListingId {
        self.listing_id
    }

    pub fn allows(&self, action: PopupAction) -> bool {
        self.actions.contains(&action)
    }
}

/// Sole owner of marker icons and the listing popup.
///
/// Keeps one logical [`MarkerState`] per mapped listing and mirrors it onto
/// the widget. `Selected` dominates `Hovered`; at most one listing is
/// selected. While a listing is selected a periodic check re-asserts its
/// icon, since the widget may reset icons on its own.
pub struct MarkerStateMachine {
    events: UnboundedSender<ViewEvent>,
    heal_interval: Duration,
    states: BTreeMap<ListingId, MarkerState>,
    listings: HashMap<ListingId, Listing>,
    hovered: Option<ListingId>,
    selected: Option<ListingId>,
    popup: Option<PopupSession>,
    heal_generation: u64,
    heal_task: Option<JoinHandle<()>>,
    ready: bool,
}

impl MarkerStateMachine {
    pub fn new(events: UnboundedSender<ViewEvent>, heal_interval: Duration) -> Self {
        Self {
            events,
            heal_interval,
            states: BTreeMap::new(),
            listings: HashMap::new(),
            hovered: None,
            selected: None,
            popup: None,
            heal_generation: 0,
            heal_task: None,
            ready: false,
        }
    }

    pub fn state(&self, id: ListingId) -> Option<MarkerState> {
        self.states.get(&id).copied()
    }

    pub fn hovered(&self) -> Option<ListingId> {
        self.hovered
    }

    pub fn selected(&self) -> Option<ListingId> {
        self.selected
    }

    pub fn popup(&self) -> Option<&PopupSession> {
        self.popup.as_ref()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Create every marker known so far once the widget can draw them.
    pub fn mark_ready(&mut self, surface: &mut impl MarkerSurface) {
        if self.ready {
            return;
        }
        self.ready = true;

        for (id, state) in &self.states {
            if let Some(listing) = self.listings.get(id) {
                surface.create_marker(listing, *state);
            }
        }
        debug!("Rendered {} deferred markers", self.states.len());
    }

    /// Reconcile markers with a new result page.
    ///
    /// Markers are only torn down and created when the set of mapped ids
    /// changes; returns whether it did.
    pub fn on_result_set_changed(
        &mut self,
        surface: &mut impl MarkerSurface,
        results: &ResultSet,
    ) -> bool {
        let incoming: BTreeMap<ListingId, &Listing> = results
            .listings
            .iter()
            .filter(|listing| listing.coordinate.is_some())
            .map(|listing| (listing.id, listing))
            .collect();

        self.listings = incoming
            .values()
            .map(|listing| (listing.id, (*listing).clone()))
            .collect();

        if incoming.keys().eq(self.states.keys()) {
            debug!("Marker set unchanged ({} markers)", self.states.len());
            return false;
        }

        let removed: Vec<ListingId> = self
            .states
            .keys()
            .filter(|id| !incoming.contains_key(id))
            .copied()
            .collect();
        for id in &removed {
            self.states.remove(id);
            if self.ready {
                surface.remove_marker(*id);
            }
            if self.hovered == Some(*id) {
                self.hovered = None;
            }
            if self.selected == Some(*id) {
                self.selected = None;
                self.stop_heal();
                self.close_popup(surface);
            }
        }

        let mut added = 0;
        for (id, listing) in incoming {
            if self.states.contains_key(&id) {
                continue;
            }
            self.states.insert(id, MarkerState::Default);
            if self.ready {
                surface.create_marker(listing, MarkerState::Default);
            }
            added += 1;
        }

        info!("Markers updated: {} removed, {} added", removed.len(), added);
        true
    }

    pub fn set_hovered(&mut self, surface: &mut impl MarkerSurface, id: Option<ListingId>) {
        let previous = std::mem::replace(&mut self.hovered, id);
        if previous == id {
            return;
        }
        if let Some(previous) = previous {
            self.refresh(surface, previous);
        }
        if let Some(id) = id {
            self.refresh(surface, id);
        }
    }

    pub fn set_selected(&mut self, surface: &mut impl MarkerSurface, id: Option<ListingId>) {
        if self.selected == id {
            return;
        }
        if !self.ready {
            debug!("Ignoring selection before the map is ready");
            return;
        }
        if let Some(id) = id {
            if !self.states.contains_key(&id) {
                debug!("Ignoring selection of unmapped listing {}", id);
                return;
            }
        }

        let previous = std::mem::replace(&mut self.selected, id);
        self.stop_heal();
        if let Some(previous) = previous {
            self.refresh(surface, previous);
        }

        match id {
            Some(id) => {
                self.refresh(surface, id);
                self.open_popup(surface, id);
                self.start_heal();
            }
            None => self.close_popup(surface),
        }
    }

    /// The widget (or the user through it) closed the popup.
    pub fn on_popup_closed(&mut self, surface: &mut impl MarkerSurface, id: ListingId) {
        if self.selected != Some(id) {
            return;
        }
        // Already closed on the widget side
        self.popup = None;
        self.selected = None;
        self.stop_heal();
        self.refresh(surface, id);
    }

    /// Whether an action from popup content should be honoured.
    pub fn popup_allows(&self, id: ListingId, action: PopupAction) -> bool {
        self.popup
            .as_ref()
            .is_some_and(|session| session.listing_id == id && session.allows(action))
    }

    /// Refresh a listing's data, re-rendering its popup if it is open.
    pub fn update_listing(&mut self, surface: &mut impl MarkerSurface, listing: &Listing) {
        if !self.listings.contains_key(&listing.id) {
            return;
        }
        self.listings.insert(listing.id, listing.clone());
        if self.popup.as_ref().map(PopupSession::listing_id) == Some(listing.id) {
            self.open_popup(surface, listing.id);
        }
    }

    /// Self-heal check for the selected marker; returns whether the icon
    /// had to be re-asserted.
    pub fn on_heal_tick(&mut self, surface: &mut impl MarkerSurface, generation: u64) -> bool {
        if generation != self.heal_generation {
            return false;
        }
        let Some(id) = self.selected else {
            return false;
        };

        match surface.marker_icon(id) {
            Some(MarkerState::Selected) | None => false,
            Some(drawn) => {
                debug!("Marker {} drawn as {:?}, re-asserting selection", id, drawn);
                surface.set_marker_icon(id, MarkerState::Selected);
                true
            }
        }
    }

    fn desired_state(&self, id: ListingId) -> MarkerState {
        if self.selected == Some(id) {
            MarkerState::Selected
        } else if self.hovered == Some(id) {
            MarkerState::Hovered
        } else {
            MarkerState::Default
        }
    }

    fn refresh(&mut self, surface: &mut impl MarkerSurface, id: ListingId) {
        let desired = self.desired_state(id);
        let Some(state) = self.states.get_mut(&id) else {
            return;
        };
        *state = desired;
        if self.ready && surface.marker_icon(id) != Some(desired) {
            surface.set_marker_icon(id, desired);
        }
    }

    fn open_popup(&mut self, surface: &mut impl MarkerSurface, id: ListingId) {
        let Some(listing) = self.listings.get(&id) else {
            return;
        };
        let content = PopupContent::for_listing(listing, POPUP_ACTIONS.to_vec());
        self.popup = Some(PopupSession {
            listing_id: id,
            actions: content.actions.clone(),
        });
        surface.open_popup(content);
    }

    fn close_popup(&mut self, surface: &mut impl MarkerSurface) {
        if self.popup.take().is_some() && self.ready {
            surface.close_popup();
        }
    }

    fn start_heal(&mut self) {
        self.heal_generation += 1;
        let generation = self.heal_generation;
        let period = self.heal_interval;
        let start = Instant::now() + period;
        let events = self.events.clone();

        self.heal_task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if events.send(ViewEvent::HealTick { generation }).is_err() {
                    break;
                }
            }
        }));
    }

    fn stop_heal(&mut self) {
        if let Some(task) = self.heal_task.take() {
            task.abort();
        }
        // Ticks already queued for the old selection become stale
        self.heal_generation += 1;
    }
}

impl Drop for MarkerStateMachine {
    fn drop(&mut self) {
        if let Some(task) = self.heal_task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::headless::{HeadlessMap, WidgetCall};
    use crate::models::Coordinate;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn listing(id: u64) -> Listing {
        Listing {
            id: ListingId(id),
            name: format!("Stay {id}"),
            city: None,
            coordinate: Some(Coordinate::new(35.0 + id as f64 / 100.0, 129.0)),
            price: 100_000,
            review: None,
            wishlisted: false,
        }
    }

    fn page(ids: &[u64]) -> ResultSet {
        ResultSet {
            listings: ids.iter().copied().map(listing).collect(),
            current_page: 0,
            total_pages: 1,
            total_elements: ids.len() as u64,
        }
    }

    fn ready_machine(
        ids: &[u64],
    ) -> (MarkerStateMachine, HeadlessMap, UnboundedReceiver<ViewEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut machine = MarkerStateMachine::new(tx, Duration::from_millis(250));
        let mut map = HeadlessMap::new();
        machine.mark_ready(&mut map);
        machine.on_result_set_changed(&mut map, &page(ids));
        map.take_calls();
        (machine, map, rx)
    }

    fn assert_rendered(machine: &MarkerStateMachine, map: &HeadlessMap) {
        for (id, drawn) in map.markers() {
            assert_eq!(machine.state(*id), Some(*drawn), "marker {id}");
        }
        if let Some(selected) = machine.selected() {
            assert_eq!(map.marker_icon(selected), Some(MarkerState::Selected));
        }
    }

    #[tokio::test]
    async fn selection_dominates_hover() {
        let (mut machine, mut map, _rx) = ready_machine(&[1, 2, 3]);
        let id = ListingId;

        machine.set_selected(&mut map, Some(id(1)));
        machine.set_hovered(&mut map, Some(id(1)));
        assert_eq!(map.marker_icon(id(1)), Some(MarkerState::Selected));

        machine.set_hovered(&mut map, Some(id(2)));
        assert_eq!(map.marker_icon(id(2)), Some(MarkerState::Hovered));
        assert_eq!(map.marker_icon(id(1)), Some(MarkerState::Selected));

        machine.set_selected(&mut map, Some(id(2)));
        assert_eq!(map.marker_icon(id(2)), Some(MarkerState::Selected));
        assert_eq!(map.marker_icon(id(1)), Some(MarkerState::Default));

        machine.set_hovered(&mut map, None);
        assert_eq!(map.marker_icon(id(2)), Some(MarkerState::Selected));

        machine.set_hovered(&mut map, Some(id(2)));
        machine.set_selected(&mut map, None);
        assert_eq!(map.marker_icon(id(2)), Some(MarkerState::Hovered));
        assert!(map.popup().is_none());
    }

    #[tokio::test]
    async fn interleaved_pointer_events_keep_icons_consistent() {
        let (mut machine, mut map, _rx) = ready_machine(&[1, 2, 3, 4]);
        let targets = [None, Some(1), Some(2), Some(3), Some(4), Some(9)];

        for (step, hover) in targets.iter().cycle().take(40).enumerate() {
            let select = targets[(step * 7 + 3) % targets.len()];
            machine.set_hovered(&mut map, hover.map(ListingId));
            assert_rendered(&machine, &map);
            if step % 3 == 0 {
                machine.set_selected(&mut map, select.map(ListingId));
                assert_rendered(&machine, &map);
            }
        }
    }

    #[tokio::test]
    async fn identical_id_set_is_not_rebuilt() {
        let (mut machine, mut map, _rx) = ready_machine(&[1, 2, 3]);
        machine.set_selected(&mut map, Some(ListingId(2)));
        map.take_calls();

        let changed = machine.on_result_set_changed(&mut map, &page(&[3, 1, 2]));

        assert!(!changed);
        assert!(map.calls().is_empty());
        assert_eq!(map.popup().map(|p| p.listing_id), Some(ListingId(2)));
        assert!(machine.popup_allows(ListingId(2), PopupAction::OpenDetail));
    }

    #[tokio::test]
    async fn changed_id_set_diffs_markers_and_closes_stale_popup() {
        let (mut machine, mut map, _rx) = ready_machine(&[1, 2, 3]);
        machine.set_selected(&mut map, Some(ListingId(3)));
        map.take_calls();

        assert!(machine.on_result_set_changed(&mut map, &page(&[1, 2, 4])));

        let calls = map.take_calls();
        assert!(calls.contains(&WidgetCall::RemoveMarker(ListingId(3))));
        assert!(calls.contains(&WidgetCall::CreateMarker(ListingId(4))));
        assert!(calls.contains(&WidgetCall::ClosePopup));
        assert!(!calls.contains(&WidgetCall::RemoveMarker(ListingId(1))));
        assert_eq!(machine.selected(), None);
        assert!(!machine.popup_allows(ListingId(3), PopupAction::OpenDetail));
        assert_eq!(machine.len(), 3);
    }

    #[tokio::test]
    async fn popup_closed_by_widget_restores_hover() {
        let (mut machine, mut map, _rx) = ready_machine(&[1, 2]);
        machine.set_hovered(&mut map, Some(ListingId(1)));
        machine.set_selected(&mut map, Some(ListingId(1)));
        map.take_calls();

        machine.on_popup_closed(&mut map, ListingId(1));

        assert_eq!(map.marker_icon(ListingId(1)), Some(MarkerState::Hovered));
        assert!(!map.calls().contains(&WidgetCall::ClosePopup));
        assert!(machine.popup().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn selected_icon_heals_after_widget_reset() {
        let (mut machine, mut map, mut rx) = ready_machine(&[1, 2]);
        machine.set_selected(&mut map, Some(ListingId(1)));
        map.reset_icon(ListingId(1));

        tokio::time::advance(Duration::from_millis(250)).await;
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
        let generation = match rx.try_recv() {
            Ok(ViewEvent::HealTick { generation }) => generation,
            other => panic!("expected heal tick, got {other:?}"),
        };

        assert!(machine.on_heal_tick(&mut map, generation));
        assert_eq!(map.marker_icon(ListingId(1)), Some(MarkerState::Selected));
        assert!(!machine.on_heal_tick(&mut map, generation));

        machine.set_selected(&mut map, None);
        map.reset_icon(ListingId(1));
        assert!(!machine.on_heal_tick(&mut map, generation));
    }

    #[test]
    fn markers_wait_for_the_widget() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut machine = MarkerStateMachine::new(tx, Duration::from_millis(250));
        let mut map = HeadlessMap::new();

        machine.on_result_set_changed(&mut map, &page(&[1, 2]));
        assert!(map.markers().is_empty());

        machine.mark_ready(&mut map);
        assert_eq!(map.markers().len(), 2);
    }
}
