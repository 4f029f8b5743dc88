use std::collections::BTreeMap;

use tracing::debug;

use crate::map::widget::{CameraSurface, MarkerState, MarkerSurface, PopupContent};
use crate::models::{Coordinate, Listing, ListingId, Viewport};

/// Degrees of latitude visible at zoom 0; halved per zoom level.
const WORLD_SPAN: f64 = 180.0;

/// A call the controller made against the widget
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetCall {
    FitBounds(Viewport, u32),
    SetCenter(Coordinate),
    SetZoom(u8),
    CreateMarker(ListingId),
    RemoveMarker(ListingId),
    SetIcon(ListingId, MarkerState),
    OpenPopup(ListingId),
    ClosePopup,
}

/// Map widget without a screen: keeps camera, markers and popup in memory
/// and records every command it receives.
#[derive(Debug, Default)]
pub struct HeadlessMap {
    camera: Option<Viewport>,
    center: Option<Coordinate>,
    zoom: u8,
    markers: BTreeMap<ListingId, MarkerState>,
    popup: Option<PopupContent>,
    calls: Vec<WidgetCall>,
}

impl HeadlessMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a camera already laid out.
    pub fn with_camera(bounds: Viewport) -> Self {
        Self {
            camera: Some(bounds),
            center: Some(bounds.center()),
            ..Self::default()
        }
    }

    /// User drag/zoom: moves the camera without it counting as a command.
    pub fn pan_to(&mut self, bounds: Viewport) {
        self.camera = Some(bounds);
        self.center = Some(bounds.center());
    }

    /// Widget-side icon reset, as happens after an internal re-layout.
    pub fn reset_icon(&mut self, id: ListingId) {
        if let Some(icon) = self.markers.get_mut(&id) {
            *icon = MarkerState::Default;
        }
    }

    pub fn markers(&self) -> &BTreeMap<ListingId, MarkerState> {
        &self.markers
    }

    pub fn popup(&self) -> Option<&PopupContent> {
        self.popup.as_ref()
    }

    pub fn calls(&self) -> &[WidgetCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<WidgetCall> {
        std::mem::take(&mut self.calls)
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    fn recenter(&mut self) {
        if let Some(center) = self.center {
            let half = WORLD_SPAN / 2f64.powi(i32::from(self.zoom)) / 2.0;
            self.camera = Some(Viewport::new(
                (center.latitude + half).min(90.0),
                (center.latitude - half).max(-90.0),
                (center.longitude + half).min(180.0),
                (center.longitude - half).max(-180.0),
            ));
        }
    }
}

impl CameraSurface for HeadlessMap {
    fn bounds(&self) -> Option<Viewport> {
        self.camera
    }

    fn fit_bounds(&mut self, bounds: Viewport, padding: u32) {
        debug!("Headless map fitting {:?}", bounds);
        self.calls.push(WidgetCall::FitBounds(bounds, padding));
        self.camera = Some(bounds);
        self.center = Some(bounds.center());
    }

    fn set_center(&mut self, center: Coordinate) {
        self.calls.push(WidgetCall::SetCenter(center));
        self.center = Some(center);
        self.recenter();
    }

    fn set_zoom(&mut self, zoom: u8) {
        self.calls.push(WidgetCall::SetZoom(zoom));
        self.zoom = zoom;
        self.recenter();
    }
}

impl MarkerSurface for HeadlessMap {
    fn create_marker(&mut self, listing: &Listing, icon: MarkerState) {
        self.calls.push(WidgetCall::CreateMarker(listing.id));
        self.markers.insert(listing.id, icon);
    }

    fn remove_marker(&mut self, id: ListingId) {
        self.calls.push(WidgetCall::RemoveMarker(id));
        self.markers.remove(&id);
    }

    fn set_marker_icon(&mut self, id: ListingId, icon: MarkerState) {
        self.calls.push(WidgetCall::SetIcon(id, icon));
        if let Some(current) = self.markers.get_mut(&id) {
            *current = icon;
        }
    }

    fn marker_icon(&self, id: ListingId) -> Option<MarkerState> {
        self.markers.get(&id).copied()
    }

    fn open_popup(&mut self, content: PopupContent) {
        self.calls.push(WidgetCall::OpenPopup(content.listing_id));
        self.popup = Some(content);
    }

    fn close_popup(&mut self) {
        self.calls.push(WidgetCall::ClosePopup);
        self.popup = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_and_zoom_produces_a_camera() {
        let mut map = HeadlessMap::new();
        map.set_center(Coordinate::new(35.0, 129.0));
        map.set_zoom(8);

        let bounds = map.bounds().unwrap();
        assert!(bounds.contains(&Coordinate::new(35.0, 129.0)));
        assert!(bounds.north - bounds.south < 1.0);
        assert_eq!(map.calls().len(), 2);
    }

    #[test]
    fn user_pan_is_not_recorded_as_a_command() {
        let mut map = HeadlessMap::new();
        map.pan_to(Viewport::new(1.0, 0.0, 1.0, 0.0));
        assert!(map.calls().is_empty());
        assert_eq!(map.bounds(), Some(Viewport::new(1.0, 0.0, 1.0, 0.0)));
    }
}
