//! Capability traits for the externally owned map widget.
//!
//! The widget is split into a camera half and a marker half so that the
//! viewport bridge can only be handed the camera and the marker state
//! machine can only be handed the markers.

use serde::{Deserialize, Serialize};

use crate::events::PopupAction;
use crate::models::{Coordinate, Listing, ListingId, Viewport};

/// Visual state of a listing marker, which is also the icon style drawn for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarkerState {
    Default,
    Hovered,
    Selected,
}

/// Programmatic camera move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraTarget {
    FitBounds { bounds: Viewport, padding: u32 },
    CenterAndZoom { center: Coordinate, zoom: u8 },
}

/// What a listing popup shows and which actions its content may invoke.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub listing_id: ListingId,
    pub title: String,
    pub price: i64,
    pub rating: Option<f32>,
    pub wishlisted: bool,
    pub actions: Vec<PopupAction>,
}

impl PopupContent {
    pub fn for_listing(listing: &Listing, actions: Vec<PopupAction>) -> Self {
        Self {
            listing_id: listing.id,
            title: listing.name.clone(),
            price: listing.price,
            rating: listing.review.as_ref().map(|review| review.average),
            wishlisted: listing.wishlisted,
            actions,
        }
    }
}

pub trait CameraSurface {
    /// Current visible bounds, if the widget has laid out a camera yet.
    fn bounds(&self) -> Option<Viewport>;

    fn fit_bounds(&mut self, bounds: Viewport, padding: u32);

    fn set_center(&mut self, center: Coordinate);

    fn set_zoom(&mut self, zoom: u8);
}

pub trait MarkerSurface {
    fn create_marker(&mut self, listing: &Listing, icon: MarkerState);

    fn remove_marker(&mut self, id: ListingId);

    fn set_marker_icon(&mut self, id: ListingId, icon: MarkerState);

    /// Icon the widget is actually drawing, which may differ from the last
    /// one set if the widget reset it on its own.
    fn marker_icon(&self, id: ListingId) -> Option<MarkerState>;

    fn open_popup(&mut self, content: PopupContent);

    fn close_popup(&mut self);
}

/// A complete map widget.
pub trait MapWidget: CameraSurface + MarkerSurface {}

impl<T: CameraSurface + MarkerSurface> MapWidget for T {}
