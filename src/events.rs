//! Events flowing into the view-sync controller and effects flowing out to
//! the host application.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::ListingId;
use crate::query::ParamSet;
use crate::search::{FetchTicket, SearchError, SearchResponse};

/// What started the current search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchMode {
    /// The user panned or zoomed the map
    CameraDriven,
    /// The user picked or typed a destination
    DestinationDriven,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::CameraDriven => f.write_str("camera-driven"),
            SearchMode::DestinationDriven => f.write_str("destination-driven"),
        }
    }
}

/// Actions a listing popup can invoke while it is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PopupAction {
    OpenDetail,
    ToggleWishlist,
}

#[derive(Debug)]
pub enum ViewEvent {
    /// The map widget finished loading and accepts commands.
    WidgetReady,
    /// The persisted parameter set changed (form submit, back/forward, shared link).
    Navigated(ParamSet),
    /// The user asked for another result page.
    PageRequested(u32),
    /// The widget reported that camera motion stopped.
    CameraIdle,
    /// Internal: the settle debounce elapsed.
    SettleElapsed { generation: u64 },
    /// Internal: a backend call finished.
    FetchCompleted {
        ticket: FetchTicket,
        outcome: Result<SearchResponse, SearchError>,
    },
    MarkerHovered(Option<ListingId>),
    MarkerClicked(ListingId),
    /// The widget or the user closed the popup bound to a listing.
    PopupClosed(ListingId),
    PopupAction {
        listing_id: ListingId,
        action: PopupAction,
    },
    /// Internal: periodic check of the selected marker's icon.
    HealTick { generation: u64 },
    AuthChanged(bool),
    DismissError,
    /// Re-issue the search whose fetch last failed.
    Retry,
}

/// Side effects the host applies on the controller's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEffect {
    /// Write the canonical parameter set (replacing the current URL state).
    ReplaceParams(ParamSet),
    /// A new result page is available for the list view.
    ResultsChanged,
    ShowError(String),
    ClearError,
    OpenListing(ListingId),
    ToggleWishlist { listing_id: ListingId, wishlisted: bool },
    RequireLogin,
}
