use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Hard cap on the number of result pages exposed to the UI.
pub const MAX_PAGES: u32 = 15;

/// Highest zero-based page index a query may carry.
pub const MAX_PAGE_INDEX: u32 = MAX_PAGES - 1;

/// Identifier of a listing as assigned by the search backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub u64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A WGS84 point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Visible map rectangle in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Viewport {
    pub const fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// A viewport is usable when every edge is a finite in-range degree
    /// value and north lies above south.
    pub fn is_valid(&self) -> bool {
        let edges = [self.north, self.south, self.east, self.west];
        edges.iter().all(|edge| edge.is_finite())
            && (-90.0..=90.0).contains(&self.north)
            && (-90.0..=90.0).contains(&self.south)
            && (-180.0..=180.0).contains(&self.east)
            && (-180.0..=180.0).contains(&self.west)
            && self.north > self.south
    }

    /// True when any edge moved by at least `epsilon` degrees.
    ///
    /// Widgets report bounds with rounding noise after every settle, so
    /// anything below the threshold on all four edges counts as the same view.
    pub fn differs_from(&self, other: &Viewport, epsilon: f64) -> bool {
        (self.north - other.north).abs() >= epsilon
            || (self.south - other.south).abs() >= epsilon
            || (self.east - other.east).abs() >= epsilon
            || (self.west - other.west).abs() >= epsilon
    }

    pub fn contains(&self, point: &Coordinate) -> bool {
        let within_lat = point.latitude <= self.north && point.latitude >= self.south;
        let within_lng = if self.west <= self.east {
            point.longitude >= self.west && point.longitude <= self.east
        } else {
            // Crosses the antimeridian
            point.longitude >= self.west || point.longitude <= self.east
        };
        within_lat && within_lng
    }

    /// Smallest rectangle enclosing every point, or `None` for no points.
    pub fn enclosing<'a, I>(points: I) -> Option<Viewport>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        points.into_iter().fold(None, |acc, point| {
            Some(match acc {
                None => Viewport::new(
                    point.latitude,
                    point.latitude,
                    point.longitude,
                    point.longitude,
                ),
                Some(bounds) => Viewport::new(
                    bounds.north.max(point.latitude),
                    bounds.south.min(point.latitude),
                    bounds.east.max(point.longitude),
                    bounds.west.min(point.longitude),
                ),
            })
        })
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.north + self.south) / 2.0,
            (self.east + self.west) / 2.0,
        )
    }
}

/// Aggregated guest reviews for a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub average: f32,
    pub count: u32,
}

/// A bookable listing as returned by the search backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    pub id: ListingId,
    pub name: String,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    /// Nightly price in the backend's currency minor-free units
    pub price: i64,
    #[serde(default)]
    pub review: Option<ReviewSummary>,
    #[serde(default)]
    pub wishlisted: bool,
}

/// Party size for a stay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occupancy {
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    pub pets: u32,
}

impl Default for Occupancy {
    fn default() -> Self {
        Self {
            adults: 1,
            children: 0,
            infants: 0,
            pets: 0,
        }
    }
}

/// Parsed view of the persisted search parameters.
///
/// Never the only copy of truth: it is re-derived from the parameter set on
/// every navigation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Free-text destination as typed or picked by the user
    pub destination: Option<String>,
    /// Center of the picked place, if the pick carried one
    pub location: Option<Coordinate>,
    /// Explicit camera rectangle; takes precedence over `destination` when fetching
    pub viewport: Option<Viewport>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
    pub occupancy: Occupancy,
    /// Zero-based page index, at most [`MAX_PAGE_INDEX`]
    pub page: u32,
}

impl SearchQuery {
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.min(MAX_PAGE_INDEX);
        self
    }

    /// True when everything except the page index is identical.
    pub fn same_filters(&self, other: &SearchQuery) -> bool {
        self.destination == other.destination
            && self.location == other.location
            && self.viewport == other.viewport
            && self.check_in == other.check_in
            && self.check_out == other.check_out
            && self.occupancy == other.occupancy
    }

    /// A destination pick that also carried the place's own viewport.
    pub fn place_viewport(&self) -> Option<Viewport> {
        self.destination.as_ref().and(self.viewport)
    }
}

/// One page of search results, replaced wholesale on every successful fetch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSet {
    pub listings: Vec<Listing>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_elements: u64,
}

impl ResultSet {
    /// Builds a result page, clamping page metadata to `max_pages`.
    pub fn clamped(
        listings: Vec<Listing>,
        current_page: u32,
        total_pages: u32,
        total_elements: u64,
        max_pages: u32,
    ) -> Self {
        let total_pages = total_pages.min(max_pages);
        let current_page = current_page.min(total_pages.saturating_sub(1));
        Self {
            listings,
            current_page,
            total_pages,
            total_elements,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Ids of listings that can be placed on the map.
    pub fn mapped_ids(&self) -> BTreeSet<ListingId> {
        self.listings
            .iter()
            .filter(|listing| listing.coordinate.is_some())
            .map(|listing| listing.id)
            .collect()
    }

    pub fn coordinates(&self) -> Vec<Coordinate> {
        self.listings
            .iter()
            .filter_map(|listing| listing.coordinate)
            .collect()
    }

    pub fn listing(&self, id: ListingId) -> Option<&Listing> {
        self.listings.iter().find(|listing| listing.id == id)
    }

    pub fn listing_mut(&mut self, id: ListingId) -> Option<&mut Listing> {
        self.listings.iter_mut().find(|listing| listing.id == id)
    }

    pub fn has_next(&self) -> bool {
        self.current_page + 1 < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_edge_moves_are_not_material() {
        let before = Viewport::new(37.7, 37.4, 127.2, 126.8);
        let jitter = Viewport::new(37.7004, 37.3999, 127.2009, 126.8);
        let moved = Viewport::new(37.7, 37.4, 127.2015, 126.8);

        assert!(!jitter.differs_from(&before, 0.001));
        assert!(moved.differs_from(&before, 0.001));
    }

    #[test]
    fn enclosing_covers_all_points() {
        let points = [
            Coordinate::new(35.1, 129.0),
            Coordinate::new(35.2, 129.2),
            Coordinate::new(35.15, 128.9),
        ];
        let bounds = Viewport::enclosing(&points).unwrap();
        assert_eq!(bounds, Viewport::new(35.2, 35.1, 129.2, 128.9));
        assert!(points.iter().all(|p| bounds.contains(p)));
        assert!(Viewport::enclosing(std::iter::empty::<&Coordinate>()).is_none());
    }

    #[test]
    fn result_pages_are_clamped_to_cap() {
        let set = ResultSet::clamped(vec![], 40, 120, 2_000, MAX_PAGES);
        assert_eq!(set.total_pages, 15);
        assert_eq!(set.current_page, 14);
        assert!(!set.has_next());
        assert!(set.has_previous());

        let empty = ResultSet::clamped(vec![], 3, 0, 0, MAX_PAGES);
        assert_eq!(empty.current_page, 0);
    }

    #[test]
    fn page_changes_keep_filters_equal() {
        let query = SearchQuery {
            destination: Some("Busan".to_string()),
            ..SearchQuery::default()
        };
        let next = query.clone().with_page(99);
        assert_eq!(next.page, MAX_PAGE_INDEX);
        assert!(query.same_filters(&next));
        assert_ne!(query, next);
    }
}
