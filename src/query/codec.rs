//! Mapping between [`SearchQuery`] and the persisted [`ParamSet`].
//!
//! Decoding is total: absent or malformed values fall back to defaults and
//! unknown keys are ignored, so callers never handle a parse error.

use std::str::FromStr;

use chrono::NaiveDate;

use crate::models::{Coordinate, Occupancy, SearchQuery, Viewport, MAX_PAGE_INDEX};
use crate::query::params::ParamSet;

pub const DESTINATION: &str = "destination";
pub const LAT: &str = "lat";
pub const LNG: &str = "lng";
pub const NORTH: &str = "north";
pub const SOUTH: &str = "south";
pub const EAST: &str = "east";
pub const WEST: &str = "west";
pub const CHECK_IN: &str = "checkIn";
pub const CHECK_OUT: &str = "checkOut";
pub const ADULTS: &str = "adults";
pub const CHILDREN: &str = "children";
pub const INFANTS: &str = "infants";
pub const PETS: &str = "pets";
pub const PAGE: &str = "page";

/// Every key owned by the codec.
pub const RECOGNIZED_KEYS: [&str; 14] = [
    DESTINATION,
    LAT,
    LNG,
    NORTH,
    SOUTH,
    EAST,
    WEST,
    CHECK_IN,
    CHECK_OUT,
    ADULTS,
    CHILDREN,
    INFANTS,
    PETS,
    PAGE,
];

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn decode(params: &ParamSet) -> SearchQuery {
    let destination = params
        .get(DESTINATION)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned);

    let location = match (parse::<f64>(params, LAT), parse::<f64>(params, LNG)) {
        (Some(latitude), Some(longitude)) => {
            Some(Coordinate::new(latitude, longitude)).filter(Coordinate::is_valid)
        }
        _ => None,
    };

    let viewport = match (
        parse::<f64>(params, NORTH),
        parse::<f64>(params, SOUTH),
        parse::<f64>(params, EAST),
        parse::<f64>(params, WEST),
    ) {
        (Some(north), Some(south), Some(east), Some(west)) => {
            Some(Viewport::new(north, south, east, west)).filter(Viewport::is_valid)
        }
        _ => None,
    };

    let mut check_in = parse_date(params, CHECK_IN);
    let mut check_out = parse_date(params, CHECK_OUT);
    if let (Some(start), Some(end)) = (check_in, check_out) {
        if end <= start {
            check_in = None;
            check_out = None;
        }
    }

    let occupancy = Occupancy {
        adults: parse::<u32>(params, ADULTS).filter(|n| *n >= 1).unwrap_or(1),
        children: parse(params, CHILDREN).unwrap_or(0),
        infants: parse(params, INFANTS).unwrap_or(0),
        pets: parse(params, PETS).unwrap_or(0),
    };

    let page = parse::<u32>(params, PAGE)
        .unwrap_or(0)
        .min(MAX_PAGE_INDEX);

    SearchQuery {
        destination,
        location,
        viewport,
        check_in,
        check_out,
        occupancy,
        page,
    }
}

/// Render only the recognised fields; defaults are left out.
pub fn encode(query: &SearchQuery) -> ParamSet {
    let mut params = ParamSet::new();

    if let Some(destination) = query.destination.as_deref().filter(|d| !d.is_empty()) {
        params.set(DESTINATION, destination);
    }
    if let Some(location) = query.location {
        params.set(LAT, location.latitude.to_string());
        params.set(LNG, location.longitude.to_string());
    }
    if let Some(viewport) = query.viewport {
        params.set(NORTH, viewport.north.to_string());
        params.set(SOUTH, viewport.south.to_string());
        params.set(EAST, viewport.east.to_string());
        params.set(WEST, viewport.west.to_string());
    }
    if let Some(check_in) = query.check_in {
        params.set(CHECK_IN, check_in.format(DATE_FORMAT).to_string());
    }
    if let Some(check_out) = query.check_out {
        params.set(CHECK_OUT, check_out.format(DATE_FORMAT).to_string());
    }

    let occupancy = query.occupancy;
    params.set(ADULTS, occupancy.adults.max(1).to_string());
    for (key, count) in [
        (CHILDREN, occupancy.children),
        (INFANTS, occupancy.infants),
        (PETS, occupancy.pets),
    ] {
        if count > 0 {
            params.set(key, count.to_string());
        }
    }

    if query.page > 0 {
        params.set(PAGE, query.page.min(MAX_PAGE_INDEX).to_string());
    }

    params
}

/// Write `query` over `base`, replacing every recognised key and keeping
/// the rest of `base` untouched.
pub fn merge_into(query: &SearchQuery, base: &ParamSet) -> ParamSet {
    let mut merged = base.clone();
    for key in RECOGNIZED_KEYS {
        merged.remove(key);
    }
    for (key, value) in encode(query).iter() {
        merged.set(key, value);
    }
    merged
}

fn parse<T: FromStr>(params: &ParamSet, key: &str) -> Option<T> {
    params.get(key).and_then(|raw| raw.trim().parse().ok())
}

fn parse_date(params: &ParamSet, key: &str) -> Option<NaiveDate> {
    params
        .get(key)
        .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_destination_with_place_viewport() {
        let params = ParamSet::parse(
            "destination=Seoul&north=37.7&south=37.4&east=127.2&west=126.8&adults=2&page=0",
        );
        let query = decode(&params);

        assert_eq!(query.destination.as_deref(), Some("Seoul"));
        assert_eq!(query.viewport, Some(Viewport::new(37.7, 37.4, 127.2, 126.8)));
        assert_eq!(query.occupancy.adults, 2);
        assert_eq!(query.occupancy.children, 0);
        assert_eq!(query.page, 0);
        assert_eq!(query.place_viewport(), query.viewport);
    }

    #[test]
    fn malformed_values_fall_back_to_defaults() {
        let params = ParamSet::parse(
            "adults=0&children=-3&pets=lots&page=abc&north=91&south=1&east=2&west=1&lat=37.5",
        );
        let query = decode(&params);

        assert_eq!(query.occupancy, Occupancy::default());
        assert_eq!(query.page, 0);
        assert_eq!(query.viewport, None);
        assert_eq!(query.location, None);
    }

    #[test]
    fn inverted_stay_dates_are_dropped() {
        let params = ParamSet::parse("checkIn=2026-05-10&checkOut=2026-05-10");
        let query = decode(&params);
        assert_eq!(query.check_in, None);
        assert_eq!(query.check_out, None);

        let params = ParamSet::parse("checkIn=2026-05-10&checkOut=2026-05-12");
        let query = decode(&params);
        assert_eq!(query.check_in, NaiveDate::from_ymd_opt(2026, 5, 10));
        assert_eq!(query.check_out, NaiveDate::from_ymd_opt(2026, 5, 12));
    }

    #[test]
    fn page_is_capped() {
        let query = decode(&ParamSet::parse("page=500"));
        assert_eq!(query.page, MAX_PAGE_INDEX);
    }

    #[test]
    fn encode_then_decode_preserves_a_full_query() {
        let query = SearchQuery {
            destination: Some("Busan".to_string()),
            location: Some(Coordinate::new(35.1796, 129.0756)),
            viewport: Some(Viewport::new(35.39, 34.88, 129.31, 128.76)),
            check_in: NaiveDate::from_ymd_opt(2026, 7, 1),
            check_out: NaiveDate::from_ymd_opt(2026, 7, 4),
            occupancy: Occupancy {
                adults: 2,
                children: 1,
                infants: 0,
                pets: 1,
            },
            page: 3,
        };

        assert_eq!(decode(&encode(&query)), query);
    }

    #[test]
    fn merge_keeps_foreign_keys_and_drops_stale_ones() {
        let base =
            ParamSet::parse("ref=home&destination=Seoul&page=2&north=1&south=0&east=1&west=0");
        let query = SearchQuery {
            destination: Some("Busan".to_string()),
            ..SearchQuery::default()
        };
        let merged = merge_into(&query, &base);

        assert_eq!(merged.get("ref"), Some("home"));
        assert_eq!(merged.get(DESTINATION), Some("Busan"));
        assert!(!merged.contains(PAGE));
        assert!(!merged.contains(NORTH));
        assert_eq!(decode(&merged), query);
    }
}
