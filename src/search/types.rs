use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Listing, SearchQuery, Viewport};

/// Default number of listings per page
pub const DEFAULT_PAGE_SIZE: u32 = 18;

/// Wire request sent to the search backend.
///
/// Exactly one of `destination_text` and the viewport corners is populated;
/// the viewport wins whenever the query carries one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub north: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub south: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub east: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub west: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_in: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_out: Option<NaiveDate>,
    pub adults: u32,
    pub children: u32,
    pub infants: u32,
    pub pets: u32,
    pub page: u32,
    pub page_size: u32,
}

impl SearchRequest {
    pub fn from_query(query: &SearchQuery, page_size: u32) -> Self {
        let (destination_text, viewport) = match query.viewport {
            Some(viewport) => (None, Some(viewport)),
            None => (query.destination.clone(), None),
        };

        Self {
            destination_text,
            north: viewport.map(|v| v.north),
            south: viewport.map(|v| v.south),
            east: viewport.map(|v| v.east),
            west: viewport.map(|v| v.west),
            check_in: query.check_in,
            check_out: query.check_out,
            adults: query.occupancy.adults,
            children: query.occupancy.children,
            infants: query.occupancy.infants,
            pets: query.occupancy.pets,
            page: query.page,
            page_size,
        }
    }

    pub fn viewport(&self) -> Option<Viewport> {
        match (self.north, self.south, self.east, self.west) {
            (Some(north), Some(south), Some(east), Some(west)) => {
                Some(Viewport::new(north, south, east, west))
            }
            _ => None,
        }
    }
}

/// Wire response for one page of listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub listings: Vec<Listing>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_elements: u64,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("search backend returned status {status}")]
    Status { status: u16 },

    #[error("failed to decode search response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("search backend error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_takes_precedence_over_destination_text() {
        let query = SearchQuery {
            destination: Some("Seoul".to_string()),
            viewport: Some(Viewport::new(37.7, 37.4, 127.2, 126.8)),
            ..SearchQuery::default()
        };
        let request = SearchRequest::from_query(&query, DEFAULT_PAGE_SIZE);

        assert_eq!(request.destination_text, None);
        assert_eq!(request.viewport(), query.viewport);

        let text_only = SearchQuery {
            viewport: None,
            ..query
        };
        let request = SearchRequest::from_query(&text_only, DEFAULT_PAGE_SIZE);
        assert_eq!(request.destination_text.as_deref(), Some("Seoul"));
        assert_eq!(request.viewport(), None);
    }

    #[test]
    fn request_serializes_camel_case_without_empty_fields() {
        let request = SearchRequest::from_query(&SearchQuery::default(), 18);
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["pageSize"], 18);
        assert_eq!(json["adults"], 1);
        assert!(json.get("destinationText").is_none());
        assert!(json.get("north").is_none());
    }
}
