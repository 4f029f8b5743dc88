use crate::models::{Coordinate, Listing, ListingId, ReviewSummary};
use crate::search::traits::SearchBackend;
use crate::search::types::{SearchError, SearchRequest, SearchResponse};
use async_trait::async_trait;
use tracing::{debug, info};

/// id, name, city, latitude, longitude, nightly price, (rating, reviews)
type SampleRow = (u64, &'static str, &'static str, f64, f64, i64, Option<(f32, u32)>);

const SAMPLE_STAYS: &[SampleRow] = &[
    (101, "Bukchon Hanok Stay", "Seoul", 37.5826, 126.9836, 142_000, Some((4.9, 212))),
    (102, "Hongdae Loft", "Seoul", 37.5563, 126.9236, 89_000, Some((4.6, 98))),
    (103, "Gangnam Studio", "Seoul", 37.4979, 127.0276, 118_000, Some((4.7, 154))),
    (104, "Seongsu Warehouse Flat", "Seoul", 37.5446, 127.0557, 131_000, None),
    (105, "Itaewon Rooftop Room", "Seoul", 37.5345, 126.9946, 97_000, Some((4.4, 61))),
    (201, "Haeundae Ocean View", "Busan", 35.1587, 129.1604, 165_000, Some((4.8, 301))),
    (202, "Gwangalli Bridge Suite", "Busan", 35.1532, 129.1186, 154_000, Some((4.7, 188))),
    (203, "Gamcheon Village House", "Busan", 35.0975, 129.0106, 76_000, Some((4.5, 77))),
    (204, "Seomyeon Business Room", "Busan", 35.1578, 129.0600, 68_000, None),
];

fn sample_stay(row: &SampleRow) -> Listing {
    let &(id, name, city, lat, lng, price, rating) = row;
    Listing {
        id: ListingId(id),
        name: name.to_string(),
        city: Some(city.to_string()),
        coordinate: Some(Coordinate::new(lat, lng)),
        price,
        review: rating.map(|(average, count)| ReviewSummary { average, count }),
        wishlisted: false,
    }
}

/// In-memory search backend over a fixed catalogue of listings
#[derive(Debug, Clone, Default)]
pub struct StaticBackend {
    listings: Vec<Listing>,
}

impl StaticBackend {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self { listings }
    }

    /// Built-in catalogue of Seoul and Busan stays, used when no API is configured
    pub fn sample() -> Self {
        info!("📋 Using built-in sample catalogue");

        Self::new(SAMPLE_STAYS.iter().map(sample_stay).collect())
    }

    fn matches(listing: &Listing, request: &SearchRequest) -> bool {
        if let Some(viewport) = request.viewport() {
            return listing
                .coordinate
                .map(|point| viewport.contains(&point))
                .unwrap_or(false);
        }

        match request.destination_text.as_deref() {
            Some(text) => {
                let needle = text.to_lowercase();
                listing.name.to_lowercase().contains(&needle)
                    || listing
                        .city
                        .as_deref()
                        .map(|city| city.to_lowercase().contains(&needle))
                        .unwrap_or(false)
            }
            None => true,
        }
    }
}

#[async_trait]
impl SearchBackend for StaticBackend {
    async fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let matching: Vec<&Listing> = self
            .listings
            .iter()
            .filter(|listing| Self::matches(listing, request))
            .collect();

        let page_size = request.page_size.max(1) as usize;
        let total_elements = matching.len() as u64;
        let total_pages = matching.len().div_ceil(page_size) as u32;

        let listings = matching
            .into_iter()
            .skip(request.page as usize * page_size)
            .take(page_size)
            .cloned()
            .collect::<Vec<_>>();

        debug!(
            "Catalogue matched {} listings, returning {} on page {}",
            total_elements,
            listings.len(),
            request.page
        );

        Ok(SearchResponse {
            listings,
            current_page: request.page,
            total_pages,
            total_elements,
        })
    }

    fn backend_name(&self) -> &'static str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SearchQuery, Viewport};

    #[tokio::test]
    async fn viewport_filters_the_catalogue() {
        let backend = StaticBackend::sample();
        let query = SearchQuery {
            destination: Some("Busan".to_string()),
            viewport: Some(Viewport::new(37.7, 37.4, 127.2, 126.8)),
            ..SearchQuery::default()
        };
        let response = backend
            .search(&SearchRequest::from_query(&query, 18))
            .await
            .unwrap();

        assert_eq!(response.total_elements, 5);
        assert!(response
            .listings
            .iter()
            .all(|listing| listing.city.as_deref() == Some("Seoul")));
    }

    #[tokio::test]
    async fn destination_text_is_paginated() {
        let backend = StaticBackend::sample();
        let query = SearchQuery {
            destination: Some("busan".to_string()),
            page: 1,
            ..SearchQuery::default()
        };
        let response = backend
            .search(&SearchRequest::from_query(&query, 3))
            .await
            .unwrap();

        assert_eq!(response.total_elements, 4);
        assert_eq!(response.total_pages, 2);
        assert_eq!(response.current_page, 1);
        assert_eq!(response.listings.len(), 1);
        assert_eq!(response.listings[0].id, ListingId(204));
    }
}
