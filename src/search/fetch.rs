use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn};

use crate::events::{SearchMode, ViewEvent};
use crate::models::{ListingId, ResultSet, SearchQuery};
use crate::search::traits::SearchBackend;
use crate::search::types::{SearchError, SearchRequest, SearchResponse};

/// Identifies one issued request by the query that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchTicket {
    pub generation: u64,
    pub query: SearchQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    Applied { query: SearchQuery, mode: SearchMode },
    Failed { query: SearchQuery, message: String },
    /// The response belongs to a query that is no longer current.
    Stale,
}

#[derive(Debug)]
struct InFlight {
    ticket: FetchTicket,
    mode: SearchMode,
}

/// Issues backend searches and owns the current [`ResultSet`].
///
/// Responses are matched against the in-flight request by query identity,
/// so a late answer for a superseded query is dropped regardless of the
/// order in which responses arrive.
pub struct FetchCoordinator {
    backend: Arc<dyn SearchBackend>,
    events: UnboundedSender<ViewEvent>,
    page_size: u32,
    max_pages: u32,
    generation: u64,
    in_flight: Option<InFlight>,
    last_requested: Option<SearchQuery>,
    applied: Option<SearchQuery>,
    results: ResultSet,
    error: Option<String>,
    failed: Option<(SearchQuery, SearchMode)>,
}

impl FetchCoordinator {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        events: UnboundedSender<ViewEvent>,
        page_size: u32,
        max_pages: u32,
    ) -> Self {
        Self {
            backend,
            events,
            page_size,
            max_pages,
            generation: 0,
            in_flight: None,
            last_requested: None,
            applied: None,
            results: ResultSet::default(),
            error: None,
            failed: None,
        }
    }

    /// Start a search and return the query actually requested.
    ///
    /// When anything but the page differs from the previous request the page
    /// is forced back to 0. The backend call runs as a separate task and
    /// reports back through [`ViewEvent::FetchCompleted`].
    pub fn search(&mut self, query: SearchQuery, mode: SearchMode) -> SearchQuery {
        self.failed = None;
        let query = match &self.last_requested {
            Some(previous) if query.page > 0 && !previous.same_filters(&query) => {
                info!("Search filters changed, resetting page {} to 0", query.page);
                query.with_page(0)
            }
            _ => query,
        };

        self.generation += 1;
        let ticket = FetchTicket {
            generation: self.generation,
            query: query.clone(),
        };
        let request = SearchRequest::from_query(&query, self.page_size);

        info!(
            %mode,
            page = request.page,
            by_viewport = request.viewport().is_some(),
            "Searching {} (request #{})",
            self.backend.backend_name(),
            ticket.generation
        );

        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        let task_ticket = ticket.clone();
        tokio::spawn(async move {
            let outcome = backend.search(&request).await;
            let _ = events.send(ViewEvent::FetchCompleted {
                ticket: task_ticket,
                outcome,
            });
        });

        self.in_flight = Some(InFlight { ticket, mode });
        self.last_requested = Some(query.clone());
        query
    }

    /// Re-issue the query whose fetch last failed, if any.
    pub fn retry(&mut self) -> Option<SearchQuery> {
        let (query, mode) = self.failed.take()?;
        info!("Retrying failed search");
        Some(self.search(query, mode))
    }

    pub fn apply(
        &mut self,
        ticket: FetchTicket,
        outcome: Result<SearchResponse, SearchError>,
    ) -> FetchOutcome {
        let mode = match self.in_flight.take() {
            Some(current) if current.ticket.query == ticket.query => current.mode,
            other => {
                self.in_flight = other;
                warn!(
                    "Dropping response for superseded request #{}",
                    ticket.generation
                );
                return FetchOutcome::Stale;
            }
        };

        match outcome {
            Ok(response) => {
                self.results = ResultSet::clamped(
                    response.listings,
                    response.current_page,
                    response.total_pages,
                    response.total_elements,
                    self.max_pages,
                );
                info!(
                    "✅ Applied {} listings (page {} of {}, {} total)",
                    self.results.listings.len(),
                    self.results.current_page + 1,
                    self.results.total_pages,
                    self.results.total_elements
                );
                self.applied = Some(ticket.query.clone());
                self.error = None;
                self.failed = None;
                FetchOutcome::Applied {
                    query: ticket.query,
                    mode,
                }
            }
            Err(err) => {
                warn!("Search request #{} failed: {}", ticket.generation, err);
                let message = err.to_string();
                self.error = Some(message.clone());
                self.failed = Some((ticket.query.clone(), mode));
                FetchOutcome::Failed {
                    query: ticket.query,
                    message,
                }
            }
        }
    }

    pub fn results(&self) -> &ResultSet {
        &self.results
    }

    /// Query that produced the current results
    pub fn applied_query(&self) -> Option<&SearchQuery> {
        self.applied.as_ref()
    }

    /// Query whose fetch last failed and the mode it ran in, while it is
    /// still worth retrying
    pub fn failed(&self) -> Option<(&SearchQuery, SearchMode)> {
        self.failed.as_ref().map(|(query, mode)| (query, *mode))
    }

    /// Drop the retry slot once the user has moved on to another query.
    pub fn forget_failure(&mut self) {
        self.failed = None;
    }

    pub fn in_flight_mode(&self) -> Option<SearchMode> {
        self.in_flight.as_ref().map(|f| f.mode)
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Clear the error indicator, returning whether one was set.
    pub fn clear_error(&mut self) -> bool {
        self.error.take().is_some()
    }

    /// Flip a listing's wishlist flag in the current page.
    pub fn toggle_wishlist(&mut self, id: ListingId) -> Option<bool> {
        let listing = self.results.listing_mut(id)?;
        listing.wishlisted = !listing.wishlisted;
        Some(listing.wishlisted)
    }
}
