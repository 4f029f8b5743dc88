pub mod catalog;
pub mod fetch;
pub mod http;
pub mod traits;
pub mod types;

pub use catalog::StaticBackend;
pub use fetch::{FetchCoordinator, FetchOutcome, FetchTicket};
pub use http::HttpSearchBackend;
pub use traits::SearchBackend;
pub use types::{SearchError, SearchRequest, SearchResponse};
