//! Keeps a search parameter set, a fetched result page and a live map
//! widget in step for a map-and-list stay search.

pub mod config;
pub mod controller;
pub mod events;
pub mod map;
pub mod models;
pub mod query;
pub mod search;

pub use config::SyncConfig;
pub use controller::{classify, CameraPlan, Trigger, ViewSyncController};
pub use events::{HostEffect, PopupAction, SearchMode, ViewEvent};
