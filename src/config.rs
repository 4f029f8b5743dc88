use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::models::MAX_PAGES;
use crate::search::types::DEFAULT_PAGE_SIZE;

const ENV_PREFIX: &str = "STAY_SCOUT_";

/// Tunables for the view-sync controller
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Quiet period after the last camera idle before bounds are read
    pub settle_delay_ms: u64,
    /// Minimum edge movement, in degrees, that counts as a new viewport
    pub bounds_epsilon: f64,
    /// Page cap applied to backend totals (never above the hard cap)
    pub max_pages: u32,
    pub page_size: u32,
    /// Screen padding around fitted bounds, in pixels
    pub fit_padding: u32,
    /// Zoom used when a page has exactly one mapped listing
    pub single_listing_zoom: u8,
    pub heal_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 3000,
            bounds_epsilon: 0.001,
            max_pages: MAX_PAGES,
            page_size: DEFAULT_PAGE_SIZE,
            fit_padding: 48,
            single_listing_zoom: 15,
            heal_interval_ms: 250,
        }
    }
}

impl SyncConfig {
    /// Load a JSON config file; missing fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: SyncConfig = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config.normalized())
    }

    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Overlay `STAY_SCOUT_*` variables; malformed values are ignored.
    pub fn with_env_overrides(mut self) -> Self {
        override_from_env(&mut self.settle_delay_ms, "SETTLE_DELAY_MS");
        override_from_env(&mut self.bounds_epsilon, "BOUNDS_EPSILON");
        override_from_env(&mut self.max_pages, "MAX_PAGES");
        override_from_env(&mut self.page_size, "PAGE_SIZE");
        override_from_env(&mut self.fit_padding, "FIT_PADDING");
        override_from_env(&mut self.single_listing_zoom, "SINGLE_LISTING_ZOOM");
        override_from_env(&mut self.heal_interval_ms, "HEAL_INTERVAL_MS");
        self.normalized()
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn heal_interval(&self) -> Duration {
        Duration::from_millis(self.heal_interval_ms)
    }

    fn normalized(mut self) -> Self {
        self.max_pages = self.max_pages.clamp(1, MAX_PAGES);
        self.page_size = self.page_size.max(1);
        self.heal_interval_ms = self.heal_interval_ms.max(16);
        if !self.bounds_epsilon.is_finite() || self.bounds_epsilon < 0.0 {
            self.bounds_epsilon = SyncConfig::default().bounds_epsilon;
        }
        self
    }
}

fn override_from_env<T: FromStr>(field: &mut T, name: &str) {
    let key = format!("{ENV_PREFIX}{name}");
    let Ok(raw) = std::env::var(&key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *field = value,
        Err(_) => warn!("Ignoring malformed {}={:?}", key, raw),
    }
}
