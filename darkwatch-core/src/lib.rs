//! DarkWatch Core - Domain model and analysis engine for dark web monitoring
//!
//! This crate provides the pure building blocks of the scan pipeline:
//! - Targets, snapshots, entities and scan status
//! - Keyword rule store with file layering and fallback
//! - Content analyzer (threat score, category, findings, entities)
//! - Same-site hidden service link extraction
//! - Entity change detection
//! - Correlation graph projection

pub mod model;
pub mod rules;
pub mod analyzer;
pub mod links;
pub mod diff;
pub mod graph;

pub use model::*;
pub use rules::*;
pub use analyzer::*;
pub use links::*;
pub use diff::*;
pub use graph::*;

/// Host suffix of hidden service addresses
pub const ONION_SUFFIX: &str = ".onion";

/// Lowest possible threat score
pub const MIN_SCORE: u8 = 1;

/// Highest possible threat score
pub const MAX_SCORE: u8 = 10;

/// Findings summaries are cut to this many characters
pub const MAX_FINDINGS_LEN: usize = 500;

/// Score at or above which a snapshot triggers an alert on its own
pub const ALERT_SCORE_THRESHOLD: u8 = 5;

/// Returns true when the host of `url` is a hidden service address
pub fn is_onion_url(url: &str) -> bool {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.host_str()
                .map(|host| host.trim_end_matches('.').ends_with(ONION_SUFFIX))
        })
        .unwrap_or(false)
}
