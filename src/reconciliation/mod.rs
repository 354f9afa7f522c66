//! Statement reconciliation: pairing parsed statement lines with recorded entries
//!
//! Scoring is split from storage access. [`rules`] holds the ordered verdict
//! table, [`similarity`] the description normalization, and [`engine`] the
//! greedy one-to-one assignment plus the storage-backed [`ReconciliationEngine`].

pub mod engine;
pub mod rules;
pub mod similarity;

pub use engine::*;
pub use rules::{MatchType, Score};
pub use similarity::{description_similarity, normalize_description};
