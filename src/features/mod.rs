//! Feature extraction
//!
//! Trailing-window statistics per team and per team x map, and the
//! fixed-order vectors built from them.

pub mod map_stats;
pub mod team_stats;
pub mod vector;
pub mod window;

pub use map_stats::{MapStats, MapStatsAggregator, MapStatsTable, MissingMapPolicy};
pub use team_stats::{TeamStats, TeamStatsAggregator, TeamStatsTable};
pub use vector::{FeatureLayout, FeatureVector, FeatureVectorBuilder};
