//! Head-to-head match prediction from historical results
//!
//! Aggregates trailing-window team and map statistics from completed matches,
//! turns any pairing into a fixed-order feature vector, and combines several
//! independently trained classifiers into one performance-weighted consensus.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::model::boosting::BoostingConfig;
use crate::model::forest::ForestConfig;
use crate::model::logistic::LogisticConfig;

/// Label used when a record carries no event name
pub const UNKNOWN_EVENT: &str = "Unknown";

/// Upper bound on the number of known names attached to an unknown-entity error
pub const MAX_KNOWN_NAMES: usize = 20;

/// Which side of a match record a team played on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    One,
    Two,
}

impl Side {
    /// Parse the 1/2 winner indicator used by match sources
    pub fn from_indicator(value: u8) -> Option<Self> {
        match value {
            1 => Some(Side::One),
            2 => Some(Side::Two),
            _ => None,
        }
    }

    pub fn indicator(&self) -> u8 {
        match self {
            Side::One => 1,
            Side::Two => 2,
        }
    }
}

/// A single completed match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub team_1: String,
    pub team_2: String,
    pub score_1: u32,
    pub score_2: u32,
    pub winner: Side,
    pub event: String,
    pub map: Option<String>,
    pub played_at: Option<NaiveDateTime>,
}

impl MatchRecord {
    /// Build a record, checking that the winner agrees with the scores
    pub fn new(
        team_1: impl Into<String>,
        team_2: impl Into<String>,
        score_1: u32,
        score_2: u32,
        winner: Side,
    ) -> Result<Self> {
        let team_1 = team_1.into();
        let team_2 = team_2.into();

        if team_1.is_empty() || team_2.is_empty() {
            return Err(PredictError::Data("team name must not be empty".to_string()));
        }
        if team_1 == team_2 {
            return Err(PredictError::Data(format!(
                "team {} cannot play itself",
                team_1
            )));
        }

        let expected = match score_1.cmp(&score_2) {
            std::cmp::Ordering::Greater => Side::One,
            std::cmp::Ordering::Less => Side::Two,
            std::cmp::Ordering::Equal => {
                return Err(PredictError::Data(format!(
                    "{} vs {} is tied {}-{} and has no winner",
                    team_1, team_2, score_1, score_2
                )))
            }
        };
        if expected != winner {
            return Err(PredictError::Data(format!(
                "{} vs {}: winner {} disagrees with score {}-{}",
                team_1,
                team_2,
                winner.indicator(),
                score_1,
                score_2
            )));
        }

        Ok(MatchRecord {
            team_1,
            team_2,
            score_1,
            score_2,
            winner,
            event: UNKNOWN_EVENT.to_string(),
            map: None,
            played_at: None,
        })
    }

    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = event.into();
        self
    }

    pub fn with_map(mut self, map: impl Into<String>) -> Self {
        self.map = Some(map.into());
        self
    }

    pub fn with_played_at(mut self, played_at: NaiveDateTime) -> Self {
        self.played_at = Some(played_at);
        self
    }

    /// Side the given team played on, if it played at all
    pub fn side_of(&self, team: &str) -> Option<Side> {
        if self.team_1 == team {
            Some(Side::One)
        } else if self.team_2 == team {
            Some(Side::Two)
        } else {
            None
        }
    }

    pub fn involves(&self, team: &str) -> bool {
        self.side_of(team).is_some()
    }

    /// Check if the given team won this match
    pub fn did_win(&self, team: &str) -> Option<bool> {
        self.side_of(team).map(|side| side == self.winner)
    }

    /// Rounds won by the given team
    pub fn rounds_for(&self, team: &str) -> Option<u32> {
        self.side_of(team).map(|side| match side {
            Side::One => self.score_1,
            Side::Two => self.score_2,
        })
    }

    /// Rounds conceded by the given team
    pub fn rounds_against(&self, team: &str) -> Option<u32> {
        self.side_of(team).map(|side| match side {
            Side::One => self.score_2,
            Side::Two => self.score_1,
        })
    }

    /// Name of the winning team
    pub fn winner_name(&self) -> &str {
        match self.winner {
            Side::One => &self.team_1,
            Side::Two => &self.team_2,
        }
    }
}

/// Kind of entity a lookup failed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Team,
    Map,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Team => write!(f, "team"),
            EntityKind::Map => write!(f, "map"),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum PredictError {
    #[error("Data error: {0}")]
    Data(String),

    #[error("Not enough usable records: have {found}, need {required}")]
    InsufficientData { found: usize, required: usize },

    #[error("Unknown {kind}: {name} (known: {})", .known.join(", "))]
    UnknownEntity {
        kind: EntityKind,
        name: String,
        known: Vec<String>,
    },

    #[error("Models not ready - run `csmatch train` or load a snapshot first")]
    ModelNotReady,

    #[error("Metric {metric} is undefined: {reason}")]
    DegenerateMetric { metric: &'static str, reason: String },

    #[error("Feature width mismatch: expected {expected}, got {actual}")]
    FeatureWidth { expected: usize, actual: usize },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl PredictError {
    /// Build an unknown-entity error listing a bounded sample of known names
    pub fn unknown<'a>(
        kind: EntityKind,
        name: &str,
        known: impl IntoIterator<Item = &'a String>,
    ) -> Self {
        PredictError::UnknownEntity {
            kind,
            name: name.to_string(),
            known: known.into_iter().take(MAX_KNOWN_NAMES).cloned().collect(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PredictError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub stats: StatsConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    #[serde(default)]
    pub data: DataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Trailing window, in 30-day months
    pub recent_months: u32,
    /// Matches counted towards recent form
    pub form_window: usize,
    /// Compute map statistics and train on the map-aware layout
    pub use_map_stats: bool,
    /// Dev/test only: label unlabelled records with placeholder maps
    pub placeholder_maps: bool,
    pub placeholder_seed: u64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        StatsConfig {
            recent_months: 3,
            form_window: 5,
            use_map_stats: true,
            placeholder_maps: false,
            placeholder_seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub test_fraction: f64,
    pub seed: u64,
    pub cv_folds: usize,
    /// Minimum usable records before models may be trained
    pub min_records: usize,
    /// Train the models on the rayon pool
    pub parallel: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            test_fraction: 0.2,
            seed: 42,
            cv_folds: 5,
            min_records: 30,
            parallel: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub logistic: LogisticConfig,
    pub forest: ForestConfig,
    pub gradient_boosting: BoostingConfig,
    pub histogram_boosting: BoostingConfig,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        ModelsConfig {
            logistic: LogisticConfig::default(),
            forest: ForestConfig::default(),
            gradient_boosting: BoostingConfig::default(),
            histogram_boosting: BoostingConfig::histogram(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub database_path: String,
    pub model_dir: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            database_path: "data/matches.db".to_string(),
            model_dir: "models".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PredictError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| PredictError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PredictError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accessors() {
        let record = MatchRecord::new("Vitality", "NAVI", 13, 9, Side::One).unwrap();
        assert_eq!(record.did_win("Vitality"), Some(true));
        assert_eq!(record.did_win("NAVI"), Some(false));
        assert_eq!(record.did_win("FaZe"), None);
        assert_eq!(record.rounds_for("NAVI"), Some(9));
        assert_eq!(record.rounds_against("NAVI"), Some(13));
        assert_eq!(record.winner_name(), "Vitality");
        assert_eq!(record.event, UNKNOWN_EVENT);
    }

    #[test]
    fn test_record_rejects_inconsistent_winner() {
        assert!(MatchRecord::new("A", "B", 13, 9, Side::Two).is_err());
        assert!(MatchRecord::new("A", "B", 13, 13, Side::One).is_err());
        assert!(MatchRecord::new("A", "A", 13, 9, Side::One).is_err());
    }

    #[test]
    fn test_unknown_error_caps_known_names() {
        let names: Vec<String> = (0..50).map(|i| format!("team{}", i)).collect();
        match PredictError::unknown(EntityKind::Team, "ghost", &names) {
            PredictError::UnknownEntity { known, name, kind } => {
                assert_eq!(known.len(), MAX_KNOWN_NAMES);
                assert_eq!(name, "ghost");
                assert_eq!(kind, EntityKind::Team);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.stats.recent_months, 3);
        assert_eq!(parsed.training.min_records, 30);
        assert_eq!(parsed.models.histogram_boosting.max_bins, Some(32));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: Config = toml::from_str("[stats]\nrecent_months = 6\n").unwrap();
        assert_eq!(parsed.stats.recent_months, 6);
        assert_eq!(parsed.stats.form_window, 5);
        assert_eq!(parsed.training.cv_folds, 5);
    }
}
