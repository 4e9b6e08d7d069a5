//! Prediction pipeline orchestration
//!
//! Records -> statistics -> trained snapshot -> predictions. Trained state lives
//! in an `Arc<EngineSnapshot>` that is swapped wholesale after a successful
//! training run, so readers never see a half-trained engine.

use chrono::{Local, NaiveDateTime};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::result::{PredictionResult, SeriesPrediction};
use super::snapshot::EngineSnapshot;
use crate::data::{Database, MatchRecordStore};
use crate::features::{
    FeatureLayout, FeatureVectorBuilder, MapStatsAggregator, MapStatsTable, MissingMapPolicy,
    TeamStatsAggregator, TeamStatsTable,
};
use crate::training::{ModelEnsemble, TrainingSet};
use crate::{Config, PredictError, Result};

/// Where the engine is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EnginePhase {
    Uninitialized,
    DataLoaded,
    StatsReady,
    ModelsReady,
}

/// A scheduled match to predict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingMatch {
    pub team_1: String,
    pub team_2: String,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub scheduled: Option<String>,
    #[serde(default)]
    pub best_of: Option<u8>,
    #[serde(default)]
    pub map: Option<String>,
}

/// Outcome of one fixture in a batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchPrediction {
    pub fixture: UpcomingMatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Statistics computed from the loaded records
#[derive(Debug, Clone)]
struct StatsTables {
    team: TeamStatsTable,
    map: Option<MapStatsTable>,
    as_of: NaiveDateTime,
}

pub struct PredictionEngine {
    config: Config,
    store: Option<MatchRecordStore>,
    stats: Option<StatsTables>,
    snapshot: Option<Arc<EngineSnapshot>>,
}

impl PredictionEngine {
    pub fn new(config: Config) -> Self {
        PredictionEngine {
            config,
            store: None,
            stats: None,
            snapshot: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn phase(&self) -> EnginePhase {
        if self.snapshot.is_some() {
            EnginePhase::ModelsReady
        } else if self.stats.is_some() {
            EnginePhase::StatsReady
        } else if self.store.is_some() {
            EnginePhase::DataLoaded
        } else {
            EnginePhase::Uninitialized
        }
    }

    /// Take ownership of cleaned records
    ///
    /// Fewer records than the training minimum only warns here; `train`
    /// enforces the minimum.
    pub fn load_records(&mut self, store: MatchRecordStore) -> Result<()> {
        if store.is_empty() {
            return Err(PredictError::Data("no usable match records".to_string()));
        }
        if let Err(e) = store.ensure_min_records(self.config.training.min_records) {
            log::warn!("{}; statistics are available but training will be refused", e);
        }
        log::info!(
            "Loaded {} matches covering {} teams",
            store.len(),
            store.teams().len()
        );

        self.store = Some(store);
        // Statistics from earlier records are stale now
        self.stats = None;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let store = MatchRecordStore::load_json(path)?;
        self.load_records(store)
    }

    pub fn load_database(&mut self, db: &Database) -> Result<()> {
        let store = MatchRecordStore::from_database(db)?;
        self.load_records(store)
    }

    pub fn store(&self) -> Option<&MatchRecordStore> {
        self.store.as_ref()
    }

    /// Recompute team (and, if enabled, map) statistics as of `as_of` (default: now)
    pub fn compute_stats(&mut self, as_of: Option<NaiveDateTime>) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| PredictError::Data("no records loaded".to_string()))?;
        let as_of = as_of.unwrap_or_else(|| Local::now().naive_local());
        let stats_config = &self.config.stats;

        let team = TeamStatsAggregator::new(stats_config.recent_months)
            .with_form_window(stats_config.form_window)
            .compute(store.records(), as_of);

        let map = if stats_config.use_map_stats {
            let policy = if stats_config.placeholder_maps {
                MissingMapPolicy::AssignPlaceholder {
                    seed: stats_config.placeholder_seed,
                }
            } else {
                MissingMapPolicy::Fail
            };
            Some(
                MapStatsAggregator::new(stats_config.recent_months)
                    .with_policy(policy)
                    .compute(store.records(), as_of)?,
            )
        } else {
            None
        };

        self.stats = Some(StatsTables { team, map, as_of });
        Ok(())
    }

    pub fn team_stats(&self) -> Option<&TeamStatsTable> {
        self.stats.as_ref().map(|s| &s.team)
    }

    pub fn map_stats(&self) -> Option<&MapStatsTable> {
        self.stats.as_ref().and_then(|s| s.map.as_ref())
    }

    /// Train a fresh ensemble on the current statistics and swap it in
    ///
    /// On any failure the previous snapshot stays in place.
    pub fn train(&mut self) -> Result<()> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| PredictError::Data("no records loaded".to_string()))?;
        store.ensure_min_records(self.config.training.min_records)?;
        let stats = self
            .stats
            .as_ref()
            .ok_or_else(|| PredictError::Data("statistics have not been computed".to_string()))?;

        let layout = if stats.map.is_some() {
            FeatureLayout::WithMap
        } else {
            FeatureLayout::Basic
        };
        let builder = FeatureVectorBuilder::new(layout, &stats.team, stats.map.as_ref());
        let set = TrainingSet::from_records(store.records(), &builder);
        if set.len() < self.config.training.min_records {
            return Err(PredictError::InsufficientData {
                found: set.len(),
                required: self.config.training.min_records,
            });
        }

        let ensemble = ModelEnsemble::train(&set, &self.config.models, &self.config.training)?;
        let snapshot = EngineSnapshot::new(
            stats.team.clone(),
            stats.map.clone(),
            ensemble,
            stats.as_of,
            self.config.stats.recent_months,
            Local::now().naive_local(),
        )?;

        self.snapshot = Some(Arc::new(snapshot));
        log::info!("Models ready ({} layout)", layout);
        Ok(())
    }

    /// Current trained state, shared with any number of readers
    pub fn snapshot(&self) -> Result<Arc<EngineSnapshot>> {
        self.snapshot.clone().ok_or(PredictError::ModelNotReady)
    }

    pub fn save_snapshot<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        self.snapshot()?.save(dir)
    }

    /// Skip training by loading a saved snapshot
    pub fn load_snapshot<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let snapshot = EngineSnapshot::load(dir)?;
        self.snapshot = Some(Arc::new(snapshot));
        Ok(())
    }

    pub fn predict(&self, team_a: &str, team_b: &str, map: Option<&str>) -> Result<PredictionResult> {
        self.snapshot()?.predict(team_a, team_b, map)
    }

    /// Predict every fixture in parallel against one snapshot
    pub fn predict_batch(&self, fixtures: &[UpcomingMatch]) -> Result<Vec<BatchPrediction>> {
        let snapshot = self.snapshot()?;
        let results: Vec<BatchPrediction> = fixtures
            .par_iter()
            .map(|fixture| {
                match snapshot.predict(&fixture.team_1, &fixture.team_2, fixture.map.as_deref()) {
                    Ok(prediction) => BatchPrediction {
                        fixture: fixture.clone(),
                        prediction: Some(prediction),
                        error: None,
                    },
                    Err(e) => BatchPrediction {
                        fixture: fixture.clone(),
                        prediction: None,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect();

        let failed = results.iter().filter(|r| r.error.is_some()).count();
        log::info!(
            "Predicted {} fixtures ({} failed)",
            results.len() - failed,
            failed
        );
        Ok(results)
    }

    pub fn predict_series(&self, team_a: &str, team_b: &str, maps: &[String]) -> Result<SeriesPrediction> {
        self.snapshot()?.predict_series(team_a, team_b, maps)
    }
}
