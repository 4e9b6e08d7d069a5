//! Immutable trained state and its on-disk form
//!
//! A snapshot bundles the statistics tables with the ensemble trained on
//! them. It is never mutated; retraining builds a new one.

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use super::result::{round_pct, ConfidenceBand, ModelPrediction, PredictionResult, SeriesPrediction};
use crate::features::map_stats::lookup;
use crate::features::{FeatureLayout, FeatureVectorBuilder, MapStatsTable, TeamStatsTable};
use crate::model::{ModelKind, Standardizer, TrainedModel};
use crate::training::{ModelEnsemble, ModelMetrics};
use crate::{PredictError, Result};

/// Bumped whenever the artifact layout or feature order changes
pub const SNAPSHOT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "manifest.json";
const SCALER_FILE: &str = "scaler.json";
const TEAM_STATS_FILE: &str = "team_stats.json";
const MAP_STATS_FILE: &str = "map_stats.json";
const METRICS_FILE: &str = "model_metrics.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    version: u32,
    layout: FeatureLayout,
    width: usize,
    models: Vec<ModelKind>,
    as_of: NaiveDateTime,
    window_months: u32,
    trained_at: NaiveDateTime,
}

fn model_file(kind: ModelKind) -> String {
    format!("{}_model.json", kind.name())
}

/// Statistics plus the ensemble trained on them
#[derive(Debug)]
pub struct EngineSnapshot {
    team_stats: TeamStatsTable,
    map_stats: Option<MapStatsTable>,
    ensemble: ModelEnsemble,
    as_of: NaiveDateTime,
    window_months: u32,
    trained_at: NaiveDateTime,
}

impl EngineSnapshot {
    pub fn new(
        team_stats: TeamStatsTable,
        map_stats: Option<MapStatsTable>,
        ensemble: ModelEnsemble,
        as_of: NaiveDateTime,
        window_months: u32,
        trained_at: NaiveDateTime,
    ) -> Result<Self> {
        let expects_maps = ensemble.layout() == FeatureLayout::WithMap;
        if expects_maps != map_stats.is_some() {
            return Err(PredictError::Snapshot(format!(
                "{} layout {} map statistics",
                ensemble.layout(),
                if expects_maps { "requires" } else { "does not use" }
            )));
        }
        Ok(EngineSnapshot {
            team_stats,
            map_stats,
            ensemble,
            as_of,
            window_months,
            trained_at,
        })
    }

    pub fn team_stats(&self) -> &TeamStatsTable {
        &self.team_stats
    }

    pub fn map_stats(&self) -> Option<&MapStatsTable> {
        self.map_stats.as_ref()
    }

    pub fn ensemble(&self) -> &ModelEnsemble {
        &self.ensemble
    }

    pub fn as_of(&self) -> NaiveDateTime {
        self.as_of
    }

    pub fn trained_at(&self) -> NaiveDateTime {
        self.trained_at
    }

    fn builder(&self) -> FeatureVectorBuilder<'_> {
        FeatureVectorBuilder::new(self.ensemble.layout(), &self.team_stats, self.map_stats.as_ref())
    }

    /// Predict a pairing
    ///
    /// Every model is asked in both orientations of a name-sorted pairing and
    /// the two answers are averaged, so swapping the arguments only swaps the
    /// output sides.
    pub fn predict(&self, team_a: &str, team_b: &str, map: Option<&str>) -> Result<PredictionResult> {
        if team_a == team_b {
            return Err(PredictError::InvalidQuery(format!(
                "{} cannot play itself",
                team_a
            )));
        }

        let builder = self.builder();
        let stats_a = builder.team(team_a)?;
        let stats_b = builder.team(team_b)?;

        let (first, second) = if team_a <= team_b {
            (team_a, team_b)
        } else {
            (team_b, team_a)
        };
        let forward = self.ensemble.predict_proba(&builder.build(first, second, map)?)?;
        let reverse = self.ensemble.predict_proba(&builder.build(second, first, map)?)?;

        let weights = self.ensemble.weights();
        let mut models = Vec::with_capacity(forward.len());
        let (mut ensemble_first, mut ensemble_second) = (0.0, 0.0);

        for (&kind, &(fwd_first, _)) in &forward {
            let (_, rev_first) = reverse.get(&kind).copied().ok_or_else(|| {
                PredictError::Snapshot(format!("{} missing from reverse pass", kind))
            })?;
            let p_first = 0.5 * (fwd_first + rev_first);
            let p_second = 1.0 - p_first;

            let w = weights.get(kind);
            ensemble_first += w * p_first;
            ensemble_second += w * p_second;

            let (p_a, p_b) = orient(team_a == first, p_first, p_second);
            let (winner, confidence) = pick_winner(team_a, team_b, p_a * 100.0, p_b * 100.0);
            models.push(ModelPrediction {
                model: kind,
                winner: winner.to_string(),
                team_a_pct: round_pct(p_a * 100.0),
                team_b_pct: round_pct(p_b * 100.0),
                confidence: round_pct(confidence),
            });
        }

        let (p_a, p_b) = orient(team_a == first, ensemble_first, ensemble_second);
        let (winner, confidence) = pick_winner(team_a, team_b, p_a * 100.0, p_b * 100.0);
        let confidence = round_pct(confidence);
        let band = ConfidenceBand::from_confidence(confidence);

        let map_stats_for = |team: &str| -> Option<crate::features::MapStats> {
            let table = self.map_stats.as_ref()?;
            lookup(table, team, map?).cloned()
        };

        Ok(PredictionResult {
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
            map: map.map(str::to_string),
            winner: winner.to_string(),
            team_a_pct: round_pct(p_a * 100.0),
            team_b_pct: round_pct(p_b * 100.0),
            confidence,
            band,
            predicted_score: band.score_label().to_string(),
            models,
            weights: weights.as_map().clone(),
            team_a_stats: stats_a.clone(),
            team_b_stats: stats_b.clone(),
            team_a_map_stats: map_stats_for(team_a),
            team_b_map_stats: map_stats_for(team_b),
        })
    }

    /// Predict each map of an odd-sized pool and count map wins
    pub fn predict_series(&self, team_a: &str, team_b: &str, maps: &[String]) -> Result<SeriesPrediction> {
        if maps.is_empty() || maps.len() % 2 == 0 {
            return Err(PredictError::InvalidQuery(format!(
                "a series needs an odd number of maps, got {}",
                maps.len()
            )));
        }
        if self.ensemble.layout() == FeatureLayout::Basic {
            log::warn!("Models were trained without map features; every map will predict the same");
        }

        let results = maps
            .iter()
            .map(|map| self.predict(team_a, team_b, Some(map)))
            .collect::<Result<Vec<_>>>()?;

        let team_a_maps = results.iter().filter(|r| r.winner == team_a).count();
        let team_b_maps = results.len() - team_a_maps;
        let (winner, won, lost) = if team_a_maps > team_b_maps {
            (team_a, team_a_maps, team_b_maps)
        } else {
            (team_b, team_b_maps, team_a_maps)
        };

        Ok(SeriesPrediction {
            team_a: team_a.to_string(),
            team_b: team_b.to_string(),
            winner: winner.to_string(),
            team_a_maps,
            team_b_maps,
            score: format!("{}-{}", won, lost),
            maps: results,
        })
    }

    /// Write every artifact into `dir`
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let manifest = Manifest {
            version: SNAPSHOT_VERSION,
            layout: self.ensemble.layout(),
            width: self.ensemble.layout().width(),
            models: self.ensemble.models().keys().copied().collect(),
            as_of: self.as_of,
            window_months: self.window_months,
            trained_at: self.trained_at,
        };

        for (kind, model) in self.ensemble.models() {
            write_json(&dir.join(model_file(*kind)), model)?;
        }
        write_json(&dir.join(SCALER_FILE), self.ensemble.scaler())?;
        write_json(&dir.join(TEAM_STATS_FILE), &self.team_stats)?;
        write_json(&dir.join(MAP_STATS_FILE), &self.map_stats)?;
        write_json(&dir.join(METRICS_FILE), self.ensemble.metrics())?;
        // Manifest last: a directory without one is not a snapshot
        write_json(&dir.join(MANIFEST_FILE), &manifest)?;

        log::info!(
            "Saved snapshot ({} models, {} teams) to {}",
            manifest.models.len(),
            self.team_stats.len(),
            dir.display()
        );
        Ok(())
    }

    /// Load and cross-check a snapshot directory
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(PredictError::Snapshot(format!(
                "no {} in {}",
                MANIFEST_FILE,
                dir.display()
            )));
        }
        let manifest: Manifest = read_json(&manifest_path)?;

        if manifest.version != SNAPSHOT_VERSION {
            return Err(PredictError::Snapshot(format!(
                "version {} is not supported (expected {})",
                manifest.version, SNAPSHOT_VERSION
            )));
        }
        if manifest.width != manifest.layout.width() {
            return Err(PredictError::Snapshot(format!(
                "manifest width {} does not match {} layout ({})",
                manifest.width,
                manifest.layout,
                manifest.layout.width()
            )));
        }

        let mut required: Vec<String> = manifest.models.iter().map(|&k| model_file(k)).collect();
        required.extend(
            [SCALER_FILE, TEAM_STATS_FILE, MAP_STATS_FILE, METRICS_FILE]
                .iter()
                .map(|f| f.to_string()),
        );
        let missing: Vec<&String> = required.iter().filter(|f| !dir.join(f).exists()).collect();
        if !missing.is_empty() {
            return Err(PredictError::Snapshot(format!(
                "missing artifacts in {}: {:?}",
                dir.display(),
                missing
            )));
        }

        let mut models = BTreeMap::new();
        for &kind in &manifest.models {
            let model: TrainedModel = read_json(&dir.join(model_file(kind)))?;
            models.insert(kind, model);
        }
        let scaler: Standardizer = read_json(&dir.join(SCALER_FILE))?;
        let team_stats: TeamStatsTable = read_json(&dir.join(TEAM_STATS_FILE))?;
        let map_stats: Option<MapStatsTable> = read_json(&dir.join(MAP_STATS_FILE))?;
        let metrics: BTreeMap<ModelKind, ModelMetrics> = read_json(&dir.join(METRICS_FILE))?;

        if metrics.keys().ne(models.keys()) {
            return Err(PredictError::Snapshot(
                "metrics and models cover different model sets".to_string(),
            ));
        }
        if team_stats.is_empty() {
            return Err(PredictError::Snapshot("team statistics are empty".to_string()));
        }

        let ensemble = ModelEnsemble::from_parts(manifest.layout, scaler, models, metrics)
            .map_err(|e| PredictError::Snapshot(format!("inconsistent artifacts: {}", e)))?;

        log::info!(
            "Loaded snapshot trained at {} ({} layout, {} teams)",
            manifest.trained_at,
            manifest.layout,
            team_stats.len()
        );

        Self::new(
            team_stats,
            map_stats,
            ensemble,
            manifest.as_of,
            manifest.window_months,
            manifest.trained_at,
        )
    }
}

fn orient(a_is_first: bool, p_first: f64, p_second: f64) -> (f64, f64) {
    if a_is_first {
        (p_first, p_second)
    } else {
        (p_second, p_first)
    }
}

/// Higher percentage wins; exact ties go to the name that sorts first
fn pick_winner<'a>(team_a: &'a str, team_b: &'a str, pct_a: f64, pct_b: f64) -> (&'a str, f64) {
    if pct_a > pct_b || (pct_a == pct_b && team_a <= team_b) {
        (team_a, pct_a)
    } else {
        (team_b, pct_b)
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| PredictError::Snapshot(format!("cannot parse {}: {}", path.display(), e)))
}
