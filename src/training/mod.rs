//! Model training
//!
//! Stratified splitting, evaluation metrics, and the weighted model ensemble.

pub mod ensemble;
pub mod metrics;
pub mod split;

pub use ensemble::{EnsembleWeights, ModelEnsemble, TrainingSet};
pub use metrics::{format_metrics_table, ModelMetrics};
pub use split::{stratified_folds, stratified_split, Split};
