//! Prediction
//!
//! The engine lifecycle, the immutable trained snapshot it serves from, and
//! the result types handed back to callers.

pub mod engine;
pub mod result;
pub mod snapshot;

pub use engine::{BatchPrediction, EnginePhase, PredictionEngine, UpcomingMatch};
pub use result::{
    format_prediction, format_series, ConfidenceBand, ModelPrediction, PredictionResult,
    SeriesPrediction,
};
pub use snapshot::{EngineSnapshot, SNAPSHOT_VERSION};
