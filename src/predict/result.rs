//! Prediction output types and text rendering

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::features::{MapStats, TeamStats};
use crate::model::ModelKind;

/// How clear-cut the ensemble's call is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceBand {
    /// Confidence above 70%
    Decisive,
    /// Confidence in (60%, 70%]
    Favoured,
    /// Confidence of 60% or less
    Close,
}

impl ConfidenceBand {
    pub fn from_confidence(confidence_pct: f64) -> Self {
        if confidence_pct > 70.0 {
            ConfidenceBand::Decisive
        } else if confidence_pct > 60.0 {
            ConfidenceBand::Favoured
        } else {
            ConfidenceBand::Close
        }
    }

    /// Best-of-three score forecast. Favoured and close share a label.
    pub fn score_label(&self) -> &'static str {
        match self {
            ConfidenceBand::Decisive => "2-0",
            ConfidenceBand::Favoured => "2-1",
            ConfidenceBand::Close => "2-1",
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfidenceBand::Decisive => write!(f, "Decisive"),
            ConfidenceBand::Favoured => write!(f, "Favoured"),
            ConfidenceBand::Close => write!(f, "Close"),
        }
    }
}

/// Round a percentage to two decimals
pub fn round_pct(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One model's view of a match, percentages rounded to two decimals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub model: ModelKind,
    pub winner: String,
    pub team_a_pct: f64,
    pub team_b_pct: f64,
    pub confidence: f64,
}

/// Full answer for one pairing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub team_a: String,
    pub team_b: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<String>,
    pub winner: String,
    pub team_a_pct: f64,
    pub team_b_pct: f64,
    pub confidence: f64,
    pub band: ConfidenceBand,
    pub predicted_score: String,
    pub models: Vec<ModelPrediction>,
    pub weights: BTreeMap<ModelKind, f64>,
    pub team_a_stats: TeamStats,
    pub team_b_stats: TeamStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_a_map_stats: Option<MapStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_b_map_stats: Option<MapStats>,
}

/// Best-of-N series over a map pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPrediction {
    pub team_a: String,
    pub team_b: String,
    pub winner: String,
    pub team_a_maps: usize,
    pub team_b_maps: usize,
    /// Winner's map wins first, e.g. "2-1"
    pub score: String,
    pub maps: Vec<PredictionResult>,
}

/// Format a prediction for display
pub fn format_prediction(result: &PredictionResult) -> String {
    let title = match &result.map {
        Some(map) => format!("{} vs {} on {}", result.team_a, result.team_b, map),
        None => format!("{} vs {}", result.team_a, result.team_b),
    };

    let mut out = format!(
        r#"
┌─────────────────────────────────────────────────┐
│  {}
├─────────────────────────────────────────────────┤
│  Winner:           {} ({:.2}%)
│  Win probability:  {} {:.2}% - {} {:.2}%
│  Predicted score:  {}
│  Confidence:       {}
├─────────────────────────────────────────────────┤
"#,
        title,
        result.winner,
        result.confidence,
        result.team_a,
        result.team_a_pct,
        result.team_b,
        result.team_b_pct,
        result.predicted_score,
        result.band
    );

    for m in &result.models {
        let weight = result.weights.get(&m.model).copied().unwrap_or(0.0);
        out.push_str(&format!(
            "│  {:<20} {:>6.2}% - {:>6.2}%  -> {} (w {:.3})\n",
            m.model.display_name(),
            m.team_a_pct,
            m.team_b_pct,
            m.winner,
            weight
        ));
    }

    out.push_str(&format!(
        "├─────────────────────────────────────────────────┤\n│  {}: win {:.1}% | form {:.1}% | rounds {:+.2} | {} matches\n│  {}: win {:.1}% | form {:.1}% | rounds {:+.2} | {} matches\n",
        result.team_a,
        result.team_a_stats.win_rate * 100.0,
        result.team_a_stats.recent_form * 100.0,
        result.team_a_stats.round_diff,
        result.team_a_stats.matches_played,
        result.team_b,
        result.team_b_stats.win_rate * 100.0,
        result.team_b_stats.recent_form * 100.0,
        result.team_b_stats.round_diff,
        result.team_b_stats.matches_played,
    ));
    out.push_str("└─────────────────────────────────────────────────┘\n");
    out
}

pub fn format_series(series: &SeriesPrediction) -> String {
    let mut out = format!(
        "\n{} vs {}: {} wins {}\n",
        series.team_a, series.team_b, series.winner, series.score
    );
    for map in &series.maps {
        out.push_str(&format!(
            "  {:<12} {} ({:.2}%)\n",
            map.map.as_deref().unwrap_or("-"),
            map.winner,
            map.confidence
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bands_and_labels() {
        assert_eq!(ConfidenceBand::from_confidence(85.0), ConfidenceBand::Decisive);
        assert_eq!(ConfidenceBand::from_confidence(70.0), ConfidenceBand::Favoured);
        assert_eq!(ConfidenceBand::from_confidence(60.01), ConfidenceBand::Favoured);
        assert_eq!(ConfidenceBand::from_confidence(60.0), ConfidenceBand::Close);
        assert_eq!(ConfidenceBand::Decisive.score_label(), "2-0");
        assert_eq!(ConfidenceBand::Favoured.score_label(), "2-1");
        assert_eq!(ConfidenceBand::Close.score_label(), "2-1");
    }

    #[test]
    fn test_round_pct() {
        assert_eq!(round_pct(66.666_666), 66.67);
        assert_eq!(round_pct(50.0), 50.0);
    }
}
