//! Fixed-order feature vectors for a pairing
//!
//! The field order is part of a trained model's contract: a vector built with
//! one layout must never be fed to a model trained on another.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::map_stats::{map_universe, map_win_rate, MapStatsTable};
use super::team_stats::{TeamStats, TeamStatsTable};
use crate::{EntityKind, MatchRecord, PredictError, Result};

const BASIC_NAMES: [&str; 12] = [
    "win_rate_a",
    "win_rate_b",
    "rounds_won_a",
    "rounds_won_b",
    "rounds_lost_a",
    "rounds_lost_b",
    "round_diff_a",
    "round_diff_b",
    "matches_a",
    "matches_b",
    "win_rate_diff",
    "round_diff_diff",
];

const WITH_MAP_NAMES: [&str; 15] = [
    "win_rate_a",
    "win_rate_b",
    "recent_form_a",
    "recent_form_b",
    "rounds_won_a",
    "rounds_won_b",
    "round_diff_a",
    "round_diff_b",
    "matches_a",
    "matches_b",
    "win_rate_diff",
    "round_diff_diff",
    "map_win_rate_a",
    "map_win_rate_b",
    "map_win_rate_diff",
];

/// Which field order a vector (and the models consuming it) uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureLayout {
    /// Team statistics only, 12 fields
    Basic,
    /// Team statistics with recent form and map win rates, 15 fields
    WithMap,
}

impl FeatureLayout {
    pub fn width(&self) -> usize {
        self.names().len()
    }

    pub fn names(&self) -> &'static [&'static str] {
        match self {
            FeatureLayout::Basic => &BASIC_NAMES,
            FeatureLayout::WithMap => &WITH_MAP_NAMES,
        }
    }
}

impl fmt::Display for FeatureLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureLayout::Basic => write!(f, "basic"),
            FeatureLayout::WithMap => write!(f, "with-map"),
        }
    }
}

/// One pairing's features in layout order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub layout: FeatureLayout,
    pub values: Vec<f64>,
}

impl FeatureVector {
    /// Assemble a vector from two teams' stats and optional map win rates
    ///
    /// Map rates are ignored by the basic layout and default to 0.0 otherwise.
    pub fn from_stats(
        layout: FeatureLayout,
        a: &TeamStats,
        b: &TeamStats,
        map_rates: Option<(f64, f64)>,
    ) -> Self {
        let values = match layout {
            FeatureLayout::Basic => vec![
                a.win_rate,
                b.win_rate,
                a.avg_rounds_won,
                b.avg_rounds_won,
                a.avg_rounds_lost,
                b.avg_rounds_lost,
                a.round_diff,
                b.round_diff,
                a.matches_played as f64,
                b.matches_played as f64,
                a.win_rate - b.win_rate,
                a.round_diff - b.round_diff,
            ],
            FeatureLayout::WithMap => {
                let (map_a, map_b) = map_rates.unwrap_or((0.0, 0.0));
                vec![
                    a.win_rate,
                    b.win_rate,
                    a.recent_form,
                    b.recent_form,
                    a.avg_rounds_won,
                    b.avg_rounds_won,
                    a.round_diff,
                    b.round_diff,
                    a.matches_played as f64,
                    b.matches_played as f64,
                    a.win_rate - b.win_rate,
                    a.round_diff - b.round_diff,
                    map_a,
                    map_b,
                    map_a - map_b,
                ]
            }
        };
        FeatureVector { layout, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }
}

/// Builds vectors from the computed statistics tables
pub struct FeatureVectorBuilder<'a> {
    layout: FeatureLayout,
    team_stats: &'a TeamStatsTable,
    map_stats: Option<&'a MapStatsTable>,
}

impl<'a> FeatureVectorBuilder<'a> {
    pub fn new(
        layout: FeatureLayout,
        team_stats: &'a TeamStatsTable,
        map_stats: Option<&'a MapStatsTable>,
    ) -> Self {
        FeatureVectorBuilder {
            layout,
            team_stats,
            map_stats,
        }
    }

    pub fn layout(&self) -> FeatureLayout {
        self.layout
    }

    /// Stats for a team, or an unknown-entity error listing known teams
    pub fn team(&self, name: &str) -> Result<&'a TeamStats> {
        self.team_stats
            .get(name)
            .ok_or_else(|| PredictError::unknown(EntityKind::Team, name, self.team_stats.keys()))
    }

    /// Vector for a query
    ///
    /// A map nobody has played in the window is rejected. A known map one
    /// team has not played contributes a 0.0 win rate for that team.
    pub fn build(&self, team_a: &str, team_b: &str, map: Option<&str>) -> Result<FeatureVector> {
        let a = self.team(team_a)?;
        let b = self.team(team_b)?;

        let map_rates = match (self.layout, map, self.map_stats) {
            (FeatureLayout::WithMap, Some(map), Some(table)) => {
                let universe = map_universe(table);
                if !universe.contains(map) {
                    return Err(PredictError::unknown(EntityKind::Map, map, &universe));
                }
                Some((
                    map_win_rate(table, team_a, map),
                    map_win_rate(table, team_b, map),
                ))
            }
            (FeatureLayout::Basic, Some(map), _) => {
                log::debug!("Ignoring map {} for the basic feature layout", map);
                None
            }
            _ => None,
        };

        Ok(FeatureVector::from_stats(self.layout, a, b, map_rates))
    }

    /// Training row for a historical record, None if either team lacks stats
    ///
    /// Unlike [`build`](Self::build) an unseen map simply contributes 0.0.
    pub fn build_for_record(&self, record: &MatchRecord) -> Option<FeatureVector> {
        let a = self.team_stats.get(&record.team_1)?;
        let b = self.team_stats.get(&record.team_2)?;

        let map_rates = match (record.map.as_deref(), self.map_stats) {
            (Some(map), Some(table)) => Some((
                map_win_rate(table, &record.team_1, map),
                map_win_rate(table, &record.team_2, map),
            )),
            _ => None,
        };

        Some(FeatureVector::from_stats(self.layout, a, b, map_rates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::map_stats::MapStats;
    use std::collections::BTreeMap;

    fn stats(win_rate: f64, matches: usize, diff: f64) -> TeamStats {
        TeamStats {
            matches_played: matches,
            wins: (win_rate * matches as f64) as usize,
            losses: matches - (win_rate * matches as f64) as usize,
            win_rate,
            recent_form: win_rate,
            avg_rounds_won: 11.0 + diff / 2.0,
            avg_rounds_lost: 11.0 - diff / 2.0,
            round_diff: diff,
        }
    }

    fn tables() -> (TeamStatsTable, MapStatsTable) {
        let mut teams = TeamStatsTable::new();
        teams.insert("Vitality".to_string(), stats(0.8, 10, 3.0));
        teams.insert("NAVI".to_string(), stats(0.6, 5, -1.0));

        let mut maps = MapStatsTable::new();
        let mut vitality = BTreeMap::new();
        vitality.insert(
            "Mirage".to_string(),
            MapStats {
                matches: 4,
                wins: 3,
                losses: 1,
                win_rate: 0.75,
                ..MapStats::default()
            },
        );
        maps.insert("Vitality".to_string(), vitality);
        (teams, maps)
    }

    #[test]
    fn test_layout_widths() {
        assert_eq!(FeatureLayout::Basic.width(), 12);
        assert_eq!(FeatureLayout::WithMap.width(), 15);
    }

    #[test]
    fn test_width_is_fixed() {
        let big = stats(1.0, 100_000, 1e9);
        let small = TeamStats::default();
        for layout in [FeatureLayout::Basic, FeatureLayout::WithMap] {
            let v = FeatureVector::from_stats(layout, &big, &small, Some((1.0, 0.0)));
            assert_eq!(v.len(), layout.width());
            let v = FeatureVector::from_stats(layout, &small, &big, None);
            assert_eq!(v.len(), layout.width());
        }
    }

    #[test]
    fn test_basic_field_order() {
        let (teams, _) = tables();
        let builder = FeatureVectorBuilder::new(FeatureLayout::Basic, &teams, None);
        let v = builder.build("Vitality", "NAVI", None).unwrap();
        assert_eq!(v.values[0], 0.8);
        assert_eq!(v.values[1], 0.6);
        assert_eq!(v.values[2], 12.5);
        assert_eq!(v.values[5], 11.5);
        assert_eq!(v.values[8], 10.0);
        assert!((v.values[10] - 0.2).abs() < 1e-12);
        assert_eq!(v.values[11], 4.0);
    }

    #[test]
    fn test_missing_map_data_is_zero() {
        let (teams, maps) = tables();
        let builder = FeatureVectorBuilder::new(FeatureLayout::WithMap, &teams, Some(&maps));
        let v = builder.build("Vitality", "NAVI", Some("Mirage")).unwrap();
        assert_eq!(v.values[12], 0.75);
        assert_eq!(v.values[13], 0.0);
        assert_eq!(v.values[14], 0.75);

        let without = builder.build("Vitality", "NAVI", None).unwrap();
        assert_eq!(&without.values[12..], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unknown_team_and_map() {
        let (teams, maps) = tables();
        let builder = FeatureVectorBuilder::new(FeatureLayout::WithMap, &teams, Some(&maps));
        assert!(matches!(
            builder.build("Vitality", "Ghosts", None),
            Err(PredictError::UnknownEntity {
                kind: EntityKind::Team,
                ..
            })
        ));
        assert!(matches!(
            builder.build("Vitality", "NAVI", Some("Cache")),
            Err(PredictError::UnknownEntity {
                kind: EntityKind::Map,
                ..
            })
        ));
    }

    #[test]
    fn test_basic_layout_ignores_map() {
        let (teams, maps) = tables();
        let builder = FeatureVectorBuilder::new(FeatureLayout::Basic, &teams, Some(&maps));
        let v = builder.build("Vitality", "NAVI", Some("Cache")).unwrap();
        assert_eq!(v.len(), 12);
    }
}
