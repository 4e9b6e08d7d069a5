//! Per-team statistics narrowed to a single map

use chrono::NaiveDateTime;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::team_stats::Tally;
use super::window::within_window;
use crate::{MatchRecord, PredictError, Result};

/// Team -> map -> stats. Only pairs with at least one match are present.
pub type MapStatsTable = BTreeMap<String, BTreeMap<String, MapStats>>;

/// Map pool used when labelling unlabelled records in dev/test runs
pub const PLACEHOLDER_MAPS: [&str; 7] = [
    "Mirage", "Inferno", "Dust2", "Nuke", "Overpass", "Vertigo", "Ancient",
];

/// Windowed statistics for a team on one map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapStats {
    pub matches: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub avg_rounds_won: f64,
    pub avg_rounds_lost: f64,
    pub round_diff: f64,
}

impl From<Tally> for MapStats {
    fn from(tally: Tally) -> Self {
        let avg_rounds_won = tally.avg_rounds_won();
        let avg_rounds_lost = tally.avg_rounds_lost();
        MapStats {
            matches: tally.matches,
            wins: tally.wins,
            losses: tally.losses,
            win_rate: tally.win_rate(),
            avg_rounds_won,
            avg_rounds_lost,
            round_diff: avg_rounds_won - avg_rounds_lost,
        }
    }
}

/// What to do when no record in the window carries a map label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingMapPolicy {
    /// Refuse to compute map statistics
    Fail,
    /// Dev/test only: draw a label from [`PLACEHOLDER_MAPS`] for every unlabelled record
    AssignPlaceholder { seed: u64 },
}

/// Computes [`MapStats`] for every team x map pair over a trailing window
#[derive(Debug, Clone)]
pub struct MapStatsAggregator {
    window_months: u32,
    policy: MissingMapPolicy,
}

impl MapStatsAggregator {
    pub fn new(window_months: u32) -> Self {
        MapStatsAggregator {
            window_months,
            policy: MissingMapPolicy::Fail,
        }
    }

    pub fn with_policy(mut self, policy: MissingMapPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn compute(&self, records: &[MatchRecord], as_of: NaiveDateTime) -> Result<MapStatsTable> {
        let recent = within_window(records, as_of, self.window_months);

        let labelled: Vec<(&MatchRecord, String)> = if recent.iter().any(|r| r.map.is_some()) {
            recent
                .iter()
                .filter_map(|&r| r.map.clone().map(|map| (r, map)))
                .collect()
        } else {
            match self.policy {
                MissingMapPolicy::Fail => {
                    return Err(PredictError::Data(format!(
                        "none of the {} matches in the window carries a map label",
                        recent.len()
                    )))
                }
                MissingMapPolicy::AssignPlaceholder { seed } => {
                    log::warn!(
                        "No map labels found, assigning placeholder maps to {} matches (seed {})",
                        recent.len(),
                        seed
                    );
                    let mut rng = StdRng::seed_from_u64(seed);
                    recent
                        .iter()
                        .filter_map(|&r| {
                            PLACEHOLDER_MAPS
                                .choose(&mut rng)
                                .map(|map| (r, map.to_string()))
                        })
                        .collect()
                }
            }
        };

        let mut tallies: BTreeMap<(&str, String), Tally> = BTreeMap::new();
        for (record, map) in &labelled {
            for team in [record.team_1.as_str(), record.team_2.as_str()] {
                tallies
                    .entry((team, map.clone()))
                    .or_default()
                    .update(record, team);
            }
        }

        let mut table = MapStatsTable::new();
        for ((team, map), tally) in tallies {
            table
                .entry(team.to_string())
                .or_default()
                .insert(map, MapStats::from(tally));
        }

        log::info!(
            "Calculated map stats for {} teams across {} maps",
            table.len(),
            map_universe(&table).len()
        );
        Ok(table)
    }
}

/// Every map any team has played in the table
pub fn map_universe(table: &MapStatsTable) -> BTreeSet<String> {
    table
        .values()
        .flat_map(|maps| maps.keys().cloned())
        .collect()
}

/// Win rate for a team on a map, 0.0 when the pair has no data
pub fn map_win_rate(table: &MapStatsTable, team: &str, map: &str) -> f64 {
    lookup(table, team, map).map_or(0.0, |stats| stats.win_rate)
}

pub fn lookup<'a>(table: &'a MapStatsTable, team: &str, map: &str) -> Option<&'a MapStats> {
    table.get(team).and_then(|maps| maps.get(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Side;
    use chrono::{Duration, NaiveDate};

    fn base() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn make_match(team_1: &str, team_2: &str, won: bool, map: Option<&str>, day: i64) -> MatchRecord {
        let (s1, s2, winner) = if won { (13, 9, Side::One) } else { (9, 13, Side::Two) };
        let mut record = MatchRecord::new(team_1, team_2, s1, s2, winner)
            .unwrap()
            .with_played_at(base() + Duration::days(day));
        record.map = map.map(str::to_string);
        record
    }

    fn as_of() -> NaiveDateTime {
        base() + Duration::days(30)
    }

    #[test]
    fn test_sparse_team_map_table() {
        let records = vec![
            make_match("Vitality", "NAVI", true, Some("Mirage"), 0),
            make_match("Vitality", "NAVI", false, Some("Mirage"), 1),
            make_match("Vitality", "FaZe", true, Some("Nuke"), 2),
            make_match("NAVI", "FaZe", true, None, 3),
        ];
        let table = MapStatsAggregator::new(3).compute(&records, as_of()).unwrap();

        let mirage = lookup(&table, "Vitality", "Mirage").unwrap();
        assert_eq!(mirage.matches, 2);
        assert_eq!(mirage.wins, 1);
        assert_eq!(mirage.win_rate, 0.5);
        assert_eq!(mirage.round_diff, 0.0);

        assert_eq!(lookup(&table, "FaZe", "Nuke").unwrap().losses, 1);
        // NAVI never played Nuke: absent, not zero
        assert!(lookup(&table, "NAVI", "Nuke").is_none());
        assert_eq!(map_win_rate(&table, "NAVI", "Nuke"), 0.0);
        assert_eq!(map_universe(&table).len(), 2);
    }

    #[test]
    fn test_no_labels_fails_fast() {
        let records = vec![make_match("A", "B", true, None, 0)];
        let result = MapStatsAggregator::new(3).compute(&records, as_of());
        assert!(matches!(result, Err(PredictError::Data(_))));
    }

    #[test]
    fn test_placeholder_labels_are_seeded() {
        let records: Vec<MatchRecord> = (0..20)
            .map(|i| make_match("A", "B", i % 2 == 0, None, i))
            .collect();
        let aggregator =
            MapStatsAggregator::new(3).with_policy(MissingMapPolicy::AssignPlaceholder { seed: 7 });

        let first = aggregator.compute(&records, as_of()).unwrap();
        let second = aggregator.compute(&records, as_of()).unwrap();
        assert_eq!(first, second);

        let total: usize = first["A"].values().map(|s| s.matches).sum();
        assert_eq!(total, 20);
        assert!(map_universe(&first)
            .iter()
            .all(|m| PLACEHOLDER_MAPS.contains(&m.as_str())));
    }
}
