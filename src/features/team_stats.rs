//! Team statistics computation
//!
//! Trailing-window win rate, recent form and round differentials per team.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::window::within_window;
use crate::MatchRecord;

/// Statistics for every team seen in the window, keyed by team name
pub type TeamStatsTable = BTreeMap<String, TeamStats>;

/// Default number of matches counted towards recent form
pub const DEFAULT_FORM_WINDOW: usize = 5;

/// Windowed statistics for a team
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TeamStats {
    pub matches_played: usize,
    pub wins: usize,
    pub losses: usize,
    /// wins / matches_played, 0 without matches
    pub win_rate: f64,
    /// Win fraction over the last few matches in the window
    pub recent_form: f64,
    pub avg_rounds_won: f64,
    pub avg_rounds_lost: f64,
    /// avg_rounds_won - avg_rounds_lost
    pub round_diff: f64,
}

/// Running totals for one team (or team x map) over a set of matches
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Tally {
    pub matches: usize,
    pub wins: usize,
    pub losses: usize,
    pub rounds_won: u64,
    pub rounds_lost: u64,
}

impl Tally {
    /// Update totals with a match result, seen from `team`'s side
    pub fn update(&mut self, record: &MatchRecord, team: &str) {
        let (Some(won), Some(rounds_for), Some(rounds_against)) = (
            record.did_win(team),
            record.rounds_for(team),
            record.rounds_against(team),
        ) else {
            return;
        };

        self.matches += 1;
        if won {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.rounds_won += u64::from(rounds_for);
        self.rounds_lost += u64::from(rounds_against);
    }

    pub fn win_rate(&self) -> f64 {
        ratio(self.wins as f64, self.matches)
    }

    pub fn avg_rounds_won(&self) -> f64 {
        ratio(self.rounds_won as f64, self.matches)
    }

    pub fn avg_rounds_lost(&self) -> f64 {
        ratio(self.rounds_lost as f64, self.matches)
    }
}

/// Zero-denominator ratios are 0.0
pub(crate) fn ratio(numerator: f64, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator / denominator as f64
    }
}

impl TeamStats {
    /// Build statistics from a team's matches in chronological order
    pub fn from_matches(matches: &[&MatchRecord], team: &str, form_window: usize) -> Self {
        let mut tally = Tally::default();
        for record in matches {
            tally.update(record, team);
        }

        let recent = &matches[matches.len().saturating_sub(form_window)..];
        let recent_wins = recent
            .iter()
            .filter(|r| r.did_win(team) == Some(true))
            .count();

        let avg_rounds_won = tally.avg_rounds_won();
        let avg_rounds_lost = tally.avg_rounds_lost();

        TeamStats {
            matches_played: tally.matches,
            wins: tally.wins,
            losses: tally.losses,
            win_rate: tally.win_rate(),
            recent_form: ratio(recent_wins as f64, recent.len()),
            avg_rounds_won,
            avg_rounds_lost,
            round_diff: avg_rounds_won - avg_rounds_lost,
        }
    }
}

/// Computes [`TeamStats`] for all teams over a trailing window
#[derive(Debug, Clone)]
pub struct TeamStatsAggregator {
    window_months: u32,
    form_window: usize,
}

impl TeamStatsAggregator {
    pub fn new(window_months: u32) -> Self {
        TeamStatsAggregator {
            window_months,
            form_window: DEFAULT_FORM_WINDOW,
        }
    }

    pub fn with_form_window(mut self, form_window: usize) -> Self {
        self.form_window = form_window;
        self
    }

    /// Recompute the full table from chronologically ordered records
    pub fn compute(&self, records: &[MatchRecord], as_of: NaiveDateTime) -> TeamStatsTable {
        let recent = within_window(records, as_of, self.window_months);

        let mut by_team: BTreeMap<&str, Vec<&MatchRecord>> = BTreeMap::new();
        for &record in &recent {
            by_team.entry(&record.team_1).or_default().push(record);
            by_team.entry(&record.team_2).or_default().push(record);
        }

        let table: TeamStatsTable = by_team
            .into_iter()
            .map(|(team, matches)| {
                (
                    team.to_string(),
                    TeamStats::from_matches(&matches, team, self.form_window),
                )
            })
            .collect();

        log::info!("Calculated stats for {} teams", table.len());
        table
    }
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

    fn make_match(team_1: &str, team_2: &str, s1: u32, s2: u32, day: i64) -> MatchRecord {
        let winner = if s1 > s2 { Side::One } else { Side::Two };
        MatchRecord::new(team_1, team_2, s1, s2, winner)
            .unwrap()
            .with_played_at(base() + Duration::days(day))
    }

    fn as_of() -> NaiveDateTime {
        base() + Duration::days(60)
    }

    #[test]
    fn test_side_aware_counting() {
        let records = vec![
            make_match("Vitality", "NAVI", 13, 7, 0),
            make_match("NAVI", "Vitality", 13, 10, 1),
        ];
        let table = TeamStatsAggregator::new(3).compute(&records, as_of());

        let vitality = &table["Vitality"];
        assert_eq!(vitality.matches_played, 2);
        assert_eq!(vitality.wins, 1);
        assert_eq!(vitality.losses, 1);
        assert_eq!(vitality.avg_rounds_won, 11.5);
        assert_eq!(vitality.avg_rounds_lost, 10.0);
        assert_eq!(vitality.round_diff, 1.5);

        let navi = &table["NAVI"];
        assert_eq!(navi.avg_rounds_won, 10.0);
        assert_eq!(navi.round_diff, -1.5);
    }

    #[test]
    fn test_invariants_hold_for_every_team() {
        let mut records = Vec::new();
        let teams = ["A", "B", "C", "D"];
        for i in 0..40 {
            let t1 = teams[i % 4];
            let t2 = teams[(i + 1 + i / 4) % 4];
            if t1 == t2 {
                continue;
            }
            let (s1, s2) = if i % 3 == 0 { (13, 4 + (i as u32 % 9)) } else { (i as u32 % 12, 13) };
            records.push(make_match(t1, t2, s1, s2, i as i64));
        }

        let table = TeamStatsAggregator::new(3).compute(&records, as_of());
        assert!(!table.is_empty());
        for stats in table.values() {
            assert!(stats.matches_played >= 1);
            assert!((0.0..=1.0).contains(&stats.win_rate));
            assert!((0.0..=1.0).contains(&stats.recent_form));
            assert_eq!(stats.wins + stats.losses, stats.matches_played);
        }
    }

    #[test]
    fn test_recent_form_uses_last_five_in_order() {
        // Wins first, then five straight losses
        let mut records = Vec::new();
        for day in 0..5 {
            records.push(make_match("X", "Y", 13, 3, day));
        }
        for day in 5..10 {
            records.push(make_match("X", "Y", 3, 13, day));
        }
        let table = TeamStatsAggregator::new(3).compute(&records, as_of());
        assert_eq!(table["X"].win_rate, 0.5);
        assert_eq!(table["X"].recent_form, 0.0);
        assert_eq!(table["Y"].recent_form, 1.0);

        let wider = TeamStatsAggregator::new(3)
            .with_form_window(7)
            .compute(&records, as_of());
        assert!((wider["X"].recent_form - 2.0 / 7.0).abs() < 1e-12);
    }

    #[test]
    fn test_short_history_form() {
        let records = vec![
            make_match("X", "Y", 13, 3, 0),
            make_match("X", "Y", 3, 13, 1),
        ];
        let table = TeamStatsAggregator::new(3).compute(&records, as_of());
        assert_eq!(table["X"].recent_form, 0.5);
    }

    #[test]
    fn test_window_excludes_old_matches() {
        let records = vec![
            make_match("Old", "Y", 13, 3, -200),
            make_match("X", "Y", 13, 3, 30),
        ];
        let table = TeamStatsAggregator::new(3).compute(&records, as_of());
        assert!(!table.contains_key("Old"));
        assert_eq!(table["Y"].matches_played, 1);
    }

    #[test]
    fn test_empty_stats_are_zero() {
        let stats = TeamStats::from_matches(&[], "Nobody", 5);
        assert_eq!(stats.matches_played, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.recent_form, 0.0);
        assert_eq!(stats.avg_rounds_won, 0.0);
        assert_eq!(stats.avg_rounds_lost, 0.0);
        assert_eq!(stats.round_diff, 0.0);
    }
}
