//! SQLite storage for completed matches

use crate::{MatchRecord, PredictError, Result, Side};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS matches (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                played_at TEXT,
                team_1 TEXT NOT NULL,
                team_2 TEXT NOT NULL,
                score_1 INTEGER NOT NULL,
                score_2 INTEGER NOT NULL,
                winner INTEGER NOT NULL CHECK (winner IN (1, 2)),
                event TEXT NOT NULL,
                map TEXT,
                UNIQUE(played_at, team_1, team_2, map)
            );

            CREATE INDEX IF NOT EXISTS idx_matches_played_at ON matches(played_at);
            CREATE INDEX IF NOT EXISTS idx_matches_teams ON matches(team_1, team_2);
            "#,
        )?;
        Ok(())
    }

    /// Insert or update a match record
    pub fn upsert_match(&self, record: &MatchRecord) -> Result<()> {
        upsert_with(&self.conn, record)
    }

    /// Insert multiple match records in one transaction
    pub fn upsert_matches(&mut self, records: &[MatchRecord]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for record in records {
            upsert_with(&tx, record)?;
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Get all matches in chronological order
    pub fn get_all_matches(&self) -> Result<Vec<MatchRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT played_at, team_1, team_2, score_1, score_2, winner, event, map
             FROM matches
             ORDER BY played_at, id",
        )?;

        let rows = stmt
            .query_map([], Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().collect()
    }

    /// Get matches for a team in chronological order
    pub fn get_team_matches(&self, team: &str) -> Result<Vec<MatchRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT played_at, team_1, team_2, score_1, score_2, winner, event, map
             FROM matches
             WHERE team_1 = ?1 OR team_2 = ?1
             ORDER BY played_at, id",
        )?;

        let rows = stmt
            .query_map(params![team], Self::row_to_match)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().collect()
    }

    fn row_to_match(row: &rusqlite::Row) -> rusqlite::Result<Result<MatchRecord>> {
        let played_at: Option<String> = row.get(0)?;
        let winner: u8 = row.get(5)?;
        let team_1: String = row.get(1)?;
        let team_2: String = row.get(2)?;
        let score_1: u32 = row.get(3)?;
        let score_2: u32 = row.get(4)?;
        let event: String = row.get(6)?;
        let map: Option<String> = row.get(7)?;

        let record = Side::from_indicator(winner)
            .ok_or_else(|| PredictError::Parse(format!("stored winner {} is invalid", winner)))
            .and_then(|side| MatchRecord::new(team_1, team_2, score_1, score_2, side))
            .map(|mut record| {
                record.event = event;
                record.map = map;
                record.played_at = played_at
                    .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok());
                record
            });
        Ok(record)
    }

    // ==================== Statistics ====================

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let match_count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM matches", [], |row| row.get(0))?;

        let team_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM (SELECT team_1 FROM matches UNION SELECT team_2 FROM matches)",
            [],
            |row| row.get(0),
        )?;

        let map_count: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT map) FROM matches WHERE map IS NOT NULL",
            [],
            |row| row.get(0),
        )?;

        let min_date: Option<String> = self
            .conn
            .query_row("SELECT MIN(played_at) FROM matches", [], |row| row.get(0))
            .optional()?
            .flatten();

        let max_date: Option<String> = self
            .conn
            .query_row("SELECT MAX(played_at) FROM matches", [], |row| row.get(0))
            .optional()?
            .flatten();

        Ok(DatabaseStats {
            match_count: match_count as usize,
            team_count: team_count as usize,
            map_count: map_count as usize,
            earliest_match: min_date
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok()),
            latest_match: max_date
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT).ok()),
        })
    }
}

fn upsert_with(conn: &Connection, record: &MatchRecord) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO matches (played_at, team_1, team_2, score_1, score_2, winner, event, map)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        ON CONFLICT(played_at, team_1, team_2, map) DO UPDATE SET
            score_1 = excluded.score_1,
            score_2 = excluded.score_2,
            winner = excluded.winner,
            event = excluded.event
        "#,
        params![
            record
                .played_at
                .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string()),
            record.team_1,
            record.team_2,
            record.score_1,
            record.score_2,
            record.winner.indicator(),
            record.event,
            record.map,
        ],
    )?;
    Ok(())
}

/// Database statistics
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub match_count: usize,
    pub team_count: usize,
    pub map_count: usize,
    pub earliest_match: Option<NaiveDateTime>,
    pub latest_match: Option<NaiveDateTime>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    fn make_match(team_1: &str, team_2: &str, day: u32) -> MatchRecord {
        MatchRecord::new(team_1, team_2, 13, 8, Side::One)
            .unwrap()
            .with_event("BLAST Premier")
            .with_map("Mirage")
            .with_played_at(at(day))
    }

    #[test]
    fn test_create_database() {
        let db = Database::in_memory().unwrap();
        let stats = db.get_stats().unwrap();
        assert_eq!(stats.team_count, 0);
        assert_eq!(stats.match_count, 0);
        assert!(stats.earliest_match.is_none());
    }

    #[test]
    fn test_insert_and_read_back() {
        let mut db = Database::in_memory().unwrap();
        let records = vec![
            make_match("Vitality", "NAVI", 5),
            make_match("FaZe", "Vitality", 2),
        ];
        assert_eq!(db.upsert_matches(&records).unwrap(), 2);

        let all = db.get_all_matches().unwrap();
        assert_eq!(all.len(), 2);
        // Chronological regardless of insert order
        assert_eq!(all[0].team_1, "FaZe");
        assert_eq!(all[1], records[0]);

        let stats = db.get_stats().unwrap();
        assert_eq!(stats.match_count, 2);
        assert_eq!(stats.team_count, 3);
        assert_eq!(stats.map_count, 1);
        assert_eq!(stats.earliest_match, Some(at(2)));
        assert_eq!(stats.latest_match, Some(at(5)));
    }

    #[test]
    fn test_upsert_replaces_same_match() {
        let db = Database::in_memory().unwrap();
        let first = make_match("Vitality", "NAVI", 5);
        db.upsert_match(&first).unwrap();

        let mut corrected = first.clone();
        corrected.score_1 = 16;
        corrected.score_2 = 14;
        db.upsert_match(&corrected).unwrap();

        let all = db.get_all_matches().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].score_1, 16);
    }

    #[test]
    fn test_team_matches() {
        let mut db = Database::in_memory().unwrap();
        db.upsert_matches(&[
            make_match("Vitality", "NAVI", 1),
            make_match("FaZe", "G2", 2),
            make_match("NAVI", "G2", 3),
        ])
        .unwrap();
        let navi = db.get_team_matches("NAVI").unwrap();
        assert_eq!(navi.len(), 2);
        assert!(navi.iter().all(|m| m.involves("NAVI")));
    }
}
