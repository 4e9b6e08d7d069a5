//! Validated, time-ordered collection of completed matches

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use crate::data::Database;
use crate::{MatchRecord, PredictError, Result, Side, UNKNOWN_EVENT};

/// Sentinel used by match sources for a score that was never recorded
pub const MISSING_SCORE: &str = "N/A";

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// A score or winner cell, which sources deliver as numbers or strings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    /// Anything else, including null; never parses
    Other(serde_json::Value),
}

impl RawValue {
    /// Round score, None for the sentinel or anything non-integral
    pub fn score(&self) -> Option<u32> {
        match self {
            RawValue::Number(v) => whole(*v).and_then(|v| u32::try_from(v).ok()),
            RawValue::Text(s) => parse_score(s),
            RawValue::Other(_) => None,
        }
    }

    fn whole(&self) -> Option<u64> {
        match self {
            RawValue::Number(v) => whole(*v),
            RawValue::Text(s) => parse_whole(s),
            RawValue::Other(_) => None,
        }
    }
}

impl Default for RawValue {
    fn default() -> Self {
        RawValue::Other(serde_json::Value::Null)
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Number(v)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Number(v) => write!(f, "{}", v),
            RawValue::Text(s) => write!(f, "{:?}", s),
            RawValue::Other(v) => write!(f, "{}", v),
        }
    }
}

/// One row as delivered by an external source, before cleaning
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawMatchRow {
    pub team_1: String,
    pub team_2: String,
    #[serde(default)]
    pub score_1: RawValue,
    #[serde(default)]
    pub score_2: RawValue,
    #[serde(default)]
    pub winner: RawValue,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub map: Option<String>,
    #[serde(default, alias = "scrape_date")]
    pub date: Option<String>,
}

/// Cleaned match records in the order the source delivered them
#[derive(Debug, Clone, Default)]
pub struct MatchRecordStore {
    records: Vec<MatchRecord>,
    dropped: usize,
}

impl MatchRecordStore {
    /// Wrap records that are already validated
    pub fn from_records(records: Vec<MatchRecord>) -> Self {
        MatchRecordStore {
            records,
            dropped: 0,
        }
    }

    /// Clean raw rows, dropping any row with a malformed field
    pub fn from_rows(rows: impl IntoIterator<Item = RawMatchRow>) -> Self {
        let mut records = Vec::new();
        let mut dropped = 0;

        for (line, row) in rows.into_iter().enumerate() {
            match clean_row(&row) {
                Ok(record) => records.push(record),
                Err(e) => {
                    log::debug!("Dropping row {}: {}", line + 1, e);
                    dropped += 1;
                }
            }
        }

        log::info!(
            "{} matches with valid scores ({} rows dropped)",
            records.len(),
            dropped
        );

        MatchRecordStore { records, dropped }
    }

    /// Load raw rows from a JSON array file
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PredictError::Data(format!(
                "match source {} not found",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        let rows: Vec<RawMatchRow> = serde_json::from_str(&content)?;
        log::info!("Loaded {} rows from {}", rows.len(), path.display());
        Ok(Self::from_rows(rows))
    }

    /// Load every stored match in chronological order
    pub fn from_database(db: &Database) -> Result<Self> {
        Ok(Self::from_records(db.get_all_matches()?))
    }

    pub fn records(&self) -> &[MatchRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rows rejected during cleaning
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Fail unless at least `required` usable records are present
    pub fn ensure_min_records(&self, required: usize) -> Result<()> {
        if self.records.len() < required {
            return Err(PredictError::InsufficientData {
                found: self.records.len(),
                required,
            });
        }
        Ok(())
    }

    pub fn has_timestamps(&self) -> bool {
        self.records.iter().any(|r| r.played_at.is_some())
    }

    pub fn has_map_labels(&self) -> bool {
        self.records.iter().any(|r| r.map.is_some())
    }

    /// Every team appearing on either side
    pub fn teams(&self) -> BTreeSet<String> {
        self.records
            .iter()
            .flat_map(|r| [r.team_1.clone(), r.team_2.clone()])
            .collect()
    }

    pub fn latest_timestamp(&self) -> Option<NaiveDateTime> {
        self.records.iter().filter_map(|r| r.played_at).max()
    }
}

fn clean_row(row: &RawMatchRow) -> Result<MatchRecord> {
    let score_1 = row
        .score_1
        .score()
        .ok_or_else(|| PredictError::Parse(format!("bad score_1 {}", row.score_1)))?;
    let score_2 = row
        .score_2
        .score()
        .ok_or_else(|| PredictError::Parse(format!("bad score_2 {}", row.score_2)))?;
    let winner = row
        .winner
        .whole()
        .and_then(|v| u8::try_from(v).ok())
        .and_then(Side::from_indicator)
        .ok_or_else(|| PredictError::Parse(format!("bad winner {}", row.winner)))?;

    let mut record = MatchRecord::new(row.team_1.trim(), row.team_2.trim(), score_1, score_2, winner)?;

    record.event = row
        .event
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .unwrap_or(UNKNOWN_EVENT)
        .to_string();
    record.map = row
        .map
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string);
    record.played_at = row.date.as_deref().and_then(parse_timestamp);

    Ok(record)
}

/// Parse a round score; the sentinel and anything non-integral is missing
pub fn parse_score(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw == MISSING_SCORE {
        return None;
    }
    parse_whole(raw).and_then(|v| u32::try_from(v).ok())
}

fn parse_whole(raw: &str) -> Option<u64> {
    whole(raw.trim().parse().ok()?)
}

fn whole(value: f64) -> Option<u64> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Some(value as u64)
    } else {
        None
    }
}

/// Parse a timestamp or bare date; anything else is treated as missing
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
