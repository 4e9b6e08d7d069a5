//! Match record ingestion and storage
//!
//! Cleaning of raw source rows and SQLite persistence of completed matches.

pub mod database;
pub mod store;

pub use database::Database;
pub use store::{MatchRecordStore, RawMatchRow};
