//! Error types for name resolution, metadata registration and loading

use projection_store::{GameQuery, StoreError};
use thiserror::Error;

use crate::names::{format_candidates, ScoredCandidate};

/// Result type alias for loader operations
pub type Result<T> = std::result::Result<T, LoaderError>;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No disambiguation entry and no exact fuzzy match
    #[error(
        "Could not resolve '{name}'; add a name disambiguation entry. Closest matches:\n{}",
        format_candidates(.candidates)
    )]
    UnresolvedName { name: String, candidates: Vec<ScoredCandidate> },

    #[error("No game found for team {team} vs {opp} ({query})")]
    NoGameMatch { query: GameQuery, team: String, opp: String },

    #[error("Several games found for team {team} vs {opp} ({query}): {}", .gsis_ids.join(", "))]
    AmbiguousGameMatch { query: GameQuery, team: String, opp: String, gsis_ids: Vec<String> },

    #[error("Unrecognized column(s): {}", .columns.join(", "))]
    UnrecognizedColumn { columns: Vec<String> },

    #[error("Column '{column}' is required to {purpose}")]
    MissingColumn { column: String, purpose: &'static str },

    #[error("Column '{column}' is null in {rows} row(s)")]
    MissingValue { column: String, rows: usize },

    #[error("Metadata field '{field}' is required by {table}")]
    MissingMetadata { table: &'static str, field: String },

    #[error("Expected a single week but the dataset holds weeks {}", format_weeks(.weeks))]
    MultipleWeeks { weeks: Vec<i64> },

    #[error("Invalid value for {column}: {message}")]
    InvalidValue { column: String, message: String },

    /// Fantasy-point data cannot be stored under the unscored `None` system
    #[error("{table} rows need a scoring system but fpsys_name is 'None'")]
    UnscoredSystem { table: &'static str },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

fn format_weeks(weeks: &[i64]) -> String {
    weeks.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl LoaderError {
    pub fn invalid_value(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue { column: column.into(), message: message.into() }
    }

    pub fn missing_metadata(table: &'static str, field: impl Into<String>) -> Self {
        Self::MissingMetadata { table, field: field.into() }
    }
}
