//! Unified application error type.
//! All modules (db, core, adapters, cli) return AppError to keep the error
//! handling consistent and easy to manage.

use std::io;
use thiserror::Error;

use crate::adapters::AdapterError;

#[derive(Error, Debug)]
pub enum AppError {
    // ---------------------------
    // IO
    // ---------------------------
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // ---------------------------
    // Database-related
    // ---------------------------
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("Database migration error: {0}")]
    Migration(String),

    // ---------------------------
    // Parsing errors
    // ---------------------------
    #[error("Invalid date/time: {0}")]
    InvalidDateTime(String),

    #[error("Invalid range: end {end} is before start {start}")]
    InvalidRange { start: String, end: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // ---------------------------
    // Sync errors
    // ---------------------------
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(#[from] AdapterError),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("A sync run for device '{0}' is already in progress")]
    SyncInProgress(String),

    // ---------------------------
    // Config file errors
    // ---------------------------
    #[error("Failed to load configuration: {0}")]
    ConfigLoad(String),

    // ---------------------------
    // Export errors
    // ---------------------------
    #[error("Export error: {0}")]
    Export(#[from] csv::Error),

    // ---------------------------
    // Generic fallback
    // ---------------------------
    #[error("Internal error: {0}")]
    Other(String),
}

pub type AppResult<T> = Result<T, AppError>;
