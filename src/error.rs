//! Error Handling Module
//!
//! This module defines custom error types for the auditor using the `thiserror` crate.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DmarcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("File too large: {0}")]
    FileTooLarge(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Malformed record #{position} in {document}: {reason}")]
    MalformedRecord {
        document: String,
        position: usize,
        reason: RecordError,
    },

    #[error("Failed to process {}: {source}", path.display())]
    Report {
        path: PathBuf,
        source: Box<DmarcError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Why a single `<record>` element could not be turned into a row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid message count `{0}`")]
    InvalidCount(String),
}

pub type Result<T> = std::result::Result<T, DmarcError>;
