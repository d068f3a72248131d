//! Data Models Module
//!
//! This module defines the row format every DMARC `<record>` is normalized into,
//! plus the small value types shared by the pipeline stages.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The only verdict that feeds the failure aggregates. Compared verbatim.
pub const FAIL: &str = "fail";

/// Column order of the exported table.
pub const TABLE_HEADER: [&str; 5] = ["source_ip", "disposition", "spf", "dkim", "count"];

/// One row per `<record>` element of a report.
///
/// Disposition and verdicts are kept as the report spelled them; values outside
/// `none`/`quarantine`/`reject` and `pass`/`fail` pass through untouched.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NormalizedRecord {
    pub source_ip: String,
    pub disposition: String,
    #[serde(rename = "spf")]
    pub spf_result: String,
    #[serde(rename = "dkim")]
    pub dkim_result: String,
    pub count: u64,
}

impl NormalizedRecord {
    pub fn spf_failed(&self) -> bool {
        self.spf_result == FAIL
    }

    pub fn dkim_failed(&self) -> bool {
        self.dkim_result == FAIL
    }
}

/// An input the run stepped over under [`FaultPolicy::Skip`].
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub location: String,
    pub reason: String,
}

/// What to do when a file, archive entry or record cannot be processed.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// The first bad input fails the whole run.
    #[default]
    Abort,
    /// Bad inputs are logged, recorded and stepped over.
    Skip,
}

/// Shape of the console summary.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    #[default]
    Text,
    Json,
}

impl fmt::Display for FaultPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultPolicy::Abort => write!(f, "abort"),
            FaultPolicy::Skip => write!(f, "skip"),
        }
    }
}

impl fmt::Display for SummaryFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SummaryFormat::Text => write!(f, "text"),
            SummaryFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for FaultPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" | "strict" => Ok(FaultPolicy::Abort),
            "skip" | "tolerant" => Ok(FaultPolicy::Skip),
            _ => Err(format!("Invalid fault policy: {}", s)),
        }
    }
}

impl FromStr for SummaryFormat {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(SummaryFormat::Text),
            "json" => Ok(SummaryFormat::Json),
            _ => Err(format!("Invalid summary format: {}", s)),
        }
    }
}
