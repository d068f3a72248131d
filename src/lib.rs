//! dmarc-audit Library
//!
//! This library provides the core functionality for dmarc-audit: reading DMARC
//! aggregate reports out of gzip and zip files, normalizing their records into a
//! flat table, aggregating SPF and DKIM failures per source IP, and reporting
//! the results (CSV export, console summary, reverse DNS, webhook).

pub mod aggregate;
pub mod archive;
pub mod config;
pub mod error;
pub mod export;
pub mod models;
pub mod pipeline;
pub mod rdns;
pub mod report;
pub mod webhook;
pub mod xml_parser;

pub use aggregate::{Analysis, FailureAggregate};
pub use archive::{ReportArchive, ReportFormat, XmlDocument};
pub use config::Config;
pub use models::{FaultPolicy, NormalizedRecord};
pub use pipeline::{analyze_directory, run};
pub use xml_parser::parse_dmarc_xml;
