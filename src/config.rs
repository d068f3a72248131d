//! Configuration Module
//!
//! This module reads configuration values from environment variables, provides
//! sensible defaults, and validates key security parameters such as maximum file
//! sizes and decompression limits.

use crate::models::{FaultPolicy, SummaryFormat};
use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Limits applied while opening report archives.
#[derive(Debug, Clone)]
pub struct ArchiveLimits {
    pub max_file_size: usize,
    pub max_decompressed_size: usize,
    pub max_files_in_zip: usize,
    pub max_compression_ratio: f64,
    pub max_filename_length: usize,
}

impl Default for ArchiveLimits {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            max_decompressed_size: 100 * 1024 * 1024,
            max_files_in_zip: 1000,
            max_compression_ratio: 1000.0,
            max_filename_length: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub report_dir: PathBuf,
    pub output_path: PathBuf,
    pub reverse_dns: bool,
    pub dns_timeout: Duration,
    pub fault_policy: FaultPolicy,
    pub parallel: bool,
    pub summary_format: SummaryFormat,
    pub webhook_url: Option<String>,
    pub webhook_timeout: Duration,
    pub webhook_retries: u32,
    pub limits: ArchiveLimits,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            report_dir: PathBuf::from("./DMARC"),
            output_path: PathBuf::from("dmarc_report_analysis.csv"),
            reverse_dns: true,
            dns_timeout: Duration::from_secs(5),
            fault_policy: FaultPolicy::Abort,
            parallel: false,
            summary_format: SummaryFormat::Text,
            webhook_url: None,
            webhook_timeout: Duration::from_secs(30),
            webhook_retries: 3,
            limits: ArchiveLimits::default(),
        }
    }
}

impl Config {
    /// Creates a new configuration by reading environment variables.
    /// If a variable is missing or empty, a default value is used.
    pub fn new() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };
        let number = |key: &str| var(key).and_then(|s| s.parse::<u64>().ok());
        let defaults = Config::default();

        // Read max file size from env or use default 10MB.
        let max_file_size = number("DMARC_MAX_FILE_SIZE")
            .map(|n| n as usize)
            .unwrap_or(defaults.limits.max_file_size);

        if max_file_size > 500_000_000 {
            return Err(anyhow!("Max file size too large (500MB limit)"));
        }

        let limits = ArchiveLimits {
            max_file_size,
            max_decompressed_size: number("DMARC_MAX_DECOMPRESSED_SIZE")
                .map(|n| n as usize)
                .unwrap_or(defaults.limits.max_decompressed_size),
            max_files_in_zip: number("DMARC_MAX_FILES_IN_ZIP")
                .map(|n| n as usize)
                .unwrap_or(defaults.limits.max_files_in_zip),
            max_compression_ratio: var("DMARC_MAX_COMPRESSION_RATIO")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.limits.max_compression_ratio),
            max_filename_length: number("DMARC_MAX_FILENAME_LENGTH")
                .map(|n| n as usize)
                .unwrap_or(defaults.limits.max_filename_length),
        };

        // For webhook_timeout, try DMARC_WEBHOOK_TIMEOUT_SECS then DMARC_WEBHOOK_TIMEOUT.
        let webhook_timeout = number("DMARC_WEBHOOK_TIMEOUT_SECS")
            .or_else(|| number("DMARC_WEBHOOK_TIMEOUT"))
            .map(Duration::from_secs)
            .unwrap_or(defaults.webhook_timeout);

        let webhook_retries = number("DMARC_WEBHOOK_RETRIES")
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(defaults.webhook_retries);

        let dns_timeout = number("DMARC_DNS_TIMEOUT_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.dns_timeout);

        let reverse_dns = match var("DMARC_REVERSE_DNS") {
            Some(s) => parse_flag("DMARC_REVERSE_DNS", &s)?,
            None => defaults.reverse_dns,
        };
        let parallel = match var("DMARC_PARALLEL") {
            Some(s) => parse_flag("DMARC_PARALLEL", &s)?,
            None => defaults.parallel,
        };
        let fault_policy = parse_or("DMARC_FAULT_POLICY", var("DMARC_FAULT_POLICY"), defaults.fault_policy)?;
        let summary_format =
            parse_or("DMARC_SUMMARY_FORMAT", var("DMARC_SUMMARY_FORMAT"), defaults.summary_format)?;

        Ok(Config {
            report_dir: var("DMARC_REPORT_DIR").map(PathBuf::from).unwrap_or(defaults.report_dir),
            output_path: var("DMARC_OUTPUT_CSV").map(PathBuf::from).unwrap_or(defaults.output_path),
            reverse_dns,
            dns_timeout,
            fault_policy,
            parallel,
            summary_format,
            webhook_url: var("DMARC_WEBHOOK_URL"),
            webhook_timeout,
            webhook_retries,
            limits,
        })
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow!("{} must be a boolean, got '{}'", key, value)),
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr<Err = String>,
{
    match value {
        Some(s) => s.parse().map_err(|e| anyhow!("{}: {}", key, e)),
        None => Ok(default),
    }
}
