//! Console Report Module
//!
//! Renders the end-of-run output: the per-IP failure lines, a JSON summary for
//! machine consumers, and a disposition bar chart over the exported table.
use crate::aggregate::{Analysis, FailureAggregate};
use crate::models::{NormalizedRecord, SkippedItem};
use crate::rdns::ReverseDns;
use colored::*;
use prettytable::{format, row, Table};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::Path;

const BAR_WIDTH: usize = 40;

/// Run summary shared by the JSON output and the webhook payload.
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub files_processed: usize,
    pub record_count: usize,
    pub message_count: u64,
    pub spf_failures: FailureAggregate,
    pub dkim_failures: FailureAggregate,
    pub dispositions: BTreeMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reverse_dns: Option<BTreeMap<String, ReverseDns>>,
    pub skipped: Vec<SkippedItem>,
}

impl Summary {
    pub fn new(analysis: &Analysis, reverse_dns: Option<&BTreeMap<String, ReverseDns>>) -> Self {
        Self {
            files_processed: analysis.files_processed,
            record_count: analysis.records.len(),
            message_count: analysis.message_count(),
            spf_failures: analysis.spf_failures.clone(),
            dkim_failures: analysis.dkim_failures.clone(),
            dispositions: disposition_counts(&analysis.records),
            reverse_dns: reverse_dns.cloned(),
            skipped: analysis.skipped.clone(),
        }
    }
}

/// Writes the human-readable failure summary.
///
/// One `IP: <ip>, SPF Failures: <n>` line per SPF entry, suffixed with the
/// reverse DNS name when `reverse_dns` is given, then one
/// `IP: <ip>, DKIM Failures: <n>` line per DKIM entry.
pub fn write_failure_summary<W: Write + ?Sized>(
    out: &mut W,
    analysis: &Analysis,
    output_path: &Path,
    reverse_dns: Option<&BTreeMap<String, ReverseDns>>,
) -> io::Result<()> {
    writeln!(
        out,
        "Analysis complete, saved to '{}'",
        output_path.display()
    )?;

    writeln!(out, "\n{}", "SPF Failures (IP addresses and counts):".bold())?;
    for (ip, count) in &analysis.spf_failures {
        match reverse_dns {
            Some(names) => {
                let host = names
                    .get(ip)
                    .map(ReverseDns::display_name)
                    .unwrap_or(crate::rdns::NO_REVERSE_DNS);
                writeln!(out, "IP: {}, SPF Failures: {}, Reverse DNS: {}", ip, count, host)?;
            }
            None => writeln!(out, "IP: {}, SPF Failures: {}", ip, count)?,
        }
    }

    writeln!(out, "\n{}", "DKIM Failures (IP addresses and counts):".bold())?;
    for (ip, count) in &analysis.dkim_failures {
        writeln!(out, "IP: {}, DKIM Failures: {}", ip, count)?;
    }

    if !analysis.skipped.is_empty() {
        writeln!(
            out,
            "\n{}",
            format!("Skipped {} invalid inputs:", analysis.skipped.len()).yellow()
        )?;
        for item in &analysis.skipped {
            writeln!(out, "  {}: {}", item.location, item.reason)?;
        }
    }
    Ok(())
}

pub fn write_json_summary<W: Write + ?Sized>(out: &mut W, summary: &Summary) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, summary)?;
    writeln!(out)
}

/// Number of rows (not messages) per disposition value.
pub fn disposition_counts(records: &[NormalizedRecord]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.disposition.clone()).or_insert(0) += 1;
    }
    counts
}

/// Bar chart of rows per disposition, largest first.
pub fn disposition_chart(counts: &BTreeMap<String, usize>) -> Table {
    let mut bars: Vec<(&String, &usize)> = counts.iter().collect();
    bars.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    let max = bars.first().map(|(_, n)| **n).unwrap_or(0);

    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table.set_titles(row![b->"Disposition", b->"Count", ""]);
    for (disposition, count) in bars {
        let width = if max == 0 { 0 } else { (count * BAR_WIDTH).div_ceil(max) };
        let label = if disposition.is_empty() { "(empty)" } else { disposition.as_str() };
        table.add_row(row![label, r->count, "█".repeat(width)]);
    }
    table
}

pub fn write_disposition_chart<W: Write + ?Sized>(
    out: &mut W,
    records: &[NormalizedRecord],
) -> io::Result<()> {
    writeln!(out, "\n{}", "DMARC Disposition Results".bold().blue())?;
    let counts = disposition_counts(records);
    if counts.is_empty() {
        writeln!(out, "{}", "No DMARC records found.".yellow())?;
        return Ok(());
    }
    disposition_chart(&counts).print(out)?;
    Ok(())
}
