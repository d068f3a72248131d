//! Pipeline Driver Module
//!
//! Walks the report directory, runs every recognized file through the archive
//! reader and the record extractor, and folds the per-file results into one
//! [`Analysis`]. Nothing is written until the whole directory has been read.
use crate::aggregate::Analysis;
use crate::archive::{ReportArchive, ReportFormat};
use crate::config::Config;
use crate::error::{DmarcError, Result};
use crate::export::write_table;
use crate::models::{FaultPolicy, SummaryFormat};
use crate::rdns::{resolve_all, ReverseResolver};
use crate::report::{write_failure_summary, write_json_summary, Summary};
use crate::xml_parser::extract_document;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Lists the report files directly inside `dir`, sorted by name.
///
/// Subdirectories are not entered and files without a recognized suffix are ignored.
pub fn report_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type()?.is_file() {
            debug!("Ignoring non-file entry {}", path.display());
            continue;
        }
        if ReportFormat::detect(&path).is_none() {
            debug!("Ignoring {}: not a DMARC report", path.display());
            continue;
        }
        files.push(path);
    }
    files.sort();
    Ok(files)
}

/// Extracts every document of one report file.
///
/// Under [`FaultPolicy::Skip`] an unreadable or unparseable document is recorded
/// and the remaining documents of the file are still processed.
pub fn process_report(path: &Path, config: &Config) -> Result<Analysis> {
    let mut analysis = Analysis::new();
    let archive = ReportArchive::open(path, &config.limits)?;
    let origin = archive.origin().to_string();
    for document in archive {
        let (location, extracted) = match document {
            Ok(doc) => {
                let extracted = extract_document(&doc, config.fault_policy);
                (doc.origin, extracted)
            }
            Err(e) => (origin.clone(), Err(e)),
        };
        match extracted {
            Ok(partial) => analysis.merge(partial),
            Err(e) if config.fault_policy == FaultPolicy::Skip => {
                warn!("Skipping {}: {}", location, e);
                analysis.skip(location, e);
            }
            Err(e) => return Err(e),
        }
    }
    analysis.files_processed = 1;
    info!("{}: {} records", origin, analysis.records.len());
    Ok(analysis)
}

/// Reads every report in `dir` and returns the combined rows and aggregates.
///
/// With `config.parallel` files are processed on the rayon pool; the per-file
/// results are still merged in file-name order.
pub fn analyze_directory(dir: &Path, config: &Config) -> Result<Analysis> {
    let files = report_files(dir)?;
    info!("Found {} report files in {}", files.len(), dir.display());

    let process = |path: &PathBuf| {
        process_report(path, config).map_err(|e| DmarcError::Report {
            path: path.clone(),
            source: Box::new(e),
        })
    };
    let results: Vec<Result<Analysis>> = if config.parallel {
        files.par_iter().map(process).collect()
    } else {
        // Sequential runs stop reading at the first failure under Abort.
        let mut results = Vec::with_capacity(files.len());
        for path in &files {
            let result = process(path);
            let failed = result.is_err();
            results.push(result);
            if failed && config.fault_policy == FaultPolicy::Abort {
                break;
            }
        }
        results
    };

    let mut analysis = Analysis::new();
    for (path, result) in files.iter().zip(results) {
        match (result, config.fault_policy) {
            (Ok(partial), _) => analysis.merge(partial),
            (Err(e), FaultPolicy::Abort) => return Err(e),
            (Err(e), FaultPolicy::Skip) => {
                warn!("{}", e);
                analysis.skip(path.display().to_string(), source_of(e));
            }
        }
    }
    Ok(analysis)
}

/// Full run: analyze `config.report_dir`, export the table to
/// `config.output_path`, and write the console summary to `out`.
///
/// Reverse DNS names are looked up for SPF failure sources only when a
/// `resolver` is supplied. Returns the final analysis for further use.
pub fn run(
    config: &Config,
    resolver: Option<&dyn ReverseResolver>,
    out: &mut dyn Write,
) -> Result<Analysis> {
    let analysis = analyze_directory(&config.report_dir, config)?;
    write_table(&config.output_path, &analysis.records)?;
    info!(
        "Exported {} rows to {}",
        analysis.records.len(),
        config.output_path.display()
    );

    let reverse_dns = resolver.map(|r| resolve_all(&analysis.spf_failures, r));
    match config.summary_format {
        SummaryFormat::Text => {
            write_failure_summary(out, &analysis, &config.output_path, reverse_dns.as_ref())?
        }
        SummaryFormat::Json => {
            write_json_summary(out, &Summary::new(&analysis, reverse_dns.as_ref()))?
        }
    }
    Ok(analysis)
}

/// Drops the outer file wrapper; the skip entry already names the file.
fn source_of(error: DmarcError) -> DmarcError {
    match error {
        DmarcError::Report { source, .. } => *source,
        other => other,
    }
}
