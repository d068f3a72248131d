//! dmarc-audit - DMARC aggregate report auditor
//!
//! Reads every `.xml.gz` and `.zip` DMARC report in a directory, writes the
//! records to a CSV table and prints SPF/DKIM failure counts per source IP,
//! optionally with the reverse DNS name of each SPF failure source.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use dmarc_audit::export::read_table;
use dmarc_audit::models::SummaryFormat;
use dmarc_audit::rdns::{ReverseResolver, SystemResolver, UnavailableResolver};
use dmarc_audit::report::{write_disposition_chart, Summary};
use dmarc_audit::webhook::WebhookHandler;
use dmarc_audit::{Config, FaultPolicy};
use std::path::PathBuf;

/// CLI arguments for dmarc-audit.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "DMARC aggregate report auditor",
    long_about = "dmarc-audit reads DMARC aggregate reports (.xml.gz and .zip) from a directory, \
                  exports every record to a CSV table and lists SPF and DKIM failures per source IP.\n\n\
                  Defaults come from DMARC_* environment variables; flags override them."
)]
struct Cli {
    /// Directory holding the reports [default: ./DMARC]
    #[arg(value_parser)]
    dir: Option<PathBuf>,

    /// Path of the exported CSV table [default: dmarc_report_analysis.csv]
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Summary format: text, json
    #[arg(short, long)]
    format: Option<SummaryFormat>,

    /// Do not look up reverse DNS names for SPF failure sources
    #[arg(long)]
    no_reverse_dns: bool,

    /// Skip unreadable files and malformed records instead of aborting
    #[arg(long)]
    skip_invalid: bool,

    /// Process report files in parallel
    #[arg(long)]
    parallel: bool,

    /// Print a bar chart of record dispositions from the exported table
    #[arg(long)]
    chart: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(dir) = &self.dir {
            config.report_dir = dir.clone();
        }
        if let Some(output) = &self.output {
            config.output_path = output.clone();
        }
        if let Some(format) = self.format {
            config.summary_format = format;
        }
        if self.no_reverse_dns {
            config.reverse_dns = false;
        }
        if self.skip_invalid {
            config.fault_policy = FaultPolicy::Skip;
        }
        if self.parallel {
            config.parallel = true;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity.
    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(if cli.verbose { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    let mut config = Config::new().context("Failed to load configuration")?;
    cli.apply(&mut config);

    if config.summary_format == SummaryFormat::Text {
        println!(
            "{}\n{}\n",
            "dmarc-audit - DMARC Report Auditor".bold().green(),
            "Extracting, parsing & aggregating DMARC failures".dimmed()
        );
    }
    log::info!("Processing reports in {}", config.report_dir.display());

    let resolver: Option<Box<dyn ReverseResolver>> = if config.reverse_dns {
        match SystemResolver::new(config.dns_timeout) {
            Ok(resolver) => Some(Box::new(resolver)),
            Err(e) => {
                log::warn!("System resolver unavailable: {}", e);
                Some(Box::new(UnavailableResolver::new(e)))
            }
        }
    } else {
        None
    };

    let mut stdout = std::io::stdout().lock();
    let analysis = dmarc_audit::run(&config, resolver.as_deref(), &mut stdout)
        .context("DMARC analysis failed")?;

    if cli.chart {
        let table = read_table(&config.output_path).context("Failed to read exported table")?;
        write_disposition_chart(&mut stdout, &table)?;
    }

    if let Some(url) = &config.webhook_url {
        log::info!("Sending results to webhook: {}", url);
        let handler = WebhookHandler::new(url, config.webhook_timeout, config.webhook_retries)?;
        handler.send(&Summary::new(&analysis, None))?;
    }

    log::info!("{}", "Analysis complete!".bold().cyan());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from([
            "dmarc-audit",
            "reports",
            "--output",
            "out.csv",
            "--format",
            "json",
            "--no-reverse-dns",
            "--skip-invalid",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.report_dir, PathBuf::from("reports"));
        assert_eq!(config.output_path, PathBuf::from("out.csv"));
        assert_eq!(config.summary_format, SummaryFormat::Json);
        assert!(!config.reverse_dns);
        assert_eq!(config.fault_policy, FaultPolicy::Skip);
        assert!(!config.parallel);
    }

    #[test]
    fn test_cli_defaults_leave_config_alone() {
        let cli = Cli::parse_from(["dmarc-audit"]);
        let mut config = Config::default();
        cli.apply(&mut config);
        assert_eq!(config.report_dir, PathBuf::from("./DMARC"));
        assert!(config.reverse_dns);
        assert_eq!(config.fault_policy, FaultPolicy::Abort);
    }

    #[test]
    fn test_invalid_format_rejected() {
        assert!(Cli::try_parse_from(["dmarc-audit", "--format", "yaml"]).is_err());
    }
}
