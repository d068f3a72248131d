/// End-to-end tests for the report pipeline.
///
/// Every test builds real `.xml.gz` / `.zip` reports inside a temporary
/// directory and runs the directory through the driver.
use anyhow::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};
use zip::write::SimpleFileOptions;

use dmarc_audit::error::DmarcError;
use dmarc_audit::export::read_table;
use dmarc_audit::models::SummaryFormat;
use dmarc_audit::rdns::StaticResolver;
use dmarc_audit::{analyze_directory, run, Config, FaultPolicy, NormalizedRecord};

fn record_xml(ip: &str, disposition: &str, spf: &str, dkim: &str, count: &str) -> String {
    format!(
        "<record><row><source_ip>{ip}</source_ip><count>{count}</count>\
         <policy_evaluated><disposition>{disposition}</disposition>\
         <dkim>{dkim}</dkim><spf>{spf}</spf></policy_evaluated></row>\
         <identifiers><header_from>example.com</header_from></identifiers></record>"
    )
}

fn report_xml(records: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<feedback>\
         <report_metadata><org_name>receiver.example</org_name><report_id>42</report_id></report_metadata>\
         <policy_published><domain>example.com</domain><p>reject</p></policy_published>\
         {}</feedback>",
        records.concat()
    )
}

fn write_gz(dir: &Path, name: &str, xml: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut gz = flate2::write::GzEncoder::new(File::create(&path)?, flate2::Compression::default());
    gz.write_all(xml.as_bytes())?;
    gz.finish()?;
    Ok(path)
}

fn write_zip(dir: &Path, name: &str, entries: &[(&str, &str)]) -> Result<PathBuf> {
    let path = dir.join(name);
    let mut zip = zip::ZipWriter::new(File::create(&path)?);
    for (entry, xml) in entries {
        zip.start_file(*entry, SimpleFileOptions::default())?;
        zip.write_all(xml.as_bytes())?;
    }
    zip.finish()?;
    Ok(path)
}

fn config_for(dir: &TempDir) -> Config {
    Config {
        report_dir: dir.path().to_path_buf(),
        output_path: dir.path().join("dmarc_report_analysis.csv"),
        reverse_dns: false,
        ..Config::default()
    }
}

#[test]
fn single_gzip_record() -> Result<()> {
    let dir = tempdir()?;
    let xml = report_xml(&[record_xml("203.0.113.5", "reject", "fail", "pass", "3")]);
    write_gz(dir.path(), "receiver.example!example.com!1!2.xml.gz", &xml)?;

    let analysis = analyze_directory(dir.path(), &config_for(&dir))?;
    assert_eq!(
        analysis.records,
        vec![NormalizedRecord {
            source_ip: "203.0.113.5".into(),
            disposition: "reject".into(),
            spf_result: "fail".into(),
            dkim_result: "pass".into(),
            count: 3,
        }]
    );
    assert_eq!(analysis.spf_failures.len(), 1);
    assert_eq!(analysis.spf_failures.get("203.0.113.5"), 3);
    assert!(analysis.dkim_failures.is_empty());
    assert_eq!(analysis.files_processed, 1);
    Ok(())
}

#[test]
fn zip_with_two_documents_sums_counts() -> Result<()> {
    let dir = tempdir()?;
    let first = report_xml(&[record_xml("198.51.100.9", "none", "fail", "pass", "2")]);
    let second = report_xml(&[record_xml("198.51.100.9", "quarantine", "fail", "pass", "5")]);
    write_zip(dir.path(), "batch.zip", &[("a.xml", first.as_str()), ("b.xml", second.as_str())])?;

    let analysis = analyze_directory(dir.path(), &config_for(&dir))?;
    assert_eq!(analysis.records.len(), 2);
    assert_eq!(analysis.spf_failures.len(), 1);
    assert_eq!(analysis.spf_failures.get("198.51.100.9"), 7);
    assert!(analysis.dkim_failures.is_empty());
    Ok(())
}

#[test]
fn empty_directory_yields_empty_results() -> Result<()> {
    let dir = tempdir()?;
    let reports = dir.path().join("DMARC");
    fs::create_dir(&reports)?;
    let config = Config {
        report_dir: reports,
        ..config_for(&dir)
    };

    let mut out = Vec::new();
    let analysis = run(&config, None, &mut out)?;
    assert!(analysis.records.is_empty());
    assert!(analysis.spf_failures.is_empty());
    assert!(analysis.dkim_failures.is_empty());
    assert_eq!(
        fs::read_to_string(&config.output_path)?,
        "source_ip,disposition,spf,dkim,count\n"
    );
    Ok(())
}

#[test]
fn unrecognized_files_are_ignored() -> Result<()> {
    let dir = tempdir()?;
    let xml = report_xml(&[record_xml("192.0.2.1", "none", "fail", "fail", "1")]);
    fs::write(dir.path().join("report.txt"), &xml)?;
    fs::write(dir.path().join("report.xml"), &xml)?;
    write_gz(dir.path(), "real.xml.gz", &xml)?;

    let analysis = analyze_directory(dir.path(), &config_for(&dir))?;
    assert_eq!(analysis.records.len(), 1);
    assert_eq!(analysis.files_processed, 1);
    assert_eq!(analysis.spf_failures.get("192.0.2.1"), 1);
    assert_eq!(analysis.dkim_failures.get("192.0.2.1"), 1);
    Ok(())
}

#[test]
fn row_count_matches_record_elements_and_aggregates_match_rows() -> Result<()> {
    let dir = tempdir()?;
    write_gz(
        dir.path(),
        "one.xml.gz",
        &report_xml(&[
            record_xml("192.0.2.1", "none", "fail", "pass", "4"),
            record_xml("192.0.2.2", "reject", "pass", "fail", "6"),
            record_xml("192.0.2.1", "none", "pass", "pass", "100"),
        ]),
    )?;
    write_zip(
        dir.path(),
        "two.zip",
        &[(
            "r.xml",
            report_xml(&[
                record_xml("192.0.2.1", "quarantine", "fail", "fail", "1"),
                record_xml("2001:db8::1", "none", "softfail", "fail", "9"),
            ])
            .as_str(),
        )],
    )?;

    let analysis = analyze_directory(dir.path(), &config_for(&dir))?;
    assert_eq!(analysis.records.len(), 5);
    assert_eq!(analysis.message_count(), 120);

    for (ip, count) in &analysis.spf_failures {
        let expected: u64 = analysis
            .records
            .iter()
            .filter(|r| &r.source_ip == ip && r.spf_result == "fail")
            .map(|r| r.count)
            .sum();
        assert_eq!(*count, expected);
    }
    assert_eq!(analysis.spf_failures.get("192.0.2.1"), 5);
    assert!(!analysis.spf_failures.contains("2001:db8::1"));
    assert_eq!(analysis.dkim_failures.get("192.0.2.2"), 6);
    assert_eq!(analysis.dkim_failures.get("192.0.2.1"), 1);
    assert_eq!(analysis.dkim_failures.get("2001:db8::1"), 9);
    Ok(())
}

#[test]
fn parallel_and_sequential_runs_agree() -> Result<()> {
    let dir = tempdir()?;
    for i in 0..6 {
        let xml = report_xml(&[
            record_xml("198.51.100.1", "none", "fail", "pass", &i.to_string()),
            record_xml(&format!("198.51.100.{}", 10 + i % 2), "reject", "pass", "fail", "2"),
        ]);
        write_gz(dir.path(), &format!("r{}.xml.gz", i), &xml)?;
    }

    let sequential = analyze_directory(dir.path(), &config_for(&dir))?;
    let parallel = analyze_directory(
        dir.path(),
        &Config {
            parallel: true,
            ..config_for(&dir)
        },
    )?;
    assert_eq!(sequential, parallel);
    assert_eq!(sequential.spf_failures.get("198.51.100.1"), 15);
    assert_eq!(sequential.dkim_failures.get("198.51.100.10"), 6);
    assert_eq!(sequential.dkim_failures.get("198.51.100.11"), 6);
    Ok(())
}

#[test]
fn corrupt_archive_aborts_by_default() -> Result<()> {
    let dir = tempdir()?;
    write_gz(dir.path(), "good.xml.gz", &report_xml(&[record_xml("192.0.2.1", "none", "fail", "pass", "1")]))?;
    fs::write(dir.path().join("broken.zip"), b"this is not a zip archive")?;

    let result = analyze_directory(dir.path(), &config_for(&dir));
    match result {
        Err(DmarcError::Report { path, source }) => {
            assert!(path.ends_with("broken.zip"));
            assert!(matches!(*source, DmarcError::Zip(_)));
        }
        other => panic!("expected a report error, got {:?}", other),
    }
    Ok(())
}

#[test]
fn malformed_record_aborts_by_default() -> Result<()> {
    let dir = tempdir()?;
    let xml = report_xml(&[
        record_xml("192.0.2.1", "none", "fail", "pass", "1"),
        "<record><row><source_ip>192.0.2.2</source_ip></row></record>".to_string(),
    ]);
    write_gz(dir.path(), "partial.xml.gz", &xml)?;

    let err = analyze_directory(dir.path(), &config_for(&dir)).unwrap_err();
    assert!(err.to_string().contains("partial.xml.gz"));
    assert!(err.to_string().contains("row/policy_evaluated/disposition"));
    Ok(())
}

#[test]
fn skip_policy_isolates_bad_inputs() -> Result<()> {
    let dir = tempdir()?;
    let good = report_xml(&[record_xml("192.0.2.1", "none", "fail", "pass", "2")]);
    let with_bad_record = report_xml(&[
        record_xml("192.0.2.1", "none", "fail", "pass", "3"),
        record_xml("192.0.2.3", "none", "fail", "pass", "many"),
    ]);
    write_gz(dir.path(), "a.xml.gz", &good)?;
    write_zip(
        dir.path(),
        "b.zip",
        &[("bad.xml", "<feedback><record>"), ("ok.xml", with_bad_record.as_str())],
    )?;
    fs::write(dir.path().join("c.zip"), b"garbage")?;

    let config = Config {
        fault_policy: FaultPolicy::Skip,
        ..config_for(&dir)
    };
    let analysis = analyze_directory(dir.path(), &config)?;
    assert_eq!(analysis.records.len(), 2);
    assert_eq!(analysis.spf_failures.get("192.0.2.1"), 5);
    assert!(!analysis.spf_failures.contains("192.0.2.3"));
    assert_eq!(analysis.files_processed, 2);

    let locations: Vec<&str> = analysis.skipped.iter().map(|s| s.location.as_str()).collect();
    assert_eq!(locations.len(), 3);
    assert!(locations.contains(&"b.zip!bad.xml"));
    assert!(locations.contains(&"b.zip!ok.xml record #2"));
    assert!(locations.iter().any(|l| l.ends_with("c.zip")));
    Ok(())
}

#[test]
fn run_exports_table_and_prints_failures() -> Result<()> {
    let dir = tempdir()?;
    write_gz(
        dir.path(),
        "r.xml.gz",
        &report_xml(&[
            record_xml("203.0.113.5", "reject", "fail", "pass", "3"),
            record_xml("203.0.113.77", "none", "fail", "fail", "1"),
        ]),
    )?;
    let config = config_for(&dir);
    let resolver = StaticResolver::new().with("203.0.113.5", "mail.sender.example");

    let mut out = Vec::new();
    let analysis = run(&config, Some(&resolver), &mut out)?;
    let text = String::from_utf8(out)?;

    assert!(text.contains("IP: 203.0.113.5, SPF Failures: 3, Reverse DNS: mail.sender.example"));
    assert!(text.contains("IP: 203.0.113.77, SPF Failures: 1, Reverse DNS: No reverse DNS found"));
    assert!(text.contains("IP: 203.0.113.77, DKIM Failures: 1"));
    assert!(!text.contains("IP: 203.0.113.5, DKIM"));

    let table = read_table(&config.output_path)?;
    assert_eq!(table, analysis.records);
    assert_eq!(table.len(), 2);
    Ok(())
}

#[test]
fn run_prints_json_summary() -> Result<()> {
    let dir = tempdir()?;
    write_gz(
        dir.path(),
        "r.xml.gz",
        &report_xml(&[record_xml("203.0.113.5", "reject", "fail", "pass", "3")]),
    )?;
    let config = Config {
        summary_format: SummaryFormat::Json,
        ..config_for(&dir)
    };

    let mut out = Vec::new();
    run(&config, None, &mut out)?;
    let value: serde_json::Value = serde_json::from_slice(&out)?;
    assert_eq!(value["files_processed"], 1);
    assert_eq!(value["spf_failures"]["203.0.113.5"], 3);
    assert_eq!(value["dispositions"]["reject"], 1);
    assert!(value["dkim_failures"].as_object().unwrap().is_empty());
    Ok(())
}
