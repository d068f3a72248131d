//! Table Export Module
//!
//! Writes the normalized rows to a flat CSV table and reads such a table back.
use crate::error::Result;
use crate::models::{NormalizedRecord, TABLE_HEADER};
use std::io::{Read, Write};
use std::path::Path;

/// Writes `records` as CSV to `writer`: a header row, then one row per record.
///
/// The header is written even when there are no records.
pub fn write_records<W: Write>(writer: W, records: &[NormalizedRecord]) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(TABLE_HEADER)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the table to `path`, replacing any previous export.
pub fn write_table(path: &Path, records: &[NormalizedRecord]) -> Result<()> {
    let file = std::fs::File::create(path)?;
    write_records(file, records)
}

pub fn read_records<R: Read>(reader: R) -> Result<Vec<NormalizedRecord>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut records = Vec::new();
    for row in rdr.deserialize::<NormalizedRecord>() {
        records.push(row?);
    }
    Ok(records)
}

/// Reads a table previously produced by [`write_table`].
pub fn read_table(path: &Path) -> Result<Vec<NormalizedRecord>> {
    read_records(std::fs::File::open(path)?)
}
