//! Archive Reader Module
//!
//! This module opens DMARC report files and yields the XML documents they carry:
//! one for a gzip-compressed `.xml.gz` report, one per entry for a `.zip` container.
//! It enforces security measures including file size limits, maximum decompressed
//! size, file count, compression ratio, filename length, and path traversal prevention.
//!
//! Documents are returned as UTF-8 text. A document in any other encoding is
//! rejected, whatever its XML declaration says.
use crate::config::ArchiveLimits;
use crate::error::{DmarcError, Result};
use flate2::read::MultiGzDecoder;
use log::debug;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use zip::ZipArchive;

const BUFFER_SIZE: usize = 8192; // 8KB buffer

/// Container formats a report can arrive in, recognized by file-name suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// `*.xml.gz`: a single gzip-compressed XML document.
    GzipXml,
    /// `*.zip`: any number of XML documents, whatever their inner names.
    Zip,
}

impl ReportFormat {
    /// Classifies a path by its file name. `None` means the file is not a report.
    ///
    /// Suffixes are matched case-sensitively.
    pub fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy();
        if name.ends_with(".xml.gz") {
            Some(ReportFormat::GzipXml)
        } else if name.ends_with(".zip") {
            Some(ReportFormat::Zip)
        } else {
            None
        }
    }
}

/// Raw XML text pulled out of a report file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    /// `file` for gzip reports, `file!entry` for zip entries.
    pub origin: String,
    pub content: String,
}

/// An opened report file, iterated once to obtain its documents.
///
/// Decompression happens lazily as the iterator advances; the underlying file
/// handle is released when the archive is dropped.
pub struct ReportArchive {
    origin: String,
    format: ReportFormat,
    limits: ArchiveLimits,
    source: Source,
}

enum Source {
    Gzip(Option<BufReader<File>>),
    Zip {
        archive: ZipArchive<BufReader<File>>,
        next: usize,
    },
}

impl ReportArchive {
    /// Opens `path` and validates the container before any document is read.
    ///
    /// # Errors
    ///
    /// Fails for unrecognized suffixes, files above `max_file_size`, unreadable
    /// zip central directories and archives holding more than `max_files_in_zip` entries.
    pub fn open(path: &Path, limits: &ArchiveLimits) -> Result<Self> {
        let format = ReportFormat::detect(path)
            .ok_or_else(|| DmarcError::UnsupportedFile(path.display().to_string()))?;
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size > limits.max_file_size as u64 {
            return Err(DmarcError::FileTooLarge(format!(
                "File size {} bytes exceeds limit of {} bytes",
                file_size, limits.max_file_size
            )));
        }
        let reader = BufReader::with_capacity(BUFFER_SIZE, file);
        let source = match format {
            ReportFormat::GzipXml => Source::Gzip(Some(reader)),
            ReportFormat::Zip => {
                let archive = ZipArchive::new(reader)?;
                if archive.len() > limits.max_files_in_zip {
                    return Err(DmarcError::Format(format!(
                        "Too many files in archive: {} (limit {})",
                        archive.len(),
                        limits.max_files_in_zip
                    )));
                }
                Source::Zip { archive, next: 0 }
            }
        };
        let origin = path
            .file_name()
            .map(|x| x.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        debug!("Opened {} as {:?}", origin, format);
        Ok(Self {
            origin,
            format,
            limits: limits.clone(),
            source,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }
}

impl Iterator for ReportArchive {
    type Item = Result<XmlDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::Gzip(reader) => {
                let reader = reader.take()?;
                let document = read_gzip(reader, &self.limits).map(|content| XmlDocument {
                    origin: self.origin.clone(),
                    content,
                });
                Some(document)
            }
            Source::Zip { archive, next } => {
                while *next < archive.len() {
                    let index = *next;
                    *next += 1;
                    match read_zip_entry(archive, index, &self.limits, &self.origin) {
                        Ok(Some(document)) => return Some(Ok(document)),
                        Ok(None) => continue,
                        Err(e) => return Some(Err(e)),
                    }
                }
                None
            }
        }
    }
}

/// Decodes every gzip member of the file; concatenated members form one document.
fn read_gzip(reader: BufReader<File>, limits: &ArchiveLimits) -> Result<String> {
    let decoder = MultiGzDecoder::new(reader);
    let mut bytes = Vec::new();
    decoder
        .take(limits.max_decompressed_size as u64 + 1)
        .read_to_end(&mut bytes)?;
    if bytes.len() > limits.max_decompressed_size {
        return Err(DmarcError::FileTooLarge(
            "Decompressed size too large".to_string(),
        ));
    }
    String::from_utf8(bytes)
        .map_err(|_| DmarcError::Format("Decompressed report is not valid UTF-8".to_string()))
}

/// Reads one zip entry. Directory entries yield `Ok(None)`.
fn read_zip_entry(
    archive: &mut ZipArchive<BufReader<File>>,
    index: usize,
    limits: &ArchiveLimits,
    origin: &str,
) -> Result<Option<XmlDocument>> {
    let entry = archive.by_index(index)?;
    if entry.is_dir() {
        return Ok(None);
    }
    let inner_name = entry.name().to_string();
    // Prevent path traversal
    if inner_name.contains("..") || inner_name.starts_with('/') || inner_name.starts_with('\\') {
        return Err(DmarcError::Format(format!(
            "Path traversal attempt detected: {}",
            inner_name
        )));
    }
    if inner_name.len() > limits.max_filename_length {
        return Err(DmarcError::Format("Filename too long".to_string()));
    }
    let compressed_size = entry.compressed_size();
    let uncompressed_size = entry.size();
    if compressed_size > 0 {
        let compression_ratio = uncompressed_size as f64 / compressed_size as f64;
        if compression_ratio > limits.max_compression_ratio {
            return Err(DmarcError::Format(format!(
                "Suspicious compression ratio: {:.2}",
                compression_ratio
            )));
        }
    }
    if uncompressed_size > limits.max_decompressed_size as u64 {
        return Err(DmarcError::FileTooLarge(
            "Total decompressed size too large".to_string(),
        ));
    }

    // The header sizes are not trusted; the read itself is bounded too.
    let mut bytes = Vec::with_capacity(uncompressed_size as usize);
    entry
        .take(limits.max_decompressed_size as u64 + 1)
        .read_to_end(&mut bytes)?;
    if bytes.len() > limits.max_decompressed_size {
        return Err(DmarcError::FileTooLarge(
            "Total decompressed size too large".to_string(),
        ));
    }
    let content = String::from_utf8(bytes).map_err(|_| {
        DmarcError::Format(format!("{} is not valid UTF-8", inner_name))
    })?;
    Ok(Some(XmlDocument {
        origin: format!("{}!{}", origin, inner_name),
        content,
    }))
}
