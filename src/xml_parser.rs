//! XML Parser Module
//!
//! This module parses DMARC XML reports and turns every `<record>` element, at any
//! depth, into a [`NormalizedRecord`]. It enforces a recursion depth limit to protect
//! against attacks such as the Billion Laughs attack. Moreover, it completely disables
//! the processing of DOCTYPE declarations (and hence external/internal entities) by
//! removing any DOCTYPE block from the input. If a DOCTYPE block contains two or more
//! entity definitions, the XML is rejected.

use crate::aggregate::Analysis;
use crate::archive::XmlDocument;
use crate::error::{DmarcError, RecordError, Result};
use crate::models::{FaultPolicy, NormalizedRecord};
use log::{debug, warn};
use quick_xml::events::Event;
use quick_xml::reader::Reader;

/// Maximum element nesting accepted. Well-formed documents nested deeper than
/// this are rejected as a whole, even though `<record>` is searched at any depth.
const MAX_DEPTH: u32 = 20;

/// Outcome of reading one `<record>`: a row, or the reason it is unusable.
pub type ParsedRecord = std::result::Result<NormalizedRecord, RecordError>;

/// The five values a row is built from, addressed relative to `<record>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordField {
    SourceIp,
    Disposition,
    Spf,
    Dkim,
    Count,
}

impl RecordField {
    const ALL: [RecordField; 5] = [
        RecordField::SourceIp,
        RecordField::Disposition,
        RecordField::Spf,
        RecordField::Dkim,
        RecordField::Count,
    ];

    fn path(self) -> &'static str {
        match self {
            RecordField::SourceIp => "row/source_ip",
            RecordField::Disposition => "row/policy_evaluated/disposition",
            RecordField::Spf => "row/policy_evaluated/spf",
            RecordField::Dkim => "row/policy_evaluated/dkim",
            RecordField::Count => "row/count",
        }
    }

    fn at(path: &[String]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|field| path.iter().map(String::as_str).eq(field.path().split('/')))
    }
}

/// A `<record>` whose end tag has not been reached yet.
#[derive(Default)]
struct OpenRecord {
    /// Element names below `<record>` leading to the current position.
    path: Vec<String>,
    values: [Option<String>; 5],
    capturing: Option<usize>,
}

impl OpenRecord {
    fn enter(&mut self, name: String) {
        self.path.push(name);
        self.capturing = None;
        if let Some(field) = RecordField::at(&self.path) {
            let slot = &mut self.values[field as usize];
            // First occurrence wins.
            if slot.is_none() {
                *slot = Some(String::new());
                self.capturing = Some(field as usize);
            }
        }
    }

    /// Handles a self-closing element: present, but with empty text.
    ///
    /// A child element also ends the text of the element being captured.
    fn empty(&mut self, name: String) {
        self.capturing = None;
        self.path.push(name);
        if let Some(field) = RecordField::at(&self.path) {
            self.values[field as usize].get_or_insert_with(String::new);
        }
        self.path.pop();
    }

    fn text(&mut self, text: &str) {
        if let Some(slot) = self.capturing {
            if let Some(value) = self.values[slot].as_mut() {
                value.push_str(text);
            }
        }
    }

    /// Returns `true` when the end tag closed the `<record>` itself.
    fn leave(&mut self) -> bool {
        self.capturing = None;
        self.path.pop().is_none()
    }

    fn finish(self) -> ParsedRecord {
        let [source_ip, disposition, spf, dkim, count] = self.values;
        let require = |value: Option<String>, field: RecordField| {
            value.ok_or(RecordError::MissingField(field.path()))
        };
        let source_ip = require(source_ip, RecordField::SourceIp)?;
        let disposition = require(disposition, RecordField::Disposition)?;
        let spf_result = require(spf, RecordField::Spf)?;
        let dkim_result = require(dkim, RecordField::Dkim)?;
        let count_text = require(count, RecordField::Count)?;
        let count = count_text
            .trim()
            .parse::<u64>()
            .map_err(|_| RecordError::InvalidCount(count_text.clone()))?;
        Ok(NormalizedRecord {
            source_ip,
            disposition,
            spf_result,
            dkim_result,
            count,
        })
    }
}

/// Parses the DMARC XML content and returns one entry per `<record>` element,
/// in document order.
///
/// # Arguments
///
/// * `xml_content` - A string slice containing the XML content.
///
/// # Errors
///
/// Returns an error if the XML cannot be parsed, if the recursion depth limit is exceeded,
/// if the document has no root element or ends before its elements are closed,
/// or if the DOCTYPE block (if present) defines two or more entity definitions.
/// A record that is merely missing fields is not an error here; it is returned
/// as an `Err` entry.
pub fn parse_dmarc_xml(xml_content: &str) -> Result<Vec<ParsedRecord>> {
    let cleaned_xml = strip_doctype(xml_content)?;

    // Text is kept verbatim: ` fail ` is not a failure verdict.
    let mut reader = Reader::from_str(&cleaned_xml);

    let mut parsed = Vec::new();
    let mut current: Option<OpenRecord> = None;
    let mut depth: u32 = 0;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                depth += 1;
                saw_root = true;
                if depth > MAX_DEPTH {
                    return Err(DmarcError::Format(
                        "XML recursion depth limit exceeded".into(),
                    ));
                }
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                match current.as_mut() {
                    Some(record) => record.enter(name),
                    None if name == "record" => current = Some(OpenRecord::default()),
                    None => {}
                }
            }
            Ok(Event::Empty(ref e)) => {
                saw_root = true;
                if let Some(record) = current.as_mut() {
                    record.empty(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                }
            }
            Ok(Event::Text(ref e)) => {
                if let Some(record) = current.as_mut() {
                    let text = e
                        .unescape()
                        .map_err(|err| DmarcError::Xml(quick_xml::Error::from(err)))?;
                    record.text(&text);
                }
            }
            Ok(Event::CData(ref e)) => {
                if let Some(record) = current.as_mut() {
                    record.text(&String::from_utf8_lossy(e));
                }
            }
            Ok(Event::End(_)) => {
                if let Some(record) = current.as_mut() {
                    if record.leave() {
                        if let Some(done) = current.take() {
                            parsed.push(done.finish());
                        }
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(DmarcError::Xml(e)),
            _ => (),
        }
    }

    if !saw_root {
        return Err(DmarcError::Format("Document has no root element".into()));
    }
    if depth != 0 {
        return Err(DmarcError::Format("Document ends inside an open element".into()));
    }
    Ok(parsed)
}

/// Extracts every record of `document` into a fresh [`Analysis`].
///
/// Under [`FaultPolicy::Abort`] the first malformed record fails the document;
/// under [`FaultPolicy::Skip`] it is recorded in `skipped` and extraction goes on.
pub fn extract_document(document: &XmlDocument, policy: FaultPolicy) -> Result<Analysis> {
    let mut analysis = Analysis::new();
    for (index, parsed) in parse_dmarc_xml(&document.content)?.into_iter().enumerate() {
        let position = index + 1;
        match parsed {
            Ok(record) => analysis.record(record),
            Err(reason) => match policy {
                FaultPolicy::Abort => {
                    return Err(DmarcError::MalformedRecord {
                        document: document.origin.clone(),
                        position,
                        reason,
                    })
                }
                FaultPolicy::Skip => {
                    warn!("Skipping record #{} in {}: {}", position, document.origin, reason);
                    analysis.skip(format!("{} record #{}", document.origin, position), reason);
                }
            },
        }
    }
    debug!("{}: {} records", document.origin, analysis.records.len());
    Ok(analysis)
}

/// Removes a DOCTYPE block, refusing blocks that declare two or more entities.
fn strip_doctype(xml_content: &str) -> Result<String> {
    let Some(start) = xml_content.find("<!DOCTYPE") else {
        return Ok(xml_content.to_string());
    };
    // If we cannot find the end of the DOCTYPE, use the original XML.
    let Some(end) = xml_content[start..].find("]>") else {
        return Ok(xml_content.to_string());
    };
    let doctype = &xml_content[start..start + end + 2];
    if doctype.matches("<!ENTITY").count() >= 2 {
        return Err(DmarcError::Format("Recursive entities detected".into()));
    }
    Ok(format!("{}{}", &xml_content[..start], &xml_content[start + end + 2..]))
}
