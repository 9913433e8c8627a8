//! WARC record parsing.
//!
//! A WARC file is a sequence of self-delimiting records:
//!
//! ```text
//! WARC/1.0\r\n
//! WARC-Type: response\r\n
//! WARC-Record-ID: <urn:uuid:...>\r\n
//! Content-Length: 1234\r\n
//! \r\n
//! [1234 bytes of block]
//! \r\n\r\n
//! ```
//!
//! The parser only understands this framing. Classifying a record into the
//! kinds the indexer cares about happens in [`ArchiveRecord::kind`], so a
//! record with odd headers still parses and only fails where it is used.

use crate::error::{Result, WaspError};
use crate::types::RecordId;
use chrono::{DateTime, Utc};
use std::fmt;
use std::io::{BufRead, Read, Write};

pub const HEADER_ID: &str = "WARC-Record-ID";
pub const HEADER_TYPE: &str = "WARC-Type";
pub const HEADER_DATE: &str = "WARC-Date";
pub const HEADER_TARGET_URI: &str = "WARC-Target-URI";
pub const HEADER_CONCURRENT: &str = "WARC-Concurrent-To";
pub const HEADER_REFERS_TO: &str = "WARC-Refers-To";
pub const HEADER_CONTENT_LENGTH: &str = "Content-Length";

/// Version line written by [`ArchiveRecord::write_to`]
pub const WARC_VERSION: &str = "WARC/1.0";

/// Upper bound for the up-front buffer reservation of a record block
const MAX_PREALLOC: usize = 1 << 20;

/// The `WARC-Type` of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordType {
    Response,
    Request,
    Revisit,
    WarcInfo,
    Other(String),
}

impl RecordType {
    fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "response" => RecordType::Response,
            "request" => RecordType::Request,
            "revisit" => RecordType::Revisit,
            "warcinfo" => RecordType::WarcInfo,
            _ => RecordType::Other(value.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            RecordType::Response => "response",
            RecordType::Request => "request",
            RecordType::Revisit => "revisit",
            RecordType::WarcInfo => "warcinfo",
            RecordType::Other(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named header fields of a record.
///
/// Lookup is case-insensitive and the last occurrence of a name wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarcHeaders {
    entries: Vec<(String, String)>,
}

impl WarcHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header field
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Get the value of a header field
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append_continuation(&mut self, text: &str) -> bool {
        match self.entries.last_mut() {
            Some((_, value)) => {
                value.push(' ');
                value.push_str(text.trim());
                true
            }
            None => false,
        }
    }
}

/// The projection of a record onto what the indexer consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordKind<'a> {
    /// A captured HTTP response
    Response { target_uri: &'a str, http: &'a [u8] },

    /// The HTTP request belonging to a response record
    Request {
        target_uri: &'a str,
        concurrent_to: RecordId,
    },

    /// A duplicate of an earlier response
    Revisit { refers_to: RecordId },

    /// Anything else (warcinfo, metadata, ...)
    Other,
}

/// One record of a WARC file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveRecord {
    version: String,
    headers: WarcHeaders,
    block: Vec<u8>,
    offset: u64,
}

impl ArchiveRecord {
    /// Create a record from parts.
    pub fn new(version: impl Into<String>, headers: WarcHeaders, block: Vec<u8>) -> Self {
        ArchiveRecord {
            version: version.into(),
            headers,
            block,
            offset: 0,
        }
    }

    /// Start building a record of the given type.
    pub fn builder(record_type: RecordType) -> ArchiveRecordBuilder {
        ArchiveRecordBuilder::new(record_type)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn headers(&self) -> &WarcHeaders {
        &self.headers
    }

    /// The record's content block (for responses: the raw HTTP response)
    pub fn block(&self) -> &[u8] {
        &self.block
    }

    /// Byte offset of the record in the (decompressed) stream
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.header(name)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| WaspError::MissingHeader {
                record_id: self.id_or_unknown().to_string(),
                header: name.to_string(),
            })
    }

    fn id_or_unknown(&self) -> &str {
        self.header(HEADER_ID).map(str::trim).unwrap_or("<unknown>")
    }

    /// The record identifier
    pub fn id(&self) -> Result<RecordId> {
        self.required(HEADER_ID).map(RecordId::new)
    }

    /// The record type; a record without `WARC-Type` counts as `Other`.
    pub fn record_type(&self) -> RecordType {
        self.header(HEADER_TYPE)
            .map(RecordType::parse)
            .unwrap_or_else(|| RecordType::Other(String::new()))
    }

    /// The capture time, truncated to whole seconds.
    pub fn date(&self) -> Result<DateTime<Utc>> {
        let raw = self.required(HEADER_DATE)?;
        let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| WaspError::InvalidTime {
            input: raw.to_string(),
        })?;
        DateTime::<Utc>::from_timestamp(parsed.timestamp(), 0).ok_or_else(|| {
            WaspError::InvalidTime {
                input: raw.to_string(),
            }
        })
    }

    pub fn target_uri(&self) -> Result<&str> {
        self.required(HEADER_TARGET_URI)
    }

    pub fn concurrent_to(&self) -> Result<RecordId> {
        self.required(HEADER_CONCURRENT).map(RecordId::new)
    }

    pub fn refers_to(&self) -> Result<RecordId> {
        self.required(HEADER_REFERS_TO).map(RecordId::new)
    }

    /// Classify the record, checking the headers its kind requires.
    pub fn kind(&self) -> Result<RecordKind<'_>> {
        match self.record_type() {
            RecordType::Response => Ok(RecordKind::Response {
                target_uri: self.target_uri()?,
                http: &self.block,
            }),
            RecordType::Request => Ok(RecordKind::Request {
                target_uri: self.target_uri()?,
                concurrent_to: self.concurrent_to()?,
            }),
            RecordType::Revisit => Ok(RecordKind::Revisit {
                refers_to: self.refers_to()?,
            }),
            RecordType::WarcInfo | RecordType::Other(_) => Ok(RecordKind::Other),
        }
    }

    /// Serialize this record in WARC framing.
    ///
    /// `Content-Length` is always written from the actual block size.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write!(writer, "{}\r\n", self.version)?;
        for (name, value) in self.headers.iter() {
            if name.eq_ignore_ascii_case(HEADER_CONTENT_LENGTH) {
                continue;
            }
            write!(writer, "{}: {}\r\n", name, value)?;
        }
        write!(writer, "{}: {}\r\n\r\n", HEADER_CONTENT_LENGTH, self.block.len())?;
        writer.write_all(&self.block)?;
        writer.write_all(b"\r\n\r\n")
    }

    /// Serialize this record into a byte vector.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.block.len() + 256);
        // Writing into a Vec cannot fail
        let _ = self.write_to(&mut bytes);
        bytes
    }
}

/// Builder for records, mostly useful for producing archives in tests.
#[derive(Debug, Clone)]
pub struct ArchiveRecordBuilder {
    headers: WarcHeaders,
    block: Vec<u8>,
}

impl ArchiveRecordBuilder {
    fn new(record_type: RecordType) -> Self {
        let mut headers = WarcHeaders::new();
        headers.insert(HEADER_TYPE, record_type.as_str());
        ArchiveRecordBuilder {
            headers,
            block: Vec::new(),
        }
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.header(HEADER_ID, id)
    }

    pub fn date(self, date: DateTime<Utc>) -> Self {
        self.header(HEADER_DATE, date.format("%Y-%m-%dT%H:%M:%SZ").to_string())
    }

    pub fn target_uri(self, uri: impl Into<String>) -> Self {
        self.header(HEADER_TARGET_URI, uri)
    }

    pub fn concurrent_to(self, id: impl Into<String>) -> Self {
        self.header(HEADER_CONCURRENT, id)
    }

    pub fn refers_to(self, id: impl Into<String>) -> Self {
        self.header(HEADER_REFERS_TO, id)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn block(mut self, block: impl Into<Vec<u8>>) -> Self {
        self.block = block.into();
        self
    }

    pub fn build(self) -> ArchiveRecord {
        ArchiveRecord::new(WARC_VERSION, self.headers, self.block)
    }
}

/// Incremental parser over a buffered byte stream.
///
/// The parser never looks past the record it is reading, which is what
/// lets it sit on top of a stream that blocks at its current end.
pub struct WarcParser<R> {
    reader: R,
    offset: u64,
}

impl<R: BufRead> WarcParser<R> {
    pub fn new(reader: R) -> Self {
        WarcParser { reader, offset: 0 }
    }

    /// Bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Parse the next record.
    ///
    /// Returns `Ok(None)` when the stream ends cleanly between records.
    pub fn next_record(&mut self) -> Result<Option<ArchiveRecord>> {
        let mut line = Vec::new();

        // Skip the separator of the previous record and any stray blank lines
        let start = loop {
            let line_start = self.offset;
            line.clear();
            if self.read_line(&mut line)? == 0 {
                return Ok(None);
            }
            if !trim_line(&line).is_empty() {
                break line_start;
            }
        };

        let version = String::from_utf8_lossy(trim_line(&line)).into_owned();
        if !version.starts_with("WARC/") {
            return Err(WaspError::corrupt(
                start,
                format!("expected WARC version line, found {:?}", truncate(&version, 40)),
            ));
        }

        let mut headers = WarcHeaders::new();
        loop {
            line.clear();
            if self.read_line(&mut line)? == 0 {
                return Err(WaspError::corrupt(start, "stream ended inside the header"));
            }
            let text = String::from_utf8_lossy(trim_line(&line)).into_owned();
            if text.is_empty() {
                break;
            }
            if text.starts_with(' ') || text.starts_with('\t') {
                if !headers.append_continuation(&text) {
                    return Err(WaspError::corrupt(start, "continuation line without header"));
                }
                continue;
            }
            match text.split_once(':') {
                Some((name, value)) => headers.insert(name.trim(), value.trim()),
                None => {
                    return Err(WaspError::corrupt(
                        start,
                        format!("malformed header line {:?}", truncate(&text, 40)),
                    ))
                }
            }
        }

        let length: u64 = headers
            .get(HEADER_CONTENT_LENGTH)
            .ok_or_else(|| WaspError::corrupt(start, "missing Content-Length"))?
            .trim()
            .parse()
            .map_err(|_| WaspError::corrupt(start, "invalid Content-Length"))?;

        let mut block = Vec::with_capacity((length as usize).min(MAX_PREALLOC));
        let read = (&mut self.reader).take(length).read_to_end(&mut block)?;
        self.offset += read as u64;
        if (read as u64) < length {
            return Err(WaspError::corrupt(
                start,
                format!("block truncated after {} of {} bytes", read, length),
            ));
        }

        Ok(Some(ArchiveRecord {
            version,
            headers,
            block,
            offset: start,
        }))
    }

    fn read_line(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        let n = self.reader.read_until(b'\n', buf)?;
        self.offset += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> Iterator for WarcParser<R> {
    type Item = Result<ArchiveRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

fn trim_line(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
