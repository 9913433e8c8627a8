//! Core data types for wasp.
//!
//! This module defines the document model shared by the indexer, the
//! document store and the query engine:
//!
//! - **RecordId**: the archive's record identifier, also the document key
//! - **RequestRecord**: one visit of a page (target URI + capture time)
//! - **ResponseDocument**: either a page (title/content) or a revisit
//!   pointer to another document, plus the visits accumulated on it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of an archive record.
///
/// WARC record IDs are URIs in angle brackets (`<urn:uuid:...>`). They are
/// kept verbatim, since requests and revisits refer to them byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Create a new record ID
    pub fn new(id: impl Into<String>) -> Self {
        RecordId(id.into())
    }

    /// Get the record ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId(s)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

/// A request that led to a response: which URI was fetched and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// Target URI of the request
    pub uri: String,

    /// Capture time of the request
    pub date: DateTime<Utc>,
}

impl RequestRecord {
    /// Create a new request record
    pub fn new(uri: impl Into<String>, date: DateTime<Utc>) -> Self {
        RequestRecord {
            uri: uri.into(),
            date,
        }
    }

    /// Whether this request lies in the closed interval `[from, to]`.
    ///
    /// Absent bounds are open-ended.
    pub fn is_within(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> bool {
        if from.is_some_and(|from| self.date < from) {
            return false;
        }
        if to.is_some_and(|to| self.date > to) {
            return false;
        }
        true
    }
}

/// A document stored for a response or revisit record.
///
/// ## Invariant
///
/// A document is either a *page* (title/content set, `revisited_id` absent)
/// or a *revisit pointer* (`revisited_id` set, title/content empty). The
/// constructors are the only way this crate builds documents.
///
/// `requests` is append-only: visits are added in arrival order and never
/// deduplicated, so replaying the same request record twice yields two
/// entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    /// Page title (empty for revisits)
    pub title: String,

    /// Extracted page text (empty for revisits)
    pub content: String,

    /// The document this revisit duplicates
    pub revisited_id: Option<RecordId>,

    /// Visits of this document, oldest first
    pub requests: Vec<RequestRecord>,
}

impl ResponseDocument {
    /// Create a page document without any requests yet.
    pub fn page(title: impl Into<String>, content: impl Into<String>) -> Self {
        ResponseDocument {
            title: title.into(),
            content: content.into(),
            revisited_id: None,
            requests: Vec::new(),
        }
    }

    /// Create a revisit pointer to another document.
    pub fn revisit(revisited_id: RecordId) -> Self {
        ResponseDocument {
            title: String::new(),
            content: String::new(),
            revisited_id: Some(revisited_id),
            requests: Vec::new(),
        }
    }

    /// Add a request to this document.
    pub fn with_request(mut self, request: RequestRecord) -> Self {
        self.requests.push(request);
        self
    }

    /// True if this document points at another one.
    pub fn is_revisit(&self) -> bool {
        self.revisited_id.is_some()
    }

    /// The most recent request inside `[from, to]`.
    ///
    /// Requests are scanned from the newest to the oldest, so among several
    /// visits in the window the latest one wins.
    pub fn latest_request_within(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Option<&RequestRecord> {
        self.requests.iter().rev().find(|r| r.is_within(from, to))
    }
}

/// Statistics about the documents in a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    /// Number of page documents
    pub pages: u64,

    /// Number of revisit pointers
    pub revisits: u64,

    /// Total number of requests over all documents
    pub requests: u64,
}

impl StoreStats {
    /// Total number of documents (pages + revisits)
    pub fn total_documents(&self) -> u64 {
        self.pages + self.revisits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_page_and_revisit() {
        let page = ResponseDocument::page("Home", "Welcome");
        assert!(!page.is_revisit());
        assert!(page.requests.is_empty());

        let revisit = ResponseDocument::revisit(RecordId::new("<urn:uuid:1>"));
        assert!(revisit.is_revisit());
        assert!(revisit.title.is_empty());
        assert!(revisit.content.is_empty());
    }

    #[test]
    fn test_request_within_bounds() {
        let request = RequestRecord::new("https://webis.de", at(100));
        assert!(request.is_within(None, None));
        assert!(request.is_within(Some(at(100)), Some(at(100))));
        assert!(!request.is_within(Some(at(101)), None));
        assert!(!request.is_within(None, Some(at(99))));
    }

    #[test]
    fn test_latest_request_within() {
        let doc = ResponseDocument::page("t", "c")
            .with_request(RequestRecord::new("https://a", at(1)))
            .with_request(RequestRecord::new("https://b", at(2)))
            .with_request(RequestRecord::new("https://c", at(3)));

        let picked = doc.latest_request_within(Some(at(1)), Some(at(2))).unwrap();
        assert_eq!(picked.uri, "https://b");

        let picked = doc.latest_request_within(None, None).unwrap();
        assert_eq!(picked.uri, "https://c");

        assert!(doc.latest_request_within(Some(at(4)), None).is_none());
    }

    #[test]
    fn test_record_id() {
        let a = RecordId::new("<urn:uuid:abc>");
        let b = RecordId::from("<urn:uuid:abc>");
        assert_eq!(a, b);
        assert_eq!(format!("{}", a), "<urn:uuid:abc>");
    }

    #[test]
    fn test_store_stats_total() {
        let stats = StoreStats {
            pages: 3,
            revisits: 2,
            requests: 9,
        };
        assert_eq!(stats.total_documents(), 5);
    }
}
