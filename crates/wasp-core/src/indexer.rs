//! Correlating archive records into response documents.
//!
//! The indexer dispatches on the record kind:
//!
//! - **response**: decode the embedded HTTP response, extract title and
//!   content from HTML and store a page document
//! - **revisit**: store a pointer to the referred record, without checking
//!   that it exists yet
//! - **request**: append the visit to the document of the concurrent
//!   record, or drop it if that document is unknown
//!
//! ## Revisit chains
//!
//! Requests are appended to the deepest document of the concurrent
//! record's revisit chain that already exists, which is the page itself
//! once the chain is complete. Title and content of a revisit are resolved
//! when a result is read, so pointers stored before their target still
//! resolve later.

use crate::backend::{DocumentStore, MAX_REVISIT_DEPTH};
use crate::error::{Result, WaspError};
use crate::extract::{HtmlExtractor, ScraperExtractor};
use crate::http::HttpResponse;
use crate::reader::RecordConsumer;
use crate::types::{RecordId, RequestRecord, ResponseDocument};
use crate::warc::{ArchiveRecord, RecordKind, HEADER_ID};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Called for responses that carry no HTML.
pub type NonHtmlHook = Box<dyn Fn(&RecordId, &str, DateTime<Utc>) + Send + Sync>;

/// What indexing one record did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOutcome {
    /// A page document was stored
    Page,
    /// HTML without title or content, nothing stored
    EmptyPage,
    /// A response that is not HTML, nothing stored
    NonHtml,
    /// A revisit pointer was stored
    Revisit,
    /// A request was appended to `target`
    RequestAppended { target: RecordId },
    /// A request whose concurrent record is unknown
    RequestDropped,
    /// A record kind the indexer does not use
    Ignored,
}

/// Counters of what the indexer did so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub pages: u64,
    pub empty_pages: u64,
    pub non_html: u64,
    pub revisits: u64,
    pub requests: u64,
    pub requests_dropped: u64,
    pub ignored: u64,
    pub failures: u64,
}

impl IngestStats {
    /// Records seen, including failed ones
    pub fn total(&self) -> u64 {
        self.pages
            + self.empty_pages
            + self.non_html
            + self.revisits
            + self.requests
            + self.requests_dropped
            + self.ignored
            + self.failures
    }
}

#[derive(Default)]
struct Counters {
    pages: AtomicU64,
    empty_pages: AtomicU64,
    non_html: AtomicU64,
    revisits: AtomicU64,
    requests: AtomicU64,
    requests_dropped: AtomicU64,
    ignored: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn count(&self, outcome: &IndexOutcome) {
        let counter = match outcome {
            IndexOutcome::Page => &self.pages,
            IndexOutcome::EmptyPage => &self.empty_pages,
            IndexOutcome::NonHtml => &self.non_html,
            IndexOutcome::Revisit => &self.revisits,
            IndexOutcome::RequestAppended { .. } => &self.requests,
            IndexOutcome::RequestDropped => &self.requests_dropped,
            IndexOutcome::Ignored => &self.ignored,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> IngestStats {
        IngestStats {
            pages: self.pages.load(Ordering::Relaxed),
            empty_pages: self.empty_pages.load(Ordering::Relaxed),
            non_html: self.non_html.load(Ordering::Relaxed),
            revisits: self.revisits.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            requests_dropped: self.requests_dropped.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Writes archive records into a document store.
pub struct WarcIndexer {
    store: Arc<dyn DocumentStore>,
    extractor: Box<dyn HtmlExtractor>,
    non_html_hook: Option<NonHtmlHook>,
    counters: Counters,
}

impl WarcIndexer {
    /// Create an indexer using the default HTML extractor.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        WarcIndexer {
            store,
            extractor: Box::new(ScraperExtractor::new()),
            non_html_hook: None,
            counters: Counters::default(),
        }
    }

    /// Use a different HTML extractor.
    pub fn with_extractor(mut self, extractor: impl HtmlExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    /// Call `hook` with id, target URI and date of every non-HTML response.
    pub fn with_non_html_hook(
        mut self,
        hook: impl Fn(&RecordId, &str, DateTime<Utc>) + Send + Sync + 'static,
    ) -> Self {
        self.non_html_hook = Some(Box::new(hook));
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn stats(&self) -> IngestStats {
        self.counters.snapshot()
    }

    /// Index one record.
    ///
    /// Errors concern this record only; the caller decides whether to go on.
    pub fn index_record(&self, record: &ArchiveRecord) -> Result<IndexOutcome> {
        let outcome = match record.kind()? {
            RecordKind::Response { target_uri, http } => {
                self.index_response(record, target_uri, http)?
            }
            RecordKind::Revisit { refers_to } => {
                let id = record.id()?;
                trace!(id = %id, refers_to = %refers_to, "Indexing revisit");
                self.store.put(id, ResponseDocument::revisit(refers_to))?;
                IndexOutcome::Revisit
            }
            RecordKind::Request {
                target_uri,
                concurrent_to,
            } => {
                let request = RequestRecord::new(target_uri, record.date()?);
                self.index_request(&concurrent_to, request)?
            }
            RecordKind::Other => IndexOutcome::Ignored,
        };
        self.counters.count(&outcome);
        Ok(outcome)
    }

    fn index_response(
        &self,
        record: &ArchiveRecord,
        target_uri: &str,
        http: &[u8],
    ) -> Result<IndexOutcome> {
        let id = record.id()?;
        let response = HttpResponse::parse(http)?;

        let Some(html) = response.html()? else {
            debug!(id = %id, status = response.status(), "Response is not HTML");
            if let Some(hook) = &self.non_html_hook {
                hook(&id, target_uri, record.date()?);
            }
            return Ok(IndexOutcome::NonHtml);
        };

        let extracted = self.extractor.extract(&html)?;
        if extracted.is_empty() {
            debug!(id = %id, "Page has neither title nor content");
            return Ok(IndexOutcome::EmptyPage);
        }

        let document = ResponseDocument::page(
            extracted.title.unwrap_or_default(),
            extracted.content.unwrap_or_default(),
        );
        trace!(id = %id, uri = target_uri, "Indexing page");
        self.store.put(id, document)?;
        Ok(IndexOutcome::Page)
    }

    fn index_request(&self, concurrent_to: &RecordId, request: RequestRecord) -> Result<IndexOutcome> {
        let target = match self.correlate(concurrent_to) {
            Ok(target) => target,
            Err(e @ WaspError::MissingCorrelation { .. }) => {
                warn!(uri = %request.uri, error = %e, "Dropping request");
                return Ok(IndexOutcome::RequestDropped);
            }
            Err(e) => return Err(e),
        };

        if self.store.append_request(&target, request)? {
            Ok(IndexOutcome::RequestAppended { target })
        } else {
            // Removed between lookup and append (store cleared)
            warn!(target = %target, "Request target vanished, dropping request");
            Ok(IndexOutcome::RequestDropped)
        }
    }

    /// The document a request for `concurrent_to` is appended to.
    fn correlate(&self, concurrent_to: &RecordId) -> Result<RecordId> {
        let Some(mut document) = self.store.get(concurrent_to)? else {
            return Err(WaspError::MissingCorrelation {
                concurrent_id: concurrent_to.to_string(),
            });
        };

        let mut current = concurrent_to.clone();
        for _ in 0..MAX_REVISIT_DEPTH {
            let Some(next) = document.revisited_id.take() else {
                return Ok(current);
            };
            match self.store.get(&next)? {
                Some(target) => {
                    current = next;
                    document = target;
                }
                // Target not indexed yet, keep the request on the pointer
                None => return Ok(current),
            }
        }
        Err(WaspError::RevisitChainTooDeep {
            id: concurrent_to.to_string(),
            depth: MAX_REVISIT_DEPTH,
        })
    }
}

impl RecordConsumer for WarcIndexer {
    fn accept(&self, record: ArchiveRecord) {
        if let Err(e) = self.index_record(&record) {
            self.counters.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                id = record.header(HEADER_ID).unwrap_or("<unknown>"),
                kind = %record.record_type(),
                offset = record.offset(),
                error = %e,
                "Failed to index record"
            );
        }
    }
}

impl std::fmt::Debug for WarcIndexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarcIndexer")
            .field("documents", &self.store.len())
            .field("non_html_hook", &self.non_html_hook.is_some())
            .field("stats", &self.stats())
            .finish()
    }
}
