//! Time-windowed search over the document store.
//!
//! This module turns store hits into user-facing results:
//! - Executing a [`Query`] page by page against a [`DocumentStore`]
//! - Resolving revisit hits to the page they point at
//! - Picking, per hit, the most recent request inside the time window
//! - Building snippets from the highlight fragments
//!
//! Hits without a request in the window, or without any highlighted
//! content, are dropped. An empty result list is a normal outcome.

use crate::backend::{DocumentStore, SearchHit};
use crate::error::{Result, WaspError};
use crate::query::{HighlightSpec, Query, StructuredQuery};
use crate::types::{RecordId, RequestRecord, ResponseDocument};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Separator between highlight fragments in a snippet
pub const SNIPPET_SEPARATOR: &str = " ... ";

/// A single search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// Key of the document that matched
    pub id: RecordId,

    /// Relevance score (higher is more relevant)
    pub score: f32,

    /// Highlighted excerpt of the content
    pub snippet: String,

    pub title: String,

    pub content: String,

    /// The visit reported for this result
    pub matched_request: RequestRecord,
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        };
        writeln!(f, "{} [{:.3}]", title, self.score)?;
        writeln!(
            f,
            "  {} @ {}",
            self.matched_request.uri,
            self.matched_request.date.to_rfc3339()
        )?;
        write!(f, "  {}", self.snippet)
    }
}

/// Executes one query page by page.
pub struct ResultsFetcher {
    store: Arc<dyn DocumentStore>,
    query: Query,
    structured: StructuredQuery,
    page_size: usize,
}

impl ResultsFetcher {
    /// Create a fetcher returning `page_size` hits per page.
    pub fn new(store: Arc<dyn DocumentStore>, query: Query, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(WaspError::ConfigError {
                reason: "page size must be at least 1".to_string(),
            });
        }
        Ok(ResultsFetcher {
            structured: query.build(),
            store,
            query,
            page_size,
        })
    }

    /// Use a different highlighting for snippets.
    pub fn with_highlight(mut self, highlight: HighlightSpec) -> Self {
        self.structured = self.query.build_with_highlight(highlight);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fetch results page `page` (1-based).
    #[instrument(skip(self), fields(query = %self.query))]
    pub fn fetch(&self, page: usize) -> Result<Vec<SearchResult>> {
        let from = page.max(1).saturating_sub(1).saturating_mul(self.page_size);
        let hits = self.store.search(&self.structured, self.page_size, from)?;
        debug!(total = hits.total, page_hits = hits.hits.len(), "Search executed");

        let mut results = Vec::with_capacity(hits.hits.len());
        for hit in hits.hits {
            let id = hit.id.clone();
            match self.to_result(hit) {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(WaspError::NoMatchingRequest { document_id }) => {
                    debug!(id = %document_id, "No request in time window, dropping hit");
                }
                Err(e) if e.is_record_local() => {
                    warn!(id = %id, error = %e, "Dropping hit");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    fn to_result(&self, hit: SearchHit) -> Result<Option<SearchResult>> {
        let matched_request = self.pick_request(&hit.id, &hit.document)?;
        let snippet = snippet(&hit.highlights);
        if snippet.is_empty() {
            debug!(id = %hit.id, "Empty snippet, dropping hit");
            return Ok(None);
        }

        let page = if hit.document.is_revisit() {
            match self.store.resolve(&hit.id)? {
                Some((_, page)) => page,
                None => {
                    debug!(id = %hit.id, "Revisit target missing, dropping hit");
                    return Ok(None);
                }
            }
        } else {
            hit.document
        };

        Ok(Some(SearchResult {
            id: hit.id,
            score: hit.score,
            snippet,
            title: page.title,
            content: page.content,
            matched_request,
        }))
    }

    /// The most recent request of `document` inside the query's window.
    pub fn pick_request(&self, id: &RecordId, document: &ResponseDocument) -> Result<RequestRecord> {
        document
            .latest_request_within(self.query.from(), self.query.to())
            .cloned()
            .ok_or_else(|| WaspError::NoMatchingRequest {
                document_id: id.to_string(),
            })
    }
}

/// Join highlight fragments into a snippet; empty without fragments.
pub fn snippet(fragments: &[String]) -> String {
    fragments.join(SNIPPET_SEPARATOR)
}

/// Cache of already fetched result pages for one query.
///
/// Purely an optimization: a page that is not cached is fetched again.
pub struct ResultPages {
    fetcher: ResultsFetcher,
    pages: Mutex<HashMap<usize, Arc<Vec<SearchResult>>>>,
}

impl ResultPages {
    pub fn new(fetcher: ResultsFetcher) -> Self {
        ResultPages {
            fetcher,
            pages: Mutex::new(HashMap::new()),
        }
    }

    pub fn query(&self) -> &Query {
        self.fetcher.query()
    }

    pub fn page_size(&self) -> usize {
        self.fetcher.page_size()
    }

    /// Results of page `page` (1-based), fetched at most once.
    pub fn page(&self, page: usize) -> Result<Arc<Vec<SearchResult>>> {
        let page = page.max(1);
        if let Some(cached) = self.pages.lock().get(&page) {
            return Ok(Arc::clone(cached));
        }
        // Not holding the lock while the store is searched
        let results = Arc::new(self.fetcher.fetch(page)?);
        self.pages.lock().insert(page, Arc::clone(&results));
        Ok(results)
    }

    pub fn cached_pages(&self) -> usize {
        self.pages.lock().len()
    }

    /// Drop all cached pages, e.g. after the store changed.
    pub fn invalidate(&self) {
        self.pages.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::MemoryIndex;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn id(n: usize) -> RecordId {
        RecordId::new(format!("<urn:uuid:{}>", n))
    }

    fn store() -> Arc<MemoryIndex> {
        Arc::new(MemoryIndex::new())
    }

    #[test]
    fn test_latest_request_in_window() {
        let index = store();
        let doc = ResponseDocument::page("Webis", "welcome to webis")
            .with_request(RequestRecord::new("https://t1", at(1)))
            .with_request(RequestRecord::new("https://t2", at(2)))
            .with_request(RequestRecord::new("https://t3", at(3)));
        index.put(id(1), doc).unwrap();

        let fetcher =
            ResultsFetcher::new(index, Query::new("webis", Some(at(1)), Some(at(2))), 10).unwrap();
        let results = fetcher.fetch(1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].matched_request.uri, "https://t2");
        assert_eq!(results[0].snippet, "welcome to <em>webis</em>");
    }

    #[test]
    fn test_pick_request_outside_window() {
        let index = store();
        let fetcher =
            ResultsFetcher::new(index, Query::new("x", Some(at(10)), None), 10).unwrap();
        let doc = ResponseDocument::page("", "").with_request(RequestRecord::new("https://a", at(1)));
        assert!(matches!(
            fetcher.pick_request(&id(1), &doc),
            Err(WaspError::NoMatchingRequest { .. })
        ));
    }

    #[test]
    fn test_hit_without_snippet_is_dropped() {
        let index = store();
        index
            .put(
                id(1),
                ResponseDocument::page("webis", "no match in the body")
                    .with_request(RequestRecord::new("https://a", at(1))),
            )
            .unwrap();

        let fetcher = ResultsFetcher::new(index, Query::new("webis", None, None), 10).unwrap();
        assert!(fetcher.fetch(1).unwrap().is_empty());
    }

    #[test]
    fn test_revisit_indexed_before_its_page() {
        let index = store();
        index.put(id(2), ResponseDocument::revisit(id(1))).unwrap();
        assert!(index
            .append_request(&id(2), RequestRecord::new("https://mirror.example", at(200)))
            .unwrap());
        index
            .put(id(1), ResponseDocument::page("Home", "Welcome to webis"))
            .unwrap();

        let fetcher = ResultsFetcher::new(index, Query::new("webis", None, None), 10).unwrap();
        let results = fetcher.fetch(1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, id(2));
        assert_eq!(results[0].title, "Home");
        assert_eq!(results[0].content, "Welcome to webis");
        assert_eq!(results[0].snippet, "Welcome to <em>webis</em>");
        assert_eq!(results[0].matched_request.uri, "https://mirror.example");
        assert_eq!(results[0].matched_request.date, at(200));
    }

    #[test]
    fn test_uppercase_non_ascii_content() {
        let index = store();
        index
            .put(
                id(1),
                ResponseDocument::page("", "ÜBER UNS: Willkommen")
                    .with_request(RequestRecord::new("https://a", at(1))),
            )
            .unwrap();

        let fetcher = ResultsFetcher::new(index, Query::new("über", None, None), 10).unwrap();
        let results = fetcher.fetch(1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].snippet, "<em>ÜBER</em> UNS: Willkommen");
    }

    #[test]
    fn test_pages() {
        let index = store();
        for n in 0..15 {
            index
                .put(
                    id(n),
                    ResponseDocument::page("", format!("archive page {}", n))
                        .with_request(RequestRecord::new("https://a", at(n as i64))),
                )
                .unwrap();
        }

        let fetcher = ResultsFetcher::new(index, Query::new("archive", None, None), 10).unwrap();
        assert_eq!(fetcher.fetch(1).unwrap().len(), 10);
        assert_eq!(fetcher.fetch(2).unwrap().len(), 5);
        assert!(fetcher.fetch(3).unwrap().is_empty());
        // Page 0 is treated as the first page
        assert_eq!(fetcher.fetch(0).unwrap().len(), 10);
    }

    #[test]
    fn test_zero_page_size() {
        assert!(ResultsFetcher::new(store(), Query::new("x", None, None), 0).is_err());
    }

    #[test]
    fn test_result_pages_cache() {
        let index = store();
        index
            .put(
                id(1),
                ResponseDocument::page("", "cached content")
                    .with_request(RequestRecord::new("https://a", at(1))),
            )
            .unwrap();
        let fetcher = ResultsFetcher::new(index.clone(), Query::new("cached", None, None), 10).unwrap();
        let pages = ResultPages::new(fetcher);

        let first = pages.page(1).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(pages.cached_pages(), 1);

        // Served from the cache even though the store changed
        index.clear().unwrap();
        assert_eq!(pages.page(1).unwrap().len(), 1);

        pages.invalidate();
        assert!(pages.page(1).unwrap().is_empty());
    }

    #[test]
    fn test_snippet_and_display() {
        assert_eq!(snippet(&[]), "");
        assert_eq!(
            snippet(&["a <em>x</em>".to_string(), "b <em>x</em>".to_string()]),
            "a <em>x</em> ... b <em>x</em>"
        );

        let result = SearchResult {
            id: id(1),
            score: 1.5,
            snippet: "<em>webis</em>".to_string(),
            title: "Home".to_string(),
            content: "Welcome to webis".to_string(),
            matched_request: RequestRecord::new("https://webis.de", at(100)),
        };
        let text = result.to_string();
        assert!(text.starts_with("Home [1.500]"));
        assert!(text.contains("https://webis.de @ 1970-01-01T00:01:40+00:00"));
    }
}
