//! In-memory document store.
//!
//! The `MemoryIndex` keeps every response document in memory together with
//! the term statistics needed to rank them. It supports:
//!
//! - Storing page and revisit documents keyed by record ID
//! - Atomic appends to a document's request list
//! - Executing structured queries with BM25 scoring and highlighting
//! - Parallel evaluation using Rayon for large stores
//!
//! ## Architecture
//!
//! - A `Vec<IndexedDocument>` stores all documents for cache-friendly scans
//! - A `DashMap<RecordId, usize>` maps IDs to positions for O(1) lookups
//! - Per-field document frequencies and lengths are updated on every `put`
//!
//! Revisit pointers are matched and highlighted with the title and content
//! of the page they resolve to, and with their own requests.
//!
//! Documents are never removed one by one, so positions stay valid until
//! `clear`. Every mutation takes the vector's write lock first and only then
//! touches the ID map; appends are therefore atomic with respect to each
//! other and to concurrent `put`s of the same document.

use crate::backend::{DocumentStore, SearchHit, SearchHits, MAX_REVISIT_DEPTH};
use crate::error::Result;
use crate::highlight::{tokenize, Highlighter};
use crate::query::{Clause, Field, MatchOperator, StructuredQuery, REQUESTS_PATH};
use crate::types::{RecordId, RequestRecord, ResponseDocument, StoreStats};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, instrument, trace};

/// Stores above this size are searched in parallel
const PARALLEL_THRESHOLD: usize = 10_000;

/// BM25 term frequency saturation
const BM25_K1: f32 = 1.2;
/// BM25 length normalization
const BM25_B: f32 = 0.75;

/// Term frequencies of one field of one document.
#[derive(Debug, Clone, Default)]
struct FieldTerms {
    freqs: HashMap<String, u32>,
    len: u32,
}

impl FieldTerms {
    fn new(text: &str) -> Self {
        let mut terms = FieldTerms::default();
        for token in tokenize(text) {
            *terms.freqs.entry(token).or_insert(0) += 1;
            terms.len += 1;
        }
        terms
    }
}

#[derive(Debug, Clone)]
struct IndexedDocument {
    id: RecordId,
    document: ResponseDocument,
    title: FieldTerms,
    content: FieldTerms,
}

impl IndexedDocument {
    fn new(id: RecordId, document: ResponseDocument) -> Self {
        IndexedDocument {
            title: FieldTerms::new(&document.title),
            content: FieldTerms::new(&document.content),
            id,
            document,
        }
    }

    fn field(&self, field: Field) -> Option<&FieldTerms> {
        match field {
            Field::Title => Some(&self.title),
            Field::Content => Some(&self.content),
            Field::RequestDate => None,
        }
    }
}

/// Document frequencies and total length of one field.
#[derive(Debug, Clone, Default)]
struct FieldStats {
    doc_freq: HashMap<String, u64>,
    total_len: u64,
}

impl FieldStats {
    fn add(&mut self, terms: &FieldTerms) {
        for term in terms.freqs.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.total_len += terms.len as u64;
    }

    fn remove(&mut self, terms: &FieldTerms) {
        for term in terms.freqs.keys() {
            if let Some(df) = self.doc_freq.get_mut(term) {
                *df -= 1;
                if *df == 0 {
                    self.doc_freq.remove(term);
                }
            }
        }
        self.total_len = self.total_len.saturating_sub(terms.len as u64);
    }
}

/// Statistics over all stored documents, used for ranking.
#[derive(Debug, Clone, Default)]
struct CorpusStats {
    documents: u64,
    title: FieldStats,
    content: FieldStats,
}

impl CorpusStats {
    fn add(&mut self, doc: &IndexedDocument) {
        self.documents += 1;
        self.title.add(&doc.title);
        self.content.add(&doc.content);
    }

    fn remove(&mut self, doc: &IndexedDocument) {
        self.documents = self.documents.saturating_sub(1);
        self.title.remove(&doc.title);
        self.content.remove(&doc.content);
    }

    fn field(&self, field: Field) -> Option<&FieldStats> {
        match field {
            Field::Title => Some(&self.title),
            Field::Content => Some(&self.content),
            Field::RequestDate => None,
        }
    }
}

/// A clause with its match text already tokenized.
enum Compiled {
    Bool {
        must: Vec<Compiled>,
        should: Vec<Compiled>,
    },
    Match {
        field: Field,
        terms: Vec<String>,
        operator: MatchOperator,
        boost: f32,
    },
    Nested {
        path: String,
        query: Box<Compiled>,
    },
    Range {
        field: Field,
        gte: Option<DateTime<Utc>>,
        lte: Option<DateTime<Utc>>,
    },
}

impl Compiled {
    fn new(clause: &Clause) -> Self {
        match clause {
            Clause::Bool { must, should } => Compiled::Bool {
                must: must.iter().map(Compiled::new).collect(),
                should: should.iter().map(Compiled::new).collect(),
            },
            Clause::Match {
                field,
                query,
                operator,
                boost,
            } => {
                let mut terms = tokenize(query);
                terms.sort();
                terms.dedup();
                Compiled::Match {
                    field: *field,
                    terms,
                    operator: *operator,
                    boost: *boost,
                }
            }
            Clause::Nested { path, query } => Compiled::Nested {
                path: path.clone(),
                query: Box::new(Compiled::new(query)),
            },
            Clause::Range { field, gte, lte } => Compiled::Range {
                field: *field,
                gte: *gte,
                lte: *lte,
            },
        }
    }
}

/// What a clause is evaluated against.
#[derive(Clone, Copy)]
enum Scope<'a> {
    /// Text fields come from `text`, the resolved page for a revisit
    Document {
        text: &'a IndexedDocument,
        requests: &'a [RequestRecord],
    },
    Request(&'a RequestRecord),
}

struct Scorer<'a> {
    corpus: &'a CorpusStats,
}

impl Scorer<'_> {
    /// Score of `clause` in `scope`, or `None` if it does not match.
    fn evaluate(&self, clause: &Compiled, scope: Scope<'_>) -> Option<f32> {
        match clause {
            Compiled::Bool { must, should } => {
                let mut score = 0.0;
                for c in must {
                    score += self.evaluate(c, scope)?;
                }
                let mut any_should = false;
                for c in should {
                    if let Some(s) = self.evaluate(c, scope) {
                        score += s;
                        any_should = true;
                    }
                }
                if must.is_empty() && !should.is_empty() && !any_should {
                    return None;
                }
                Some(score)
            }
            Compiled::Match {
                field,
                terms,
                operator,
                boost,
            } => match scope {
                Scope::Document { text, .. } => {
                    self.score_match(text, *field, terms, *operator, *boost)
                }
                Scope::Request(_) => None,
            },
            Compiled::Nested { path, query } => match scope {
                Scope::Document { requests, .. } if path == REQUESTS_PATH => requests
                    .iter()
                    .filter_map(|r| self.evaluate(query, Scope::Request(r)))
                    .reduce(f32::max),
                _ => None,
            },
            Compiled::Range { field, gte, lte } => match (scope, field) {
                (Scope::Request(request), Field::RequestDate) => {
                    request.is_within(*gte, *lte).then_some(1.0)
                }
                _ => None,
            },
        }
    }

    fn score_match(
        &self,
        doc: &IndexedDocument,
        field: Field,
        terms: &[String],
        operator: MatchOperator,
        boost: f32,
    ) -> Option<f32> {
        let (doc_terms, stats) = (doc.field(field)?, self.corpus.field(field)?);
        if terms.is_empty() {
            return None;
        }

        let n = self.corpus.documents.max(1) as f32;
        let avg_len = (stats.total_len as f32 / n).max(1.0);
        let norm = BM25_K1 * (1.0 - BM25_B + BM25_B * doc_terms.len as f32 / avg_len);

        let mut score = 0.0;
        let mut matched = 0;
        for term in terms {
            let Some(&tf) = doc_terms.freqs.get(term) else {
                continue;
            };
            let df = stats.doc_freq.get(term).copied().unwrap_or(0) as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            let tf = tf as f32;
            score += idf * tf * (BM25_K1 + 1.0) / (tf + norm);
            matched += 1;
        }

        let matches = match operator {
            MatchOperator::And => matched == terms.len(),
            MatchOperator::Or => matched > 0,
        };
        matches.then_some(score * boost)
    }
}

/// The in-memory document store.
///
/// This structure is designed for concurrent access:
/// - Multiple readers can search simultaneously
/// - Writes are serialized via internal locking
///
/// ## Example
///
/// ```rust
/// use wasp_core::{DocumentStore, MemoryIndex, Query, RecordId, RequestRecord, ResponseDocument};
///
/// let index = MemoryIndex::new();
/// let id = RecordId::new("<urn:uuid:1>");
/// index.put(id.clone(), ResponseDocument::page("Home", "Welcome to webis")).unwrap();
/// index.append_request(&id, RequestRecord::new("https://webis.de", chrono::Utc::now())).unwrap();
///
/// let hits = index.search(&Query::new("webis", None, None).build(), 10, 0).unwrap();
/// assert_eq!(hits.total, 1);
/// ```
pub struct MemoryIndex {
    /// All documents in insertion order
    documents: RwLock<Vec<IndexedDocument>>,

    /// Map from record ID to position in `documents`
    id_to_index: DashMap<RecordId, usize>,

    /// Ranking statistics
    corpus: RwLock<CorpusStats>,

    /// Modification counter, bumped on every write
    generation: AtomicU64,
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        MemoryIndex {
            documents: RwLock::new(Vec::new()),
            id_to_index: DashMap::new(),
            corpus: RwLock::new(CorpusStats::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// Build an index from stored documents (e.g. a loaded snapshot).
    #[instrument(skip(documents), fields(count = documents.len()))]
    pub fn from_documents(documents: Vec<(RecordId, ResponseDocument)>) -> Self {
        let index = MemoryIndex::new();
        {
            let mut docs = index.documents.write();
            let mut corpus = index.corpus.write();
            docs.reserve(documents.len());
            for (id, document) in documents {
                let indexed = IndexedDocument::new(id.clone(), document);
                match index.id_to_index.get(&id).map(|i| *i) {
                    Some(idx) => {
                        corpus.remove(&docs[idx]);
                        corpus.add(&indexed);
                        docs[idx] = indexed;
                    }
                    None => {
                        corpus.add(&indexed);
                        index.id_to_index.insert(id, docs.len());
                        docs.push(indexed);
                    }
                }
            }
            info!(documents = docs.len(), "Index built");
        }
        index.generation.fetch_add(1, Ordering::Release);
        index
    }

    /// Get the current generation (modification counter).
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Position of the page `docs[idx]` resolves to.
    ///
    /// `None` for a dangling pointer or a chain deeper than
    /// `MAX_REVISIT_DEPTH` (which includes cycles).
    fn resolve_position(&self, docs: &[IndexedDocument], idx: usize) -> Option<usize> {
        let mut current = idx;
        for _ in 0..=MAX_REVISIT_DEPTH {
            let target = docs.get(current)?.document.revisited_id.as_ref();
            match target {
                None => return Some(current),
                Some(id) => current = *self.id_to_index.get(id)?,
            }
        }
        None
    }

    /// The document whose title and content stand for `docs[idx]`.
    fn text_of<'a>(&self, docs: &'a [IndexedDocument], idx: usize) -> &'a IndexedDocument {
        let doc = &docs[idx];
        if !doc.document.is_revisit() {
            return doc;
        }
        match self.resolve_position(docs, idx) {
            Some(page) => &docs[page],
            None => {
                trace!(id = %doc.id, "Unresolved revisit, matching its own fields");
                doc
            }
        }
    }

    fn evaluate_all(&self, docs: &[IndexedDocument], query: &Compiled, corpus: &CorpusStats) -> Vec<(usize, f32)> {
        let scorer = Scorer { corpus };
        let score = |(i, doc): (usize, &IndexedDocument)| {
            let scope = Scope::Document {
                text: self.text_of(docs, i),
                requests: &doc.document.requests,
            };
            scorer.evaluate(query, scope).map(|s| (i, s))
        };

        // Use parallel filtering for large indices
        if docs.len() > PARALLEL_THRESHOLD {
            docs.par_iter().enumerate().filter_map(score).collect()
        } else {
            docs.iter().enumerate().filter_map(score).collect()
        }
    }
}

impl DocumentStore for MemoryIndex {
    fn put(&self, id: RecordId, document: ResponseDocument) -> Result<()> {
        let indexed = IndexedDocument::new(id.clone(), document);
        let mut docs = self.documents.write();
        let mut corpus = self.corpus.write();

        match self.id_to_index.get(&id).map(|i| *i) {
            Some(idx) => {
                debug!(id = %id, "Replacing document");
                corpus.remove(&docs[idx]);
                corpus.add(&indexed);
                docs[idx] = indexed;
            }
            None => {
                corpus.add(&indexed);
                self.id_to_index.insert(id, docs.len());
                docs.push(indexed);
            }
        }

        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    fn get(&self, id: &RecordId) -> Result<Option<ResponseDocument>> {
        let docs = self.documents.read();
        let idx = self.id_to_index.get(id).map(|i| *i);
        Ok(idx.and_then(|i| docs.get(i)).map(|d| d.document.clone()))
    }

    fn append_request(&self, id: &RecordId, request: RequestRecord) -> Result<bool> {
        let mut docs = self.documents.write();
        let Some(idx) = self.id_to_index.get(id).map(|i| *i) else {
            return Ok(false);
        };
        let Some(doc) = docs.get_mut(idx) else {
            return Ok(false);
        };
        doc.document.requests.push(request);
        self.generation.fetch_add(1, Ordering::Release);
        Ok(true)
    }

    fn search(&self, query: &StructuredQuery, size: usize, from: usize) -> Result<SearchHits> {
        let compiled = Compiled::new(&query.query);
        let docs = self.documents.read();
        let corpus = self.corpus.read();

        let mut matches = self.evaluate_all(&docs, &compiled, &corpus);
        matches.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| docs[a.0].id.cmp(&docs[b.0].id))
        });

        let highlighter = query.highlight.as_ref().and_then(|spec| {
            Highlighter::new(query.query.match_queries(spec.field), spec.clone())
                .map(|h| (h, spec.field))
        });

        let total = matches.len();
        let hits = matches
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(i, score)| {
                let doc = &docs[i];
                let text = &self.text_of(&docs, i).document;
                let highlights = match &highlighter {
                    Some((h, Field::Title)) => h.fragments(&text.title),
                    Some((h, Field::Content)) => h.fragments(&text.content),
                    _ => Vec::new(),
                };
                SearchHit {
                    id: doc.id.clone(),
                    score,
                    document: doc.document.clone(),
                    highlights,
                }
            })
            .collect();

        Ok(SearchHits { total, hits })
    }

    fn len(&self) -> usize {
        self.documents.read().len()
    }

    fn stats(&self) -> StoreStats {
        let docs = self.documents.read();
        let mut stats = StoreStats::default();
        for doc in docs.iter() {
            if doc.document.is_revisit() {
                stats.revisits += 1;
            } else {
                stats.pages += 1;
            }
            stats.requests += doc.document.requests.len() as u64;
        }
        stats
    }

    fn clear(&self) -> Result<()> {
        let mut docs = self.documents.write();
        docs.clear();
        self.id_to_index.clear();
        *self.corpus.write() = CorpusStats::default();
        self.generation.fetch_add(1, Ordering::Release);
        Ok(())
    }

    fn documents(&self) -> Vec<(RecordId, ResponseDocument)> {
        self.documents
            .read()
            .iter()
            .map(|d| (d.id.clone(), d.document.clone()))
            .collect()
    }
}

impl std::fmt::Debug for MemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIndex")
            .field("document_count", &self.len())
            .field("generation", &self.generation())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{HighlightSpec, Query};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn id(n: usize) -> RecordId {
        RecordId::new(format!("<urn:uuid:{}>", n))
    }

    fn page_with_request(index: &MemoryIndex, n: usize, title: &str, content: &str, t: i64) {
        index.put(id(n), ResponseDocument::page(title, content)).unwrap();
        assert!(index
            .append_request(&id(n), RequestRecord::new(format!("https://example.com/{}", n), at(t)))
            .unwrap());
    }

    #[test]
    fn test_revisit_matches_resolved_page() {
        let index = MemoryIndex::new();
        index.put(id(3), ResponseDocument::revisit(id(2))).unwrap();
        index.put(id(2), ResponseDocument::revisit(id(1))).unwrap();
        index.put(id(1), ResponseDocument::page("Home", "Welcome to webis")).unwrap();
        index
            .append_request(&id(3), RequestRecord::new("https://b", at(5)))
            .unwrap();

        let hits = index
            .search(&Query::new("webis", None, None).build(), 10, 0)
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].id, id(3));
        assert!(hits.hits[0].score > 0.0);
        assert!(hits.hits[0].document.is_revisit());
        assert_eq!(hits.hits[0].highlights, vec!["Welcome to <em>webis</em>"]);
    }

    #[test]
    fn test_unresolved_revisit_has_no_text() {
        let index = MemoryIndex::new();
        index.put(id(1), ResponseDocument::revisit(id(2))).unwrap();
        index.put(id(2), ResponseDocument::revisit(id(1))).unwrap();
        index.put(id(3), ResponseDocument::revisit(id(9))).unwrap();
        for n in [1, 3] {
            index
                .append_request(&id(n), RequestRecord::new("https://a", at(1)))
                .unwrap();
        }

        // Both match the time window only
        let hits = index
            .search(&Query::new("webis", None, None).build(), 10, 0)
            .unwrap();
        assert_eq!(hits.total, 2);
        assert!(hits.hits.iter().all(|h| h.score == 0.0 && h.highlights.is_empty()));
    }

    #[test]
    fn test_put_get_append() {
        let index = MemoryIndex::new();
        index.put(id(1), ResponseDocument::page("Home", "Welcome")).unwrap();
        assert!(index
            .append_request(&id(1), RequestRecord::new("https://a", at(1)))
            .unwrap());
        assert!(index
            .append_request(&id(1), RequestRecord::new("https://a", at(1)))
            .unwrap());
        assert!(!index
            .append_request(&id(2), RequestRecord::new("https://b", at(2)))
            .unwrap());

        let doc = index.get(&id(1)).unwrap().unwrap();
        assert_eq!(doc.requests.len(), 2);
        assert!(index.get(&id(2)).unwrap().is_none());
    }

    #[test]
    fn test_concurrent_appends_are_not_lost() {
        let index = Arc::new(MemoryIndex::new());
        index.put(id(1), ResponseDocument::page("t", "c")).unwrap();

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let index = Arc::clone(&index);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        index
                            .append_request(&id(1), RequestRecord::new(format!("{}-{}", t, i), at(i)))
                            .unwrap();
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(index.get(&id(1)).unwrap().unwrap().requests.len(), 800);
    }

    #[test]
    fn test_stats() {
        let index = MemoryIndex::new();
        page_with_request(&index, 1, "a", "b", 1);
        index.put(id(2), ResponseDocument::revisit(id(1))).unwrap();

        let stats = index.stats();
        assert_eq!(stats.pages, 1);
        assert_eq!(stats.revisits, 1);
        assert_eq!(stats.requests, 1);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_time_window_is_required() {
        let index = MemoryIndex::new();
        page_with_request(&index, 1, "Webis", "webis archive", 100);
        page_with_request(&index, 2, "Other", "webis too", 500);

        let hits = index
            .search(&Query::new("webis", Some(at(50)), Some(at(150))).build(), 10, 0)
            .unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].id, id(1));

        // A document without requests never matches
        index.put(id(3), ResponseDocument::page("webis", "webis")).unwrap();
        let hits = index
            .search(&Query::new("webis", None, None).build(), 10, 0)
            .unwrap();
        assert_eq!(hits.total, 2);
    }

    #[test]
    fn test_title_boost_ranks_higher() {
        let index = MemoryIndex::new();
        page_with_request(&index, 1, "Unrelated", "the archive search page", 1);
        page_with_request(&index, 2, "Archive", "the archive search page", 1);

        let hits = index
            .search(&Query::new("archive", None, None).build(), 10, 0)
            .unwrap();
        assert_eq!(hits.hits[0].id, id(2));
        assert!(hits.hits[0].score > hits.hits[1].score);
    }

    #[test]
    fn test_and_operator() {
        let index = MemoryIndex::new();
        page_with_request(&index, 1, "", "web archive search", 1);
        page_with_request(&index, 2, "", "web only", 1);

        let query = StructuredQuery::new(Clause::match_field(
            Field::Content,
            "web archive",
            MatchOperator::And,
        ));
        let hits = index.search(&query, 10, 0).unwrap();
        assert_eq!(hits.total, 1);

        let query = StructuredQuery::new(Clause::match_field(
            Field::Content,
            "web archive",
            MatchOperator::Or,
        ));
        assert_eq!(index.search(&query, 10, 0).unwrap().total, 2);
    }

    #[test]
    fn test_should_is_optional_with_must() {
        let index = MemoryIndex::new();
        page_with_request(&index, 1, "Home", "nothing relevant", 1);

        // The window matches; the terms do not, so there is no highlight
        let hits = index
            .search(&Query::new("webis", None, None).build(), 10, 0)
            .unwrap();
        assert_eq!(hits.total, 1);
        assert!(hits.hits[0].highlights.is_empty());

        // Without must, one should clause has to match
        let query = StructuredQuery::new(Clause::Bool {
            must: Vec::new(),
            should: vec![Clause::match_field(Field::Content, "webis", MatchOperator::And)],
        });
        assert_eq!(index.search(&query, 10, 0).unwrap().total, 0);
    }

    #[test]
    fn test_highlights() {
        let index = MemoryIndex::new();
        page_with_request(&index, 1, "Home", "Welcome to webis", 1);

        let query = Query::new("webis", None, None)
            .build_with_highlight(HighlightSpec::new(Field::Content).with_fragment_size(50));
        let hits = index.search(&query, 10, 0).unwrap();
        assert_eq!(hits.hits[0].highlights, vec!["Welcome to <em>webis</em>"]);
    }

    #[test]
    fn test_pagination() {
        let index = MemoryIndex::new();
        for n in 0..25 {
            page_with_request(&index, n, "", "common term", 1);
        }
        let query = Query::new("common", None, None).build();

        let first = index.search(&query, 10, 0).unwrap();
        let third = index.search(&query, 10, 20).unwrap();
        assert_eq!(first.total, 25);
        assert_eq!(first.hits.len(), 10);
        assert_eq!(third.hits.len(), 5);
        assert!(index.search(&query, 10, 30).unwrap().hits.is_empty());
    }

    #[test]
    fn test_replace_updates_statistics() {
        let index = MemoryIndex::new();
        index.put(id(1), ResponseDocument::page("old", "old words")).unwrap();
        index.put(id(1), ResponseDocument::page("new", "new words")).unwrap();
        assert_eq!(index.len(), 1);

        let corpus = index.corpus.read();
        assert!(!corpus.content.doc_freq.contains_key("old"));
        assert_eq!(corpus.content.doc_freq.get("words"), Some(&1));
        assert_eq!(corpus.documents, 1);
    }

    #[test]
    fn test_parallel_search() {
        let docs: Vec<_> = (0..PARALLEL_THRESHOLD + 10)
            .map(|n| {
                let content = if n % 2 == 0 { "even page" } else { "odd page" };
                let doc = ResponseDocument::page("", content)
                    .with_request(RequestRecord::new("https://x", at(n as i64)));
                (id(n), doc)
            })
            .collect();
        let index = MemoryIndex::from_documents(docs);

        let query = StructuredQuery::new(Clause::Bool {
            must: vec![
                Clause::Nested {
                    path: REQUESTS_PATH.to_string(),
                    query: Box::new(Clause::Range {
                        field: Field::RequestDate,
                        gte: Some(at(0)),
                        lte: Some(at(99)),
                    }),
                },
                Clause::match_field(Field::Content, "even", MatchOperator::And),
            ],
            should: Vec::new(),
        });
        assert_eq!(index.search(&query, 10, 0).unwrap().total, 50);
    }

    #[test]
    fn test_clear_and_generation() {
        let index = MemoryIndex::new();
        let g0 = index.generation();
        page_with_request(&index, 1, "a", "b", 1);
        assert!(index.generation() > g0);

        index.clear().unwrap();
        assert!(index.is_empty());
        assert!(index.get(&id(1)).unwrap().is_none());
    }
}
