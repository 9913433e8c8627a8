//! Document store traits.
//!
//! This module defines the abstract interface of the document store. The
//! indexer writes through it and the results fetcher reads through it, so
//! neither depends on how documents are kept or how queries are executed.
//!
//! ## Implementing a New Store
//!
//! 1. Implement `DocumentStore` for your type
//! 2. Make `append_request` a single store-side mutation; callers never
//!    read, modify and write back a document
//! 3. Execute the whole [`StructuredQuery`] language, including the nested
//!    range filter on `requests.date`
//!
//! [`MemoryIndex`](crate::MemoryIndex) is the in-process implementation.

use crate::error::{Result, WaspError};
use crate::query::StructuredQuery;
use crate::types::{RecordId, RequestRecord, ResponseDocument, StoreStats};
use serde::{Deserialize, Serialize};

/// Longest revisit chain [`DocumentStore::resolve`] follows.
pub const MAX_REVISIT_DEPTH: usize = 32;

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Key of the matching document
    pub id: RecordId,

    /// Relevance score, higher is better
    pub score: f32,

    /// The document as stored (a revisit pointer stays a pointer)
    pub document: ResponseDocument,

    /// Highlighted fragments of the highlight field, best first
    pub highlights: Vec<String>,
}

/// A page of search hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchHits {
    /// Number of matching documents over all pages
    pub total: usize,

    /// The requested page, best first
    pub hits: Vec<SearchHit>,
}

impl SearchHits {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// Storage and search of response documents.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`: reader threads write while the
/// query side reads.
pub trait DocumentStore: Send + Sync {
    /// Store a document under `id`, replacing any previous one.
    fn put(&self, id: RecordId, document: ResponseDocument) -> Result<()>;

    /// Get the document stored under `id`.
    fn get(&self, id: &RecordId) -> Result<Option<ResponseDocument>>;

    /// Atomically append a request to the document stored under `id`.
    ///
    /// Returns `false` if there is no such document.
    fn append_request(&self, id: &RecordId, request: RequestRecord) -> Result<bool>;

    /// Execute a query, returning `size` hits starting at offset `from`.
    fn search(&self, query: &StructuredQuery, size: usize, from: usize) -> Result<SearchHits>;

    /// Number of stored documents
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn stats(&self) -> StoreStats;

    /// Remove every document.
    fn clear(&self) -> Result<()>;

    /// Copy of all documents (for persistence).
    fn documents(&self) -> Vec<(RecordId, ResponseDocument)>;

    /// Follow revisit pointers from `id` to the page they end at.
    ///
    /// Returns the page's id and document, or `None` if some document on
    /// the way is missing.
    fn resolve(&self, id: &RecordId) -> Result<Option<(RecordId, ResponseDocument)>> {
        let mut current = id.clone();
        for _ in 0..=MAX_REVISIT_DEPTH {
            let Some(document) = self.get(&current)? else {
                return Ok(None);
            };
            match document.revisited_id.clone() {
                Some(next) => current = next,
                None => return Ok(Some((current, document))),
            }
        }
        Err(WaspError::RevisitChainTooDeep {
            id: id.to_string(),
            depth: MAX_REVISIT_DEPTH,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Clause, StructuredQuery};
    use parking_lot::RwLock;
    use std::collections::HashMap;

    /// Minimal store to exercise the provided methods
    #[derive(Default)]
    struct MapStore {
        docs: RwLock<HashMap<RecordId, ResponseDocument>>,
    }

    impl DocumentStore for MapStore {
        fn put(&self, id: RecordId, document: ResponseDocument) -> Result<()> {
            self.docs.write().insert(id, document);
            Ok(())
        }

        fn get(&self, id: &RecordId) -> Result<Option<ResponseDocument>> {
            Ok(self.docs.read().get(id).cloned())
        }

        fn append_request(&self, id: &RecordId, request: RequestRecord) -> Result<bool> {
            Ok(self
                .docs
                .write()
                .get_mut(id)
                .map(|d| d.requests.push(request))
                .is_some())
        }

        fn search(&self, _query: &StructuredQuery, _size: usize, _from: usize) -> Result<SearchHits> {
            Ok(SearchHits::default())
        }

        fn len(&self) -> usize {
            self.docs.read().len()
        }

        fn stats(&self) -> StoreStats {
            StoreStats::default()
        }

        fn clear(&self) -> Result<()> {
            self.docs.write().clear();
            Ok(())
        }

        fn documents(&self) -> Vec<(RecordId, ResponseDocument)> {
            self.docs
                .read()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }
    }

    fn id(n: usize) -> RecordId {
        RecordId::new(format!("<urn:uuid:{}>", n))
    }

    #[test]
    fn test_resolve_page() {
        let store = MapStore::default();
        store.put(id(1), ResponseDocument::page("Home", "Welcome")).unwrap();
        let (resolved, doc) = store.resolve(&id(1)).unwrap().unwrap();
        assert_eq!(resolved, id(1));
        assert_eq!(doc.title, "Home");
    }

    #[test]
    fn test_resolve_chain_in_any_order() {
        let store = MapStore::default();
        // Pointers first, page last
        store.put(id(3), ResponseDocument::revisit(id(2))).unwrap();
        store.put(id(2), ResponseDocument::revisit(id(1))).unwrap();
        assert!(store.resolve(&id(3)).unwrap().is_none());

        store.put(id(1), ResponseDocument::page("Home", "Welcome")).unwrap();
        let (resolved, doc) = store.resolve(&id(3)).unwrap().unwrap();
        assert_eq!(resolved, id(1));
        assert_eq!(doc.content, "Welcome");
    }

    #[test]
    fn test_resolve_cycle_is_bounded() {
        let store = MapStore::default();
        store.put(id(1), ResponseDocument::revisit(id(2))).unwrap();
        store.put(id(2), ResponseDocument::revisit(id(1))).unwrap();
        assert!(matches!(
            store.resolve(&id(1)),
            Err(WaspError::RevisitChainTooDeep { .. })
        ));
    }

    #[test]
    fn test_resolve_missing() {
        let store = MapStore::default();
        assert!(store.resolve(&id(9)).unwrap().is_none());
        assert!(store.is_empty());

        let query = StructuredQuery::new(Clause::Bool {
            must: Vec::new(),
            should: Vec::new(),
        });
        assert!(store.search(&query, 10, 0).unwrap().is_empty());
    }
}
