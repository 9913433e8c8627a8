//! # wasp Core Library
//!
//! This crate provides continuous ingestion of web archive (WARC) files and
//! time-windowed search over the captured pages. A directory written by an
//! archiving proxy is watched; every file is read, the newest one tailed
//! while it grows, and each record is correlated into response documents
//! that can be searched by the time of the visit.
//!
//! ## Architecture
//!
//! - **Records** (`warc`, `http`, `extract`): WARC framing, embedded HTTP
//!   responses and HTML text extraction
//! - **Readers** (`reader`, `watcher`): replaying closed files, tailing the
//!   growing one, and switching when a new file appears
//! - **Indexer** (`indexer`): turns records into documents
//! - **Store** (`backend`, `index`): the document store interface and its
//!   in-memory implementation
//! - **Search** (`query`, `highlight`, `search`): query building, snippets
//!   and paged results
//! - **Persistence** (`persistence`): on-disk snapshots of the store
//! - **Config** (`config`): Configuration management
//!
//! ## Example
//!
//! ```rust
//! use wasp_core::{DocumentStore, MemoryIndex, Query, RecordId, RequestRecord, ResponseDocument};
//!
//! let index = MemoryIndex::new();
//! let id = RecordId::new("<urn:uuid:1>");
//! index.put(id.clone(), ResponseDocument::page("Home", "Welcome to webis")).unwrap();
//! index
//!     .append_request(&id, RequestRecord::new("https://webis.de", chrono::Utc::now()))
//!     .unwrap();
//!
//! let hits = index.search(&Query::new("webis", None, None).build(), 10, 0).unwrap();
//! assert_eq!(hits.total, 1);
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod extract;
pub mod highlight;
pub mod http;
pub mod index;
pub mod indexer;
pub mod persistence;
pub mod query;
pub mod reader;
pub mod search;
pub mod types;
pub mod warc;
pub mod watcher;

// Re-export commonly used types
pub use backend::{DocumentStore, SearchHit, SearchHits};
pub use config::Config;
pub use error::{Result, WaspError};
pub use extract::{ExtractedDocument, HtmlExtractor, ScraperExtractor};
pub use index::MemoryIndex;
pub use indexer::{IndexOutcome, IngestStats, WarcIndexer};
pub use persistence::SnapshotStore;
pub use query::{HighlightSpec, Query, StructuredQuery, TimeBound};
pub use reader::{EndOfStream, ReadMode, ReaderHandle, RecordConsumer, RecordReader};
pub use search::{ResultPages, ResultsFetcher, SearchResult};
pub use types::{RecordId, RequestRecord, ResponseDocument, StoreStats};
pub use warc::{ArchiveRecord, RecordType};
pub use watcher::{ArchiveWatcher, WatcherHandle};
