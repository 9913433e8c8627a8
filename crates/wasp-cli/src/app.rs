//! Application state management.

use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use wasp_core::search::{ResultPages, ResultsFetcher};
use wasp_core::{Config, DocumentStore, MemoryIndex, Query, SnapshotStore, TimeBound};

/// Shared application state.
pub struct App {
    /// Configuration
    pub config: Config,

    /// The document store
    pub index: Arc<MemoryIndex>,

    /// Snapshot persistence
    pub snapshots: SnapshotStore,
}

impl App {
    /// Create a new application instance from the last snapshot.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let data_dir = config.data_dir()?;
        let snapshots = SnapshotStore::new(&data_dir).with_compression(config.index.compress);
        let index = Arc::new(snapshots.load_or_new());

        info!(
            data_dir = %data_dir.display(),
            documents = index.len(),
            "Application initialized"
        );

        Ok(App {
            config,
            index,
            snapshots,
        })
    }

    /// Save the current documents to disk.
    pub fn save_snapshot(&self) -> anyhow::Result<usize> {
        let count = self.snapshots.save(self.index.as_ref())?;
        Ok(count)
    }

    /// A fetcher for `query` using the configured snippet settings.
    pub fn fetcher(&self, query: Query, page_size: Option<usize>) -> anyhow::Result<ResultsFetcher> {
        let page_size = page_size.unwrap_or(self.config.search.page_size);
        let fetcher = ResultsFetcher::new(self.index.clone(), query, page_size)?
            .with_highlight(self.config.highlight());
        Ok(fetcher)
    }

    /// A page cache for `query`.
    pub fn pages(&self, query: Query) -> anyhow::Result<ResultPages> {
        Ok(ResultPages::new(self.fetcher(query, None)?))
    }
}

/// Build a query from command-line terms and optional time bounds.
pub fn parse_query(terms: &str, from: Option<&str>, to: Option<&str>) -> anyhow::Result<Query> {
    let from = from
        .map(|s| Query::parse_time(s, TimeBound::Start))
        .transpose()
        .context("invalid --from")?;
    let to = to
        .map(|s| Query::parse_time(s, TimeBound::End))
        .transpose()
        .context("invalid --to")?;
    if let (Some(from), Some(to)) = (from, to) {
        anyhow::ensure!(from <= to, "--from {} is after --to {}", from, to);
    }
    Ok(Query::new(terms, from, to))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasp_core::{RecordId, RequestRecord, ResponseDocument};

    #[test]
    fn test_parse_query_bounds() {
        let query = parse_query("webis", Some("2024-05-01"), Some("2024-05-01")).unwrap();
        assert_eq!(query.terms(), "webis");
        let from = query.from().unwrap();
        let to = query.to().unwrap();
        assert_eq!((to - from).num_seconds(), 24 * 3600 - 1);

        assert!(parse_query("webis", Some("yesterday"), None).is_err());
        assert!(parse_query("webis", Some("2024-05-02"), Some("2024-05-01")).is_err());
    }

    #[test]
    fn test_app_roundtrip_through_snapshot() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.index.data_dir = Some(dir.path().to_path_buf());

        let app = App::new(config.clone()).unwrap();
        let id = RecordId::new("<urn:uuid:1>");
        app.index
            .put(
                id.clone(),
                ResponseDocument::page("Home", "Welcome to webis"),
            )
            .unwrap();
        app.index
            .append_request(&id, RequestRecord::new("https://webis.de", chrono::Utc::now()))
            .unwrap();
        assert_eq!(app.save_snapshot().unwrap(), 1);

        let reopened = App::new(config).unwrap();
        let pages = reopened.pages(Query::new("webis", None, None)).unwrap();
        assert_eq!(pages.page(1).unwrap().len(), 1);
    }
}
