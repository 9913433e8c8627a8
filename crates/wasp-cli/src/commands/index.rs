//! Index command - watch the archive directory and index its records.

use crate::app::App;
use anyhow::Context;
use crossbeam_channel::{select, Receiver};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use wasp_core::{ArchiveWatcher, Config, DocumentStore, WarcIndexer, WatcherHandle};

/// How often the watcher's health is checked
const CHECK_INTERVAL: Duration = Duration::from_millis(250);

/// Why the indexing loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    /// Ctrl+C or SIGTERM
    Interrupted,
    /// The watcher's run loop ended on its own
    WatchEnded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::WatchEnded => write!(f, "watch ended"),
        }
    }
}

/// Run the index command.
pub fn run(config: Config, directory: Option<PathBuf>, no_backfill: bool) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let directory = app.config.archive_directory(directory.as_deref())?;
    let read_existing = app.config.archive.read_existing_records && !no_backfill;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("failed to install the Ctrl+C handler")?;

    println!("Indexing archives in {}", directory.display());
    println!("  Documents loaded: {}", app.index.len());
    println!(
        "  Snapshots every {}s to {}",
        app.config.snapshot_interval().as_secs(),
        app.snapshots.snapshot_path().display()
    );
    println!("Press Ctrl+C to stop.");
    println!();

    let indexer = Arc::new(WarcIndexer::new(app.index.clone()));
    let watcher = ArchiveWatcher::start(
        &directory,
        read_existing,
        app.config.poll_interval(),
        indexer.clone(),
    )?;
    let mut handle = watcher.spawn()?;

    let reason = supervise(&app, &indexer, &handle, &stop_rx);
    info!(reason = %reason, "Stopping indexer");
    let result = shutdown(&app, &mut handle);

    let stats = indexer.stats();
    println!();
    println!("Indexing stopped ({}).", reason);
    println!("  Pages:            {}", stats.pages);
    println!("  Revisits:         {}", stats.revisits);
    println!("  Requests:         {}", stats.requests);
    println!("  Dropped requests: {}", stats.requests_dropped);
    println!("  Failed records:   {}", stats.failures);

    result
}

/// Save snapshots while the watcher runs, until it ends or `stop` fires.
fn supervise(
    app: &App,
    indexer: &WarcIndexer,
    handle: &WatcherHandle,
    stop: &Receiver<()>,
) -> StopReason {
    let ticker = crossbeam_channel::tick(CHECK_INTERVAL);
    let mut saved_generation = app.index.generation();
    let mut last_snapshot = Instant::now();

    loop {
        select! {
            recv(stop) -> _ => return StopReason::Interrupted,
            recv(ticker) -> _ => {}
        }
        if handle.is_finished() {
            return StopReason::WatchEnded;
        }
        if last_snapshot.elapsed() < app.config.snapshot_interval() {
            continue;
        }
        last_snapshot = Instant::now();

        let generation = app.index.generation();
        if generation == saved_generation {
            continue;
        }
        match app.save_snapshot() {
            Ok(count) => {
                saved_generation = generation;
                let stats = indexer.stats();
                info!(
                    documents = count,
                    pages = stats.pages,
                    requests = stats.requests,
                    failures = stats.failures,
                    "Snapshot saved"
                );
            }
            Err(e) => error!(error = %e, "Failed to save snapshot"),
        }
    }
}

/// Drain and stop the watcher, then save the final snapshot.
///
/// The snapshot is written even when the watch itself failed; that
/// failure is returned afterwards.
fn shutdown(app: &App, handle: &mut WatcherHandle) -> anyhow::Result<()> {
    let result = handle.stop();
    let count = app.save_snapshot()?;
    info!(documents = count, "Final snapshot saved");
    result?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use tempfile::TempDir;
    use wasp_core::{ArchiveRecord, RecordType};

    fn test_app(data: &TempDir) -> App {
        let mut config = Config::default();
        config.index.data_dir = Some(data.path().to_path_buf());
        // Only the final snapshot should be written
        config.index.snapshot_interval_secs = 3600;
        App::new(config).unwrap()
    }

    fn write_page(dir: &TempDir) {
        let html = "<html><head><title>Home</title></head><body>Welcome to webis</body></html>";
        let http = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: {}\r\n\r\n{}",
            html.len(),
            html
        );
        let record = ArchiveRecord::builder(RecordType::Response)
            .id("<urn:uuid:r1>")
            .date(Utc.timestamp_opt(10, 0).unwrap())
            .target_uri("https://webis.de/")
            .block(http.into_bytes())
            .build();
        std::fs::write(dir.path().join("capture.warc"), record.to_bytes()).unwrap();
    }

    #[test]
    fn test_interrupt_stops_and_saves_snapshot() {
        let archives = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        write_page(&archives);

        let app = test_app(&data);
        let indexer = Arc::new(WarcIndexer::new(app.index.clone()));
        let watcher = ArchiveWatcher::start(
            archives.path(),
            true,
            Duration::from_millis(20),
            indexer.clone(),
        )
        .unwrap();
        let mut handle = watcher.spawn().unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while indexer.stats().pages == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(indexer.stats().pages, 1);
        assert!(!app.snapshots.exists());

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        stop_tx.send(()).unwrap();
        assert_eq!(
            supervise(&app, &indexer, &handle, &stop_rx),
            StopReason::Interrupted
        );

        shutdown(&app, &mut handle).unwrap();
        assert!(handle.is_finished());
        let restored = app.snapshots.load().unwrap();
        assert_eq!(restored.len(), 1);
    }

    #[test]
    fn test_finished_watch_ends_supervision() {
        let archives = TempDir::new().unwrap();
        let data = TempDir::new().unwrap();
        let app = test_app(&data);
        let indexer = Arc::new(WarcIndexer::new(app.index.clone()));
        let watcher = ArchiveWatcher::start(
            archives.path(),
            true,
            Duration::from_millis(20),
            indexer.clone(),
        )
        .unwrap();
        let mut handle = watcher.spawn().unwrap();
        handle.stop().unwrap();

        let (_stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        assert_eq!(
            supervise(&app, &indexer, &handle, &stop_rx),
            StopReason::WatchEnded
        );
    }
}
