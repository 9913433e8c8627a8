//! Watching the archive directory.
//!
//! The watcher keeps exactly one tailing reader alive, pointed at the most
//! recently created archive file. Older files are replayed once at start-up.
//!
//! ## Architecture
//!
//! ```text
//! start()
//!   register notify watcher ----> crossbeam channel ---+
//!   list files (mtime order)                           |
//!   replay all but newest (calling thread)             |
//!   tail newest (ReaderHandle)                         |
//!                                                      v
//! run()  <--- select! { shutdown | notify event } -- Create -> switch_to()
//! ```
//!
//! The notify watcher is registered before the directory is listed, so a
//! file created during the backfill is reported by an event instead of
//! being missed.
//!
//! ## Reader handoff
//!
//! The "current reader" slot is a mutex held only for the swap itself. The
//! replaced reader receives a soft close request and finishes on its own
//! thread; its handle is kept until the thread ends and then reaped.

use crate::error::{Result, WaspError};
use crate::reader::{run_to_completion, ReadMode, ReaderHandle, ReaderSummary, RecordConsumer};
use crossbeam_channel::{select, Receiver, Sender};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Keeps a tailing reader on the newest file of an archive directory.
pub struct ArchiveWatcher {
    directory: PathBuf,
    poll_interval: Duration,
    consumer: Arc<dyn RecordConsumer>,

    /// The reader tailing the newest file
    current: Mutex<Option<ReaderHandle>>,
    /// Readers asked to close that may still be draining
    retired: Mutex<Vec<ReaderHandle>>,

    events: Receiver<notify::Result<Event>>,
    notifier: Mutex<Option<RecommendedWatcher>>,
    shutdown_tx: Sender<()>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
}

impl ArchiveWatcher {
    /// Start watching `directory`.
    ///
    /// Replays every archive file but the newest on the calling thread, then
    /// starts tailing the newest one. `read_existing_records` decides whether
    /// the records already in that newest file are indexed too.
    pub fn start(
        directory: impl AsRef<Path>,
        read_existing_records: bool,
        poll_interval: Duration,
        consumer: Arc<dyn RecordConsumer>,
    ) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if !directory.is_dir() {
            return Err(WaspError::NotFound { path: directory });
        }

        let (event_tx, events) = crossbeam_channel::unbounded();
        let mut notifier = RecommendedWatcher::new(
            move |event: notify::Result<Event>| {
                let _ = event_tx.send(event);
            },
            NotifyConfig::default(),
        )
        .map_err(watch_error)?;
        notifier
            .watch(&directory, RecursiveMode::NonRecursive)
            .map_err(watch_error)?;

        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded(1);
        let watcher = ArchiveWatcher {
            directory,
            poll_interval,
            consumer,
            current: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
            events,
            notifier: Mutex::new(Some(notifier)),
            shutdown_tx,
            shutdown_rx,
            closed: AtomicBool::new(false),
        };

        let mut files = list_archives(&watcher.directory)?;
        info!(
            directory = %watcher.directory.display(),
            files = files.len(),
            "Watching archive directory"
        );

        if let Some(newest) = files.pop() {
            for file in &files {
                match run_to_completion(file, watcher.consumer.as_ref()) {
                    Ok(summary) => log_summary(&summary),
                    Err(e) => error!(file = %file.display(), error = %e, "Cannot replay archive"),
                }
            }
            watcher.tail(
                &newest,
                ReadMode::Tail {
                    consume_existing: read_existing_records,
                },
            );
        }

        Ok(watcher)
    }

    /// Process directory events until [`close`](Self::close) is called.
    ///
    /// Returns a `WatchError` when the notification channel is lost.
    pub fn run(&self) -> Result<()> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Ok(());
            }
            select! {
                recv(self.shutdown_rx) -> _ => return Ok(()),
                recv(self.events) -> message => match message {
                    Ok(Ok(event)) => self.handle_event(event),
                    Ok(Err(e)) => warn!(directory = %self.directory.display(), error = %e, "Watch error"),
                    Err(_) if self.closed.load(Ordering::SeqCst) => return Ok(()),
                    Err(_) => {
                        error!(directory = %self.directory.display(), "Directory notifications lost");
                        return Err(WaspError::WatchError {
                            reason: "notification channel closed".to_string(),
                        });
                    }
                },
            }
        }
    }

    fn handle_event(&self, event: Event) {
        if event.need_rescan() {
            warn!(
                directory = %self.directory.display(),
                "Event queue overflowed, new files may have been missed"
            );
        }

        let created = matches!(
            event.kind,
            EventKind::Create(CreateKind::File)
                | EventKind::Create(CreateKind::Any)
                | EventKind::Modify(ModifyKind::Name(RenameMode::To))
        );
        if !created {
            return;
        }

        for path in event.paths.iter().filter(|p| is_archive_name(p)) {
            if let Err(e) = self.switch_to(path) {
                error!(file = %path.display(), error = %e, "Cannot tail new archive");
            }
        }
    }

    /// Make `path` the tailed file, soft-closing the previous reader.
    pub fn switch_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.current_file().as_deref() == Some(path) {
            debug!(file = %path.display(), "Already tailing");
            return Ok(());
        }

        let reader = ReaderHandle::spawn(
            path,
            ReadMode::Tail {
                consume_existing: true,
            },
            self.poll_interval,
            Arc::clone(&self.consumer),
        )?;
        let previous = self.current.lock().replace(reader);

        if let Some(previous) = previous {
            info!(
                from = %previous.path().display(),
                to = %path.display(),
                "Switching tailed archive"
            );
            previous.request_close();
            self.retired.lock().push(previous);
        }
        self.reap();
        Ok(())
    }

    fn tail(&self, path: &Path, mode: ReadMode) {
        match ReaderHandle::spawn(path, mode, self.poll_interval, Arc::clone(&self.consumer)) {
            Ok(reader) => *self.current.lock() = Some(reader),
            Err(e) => error!(file = %path.display(), error = %e, "Cannot tail archive"),
        }
    }

    fn reap(&self) {
        let finished: Vec<ReaderHandle> = {
            let mut retired = self.retired.lock();
            let (finished, running): (Vec<_>, Vec<_>) =
                retired.drain(..).partition(|h| h.is_finished());
            *retired = running;
            finished
        };
        for handle in finished {
            log_summary(&handle.join());
        }
    }

    /// The file currently being tailed.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.current.lock().as_ref().map(|h| h.path().to_path_buf())
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Stop watching and wait for all readers to drain.
    ///
    /// Waiting is bounded by the poll interval plus the record in flight.
    pub fn close(&self) -> Vec<ReaderSummary> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        let _ = self.shutdown_tx.try_send(());

        let mut readers: Vec<ReaderHandle> = self.retired.lock().drain(..).collect();
        if let Some(current) = self.current.lock().take() {
            readers.push(current);
        }
        for reader in &readers {
            reader.request_close();
        }

        let summaries: Vec<ReaderSummary> = readers.into_iter().map(ReaderHandle::join).collect();
        for summary in &summaries {
            log_summary(summary);
        }
        self.notifier.lock().take();
        info!(directory = %self.directory.display(), "Stopped watching");
        summaries
    }

    /// Run the watcher on a background thread.
    pub fn spawn(self) -> Result<WatcherHandle> {
        let watcher = Arc::new(self);
        let runner = Arc::clone(&watcher);
        let thread = thread::Builder::new()
            .name("wasp-watcher".to_string())
            .spawn(move || runner.run())?;
        Ok(WatcherHandle {
            watcher,
            thread: Some(thread),
        })
    }
}

/// Handle for a watcher running on its own thread.
///
/// When dropped, the watcher is closed.
pub struct WatcherHandle {
    watcher: Arc<ArchiveWatcher>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl WatcherHandle {
    pub fn watcher(&self) -> &ArchiveWatcher {
        &self.watcher
    }

    /// True once the run loop has ended, normally or not.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Close the watcher and return how its run loop ended.
    pub fn stop(&mut self) -> Result<()> {
        self.watcher.close();
        match self.thread.take().map(|t| t.join()) {
            Some(Ok(result)) => result,
            Some(Err(_)) => Err(WaspError::WatchError {
                reason: "watcher thread panicked".to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn watch_error(err: notify::Error) -> WaspError {
    WaspError::WatchError {
        reason: err.to_string(),
    }
}

fn log_summary(summary: &ReaderSummary) {
    match &summary.error {
        Some(e) => warn!(
            file = %summary.file.display(),
            read = summary.records_read,
            error = %e,
            "Archive read ended early"
        ),
        None => debug!(
            file = %summary.file.display(),
            read = summary.records_read,
            forwarded = summary.records_forwarded,
            "Archive done"
        ),
    }
}

/// Names of files that are never archives (hidden or still being moved).
fn is_archive_name(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    !(name.starts_with('.') || name.ends_with('~') || name.ends_with(".tmp") || name.ends_with(".part"))
}

/// Archive files of `directory`, oldest first.
pub fn list_archives(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        let metadata = match entry.metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Cannot stat file");
                continue;
            }
        };
        if !metadata.is_file() || !is_archive_name(&path) {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((modified, path));
    }
    files.sort();
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ChannelConsumer;
    use crate::warc::{ArchiveRecord, RecordType};
    use chrono::{TimeZone, Utc};
    use std::fs::{File, OpenOptions};
    use std::io::Write;
    use std::time::Instant;
    use tempfile::TempDir;

    const POLL: Duration = Duration::from_millis(20);

    fn record(n: u32) -> ArchiveRecord {
        ArchiveRecord::builder(RecordType::Response)
            .id(format!("<urn:uuid:{}>", n))
            .date(Utc.timestamp_opt(n as i64, 0).unwrap())
            .target_uri("https://example.com/")
            .block("HTTP/1.1 204 No Content\r\n\r\n")
            .build()
    }

    fn write_archive(path: &Path, ids: &[u32], modified_secs: u64) {
        let mut file = File::create(path).unwrap();
        for id in ids {
            record(*id).write_to(&mut file).unwrap();
        }
        file.flush().unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(modified_secs))
            .unwrap();
    }

    fn ids(receiver: &Receiver<ArchiveRecord>, n: usize) -> Vec<String> {
        (0..n)
            .map(|_| {
                receiver
                    .recv_timeout(Duration::from_secs(5))
                    .unwrap()
                    .id()
                    .unwrap()
                    .0
            })
            .collect()
    }

    #[test]
    fn test_list_archives_by_mtime() {
        let dir = TempDir::new().unwrap();
        write_archive(&dir.path().join("b.warc"), &[], 100);
        write_archive(&dir.path().join("a.warc"), &[], 200);
        write_archive(&dir.path().join(".hidden.warc"), &[], 50);
        fs::create_dir(dir.path().join("sub")).unwrap();

        let files = list_archives(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["b.warc", "a.warc"]);
    }

    #[test]
    fn test_missing_directory() {
        let (consumer, _receiver) = ChannelConsumer::new();
        let err = ArchiveWatcher::start("/nonexistent/archives", true, POLL, Arc::new(consumer))
            .err()
            .unwrap();
        assert!(matches!(err, WaspError::NotFound { .. }));
    }

    #[test]
    fn test_backfill_then_tail_newest() {
        let dir = TempDir::new().unwrap();
        write_archive(&dir.path().join("old.warc"), &[1, 2], 100);
        write_archive(&dir.path().join("new.warc"), &[3], 200);

        let (consumer, receiver) = ChannelConsumer::new();
        let watcher = ArchiveWatcher::start(dir.path(), true, POLL, Arc::new(consumer)).unwrap();

        assert_eq!(ids(&receiver, 3), vec!["<urn:uuid:1>", "<urn:uuid:2>", "<urn:uuid:3>"]);
        assert_eq!(watcher.current_file(), Some(dir.path().join("new.warc")));

        let summaries = watcher.close();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].records_read, 1);
        assert!(watcher.current_file().is_none());
    }

    #[test]
    fn test_tail_only_new_records() {
        let dir = TempDir::new().unwrap();
        write_archive(&dir.path().join("old.warc"), &[1], 100);
        let newest = dir.path().join("new.warc");
        write_archive(&newest, &[2], 200);

        let (consumer, receiver) = ChannelConsumer::new();
        let watcher = ArchiveWatcher::start(dir.path(), false, POLL, Arc::new(consumer)).unwrap();

        // Older files are always replayed
        assert_eq!(ids(&receiver, 1), vec!["<urn:uuid:1>"]);

        let deadline = Instant::now() + Duration::from_secs(5);
        while watcher
            .current
            .lock()
            .as_ref()
            .is_some_and(|h| !h.control().has_waited())
            && Instant::now() < deadline
        {
            thread::sleep(Duration::from_millis(5));
        }
        let mut file = OpenOptions::new().append(true).open(&newest).unwrap();
        record(3).write_to(&mut file).unwrap();
        file.flush().unwrap();

        assert_eq!(ids(&receiver, 1), vec!["<urn:uuid:3>"]);
        watcher.close();
    }

    #[test]
    fn test_switch_on_new_file() {
        let dir = TempDir::new().unwrap();
        write_archive(&dir.path().join("first.warc"), &[1], 100);

        let (consumer, receiver) = ChannelConsumer::new();
        let watcher = ArchiveWatcher::start(dir.path(), true, POLL, Arc::new(consumer)).unwrap();
        let mut handle = watcher.spawn().unwrap();
        assert_eq!(ids(&receiver, 1), vec!["<urn:uuid:1>"]);

        let second = dir.path().join("second.warc");
        let mut file = File::create(&second).unwrap();
        record(2).write_to(&mut file).unwrap();
        file.flush().unwrap();

        assert_eq!(ids(&receiver, 1), vec!["<urn:uuid:2>"]);
        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.watcher().current_file().as_ref() != Some(&second) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(handle.watcher().current_file(), Some(second));
        assert!(!handle.is_finished());
        handle.stop().unwrap();
        assert!(handle.is_finished());
    }

    #[test]
    fn test_empty_directory() {
        let dir = TempDir::new().unwrap();
        let (consumer, _receiver) = ChannelConsumer::new();
        let watcher = ArchiveWatcher::start(dir.path(), true, POLL, Arc::new(consumer)).unwrap();
        assert!(watcher.current_file().is_none());
        assert!(watcher.close().is_empty());
    }
}
