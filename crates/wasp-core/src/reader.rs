//! Archive readers: plain replay and tailing of growing files.
//!
//! ## Architecture
//!
//! ```text
//! File -> ArchiveSource -> [MultiGzDecoder] -> BufReader -> WarcParser
//!              |
//!              +-- EndOfStream::Stop          (closed files)
//!              +-- EndOfStream::WaitAndRetry  (the file still being written)
//! ```
//!
//! There is one reader type. What happens when the file runs out of bytes
//! is decided by the [`EndOfStream`] strategy of its byte source: stop, or
//! sleep for the poll interval and try again.
//!
//! ## Soft close
//!
//! A tailing reader runs on its own thread and is never torn down from the
//! outside. [`ReaderControl::request_close`] only sets a flag. The source
//! keeps reading while bytes are available and checks the flag when it
//! hits the current end of the file, so data that lands during a wait is
//! still parsed before the stream ends.

use crate::error::{Result, WaspError};
use crate::warc::{ArchiveRecord, WarcParser};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, instrument, trace};

/// Receives the records read from archive files.
///
/// Consumers are shared between reader threads and must not fail: whatever
/// goes wrong with one record is the consumer's own business.
pub trait RecordConsumer: Send + Sync {
    fn accept(&self, record: ArchiveRecord);
}

impl<F> RecordConsumer for F
where
    F: Fn(ArchiveRecord) + Send + Sync,
{
    fn accept(&self, record: ArchiveRecord) {
        self(record)
    }
}

/// A consumer that forwards records into a channel
pub struct ChannelConsumer {
    sender: crossbeam_channel::Sender<ArchiveRecord>,
}

impl ChannelConsumer {
    /// Create a new channel-based consumer
    pub fn new() -> (Self, crossbeam_channel::Receiver<ArchiveRecord>) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (ChannelConsumer { sender }, receiver)
    }
}

impl RecordConsumer for ChannelConsumer {
    fn accept(&self, record: ArchiveRecord) {
        let _ = self.sender.send(record);
    }
}

/// What a byte source does when it reaches the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOfStream {
    /// Report end-of-stream
    Stop,
    /// Sleep and look again until a close is requested
    WaitAndRetry { poll_interval: Duration },
}

/// How a reader task treats its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Read a closed file to its end, forwarding every record
    Replay,
    /// Follow a growing file.
    ///
    /// With `consume_existing = false`, records already in the file are
    /// read and discarded until the reader has had to wait for new data.
    Tail { consume_existing: bool },
}

impl ReadMode {
    fn strategy(self, poll_interval: Duration) -> EndOfStream {
        match self {
            ReadMode::Replay => EndOfStream::Stop,
            ReadMode::Tail { .. } => EndOfStream::WaitAndRetry { poll_interval },
        }
    }

    fn forwards_existing(self) -> bool {
        match self {
            ReadMode::Replay => true,
            ReadMode::Tail { consume_existing } => consume_existing,
        }
    }
}

/// Lifecycle of a reader's byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReaderState {
    Open = 0,
    Reading = 1,
    WaitingForData = 2,
    SoftClosing = 3,
    Closed = 4,
}

impl ReaderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ReaderState::Open,
            1 => ReaderState::Reading,
            2 => ReaderState::WaitingForData,
            3 => ReaderState::SoftClosing,
            _ => ReaderState::Closed,
        }
    }
}

/// State shared between a reader and whoever owns it.
#[derive(Debug)]
pub struct ReaderControl {
    close_requested: AtomicBool,
    waited: AtomicBool,
    state: AtomicU8,
}

impl ReaderControl {
    fn new() -> Self {
        ReaderControl {
            close_requested: AtomicBool::new(false),
            waited: AtomicBool::new(false),
            state: AtomicU8::new(ReaderState::Open as u8),
        }
    }

    /// Ask the reader to finish at the next end of available data.
    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ReaderState {
        ReaderState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True once the source had to wait for data at least once.
    pub fn has_waited(&self) -> bool {
        self.waited.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: ReaderState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }
}

/// The raw bytes of one archive file, with end-of-file policy applied.
pub struct ArchiveSource {
    file: File,
    strategy: EndOfStream,
    control: Arc<ReaderControl>,
}

impl ArchiveSource {
    fn new(file: File, strategy: EndOfStream, control: Arc<ReaderControl>) -> Self {
        ArchiveSource {
            file,
            strategy,
            control,
        }
    }
}

impl Read for ArchiveSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if matches!(
                self.control.state(),
                ReaderState::SoftClosing | ReaderState::Closed
            ) {
                return Ok(0);
            }

            let n = self.file.read(buf)?;
            if n > 0 || buf.is_empty() {
                self.control.set_state(ReaderState::Reading);
                return Ok(n);
            }

            match self.strategy {
                EndOfStream::Stop => return Ok(0),
                EndOfStream::WaitAndRetry { poll_interval } => {
                    if self.control.is_close_requested() {
                        self.control.set_state(ReaderState::SoftClosing);
                        return Ok(0);
                    }
                    self.control.set_state(ReaderState::WaitingForData);
                    self.control.waited.store(true, Ordering::SeqCst);
                    thread::sleep(poll_interval);
                }
            }
        }
    }
}

type RecordParser = WarcParser<BufReader<Box<dyn Read + Send>>>;

/// Reads the records of one archive file.
pub struct RecordReader {
    path: PathBuf,
    parser: Option<RecordParser>,
    control: Arc<ReaderControl>,
}

impl RecordReader {
    /// Open an archive file.
    ///
    /// Files ending in `.gz` are decompressed transparently.
    pub fn open(path: impl AsRef<Path>, strategy: EndOfStream) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => WaspError::NotFound { path: path.clone() },
            _ => WaspError::Io(e),
        })?;

        let control = Arc::new(ReaderControl::new());
        let source = ArchiveSource::new(file, strategy, Arc::clone(&control));
        let stream: Box<dyn Read + Send> = if is_gzip(&path) {
            Box::new(MultiGzDecoder::new(source))
        } else {
            Box::new(source)
        };

        debug!(file = %path.display(), ?strategy, "Opened archive");
        Ok(RecordReader {
            path,
            parser: Some(WarcParser::new(BufReader::new(stream))),
            control,
        })
    }

    /// The next record, or `None` once the stream has ended.
    ///
    /// A record that cannot be decoded closes the reader.
    pub fn next_record(&mut self) -> Result<Option<ArchiveRecord>> {
        let Some(parser) = self.parser.as_mut() else {
            return Ok(None);
        };
        match parser.next_record() {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                self.close();
                Ok(None)
            }
            Err(e) => {
                self.close();
                Err(e)
            }
        }
    }

    /// Release the file. Calling this more than once is harmless.
    pub fn close(&mut self) {
        if self.parser.take().is_some() {
            trace!(file = %self.path.display(), "Closed archive");
        }
        self.control.set_state(ReaderState::Closed);
    }

    pub fn control(&self) -> Arc<ReaderControl> {
        Arc::clone(&self.control)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Iterate over the remaining records.
    pub fn records(&mut self) -> impl Iterator<Item = Result<ArchiveRecord>> + '_ {
        std::iter::from_fn(move || self.next_record().transpose())
    }
}

impl Drop for RecordReader {
    fn drop(&mut self) {
        self.close();
    }
}

fn is_gzip(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// What a reader task did with its file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderSummary {
    pub file: PathBuf,
    pub records_read: u64,
    pub records_forwarded: u64,
    /// The failure that ended the task early, if any
    pub error: Option<String>,
}

fn drive(reader: &mut RecordReader, mode: ReadMode, consumer: &dyn RecordConsumer) -> ReaderSummary {
    let control = reader.control();
    let forward_existing = mode.forwards_existing();
    let mut summary = ReaderSummary {
        file: reader.path().to_path_buf(),
        ..Default::default()
    };

    loop {
        match reader.next_record() {
            Ok(Some(record)) => {
                summary.records_read += 1;
                if forward_existing || control.has_waited() {
                    consumer.accept(record);
                    summary.records_forwarded += 1;
                } else {
                    trace!(file = %summary.file.display(), offset = record.offset(), "Skipping existing record");
                }
            }
            Ok(None) => break,
            Err(e) => {
                error!(file = %summary.file.display(), error = %e, "Stopping reader");
                summary.error = Some(e.to_string());
                break;
            }
        }
    }

    reader.close();
    info!(
        file = %summary.file.display(),
        read = summary.records_read,
        forwarded = summary.records_forwarded,
        "Reader finished"
    );
    summary
}

/// Replay a closed archive file on the calling thread.
///
/// Only a failure to open the file is returned as an error; a corrupt
/// record ends the replay and is reported in the summary.
#[instrument(skip(path, consumer), fields(file = %path.as_ref().display()))]
pub fn run_to_completion(
    path: impl AsRef<Path>,
    consumer: &dyn RecordConsumer,
) -> Result<ReaderSummary> {
    let mut reader = RecordReader::open(path, EndOfStream::Stop)?;
    Ok(drive(&mut reader, ReadMode::Replay, consumer))
}

/// A reader task running on its own thread.
///
/// Dropping the handle requests a soft close but does not wait for it.
pub struct ReaderHandle {
    path: PathBuf,
    control: Arc<ReaderControl>,
    thread: Option<JoinHandle<ReaderSummary>>,
}

impl ReaderHandle {
    /// Open `path` and start reading it on a new thread.
    ///
    /// The file is opened before the thread starts, so open errors are
    /// returned here.
    pub fn spawn(
        path: impl AsRef<Path>,
        mode: ReadMode,
        poll_interval: Duration,
        consumer: Arc<dyn RecordConsumer>,
    ) -> Result<Self> {
        let mut reader = RecordReader::open(&path, mode.strategy(poll_interval))?;
        let path = reader.path().to_path_buf();
        let control = reader.control();

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let thread = thread::Builder::new()
            .name(format!("wasp-reader-{}", name))
            .spawn(move || drive(&mut reader, mode, consumer.as_ref()))?;

        info!(file = %path.display(), ?mode, "Started reader");
        Ok(ReaderHandle {
            path,
            control,
            thread: Some(thread),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn control(&self) -> &ReaderControl {
        &self.control
    }

    /// Soft-close the reader; see the module docs.
    pub fn request_close(&self) {
        self.control.request_close();
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the reader thread to end.
    pub fn join(mut self) -> ReaderSummary {
        match self.thread.take().map(|t| t.join()) {
            Some(Ok(summary)) => summary,
            Some(Err(_)) => ReaderSummary {
                file: self.path.clone(),
                error: Some("reader thread panicked".to_string()),
                ..Default::default()
            },
            None => ReaderSummary {
                file: self.path.clone(),
                ..Default::default()
            },
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.control.request_close();
    }
}
