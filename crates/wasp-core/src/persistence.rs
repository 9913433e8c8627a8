//! Persistence layer for the document store.
//!
//! This module saves and loads snapshots of all stored documents. The
//! on-disk format is designed for:
//!
//! - Fast loading: Binary format with optional compression
//! - Versioning: Format changes are detected and rejected
//! - Atomic writes: Prevent corruption on crash
//! - Integrity: Checksums to detect corruption
//!
//! ## Snapshot File Format
//!
//! ```text
//! [Header: 32 bytes]
//!   - Magic: "WASP" (4 bytes)
//!   - Version: u32 (4 bytes)
//!   - Flags: u32 (4 bytes) - compression
//!   - Document count: u64 (8 bytes)
//!   - Reserved: 12 bytes
//!
//! [Documents: variable]
//!   - bincode Vec<(RecordId, ResponseDocument)>, LZ4 compressed if flagged
//!
//! [Footer: 8 bytes]
//!   - CRC32 checksum of the documents section: u32
//!   - Magic: "PSAW" (4 bytes)
//! ```

use crate::backend::DocumentStore;
use crate::error::{Result, WaspError};
use crate::index::MemoryIndex;
use crate::types::{RecordId, ResponseDocument};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Magic bytes at the start of snapshot files
pub const MAGIC_HEADER: &[u8; 4] = b"WASP";
/// Magic bytes at the end of snapshot files (reversed)
pub const MAGIC_FOOTER: &[u8; 4] = b"PSAW";
/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

const HEADER_LEN: usize = 32;
const FOOTER_LEN: usize = 8;

/// Flags for the snapshot file format
#[derive(Debug, Clone, Copy)]
pub struct SnapshotFlags(u32);

impl SnapshotFlags {
    /// No compression
    pub const NONE: Self = SnapshotFlags(0);
    /// LZ4 compression
    pub const COMPRESSED_LZ4: Self = SnapshotFlags(1);

    fn is_compressed(&self) -> bool {
        self.0 & 1 != 0
    }
}

/// Header structure for the snapshot file
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SnapshotHeader {
    magic: [u8; 4],
    version: u32,
    flags: u32,
    document_count: u64,
    reserved: [u8; 12],
}

impl SnapshotHeader {
    fn new(document_count: u64, flags: SnapshotFlags) -> Self {
        SnapshotHeader {
            magic: *MAGIC_HEADER,
            version: SNAPSHOT_VERSION,
            flags: flags.0,
            document_count,
            reserved: [0; 12],
        }
    }

    fn validate(&self) -> Result<()> {
        if self.magic != *MAGIC_HEADER {
            return Err(WaspError::SnapshotCorrupted {
                reason: "invalid magic bytes in header".to_string(),
            });
        }
        if self.version != SNAPSHOT_VERSION {
            return Err(WaspError::SnapshotVersionMismatch {
                found: self.version,
                expected: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }
}

/// Manages snapshots of the document store on disk.
///
/// ## Example
///
/// ```rust,ignore
/// use wasp_core::{MemoryIndex, SnapshotStore};
///
/// let snapshots = SnapshotStore::new("./data");
/// let index = snapshots.load_or_new();
/// // ... ingest ...
/// snapshots.save(&index)?;
/// ```
pub struct SnapshotStore {
    /// Directory holding the snapshot files
    base_dir: PathBuf,

    /// Whether to use compression
    use_compression: bool,
}

impl SnapshotStore {
    /// Create a new SnapshotStore with the given base directory.
    ///
    /// The directory is created on the first save.
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        SnapshotStore {
            base_dir: base_dir.as_ref().to_path_buf(),
            use_compression: true,
        }
    }

    /// Set whether to use compression when saving.
    pub fn with_compression(mut self, compress: bool) -> Self {
        self.use_compression = compress;
        self
    }

    /// Get the path to the snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.base_dir.join("wasp.snapshot")
    }

    fn backup_path(&self) -> PathBuf {
        self.base_dir.join("wasp.snapshot.bak")
    }

    fn temp_path(&self) -> PathBuf {
        self.base_dir.join("wasp.snapshot.tmp")
    }

    /// Check if a snapshot exists.
    pub fn exists(&self) -> bool {
        self.snapshot_path().exists()
    }

    /// Save all documents of `store`.
    ///
    /// Writes to a temporary file and renames it over the previous
    /// snapshot, which is kept as a backup. Returns the document count.
    #[instrument(skip(self, store), fields(path = %self.snapshot_path().display()))]
    pub fn save(&self, store: &dyn DocumentStore) -> Result<usize> {
        fs::create_dir_all(&self.base_dir)?;

        let documents = store.documents();
        let count = documents.len();

        let bytes = bincode::serialize(&documents)?;
        let (flags, data) = if self.use_compression {
            (
                SnapshotFlags::COMPRESSED_LZ4,
                lz4_flex::compress_prepend_size(&bytes),
            )
        } else {
            (SnapshotFlags::NONE, bytes)
        };

        let temp_path = self.temp_path();
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);

            let header = SnapshotHeader::new(count as u64, flags);
            writer.write_all(&bincode::serialize(&header)?)?;
            writer.write_all(&data)?;

            let checksum = crc32fast::hash(&data);
            writer.write_all(&checksum.to_le_bytes())?;
            writer.write_all(MAGIC_FOOTER)?;

            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        // Keep the previous snapshot as backup
        let snapshot_path = self.snapshot_path();
        let backup_path = self.backup_path();
        if snapshot_path.exists() {
            let _ = fs::remove_file(&backup_path);
            let _ = fs::rename(&snapshot_path, &backup_path);
        }
        fs::rename(&temp_path, &snapshot_path)?;

        debug!(
            documents = count,
            compressed = self.use_compression,
            "Snapshot saved"
        );
        Ok(count)
    }

    /// Load the snapshot into a new index.
    pub fn load(&self) -> Result<MemoryIndex> {
        let path = self.snapshot_path();
        self.load_from(&path)
    }

    fn load_from(&self, path: &Path) -> Result<MemoryIndex> {
        if !path.exists() {
            return Err(WaspError::SnapshotNotFound {
                path: path.to_path_buf(),
            });
        }
        info!(path = %path.display(), "Loading snapshot");

        let bytes = fs::read(path)?;
        if bytes.len() < HEADER_LEN + FOOTER_LEN {
            return Err(WaspError::SnapshotCorrupted {
                reason: format!("file too short ({} bytes)", bytes.len()),
            });
        }

        let header: SnapshotHeader = bincode::deserialize(&bytes[..HEADER_LEN])
            .map_err(|e| WaspError::SnapshotCorrupted {
                reason: format!("unreadable header: {}", e),
            })?;
        header.validate()?;
        let flags = SnapshotFlags(header.flags);

        let (data, footer) = bytes[HEADER_LEN..].split_at(bytes.len() - HEADER_LEN - FOOTER_LEN);
        if &footer[4..8] != MAGIC_FOOTER {
            return Err(WaspError::SnapshotCorrupted {
                reason: "invalid footer magic bytes".to_string(),
            });
        }

        let stored_checksum = u32::from_le_bytes([footer[0], footer[1], footer[2], footer[3]]);
        let computed_checksum = crc32fast::hash(data);
        if stored_checksum != computed_checksum {
            return Err(WaspError::SnapshotCorrupted {
                reason: format!(
                    "checksum mismatch: expected {:08x}, got {:08x}",
                    stored_checksum, computed_checksum
                ),
            });
        }

        let decompressed;
        let data = if flags.is_compressed() {
            decompressed = lz4_flex::decompress_size_prepended(data).map_err(|e| {
                WaspError::SnapshotCorrupted {
                    reason: format!("decompression failed: {}", e),
                }
            })?;
            &decompressed[..]
        } else {
            data
        };

        let documents: Vec<(RecordId, ResponseDocument)> =
            bincode::deserialize(data).map_err(|e| WaspError::SnapshotCorrupted {
                reason: format!("deserialization failed: {}", e),
            })?;
        if documents.len() as u64 != header.document_count {
            return Err(WaspError::SnapshotCorrupted {
                reason: format!(
                    "header announces {} documents, found {}",
                    header.document_count,
                    documents.len()
                ),
            });
        }

        let index = MemoryIndex::from_documents(documents);
        info!(documents = index.len(), "Snapshot loaded");
        Ok(index)
    }

    /// Load the snapshot, or return a new empty index if loading fails.
    ///
    /// Logs a warning if a snapshot exists but cannot be loaded.
    pub fn load_or_new(&self) -> MemoryIndex {
        match self.load() {
            Ok(index) => index,
            Err(WaspError::SnapshotNotFound { .. }) => MemoryIndex::new(),
            Err(e) => {
                warn!(error = %e, "Failed to load snapshot, starting fresh");
                MemoryIndex::new()
            }
        }
    }

    /// Delete all snapshot data.
    pub fn clear(&self) -> Result<()> {
        for path in self.files() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    /// Snapshot, backup and leftover temporary files present on disk.
    pub fn files(&self) -> Vec<PathBuf> {
        [self.snapshot_path(), self.backup_path(), self.temp_path()]
            .into_iter()
            .filter(|path| path.exists())
            .collect()
    }

    /// Restore the backup over a corrupted snapshot and load it.
    pub fn restore_from_backup(&self) -> Result<MemoryIndex> {
        let backup_path = self.backup_path();
        if !backup_path.exists() {
            return Err(WaspError::SnapshotNotFound { path: backup_path });
        }

        let index = self.load_from(&backup_path)?;
        fs::copy(&backup_path, self.snapshot_path())?;
        Ok(index)
    }
}
