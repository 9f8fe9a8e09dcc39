//! Persisted cache snapshots
//!
//! A snapshot is a small binary table of descriptor-hash → raw-output pairs
//! produced by an earlier run, loaded at construction to warm the result
//! cache. Loading is strictly best-effort: a missing, truncated, or foreign
//! file degrades to an empty table and must never fail provider
//! construction.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, warn};

use crate::{CoreError, Result};

/// Snapshot file magic: "CCSN" in ASCII.
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"CCSN";

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Extension of a snapshot paired with a model file.
pub const PAIRED_SNAPSHOT_EXTENSION: &str = "ccsnap";

/// Environment variable overriding every configured snapshot source.
pub const SNAPSHOT_PATH_ENV: &str = "CYCLECAST_CACHE_PATH";

/// Immutable preloaded entries plus a counter of how many were actually
/// served, distinguishing useful reuse from cold preload churn.
#[derive(Debug, Default)]
pub struct SnapshotTable {
    entries: HashMap<u64, f32>,
    hits: AtomicU64,
}

impl SnapshotTable {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: HashMap<u64, f32>) -> Self {
        Self {
            entries,
            hits: AtomicU64::new(0),
        }
    }

    /// Loads a snapshot from `path`, degrading to an empty table on any
    /// read or parse problem.
    pub fn from_path(path: &Path) -> Self {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                warn!("cannot open cache snapshot {}: {e}", path.display());
                return Self::empty();
            }
        };

        match parse_snapshot(BufReader::new(file)) {
            Ok(entries) => {
                debug!(
                    "preloaded {} cache entries from {}",
                    entries.len(),
                    path.display()
                );
                Self::with_entries(entries)
            }
            Err(e) => {
                warn!("ignoring unusable cache snapshot {}: {e}", path.display());
                Self::empty()
            }
        }
    }

    /// Loads a snapshot from an in-memory buffer, degrading like
    /// [`SnapshotTable::from_path`].
    pub fn from_bytes(data: &[u8]) -> Self {
        match parse_snapshot(data) {
            Ok(entries) => Self::with_entries(entries),
            Err(e) => {
                warn!("ignoring unusable in-memory cache snapshot: {e}");
                Self::empty()
            }
        }
    }

    pub fn get(&self, key: u64) -> Option<f32> {
        let value = self.entries.get(&key).copied();
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value
    }

    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many lookups were answered from the preloaded entries.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

/// Picks the snapshot source to preload, or `None` for a cold cache.
///
/// Priority: the [`SNAPSHOT_PATH_ENV`] override (when it names an existing
/// file), then the explicitly configured path, then a snapshot sitting next
/// to the model file (same stem, `.ccsnap` extension) when paired loading is
/// enabled and the file exists.
pub fn resolve_snapshot_path(
    explicit: Option<&Path>,
    model_path: Option<&Path>,
    use_paired: bool,
) -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(SNAPSHOT_PATH_ENV) {
        let env_path = PathBuf::from(env_path);
        if env_path.is_file() {
            return Some(env_path);
        }
    }

    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if use_paired {
        if let Some(model_path) = model_path {
            let paired = model_path.with_extension(PAIRED_SNAPSHOT_EXTENSION);
            if paired.is_file() {
                return Some(paired);
            }
        }
    }

    None
}

fn parse_snapshot<R: Read>(mut reader: R) -> Result<HashMap<u64, f32>> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != SNAPSHOT_MAGIC {
        return Err(CoreError::cache(
            "SNAPSHOT_BAD_MAGIC",
            "not a cache snapshot file",
            format!("magic bytes {magic:02x?}, expected {SNAPSHOT_MAGIC:02x?}"),
            "Regenerate the snapshot with write_snapshot",
        ));
    }

    let version = reader.read_u32::<LittleEndian>()?;
    if version != SNAPSHOT_VERSION {
        return Err(CoreError::cache(
            "SNAPSHOT_BAD_VERSION",
            format!("unsupported snapshot format version {version}"),
            format!("this build reads version {SNAPSHOT_VERSION}"),
            "Regenerate the snapshot with the current tools",
        ));
    }

    let count = reader.read_u32::<LittleEndian>()? as usize;
    let mut entries = HashMap::with_capacity(count);
    for _ in 0..count {
        let key = reader.read_u64::<LittleEndian>()?;
        let value = reader.read_f32::<LittleEndian>()?;
        entries.insert(key, value);
    }

    Ok(entries)
}

/// Writes `entries` as a snapshot file readable by the preload path. Entries
/// are written in key order so identical tables produce identical files.
pub fn write_snapshot(path: &Path, entries: &HashMap<u64, f32>) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(&SNAPSHOT_MAGIC)?;
    writer.write_u32::<LittleEndian>(SNAPSHOT_VERSION)?;
    writer.write_u32::<LittleEndian>(entries.len() as u32)?;

    let mut keys: Vec<u64> = entries.keys().copied().collect();
    keys.sort_unstable();
    for key in keys {
        writer.write_u64::<LittleEndian>(key)?;
        writer.write_f32::<LittleEndian>(entries[&key])?;
    }

    writer.flush()?;
    Ok(())
}
