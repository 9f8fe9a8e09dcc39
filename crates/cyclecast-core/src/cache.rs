//! Bounded result cache keyed by model-input descriptors
//!
//! Maps a descriptor (the exact feature vector fed to the model) to the raw
//! model output. Strict least-recently-used eviction at a capacity fixed at
//! construction; a preloaded snapshot table sits in front of the LRU and
//! tracks how many of its entries were actually reused.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;

use crate::snapshot::SnapshotTable;

/// 64-bit FNV-1a. Used wherever a hash must be stable across processes
/// (persisted snapshot keys, workload uids); the std hasher is randomized.
pub(crate) fn fnv1a_64(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = OFFSET_BASIS;
    for &byte in bytes {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Ordered feature vector produced from a workload by the preprocessing
/// transform; the model input and the exact cache key.
///
/// Equality and hashing are over the raw f32 bit patterns: equal workloads
/// must produce bit-identical descriptors to hit the cache, and there is no
/// fuzzy matching.
#[derive(Debug, Clone)]
pub struct Descriptor(Vec<f32>);

impl Descriptor {
    pub fn new(features: Vec<f32>) -> Self {
        Self(features)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }

    /// Stable content hash, the key of the persisted snapshot table.
    pub fn content_hash(&self) -> u64 {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for feature in &self.0 {
            bytes.extend_from_slice(&feature.to_bits().to_le_bytes());
        }
        fnv1a_64(&bytes)
    }
}

impl PartialEq for Descriptor {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}

impl Eq for Descriptor {}

impl Hash for Descriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for feature in &self.0 {
            state.write_u32(feature.to_bits());
        }
    }
}

/// Descriptor-keyed cache of raw model outputs.
///
/// Internally serialized: `get` and `add` are safe from any number of
/// threads, and recency bookkeeping stays consistent under concurrent
/// access. Capacity 0 disables the recency tier entirely.
pub struct ResultCache {
    /// Immutable entries loaded from a persisted snapshot, consulted first.
    preloaded: SnapshotTable,
    /// Recency-ordered entries learned during this run. `None` when the
    /// configured capacity is 0.
    recent: Option<Mutex<LruCache<Descriptor, f32>>>,
}

impl ResultCache {
    pub fn new(capacity: usize, preloaded: SnapshotTable) -> Self {
        let recent =
            NonZeroUsize::new(capacity).map(|capacity| Mutex::new(LruCache::new(capacity)));
        Self { preloaded, recent }
    }

    /// Looks up a descriptor. A hit in the recency tier counts as a use and
    /// refreshes the entry; a hit in the preloaded tier bumps the reuse
    /// counter.
    pub fn get(&self, descriptor: &Descriptor) -> Option<f32> {
        if let Some(value) = self.preloaded.get(descriptor.content_hash()) {
            return Some(value);
        }

        let recent = self.recent.as_ref()?;
        recent.lock().unwrap().get(descriptor).copied()
    }

    /// Inserts a descriptor/value pair, evicting the least-recently-used
    /// entry when full. Re-adding a present key overwrites the value and
    /// refreshes its recency without growing the entry count. Keys covered by
    /// the preloaded tier are not duplicated.
    pub fn add(&self, descriptor: Descriptor, value: f32) {
        let Some(recent) = self.recent.as_ref() else {
            return;
        };

        if self.preloaded.contains(descriptor.content_hash()) {
            return;
        }

        recent.lock().unwrap().put(descriptor, value);
    }

    /// Entries currently held by the recency tier.
    pub fn len(&self) -> usize {
        self.recent
            .as_ref()
            .map_or(0, |recent| recent.lock().unwrap().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn preloaded_len(&self) -> usize {
        self.preloaded.len()
    }

    /// How many preloaded entries were served so far, distinguishing cold
    /// preload churn from useful reuse.
    pub fn preloaded_hits(&self) -> u64 {
        self.preloaded.hits()
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("preloaded_entries", &self.preloaded.len())
            .field("recent_entries", &self.len())
            .finish()
    }
}
