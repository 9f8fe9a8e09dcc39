//! Provider configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default result-cache capacity, in entries.
pub const DEFAULT_CACHE_CAPACITY: usize = 16_384;

/// Default engine batch width.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Environment toggle forcing cache-miss recording on when set to `TRUE`.
pub const RECORD_MISSES_ENV: &str = "CYCLECAST_RECORD_MISSES";

/// Construction-time settings of a cost provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Batch width the engine's scratch buffers are sized for.
    pub batch_size: usize,

    /// Result-cache capacity in entries; 0 disables caching.
    pub cache_capacity: usize,

    /// Path the model was loaded from, used for paired-snapshot discovery
    /// and error context.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_path: Option<PathBuf>,

    /// Explicit cache snapshot to preload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,

    /// Look for a `.ccsnap` snapshot next to the model file when no explicit
    /// snapshot is configured.
    pub use_paired_snapshot: bool,

    /// Record cache-miss diagnostics. The [`RECORD_MISSES_ENV`] environment
    /// toggle forces this on.
    pub record_misses: bool,

    /// Directory for cache-miss records; working directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_dir: Option<PathBuf>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            model_path: None,
            snapshot_path: None,
            use_paired_snapshot: false,
            record_misses: false,
            record_dir: None,
        }
    }
}

impl ProviderConfig {
    /// Whether cache-miss recording is on, combining the config flag with
    /// the environment toggle.
    pub fn record_misses_enabled(&self) -> bool {
        if self.record_misses {
            return true;
        }
        std::env::var(RECORD_MISSES_ENV).map(|v| v == "TRUE").unwrap_or(false)
    }
}
