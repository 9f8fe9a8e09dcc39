//! Best-effort recording of cache-miss diagnostics
//!
//! On every single-path cache miss the provider can append one JSON-lines
//! record describing the workload and the raw model output, feeding offline
//! analysis of what the cache never covered. Recording is never consulted on
//! the read path and its failures must never affect a cost query; the
//! provider catches them, logs, and resets the recorder.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::Result;

/// One cache-miss diagnostic record.
#[derive(Debug, Serialize)]
pub struct MissRecord {
    /// Stable workload identity hash, stringified.
    pub workload_uid: String,
    /// Human-readable workload summary.
    pub info: String,
    /// Raw model output before adjustment.
    pub model_cycles: f32,
    /// Where the value came from; always a model inference on this path.
    pub cost_source: String,
    /// Populated when the miss coincided with an error condition.
    pub error_info: String,
    /// Workload attribute map, flattened into the record.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

#[derive(Debug, Default)]
struct RecorderState {
    writer: Option<BufWriter<File>>,
    /// Record being written; survives a failed write so `reset` has
    /// something concrete to discard.
    pending: Option<Value>,
}

/// Appends [`MissRecord`]s to a JSON-lines file, opened lazily on the first
/// record.
#[derive(Debug)]
pub struct MissRecorder {
    enabled: bool,
    path: PathBuf,
    state: Mutex<RecorderState>,
}

impl MissRecorder {
    /// Recorder writing to `<nickname>_misses.jsonl` under `directory` (the
    /// working directory when none is given).
    pub fn new(enabled: bool, directory: Option<&Path>, nickname: &str) -> Self {
        let file_name = format!("{nickname}_misses.jsonl");
        let path = directory.map_or_else(|| PathBuf::from(&file_name), |dir| dir.join(&file_name));
        if enabled {
            debug!("cache-miss recording enabled, target {}", path.display());
        }
        Self {
            enabled,
            path,
            state: Mutex::new(RecorderState::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(false, None, "disabled")
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record. A no-op when disabled. On failure the
    /// half-written record stays pending until [`MissRecorder::reset`].
    pub fn record(&self, record: &MissRecord) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        state.pending = Some(serde_json::to_value(record)?);

        if state.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            state.writer = Some(BufWriter::new(file));
        }

        if let (Some(writer), Some(value)) = (state.writer.as_mut(), state.pending.as_ref()) {
            serde_json::to_writer(&mut *writer, value)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }

        state.pending = None;
        Ok(())
    }

    /// Discards any pending record and the current writer; the file is
    /// reopened on the next record.
    pub fn reset(&self) {
        let mut state = self.state.lock().unwrap();
        state.pending = None;
        state.writer = None;
    }
}
