//! Workload transforms, selected by model interface version
//!
//! The preprocessing transform turns a workload into the descriptor the model
//! consumes; the postprocessing transform adjusts the raw model output for
//! the workload and declares the interval in which adjusted outputs are
//! valid. Both are picked once at provider construction from the versions the
//! loaded model declares; an unknown version is a fatal mismatch.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::error;

use crate::cache::Descriptor;
use crate::workload::{KernelWorkload, Workload};
use crate::{CoreError, Result};

/// Produces model-input descriptors from workloads.
///
/// Determinism is part of the contract: equal workloads must yield
/// bit-identical descriptors, since the descriptor is the exact cache key.
pub trait Preprocessor<W: Workload>: Send + Sync {
    /// The input interface version this transform implements.
    fn interface_version(&self) -> u32;

    /// Fixed number of features per descriptor.
    fn descriptor_width(&self) -> usize;

    fn transform_single(&self, workload: &W) -> Descriptor;

    /// Transforms all workloads into one concatenated descriptor buffer,
    /// zero-padded to a multiple of `batch_width` descriptors so the engine
    /// always sees complete batches.
    fn transform_batch(&self, workloads: &[W], batch_width: usize) -> Vec<f32> {
        let batch_width = batch_width.max(1);
        let width = self.descriptor_width();
        let padded = workloads.len().div_ceil(batch_width) * batch_width;

        let mut buffer = Vec::with_capacity(padded * width);
        for workload in workloads {
            buffer.extend_from_slice(self.transform_single(workload).as_slice());
        }
        buffer.resize(padded * width, 0.0);
        buffer
    }
}

/// Adjusts raw model output into a comparable cycle figure and gates its
/// validity. Applied identically to cached and freshly-inferred values.
pub trait Postprocessor<W: Workload>: Send + Sync {
    /// The output interface version this transform implements.
    fn interface_version(&self) -> u32;

    fn process(&self, workload: &W, raw_value: f32) -> f32;

    /// Inclusive `[min, max]` interval of valid adjusted values.
    fn valid_interval(&self) -> (f32, f32);

    fn is_invalid(&self, adjusted_value: f32) -> bool {
        let (min, max) = self.valid_interval();
        // NaN fails both comparisons and is therefore invalid.
        !(adjusted_value >= min && adjusted_value <= max)
    }
}

impl<W: Workload> fmt::Debug for dyn Preprocessor<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Preprocessor")
            .field("interface_version", &self.interface_version())
            .field("descriptor_width", &self.descriptor_width())
            .finish()
    }
}

/// Version-indexed preprocessing transforms.
pub struct PreprocessorRegistry<W: Workload> {
    by_version: HashMap<u32, Arc<dyn Preprocessor<W>>>,
}

impl<W: Workload> Default for PreprocessorRegistry<W> {
    fn default() -> Self {
        Self {
            by_version: HashMap::new(),
        }
    }
}

impl<W: Workload> PreprocessorRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, preprocessor: Arc<dyn Preprocessor<W>>) {
        self.by_version
            .insert(preprocessor.interface_version(), preprocessor);
    }

    pub fn contains(&self, version: u32) -> bool {
        self.by_version.contains_key(&version)
    }

    /// Resolves the transform for a declared input version. Resolved once at
    /// provider construction; failure there is fatal.
    pub fn select(&self, version: u32, raw_model_name: &str) -> Result<Arc<dyn Preprocessor<W>>> {
        self.by_version.get(&version).cloned().ok_or_else(|| {
            error!(
                "no preprocessing transform for input interface version {version} \
                 (model identity: {raw_model_name})"
            );
            CoreError::model(
                "UNSUPPORTED_INPUT_VERSION",
                format!("cannot create preprocessing stage for input interface version {version}"),
                format!("model identity (raw): {raw_model_name}"),
                "Register a transform for this version or load a compatible model",
            )
        })
    }
}

/// Version-indexed postprocessing transforms.
pub struct PostprocessorRegistry<W: Workload> {
    by_version: HashMap<u32, Arc<dyn Postprocessor<W>>>,
}

impl<W: Workload> Default for PostprocessorRegistry<W> {
    fn default() -> Self {
        Self {
            by_version: HashMap::new(),
        }
    }
}

impl<W: Workload> PostprocessorRegistry<W> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, postprocessor: Arc<dyn Postprocessor<W>>) {
        self.by_version
            .insert(postprocessor.interface_version(), postprocessor);
    }

    pub fn contains(&self, version: u32) -> bool {
        self.by_version.contains_key(&version)
    }

    pub fn select(&self, version: u32, raw_model_name: &str) -> Result<Arc<dyn Postprocessor<W>>> {
        self.by_version.get(&version).cloned().ok_or_else(|| {
            error!(
                "no postprocessing transform for output interface version {version} \
                 (model identity: {raw_model_name})"
            );
            CoreError::model(
                "UNSUPPORTED_OUTPUT_VERSION",
                format!(
                    "cannot create postprocessing stage for output interface version {version}"
                ),
                format!("model identity (raw): {raw_model_name}"),
                "Register a transform for this version or load a compatible model",
            )
        })
    }
}

/// Descriptor width of [`StandardPreprocessor`]: device, op and dtype one-hot
/// blocks plus log-scaled geometry.
pub const STANDARD_DESCRIPTOR_WIDTH: usize = 21;

/// Input interface v1: one-hot categorical blocks, log2-scaled dimensions.
#[derive(Debug, Default)]
pub struct StandardPreprocessor;

impl Preprocessor<KernelWorkload> for StandardPreprocessor {
    fn interface_version(&self) -> u32 {
        1
    }

    fn descriptor_width(&self) -> usize {
        STANDARD_DESCRIPTOR_WIDTH
    }

    fn transform_single(&self, workload: &KernelWorkload) -> Descriptor {
        let mut features = vec![0.0f32; STANDARD_DESCRIPTOR_WIDTH];
        features[workload.device.index()] = 1.0;
        features[3 + workload.op.index()] = 1.0;
        features[8 + workload.dtype.index()] = 1.0;

        let dims = [
            workload.input.width,
            workload.input.height,
            workload.input.channels,
            workload.output.width,
            workload.output.height,
            workload.output.channels,
            workload.kernel.0,
            workload.kernel.1,
            workload.stride.0,
            workload.stride.1,
        ];
        for (slot, dim) in features[11..].iter_mut().zip(dims) {
            *slot = (dim as f32 + 1.0).log2();
        }

        Descriptor::new(features)
    }
}

/// Output interface v1: per-device scaling of the normalized model output
/// into cycles, with a configurable valid interval.
#[derive(Debug)]
pub struct ScalingPostprocessor {
    interval: (f32, f32),
    scales: [f32; 3],
}

impl ScalingPostprocessor {
    pub fn new(interval: (f32, f32)) -> Self {
        Self {
            interval,
            scales: [1.0; 3],
        }
    }

    /// Per-device output scales, ordered npu2, npu3, npu4.
    pub fn with_scales(mut self, scales: [f32; 3]) -> Self {
        self.scales = scales;
        self
    }
}

impl Default for ScalingPostprocessor {
    fn default() -> Self {
        Self::new((0.0, 4_000_000_000.0))
    }
}

impl Postprocessor<KernelWorkload> for ScalingPostprocessor {
    fn interface_version(&self) -> u32 {
        1
    }

    fn process(&self, workload: &KernelWorkload, raw_value: f32) -> f32 {
        raw_value * self.scales[workload.device.index()]
    }

    fn valid_interval(&self) -> (f32, f32) {
        self.interval
    }
}

impl PreprocessorRegistry<KernelWorkload> {
    /// Registry preloaded with the shipped kernel-workload transforms.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(StandardPreprocessor));
        registry
    }
}

impl PostprocessorRegistry<KernelWorkload> {
    /// Registry preloaded with the shipped kernel-workload transforms.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ScalingPostprocessor::default()));
        registry
    }
}
