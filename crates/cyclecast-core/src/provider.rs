//! Cost-query orchestration
//!
//! [`CostProvider`] is the public surface of the crate: it turns workloads
//! into descriptors, consults the result cache, drives the model engine on
//! misses, and classifies raw outputs into typed cost results. The model and
//! the selected transforms are immutable after construction; the cache, the
//! context registry and the recorder are the internally-synchronized mutable
//! side of the provider.

use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::config::ProviderConfig;
use crate::context::{ContextRegistry, ExecutionContext};
use crate::cycles::{CostError, CostResult, Cycles};
use crate::engine::{ExecutionBuffers, InferenceEngine};
use crate::recorder::{MissRecord, MissRecorder};
use crate::snapshot::{resolve_snapshot_path, SnapshotTable};
use crate::transform::{Postprocessor, Preprocessor, PostprocessorRegistry, PreprocessorRegistry};
use crate::version::ModelVersionInfo;
use crate::workload::Workload;
use crate::{CoreError, Result};

/// Provider of cycle-cost estimates for one loaded model.
///
/// Safe to share across threads: every thread queries through its own
/// execution context, and the cache serializes its own bookkeeping.
pub struct CostProvider<W: Workload> {
    engine: Arc<dyn InferenceEngine>,
    preprocessor: Arc<dyn Preprocessor<W>>,
    postprocessor: Arc<dyn Postprocessor<W>>,
    cache: ResultCache,
    recorder: MissRecorder,
    contexts: ContextRegistry,
    version: ModelVersionInfo,
    nickname: String,
    batch_size: usize,
    initialized: bool,
}

impl<W: Workload> fmt::Debug for CostProvider<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CostProvider")
            .field("nickname", &self.nickname)
            .field("version", &self.version)
            .field("batch_size", &self.batch_size)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl<W: Workload> CostProvider<W> {
    /// Builds a provider around a loaded engine.
    ///
    /// Selects the transforms matching the model's declared interface
    /// versions and checks that the preprocessor's descriptor width matches
    /// the model's input width; both mismatches are fatal. A failed engine
    /// load is not: the provider constructs with the liveness gate closed
    /// and every query returns [`CostError::NotInitialized`].
    pub fn new(
        engine: Arc<dyn InferenceEngine>,
        preprocessors: &PreprocessorRegistry<W>,
        postprocessors: &PostprocessorRegistry<W>,
        config: &ProviderConfig,
    ) -> Result<Self> {
        let version = engine.version().clone();
        let preprocessor = preprocessors.select(version.input_version(), version.raw_name())?;
        let postprocessor = postprocessors.select(version.output_version(), version.raw_name())?;

        let nickname = version.nickname();
        let initialized = engine.is_initialized();

        let snapshot = resolve_snapshot_path(
            config.snapshot_path.as_deref(),
            config.model_path.as_deref(),
            config.use_paired_snapshot,
        )
        .map_or_else(SnapshotTable::empty, |path| SnapshotTable::from_path(&path));

        let recorder = MissRecorder::new(
            config.record_misses_enabled(),
            config.record_dir.as_deref(),
            &nickname,
        );

        let provider = Self {
            engine,
            preprocessor,
            postprocessor,
            cache: ResultCache::new(config.cache_capacity, snapshot),
            recorder,
            contexts: ContextRegistry::new(),
            version,
            nickname,
            batch_size: config.batch_size.max(1),
            initialized,
        };

        if provider.initialized {
            provider.correlate_descriptor_width()?;
            debug!(
                "cost provider ready: model {}, interface versions {:?}, batch width {}",
                provider.nickname,
                provider.nn_version(),
                provider.batch_size
            );
        }

        Ok(provider)
    }

    /// Estimates the cost of one workload, serving repeated descriptors from
    /// the cache.
    pub fn cost(&self, workload: &W) -> CostResult {
        if !self.initialized {
            return Err(CostError::NotInitialized);
        }

        let context = self.context();
        let mut context = context.lock().unwrap();
        let adjusted = self.infer_one(workload, &mut context);
        self.classify(adjusted)
    }

    /// Estimates the cost of a batch of workloads through the engine's
    /// native batching. The returned vector always has one entry per input.
    ///
    /// Batched queries neither read nor write the result cache: batching
    /// trades cache reuse for forward-pass throughput.
    pub fn cost_batch(&self, workloads: &[W]) -> Vec<CostResult> {
        if !self.initialized {
            return vec![Err(CostError::NotInitialized); workloads.len()];
        }

        let context = self.context();
        let mut context = context.lock().unwrap();
        self.infer_batch(workloads, &mut context);
        context
            .results
            .iter()
            .map(|&adjusted| self.classify(adjusted))
            .collect()
    }

    /// Cache-only query: classifies the cached value for this workload or
    /// returns [`CostError::CacheMiss`] without ever invoking the engine.
    pub fn cached_cost(&self, workload: &W) -> CostResult {
        if !self.initialized {
            return Err(CostError::NotInitialized);
        }

        let descriptor = self.preprocessor.transform_single(workload);
        match self.cache.get(&descriptor) {
            None => Err(CostError::CacheMiss),
            Some(raw_value) => {
                let adjusted = self.postprocessor.process(workload, raw_value);
                self.classify(adjusted)
            }
        }
    }

    /// Seeds the cache with an externally supplied raw value for this
    /// workload, bypassing the engine.
    pub fn add_to_cache(&self, workload: &W, raw_value: f32) {
        if !self.initialized {
            return;
        }

        let descriptor = self.preprocessor.transform_single(workload);
        self.cache.add(descriptor, raw_value);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Model nickname used for cache naming and diagnostics.
    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Declared (input, output) interface versions of the loaded model.
    pub fn nn_version(&self) -> (u32, u32) {
        (self.version.input_version(), self.version.output_version())
    }

    /// Interval of adjusted outputs accepted by the range gate.
    pub fn valid_interval(&self) -> (f32, f32) {
        self.postprocessor.valid_interval()
    }

    /// How many preloaded cache entries have been served so far.
    pub fn preloaded_cache_hits(&self) -> u64 {
        self.cache.preloaded_hits()
    }

    /// Entries currently held by the result cache's recency tier.
    pub fn cache_entry_count(&self) -> usize {
        self.cache.len()
    }

    /// Threads that have queried this provider so far.
    pub fn thread_context_count(&self) -> usize {
        self.contexts.len()
    }

    fn context(&self) -> Arc<Mutex<ExecutionContext>> {
        self.contexts.get_or_create(|| {
            ExecutionContext::new(ExecutionBuffers::for_engine(
                self.engine.as_ref(),
                self.batch_size,
            ))
        })
    }

    /// Adjusted value for one workload, from cache or a fresh forward pass.
    /// Cached and fresh values go through the same adjustment so they are
    /// observably equivalent.
    fn infer_one(&self, workload: &W, context: &mut ExecutionContext) -> f32 {
        let descriptor = self.preprocessor.transform_single(workload);

        let raw_value = match self.cache.get(&descriptor) {
            Some(cached) => cached,
            None => {
                let outputs = self
                    .engine
                    .predict(descriptor.as_slice(), &mut context.buffers);
                let inferred = outputs[0];
                self.cache.add(descriptor, inferred);

                if self.recorder.is_enabled() {
                    self.record_miss(workload, inferred);
                }

                inferred
            }
        };

        self.postprocessor.process(workload, raw_value)
    }

    /// Runs the batch path into the context's results buffer: one
    /// concatenated descriptor transform, then one forward pass per
    /// batch-width chunk, then the per-workload adjustment in place.
    fn infer_batch(&self, workloads: &[W], context: &mut ExecutionContext) {
        context.results.clear();
        context.results.resize(workloads.len(), 0.0);
        if workloads.is_empty() {
            return;
        }

        let batch_width = context.buffers.batch_width();
        let width = self.preprocessor.descriptor_width();
        let descriptors = self.preprocessor.transform_batch(workloads, batch_width);
        let chunk_len = width * batch_width;

        let mut start = 0;
        while start < workloads.len() {
            let end = (start + batch_width).min(workloads.len());
            let offset = start * width;
            let outputs = self
                .engine
                .predict(&descriptors[offset..offset + chunk_len], &mut context.buffers);
            // The final chunk may be shorter than the batch width; only the
            // valid prefix of the engine output is copied.
            context.results[start..end].copy_from_slice(&outputs[..end - start]);
            start = end;
        }

        for (workload, slot) in workloads.iter().zip(context.results.iter_mut()) {
            *slot = self.postprocessor.process(workload, *slot);
        }
    }

    fn classify(&self, adjusted: f32) -> CostResult {
        if self.postprocessor.is_invalid(adjusted) {
            Err(CostError::InvalidOutputRange)
        } else {
            Ok(adjusted.ceil() as Cycles)
        }
    }

    fn record_miss(&self, workload: &W, raw_value: f32) {
        let outcome = workload.attributes().and_then(|attributes| {
            let record = MissRecord {
                workload_uid: workload.uid().to_string(),
                info: workload.summary(),
                model_cycles: raw_value,
                cost_source: "model-inference".to_string(),
                error_info: String::new(),
                attributes,
            };
            self.recorder.record(&record)
        });

        if let Err(e) = outcome {
            warn!("failed to record cache-miss diagnostics: {e}");
            self.recorder.reset();
        }
    }

    /// Creates the calling thread's context eagerly and checks that the
    /// preprocessor's descriptor width matches the model's declared input
    /// width. Run once at construction so shape problems surface there, not
    /// per query.
    fn correlate_descriptor_width(&self) -> Result<()> {
        let context = self.context();
        let model_width = context.lock().unwrap().buffers.input_shape().width;
        let descriptor_width = self.preprocessor.descriptor_width();

        if model_width != descriptor_width {
            return Err(CoreError::model(
                "DESCRIPTOR_WIDTH_MISMATCH",
                "preprocessing output does not match the model input width",
                format!(
                    "descriptor width {descriptor_width}, model input width {model_width}, \
                     model identity (raw): {}",
                    self.version.raw_name()
                ),
                "Load a model matching the registered transforms",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BufferShape;
    use crate::transform::STANDARD_DESCRIPTOR_WIDTH;
    use crate::workload::{DataType, Device, KernelWorkload, OpKind, TensorDims};

    struct StubEngine {
        version: ModelVersionInfo,
        initialized: bool,
        width: usize,
    }

    impl StubEngine {
        fn matching() -> Self {
            Self {
                version: ModelVersionInfo::new(1, 1, "cc-1-1$stub model$v1"),
                initialized: true,
                width: STANDARD_DESCRIPTOR_WIDTH,
            }
        }
    }

    impl InferenceEngine for StubEngine {
        fn is_initialized(&self) -> bool {
            self.initialized
        }

        fn version(&self) -> &ModelVersionInfo {
            &self.version
        }

        fn input_shape(&self, batch_size: usize) -> BufferShape {
            BufferShape::new(batch_size, self.width)
        }

        fn output_shape(&self, batch_size: usize) -> BufferShape {
            BufferShape::new(batch_size, 1)
        }

        fn predict<'a>(&self, descriptors: &[f32], scratch: &'a mut ExecutionBuffers) -> &'a [f32] {
            scratch.set_inputs(descriptors);
            let slots = descriptors.len() / self.width.max(1);
            for slot in 0..slots {
                scratch.outputs_mut()[slot] = 100.0;
            }
            &scratch.outputs()[..slots]
        }
    }

    fn workload() -> KernelWorkload {
        KernelWorkload {
            device: Device::Npu2,
            op: OpKind::Pooling,
            input: TensorDims::new(28, 28, 32),
            output: TensorDims::new(14, 14, 32),
            kernel: (2, 2),
            stride: (2, 2),
            dtype: DataType::Int8,
        }
    }

    #[test]
    fn construction_rejects_unknown_versions() {
        let engine = Arc::new(StubEngine {
            version: ModelVersionInfo::new(9, 1, "cc-9-1$future$x"),
            ..StubEngine::matching()
        });

        let err = CostProvider::new(
            engine,
            &PreprocessorRegistry::standard(),
            &PostprocessorRegistry::standard(),
            &ProviderConfig::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("input interface version 9"));
    }

    #[test]
    fn construction_rejects_width_mismatch() {
        let engine = Arc::new(StubEngine {
            width: STANDARD_DESCRIPTOR_WIDTH + 3,
            ..StubEngine::matching()
        });

        let err = CostProvider::new(
            engine,
            &PreprocessorRegistry::standard(),
            &PostprocessorRegistry::standard(),
            &ProviderConfig::default(),
        )
        .unwrap_err();

        assert!(err.to_string().contains("model input width"));
    }

    #[test]
    fn uninitialized_engine_closes_the_liveness_gate() {
        let engine = Arc::new(StubEngine {
            initialized: false,
            version: ModelVersionInfo::absent(),
            ..StubEngine::matching()
        });

        let provider = CostProvider::new(
            engine,
            &PreprocessorRegistry::standard(),
            &PostprocessorRegistry::standard(),
            &ProviderConfig::default(),
        )
        .unwrap();

        assert!(!provider.is_initialized());
        assert_eq!(provider.cost(&workload()), Err(CostError::NotInitialized));
        assert_eq!(
            provider.cached_cost(&workload()),
            Err(CostError::NotInitialized)
        );
        assert_eq!(
            provider.cost_batch(&vec![workload(); 3]),
            vec![Err(CostError::NotInitialized); 3]
        );

        provider.add_to_cache(&workload(), 5.0);
        assert_eq!(provider.cache_entry_count(), 0);
    }

    #[test]
    fn provider_reports_model_identity() {
        let provider = CostProvider::new(
            Arc::new(StubEngine::matching()),
            &PreprocessorRegistry::standard(),
            &PostprocessorRegistry::standard(),
            &ProviderConfig::default(),
        )
        .unwrap();

        assert_eq!(provider.nickname(), "sim_stub_model");
        assert_eq!(provider.nn_version(), (1, 1));
        assert_eq!(provider.valid_interval(), (0.0, 4_000_000_000.0));
    }
}
