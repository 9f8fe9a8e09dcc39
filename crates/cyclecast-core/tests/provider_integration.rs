//! Integration tests for the cost provider
//!
//! Drives the full orchestration path with a deterministic in-process engine:
//! caching behavior, the batch path, classification gates, snapshot preload
//! and cache-miss recording.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cyclecast_core::cache::Descriptor;
use cyclecast_core::config::ProviderConfig;
use cyclecast_core::cycles::CostError;
use cyclecast_core::engine::{BufferShape, ExecutionBuffers, InferenceEngine};
use cyclecast_core::provider::CostProvider;
use cyclecast_core::snapshot::write_snapshot;
use cyclecast_core::transform::{
    Postprocessor, PostprocessorRegistry, Preprocessor, PreprocessorRegistry,
    StandardPreprocessor, STANDARD_DESCRIPTOR_WIDTH,
};
use cyclecast_core::version::ModelVersionInfo;
use cyclecast_core::workload::{DataType, Device, KernelWorkload, OpKind, TensorDims, Workload};

/// Deterministic raw output for one descriptor slot.
fn slot_value(features: &[f32]) -> f32 {
    features.iter().sum::<f32>() * 10.0
}

struct TestEngine {
    version: ModelVersionInfo,
    forward_calls: AtomicUsize,
}

impl TestEngine {
    fn new() -> Self {
        Self {
            version: ModelVersionInfo::new(1, 1, "cc-1-1$test npu$2025"),
            forward_calls: AtomicUsize::new(0),
        }
    }

    fn forward_calls(&self) -> usize {
        self.forward_calls.load(Ordering::SeqCst)
    }
}

impl InferenceEngine for TestEngine {
    fn is_initialized(&self) -> bool {
        true
    }

    fn version(&self) -> &ModelVersionInfo {
        &self.version
    }

    fn input_shape(&self, batch_size: usize) -> BufferShape {
        BufferShape::new(batch_size, STANDARD_DESCRIPTOR_WIDTH)
    }

    fn output_shape(&self, batch_size: usize) -> BufferShape {
        BufferShape::new(batch_size, 1)
    }

    fn predict<'a>(&self, descriptors: &[f32], scratch: &'a mut ExecutionBuffers) -> &'a [f32] {
        self.forward_calls.fetch_add(1, Ordering::SeqCst);
        scratch.set_inputs(descriptors);

        let slots = descriptors.len() / STANDARD_DESCRIPTOR_WIDTH;
        for slot in 0..slots {
            let features =
                &descriptors[slot * STANDARD_DESCRIPTOR_WIDTH..(slot + 1) * STANDARD_DESCRIPTOR_WIDTH];
            scratch.outputs_mut()[slot] = slot_value(features);
        }
        &scratch.outputs()[..slots]
    }
}

fn workload(seed: u32) -> KernelWorkload {
    KernelWorkload {
        device: Device::Npu4,
        op: OpKind::Convolution,
        input: TensorDims::new(8 + seed, 8 + seed, 16),
        output: TensorDims::new(8 + seed, 8 + seed, 32),
        kernel: (3, 3),
        stride: (1, 1),
        dtype: DataType::Int8,
    }
}

fn descriptor_of(seed: u32) -> Descriptor {
    StandardPreprocessor.transform_single(&workload(seed))
}

/// The cycle count the engine path must yield for this workload.
fn expected_cycles(seed: u32) -> u64 {
    slot_value(descriptor_of(seed).as_slice()).ceil() as u64
}

fn provider(
    engine: Arc<TestEngine>,
    config: &ProviderConfig,
) -> CostProvider<KernelWorkload> {
    CostProvider::new(
        engine,
        &PreprocessorRegistry::standard(),
        &PostprocessorRegistry::standard(),
        config,
    )
    .unwrap()
}

#[test]
fn repeated_queries_are_idempotent_and_cached() {
    let engine = Arc::new(TestEngine::new());
    let provider = provider(Arc::clone(&engine), &ProviderConfig::default());

    let first = provider.cost(&workload(1)).unwrap();
    let second = provider.cost(&workload(1)).unwrap();

    assert_eq!(first, second);
    assert_eq!(first, expected_cycles(1));
    assert_eq!(engine.forward_calls(), 1);
    assert_eq!(provider.cache_entry_count(), 1);
}

#[test]
fn eviction_follows_recency_not_insertion_order() {
    let engine = Arc::new(TestEngine::new());
    let config = ProviderConfig {
        cache_capacity: 3,
        ..ProviderConfig::default()
    };
    let provider = provider(engine, &config);

    provider.cost(&workload(1)).unwrap();
    provider.cost(&workload(2)).unwrap();
    provider.cost(&workload(3)).unwrap();

    // Refresh the oldest-inserted entry, then overflow the capacity.
    provider.cost(&workload(1)).unwrap();
    provider.cost(&workload(4)).unwrap();

    assert_eq!(provider.cached_cost(&workload(2)), Err(CostError::CacheMiss));
    assert_eq!(provider.cached_cost(&workload(1)), Ok(expected_cycles(1)));
    assert_eq!(provider.cache_entry_count(), 3);
}

#[test]
fn cache_only_queries_never_run_inference() {
    let engine = Arc::new(TestEngine::new());
    let provider = provider(Arc::clone(&engine), &ProviderConfig::default());

    assert_eq!(provider.cached_cost(&workload(7)), Err(CostError::CacheMiss));
    assert_eq!(engine.forward_calls(), 0);
    assert_eq!(provider.cache_entry_count(), 0);

    // Seeding bypasses the engine too and is then visible to cache-only reads.
    provider.add_to_cache(&workload(7), 123.4);
    assert_eq!(provider.cached_cost(&workload(7)), Ok(124));
    assert_eq!(engine.forward_calls(), 0);
}

#[test]
fn batch_results_match_single_engine_results() {
    let engine = Arc::new(TestEngine::new());
    let config = ProviderConfig {
        batch_size: 4,
        ..ProviderConfig::default()
    };
    let provider = provider(Arc::clone(&engine), &config);

    // Poison the cache for one workload: the batch path must not read it.
    provider.add_to_cache(&workload(0), 999_999.0);

    let workloads: Vec<KernelWorkload> = (0..10).map(workload).collect();
    let results = provider.cost_batch(&workloads);

    assert_eq!(results.len(), 10);
    for (seed, result) in (0u32..10).zip(&results) {
        assert_eq!(*result, Ok(expected_cycles(seed)), "workload seed {seed}");
    }

    // 10 workloads at batch width 4 need 3 forward passes; nothing was
    // written back to the cache beyond the seeded entry.
    assert_eq!(engine.forward_calls(), 3);
    assert_eq!(provider.cache_entry_count(), 1);
}

#[test]
fn empty_batch_is_a_no_op() {
    let engine = Arc::new(TestEngine::new());
    let provider = provider(Arc::clone(&engine), &ProviderConfig::default());

    assert!(provider.cost_batch(&[]).is_empty());
    assert_eq!(engine.forward_calls(), 0);
}

/// Interval gate with an exact window, for boundary checks.
struct WindowPostprocessor;

impl Postprocessor<KernelWorkload> for WindowPostprocessor {
    fn interface_version(&self) -> u32 {
        1
    }

    fn process(&self, _workload: &KernelWorkload, raw_value: f32) -> f32 {
        raw_value
    }

    fn valid_interval(&self) -> (f32, f32) {
        (100.0, 200.0)
    }
}

#[test]
fn interval_boundaries_are_inclusive() {
    let mut postprocessors = PostprocessorRegistry::new();
    postprocessors.register(Arc::new(WindowPostprocessor));

    let provider = CostProvider::new(
        Arc::new(TestEngine::new()) as Arc<dyn InferenceEngine>,
        &PreprocessorRegistry::standard(),
        &postprocessors,
        &ProviderConfig::default(),
    )
    .unwrap();

    for (seed, raw, expected) in [
        (1, 100.0, Ok(100)),
        (2, 200.0, Ok(200)),
        (3, 99.0, Err(CostError::InvalidOutputRange)),
        (4, 201.0, Err(CostError::InvalidOutputRange)),
    ] {
        provider.add_to_cache(&workload(seed), raw);
        assert_eq!(provider.cached_cost(&workload(seed)), expected, "raw {raw}");
    }

    assert_eq!(provider.valid_interval(), (100.0, 200.0));
}

#[test]
fn preloaded_snapshot_serves_hits_and_counts_reuse() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("warm.ccsnap");

    let mut entries = std::collections::HashMap::new();
    entries.insert(descriptor_of(5).content_hash(), 77.2);
    write_snapshot(&snapshot_path, &entries).unwrap();

    let engine = Arc::new(TestEngine::new());
    let config = ProviderConfig {
        snapshot_path: Some(snapshot_path),
        ..ProviderConfig::default()
    };
    let provider = provider(Arc::clone(&engine), &config);

    // Both query styles are answered from the preloaded tier, with the
    // same adjustment as a fresh inference would get.
    assert_eq!(provider.cached_cost(&workload(5)), Ok(78));
    assert_eq!(provider.cost(&workload(5)), Ok(78));
    assert_eq!(engine.forward_calls(), 0);
    assert_eq!(provider.preloaded_cache_hits(), 2);
}

#[test]
fn cache_misses_are_recorded_as_json_lines() {
    let dir = tempfile::tempdir().unwrap();

    let engine = Arc::new(TestEngine::new());
    let config = ProviderConfig {
        record_misses: true,
        record_dir: Some(dir.path().to_path_buf()),
        ..ProviderConfig::default()
    };
    let provider = provider(engine, &config);

    provider.cost(&workload(1)).unwrap();
    provider.cost(&workload(1)).unwrap(); // hit, not recorded
    provider.cost(&workload(2)).unwrap();

    let path = dir.path().join("sim_test_npu_misses.jsonl");
    let content = std::fs::read_to_string(path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["workload_uid"], workload(1).uid().to_string());
    assert_eq!(first["device"], "npu4");
    assert!(first["model_cycles"].as_f64().unwrap() > 0.0);
}

#[test]
fn recording_failures_do_not_affect_the_query() {
    let dir = tempfile::tempdir().unwrap();

    let engine = Arc::new(TestEngine::new());
    let config = ProviderConfig {
        record_misses: true,
        // The target directory does not exist, so every record attempt fails.
        record_dir: Some(dir.path().join("missing-subdir")),
        ..ProviderConfig::default()
    };
    let provider = provider(Arc::clone(&engine), &config);

    assert_eq!(provider.cost(&workload(1)), Ok(expected_cycles(1)));
    assert_eq!(provider.cost(&workload(2)), Ok(expected_cycles(2)));
    assert_eq!(engine.forward_calls(), 2);
    assert_eq!(provider.cache_entry_count(), 2);
}
