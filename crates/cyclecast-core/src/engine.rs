//! Contract with the numeric model engine
//!
//! The engine owns the learned model: weight format, kernels, and shape
//! negotiation are its business. The orchestration layer only needs to know
//! whether the model loaded, which interface versions it declares, what the
//! forward-pass buffers look like, and how to run a forward pass against
//! thread-private scratch memory.

use crate::version::ModelVersionInfo;

/// Shape of one forward-pass buffer: `batch` slots of `width` floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferShape {
    pub batch: usize,
    pub width: usize,
}

impl BufferShape {
    pub fn new(batch: usize, width: usize) -> Self {
        Self { batch, width }
    }

    /// Total element count of a buffer with this shape.
    pub fn len(&self) -> usize {
        self.batch * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read/write memory for one forward pass. Not shareable between threads:
/// every thread queries through its own instance (see the execution-context
/// registry), which is what makes the engine's scratch-buffer reuse safe
/// under concurrency.
#[derive(Debug)]
pub struct ExecutionBuffers {
    input: Vec<f32>,
    output: Vec<f32>,
    input_shape: BufferShape,
    output_shape: BufferShape,
}

impl ExecutionBuffers {
    /// Allocates buffers matching the engine's declared shapes for the given
    /// batch width.
    pub fn for_engine(engine: &dyn InferenceEngine, batch_size: usize) -> Self {
        let input_shape = engine.input_shape(batch_size);
        let output_shape = engine.output_shape(batch_size);
        Self {
            input: vec![0.0; input_shape.len()],
            output: vec![0.0; output_shape.len()],
            input_shape,
            output_shape,
        }
    }

    pub fn input_shape(&self) -> BufferShape {
        self.input_shape
    }

    pub fn output_shape(&self) -> BufferShape {
        self.output_shape
    }

    /// How many workloads one forward pass consumes.
    pub fn batch_width(&self) -> usize {
        self.input_shape.batch
    }

    /// Copies `values` into the input buffer. Slots past `values.len()` are
    /// zeroed so a partial batch never sees stale activations.
    pub fn set_inputs(&mut self, values: &[f32]) {
        let used = values.len().min(self.input.len());
        self.input[..used].copy_from_slice(&values[..used]);
        self.input[used..].fill(0.0);
    }

    pub fn inputs(&self) -> &[f32] {
        &self.input
    }

    pub fn outputs(&self) -> &[f32] {
        &self.output
    }

    pub fn outputs_mut(&mut self) -> &mut [f32] {
        &mut self.output
    }
}

/// A loaded cost model, shared read-only between all querying threads.
///
/// `predict` is the only mutating entry point and all its mutable state lives
/// in the caller-supplied [`ExecutionBuffers`]; implementations must not keep
/// per-call state of their own.
pub trait InferenceEngine: Send + Sync {
    /// Whether the model data loaded and validated successfully. Decided once
    /// at load; an engine never becomes initialized later.
    fn is_initialized(&self) -> bool;

    /// Declared interface versions and raw identity of the loaded model.
    fn version(&self) -> &ModelVersionInfo;

    /// Input buffer layout for a forward pass over `batch_size` workloads.
    fn input_shape(&self, batch_size: usize) -> BufferShape;

    /// Output buffer layout: one raw value per batch slot.
    fn output_shape(&self, batch_size: usize) -> BufferShape;

    /// Runs one forward pass. `descriptors` holds one or more descriptor-width
    /// slots (up to the scratch buffers' batch width); the returned slice
    /// holds one raw output per provided slot and borrows the scratch
    /// buffers, so it is valid until the next call on the same buffers.
    fn predict<'a>(&self, descriptors: &[f32], scratch: &'a mut ExecutionBuffers) -> &'a [f32];
}
