//! Workload types whose execution cost is being estimated
//!
//! The orchestration layer treats workloads as opaque: it only needs a device
//! identifier, a stable identity hash, and enough surface for the diagnostic
//! recorder. The concrete [`KernelWorkload`] below is what the reference
//! transforms consume.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::cache::fnv1a_64;
use crate::Result;

/// Device generation a workload targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Npu2,
    Npu3,
    Npu4,
}

impl Device {
    pub fn name(&self) -> &'static str {
        match self {
            Device::Npu2 => "npu2",
            Device::Npu3 => "npu3",
            Device::Npu4 => "npu4",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            Device::Npu2 => 0,
            Device::Npu3 => 1,
            Device::Npu4 => 2,
        }
    }
}

/// One unit of hardware work whose cost can be queried.
///
/// Implementations must be cheap to describe: `uid` has to be stable across
/// runs (it keys persisted diagnostics), and `attributes` may fail for
/// malformed workloads, which the provider treats as a best-effort
/// diagnostics problem, never a query failure.
pub trait Workload: Send + Sync {
    fn device(&self) -> Device;

    /// One-line human readable summary for diagnostics.
    fn summary(&self) -> String;

    /// Stable identity hash, invariant across processes.
    fn uid(&self) -> u64;

    /// Named attributes for the diagnostic recorder.
    fn attributes(&self) -> Result<Map<String, Value>>;
}

/// Operation class of a kernel workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Convolution,
    DepthwiseConvolution,
    MatMul,
    Elementwise,
    Pooling,
}

impl OpKind {
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Convolution => "convolution",
            OpKind::DepthwiseConvolution => "depthwise_convolution",
            OpKind::MatMul => "matmul",
            OpKind::Elementwise => "elementwise",
            OpKind::Pooling => "pooling",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            OpKind::Convolution => 0,
            OpKind::DepthwiseConvolution => 1,
            OpKind::MatMul => 2,
            OpKind::Elementwise => 3,
            OpKind::Pooling => 4,
        }
    }
}

/// Element type of a workload's activations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Int8,
    Fp16,
    Bf16,
}

impl DataType {
    pub fn bytes(&self) -> u32 {
        match self {
            DataType::Int8 => 1,
            DataType::Fp16 | DataType::Bf16 => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::Fp16 => "fp16",
            DataType::Bf16 => "bf16",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            DataType::Int8 => 0,
            DataType::Fp16 => 1,
            DataType::Bf16 => 2,
        }
    }
}

/// Width × height × channels of an activation tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDims {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
}

impl TensorDims {
    pub fn new(width: u32, height: u32, channels: u32) -> Self {
        Self {
            width,
            height,
            channels,
        }
    }
}

/// A single hardware kernel invocation: the concrete workload type the
/// reference transforms understand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelWorkload {
    pub device: Device,
    pub op: OpKind,
    pub input: TensorDims,
    pub output: TensorDims,
    pub kernel: (u32, u32),
    pub stride: (u32, u32),
    pub dtype: DataType,
}

impl KernelWorkload {
    fn identity_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(40);
        bytes.push(self.device.index() as u8);
        bytes.push(self.op.index() as u8);
        bytes.push(self.dtype.index() as u8);
        for dim in [
            self.input.width,
            self.input.height,
            self.input.channels,
            self.output.width,
            self.output.height,
            self.output.channels,
            self.kernel.0,
            self.kernel.1,
            self.stride.0,
            self.stride.1,
        ] {
            bytes.extend_from_slice(&dim.to_le_bytes());
        }
        bytes
    }
}

impl Workload for KernelWorkload {
    fn device(&self) -> Device {
        self.device
    }

    fn summary(&self) -> String {
        format!(
            "{} {} {}x{}x{} -> {}x{}x{} k{}x{} s{}x{} {}",
            self.device.name(),
            self.op.name(),
            self.input.width,
            self.input.height,
            self.input.channels,
            self.output.width,
            self.output.height,
            self.output.channels,
            self.kernel.0,
            self.kernel.1,
            self.stride.0,
            self.stride.1,
            self.dtype.name(),
        )
    }

    fn uid(&self) -> u64 {
        fnv1a_64(&self.identity_bytes())
    }

    fn attributes(&self) -> Result<Map<String, Value>> {
        let mut map = Map::new();
        map.insert("device".into(), json!(self.device.name()));
        map.insert("operation".into(), json!(self.op.name()));
        map.insert("input_width".into(), json!(self.input.width));
        map.insert("input_height".into(), json!(self.input.height));
        map.insert("input_channels".into(), json!(self.input.channels));
        map.insert("output_width".into(), json!(self.output.width));
        map.insert("output_height".into(), json!(self.output.height));
        map.insert("output_channels".into(), json!(self.output.channels));
        map.insert("kernel".into(), json!([self.kernel.0, self.kernel.1]));
        map.insert("stride".into(), json!([self.stride.0, self.stride.1]));
        map.insert("dtype".into(), json!(self.dtype.name()));
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload() -> KernelWorkload {
        KernelWorkload {
            device: Device::Npu4,
            op: OpKind::Convolution,
            input: TensorDims::new(56, 56, 64),
            output: TensorDims::new(56, 56, 64),
            kernel: (3, 3),
            stride: (1, 1),
            dtype: DataType::Int8,
        }
    }

    #[test]
    fn uid_is_stable_and_field_sensitive() {
        let a = workload();
        let b = workload();
        assert_eq!(a.uid(), b.uid());

        let mut c = workload();
        c.stride = (2, 2);
        assert_ne!(a.uid(), c.uid());
    }

    #[test]
    fn attributes_cover_identifying_fields() {
        let attrs = workload().attributes().unwrap();
        assert_eq!(attrs["device"], json!("npu4"));
        assert_eq!(attrs["operation"], json!("convolution"));
        assert_eq!(attrs["kernel"], json!([3, 3]));
    }

    #[test]
    fn summary_is_single_line() {
        let summary = workload().summary();
        assert!(!summary.contains('\n'));
        assert!(summary.contains("npu4"));
    }
}
