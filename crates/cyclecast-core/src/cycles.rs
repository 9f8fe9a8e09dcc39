//! Cycle-count results and the soft error codes a cost query can produce

use thiserror::Error;

/// Estimated execution cost in device cycles.
pub type Cycles = u64;

/// Soft, per-query failures. These are returned as values so callers can
/// branch on them; they never abort a query batch or poison the provider.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CostError {
    /// The provider failed to initialize at construction; every query
    /// short-circuits with this code.
    #[error("cost model is not initialized, inference is not possible")]
    NotInitialized,

    /// The adjusted model output fell outside the model's declared valid
    /// interval.
    #[error("model output is outside the declared valid range")]
    InvalidOutputRange,

    /// A cache-only query found no entry for the workload's descriptor.
    #[error("no cached value for this workload")]
    CacheMiss,
}

/// Outcome of a single cost query: a cycle count or a typed soft error.
pub type CostResult = std::result::Result<Cycles, CostError>;
