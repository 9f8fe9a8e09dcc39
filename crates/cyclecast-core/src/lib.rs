//! Cyclecast Core - Cost-Query Orchestration
//!
//! This crate provides the cost-query orchestration layer of the Cyclecast
//! cycle predictor: a bounded result cache keyed by model-input descriptors,
//! a per-thread execution-context registry, single and batched inference
//! paths, and the classification of raw model output into typed cost
//! results.

// Module declarations
pub mod cache;
pub mod config;
pub mod context;
pub mod cycles;
pub mod engine;
pub mod provider;
pub mod recorder;
pub mod snapshot;
pub mod transform;
pub mod version;
pub mod workload;

use thiserror::Error;

/// Fatal, construction-time errors. Per-query soft failures are
/// [`cycles::CostError`] values instead.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Model/transform compatibility errors
    #[error("Model error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Model {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Configuration parsing and validation errors
    #[error("Configuration error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Configuration {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// Cache snapshot and bookkeeping errors
    #[error("Cache error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Cache {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// File system and I/O errors
    #[error("IO error [{code}]: {message}\nSuggestion: {suggestion}")]
    Io {
        code: &'static str,
        message: String,
        suggestion: String,
        #[source]
        source: std::io::Error,
    },

    /// Other unexpected errors
    #[error("Internal error [{code}]: {message}")]
    Internal {
        code: &'static str,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a model error with context
    pub fn model<S1, S2, S3>(code: &'static str, message: S1, context: S2, suggestion: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Model {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a configuration error with context
    pub fn configuration<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a cache error with context
    pub fn cache<S1, S2, S3>(code: &'static str, message: S1, context: S2, suggestion: S3) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Cache {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::Model { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::Cache { code, .. } => code,
            Self::Io { code, .. } => code,
            Self::Internal { code, .. } => code,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        let (code, suggestion) = match err.kind() {
            std::io::ErrorKind::NotFound => (
                "IO_FILE_NOT_FOUND",
                "Check that the file path is correct and the file exists",
            ),
            std::io::ErrorKind::PermissionDenied => (
                "IO_PERMISSION_DENIED",
                "Check file permissions or run with appropriate privileges",
            ),
            std::io::ErrorKind::UnexpectedEof => (
                "IO_TRUNCATED",
                "The file is shorter than its header claims; regenerate it",
            ),
            std::io::ErrorKind::InvalidData => (
                "IO_INVALID_DATA",
                "The file may be corrupted or in an unexpected format",
            ),
            _ => (
                "IO_UNKNOWN",
                "Check the file system and try the operation again",
            ),
        };

        Self::Io {
            code,
            message: err.to_string(),
            suggestion: suggestion.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            code: "INTERNAL_UNKNOWN",
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal {
            code: "INTERNAL_JSON",
            message: err.to_string(),
            source: Some(err.into()),
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        cache::{Descriptor, ResultCache},
        config::ProviderConfig,
        cycles::{CostError, CostResult, Cycles},
        engine::{BufferShape, ExecutionBuffers, InferenceEngine},
        provider::CostProvider,
        transform::{Postprocessor, PostprocessorRegistry, Preprocessor, PreprocessorRegistry},
        version::ModelVersionInfo,
        workload::{Device, KernelWorkload, Workload},
        CoreError, Result,
    };
}

// Re-export key types at the crate root
pub use config::ProviderConfig;
pub use cycles::{CostError, CostResult, Cycles};
pub use provider::CostProvider;
pub use version::ModelVersionInfo;
