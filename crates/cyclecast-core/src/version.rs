//! Model interface-version metadata
//!
//! A loaded model declares an input and an output interface version, used to
//! select the compatible preprocessing and postprocessing transforms, plus a
//! raw identity string from which a human-readable nickname is derived for
//! cache naming and diagnostics.

/// Interface-version pair and raw identity of a loaded model, fixed at load
/// time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelVersionInfo {
    input_version: u32,
    output_version: u32,
    raw_name: String,
}

/// Raw name reported when no model data is present.
pub const ABSENT_MODEL_NAME: &str = "none";

/// Interface version assumed when the model declares none.
pub const DEFAULT_INTERFACE_VERSION: u32 = 1;

impl ModelVersionInfo {
    pub fn new(input_version: u32, output_version: u32, raw_name: impl Into<String>) -> Self {
        Self {
            input_version,
            output_version,
            raw_name: raw_name.into(),
        }
    }

    /// Version info for an engine with no loaded model. Transform selection
    /// still proceeds with the default interface versions.
    pub fn absent() -> Self {
        Self::new(
            DEFAULT_INTERFACE_VERSION,
            DEFAULT_INTERFACE_VERSION,
            ABSENT_MODEL_NAME,
        )
    }

    pub fn input_version(&self) -> u32 {
        self.input_version
    }

    pub fn output_version(&self) -> u32 {
        self.output_version
    }

    /// The unaltered identity string reported by the model data.
    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    pub fn is_absent(&self) -> bool {
        self.raw_name == ABSENT_MODEL_NAME
    }

    /// Derives the model nickname used for cache files and diagnostics.
    ///
    /// The nickname is the `$`-delimited middle section of the raw name with
    /// spaces replaced by underscores, prefixed with `sim_`. Raw names
    /// without both delimiters are used whole.
    pub fn nickname(&self) -> String {
        let delim = '$';
        let first = self.raw_name.find(delim);
        let last = self.raw_name.rfind(delim);
        match (first, last) {
            (Some(first), Some(last)) if last > first => {
                let nick = self.raw_name[first + 1..last].replace(' ', "_");
                format!("sim_{nick}")
            }
            _ => self.raw_name.clone(),
        }
    }
}
