use thiserror::Error;

/// Failures surfaced by the analysis pipeline.
///
/// Everything except [`AnalyzeError::LogicInvariant`] is recoverable at the
/// granularity of one file: the driver logs the error, drops the file, and
/// continues with the rest of the run.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AnalyzeError {
    /// The external parser failed on a file.
    #[error("failed to parse `{path}`: {message}")]
    Parse { path: String, message: String },

    /// A file could not be read or an output could not be written.
    #[error("io error on `{path}`: {message}")]
    Io { path: String, message: String },

    /// Two input files normalized to the same module identifier.
    /// The first file wins; the second is dropped.
    #[error("duplicate module identifier `{identifier}` from `{path}`")]
    DuplicateIdentifier { identifier: String, path: String },

    /// An internal assertion failed while analyzing one module. The module
    /// is dropped from the result list; other modules are unaffected.
    #[error("internal invariant violated: {0}")]
    LogicInvariant(String),
}

impl AnalyzeError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        AnalyzeError::LogicInvariant(message.into())
    }
}
