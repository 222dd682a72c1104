//! The schema file data model and its bridge to the analyzed model.
//!
//! Schema files are hand-authored overrides of what analysis infers:
//! versioned, serde-shaped, and merged over the analyzer's output with
//! curated entries taking precedence. Reading and writing the files
//! themselves is the caller's job; this crate owns the shape, the
//! validation, the tag vocabulary, and the merge.

use thiserror::Error;

mod merge;
mod model;
pub mod tags;

pub use merge::{merge_modules, MergeOutcome};
pub use model::{
    ClassEntry, ConstructorEntry, FieldEntry, FunctionEntry, Languages, LuaLanguage, OperatorEntry,
    OverloadEntry, ParameterEntry, ReturnEntry, SchemaFile, TableEntry, SUPPORTED_VERSION,
};

/// A schema file that cannot be used. The file is rejected as a whole;
/// analysis proceeds without it.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("unsupported schema version `{found}` (expected `{SUPPORTED_VERSION}`)")]
    UnsupportedVersion { found: String },

    #[error("malformed schema file: {message}")]
    Shape { message: String },
}
