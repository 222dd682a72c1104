//! Static analysis of a Lua source tree into a resolved semantic model:
//! dependency-ordered modules exposing classes, tables, functions, fields,
//! and return types with inferred type sets.
//!
//! The pipeline runs in three phases over one [`AnalysisContext`]:
//!
//! 1. the dependency resolver scans every file and computes a deterministic
//!    analysis order;
//! 2. the scope reader walks each file in that order, normalizing
//!    expressions, recording definitions and usage facts, and detecting
//!    class idioms, handing each finished scope to the type resolver;
//! 3. the finalizer substitutes the remaining synthetic markers with
//!    user-facing names and assembles per-module outputs.
//!
//! Parsing, stub emission, schema file I/O, and the command-line surface
//! live elsewhere; this crate consumes ASTs and produces the model.

use std::hash::BuildHasherDefault;

use rustc_hash::FxHasher;

mod analyzer;
mod classes;
mod context;
pub mod dependency;
mod error;
mod expression;
mod finalize;
mod ids;
mod info;
mod module_name;
mod reader;
mod scope;
mod settings;
mod types;
mod usage;

pub use analyzer::{AnalysisResult, Analyzer, SourceFile};
pub use context::{AnalysisContext, Module};
pub use error::AnalyzeError;
pub use expression::{Expression, ExpressionId, ExpressionInfo, Literal, Operator, ReferenceKey};
pub use finalize::{
    ResolvedClass, ResolvedField, ResolvedFunction, ResolvedModule, ResolvedParameter,
    ResolvedTable,
};
pub use ids::{Id, IdKind};
pub use info::{FieldKey, FunctionInfo, ParameterInfo, ReturnPosition, TableInfo};
pub use module_name::ModuleName;
pub use scope::{ResolvedReturn, ResolvedScope};
pub use settings::AnalyzerSettings;
pub use types::{collapse_booleans, narrow, NarrowKind, Type, TypeSet};
pub use usage::{CallArguments, CandidateKinds, Usage, UsageFlags};

pub(crate) type FxOrderSet<V> = ordermap::set::OrderSet<V, BuildHasherDefault<FxHasher>>;
pub(crate) type FxOrderMap<K, V> = ordermap::map::OrderMap<K, V, BuildHasherDefault<FxHasher>>;
