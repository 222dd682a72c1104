use rustc_hash::FxHashMap;
use stubgen_lua_ast::Chunk;

use crate::context::{AnalysisContext, Module};
use crate::dependency::{analysis_order, scan_chunk, AliasMap, FileDependencies};
use crate::error::AnalyzeError;
use crate::finalize::{finalize_modules, ResolvedModule};
use crate::module_name::ModuleName;
use crate::reader::read_module;
use crate::settings::AnalyzerSettings;

/// One input file: a path relative to the input directory and the parse
/// outcome the external shell obtained for it.
#[derive(Debug)]
pub struct SourceFile {
    path: String,
    chunk: Result<Chunk, AnalyzeError>,
}

impl SourceFile {
    pub fn parsed(path: impl Into<String>, chunk: Chunk) -> Self {
        Self {
            path: path.into(),
            chunk: Ok(chunk),
        }
    }

    /// A file the shell could not read or parse; it is logged and skipped.
    pub fn failed(path: impl Into<String>, error: AnalyzeError) -> Self {
        Self {
            path: path.into(),
            chunk: Err(error),
        }
    }
}

/// Everything a run produces: finalized modules in analysis order, plus the
/// errors that were recovered from along the way.
#[derive(Debug, Default)]
pub struct AnalysisResult {
    pub modules: Vec<ResolvedModule>,
    pub order: Vec<ModuleName>,
    pub errors: Vec<AnalyzeError>,
}

/// The batch driver: orders the input set, analyzes each module, and
/// finalizes the results. Owns the analysis context for the whole run.
#[derive(Debug)]
pub struct Analyzer {
    context: AnalysisContext,
}

impl Analyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self {
            context: AnalysisContext::new(settings),
        }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        self.context.settings()
    }

    pub fn analyze(mut self, sources: Vec<SourceFile>) -> AnalysisResult {
        let _span = tracing::trace_span!("analyze").entered();
        let mut errors = Vec::new();

        // Normalize paths to module identifiers; the first file to claim an
        // identifier wins, later claimants are dropped.
        let mut chunks: FxHashMap<ModuleName, Chunk> = FxHashMap::default();
        let mut names: Vec<ModuleName> = Vec::new();
        for source in sources {
            let chunk = match source.chunk {
                Ok(chunk) => chunk,
                Err(error) => {
                    tracing::warn!("skipping `{}`: {error}", source.path);
                    errors.push(error);
                    continue;
                }
            };
            let Some(name) = ModuleName::from_path(&source.path) else {
                tracing::warn!("skipping `{}`: not a module path", source.path);
                continue;
            };
            if self.is_excluded(&name) {
                continue;
            }
            if chunks.contains_key(&name) {
                let error = AnalyzeError::DuplicateIdentifier {
                    identifier: name.to_string(),
                    path: source.path,
                };
                tracing::warn!("{error}");
                errors.push(error);
                continue;
            }
            names.push(name.clone());
            chunks.insert(name, chunk);
        }

        // Dependency pass: scan every file, then compute the analysis
        // order over the scanned facts.
        let scanned: Vec<(ModuleName, FileDependencies)> = names
            .iter()
            .map(|name| (name.clone(), scan_chunk(&chunks[name])))
            .collect();
        let mut order = analysis_order(&scanned, self.context.settings());
        for extra in self.context.settings().extra_files.clone() {
            if let Some(extra) = ModuleName::from_path(&extra) {
                if chunks.contains_key(&extra) && !order.contains(&extra) {
                    order.push(extra);
                }
            }
        }

        self.context
            .set_alias_map(AliasMap::from_module_names(order.iter()));
        for name in &order {
            self.context.register_module(Module::new(name.clone()));
        }

        for name in &order {
            if self.is_skipped(name) {
                tracing::debug!("ordering only, not analyzing `{name}`");
                continue;
            }
            let Some(chunk) = chunks.get(name) else {
                continue;
            };
            read_module(&mut self.context, name, chunk);
        }

        let modules = finalize_modules(&mut self.context, &order);

        AnalysisResult {
            modules,
            order,
            errors,
        }
    }

    /// Consumes the analyzer after a manual pipeline; exposed for the
    /// schema bridge, which needs the context to interpret the model.
    pub fn into_context(self) -> AnalysisContext {
        self.context
    }

    fn is_excluded(&self, name: &ModuleName) -> bool {
        self.context
            .settings()
            .exclude
            .iter()
            .any(|excluded| excluded == name.as_str())
    }

    fn is_skipped(&self, name: &ModuleName) -> bool {
        self.context
            .settings()
            .skip_pattern
            .as_ref()
            .is_some_and(|pattern| name.as_str().contains(pattern.as_str()))
    }
}
