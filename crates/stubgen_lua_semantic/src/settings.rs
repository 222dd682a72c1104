/// Toggles and filters for an analysis run.
///
/// Owned by the driver and consulted throughout the pipeline; the defaults
/// match what the command-line shell exposes.
#[derive(Clone, Debug)]
pub struct AnalyzerSettings {
    /// Subdirectory prefixes, in analysis order. An empty list means every
    /// top-level subdirectory, sorted case-insensitively.
    pub subdirectories: Vec<String>,
    /// Infer parameter types from well-known parameter names.
    pub heuristics: bool,
    /// Schema-provided types win over analyzed types when merging.
    pub keep_types: bool,
    /// Inject analyzed entries that have no schema counterpart.
    pub inject: bool,
    /// Only emit entries backed by schema files; analysis fills in details.
    pub rosetta_only: bool,
    /// Drop analysis-only entries whose every type resolved to `unknown`.
    pub delete_unknown: bool,
    /// Suppress fields that were never assigned a resolvable type.
    pub strict_fields: bool,
    /// On an ambiguous require, depend on every candidate instead of none.
    pub ambiguity: bool,
    /// Sort emitted classes, functions, and fields alphabetically.
    pub alphabetize: bool,
    pub include_kahlua: bool,
    pub include_large_defs: bool,
    /// Substring marking helper files whose globals merge into their owner.
    pub helper_pattern: Option<String>,
    /// Substring marking files to order but not analyze.
    pub skip_pattern: Option<String>,
    /// Extra file identifiers appended after the subdirectory partitions.
    pub extra_files: Vec<String>,
    /// File identifiers removed from the input set before ordering.
    pub exclude: Vec<String>,
    /// Field names never emitted.
    pub exclude_fields: Vec<String>,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            subdirectories: vec![
                "shared".to_string(),
                "client".to_string(),
                "server".to_string(),
            ],
            heuristics: true,
            keep_types: false,
            inject: true,
            rosetta_only: false,
            delete_unknown: true,
            strict_fields: true,
            ambiguity: true,
            alphabetize: true,
            include_kahlua: false,
            include_large_defs: false,
            helper_pattern: None,
            skip_pattern: None,
            extra_files: Vec::new(),
            exclude: Vec::new(),
            exclude_fields: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AnalyzerSettings;

    #[test]
    fn defaults() {
        let settings = AnalyzerSettings::default();
        assert_eq!(settings.subdirectories, ["shared", "client", "server"]);
        assert!(settings.heuristics);
        assert!(settings.inject);
        assert!(settings.delete_unknown);
        assert!(settings.strict_fields);
        assert!(settings.ambiguity);
        assert!(settings.alphabetize);
        assert!(!settings.keep_types);
        assert!(!settings.rosetta_only);
    }
}
