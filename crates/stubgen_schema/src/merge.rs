//! Merge of the analyzed model with hand-authored schema entries.
//!
//! Precedence is asymmetric: schema entries carry curated knowledge, so an
//! explicitly-typed schema entry survives (`keep-types`), entries tagged
//! `StubGen_Extra` are never touched, and analysis fills every hole it can.
//! Mismatches warn and never interrupt the merge.

use indexmap::IndexMap;

use stubgen_lua_semantic::{
    AnalyzerSettings, ResolvedClass, ResolvedField, ResolvedFunction, ResolvedModule,
    ResolvedTable,
};

use crate::model::{
    ClassEntry, ConstructorEntry, FieldEntry, FunctionEntry, LuaLanguage, ParameterEntry,
    ReturnEntry, TableEntry,
};
use crate::tags;

/// The merged language section plus every warning the merge produced.
#[derive(Clone, Debug, Default)]
pub struct MergeOutcome {
    pub language: LuaLanguage,
    pub warnings: Vec<String>,
}

/// Merges analyzed modules over an optional pre-existing schema section.
pub fn merge_modules(
    schema: Option<&LuaLanguage>,
    modules: &[ResolvedModule],
    settings: &AnalyzerSettings,
) -> MergeOutcome {
    let _span = tracing::trace_span!("merge_modules").entered();

    let mut language = schema.cloned().unwrap_or_default();
    let mut warnings = Vec::new();

    let mut analyzed_classes: Vec<&str> = Vec::new();

    for module in modules {
        for class in &module.classes {
            analyzed_classes.push(class.name.as_str());
            merge_class(&mut language.classes, class, settings, &mut warnings);
        }
        for table in &module.tables {
            merge_table(&mut language.tables, table, settings);
        }
        for function in &module.functions {
            merge_function(&mut language.functions, function, settings, &mut warnings);
        }
        merge_fields_from(&mut language.fields, &module.fields, settings);
    }

    // Curated entries nothing in the source backs any more are worth a
    // look; `StubGen_Extra` opts out of the check.
    for (name, entry) in &language.classes {
        if !analyzed_classes.contains(&name.as_str()) && !tags::has_tag(&entry.tags, tags::EXTRA) {
            let warning = format!("schema class `{name}` has no analyzed counterpart");
            tracing::warn!("{warning}");
            warnings.push(warning);
        }
    }

    MergeOutcome { language, warnings }
}

fn merge_class(
    classes: &mut IndexMap<String, ClassEntry>,
    analyzed: &ResolvedClass,
    settings: &AnalyzerSettings,
    warnings: &mut Vec<String>,
) {
    match classes.get_mut(analyzed.name.as_str()) {
        Some(entry) => {
            if tags::has_tag(&entry.tags, tags::EXTRA) {
                return;
            }
            if entry.extends.is_none() {
                entry.extends = analyzed.extends.as_ref().map(ToString::to_string);
            }
            merge_field_map(&mut entry.fields, &analyzed.fields, settings);
            merge_field_map(&mut entry.static_fields, &analyzed.static_fields, settings);
            merge_function_list(&mut entry.methods, &analyzed.methods, settings, warnings);
            merge_function_list(
                &mut entry.static_methods,
                &analyzed.static_methods,
                settings,
                warnings,
            );
            merge_constructors(entry, analyzed, settings, warnings);
        }
        None => {
            if settings.inject && !settings.rosetta_only {
                classes.insert(analyzed.name.to_string(), class_entry(analyzed, settings));
            }
        }
    }
}

fn merge_table(
    tables: &mut IndexMap<String, TableEntry>,
    analyzed: &ResolvedTable,
    settings: &AnalyzerSettings,
) {
    match tables.get_mut(analyzed.name.as_str()) {
        Some(entry) => {
            if tags::has_tag(&entry.tags, tags::EXTRA) {
                return;
            }
            merge_field_map(&mut entry.fields, &analyzed.fields, settings);
            for function in &analyzed.functions {
                if let Some(existing) = entry
                    .static_methods
                    .iter_mut()
                    .find(|candidate| candidate.name == function.name.as_str())
                {
                    fill_function(existing, function, settings);
                } else if settings.inject {
                    entry.static_methods.push(function_entry(function));
                }
            }
        }
        None => {
            if settings.inject && !settings.rosetta_only {
                tables.insert(analyzed.name.to_string(), table_entry(analyzed, settings));
            }
        }
    }
}

fn merge_function(
    functions: &mut Vec<FunctionEntry>,
    analyzed: &ResolvedFunction,
    settings: &AnalyzerSettings,
    warnings: &mut Vec<String>,
) {
    if let Some(entry) = functions
        .iter_mut()
        .find(|candidate| candidate.name == analyzed.name.as_str())
    {
        if tags::has_tag(&entry.tags, tags::EXTRA) {
            return;
        }
        if !entry.parameters.is_empty() && entry.parameters.len() != analyzed.parameters.len() {
            let warning = format!(
                "function `{}`: schema declares {} parameters, analysis found {}",
                analyzed.name,
                entry.parameters.len(),
                analyzed.parameters.len()
            );
            tracing::warn!("{warning}");
            warnings.push(warning);
        }
        fill_function(entry, analyzed, settings);
    } else if settings.inject && !settings.rosetta_only {
        functions.push(function_entry(analyzed));
    }
}

fn merge_function_list(
    functions: &mut Vec<FunctionEntry>,
    analyzed: &[ResolvedFunction],
    settings: &AnalyzerSettings,
    warnings: &mut Vec<String>,
) {
    for function in analyzed {
        merge_function(functions, function, settings, warnings);
    }
}

fn merge_constructors(
    entry: &mut ClassEntry,
    analyzed: &ResolvedClass,
    settings: &AnalyzerSettings,
    warnings: &mut Vec<String>,
) {
    if analyzed.constructors.is_empty() {
        if settings.rosetta_only && !entry.constructors.is_empty() {
            // Nothing analyzed to check the curated arity against; the
            // entry stays as written.
            let warning = format!(
                "class `{}`: constructor arity not verifiable without an analyzed constructor",
                analyzed.name
            );
            tracing::warn!("{warning}");
            warnings.push(warning);
        }
        return;
    }

    for constructor in &analyzed.constructors {
        if let Some(existing) = entry
            .constructors
            .iter_mut()
            .find(|candidate| candidate.parameters.len() == constructor.parameters.len())
        {
            for (parameter, analyzed_parameter) in existing
                .parameters
                .iter_mut()
                .zip(&constructor.parameters)
            {
                fill_parameter(parameter, &analyzed_parameter.types, settings);
            }
        } else if entry.constructors.is_empty() && settings.inject {
            entry.constructors.push(ConstructorEntry {
                parameters: constructor.parameters.iter().map(parameter_entry).collect(),
                ..ConstructorEntry::default()
            });
        } else if !entry.constructors.is_empty() {
            let warning = format!(
                "class `{}`: no schema constructor matches arity {}",
                analyzed.name,
                constructor.parameters.len()
            );
            tracing::warn!("{warning}");
            warnings.push(warning);
        }
    }
}

fn merge_field_map(
    fields: &mut IndexMap<String, FieldEntry>,
    analyzed: &[ResolvedField],
    settings: &AnalyzerSettings,
) {
    merge_fields_from(fields, analyzed, settings);
}

fn merge_fields_from(
    fields: &mut IndexMap<String, FieldEntry>,
    analyzed: &[ResolvedField],
    settings: &AnalyzerSettings,
) {
    for field in analyzed {
        match fields.get_mut(field.name.as_str()) {
            Some(entry) => {
                if tags::has_tag(&entry.tags, tags::EXTRA) {
                    continue;
                }
                let schema_wins = settings.keep_types && !entry.types.is_empty();
                if !schema_wins && !is_unknown_only(&field.types) {
                    entry.types = field.types.clone();
                }
                if entry.nullable.is_none() && field.nullable {
                    entry.nullable = Some(true);
                }
            }
            None => {
                if !settings.inject {
                    continue;
                }
                if settings.delete_unknown && is_unknown_only(&field.types) {
                    continue;
                }
                fields.insert(field.name.to_string(), field_entry(field));
            }
        }
    }
}

/// Fills the holes of a schema function from its analyzed counterpart;
/// explicitly-typed schema slots survive under `keep-types`.
fn fill_function(
    entry: &mut FunctionEntry,
    analyzed: &ResolvedFunction,
    settings: &AnalyzerSettings,
) {
    if entry.parameters.is_empty() {
        entry.parameters = analyzed.parameters.iter().map(parameter_entry).collect();
    } else {
        for (parameter, analyzed_parameter) in
            entry.parameters.iter_mut().zip(&analyzed.parameters)
        {
            fill_parameter(parameter, &analyzed_parameter.types, settings);
        }
    }

    if entry.returns.is_empty() {
        entry.returns = analyzed.returns.iter().map(|types| return_entry(types)).collect();
    } else {
        for (position, analyzed_types) in entry.returns.iter_mut().zip(&analyzed.returns) {
            let schema_wins = settings.keep_types && !position.types.is_empty();
            if !schema_wins && !is_unknown_only(analyzed_types) {
                let (types, nullable) = split_nil(analyzed_types);
                position.types = types;
                if position.nullable.is_none() && nullable {
                    position.nullable = Some(true);
                }
            }
        }
    }
}

fn fill_parameter(entry: &mut ParameterEntry, types: &[String], settings: &AnalyzerSettings) {
    let schema_wins = settings.keep_types && !entry.types.is_empty();
    if !schema_wins && !is_unknown_only(types) {
        let (types, nullable) = split_nil(types);
        entry.types = types;
        if entry.nullable.is_none() && nullable {
            entry.nullable = Some(true);
        }
    }
}

fn is_unknown_only(types: &[String]) -> bool {
    types.is_empty() || types.iter().all(|ty| ty == "unknown")
}

/// Splits `nil` out of a type list into a nullability flag.
fn split_nil(types: &[String]) -> (Vec<String>, bool) {
    let nullable = types.iter().any(|ty| ty == "nil");
    let types = types.iter().filter(|ty| *ty != "nil").cloned().collect();
    (types, nullable)
}

// --- conversions ------------------------------------------------------------

fn class_entry(class: &ResolvedClass, settings: &AnalyzerSettings) -> ClassEntry {
    ClassEntry {
        extends: class.extends.as_ref().map(ToString::to_string),
        is_local: class.is_local.then_some(true),
        constructors: class
            .constructors
            .iter()
            .map(|constructor| ConstructorEntry {
                parameters: constructor.parameters.iter().map(parameter_entry).collect(),
                ..ConstructorEntry::default()
            })
            .collect(),
        fields: field_map(&class.fields, settings),
        static_fields: field_map(&class.static_fields, settings),
        methods: class.methods.iter().map(function_entry).collect(),
        static_methods: class.static_methods.iter().map(function_entry).collect(),
        ..ClassEntry::default()
    }
}

fn table_entry(table: &ResolvedTable, settings: &AnalyzerSettings) -> TableEntry {
    TableEntry {
        fields: field_map(&table.fields, settings),
        static_methods: table.functions.iter().map(function_entry).collect(),
        ..TableEntry::default()
    }
}

fn field_map(
    fields: &[ResolvedField],
    settings: &AnalyzerSettings,
) -> IndexMap<String, FieldEntry> {
    fields
        .iter()
        .filter(|field| !(settings.delete_unknown && is_unknown_only(&field.types)))
        .map(|field| (field.name.to_string(), field_entry(field)))
        .collect()
}

fn field_entry(field: &ResolvedField) -> FieldEntry {
    FieldEntry {
        types: field.types.clone(),
        nullable: field.nullable.then_some(true),
        ..FieldEntry::default()
    }
}

fn function_entry(function: &ResolvedFunction) -> FunctionEntry {
    FunctionEntry {
        name: function.name.to_string(),
        parameters: function.parameters.iter().map(parameter_entry).collect(),
        returns: function.returns.iter().map(|types| return_entry(types)).collect(),
        ..FunctionEntry::default()
    }
}

fn parameter_entry(parameter: &stubgen_lua_semantic::ResolvedParameter) -> ParameterEntry {
    let (types, nullable) = split_nil(&parameter.types);
    ParameterEntry {
        name: parameter.name.to_string(),
        types: types.into_iter().filter(|ty| ty != "unknown").collect(),
        nullable: nullable.then_some(true),
        notes: None,
    }
}

fn return_entry(types: &[String]) -> ReturnEntry {
    let (types, nullable) = split_nil(types);
    ReturnEntry {
        types,
        nullable: nullable.then_some(true),
        notes: None,
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use stubgen_lua_semantic::{
        AnalyzerSettings, ResolvedClass, ResolvedField, ResolvedFunction, ResolvedModule,
        ResolvedParameter,
    };

    use super::merge_modules;
    use crate::model::{ClassEntry, FieldEntry, LuaLanguage};
    use crate::tags;

    fn field(name: &str, types: &[&str]) -> ResolvedField {
        ResolvedField {
            name: name.into(),
            types: types.iter().map(ToString::to_string).collect(),
            nullable: false,
        }
    }

    fn module_with_class(class: ResolvedClass) -> ResolvedModule {
        ResolvedModule {
            classes: vec![class],
            ..ResolvedModule::default()
        }
    }

    #[test]
    fn analysis_injects_missing_classes() {
        let class = ResolvedClass {
            name: "Foo".into(),
            extends: Some("Base".into()),
            static_fields: vec![field("count", &["number"])],
            ..ResolvedClass::default()
        };
        let outcome = merge_modules(
            None,
            &[module_with_class(class)],
            &AnalyzerSettings::default(),
        );

        let entry = &outcome.language.classes["Foo"];
        assert_eq!(entry.extends.as_deref(), Some("Base"));
        assert_eq!(entry.static_fields["count"].types, ["number"]);
    }

    #[test]
    fn inject_off_leaves_schema_untouched() {
        let settings = AnalyzerSettings {
            inject: false,
            ..AnalyzerSettings::default()
        };
        let class = ResolvedClass {
            name: "Foo".into(),
            ..ResolvedClass::default()
        };
        let outcome = merge_modules(None, &[module_with_class(class)], &settings);
        assert!(outcome.language.classes.is_empty());
    }

    #[test]
    fn keep_types_preserves_schema_field_types() {
        let mut schema = LuaLanguage::default();
        let mut entry = ClassEntry::default();
        entry.fields.insert(
            "x".to_string(),
            FieldEntry {
                types: vec!["Vector2".to_string()],
                ..FieldEntry::default()
            },
        );
        schema.classes.insert("Foo".to_string(), entry);

        let class = ResolvedClass {
            name: "Foo".into(),
            fields: vec![field("x", &["number"])],
            ..ResolvedClass::default()
        };

        let settings = AnalyzerSettings {
            keep_types: true,
            ..AnalyzerSettings::default()
        };
        let outcome = merge_modules(Some(&schema), &[module_with_class(class)], &settings);
        assert_eq!(outcome.language.classes["Foo"].fields["x"].types, ["Vector2"]);
    }

    #[test]
    fn without_keep_types_analysis_refreshes_field_types() {
        let mut schema = LuaLanguage::default();
        let mut entry = ClassEntry::default();
        entry.fields.insert(
            "x".to_string(),
            FieldEntry {
                types: vec!["Vector2".to_string()],
                ..FieldEntry::default()
            },
        );
        schema.classes.insert("Foo".to_string(), entry);

        let class = ResolvedClass {
            name: "Foo".into(),
            fields: vec![field("x", &["number"])],
            ..ResolvedClass::default()
        };

        let outcome = merge_modules(
            Some(&schema),
            &[module_with_class(class)],
            &AnalyzerSettings::default(),
        );
        assert_eq!(outcome.language.classes["Foo"].fields["x"].types, ["number"]);
    }

    #[test]
    fn extra_entries_are_never_touched() {
        let mut schema = LuaLanguage::default();
        let mut entry = ClassEntry {
            tags: vec![tags::EXTRA.to_string()],
            ..ClassEntry::default()
        };
        entry.fields.insert(
            "x".to_string(),
            FieldEntry {
                types: vec!["Vector2".to_string()],
                ..FieldEntry::default()
            },
        );
        schema.classes.insert("Legacy".to_string(), entry.clone());

        let class = ResolvedClass {
            name: "Legacy".into(),
            fields: vec![field("x", &["number"])],
            ..ResolvedClass::default()
        };

        let outcome = merge_modules(
            Some(&schema),
            &[module_with_class(class)],
            &AnalyzerSettings::default(),
        );
        assert_eq!(outcome.language.classes["Legacy"], entry);
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn unknown_schema_classes_warn_unless_extra() {
        let mut schema = LuaLanguage::default();
        schema
            .classes
            .insert("Orphan".to_string(), ClassEntry::default());
        schema.classes.insert(
            "Vendored".to_string(),
            ClassEntry {
                tags: vec![tags::EXTRA.to_string()],
                ..ClassEntry::default()
            },
        );

        let outcome = merge_modules(Some(&schema), &[], &AnalyzerSettings::default());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("Orphan"));
    }

    #[test]
    fn arity_mismatch_warns_but_merges() {
        let mut schema = LuaLanguage::default();
        schema.functions.push(crate::model::FunctionEntry {
            name: "draw".to_string(),
            parameters: vec![crate::model::ParameterEntry {
                name: "x".to_string(),
                ..crate::model::ParameterEntry::default()
            }],
            ..crate::model::FunctionEntry::default()
        });

        let function = ResolvedFunction {
            name: "draw".into(),
            parameters: vec![
                ResolvedParameter {
                    name: "x".into(),
                    types: vec!["number".to_string()],
                },
                ResolvedParameter {
                    name: "y".into(),
                    types: vec!["number".to_string()],
                },
            ],
            ..ResolvedFunction::default()
        };
        let module = ResolvedModule {
            functions: vec![function],
            ..ResolvedModule::default()
        };

        let outcome = merge_modules(Some(&schema), &[module], &AnalyzerSettings::default());
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("draw"));
        assert_eq!(outcome.language.functions[0].parameters[0].types, ["number"]);
    }

    #[test]
    fn delete_unknown_skips_unknown_only_fields() {
        let module = ResolvedModule {
            fields: vec![field("Mystery", &["unknown"]), field("Known", &["string"])],
            ..ResolvedModule::default()
        };
        let outcome = merge_modules(None, &[module], &AnalyzerSettings::default());
        assert!(!outcome.language.fields.contains_key("Mystery"));
        assert!(outcome.language.fields.contains_key("Known"));
    }

    #[test]
    fn rosetta_only_warns_on_unverifiable_constructors() {
        let mut schema = LuaLanguage::default();
        schema.classes.insert(
            "Foo".to_string(),
            ClassEntry {
                constructors: vec![crate::model::ConstructorEntry::default()],
                ..ClassEntry::default()
            },
        );

        let class = ResolvedClass {
            name: "Foo".into(),
            ..ResolvedClass::default()
        };
        let settings = AnalyzerSettings {
            rosetta_only: true,
            ..AnalyzerSettings::default()
        };
        let outcome = merge_modules(Some(&schema), &[module_with_class(class)], &settings);
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("constructor arity"));
        assert_eq!(outcome.language.classes["Foo"].constructors.len(), 1);
    }
}
