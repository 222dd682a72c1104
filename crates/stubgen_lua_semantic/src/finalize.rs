//! Conversion of the resolved internal model into the user-facing module
//! output: synthetic markers become class names, `function` labels, or
//! `unknown`; per-module entity lists are assembled and ordered.

use rustc_hash::FxHashSet;
use stubgen_lua_ast::Name;

use crate::context::AnalysisContext;
use crate::expression::{Expression, Literal};
use crate::ids::{Id, IdKind};
use crate::module_name::ModuleName;
use crate::types::resolve::{resolve_expression, Seen};
use crate::types::{Type, TypeSet};

/// A fully finalized module: everything the stub emitter and the schema
/// writer consume.
#[derive(Clone, Debug, Default)]
pub struct ResolvedModule {
    pub name: Option<ModuleName>,
    pub tags: Vec<Name>,
    pub prefix: Option<Name>,
    pub classes: Vec<ResolvedClass>,
    pub tables: Vec<ResolvedTable>,
    pub functions: Vec<ResolvedFunction>,
    pub fields: Vec<ResolvedField>,
    /// User-facing type names per return position.
    pub returns: Vec<Vec<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedClass {
    pub name: Name,
    pub extends: Option<Name>,
    pub derive_name: Option<Name>,
    pub is_local: bool,
    pub fields: Vec<ResolvedField>,
    pub static_fields: Vec<ResolvedField>,
    pub constructors: Vec<ResolvedFunction>,
    pub methods: Vec<ResolvedFunction>,
    pub static_methods: Vec<ResolvedFunction>,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedTable {
    pub name: Name,
    pub fields: Vec<ResolvedField>,
    pub functions: Vec<ResolvedFunction>,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedFunction {
    pub name: Name,
    pub parameters: Vec<ResolvedParameter>,
    pub returns: Vec<Vec<String>>,
    pub is_method: bool,
    pub is_constructor: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedParameter {
    pub name: Name,
    pub types: Vec<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedField {
    pub name: Name,
    pub types: Vec<String>,
    pub nullable: bool,
}

/// Finalizes every analyzed module, in analysis order. Helper files feed
/// the analysis but produce no output of their own.
pub(crate) fn finalize_modules(
    context: &mut AnalysisContext,
    order: &[ModuleName],
) -> Vec<ResolvedModule> {
    let _span = tracing::trace_span!("finalize_modules").entered();

    let mut output = Vec::new();
    for name in order {
        let analyzed = context
            .module(name)
            .is_some_and(|module| module.resolved.is_some());
        if !analyzed {
            continue;
        }
        let is_helper = context
            .settings()
            .helper_pattern
            .as_ref()
            .is_some_and(|pattern| name.as_str().contains(pattern.as_str()));
        if is_helper {
            continue;
        }
        output.push(finalize_module(context, name));
    }
    output
}

fn finalize_module(context: &mut AnalysisContext, name: &ModuleName) -> ResolvedModule {
    let module = context.module(name).expect("module to be registered");
    let resolved = module
        .resolved
        .clone()
        .expect("module to have a resolved scope");
    let tags = module.tags.clone();
    let prefix = module.prefix.clone();
    let module_returns = module.returns.clone();

    // Classes can surface twice: once through the scope tree and once
    // through the module's seen set. Table id is the identity.
    let mut class_ids: Vec<Id> = Vec::new();
    let mut seen_ids: FxHashSet<Id> = FxHashSet::default();
    for id in resolved.classes.iter().chain(&context.module(name).expect("module").seen_classes) {
        if seen_ids.insert(id.clone()) {
            class_ids.push(id.clone());
        }
    }

    let mut output = ResolvedModule {
        name: Some(name.clone()),
        tags,
        prefix,
        ..ResolvedModule::default()
    };

    for class_id in class_ids {
        let Some(info) = context.table_info(&class_id) else {
            continue;
        };
        if !info.is_class() || info.is_empty_class {
            continue;
        }
        if info.emit_as_table {
            // A suppressed class still surfaces, just as a plain table.
            let table_name = info
                .class_name
                .clone()
                .unwrap_or_else(|| class_id.name().clone());
            output
                .tables
                .push(finalize_table(context, &table_name, &class_id));
        } else {
            output.classes.push(finalize_class(context, &class_id));
        }
    }

    for (table_name, table_id) in &resolved.tables {
        let plain = context
            .table_info(table_id)
            .is_some_and(|info| !info.is_class() && !info.is_empty_class);
        if plain {
            output
                .tables
                .push(finalize_table(context, table_name, table_id));
        }
    }

    for (function_name, function_id) in &resolved.functions {
        output
            .functions
            .push(finalize_function(context, function_name, function_id));
    }

    for (field_name, types) in &resolved.fields {
        if let Some(field) = finalize_field(context, field_name, types) {
            output.fields.push(field);
        }
    }

    output.returns = module_returns
        .iter()
        .map(|position| finalize_type_set(context, &position.types))
        .collect();

    if context.settings().alphabetize {
        alphabetize(&mut output);
    }
    output
}

fn finalize_class(context: &mut AnalysisContext, class_id: &Id) -> ResolvedClass {
    let info = context
        .table_info(class_id)
        .expect("class table info to exist")
        .clone();
    let mut class = ResolvedClass {
        name: info.class_name.clone().unwrap_or_else(|| class_id.name().clone()),
        extends: info.original_base.clone(),
        derive_name: info.original_derive_name.clone(),
        is_local: info.is_local_class,
        ..ResolvedClass::default()
    };

    for (field_key, definitions) in &info.definitions {
        let field_name = Name::new(field_key.as_str());
        if field_name == "__index" || is_excluded_field(context, &field_name) {
            continue;
        }

        // The newest function definition wins for callables; everything
        // else unions.
        let function = definitions.iter().rev().find_map(|definition| {
            match context.expression(definition.expression) {
                Expression::Literal(Literal::Function { function_id, .. }) => {
                    Some(function_id.clone())
                }
                _ => None,
            }
        });

        if let Some(function_id) = function {
            let resolved = finalize_function(context, &field_name, &function_id);
            if resolved.is_constructor {
                class.constructors.push(resolved);
            } else if resolved.is_method {
                class.methods.push(resolved);
            } else {
                class.static_methods.push(resolved);
            }
            continue;
        }

        let instance = definitions.iter().any(|definition| definition.instance);
        let mut types = TypeSet::default();
        for definition in definitions.clone() {
            let mut seen = Seen::default();
            types.extend(resolve_expression(context, &definition, &mut seen));
        }
        if let Some(field) = finalize_field(context, &field_name, &types) {
            if instance {
                class.fields.push(field);
            } else {
                class.static_fields.push(field);
            }
        }
    }

    class
}

fn finalize_table(context: &mut AnalysisContext, name: &Name, table_id: &Id) -> ResolvedTable {
    let info = context
        .table_info(table_id)
        .expect("table info to exist")
        .clone();
    let mut table = ResolvedTable {
        name: name.clone(),
        ..ResolvedTable::default()
    };

    for (field_key, definitions) in &info.definitions {
        let field_name = Name::new(field_key.as_str());
        if is_excluded_field(context, &field_name) {
            continue;
        }

        let function = definitions.iter().rev().find_map(|definition| {
            match context.expression(definition.expression) {
                Expression::Literal(Literal::Function { function_id, .. }) => {
                    Some(function_id.clone())
                }
                _ => None,
            }
        });
        if let Some(function_id) = function {
            table
                .functions
                .push(finalize_function(context, &field_name, &function_id));
            continue;
        }

        let mut types = TypeSet::default();
        for definition in definitions.clone() {
            let mut seen = Seen::default();
            types.extend(resolve_expression(context, &definition, &mut seen));
        }
        if let Some(field) = finalize_field(context, &field_name, &types) {
            table.fields.push(field);
        }
    }

    table
}

fn finalize_function(
    context: &mut AnalysisContext,
    name: &Name,
    function_id: &Id,
) -> ResolvedFunction {
    let info = context
        .function_info(function_id)
        .cloned()
        .unwrap_or_default();

    ResolvedFunction {
        name: name.clone(),
        parameters: info
            .parameters
            .iter()
            .map(|parameter| ResolvedParameter {
                name: parameter.name.clone(),
                types: finalize_type_set(context, &parameter.types),
            })
            .collect(),
        returns: info
            .returns
            .iter()
            .map(|position| finalize_type_set(context, &position.types))
            .collect(),
        is_method: info.is_method || info.self_parameter.is_some(),
        is_constructor: info.is_constructor,
    }
}

/// `None` when the field should be suppressed entirely.
fn finalize_field(
    context: &AnalysisContext,
    name: &Name,
    types: &TypeSet,
) -> Option<ResolvedField> {
    if types.is_empty() && context.settings().strict_fields {
        return None;
    }
    let mut finalized = finalize_type_set(context, types);
    let nullable = finalized.iter().any(|ty| ty == "nil");
    finalized.retain(|ty| ty != "nil");
    if finalized.is_empty() {
        finalized.push("unknown".to_string());
    }
    Some(ResolvedField {
        name: name.clone(),
        types: finalized,
        nullable,
    })
}

fn is_excluded_field(context: &AnalysisContext, name: &Name) -> bool {
    context
        .settings()
        .exclude_fields
        .iter()
        .any(|excluded| excluded == name.as_str())
}

/// Maps each remaining internal term to its user-facing name, preserving
/// first-seen order and dropping duplicates.
pub(crate) fn finalize_type_set(context: &AnalysisContext, types: &TypeSet) -> Vec<String> {
    let mut active = FxHashSet::default();
    let mut result = Vec::new();
    finalize_into(context, types, &mut active, &mut result);
    if result.is_empty() {
        result.push("unknown".to_string());
    }
    result
}

fn finalize_into(
    context: &AnalysisContext,
    types: &TypeSet,
    active: &mut FxHashSet<Id>,
    result: &mut Vec<String>,
) {
    let mut push = |value: String, result: &mut Vec<String>| {
        if !result.contains(&value) {
            result.push(value);
        }
    };

    for ty in types {
        match ty {
            Type::Marker(id) => match id.kind() {
                IdKind::Table => {
                    if let Some(name) = context
                        .table_info(id)
                        .and_then(|info| info.class_name.clone())
                    {
                        push(name.to_string(), result);
                    }
                    // A table that never became a class has no name to
                    // offer and is dropped.
                }
                IdKind::Instance => {
                    let class_name = context
                        .instance_class(id)
                        .and_then(|table| context.table_info(table))
                        .and_then(|info| info.class_name.clone());
                    if let Some(name) = class_name {
                        push(name.to_string(), result);
                    }
                }
                IdKind::Function => push("function".to_string(), result),
                IdKind::Parameter | IdKind::SelfParameter => {
                    // Resolve through the declaring function's accumulated
                    // parameter types; the guard breaks marker cycles.
                    if active.insert(id.clone()) {
                        if let Some(accumulated) = context.parameter_types(id) {
                            finalize_into(context, accumulated, active, result);
                        }
                        active.remove(id);
                    }
                }
                IdKind::Module | IdKind::Local => push("unknown".to_string(), result),
            },
            Type::True | Type::False => push("boolean".to_string(), result),
            other => push(other.to_string(), result),
        }
    }
}

fn alphabetize(output: &mut ResolvedModule) {
    let by_name = |name: &Name| name.to_lowercase();

    output.classes.sort_by_key(|class| by_name(&class.name));
    output.tables.sort_by_key(|table| by_name(&table.name));
    output.functions.sort_by_key(|function| by_name(&function.name));
    output.fields.sort_by_key(|field| by_name(&field.name));

    for class in &mut output.classes {
        class.fields.sort_by_key(|field| by_name(&field.name));
        class.static_fields.sort_by_key(|field| by_name(&field.name));
        class.methods.sort_by_key(|method| by_name(&method.name));
        class
            .static_methods
            .sort_by_key(|method| by_name(&method.name));
    }
    for table in &mut output.tables {
        table.fields.sort_by_key(|field| by_name(&field.name));
        table.functions.sort_by_key(|function| by_name(&function.name));
    }
}
