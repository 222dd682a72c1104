//! Fixed-point resolution of expression type sets.
//!
//! `resolve_expression` is re-entrant on cycles: the `seen` map carries the
//! running partial set for every `(expression, index)` pair on the current
//! resolution path, and a second entry returns that partial set instead of
//! descending again. The map is a per-call parameter, never stored.

use rustc_hash::FxHashMap;
use stubgen_lua_ast::{Indexer, LogicalOp, UnaryOp};

use crate::context::AnalysisContext;
use crate::expression::{Expression, ExpressionId, ExpressionInfo, Literal, Operator, ReferenceKey};
use crate::ids::{Id, IdKind};
use crate::info::FieldKey;
use crate::module_name::ModuleName;
use crate::scope::{
    AssignmentItem, RequireAssignmentItem, ResolvedReturn, ResolvedScope, ReturnsItem, Scope,
    ScopeItem, ScopeKind,
};
use crate::types::heuristics::apply_parameter_heuristics;
use crate::types::{collapse_booleans, narrow, Type, TypeSet};

pub(crate) type Seen = FxHashMap<(ExpressionId, usize), TypeSet>;

/// Resolves the possible types of one expression at one return position.
pub(crate) fn resolve_expression(
    context: &mut AnalysisContext,
    info: &ExpressionInfo,
    seen: &mut Seen,
) -> TypeSet {
    let key = (info.expression, info.index);
    if let Some(partial) = seen.get(&key) {
        return partial.clone();
    }
    seen.insert(key, TypeSet::default());

    let expression = context.expression(info.expression).clone();
    let mut types = match expression {
        Expression::Literal(literal) => resolve_literal(&literal),
        Expression::Operation {
            operator,
            arguments,
        } => resolve_operation(context, operator, &arguments, info.index, seen),
        Expression::Reference { key } => resolve_reference(context, &key, seen),
        Expression::Member { base, member, .. } => {
            resolve_member_access(context, base, &FieldKey::name(member), seen)
        }
        Expression::Index { base, index } => resolve_index_access(context, base, index, seen),
        Expression::Require { module } => resolve_require(context, &module, info.index),
    };

    if info.instance {
        types = instantiate(context, types);
    }

    if let Some(usage) = context.usage(info.expression) {
        let kinds = usage.candidate_kinds();
        narrow(&mut types, kinds);
    }
    collapse_booleans(&mut types);

    let entry = seen
        .get_mut(&key)
        .expect("seen entry inserted at resolution entry");
    entry.extend(types.iter().cloned());
    entry.clone()
}

fn resolve_literal(literal: &Literal) -> TypeSet {
    let ty = match literal {
        Literal::Nil => Type::Nil,
        Literal::Boolean(true) => Type::True,
        Literal::Boolean(false) => Type::False,
        Literal::Number(_) => Type::Number,
        Literal::String(_) => Type::String,
        Literal::Vararg => Type::Unknown,
        Literal::Table { table_id } => Type::Marker(table_id.clone()),
        Literal::Function { function_id, .. } => Type::Marker(function_id.clone()),
    };
    [ty].into_iter().collect()
}

fn resolve_reference(context: &mut AnalysisContext, key: &ReferenceKey, seen: &mut Seen) -> TypeSet {
    let mut types = TypeSet::default();
    if let ReferenceKey::Id(id) = key {
        match id.kind() {
            IdKind::Parameter | IdKind::SelfParameter => {
                types.insert(Type::Marker(id.clone()));
                if let Some(accumulated) = context.parameter_types(id) {
                    types.extend(accumulated.iter().cloned());
                }
            }
            IdKind::Function | IdKind::Instance => {
                types.insert(Type::Marker(id.clone()));
            }
            IdKind::Module | IdKind::Table | IdKind::Local => {}
        }
    }
    for definition in context.definitions(key).to_vec() {
        types.extend(resolve_expression(context, &definition, seen));
    }
    types
}

fn resolve_member_access(
    context: &mut AnalysisContext,
    base: ExpressionId,
    field: &FieldKey,
    seen: &mut Seen,
) -> TypeSet {
    let base_info = ExpressionInfo::new(base);
    let base_types = resolve_expression(context, &base_info, seen);

    let mut types = TypeSet::default();
    for base_type in &base_types {
        let Some(id) = base_type.as_marker() else {
            continue;
        };
        let table_id = match id.kind() {
            IdKind::Table => Some(id.clone()),
            IdKind::Instance => context.instance_class(id).cloned(),
            _ => None,
        };
        let Some(table_id) = table_id else { continue };
        let definitions = context
            .table_info(&table_id)
            .map(|info| info.field_definitions(field).to_vec())
            .unwrap_or_default();
        for definition in definitions {
            types.extend(resolve_expression(context, &definition, seen));
        }
    }
    types
}

fn resolve_index_access(
    context: &mut AnalysisContext,
    base: ExpressionId,
    index: ExpressionId,
    seen: &mut Seen,
) -> TypeSet {
    // Only statically-known keys resolve; a dynamic index has no field to
    // look at.
    let field = match context.expression(index) {
        Expression::Literal(Literal::String(text)) => Some(FieldKey::name(text.clone())),
        Expression::Literal(Literal::Number(raw)) => Some(FieldKey::name(raw.clone())),
        _ => None,
    };
    match field {
        Some(field) => resolve_member_access(context, base, &field, seen),
        None => TypeSet::default(),
    }
}

fn resolve_require(context: &mut AnalysisContext, module: &ModuleName, index: usize) -> TypeSet {
    let Some(resolved) = context.resolve_module_name(module) else {
        return TypeSet::default();
    };
    context
        .module(&resolved)
        .and_then(|module| module.returns.get(index.saturating_sub(1)))
        .map(|position| position.types.clone())
        .unwrap_or_default()
}

fn resolve_operation(
    context: &mut AnalysisContext,
    operator: Operator,
    arguments: &[ExpressionId],
    index: usize,
    seen: &mut Seen,
) -> TypeSet {
    match operator {
        Operator::Call => resolve_call(context, arguments, index, seen),
        Operator::Unary(op) => match op {
            UnaryOp::Not => match arguments.first().and_then(|operand| {
                static_truthiness(context, *operand)
            }) {
                Some(true) => [Type::False].into_iter().collect(),
                Some(false) => [Type::True].into_iter().collect(),
                None => [Type::Boolean].into_iter().collect(),
            },
            UnaryOp::Neg | UnaryOp::BitNot | UnaryOp::Length => {
                [Type::Number].into_iter().collect()
            }
        },
        Operator::Binary(op) => {
            if op.is_concat() {
                [Type::String].into_iter().collect()
            } else if op.is_comparison() {
                [Type::Boolean].into_iter().collect()
            } else {
                [Type::Number].into_iter().collect()
            }
        }
        Operator::Logical(op) => resolve_logical(context, op, arguments, seen),
    }
}

fn resolve_logical(
    context: &mut AnalysisContext,
    op: LogicalOp,
    arguments: &[ExpressionId],
    seen: &mut Seen,
) -> TypeSet {
    let [left, right] = arguments else {
        return TypeSet::default();
    };
    let (left, right) = (*left, *right);

    match op {
        LogicalOp::And => match static_truthiness(context, left) {
            Some(true) => resolve_expression(context, &ExpressionInfo::new(right), seen),
            Some(false) => resolve_expression(context, &ExpressionInfo::new(left), seen),
            None => {
                let mut types = resolve_expression(context, &ExpressionInfo::new(left), seen);
                types.extend(resolve_expression(context, &ExpressionInfo::new(right), seen));
                types
            }
        },
        LogicalOp::Or => {
            // `X and Y or Z` is the ternary idiom: the union is over Y and
            // Z, not over X.
            let left_contribution = match ternary_branch(context, left) {
                Some(branch) => resolve_expression(context, &ExpressionInfo::new(branch), seen),
                None => resolve_expression(context, &ExpressionInfo::new(left), seen),
            };
            match static_truthiness(context, left) {
                Some(false) => resolve_expression(context, &ExpressionInfo::new(right), seen),
                _ => {
                    let mut types = left_contribution;
                    types.extend(resolve_expression(context, &ExpressionInfo::new(right), seen));
                    types
                }
            }
        }
    }
}

/// For an `and` operation, the branch it yields when its condition holds.
fn ternary_branch(context: &AnalysisContext, expression: ExpressionId) -> Option<ExpressionId> {
    match context.expression(expression) {
        Expression::Operation {
            operator: Operator::Logical(LogicalOp::And),
            arguments,
        } => arguments.get(1).copied(),
        _ => None,
    }
}

/// Literal-only truthiness: decidable only when the expression is itself a
/// literal.
fn static_truthiness(context: &AnalysisContext, expression: ExpressionId) -> Option<bool> {
    match context.expression(expression) {
        Expression::Literal(literal) => Some(literal.is_truthy()),
        _ => None,
    }
}

fn resolve_call(
    context: &mut AnalysisContext,
    arguments: &[ExpressionId],
    index: usize,
    seen: &mut Seen,
) -> TypeSet {
    let Some((&callee, call_arguments)) = arguments.split_first() else {
        return TypeSet::default();
    };
    let call_arguments = call_arguments.to_vec();

    if let Some(types) = intrinsic_call(context, callee) {
        return types;
    }

    let callee_types = resolve_expression(context, &ExpressionInfo::new(callee), seen);
    let callee_is_plain_member = matches!(
        context.expression(callee),
        Expression::Member {
            indexer: Indexer::Dot,
            ..
        }
    );

    let mut types = TypeSet::default();
    for callee_type in &callee_types {
        let Some(function_id) = callee_type
            .as_marker()
            .filter(|id| id.kind() == IdKind::Function)
            .cloned()
        else {
            continue;
        };

        accumulate_arguments(
            context,
            &function_id,
            &call_arguments,
            callee_is_plain_member,
            seen,
        );

        let Some(info) = context.function_info(&function_id) else {
            continue;
        };
        if info.is_constructor {
            // A constructor call produces the class and its instance
            // marker, regardless of what the body returns.
            let class_tables: Vec<Id> = info
                .returns
                .first()
                .map(|position| {
                    position
                        .types
                        .iter()
                        .filter_map(|ty| ty.as_table_id().cloned())
                        .collect()
                })
                .unwrap_or_default();
            for class_table in class_tables {
                let instance = context.instance_id_for(&class_table);
                types.insert(Type::Marker(class_table));
                types.insert(Type::Marker(instance));
            }
        } else {
            types.extend(info.return_types(index));
        }
    }
    types
}

/// Well-known callees with fixed return types.
fn intrinsic_call(context: &AnalysisContext, callee: ExpressionId) -> Option<TypeSet> {
    let name = context
        .expression(callee)
        .as_reference()
        .and_then(ReferenceKey::as_global)?;
    let types: TypeSet = match name.as_str() {
        "tonumber" => [Type::Number, Type::Nil].into_iter().collect(),
        "tostring" | "getText" => [Type::String].into_iter().collect(),
        "getTextOrNull" => [Type::String, Type::Nil].into_iter().collect(),
        _ => return None,
    };
    Some(types)
}

/// Feeds one call site's argument types into the callee's parameter sets.
fn accumulate_arguments(
    context: &mut AnalysisContext,
    function_id: &Id,
    call_arguments: &[ExpressionId],
    callee_is_plain_member: bool,
    seen: &mut Seen,
) {
    let has_receiver = context
        .function_info(function_id)
        .is_some_and(|info| info.self_parameter.is_some());

    // `C.m(self, ...)` passes the receiver explicitly.
    let (receiver_argument, positional) = if has_receiver && callee_is_plain_member {
        match call_arguments.split_first() {
            Some((&receiver, rest)) => (Some(receiver), rest),
            None => (None, call_arguments),
        }
    } else {
        (None, call_arguments)
    };

    if let Some(receiver) = receiver_argument {
        let receiver_types = resolve_expression(context, &ExpressionInfo::new(receiver), seen);
        let info = context.function_info_mut(function_id);
        if let Some(parameter) = &mut info.self_parameter {
            parameter.types.extend(receiver_types);
        }
    }

    for (position, argument) in positional.iter().copied().enumerate() {
        let argument_types = resolve_expression(context, &ExpressionInfo::new(argument), seen);
        let info = context.function_info_mut(function_id);
        if let Some(parameter) = info.parameters.get_mut(position) {
            parameter.types.extend(argument_types);
        }
    }
}

fn instantiate(context: &mut AnalysisContext, types: TypeSet) -> TypeSet {
    types
        .into_iter()
        .map(|ty| match &ty {
            Type::Marker(id) if id.kind() == IdKind::Table => {
                Type::Marker(context.instance_id_for(id))
            }
            _ => ty,
        })
        .collect()
}

// --- scope resolution -------------------------------------------------------

/// Resolves a finished scope: classifies its bindings, records its return
/// sites, and folds in already-resolved sub-scopes.
pub(crate) fn resolve_scope(context: &mut AnalysisContext, scope: Scope) -> ResolvedScope {
    let mut resolved = ResolvedScope {
        classes: scope.promoted.clone(),
        ..ResolvedScope::default()
    };

    for item in &scope.items {
        match item {
            ScopeItem::Assignment(AssignmentItem { target, value, .. })
            | ScopeItem::RequireAssignment(RequireAssignmentItem { target, value, .. }) => {
                resolve_binding(context, &scope, *target, value, &mut resolved);
            }
            ScopeItem::Returns(returns) => {
                resolve_return_site(context, &scope, returns, &mut resolved);
            }
            ScopeItem::Resolved(child) => resolved.absorb(child),
        }
    }

    if scope.kind == ScopeKind::Function {
        let owner = scope.owner.clone();
        if context.settings().heuristics {
            apply_parameter_heuristics(context.function_info_mut(&owner));
        }
        context.function_info_mut(&owner).apply_return_nullability();
    }

    resolved
}

/// Classifies one binding for the scope's output lists. Only globally
/// visible names surface; locals are reachable through the class and
/// definition tables when they matter.
fn resolve_binding(
    context: &mut AnalysisContext,
    scope: &Scope,
    target: ExpressionId,
    _value: &ExpressionInfo,
    resolved: &mut ResolvedScope,
) {
    if scope.kind != ScopeKind::Module {
        return;
    }
    let Expression::Reference { key } = context.expression(target).clone() else {
        return;
    };
    let ReferenceKey::Global(name) = key else {
        return;
    };
    if resolved.fields.iter().any(|(existing, _)| existing == &name) {
        return;
    }

    // The whole definition list speaks for the name, not just this site:
    // a later `setmetatable` or re-binding changes what the first
    // assignment meant.
    let mut seen = Seen::default();
    let types = resolve_expression(context, &ExpressionInfo::new(target), &mut seen);

    let mut table_ids = types.iter().filter_map(Type::as_table_id);
    if let Some(table_id) = table_ids.next() {
        let is_class = context
            .table_info(table_id)
            .is_some_and(|info| info.is_class() && !info.emit_as_table);
        if !is_class && !resolved.tables.iter().any(|(_, id)| id == table_id) {
            resolved.tables.push((name, table_id.clone()));
        }
        return;
    }

    let mut function_ids = types
        .iter()
        .filter_map(|ty| ty.as_marker().filter(|id| id.kind() == IdKind::Function));
    if let Some(function_id) = function_ids.next() {
        if !resolved.functions.iter().any(|(_, id)| id == function_id) {
            resolved.functions.push((name, function_id.clone()));
        }
        return;
    }

    resolved.fields.push((name, types));
}

/// Resolves one return site and routes it to its owner: the enclosing
/// function's info record, or the module's return list.
fn resolve_return_site(
    context: &mut AnalysisContext,
    scope: &Scope,
    returns: &ReturnsItem,
    resolved: &mut ResolvedScope,
) {
    let mut positions: Vec<(TypeSet, Option<ExpressionInfo>)> = Vec::new();
    let count = returns.expressions.len();

    for (offset, expression) in returns.expressions.iter().copied().enumerate() {
        let is_last = offset + 1 == count;
        if is_last {
            if let Some(arity) = tail_call_arity(context, expression) {
                // The final call's whole return list flows out.
                for position in 1..=arity {
                    let info = ExpressionInfo::new(expression).with_index(position);
                    let mut seen = Seen::default();
                    let types = resolve_expression(context, &info, &mut seen);
                    positions.push((types, Some(info)));
                }
                continue;
            }
        }
        let info = ExpressionInfo::new(expression);
        let mut seen = Seen::default();
        let types = resolve_expression(context, &info, &mut seen);
        positions.push((types, Some(info)));
    }

    match scope.owner.kind() {
        IdKind::Function => {
            let is_constructor = context
                .function_info(&scope.owner)
                .is_some_and(|info| info.is_constructor);
            if !is_constructor {
                let owner = scope.owner.clone();
                context
                    .function_info_mut(&owner)
                    .record_return_site(positions);
            }
        }
        _ => {
            for (offset, (types, expression)) in positions.into_iter().enumerate() {
                if resolved.returns.len() <= offset {
                    resolved.returns.push(ResolvedReturn {
                        types: TypeSet::default(),
                        expression: None,
                    });
                }
                let position = &mut resolved.returns[offset];
                position.types.extend(types);
                if position.expression.is_none() {
                    position.expression = expression;
                }
            }
        }
    }
}

/// How many positions the final call of a return statement fans out to, if
/// its callee is known.
fn tail_call_arity(context: &mut AnalysisContext, expression: ExpressionId) -> Option<usize> {
    let (callee, _) = context.expression(expression).as_call()?;
    let mut seen = Seen::default();
    let callee_types = resolve_expression(context, &ExpressionInfo::new(callee), &mut seen);
    let arity = callee_types
        .iter()
        .filter_map(|ty| {
            let id = ty.as_marker().filter(|id| id.kind() == IdKind::Function)?;
            context.function_info(id).map(|info| info.returns.len())
        })
        .max()?;
    (arity > 1).then_some(arity)
}
