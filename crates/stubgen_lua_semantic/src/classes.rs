//! Detection of class-defining idioms.
//!
//! Each detector is independent and fires while assignments and method
//! definitions are being recorded; whichever recognizes its shape first
//! promotes the table and the rest see an existing class.

use itertools::Itertools;
use stubgen_lua_ast::{Indexer, Name};

use crate::expression::{Expression, ExpressionId, ExpressionInfo, Literal, ReferenceKey};
use crate::ids::{Id, IdKind};
use crate::info::FieldKey;
use crate::reader::ScopeReader;
use crate::scope::ScopeKind;
use crate::types::resolve::{resolve_expression, Seen};
use crate::types::{Type, TypeSet};

impl ScopeReader<'_> {
    /// Records `target = value`: the definition itself, plus whatever class
    /// idiom the assignment completes. Returns `false` when the assignment
    /// was absorbed into existing state and produced no new binding.
    pub(crate) fn record_assignment(
        &mut self,
        target: ExpressionId,
        value: ExpressionInfo,
        is_function_definition: bool,
    ) -> bool {
        match self.context.expression(target).clone() {
            Expression::Reference { key } => {
                self.record_reference_assignment(key, value, is_function_definition)
            }
            Expression::Member {
                base,
                indexer,
                member,
            } => {
                self.record_member_assignment(base, indexer, &member, value, is_function_definition);
                true
            }
            Expression::Index { base, index } => {
                let field_key = match self.context.expression(index) {
                    Expression::Literal(Literal::String(text)) => Some(FieldKey::name(text.clone())),
                    Expression::Literal(Literal::Number(raw)) => Some(FieldKey::name(raw.clone())),
                    _ => None,
                };
                if let Some(field_key) = field_key {
                    self.record_field_definition_on_resolved_base(base, field_key, value);
                }
                true
            }
            _ => true,
        }
    }

    // --- reference targets -------------------------------------------------

    fn record_reference_assignment(
        &mut self,
        key: ReferenceKey,
        mut value: ExpressionInfo,
        is_function_definition: bool,
    ) -> bool {
        // `X = X or {}` keeps whatever X already is; the fresh table only
        // counts when nothing was there before.
        if let Some(fallback) = self.self_or_table_fallback(&key, value.expression) {
            if !self.context.definitions(&key).is_empty() {
                return false;
            }
            value.expression = fallback;
        }

        let source_name = self.reference_source_name(&key);
        let is_local = matches!(&key, ReferenceKey::Id(id) if id.kind() == IdKind::Local);

        if let Some(class_id) = self.detect_derive(&key, source_name.as_ref(), is_local, &value) {
            let literal = self.context.add_expression(Expression::Literal(Literal::Table {
                table_id: class_id,
            }));
            let mut info = self.expression_info(literal, 1);
            info.function_level = value.function_level;
            self.merge_unknown_placeholder(&key, &info);
            self.context.add_definition(key, info);
            return true;
        }

        if let Some(class_id) = self.detect_atom_ui(&key, source_name.as_ref(), is_local, &value) {
            let literal = self.context.add_expression(Expression::Literal(Literal::Table {
                table_id: class_id,
            }));
            let info = self.expression_info(literal, 1);
            self.merge_unknown_placeholder(&key, &info);
            self.context.add_definition(key, info);
            return true;
        }

        // `B = setmetatable(a, A)` binds B to an instance of A.
        if let Some((subject, meta)) = self.setmetatable_call(value.expression) {
            let target = self
                .context
                .add_expression(Expression::Reference { key: key.clone() });
            self.context.add_definition(key, value);
            self.apply_setmetatable(target, subject, meta);
            return true;
        }

        // Rebinding a global to a local derive-class promotes the class to
        // its global name; this is the one place a class name changes.
        if !is_local {
            if let Some(name) = key.as_global() {
                if self.promote_local_derive_class(name, &value) {
                    self.context.add_definition(key, value);
                    return true;
                }
            }
        }

        if let Expression::Literal(Literal::Table { table_id }) =
            self.context.expression(value.expression).clone()
        {
            // Reassigning an empty `{}` over an established class is
            // absorbed rather than letting it shadow the class.
            if self.is_empty_table(&table_id) && self.has_class_definition(&key) {
                return false;
            }
            if let Some(name) = &source_name {
                let info = self.context.table_info_mut(&table_id);
                if info.original_name.is_none() {
                    info.original_name = Some(name.clone());
                }
            }
            self.merge_unknown_placeholder(&key, &value);
        }

        self.context.add_definition(key, value);
        true
    }

    /// Matches `X or {...}` against the key being assigned; returns the
    /// table alternative.
    fn self_or_table_fallback(
        &self,
        key: &ReferenceKey,
        value: ExpressionId,
    ) -> Option<ExpressionId> {
        let Expression::Operation {
            operator: crate::expression::Operator::Logical(stubgen_lua_ast::LogicalOp::Or),
            arguments,
        } = self.context.expression(value)
        else {
            return None;
        };
        let (&left, &right) = match arguments.as_slice() {
            [left, right] => (left, right),
            _ => return None,
        };
        let same_reference = self
            .context
            .expression(left)
            .as_reference()
            .is_some_and(|left_key| left_key == key);
        let right_is_table = matches!(
            self.context.expression(right),
            Expression::Literal(Literal::Table { .. })
        );
        (same_reference && right_is_table).then_some(right)
    }

    /// `Base:derive("Name")`.
    fn detect_derive(
        &mut self,
        _key: &ReferenceKey,
        source_name: Option<&Name>,
        is_local: bool,
        value: &ExpressionInfo,
    ) -> Option<Id> {
        let (callee, arguments) = self.context.expression(value.expression).as_call()?;
        let Expression::Member {
            base,
            indexer: Indexer::Colon,
            member,
        } = self.context.expression(callee)
        else {
            return None;
        };
        if member != "derive" {
            return None;
        }
        let base = *base;
        let [name_argument] = arguments else {
            return None;
        };
        let Expression::Literal(Literal::String(derive_name)) =
            self.context.expression(*name_argument).clone()
        else {
            return None;
        };

        let base_name = self
            .context
            .expression(base)
            .as_reference()
            .cloned()
            .and_then(|key| self.reference_source_name(&key));

        let bound_name = source_name.cloned().unwrap_or_else(|| derive_name.clone());
        let class_name = if is_local {
            Name::new(format!("{}_{}", self.module.last_segment(), bound_name))
        } else {
            bound_name.clone()
        };

        let class_id = self.context.new_table_id(class_name.clone());
        let info = self.context.table_info_mut(&class_id);
        info.class_name = Some(class_name);
        info.original_name = Some(bound_name);
        info.original_base = base_name;
        info.original_derive_name = Some(derive_name);
        info.is_local_class = is_local;
        info.is_local_derive_class = is_local;

        self.mark_promoted(class_id.clone());
        Some(class_id)
    }

    /// UI-node factories: `Foo = A.__call({ _ATOM_UI_CLASS = X, ... })`
    /// creates a base node class; `Foo = Parent({ ... })` with an AtomUI
    /// parent derives from it.
    fn detect_atom_ui(
        &mut self,
        _key: &ReferenceKey,
        source_name: Option<&Name>,
        is_local: bool,
        value: &ExpressionInfo,
    ) -> Option<Id> {
        let (callee, arguments) = self.context.expression(value.expression).as_call()?;
        let [argument] = arguments else {
            return None;
        };
        let Expression::Literal(Literal::Table { table_id }) =
            self.context.expression(*argument).clone()
        else {
            return None;
        };

        let marker_key = FieldKey::name("_ATOM_UI_CLASS");
        let is_factory_call = matches!(
            self.context.expression(callee),
            Expression::Member { indexer: Indexer::Dot, member, .. } if member == "__call"
        );

        let parent = if is_factory_call {
            let has_marker = self
                .context
                .table_info(&table_id)
                .is_some_and(|info| !info.field_definitions(&marker_key).is_empty());
            if !has_marker {
                return None;
            }
            None
        } else {
            // The callee has to resolve to an existing AtomUI class.
            let mut seen = Seen::default();
            let callee_info = ExpressionInfo::new(callee);
            let callee_types = resolve_expression(self.context, &callee_info, &mut seen);
            let parent = callee_types.iter().find_map(|ty| {
                let id = ty.as_table_id()?;
                let info = self.context.table_info(id)?;
                info.is_atom_ui.then(|| (id.clone(), info.class_name.clone()))
            });
            let Some(parent) = parent else {
                return None;
            };
            Some(parent)
        };

        let class_name = source_name.cloned()?;
        {
            let info = self.context.table_info_mut(&table_id);
            info.class_name = Some(class_name);
            info.original_name = source_name.cloned();
            info.is_atom_ui = true;
            info.is_atom_ui_base = is_factory_call;
            info.is_local_class = is_local;
            if let Some((_, parent_name)) = &parent {
                info.original_base = parent_name.clone();
            }
        }

        self.mark_factory_methods(&table_id);
        self.mark_promoted(table_id.clone());
        Some(table_id)
    }

    /// Functions in a factory argument table whose first declared parameter
    /// is `self` are methods, not free functions.
    fn mark_factory_methods(&mut self, table_id: &Id) {
        let function_ids: Vec<Id> = self
            .context
            .table_info(table_id)
            .map(|info| {
                info.definitions
                    .values()
                    .flatten()
                    .filter_map(|definition| {
                        match self.context.expression(definition.expression) {
                            Expression::Literal(Literal::Function { function_id, .. }) => {
                                Some(function_id.clone())
                            }
                            _ => None,
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        for function_id in function_ids {
            let info = self.context.function_info_mut(&function_id);
            if info.self_parameter.is_none()
                && info.parameters.first().is_some_and(|first| first.name == "self")
            {
                let receiver = info.parameters.remove(0);
                info.self_parameter = Some(receiver);
                info.is_method = true;
            }
        }
    }

    /// A global assignment of an existing local derive-class re-binds the
    /// class to the global name, resetting its local flags.
    fn promote_local_derive_class(&mut self, global_name: &Name, value: &ExpressionInfo) -> bool {
        if self.context.expression(value.expression).as_reference().is_none() {
            return false;
        }
        let mut seen = Seen::default();
        let info = ExpressionInfo::new(value.expression);
        let types = resolve_expression(self.context, &info, &mut seen);
        let derived = types.iter().find_map(|ty| {
            let id = ty.as_table_id()?;
            self.context
                .table_info(id)
                .is_some_and(|table| table.is_local_derive_class)
                .then(|| id.clone())
        });
        let Some(table_id) = derived else {
            return false;
        };
        let info = self.context.table_info_mut(&table_id);
        info.class_name = Some(global_name.clone());
        info.is_local_class = false;
        info.is_local_derive_class = false;
        true
    }

    fn is_empty_table(&self, table_id: &Id) -> bool {
        self.context
            .table_info(table_id)
            .is_none_or(|info| info.is_empty())
    }

    fn has_class_definition(&self, key: &ReferenceKey) -> bool {
        self.context.definitions(key).iter().any(|definition| {
            match self.context.expression(definition.expression) {
                Expression::Literal(Literal::Table { table_id }) => self
                    .context
                    .table_info(table_id)
                    .is_some_and(|info| info.is_class()),
                _ => false,
            }
        })
    }

    /// Folds a same-named placeholder class into the table the name is now
    /// being bound to.
    fn merge_unknown_placeholder(&mut self, key: &ReferenceKey, value: &ExpressionInfo) {
        let Some(global) = key.as_global() else {
            return;
        };
        let Some(placeholder) = self.context.unknown_class(global).cloned() else {
            return;
        };
        let Expression::Literal(Literal::Table { table_id }) =
            self.context.expression(value.expression).clone()
        else {
            return;
        };
        if placeholder == table_id {
            return;
        }

        let merged: Vec<(FieldKey, Vec<ExpressionInfo>)> = self
            .context
            .table_info(&placeholder)
            .map(|info| {
                info.definitions
                    .iter()
                    .map(|(field, definitions)| (field.clone(), definitions.clone()))
                    .collect()
            })
            .unwrap_or_default();

        let target = self.context.table_info_mut(&table_id);
        for (field, definitions) in merged {
            let existing = target.definitions.entry(field).or_default();
            // A lone empty-table definition is a stand-in; real data
            // replaces it.
            let replaceable = existing.len() <= 1;
            if replaceable && !definitions.is_empty() {
                *existing = definitions;
            } else {
                existing.extend(definitions);
            }
        }

        let placeholder_info = self.context.table_info_mut(&placeholder);
        placeholder_info.is_empty_class = true;
    }

    // --- member targets ----------------------------------------------------

    fn record_member_assignment(
        &mut self,
        base: ExpressionId,
        indexer: Indexer,
        member: &Name,
        value: ExpressionInfo,
        is_function_definition: bool,
    ) {
        // Derive calls assigned into a member chain (`UI.Widget = ...`)
        // name the class after the whole chain.
        if let Some(chain) = self.member_chain_name(base, member) {
            let chain_key = ReferenceKey::Global(chain.clone());
            let derive_value = value.clone();
            if let Some(class_id) =
                self.detect_derive(&chain_key, Some(&chain), false, &derive_value)
            {
                let field_key = FieldKey::name(member.clone());
                let literal = self.context.add_expression(Expression::Literal(
                    Literal::Table { table_id: class_id },
                ));
                let mut info = self.expression_info(literal, 1);
                info.function_level = value.function_level;
                self.record_field_definition_on_resolved_base(base, field_key, info);
                return;
            }
        }

        self.arm_closure_slot(base, is_function_definition);

        let field_key = FieldKey::name(member.clone());
        let is_method = indexer == Indexer::Colon;
        let bases = self.resolved_base_tables(base);

        if bases.is_empty() {
            self.record_on_unknown_global(base, field_key, value, is_function_definition, is_method);
            return;
        }

        for (table_id, instance) in bases {
            let mut field_value = value.clone();
            field_value.instance = instance;

            if is_function_definition {
                self.process_function_member(
                    &table_id,
                    base,
                    member,
                    is_method,
                    &field_value,
                );
            } else if let Expression::Literal(Literal::Table { table_id: nested }) =
                self.context.expression(field_value.expression).clone()
            {
                // Remember where literal sub-tables live, for nested-class
                // promotion later.
                let container_is_class = self
                    .context
                    .table_info(&table_id)
                    .is_some_and(|info| info.is_class());
                if container_is_class {
                    let nested_info = self.context.table_info_mut(&nested);
                    nested_info.container_id = Some(table_id.clone());
                    if nested_info.original_name.is_none() {
                        nested_info.original_name = Some(member.clone());
                    }
                }
            }

            self.context
                .table_info_mut(&table_id)
                .add_definition(field_key.clone(), field_value);
        }
    }

    /// A function assigned into a table: constructor inference, nested
    /// class promotion, and method receiver seeding all hang off this.
    fn process_function_member(
        &mut self,
        table_id: &Id,
        base: ExpressionId,
        member: &Name,
        is_method: bool,
        value: &ExpressionInfo,
    ) {
        let function_id = match self.context.expression(value.expression) {
            Expression::Literal(Literal::Function { function_id, .. }) => function_id.clone(),
            _ => return,
        };

        let is_class = self
            .context
            .table_info(table_id)
            .is_some_and(|info| info.is_class());

        if member == "new" && is_method {
            // `:new` on a plain table is what makes it a class.
            if !is_class {
                let name = self
                    .base_binding_name(base)
                    .unwrap_or_else(|| table_id.name().clone());
                let info = self.context.table_info_mut(table_id);
                info.class_name = Some(name.clone());
                if info.original_name.is_none() {
                    info.original_name = Some(name);
                }
                self.mark_promoted(table_id.clone());
            }
            self.infer_constructor(&function_id, table_id);
        } else if !is_class {
            // A function landing in a table nested inside a class turns
            // that table into a nested class.
            let container = self
                .context
                .table_info(table_id)
                .and_then(|info| info.container_id.clone());
            if let Some(container_id) = container {
                let container_name = self
                    .context
                    .table_info(&container_id)
                    .and_then(|info| info.class_name.clone());
                if let Some(container_name) = container_name {
                    let segment = self
                        .context
                        .table_info(table_id)
                        .and_then(|info| info.original_name.clone())
                        .unwrap_or_else(|| table_id.name().clone());
                    let nested_name = Name::new(format!("{container_name}.{segment}"));
                    let info = self.context.table_info_mut(table_id);
                    info.class_name = Some(nested_name);
                    self.mark_promoted(table_id.clone());
                }
            }
        }

        if is_method {
            // Methods on a known table receive it as `self`.
            let receiver = Type::table(table_id.clone());
            let info = self.context.function_info_mut(&function_id);
            if let Some(receiver_parameter) = &mut info.self_parameter {
                receiver_parameter.types.insert(receiver);
            }
        }
    }

    /// Marks a function as the constructor of a class: its calls produce
    /// the class, whatever its body returns.
    fn infer_constructor(&mut self, function_id: &Id, table_id: &Id) {
        let class_marker = Type::table(table_id.clone());

        let info = self.context.function_info_mut(function_id);
        info.is_constructor = true;
        info.returns.clear();
        info.min_returns = Some(1);
        if let Some(receiver) = &mut info.self_parameter {
            receiver.types.insert(class_marker.clone());
        }

        let types: TypeSet = [class_marker].into_iter().collect();
        info.record_return_site(vec![(types, None)]);
        info.min_returns = Some(1);
    }

    /// Field or method assigned on a global nobody defined: give the name a
    /// placeholder class so the definitions have somewhere to live.
    fn record_on_unknown_global(
        &mut self,
        base: ExpressionId,
        field_key: FieldKey,
        value: ExpressionInfo,
        is_function_definition: bool,
        is_method: bool,
    ) {
        let Some(ReferenceKey::Global(name)) =
            self.context.expression(base).as_reference().cloned()
        else {
            return;
        };
        if self.in_function() {
            // Only module-scope definitions conjure placeholders.
            return;
        }

        let table_id = match self.context.unknown_class(&name) {
            Some(existing) => existing.clone(),
            None => {
                let table_id = self.context.new_table_id(name.clone());
                {
                    let info = self.context.table_info_mut(&table_id);
                    info.class_name = Some(name.clone());
                    info.original_name = Some(name.clone());
                }
                let literal = self.context.add_expression(Expression::Literal(
                    Literal::Table {
                        table_id: table_id.clone(),
                    },
                ));
                let info = self.expression_info(literal, 1);
                self.context
                    .add_definition(ReferenceKey::Global(name.clone()), info);
                self.context.set_unknown_class(name.clone(), table_id.clone());
                self.mark_promoted(table_id.clone());
                table_id
            }
        };

        if is_function_definition {
            let member = Name::new(field_key.as_str());
            self.process_function_member(&table_id, base, &member, is_method, &value);
        }
        self.context
            .table_info_mut(&table_id)
            .add_definition(field_key, value);
    }

    fn record_field_definition_on_resolved_base(
        &mut self,
        base: ExpressionId,
        field_key: FieldKey,
        value: ExpressionInfo,
    ) {
        for (table_id, instance) in self.resolved_base_tables(base) {
            let mut field_value = value.clone();
            field_value.instance = instance;
            self.context
                .table_info_mut(&table_id)
                .add_definition(field_key.clone(), field_value);
        }
    }

    /// The tables an assignment base resolves to, with instance markers
    /// looked through to their classes.
    fn resolved_base_tables(&mut self, base: ExpressionId) -> Vec<(Id, bool)> {
        let mut seen = Seen::default();
        let info = ExpressionInfo::new(base);
        let types = resolve_expression(self.context, &info, &mut seen);

        let mut result = Vec::new();
        for ty in &types {
            let Some(id) = ty.as_marker() else { continue };
            match id.kind() {
                IdKind::Table => result.push((id.clone(), false)),
                IdKind::Instance => {
                    if let Some(class) = self.context.instance_class(id).cloned() {
                        result.push((class, true));
                    }
                }
                _ => {}
            }
        }
        result
    }

    /// `self.X = function` against the closure-class slot.
    fn arm_closure_slot(&mut self, base: ExpressionId, is_function_definition: bool) {
        if !is_function_definition {
            return;
        }
        let Some(key) = self.context.expression(base).as_reference().cloned() else {
            return;
        };
        let Some(base_name) = self.reference_source_name(&key) else {
            return;
        };
        for scope in self.scopes.iter_mut().rev() {
            if scope.kind == ScopeKind::Function {
                if scope.class_self_name.as_ref() == Some(&base_name) {
                    scope.has_self_method = true;
                }
                break;
            }
        }
    }

    /// The chain `X.Y` as a dotted name, locals mapped back to their source
    /// names. `None` when the chain bottoms out in something unnameable.
    fn member_chain_name(&self, base: ExpressionId, member: &Name) -> Option<Name> {
        let mut segments = vec![member.clone()];
        let mut cursor = base;
        loop {
            match self.context.expression(cursor) {
                Expression::Member { base, member, .. } => {
                    segments.push(member.clone());
                    cursor = *base;
                }
                Expression::Reference { key } => {
                    segments.push(self.reference_source_name(key)?);
                    break;
                }
                _ => return None,
            }
        }
        segments.reverse();
        Some(Name::new(segments.iter().map(Name::as_str).join(".")))
    }

    /// The name the base of a member target is bound to, for class naming.
    fn base_binding_name(&self, base: ExpressionId) -> Option<Name> {
        match self.context.expression(base) {
            Expression::Reference { key } => self.reference_source_name(key),
            Expression::Member { base, member, .. } => self.member_chain_name(*base, member),
            _ => None,
        }
    }

    // --- setmetatable ------------------------------------------------------

    /// Matches a `setmetatable(subject, meta)` call.
    pub(crate) fn setmetatable_call(&self, value: ExpressionId) -> Option<(ExpressionId, ExpressionId)> {
        let (callee, arguments) = self.context.expression(value).as_call()?;
        let is_setmetatable = self
            .context
            .expression(callee)
            .as_reference()
            .and_then(ReferenceKey::as_global)
            .is_some_and(|name| name == "setmetatable");
        if !is_setmetatable {
            return None;
        }
        match arguments {
            [subject, meta] => Some((*subject, *meta)),
            _ => None,
        }
    }

    /// `setmetatable(subject, meta)`: the target becomes an instance of
    /// whatever class `meta` names, and fields already recorded on the
    /// subject move onto the class as instance fields.
    pub(crate) fn apply_setmetatable(
        &mut self,
        target: ExpressionId,
        subject: ExpressionId,
        meta: ExpressionId,
    ) {
        let mut seen = Seen::default();
        let meta_info = ExpressionInfo::new(meta);
        let meta_types = resolve_expression(self.context, &meta_info, &mut seen);

        let mut class_tables: Vec<Id> = meta_types
            .iter()
            .filter_map(|ty| ty.as_table_id().cloned())
            .collect();

        // `setmetatable(a, { __index = C })`.
        if class_tables.is_empty() {
            if let Expression::Literal(Literal::Table { table_id }) =
                self.context.expression(meta).clone()
            {
                let index_definitions: Vec<ExpressionInfo> = self
                    .context
                    .table_info(&table_id)
                    .map(|info| info.field_definitions(&FieldKey::name("__index")).to_vec())
                    .unwrap_or_default();
                for definition in index_definitions {
                    let mut seen = Seen::default();
                    let types = resolve_expression(self.context, &definition, &mut seen);
                    class_tables.extend(types.iter().filter_map(|ty| ty.as_table_id().cloned()));
                }
            }
        }

        if class_tables.is_empty() {
            // Nothing resolvable yet; the instance definition below still
            // records the relationship for later passes.
            self.record_instance_definition(target, meta);
            return;
        }

        // Whatever serves as a metatable here is a class, named or not.
        let meta_source_name = self
            .context
            .expression(meta)
            .as_reference()
            .cloned()
            .and_then(|key| self.reference_source_name(&key));
        for class_table in &class_tables {
            let unpromoted = self
                .context
                .table_info(class_table)
                .is_some_and(|info| !info.is_class());
            if unpromoted {
                let name = self
                    .context
                    .table_info(class_table)
                    .and_then(|info| info.original_name.clone())
                    .or_else(|| meta_source_name.clone())
                    .unwrap_or_else(|| class_table.name().clone());
                let info = self.context.table_info_mut(class_table);
                info.class_name = Some(name);
                self.mark_promoted(class_table.clone());
            }
        }

        let subject_tables = self.resolved_base_tables(subject);
        for class_table in &class_tables {
            self.context.instance_id_for(class_table);
            for (subject_table, _) in &subject_tables {
                if subject_table == class_table {
                    continue;
                }
                let copied: Vec<(FieldKey, Vec<ExpressionInfo>)> = self
                    .context
                    .table_info(subject_table)
                    .map(|info| {
                        info.definitions
                            .iter()
                            .map(|(field, definitions)| (field.clone(), definitions.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                let class_info = self.context.table_info_mut(class_table);
                for (field, definitions) in copied {
                    for mut definition in definitions {
                        definition.instance = true;
                        class_info.add_definition(field.clone(), definition);
                    }
                }
            }
        }

        self.record_instance_definition(target, meta);
    }

    fn record_instance_definition(&mut self, target: ExpressionId, meta: ExpressionId) {
        let Some(key) = self.context.expression(target).as_reference().cloned() else {
            return;
        };
        let mut info = self.expression_info(meta, 1);
        info.instance = true;
        self.context.add_definition(key, info);
    }

    // --- closure classes ---------------------------------------------------

    /// Fires when a function scope with an armed closure slot exits: the
    /// captured table becomes a class and the function its constructor.
    pub(crate) fn detect_closure_class(&mut self, function_id: &Id) {
        let scope = self.scopes.last().expect("function scope to be current");
        debug_assert_eq!(scope.kind, ScopeKind::Function);
        if scope.class_self_name.is_none() || !scope.has_self_method {
            return;
        }
        let table_id = scope.class_table_id.clone();

        let identifier = self
            .context
            .function_info(function_id)
            .and_then(|info| info.identifier);
        let Some(identifier) = identifier else {
            return;
        };
        let Expression::Member { base, member, .. } = self.context.expression(identifier).clone()
        else {
            return;
        };
        let base_key = match self.context.expression(base).as_reference() {
            Some(key) => key.clone(),
            None => return,
        };

        let table_id = match table_id {
            Some(id) => id,
            None => self.context.new_table_id(Name::default()),
        };

        let class_name = if member == "new" || member == "getInstance" {
            self.reference_source_name(&base_key)
                .unwrap_or_else(|| Name::new(self.module.last_segment()))
        } else {
            Name::new(self.module.last_segment())
        };

        // A container already emitting a class of this name would collide;
        // it falls back to a plain table.
        let container_tables = self.resolved_base_tables(base);
        for (container, _) in &container_tables {
            let collides = self
                .context
                .table_info(container)
                .is_some_and(|info| info.class_name.as_ref() == Some(&class_name));
            if collides {
                let info = self.context.table_info_mut(container);
                info.emit_as_table = true;
            }
        }

        {
            let info = self.context.table_info_mut(&table_id);
            info.class_name = Some(class_name);
            info.is_closure_class = true;
            info.is_local_class = true;
        }
        self.infer_constructor(function_id, &table_id);
        self.mark_promoted(table_id);
    }

    // --- shared ------------------------------------------------------------

    pub(crate) fn mark_promoted(&mut self, table_id: Id) {
        {
            let info = self.context.table_info_mut(&table_id);
            if info.defining_module.is_none() {
                info.defining_module = Some(self.module.clone());
            }
        }
        self.context.record_seen_class(table_id.clone());
        self.current_scope_mut().promoted.push(table_id);
    }
}
