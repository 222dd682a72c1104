use smallvec::SmallVec;
use stubgen_lua_ast::{
    Chunk, Expr, ExprTableConstructor, FunctionDeclaration, Indexer, Name, Stmt, StmtAssignment,
    StmtLocal, TableField, UnaryOp,
};

use crate::context::AnalysisContext;
use crate::dependency::require_argument;
use crate::expression::{Expression, ExpressionId, ExpressionInfo, Literal, Operator, ReferenceKey};
use crate::ids::{Id, IdKind};
use crate::info::{FieldKey, ParameterInfo};
use crate::module_name::ModuleName;
use crate::scope::{
    AssignmentItem, RequireAssignmentItem, ResolvedScope, ReturnsItem, Scope, ScopeItem, ScopeKind,
};
use crate::types::resolve::resolve_scope;
use crate::types::TypeSet;
use crate::usage::{CallArguments, UsageFlags};

/// Reads one file: walks the AST, creating scopes, normalizing expressions,
/// recording usage facts and definitions, and handing each finished scope to
/// the type resolver.
pub(crate) struct ScopeReader<'ctx> {
    pub(crate) context: &'ctx mut AnalysisContext,
    pub(crate) scopes: Vec<Scope>,
    pub(crate) module: ModuleName,
}

/// Reads and resolves a whole module, returning the resolved module scope.
pub(crate) fn read_module(
    context: &mut AnalysisContext,
    name: &ModuleName,
    chunk: &Chunk,
) -> ResolvedScope {
    let _span = tracing::trace_span!("read_module", module = %name).entered();

    context.begin_module(name.clone());
    let module_id = context.allocate_id(IdKind::Module, name.last_segment());

    let scope = {
        let mut reader = ScopeReader {
            context,
            scopes: vec![Scope::new(ScopeKind::Module, module_id)],
            module: name.clone(),
        };
        for statement in &chunk.body {
            reader.read_stmt(statement);
        }
        reader.scopes.pop().expect("module scope to be present")
    };

    let resolved = resolve_scope(context, scope);
    if let Some(module) = context.module_mut(name) {
        module.returns = resolved.returns.clone();
        module.resolved = Some(resolved.clone());
    }
    resolved
}

impl ScopeReader<'_> {
    pub(crate) fn current_scope_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack to be non-empty")
    }

    pub(crate) fn lookup_local(&self, name: &str) -> Option<Id> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.local(name).cloned())
    }

    /// The source name a reference was written under: locals resolve back
    /// to their declared name.
    pub(crate) fn reference_source_name(&self, key: &ReferenceKey) -> Option<Name> {
        match key {
            ReferenceKey::Global(name) => Some(name.clone()),
            ReferenceKey::Id(id) => self
                .scopes
                .iter()
                .rev()
                .find_map(|scope| scope.local_source_name(id).cloned()),
        }
    }

    pub(crate) fn in_function(&self) -> bool {
        self.scopes
            .iter()
            .any(|scope| scope.kind == ScopeKind::Function)
    }

    pub(crate) fn expression_info(&self, expression: ExpressionId, index: usize) -> ExpressionInfo {
        ExpressionInfo {
            expression,
            index,
            instance: false,
            from_literal: false,
            defining_module: Some(self.module.clone()),
            function_level: self.in_function(),
        }
    }

    fn record_usage(&mut self, expression: ExpressionId, flags: UsageFlags) {
        self.context.usage_mut(expression).merge_flags(flags);
    }

    // --- statements --------------------------------------------------------

    fn read_stmt(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Local(local) => self.analyze_local(local),
            Stmt::Assignment(assignment) => self.analyze_assignment(assignment),
            Stmt::Return(ret) => {
                let expressions: Vec<ExpressionId> = ret
                    .values
                    .iter()
                    .map(|value| self.normalize_expr(value))
                    .collect();
                self.current_scope_mut()
                    .push(ScopeItem::Returns(ReturnsItem { expressions }));
            }
            Stmt::If(if_stmt) => {
                for clause in &if_stmt.clauses {
                    if let Some(condition) = clause.condition() {
                        self.normalize_expr(condition);
                    }
                    self.read_block(clause.body());
                }
            }
            Stmt::While(while_stmt) => {
                self.normalize_expr(&while_stmt.condition);
                self.read_block(&while_stmt.body);
            }
            Stmt::Repeat(repeat) => {
                // The condition sees the body's locals, so it is normalized
                // before the block scope closes.
                self.push_block_scope();
                for statement in &repeat.body {
                    self.read_stmt(statement);
                }
                self.normalize_expr(&repeat.condition);
                self.pop_and_resolve();
            }
            Stmt::Do(do_stmt) => self.read_block(&do_stmt.body),
            Stmt::ForNumeric(for_numeric) => {
                let start = self.normalize_expr(&for_numeric.start);
                let end = self.normalize_expr(&for_numeric.end);
                self.record_usage(start, UsageFlags::NUMERIC_FOR);
                self.record_usage(end, UsageFlags::NUMERIC_FOR);
                if let Some(step) = &for_numeric.step {
                    let step = self.normalize_expr(step);
                    self.record_usage(step, UsageFlags::NUMERIC_FOR);
                }
                self.push_block_scope();
                let variable = self
                    .context
                    .allocate_id(IdKind::Local, for_numeric.variable.name.clone());
                self.current_scope_mut()
                    .declare_local(for_numeric.variable.name.clone(), variable);
                for statement in &for_numeric.body {
                    self.read_stmt(statement);
                }
                self.pop_and_resolve();
            }
            Stmt::ForGeneric(for_generic) => {
                for iterator in &for_generic.iterators {
                    self.normalize_expr(iterator);
                }
                self.push_block_scope();
                for variable in &for_generic.variables {
                    let id = self
                        .context
                        .allocate_id(IdKind::Local, variable.name.clone());
                    self.current_scope_mut()
                        .declare_local(variable.name.clone(), id);
                }
                for statement in &for_generic.body {
                    self.read_stmt(statement);
                }
                self.pop_and_resolve();
            }
            Stmt::FunctionDeclaration(function) => self.handle_function_declaration(function),
            Stmt::Call(call) => {
                let expression = self.normalize_expr(&call.call);
                self.analyze_call_statement(expression);
            }
            Stmt::Break(_) => {}
        }
    }

    fn read_block(&mut self, body: &[Stmt]) {
        self.push_block_scope();
        for statement in body {
            self.read_stmt(statement);
        }
        self.pop_and_resolve();
    }

    fn push_block_scope(&mut self) {
        let owner = self.current_scope_mut().owner.clone();
        self.scopes.push(Scope::new(ScopeKind::Block, owner));
    }

    fn pop_and_resolve(&mut self) {
        let scope = self.scopes.pop().expect("scope stack to be non-empty");
        let resolved = resolve_scope(self.context, scope);
        self.current_scope_mut().push(ScopeItem::Resolved(resolved));
    }

    /// `setmetatable(a, b)` in statement position: `a` is both the value
    /// being classified and the name the instance binds to.
    fn analyze_call_statement(&mut self, expression: ExpressionId) {
        if let Some((subject, meta)) = self.setmetatable_call(expression) {
            self.apply_setmetatable(subject, subject, meta);
        }
    }

    // --- assignments -------------------------------------------------------

    fn analyze_local(&mut self, local: &StmtLocal) {
        let values: Vec<ExpressionId> = local
            .values
            .iter()
            .map(|value| self.normalize_expr(value))
            .collect();

        // Targets bind after the values: `local x = x` reads the outer `x`.
        let mut targets = Vec::with_capacity(local.targets.len());
        for target in &local.targets {
            let id = self
                .context
                .allocate_id(IdKind::Local, target.name.clone());
            self.current_scope_mut()
                .declare_local(target.name.clone(), id.clone());
            let reference = self
                .context
                .add_expression(Expression::Reference {
                    key: ReferenceKey::Id(id),
                });
            targets.push(reference);
        }

        if let (&[target], &[value]) = (&targets[..], &values[..]) {
            self.detect_closure_self(local, target, value);
            self.detect_instance_construction(target, value);
        }

        self.bind_targets(&targets, &values);
    }

    fn analyze_assignment(&mut self, assignment: &StmtAssignment) {
        let values: Vec<ExpressionId> = assignment
            .values
            .iter()
            .map(|value| self.normalize_expr(value))
            .collect();
        let targets: Vec<ExpressionId> = assignment
            .targets
            .iter()
            .map(|target| self.normalize_target(target))
            .collect();
        self.bind_targets(&targets, &values);
    }

    /// Pairs each target with its value, modeling multiple-return
    /// unpacking: trailing targets past the value list read further return
    /// positions of a final call.
    fn bind_targets(&mut self, targets: &[ExpressionId], values: &[ExpressionId]) {
        for (position, target) in targets.iter().copied().enumerate() {
            let (value, index) = if position < values.len() {
                (values[position], 1)
            } else if let Some(last) = values.last().copied() {
                let unpacks = {
                    let expression = self.context.expression(last);
                    expression.is_call() || matches!(expression, Expression::Require { .. })
                };
                if !unpacks {
                    // Extra locals without a value; they were already
                    // declared, and there is nothing to bind.
                    continue;
                }
                (last, position + 2 - values.len())
            } else {
                continue;
            };

            let info = self.expression_info(value, index);
            if let Expression::Require { module } = self.context.expression(value) {
                let module = module.clone();
                if self.record_assignment(target, info.clone(), false) {
                    self.current_scope_mut()
                        .push(ScopeItem::RequireAssignment(RequireAssignmentItem {
                            target,
                            value: info,
                            module,
                        }));
                }
            } else if self.record_assignment(target, info.clone(), false) {
                self.current_scope_mut()
                    .push(ScopeItem::Assignment(AssignmentItem {
                        target,
                        value: info,
                        is_function_definition: false,
                    }));
            }
        }
    }

    /// `local self = {}` (or `publ`, or `local self = Base.new(...)`) at the
    /// top of a function body arms the closure-class detector.
    fn detect_closure_self(&mut self, local: &StmtLocal, _target: ExpressionId, value: ExpressionId) {
        if self.current_scope_mut().kind != ScopeKind::Function {
            return;
        }
        let name = &local.targets[0].name;
        if name != "self" && name != "publ" {
            return;
        }
        let table_id = match self.context.expression(value) {
            Expression::Literal(Literal::Table { table_id }) => Some(table_id.clone()),
            _ => None,
        };
        let is_constructor_call = self
            .context
            .expression(value)
            .as_call()
            .is_some_and(|(callee, _)| {
                matches!(
                    self.context.expression(callee),
                    Expression::Member { indexer: Indexer::Dot, member, .. } if member == "new"
                )
            });
        if table_id.is_none() && !is_constructor_call {
            return;
        }
        let scope = self.current_scope_mut();
        scope.class_self_name = Some(name.clone());
        scope.class_table_id = table_id;
    }

    /// `local o = Base.new(self, ...)` inherits the receiver's fields, the
    /// same way `setmetatable(o, self)` would.
    fn detect_instance_construction(&mut self, target: ExpressionId, value: ExpressionId) {
        let Some((callee, arguments)) = self.context.expression(value).as_call() else {
            return;
        };
        let callee_is_new = matches!(
            self.context.expression(callee),
            Expression::Member { indexer: Indexer::Dot, member, .. } if member == "new"
        );
        if !callee_is_new {
            return;
        }
        let Some(first) = arguments.first().copied() else {
            return;
        };
        let first_is_self = self
            .context
            .expression(first)
            .as_reference()
            .is_some_and(|key| match key {
                ReferenceKey::Id(id) => matches!(id.kind(), IdKind::SelfParameter),
                ReferenceKey::Global(_) => false,
            });
        if first_is_self {
            self.apply_setmetatable(target, target, first);
        }
    }

    // --- functions ---------------------------------------------------------

    fn handle_function_declaration(&mut self, function: &FunctionDeclaration) {
        let (name, is_method) = match function.identifier.as_deref() {
            Some(Expr::Identifier(identifier)) => (identifier.name.clone(), false),
            Some(Expr::Member(member)) => {
                (member.member.name.clone(), member.indexer == Indexer::Colon)
            }
            _ => (Name::default(), false),
        };

        if function.is_local {
            if let Some(Expr::Identifier(identifier)) = function.identifier.as_deref() {
                let id = self
                    .context
                    .allocate_id(IdKind::Local, identifier.name.clone());
                self.current_scope_mut()
                    .declare_local(identifier.name.clone(), id);
            }
        }

        let identifier = function
            .identifier
            .as_deref()
            .map(|node| self.normalize_target(node));
        let (function_id, literal) = self.begin_function(function, identifier, &name, is_method);

        if let Some(target) = identifier {
            let info = self.expression_info(literal, 1);
            if self.record_assignment(target, info.clone(), true) {
                self.current_scope_mut()
                    .push(ScopeItem::Assignment(AssignmentItem {
                        target,
                        value: info,
                        is_function_definition: true,
                    }));
            }
        }

        self.read_function_body(function, function_id);
    }

    /// Allocates the function's id and info record, and its literal
    /// expression. The body is read separately so that assignment-driven
    /// detection (constructor inference, class promotion) can run first.
    fn begin_function(
        &mut self,
        node: &FunctionDeclaration,
        identifier: Option<ExpressionId>,
        name: &Name,
        is_method: bool,
    ) -> (Id, ExpressionId) {
        let function_id = self.context.function_id_for_node(node, Some(name));
        let literal = self.context.add_expression(Expression::Literal(Literal::Function {
            function_id: function_id.clone(),
            is_method,
        }));

        let self_parameter = is_method.then(|| {
            let id = self
                .context
                .allocate_id(IdKind::SelfParameter, Name::new_static("self"));
            self.context
                .register_parameter(id.clone(), function_id.clone());
            ParameterInfo {
                id,
                name: Name::new_static("self"),
                types: TypeSet::default(),
            }
        });
        let parameters: Vec<ParameterInfo> = node
            .parameter_names()
            .map(|parameter_name| {
                let id = self
                    .context
                    .allocate_id(IdKind::Parameter, parameter_name.clone());
                self.context
                    .register_parameter(id.clone(), function_id.clone());
                ParameterInfo {
                    id,
                    name: parameter_name.clone(),
                    types: TypeSet::default(),
                }
            })
            .collect();

        let info = self.context.function_info_mut(&function_id);
        info.is_method = is_method;
        info.identifier = identifier;
        info.self_parameter = self_parameter;
        info.parameters = parameters;

        (function_id, literal)
    }

    fn read_function_body(&mut self, node: &FunctionDeclaration, function_id: Id) {
        self.scopes
            .push(Scope::new(ScopeKind::Function, function_id.clone()));

        let (self_parameter, parameters) = {
            let info = self
                .context
                .function_info(&function_id)
                .expect("function info to exist for a function being read");
            (
                info.self_parameter
                    .as_ref()
                    .map(|parameter| (parameter.name.clone(), parameter.id.clone())),
                info.parameters
                    .iter()
                    .map(|parameter| (parameter.name.clone(), parameter.id.clone()))
                    .collect::<Vec<_>>(),
            )
        };
        if let Some((name, id)) = self_parameter {
            self.current_scope_mut().declare_local(name, id);
        }
        for (name, id) in parameters {
            self.current_scope_mut().declare_local(name, id);
        }

        for statement in &node.body {
            self.read_stmt(statement);
        }

        // A body that can fall off the end returns nothing on that path.
        let has_top_level_return = node
            .body
            .iter()
            .any(|statement| matches!(statement, Stmt::Return(_)));
        if !has_top_level_return {
            self.current_scope_mut()
                .push(ScopeItem::Returns(ReturnsItem { expressions: vec![] }));
        }

        self.detect_closure_class(&function_id);
        self.pop_and_resolve();
    }

    // --- expressions -------------------------------------------------------

    pub(crate) fn normalize_expr(&mut self, node: &Expr) -> ExpressionId {
        if let Some(cached) = self.context.cached_expression(node) {
            return cached;
        }
        let id = self.normalize_expr_uncached(node, UsageFlags::INDEXING);
        self.context.cache_expression(node, id);
        id
    }

    /// Like [`Self::normalize_expr`], but a member/index base records an
    /// index-assignment usage instead of a plain read.
    pub(crate) fn normalize_target(&mut self, node: &Expr) -> ExpressionId {
        if let Some(cached) = self.context.cached_expression(node) {
            return cached;
        }
        let id = self.normalize_expr_uncached(node, UsageFlags::INDEX_ASSIGNMENT);
        self.context.cache_expression(node, id);
        id
    }

    fn normalize_expr_uncached(&mut self, node: &Expr, base_usage: UsageFlags) -> ExpressionId {
        match node {
            Expr::Identifier(identifier) => {
                let key = match self.lookup_local(&identifier.name) {
                    Some(id) => ReferenceKey::Id(id),
                    None => ReferenceKey::Global(identifier.name.clone()),
                };
                self.context.add_expression(Expression::Reference { key })
            }
            Expr::Vararg(_) => self
                .context
                .add_expression(Expression::Literal(Literal::Vararg)),
            Expr::StringLiteral(literal) => self.context.add_expression(Expression::Literal(
                Literal::String(Name::new(&literal.value)),
            )),
            Expr::NumericLiteral(literal) => self
                .context
                .add_expression(Expression::Literal(Literal::Number(literal.raw.clone()))),
            Expr::BooleanLiteral(literal) => self
                .context
                .add_expression(Expression::Literal(Literal::Boolean(literal.value))),
            Expr::NilLiteral(_) => self
                .context
                .add_expression(Expression::Literal(Literal::Nil)),
            Expr::TableConstructor(constructor) => self.normalize_table(constructor, None),
            Expr::Member(member) => {
                let base = self.normalize_expr(&member.base);
                self.record_usage(base, base_usage);
                self.context.add_expression(Expression::Member {
                    base,
                    indexer: member.indexer,
                    member: member.member.name.clone(),
                })
            }
            Expr::Index(index) => {
                let base = self.normalize_expr(&index.base);
                self.record_usage(base, base_usage);
                let key = self.normalize_expr(&index.index);
                self.context
                    .add_expression(Expression::Index { base, index: key })
            }
            Expr::Unary(unary) => {
                let operand = self.normalize_expr(&unary.operand);
                match unary.op {
                    UnaryOp::Neg | UnaryOp::BitNot => {
                        self.record_usage(operand, UsageFlags::MATH);
                    }
                    UnaryOp::Length => self.record_usage(operand, UsageFlags::LENGTH),
                    UnaryOp::Not => {}
                }
                self.context.add_expression(Expression::Operation {
                    operator: Operator::Unary(unary.op),
                    arguments: smallvec::smallvec![operand],
                })
            }
            Expr::Binary(binary) => {
                let left = self.normalize_expr(&binary.left);
                let right = self.normalize_expr(&binary.right);
                if binary.op.is_concat() {
                    self.record_usage(left, UsageFlags::CONCATENATION);
                    self.record_usage(right, UsageFlags::CONCATENATION);
                } else if binary.op.is_math() {
                    self.record_usage(left, UsageFlags::MATH);
                    self.record_usage(right, UsageFlags::MATH);
                }
                self.context.add_expression(Expression::Operation {
                    operator: Operator::Binary(binary.op),
                    arguments: smallvec::smallvec![left, right],
                })
            }
            Expr::Logical(logical) => {
                let left = self.normalize_expr(&logical.left);
                let right = self.normalize_expr(&logical.right);
                self.context.add_expression(Expression::Operation {
                    operator: Operator::Logical(logical.op),
                    arguments: smallvec::smallvec![left, right],
                })
            }
            Expr::Call(_) | Expr::TableCall(_) | Expr::StringCall(_) => self.normalize_call(node),
            Expr::Function(function) => {
                let (function_id, literal) =
                    self.begin_function(function, None, &Name::default(), false);
                self.read_function_body(function, function_id);
                literal
            }
        }
    }

    fn normalize_call(&mut self, node: &Expr) -> ExpressionId {
        if let Some(module) = require_argument(node) {
            return self.context.add_expression(Expression::Require { module });
        }

        let (base, call_arguments): (ExpressionId, CallArguments) = match node {
            Expr::Call(call) => {
                let base = self.normalize_expr(&call.base);
                let arguments = call
                    .arguments
                    .iter()
                    .map(|argument| self.normalize_expr(argument))
                    .collect();
                (base, arguments)
            }
            Expr::StringCall(call) => {
                let base = self.normalize_expr(&call.base);
                let argument = self.context.add_expression(Expression::Literal(
                    Literal::String(Name::new(&call.argument.value)),
                ));
                (base, smallvec::smallvec![argument])
            }
            Expr::TableCall(call) => {
                let base = self.normalize_expr(&call.base);
                let argument = self.normalize_table(&call.argument, None);
                (base, smallvec::smallvec![argument])
            }
            _ => unreachable!("normalize_call only receives call expressions"),
        };

        self.context
            .usage_mut(base)
            .record_call(call_arguments.clone());

        let mut arguments: SmallVec<[ExpressionId; 4]> =
            SmallVec::with_capacity(call_arguments.len() + 1);
        arguments.push(base);
        arguments.extend(call_arguments);
        self.context.add_expression(Expression::Operation {
            operator: Operator::Call,
            arguments,
        })
    }

    pub(crate) fn normalize_table(
        &mut self,
        constructor: &ExprTableConstructor,
        name: Option<&Name>,
    ) -> ExpressionId {
        let table_id = self.context.table_id_for_constructor(constructor, name);

        for field in &constructor.fields {
            match field {
                TableField::Value { value } => {
                    let expression = self.normalize_expr(value);
                    let info = self.expression_info(expression, 1).with_from_literal();
                    self.context
                        .table_info_mut(&table_id)
                        .literal_fields
                        .push(info);
                }
                TableField::KeyString { key, value } => {
                    let expression = self.normalize_expr(value);
                    let info = self.expression_info(expression, 1).with_from_literal();
                    self.context
                        .table_info_mut(&table_id)
                        .add_definition(FieldKey::name(key.name.clone()), info);
                }
                TableField::Key { key, value } => {
                    let key_expression = self.normalize_expr(key);
                    let expression = self.normalize_expr(value);
                    let field_key = match self.context.expression(key_expression) {
                        Expression::Literal(Literal::String(text)) => {
                            Some(FieldKey::name(text.clone()))
                        }
                        Expression::Literal(Literal::Number(raw)) => {
                            Some(FieldKey::name(raw.clone()))
                        }
                        _ => None,
                    };
                    if let Some(field_key) = field_key {
                        let info = self.expression_info(expression, 1).with_from_literal();
                        self.context
                            .table_info_mut(&table_id)
                            .add_definition(field_key, info);
                    }
                }
            }
        }

        self.context
            .add_expression(Expression::Literal(Literal::Table { table_id }))
    }
}
