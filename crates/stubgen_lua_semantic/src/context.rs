use rustc_hash::FxHashMap;
use stubgen_lua_ast::{Expr, ExprTableConstructor, FunctionDeclaration, Name};

use crate::dependency::AliasMap;
use crate::expression::{Expression, ExpressionId, ExpressionInfo, ReferenceKey};
use crate::ids::{Id, IdAllocator, IdKind};
use crate::info::{FunctionInfo, TableInfo};
use crate::module_name::ModuleName;
use crate::scope::{ResolvedReturn, ResolvedScope};
use crate::settings::AnalyzerSettings;
use crate::usage::Usage;
use crate::FxOrderMap;

/// Compact key for an AST node, for the per-module expression cache.
///
/// The memory address is the identity: ranges are not unique in ASTs
/// recovered from invalid syntax, and the cache never outlives the module
/// whose tree it points into.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct NodeKey(usize);

impl NodeKey {
    pub(crate) fn from_expr(node: &Expr) -> Self {
        Self(std::ptr::from_ref(node) as usize)
    }

    pub(crate) fn from_function(node: &FunctionDeclaration) -> Self {
        Self(std::ptr::from_ref(node) as usize)
    }

    pub(crate) fn from_constructor(node: &ExprTableConstructor) -> Self {
        Self(std::ptr::from_ref(node) as usize)
    }
}

/// One source file's analysis-time state and results.
#[derive(Clone, Debug)]
pub struct Module {
    pub name: ModuleName,
    /// Tags attached by schema files (e.g. a hidden or definition-only
    /// marker).
    pub tags: Vec<Name>,
    /// Prefix directive for emitted names, when a schema provides one.
    pub prefix: Option<Name>,
    /// The module's return positions, as resolved from its top-level
    /// `return` statements.
    pub returns: Vec<ResolvedReturn>,
    /// The resolved form of the module scope; set exactly once, when the
    /// scope walker finishes the file.
    pub resolved: Option<ResolvedScope>,
    /// Every class promoted while this module was current, in promotion
    /// order. May include classes the resolved scope tree also lists; the
    /// finalizer deduplicates on table id.
    pub seen_classes: Vec<Id>,
}

impl Module {
    pub fn new(name: ModuleName) -> Self {
        Self {
            name,
            tags: Vec::new(),
            prefix: None,
            returns: Vec::new(),
            resolved: None,
            seen_classes: Vec::new(),
        }
    }
}

/// The single owner of all cross-module analysis state.
///
/// Passed explicitly to every component; nothing in the pipeline keeps
/// state anywhere else. Single-threaded by construction.
#[derive(Debug)]
pub struct AnalysisContext {
    settings: AnalyzerSettings,
    ids: IdAllocator,

    expressions: Vec<Expression>,
    /// AST node to normalized expression, cleared per module.
    expression_cache: FxHashMap<NodeKey, ExpressionId>,
    /// AST node to table/function id, cleared per module.
    table_id_cache: FxHashMap<NodeKey, Id>,
    function_id_cache: FxHashMap<NodeKey, Id>,

    usage: FxHashMap<ExpressionId, Usage>,
    definitions: FxOrderMap<ReferenceKey, Vec<ExpressionInfo>>,
    tables: FxHashMap<Id, TableInfo>,
    functions: FxHashMap<Id, FunctionInfo>,
    /// Instance id to the class table it is an instance of.
    instances: FxHashMap<Id, Id>,
    /// Parameter (and self-parameter) id to the function declaring it.
    parameter_owners: FxHashMap<Id, Id>,

    modules: FxOrderMap<ModuleName, Module>,
    aliases: AliasMap,
    /// Placeholder class tables for unknown globals, per module.
    unknown_classes: FxHashMap<Name, Id>,
    current_module: Option<ModuleName>,
}

impl AnalysisContext {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self {
            settings,
            ids: IdAllocator::default(),
            expressions: Vec::new(),
            expression_cache: FxHashMap::default(),
            table_id_cache: FxHashMap::default(),
            function_id_cache: FxHashMap::default(),
            usage: FxHashMap::default(),
            definitions: FxOrderMap::default(),
            tables: FxHashMap::default(),
            functions: FxHashMap::default(),
            instances: FxHashMap::default(),
            parameter_owners: FxHashMap::default(),
            modules: FxOrderMap::default(),
            aliases: AliasMap::default(),
            unknown_classes: FxHashMap::default(),
            current_module: None,
        }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    // --- ids ---------------------------------------------------------------

    pub fn allocate_id(&mut self, kind: IdKind, name: impl Into<Name>) -> Id {
        self.ids.allocate(kind, name)
    }

    /// Allocates a table id and its (empty) info record.
    pub fn new_table_id(&mut self, name: impl Into<Name>) -> Id {
        let id = self.ids.allocate(IdKind::Table, name);
        let mut info = TableInfo::default();
        info.defining_module = self.current_module.clone();
        self.tables.insert(id.clone(), info);
        id
    }

    /// Allocates a function id and its (empty) info record.
    pub fn new_function_id(&mut self, name: impl Into<Name>) -> Id {
        let id = self.ids.allocate(IdKind::Function, name);
        self.functions.insert(id.clone(), FunctionInfo::default());
        id
    }

    /// The table id for a table-constructor node, allocated on first sight.
    pub(crate) fn table_id_for_constructor(
        &mut self,
        node: &ExprTableConstructor,
        name: Option<&Name>,
    ) -> Id {
        let key = NodeKey::from_constructor(node);
        if let Some(id) = self.table_id_cache.get(&key) {
            return id.clone();
        }
        let id = self.new_table_id(name.cloned().unwrap_or_default());
        self.table_id_cache.insert(key, id.clone());
        id
    }

    /// The function id for a function node, allocated on first sight.
    pub(crate) fn function_id_for_node(
        &mut self,
        node: &FunctionDeclaration,
        name: Option<&Name>,
    ) -> Id {
        let key = NodeKey::from_function(node);
        if let Some(id) = self.function_id_cache.get(&key) {
            return id.clone();
        }
        let id = self.new_function_id(name.cloned().unwrap_or_default());
        self.function_id_cache.insert(key, id.clone());
        id
    }

    /// The instance id bound to a class table, materialized on demand.
    pub fn instance_id_for(&mut self, table_id: &Id) -> Id {
        if let Some(existing) = self
            .tables
            .get(table_id)
            .and_then(|info| info.instance_id.clone())
        {
            return existing;
        }
        let name = self
            .tables
            .get(table_id)
            .and_then(|info| info.class_name.clone())
            .unwrap_or_else(|| table_id.name().clone());
        let instance = self.ids.allocate(IdKind::Instance, name);
        self.instances.insert(instance.clone(), table_id.clone());
        if let Some(info) = self.tables.get_mut(table_id) {
            info.instance_id = Some(instance.clone());
        }
        instance
    }

    /// The class table an instance id was materialized for.
    pub fn instance_class(&self, instance: &Id) -> Option<&Id> {
        self.instances.get(instance)
    }

    /// Binds a parameter id to the function that declares it.
    pub fn register_parameter(&mut self, parameter: Id, function: Id) {
        self.parameter_owners.insert(parameter, function);
    }

    /// The accumulated type set of a parameter or self-parameter marker.
    pub fn parameter_types(&self, parameter: &Id) -> Option<&crate::types::TypeSet> {
        let function = self.parameter_owners.get(parameter)?;
        let info = self.functions.get(function)?;
        if let Some(receiver) = &info.self_parameter {
            if &receiver.id == parameter {
                return Some(&receiver.types);
            }
        }
        info.parameters
            .iter()
            .find(|candidate| &candidate.id == parameter)
            .map(|candidate| &candidate.types)
    }

    // --- expressions -------------------------------------------------------

    pub fn add_expression(&mut self, expression: Expression) -> ExpressionId {
        let id = ExpressionId::from_usize(self.expressions.len());
        self.expressions.push(expression);
        id
    }

    pub fn expression(&self, id: ExpressionId) -> &Expression {
        &self.expressions[id.as_usize()]
    }

    pub(crate) fn cached_expression(&self, node: &Expr) -> Option<ExpressionId> {
        self.expression_cache.get(&NodeKey::from_expr(node)).copied()
    }

    pub(crate) fn cache_expression(&mut self, node: &Expr, id: ExpressionId) {
        self.expression_cache.insert(NodeKey::from_expr(node), id);
    }

    // --- usage -------------------------------------------------------------

    pub fn usage(&self, expression: ExpressionId) -> Option<&Usage> {
        self.usage.get(&expression)
    }

    pub fn usage_mut(&mut self, expression: ExpressionId) -> &mut Usage {
        self.usage.entry(expression).or_default()
    }

    // --- definitions -------------------------------------------------------

    pub fn add_definition(&mut self, key: ReferenceKey, info: ExpressionInfo) {
        self.definitions.entry(key).or_default().push(info);
    }

    pub fn definitions(&self, key: &ReferenceKey) -> &[ExpressionInfo] {
        self.definitions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn definition_keys(&self) -> impl Iterator<Item = &ReferenceKey> {
        self.definitions.keys()
    }

    // --- tables and functions ----------------------------------------------

    /// The info record for a table id, created on demand.
    pub fn table_info_mut(&mut self, id: &Id) -> &mut TableInfo {
        debug_assert!(id.is_table());
        self.tables.entry(id.clone()).or_default()
    }

    pub fn table_info(&self, id: &Id) -> Option<&TableInfo> {
        self.tables.get(id)
    }

    /// The info record for a function id, created on demand.
    pub fn function_info_mut(&mut self, id: &Id) -> &mut FunctionInfo {
        debug_assert!(id.is_function());
        self.functions.entry(id.clone()).or_default()
    }

    pub fn function_info(&self, id: &Id) -> Option<&FunctionInfo> {
        self.functions.get(id)
    }

    pub fn table_ids(&self) -> impl Iterator<Item = &Id> {
        self.tables.keys()
    }

    // --- modules -----------------------------------------------------------

    pub fn set_alias_map(&mut self, aliases: AliasMap) {
        self.aliases = aliases;
    }

    pub fn aliases(&self) -> &AliasMap {
        &self.aliases
    }

    pub fn register_module(&mut self, module: Module) {
        self.modules.insert(module.name.clone(), module);
    }

    pub fn module(&self, name: &ModuleName) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn module_mut(&mut self, name: &ModuleName) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Resolves a module name, falling back to the alias map when no exact
    /// match exists.
    pub fn resolve_module_name(&self, name: &ModuleName) -> Option<ModuleName> {
        if self.modules.contains_key(name) {
            return Some(name.clone());
        }
        let current_partition = self
            .current_module
            .as_ref()
            .and_then(|module| module.partition().map(str::to_string));
        self.aliases
            .resolve(name, current_partition.as_deref())
            .first()
            .cloned()
    }

    /// Makes `name` the module being read, clearing the per-module caches.
    pub fn begin_module(&mut self, name: ModuleName) {
        self.expression_cache.clear();
        self.table_id_cache.clear();
        self.function_id_cache.clear();
        self.unknown_classes.clear();
        self.current_module = Some(name);
    }

    pub fn current_module(&self) -> Option<&ModuleName> {
        self.current_module.as_ref()
    }

    /// Remembers a class promotion against the current module.
    pub fn record_seen_class(&mut self, table_id: Id) {
        if let Some(name) = self.current_module.clone() {
            if let Some(module) = self.modules.get_mut(&name) {
                if !module.seen_classes.contains(&table_id) {
                    module.seen_classes.push(table_id);
                }
            }
        }
    }

    // --- unknown globals ---------------------------------------------------

    pub fn unknown_class(&self, name: &str) -> Option<&Id> {
        self.unknown_classes.get(name)
    }

    pub fn set_unknown_class(&mut self, name: Name, table_id: Id) {
        self.unknown_classes.insert(name, table_id);
    }
}

#[cfg(test)]
mod tests {
    use super::{AnalysisContext, Module};
    use crate::module_name::ModuleName;
    use crate::settings::AnalyzerSettings;

    fn context() -> AnalysisContext {
        AnalysisContext::new(AnalyzerSettings::default())
    }

    #[test]
    fn table_ids_are_unique_and_backed_by_info() {
        let mut context = context();
        let first = context.new_table_id("A");
        let second = context.new_table_id("A");

        assert_ne!(first, second);
        assert!(context.table_info(&first).is_some());
        assert!(context.table_info(&second).is_some());
    }

    #[test]
    fn instance_ids_are_memoized_per_class() {
        let mut context = context();
        let class = context.new_table_id("Foo");

        let instance = context.instance_id_for(&class);
        let again = context.instance_id_for(&class);

        assert_eq!(instance, again);
        assert_eq!(context.instance_class(&instance), Some(&class));
    }

    #[test]
    fn begin_module_clears_per_module_state() {
        let mut context = context();
        let name = ModuleName::from_path("shared/a.lua").unwrap();
        context.register_module(Module::new(name.clone()));
        context.begin_module(name.clone());

        let placeholder = context.new_table_id("Ghost");
        context.set_unknown_class("Ghost".into(), placeholder);
        assert!(context.unknown_class("Ghost").is_some());

        let next = ModuleName::from_path("shared/b.lua").unwrap();
        context.begin_module(next);
        assert!(context.unknown_class("Ghost").is_none());
    }

    #[test]
    fn seen_classes_record_against_the_current_module() {
        let mut context = context();
        let name = ModuleName::from_path("shared/a.lua").unwrap();
        context.register_module(Module::new(name.clone()));
        context.begin_module(name.clone());

        let class = context.new_table_id("Foo");
        context.record_seen_class(class.clone());
        context.record_seen_class(class.clone());

        let module = context.module(&name).unwrap();
        assert_eq!(module.seen_classes, [class]);
    }
}
