use compact_str::CompactString;
use indexmap::IndexSet;
use itertools::Itertools;
use rustc_hash::{FxHashMap, FxHashSet};
use stubgen_lua_ast::{Chunk, Expr, IfClause, Name, Parameter, Stmt};

use crate::module_name::ModuleName;
use crate::settings::AnalyzerSettings;
use crate::FxOrderSet;

/// What one file touches beyond its own locals.
#[derive(Clone, Debug, Default)]
pub struct FileDependencies {
    /// Free identifier reads: globals the file consumes.
    pub reads: FxOrderSet<Name>,
    /// Globals the file assigns at module scope.
    pub writes: FxOrderSet<Name>,
    /// Requires with a syntactically-resolvable argument.
    pub requires: Vec<ModuleName>,
}

/// Collects reads, writes, and requires with a lightweight scope walk; no
/// expression normalization happens here.
pub fn scan_chunk(chunk: &Chunk) -> FileDependencies {
    let mut scanner = DependencyScanner::default();
    scanner.push_scope();
    for statement in &chunk.body {
        scanner.visit_stmt(statement);
    }
    scanner.dependencies
}

#[derive(Default)]
struct DependencyScanner {
    dependencies: FileDependencies,
    locals: Vec<FxHashSet<Name>>,
    function_depth: usize,
}

impl DependencyScanner {
    fn push_scope(&mut self) {
        self.locals.push(FxHashSet::default());
    }

    fn pop_scope(&mut self) {
        self.locals.pop();
    }

    fn declare(&mut self, name: &Name) {
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(name.clone());
        }
    }

    fn is_bound(&self, name: &str) -> bool {
        self.locals.iter().rev().any(|scope| scope.contains(name))
    }

    fn read(&mut self, name: &Name) {
        if !self.is_bound(name) {
            self.dependencies.reads.insert(name.clone());
        }
    }

    fn write(&mut self, name: &Name) {
        if self.function_depth == 0 && !self.is_bound(name) {
            self.dependencies.writes.insert(name.clone());
        } else {
            self.read(name);
        }
    }

    fn visit_body(&mut self, body: &[Stmt]) {
        self.push_scope();
        for statement in body {
            self.visit_stmt(statement);
        }
        self.pop_scope();
    }

    fn visit_stmt(&mut self, statement: &Stmt) {
        match statement {
            Stmt::Local(local) => {
                for value in &local.values {
                    self.visit_expr(value);
                }
                for target in &local.targets {
                    self.declare(&target.name);
                }
            }
            Stmt::Assignment(assignment) => {
                for value in &assignment.values {
                    self.visit_expr(value);
                }
                for target in &assignment.targets {
                    match target {
                        Expr::Identifier(identifier) => self.write(&identifier.name),
                        other => self.visit_expr(other),
                    }
                }
            }
            Stmt::Return(ret) => {
                for value in &ret.values {
                    self.visit_expr(value);
                }
            }
            Stmt::If(if_stmt) => {
                for clause in &if_stmt.clauses {
                    if let Some(condition) = clause.condition() {
                        self.visit_expr(condition);
                    }
                    self.visit_body(clause.body());
                }
            }
            Stmt::While(while_stmt) => {
                self.visit_expr(&while_stmt.condition);
                self.visit_body(&while_stmt.body);
            }
            Stmt::Repeat(repeat) => {
                // The condition sees the body's locals.
                self.push_scope();
                for statement in &repeat.body {
                    self.visit_stmt(statement);
                }
                self.visit_expr(&repeat.condition);
                self.pop_scope();
            }
            Stmt::Do(do_stmt) => self.visit_body(&do_stmt.body),
            Stmt::ForNumeric(for_numeric) => {
                self.visit_expr(&for_numeric.start);
                self.visit_expr(&for_numeric.end);
                if let Some(step) = &for_numeric.step {
                    self.visit_expr(step);
                }
                self.push_scope();
                self.declare(&for_numeric.variable.name);
                for statement in &for_numeric.body {
                    self.visit_stmt(statement);
                }
                self.pop_scope();
            }
            Stmt::ForGeneric(for_generic) => {
                for iterator in &for_generic.iterators {
                    self.visit_expr(iterator);
                }
                self.push_scope();
                for variable in &for_generic.variables {
                    self.declare(&variable.name);
                }
                for statement in &for_generic.body {
                    self.visit_stmt(statement);
                }
                self.pop_scope();
            }
            Stmt::FunctionDeclaration(function) => {
                match function.identifier.as_deref() {
                    Some(Expr::Identifier(identifier)) => {
                        if function.is_local {
                            self.declare(&identifier.name);
                        } else {
                            self.write(&identifier.name);
                        }
                    }
                    Some(identifier) => self.visit_expr(identifier),
                    None => {}
                }
                self.visit_function(function);
            }
            Stmt::Call(call) => self.visit_expr(&call.call),
            Stmt::Break(_) => {}
        }
    }

    fn visit_function(&mut self, function: &stubgen_lua_ast::FunctionDeclaration) {
        self.function_depth += 1;
        self.push_scope();
        if matches!(
            function.identifier.as_deref(),
            Some(Expr::Member(member)) if member.indexer == stubgen_lua_ast::Indexer::Colon
        ) {
            self.declare(&Name::new_static("self"));
        }
        for parameter in &function.parameters {
            if let Parameter::Name(identifier) = parameter {
                self.declare(&identifier.name);
            }
        }
        for statement in &function.body {
            self.visit_stmt(statement);
        }
        self.pop_scope();
        self.function_depth -= 1;
    }

    fn visit_expr(&mut self, expression: &Expr) {
        match expression {
            Expr::Identifier(identifier) => self.read(&identifier.name),
            Expr::Vararg(_)
            | Expr::StringLiteral(_)
            | Expr::NumericLiteral(_)
            | Expr::BooleanLiteral(_)
            | Expr::NilLiteral(_) => {}
            Expr::TableConstructor(table) => {
                for field in &table.fields {
                    match field {
                        stubgen_lua_ast::TableField::Value { value }
                        | stubgen_lua_ast::TableField::KeyString { value, .. } => {
                            self.visit_expr(value);
                        }
                        stubgen_lua_ast::TableField::Key { key, value } => {
                            self.visit_expr(key);
                            self.visit_expr(value);
                        }
                    }
                }
            }
            Expr::Member(member) => self.visit_expr(&member.base),
            Expr::Index(index) => {
                self.visit_expr(&index.base);
                self.visit_expr(&index.index);
            }
            Expr::Unary(unary) => self.visit_expr(&unary.operand),
            Expr::Binary(binary) => {
                self.visit_expr(&binary.left);
                self.visit_expr(&binary.right);
            }
            Expr::Logical(logical) => {
                self.visit_expr(&logical.left);
                self.visit_expr(&logical.right);
            }
            Expr::Call(call) => {
                if let Some(required) = require_argument(expression) {
                    self.dependencies.requires.push(required);
                    return;
                }
                self.visit_expr(&call.base);
                for argument in &call.arguments {
                    self.visit_expr(argument);
                }
            }
            Expr::StringCall(call) => {
                if let Some(required) = require_argument(expression) {
                    self.dependencies.requires.push(required);
                    return;
                }
                self.visit_expr(&call.base);
            }
            Expr::TableCall(call) => {
                self.visit_expr(&call.base);
                for field in &call.argument.fields {
                    match field {
                        stubgen_lua_ast::TableField::Value { value }
                        | stubgen_lua_ast::TableField::KeyString { value, .. } => {
                            self.visit_expr(value);
                        }
                        stubgen_lua_ast::TableField::Key { key, value } => {
                            self.visit_expr(key);
                            self.visit_expr(value);
                        }
                    }
                }
            }
            Expr::Function(function) => self.visit_function(function),
        }
    }
}

/// The module a call requires, when the call is a `require` with a string
/// argument the resolver can see through.
pub(crate) fn require_argument(expression: &Expr) -> Option<ModuleName> {
    let is_require = expression
        .call_base()?
        .as_identifier()
        .is_some_and(|identifier| identifier.name == "require");
    if !is_require {
        return None;
    }
    match expression {
        Expr::Call(call) => match call.arguments.first() {
            Some(Expr::StringLiteral(literal)) => ModuleName::from_require(&literal.value),
            _ => None,
        },
        Expr::StringCall(call) => ModuleName::from_require(&call.argument.value),
        _ => None,
    }
}

/// Suffix aliases for require resolution, computed once per run.
///
/// For `a/b/c`, the suffixes `b/c` and `c` both map back to the full
/// identifier. Immutable once built.
#[derive(Clone, Debug, Default)]
pub struct AliasMap {
    suffixes: FxHashMap<CompactString, Vec<ModuleName>>,
}

impl AliasMap {
    pub fn from_module_names<'a>(names: impl IntoIterator<Item = &'a ModuleName>) -> Self {
        let mut suffixes: FxHashMap<CompactString, Vec<ModuleName>> = FxHashMap::default();
        for name in names {
            for suffix in name.suffixes() {
                suffixes
                    .entry(CompactString::from(suffix))
                    .or_default()
                    .push(name.clone());
            }
        }
        Self { suffixes }
    }

    /// Candidate identifiers for an unresolved require. A unique alias
    /// resolves outright; among several, candidates in the preferred
    /// partition win; otherwise every candidate is returned and the caller
    /// decides.
    pub fn resolve(&self, target: &ModuleName, preferred_partition: Option<&str>) -> Vec<ModuleName> {
        let Some(candidates) = self.suffixes.get(target.as_str()) else {
            return Vec::new();
        };
        if candidates.len() == 1 {
            return candidates.clone();
        }
        if let Some(partition) = preferred_partition {
            let preferred: Vec<_> = candidates
                .iter()
                .filter(|candidate| candidate.partition() == Some(partition))
                .cloned()
                .collect();
            if preferred.len() == 1 {
                return preferred;
            }
        }
        candidates.clone()
    }
}

/// The deterministic analysis order for a set of scanned files.
pub fn analysis_order(
    files: &[(ModuleName, FileDependencies)],
    settings: &AnalyzerSettings,
) -> Vec<ModuleName> {
    let names: Vec<ModuleName> = files.iter().map(|(name, _)| name.clone()).collect();
    let by_name: FxHashMap<&ModuleName, &FileDependencies> =
        files.iter().map(|(name, deps)| (name, deps)).collect();
    let aliases = AliasMap::from_module_names(&names);
    let known: FxHashSet<&ModuleName> = names.iter().collect();

    // Which files write each global.
    let mut setters: FxHashMap<&Name, Vec<&ModuleName>> = FxHashMap::default();
    for (name, dependencies) in files {
        for written in &dependencies.writes {
            setters.entry(written).or_default().push(name);
        }
    }

    let dependencies_of = |file: &ModuleName| -> IndexSet<ModuleName> {
        let mut result = IndexSet::new();
        let Some(scanned) = by_name.get(file) else {
            return result;
        };
        for required in &scanned.requires {
            if known.contains(required) {
                result.insert(required.clone());
                continue;
            }
            let candidates = aliases.resolve(required, file.partition());
            match candidates.len() {
                0 => {}
                1 => {
                    result.insert(candidates[0].clone());
                }
                _ if settings.ambiguity => {
                    result.extend(candidates);
                }
                _ => {}
            }
        }
        for read in &scanned.reads {
            if let Some(writers) = setters.get(read) {
                result.extend(writers.iter().map(|writer| (*writer).clone()));
            }
        }
        result.shift_remove(file);
        result
    };

    let mut order: IndexSet<ModuleName> = IndexSet::new();
    let mut seen: FxHashSet<ModuleName> = FxHashSet::default();

    for partition in partitions(&names, settings) {
        let mut stack: Vec<ModuleName> = partition;
        stack.reverse();
        while let Some(file) = stack.pop() {
            if order.contains(&file) {
                continue;
            }
            let pending: Vec<ModuleName> = dependencies_of(&file)
                .into_iter()
                .filter(|dependency| !order.contains(dependency) && !seen.contains(dependency))
                .collect();
            if pending.is_empty() {
                order.insert(file);
            } else {
                seen.insert(file.clone());
                stack.push(file);
                for dependency in pending.into_iter().rev() {
                    stack.push(dependency);
                }
            }
        }
    }

    order.into_iter().collect()
}

/// Splits the file set into ordered partitions: the configured
/// subdirectories first, in their configured order, then everything else.
/// Each partition sorts case-insensitively.
fn partitions(names: &[ModuleName], settings: &AnalyzerSettings) -> Vec<Vec<ModuleName>> {
    let mut remaining: Vec<ModuleName> = names.to_vec();
    let mut result = Vec::new();

    let configured: Vec<&str> = settings
        .subdirectories
        .iter()
        .map(String::as_str)
        .collect();

    if configured.is_empty() {
        // Every top-level subdirectory, discovered from the file set.
        let discovered: Vec<String> = remaining
            .iter()
            .filter_map(|name| name.partition().map(str::to_string))
            .unique()
            .sorted_by_key(|partition| partition.to_lowercase())
            .collect();
        for partition in discovered {
            result.push(take_partition(&mut remaining, &partition));
        }
    } else {
        for partition in configured {
            result.push(take_partition(&mut remaining, partition));
        }
    }

    if !remaining.is_empty() {
        sort_case_insensitive(&mut remaining);
        result.push(remaining);
    }
    result
}

fn take_partition(remaining: &mut Vec<ModuleName>, partition: &str) -> Vec<ModuleName> {
    let mut taken = Vec::new();
    remaining.retain(|name| {
        if name.partition() == Some(partition) {
            taken.push(name.clone());
            false
        } else {
            true
        }
    });
    sort_case_insensitive(&mut taken);
    taken
}

fn sort_case_insensitive(names: &mut [ModuleName]) {
    names.sort_by(|left, right| {
        left.as_str()
            .to_lowercase()
            .cmp(&right.as_str().to_lowercase())
    });
}

#[cfg(test)]
mod tests {
    use stubgen_lua_ast::{Chunk, Expr, Indexer, Stmt};

    use super::{analysis_order, scan_chunk, AliasMap, FileDependencies};
    use crate::module_name::ModuleName;
    use crate::settings::AnalyzerSettings;

    fn module(name: &str) -> ModuleName {
        ModuleName::from_path(name).unwrap()
    }

    fn requires(names: &[&str]) -> FileDependencies {
        FileDependencies {
            requires: names.iter().map(|name| module(name)).collect(),
            ..FileDependencies::default()
        }
    }

    #[test]
    fn scan_collects_reads_writes_and_requires() {
        let chunk = Chunk::new(vec![
            Stmt::call(Expr::string_call(Expr::identifier("require"), "shared.util")),
            Stmt::local(vec!["x"], vec![Expr::identifier("GlobalRead")]),
            Stmt::assign(vec![Expr::identifier("GlobalWrite")], vec![Expr::identifier("x")]),
        ]);
        let scanned = scan_chunk(&chunk);

        assert!(scanned.reads.contains("GlobalRead"));
        assert!(!scanned.reads.contains("x"));
        assert!(scanned.writes.contains("GlobalWrite"));
        assert_eq!(scanned.requires, [module("shared/util")]);
    }

    #[test]
    fn scan_ignores_locals_in_nested_functions() {
        let chunk = Chunk::new(vec![Stmt::function_declaration(
            Expr::member(Expr::identifier("M"), Indexer::Colon, "method"),
            vec![stubgen_lua_ast::Parameter::name("a")],
            vec![Stmt::ret(vec![
                Expr::identifier("self"),
                Expr::identifier("a"),
                Expr::identifier("Free"),
            ])],
        )]);
        let scanned = scan_chunk(&chunk);

        assert!(scanned.reads.contains("M"));
        assert!(scanned.reads.contains("Free"));
        assert!(!scanned.reads.contains("self"));
        assert!(!scanned.reads.contains("a"));
    }

    #[test]
    fn assignments_inside_functions_are_not_module_writes() {
        let chunk = Chunk::new(vec![Stmt::function_declaration(
            Expr::identifier("f"),
            vec![],
            vec![Stmt::assign(
                vec![Expr::identifier("Inner")],
                vec![Expr::number("1")],
            )],
        )]);
        let scanned = scan_chunk(&chunk);

        assert!(scanned.writes.contains("f"));
        assert!(!scanned.writes.contains("Inner"));
        assert!(scanned.reads.contains("Inner"));
    }

    #[test]
    fn alias_map_prefers_current_partition() {
        let names = [
            module("client/ui/Button"),
            module("server/ui/Button"),
            module("shared/util"),
        ];
        let aliases = AliasMap::from_module_names(&names);

        let unique = aliases.resolve(&module("util"), None);
        assert_eq!(unique, [module("shared/util")]);

        let preferred = aliases.resolve(&module("ui/Button"), Some("server"));
        assert_eq!(preferred, [module("server/ui/Button")]);

        let ambiguous = aliases.resolve(&module("Button"), None);
        assert_eq!(ambiguous.len(), 2);
    }

    #[test]
    fn order_follows_requires() {
        let files = vec![
            (module("shared/a"), requires(&["shared/b"])),
            (module("shared/b"), FileDependencies::default()),
        ];
        let order = analysis_order(&files, &AnalyzerSettings::default());
        assert_eq!(order, [module("shared/b"), module("shared/a")]);
    }

    #[test]
    fn order_respects_partition_sequence() {
        let files = vec![
            (module("client/x"), FileDependencies::default()),
            (module("server/y"), FileDependencies::default()),
            (module("shared/z"), FileDependencies::default()),
        ];
        let order = analysis_order(&files, &AnalyzerSettings::default());
        assert_eq!(
            order,
            [module("shared/z"), module("client/x"), module("server/y")]
        );
    }

    #[test]
    fn order_is_case_insensitive_within_partition() {
        let files = vec![
            (module("shared/beta"), FileDependencies::default()),
            (module("shared/Alpha"), FileDependencies::default()),
        ];
        let order = analysis_order(&files, &AnalyzerSettings::default());
        assert_eq!(order, [module("shared/Alpha"), module("shared/beta")]);
    }

    #[test]
    fn cycles_terminate_and_include_every_member() {
        let files = vec![
            (module("shared/u"), requires(&["shared/v"])),
            (module("shared/v"), requires(&["shared/u"])),
        ];
        let order = analysis_order(&files, &AnalyzerSettings::default());
        assert_eq!(order.len(), 2);
        assert!(order.contains(&module("shared/u")));
        assert!(order.contains(&module("shared/v")));
    }

    #[test]
    fn global_readers_follow_their_setters() {
        let mut reader = FileDependencies::default();
        reader.reads.insert("Registry".into());
        let mut writer = FileDependencies::default();
        writer.writes.insert("Registry".into());

        let files = vec![
            (module("shared/a_reader"), reader),
            (module("shared/b_writer"), writer),
        ];
        let order = analysis_order(&files, &AnalyzerSettings::default());
        assert_eq!(order, [module("shared/b_writer"), module("shared/a_reader")]);
    }

    #[test]
    fn cross_partition_dependency_pulls_the_dependency_forward() {
        let files = vec![
            (module("shared/a"), requires(&["client/widget"])),
            (module("client/widget"), FileDependencies::default()),
        ];
        let order = analysis_order(&files, &AnalyzerSettings::default());
        assert_eq!(order, [module("client/widget"), module("shared/a")]);
    }
}
