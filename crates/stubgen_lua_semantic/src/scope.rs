use rustc_hash::FxHashMap;
use stubgen_lua_ast::Name;

use crate::expression::{ExpressionId, ExpressionInfo};
use crate::ids::Id;
use crate::module_name::ModuleName;
use crate::types::TypeSet;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum ScopeKind {
    Module,
    Function,
    Block,
}

/// A lexical scope under construction.
///
/// Scopes exist only while their module is being read: each one collects an
/// ordered item list, and on exit the resolver turns it into a
/// [`ResolvedScope`] pushed onto the parent's items.
#[derive(Debug)]
pub(crate) struct Scope {
    pub kind: ScopeKind,
    /// The id the scope allocates its locals under: the module id for
    /// module scopes, the function id for function scopes. Block scopes
    /// inherit their parent's owner.
    pub owner: Id,
    pub items: Vec<ScopeItem>,
    /// Locals declared in this scope, by source name. Redeclaration
    /// shadows: the map keeps the newest id.
    locals: FxHashMap<Name, Id>,
    /// Reverse map, used to recover source names for class naming.
    local_names: FxHashMap<Id, Name>,
    /// Closure-class slot: the local (`self` or `publ`) the enclosing
    /// function builds and returns, when the pattern has been seen.
    pub class_self_name: Option<Name>,
    pub class_table_id: Option<Id>,
    /// Whether a `self.X = function ... end` definition was seen against
    /// the closure-class slot.
    pub has_self_method: bool,
    /// Tables promoted to classes while this scope was current.
    pub promoted: Vec<Id>,
}

impl Scope {
    pub fn new(kind: ScopeKind, owner: Id) -> Self {
        Self {
            kind,
            owner,
            items: Vec::new(),
            locals: FxHashMap::default(),
            local_names: FxHashMap::default(),
            class_self_name: None,
            class_table_id: None,
            has_self_method: false,
            promoted: Vec::new(),
        }
    }

    pub fn declare_local(&mut self, name: Name, id: Id) {
        self.local_names.insert(id.clone(), name.clone());
        self.locals.insert(name, id);
    }

    pub fn local(&self, name: &str) -> Option<&Id> {
        self.locals.get(name)
    }

    pub fn local_source_name(&self, id: &Id) -> Option<&Name> {
        self.local_names.get(id)
    }

    pub fn push(&mut self, item: ScopeItem) {
        self.items.push(item);
    }
}

/// One entry in a scope's ordered item list.
#[derive(Debug)]
pub(crate) enum ScopeItem {
    Assignment(AssignmentItem),
    RequireAssignment(RequireAssignmentItem),
    Returns(ReturnsItem),
    /// A sub-scope that has already been read and resolved.
    Resolved(ResolvedScope),
}

/// `target = value`, one item per target position.
#[derive(Debug)]
pub(crate) struct AssignmentItem {
    /// The normalized target: a reference, member, or index expression.
    pub target: ExpressionId,
    pub value: ExpressionInfo,
    /// The value is a function literal declared at this site (as opposed
    /// to flowing in from elsewhere).
    pub is_function_definition: bool,
}

/// `target = require("...")`.
#[derive(Debug)]
pub(crate) struct RequireAssignmentItem {
    pub target: ExpressionId,
    pub value: ExpressionInfo,
    pub module: ModuleName,
}

/// A `return` statement's positions, or the injected empty return for a
/// function body without one.
#[derive(Debug)]
pub(crate) struct ReturnsItem {
    pub expressions: Vec<ExpressionId>,
}

/// The resolver's output for one scope.
#[derive(Clone, Debug, Default)]
pub struct ResolvedScope {
    /// Tables promoted to classes while resolving this scope, in promotion
    /// order.
    pub classes: Vec<Id>,
    /// Named non-class tables bound in this scope.
    pub tables: Vec<(Name, Id)>,
    /// Named functions bound in this scope.
    pub functions: Vec<(Name, Id)>,
    /// Global scalar bindings (module scopes only).
    pub fields: Vec<(Name, TypeSet)>,
    /// Resolved return positions (function and module scopes).
    pub returns: Vec<ResolvedReturn>,
}

#[derive(Clone, Debug)]
pub struct ResolvedReturn {
    pub types: TypeSet,
    pub expression: Option<ExpressionInfo>,
}

impl ResolvedScope {
    /// Folds a child scope's results into this one. Classes, tables, and
    /// functions bubble upward; returns stay with the scope that produced
    /// them.
    pub fn absorb(&mut self, child: &ResolvedScope) {
        self.classes.extend(child.classes.iter().cloned());
        self.tables.extend(child.tables.iter().cloned());
        self.functions.extend(child.functions.iter().cloned());
    }
}
