use std::fmt;

use stubgen_lua_ast::Name;

use crate::expression::{ExpressionId, ExpressionInfo};
use crate::ids::Id;
use crate::module_name::ModuleName;
use crate::types::{Type, TypeSet};
use crate::FxOrderMap;

/// Key of a table field: a member name or a statically-known literal index.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct FieldKey(Name);

impl FieldKey {
    pub fn name(name: impl Into<Name>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for one table, keyed by its table id in the context.
///
/// A table may be promoted to a class at most once; the class resolver is
/// the only component that does so. The one sanctioned exception is a
/// local derive-class being re-bound to a global name, which renames the
/// class in place.
#[derive(Clone, Debug, Default)]
pub struct TableInfo {
    /// Positional constructor fields, in source order.
    pub literal_fields: Vec<ExpressionInfo>,
    /// Field definitions: key to the ordered definitions observed for it.
    pub definitions: FxOrderMap<FieldKey, Vec<ExpressionInfo>>,
    /// Set when the table has been promoted to a class.
    pub class_name: Option<Name>,
    /// Table id of the class this table is nested inside.
    pub container_id: Option<Id>,
    /// The source-level name the table was first bound to.
    pub original_name: Option<Name>,
    pub is_closure_class: bool,
    pub is_local_class: bool,
    pub is_local_derive_class: bool,
    /// A placeholder created for an unknown global; merged into the real
    /// class when one appears, and never emitted itself.
    pub is_empty_class: bool,
    pub is_atom_ui: bool,
    pub is_atom_ui_base: bool,
    /// Emit as a plain table even though a class was detected, to avoid a
    /// duplicate class entry on the same container.
    pub emit_as_table: bool,
    pub instance_name: Option<Name>,
    /// The `@instance` id materialized for values carrying instances of
    /// this class.
    pub instance_id: Option<Id>,
    pub defining_module: Option<ModuleName>,
    /// Source name of the base class in a derive call.
    pub original_base: Option<Name>,
    /// The string argument of the derive call that created this class.
    pub original_derive_name: Option<Name>,
}

impl TableInfo {
    pub fn is_class(&self) -> bool {
        self.class_name.is_some()
    }

    /// Records a field definition, appending to the key's definition list.
    pub fn add_definition(&mut self, key: FieldKey, info: ExpressionInfo) {
        self.definitions.entry(key).or_default().push(info);
    }

    pub fn field_definitions(&self, key: &FieldKey) -> &[ExpressionInfo] {
        self.definitions.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether the table carries nothing that would distinguish it from a
    /// fresh `{}`.
    pub fn is_empty(&self) -> bool {
        self.literal_fields.is_empty() && self.definitions.is_empty()
    }
}

/// One declared parameter of a function.
#[derive(Clone, Debug)]
pub struct ParameterInfo {
    pub id: Id,
    pub name: Name,
    /// Types accumulated from call-site arguments and name heuristics.
    pub types: TypeSet,
}

/// One return position of a function.
#[derive(Clone, Debug, Default)]
pub struct ReturnPosition {
    pub types: TypeSet,
    /// The expressions returned at this position, for later emission.
    pub expressions: Vec<ExpressionInfo>,
}

/// Metadata for one function, keyed by its function id in the context.
#[derive(Clone, Debug, Default)]
pub struct FunctionInfo {
    /// The implicit receiver of a method (`function C:m(...)`), or of a
    /// factory-table function whose first declared parameter is `self`.
    pub self_parameter: Option<ParameterInfo>,
    pub parameters: Vec<ParameterInfo>,
    pub returns: Vec<ReturnPosition>,
    /// The smallest return arity observed across the function's return
    /// statements. `None` until the first return site is recorded.
    pub min_returns: Option<usize>,
    pub is_constructor: bool,
    pub is_method: bool,
    /// The normalized identifier expression the function was declared
    /// with, when it had one.
    pub identifier: Option<ExpressionId>,
}

impl FunctionInfo {
    /// Records one return site: the resolved types of each position.
    ///
    /// Positions seen for the first time are appended; positions seen
    /// before accumulate. The site's arity lowers `min_returns`.
    pub fn record_return_site(&mut self, positions: Vec<(TypeSet, Option<ExpressionInfo>)>) {
        let arity = positions.len();
        for (index, (types, expression)) in positions.into_iter().enumerate() {
            if self.returns.len() <= index {
                self.returns.push(ReturnPosition::default());
            }
            let position = &mut self.returns[index];
            position.types.extend(types);
            if let Some(expression) = expression {
                position.expressions.push(expression);
            }
        }
        self.min_returns = Some(match self.min_returns {
            Some(current) => current.min(arity),
            None => arity,
        });
    }

    /// Positions beyond the minimum observed arity may be absent at
    /// runtime; they acquire `nil`.
    pub fn apply_return_nullability(&mut self) {
        let Some(min_returns) = self.min_returns else {
            return;
        };
        for position in self.returns.iter_mut().skip(min_returns) {
            position.types.insert(Type::Nil);
        }
    }

    /// The type set of a one-based return position. Past the declared
    /// arity every position is `nil`.
    pub fn return_types(&self, index: usize) -> TypeSet {
        match index.checked_sub(1).and_then(|index| self.returns.get(index)) {
            Some(position) => position.types.clone(),
            None => [Type::Nil].into_iter().collect(),
        }
    }
}
