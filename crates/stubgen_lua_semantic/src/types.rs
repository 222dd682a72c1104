use std::fmt;

use crate::ids::{Id, IdKind};
use crate::FxOrderSet;

pub(crate) mod heuristics;
pub(crate) mod resolve;

/// One member of a type set.
///
/// Markers are synthetic ids standing in for types that only finalization
/// can name: a table that may become a class, a function, a parameter whose
/// accumulated types live on its function.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Type {
    Nil,
    True,
    False,
    Boolean,
    Number,
    String,
    Table,
    Function,
    Unknown,
    Marker(Id),
}

/// The coarse kinds usage narrowing distinguishes.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NarrowKind {
    Boolean = 0,
    Function = 1,
    Number = 2,
    String = 3,
    Table = 4,
}

impl Type {
    pub fn table(id: Id) -> Type {
        debug_assert!(id.is_table());
        Type::Marker(id)
    }

    pub fn function(id: Id) -> Type {
        debug_assert!(id.is_function());
        Type::Marker(id)
    }

    pub fn as_marker(&self) -> Option<&Id> {
        match self {
            Type::Marker(id) => Some(id),
            _ => None,
        }
    }

    pub fn as_table_id(&self) -> Option<&Id> {
        self.as_marker().filter(|id| id.is_table())
    }

    /// The coarse kind used by usage narrowing, or `None` for terms that
    /// narrowing must not touch (unresolved markers and `unknown`).
    pub fn narrow_kind(&self) -> Option<NarrowKind> {
        match self {
            Type::True | Type::False | Type::Boolean => Some(NarrowKind::Boolean),
            Type::Number => Some(NarrowKind::Number),
            Type::String => Some(NarrowKind::String),
            Type::Table => Some(NarrowKind::Table),
            Type::Function => Some(NarrowKind::Function),
            // `nil` supports none of the narrowed capabilities.
            Type::Nil => None,
            Type::Unknown => None,
            Type::Marker(id) => match id.kind() {
                IdKind::Table | IdKind::Instance => Some(NarrowKind::Table),
                IdKind::Function => Some(NarrowKind::Function),
                IdKind::Module
                | IdKind::Parameter
                | IdKind::SelfParameter
                | IdKind::Local => None,
            },
        }
    }

    /// Whether narrowing removes this term when its kind is absent from the
    /// candidate set.
    pub fn narrowable(&self) -> bool {
        match self {
            Type::Nil => true,
            _ => self.narrow_kind().is_some(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Nil => f.write_str("nil"),
            Type::True => f.write_str("true"),
            Type::False => f.write_str("false"),
            Type::Boolean => f.write_str("boolean"),
            Type::Number => f.write_str("number"),
            Type::String => f.write_str("string"),
            Type::Table => f.write_str("table"),
            Type::Function => f.write_str("function"),
            Type::Unknown => f.write_str("unknown"),
            Type::Marker(id) => id.fmt(f),
        }
    }
}

/// An insertion-ordered set of type terms.
pub type TypeSet = FxOrderSet<Type>;

/// Collapses `true | false` to `boolean`, in place. Idempotent.
pub fn collapse_booleans(types: &mut TypeSet) {
    if types.contains(&Type::True) && types.contains(&Type::False) {
        types.retain(|ty| !matches!(ty, Type::True | Type::False));
        types.insert(Type::Boolean);
    }
}

/// Applies usage narrowing: keeps terms whose coarse kind appears in
/// `kinds`, plus unresolved markers. If nothing would survive, the original
/// set is kept untouched.
pub fn narrow(types: &mut TypeSet, kinds: crate::usage::CandidateKinds) {
    if !kinds.is_narrowing() {
        return;
    }
    let narrowed: TypeSet = types
        .iter()
        .filter(|ty| match ty.narrow_kind() {
            Some(kind) => kinds.contains(kind),
            None => !ty.narrowable(),
        })
        .cloned()
        .collect();
    if !narrowed.is_empty() {
        *types = narrowed;
    }
}

#[cfg(test)]
mod tests {
    use super::{collapse_booleans, narrow, Type, TypeSet};
    use crate::usage::{Usage, UsageFlags};

    #[test]
    fn boolean_collapse() {
        let mut types: TypeSet = [Type::True, Type::String, Type::False].into_iter().collect();
        collapse_booleans(&mut types);
        assert!(types.contains(&Type::Boolean));
        assert!(!types.contains(&Type::True));
        assert!(!types.contains(&Type::False));
        assert!(types.contains(&Type::String));
    }

    #[test]
    fn collapse_requires_both_literals() {
        let mut types: TypeSet = [Type::True].into_iter().collect();
        collapse_booleans(&mut types);
        assert!(types.contains(&Type::True));
        assert!(!types.contains(&Type::Boolean));
    }

    #[test]
    fn narrowing_keeps_matching_kinds() {
        let mut usage = Usage::default();
        usage.merge_flags(UsageFlags::MATH);
        let mut types: TypeSet = [Type::Number, Type::String, Type::Nil].into_iter().collect();
        narrow(&mut types, usage.candidate_kinds());
        assert_eq!(types.len(), 1);
        assert!(types.contains(&Type::Number));
    }

    #[test]
    fn narrowing_never_empties() {
        let mut usage = Usage::default();
        usage.merge_flags(UsageFlags::MATH);
        let mut types: TypeSet = [Type::String].into_iter().collect();
        narrow(&mut types, usage.candidate_kinds());
        assert!(types.contains(&Type::String));
    }

    #[test]
    fn narrowing_preserves_unresolved_markers() {
        use crate::ids::{Id, IdKind};
        use stubgen_lua_ast::Name;

        let marker = Type::Marker(Id::new(IdKind::Parameter, 7, Name::new("x")));
        let mut usage = Usage::default();
        usage.merge_flags(UsageFlags::MATH);
        let mut types: TypeSet = [marker.clone(), Type::String].into_iter().collect();
        narrow(&mut types, usage.candidate_kinds());
        assert!(types.contains(&marker));
        assert!(!types.contains(&Type::String));
    }
}
