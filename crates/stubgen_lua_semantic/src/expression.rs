use std::fmt;

use smallvec::SmallVec;
use stubgen_lua_ast::{BinaryOp, Indexer, LogicalOp, Name, UnaryOp};

use crate::ids::Id;
use crate::module_name::ModuleName;

/// Index of a normalized expression in the context's arena.
///
/// Expression identity is the id: the reader caches one expression per AST
/// node, and both usage records and the resolver's cycle map key off it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct ExpressionId(u32);

impl ExpressionId {
    pub(crate) const fn from_usize(index: usize) -> Self {
        debug_assert!(index <= u32::MAX as usize);
        Self(index as u32)
    }

    pub(crate) const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ExpressionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr#{}", self.0)
    }
}

/// What an identifier reference points at: a scoped entity with a synthetic
/// id, or a global known only by name.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum ReferenceKey {
    Global(Name),
    Id(Id),
}

impl ReferenceKey {
    pub fn as_global(&self) -> Option<&Name> {
        match self {
            ReferenceKey::Global(name) => Some(name),
            ReferenceKey::Id(_) => None,
        }
    }

    pub fn as_id(&self) -> Option<&Id> {
        match self {
            ReferenceKey::Id(id) => Some(id),
            ReferenceKey::Global(_) => None,
        }
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceKey::Global(name) => f.write_str(name),
            ReferenceKey::Id(id) => id.fmt(f),
        }
    }
}

/// A normalized expression.
///
/// The reader lowers every AST expression into this form exactly once;
/// sub-expressions are referenced by [`ExpressionId`], so the arena is a DAG
/// and cycles can only arise through reference ids.
#[derive(Clone, Debug, PartialEq)]
pub enum Expression {
    /// A resolved identifier.
    Reference { key: ReferenceKey },
    /// A `require("...")` call with a syntactically-resolvable argument.
    Require { module: ModuleName },
    Literal(Literal),
    /// `base.member` or `base:member`.
    Member {
        base: ExpressionId,
        indexer: Indexer,
        member: Name,
    },
    /// `base[index]`.
    Index {
        base: ExpressionId,
        index: ExpressionId,
    },
    /// An operator application; calls normalize here too, with the callee
    /// as the first argument.
    Operation {
        operator: Operator,
        arguments: SmallVec<[ExpressionId; 4]>,
    },
}

impl Expression {
    pub fn as_reference(&self) -> Option<&ReferenceKey> {
        match self {
            Expression::Reference { key } => Some(key),
            _ => None,
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expression::Literal(literal) => Some(literal),
            _ => None,
        }
    }

    pub const fn is_call(&self) -> bool {
        matches!(
            self,
            Expression::Operation {
                operator: Operator::Call,
                ..
            }
        )
    }

    /// For a call operation, the callee and the argument list.
    pub fn as_call(&self) -> Option<(ExpressionId, &[ExpressionId])> {
        match self {
            Expression::Operation {
                operator: Operator::Call,
                arguments,
            } => {
                let (callee, rest) = arguments.split_first()?;
                Some((*callee, rest))
            }
            _ => None,
        }
    }
}

/// A literal leaf. Table and function literals carry only their synthetic
/// ids; the structured payload lives in the context's info tables.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Literal {
    Nil,
    Boolean(bool),
    /// The raw source spelling, suffixes preserved.
    Number(Name),
    String(Name),
    /// `...`; resolves to nothing in particular.
    Vararg,
    Table { table_id: Id },
    Function { function_id: Id, is_method: bool },
}

impl Literal {
    /// Whether the literal is truthy, in the language's sense: everything
    /// but `nil` and `false`.
    pub const fn is_truthy(&self) -> bool {
        !matches!(self, Literal::Nil | Literal::Boolean(false))
    }
}

/// The operator of a normalized operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Operator {
    Call,
    Unary(UnaryOp),
    Binary(BinaryOp),
    Logical(LogicalOp),
}

/// A recorded definition: an expression plus the facts needed to interpret
/// it later.
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionInfo {
    pub expression: ExpressionId,
    /// Which return position to read when the expression is a call.
    /// One-based; `a, b = f()` records `b` with index 2.
    pub index: usize,
    /// The definition binds an instance of a class, not the class itself.
    pub instance: bool,
    /// The definition came from a table-constructor field.
    pub from_literal: bool,
    pub defining_module: Option<ModuleName>,
    /// The definition sits inside a function body rather than at module
    /// scope.
    pub function_level: bool,
}

impl ExpressionInfo {
    pub fn new(expression: ExpressionId) -> Self {
        Self {
            expression,
            index: 1,
            instance: false,
            from_literal: false,
            defining_module: None,
            function_level: false,
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn with_instance(mut self) -> Self {
        self.instance = true;
        self
    }

    pub fn with_from_literal(mut self) -> Self {
        self.from_literal = true;
        self
    }
}
