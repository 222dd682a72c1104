use text_size::TextRange;

use crate::name::Name;
use crate::operators::{BinaryOp, LogicalOp, UnaryOp};
use crate::Ranged;

/// A parsed source file: the top-level block of statements.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub range: TextRange,
    pub body: Vec<Stmt>,
}

impl Chunk {
    pub fn new(body: Vec<Stmt>) -> Self {
        Self {
            range: TextRange::default(),
            body,
        }
    }
}

/// A statement.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Local(StmtLocal),
    Assignment(StmtAssignment),
    Return(StmtReturn),
    If(StmtIf),
    While(StmtWhile),
    Repeat(StmtRepeat),
    Do(StmtDo),
    ForNumeric(StmtForNumeric),
    ForGeneric(StmtForGeneric),
    FunctionDeclaration(FunctionDeclaration),
    Call(StmtCall),
    Break(StmtBreak),
}

/// `local a, b = x, y`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtLocal {
    pub range: TextRange,
    pub targets: Vec<Identifier>,
    pub values: Vec<Expr>,
}

/// `a, b.c = x, y`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtAssignment {
    pub range: TextRange,
    /// Identifier, member, or index expressions.
    pub targets: Vec<Expr>,
    pub values: Vec<Expr>,
}

/// `return a, b`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtReturn {
    pub range: TextRange,
    pub values: Vec<Expr>,
}

/// An `if` statement with its full clause chain.
#[derive(Clone, Debug, PartialEq)]
pub struct StmtIf {
    pub range: TextRange,
    pub clauses: Vec<IfClause>,
}

/// One arm of an `if` statement.
#[derive(Clone, Debug, PartialEq)]
pub enum IfClause {
    If(ConditionalClause),
    Elseif(ConditionalClause),
    Else(ElseClause),
}

impl IfClause {
    pub fn when(condition: Expr, body: Vec<Stmt>) -> IfClause {
        IfClause::If(ConditionalClause {
            range: TextRange::default(),
            condition,
            body,
        })
    }

    pub fn elseif(condition: Expr, body: Vec<Stmt>) -> IfClause {
        IfClause::Elseif(ConditionalClause {
            range: TextRange::default(),
            condition,
            body,
        })
    }

    pub fn otherwise(body: Vec<Stmt>) -> IfClause {
        IfClause::Else(ElseClause {
            range: TextRange::default(),
            body,
        })
    }

    pub fn condition(&self) -> Option<&Expr> {
        match self {
            IfClause::If(clause) | IfClause::Elseif(clause) => Some(&clause.condition),
            IfClause::Else(_) => None,
        }
    }

    pub fn body(&self) -> &[Stmt] {
        match self {
            IfClause::If(clause) | IfClause::Elseif(clause) => &clause.body,
            IfClause::Else(clause) => &clause.body,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ConditionalClause {
    pub range: TextRange,
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ElseClause {
    pub range: TextRange,
    pub body: Vec<Stmt>,
}

/// `while c do ... end`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtWhile {
    pub range: TextRange,
    pub condition: Expr,
    pub body: Vec<Stmt>,
}

/// `repeat ... until c`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtRepeat {
    pub range: TextRange,
    pub body: Vec<Stmt>,
    pub condition: Expr,
}

/// `do ... end`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtDo {
    pub range: TextRange,
    pub body: Vec<Stmt>,
}

/// `for i = start, end, step do ... end`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtForNumeric {
    pub range: TextRange,
    pub variable: Identifier,
    pub start: Expr,
    pub end: Expr,
    pub step: Option<Expr>,
    pub body: Vec<Stmt>,
}

/// `for k, v in iter do ... end`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtForGeneric {
    pub range: TextRange,
    pub variables: Vec<Identifier>,
    pub iterators: Vec<Expr>,
    pub body: Vec<Stmt>,
}

/// A function declaration, in statement or expression position.
///
/// `function Foo.bar(a) ... end`, `local function f() ... end`, and the
/// anonymous `function(a) ... end` all share this node; the anonymous form
/// has no identifier.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDeclaration {
    pub range: TextRange,
    /// An identifier or member expression; `None` for anonymous functions.
    pub identifier: Option<Box<Expr>>,
    pub is_local: bool,
    pub parameters: Vec<Parameter>,
    pub body: Vec<Stmt>,
}

impl FunctionDeclaration {
    /// The declared parameter names, skipping a trailing vararg.
    pub fn parameter_names(&self) -> impl Iterator<Item = &Name> {
        self.parameters.iter().filter_map(|parameter| match parameter {
            Parameter::Name(identifier) => Some(&identifier.name),
            Parameter::Vararg(_) => None,
        })
    }
}

/// A declared function parameter.
#[derive(Clone, Debug, PartialEq)]
pub enum Parameter {
    Name(Identifier),
    Vararg(TextRange),
}

/// A call in statement position.
#[derive(Clone, Debug, PartialEq)]
pub struct StmtCall {
    pub range: TextRange,
    /// A `Call`, `TableCall`, or `StringCall` expression.
    pub call: Expr,
}

/// `break`
#[derive(Clone, Debug, PartialEq)]
pub struct StmtBreak {
    pub range: TextRange,
}

/// An expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Identifier(Identifier),
    Vararg(ExprVararg),
    StringLiteral(ExprStringLiteral),
    NumericLiteral(ExprNumericLiteral),
    BooleanLiteral(ExprBooleanLiteral),
    NilLiteral(ExprNilLiteral),
    TableConstructor(ExprTableConstructor),
    Member(ExprMember),
    Index(ExprIndex),
    Unary(ExprUnary),
    Binary(ExprBinary),
    Logical(ExprLogical),
    Call(ExprCall),
    TableCall(ExprTableCall),
    StringCall(ExprStringCall),
    Function(Box<FunctionDeclaration>),
}

/// A bare name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub range: TextRange,
    pub name: Name,
}

impl Identifier {
    pub fn new(name: impl Into<Name>) -> Self {
        Self {
            range: TextRange::default(),
            name: name.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        self.name.as_str()
    }
}

/// `...`
#[derive(Clone, Debug, PartialEq)]
pub struct ExprVararg {
    pub range: TextRange,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprStringLiteral {
    pub range: TextRange,
    /// The decoded string value, quotes and escapes resolved.
    pub value: String,
}

/// A numeric literal.
///
/// `raw` preserves the source spelling; the most permissive dialect allows
/// integer suffixes (`10L`, `0xFFUL`) that do not survive a plain float parse.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprNumericLiteral {
    pub range: TextRange,
    pub raw: Name,
    pub value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprBooleanLiteral {
    pub range: TextRange,
    pub value: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprNilLiteral {
    pub range: TextRange,
}

/// `{ a, b = c, [d] = e }`
#[derive(Clone, Debug, PartialEq)]
pub struct ExprTableConstructor {
    pub range: TextRange,
    pub fields: Vec<TableField>,
}

/// One entry of a table constructor.
#[derive(Clone, Debug, PartialEq)]
pub enum TableField {
    /// A positional value: `{ a }`
    Value { value: Expr },
    /// A computed key: `{ [k] = v }`
    Key { key: Expr, value: Expr },
    /// A string key in identifier form: `{ k = v }`
    KeyString { key: Identifier, value: Expr },
}

/// `base.member` or `base:member`
#[derive(Clone, Debug, PartialEq)]
pub struct ExprMember {
    pub range: TextRange,
    pub base: Box<Expr>,
    pub indexer: Indexer,
    pub member: Identifier,
}

/// The access style of a member expression.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Indexer {
    /// `.`
    Dot,
    /// `:`
    Colon,
}

/// `base[index]`
#[derive(Clone, Debug, PartialEq)]
pub struct ExprIndex {
    pub range: TextRange,
    pub base: Box<Expr>,
    pub index: Box<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprUnary {
    pub range: TextRange,
    pub op: UnaryOp,
    pub operand: Box<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprBinary {
    pub range: TextRange,
    pub op: BinaryOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExprLogical {
    pub range: TextRange,
    pub op: LogicalOp,
    pub left: Box<Expr>,
    pub right: Box<Expr>,
}

/// `base(a, b)`
#[derive(Clone, Debug, PartialEq)]
pub struct ExprCall {
    pub range: TextRange,
    pub base: Box<Expr>,
    pub arguments: Vec<Expr>,
}

/// `base{ ... }` — a call with a single table-constructor argument.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprTableCall {
    pub range: TextRange,
    pub base: Box<Expr>,
    pub argument: ExprTableConstructor,
}

/// `base"literal"` — a call with a single string argument.
#[derive(Clone, Debug, PartialEq)]
pub struct ExprStringCall {
    pub range: TextRange,
    pub base: Box<Expr>,
    pub argument: ExprStringLiteral,
}

impl Expr {
    pub fn as_identifier(&self) -> Option<&Identifier> {
        match self {
            Expr::Identifier(identifier) => Some(identifier),
            _ => None,
        }
    }

    pub fn as_member(&self) -> Option<&ExprMember> {
        match self {
            Expr::Member(member) => Some(member),
            _ => None,
        }
    }

    pub const fn is_call(&self) -> bool {
        matches!(
            self,
            Expr::Call(_) | Expr::TableCall(_) | Expr::StringCall(_)
        )
    }

    /// The callee of a call expression of any flavor.
    pub fn call_base(&self) -> Option<&Expr> {
        match self {
            Expr::Call(call) => Some(&call.base),
            Expr::TableCall(call) => Some(&call.base),
            Expr::StringCall(call) => Some(&call.base),
            _ => None,
        }
    }
}

// Construction shorthands, used by the parser's lowering and by tests.
impl Expr {
    pub fn identifier(name: impl Into<Name>) -> Expr {
        Expr::Identifier(Identifier::new(name))
    }

    pub fn string(value: impl Into<String>) -> Expr {
        Expr::StringLiteral(ExprStringLiteral {
            range: TextRange::default(),
            value: value.into(),
        })
    }

    pub fn number(raw: &str) -> Expr {
        Expr::NumericLiteral(ExprNumericLiteral {
            range: TextRange::default(),
            raw: Name::new(raw),
            value: raw.parse::<f64>().ok(),
        })
    }

    pub fn boolean(value: bool) -> Expr {
        Expr::BooleanLiteral(ExprBooleanLiteral {
            range: TextRange::default(),
            value,
        })
    }

    pub fn nil() -> Expr {
        Expr::NilLiteral(ExprNilLiteral {
            range: TextRange::default(),
        })
    }

    pub fn vararg() -> Expr {
        Expr::Vararg(ExprVararg {
            range: TextRange::default(),
        })
    }

    pub fn table(fields: Vec<TableField>) -> Expr {
        Expr::TableConstructor(ExprTableConstructor {
            range: TextRange::default(),
            fields,
        })
    }

    pub fn member(base: Expr, indexer: Indexer, member: impl Into<Name>) -> Expr {
        Expr::Member(ExprMember {
            range: TextRange::default(),
            base: Box::new(base),
            indexer,
            member: Identifier::new(member),
        })
    }

    pub fn index(base: Expr, index: Expr) -> Expr {
        Expr::Index(ExprIndex {
            range: TextRange::default(),
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    pub fn call(base: Expr, arguments: Vec<Expr>) -> Expr {
        Expr::Call(ExprCall {
            range: TextRange::default(),
            base: Box::new(base),
            arguments,
        })
    }

    pub fn string_call(base: Expr, argument: impl Into<String>) -> Expr {
        Expr::StringCall(ExprStringCall {
            range: TextRange::default(),
            base: Box::new(base),
            argument: ExprStringLiteral {
                range: TextRange::default(),
                value: argument.into(),
            },
        })
    }

    pub fn table_call(base: Expr, fields: Vec<TableField>) -> Expr {
        Expr::TableCall(ExprTableCall {
            range: TextRange::default(),
            base: Box::new(base),
            argument: ExprTableConstructor {
                range: TextRange::default(),
                fields,
            },
        })
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr::Unary(ExprUnary {
            range: TextRange::default(),
            op,
            operand: Box::new(operand),
        })
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary(ExprBinary {
            range: TextRange::default(),
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Expr {
        Expr::Logical(ExprLogical {
            range: TextRange::default(),
            op,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn function(parameters: Vec<Parameter>, body: Vec<Stmt>) -> Expr {
        Expr::Function(Box::new(FunctionDeclaration {
            range: TextRange::default(),
            identifier: None,
            is_local: false,
            parameters,
            body,
        }))
    }
}

impl Stmt {
    pub fn local(targets: Vec<&str>, values: Vec<Expr>) -> Stmt {
        Stmt::Local(StmtLocal {
            range: TextRange::default(),
            targets: targets.into_iter().map(Identifier::new).collect(),
            values,
        })
    }

    pub fn assign(targets: Vec<Expr>, values: Vec<Expr>) -> Stmt {
        Stmt::Assignment(StmtAssignment {
            range: TextRange::default(),
            targets,
            values,
        })
    }

    pub fn if_stmt(clauses: Vec<IfClause>) -> Stmt {
        Stmt::If(StmtIf {
            range: TextRange::default(),
            clauses,
        })
    }

    pub fn ret(values: Vec<Expr>) -> Stmt {
        Stmt::Return(StmtReturn {
            range: TextRange::default(),
            values,
        })
    }

    pub fn call(call: Expr) -> Stmt {
        Stmt::Call(StmtCall {
            range: TextRange::default(),
            call,
        })
    }

    pub fn function_declaration(
        identifier: Expr,
        parameters: Vec<Parameter>,
        body: Vec<Stmt>,
    ) -> Stmt {
        Stmt::FunctionDeclaration(FunctionDeclaration {
            range: TextRange::default(),
            identifier: Some(Box::new(identifier)),
            is_local: false,
            parameters,
            body,
        })
    }

    pub fn local_function(name: &str, parameters: Vec<Parameter>, body: Vec<Stmt>) -> Stmt {
        Stmt::FunctionDeclaration(FunctionDeclaration {
            range: TextRange::default(),
            identifier: Some(Box::new(Expr::identifier(name))),
            is_local: true,
            parameters,
            body,
        })
    }
}

impl Parameter {
    pub fn name(name: &str) -> Parameter {
        Parameter::Name(Identifier::new(name))
    }
}

macro_rules! impl_ranged {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Ranged for $ty {
                fn range(&self) -> TextRange {
                    self.range
                }
            }
        )*
    };
}

impl_ranged!(
    Chunk,
    StmtLocal,
    StmtAssignment,
    StmtReturn,
    StmtIf,
    ConditionalClause,
    ElseClause,
    StmtWhile,
    StmtRepeat,
    StmtDo,
    StmtForNumeric,
    StmtForGeneric,
    FunctionDeclaration,
    StmtCall,
    StmtBreak,
    Identifier,
    ExprVararg,
    ExprStringLiteral,
    ExprNumericLiteral,
    ExprBooleanLiteral,
    ExprNilLiteral,
    ExprTableConstructor,
    ExprMember,
    ExprIndex,
    ExprUnary,
    ExprBinary,
    ExprLogical,
    ExprCall,
    ExprTableCall,
    ExprStringCall,
);

impl Ranged for Stmt {
    fn range(&self) -> TextRange {
        match self {
            Stmt::Local(node) => node.range,
            Stmt::Assignment(node) => node.range,
            Stmt::Return(node) => node.range,
            Stmt::If(node) => node.range,
            Stmt::While(node) => node.range,
            Stmt::Repeat(node) => node.range,
            Stmt::Do(node) => node.range,
            Stmt::ForNumeric(node) => node.range,
            Stmt::ForGeneric(node) => node.range,
            Stmt::FunctionDeclaration(node) => node.range,
            Stmt::Call(node) => node.range,
            Stmt::Break(node) => node.range,
        }
    }
}

impl Ranged for Expr {
    fn range(&self) -> TextRange {
        match self {
            Expr::Identifier(node) => node.range,
            Expr::Vararg(node) => node.range,
            Expr::StringLiteral(node) => node.range,
            Expr::NumericLiteral(node) => node.range,
            Expr::BooleanLiteral(node) => node.range,
            Expr::NilLiteral(node) => node.range,
            Expr::TableConstructor(node) => node.range,
            Expr::Member(node) => node.range,
            Expr::Index(node) => node.range,
            Expr::Unary(node) => node.range,
            Expr::Binary(node) => node.range,
            Expr::Logical(node) => node.range,
            Expr::Call(node) => node.range,
            Expr::TableCall(node) => node.range,
            Expr::StringCall(node) => node.range,
            Expr::Function(node) => node.range,
        }
    }
}

impl Ranged for IfClause {
    fn range(&self) -> TextRange {
        match self {
            IfClause::If(clause) | IfClause::Elseif(clause) => clause.range,
            IfClause::Else(clause) => clause.range,
        }
    }
}
