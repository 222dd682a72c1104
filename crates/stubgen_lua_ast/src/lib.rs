//! Lua AST node definitions consumed by the analysis core.
//!
//! The node taxonomy mirrors what the external parser produces for the most
//! permissive dialect of the language (`break` inside loops, integer
//! suffixes on numeric literals). Every node carries a [`TextRange`]; the
//! parser is responsible for populating them.

use text_size::TextRange;

mod name;
mod nodes;
mod operators;

pub use name::Name;
pub use nodes::*;
pub use operators::{BinaryOp, LogicalOp, UnaryOp};

/// A node with a source location.
pub trait Ranged {
    fn range(&self) -> TextRange;

    fn start(&self) -> text_size::TextSize {
        self.range().start()
    }

    fn end(&self) -> text_size::TextSize {
        self.range().end()
    }
}

#[cfg(test)]
mod tests {
    use crate::{BinaryOp, Expr, Indexer, Stmt};

    #[test]
    fn call_base_flavors() {
        let plain = Expr::call(Expr::identifier("f"), vec![]);
        let string = Expr::string_call(Expr::identifier("require"), "module");
        let table = Expr::table_call(Expr::identifier("Node"), vec![]);

        for call in [&plain, &string, &table] {
            assert!(call.is_call());
            assert!(call.call_base().is_some_and(|base| base.as_identifier().is_some()));
        }

        assert_eq!(Expr::identifier("f").call_base(), None);
    }

    #[test]
    fn member_chain() {
        let chain = Expr::member(
            Expr::member(Expr::identifier("a"), Indexer::Dot, "b"),
            Indexer::Colon,
            "c",
        );
        let member = chain.as_member().unwrap();
        assert_eq!(member.indexer, Indexer::Colon);
        assert_eq!(member.member.as_str(), "c");
        assert!(member.base.as_member().is_some());
    }

    #[test]
    fn numeric_suffix_keeps_raw() {
        let Expr::NumericLiteral(number) = Expr::number("10L") else {
            panic!("expected a numeric literal");
        };
        assert_eq!(number.raw, "10L");
        assert_eq!(number.value, None);

        let Expr::NumericLiteral(number) = Expr::number("2.5") else {
            panic!("expected a numeric literal");
        };
        assert_eq!(number.value, Some(2.5));
    }

    #[test]
    fn operator_classification() {
        assert!(BinaryOp::Add.is_math());
        assert!(BinaryOp::ShiftLeft.is_math());
        assert!(BinaryOp::Lt.is_comparison());
        assert!(BinaryOp::Concat.is_concat());
        assert!(!BinaryOp::Concat.is_math());
    }

    #[test]
    fn local_statement_targets() {
        let Stmt::Local(local) = Stmt::local(vec!["a", "b"], vec![Expr::number("1")]) else {
            panic!("expected a local statement");
        };
        assert_eq!(local.targets.len(), 2);
        assert_eq!(local.values.len(), 1);
    }
}
