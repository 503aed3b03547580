//! Canonical-infix rendering of formula trees.
//!
//! Compound operands are parenthesized unconditionally, so the rendering is
//! unambiguous without precedence knowledge. Variables whose names are not
//! bare identifiers render in `{name}` form.

use std::fmt::Write;

use crate::ast::AstNode;

/// Renders an AST back into canonical infix notation.
///
/// A pure function of the tree; formatting never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct Formatter;

impl Formatter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Render `node` as canonical infix text.
    #[must_use]
    pub fn format(&self, node: &AstNode) -> String {
        let mut out = String::new();
        Self::write_node(node, &mut out, true);
        out
    }

    fn write_node(node: &AstNode, out: &mut String, top_level: bool) {
        match node {
            AstNode::Number(v) => {
                let _ = write!(out, "{v}");
            }
            AstNode::Boolean(v) => {
                let _ = write!(out, "{v}");
            }
            AstNode::Variable(name) => {
                if is_bare_identifier(name) {
                    out.push_str(name);
                } else {
                    let _ = write!(out, "{{{name}}}");
                }
            }
            AstNode::Binary { op, lhs, rhs } => {
                if !top_level {
                    out.push('(');
                }
                Self::write_node(lhs, out, false);
                let _ = write!(out, " {} ", op.symbol());
                Self::write_node(rhs, out, false);
                if !top_level {
                    out.push(')');
                }
            }
            AstNode::Unary { op, operand } => {
                // Parenthesized whenever nested: "-5 ^ 2" would re-parse
                // with the negation outside the power.
                if !top_level {
                    out.push('(');
                }
                out.push_str(op.symbol());
                match &**operand {
                    AstNode::Number(_) | AstNode::Boolean(_) | AstNode::Variable(_) => {
                        Self::write_node(operand, out, false);
                    }
                    _ => {
                        out.push('(');
                        Self::write_node(operand, out, true);
                        out.push(')');
                    }
                }
                if !top_level {
                    out.push(')');
                }
            }
            AstNode::Call { name, args } => {
                out.push_str(name);
                out.push('(');
                Self::write_list(args, out);
                out.push(')');
            }
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => {
                out.push_str("IF(");
                Self::write_node(condition, out, true);
                out.push_str(", ");
                Self::write_node(then_branch, out, true);
                out.push_str(", ");
                Self::write_node(else_branch, out, true);
                out.push(')');
            }
            AstNode::Arguments(items) => {
                Self::write_list(items, out);
            }
        }
    }

    fn write_list(items: &[std::sync::Arc<AstNode>], out: &mut String) {
        for (i, item) in items.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            Self::write_node(item, out, true);
        }
    }
}

fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinaryOp, UnaryOp};

    #[test]
    fn test_format_precedence_parens() {
        let tree = AstNode::binary(
            BinaryOp::Add,
            AstNode::number(3.0).unwrap(),
            AstNode::binary(
                BinaryOp::Mul,
                AstNode::number(4.0).unwrap(),
                AstNode::number(2.0).unwrap(),
            )
            .unwrap(),
        )
        .unwrap();
        assert_eq!(Formatter::new().format(&tree), "3 + (4 * 2)");
    }

    #[test]
    fn test_format_variables() {
        assert_eq!(Formatter::new().format(&AstNode::variable("x")), "x");
        assert_eq!(
            Formatter::new().format(&AstNode::variable("exam score")),
            "{exam score}"
        );
    }

    #[test]
    fn test_format_if_and_call() {
        let tree = AstNode::if_node(
            AstNode::binary(
                BinaryOp::Gt,
                AstNode::variable("x"),
                AstNode::number(3.0).unwrap(),
            )
            .unwrap(),
            AstNode::call("MIN", vec![AstNode::variable("a"), AstNode::variable("b")]).unwrap(),
            AstNode::number(20.0).unwrap(),
        );
        assert_eq!(
            Formatter::new().format(&tree),
            "IF(x > 3, MIN(a, b), 20)"
        );
    }

    #[test]
    fn test_format_unary() {
        let tree = AstNode::unary(
            UnaryOp::Neg,
            AstNode::binary(
                BinaryOp::Add,
                AstNode::variable("x"),
                AstNode::number(1.0).unwrap(),
            )
            .unwrap(),
        );
        assert_eq!(Formatter::new().format(&tree), "-(x + 1)");
        let tree = AstNode::unary(UnaryOp::Not, AstNode::variable("ok"));
        assert_eq!(Formatter::new().format(&tree), "!ok");
    }
}
