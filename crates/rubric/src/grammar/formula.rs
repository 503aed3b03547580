//! The formula grammar shipped with the engine.
//!
//! A layered, right-recursive expression grammar (the validator bans left
//! recursion) covering arithmetic, comparison, boolean logic, conditionals,
//! and function calls:
//!
//! ```text
//! expr    -> or
//! or      -> and '||' or   | and
//! and     -> cmp '&&' and  | cmp
//! cmp     -> add RELOP add | add          (comparisons do not chain)
//! add     -> mul ('+'|'-') add | mul
//! mul     -> unary ('*'|'/'|'%') mul | unary
//! unary   -> '-' unary | '!' unary | pow
//! pow     -> primary '^' unary | primary  (right associative)
//! primary -> number | boolean | identifier | variable
//!          | '(' expr ')' | identifier '(' args ')' | identifier '(' ')'
//! args    -> expr | expr ',' args
//! ```
//!
//! `IF(c, a, b)` is ordinary call syntax; the call builder lowers a
//! three-argument `IF` to the dedicated conditional node at reduce time, so
//! any other arity fails with the standard wrong-arity error.

use std::sync::Arc;

use compact_str::CompactString;

use crate::ast::{AstNode, BinaryOp, UnaryOp};
use crate::error::{EvaluationError, FormulaError};
use crate::grammar::{Grammar, GrammarBuilder, StackValue, Symbol};
use crate::lexer::TokenKind;

use Symbol::{Rule, Term};

/// Build the formula grammar.
///
/// # Panics
///
/// Never in practice: the grammar is fixed and passes its own validation;
/// the tests cover it.
#[must_use]
pub fn formula_grammar() -> Grammar {
    let mut b = GrammarBuilder::new();
    let expr = b.non_terminal("expr");
    let or = b.non_terminal("or_expr");
    let and = b.non_terminal("and_expr");
    let cmp = b.non_terminal("cmp_expr");
    let add = b.non_terminal("add_expr");
    let mul = b.non_terminal("mul_expr");
    let unary = b.non_terminal("unary_expr");
    let pow = b.non_terminal("pow_expr");
    let primary = b.non_terminal("primary");
    let args = b.non_terminal("args");
    b.start_symbol(expr);

    b.production(expr, [Rule(or)], passthrough);

    b.production(or, [Rule(and), Term(TokenKind::OrOr), Rule(or)], binary);
    b.production(or, [Rule(and)], passthrough);

    b.production(and, [Rule(cmp), Term(TokenKind::AndAnd), Rule(and)], binary);
    b.production(and, [Rule(cmp)], passthrough);

    for relop in [
        TokenKind::Less,
        TokenKind::LessEq,
        TokenKind::Greater,
        TokenKind::GreaterEq,
        TokenKind::EqEq,
        TokenKind::NotEq,
    ] {
        b.production(cmp, [Rule(add), Term(relop), Rule(add)], binary);
    }
    b.production(cmp, [Rule(add)], passthrough);

    b.production(add, [Rule(mul), Term(TokenKind::Plus), Rule(add)], binary);
    b.production(add, [Rule(mul), Term(TokenKind::Minus), Rule(add)], binary);
    b.production(add, [Rule(mul)], passthrough);

    b.production(mul, [Rule(unary), Term(TokenKind::Star), Rule(mul)], binary);
    b.production(mul, [Rule(unary), Term(TokenKind::Slash), Rule(mul)], binary);
    b.production(mul, [Rule(unary), Term(TokenKind::Percent), Rule(mul)], binary);
    b.production(mul, [Rule(unary)], passthrough);

    b.production(unary, [Term(TokenKind::Minus), Rule(unary)], prefix);
    b.production(unary, [Term(TokenKind::Bang), Rule(unary)], prefix);
    b.production(unary, [Rule(pow)], passthrough);

    b.production(pow, [Rule(primary), Term(TokenKind::Caret), Rule(unary)], binary);
    b.production(pow, [Rule(primary)], passthrough);

    b.production(primary, [Term(TokenKind::Number)], number_literal);
    b.production(primary, [Term(TokenKind::Boolean)], boolean_literal);
    b.production(primary, [Term(TokenKind::Identifier)], named_variable);
    b.production(primary, [Term(TokenKind::Variable)], named_variable);
    b.production(
        primary,
        [Term(TokenKind::LParen), Rule(expr), Term(TokenKind::RParen)],
        parenthesized,
    );
    b.production(
        primary,
        [
            Term(TokenKind::Identifier),
            Term(TokenKind::LParen),
            Rule(args),
            Term(TokenKind::RParen),
        ],
        call_with_args,
    );
    b.production(
        primary,
        [
            Term(TokenKind::Identifier),
            Term(TokenKind::LParen),
            Term(TokenKind::RParen),
        ],
        call_without_args,
    );

    b.production(args, [Rule(expr)], first_argument);
    b.production(
        args,
        [Rule(expr), Term(TokenKind::Comma), Rule(args)],
        cons_argument,
    );

    b.build()
        .expect("the built-in formula grammar always validates")
}

fn malformed(context: &'static str) -> FormulaError {
    EvaluationError::MalformedReduction { context }.into()
}

fn passthrough(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    match (children.pop(), children.pop()) {
        (Some(StackValue::Node(node)), None) => Ok(node),
        _ => Err(malformed("unit production")),
    }
}

fn binary_op_for(kind: TokenKind) -> Option<BinaryOp> {
    match kind {
        TokenKind::Plus => Some(BinaryOp::Add),
        TokenKind::Minus => Some(BinaryOp::Sub),
        TokenKind::Star => Some(BinaryOp::Mul),
        TokenKind::Slash => Some(BinaryOp::Div),
        TokenKind::Percent => Some(BinaryOp::Mod),
        TokenKind::Caret => Some(BinaryOp::Pow),
        TokenKind::Less => Some(BinaryOp::Lt),
        TokenKind::LessEq => Some(BinaryOp::Le),
        TokenKind::Greater => Some(BinaryOp::Gt),
        TokenKind::GreaterEq => Some(BinaryOp::Ge),
        TokenKind::EqEq => Some(BinaryOp::Eq),
        TokenKind::NotEq => Some(BinaryOp::Ne),
        TokenKind::AndAnd => Some(BinaryOp::And),
        TokenKind::OrOr => Some(BinaryOp::Or),
        _ => None,
    }
}

fn binary(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    let rhs = children
        .pop()
        .ok_or_else(|| malformed("binary rhs"))?
        .into_node()?;
    let op_token = children
        .pop()
        .ok_or_else(|| malformed("binary operator"))?
        .into_leaf()?;
    let lhs = children
        .pop()
        .ok_or_else(|| malformed("binary lhs"))?
        .into_node()?;
    let op = binary_op_for(op_token.kind).ok_or_else(|| malformed("binary operator kind"))?;
    AstNode::binary(op, lhs, rhs).map_err(FormulaError::from)
}

fn prefix(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    let operand = children
        .pop()
        .ok_or_else(|| malformed("unary operand"))?
        .into_node()?;
    let op_token = children
        .pop()
        .ok_or_else(|| malformed("unary operator"))?
        .into_leaf()?;
    let op = match op_token.kind {
        TokenKind::Minus => UnaryOp::Neg,
        TokenKind::Bang => UnaryOp::Not,
        _ => return Err(malformed("unary operator kind")),
    };
    Ok(AstNode::unary(op, operand))
}

fn number_literal(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    let token = children
        .pop()
        .ok_or_else(|| malformed("number literal"))?
        .into_leaf()?;
    let value = token
        .number()
        .ok_or_else(|| malformed("number literal value"))?;
    AstNode::number(value).map_err(FormulaError::from)
}

fn boolean_literal(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    let token = children
        .pop()
        .ok_or_else(|| malformed("boolean literal"))?
        .into_leaf()?;
    let value = token
        .boolean()
        .ok_or_else(|| malformed("boolean literal value"))?;
    Ok(AstNode::boolean(value))
}

fn named_variable(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    let token = children
        .pop()
        .ok_or_else(|| malformed("variable reference"))?
        .into_leaf()?;
    let name = token.name().ok_or_else(|| malformed("variable name"))?;
    Ok(AstNode::variable(name))
}

fn parenthesized(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    // [ '(' expr ')' ]
    children.pop();
    let node = children
        .pop()
        .ok_or_else(|| malformed("parenthesized expression"))?
        .into_node()?;
    Ok(node)
}

fn lower_call(name: &str, arguments: Vec<Arc<AstNode>>) -> Result<Arc<AstNode>, FormulaError> {
    if name.eq_ignore_ascii_case("IF") {
        if arguments.len() != 3 {
            return Err(EvaluationError::WrongArity {
                function: "IF".to_string(),
                expected: "3".to_string(),
                found: arguments.len(),
            }
            .into());
        }
        let mut it = arguments.into_iter();
        let (condition, then_branch, else_branch) = match (it.next(), it.next(), it.next()) {
            (Some(c), Some(t), Some(e)) => (c, t, e),
            _ => return Err(malformed("conditional arguments")),
        };
        return Ok(AstNode::if_node(condition, then_branch, else_branch));
    }
    AstNode::call(CompactString::from(name), arguments).map_err(FormulaError::from)
}

fn call_with_args(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    // [ identifier '(' args ')' ]
    children.pop();
    let list = children
        .pop()
        .ok_or_else(|| malformed("call arguments"))?
        .into_node()?;
    children.pop();
    let name_token = children
        .pop()
        .ok_or_else(|| malformed("call name"))?
        .into_leaf()?;
    let name = name_token.name().ok_or_else(|| malformed("call name value"))?;
    let arguments = match &*list {
        AstNode::Arguments(items) => items.clone(),
        _ => return Err(malformed("call argument list")),
    };
    lower_call(name, arguments)
}

fn call_without_args(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    // [ identifier '(' ')' ]
    children.pop();
    children.pop();
    let name_token = children
        .pop()
        .ok_or_else(|| malformed("call name"))?
        .into_leaf()?;
    let name = name_token.name().ok_or_else(|| malformed("call name value"))?;
    lower_call(name, Vec::new())
}

fn first_argument(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    let item = children
        .pop()
        .ok_or_else(|| malformed("argument"))?
        .into_node()?;
    Ok(AstNode::arguments(vec![item]))
}

fn cons_argument(mut children: Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> {
    // [ expr ',' args ]
    let rest = children
        .pop()
        .ok_or_else(|| malformed("argument tail"))?
        .into_node()?;
    children.pop();
    let head = children
        .pop()
        .ok_or_else(|| malformed("argument head"))?
        .into_node()?;
    let mut items = vec![head];
    match &*rest {
        AstNode::Arguments(tail) => items.extend(tail.iter().cloned()),
        _ => return Err(malformed("argument tail list")),
    }
    Ok(AstNode::arguments(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grammar_builds_and_is_clean() {
        let grammar = formula_grammar();
        assert_eq!(grammar.name(grammar.start()), "expr");
        // Ten user non-terminals plus the synthesized accept symbol.
        assert_eq!(grammar.non_terminal_count(), 11);
    }

    #[test]
    fn test_binary_op_mapping_is_total_for_operators() {
        for kind in [
            TokenKind::Plus,
            TokenKind::Minus,
            TokenKind::Star,
            TokenKind::Slash,
            TokenKind::Percent,
            TokenKind::Caret,
            TokenKind::Less,
            TokenKind::LessEq,
            TokenKind::Greater,
            TokenKind::GreaterEq,
            TokenKind::EqEq,
            TokenKind::NotEq,
            TokenKind::AndAnd,
            TokenKind::OrOr,
        ] {
            assert!(binary_op_for(kind).is_some());
        }
        assert!(binary_op_for(TokenKind::LParen).is_none());
    }

    #[test]
    fn test_if_lowering_arity() {
        let args = vec![AstNode::boolean(true), AstNode::number(1.0).unwrap()];
        assert!(matches!(
            lower_call("IF", args),
            Err(FormulaError::Evaluation(EvaluationError::WrongArity { .. }))
        ));
        let args = vec![
            AstNode::boolean(true),
            AstNode::number(1.0).unwrap(),
            AstNode::number(2.0).unwrap(),
        ];
        assert!(matches!(
            lower_call("if", args).as_deref(),
            Ok(AstNode::If { .. })
        ));
    }
}
