//! The shift-reduce automaton.
//!
//! Each parse owns a [`RuntimeContext`] holding its state stack, value
//! stack, cursor, and counters, created at parse start and discarded at
//! parse end; nothing is shared between parses. The loop is bounded by the
//! configured step limit and stack depth, both fatal
//! [`crate::error::ResourceLimitError`]s when exceeded.
//!
//! On a missing action the automaton either fails with a [`SyntaxError`]
//! carrying the expected-terminal set, or, when error recovery is enabled,
//! skips the offending token (a bounded number of times), recording each
//! skip as a warning.

use std::sync::Arc;

use crate::ast::AstNode;
use crate::config::Limits;
use crate::error::{
    EvaluationError, FormulaError, LimitKind, ResourceLimitError, SyntaxError, Warning,
};
use crate::grammar::{Grammar, StackValue};
use crate::lexer::{Token, TokenKind};
use crate::parser::table::ParsingTable;
use crate::parser::LrAction;

/// Per-parse mutable state. Never shared, never reused.
#[derive(Debug, Default)]
pub struct RuntimeContext {
    pub state_stack: Vec<usize>,
    pub value_stack: Vec<StackValue>,
    pub cursor: usize,
    pub steps: usize,
    pub shifts: usize,
    pub reduces: usize,
    pub skipped: usize,
}

impl RuntimeContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state_stack: vec![0],
            ..Self::default()
        }
    }
}

/// A successful parse: the AST root plus per-parse diagnostics.
#[derive(Debug)]
pub struct ParseOutput {
    pub root: Arc<AstNode>,
    pub warnings: Vec<Warning>,
    pub steps: usize,
    pub shifts: usize,
    pub reduces: usize,
    /// Tokens skipped by error recovery.
    pub recovered: usize,
}

/// The automaton: a grammar, its table, and the runtime bounds.
pub struct ParserRuntime<'a> {
    grammar: &'a Grammar,
    table: &'a ParsingTable,
    limits: &'a Limits,
    error_recovery: bool,
}

impl<'a> ParserRuntime<'a> {
    #[must_use]
    pub const fn new(
        grammar: &'a Grammar,
        table: &'a ParsingTable,
        limits: &'a Limits,
        error_recovery: bool,
    ) -> Self {
        Self {
            grammar,
            table,
            limits,
            error_recovery,
        }
    }

    /// Run the automaton over a token stream (which must end with `Eof`, as
    /// the lexer guarantees).
    ///
    /// # Errors
    ///
    /// [`SyntaxError`] when no action exists and recovery is off or
    /// exhausted; [`ResourceLimitError`] when a bound is exceeded; builder
    /// errors from reductions pass through.
    pub fn parse(&self, tokens: &[Token]) -> Result<ParseOutput, FormulaError> {
        let mut ctx = RuntimeContext::new();
        let mut warnings = Vec::new();
        let eof = Token::plain(TokenKind::Eof, "", crate::lexer::Span::default());

        loop {
            ctx.steps += 1;
            if ctx.steps > self.limits.max_parse_steps {
                return Err(ResourceLimitError::new(
                    LimitKind::ParseSteps,
                    self.limits.max_parse_steps,
                    ctx.steps,
                )
                .into());
            }

            let state = *ctx.state_stack.last().unwrap_or(&0);
            let lookahead = tokens.get(ctx.cursor).unwrap_or(&eof);

            match self.table.get_action(state, lookahead.kind) {
                Some(LrAction::Shift(target)) => {
                    ctx.state_stack.push(target);
                    ctx.value_stack.push(StackValue::Leaf(lookahead.clone()));
                    ctx.cursor += 1;
                    ctx.shifts += 1;
                    if ctx.state_stack.len() > self.limits.max_stack_depth {
                        return Err(ResourceLimitError::new(
                            LimitKind::StackDepth,
                            self.limits.max_stack_depth,
                            ctx.state_stack.len(),
                        )
                        .into());
                    }
                }
                Some(LrAction::Reduce(production)) => {
                    self.reduce(&mut ctx, production)?;
                    ctx.reduces += 1;
                }
                Some(LrAction::Accept) => {
                    let root = match (ctx.value_stack.pop(), ctx.value_stack.pop()) {
                        (Some(StackValue::Node(node)), None) => node,
                        _ => {
                            return Err(EvaluationError::MalformedReduction {
                                context: "accept with a non-singleton value stack",
                            }
                            .into())
                        }
                    };
                    return Ok(ParseOutput {
                        root,
                        warnings,
                        steps: ctx.steps,
                        shifts: ctx.shifts,
                        reduces: ctx.reduces,
                        recovered: ctx.skipped,
                    });
                }
                None => {
                    if self.error_recovery
                        && lookahead.kind != TokenKind::Eof
                        && ctx.skipped < self.limits.max_recovery_skips
                    {
                        warnings.push(Warning::at(
                            format!("skipped unexpected {lookahead} during error recovery"),
                            lookahead.span.start as usize,
                        ));
                        ctx.cursor += 1;
                        ctx.skipped += 1;
                        continue;
                    }
                    return Err(SyntaxError {
                        expected: self.table.expected_terminals(state),
                        found: lookahead.clone(),
                        state,
                    }
                    .into());
                }
            }
        }
    }

    /// Pop one right-hand side, run the production's builder on the popped
    /// children, push the node and the GOTO state.
    fn reduce(&self, ctx: &mut RuntimeContext, production: usize) -> Result<(), FormulaError> {
        let rule = self.grammar.production(production);
        let arity = rule.rhs.len();
        if ctx.value_stack.len() < arity || ctx.state_stack.len() <= arity {
            return Err(EvaluationError::MalformedReduction {
                context: "reduction deeper than the stack",
            }
            .into());
        }

        let children = ctx.value_stack.split_off(ctx.value_stack.len() - arity);
        ctx.state_stack.truncate(ctx.state_stack.len() - arity);
        let below = *ctx.state_stack.last().unwrap_or(&0);

        let node = (rule.builder)(children)?;
        let target = self.table.get_goto(below, rule.lhs).ok_or(
            EvaluationError::MalformedReduction {
                context: "missing goto entry after reduction",
            },
        )?;
        ctx.state_stack.push(target);
        ctx.value_stack.push(StackValue::Node(node));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::grammar::formula_grammar;
    use crate::lexer::Lexer;

    fn parse(input: &str) -> Result<ParseOutput, FormulaError> {
        let grammar = formula_grammar();
        let table = ParsingTable::build(&grammar).unwrap();
        let limits = Limits::default();
        let tokens = Lexer::new().tokenize(input).unwrap();
        ParserRuntime::new(&grammar, &table, &limits, false).parse(&tokens)
    }

    #[test]
    fn test_parse_precedence() {
        let output = parse("3 + 4 * 2").unwrap();
        match &*output.root {
            AstNode::Binary { op, lhs, rhs } => {
                assert_eq!(*op, BinaryOp::Add);
                assert!(lhs.is_number(3.0));
                assert!(matches!(
                    &**rhs,
                    AstNode::Binary {
                        op: BinaryOp::Mul,
                        ..
                    }
                ));
            }
            other => panic!("unexpected root {other:?}"),
        }
        assert!(output.shifts > 0);
        assert!(output.reduces > 0);
    }

    #[test]
    fn test_syntax_error_carries_context() {
        let err = parse("3 + + 4").unwrap_err();
        let FormulaError::Syntax(err) = err else {
            panic!("expected syntax error, got {err:?}");
        };
        assert_eq!(err.found.kind, TokenKind::Plus);
        assert_eq!(err.found.span.start, 4);
        assert!(err.expected.iter().any(|k| k.starts_operand()));
        assert!(!err.expected.contains(&TokenKind::Plus));
    }

    #[test]
    fn test_unbalanced_parentheses_fail() {
        assert!(matches!(parse("(1 + 2"), Err(FormulaError::Syntax(_))));
        assert!(matches!(parse("1 + 2)"), Err(FormulaError::Syntax(_))));
    }

    #[test]
    fn test_empty_input_fails() {
        let err = parse("").unwrap_err();
        assert!(matches!(err, FormulaError::Syntax(_)));
    }

    #[test]
    fn test_recovery_skips_bounded() {
        let grammar = formula_grammar();
        let table = ParsingTable::build(&grammar).unwrap();
        let limits = Limits::default();
        let tokens = Lexer::new().tokenize("3 + + 4").unwrap();
        let output = ParserRuntime::new(&grammar, &table, &limits, true)
            .parse(&tokens)
            .unwrap();
        assert_eq!(output.recovered, 1);
        assert_eq!(output.warnings.len(), 1);
        assert!(output.root.is_number(3.0) || matches!(&*output.root, AstNode::Binary { .. }));
    }

    #[test]
    fn test_step_limit_enforced() {
        let grammar = formula_grammar();
        let table = ParsingTable::build(&grammar).unwrap();
        let limits = Limits {
            max_parse_steps: 3,
            ..Limits::default()
        };
        let tokens = Lexer::new().tokenize("1 + 2 + 3 + 4").unwrap();
        let err = ParserRuntime::new(&grammar, &table, &limits, false)
            .parse(&tokens)
            .unwrap_err();
        assert!(matches!(
            err,
            FormulaError::ResourceLimit(ResourceLimitError {
                kind: LimitKind::ParseSteps,
                ..
            })
        ));
    }

    #[test]
    fn test_stack_depth_limit_enforced() {
        let grammar = formula_grammar();
        let table = ParsingTable::build(&grammar).unwrap();
        let limits = Limits {
            max_stack_depth: 8,
            ..Limits::default()
        };
        let tokens = Lexer::new().tokenize("((((((((1))))))))").unwrap();
        let err = ParserRuntime::new(&grammar, &table, &limits, false)
            .parse(&tokens)
            .unwrap_err();
        assert!(matches!(
            err,
            FormulaError::ResourceLimit(ResourceLimitError {
                kind: LimitKind::StackDepth,
                ..
            })
        ));
    }

    #[test]
    fn test_construction_time_division_by_zero() {
        let err = parse("2 / 0").unwrap_err();
        assert!(matches!(
            err,
            FormulaError::Evaluation(EvaluationError::DivisionByZero)
        ));
        let err = parse("2 % 0").unwrap_err();
        assert!(matches!(
            err,
            FormulaError::Evaluation(EvaluationError::ModuloByZero)
        ));
    }

    #[test]
    fn test_if_call_parses_to_conditional() {
        let output = parse("IF(x > 3, 10, 20)").unwrap();
        assert!(matches!(&*output.root, AstNode::If { .. }));
    }

    #[test]
    fn test_right_associative_chains() {
        // The grammar is right-recursive (the validator bans left
        // recursion), so same-precedence chains associate to the right.
        let output = parse("10 - 2 - 3").unwrap();
        match &*output.root {
            AstNode::Binary { op, lhs, rhs } => {
                assert_eq!(*op, BinaryOp::Sub);
                assert!(lhs.is_number(10.0));
                assert!(matches!(
                    &**rhs,
                    AstNode::Binary {
                        op: BinaryOp::Sub,
                        ..
                    }
                ));
            }
            other => panic!("unexpected root {other:?}"),
        }
    }
}
