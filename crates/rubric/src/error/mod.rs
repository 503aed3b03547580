//! # Error Types
//!
//! Error taxonomy and diagnostics for the formula pipeline.
//!
//! ## Overview
//!
//! Every failure mode of the pipeline has a typed error:
//!
//! - [`LexicalError`]: tokenization failures (unexpected characters,
//!   unterminated `{...}` variables)
//! - [`SyntaxError`]: the automaton found no action for the current token
//! - [`GrammarError`]: a malformed grammar description (overlap, undefined
//!   or unreachable symbols, left recursion, size limits)
//! - [`ConflictError`]: action-table conflicts the resolver could not settle
//! - [`EvaluationError`]: unbound variables, arithmetic/domain errors,
//!   type mismatches
//! - [`ResourceLimitError`]: a configured bound was exceeded
//!
//! [`FormulaError`] unifies the taxonomy for callers that drive the whole
//! pipeline. Recoverable problems are reported as [`Warning`]s alongside the
//! result instead of aborting it, and [`Metrics`] carries the counters and
//! timings every evaluation returns.
//!
//! ## Diagnostics Support
//!
//! When the `diagnostics` feature is enabled, errors integrate with
//! [`miette`] for rich terminal reports.

use crate::lexer::{Token, TokenKind};
use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// Errors raised while turning source text into tokens.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum LexicalError {
    #[error("unexpected character '{ch}' at offset {position}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rubric::lexer::unexpected_char)))]
    UnexpectedCharacter { ch: char, position: usize },

    #[error("unterminated variable reference starting at offset {position}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rubric::lexer::unterminated_variable)))]
    UnterminatedVariable { position: usize },

    #[error("empty variable name at offset {position}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rubric::lexer::empty_variable)))]
    EmptyVariableName { position: usize },

    #[error("unterminated block comment starting at offset {position}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rubric::lexer::unterminated_comment)))]
    UnterminatedComment { position: usize },

    #[error("malformed number '{text}' at offset {position}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(rubric::lexer::malformed_number)))]
    MalformedNumber { text: String, position: usize },
}

impl LexicalError {
    /// Byte offset the error was detected at.
    #[must_use]
    pub const fn position(&self) -> usize {
        match self {
            Self::UnexpectedCharacter { position, .. }
            | Self::UnterminatedVariable { position }
            | Self::EmptyVariableName { position }
            | Self::UnterminatedComment { position }
            | Self::MalformedNumber { position, .. } => *position,
        }
    }
}

/// The automaton had no action for the lookahead token.
///
/// Carries enough context to be actionable: the automaton state, the token
/// that was actually seen, and the full set of terminals the state accepts.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
#[error("unexpected {found} at offset {}: expected {}", .found.span.start, format_expected(.expected))]
#[cfg_attr(feature = "diagnostics", diagnostic(code(rubric::parser::unexpected_token)))]
pub struct SyntaxError {
    /// Terminals with a valid action in `state`, sorted for stable output.
    pub expected: Vec<TokenKind>,
    /// The token the automaton stopped on.
    pub found: Token,
    /// The automaton state the mismatch occurred in.
    pub state: usize,
}

/// Format an expected-terminal set as a human-readable list.
#[must_use]
pub fn format_expected(expected: &[TokenKind]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [only] => only.describe().to_string(),
        [first, second] => format!("{} or {}", first.describe(), second.describe()),
        [head @ .., last] => {
            let mut out = head
                .iter()
                .map(|k| k.describe())
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(", or ");
            out.push_str(last.describe());
            out
        }
    }
}

/// A malformed grammar description.
///
/// Grammar errors abort table construction entirely; nothing can be parsed
/// against a grammar that fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum GrammarError {
    #[error("grammar has no productions")]
    Empty,

    #[error("grammar has {count} productions, limit is {limit}")]
    TooManyProductions { count: usize, limit: usize },

    #[error("start symbol '{name}' is not a declared non-terminal")]
    UnknownStartSymbol { name: String },

    #[error("non-terminal '{name}' clashes with a terminal of the same name")]
    SymbolClash { name: String },

    #[error("non-terminal '{name}' is referenced but has no productions")]
    UndefinedSymbol { name: String },

    #[error("productions {first} and {second} for '{symbol}' are identical")]
    DuplicateProduction {
        first: usize,
        second: usize,
        symbol: String,
    },

    #[error("non-terminal '{name}' is unreachable from the start symbol")]
    UnreachableSymbol { name: String },

    #[error("left recursion through {}", .cycle.join(" -> "))]
    LeftRecursion { cycle: Vec<String> },

    #[error("LR(1) construction produced {count} states, limit is {limit}")]
    TooManyStates { count: usize, limit: usize },
}

/// An action-table conflict the resolver declared unresolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
#[error("unresolved conflict in state {state} on {}: {reason}", .terminal.describe())]
pub struct ConflictError {
    pub state: usize,
    pub terminal: TokenKind,
    pub reason: String,
}

/// Errors raised while building or interpreting an AST.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum EvaluationError {
    #[error("variable '{name}' is not bound")]
    UnboundVariable { name: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulo by zero")]
    ModuloByZero,

    #[error("domain error in {function}: {message}")]
    DomainError { function: String, message: String },

    #[error("type mismatch in {context}: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
        context: &'static str,
    },

    #[error("unknown function '{name}' with {arity} argument(s)")]
    UnknownFunction { name: String, arity: usize },

    #[error("function '{function}' expects {expected} argument(s), found {found}")]
    WrongArity {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("numeric literal {value} is not finite")]
    NonFiniteLiteral { value: f64 },

    #[error("numeric literal {value} exceeds the magnitude bound {limit}")]
    MagnitudeExceeded { value: f64, limit: f64 },

    #[error("'{operation}' produced a non-finite result")]
    NonFiniteResult { operation: &'static str },

    #[error("malformed reduction in {context}")]
    MalformedReduction { context: &'static str },
}

/// Which configured bound was exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LimitKind {
    ParseSteps,
    StackDepth,
    NodeCount,
    NodeDepth,
    VariableCount,
    ArgumentCount,
    OptimizerPasses,
    RecoverySkips,
    ExpressionLength,
}

impl LimitKind {
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::ParseSteps => "parse steps",
            Self::StackDepth => "parser stack depth",
            Self::NodeCount => "AST node count",
            Self::NodeDepth => "AST depth",
            Self::VariableCount => "distinct variables",
            Self::ArgumentCount => "function arguments",
            Self::OptimizerPasses => "optimizer passes",
            Self::RecoverySkips => "error-recovery skips",
            Self::ExpressionLength => "expression length",
        }
    }
}

/// A configured bound was exceeded; the operation failed fast instead of
/// degrading or hanging.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
#[error("{} limit exceeded: observed {observed}, limit {limit}", .kind.describe())]
pub struct ResourceLimitError {
    pub kind: LimitKind,
    pub limit: usize,
    pub observed: usize,
}

impl ResourceLimitError {
    #[must_use]
    pub const fn new(kind: LimitKind, limit: usize, observed: usize) -> Self {
        Self {
            kind,
            limit,
            observed,
        }
    }
}

/// Unified error type for whole-pipeline callers.
#[derive(Debug, Clone, PartialEq, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum FormulaError {
    #[error(transparent)]
    Lexical(#[from] LexicalError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    ResourceLimit(#[from] ResourceLimitError),
}

/// Severity of a recoverable diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Info,
    Hint,
}

/// A recoverable problem recorded alongside a successful result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub message: String,
    pub position: Option<usize>,
    pub severity: Severity,
}

impl Warning {
    #[must_use]
    pub const fn new(message: String, position: Option<usize>, severity: Severity) -> Self {
        Self {
            message,
            position,
            severity,
        }
    }

    /// Create a warning-level diagnostic at a byte offset.
    #[must_use]
    pub const fn at(message: String, position: usize) -> Self {
        Self::new(message, Some(position), Severity::Warning)
    }
}

/// Counters and timings for one trip through the pipeline.
///
/// Returned with every [`crate::engine::FormulaReport`]; there are no
/// process-wide statistics.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Tokens produced by the lexer, including the end-of-input token.
    pub tokens: usize,
    /// Automaton iterations.
    pub parse_steps: usize,
    /// Shift actions taken.
    pub shifts: usize,
    /// Reduce actions taken.
    pub reduces: usize,
    /// Tokens skipped by error recovery.
    pub recovered_errors: usize,
    /// Optimizer passes run before the fixed point.
    pub optimizer_passes: usize,
    /// AST node count before optimization.
    pub nodes_before: usize,
    /// AST node count after optimization.
    pub nodes_after: usize,
    /// Whether the result came from the expression cache.
    pub cache_hit: bool,
    pub tokenize_time: std::time::Duration,
    pub parse_time: std::time::Duration,
    pub optimize_time: std::time::Duration,
    pub eval_time: std::time::Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::{Span, TokenKind};

    #[test]
    fn test_format_expected_list() {
        assert_eq!(format_expected(&[]), "nothing");
        assert_eq!(format_expected(&[TokenKind::Number]), "number");
        assert_eq!(
            format_expected(&[TokenKind::Number, TokenKind::LParen]),
            "number or '('"
        );
        assert_eq!(
            format_expected(&[TokenKind::Number, TokenKind::Identifier, TokenKind::LParen]),
            "number, identifier, or '('"
        );
    }

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError {
            expected: vec![TokenKind::Number, TokenKind::LParen],
            found: Token::plain(TokenKind::Plus, "+", Span::new(4, 5)),
            state: 7,
        };
        let text = err.to_string();
        assert!(text.contains("offset 4"));
        assert!(text.contains("number or '('"));
    }

    #[test]
    fn test_lexical_error_position() {
        let err = LexicalError::UnexpectedCharacter {
            ch: '@',
            position: 12,
        };
        assert_eq!(err.position(), 12);
    }

    #[test]
    fn test_resource_limit_display() {
        let err = ResourceLimitError::new(LimitKind::StackDepth, 256, 257);
        assert!(err.to_string().contains("parser stack depth"));
    }

    #[test]
    fn test_formula_error_from() {
        let err: FormulaError = LexicalError::EmptyVariableName { position: 3 }.into();
        assert!(matches!(err, FormulaError::Lexical(_)));
        let err: FormulaError = EvaluationError::DivisionByZero.into();
        assert!(matches!(err, FormulaError::Evaluation(_)));
    }
}
