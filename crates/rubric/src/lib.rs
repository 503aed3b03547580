//! # Rubric
//!
//! A formula compilation and evaluation engine for admission-scoring
//! rubrics.
//!
//! ## Overview
//!
//! Rubric compiles bounded algebraic/logical expressions (arithmetic,
//! comparison, boolean logic, conditionals, function calls) through a
//! hand-built LR(1)/LALR pipeline into an optimized AST, then interprets
//! the tree against caller-supplied variable bindings:
//!
//! ```text
//! text -> Lexer -> tokens -> Parser (cached table) -> raw AST
//!      -> Optimizer -> optimized AST -> Evaluator/Formatter -> result
//! ```
//!
//! The pipeline stages are exposed individually (lexer, grammar
//! description, table construction, automaton, optimizer, evaluator), and
//! [`FormulaEngine`] drives them end to end.
//!
//! ## Quick Start
//!
//! ```
//! use rubric::{number_bindings, FormulaEngine, Value};
//!
//! let engine = FormulaEngine::new();
//! let report = engine
//!     .evaluate("IF({score} > 3, 10, 20)", &number_bindings(&[("score", 5.0)]))
//!     .unwrap();
//! assert_eq!(report.value, Value::Number(10.0));
//! ```
//!
//! ## Design
//!
//! - The grammar is a programmatic description: (left symbol, right-symbol
//!   sequence, AST-builder) triples over the lexer's fixed terminal
//!   alphabet, validated before any table is built.
//! - Parsing tables are built once per distinct grammar and memoized behind
//!   a thread-safe cache; the table itself is immutable and shared across
//!   concurrent parses, each of which owns its runtime state.
//! - Every unbounded-looking operation is capped by [`config::Limits`] and
//!   fails fast with a typed error.
//! - The core performs no I/O and persists nothing; variables and functions
//!   are capabilities supplied by the host.

pub mod ast;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod grammar;
pub mod lexer;
pub mod parser;
pub mod render;

pub use ast::optimize::{OptimizeOutcome, OptimizeStats, Optimizer};
pub use ast::{AstNode, BinaryOp, UnaryOp};
pub use config::{EngineOptions, Limits};
pub use engine::{number_bindings, Bindings, FormulaEngine, FormulaReport};
pub use error::{
    ConflictError, EvaluationError, FormulaError, GrammarError, LexicalError, Metrics,
    ResourceLimitError, Severity, SyntaxError, Warning,
};
pub use eval::{Builtins, Evaluator, FunctionLibrary, Value, VariableResolver};
pub use grammar::{formula_grammar, Grammar, GrammarBuilder, NonTerm, StackValue, Symbol};
pub use lexer::{Lexer, Span, Token, TokenKind};
pub use parser::{LrAction, ParserRuntime, ParsingTable, TableCache};
pub use render::Formatter;
