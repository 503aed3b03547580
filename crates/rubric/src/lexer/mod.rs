//! # Lexer Module
//!
//! Tokenization for the formula language.
//!
//! The lexer converts an expression string into a flat token stream ending
//! in [`TokenKind::Eof`]. Classification runs through a small
//! [`CharPolicy`]: digits, identifier start/body, operator starts,
//! delimiters, and the `{name}` variable-delimiter form. Whitespace and
//! `//`/`/* */` comments are skipped; two-character operators are matched
//! greedily before their one-character prefixes.
//!
//! ```
//! use rubric::lexer::{Lexer, TokenKind};
//!
//! let tokens = Lexer::new().tokenize("{score} * 0.6 + 40").unwrap();
//! assert_eq!(tokens[0].kind, TokenKind::Variable);
//! assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
//! ```

pub mod scanner;
pub mod token;

pub use scanner::{CharPolicy, Lexer};
pub use token::{Span, Token, TokenKind, TokenValue};
