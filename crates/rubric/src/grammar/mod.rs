//! # Grammar Module
//!
//! The programmatic grammar description: an ordered list of productions
//! (left symbol, right-symbol sequence, AST-builder) over the lexer's fixed
//! terminal alphabet, plus non-terminal and start-symbol declarations.
//!
//! A [`Grammar`] is a fixed, validated value object. Construction goes
//! through [`GrammarBuilder`], which runs the ordered checks in
//! [`validate`] and precomputes the FIRST/FOLLOW sets in [`analysis`];
//! a grammar that fails validation never exists as a value.
//!
//! Each production carries a pure builder closure (`children -> node`)
//! attached at construction time; the parser runtime dispatches reduce
//! actions through it without any runtime type inspection.

pub mod analysis;
pub mod builder;
pub mod formula;
pub mod validate;

use std::sync::Arc;

use compact_str::CompactString;
use smallvec::SmallVec;

use crate::ast::AstNode;
use crate::error::FormulaError;
use crate::lexer::{Token, TokenKind};

pub use analysis::{first_of_sequence, GrammarSets, TermSet};
pub use builder::GrammarBuilder;
pub use formula::formula_grammar;
pub use validate::validate_grammar;

/// A declared non-terminal, addressed by index into the grammar's name
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonTerm(pub(crate) u16);

impl NonTerm {
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A grammar symbol: terminal or non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Term(TokenKind),
    Rule(NonTerm),
}

/// One entry of the automaton's value stack: a leaf for a shifted token, or
/// a node built by an earlier reduction.
#[derive(Debug, Clone)]
pub enum StackValue {
    Leaf(Token),
    Node(Arc<AstNode>),
}

impl StackValue {
    /// Extract a node, failing on an unexpected leaf.
    ///
    /// # Errors
    ///
    /// Malformed-reduction error; builders use this to guard their shape
    /// invariants without panicking.
    pub fn into_node(self) -> Result<Arc<AstNode>, crate::error::EvaluationError> {
        match self {
            Self::Node(node) => Ok(node),
            Self::Leaf(_) => Err(crate::error::EvaluationError::MalformedReduction {
                context: "expected a node on the value stack",
            }),
        }
    }

    /// Extract a token leaf, failing on an unexpected node.
    ///
    /// # Errors
    ///
    /// Malformed-reduction error.
    pub fn into_leaf(self) -> Result<Token, crate::error::EvaluationError> {
        match self {
            Self::Leaf(token) => Ok(token),
            Self::Node(_) => Err(crate::error::EvaluationError::MalformedReduction {
                context: "expected a token on the value stack",
            }),
        }
    }
}

/// The AST-builder attached to a production: popped children in, one node
/// out.
pub type NodeBuilder = Arc<dyn Fn(Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> + Send + Sync>;

/// Right-hand-side symbol sequence.
pub type Rhs = SmallVec<[Symbol; 6]>;

/// A single production rule. Immutable after grammar construction.
#[derive(Clone)]
pub struct Production {
    pub id: usize,
    pub lhs: NonTerm,
    pub rhs: Rhs,
    pub builder: NodeBuilder,
}

impl std::fmt::Debug for Production {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Production")
            .field("id", &self.id)
            .field("lhs", &self.lhs)
            .field("rhs", &self.rhs)
            .finish_non_exhaustive()
    }
}

/// Index of the augmented start production in every grammar.
pub const AUGMENTED_PRODUCTION: usize = 0;

/// A validated grammar: productions, symbol tables, start symbol, and the
/// precomputed FIRST/FOLLOW analysis. Immutable.
pub struct Grammar {
    names: Vec<CompactString>,
    start: NonTerm,
    augmented: NonTerm,
    productions: Vec<Production>,
    by_lhs: Vec<Vec<usize>>,
    sets: GrammarSets,
    fingerprint: u64,
}

impl Grammar {
    pub(crate) fn assemble(
        names: Vec<CompactString>,
        start: NonTerm,
        augmented: NonTerm,
        productions: Vec<Production>,
        sets: GrammarSets,
        fingerprint: u64,
    ) -> Self {
        let mut by_lhs = vec![Vec::new(); names.len()];
        for production in &productions {
            by_lhs[production.lhs.index()].push(production.id);
        }
        Self {
            names,
            start,
            augmented,
            productions,
            by_lhs,
            sets,
            fingerprint,
        }
    }

    /// Display name of a non-terminal.
    #[must_use]
    pub fn name(&self, nt: NonTerm) -> &str {
        &self.names[nt.index()]
    }

    #[must_use]
    pub const fn start(&self) -> NonTerm {
        self.start
    }

    /// The synthesized start symbol of the augmented production.
    #[must_use]
    pub const fn augmented(&self) -> NonTerm {
        self.augmented
    }

    #[must_use]
    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    #[must_use]
    pub fn production(&self, id: usize) -> &Production {
        &self.productions[id]
    }

    /// Production ids whose left symbol is `nt`.
    #[must_use]
    pub fn productions_of(&self, nt: NonTerm) -> &[usize] {
        &self.by_lhs[nt.index()]
    }

    /// Number of non-terminals, the augmented start symbol included; the
    /// width of a goto-table row.
    #[must_use]
    pub fn non_terminal_count(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub const fn sets(&self) -> &GrammarSets {
        &self.sets
    }

    /// Structural identity of this grammar, the key of the parsing-table
    /// cache. Builders are excluded: the table depends only on symbols.
    #[must_use]
    pub const fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl std::fmt::Debug for Grammar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Grammar")
            .field("start", &self.name(self.start))
            .field("non_terminals", &self.names.len())
            .field("productions", &self.productions.len())
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_grammar_shape() {
        let grammar = formula_grammar();
        assert!(grammar.productions().len() > 10);
        assert_eq!(grammar.production(AUGMENTED_PRODUCTION).lhs, grammar.augmented());
        assert_eq!(grammar.name(grammar.start()), "expr");
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = formula_grammar();
        let b = formula_grammar();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_stack_value_extractors() {
        use crate::lexer::{Span, Token, TokenKind};
        let leaf = StackValue::Leaf(Token::plain(TokenKind::Plus, "+", Span::new(0, 1)));
        assert!(leaf.clone().into_leaf().is_ok());
        assert!(leaf.into_node().is_err());
        let node = StackValue::Node(AstNode::boolean(true));
        assert!(node.clone().into_node().is_ok());
        assert!(node.into_leaf().is_err());
    }
}
