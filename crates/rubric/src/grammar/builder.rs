//! Grammar construction API.
//!
//! The builder accumulates non-terminal declarations and (lhs, rhs, builder)
//! production triples, then validates the whole description in `build` and
//! returns an immutable [`Grammar`]. Nothing escapes the builder without
//! passing validation.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use compact_str::CompactString;
use hashbrown::HashMap;

use crate::ast::AstNode;
use crate::error::{FormulaError, GrammarError};
use crate::grammar::{
    analysis::GrammarSets, validate::validate_grammar, Grammar, NodeBuilder, NonTerm, Production,
    Rhs, StackValue, Symbol,
};

/// Internal name of the synthesized augmented start symbol.
const ACCEPT_NAME: &str = "$accept";

#[derive(Default)]
pub struct GrammarBuilder {
    names: Vec<CompactString>,
    lookup: HashMap<CompactString, NonTerm>,
    start: Option<NonTerm>,
    rules: Vec<(NonTerm, Rhs, NodeBuilder)>,
}

impl GrammarBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or look up) a non-terminal by name.
    pub fn non_terminal(&mut self, name: &str) -> NonTerm {
        if let Some(existing) = self.lookup.get(name) {
            return *existing;
        }
        let nt = NonTerm(u16::try_from(self.names.len()).unwrap_or(u16::MAX));
        self.names.push(CompactString::from(name));
        self.lookup.insert(CompactString::from(name), nt);
        nt
    }

    /// Declare the start symbol.
    pub fn start_symbol(&mut self, start: NonTerm) -> &mut Self {
        self.start = Some(start);
        self
    }

    /// Add a production with its AST-builder.
    pub fn production<I, F>(&mut self, lhs: NonTerm, rhs: I, builder: F) -> &mut Self
    where
        I: IntoIterator<Item = Symbol>,
        F: Fn(Vec<StackValue>) -> Result<Arc<AstNode>, FormulaError> + Send + Sync + 'static,
    {
        let builder: NodeBuilder = Arc::new(builder);
        self.rules.push((lhs, rhs.into_iter().collect(), builder));
        self
    }

    /// Validate the description and produce the immutable grammar.
    ///
    /// # Errors
    ///
    /// The first violated check, per [`validate_grammar`]'s fixed order.
    pub fn build(self) -> Result<Grammar, GrammarError> {
        let start = self.start.ok_or_else(|| GrammarError::UnknownStartSymbol {
            name: "<none declared>".to_string(),
        })?;

        let mut names = self.names;
        let augmented = NonTerm(u16::try_from(names.len()).unwrap_or(u16::MAX));
        names.push(CompactString::from(ACCEPT_NAME));

        let mut productions = Vec::with_capacity(self.rules.len() + 1);
        productions.push(Production {
            id: 0,
            lhs: augmented,
            rhs: [Symbol::Rule(start)].into_iter().collect(),
            builder: Arc::new(|mut children: Vec<StackValue>| {
                children
                    .pop()
                    .ok_or(crate::error::EvaluationError::MalformedReduction {
                        context: "empty accept reduction",
                    })?
                    .into_node()
                    .map_err(FormulaError::from)
            }),
        });
        for (id, (lhs, rhs, builder)) in self.rules.into_iter().enumerate() {
            productions.push(Production {
                id: id + 1,
                lhs,
                rhs,
                builder,
            });
        }

        let sets = GrammarSets::compute(names.len(), start, &productions);
        validate_grammar(&names, start, &productions, &sets)?;
        let fingerprint = fingerprint(&names, start, &productions);

        Ok(Grammar::assemble(
            names,
            start,
            augmented,
            productions,
            sets,
            fingerprint,
        ))
    }
}

/// Structural grammar identity. Builders are deliberately excluded: the
/// parsing table depends only on the symbol structure.
fn fingerprint(names: &[CompactString], start: NonTerm, productions: &[Production]) -> u64 {
    let mut hasher = ahash::AHasher::default();
    names.len().hash(&mut hasher);
    for name in names {
        name.hash(&mut hasher);
    }
    start.index().hash(&mut hasher);
    productions.len().hash(&mut hasher);
    for production in productions {
        production.lhs.index().hash(&mut hasher);
        production.rhs.len().hash(&mut hasher);
        for symbol in &production.rhs {
            match symbol {
                Symbol::Term(t) => {
                    0u8.hash(&mut hasher);
                    t.index().hash(&mut hasher);
                }
                Symbol::Rule(n) => {
                    1u8.hash(&mut hasher);
                    n.index().hash(&mut hasher);
                }
            }
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::TokenKind;

    fn number_builder(
        mut children: Vec<StackValue>,
    ) -> Result<Arc<AstNode>, FormulaError> {
        let token = children
            .pop()
            .ok_or(crate::error::EvaluationError::MalformedReduction {
                context: "number reduction",
            })?
            .into_leaf()?;
        let value = token.number().unwrap_or(0.0);
        AstNode::number(value).map_err(FormulaError::from)
    }

    #[test]
    fn test_builder_deduplicates_names() {
        let mut builder = GrammarBuilder::new();
        let a = builder.non_terminal("expr");
        let b = builder.non_terminal("expr");
        assert_eq!(a, b);
    }

    #[test]
    fn test_minimal_grammar_builds() {
        let mut builder = GrammarBuilder::new();
        let expr = builder.non_terminal("expr");
        builder.start_symbol(expr);
        builder.production(expr, [Symbol::Term(TokenKind::Number)], number_builder);
        let grammar = builder.build().unwrap();
        assert_eq!(grammar.productions().len(), 2);
        assert_eq!(grammar.name(grammar.augmented()), "$accept");
        assert_eq!(grammar.productions_of(expr), &[1]);
    }

    #[test]
    fn test_missing_start_symbol() {
        let mut builder = GrammarBuilder::new();
        let expr = builder.non_terminal("expr");
        builder.production(expr, [Symbol::Term(TokenKind::Number)], number_builder);
        assert!(matches!(
            builder.build().unwrap_err(),
            GrammarError::UnknownStartSymbol { .. }
        ));
    }

    #[test]
    fn test_fingerprint_differs_by_structure() {
        let build = |kind: TokenKind| {
            let mut builder = GrammarBuilder::new();
            let expr = builder.non_terminal("expr");
            builder.start_symbol(expr);
            builder.production(expr, [Symbol::Term(kind)], number_builder);
            builder.build().unwrap()
        };
        assert_ne!(
            build(TokenKind::Number).fingerprint(),
            build(TokenKind::Boolean).fingerprint()
        );
    }
}
