//! FIRST/FOLLOW analysis.
//!
//! Computed once per grammar by fixpoint iteration and stored on the
//! [`crate::grammar::Grammar`]. FIRST (with nullable tracking) feeds the
//! LR(1) closure computation; FOLLOW is kept for diagnostics and grammar
//! reports.

use crate::grammar::{NonTerm, Production, Symbol};
use crate::lexer::TokenKind;

/// A set of terminals, packed as a bitmask over the fixed alphabet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TermSet(u32);

const _: () = assert!(TokenKind::COUNT <= 32, "TermSet packs the alphabet into a u32");

impl TermSet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Insert a terminal; returns whether the set changed.
    pub fn insert(&mut self, kind: TokenKind) -> bool {
        let bit = 1u32 << kind.index();
        let changed = self.0 & bit == 0;
        self.0 |= bit;
        changed
    }

    #[must_use]
    pub const fn contains(self, kind: TokenKind) -> bool {
        self.0 & (1u32 << kind.index()) != 0
    }

    /// Union `other` into self; returns whether the set changed.
    pub fn union(&mut self, other: Self) -> bool {
        let before = self.0;
        self.0 |= other.0;
        self.0 != before
    }

    #[must_use]
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Iterate members in discriminant order.
    pub fn iter(self) -> impl Iterator<Item = TokenKind> {
        TokenKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<TokenKind> for TermSet {
    fn from_iter<I: IntoIterator<Item = TokenKind>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

/// Nullable/FIRST/FOLLOW, indexed by non-terminal.
#[derive(Debug, Clone)]
pub struct GrammarSets {
    pub nullable: Vec<bool>,
    pub first: Vec<TermSet>,
    pub follow: Vec<TermSet>,
}

impl GrammarSets {
    /// Fixpoint computation over all symbols.
    #[must_use]
    pub fn compute(non_terminal_count: usize, start: NonTerm, productions: &[Production]) -> Self {
        let mut nullable = vec![false; non_terminal_count];
        let mut first = vec![TermSet::empty(); non_terminal_count];

        // Nullable and FIRST converge together.
        let mut changed = true;
        while changed {
            changed = false;
            for production in productions {
                let lhs = production.lhs.index();
                let mut all_nullable = true;
                for symbol in &production.rhs {
                    match symbol {
                        Symbol::Term(t) => {
                            if first[lhs].insert(*t) {
                                changed = true;
                            }
                            all_nullable = false;
                            break;
                        }
                        Symbol::Rule(n) => {
                            let other = first[n.index()];
                            if first[lhs].union(other) {
                                changed = true;
                            }
                            if !nullable[n.index()] {
                                all_nullable = false;
                                break;
                            }
                        }
                    }
                }
                if all_nullable && !nullable[lhs] {
                    nullable[lhs] = true;
                    changed = true;
                }
            }
        }

        // FOLLOW, seeded with end-of-input after the start symbol.
        let mut follow = vec![TermSet::empty(); non_terminal_count];
        follow[start.index()].insert(TokenKind::Eof);
        let mut changed = true;
        while changed {
            changed = false;
            for production in productions {
                for (i, symbol) in production.rhs.iter().enumerate() {
                    let Symbol::Rule(n) = symbol else { continue };
                    let mut tail_nullable = true;
                    for rest in &production.rhs[i + 1..] {
                        match rest {
                            Symbol::Term(t) => {
                                if follow[n.index()].insert(*t) {
                                    changed = true;
                                }
                                tail_nullable = false;
                                break;
                            }
                            Symbol::Rule(m) => {
                                let other = first[m.index()];
                                if follow[n.index()].union(other) {
                                    changed = true;
                                }
                                if !nullable[m.index()] {
                                    tail_nullable = false;
                                    break;
                                }
                            }
                        }
                    }
                    if tail_nullable {
                        let inherited = follow[production.lhs.index()];
                        if follow[n.index()].union(inherited) {
                            changed = true;
                        }
                    }
                }
            }
        }

        Self {
            nullable,
            first,
            follow,
        }
    }

    #[must_use]
    pub fn is_nullable(&self, nt: NonTerm) -> bool {
        self.nullable[nt.index()]
    }

    #[must_use]
    pub fn first(&self, nt: NonTerm) -> TermSet {
        self.first[nt.index()]
    }

    #[must_use]
    pub fn follow(&self, nt: NonTerm) -> TermSet {
        self.follow[nt.index()]
    }
}

/// FIRST of a symbol sequence followed by a lookahead terminal, the quantity
/// the closure computation consumes: `FIRST(β · a)`.
#[must_use]
pub fn first_of_sequence(symbols: &[Symbol], lookahead: TokenKind, sets: &GrammarSets) -> TermSet {
    let mut result = TermSet::empty();
    for symbol in symbols {
        match symbol {
            Symbol::Term(t) => {
                result.insert(*t);
                return result;
            }
            Symbol::Rule(n) => {
                result.union(sets.first(*n));
                if !sets.is_nullable(*n) {
                    return result;
                }
            }
        }
    }
    result.insert(lookahead);
    result
}

/// Size metrics of a grammar, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrammarMetrics {
    pub production_count: usize,
    pub non_terminal_count: usize,
    pub nullable_count: usize,
    pub max_rhs_len: usize,
}

impl GrammarMetrics {
    #[must_use]
    pub fn compute(grammar: &crate::grammar::Grammar) -> Self {
        Self {
            production_count: grammar.productions().len(),
            non_terminal_count: grammar.non_terminal_count(),
            nullable_count: grammar.sets().nullable.iter().filter(|n| **n).count(),
            max_rhs_len: grammar
                .productions()
                .iter()
                .map(|p| p.rhs.len())
                .max()
                .unwrap_or(0),
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} productions over {} non-terminals, {} nullable, longest rhs {}",
            self.production_count, self.non_terminal_count, self.nullable_count, self.max_rhs_len
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::formula_grammar;

    #[test]
    fn test_term_set_basics() {
        let mut set = TermSet::empty();
        assert!(set.insert(TokenKind::Plus));
        assert!(!set.insert(TokenKind::Plus));
        assert!(set.contains(TokenKind::Plus));
        assert!(!set.contains(TokenKind::Minus));
        assert_eq!(set.len(), 1);
        let other: TermSet = [TokenKind::Minus, TokenKind::Plus].into_iter().collect();
        assert!(set.union(other));
        assert_eq!(set.len(), 2);
        assert_eq!(
            set.iter().collect::<Vec<_>>(),
            vec![TokenKind::Plus, TokenKind::Minus]
        );
    }

    #[test]
    fn test_formula_grammar_first_sets() {
        let grammar = formula_grammar();
        let first = grammar.sets().first(grammar.start());
        // Everything that can begin an operand begins an expression.
        for kind in [
            TokenKind::Number,
            TokenKind::Boolean,
            TokenKind::Identifier,
            TokenKind::Variable,
            TokenKind::LParen,
            TokenKind::Minus,
            TokenKind::Bang,
        ] {
            assert!(first.contains(kind), "FIRST(expr) should contain {kind:?}");
        }
        assert!(!first.contains(TokenKind::Plus));
    }

    #[test]
    fn test_formula_grammar_has_no_nullables() {
        let grammar = formula_grammar();
        assert!(grammar.sets().nullable.iter().all(|n| !n));
    }

    #[test]
    fn test_follow_contains_eof_for_start() {
        let grammar = formula_grammar();
        assert!(grammar.sets().follow(grammar.start()).contains(TokenKind::Eof));
    }

    #[test]
    fn test_metrics_summary() {
        let grammar = formula_grammar();
        let metrics = GrammarMetrics::compute(&grammar);
        assert!(metrics.production_count > 10);
        assert!(metrics.summary().contains("productions"));
    }
}
