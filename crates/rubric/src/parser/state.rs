//! Canonical LR(1) state construction.
//!
//! States are item sets closed under non-terminal expansion. The builder
//! runs a worklist from the closure of the augmented start item, reusing
//! states through a structural cache, so no two states share identical item
//! sets. All collections here are a local arena of the single-threaded
//! builder; the published automaton is immutable.

use std::collections::BTreeMap;

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use crate::config::MAX_STATES;
use crate::error::GrammarError;
use crate::grammar::{first_of_sequence, Grammar, Symbol};
use crate::lexer::TokenKind;
use crate::parser::LrAction;

/// An LR(1) item: a production, a dot position, and one lookahead terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LrItem {
    pub production: u32,
    pub dot: u32,
    pub lookahead: TokenKind,
}

impl LrItem {
    #[must_use]
    pub const fn new(production: u32, dot: u32, lookahead: TokenKind) -> Self {
        Self {
            production,
            dot,
            lookahead,
        }
    }

    /// The item's core: production and dot, lookahead ignored.
    #[must_use]
    pub const fn core(self) -> (u32, u32) {
        (self.production, self.dot)
    }

    /// The symbol after the dot, if the dot is not at the end.
    #[must_use]
    pub fn next_symbol(self, grammar: &Grammar) -> Option<Symbol> {
        grammar
            .production(self.production as usize)
            .rhs
            .get(self.dot as usize)
            .copied()
    }

    /// Whether the dot is at the end of the production.
    #[must_use]
    pub fn is_complete(self, grammar: &Grammar) -> bool {
        self.dot as usize == grammar.production(self.production as usize).rhs.len()
    }
}

/// One state of the automaton: its closed item set, the kernel that seeded
/// it, and its outgoing maps. Actions and gotos are assigned by the table
/// pass; after construction the state never changes.
#[derive(Debug, Clone)]
pub struct ParsingState {
    pub id: usize,
    /// Closed item set, sorted.
    pub items: Vec<LrItem>,
    /// Kernel items (the seed of the closure), sorted.
    pub kernel: Vec<LrItem>,
    /// Successor state per grammar symbol.
    pub transitions: HashMap<Symbol, usize, ahash::RandomState>,
    /// Terminal-indexed actions, filled by table construction.
    pub actions: HashMap<TokenKind, LrAction, ahash::RandomState>,
    /// Non-terminal-indexed gotos, filled by table construction.
    pub gotos: HashMap<u16, usize, ahash::RandomState>,
}

impl ParsingState {
    fn new(id: usize, kernel: Vec<LrItem>, items: Vec<LrItem>) -> Self {
        Self {
            id,
            items,
            kernel,
            transitions: HashMap::with_hasher(ahash::RandomState::new()),
            actions: HashMap::with_hasher(ahash::RandomState::new()),
            gotos: HashMap::with_hasher(ahash::RandomState::new()),
        }
    }

    /// The state's core signature: sorted, deduplicated item cores.
    #[must_use]
    pub fn core_signature(&self) -> Vec<(u32, u32)> {
        let mut cores: Vec<(u32, u32)> = self.items.iter().map(|i| i.core()).collect();
        cores.sort_unstable();
        cores.dedup();
        cores
    }
}

/// Close an item set: for every item with a non-terminal after the dot, add
/// items for each of that non-terminal's productions with every terminal in
/// `FIRST(remaining-symbols · lookahead)`, to fixpoint.
#[must_use]
pub fn closure(kernel: &[LrItem], grammar: &Grammar) -> Vec<LrItem> {
    let sets = grammar.sets();
    let mut closed: HashSet<LrItem, ahash::RandomState> =
        HashSet::with_hasher(ahash::RandomState::new());
    let mut worklist: Vec<LrItem> = kernel.to_vec();
    closed.extend(kernel.iter().copied());

    while let Some(item) = worklist.pop() {
        let Some(Symbol::Rule(nt)) = item.next_symbol(grammar) else {
            continue;
        };
        let production = grammar.production(item.production as usize);
        let remaining = &production.rhs[item.dot as usize + 1..];
        let lookaheads = first_of_sequence(remaining, item.lookahead, sets);
        for &pid in grammar.productions_of(nt) {
            for lookahead in lookaheads.iter() {
                let new_item = LrItem::new(pid as u32, 0, lookahead);
                if closed.insert(new_item) {
                    worklist.push(new_item);
                }
            }
        }
    }

    let mut items: Vec<LrItem> = closed.into_iter().collect();
    items.sort_unstable();
    items
}

/// Group a closed item set by the symbol after the dot, advancing the dot
/// for each: the kernels of the candidate successor states, in symbol
/// order.
#[must_use]
pub fn compute_transitions(
    items: &[LrItem],
    grammar: &Grammar,
) -> Vec<(Symbol, Vec<LrItem>)> {
    let mut successors: BTreeMap<Symbol, SmallVec<[LrItem; 8]>> = BTreeMap::new();
    for item in items {
        if let Some(symbol) = item.next_symbol(grammar) {
            successors
                .entry(symbol)
                .or_default()
                .push(LrItem::new(item.production, item.dot + 1, item.lookahead));
        }
    }
    successors
        .into_iter()
        .map(|(symbol, mut kernel)| {
            kernel.sort_unstable();
            (symbol, kernel.into_vec())
        })
        .collect()
}

/// Build the canonical LR(1) automaton with a worklist loop.
///
/// Structural item-set equality, checked through a state cache, decides
/// whether a successor reuses an existing state or registers a new one.
///
/// # Errors
///
/// [`GrammarError::TooManyStates`] if construction exceeds the state bound.
pub fn build_lr1_states(grammar: &Grammar) -> Result<Vec<ParsingState>, GrammarError> {
    let start_kernel = vec![LrItem::new(
        crate::grammar::AUGMENTED_PRODUCTION as u32,
        0,
        TokenKind::Eof,
    )];
    let start_items = closure(&start_kernel, grammar);

    let mut states = Vec::new();
    let mut cache: HashMap<Vec<LrItem>, usize, ahash::RandomState> =
        HashMap::with_hasher(ahash::RandomState::new());
    cache.insert(start_items.clone(), 0);
    states.push(ParsingState::new(0, start_kernel, start_items));

    let mut worklist = vec![0usize];
    while let Some(id) = worklist.pop() {
        let items = states[id].items.clone();
        for (symbol, kernel) in compute_transitions(&items, grammar) {
            let closed = closure(&kernel, grammar);
            let target = match cache.get(&closed) {
                Some(&existing) => existing,
                None => {
                    if states.len() >= MAX_STATES {
                        return Err(GrammarError::TooManyStates {
                            count: states.len() + 1,
                            limit: MAX_STATES,
                        });
                    }
                    let new_id = states.len();
                    cache.insert(closed.clone(), new_id);
                    states.push(ParsingState::new(new_id, kernel, closed));
                    worklist.push(new_id);
                    new_id
                }
            };
            states[id].transitions.insert(symbol, target);
        }
    }

    Ok(states)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::formula_grammar;

    #[test]
    fn test_start_state_closure_contains_all_layers() {
        let grammar = formula_grammar();
        let states = build_lr1_states(&grammar).unwrap();
        let start = &states[0];
        // The start closure reaches every chain non-terminal's productions.
        let productions: HashSet<u32> = start.items.iter().map(|i| i.production).collect();
        assert!(productions.contains(&(crate::grammar::AUGMENTED_PRODUCTION as u32)));
        assert!(productions.len() > 10);
    }

    #[test]
    fn test_no_two_states_share_item_sets() {
        let grammar = formula_grammar();
        let states = build_lr1_states(&grammar).unwrap();
        let mut seen = HashSet::new();
        for state in &states {
            assert!(seen.insert(state.items.clone()), "duplicate item set");
        }
    }

    #[test]
    fn test_transitions_target_valid_states() {
        let grammar = formula_grammar();
        let states = build_lr1_states(&grammar).unwrap();
        for state in &states {
            for target in state.transitions.values() {
                assert!(*target < states.len());
            }
        }
    }

    #[test]
    fn test_closure_is_deterministic() {
        let grammar = formula_grammar();
        let a = build_lr1_states(&grammar).unwrap();
        let b = build_lr1_states(&grammar).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.items, y.items);
        }
    }

    #[test]
    fn test_core_signature_ignores_lookahead() {
        let grammar = formula_grammar();
        let states = build_lr1_states(&grammar).unwrap();
        for state in &states {
            let sig = state.core_signature();
            assert!(!sig.is_empty());
            assert!(sig.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
