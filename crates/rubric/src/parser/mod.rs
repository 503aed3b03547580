//! # Parser Module
//!
//! The LR(1)/LALR pipeline: canonical state construction, core-based LALR
//! compression, conflict resolution, the dense parsing table, and the
//! shift-reduce automaton that drives reductions through each production's
//! AST-builder.
//!
//! Construction order mirrors the data flow: [`state`] builds the canonical
//! LR(1) automaton, [`table`] assigns per-state actions through the
//! [`conflict`] resolver, [`lalr`] merges same-core states and re-validates
//! the merge, and the result is flattened into the dense, immutable
//! [`ParsingTable`]. Tables are memoized per grammar by [`TableCache`];
//! each parse owns its own [`runtime::RuntimeContext`].

pub mod cache;
pub mod conflict;
pub mod lalr;
pub mod runtime;
pub mod state;
pub mod table;

pub use cache::TableCache;
pub use conflict::{ConflictRecord, ConflictResolver};
pub use lalr::{compress_states_lalr, validate_lalr_merging, MergeOutcome};
pub use runtime::{ParseOutput, ParserRuntime, RuntimeContext};
pub use state::{build_lr1_states, closure, compute_transitions, LrItem, ParsingState};
pub use table::{ParsingTable, TableStats};

/// An entry of the action table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LrAction {
    /// Consume the lookahead and enter the given state.
    Shift(usize),
    /// Pop one right-hand side and apply the production's builder.
    Reduce(usize),
    /// The augmented production is complete; parsing succeeded.
    Accept,
}

impl std::fmt::Display for LrAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shift(state) => write!(f, "shift({state})"),
            Self::Reduce(production) => write!(f, "reduce({production})"),
            Self::Accept => f.write_str("accept"),
        }
    }
}
