//! The dense parsing table.
//!
//! One pass over the automaton assigns per-state actions: a Shift for every
//! terminal transition, a Reduce at (state, lookahead) for every complete
//! item of a non-augmented production, and Accept for the augmented
//! production at end of input, each through the conflict resolver when the
//! slot is already taken. GOTO entries come straight from the non-terminal
//! transitions. After LALR compression the maps are flattened into dense
//! `actions[state][terminal]` / `gotos[state][non-terminal]` arrays.
//!
//! A `ParsingTable` is immutable and shared read-only (behind `Arc`) across
//! concurrent parses.

use crate::error::{ConflictError, FormulaError};
use crate::grammar::{Grammar, NonTerm, Symbol, AUGMENTED_PRODUCTION};
use crate::lexer::TokenKind;
use crate::parser::conflict::{ConflictRecord, ConflictResolver};
use crate::parser::lalr::{compress_states_lalr, validate_lalr_merging};
use crate::parser::state::{build_lr1_states, LrItem, ParsingState};
use crate::parser::LrAction;

/// Construction counters, reported through diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    pub lr1_states: usize,
    pub lalr_states: usize,
    pub merged_groups: usize,
    pub rejected_merges: usize,
}

/// Dense action/goto lookup plus the conflict log.
pub struct ParsingTable {
    actions: Vec<Option<LrAction>>,
    gotos: Vec<Option<u32>>,
    num_states: usize,
    num_non_terminals: usize,
    conflicts: Vec<ConflictRecord>,
    stats: TableStats,
}

impl ParsingTable {
    /// Build the table for a validated grammar: LR(1) construction, action
    /// assignment through the resolver, LALR compression, merge
    /// re-validation, flattening.
    ///
    /// # Errors
    ///
    /// Grammar-size limits from state construction, or a [`ConflictError`]
    /// if merge re-validation fails.
    pub fn build(grammar: &Grammar) -> Result<Self, FormulaError> {
        Self::build_with(grammar, true)
    }

    /// Build from the canonical LR(1) automaton, skipping LALR compression.
    /// Larger table, same accepted language.
    ///
    /// # Errors
    ///
    /// Grammar-size limits from state construction.
    pub fn build_canonical(grammar: &Grammar) -> Result<Self, FormulaError> {
        Self::build_with(grammar, false)
    }

    fn build_with(grammar: &Grammar, use_lalr: bool) -> Result<Self, FormulaError> {
        let mut states = build_lr1_states(grammar)?;
        let lr1_states = states.len();

        let mut resolver = ConflictResolver::new();
        assign_actions(&mut states, grammar, &mut resolver);

        if !use_lalr {
            let stats = TableStats {
                lr1_states,
                lalr_states: lr1_states,
                merged_groups: 0,
                rejected_merges: 0,
            };
            return Ok(Self::flatten(
                &states,
                grammar.non_terminal_count(),
                resolver.into_records(),
                stats,
            ));
        }

        let original = states.clone();
        let outcome = compress_states_lalr(states);
        validate_lalr_merging(&original, &outcome).map_err(|reason| ConflictError {
            state: 0,
            terminal: TokenKind::Eof,
            reason,
        })?;

        let stats = TableStats {
            lr1_states,
            lalr_states: outcome.states.len(),
            merged_groups: outcome.merged_groups,
            rejected_merges: outcome.rejected_groups,
        };
        Ok(Self::flatten(
            &outcome.states,
            grammar.non_terminal_count(),
            resolver.into_records(),
            stats,
        ))
    }

    /// Flatten per-state maps into dense rows.
    fn flatten(
        states: &[ParsingState],
        num_non_terminals: usize,
        conflicts: Vec<ConflictRecord>,
        stats: TableStats,
    ) -> Self {
        let num_states = states.len();
        let mut actions = vec![None; num_states * TokenKind::COUNT];
        let mut gotos = vec![None; num_states * num_non_terminals];
        for state in states {
            let row = state.id * TokenKind::COUNT;
            for (terminal, action) in &state.actions {
                actions[row + terminal.index()] = Some(*action);
            }
            let row = state.id * num_non_terminals;
            for (nt, target) in &state.gotos {
                gotos[row + *nt as usize] = Some(u32::try_from(*target).unwrap_or(u32::MAX));
            }
        }
        Self {
            actions,
            gotos,
            num_states,
            num_non_terminals,
            conflicts,
            stats,
        }
    }

    /// Action for (state, terminal); `None` is the error entry.
    #[must_use]
    pub fn get_action(&self, state: usize, terminal: TokenKind) -> Option<LrAction> {
        if state >= self.num_states {
            return None;
        }
        self.actions[state * TokenKind::COUNT + terminal.index()]
    }

    /// Successor state for (state, non-terminal) after a reduction.
    #[must_use]
    pub fn get_goto(&self, state: usize, nt: NonTerm) -> Option<usize> {
        if state >= self.num_states || nt.index() >= self.num_non_terminals {
            return None;
        }
        self.gotos[state * self.num_non_terminals + nt.index()].map(|target| target as usize)
    }

    /// The full conflict log, resolved entries included.
    #[must_use]
    pub fn conflicts(&self) -> &[ConflictRecord] {
        &self.conflicts
    }

    #[must_use]
    pub fn unresolved_conflicts(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.conflicts.iter().filter(|record| !record.is_resolved())
    }

    /// Terminals with a valid action in `state`, in alphabet order; the
    /// expected set attached to syntax errors.
    #[must_use]
    pub fn expected_terminals(&self, state: usize) -> Vec<TokenKind> {
        if state >= self.num_states {
            return Vec::new();
        }
        let row = &self.actions[state * TokenKind::COUNT..(state + 1) * TokenKind::COUNT];
        TokenKind::ALL
            .into_iter()
            .filter(|kind| row[kind.index()].is_some())
            .collect()
    }

    #[must_use]
    pub const fn num_states(&self) -> usize {
        self.num_states
    }

    #[must_use]
    pub const fn stats(&self) -> &TableStats {
        &self.stats
    }
}

/// Assign shift/reduce/accept actions and gotos to every state, routing
/// collisions through the resolver. Public to the crate so compression can
/// be exercised on a fully action-assigned automaton.
pub fn assign_actions(
    states: &mut [ParsingState],
    grammar: &Grammar,
    resolver: &mut ConflictResolver,
) {
    for id in 0..states.len() {
        // Shift and goto entries from the transition map, in symbol order
        // so conflict records are deterministic.
        let mut transitions: Vec<(Symbol, usize)> = states[id]
            .transitions
            .iter()
            .map(|(s, t)| (*s, *t))
            .collect();
        transitions.sort_unstable();
        for (symbol, target) in transitions {
            match symbol {
                Symbol::Term(terminal) => {
                    install(states, id, terminal, LrAction::Shift(target), resolver);
                }
                Symbol::Rule(nt) => {
                    states[id].gotos.insert(nt.0, target);
                }
            }
        }

        // Reduce and accept entries from complete items.
        let complete: Vec<LrItem> = states[id]
            .items
            .iter()
            .copied()
            .filter(|item| item.is_complete(grammar))
            .collect();
        for item in complete {
            let action = if item.production as usize == AUGMENTED_PRODUCTION {
                LrAction::Accept
            } else {
                LrAction::Reduce(item.production as usize)
            };
            install(states, id, item.lookahead, action, resolver);
        }
    }
}

fn install(
    states: &mut [ParsingState],
    id: usize,
    terminal: TokenKind,
    incoming: LrAction,
    resolver: &mut ConflictResolver,
) {
    let chosen = match states[id].actions.get(&terminal) {
        Some(&existing) => resolver.resolve(id, terminal, existing, incoming),
        None => incoming,
    };
    states[id].actions.insert(terminal, chosen);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::AstNode;
    use crate::grammar::{formula_grammar, GrammarBuilder, StackValue};
    use crate::parser::conflict::Resolution;

    #[test]
    fn test_formula_table_builds_without_conflicts() {
        let grammar = formula_grammar();
        let table = ParsingTable::build(&grammar).unwrap();
        assert!(table.conflicts().is_empty());
        assert!(table.num_states() > 10);
        assert!(table.stats().lalr_states < table.stats().lr1_states);
    }

    #[test]
    fn test_start_state_expects_operand_starters() {
        let grammar = formula_grammar();
        let table = ParsingTable::build(&grammar).unwrap();
        let expected = table.expected_terminals(0);
        for kind in expected {
            assert!(kind.starts_operand(), "{kind:?} cannot start an operand");
        }
        assert!(matches!(
            table.get_action(0, TokenKind::Number),
            Some(LrAction::Shift(_))
        ));
        assert_eq!(table.get_action(0, TokenKind::Plus), None);
    }

    fn any_node(_children: Vec<StackValue>) -> Result<std::sync::Arc<AstNode>, FormulaError> {
        Ok(AstNode::boolean(true))
    }

    #[test]
    fn test_shift_reduce_conflict_prefers_shift() {
        // stmt -> '(' stmt ')' stmt | '(' stmt | identifier
        // After "( stmt" with ')' lookahead: shift ')' or reduce the short
        // form. The policy takes the shift.
        let mut builder = GrammarBuilder::new();
        let stmt = builder.non_terminal("stmt");
        builder.start_symbol(stmt);
        builder.production(
            stmt,
            [
                Symbol::Term(TokenKind::LParen),
                Symbol::Rule(stmt),
                Symbol::Term(TokenKind::RParen),
                Symbol::Rule(stmt),
            ],
            any_node,
        );
        builder.production(
            stmt,
            [Symbol::Term(TokenKind::LParen), Symbol::Rule(stmt)],
            any_node,
        );
        builder.production(stmt, [Symbol::Term(TokenKind::Identifier)], any_node);
        let grammar = builder.build().unwrap();
        let table = ParsingTable::build(&grammar).unwrap();

        let records = table.conflicts();
        assert!(!records.is_empty());
        assert!(records.iter().all(ConflictRecord::is_resolved));
        assert!(records
            .iter()
            .any(|r| r.resolution == Resolution::PreferShift));
    }

    #[test]
    fn test_reduce_reduce_conflict_prefers_lower_production() {
        // start -> a | b ; a -> identifier ; b -> identifier
        let mut builder = GrammarBuilder::new();
        let start = builder.non_terminal("start");
        let a = builder.non_terminal("a");
        let b = builder.non_terminal("b");
        builder.start_symbol(start);
        builder.production(start, [Symbol::Rule(a)], any_node);
        builder.production(start, [Symbol::Rule(b)], any_node);
        builder.production(a, [Symbol::Term(TokenKind::Identifier)], any_node);
        builder.production(b, [Symbol::Term(TokenKind::Identifier)], any_node);
        let grammar = builder.build().unwrap();
        let table = ParsingTable::build(&grammar).unwrap();

        let records: Vec<_> = table
            .conflicts()
            .iter()
            .filter(|r| r.resolution == Resolution::PreferLowerProduction)
            .collect();
        assert!(!records.is_empty());
        for record in records {
            match record.chosen {
                LrAction::Reduce(chosen) => {
                    let (LrAction::Reduce(x), LrAction::Reduce(y)) =
                        (record.existing, record.incoming)
                    else {
                        panic!("reduce/reduce record without reduce actions");
                    };
                    assert_eq!(chosen, x.min(y));
                }
                other => panic!("unexpected resolution action {other}"),
            }
        }
    }

    #[test]
    fn test_goto_entries_exist_for_reductions() {
        let grammar = formula_grammar();
        let table = ParsingTable::build(&grammar).unwrap();
        // State 0 must have a goto for every chain non-terminal reachable
        // at expression start.
        let start = grammar.start();
        assert!(table.get_goto(0, start).is_some());
    }
}
