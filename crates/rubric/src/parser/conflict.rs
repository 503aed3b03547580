//! Action-table conflict resolution.
//!
//! When table construction computes two actions for one (state, lookahead)
//! pair, the resolver applies a deterministic policy: shift wins over
//! reduce, and the lower-numbered production wins a reduce/reduce. Anything
//! else is an `Unresolved` verdict; the existing action is kept and the
//! conflict is appended to the log, so construction always completes with a
//! usable table plus a full diagnostic report.

use crate::lexer::TokenKind;
use crate::parser::LrAction;

/// How a recorded conflict was settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Shift preferred over reduce.
    PreferShift,
    /// Lower-numbered production preferred.
    PreferLowerProduction,
    /// The policy could not decide; the existing action was kept.
    Unresolved { reason: String },
}

/// One conflict consultation, resolved or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRecord {
    pub state: usize,
    pub terminal: TokenKind,
    pub existing: LrAction,
    pub incoming: LrAction,
    /// The action installed in the table.
    pub chosen: LrAction,
    pub resolution: Resolution,
}

impl ConflictRecord {
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        !matches!(self.resolution, Resolution::Unresolved { .. })
    }
}

/// The resolver: decides conflicts and keeps the log.
#[derive(Debug, Default)]
pub struct ConflictResolver {
    records: Vec<ConflictRecord>,
}

impl ConflictResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decide between an existing table entry and an incoming action for the
    /// same (state, lookahead); returns the action to install. Identical
    /// actions are not conflicts and are not recorded.
    pub fn resolve(
        &mut self,
        state: usize,
        terminal: TokenKind,
        existing: LrAction,
        incoming: LrAction,
    ) -> LrAction {
        if existing == incoming {
            return existing;
        }
        let (chosen, resolution) = Self::decide(existing, incoming);
        self.records.push(ConflictRecord {
            state,
            terminal,
            existing,
            incoming,
            chosen,
            resolution,
        });
        chosen
    }

    fn decide(existing: LrAction, incoming: LrAction) -> (LrAction, Resolution) {
        match (existing, incoming) {
            (shift @ LrAction::Shift(_), LrAction::Reduce(_))
            | (LrAction::Reduce(_), shift @ LrAction::Shift(_)) => {
                (shift, Resolution::PreferShift)
            }
            (LrAction::Reduce(a), LrAction::Reduce(b)) => (
                LrAction::Reduce(a.min(b)),
                Resolution::PreferLowerProduction,
            ),
            (LrAction::Shift(a), LrAction::Shift(b)) => (
                existing,
                Resolution::Unresolved {
                    reason: format!("shift/shift to states {a} and {b}"),
                },
            ),
            (LrAction::Accept, other) | (other, LrAction::Accept) => (
                LrAction::Accept,
                Resolution::Unresolved {
                    reason: format!("accept conflicts with {other}"),
                },
            ),
        }
    }

    /// All consultations, in construction order.
    #[must_use]
    pub fn records(&self) -> &[ConflictRecord] {
        &self.records
    }

    #[must_use]
    pub fn unresolved_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_resolved()).count()
    }

    #[must_use]
    pub fn into_records(self) -> Vec<ConflictRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_actions_are_not_conflicts() {
        let mut resolver = ConflictResolver::new();
        let chosen = resolver.resolve(
            1,
            TokenKind::Plus,
            LrAction::Shift(4),
            LrAction::Shift(4),
        );
        assert_eq!(chosen, LrAction::Shift(4));
        assert!(resolver.records().is_empty());
    }

    #[test]
    fn test_shift_preferred_over_reduce() {
        let mut resolver = ConflictResolver::new();
        let chosen = resolver.resolve(
            2,
            TokenKind::Plus,
            LrAction::Reduce(3),
            LrAction::Shift(7),
        );
        assert_eq!(chosen, LrAction::Shift(7));
        assert_eq!(resolver.records().len(), 1);
        assert!(resolver.records()[0].is_resolved());
        assert_eq!(resolver.unresolved_count(), 0);
    }

    #[test]
    fn test_lower_production_wins_reduce_reduce() {
        let mut resolver = ConflictResolver::new();
        let chosen = resolver.resolve(
            2,
            TokenKind::RParen,
            LrAction::Reduce(9),
            LrAction::Reduce(4),
        );
        assert_eq!(chosen, LrAction::Reduce(4));
        assert_eq!(
            resolver.records()[0].resolution,
            Resolution::PreferLowerProduction
        );
    }

    #[test]
    fn test_shift_shift_is_unresolved_and_keeps_existing() {
        let mut resolver = ConflictResolver::new();
        let chosen = resolver.resolve(
            0,
            TokenKind::Number,
            LrAction::Shift(1),
            LrAction::Shift(2),
        );
        assert_eq!(chosen, LrAction::Shift(1));
        assert_eq!(resolver.unresolved_count(), 1);
    }

    #[test]
    fn test_accept_conflict_is_unresolved() {
        let mut resolver = ConflictResolver::new();
        let chosen = resolver.resolve(
            5,
            TokenKind::Eof,
            LrAction::Accept,
            LrAction::Reduce(2),
        );
        assert_eq!(chosen, LrAction::Accept);
        assert_eq!(resolver.unresolved_count(), 1);
    }
}
