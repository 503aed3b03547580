//! LALR state compression.
//!
//! After the canonical LR(1) automaton is built (and per-state actions are
//! assigned), states are grouped by core signature: the sorted set of
//! (production, dot) pairs, lookahead ignored. Two states merge only if
//! their cores are identical, the union of their action maps puts no
//! terminal under two different actions, and their transition maps agree
//! wherever both define a target for the same symbol. A merge unions item
//! sets, transitions, actions, and gotos, and keeps the lower state id.
//!
//! [`validate_lalr_merging`] re-checks that no kernel item was lost and no
//! conflict was introduced; a merge that fails the checks is rejected and
//! the affected states stay separate. Language acceptance is the invariant;
//! the achieved compression ratio is not.

use hashbrown::{HashMap, HashSet};

use crate::grammar::Symbol;
use crate::lexer::TokenKind;
use crate::parser::state::{LrItem, ParsingState};
use crate::parser::LrAction;

/// The result of a compression run.
#[derive(Debug)]
pub struct MergeOutcome {
    /// The compressed automaton, densely renumbered; state 0 is unchanged.
    pub states: Vec<ParsingState>,
    /// Old state id to new state id.
    pub remap: Vec<usize>,
    /// Core groups that actually merged two or more states.
    pub merged_groups: usize,
    /// Core groups left uncompressed because a check rejected the merge.
    pub rejected_groups: usize,
}

type CoreSignature = Vec<(u32, u32)>;

/// Compress an LR(1) automaton into its LALR form.
#[must_use]
pub fn compress_states_lalr(original: Vec<ParsingState>) -> MergeOutcome {
    let core_sigs: Vec<CoreSignature> = original.iter().map(ParsingState::core_signature).collect();

    // Group state ids by core signature, ordered by lowest member for
    // deterministic numbering.
    let mut by_core: HashMap<&CoreSignature, Vec<usize>> = HashMap::new();
    for (id, sig) in core_sigs.iter().enumerate() {
        by_core.entry(sig).or_default().push(id);
    }
    let mut groups: Vec<Vec<usize>> = by_core.into_values().collect();
    groups.sort_unstable_by_key(|group| group[0]);

    // Groups whose merge a later check rejected; retried as singletons.
    let mut forced_separate: HashSet<usize> = HashSet::new();

    loop {
        let (clusters, mut rejected_groups) =
            cluster(&original, &core_sigs, &groups, &forced_separate);
        match build_merged(&original, &clusters) {
            Ok((states, remap)) => {
                rejected_groups += forced_separate.len();
                let merged_groups = clusters.iter().filter(|c| c.len() > 1).count();
                return MergeOutcome {
                    states,
                    remap,
                    merged_groups,
                    rejected_groups,
                };
            }
            Err(bad_states) => {
                // A target disagreement surfaced only after remapping; keep
                // the offending groups apart and redo the clustering.
                let before = forced_separate.len();
                for sid in bad_states {
                    for (gid, group) in groups.iter().enumerate() {
                        if group.contains(&sid) {
                            forced_separate.insert(gid);
                        }
                    }
                }
                debug_assert!(forced_separate.len() > before, "merge retry must make progress");
                if forced_separate.len() == before {
                    // No progress possible: fall back to the uncompressed automaton.
                    let remap: Vec<usize> = (0..original.len()).collect();
                    return MergeOutcome {
                        states: original,
                        remap,
                        merged_groups: 0,
                        rejected_groups: groups.iter().filter(|g| g.len() > 1).count(),
                    };
                }
            }
        }
    }
}

/// Partition each core group into mergeable clusters. A group that would
/// split into several clusters is kept fully separate: partial merges make
/// successor remapping ambiguous.
fn cluster(
    states: &[ParsingState],
    core_sigs: &[CoreSignature],
    groups: &[Vec<usize>],
    forced_separate: &HashSet<usize>,
) -> (Vec<Vec<usize>>, usize) {
    let mut clusters: Vec<Vec<usize>> = Vec::with_capacity(groups.len());
    let mut rejected = 0;

    for (gid, group) in groups.iter().enumerate() {
        if group.len() == 1 || forced_separate.contains(&gid) {
            clusters.extend(group.iter().map(|id| vec![*id]));
            continue;
        }
        let mut local: Vec<Vec<usize>> = Vec::new();
        for &sid in group {
            let home = local
                .iter()
                .position(|members| members.iter().all(|&m| compatible(states, core_sigs, m, sid)));
            match home {
                Some(index) => local[index].push(sid),
                None => local.push(vec![sid]),
            }
        }
        if local.len() == 1 {
            clusters.push(local.remove(0));
        } else {
            rejected += 1;
            clusters.extend(group.iter().map(|id| vec![*id]));
        }
    }

    clusters.sort_unstable_by_key(|cluster| cluster[0]);
    (clusters, rejected)
}

/// Pairwise merge compatibility: action maps must agree wherever both are
/// defined (shift targets compared by core), and transition maps must agree
/// wherever both define the same symbol.
fn compatible(states: &[ParsingState], core_sigs: &[CoreSignature], a: usize, b: usize) -> bool {
    let left = &states[a];
    let right = &states[b];

    for (terminal, action_a) in &left.actions {
        if let Some(action_b) = right.actions.get(terminal) {
            if !actions_equal_by_core(core_sigs, *action_a, *action_b) {
                return false;
            }
        }
    }
    for (symbol, target_a) in &left.transitions {
        if let Some(target_b) = right.transitions.get(symbol) {
            if core_sigs[*target_a] != core_sigs[*target_b] {
                return false;
            }
        }
    }
    true
}

/// Before remapping, two shift actions agree iff their targets share a
/// core; every other pair must be identical.
fn actions_equal_by_core(core_sigs: &[CoreSignature], a: LrAction, b: LrAction) -> bool {
    match (a, b) {
        (LrAction::Shift(x), LrAction::Shift(y)) => core_sigs[x] == core_sigs[y],
        _ => a == b,
    }
}

fn remap_action(action: LrAction, remap: &[usize]) -> LrAction {
    match action {
        LrAction::Shift(target) => LrAction::Shift(remap[target]),
        other => other,
    }
}

/// Build the merged automaton. Returns the states whose union turned out
/// inconsistent after remapping, so the caller can reject those merges.
#[allow(clippy::type_complexity)]
fn build_merged(
    original: &[ParsingState],
    clusters: &[Vec<usize>],
) -> Result<(Vec<ParsingState>, Vec<usize>), Vec<usize>> {
    let mut remap = vec![0usize; original.len()];
    for (new_id, cluster) in clusters.iter().enumerate() {
        for &old in cluster {
            remap[old] = new_id;
        }
    }

    let mut merged = Vec::with_capacity(clusters.len());
    let mut bad: Vec<usize> = Vec::new();

    for (new_id, cluster) in clusters.iter().enumerate() {
        let mut items: Vec<LrItem> = Vec::new();
        let mut kernel: Vec<LrItem> = Vec::new();
        let mut transitions: HashMap<Symbol, usize, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        let mut actions: HashMap<TokenKind, LrAction, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        let mut gotos: HashMap<u16, usize, ahash::RandomState> =
            HashMap::with_hasher(ahash::RandomState::new());
        let mut consistent = true;

        for &old in cluster {
            let state = &original[old];
            items.extend(state.items.iter().copied());
            kernel.extend(state.kernel.iter().copied());
            for (symbol, target) in &state.transitions {
                let target = remap[*target];
                if *transitions.entry(*symbol).or_insert(target) != target {
                    consistent = false;
                }
            }
            for (terminal, action) in &state.actions {
                let action = remap_action(*action, &remap);
                if *actions.entry(*terminal).or_insert(action) != action {
                    consistent = false;
                }
            }
            for (nt, target) in &state.gotos {
                let target = remap[*target];
                if *gotos.entry(*nt).or_insert(target) != target {
                    consistent = false;
                }
            }
        }

        if !consistent {
            bad.extend(cluster.iter().copied());
            continue;
        }

        items.sort_unstable();
        items.dedup();
        kernel.sort_unstable();
        kernel.dedup();
        merged.push(ParsingState {
            id: new_id,
            items,
            kernel,
            transitions,
            actions,
            gotos,
        });
    }

    if bad.is_empty() {
        Ok((merged, remap))
    } else {
        Err(bad)
    }
}

/// Re-check a compression outcome: the union of kernel items across each
/// merged state must equal the union across the originals it replaced (no
/// information lost), and every original action must survive, unchanged
/// modulo renumbering (no conflicts introduced).
///
/// # Errors
///
/// A description of the first violated invariant.
pub fn validate_lalr_merging(
    original: &[ParsingState],
    outcome: &MergeOutcome,
) -> Result<(), String> {
    if outcome.remap.len() != original.len() {
        return Err(format!(
            "remap covers {} states, automaton has {}",
            outcome.remap.len(),
            original.len()
        ));
    }
    if outcome.remap.first() != Some(&0) {
        return Err("start state was renumbered".to_string());
    }

    // Kernel preservation per merged state.
    let mut expected_kernels: Vec<HashSet<LrItem>> =
        vec![HashSet::new(); outcome.states.len()];
    for (old, &new) in outcome.remap.iter().enumerate() {
        if new >= outcome.states.len() {
            return Err(format!("state {old} remapped out of range to {new}"));
        }
        expected_kernels[new].extend(original[old].kernel.iter().copied());
    }
    for state in &outcome.states {
        let actual: HashSet<LrItem> = state.kernel.iter().copied().collect();
        if actual != expected_kernels[state.id] {
            return Err(format!("kernel items lost in merged state {}", state.id));
        }
    }

    // No action changed or disappeared.
    for (old, &new) in outcome.remap.iter().enumerate() {
        let merged = &outcome.states[new];
        for (terminal, action) in &original[old].actions {
            let expected = remap_action(*action, &outcome.remap);
            match merged.actions.get(terminal) {
                Some(found) if *found == expected => {}
                Some(found) => {
                    return Err(format!(
                        "state {old} action on {} changed from {expected} to {found}",
                        terminal.describe()
                    ));
                }
                None => {
                    return Err(format!(
                        "state {old} action on {} lost in merge",
                        terminal.describe()
                    ));
                }
            }
        }
        for (symbol, target) in &original[old].transitions {
            match merged.transitions.get(symbol) {
                Some(found) if *found == outcome.remap[*target] => {}
                _ => return Err(format!("state {old} transition on {symbol:?} lost in merge")),
            }
        }
    }

    Ok(())
}
