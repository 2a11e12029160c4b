//! Prediction modes and the conflict analysis that drives SLL → LL
//! escalation.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::atn::config::AtnConfigSet;
use crate::atn::context::PredictionContext;
use crate::atn::{Atn, StateId, INVALID_ALT};

/// When SLL prediction gives way to full-context LL prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PredictionMode {
    /// Never escalate. On an SLL conflict, pick the lowest alternative.
    /// Fastest, and exact for grammars without context-dependent
    /// ambiguities.
    Sll,
    /// Escalate on an SLL conflict; stop full-context prediction as soon as
    /// a single viable alternative remains.
    #[default]
    Ll,
    /// Like `Ll`, but keep consuming until the ambiguity is proven exact.
    /// Meant for grammar diagnostics.
    LlExactAmbigDetection,
}

/// Alternatives grouped by (state, context).
pub type AltSubsets = Vec<BTreeSet<usize>>;

/// Should SLL prediction stop here because the set is conflicting (or done)?
///
/// Stops if every configuration finished its rule, or if some
/// (state, context) pair predicts several alternatives while no state is
/// associated with exactly one alternative.
pub fn has_sll_conflict_terminating_prediction(mode: PredictionMode, atn: &Atn, configs: &AtnConfigSet) -> bool {
    if configs.all_configs_in_rule_stop_states(atn) {
        return true;
    }
    let stripped;
    let configs = if mode == PredictionMode::Sll && configs.has_semantic_context {
        stripped = configs.without_semantic_contexts();
        &stripped
    } else {
        configs
    };
    let subsets = conflicting_alt_subsets(configs);
    has_conflicting_alt_set(&subsets) && !has_state_associated_with_one_alt(configs)
}

/// Alternatives for each distinct (state, context) pair.
pub fn conflicting_alt_subsets(configs: &AtnConfigSet) -> AltSubsets {
    let mut map: FxHashMap<(StateId, Arc<PredictionContext>), BTreeSet<usize>> = FxHashMap::default();
    let mut order = Vec::new();
    for c in configs {
        let key = (c.state, c.context.clone());
        let entry = map.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            BTreeSet::new()
        });
        entry.insert(c.alt);
    }
    order.into_iter().filter_map(|k| map.remove(&k)).collect()
}

/// Alternatives for each state, ignoring context.
pub fn state_to_alt_map(configs: &AtnConfigSet) -> FxHashMap<StateId, BTreeSet<usize>> {
    let mut map: FxHashMap<StateId, BTreeSet<usize>> = FxHashMap::default();
    for c in configs {
        map.entry(c.state).or_default().insert(c.alt);
    }
    map
}

pub fn has_state_associated_with_one_alt(configs: &AtnConfigSet) -> bool {
    state_to_alt_map(configs).values().any(|alts| alts.len() == 1)
}

pub fn has_conflicting_alt_set(subsets: &AltSubsets) -> bool {
    subsets.iter().any(|s| s.len() > 1)
}

pub fn has_non_conflicting_alt_set(subsets: &AltSubsets) -> bool {
    subsets.iter().any(|s| s.len() == 1)
}

pub fn all_subsets_conflict(subsets: &AltSubsets) -> bool {
    !has_non_conflicting_alt_set(subsets)
}

pub fn all_subsets_equal(subsets: &AltSubsets) -> bool {
    match subsets.first() {
        Some(first) => subsets.iter().all(|s| s == first),
        None => true,
    }
}

/// The union of all subsets.
pub fn union_alts(subsets: &AltSubsets) -> BTreeSet<usize> {
    subsets.iter().flatten().copied().collect()
}

/// The alternative every subset would resolve to by picking its minimum, or
/// [`INVALID_ALT`] if the subsets disagree.
pub fn single_viable_alt(subsets: &AltSubsets) -> usize {
    let viable: BTreeSet<usize> = subsets.iter().filter_map(|s| s.first().copied()).collect();
    if viable.len() > 1 {
        return INVALID_ALT;
    }
    viable.into_iter().next().unwrap_or(INVALID_ALT)
}

/// Full-context prediction may stop once this returns an alternative.
pub fn resolves_to_just_one_viable_alt(subsets: &AltSubsets) -> usize {
    single_viable_alt(subsets)
}

/// The single alternative predicted by every configuration in `configs`.
pub fn unique_alt_of(configs: &AtnConfigSet) -> usize {
    let mut alts = configs.iter().map(|c| c.alt);
    let Some(first) = alts.next() else {
        return INVALID_ALT;
    };
    if alts.all(|a| a == first) {
        first
    } else {
        INVALID_ALT
    }
}

/// Alternatives involved in conflicts.
pub fn conflicting_alts(configs: &AtnConfigSet) -> BTreeSet<usize> {
    union_alts(&conflicting_alt_subsets(configs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atn::config::AtnConfig;

    fn set(entries: &[(StateId, usize, StateId)]) -> AtnConfigSet {
        let mut s = AtnConfigSet::new(false);
        for &(state, alt, ret) in entries {
            s.add(AtnConfig::new(state, alt, PredictionContext::singleton(PredictionContext::empty(), ret)));
        }
        s
    }

    #[test]
    fn test_conflicting_subsets_group_by_state_and_context() {
        let configs = set(&[(1, 1, 9), (1, 2, 9), (1, 3, 8)]);
        let subsets = conflicting_alt_subsets(&configs);
        assert_eq!(subsets.len(), 2);
        assert!(has_conflicting_alt_set(&subsets));
        assert!(!all_subsets_conflict(&subsets));
    }

    #[test]
    fn test_single_viable_alt_is_min_per_subset() {
        let subsets: AltSubsets = vec![[2, 3].into_iter().collect(), [2, 4].into_iter().collect()];
        assert_eq!(single_viable_alt(&subsets), 2);
        let split: AltSubsets = vec![[2, 3].into_iter().collect(), [3].into_iter().collect()];
        assert_eq!(single_viable_alt(&split), INVALID_ALT);
    }

    #[test]
    fn test_unique_alt() {
        assert_eq!(unique_alt_of(&set(&[(1, 2, 5), (3, 2, 6)])), 2);
        assert_eq!(unique_alt_of(&set(&[(1, 2, 5), (3, 1, 6)])), INVALID_ALT);
        assert_eq!(unique_alt_of(&AtnConfigSet::new(false)), INVALID_ALT);
    }

    #[test]
    fn test_all_subsets_equal() {
        let subsets: AltSubsets = vec![[1, 2].into_iter().collect(), [1, 2].into_iter().collect()];
        assert!(all_subsets_equal(&subsets));
        assert!(all_subsets_conflict(&subsets));
    }
}
