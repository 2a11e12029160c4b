//! # Prediction contexts
//!
//! A prediction context is a suffix of the rule-invocation stack: "what to do
//! when the current rule returns". Contexts are immutable and structurally
//! shared; many configurations point at the same parent chain.
//!
//! ```text
//!          [Empty]            ← bottom of every stack ("$")
//!          ▲     ▲
//!   [ret 12]     [ret 40]     ← Singleton: one return state + parent
//!          ▲     ▲
//!        [12 | 40]            ← Array: merged stacks, sorted by return state
//! ```
//!
//! Equality is structural with a precomputed hash, so two contexts that
//! describe the same set of stacks compare equal no matter how they were
//! built. The graph is acyclic: a node can only be built from existing
//! parents.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use dashmap::DashMap;
use rustc_hash::FxHasher;

use crate::atn::{Atn, StateId};

/// Return state marking the bottom of the stack inside an array context.
pub const EMPTY_RETURN_STATE: StateId = usize::MAX;

#[derive(Debug)]
pub enum PredictionContext {
    /// The empty stack.
    Empty,
    Singleton {
        parent: Arc<PredictionContext>,
        return_state: StateId,
        hash: u64,
    },
    /// Several stacks with distinct return states, sorted ascending. A slot
    /// whose return state is [`EMPTY_RETURN_STATE`] has the empty context
    /// as its parent.
    Array {
        parents: Vec<Arc<PredictionContext>>,
        return_states: Vec<StateId>,
        hash: u64,
    },
}

const EMPTY_HASH: u64 = 1;

impl PredictionContext {
    pub fn empty() -> Arc<PredictionContext> {
        static EMPTY: std::sync::OnceLock<Arc<PredictionContext>> = std::sync::OnceLock::new();
        EMPTY.get_or_init(|| Arc::new(PredictionContext::Empty)).clone()
    }

    /// Push `return_state` on top of `parent`.
    pub fn singleton(parent: Arc<PredictionContext>, return_state: StateId) -> Arc<PredictionContext> {
        if return_state == EMPTY_RETURN_STATE && parent.is_empty() {
            return PredictionContext::empty();
        }
        let hash = combine_hash(&[parent.hash_code()], &[return_state]);
        Arc::new(PredictionContext::Singleton { parent, return_state, hash })
    }

    fn array(parents: Vec<Arc<PredictionContext>>, return_states: Vec<StateId>) -> Arc<PredictionContext> {
        if return_states.len() == 1 {
            return PredictionContext::singleton(parents[0].clone(), return_states[0]);
        }
        let parent_hashes: Vec<u64> = parents.iter().map(|p| p.hash_code()).collect();
        let hash = combine_hash(&parent_hashes, &return_states);
        Arc::new(PredictionContext::Array { parents, return_states, hash })
    }

    /// Build the context for a rule-invocation chain. `invoking_states`
    /// lists the invoking state of each enclosing rule context, innermost
    /// first; each contributes the follow state of its rule transition.
    pub fn from_invoking_states(atn: &Atn, invoking_states: &[StateId]) -> Arc<PredictionContext> {
        let mut ctx = PredictionContext::empty();
        for &invoking in invoking_states.iter().rev() {
            if let Some(follow) = atn.follow_state_of(invoking) {
                ctx = PredictionContext::singleton(ctx, follow);
            }
        }
        ctx
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PredictionContext::Empty)
    }

    /// Number of stacks represented (the empty context counts as one).
    pub fn len(&self) -> usize {
        match self {
            PredictionContext::Empty | PredictionContext::Singleton { .. } => 1,
            PredictionContext::Array { return_states, .. } => return_states.len(),
        }
    }

    pub fn return_state(&self, i: usize) -> StateId {
        match self {
            PredictionContext::Empty => EMPTY_RETURN_STATE,
            PredictionContext::Singleton { return_state, .. } => *return_state,
            PredictionContext::Array { return_states, .. } => return_states[i],
        }
    }

    pub fn parent(&self, i: usize) -> Arc<PredictionContext> {
        match self {
            PredictionContext::Empty => PredictionContext::empty(),
            PredictionContext::Singleton { parent, .. } => parent.clone(),
            PredictionContext::Array { parents, .. } => parents[i].clone(),
        }
    }

    /// Whether one of the represented stacks is the empty stack.
    pub fn has_empty_path(&self) -> bool {
        self.return_state(self.len() - 1) == EMPTY_RETURN_STATE
    }

    pub fn hash_code(&self) -> u64 {
        match self {
            PredictionContext::Empty => EMPTY_HASH,
            PredictionContext::Singleton { hash, .. } | PredictionContext::Array { hash, .. } => *hash,
        }
    }

    fn as_array(this: &Arc<PredictionContext>) -> (Vec<Arc<PredictionContext>>, Vec<StateId>) {
        match this.as_ref() {
            PredictionContext::Array { parents, return_states, .. } => (parents.clone(), return_states.clone()),
            _ => (vec![this.parent(0)], vec![this.return_state(0)]),
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Merge
    // ══════════════════════════════════════════════════════════════════════

    /// Merge two contexts into one representing the union of their stacks.
    ///
    /// With `root_is_wildcard` (SLL prediction) the empty stack stands for
    /// "any caller", so merging anything with it yields the empty context.
    /// In full-context mode the empty stack is kept as a distinct member.
    pub fn merge(
        a: &Arc<PredictionContext>,
        b: &Arc<PredictionContext>,
        root_is_wildcard: bool,
    ) -> Arc<PredictionContext> {
        if Arc::ptr_eq(a, b) || a == b {
            return a.clone();
        }
        let a_single = !matches!(a.as_ref(), PredictionContext::Array { .. });
        let b_single = !matches!(b.as_ref(), PredictionContext::Array { .. });
        if a_single && b_single {
            return Self::merge_singletons(a, b, root_is_wildcard);
        }
        if root_is_wildcard {
            if a.is_empty() {
                return a.clone();
            }
            if b.is_empty() {
                return b.clone();
            }
        }
        Self::merge_arrays(a, b, root_is_wildcard)
    }

    fn merge_singletons(
        a: &Arc<PredictionContext>,
        b: &Arc<PredictionContext>,
        root_is_wildcard: bool,
    ) -> Arc<PredictionContext> {
        if let Some(root) = Self::merge_root(a, b, root_is_wildcard) {
            return root;
        }
        let (ra, rb) = (a.return_state(0), b.return_state(0));
        let (pa, pb) = (a.parent(0), b.parent(0));
        if ra == rb {
            let parent = Self::merge(&pa, &pb, root_is_wildcard);
            if parent == pa {
                return a.clone();
            }
            if parent == pb {
                return b.clone();
            }
            return PredictionContext::singleton(parent, ra);
        }
        // Different return states: an array of both, ordered by return state.
        let (first, second) = if ra < rb { ((pa, ra), (pb, rb)) } else { ((pb, rb), (pa, ra)) };
        PredictionContext::array(vec![first.0, second.0], vec![first.1, second.1])
    }

    /// Handle merges where at least one side is the empty stack.
    fn merge_root(
        a: &Arc<PredictionContext>,
        b: &Arc<PredictionContext>,
        root_is_wildcard: bool,
    ) -> Option<Arc<PredictionContext>> {
        if root_is_wildcard {
            if a.is_empty() || b.is_empty() {
                return Some(PredictionContext::empty());
            }
            return None;
        }
        match (a.is_empty(), b.is_empty()) {
            (true, true) => Some(PredictionContext::empty()),
            (true, false) => Some(PredictionContext::array(
                vec![b.parent(0), PredictionContext::empty()],
                vec![b.return_state(0), EMPTY_RETURN_STATE],
            )),
            (false, true) => Some(PredictionContext::array(
                vec![a.parent(0), PredictionContext::empty()],
                vec![a.return_state(0), EMPTY_RETURN_STATE],
            )),
            (false, false) => None,
        }
    }

    fn merge_arrays(
        a: &Arc<PredictionContext>,
        b: &Arc<PredictionContext>,
        root_is_wildcard: bool,
    ) -> Arc<PredictionContext> {
        let (a_parents, a_returns) = Self::as_array(a);
        let (b_parents, b_returns) = Self::as_array(b);
        let mut parents = Vec::with_capacity(a_returns.len() + b_returns.len());
        let mut returns = Vec::with_capacity(a_returns.len() + b_returns.len());
        let (mut i, mut j) = (0, 0);
        while i < a_returns.len() && j < b_returns.len() {
            let (ap, bp) = (&a_parents[i], &b_parents[j]);
            if a_returns[i] == b_returns[j] {
                let payload = a_returns[i];
                if ap == bp {
                    parents.push(ap.clone());
                } else {
                    parents.push(Self::merge(ap, bp, root_is_wildcard));
                }
                returns.push(payload);
                i += 1;
                j += 1;
            } else if a_returns[i] < b_returns[j] {
                parents.push(ap.clone());
                returns.push(a_returns[i]);
                i += 1;
            } else {
                parents.push(bp.clone());
                returns.push(b_returns[j]);
                j += 1;
            }
        }
        parents.extend(a_parents[i..].iter().cloned());
        returns.extend_from_slice(&a_returns[i..]);
        parents.extend(b_parents[j..].iter().cloned());
        returns.extend_from_slice(&b_returns[j..]);

        let merged = PredictionContext::array(parents, returns);
        if &merged == a {
            return a.clone();
        }
        if &merged == b {
            return b.clone();
        }
        merged
    }
}

fn combine_hash(parents: &[u64], return_states: &[StateId]) -> u64 {
    let mut h = FxHasher::default();
    parents.hash(&mut h);
    return_states.hash(&mut h);
    h.finish()
}

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.hash_code() != other.hash_code() {
            return false;
        }
        match (self, other) {
            (PredictionContext::Empty, PredictionContext::Empty) => true,
            (
                PredictionContext::Singleton { parent: pa, return_state: ra, .. },
                PredictionContext::Singleton { parent: pb, return_state: rb, .. },
            ) => ra == rb && pa == pb,
            (
                PredictionContext::Array { parents: pa, return_states: ra, .. },
                PredictionContext::Array { parents: pb, return_states: rb, .. },
            ) => ra == rb && pa == pb,
            _ => false,
        }
    }
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// PredictionContextCache
// ══════════════════════════════════════════════════════════════════════════════

/// Concurrent interning table: structurally equal contexts collapse to one
/// shared node, parents first.
#[derive(Debug, Default)]
pub struct PredictionContextCache {
    cache: DashMap<Arc<PredictionContext>, Arc<PredictionContext>>,
}

impl PredictionContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical node for `ctx`, interning it (and its parents)
    /// if it has not been seen.
    pub fn intern(&self, ctx: &Arc<PredictionContext>) -> Arc<PredictionContext> {
        if ctx.is_empty() {
            return PredictionContext::empty();
        }
        if let Some(existing) = self.cache.get(ctx) {
            return existing.value().clone();
        }
        let canonical = match ctx.as_ref() {
            PredictionContext::Empty => PredictionContext::empty(),
            PredictionContext::Singleton { parent, return_state, .. } => {
                let parent = self.intern(parent);
                PredictionContext::singleton(parent, *return_state)
            },
            PredictionContext::Array { parents, return_states, .. } => {
                let parents = parents.iter().map(|p| self.intern(p)).collect();
                PredictionContext::array(parents, return_states.clone())
            },
        };
        self.cache
            .entry(canonical.clone())
            .or_insert(canonical)
            .value()
            .clone()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stack(returns: &[StateId]) -> Arc<PredictionContext> {
        let mut ctx = PredictionContext::empty();
        for &r in returns {
            ctx = PredictionContext::singleton(ctx, r);
        }
        ctx
    }

    #[test]
    fn test_structural_equality() {
        let a = stack(&[3, 7]);
        let b = stack(&[3, 7]);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
        assert_ne!(a, stack(&[7, 3]));
    }

    #[test]
    fn test_merge_same_return_state_merges_parents() {
        let a = stack(&[1, 9]);
        let b = stack(&[2, 9]);
        let m = PredictionContext::merge(&a, &b, true);
        assert_eq!(m.len(), 1);
        assert_eq!(m.return_state(0), 9);
        let parent = m.parent(0);
        assert_eq!(parent.len(), 2);
        assert_eq!((parent.return_state(0), parent.return_state(1)), (1, 2));
    }

    #[test]
    fn test_merge_different_return_states_sorted() {
        let m = PredictionContext::merge(&stack(&[8]), &stack(&[4]), true);
        assert_eq!(m.len(), 2);
        assert_eq!((m.return_state(0), m.return_state(1)), (4, 8));
    }

    #[test]
    fn test_merge_with_empty_wildcard() {
        let m = PredictionContext::merge(&stack(&[5]), &PredictionContext::empty(), true);
        assert!(m.is_empty());
    }

    #[test]
    fn test_merge_with_empty_full_context_keeps_empty_path() {
        let m = PredictionContext::merge(&stack(&[5]), &PredictionContext::empty(), false);
        assert_eq!(m.len(), 2);
        assert!(m.has_empty_path());
        assert_eq!(m.return_state(0), 5);
        // Merging again with the empty stack is a no-op.
        let again = PredictionContext::merge(&m, &PredictionContext::empty(), false);
        assert_eq!(again, m);
    }

    #[test]
    fn test_merge_is_commutative() {
        let a = PredictionContext::merge(&stack(&[1, 2]), &stack(&[3]), false);
        let b = stack(&[4, 2]);
        assert_eq!(PredictionContext::merge(&a, &b, false), PredictionContext::merge(&b, &a, false));
    }

    #[test]
    fn test_cache_interns_shared_nodes() {
        let cache = PredictionContextCache::new();
        let a = cache.intern(&stack(&[3, 4]));
        let b = cache.intern(&stack(&[3, 4]));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.parent(0), &cache.intern(&stack(&[3]))));
    }
}
