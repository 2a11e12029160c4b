//! ATN configurations and configuration sets.
//!
//! A configuration is one thread of the ATN simulation: "in `state`,
//! predicting `alt`, with call stack `context`, guarded by
//! `semantic_context`". A configuration set is the frontier of all such
//! threads after some input prefix; its signature is the identity of a DFA
//! state.

use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHasher};

use crate::atn::context::{PredictionContext, PredictionContextCache};
use crate::atn::semantic::SemanticContext;
use crate::atn::{Atn, StateId, INVALID_ALT};
use crate::lexer::action::LexerActionExecutor;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AtnConfig {
    pub state: StateId,
    pub alt: usize,
    pub context: Arc<PredictionContext>,
    pub semantic_context: Arc<SemanticContext>,
    /// How many rule stops this thread has fallen off past the decision's
    /// own rule. Non-zero means it depends on the outer context.
    pub reaches_into_outer_context: usize,
    /// Set when leaving a left-recursive rule through its outermost return;
    /// such threads survive the precedence filter.
    pub precedence_filter_suppressed: bool,
    /// Lexer only: actions queued along this thread.
    pub lexer_action_executor: Option<Arc<LexerActionExecutor>>,
    /// Lexer only: the thread went through a non-greedy decision.
    pub passed_through_non_greedy_decision: bool,
}

impl AtnConfig {
    pub fn new(state: StateId, alt: usize, context: Arc<PredictionContext>) -> Self {
        AtnConfig {
            state,
            alt,
            context,
            semantic_context: SemanticContext::none(),
            reaches_into_outer_context: 0,
            precedence_filter_suppressed: false,
            lexer_action_executor: None,
            passed_through_non_greedy_decision: false,
        }
    }

    /// Same thread, moved to `state`.
    pub fn moved_to(&self, state: StateId) -> Self {
        AtnConfig { state, ..self.clone() }
    }

    pub fn with_context(&self, state: StateId, context: Arc<PredictionContext>) -> Self {
        AtnConfig { state, context, ..self.clone() }
    }

    pub fn with_semantic_context(&self, state: StateId, semantic_context: Arc<SemanticContext>) -> Self {
        AtnConfig { state, semantic_context, ..self.clone() }
    }

    pub fn outer_context_depth(&self) -> usize {
        self.reaches_into_outer_context
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum ConfigKey {
    /// Parser sets: one entry per (state, alt, predicate); contexts merge.
    Merged {
        state: StateId,
        alt: usize,
        semantic: Arc<SemanticContext>,
    },
    /// Lexer sets: exact duplicates only; insertion order is priority.
    Exact(Box<AtnConfig>),
}

/// A deduplicated, insertion-ordered collection of configurations.
#[derive(Debug, Clone)]
pub struct AtnConfigSet {
    configs: Vec<AtnConfig>,
    index: FxHashMap<ConfigKey, usize>,
    /// Built during full-context (LL) simulation: the empty stack is a real
    /// member rather than a wildcard when merging contexts.
    pub full_ctx: bool,
    ordered: bool,
    /// The single alternative predicted by every configuration, or
    /// [`INVALID_ALT`].
    pub unique_alt: usize,
    pub conflicting_alts: Option<BTreeSet<usize>>,
    pub has_semantic_context: bool,
    pub dips_into_outer_context: bool,
}

impl AtnConfigSet {
    pub fn new(full_ctx: bool) -> Self {
        AtnConfigSet {
            configs: Vec::new(),
            index: FxHashMap::default(),
            full_ctx,
            ordered: false,
            unique_alt: INVALID_ALT,
            conflicting_alts: None,
            has_semantic_context: false,
            dips_into_outer_context: false,
        }
    }

    /// A set for lexer simulation: no context merging, order preserved.
    pub fn new_ordered() -> Self {
        AtnConfigSet { ordered: true, ..AtnConfigSet::new(true) }
    }

    /// Add `config`, merging its context into an existing configuration with
    /// the same (state, alt, semantic context). Returns true if a new entry
    /// was created.
    pub fn add(&mut self, config: AtnConfig) -> bool {
        if !config.semantic_context.is_none() {
            self.has_semantic_context = true;
        }
        if config.reaches_into_outer_context > 0 {
            self.dips_into_outer_context = true;
        }
        let key = if self.ordered {
            ConfigKey::Exact(Box::new(config.clone()))
        } else {
            ConfigKey::Merged {
                state: config.state,
                alt: config.alt,
                semantic: config.semantic_context.clone(),
            }
        };
        if let Some(&i) = self.index.get(&key) {
            if self.ordered {
                return false;
            }
            let existing = &mut self.configs[i];
            let root_is_wildcard = !self.full_ctx;
            existing.context = PredictionContext::merge(&existing.context, &config.context, root_is_wildcard);
            existing.reaches_into_outer_context =
                existing.reaches_into_outer_context.max(config.reaches_into_outer_context);
            if config.precedence_filter_suppressed {
                existing.precedence_filter_suppressed = true;
            }
            return false;
        }
        self.index.insert(key, self.configs.len());
        self.configs.push(config);
        true
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtnConfig> {
        self.configs.iter()
    }

    pub fn configs(&self) -> &[AtnConfig] {
        &self.configs
    }

    /// Every alternative predicted by some configuration.
    pub fn alts(&self) -> BTreeSet<usize> {
        self.configs.iter().map(|c| c.alt).collect()
    }

    pub fn has_config_in_rule_stop_state(&self, atn: &Atn) -> bool {
        self.configs.iter().any(|c| atn.state(c.state).is_rule_stop())
    }

    pub fn all_configs_in_rule_stop_states(&self, atn: &Atn) -> bool {
        self.configs.iter().all(|c| atn.state(c.state).is_rule_stop())
    }

    /// Replace every context with its canonical interned node.
    pub fn intern_contexts(&mut self, cache: &PredictionContextCache) {
        for c in &mut self.configs {
            c.context = cache.intern(&c.context);
        }
    }

    /// A copy with every semantic context dropped (and contexts re-merged).
    pub fn without_semantic_contexts(&self) -> AtnConfigSet {
        let mut dup = AtnConfigSet::new(self.full_ctx);
        for c in &self.configs {
            dup.add(AtnConfig { semantic_context: SemanticContext::none(), ..c.clone() });
        }
        dup
    }

    /// The DFA-state identity of this set.
    pub fn signature(&self) -> ConfigSignature {
        let mut entries: Vec<SignatureEntry> = self
            .configs
            .iter()
            .map(|c| SignatureEntry {
                state: c.state,
                alt: c.alt,
                context: c.context.clone(),
                executor: c.lexer_action_executor.clone(),
                non_greedy: c.passed_through_non_greedy_decision,
            })
            .collect();
        entries.sort_by_key(|e| {
            (
                e.state,
                e.alt,
                e.context.hash_code(),
                e.executor.as_ref().map(|x| x.hash_code()),
                e.non_greedy,
            )
        });
        entries.dedup();
        let mut h = FxHasher::default();
        self.full_ctx.hash(&mut h);
        entries.hash(&mut h);
        ConfigSignature { entries, full_ctx: self.full_ctx, hash: h.finish() }
    }
}

impl<'a> IntoIterator for &'a AtnConfigSet {
    type Item = &'a AtnConfig;
    type IntoIter = std::slice::Iter<'a, AtnConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignatureEntry {
    state: StateId,
    alt: usize,
    context: Arc<PredictionContext>,
    executor: Option<Arc<LexerActionExecutor>>,
    non_greedy: bool,
}

/// Sorted (state, alt, context, lexer executor) tuples of a configuration
/// set. Semantic contexts are not part of the identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSignature {
    entries: Vec<SignatureEntry>,
    full_ctx: bool,
    hash: u64,
}

impl Hash for ConfigSignature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(ret: StateId) -> Arc<PredictionContext> {
        PredictionContext::singleton(PredictionContext::empty(), ret)
    }

    #[test]
    fn test_add_merges_contexts() {
        let mut set = AtnConfigSet::new(false);
        assert!(set.add(AtnConfig::new(4, 1, ctx(10))));
        assert!(!set.add(AtnConfig::new(4, 1, ctx(11))));
        assert!(set.add(AtnConfig::new(4, 2, ctx(10))));
        assert_eq!(set.len(), 2);
        assert_eq!(set.configs()[0].context.len(), 2);
    }

    #[test]
    fn test_signature_ignores_order_and_semantics() {
        let mut a = AtnConfigSet::new(false);
        a.add(AtnConfig::new(1, 1, ctx(5)));
        a.add(AtnConfig::new(2, 2, ctx(6)));
        let mut b = AtnConfigSet::new(false);
        b.add(AtnConfig::new(2, 2, ctx(6)));
        let pred = Arc::new(SemanticContext::Predicate { rule_index: 0, pred_index: 0, is_ctx_dependent: false });
        b.add(AtnConfig::new(1, 1, ctx(5)).with_semantic_context(1, pred));
        assert_eq!(a.signature(), b.signature());
        assert!(b.has_semantic_context);
    }

    #[test]
    fn test_ordered_set_keeps_distinct_contexts() {
        let mut set = AtnConfigSet::new_ordered();
        assert!(set.add(AtnConfig::new(4, 1, ctx(10))));
        assert!(set.add(AtnConfig::new(4, 1, ctx(11))));
        assert!(!set.add(AtnConfig::new(4, 1, ctx(11))));
        assert_eq!(set.len(), 2);
    }
}
