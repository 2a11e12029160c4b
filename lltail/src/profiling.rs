//! Per-decision prediction counters.
//!
//! Counters are atomics so that parsers on different threads sharing one
//! simulator can record into the same table. Recording is opt-in through
//! [`crate::RuntimeOptions::collect_decision_stats`].

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Something that happened while predicting one decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionEvent {
    Invocation,
    /// A cached DFA edge was followed.
    DfaHit,
    /// A DFA edge had to be computed from the ATN.
    AtnTransition { full_ctx: bool },
    LlFallback,
    Error,
    Ambiguity,
    ContextSensitivity,
    PredicateEval,
    /// Number of symbols examined by one prediction.
    Lookahead(u64),
}

#[derive(Debug, Default)]
pub struct DecisionStats {
    invocations: AtomicU64,
    dfa_hits: AtomicU64,
    sll_atn_transitions: AtomicU64,
    ll_atn_transitions: AtomicU64,
    ll_fallbacks: AtomicU64,
    errors: AtomicU64,
    ambiguities: AtomicU64,
    context_sensitivities: AtomicU64,
    predicate_evals: AtomicU64,
    total_lookahead: AtomicU64,
    max_lookahead: AtomicU64,
}

impl DecisionStats {
    pub fn record(&self, event: DecisionEvent) {
        let counter = match event {
            DecisionEvent::Invocation => &self.invocations,
            DecisionEvent::DfaHit => &self.dfa_hits,
            DecisionEvent::AtnTransition { full_ctx: false } => &self.sll_atn_transitions,
            DecisionEvent::AtnTransition { full_ctx: true } => &self.ll_atn_transitions,
            DecisionEvent::LlFallback => &self.ll_fallbacks,
            DecisionEvent::Error => &self.errors,
            DecisionEvent::Ambiguity => &self.ambiguities,
            DecisionEvent::ContextSensitivity => &self.context_sensitivities,
            DecisionEvent::PredicateEval => &self.predicate_evals,
            DecisionEvent::Lookahead(n) => {
                self.total_lookahead.fetch_add(n, Ordering::Relaxed);
                self.max_lookahead.fetch_max(n, Ordering::Relaxed);
                return;
            },
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, decision: usize) -> DecisionInfo {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        DecisionInfo {
            decision,
            invocations: load(&self.invocations),
            dfa_hits: load(&self.dfa_hits),
            sll_atn_transitions: load(&self.sll_atn_transitions),
            ll_atn_transitions: load(&self.ll_atn_transitions),
            ll_fallbacks: load(&self.ll_fallbacks),
            errors: load(&self.errors),
            ambiguities: load(&self.ambiguities),
            context_sensitivities: load(&self.context_sensitivities),
            predicate_evals: load(&self.predicate_evals),
            total_lookahead: load(&self.total_lookahead),
            max_lookahead: load(&self.max_lookahead),
        }
    }
}

/// A point-in-time copy of one decision's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionInfo {
    pub decision: usize,
    pub invocations: u64,
    pub dfa_hits: u64,
    pub sll_atn_transitions: u64,
    pub ll_atn_transitions: u64,
    pub ll_fallbacks: u64,
    pub errors: u64,
    pub ambiguities: u64,
    pub context_sensitivities: u64,
    pub predicate_evals: u64,
    pub total_lookahead: u64,
    pub max_lookahead: u64,
}
