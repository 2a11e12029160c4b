//! # Adaptive prediction
//!
//! `adaptive_predict` answers "which alternative of this decision matches the
//! upcoming input?". It walks the decision's DFA over the lookahead; whenever
//! an edge is missing it simulates the ATN one symbol further (closure over
//! epsilon edges, then a move over the symbol) and caches the result as a new
//! DFA state and edge.
//!
//! ```text
//!   SLL (context-free, cached) ──conflict──▶ LL (real call stack, uncached)
//!          │                                    │
//!          ▼                                    ▼
//!   accept state ⇒ alt               unique / resolved alt, or ambiguity ⇒ min alt
//! ```
//!
//! SLL treats the empty stack as "any caller" and is exact for most
//! decisions. When it ends in a conflict that SLL cannot rule out, the
//! simulation restarts from the decision with the parser's actual
//! invocation stack (full-context LL). [`PredictionMode`] controls that
//! escalation.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::atn::config::{AtnConfig, AtnConfigSet};
use crate::atn::context::{PredictionContext, PredictionContextCache, EMPTY_RETURN_STATE};
use crate::atn::mode::{self, PredictionMode};
use crate::atn::semantic::{PredicateEvaluator, SemanticContext};
use crate::atn::{Atn, AtnStateType, StateId, Transition, INVALID_ALT};
use crate::config::RuntimeOptions;
use crate::dfa::{AcceptStateInfo, Dfa, DfaEdge, DfaState, PredPrediction};
use crate::error::RecognitionError;
use crate::listener::PredictionDiagnostic;
use crate::profiling::{DecisionEvent, DecisionInfo, DecisionStats};
use crate::stream::TokenStream;
use crate::token::{Token, EOF, EPSILON};

/// What prediction needs to know about the parser calling it.
pub struct PredictionScope<'a> {
    /// Invoking state of each enclosing rule context, innermost first.
    /// Empty when predicting inside the start rule.
    pub invoking_states: &'a [StateId],
    /// Precedence bound by the innermost left-recursive rule invocation.
    pub precedence: i32,
    pub evaluator: &'a dyn PredicateEvaluator,
    pub options: RuntimeOptions,
    /// Filled with ambiguity reports when `options.report_diagnostics` is set.
    pub diagnostics: Vec<PredictionDiagnostic>,
}

impl<'a> PredictionScope<'a> {
    pub fn new(invoking_states: &'a [StateId], evaluator: &'a dyn PredicateEvaluator) -> Self {
        PredictionScope {
            invoking_states,
            precedence: 0,
            evaluator,
            options: RuntimeOptions::default(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_precedence(mut self, precedence: i32) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.options = options;
        self
    }
}

/// Shared prediction engine for one parser ATN.
///
/// `Send + Sync`: any number of parsers on any number of threads may predict
/// through the same simulator; the DFA caches fill in concurrently.
#[derive(Debug)]
pub struct ParserAtnSimulator {
    atn: Arc<Atn>,
    decision_to_dfa: Vec<Dfa>,
    context_cache: PredictionContextCache,
    stats: Vec<DecisionStats>,
}

impl ParserAtnSimulator {
    pub fn new(atn: Arc<Atn>) -> Self {
        let decision_to_dfa = build_dfas(&atn);
        let stats = (0..atn.num_decisions()).map(|_| DecisionStats::default()).collect();
        ParserAtnSimulator { atn, decision_to_dfa, context_cache: PredictionContextCache::new(), stats }
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn dfa(&self, decision: usize) -> Option<&Dfa> {
        self.decision_to_dfa.get(decision)
    }

    pub fn context_cache(&self) -> &PredictionContextCache {
        &self.context_cache
    }

    /// Drop every cached DFA state.
    pub fn clear_dfa(&mut self) {
        self.decision_to_dfa = build_dfas(&self.atn);
    }

    /// Counters for every decision (all zero unless the parsers predicting
    /// through this simulator enable `collect_decision_stats`).
    pub fn decision_info(&self) -> Vec<DecisionInfo> {
        self.stats.iter().enumerate().map(|(d, s)| s.snapshot(d)).collect()
    }

    /// Predict the alternative of `decision` that matches the upcoming input.
    ///
    /// The input position is restored before returning.
    pub fn adaptive_predict(
        &self,
        input: &mut dyn TokenStream,
        decision: usize,
        scope: &mut PredictionScope<'_>,
    ) -> Result<usize, RecognitionError> {
        let dfa = &self.decision_to_dfa[decision];
        let stats = scope.options.collect_decision_stats.then(|| &self.stats[decision]);
        let start_index = input.index();
        let marker = input.mark();
        let mut predictor = Predictor { atn: &self.atn, cache: &self.context_cache, dfa, scope, stats, start_index };
        predictor.record(DecisionEvent::Invocation);
        let result = predictor.predict(input);
        let lookahead = input.index().saturating_sub(start_index) as u64 + 1;
        predictor.record(DecisionEvent::Lookahead(lookahead));
        input.seek(start_index);
        input.release(marker);
        if let Ok(alt) = &result {
            debug!(decision, alt, start_index, "predicted");
        }
        result
    }
}

fn build_dfas(atn: &Atn) -> Vec<Dfa> {
    atn.decision_to_state
        .iter()
        .enumerate()
        .map(|(d, &s)| {
            let state = atn.state(s);
            let precedence = state.state_type == AtnStateType::StarLoopEntry && state.precedence_rule_decision;
            Dfa::new(d, s, precedence)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BusyKey {
    state: StateId,
    alt: usize,
    context: Arc<PredictionContext>,
    semantic: Arc<SemanticContext>,
    suppressed: bool,
}

impl BusyKey {
    fn of(c: &AtnConfig) -> Self {
        BusyKey {
            state: c.state,
            alt: c.alt,
            context: c.context.clone(),
            semantic: c.semantic_context.clone(),
            suppressed: c.precedence_filter_suppressed,
        }
    }
}

/// One `adaptive_predict` call.
struct Predictor<'p, 's, 'a> {
    atn: &'p Atn,
    cache: &'p PredictionContextCache,
    dfa: &'p Dfa,
    scope: &'s mut PredictionScope<'a>,
    stats: Option<&'p DecisionStats>,
    start_index: usize,
}

impl Predictor<'_, '_, '_> {
    fn mode(&self) -> PredictionMode {
        self.scope.options.prediction_mode
    }

    fn record(&self, event: DecisionEvent) {
        if let Some(stats) = self.stats {
            stats.record(event);
        }
    }

    fn predict(&mut self, input: &mut dyn TokenStream) -> Result<usize, RecognitionError> {
        let existing = if self.dfa.is_precedence_dfa() {
            self.dfa.precedence_start_state(self.scope.precedence, false).ok().flatten()
        } else {
            self.dfa.s0()
        };
        let s0 = match existing {
            Some(s0) => s0,
            None => {
                let mut closure = self.compute_start_state(PredictionContext::empty(), false);
                if self.dfa.is_precedence_dfa() {
                    closure = self.apply_precedence_filter(&closure);
                    let s0 = self.add_dfa_state(DfaState::new(closure));
                    self.dfa
                        .set_precedence_start_state(self.scope.precedence, false, s0.clone())
                        .unwrap_or(s0)
                } else {
                    let s0 = self.add_dfa_state(DfaState::new(closure));
                    self.dfa.set_s0(s0)
                }
            },
        };
        self.exec_atn(input, s0)
    }

    // ══════════════════════════════════════════════════════════════════════
    // SLL
    // ══════════════════════════════════════════════════════════════════════

    fn exec_atn(&mut self, input: &mut dyn TokenStream, s0: Arc<DfaState>) -> Result<usize, RecognitionError> {
        let mut previous = s0;
        let mut t = input.la(1);
        loop {
            let edge = match self.dfa.existing_target(&previous, t) {
                Some(edge) => {
                    self.record(DecisionEvent::DfaHit);
                    edge
                },
                None => self.compute_target_state(&previous, t),
            };
            let d = match edge {
                DfaEdge::Dead => {
                    let err = self.no_viable_alt(input, previous.configs.configs());
                    input.seek(self.start_index);
                    let alt = self.syn_valid_or_sem_invalid_alt(&previous.configs);
                    if alt != INVALID_ALT {
                        return Ok(alt);
                    }
                    self.record(DecisionEvent::Error);
                    return Err(err);
                },
                DfaEdge::State(d) => d,
            };

            if d.requires_full_context && self.mode() != PredictionMode::Sll {
                let mut conflicting = d.configs.conflicting_alts.clone().unwrap_or_default();
                if let Some(preds) = &d.predicates {
                    let conflict_index = input.index();
                    if conflict_index != self.start_index {
                        input.seek(self.start_index);
                    }
                    conflicting = self.eval_predicates(preds, true);
                    if conflicting.len() == 1 {
                        if let Some(&alt) = conflicting.first() {
                            return Ok(alt);
                        }
                    }
                    if conflict_index != self.start_index {
                        input.seek(conflict_index);
                    }
                }
                self.record(DecisionEvent::LlFallback);
                self.dfa.mark_full_context();
                debug!(decision = self.dfa.decision, ?conflicting, "SLL conflict; retrying with full context");
                let s0_full = self.full_context_start_state();
                self.report(PredictionDiagnostic::AttemptingFullContext {
                    decision: self.dfa.decision,
                    start_index: self.start_index,
                    stop_index: input.index(),
                    conflicting_alts: conflicting.into_iter().collect(),
                });
                return self.exec_atn_with_full_context(input, &s0_full.configs);
            }

            if d.is_accept_state() {
                let Some(preds) = &d.predicates else {
                    return Ok(d.prediction());
                };
                input.seek(self.start_index);
                let alts = self.eval_predicates(preds, true);
                return match alts.first() {
                    Some(&alt) => Ok(alt),
                    None => {
                        self.record(DecisionEvent::Error);
                        Err(self.no_viable_alt(input, d.configs.configs()))
                    },
                };
            }

            previous = d;
            if t != EOF {
                input.consume();
                t = input.la(1);
            }
        }
    }

    fn compute_target_state(&mut self, previous: &Arc<DfaState>, t: i32) -> DfaEdge {
        self.record(DecisionEvent::AtnTransition { full_ctx: false });
        let Some(reach) = self.compute_reach_set(&previous.configs, t, false) else {
            self.dfa.add_edge(previous, t, &DfaEdge::Dead);
            return DfaEdge::Dead;
        };

        let mut d = DfaState::new(reach);
        let predicted = mode::unique_alt_of(&d.configs);
        if predicted != INVALID_ALT {
            d.configs.unique_alt = predicted;
            d.accept = Some(AcceptStateInfo { prediction: predicted, lexer_action_executor: None });
        } else if mode::has_sll_conflict_terminating_prediction(self.mode(), self.atn, &d.configs) {
            let alts = mode::conflicting_alts(&d.configs);
            let prediction = alts.first().copied().unwrap_or(INVALID_ALT);
            d.configs.conflicting_alts = Some(alts);
            d.requires_full_context = true;
            d.accept = Some(AcceptStateInfo { prediction, lexer_action_executor: None });
        }

        if d.is_accept_state() && d.configs.has_semantic_context {
            self.predicate_dfa_state(&mut d);
        }

        let d = self.add_dfa_state(d);
        let edge = DfaEdge::State(d);
        self.dfa.add_edge(previous, t, &edge);
        edge
    }

    fn add_dfa_state(&self, mut d: DfaState) -> Arc<DfaState> {
        d.configs.intern_contexts(self.cache);
        self.dfa.add_state(d)
    }

    /// Attach predicates to an accept state whose alternatives are guarded.
    fn predicate_dfa_state(&self, d: &mut DfaState) {
        let nalts = self.atn.state(self.dfa.atn_start_state).transitions.len();
        let alts: BTreeSet<usize> = if d.configs.unique_alt != INVALID_ALT {
            [d.configs.unique_alt].into_iter().collect()
        } else {
            d.configs.conflicting_alts.clone().unwrap_or_default()
        };
        let prediction = match preds_for_ambig_alts(&alts, &d.configs, nalts) {
            Some(alt_to_pred) => {
                d.predicates = predicate_predictions(&alts, &alt_to_pred);
                INVALID_ALT
            },
            None => alts.first().copied().unwrap_or(INVALID_ALT),
        };
        if let Some(accept) = d.accept.as_mut() {
            accept.prediction = prediction;
        }
    }

    // ══════════════════════════════════════════════════════════════════════
    // Full-context LL
    // ══════════════════════════════════════════════════════════════════════

    /// Start closure for full-context prediction. Memoized in the DFA when
    /// the parser is in its start rule, since the outer context is then
    /// the same for every caller.
    fn full_context_start_state(&mut self) -> Arc<DfaState> {
        let at_root = self.scope.invoking_states.is_empty();
        if at_root {
            let cached = if self.dfa.is_precedence_dfa() {
                self.dfa.precedence_start_state(self.scope.precedence, true).ok().flatten()
            } else {
                self.dfa.s0_full()
            };
            if let Some(s) = cached {
                return s;
            }
        }
        let initial = PredictionContext::from_invoking_states(self.atn, self.scope.invoking_states);
        let closure = self.compute_start_state(initial, true);
        if !at_root {
            return Arc::new(DfaState::new(closure));
        }
        let s = self.add_dfa_state(DfaState::new(closure));
        if self.dfa.is_precedence_dfa() {
            self.dfa
                .set_precedence_start_state(self.scope.precedence, true, s.clone())
                .unwrap_or(s)
        } else {
            self.dfa.set_s0_full(s)
        }
    }

    fn exec_atn_with_full_context(
        &mut self,
        input: &mut dyn TokenStream,
        s0: &AtnConfigSet,
    ) -> Result<usize, RecognitionError> {
        input.seek(self.start_index);
        let mut t = input.la(1);
        let mut previous = s0.clone();
        let mut found_exact_ambig = false;
        let mut eof_passes = 0;
        let (predicted, reach) = loop {
            self.record(DecisionEvent::AtnTransition { full_ctx: true });
            let Some(mut reach) = self.compute_reach_set(&previous, t, true) else {
                let err = self.no_viable_alt(input, previous.configs());
                input.seek(self.start_index);
                let alt = self.syn_valid_or_sem_invalid_alt(&previous);
                if alt != INVALID_ALT {
                    return Ok(alt);
                }
                self.record(DecisionEvent::Error);
                return Err(err);
            };

            let subsets = mode::conflicting_alt_subsets(&reach);
            reach.unique_alt = mode::unique_alt_of(&reach);
            if reach.unique_alt != INVALID_ALT {
                break (reach.unique_alt, reach);
            }
            if self.mode() != PredictionMode::LlExactAmbigDetection {
                let alt = mode::resolves_to_just_one_viable_alt(&subsets);
                if alt != INVALID_ALT {
                    break (alt, reach);
                }
            } else if mode::all_subsets_conflict(&subsets) && mode::all_subsets_equal(&subsets) {
                found_exact_ambig = true;
                break (mode::single_viable_alt(&subsets), reach);
            }

            if t == EOF {
                eof_passes += 1;
                if eof_passes > 1 {
                    // Nothing left to read and no resolution: lowest alt.
                    let alt = reach.alts().first().copied().unwrap_or(INVALID_ALT);
                    break (alt, reach);
                }
            }
            previous = reach;
            if t != EOF {
                input.consume();
                t = input.la(1);
            }
        };

        if reach.unique_alt != INVALID_ALT {
            self.record(DecisionEvent::ContextSensitivity);
            self.report(PredictionDiagnostic::ContextSensitivity {
                decision: self.dfa.decision,
                start_index: self.start_index,
                stop_index: input.index(),
                prediction: predicted,
            });
            return Ok(predicted);
        }

        self.record(DecisionEvent::Ambiguity);
        debug!(decision = self.dfa.decision, exact = found_exact_ambig, predicted, "ambiguity");
        self.report(PredictionDiagnostic::Ambiguity {
            decision: self.dfa.decision,
            start_index: self.start_index,
            stop_index: input.index(),
            exact: found_exact_ambig,
            alts: reach.alts().into_iter().collect(),
        });
        Ok(predicted)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Reach and closure
    // ══════════════════════════════════════════════════════════════════════

    fn compute_start_state(&mut self, initial: Arc<PredictionContext>, full_ctx: bool) -> AtnConfigSet {
        let mut configs = AtnConfigSet::new(full_ctx);
        let p = self.atn.state(self.dfa.atn_start_state);
        for (i, t) in p.transitions.iter().enumerate() {
            let c = AtnConfig::new(t.target(), i + 1, initial.clone());
            let mut busy = FxHashSet::default();
            self.closure(c, &mut configs, &mut busy, true, full_ctx, false);
        }
        configs
    }

    /// Move every configuration over `t`, then close over epsilon edges.
    fn compute_reach_set(&mut self, closure: &AtnConfigSet, t: i32, full_ctx: bool) -> Option<AtnConfigSet> {
        let mut intermediate = AtnConfigSet::new(full_ctx);
        let mut skipped_stop_states = Vec::new();

        for c in closure {
            let state = self.atn.state(c.state);
            if state.is_rule_stop() {
                if full_ctx || t == EOF {
                    skipped_stop_states.push(c.clone());
                }
                continue;
            }
            for trans in &state.transitions {
                if trans.matches(t, 0, self.atn.max_token_type) {
                    intermediate.add(c.moved_to(trans.target()));
                }
            }
        }

        // A single configuration, or one alternative across all of them,
        // needs no closure: the decision is already made.
        let use_intermediate = skipped_stop_states.is_empty()
            && t != EOF
            && (intermediate.len() == 1 || mode::unique_alt_of(&intermediate) != INVALID_ALT);

        let mut reach = if use_intermediate {
            intermediate
        } else {
            let mut reach = AtnConfigSet::new(full_ctx);
            let mut busy = FxHashSet::default();
            let treat_eof_as_epsilon = t == EOF;
            for c in intermediate.iter() {
                self.closure(c.clone(), &mut reach, &mut busy, false, full_ctx, treat_eof_as_epsilon);
            }
            reach
        };

        if t == EOF {
            reach = self.remove_all_configs_not_in_rule_stop_state(reach, use_intermediate);
        }

        if !skipped_stop_states.is_empty() && (!full_ctx || !reach.has_config_in_rule_stop_state(self.atn)) {
            for c in skipped_stop_states {
                reach.add(c);
            }
        }

        if reach.is_empty() {
            None
        } else {
            Some(reach)
        }
    }

    fn remove_all_configs_not_in_rule_stop_state(&self, configs: AtnConfigSet, look_to_end_of_rule: bool) -> AtnConfigSet {
        if configs.all_configs_in_rule_stop_states(self.atn) {
            return configs;
        }
        let mut result = AtnConfigSet::new(configs.full_ctx);
        for c in &configs {
            let state = self.atn.state(c.state);
            if state.is_rule_stop() {
                result.add(c.clone());
                continue;
            }
            if look_to_end_of_rule
                && state.only_has_epsilon_transitions()
                && self.atn.next_tokens(c.state).contains(EPSILON)
            {
                let end = self.atn.rule_to_stop_state[state.rule_index];
                result.add(c.moved_to(end));
            }
        }
        result
    }

    fn closure(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut FxHashSet<BusyKey>,
        collect_predicates: bool,
        full_ctx: bool,
        treat_eof_as_epsilon: bool,
    ) {
        self.closure_checking_stop_state(config, configs, busy, collect_predicates, full_ctx, 0, treat_eof_as_epsilon);
    }

    #[allow(clippy::too_many_arguments)]
    fn closure_checking_stop_state(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut FxHashSet<BusyKey>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: isize,
        treat_eof_as_epsilon: bool,
    ) {
        // Every (state, alt, context, predicate) is explored once per
        // closure; this is what terminates recursive rule invocations.
        if !busy.insert(BusyKey::of(&config)) {
            return;
        }

        if self.atn.state(config.state).is_rule_stop() {
            if !config.context.is_empty() {
                for i in 0..config.context.len() {
                    let return_state = config.context.return_state(i);
                    if return_state == EMPTY_RETURN_STATE {
                        if full_ctx {
                            configs.add(config.with_context(config.state, PredictionContext::empty()));
                        } else {
                            // No caller information: follow the global
                            // follow links out of the rule.
                            self.closure_inner(
                                config.clone(),
                                configs,
                                busy,
                                collect_predicates,
                                full_ctx,
                                depth,
                                treat_eof_as_epsilon,
                            );
                        }
                        continue;
                    }
                    let mut c = AtnConfig::new(return_state, config.alt, config.context.parent(i));
                    c.semantic_context = config.semantic_context.clone();
                    c.reaches_into_outer_context = config.reaches_into_outer_context;
                    self.closure_checking_stop_state(
                        c,
                        configs,
                        busy,
                        collect_predicates,
                        full_ctx,
                        depth - 1,
                        treat_eof_as_epsilon,
                    );
                }
                return;
            } else if full_ctx {
                // Reached the end of the start rule.
                configs.add(config);
                return;
            }
        }

        self.closure_inner(config, configs, busy, collect_predicates, full_ctx, depth, treat_eof_as_epsilon);
    }

    #[allow(clippy::too_many_arguments)]
    fn closure_inner(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        busy: &mut FxHashSet<BusyKey>,
        collect_predicates: bool,
        full_ctx: bool,
        depth: isize,
        treat_eof_as_epsilon: bool,
    ) {
        let atn = self.atn;
        let state = atn.state(config.state);
        if !state.only_has_epsilon_transitions() {
            configs.add(config.clone());
        }

        for t in &state.transitions {
            let continue_collecting = !matches!(t, Transition::Action { .. }) && collect_predicates;
            let Some(mut c) =
                self.epsilon_target(&config, t, continue_collecting, depth == 0, full_ctx, treat_eof_as_epsilon)
            else {
                continue;
            };
            let mut new_depth = depth;
            if state.is_rule_stop() {
                // Fell off the end of the decision rule into whatever
                // follows it somewhere in the grammar.
                if self.dfa.is_precedence_dfa() {
                    if let Transition::Epsilon { outermost_precedence_return: Some(rule), .. } = t {
                        if *rule == atn.state(self.dfa.atn_start_state).rule_index {
                            c.precedence_filter_suppressed = true;
                        }
                    }
                }
                c.reaches_into_outer_context += 1;
                configs.dips_into_outer_context = true;
                new_depth -= 1;
            } else if matches!(t, Transition::Rule { .. }) && new_depth >= 0 {
                new_depth += 1;
            }
            self.closure_checking_stop_state(
                c,
                configs,
                busy,
                continue_collecting,
                full_ctx,
                new_depth,
                treat_eof_as_epsilon,
            );
        }
    }

    fn epsilon_target(
        &mut self,
        config: &AtnConfig,
        t: &Transition,
        collect_predicates: bool,
        in_context: bool,
        full_ctx: bool,
        treat_eof_as_epsilon: bool,
    ) -> Option<AtnConfig> {
        match t {
            Transition::Rule { target, follow_state, .. } => {
                let ctx = PredictionContext::singleton(config.context.clone(), *follow_state);
                Some(config.with_context(*target, ctx))
            },
            Transition::Precedence { target, precedence } => {
                let pred = Arc::new(SemanticContext::Precedence { precedence: *precedence });
                self.predicate_target(config, *target, pred, collect_predicates && in_context, full_ctx)
            },
            Transition::Predicate { target, rule_index, pred_index, is_ctx_dependent } => {
                let pred = Arc::new(SemanticContext::Predicate {
                    rule_index: *rule_index,
                    pred_index: *pred_index,
                    is_ctx_dependent: *is_ctx_dependent,
                });
                let collect = collect_predicates && (!is_ctx_dependent || in_context);
                self.predicate_target(config, *target, pred, collect, full_ctx)
            },
            Transition::Epsilon { target, .. } | Transition::Action { target, .. } => Some(config.moved_to(*target)),
            Transition::Atom { target, .. } | Transition::Range { target, .. } | Transition::Set { target, .. } => {
                if treat_eof_as_epsilon && t.matches(EOF, 0, 1) {
                    Some(config.moved_to(*target))
                } else {
                    None
                }
            },
            Transition::NotSet { .. } | Transition::Wildcard { .. } => None,
        }
    }

    /// Cross a predicate edge: full-context closure evaluates it on the
    /// spot, SLL closure records it on the configuration.
    fn predicate_target(
        &mut self,
        config: &AtnConfig,
        target: StateId,
        pred: Arc<SemanticContext>,
        collect: bool,
        full_ctx: bool,
    ) -> Option<AtnConfig> {
        if !collect {
            return Some(config.moved_to(target));
        }
        if full_ctx {
            self.record(DecisionEvent::PredicateEval);
            return pred.eval(self.scope.evaluator).then(|| config.moved_to(target));
        }
        let combined = SemanticContext::and(&config.semantic_context, &pred);
        Some(config.with_semantic_context(target, combined))
    }

    /// Keep alt-1 configurations whose precedence predicates hold, and drop
    /// other alternatives' configurations that alt 1 already covers in the
    /// same state and context.
    fn apply_precedence_filter(&mut self, configs: &AtnConfigSet) -> AtnConfigSet {
        let mut states_from_alt1: FxHashMap<StateId, Arc<PredictionContext>> = FxHashMap::default();
        let mut filtered = AtnConfigSet::new(configs.full_ctx);
        for c in configs.iter().filter(|c| c.alt == 1) {
            let Some(updated) = SemanticContext::eval_precedence(&c.semantic_context, self.scope.evaluator) else {
                continue;
            };
            states_from_alt1.insert(c.state, c.context.clone());
            if updated != c.semantic_context {
                filtered.add(c.with_semantic_context(c.state, updated));
            } else {
                filtered.add(c.clone());
            }
        }
        for c in configs.iter().filter(|c| c.alt != 1) {
            if !c.precedence_filter_suppressed {
                if let Some(ctx) = states_from_alt1.get(&c.state) {
                    if *ctx == c.context {
                        continue;
                    }
                }
            }
            filtered.add(c.clone());
        }
        filtered
    }

    // ══════════════════════════════════════════════════════════════════════
    // Predicates and failure
    // ══════════════════════════════════════════════════════════════════════

    fn eval_predicates(&self, preds: &[PredPrediction], complete: bool) -> BTreeSet<usize> {
        let mut predictions = BTreeSet::new();
        for pair in preds {
            if pair.pred.is_none() {
                predictions.insert(pair.alt);
                if !complete {
                    break;
                }
                continue;
            }
            self.record(DecisionEvent::PredicateEval);
            if pair.pred.eval(self.scope.evaluator) {
                predictions.insert(pair.alt);
                if !complete {
                    break;
                }
            }
        }
        predictions
    }

    /// After a dead end: the lowest alternative that finished the decision
    /// rule (or fell into the outer context), preferring configurations
    /// whose predicates hold.
    fn syn_valid_or_sem_invalid_alt(&self, configs: &AtnConfigSet) -> usize {
        let (valid, invalid): (Vec<&AtnConfig>, Vec<&AtnConfig>) = configs
            .iter()
            .partition(|c| c.semantic_context.is_none() || c.semantic_context.eval(self.scope.evaluator));
        let alt = self.alt_that_finished_decision_entry_rule(&valid);
        if alt != INVALID_ALT {
            return alt;
        }
        if !invalid.is_empty() {
            return self.alt_that_finished_decision_entry_rule(&invalid);
        }
        INVALID_ALT
    }

    fn alt_that_finished_decision_entry_rule(&self, configs: &[&AtnConfig]) -> usize {
        configs
            .iter()
            .filter(|c| {
                c.outer_context_depth() > 0
                    || (self.atn.state(c.state).is_rule_stop() && c.context.has_empty_path())
            })
            .map(|c| c.alt)
            .min()
            .unwrap_or(INVALID_ALT)
    }

    fn no_viable_alt(&self, input: &dyn TokenStream, _configs: &[AtnConfig]) -> RecognitionError {
        let fallback = || Token::eof(0, 0);
        RecognitionError::NoViableAlt {
            start_token: input.get(self.start_index).cloned().unwrap_or_else(fallback),
            offending_token: input.lt(1).cloned().unwrap_or_else(fallback),
            state: self.dfa.atn_start_state,
        }
    }

    fn report(&mut self, diagnostic: PredictionDiagnostic) {
        if self.scope.options.report_diagnostics {
            self.scope.diagnostics.push(diagnostic);
        }
    }
}

/// Combined predicate per alternative (index 0 unused), or `None` when no
/// alternative in `ambig_alts` is guarded.
fn preds_for_ambig_alts(
    ambig_alts: &BTreeSet<usize>,
    configs: &AtnConfigSet,
    nalts: usize,
) -> Option<Vec<Arc<SemanticContext>>> {
    let mut alt_to_pred: Vec<Option<Arc<SemanticContext>>> = vec![None; nalts + 1];
    for c in configs {
        if c.alt > nalts || !ambig_alts.contains(&c.alt) {
            continue;
        }
        alt_to_pred[c.alt] = Some(match &alt_to_pred[c.alt] {
            Some(existing) => SemanticContext::or(existing, &c.semantic_context),
            None => c.semantic_context.clone(),
        });
    }
    let mut guarded = 0;
    let resolved: Vec<Arc<SemanticContext>> = alt_to_pred
        .into_iter()
        .enumerate()
        .map(|(i, p)| match p {
            Some(p) => {
                if i > 0 && !p.is_none() {
                    guarded += 1;
                }
                p
            },
            None => SemanticContext::none(),
        })
        .collect();
    (guarded > 0).then_some(resolved)
}

fn predicate_predictions(
    ambig_alts: &BTreeSet<usize>,
    alt_to_pred: &[Arc<SemanticContext>],
) -> Option<Vec<PredPrediction>> {
    let mut pairs = Vec::new();
    let mut contains_predicate = false;
    for (alt, pred) in alt_to_pred.iter().enumerate().skip(1) {
        if ambig_alts.contains(&alt) {
            pairs.push(PredPrediction { pred: pred.clone(), alt });
        }
        if !pred.is_none() {
            contains_predicate = true;
        }
    }
    contains_predicate.then_some(pairs)
}
