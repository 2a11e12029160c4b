//! Lexer ATN simulation.
//!
//! All token rules of a mode are simulated in parallel from the mode's
//! token-start state. The simulation keeps going while any rule can still
//! extend the match and remembers the last accept state it passed
//! (longest match; among equal lengths, the rule declared first). Actions
//! met along the way are only queued on each configuration's
//! [`LexerActionExecutor`]; the executor of the winning accept state runs
//! once the match is committed.

use std::sync::Arc;

use tracing::trace;

use crate::atn::config::{AtnConfig, AtnConfigSet};
use crate::atn::context::{PredictionContext, PredictionContextCache, EMPTY_RETURN_STATE};
use crate::atn::{Atn, StateId, Transition, INVALID_ALT, MAX_CHAR_VALUE};
use crate::dfa::{AcceptStateInfo, Dfa, DfaEdge, DfaState};
use crate::error::LexerNoViableAlt;
use crate::lexer::action::{LexerActionExecutor, LexerActionTarget};
use crate::stream::CharStream;
use crate::token::{TokenType, EOF};

/// Shared tokenization engine for one lexer ATN. One DFA per mode.
#[derive(Debug)]
pub struct LexerAtnSimulator {
    atn: Arc<Atn>,
    mode_to_dfa: Vec<Dfa>,
    context_cache: PredictionContextCache,
}

impl LexerAtnSimulator {
    pub fn new(atn: Arc<Atn>) -> Self {
        let mode_to_dfa = build_dfas(&atn);
        LexerAtnSimulator { atn, mode_to_dfa, context_cache: PredictionContextCache::new() }
    }

    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    pub fn dfa(&self, mode: usize) -> Option<&Dfa> {
        self.mode_to_dfa.get(mode)
    }

    pub fn clear_dfa(&mut self) {
        self.mode_to_dfa = build_dfas(&self.atn);
    }

    /// Match one token in `mode` starting at the current input position.
    ///
    /// On success the input is left just past the match, the winning rule's
    /// queued actions have run against `target`, and the rule's token type
    /// is returned (`EOF` at end of input). On failure the input is left at
    /// the offending character; the error's line and column are zero and
    /// left for the caller to fill in.
    pub fn match_token(
        &self,
        input: &mut dyn CharStream,
        mode: usize,
        target: &mut dyn LexerActionTarget,
    ) -> Result<TokenType, LexerNoViableAlt> {
        let dfa = &self.mode_to_dfa[mode];
        let marker = input.mark();
        let start_index = input.index();
        let mut run = LexerRun { atn: &self.atn, cache: &self.context_cache, dfa, start_index, prev_accept: None, target };
        let result = match dfa.s0() {
            Some(s0) => run.exec_atn(input, s0),
            None => run.match_atn(input, mode),
        };
        input.release(marker);
        result
    }
}

fn build_dfas(atn: &Atn) -> Vec<Dfa> {
    atn.mode_to_start_state
        .iter()
        .enumerate()
        .map(|(mode, &s)| Dfa::new(mode, s, false))
        .collect()
}

/// One `match_token` call.
struct LexerRun<'l, 't> {
    atn: &'l Atn,
    cache: &'l PredictionContextCache,
    dfa: &'l Dfa,
    start_index: usize,
    /// Input index just past the last accept state seen, and that state.
    prev_accept: Option<(usize, Arc<DfaState>)>,
    target: &'t mut dyn LexerActionTarget,
}

impl LexerRun<'_, '_> {
    fn match_atn(&mut self, input: &mut dyn CharStream, mode: usize) -> Result<TokenType, LexerNoViableAlt> {
        let start = self.atn.mode_to_start_state[mode];
        let mut s0_closure = self.compute_start_state(start);
        // A start state that depended on predicates is not reusable.
        let suppress_edge = s0_closure.has_semantic_context;
        s0_closure.has_semantic_context = false;
        let next = self.add_dfa_state(s0_closure);
        let next = if suppress_edge { next } else { self.dfa.set_s0(next) };
        self.exec_atn(input, next)
    }

    fn exec_atn(&mut self, input: &mut dyn CharStream, ds0: Arc<DfaState>) -> Result<TokenType, LexerNoViableAlt> {
        if ds0.is_accept_state() {
            self.prev_accept = Some((input.index(), ds0.clone()));
        }
        let mut t = input.la(1);
        let mut s = ds0;
        loop {
            let edge = match self.dfa.existing_target(&s, t) {
                Some(edge) => edge,
                None => self.compute_target_state(input, &s, t),
            };
            let DfaEdge::State(target) = edge else {
                break;
            };
            if t != EOF {
                input.consume();
            }
            if target.is_accept_state() {
                self.prev_accept = Some((input.index(), target.clone()));
                if t == EOF {
                    break;
                }
            }
            t = input.la(1);
            s = target;
        }
        self.fail_or_accept(input, t)
    }

    fn fail_or_accept(&mut self, input: &mut dyn CharStream, t: i32) -> Result<TokenType, LexerNoViableAlt> {
        if let Some((index, state)) = self.prev_accept.take() {
            input.seek(index);
            if let Some(executor) = state.accept.as_ref().and_then(|a| a.lexer_action_executor.as_ref()) {
                executor.execute(&mut *self.target, self.start_index, index);
            }
            return Ok(state.prediction() as TokenType);
        }
        if t == EOF && input.index() == self.start_index {
            return Ok(EOF);
        }
        Err(LexerNoViableAlt {
            start_index: self.start_index,
            text: input.text(self.start_index, input.index()),
            line: 0,
            column: 0,
        })
    }

    fn compute_target_state(&mut self, input: &dyn CharStream, s: &Arc<DfaState>, t: i32) -> DfaEdge {
        let mut reach = AtnConfigSet::new_ordered();
        self.reachable_config_set(input, &s.configs, &mut reach, t);
        if reach.is_empty() {
            if !reach.has_semantic_context {
                self.dfa.add_edge(s, t, &DfaEdge::Dead);
            }
            return DfaEdge::Dead;
        }
        let suppress_edge = reach.has_semantic_context;
        reach.has_semantic_context = false;
        let edge = DfaEdge::State(self.add_dfa_state(reach));
        if !suppress_edge {
            self.dfa.add_edge(s, t, &edge);
        }
        edge
    }

    /// Accept when some configuration finished its rule; the first such
    /// configuration (highest priority) decides the token type and actions.
    fn add_dfa_state(&self, mut configs: AtnConfigSet) -> Arc<DfaState> {
        configs.intern_contexts(self.cache);
        let accept = configs
            .iter()
            .find(|c| self.atn.state(c.state).is_rule_stop())
            .map(|c| {
                let rule = self.atn.state(c.state).rule_index;
                let token_type = self.atn.rule_to_token_type.get(rule).copied().unwrap_or_default();
                AcceptStateInfo {
                    prediction: usize::try_from(token_type).unwrap_or(INVALID_ALT),
                    lexer_action_executor: c.lexer_action_executor.clone(),
                }
            });
        let mut d = DfaState::new(configs);
        d.accept = accept;
        self.dfa.add_state(d)
    }

    fn compute_start_state(&mut self, p: StateId) -> AtnConfigSet {
        let mut configs = AtnConfigSet::new_ordered();
        for (i, t) in self.atn.state(p).transitions.iter().enumerate() {
            let c = AtnConfig::new(t.target(), i + 1, PredictionContext::empty());
            self.closure(c, &mut configs, false, false);
        }
        trace!(mode_start = p, configs = configs.len(), "lexer start state");
        configs
    }

    fn reachable_config_set(&mut self, input: &dyn CharStream, closure: &AtnConfigSet, reach: &mut AtnConfigSet, t: i32) {
        // Once an alternative reached an accept state, later (lower
        // priority) threads of the same alternative are dropped.
        let mut skip_alt = INVALID_ALT;
        for c in closure {
            let current_alt_reached_accept_state = c.alt == skip_alt;
            if current_alt_reached_accept_state && c.passed_through_non_greedy_decision {
                continue;
            }
            for trans in &self.atn.state(c.state).transitions {
                if !trans.matches(t, 0, MAX_CHAR_VALUE) {
                    continue;
                }
                let offset = input.index() - self.start_index;
                let mut next = self.transition_config(c, trans.target());
                next.lexer_action_executor = c
                    .lexer_action_executor
                    .as_ref()
                    .map(|e| LexerActionExecutor::fix_offset_before_match(e, offset));
                if self.closure(next, reach, current_alt_reached_accept_state, t == EOF) {
                    skip_alt = c.alt;
                    break;
                }
            }
        }
    }

    /// Returns whether the alternative of `config` reached an accept state.
    fn closure(
        &mut self,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        mut current_alt_reached_accept_state: bool,
        treat_eof_as_epsilon: bool,
    ) -> bool {
        let atn = self.atn;
        if atn.state(config.state).is_rule_stop() {
            if config.context.has_empty_path() {
                if config.context.is_empty() {
                    configs.add(config);
                    return true;
                }
                configs.add(config.with_context(config.state, PredictionContext::empty()));
                current_alt_reached_accept_state = true;
            }
            if !config.context.is_empty() {
                for i in 0..config.context.len() {
                    let return_state = config.context.return_state(i);
                    if return_state == EMPTY_RETURN_STATE {
                        continue;
                    }
                    let c = self.transition_config(&config, return_state);
                    let c = AtnConfig { context: config.context.parent(i), ..c };
                    current_alt_reached_accept_state =
                        self.closure(c, configs, current_alt_reached_accept_state, treat_eof_as_epsilon);
                }
            }
            return current_alt_reached_accept_state;
        }

        let state = atn.state(config.state);
        if !state.only_has_epsilon_transitions()
            && (!current_alt_reached_accept_state || !config.passed_through_non_greedy_decision)
        {
            configs.add(config.clone());
        }
        for t in &state.transitions {
            if let Some(c) = self.epsilon_target(&config, t, configs, treat_eof_as_epsilon) {
                current_alt_reached_accept_state =
                    self.closure(c, configs, current_alt_reached_accept_state, treat_eof_as_epsilon);
            }
        }
        current_alt_reached_accept_state
    }

    fn epsilon_target(
        &mut self,
        config: &AtnConfig,
        t: &Transition,
        configs: &mut AtnConfigSet,
        treat_eof_as_epsilon: bool,
    ) -> Option<AtnConfig> {
        match t {
            Transition::Rule { target, follow_state, .. } => {
                let ctx = PredictionContext::singleton(config.context.clone(), *follow_state);
                Some(AtnConfig { context: ctx, ..self.transition_config(config, *target) })
            },
            Transition::Predicate { target, rule_index, pred_index, .. } => {
                // The outcome depends on runtime state: the resulting DFA
                // state must not be reached through a cached edge.
                configs.has_semantic_context = true;
                self.target
                    .sempred(*rule_index, *pred_index)
                    .then(|| self.transition_config(config, *target))
            },
            Transition::Action { target, action_index, .. } => {
                let mut c = self.transition_config(config, *target);
                // Actions in rules invoked from other rules are ignored;
                // only the token rule's own actions are queued.
                if config.context.has_empty_path() {
                    if let Some(action) = action_index.and_then(|i| self.atn.lexer_actions.get(i)) {
                        c.lexer_action_executor =
                            Some(LexerActionExecutor::append(config.lexer_action_executor.as_ref(), action.clone()));
                    }
                }
                Some(c)
            },
            Transition::Epsilon { target, .. } => Some(self.transition_config(config, *target)),
            Transition::Atom { target, .. } | Transition::Range { target, .. } | Transition::Set { target, .. } => {
                (treat_eof_as_epsilon && t.matches(EOF, 0, MAX_CHAR_VALUE)).then(|| self.transition_config(config, *target))
            },
            Transition::Precedence { .. } | Transition::NotSet { .. } | Transition::Wildcard { .. } => None,
        }
    }

    /// `config` moved to `state`, noting whether it entered a non-greedy
    /// decision.
    fn transition_config(&self, config: &AtnConfig, state: StateId) -> AtnConfig {
        let mut c = config.moved_to(state);
        c.passed_through_non_greedy_decision =
            config.passed_through_non_greedy_decision || self.atn.state(state).non_greedy;
        c
    }
}
