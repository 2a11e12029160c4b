//! LL(1) lookahead: the set of symbols that can be consumed next from a
//! state, optionally in a given call-stack context.
//!
//! Predicates are seen through (treated as true). Rule recursion is cut off
//! with a called-rule set, and `(state, context)` pairs already visited are
//! skipped, so recursive rules terminate.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::atn::context::{PredictionContext, EMPTY_RETURN_STATE};
use crate::atn::{Atn, StateId, Transition};
use crate::interval_set::IntervalSet;
use crate::token::{EOF, EPSILON};

/// Call stack seen by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LookContext {
    /// No caller information: falling off a rule yields `EPSILON`.
    Unknown,
    /// A real call stack: falling off the outermost rule yields `EOF`.
    Known(Arc<PredictionContext>),
    /// A follow state pushed by a rule transition during the analysis.
    Pushed(Arc<(LookContext, StateId)>),
}

/// Compute `LOOK(state)`.
///
/// With `ctx == None`, reaching the end of the rule (or `stop_state`) adds
/// `EPSILON`. With a context, the analysis returns into the callers it
/// records and reaching the end of the outermost one adds `EOF`.
pub(crate) fn look(
    atn: &Atn,
    state: StateId,
    stop_state: Option<StateId>,
    ctx: Option<Arc<PredictionContext>>,
) -> IntervalSet {
    let mut analyzer = Ll1Analyzer {
        atn,
        stop_state,
        result: IntervalSet::new(),
        busy: FxHashSet::default(),
        called_rules: FxHashSet::default(),
    };
    let ctx = match ctx {
        Some(c) => LookContext::Known(c),
        None => LookContext::Unknown,
    };
    analyzer.walk(state, ctx);
    analyzer.result
}

struct Ll1Analyzer<'a> {
    atn: &'a Atn,
    stop_state: Option<StateId>,
    result: IntervalSet,
    busy: FxHashSet<(StateId, LookContext)>,
    called_rules: FxHashSet<usize>,
}

impl Ll1Analyzer<'_> {
    fn walk(&mut self, s: StateId, ctx: LookContext) {
        if !self.busy.insert((s, ctx.clone())) {
            return;
        }

        let state = self.atn.state(s);
        if Some(s) == self.stop_state || state.is_rule_stop() {
            match &ctx {
                LookContext::Unknown => {
                    self.result.add(EPSILON);
                    return;
                },
                LookContext::Known(c) if c.is_empty() => {
                    self.result.add(EOF);
                    return;
                },
                _ => {},
            }
        }

        if state.is_rule_stop() {
            // The rule is returning, so it no longer counts as being called
            // while we follow its return states.
            let rule = state.rule_index;
            let was_called = self.called_rules.remove(&rule);
            match &ctx {
                LookContext::Known(c) => {
                    for i in 0..c.len() {
                        let return_state = c.return_state(i);
                        if return_state == EMPTY_RETURN_STATE {
                            self.result.add(EOF);
                            continue;
                        }
                        self.walk(return_state, LookContext::Known(c.parent(i)));
                    }
                },
                LookContext::Pushed(frame) => {
                    let (parent, follow) = frame.as_ref();
                    self.walk(*follow, parent.clone());
                },
                LookContext::Unknown => {},
            }
            if was_called {
                self.called_rules.insert(rule);
            }
            return;
        }

        let (min, max) = self.atn.symbol_bounds();
        for t in &state.transitions {
            match t {
                Transition::Rule { target, rule_index, follow_state, .. } => {
                    if self.called_rules.contains(rule_index) {
                        continue;
                    }
                    let pushed = LookContext::Pushed(Arc::new((ctx.clone(), *follow_state)));
                    self.called_rules.insert(*rule_index);
                    self.walk(*target, pushed);
                    self.called_rules.remove(rule_index);
                },
                Transition::Predicate { target, .. }
                | Transition::Precedence { target, .. }
                | Transition::Epsilon { target, .. }
                | Transition::Action { target, .. } => {
                    self.walk(*target, ctx.clone());
                },
                Transition::Wildcard { .. } => {
                    self.result.add_range(min, max);
                },
                Transition::NotSet { set, .. } => {
                    self.result.add_all(&set.complement(min, max));
                },
                Transition::Atom { .. } | Transition::Range { .. } | Transition::Set { .. } => {
                    if let Some(label) = t.label() {
                        self.result.add_all(&label);
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atn::{AtnBuilder, AtnType};

    /// `s : a 'x' ; a : 'y'? ;`
    fn nullable_call() -> (Atn, StateId, StateId) {
        let mut b = AtnBuilder::new(AtnType::Parser, 3);
        let s = b.add_rule(false);
        let a = b.add_rule(false);
        let y = b.atom(2);
        let opt = b.optional(y);
        b.finish_rule(a, opt);
        let call = b.rule_ref(a, 0);
        let x = b.atom(3);
        let body = b.seq(vec![call.clone(), x]);
        b.finish_rule(s, body);
        let atn = b.build();
        let s_start = atn.rule_to_start_state[s];
        let a_start = atn.rule_to_start_state[a];
        (atn, s_start, a_start)
    }

    #[test]
    fn test_look_sees_through_nullable_rule() {
        let (atn, s_start, _) = nullable_call();
        let set = look(&atn, s_start, None, None);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn test_look_reports_epsilon_at_rule_end() {
        let (atn, _, a_start) = nullable_call();
        let set = look(&atn, a_start, None, None);
        assert!(set.contains(EPSILON));
        assert!(set.contains(2));
    }

    #[test]
    fn test_look_in_empty_context_reports_eof() {
        let (atn, _, a_start) = nullable_call();
        let set = look(&atn, a_start, None, Some(PredictionContext::empty()));
        assert!(set.contains(EOF));
        assert!(!set.contains(EPSILON));
    }
}
