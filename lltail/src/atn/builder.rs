//! Programmatic ATN construction.
//!
//! Grammars are assembled from [`Fragment`]s: each maker allocates a small
//! sub-graph with one entry and one exit state, and the combinators wire
//! fragments together with epsilon edges in the shapes recognizers expect
//! (block starts, loop entries, loop backs).
//!
//! ```text
//!   star:  StarLoopEntry ─ε─▶ StarBlockStart ─▶ alts ─▶ BlockEnd ─ε─▶ StarLoopBack ─ε─┐
//!               │  ▲                                                                  │
//!               │  └──────────────────────────────────────────────────────────────────┘
//!               └─ε─▶ LoopEnd
//!
//!   plus:  PlusBlockStart ─▶ alts ─▶ BlockEnd ─ε─▶ PlusLoopBack ─ε─▶ LoopEnd
//!               ▲                                       │
//!               └───────────────────ε───────────────────┘
//! ```

use crate::atn::{Atn, AtnState, AtnStateType, AtnType, StateId, Transition};
use crate::interval_set::IntervalSet;
use crate::lexer::action::LexerAction;
use crate::token::TokenType;

/// A sub-graph under construction.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub entry: StateId,
    pub exit: StateId,
    /// Decision made at `entry` (block, `?`, `*` entry) or at the loop-back
    /// state of a `+` loop.
    pub decision: Option<usize>,
    /// Decision between the alternatives inside a `*`/`+` loop body.
    pub block_decision: Option<usize>,
    states: Vec<StateId>,
}

impl Fragment {
    /// All states allocated for this fragment, in allocation order.
    pub fn states(&self) -> &[StateId] {
        &self.states
    }
}

#[derive(Debug)]
pub struct AtnBuilder {
    atn_type: AtnType,
    max_token_type: TokenType,
    states: Vec<AtnState>,
    decision_to_state: Vec<StateId>,
    rule_to_start_state: Vec<StateId>,
    rule_to_stop_state: Vec<StateId>,
    rule_to_token_type: Vec<TokenType>,
    mode_to_start_state: Vec<StateId>,
    lexer_actions: Vec<LexerAction>,
}

impl AtnBuilder {
    pub fn new(atn_type: AtnType, max_token_type: TokenType) -> Self {
        AtnBuilder {
            atn_type,
            max_token_type,
            states: Vec::new(),
            decision_to_state: Vec::new(),
            rule_to_start_state: Vec::new(),
            rule_to_stop_state: Vec::new(),
            rule_to_token_type: Vec::new(),
            mode_to_start_state: Vec::new(),
            lexer_actions: Vec::new(),
        }
    }

    // ── raw graph ──────────────────────────────────────────────────────────

    pub fn add_state(&mut self, state_type: AtnStateType) -> StateId {
        let id = self.states.len();
        self.states.push(AtnState::new(id, state_type, 0));
        id
    }

    pub fn add_transition(&mut self, from: StateId, transition: Transition) {
        self.states[from].add_transition(transition);
    }

    /// Register `state` as a decision point and return its decision number.
    pub fn mark_decision(&mut self, state: StateId) -> usize {
        if let Some(d) = self.states[state].decision {
            return d;
        }
        let d = self.decision_to_state.len();
        self.decision_to_state.push(state);
        self.states[state].decision = Some(d);
        d
    }

    pub fn state_mut(&mut self, state: StateId) -> &mut AtnState {
        &mut self.states[state]
    }

    pub fn rule_start(&self, rule: usize) -> StateId {
        self.rule_to_start_state[rule]
    }

    pub fn rule_stop(&self, rule: usize) -> StateId {
        self.rule_to_stop_state[rule]
    }

    fn epsilon_edge(&mut self, from: StateId, to: StateId) {
        self.add_transition(from, Transition::Epsilon { target: to, outermost_precedence_return: None });
    }

    // ── rules and modes ────────────────────────────────────────────────────

    /// Allocate the start and stop states of a new rule.
    pub fn add_rule(&mut self, left_recursive: bool) -> usize {
        let rule = self.rule_to_start_state.len();
        let start = self.add_state(AtnStateType::RuleStart);
        let stop = self.add_state(AtnStateType::RuleStop);
        self.states[start].rule_index = rule;
        self.states[start].left_recursive_rule = left_recursive;
        self.states[stop].rule_index = rule;
        self.rule_to_start_state.push(start);
        self.rule_to_stop_state.push(stop);
        self.rule_to_token_type.push(0);
        rule
    }

    /// Connect `body` between the rule's start and stop states and claim its
    /// states for the rule.
    pub fn finish_rule(&mut self, rule: usize, body: Fragment) {
        let start = self.rule_to_start_state[rule];
        let stop = self.rule_to_stop_state[rule];
        self.epsilon_edge(start, body.entry);
        self.epsilon_edge(body.exit, stop);
        for &s in &body.states {
            let state = &mut self.states[s];
            state.rule_index = rule;
            for t in state.transitions.iter_mut() {
                match t {
                    Transition::Predicate { rule_index, .. } | Transition::Action { rule_index, .. } => {
                        *rule_index = rule;
                    },
                    _ => {},
                }
            }
        }
    }

    /// Lexer: a new mode and its token-start state.
    pub fn add_mode(&mut self) -> usize {
        let mode = self.mode_to_start_state.len();
        let start = self.add_state(AtnStateType::TokenStart);
        self.mark_decision(start);
        self.mode_to_start_state.push(start);
        mode
    }

    /// Lexer: a rule producing tokens of `token_type`.
    pub fn add_token_rule(&mut self, token_type: TokenType) -> usize {
        let rule = self.add_rule(false);
        self.rule_to_token_type[rule] = token_type;
        rule
    }

    /// Lexer: finish `rule` and make it one of `mode`'s candidate tokens.
    pub fn finish_token_rule(&mut self, mode: usize, rule: usize, body: Fragment) {
        self.finish_rule(rule, body);
        let mode_start = self.mode_to_start_state[mode];
        let rule_start = self.rule_to_start_state[rule];
        self.epsilon_edge(mode_start, rule_start);
    }

    // ── leaf fragments ─────────────────────────────────────────────────────

    fn edge(&mut self, make: impl FnOnce(StateId) -> Transition) -> Fragment {
        let entry = self.add_state(AtnStateType::Basic);
        let exit = self.add_state(AtnStateType::Basic);
        self.add_transition(entry, make(exit));
        Fragment { entry, exit, decision: None, block_decision: None, states: vec![entry, exit] }
    }

    pub fn atom(&mut self, label: TokenType) -> Fragment {
        self.edge(|target| Transition::Atom { target, label })
    }

    /// Lexer shorthand: match one character.
    pub fn char(&mut self, c: char) -> Fragment {
        self.atom(c as TokenType)
    }

    /// Lexer shorthand: match `text` literally.
    pub fn literal(&mut self, text: &str) -> Fragment {
        let parts = text.chars().map(|c| self.char(c)).collect();
        self.seq(parts)
    }

    pub fn range(&mut self, from: TokenType, to: TokenType) -> Fragment {
        self.edge(|target| Transition::Range { target, from, to })
    }

    pub fn set(&mut self, set: IntervalSet) -> Fragment {
        self.edge(|target| Transition::Set { target, set })
    }

    pub fn not_set(&mut self, set: IntervalSet) -> Fragment {
        self.edge(|target| Transition::NotSet { target, set })
    }

    pub fn wildcard(&mut self) -> Fragment {
        self.edge(|target| Transition::Wildcard { target })
    }

    pub fn epsilon(&mut self) -> Fragment {
        self.edge(|target| Transition::Epsilon { target, outermost_precedence_return: None })
    }

    /// Invoke `rule`, binding `precedence` for left-recursive rules.
    pub fn rule_ref(&mut self, rule: usize, precedence: i32) -> Fragment {
        let start = self.rule_to_start_state[rule];
        self.edge(|follow_state| Transition::Rule { target: start, rule_index: rule, follow_state, precedence })
    }

    pub fn predicate(&mut self, pred_index: usize, is_ctx_dependent: bool) -> Fragment {
        self.edge(|target| Transition::Predicate { target, rule_index: 0, pred_index, is_ctx_dependent })
    }

    /// `{precpred(_ctx, precedence)}?`
    pub fn precedence_pred(&mut self, precedence: i32) -> Fragment {
        self.edge(|target| Transition::Precedence { target, precedence })
    }

    /// Lexer: execute `action` when the enclosing rule wins.
    pub fn lexer_action(&mut self, action: LexerAction) -> Fragment {
        let index = self.lexer_actions.len();
        self.lexer_actions.push(action);
        self.edge(|target| Transition::Action {
            target,
            rule_index: 0,
            action_index: Some(index),
            is_ctx_dependent: false,
        })
    }

    // ── combinators ────────────────────────────────────────────────────────

    pub fn seq(&mut self, parts: Vec<Fragment>) -> Fragment {
        let mut parts = parts.into_iter();
        let Some(mut acc) = parts.next() else {
            return self.epsilon();
        };
        for next in parts {
            self.epsilon_edge(acc.exit, next.entry);
            acc.exit = next.exit;
            acc.states.extend(next.states);
        }
        acc
    }

    /// `( alt1 | alt2 | ... )`. A single alternative is returned unchanged.
    pub fn block(&mut self, alts: Vec<Fragment>) -> Fragment {
        if alts.len() <= 1 {
            return self.seq(alts);
        }
        self.block_of(AtnStateType::BlockStart, alts, true)
    }

    fn block_of(&mut self, start_type: AtnStateType, alts: Vec<Fragment>, force_decision: bool) -> Fragment {
        let start = self.add_state(start_type);
        let end = self.add_state(AtnStateType::BlockEnd);
        self.states[start].end_state = Some(end);
        let mut states = vec![start, end];
        let decision = (force_decision || alts.len() > 1).then(|| self.mark_decision(start));
        for alt in alts {
            self.epsilon_edge(start, alt.entry);
            self.epsilon_edge(alt.exit, end);
            states.extend(alt.states);
        }
        Fragment { entry: start, exit: end, decision, block_decision: None, states }
    }

    /// `frag?`
    pub fn optional(&mut self, frag: Fragment) -> Fragment {
        let skip = self.epsilon();
        self.block_of(AtnStateType::BlockStart, vec![frag, skip], true)
    }

    /// `( alts )*`
    pub fn star(&mut self, alts: Vec<Fragment>) -> Fragment {
        self.star_with(alts, true)
    }

    /// `( alts )*`, or `( alts )*?` when `greedy` is false (exit preferred).
    pub fn star_with(&mut self, alts: Vec<Fragment>, greedy: bool) -> Fragment {
        let entry = self.add_state(AtnStateType::StarLoopEntry);
        let body = self.block_of(AtnStateType::StarBlockStart, alts, false);
        let loop_back = self.add_state(AtnStateType::StarLoopBack);
        let loop_end = self.add_state(AtnStateType::LoopEnd);
        let decision = self.mark_decision(entry);

        if greedy {
            self.epsilon_edge(entry, body.entry);
            self.epsilon_edge(entry, loop_end);
        } else {
            self.epsilon_edge(entry, loop_end);
            self.epsilon_edge(entry, body.entry);
            self.states[entry].non_greedy = true;
        }
        self.epsilon_edge(body.exit, loop_back);
        self.epsilon_edge(loop_back, entry);
        self.states[entry].loop_back_state = Some(loop_back);
        self.states[loop_end].loop_back_state = Some(loop_back);

        let mut states = vec![entry, loop_back, loop_end];
        states.extend(body.states);
        Fragment { entry, exit: loop_end, decision: Some(decision), block_decision: body.decision, states }
    }

    /// `( alts )+`
    pub fn plus(&mut self, alts: Vec<Fragment>) -> Fragment {
        let body = self.block_of(AtnStateType::PlusBlockStart, alts, false);
        let loop_back = self.add_state(AtnStateType::PlusLoopBack);
        let loop_end = self.add_state(AtnStateType::LoopEnd);
        let decision = self.mark_decision(loop_back);
        self.epsilon_edge(body.exit, loop_back);
        self.epsilon_edge(loop_back, body.entry);
        self.epsilon_edge(loop_back, loop_end);
        self.states[body.entry].loop_back_state = Some(loop_back);
        self.states[loop_end].loop_back_state = Some(loop_back);

        let mut states = vec![loop_back, loop_end];
        let block_decision = body.decision;
        let entry = body.entry;
        states.extend(body.states);
        Fragment { entry, exit: loop_end, decision: Some(decision), block_decision, states }
    }

    /// The operator loop of a rewritten left-recursive rule. Its decision
    /// gets a precedence DFA.
    pub fn precedence_star(&mut self, alts: Vec<Fragment>) -> Fragment {
        let frag = self.star(alts);
        self.states[frag.entry].precedence_rule_decision = true;
        frag
    }

    /// Add the return edges out of every invoked rule and freeze the graph.
    pub fn build(mut self) -> Atn {
        let mut returns = Vec::new();
        for state in &self.states {
            for t in &state.transitions {
                if let Transition::Rule { target, rule_index, follow_state, precedence } = t {
                    let outermost = (*precedence == 0 && self.states[*target].left_recursive_rule).then_some(*rule_index);
                    returns.push((self.rule_to_stop_state[*rule_index], *follow_state, outermost));
                }
            }
        }
        for (stop, follow, outermost) in returns {
            self.add_transition(stop, Transition::Epsilon { target: follow, outermost_precedence_return: outermost });
        }

        Atn {
            atn_type: self.atn_type,
            max_token_type: self.max_token_type,
            states: self.states,
            decision_to_state: self.decision_to_state,
            rule_to_start_state: self.rule_to_start_state,
            rule_to_stop_state: self.rule_to_stop_state,
            rule_to_token_type: self.rule_to_token_type,
            mode_to_start_state: self.mode_to_start_state,
            lexer_actions: self.lexer_actions,
        }
    }
}
