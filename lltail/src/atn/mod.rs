//! # Augmented transition network
//!
//! The compiled grammar: one sub-graph per rule, states referenced by index,
//! transitions labeled with the symbol (or non-consuming effect) that moves
//! the recognizer from one state to the next.
//!
//! ```text
//!   RuleStart ──ε──▶ BlockStart ──ε──▶ [alt 1] ──▶ BlockEnd ──ε──▶ RuleStop
//!                         │                           ▲              │
//!                         └─────ε──▶ [alt 2] ─────────┘              └─ε─▶ follow states
//! ```
//!
//! The graph is immutable once built and shared by every recognizer through
//! an `Arc`. The only lazily computed data, the per-state LL(1) follow sets,
//! live in `OnceLock`s so lookups stay lock-free after the first call.

pub mod builder;
pub mod config;
pub mod context;
pub mod lexer_sim;
pub mod ll1;
pub mod mode;
pub mod parser_sim;
pub mod semantic;

use std::sync::{Arc, OnceLock};

use crate::interval_set::IntervalSet;
use crate::lexer::action::LexerAction;
use crate::token::{TokenType, EOF, EPSILON, MIN_USER_TOKEN_TYPE};

pub use builder::{AtnBuilder, Fragment};
pub use config::{AtnConfig, AtnConfigSet};
pub use context::{PredictionContext, PredictionContextCache, EMPTY_RETURN_STATE};
pub use lexer_sim::LexerAtnSimulator;
pub use mode::PredictionMode;
pub use parser_sim::{ParserAtnSimulator, PredictionScope};
pub use semantic::{NoPredicates, PredicateEvaluator, SemanticContext};

/// Index of a state in [`Atn::states`].
pub type StateId = usize;

/// Alternative number reserved for "no alternative". Real alternatives are
/// numbered from 1.
pub const INVALID_ALT: usize = 0;

/// Largest code point a lexer ATN can match.
pub const MAX_CHAR_VALUE: i32 = 0x10FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtnType {
    Lexer,
    Parser,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtnStateType {
    Basic,
    RuleStart,
    RuleStop,
    /// Start of a plain `( ... | ... )` or `x?` block.
    BlockStart,
    /// Start of the block inside `( ... )+`.
    PlusBlockStart,
    /// Start of the block inside `( ... )*`.
    StarBlockStart,
    BlockEnd,
    /// Decision between entering and skipping a `*` loop.
    StarLoopEntry,
    StarLoopBack,
    /// Decision between iterating a `+` loop again and leaving it.
    PlusLoopBack,
    LoopEnd,
    /// Lexer mode entry: one transition per token rule of the mode.
    TokenStart,
}

impl AtnStateType {
    pub fn is_block_start(self) -> bool {
        matches!(
            self,
            AtnStateType::BlockStart | AtnStateType::PlusBlockStart | AtnStateType::StarBlockStart
        )
    }
}

/// A labeled edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Transition {
    Epsilon {
        target: StateId,
        /// Set on the return edge out of a left-recursive rule invoked with
        /// precedence 0; names that rule.
        outermost_precedence_return: Option<usize>,
    },
    Atom {
        target: StateId,
        label: TokenType,
    },
    Range {
        target: StateId,
        from: TokenType,
        to: TokenType,
    },
    Set {
        target: StateId,
        set: IntervalSet,
    },
    NotSet {
        target: StateId,
        set: IntervalSet,
    },
    Wildcard {
        target: StateId,
    },
    /// Invoke `target`'s rule; on return, continue at `follow_state`.
    Rule {
        target: StateId,
        rule_index: usize,
        follow_state: StateId,
        precedence: i32,
    },
    Predicate {
        target: StateId,
        rule_index: usize,
        pred_index: usize,
        is_ctx_dependent: bool,
    },
    Action {
        target: StateId,
        rule_index: usize,
        /// Index into [`Atn::lexer_actions`] for lexer ATNs.
        action_index: Option<usize>,
        is_ctx_dependent: bool,
    },
    /// `{precpred(ctx, precedence)}?` in a rewritten left-recursive rule.
    Precedence {
        target: StateId,
        precedence: i32,
    },
}

impl Transition {
    pub fn target(&self) -> StateId {
        match self {
            Transition::Epsilon { target, .. }
            | Transition::Atom { target, .. }
            | Transition::Range { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Action { target, .. }
            | Transition::Precedence { target, .. } => *target,
        }
    }

    /// Whether following this edge consumes no input symbol.
    pub fn is_epsilon(&self) -> bool {
        matches!(
            self,
            Transition::Epsilon { .. }
                | Transition::Rule { .. }
                | Transition::Predicate { .. }
                | Transition::Action { .. }
                | Transition::Precedence { .. }
        )
    }

    /// Symbols matched by a consuming edge, without vocabulary bounds.
    pub fn label(&self) -> Option<IntervalSet> {
        match self {
            Transition::Atom { label, .. } => Some(IntervalSet::of(*label)),
            Transition::Range { from, to, .. } => Some(IntervalSet::of_range(*from, *to)),
            Transition::Set { set, .. } | Transition::NotSet { set, .. } => Some(set.clone()),
            _ => None,
        }
    }

    /// Does this edge consume `symbol`, given the vocabulary `[min, max]`?
    pub fn matches(&self, symbol: i32, min: i32, max: i32) -> bool {
        match self {
            Transition::Atom { label, .. } => *label == symbol,
            Transition::Range { from, to, .. } => *from <= symbol && symbol <= *to,
            Transition::Set { set, .. } => set.contains(symbol),
            Transition::NotSet { set, .. } => symbol >= min && symbol <= max && !set.contains(symbol),
            Transition::Wildcard { .. } => symbol >= min && symbol <= max,
            _ => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AtnState {
    pub id: StateId,
    pub state_type: AtnStateType,
    pub rule_index: usize,
    pub transitions: Vec<Transition>,
    /// Decision number, for states where prediction picks a transition.
    pub decision: Option<usize>,
    /// Non-greedy decision (`*?`, `+?`, `??`).
    pub non_greedy: bool,
    /// On a `StarLoopEntry`: the operator loop of a left-recursive rule.
    pub precedence_rule_decision: bool,
    /// On a `RuleStart`: the rule was rewritten from left recursion.
    pub left_recursive_rule: bool,
    /// On block starts: the matching `BlockEnd`.
    pub end_state: Option<StateId>,
    /// On `LoopEnd` and `StarLoopEntry`: the loop-back state.
    pub loop_back_state: Option<StateId>,
    epsilon_only: bool,
    next_tokens: OnceLock<IntervalSet>,
}

impl AtnState {
    pub(crate) fn new(id: StateId, state_type: AtnStateType, rule_index: usize) -> Self {
        AtnState {
            id,
            state_type,
            rule_index,
            transitions: Vec::new(),
            decision: None,
            non_greedy: false,
            precedence_rule_decision: false,
            left_recursive_rule: false,
            end_state: None,
            loop_back_state: None,
            epsilon_only: false,
            next_tokens: OnceLock::new(),
        }
    }

    /// True when every outgoing edge is non-consuming (and there is at
    /// least one).
    pub fn only_has_epsilon_transitions(&self) -> bool {
        self.epsilon_only
    }

    pub fn is_rule_stop(&self) -> bool {
        self.state_type == AtnStateType::RuleStop
    }

    pub(crate) fn add_transition(&mut self, t: Transition) {
        if self.transitions.is_empty() {
            self.epsilon_only = t.is_epsilon();
        } else if self.epsilon_only != t.is_epsilon() {
            self.epsilon_only = false;
        }
        self.transitions.push(t);
    }
}

/// An immutable, shareable transition network.
#[derive(Debug, Clone)]
pub struct Atn {
    pub atn_type: AtnType,
    /// Largest token type the parser may see (lexer ATNs: the largest token
    /// type a rule produces).
    pub max_token_type: TokenType,
    pub states: Vec<AtnState>,
    /// Decision number → decision state.
    pub decision_to_state: Vec<StateId>,
    pub rule_to_start_state: Vec<StateId>,
    pub rule_to_stop_state: Vec<StateId>,
    /// Lexer only: token type each rule produces.
    pub rule_to_token_type: Vec<TokenType>,
    /// Lexer only: `TokenStart` state of each mode.
    pub mode_to_start_state: Vec<StateId>,
    /// Lexer only: actions referenced by [`Transition::Action`].
    pub lexer_actions: Vec<LexerAction>,
}

impl Atn {
    pub fn state(&self, id: StateId) -> &AtnState {
        &self.states[id]
    }

    pub fn num_decisions(&self) -> usize {
        self.decision_to_state.len()
    }

    pub fn decision_state(&self, decision: usize) -> Option<&AtnState> {
        self.decision_to_state.get(decision).map(|&s| &self.states[s])
    }

    /// Tokens that can follow `state` within its rule. Contains `EPSILON`
    /// when the end of the rule is reachable without consuming input.
    pub fn next_tokens(&self, state: StateId) -> &IntervalSet {
        self.states[state]
            .next_tokens
            .get_or_init(|| ll1::look(self, state, None, None))
    }

    /// Tokens that can follow `state` given the call stack `ctx`. Contains
    /// `EOF` when the outermost rule can end.
    pub fn next_tokens_in_context(&self, state: StateId, ctx: &Arc<PredictionContext>) -> IntervalSet {
        ll1::look(self, state, None, Some(ctx.clone()))
    }

    /// Tokens that may legally appear at `state`, looking outward through
    /// `invoking_states` (innermost first) whenever the current rule can
    /// end. Adds `EOF` if even the outermost rule can end.
    pub fn expected_tokens(&self, state: StateId, invoking_states: &[StateId]) -> IntervalSet {
        let mut following = self.next_tokens(state).clone();
        if !following.contains(EPSILON) {
            return following;
        }
        let mut expected = following.clone();
        expected.remove(EPSILON);
        for &invoking in invoking_states {
            if !following.contains(EPSILON) {
                break;
            }
            let Some(follow_state) = self.follow_state_of(invoking) else {
                break;
            };
            following = self.next_tokens(follow_state).clone();
            expected.add_all(&following);
            expected.remove(EPSILON);
        }
        if following.contains(EPSILON) {
            expected.add(EOF);
        }
        expected
    }

    /// Follow state of the rule invocation leaving `invoking_state`.
    pub fn follow_state_of(&self, invoking_state: StateId) -> Option<StateId> {
        match self.states[invoking_state].transitions.first() {
            Some(Transition::Rule { follow_state, .. }) => Some(*follow_state),
            _ => None,
        }
    }

    /// Consumable symbol range for this ATN's input alphabet.
    pub(crate) fn symbol_bounds(&self) -> (i32, i32) {
        match self.atn_type {
            AtnType::Lexer => (0, MAX_CHAR_VALUE),
            AtnType::Parser => (MIN_USER_TOKEN_TYPE, self.max_token_type),
        }
    }
}
