//! # Per-decision DFA cache
//!
//! Each decision owns a DFA built lazily from ATN configuration sets. A DFA
//! state is identified by the signature of its configuration set; two
//! threads that compute the same set get the same state object.
//!
//! ```text
//!   s0 ──ID──▶ s1 ──'='──▶ :s3=>1
//!    │
//!    └──INT──▶ :s2=>2          (edges to DEAD_STATE are not drawn)
//! ```
//!
//! All mutation happens through `&self`: the state table is a `DashMap`
//! insert-or-reuse map, edges sit behind a per-state `RwLock`, and start
//! states are "first writer wins" slots. Edges store target ids rather than
//! `Arc`s so that cyclic automata do not leak.
//!
//! Locks are never held across a call that can panic, so a poisoned lock
//! still guards a consistent map; readers and writers take it over.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxHashMap;
use tracing::{trace, warn};

use crate::atn::config::{AtnConfigSet, ConfigSignature};
use crate::atn::semantic::SemanticContext;
use crate::atn::{StateId, INVALID_ALT};
use crate::error::DfaError;
use crate::lexer::action::LexerActionExecutor;
use crate::token::{TokenType, EOF};
use crate::vocabulary::Vocabulary;

/// Edge target meaning "no viable continuation".
pub const DEAD_STATE: usize = usize::MAX;

/// What an accept state decides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptStateInfo {
    pub prediction: usize,
    /// Lexer only: actions to run when this state wins.
    pub lexer_action_executor: Option<Arc<LexerActionExecutor>>,
}

/// A predicate that must hold for `alt` to be predicted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredPrediction {
    pub pred: Arc<SemanticContext>,
    pub alt: usize,
}

#[derive(Debug)]
pub struct DfaState {
    /// Assigned on insertion, monotonically increasing within one DFA.
    pub id: usize,
    pub configs: AtnConfigSet,
    edges: RwLock<FxHashMap<TokenType, usize>>,
    pub accept: Option<AcceptStateInfo>,
    /// SLL found a conflict here; LL prediction must take over.
    pub requires_full_context: bool,
    /// When set, the prediction depends on these predicates (tried in order).
    pub predicates: Option<Vec<PredPrediction>>,
}

impl DfaState {
    pub fn new(configs: AtnConfigSet) -> Self {
        DfaState {
            id: DEAD_STATE,
            configs,
            edges: RwLock::new(FxHashMap::default()),
            accept: None,
            requires_full_context: false,
            predicates: None,
        }
    }

    pub fn is_accept_state(&self) -> bool {
        self.accept.is_some()
    }

    /// Predicted alternative, or [`INVALID_ALT`].
    pub fn prediction(&self) -> usize {
        self.accept.as_ref().map(|a| a.prediction).unwrap_or(INVALID_ALT)
    }

    /// Cached target id for `symbol`.
    pub fn edge(&self, symbol: TokenType) -> Option<usize> {
        read(&self.edges).get(&symbol).copied()
    }

    /// Edges sorted by symbol.
    pub fn edges(&self) -> Vec<(TokenType, usize)> {
        let mut edges: Vec<_> = read(&self.edges).iter().map(|(k, v)| (*k, *v)).collect();
        edges.sort_unstable();
        edges
    }

    fn set_edge(&self, symbol: TokenType, target: usize) {
        write(&self.edges).insert(symbol, target);
    }
}

/// Result of an edge lookup.
#[derive(Debug, Clone)]
pub enum DfaEdge {
    State(Arc<DfaState>),
    /// Known to fail on this symbol.
    Dead,
}

#[derive(Debug, Default)]
struct PrecedenceStartStates {
    sll: RwLock<FxHashMap<i32, Arc<DfaState>>>,
    full: RwLock<FxHashMap<i32, Arc<DfaState>>>,
}

/// The cache automaton for one decision.
#[derive(Debug)]
pub struct Dfa {
    pub decision: usize,
    /// The ATN decision state this DFA predicts for.
    pub atn_start_state: StateId,
    states: DashMap<ConfigSignature, Arc<DfaState>>,
    by_id: DashMap<usize, Arc<DfaState>>,
    next_state_number: AtomicUsize,
    s0: RwLock<Option<Arc<DfaState>>>,
    s0_full: RwLock<Option<Arc<DfaState>>>,
    precedence: Option<PrecedenceStartStates>,
    /// Set once any prediction escalated to full-context LL, whether or not
    /// its start state could be cached.
    full_context_used: AtomicBool,
}

impl Dfa {
    pub fn new(decision: usize, atn_start_state: StateId, precedence_dfa: bool) -> Self {
        Dfa {
            decision,
            atn_start_state,
            states: DashMap::new(),
            by_id: DashMap::new(),
            next_state_number: AtomicUsize::new(0),
            s0: RwLock::new(None),
            s0_full: RwLock::new(None),
            precedence: precedence_dfa.then(PrecedenceStartStates::default),
            full_context_used: AtomicBool::new(false),
        }
    }

    /// Decisions at the operator loop of a left-recursive rule get start
    /// states indexed by precedence.
    pub fn is_precedence_dfa(&self) -> bool {
        self.precedence.is_some()
    }

    pub fn s0(&self) -> Option<Arc<DfaState>> {
        read(&self.s0).clone()
    }

    /// Install the SLL start state unless another thread already did;
    /// returns whichever state won.
    pub fn set_s0(&self, state: Arc<DfaState>) -> Arc<DfaState> {
        first_writer_wins(&self.s0, state)
    }

    pub fn s0_full(&self) -> Option<Arc<DfaState>> {
        read(&self.s0_full).clone()
    }

    pub fn set_s0_full(&self, state: Arc<DfaState>) -> Arc<DfaState> {
        first_writer_wins(&self.s0_full, state)
    }

    pub fn precedence_start_state(&self, precedence: i32, full_ctx: bool) -> Result<Option<Arc<DfaState>>, DfaError> {
        let table = self.precedence_table(full_ctx)?;
        Ok(read(table).get(&precedence).cloned())
    }

    /// Install the start state for `precedence`. Negative precedences are
    /// ignored. Returns the state now installed.
    pub fn set_precedence_start_state(
        &self,
        precedence: i32,
        full_ctx: bool,
        state: Arc<DfaState>,
    ) -> Result<Arc<DfaState>, DfaError> {
        let table = self.precedence_table(full_ctx)?;
        if precedence < 0 {
            return Ok(state);
        }
        Ok(write(table).entry(precedence).or_insert(state).clone())
    }

    fn precedence_table(&self, full_ctx: bool) -> Result<&RwLock<FxHashMap<i32, Arc<DfaState>>>, DfaError> {
        let starts = self
            .precedence
            .as_ref()
            .ok_or(DfaError::NotPrecedenceDfa { decision: self.decision })?;
        Ok(if full_ctx { &starts.full } else { &starts.sll })
    }

    /// Insert `state`, or return the existing state with the same
    /// configuration signature.
    pub fn add_state(&self, mut state: DfaState) -> Arc<DfaState> {
        let signature = state.configs.signature();
        match self.states.entry(signature) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                state.id = self.next_state_number.fetch_add(1, Ordering::Relaxed);
                trace!(decision = self.decision, id = state.id, configs = state.configs.len(), "new DFA state");
                let state = Arc::new(state);
                self.by_id.insert(state.id, state.clone());
                slot.insert(state.clone());
                state
            },
        }
    }

    pub fn state(&self, id: usize) -> Option<Arc<DfaState>> {
        self.by_id.get(&id).map(|s| s.value().clone())
    }

    /// Cached transition out of `from` on `symbol`.
    pub fn existing_target(&self, from: &DfaState, symbol: TokenType) -> Option<DfaEdge> {
        match from.edge(symbol)? {
            DEAD_STATE => Some(DfaEdge::Dead),
            id => self.state(id).map(DfaEdge::State),
        }
    }

    /// Cache `from --symbol--> to`.
    pub fn add_edge(&self, from: &DfaState, symbol: TokenType, to: &DfaEdge) {
        if symbol < EOF {
            return;
        }
        let target = match to {
            DfaEdge::State(s) => s.id,
            DfaEdge::Dead => DEAD_STATE,
        };
        from.set_edge(symbol, target);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        match &self.precedence {
            Some(p) => {
                read(&p.sll).is_empty() && read(&p.full).is_empty()
            },
            None => self.s0().is_none() && self.s0_full().is_none(),
        }
    }

    /// Record that a prediction for this decision fell back to
    /// full-context LL.
    pub fn mark_full_context(&self) {
        self.full_context_used.store(true, Ordering::Relaxed);
    }

    /// Whether any prediction for this decision has needed full context.
    pub fn is_context_sensitive(&self) -> bool {
        if self.full_context_used.load(Ordering::Relaxed) {
            return true;
        }
        match &self.precedence {
            Some(p) => !read(&p.full).is_empty(),
            None => self.s0_full().is_some(),
        }
    }

    /// All states ordered by id.
    pub fn states(&self) -> Vec<Arc<DfaState>> {
        let mut states: Vec<_> = self.by_id.iter().map(|s| s.value().clone()).collect();
        states.sort_by_key(|s| s.id);
        states
    }

    /// Render the edges as `s0-ID->:s1=>2` lines, naming symbols through
    /// `vocabulary`.
    pub fn to_string_with(&self, vocabulary: &Vocabulary) -> String {
        self.render(|symbol| vocabulary.display_name(symbol))
    }

    /// Render a lexer DFA, labeling edges with the matched character.
    pub fn to_lexer_string(&self) -> String {
        self.render(|symbol| match char::from_u32(symbol as u32) {
            Some(c) if symbol >= 0 => format!("'{}'", c),
            _ => symbol.to_string(),
        })
    }

    fn render(&self, label: impl Fn(TokenType) -> String) -> String {
        let mut out = String::new();
        for state in self.states() {
            for (symbol, target) in state.edges() {
                if target == DEAD_STATE {
                    continue;
                }
                let Some(target) = self.state(target) else {
                    continue;
                };
                let _ = writeln!(out, "{}-{}->{}", state_label(&state), label(symbol), state_label(&target));
            }
        }
        out
    }
}

fn state_label(s: &DfaState) -> String {
    let base = format!(
        "{}s{}{}",
        if s.is_accept_state() { ":" } else { "" },
        s.id,
        if s.requires_full_context { "^" } else { "" }
    );
    if !s.is_accept_state() {
        return base;
    }
    match &s.predicates {
        Some(preds) => {
            let parts: Vec<String> = preds.iter().map(|p| format!("({}, {})", p.pred, p.alt)).collect();
            format!("{}=>[{}]", base, parts.join(", "))
        },
        None => format!("{}=>{}", base, s.prediction()),
    }
}

fn first_writer_wins(slot: &RwLock<Option<Arc<DfaState>>>, state: Arc<DfaState>) -> Arc<DfaState> {
    write(slot).get_or_insert(state).clone()
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("DFA lock poisoned by a panicking thread; reusing its contents");
        PoisonError::into_inner(poisoned)
    })
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("DFA lock poisoned by a panicking thread; reusing its contents");
        PoisonError::into_inner(poisoned)
    })
}
