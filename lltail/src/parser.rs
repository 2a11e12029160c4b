//! # Parser driver
//!
//! The runtime half of a recursive-descent parser. Rule functions (usually
//! generated, hand-written in the tests) call into [`Parser`] in a fixed
//! rhythm:
//!
//! ```text
//!   enter_rule ─▶ enter_outer_alt ─▶ { set_state; match_token | rule call
//!                                      | sync + adaptive_predict } ─▶ exit_rule_with
//! ```
//!
//! `exit_rule_with` is the rule's catch block: a [`RecognitionError`] that
//! escaped the body is recorded on the context, reported and recovered from
//! through the [`ErrorStrategy`]; a [`ParseCancelled`](crate::ParseCancelled)
//! keeps unwinding.
//!
//! Left-recursive rules use the recursion variants
//! (`enter_recursion_rule`, `push_new_recursion_context`,
//! `unroll_recursion_contexts`), which re-parent the operand already parsed
//! under each new operator context.

use std::sync::Arc;

use tracing::trace;

use crate::atn::semantic::PredicateEvaluator;
use crate::atn::{Atn, ParserAtnSimulator, PredictionScope, StateId, Transition};
use crate::config::RuntimeOptions;
use crate::error::{ParseError, RecognitionError};
use crate::interval_set::IntervalSet;
use crate::listener::{ErrorListener, TracingErrorListener};
use crate::strategy::{DefaultErrorStrategy, ErrorStrategy, Recognizer};
use crate::stream::{CommonTokenStream, IntStream, TokenStream};
use crate::token::{CommonTokenFactory, Token, TokenFactory, TokenType, EOF};
use crate::tree::{ParseTreeArena, ParseTreeNode, RuleContextId};
use crate::vocabulary::Vocabulary;

/// Grammar predicate callback: `(rule_index, pred_index) -> holds`.
pub type SemanticPredicate = Arc<dyn Fn(usize, usize) -> bool + Send + Sync>;

/// Predicate evaluation as seen from the parser's current position.
struct ParserPredicates<'a> {
    precedence: i32,
    sempred: Option<&'a SemanticPredicate>,
}

impl PredicateEvaluator for ParserPredicates<'_> {
    fn sempred(&self, rule_index: usize, pred_index: usize) -> bool {
        self.sempred.map(|p| p(rule_index, pred_index)).unwrap_or(true)
    }

    fn precpred(&self, precedence: i32) -> bool {
        precedence >= self.precedence
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ParserCore
// ══════════════════════════════════════════════════════════════════════════════

/// Parser state visible to the error strategy: input, tree, position in
/// the ATN and where errors go.
pub struct ParserCore<S: TokenStream> {
    sim: Arc<ParserAtnSimulator>,
    input: S,
    name: String,
    vocabulary: Vocabulary,
    rule_names: Vec<String>,
    tree: ParseTreeArena,
    ctx: Option<RuleContextId>,
    state: StateId,
    precedence_stack: Vec<i32>,
    listeners: Vec<Arc<dyn ErrorListener>>,
    factory: Box<dyn TokenFactory>,
    options: RuntimeOptions,
    predicates: Option<SemanticPredicate>,
    syntax_errors: usize,
    matched_eof: bool,
}

impl<S: TokenStream> ParserCore<S> {
    fn lt(&self, k: isize) -> Option<Token> {
        self.input.lt(k).cloned()
    }

    fn add_leaf(&mut self, token: Token, as_error: bool) {
        if !self.options.build_parse_trees {
            return;
        }
        if let Some(ctx) = self.ctx {
            if as_error {
                self.tree.add_error_node(ctx, token);
            } else {
                self.tree.add_terminal(ctx, token);
            }
        }
    }
}

impl<S: TokenStream> Recognizer for ParserCore<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn atn(&self) -> &Atn {
        self.sim.atn()
    }

    fn state(&self) -> StateId {
        self.state
    }

    fn token_stream(&self) -> &dyn TokenStream {
        &self.input
    }

    fn consume(&mut self, as_error: bool) -> Token {
        let token = self.current_token();
        if !token.is_eof() {
            self.input.consume();
        }
        self.add_leaf(token.clone(), as_error);
        token
    }

    fn invoking_states(&self) -> Vec<StateId> {
        self.ctx.map(|c| self.tree.invoking_states(c)).unwrap_or_default()
    }

    fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    fn rule_names(&self) -> &[String] {
        &self.rule_names
    }

    fn token_factory(&self) -> &dyn TokenFactory {
        self.factory.as_ref()
    }

    fn notify_error_listeners(&mut self, message: &str, offending: Option<&Token>, error: Option<&RecognitionError>) {
        self.syntax_errors += 1;
        let (line, column) = offending
            .map(|t| (t.line, t.column))
            .unwrap_or_else(|| self.lt(1).map(|t| (t.line, t.column)).unwrap_or((0, 0)));
        for listener in &self.listeners {
            listener.syntax_error(&self.name, offending, line, column, message, error);
        }
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Parser
// ══════════════════════════════════════════════════════════════════════════════

/// What a left-recursive rule invocation needs to remember between
/// `enter_recursion_rule` and `unroll_recursion_contexts`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecursionFrame {
    /// Context that invoked the rule.
    pub parent: Option<RuleContextId>,
    /// State the invocation left from.
    pub invoking_state: Option<StateId>,
    /// The rule's start state.
    pub start_state: StateId,
    pub rule_index: usize,
}

/// A parser over one token stream, predicting through a shared simulator.
pub struct Parser<S: TokenStream = CommonTokenStream> {
    core: ParserCore<S>,
    strategy: Box<dyn ErrorStrategy>,
}

impl<S: TokenStream> Parser<S> {
    pub fn new(sim: Arc<ParserAtnSimulator>, input: S) -> Self {
        Parser {
            core: ParserCore {
                sim,
                input,
                name: "parser".to_string(),
                vocabulary: Vocabulary::default(),
                rule_names: Vec::new(),
                tree: ParseTreeArena::new(),
                ctx: None,
                state: 0,
                precedence_stack: vec![0],
                listeners: vec![Arc::new(TracingErrorListener)],
                factory: Box::new(CommonTokenFactory),
                options: RuntimeOptions::default(),
                predicates: None,
                syntax_errors: 0,
                matched_eof: false,
            },
            strategy: Box::new(DefaultErrorStrategy::new()),
        }
    }

    // ── configuration ──────────────────────────────────────────────────────

    /// Name passed to error listeners.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.core.name = name.into();
        self
    }

    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.core.vocabulary = vocabulary;
        self
    }

    pub fn with_rule_names(mut self, names: &[&str]) -> Self {
        self.core.rule_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_options(mut self, options: RuntimeOptions) -> Self {
        self.core.options = options;
        self
    }

    pub fn with_predicates(mut self, predicates: impl Fn(usize, usize) -> bool + Send + Sync + 'static) -> Self {
        let predicates: SemanticPredicate = Arc::new(predicates);
        self.core.predicates = Some(predicates);
        self
    }

    pub fn with_error_strategy(mut self, strategy: impl ErrorStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    pub fn with_token_factory(mut self, factory: impl TokenFactory + 'static) -> Self {
        self.core.factory = Box::new(factory);
        self
    }

    pub fn add_error_listener(&mut self, listener: Arc<dyn ErrorListener>) {
        self.core.listeners.push(listener);
    }

    pub fn remove_error_listeners(&mut self) {
        self.core.listeners.clear();
    }

    // ── accessors ──────────────────────────────────────────────────────────

    pub fn core(&self) -> &ParserCore<S> {
        &self.core
    }

    pub fn input(&self) -> &S {
        &self.core.input
    }

    pub fn input_mut(&mut self) -> &mut S {
        &mut self.core.input
    }

    pub fn tree(&self) -> &ParseTreeArena {
        &self.core.tree
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.core.options
    }

    pub fn interpreter(&self) -> &Arc<ParserAtnSimulator> {
        &self.core.sim
    }

    /// The rule context being parsed, if any.
    pub fn context(&self) -> Option<RuleContextId> {
        self.core.ctx
    }

    pub fn state(&self) -> StateId {
        self.core.state
    }

    /// Record the ATN state the rule body has reached.
    pub fn set_state(&mut self, state: StateId) {
        self.core.state = state;
    }

    pub fn precedence(&self) -> i32 {
        self.core.precedence_stack.last().copied().unwrap_or(0)
    }

    pub fn current_token(&self) -> Token {
        self.core.current_token()
    }

    pub fn number_of_syntax_errors(&self) -> usize {
        self.core.syntax_errors
    }

    pub fn in_error_recovery_mode(&self) -> bool {
        self.strategy.in_error_recovery_mode()
    }

    pub fn expected_tokens(&self) -> IntervalSet {
        self.core.expected_tokens()
    }

    pub fn is_expected_token(&self, symbol: TokenType) -> bool {
        self.core.is_expected_token(symbol)
    }

    /// Names of the rules being parsed, innermost first.
    pub fn rule_invocation_stack(&self) -> Vec<String> {
        let mut stack = Vec::new();
        let mut cur = self.core.ctx;
        while let Some(id) = cur {
            let ctx = self.core.tree.get(id);
            let name = self
                .core
                .rule_names
                .get(ctx.rule_index)
                .cloned()
                .unwrap_or_else(|| ctx.rule_index.to_string());
            stack.push(name);
            cur = ctx.parent;
        }
        stack
    }

    /// Rewind the input and forget every tree, error and recovery state.
    pub fn reset(&mut self) {
        self.core.input.seek(0);
        self.strategy.reset();
        self.core.tree = ParseTreeArena::new();
        self.core.ctx = None;
        self.core.state = 0;
        self.core.precedence_stack = vec![0];
        self.core.syntax_errors = 0;
        self.core.matched_eof = false;
    }

    // ── matching ───────────────────────────────────────────────────────────

    /// Match the current token against `token_type`, repairing inline on a
    /// mismatch.
    pub fn match_token(&mut self, token_type: TokenType) -> Result<Token, ParseError> {
        if self.core.input.la(1) == token_type {
            if token_type == EOF {
                self.core.matched_eof = true;
            }
            self.strategy.report_match();
            return Ok(self.consume());
        }
        self.recover_inline()
    }

    /// Match any token in `set`.
    pub fn match_set(&mut self, set: &IntervalSet) -> Result<Token, ParseError> {
        let la = self.core.input.la(1);
        if set.contains(la) {
            if la == EOF {
                self.core.matched_eof = true;
            }
            self.strategy.report_match();
            return Ok(self.consume());
        }
        self.recover_inline()
    }

    /// Match any token but EOF.
    pub fn match_wildcard(&mut self) -> Result<Token, ParseError> {
        if self.core.input.la(1) > 0 {
            self.strategy.report_match();
            return Ok(self.consume());
        }
        self.recover_inline()
    }

    fn recover_inline(&mut self) -> Result<Token, ParseError> {
        let token = self.strategy.recover_inline(&mut self.core)?;
        if token.is_synthetic() {
            self.core.add_leaf(token.clone(), true);
        }
        Ok(token)
    }

    /// Consume the current token into the tree: as an error leaf while
    /// recovering, as a terminal otherwise.
    pub fn consume(&mut self) -> Token {
        let as_error = self.strategy.in_error_recovery_mode();
        self.core.consume(as_error)
    }

    /// Let the error strategy check the lookahead at a sub-rule or loop
    /// boundary.
    pub fn sync(&mut self) -> Result<(), ParseError> {
        self.strategy.sync(&mut self.core)
    }

    // ── prediction and predicates ──────────────────────────────────────────

    /// Choose the alternative of `decision` that matches the upcoming input.
    pub fn adaptive_predict(&mut self, decision: usize) -> Result<usize, ParseError> {
        let core = &mut self.core;
        let invoking_states = core.ctx.map(|c| core.tree.invoking_states(c)).unwrap_or_default();
        let precedence = core.precedence_stack.last().copied().unwrap_or(0);
        let evaluator = ParserPredicates { precedence, sempred: core.predicates.as_ref() };
        let mut scope = PredictionScope::new(&invoking_states, &evaluator)
            .with_precedence(precedence)
            .with_options(core.options);
        let alt = core.sim.adaptive_predict(&mut core.input, decision, &mut scope);
        for diagnostic in &scope.diagnostics {
            for listener in &core.listeners {
                listener.report_diagnostic(&core.name, diagnostic);
            }
        }
        Ok(alt?)
    }

    /// Evaluate grammar predicate `pred_index` of `rule_index`.
    pub fn sempred(&self, rule_index: usize, pred_index: usize) -> bool {
        self.core.predicates.as_ref().map(|p| p(rule_index, pred_index)).unwrap_or(true)
    }

    /// `precpred(_ctx, precedence)`: may an operator of `precedence` extend
    /// the current left-recursive invocation?
    pub fn precpred(&self, precedence: i32) -> bool {
        precedence >= self.precedence()
    }

    /// The error raised when the predicate at the current state fails.
    /// `message` defaults to `failed predicate: {<predicate>}?`.
    pub fn failed_predicate(&self, predicate: &str, message: Option<&str>) -> RecognitionError {
        let state = self.core.state;
        let current_rule = self.core.ctx.map(|c| self.core.tree.get(c).rule_index).unwrap_or(0);
        let (rule_index, predicate_index) = match self.core.atn().state(state).transitions.first() {
            Some(Transition::Predicate { rule_index, pred_index, .. }) => (*rule_index, *pred_index),
            _ => (current_rule, 0),
        };
        RecognitionError::FailedPredicate {
            offending_token: self.current_token(),
            state,
            rule_index,
            predicate_index,
            message: message
                .map(str::to_string)
                .unwrap_or_else(|| format!("failed predicate: {{{}}}?", predicate)),
        }
    }

    // ── rule contexts ──────────────────────────────────────────────────────

    /// Open a context for `rule_index`, invoked from the current state, and
    /// move to the rule's `state`.
    pub fn enter_rule(&mut self, state: StateId, rule_index: usize) -> RuleContextId {
        let core = &mut self.core;
        let parent = core.ctx;
        let invoking_state = parent.map(|_| core.state);
        let id = core.tree.new_context(parent, invoking_state, rule_index);
        core.tree.get_mut(id).start = core.lt(1);
        if core.options.build_parse_trees {
            if let Some(p) = parent {
                core.tree.add_child(p, ParseTreeNode::Rule(id));
            }
        }
        core.state = state;
        core.ctx = Some(id);
        trace!(rule = rule_index, state, "enter rule");
        id
    }

    /// Commit to outer alternative `alt` of `ctx`. When `ctx` is a
    /// relabeled copy of the current context, it takes the current one's
    /// place among its parent's children.
    pub fn enter_outer_alt(&mut self, ctx: RuleContextId, alt: usize) {
        let core = &mut self.core;
        core.tree.get_mut(ctx).alt_number = alt;
        if core.options.build_parse_trees && core.ctx != Some(ctx) {
            if let Some(parent) = core.tree.parent(ctx) {
                core.tree.replace_last_child(parent, ParseTreeNode::Rule(ctx));
            }
        }
        core.ctx = Some(ctx);
    }

    /// A fresh context standing in for `ctx`, for a labeled alternative.
    /// Pass the result to [`Parser::enter_outer_alt`].
    pub fn relabel_context(&mut self, ctx: RuleContextId) -> RuleContextId {
        let tree = &mut self.core.tree;
        let rule_index = tree.get(ctx).rule_index;
        let id = tree.new_context(None, None, rule_index);
        tree.copy_from(id, ctx);
        id
    }

    /// Close the current context and return to its invoking state.
    pub fn exit_rule(&mut self) {
        let core = &mut self.core;
        let Some(id) = core.ctx else {
            return;
        };
        let stop = if core.matched_eof { core.lt(1) } else { core.lt(-1) };
        let ctx = core.tree.get_mut(id);
        ctx.stop = stop;
        if let Some(s) = ctx.invoking_state {
            core.state = s;
        }
        core.ctx = ctx.parent;
        trace!(rule = ctx.rule_index, "exit rule");
    }

    /// Finish a rule body: recover from a recognition error that escaped
    /// it, then close the context. Only a cancelled parse comes back as an
    /// error.
    pub fn exit_rule_with(&mut self, result: Result<(), ParseError>) -> Result<(), ParseError> {
        let outcome = self.recover_rule(result);
        self.exit_rule();
        outcome
    }

    fn recover_rule(&mut self, result: Result<(), ParseError>) -> Result<(), ParseError> {
        let error = match result {
            Err(ParseError::Recognition(e)) => e,
            other => return other,
        };
        if let Some(ctx) = self.core.ctx {
            self.core.tree.get_mut(ctx).exception = Some(error.clone());
        }
        self.strategy.report_error(&mut self.core, &error);
        self.strategy.recover(&mut self.core, &error)
    }

    /// Open a left-recursive rule invocation binding `precedence`.
    pub fn enter_recursion_rule(
        &mut self,
        start_state: StateId,
        rule_index: usize,
        precedence: i32,
    ) -> (RuleContextId, RecursionFrame) {
        let core = &mut self.core;
        let parent = core.ctx;
        let invoking_state = parent.map(|_| core.state);
        let id = core.tree.new_context(parent, invoking_state, rule_index);
        core.tree.get_mut(id).start = core.lt(1);
        core.state = start_state;
        core.precedence_stack.push(precedence);
        core.ctx = Some(id);
        trace!(rule = rule_index, precedence, "enter recursion rule");
        (id, RecursionFrame { parent, invoking_state, start_state, rule_index })
    }

    /// Wrap everything parsed so far in this invocation as the first child
    /// of a new context, for the next operator.
    pub fn push_new_recursion_context(&mut self, frame: &RecursionFrame) -> RuleContextId {
        let core = &mut self.core;
        let id = core.tree.new_context(frame.parent, frame.invoking_state, frame.rule_index);
        let Some(previous) = core.ctx else {
            core.ctx = Some(id);
            return id;
        };
        let stop = core.lt(-1);
        let prev = core.tree.get_mut(previous);
        prev.parent = Some(id);
        prev.invoking_state = Some(frame.start_state);
        prev.stop = stop;
        let start = prev.start.clone();
        core.tree.get_mut(id).start = start;
        if core.options.build_parse_trees {
            core.tree.add_child(id, ParseTreeNode::Rule(previous));
        }
        core.ctx = Some(id);
        id
    }

    /// Close a left-recursive invocation and attach its outermost context
    /// to the caller. Returns that context.
    pub fn unroll_recursion_contexts(&mut self, frame: &RecursionFrame) -> Option<RuleContextId> {
        let core = &mut self.core;
        core.precedence_stack.pop();
        let retctx = core.ctx;
        if let Some(id) = retctx {
            let stop = core.lt(-1);
            let ctx = core.tree.get_mut(id);
            ctx.stop = stop;
            ctx.parent = frame.parent;
            if core.options.build_parse_trees {
                if let Some(p) = frame.parent {
                    core.tree.add_child(p, ParseTreeNode::Rule(id));
                }
            }
        }
        core.ctx = frame.parent;
        if let Some(s) = frame.invoking_state {
            core.state = s;
        }
        retctx
    }

    /// [`Parser::exit_rule_with`] for left-recursive rules.
    pub fn exit_recursion_rule_with(
        &mut self,
        frame: &RecursionFrame,
        result: Result<(), ParseError>,
    ) -> Result<Option<RuleContextId>, ParseError> {
        let outcome = self.recover_rule(result);
        let retctx = self.unroll_recursion_contexts(frame);
        outcome.map(|_| retctx)
    }
}
