//! # Error recovery
//!
//! A parser hands every recognition failure to its [`ErrorStrategy`]. The
//! default strategy is a two-state machine:
//!
//! ```text
//!            report_error / extraneous / missing
//!   normal ─────────────────────────────────────▶ recovering
//!     ▲                                               │
//!     └────────────── report_match ───────────────────┘
//! ```
//!
//! While recovering, further errors are not reported. Recovery proper comes
//! in three sizes:
//!
//! - `recover_inline` repairs a single expected token: delete one spurious
//!   token, or conjure the missing one;
//! - `sync` runs at loop and sub-rule boundaries and resynchronizes inside
//!   the construct when it can;
//! - `recover` consumes tokens until one that can follow some rule on the
//!   invocation stack.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::atn::{Atn, AtnStateType, PredictionContext, StateId};
use crate::error::{escape_ws, ParseCancelled, ParseError, RecognitionError};
use crate::interval_set::IntervalSet;
use crate::stream::{current_type, IntStream, TokenStream};
use crate::token::{Token, TokenFactory, TokenType, DEFAULT_CHANNEL, EOF, EPSILON, INVALID_TYPE};
use crate::vocabulary::Vocabulary;

// ══════════════════════════════════════════════════════════════════════════════
// Recognizer
// ══════════════════════════════════════════════════════════════════════════════

/// What an error strategy may see and do on the parser it repairs.
pub trait Recognizer {
    /// Name passed to error listeners.
    fn name(&self) -> &str;

    fn atn(&self) -> &Atn;

    /// ATN state the parser is in.
    fn state(&self) -> StateId;

    fn token_stream(&self) -> &dyn TokenStream;

    /// Consume the current token and attach it to the current rule context,
    /// as an error leaf when `as_error` is set. At EOF the token is attached
    /// but the stream does not move.
    fn consume(&mut self, as_error: bool) -> Token;

    /// Invoking state of each enclosing rule context, innermost first.
    fn invoking_states(&self) -> Vec<StateId>;

    fn vocabulary(&self) -> &Vocabulary;

    fn rule_names(&self) -> &[String];

    fn token_factory(&self) -> &dyn TokenFactory;

    fn notify_error_listeners(&mut self, message: &str, offending: Option<&Token>, error: Option<&RecognitionError>);

    /// `LT(1)`. Streams always end in EOF, so an exhausted stream yields a
    /// fresh EOF token.
    fn current_token(&self) -> Token {
        self.token_stream().lt(1).cloned().unwrap_or_else(|| Token::eof(0, 0))
    }

    /// Tokens acceptable at the current state, looking into the callers
    /// whenever the current rule can end.
    fn expected_tokens(&self) -> IntervalSet {
        self.atn().expected_tokens(self.state(), &self.invoking_states())
    }

    fn is_expected_token(&self, symbol: TokenType) -> bool {
        let following = self.atn().next_tokens(self.state());
        if following.contains(symbol) {
            return true;
        }
        if !following.contains(EPSILON) {
            return false;
        }
        self.expected_tokens().contains(symbol)
    }
}

/// The error an inline match raises when no repair applies.
pub fn input_mismatch(recognizer: &dyn Recognizer) -> RecognitionError {
    RecognitionError::InputMismatch {
        offending_token: recognizer.current_token(),
        state: recognizer.state(),
        expected: recognizer.expected_tokens(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// ErrorStrategy
// ══════════════════════════════════════════════════════════════════════════════

/// How a parser reports and recovers from syntax errors.
///
/// Each parser owns its strategy, so recovery state never leaks between
/// parses that share an ATN.
pub trait ErrorStrategy: Send {
    /// Forget any error condition; called when a parse (re)starts.
    fn reset(&mut self);

    /// Repair a failed single-token match and return the token that stands
    /// in for the expected one.
    fn recover_inline(&mut self, recognizer: &mut dyn Recognizer) -> Result<Token, ParseError>;

    /// Resynchronize after `error` escaped a rule.
    fn recover(&mut self, recognizer: &mut dyn Recognizer, error: &RecognitionError) -> Result<(), ParseError>;

    /// Check the lookahead at a loop or sub-rule boundary, before it is
    /// predicted.
    fn sync(&mut self, recognizer: &mut dyn Recognizer) -> Result<(), ParseError>;

    fn in_error_recovery_mode(&self) -> bool;

    /// A token matched successfully.
    fn report_match(&mut self);

    fn report_error(&mut self, recognizer: &mut dyn Recognizer, error: &RecognitionError);
}

// ══════════════════════════════════════════════════════════════════════════════
// DefaultErrorStrategy
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct DefaultErrorStrategy {
    error_recovery_mode: bool,
    /// Input index of the last `recover`.
    last_error_index: Option<usize>,
    /// States `recover` ran in at `last_error_index`.
    last_error_states: FxHashSet<StateId>,
}

impl DefaultErrorStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_error_index(&self) -> Option<usize> {
        self.last_error_index
    }

    pub fn last_error_states(&self) -> &FxHashSet<StateId> {
        &self.last_error_states
    }

    fn begin_error_condition(&mut self) {
        self.error_recovery_mode = true;
    }

    fn end_error_condition(&mut self) {
        self.error_recovery_mode = false;
        self.last_error_index = None;
        self.last_error_states.clear();
    }

    /// Union of what can follow each rule invocation on the stack.
    pub fn error_recovery_set(&self, recognizer: &dyn Recognizer) -> IntervalSet {
        let atn = recognizer.atn();
        let mut set = IntervalSet::new();
        for invoking in recognizer.invoking_states() {
            if let Some(follow) = atn.follow_state_of(invoking) {
                set.add_all(atn.next_tokens(follow));
            }
        }
        set.remove(EPSILON);
        set
    }

    fn consume_until(&self, recognizer: &mut dyn Recognizer, set: &IntervalSet) {
        let mut ttype = current_type(recognizer.token_stream());
        while ttype != EOF && !set.contains(ttype) {
            let token = recognizer.consume(self.error_recovery_mode);
            debug!(token = %token, "recovery consumed");
            ttype = current_type(recognizer.token_stream());
        }
    }

    /// If `LT(2)` is what we expect, drop `LT(1)` as extraneous and return
    /// the token that now matches.
    fn single_token_deletion(&mut self, recognizer: &mut dyn Recognizer) -> Option<Token> {
        let next = recognizer.token_stream().la(2);
        if !recognizer.expected_tokens().contains(next) {
            return None;
        }
        self.report_unwanted_token(recognizer);
        recognizer.consume(self.error_recovery_mode);
        let matched = recognizer.current_token();
        self.report_match();
        Some(matched)
    }

    /// If `LT(1)` is what could follow the expected token, report that
    /// token as missing.
    fn single_token_insertion(&mut self, recognizer: &mut dyn Recognizer) -> bool {
        let current = current_type(recognizer.token_stream());
        let atn = recognizer.atn();
        let Some(next) = atn.state(recognizer.state()).transitions.first().map(|t| t.target()) else {
            return false;
        };
        let ctx = PredictionContext::from_invoking_states(atn, &recognizer.invoking_states());
        if !atn.next_tokens_in_context(next, &ctx).contains(current) {
            return false;
        }
        self.report_missing_token(recognizer);
        true
    }

    /// Placeholder for the expected token, positioned at the last real
    /// token before the error (or the current one at the start of input).
    fn missing_symbol(&self, recognizer: &dyn Recognizer) -> Token {
        let expected = recognizer.expected_tokens().min_element().unwrap_or(INVALID_TYPE);
        let text = if expected == EOF {
            "<missing EOF>".to_string()
        } else {
            format!("<missing {}>", recognizer.vocabulary().display_name(expected))
        };
        let stream = recognizer.token_stream();
        let anchor = stream.lt(-1).cloned().unwrap_or_else(|| recognizer.current_token());
        recognizer
            .token_factory()
            .create(expected, Some(text), DEFAULT_CHANNEL, None, None, anchor.line, anchor.column)
    }

    fn report_unwanted_token(&mut self, recognizer: &mut dyn Recognizer) {
        if self.error_recovery_mode {
            return;
        }
        self.begin_error_condition();
        let token = recognizer.current_token();
        let expecting = recognizer.expected_tokens().to_string_with(recognizer.vocabulary());
        let message = format!("extraneous input {} expecting {}", token_error_display(&token), expecting);
        recognizer.notify_error_listeners(&message, Some(&token), None);
    }

    fn report_missing_token(&mut self, recognizer: &mut dyn Recognizer) {
        if self.error_recovery_mode {
            return;
        }
        self.begin_error_condition();
        let token = recognizer.current_token();
        let expecting = recognizer.expected_tokens().to_string_with(recognizer.vocabulary());
        let message = format!("missing {} at {}", expecting, token_error_display(&token));
        recognizer.notify_error_listeners(&message, Some(&token), None);
    }

    fn error_message(&self, recognizer: &dyn Recognizer, error: &RecognitionError) -> String {
        match error {
            RecognitionError::NoViableAlt { start_token, offending_token, .. } => {
                let input = if start_token.is_eof() {
                    "<EOF>".to_string()
                } else {
                    recognizer.token_stream().text_between(start_token, offending_token)
                };
                format!("no viable alternative at input {}", quote(&input))
            },
            RecognitionError::InputMismatch { offending_token, expected, .. } => format!(
                "mismatched input {} expecting {}",
                token_error_display(offending_token),
                expected.to_string_with(recognizer.vocabulary())
            ),
            RecognitionError::FailedPredicate { rule_index, message, .. } => {
                let rule = recognizer
                    .rule_names()
                    .get(*rule_index)
                    .cloned()
                    .unwrap_or_else(|| rule_index.to_string());
                format!("rule {} {}", rule, message)
            },
        }
    }
}

impl ErrorStrategy for DefaultErrorStrategy {
    fn reset(&mut self) {
        self.end_error_condition();
    }

    fn recover_inline(&mut self, recognizer: &mut dyn Recognizer) -> Result<Token, ParseError> {
        if let Some(matched) = self.single_token_deletion(recognizer) {
            // Move past the token we were after, as if all were well.
            recognizer.consume(self.error_recovery_mode);
            return Ok(matched);
        }
        if self.single_token_insertion(recognizer) {
            return Ok(self.missing_symbol(recognizer));
        }
        Err(input_mismatch(recognizer).into())
    }

    fn recover(&mut self, recognizer: &mut dyn Recognizer, _error: &RecognitionError) -> Result<(), ParseError> {
        let index = recognizer.token_stream().index();
        if self.last_error_index == Some(index) && self.last_error_states.contains(&recognizer.state()) {
            // Same token, same state: the lookahead is in the recovery set
            // and nothing would be consumed. Force one token of progress.
            let token = recognizer.consume(self.error_recovery_mode);
            debug!(token = %token, state = recognizer.state(), "fail-safe consume");
        }
        self.last_error_index = Some(recognizer.token_stream().index());
        self.last_error_states.insert(recognizer.state());
        let follow = self.error_recovery_set(recognizer);
        self.consume_until(recognizer, &follow);
        Ok(())
    }

    fn sync(&mut self, recognizer: &mut dyn Recognizer) -> Result<(), ParseError> {
        if self.error_recovery_mode {
            return Ok(());
        }
        let la = current_type(recognizer.token_stream());
        let state = recognizer.atn().state(recognizer.state());
        let state_type = state.state_type;
        if recognizer.atn().next_tokens(state.id).contains(la) || la == EOF {
            return Ok(());
        }
        // Stay in normal mode: only a real match ends recovery.
        if recognizer.is_expected_token(la) {
            return Ok(());
        }
        match state_type {
            AtnStateType::BlockStart
            | AtnStateType::StarBlockStart
            | AtnStateType::PlusBlockStart
            | AtnStateType::StarLoopEntry => {
                if self.single_token_deletion(recognizer).is_some() {
                    return Ok(());
                }
                Err(input_mismatch(recognizer).into())
            },
            AtnStateType::PlusLoopBack | AtnStateType::StarLoopBack => {
                self.report_unwanted_token(recognizer);
                let mut resync = recognizer.expected_tokens();
                resync.add_all(&self.error_recovery_set(recognizer));
                self.consume_until(recognizer, &resync);
                Ok(())
            },
            _ => Ok(()),
        }
    }

    fn in_error_recovery_mode(&self) -> bool {
        self.error_recovery_mode
    }

    fn report_match(&mut self) {
        self.end_error_condition();
    }

    fn report_error(&mut self, recognizer: &mut dyn Recognizer, error: &RecognitionError) {
        if self.error_recovery_mode {
            return;
        }
        self.begin_error_condition();
        let message = self.error_message(recognizer, error);
        recognizer.notify_error_listeners(&message, Some(error.offending_token()), Some(error));
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// BailErrorStrategy
// ══════════════════════════════════════════════════════════════════════════════

/// Gives up on the first syntax error: the parse unwinds with
/// [`ParseCancelled`] instead of recovering. Useful as the fast first pass
/// of a two-stage parse.
#[derive(Debug, Clone, Default)]
pub struct BailErrorStrategy {
    reporter: DefaultErrorStrategy,
}

impl BailErrorStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorStrategy for BailErrorStrategy {
    fn reset(&mut self) {
        self.reporter.reset();
    }

    fn recover_inline(&mut self, recognizer: &mut dyn Recognizer) -> Result<Token, ParseError> {
        Err(ParseCancelled { cause: input_mismatch(recognizer) }.into())
    }

    fn recover(&mut self, _recognizer: &mut dyn Recognizer, error: &RecognitionError) -> Result<(), ParseError> {
        Err(ParseCancelled { cause: error.clone() }.into())
    }

    fn sync(&mut self, _recognizer: &mut dyn Recognizer) -> Result<(), ParseError> {
        Ok(())
    }

    fn in_error_recovery_mode(&self) -> bool {
        self.reporter.in_error_recovery_mode()
    }

    fn report_match(&mut self) {
        self.reporter.report_match();
    }

    fn report_error(&mut self, recognizer: &mut dyn Recognizer, error: &RecognitionError) {
        self.reporter.report_error(recognizer, error);
    }
}

/// `'text'` for a token in a diagnostic, falling back to `<EOF>` or
/// `<type>` when the token has no text.
pub(crate) fn token_error_display(token: &Token) -> String {
    match token.text.as_deref().filter(|t| !t.is_empty()) {
        Some(text) => quote(text),
        None if token.is_eof() => quote("<EOF>"),
        None => quote(&format!("<{}>", token.token_type)),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", escape_ws(s))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::atn::{AtnBuilder, AtnType};
    use crate::stream::CommonTokenStream;
    use crate::token::CommonTokenFactory;

    const ID: TokenType = 1;
    const SEMI: TokenType = 2;
    const INT: TokenType = 3;

    /// `s : ID ';' ;` and its caller `r : s INT ;`, driven by hand.
    struct Harness {
        atn: Arc<Atn>,
        input: CommonTokenStream,
        state: StateId,
        /// The `s` invocation inside `r`.
        call_s: StateId,
        invoking: Vec<StateId>,
        vocabulary: Vocabulary,
        rule_names: Vec<String>,
        consumed: Vec<(Token, bool)>,
        messages: Vec<String>,
    }

    impl Harness {
        fn new(tokens: Vec<Token>) -> (Self, StateId, StateId) {
            let mut b = AtnBuilder::new(AtnType::Parser, 3);
            let s = b.add_rule(false);
            let id = b.atom(ID);
            let semi = b.atom(SEMI);
            let (id_state, semi_state) = (id.entry, semi.entry);
            let body = b.seq(vec![id, semi]);
            b.finish_rule(s, body);
            let r = b.add_rule(false);
            let call = b.rule_ref(s, 0);
            let call_s = call.entry;
            let int = b.atom(INT);
            let body = b.seq(vec![call, int]);
            b.finish_rule(r, body);
            let harness = Harness {
                atn: Arc::new(b.build()),
                input: CommonTokenStream::from_tokens(tokens),
                state: id_state,
                call_s,
                invoking: Vec::new(),
                vocabulary: Vocabulary::from_pairs(&[
                    (None, Some("ID")),
                    (Some("';'"), Some("SEMI")),
                    (None, Some("INT")),
                ]),
                rule_names: vec!["s".to_string(), "r".to_string()],
                consumed: Vec::new(),
                messages: Vec::new(),
            };
            (harness, id_state, semi_state)
        }
    }

    impl Recognizer for Harness {
        fn name(&self) -> &str {
            "harness"
        }
        fn atn(&self) -> &Atn {
            &self.atn
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
            self.consumed.push((token.clone(), as_error));
            token
        }
        fn invoking_states(&self) -> Vec<StateId> {
            self.invoking.clone()
        }
        fn vocabulary(&self) -> &Vocabulary {
            &self.vocabulary
        }
        fn rule_names(&self) -> &[String] {
            &self.rule_names
        }
        fn token_factory(&self) -> &dyn TokenFactory {
            &CommonTokenFactory
        }
        fn notify_error_listeners(&mut self, message: &str, _offending: Option<&Token>, _error: Option<&RecognitionError>) {
            self.messages.push(message.to_string());
        }
    }

    fn tok(ttype: TokenType, text: &str, column: usize) -> Token {
        Token::new(ttype, text).with_position(1, column)
    }

    #[test]
    fn test_single_token_deletion() {
        let (mut h, _, semi_state) = Harness::new(vec![tok(ID, "x", 0), tok(INT, "9", 2), tok(SEMI, ";", 4)]);
        h.input.consume();
        h.state = semi_state;
        let mut strategy = DefaultErrorStrategy::new();
        let t = strategy.recover_inline(&mut h).unwrap();
        assert_eq!(t.token_type, SEMI);
        assert_eq!(h.messages, vec!["extraneous input '9' expecting ';'"]);
        // The extra token became an error leaf; the match a plain terminal.
        assert_eq!(h.consumed.iter().map(|(t, e)| (t.token_type, *e)).collect::<Vec<_>>(), vec![(INT, true), (SEMI, false)]);
        assert!(!strategy.in_error_recovery_mode());
    }

    #[test]
    fn test_single_token_insertion_at_eof() {
        let (mut h, _, semi_state) = Harness::new(vec![tok(ID, "abc", 3)]);
        h.input.consume();
        h.state = semi_state;
        let mut strategy = DefaultErrorStrategy::new();
        let t = strategy.recover_inline(&mut h).unwrap();
        assert_eq!(t.token_type, SEMI);
        assert_eq!(t.text(), "<missing ';'>");
        assert!(t.is_synthetic());
        assert_eq!((t.line, t.column), (1, 3));
        assert_eq!(h.messages, vec!["missing ';' at '<EOF>'"]);
        assert!(h.consumed.is_empty());
        assert!(strategy.in_error_recovery_mode());
    }

    #[test]
    fn test_unrecoverable_mismatch() {
        let (mut h, id_state, _) = Harness::new(vec![tok(INT, "1", 0), tok(INT, "2", 2)]);
        h.state = id_state;
        let mut strategy = DefaultErrorStrategy::new();
        let err = strategy.recover_inline(&mut h).unwrap_err();
        let ParseError::Recognition(e) = err else {
            panic!("expected a recognition error");
        };
        strategy.report_error(&mut h, &e);
        assert_eq!(h.messages, vec!["mismatched input '1' expecting ID"]);
    }

    #[test]
    fn test_reports_suppressed_while_recovering() {
        let (mut h, id_state, _) = Harness::new(vec![tok(INT, "1", 0)]);
        h.state = id_state;
        let mut strategy = DefaultErrorStrategy::new();
        let e = input_mismatch(&h);
        strategy.report_error(&mut h, &e);
        strategy.report_error(&mut h, &e);
        assert_eq!(h.messages.len(), 1);
        strategy.report_match();
        strategy.report_error(&mut h, &e);
        assert_eq!(h.messages.len(), 2);
    }

    #[test]
    fn test_recover_runs_to_eof_without_callers() {
        let (mut h, id_state, _) = Harness::new(vec![tok(INT, "1", 0), tok(INT, "2", 2)]);
        h.state = id_state;
        let mut strategy = DefaultErrorStrategy::new();
        let e = input_mismatch(&h);
        strategy.report_error(&mut h, &e);
        strategy.recover(&mut h, &e).unwrap();
        assert_eq!(h.input.la(1), EOF);
        assert_eq!(h.consumed.len(), 2);
        assert_eq!(strategy.last_error_index(), Some(0));
    }

    #[test]
    fn test_recover_forces_progress_on_repeat() {
        // Inside `r`, INT follows `s`: the lookahead is already a resync point.
        let (mut h, id_state, _) = Harness::new(vec![tok(INT, "1", 0), tok(INT, "2", 2), tok(SEMI, ";", 4)]);
        h.state = id_state;
        h.invoking = vec![h.call_s];
        let mut strategy = DefaultErrorStrategy::new();
        let e = input_mismatch(&h);
        strategy.report_error(&mut h, &e);

        strategy.recover(&mut h, &e).unwrap();
        assert!(h.consumed.is_empty());
        assert_eq!(h.input.index(), 0);
        assert_eq!(strategy.last_error_index(), Some(0));
        assert!(strategy.last_error_states().contains(&id_state));

        // Same index, same state: exactly one token is dropped.
        strategy.recover(&mut h, &e).unwrap();
        assert_eq!(h.consumed.iter().map(|(t, as_error)| (t.text(), *as_error)).collect::<Vec<_>>(), vec![("1", true)]);
        assert_eq!(h.input.index(), 1);
        assert_eq!(strategy.last_error_index(), Some(1));

        strategy.report_match();
        assert_eq!(strategy.last_error_index(), None);
        assert!(strategy.last_error_states().is_empty());
        assert!(!strategy.in_error_recovery_mode());
    }

    #[test]
    fn test_bail_cancels() {
        let (mut h, id_state, _) = Harness::new(vec![tok(INT, "1", 0)]);
        h.state = id_state;
        let mut strategy = BailErrorStrategy::new();
        assert!(matches!(strategy.recover_inline(&mut h), Err(ParseError::Cancelled(_))));
        let e = input_mismatch(&h);
        assert!(matches!(strategy.recover(&mut h, &e), Err(ParseError::Cancelled(c)) if c.cause == e));
    }

    #[test]
    fn test_token_error_display() {
        assert_eq!(token_error_display(&tok(ID, "a\tb", 0)), "'a\\tb'");
        assert_eq!(token_error_display(&Token::eof(1, 0)), "'<EOF>'");
        let mut t = tok(7, "", 0);
        t.text = None;
        assert_eq!(token_error_display(&t), "'<7>'");
    }
}
