//! # Lexer driver
//!
//! [`Lexer`] turns a character stream into tokens by repeatedly asking the
//! shared [`LexerAtnSimulator`] for the longest match in the current mode,
//! then applying whatever the winning rule's actions requested:
//!
//! - `skip` drops the match and starts over,
//! - `more` keeps the match as the prefix of the next one,
//! - `mode` / `pushMode` / `popMode` switch the mode used for the next match,
//! - `type` / `channel` override what the emitted token carries.
//!
//! A position matched by no rule is reported to the error listeners as
//! `token recognition error at: '...'` and the offending character is
//! dropped.

pub mod action;

use std::sync::Arc;

use tracing::{trace, warn};

use crate::atn::semantic::{NoPredicates, PredicateEvaluator};
use crate::atn::LexerAtnSimulator;
use crate::error::LexerNoViableAlt;
use crate::listener::{ErrorListener, TracingErrorListener};
use crate::stream::{CharStream, CodePointCharStream, TokenSource};
use crate::token::{CommonTokenFactory, Token, TokenFactory, TokenType, DEFAULT_CHANNEL, EOF, INVALID_TYPE};

pub use action::{LexerAction, LexerActionExecutor, LexerActionTarget};

/// Pseudo token types requested by `skip` and `more`.
const SKIP: TokenType = -3;
const MORE: TokenType = -2;

/// Receives `Custom` actions: `(rule_index, action_index, input_index)`.
pub type CustomActionHandler = Box<dyn FnMut(usize, usize, usize) + Send>;

/// Per-token state mutated by lexer actions.
struct LexerState {
    mode: usize,
    mode_stack: Vec<usize>,
    token_type: TokenType,
    channel: i32,
    predicates: Box<dyn PredicateEvaluator + Send + Sync>,
    custom_actions: Option<CustomActionHandler>,
}

impl LexerActionTarget for LexerState {
    fn skip(&mut self) {
        self.token_type = SKIP;
    }

    fn more(&mut self) {
        self.token_type = MORE;
    }

    fn set_mode(&mut self, mode: usize) {
        self.mode = mode;
    }

    fn push_mode(&mut self, mode: usize) {
        self.mode_stack.push(self.mode);
        self.mode = mode;
    }

    fn pop_mode(&mut self) {
        match self.mode_stack.pop() {
            Some(mode) => self.mode = mode,
            None => warn!(mode = self.mode, "popMode with an empty mode stack"),
        }
    }

    fn set_type(&mut self, token_type: TokenType) {
        self.token_type = token_type;
    }

    fn set_channel(&mut self, channel: i32) {
        self.channel = channel;
    }

    fn custom_action(&mut self, rule_index: usize, action_index: usize, input_index: usize) {
        if let Some(handler) = self.custom_actions.as_mut() {
            handler(rule_index, action_index, input_index);
        }
    }

    fn sempred(&self, rule_index: usize, pred_index: usize) -> bool {
        self.predicates.sempred(rule_index, pred_index)
    }
}

/// A lexer over one input, sharing its DFA cache with every other lexer
/// built from the same simulator.
pub struct Lexer<S: CharStream = CodePointCharStream> {
    sim: Arc<LexerAtnSimulator>,
    input: S,
    state: LexerState,
    name: String,
    factory: Box<dyn TokenFactory>,
    listeners: Vec<Arc<dyn ErrorListener>>,
    errors: Vec<LexerNoViableAlt>,
    /// Line and column of the char at `position_index`.
    line: usize,
    column: usize,
    position_index: usize,
}

impl<S: CharStream> Lexer<S> {
    pub fn new(sim: Arc<LexerAtnSimulator>, input: S) -> Self {
        let position_index = input.index();
        Lexer {
            sim,
            input,
            state: LexerState {
                mode: 0,
                mode_stack: Vec::new(),
                token_type: INVALID_TYPE,
                channel: DEFAULT_CHANNEL,
                predicates: Box::new(NoPredicates),
                custom_actions: None,
            },
            name: "lexer".to_string(),
            factory: Box::new(CommonTokenFactory),
            listeners: vec![Arc::new(TracingErrorListener)],
            errors: Vec::new(),
            line: 1,
            column: 0,
            position_index,
        }
    }

    /// Name passed to error listeners.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_predicates(mut self, predicates: impl PredicateEvaluator + Send + Sync + 'static) -> Self {
        self.state.predicates = Box::new(predicates);
        self
    }

    pub fn with_custom_actions(mut self, handler: impl FnMut(usize, usize, usize) + Send + 'static) -> Self {
        self.state.custom_actions = Some(Box::new(handler));
        self
    }

    pub fn with_token_factory(mut self, factory: impl TokenFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn add_error_listener(&mut self, listener: Arc<dyn ErrorListener>) {
        self.listeners.push(listener);
    }

    pub fn remove_error_listeners(&mut self) {
        self.listeners.clear();
    }

    pub fn mode(&self) -> usize {
        self.state.mode
    }

    pub fn set_mode(&mut self, mode: usize) {
        self.state.set_mode(mode);
    }

    pub fn push_mode(&mut self, mode: usize) {
        self.state.push_mode(mode);
    }

    pub fn pop_mode(&mut self) {
        self.state.pop_mode();
    }

    pub fn input(&self) -> &S {
        &self.input
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn column(&self) -> usize {
        self.column
    }

    /// Recognition errors reported so far.
    pub fn errors(&self) -> &[LexerNoViableAlt] {
        &self.errors
    }

    /// Every remaining token, without the final EOF.
    pub fn all_tokens(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            if token.is_eof() {
                return tokens;
            }
            tokens.push(token);
        }
    }

    fn match_once(&mut self, token_start: usize, line: usize, column: usize) -> TokenType {
        self.state.token_type = INVALID_TYPE;
        let mode = self.state.mode;
        let matched = self.sim.match_token(&mut self.input, mode, &mut self.state);
        let ttype = match matched {
            Ok(ttype) => ttype,
            Err(mut e) => {
                e.text = self.input.text(token_start, self.input.index());
                e.line = line;
                e.column = column;
                self.notify(&e);
                if self.input.la(1) != EOF {
                    self.input.consume();
                }
                self.errors.push(e);
                SKIP
            },
        };
        self.advance_position();
        if self.state.token_type == INVALID_TYPE {
            self.state.token_type = ttype;
        }
        self.state.token_type
    }

    fn notify(&self, e: &LexerNoViableAlt) {
        let message = e.to_string();
        for listener in &self.listeners {
            listener.syntax_error(&self.name, None, e.line, e.column, &message, None);
        }
    }

    /// Bring `line`/`column` up to the current input index.
    fn advance_position(&mut self) {
        let index = self.input.index();
        if index > self.position_index {
            for c in self.input.text(self.position_index, index - 1).chars() {
                if c == '\n' {
                    self.line += 1;
                    self.column = 0;
                } else {
                    self.column += 1;
                }
            }
        }
        self.position_index = index;
    }

    fn emit(&self, token_type: TokenType, start: usize, line: usize, column: usize) -> Token {
        let stop = self.input.index().checked_sub(1).filter(|&s| s >= start);
        let text = stop.map(|s| self.input.text(start, s)).unwrap_or_default();
        let token = self
            .factory
            .create(token_type, Some(text), self.state.channel, Some(start), stop, line, column);
        trace!(lexer = %self.name, %token, "emit");
        token
    }

    fn emit_eof(&self) -> Token {
        let index = self.input.index();
        self.factory.create(
            EOF,
            Some("<EOF>".to_string()),
            DEFAULT_CHANNEL,
            Some(index),
            index.checked_sub(1),
            self.line,
            self.column,
        )
    }
}

impl<S: CharStream> TokenSource for Lexer<S> {
    fn next_token(&mut self) -> Token {
        'token: loop {
            if self.input.la(1) == EOF {
                return self.emit_eof();
            }
            self.state.channel = DEFAULT_CHANNEL;
            let start = self.input.index();
            let (line, column) = (self.line, self.column);
            loop {
                match self.match_once(start, line, column) {
                    SKIP => continue 'token,
                    MORE => {
                        if self.input.la(1) == EOF {
                            // Unterminated `more` prefix: emit what was read.
                            return self.emit(INVALID_TYPE, start, line, column);
                        }
                    },
                    ttype => return self.emit(ttype, start, line, column),
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        self.input.source_name()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::atn::{AtnBuilder, AtnType};
    use crate::interval_set::IntervalSet;
    use crate::listener::CollectingErrorListener;
    use crate::token::HIDDEN_CHANNEL;

    const ID: TokenType = 1;
    const STRING: TokenType = 2;
    const WS: TokenType = 5;
    const IF: TokenType = 6;

    /// ```text
    /// ID : [a-z]+ ;  WS : ' '+ -> channel(HIDDEN) ;  OPEN : '"' -> pushMode(STR), more ;
    /// IF : '#if' -> type(6) ;
    /// mode STR;  STRING : '"' -> popMode ;  TEXT : ~'"' -> more ;
    /// ```
    fn sim() -> Arc<LexerAtnSimulator> {
        let mut b = AtnBuilder::new(AtnType::Lexer, 6);
        let default = b.add_mode();
        let strings = b.add_mode();

        let id = b.add_token_rule(ID);
        let letter = b.range('a' as i32, 'z' as i32);
        let letters = b.plus(vec![letter]);
        b.finish_token_rule(default, id, letters);

        let ws = b.add_token_rule(WS);
        let space = b.char(' ');
        let spaces = b.plus(vec![space]);
        let hidden = b.lexer_action(LexerAction::Channel(HIDDEN_CHANNEL));
        let body = b.seq(vec![spaces, hidden]);
        b.finish_token_rule(default, ws, body);

        let open = b.add_token_rule(3);
        let quote = b.char('"');
        let push = b.lexer_action(LexerAction::PushMode(strings));
        let more = b.lexer_action(LexerAction::More);
        let body = b.seq(vec![quote, push, more]);
        b.finish_token_rule(default, open, body);

        let kw = b.add_token_rule(7);
        let lit = b.literal("#if");
        let retype = b.lexer_action(LexerAction::Type(IF));
        let body = b.seq(vec![lit, retype]);
        b.finish_token_rule(default, kw, body);

        let string = b.add_token_rule(STRING);
        let close = b.char('"');
        let pop = b.lexer_action(LexerAction::PopMode);
        let body = b.seq(vec![close, pop]);
        b.finish_token_rule(strings, string, body);

        let text = b.add_token_rule(4);
        let other = b.not_set(IntervalSet::of('"' as i32));
        let more = b.lexer_action(LexerAction::More);
        let body = b.seq(vec![other, more]);
        b.finish_token_rule(strings, text, body);

        Arc::new(LexerAtnSimulator::new(Arc::new(b.build())))
    }

    fn lex(input: &str) -> (Vec<Token>, CollectingErrorListener) {
        let listener = CollectingErrorListener::new();
        let mut lexer = Lexer::new(sim(), CodePointCharStream::new(input));
        lexer.remove_error_listeners();
        lexer.add_error_listener(Arc::new(listener.clone()));
        (lexer.all_tokens(), listener)
    }

    #[test]
    fn test_modes_and_more_build_one_token() {
        let (tokens, _) = lex("ab \"x y\"");
        let kinds: Vec<_> = tokens.iter().map(|t| (t.token_type, t.text().to_string())).collect();
        assert_eq!(
            kinds,
            vec![(ID, "ab".to_string()), (WS, " ".to_string()), (STRING, "\"x y\"".to_string())]
        );
        assert_eq!(tokens[1].channel, HIDDEN_CHANNEL);
        assert_eq!(tokens[2].column, 3);
    }

    #[test]
    fn test_type_action_overrides_rule_type() {
        let (tokens, _) = lex("#if");
        assert_eq!(tokens[0].token_type, IF);
    }

    #[test]
    fn test_recognition_error_drops_one_char() {
        let (tokens, listener) = lex("a\n%b");
        assert_eq!(tokens.iter().map(|t| t.text()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(listener.messages(), vec!["token recognition error at: '\\n'".to_string(), "token recognition error at: '%'".to_string()]);
        let errors = listener.errors();
        assert_eq!((errors[1].line, errors[1].column), (2, 0));
        assert_eq!((tokens[1].line, tokens[1].column), (2, 1));
    }

    #[test]
    fn test_custom_actions_see_anchored_positions() {
        let mut b = AtnBuilder::new(AtnType::Lexer, 1);
        let mode = b.add_mode();
        let num = b.add_token_rule(1);
        let before = b.lexer_action(LexerAction::Custom { rule_index: 0, action_index: 0 });
        let digit = b.range('0' as i32, '9' as i32);
        let digits = b.plus(vec![digit]);
        let after = b.lexer_action(LexerAction::Custom { rule_index: 0, action_index: 1 });
        let body = b.seq(vec![before, digits, after]);
        b.finish_token_rule(mode, num, body);
        let sim = Arc::new(LexerAtnSimulator::new(Arc::new(b.build())));

        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = calls.clone();
        let mut lexer = Lexer::new(sim, CodePointCharStream::new("123"))
            .with_custom_actions(move |_rule, action, index| sink.lock().unwrap().push((action, index)));
        let token = lexer.next_token();
        assert_eq!(token.text(), "123");
        assert_eq!(*calls.lock().unwrap(), vec![(0, 0), (1, 3)]);
        assert!(lexer.next_token().is_eof());
    }
}
