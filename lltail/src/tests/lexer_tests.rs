//! Lexer and parser working together over a [`CommonTokenStream`].

use std::sync::Arc;

use super::grammars::statements::{self, Statements};
use crate::atn::{AtnBuilder, AtnType, LexerAtnSimulator, PredicateEvaluator};
use crate::interval_set::IntervalSet;
use crate::lexer::{Lexer, LexerAction};
use crate::listener::CollectingErrorListener;
use crate::parser::Parser;
use crate::stream::{CodePointCharStream, CommonTokenStream};
use crate::token::{TokenType, DEFAULT_CHANNEL, HIDDEN_CHANNEL};

const WS: TokenType = 8;
const COMMENT: TokenType = 9;

/// ```text
/// ID : [a-z]+ ;  ASSIGN : '=' ;  INT : [0-9]+ ;  SEMI : ';' ;
/// LPAREN : '(' ;  RPAREN : ')' ;
/// WS : [ \t\r\n]+ -> skip ;  COMMENT : '#' ~'\n'* -> channel(HIDDEN) ;
/// ```
pub(super) fn statement_lexer() -> Arc<LexerAtnSimulator> {
    let mut b = AtnBuilder::new(AtnType::Lexer, COMMENT);
    let mode = b.add_mode();

    let id = b.add_token_rule(statements::ID);
    let letter = b.range('a' as i32, 'z' as i32);
    let letters = b.plus(vec![letter]);
    b.finish_token_rule(mode, id, letters);

    for (token_type, c) in [
        (statements::ASSIGN, '='),
        (statements::SEMI, ';'),
        (statements::LPAREN, '('),
        (statements::RPAREN, ')'),
    ] {
        let rule = b.add_token_rule(token_type);
        let body = b.char(c);
        b.finish_token_rule(mode, rule, body);
    }

    let int = b.add_token_rule(statements::INT);
    let digit = b.range('0' as i32, '9' as i32);
    let digits = b.plus(vec![digit]);
    b.finish_token_rule(mode, int, digits);

    let ws = b.add_token_rule(WS);
    let mut blanks = IntervalSet::new();
    for c in [' ', '\t', '\r', '\n'] {
        blanks.add(c as i32);
    }
    let blank = b.set(blanks);
    let run = b.plus(vec![blank]);
    let skip = b.lexer_action(LexerAction::Skip);
    let body = b.seq(vec![run, skip]);
    b.finish_token_rule(mode, ws, body);

    let comment = b.add_token_rule(COMMENT);
    let hash = b.char('#');
    let rest = b.not_set(IntervalSet::of('\n' as i32));
    let tail = b.star(vec![rest]);
    let hidden = b.lexer_action(LexerAction::Channel(HIDDEN_CHANNEL));
    let body = b.seq(vec![hash, tail, hidden]);
    b.finish_token_rule(mode, comment, body);

    Arc::new(LexerAtnSimulator::new(Arc::new(b.build())))
}

fn lex(sim: &Arc<LexerAtnSimulator>, input: &str) -> (CommonTokenStream, CollectingErrorListener) {
    let listener = CollectingErrorListener::new();
    let mut lexer = Lexer::new(sim.clone(), CodePointCharStream::new(input));
    lexer.remove_error_listeners();
    lexer.add_error_listener(Arc::new(listener.clone()));
    (CommonTokenStream::new(&mut lexer), listener)
}

fn parse(grammar: &Statements, input: CommonTokenStream) -> (String, CollectingErrorListener) {
    let listener = CollectingErrorListener::new();
    let mut p = Parser::new(grammar.sim.clone(), input)
        .with_vocabulary(statements::vocabulary())
        .with_rule_names(statements::RULE_NAMES);
    p.remove_error_listeners();
    p.add_error_listener(Arc::new(listener.clone()));
    let tree = match grammar.prog(&mut p) {
        Ok(root) => p.tree().to_string_tree(root, statements::RULE_NAMES),
        Err(e) => format!("cancelled: {}", e),
    };
    (tree, listener)
}

#[test]
fn test_lexed_input_parses_cleanly() {
    let sim = statement_lexer();
    let (stream, lex_errors) = lex(&sim, "x = 10;\n(2);");
    assert!(lex_errors.errors().is_empty());

    let second_stat = &stream.tokens()[4];
    assert_eq!(second_stat.text(), "(");
    assert_eq!((second_stat.line, second_stat.column), (2, 0));

    let (tree, parse_errors) = parse(&Statements::new(), stream);
    assert_eq!(tree, "(prog (stat x = 10 ;) (stat ( 2 ) ;) <EOF>)");
    assert!(parse_errors.errors().is_empty());
}

#[test]
fn test_hidden_comments_stay_in_buffer_but_not_in_tree() {
    let sim = statement_lexer();
    let (stream, _) = lex(&sim, "x = 1; # keep me\ny = 2;");
    let comment = stream
        .tokens()
        .iter()
        .find(|t| t.token_type == COMMENT)
        .expect("comment token");
    assert_eq!(comment.text(), "# keep me");
    assert_eq!(comment.channel, HIDDEN_CHANNEL);
    assert!(stream
        .tokens()
        .iter()
        .filter(|t| t.token_type != COMMENT)
        .all(|t| t.channel == DEFAULT_CHANNEL));

    let (tree, parse_errors) = parse(&Statements::new(), stream);
    assert_eq!(tree, "(prog (stat x = 1 ;) (stat y = 2 ;) <EOF>)");
    assert!(parse_errors.errors().is_empty());
}

#[test]
fn test_lexer_errors_do_not_reach_the_parser() {
    let sim = statement_lexer();
    let (stream, lex_errors) = lex(&sim, "x = 1 $;");
    assert_eq!(lex_errors.messages(), vec!["token recognition error at: '$'".to_string()]);
    assert_eq!((lex_errors.errors()[0].line, lex_errors.errors()[0].column), (1, 6));

    let (tree, parse_errors) = parse(&Statements::new(), stream);
    assert_eq!(tree, "(prog (stat x = 1 ;) <EOF>)");
    assert!(parse_errors.errors().is_empty());
}

#[test]
fn test_lexers_share_one_dfa_cache() {
    let sim = statement_lexer();
    let (first, _) = lex(&sim, "abc = 12;");
    let cached = sim.dfa(0).expect("default mode").len();
    assert!(cached > 1);

    let (second, _) = lex(&sim, "abc = 12;");
    let texts = |s: &CommonTokenStream| s.tokens().iter().map(|t| t.text().to_string()).collect::<Vec<_>>();
    assert_eq!(texts(&first), texts(&second));
    assert_eq!(sim.dfa(0).expect("default mode").len(), cached);
}

struct Flag(bool);

impl PredicateEvaluator for Flag {
    fn sempred(&self, _rule_index: usize, _pred_index: usize) -> bool {
        self.0
    }

    fn precpred(&self, _precedence: i32) -> bool {
        true
    }
}

/// `ENUM : 'enum' {enum_is_keyword}? ;  ID : [a-z]+ ;  WS : ' '+ -> skip ;`
fn keyword_lexer() -> Arc<LexerAtnSimulator> {
    let mut b = AtnBuilder::new(AtnType::Lexer, 3);
    let mode = b.add_mode();

    let kw = b.add_token_rule(1);
    let text = b.literal("enum");
    let pred = b.predicate(0, false);
    let body = b.seq(vec![text, pred]);
    b.finish_token_rule(mode, kw, body);

    let id = b.add_token_rule(2);
    let letter = b.range('a' as i32, 'z' as i32);
    let letters = b.plus(vec![letter]);
    b.finish_token_rule(mode, id, letters);

    let ws = b.add_token_rule(3);
    let space = b.char(' ');
    let spaces = b.plus(vec![space]);
    let skip = b.lexer_action(LexerAction::Skip);
    let body = b.seq(vec![spaces, skip]);
    b.finish_token_rule(mode, ws, body);

    Arc::new(LexerAtnSimulator::new(Arc::new(b.build())))
}

#[test]
fn test_lexer_predicate_gates_a_keyword() {
    let sim = keyword_lexer();
    let kinds = |keyword: bool| {
        let mut lexer = Lexer::new(sim.clone(), CodePointCharStream::new("enum enumx")).with_predicates(Flag(keyword));
        lexer.all_tokens().iter().map(|t| t.token_type).collect::<Vec<_>>()
    };
    assert_eq!(kinds(true), vec![1, 2]);
    assert_eq!(kinds(false), vec![2, 2]);
}
