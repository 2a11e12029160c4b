//! End-to-end error recovery through generated-style rule functions.
//!
//! Covers:
//! - one report per failure, with follow-set resync across rule boundaries
//! - single-token deletion and insertion inside `match`
//! - loop-back resync in a `*` loop
//! - every parse terminating at EOF, whatever the input
//! - the bail strategy cancelling on the first error

use proptest::prelude::*;

use super::grammars::{bracket, parser, statements, tokens};
use crate::error::{ParseError, RecognitionError};
use crate::strategy::BailErrorStrategy;
use crate::stream::IntStream;
use crate::token::EOF;
use crate::tree::ParseTreeNode;

#[test]
fn test_missing_operand_reports_once_and_resyncs_on_follow() {
    use bracket::*;
    let g = Bracket::new();
    let (mut p, listener) = parser(&g.sim, tokens(&[(LBRACK, "["), (RBRACK, "]")]), vocabulary(), RULE_NAMES);
    let root = g.a(&mut p).expect("default strategy never cancels");

    // `c` fails on `]`, then `b` fails to match `^`; only the first is heard.
    assert_eq!(listener.messages(), vec!["mismatched input ']' expecting {ID, INT}".to_string()]);
    let errors = listener.errors();
    assert_eq!((errors[0].line, errors[0].column), (1, 2));
    assert_eq!(p.number_of_syntax_errors(), 1);

    // Nothing was consumed during recovery: `]` is in the follow set of
    // both `c` and `b`, and `a` matches it.
    assert_eq!(p.tree().to_string_tree(root, RULE_NAMES), "(a [ (b c) ])");
    assert_eq!(p.input().la(1), EOF);
    assert!(!p.in_error_recovery_mode());

    let b = p.tree().rule_context(root, RULE_B, 0).expect("b context");
    let c = p.tree().rule_context(b, RULE_C, 0).expect("c context");
    assert!(matches!(p.tree().get(c).exception, Some(RecognitionError::InputMismatch { .. })));
    assert!(matches!(p.tree().get(b).exception, Some(RecognitionError::InputMismatch { .. })));
    assert!(p.tree().get(root).exception.is_none());
    assert!(p.tree().has_errors(root));
}

#[test]
fn test_extraneous_token_is_deleted() {
    use statements::*;
    let g = Statements::new();
    let input = tokens(&[(ID, "x"), (ASSIGN, "="), (EXTRA, "?"), (INT, "1"), (SEMI, ";")]);
    let (mut p, listener) = parser(&g.sim, input, vocabulary(), RULE_NAMES);
    let root = g.prog(&mut p).expect("default strategy never cancels");

    assert_eq!(listener.messages(), vec!["extraneous input '?' expecting INT".to_string()]);
    assert_eq!(p.tree().to_string_tree(root, RULE_NAMES), "(prog (stat x = ? 1 ;) <EOF>)");
    let stat = p.tree().rule_context(root, RULE_STAT, 0).expect("stat context");
    let children = p.tree().get(stat).children();
    assert!(children[2].is_error());
    assert!(!children[3].is_error());
    assert!(p.tree().get(stat).exception.is_none());
}

#[test]
fn test_missing_token_is_conjured_at_previous_token() {
    use statements::*;
    let g = Statements::new();
    let input = tokens(&[(LPAREN, "("), (INT, "1"), (SEMI, ";")]);
    let (mut p, listener) = parser(&g.sim, input, vocabulary(), RULE_NAMES);
    let root = g.prog(&mut p).expect("default strategy never cancels");

    assert_eq!(listener.messages(), vec!["missing ')' at ';'".to_string()]);
    let stat = p.tree().rule_context(root, RULE_STAT, 0).expect("stat context");
    assert_eq!(p.tree().text(stat), "(1<missing ')'>;");

    let ParseTreeNode::Error(missing) = &p.tree().get(stat).children()[2] else {
        panic!("expected an error leaf for the conjured token");
    };
    assert_eq!(missing.token_type, RPAREN);
    assert!(missing.is_synthetic());
    // Anchored at `1`, the last token before the error.
    assert_eq!((missing.line, missing.column), (1, 2));
    // `;` was matched normally after the repair.
    assert!(!p.tree().get(stat).children()[3].is_error());
}

#[test]
fn test_missing_token_at_end_of_input() {
    use statements::*;
    let g = Statements::new();
    let input = tokens(&[(ID, "x"), (ASSIGN, "="), (INT, "42")]);
    let (mut p, listener) = parser(&g.sim, input, vocabulary(), RULE_NAMES);
    let root = g.prog(&mut p).expect("default strategy never cancels");

    assert_eq!(listener.messages(), vec!["missing ';' at '<EOF>'".to_string()]);
    assert_eq!(p.tree().to_string_tree(root, RULE_NAMES), "(prog (stat x = 42 <missing ';'>) <EOF>)");
    let stat = p.tree().rule_context(root, RULE_STAT, 0).expect("stat context");
    let missing = p.tree().token(stat, SEMI, 0).expect("conjured ';'");
    assert_eq!((missing.line, missing.column), (1, 4));
}

#[test]
fn test_loop_back_skips_junk_between_iterations() {
    use statements::*;
    let g = Statements::new();
    let input = tokens(&[
        (ID, "x"),
        (ASSIGN, "="),
        (INT, "1"),
        (SEMI, ";"),
        (INT, "5"),
        (INT, "5"),
        (ID, "y"),
        (ASSIGN, "="),
        (INT, "2"),
        (SEMI, ";"),
    ]);
    let (mut p, listener) = parser(&g.sim, input, vocabulary(), RULE_NAMES);
    let root = g.prog(&mut p).expect("default strategy never cancels");

    assert_eq!(listener.messages(), vec!["extraneous input '5' expecting {<EOF>, ID, '('}".to_string()]);
    assert_eq!(p.tree().to_string_tree(root, RULE_NAMES), "(prog (stat x = 1 ;) 5 5 (stat y = 2 ;) <EOF>)");
    let junk: Vec<bool> = p.tree().get(root).children().iter().map(ParseTreeNode::is_error).collect();
    assert_eq!(junk, vec![false, true, true, false, false]);
}

#[test]
fn test_rule_failure_resyncs_to_next_statement() {
    use statements::*;
    let g = Statements::new();
    let input = tokens(&[(ID, "x"), (SEMI, ";"), (ID, "y"), (ASSIGN, "="), (INT, "2"), (SEMI, ";")]);
    let (mut p, listener) = parser(&g.sim, input, vocabulary(), RULE_NAMES);
    let root = g.prog(&mut p).expect("default strategy never cancels");

    assert_eq!(listener.messages(), vec!["mismatched input ';' expecting '='".to_string()]);
    assert_eq!(p.tree().to_string_tree(root, RULE_NAMES), "(prog (stat x ;) (stat y = 2 ;) <EOF>)");
    let stats = p.tree().rule_contexts(root, RULE_STAT);
    assert!(p.tree().get(stats[0]).exception.is_some());
    assert!(p.tree().get(stats[1]).exception.is_none());
}

#[test]
fn test_match_between_errors_reenables_reporting() {
    use statements::*;
    let g = Statements::new();
    let input = tokens(&[
        (ID, "x"),
        (ASSIGN, "="),
        (EXTRA, "?"),
        (INT, "1"),
        (SEMI, ";"),
        (LPAREN, "("),
        (INT, "2"),
        (SEMI, ";"),
    ]);
    let (mut p, listener) = parser(&g.sim, input, vocabulary(), RULE_NAMES);
    g.prog(&mut p).expect("default strategy never cancels");

    assert_eq!(
        listener.messages(),
        vec!["extraneous input '?' expecting INT".to_string(), "missing ')' at ';'".to_string()]
    );
    assert_eq!(p.number_of_syntax_errors(), 2);
}

#[test]
fn test_bail_cancels_on_first_error() {
    use statements::*;
    let g = Statements::new();
    let input = tokens(&[(ID, "x"), (ASSIGN, "="), (EXTRA, "?"), (INT, "1"), (SEMI, ";")]);
    let (p, listener) = parser(&g.sim, input, vocabulary(), RULE_NAMES);
    let mut p = p.with_error_strategy(BailErrorStrategy::new());

    let cancelled = match g.prog(&mut p) {
        Err(ParseError::Cancelled(cancelled)) => cancelled,
        other => panic!("expected a cancelled parse, got {:?}", other),
    };
    assert!(matches!(cancelled.cause, RecognitionError::InputMismatch { .. }));
    assert_eq!(cancelled.cause.offending_token().text(), "?");
    // Nothing is repaired and nothing is reported.
    assert!(listener.messages().is_empty());
    assert_eq!(p.input().index(), 2);
}

#[test]
fn test_reset_allows_a_second_parse() {
    use statements::*;
    let g = Statements::new();
    let input = tokens(&[(ID, "x"), (SEMI, ";")]);
    let (mut p, listener) = parser(&g.sim, input, vocabulary(), RULE_NAMES);
    g.prog(&mut p).expect("default strategy never cancels");
    assert_eq!(p.number_of_syntax_errors(), 1);

    p.reset();
    assert_eq!(p.number_of_syntax_errors(), 0);
    assert!(p.context().is_none());
    let root = g.prog(&mut p).expect("default strategy never cancels");
    assert_eq!(p.tree().to_string_tree(root, RULE_NAMES), "(prog (stat x ;) <EOF>)");
    assert_eq!(listener.messages().len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Whatever the input, recovery makes progress: the parse returns, the
    /// input ends at EOF, and each report is separated from the next by at
    /// least one consumed token.
    #[test]
    fn prop_recovery_always_reaches_eof(kinds in proptest::collection::vec(1i32..=7, 0..24)) {
        use statements::*;
        let g = Statements::new();
        let pairs: Vec<_> = kinds.iter().map(|&k| (k, text_of(k))).collect();
        let (mut p, listener) = parser(&g.sim, tokens(&pairs), vocabulary(), RULE_NAMES);

        let root = g.prog(&mut p);
        prop_assert!(root.is_ok());
        prop_assert_eq!(p.input().la(1), EOF);
        prop_assert!(listener.errors().len() <= kinds.len() + 1);
        prop_assert_eq!(listener.errors().len(), p.number_of_syntax_errors());
    }
}
