//! Adaptive prediction across rule boundaries: SLL escalation, ambiguity
//! resolution, precedence DFAs and the decision counters.

use std::sync::{Arc, OnceLock};

use proptest::prelude::*;

use super::grammars::{expr, parser, tokens};
use crate::atn::semantic::NoPredicates;
use crate::atn::{AtnBuilder, AtnType, ParserAtnSimulator, PredictionMode, PredictionScope, StateId};
use crate::config::RuntimeOptions;
use crate::error::DfaError;
use crate::listener::PredictionDiagnostic;
use crate::stream::IntStream;
use crate::token::{TokenType, EOF};

fn diagnostics_on(mode: PredictionMode) -> RuntimeOptions {
    RuntimeOptions { report_diagnostics: true, ..RuntimeOptions::default() }.with_prediction_mode(mode)
}

// ── s : ( A | B C | B C ) EOF ; ────────────────────────────────────────────

const A: TokenType = 1;
const B: TokenType = 2;
const C: TokenType = 3;

fn ambiguous() -> Arc<ParserAtnSimulator> {
    let mut b = AtnBuilder::new(AtnType::Parser, C);
    let s = b.add_rule(false);
    let alt1 = b.atom(A);
    let alt2 = {
        let parts = vec![b.atom(B), b.atom(C)];
        b.seq(parts)
    };
    let alt3 = {
        let parts = vec![b.atom(B), b.atom(C)];
        b.seq(parts)
    };
    let block = b.block(vec![alt1, alt2, alt3]);
    let eof = b.atom(EOF);
    let body = b.seq(vec![block, eof]);
    b.finish_rule(s, body);
    Arc::new(ParserAtnSimulator::new(Arc::new(b.build())))
}

#[test]
fn test_ambiguity_resolves_to_minimum_alternative() {
    let sim = ambiguous();
    let mut input = tokens(&[(B, "b"), (C, "c")]);
    let mut scope = PredictionScope::new(&[], &NoPredicates).with_options(diagnostics_on(PredictionMode::Ll));

    assert_eq!(sim.adaptive_predict(&mut input, 0, &mut scope), Ok(2));
    assert_eq!(input.index(), 0, "prediction restores the input position");
    assert!(scope.diagnostics.iter().any(|d| matches!(
        d,
        PredictionDiagnostic::AttemptingFullContext { conflicting_alts, .. } if conflicting_alts == &vec![2, 3]
    )));
    assert!(scope.diagnostics.iter().any(|d| matches!(
        d,
        PredictionDiagnostic::Ambiguity { alts, exact: false, .. } if alts == &vec![2, 3]
    )));
}

#[test]
fn test_exact_mode_proves_the_ambiguity() {
    let sim = ambiguous();
    let mut input = tokens(&[(B, "b"), (C, "c")]);
    let mut scope =
        PredictionScope::new(&[], &NoPredicates).with_options(diagnostics_on(PredictionMode::LlExactAmbigDetection));

    assert_eq!(sim.adaptive_predict(&mut input, 0, &mut scope), Ok(2));
    assert!(scope.diagnostics.iter().any(|d| matches!(
        d,
        PredictionDiagnostic::Ambiguity { alts, exact: true, .. } if alts == &vec![2, 3]
    )));
}

#[test]
fn test_unambiguous_prefix_needs_no_full_context() {
    let sim = ambiguous();
    let mut input = tokens(&[(A, "a")]);
    let mut scope = PredictionScope::new(&[], &NoPredicates).with_options(diagnostics_on(PredictionMode::Ll));

    assert_eq!(sim.adaptive_predict(&mut input, 0, &mut scope), Ok(1));
    assert!(scope.diagnostics.is_empty());
    let dfa = sim.dfa(0).expect("decision 0");
    assert!(dfa.s0().is_some());
    assert!(!dfa.is_context_sensitive());
}

#[test]
fn test_diagnostics_stay_quiet_unless_requested() {
    let sim = ambiguous();
    let mut input = tokens(&[(B, "b"), (C, "c")]);
    let mut scope = PredictionScope::new(&[], &NoPredicates);
    assert_eq!(sim.adaptive_predict(&mut input, 0, &mut scope), Ok(2));
    assert!(scope.diagnostics.is_empty());
}

#[test]
fn test_no_viable_alternative_reports_start_and_offending_tokens() {
    let sim = ambiguous();
    let mut input = tokens(&[(B, "b"), (A, "a")]);
    let mut scope = PredictionScope::new(&[], &NoPredicates);
    let err = sim.adaptive_predict(&mut input, 0, &mut scope).unwrap_err();
    match err {
        crate::error::RecognitionError::NoViableAlt { start_token, offending_token, .. } => {
            assert_eq!(start_token.text(), "b");
            assert_eq!(offending_token.text(), "a");
        },
        other => panic!("expected no viable alternative, got {:?}", other),
    }
    assert_eq!(input.index(), 0);
}

// ── s : 'p' e 'q' EOF | 'r' e EOF ;  e : ID | ID 'q' ; ─────────────────────

const P: TokenType = 1;
const Q: TokenType = 2;
const R: TokenType = 3;
const ID: TokenType = 4;

struct ContextSensitive {
    sim: Arc<ParserAtnSimulator>,
    /// Invoking state of `e` after `'p'`.
    call_after_p: StateId,
    /// Invoking state of `e` after `'r'`.
    call_after_r: StateId,
    e_decision: usize,
}

fn context_sensitive() -> ContextSensitive {
    let mut b = AtnBuilder::new(AtnType::Parser, ID);
    let (s, e) = (b.add_rule(false), b.add_rule(false));

    let p = b.atom(P);
    let call1 = b.rule_ref(e, 0);
    let q = b.atom(Q);
    let eof1 = b.atom(EOF);
    let r = b.atom(R);
    let call2 = b.rule_ref(e, 0);
    let eof2 = b.atom(EOF);
    let (call_after_p, call_after_r) = (call1.entry, call2.entry);
    let alt1 = b.seq(vec![p, call1, q, eof1]);
    let alt2 = b.seq(vec![r, call2, eof2]);
    let s_body = b.block(vec![alt1, alt2]);
    b.finish_rule(s, s_body);

    let id1 = b.atom(ID);
    let id2 = b.atom(ID);
    let q2 = b.atom(Q);
    let longer = b.seq(vec![id2, q2]);
    let e_body = b.block(vec![id1, longer]);
    let e_decision = e_body.decision.unwrap_or_default();
    b.finish_rule(e, e_body);

    ContextSensitive {
        sim: Arc::new(ParserAtnSimulator::new(Arc::new(b.build()))),
        call_after_p,
        call_after_r,
        e_decision,
    }
}

#[test]
fn test_full_context_resolves_what_sll_cannot() {
    let g = context_sensitive();
    let options = diagnostics_on(PredictionMode::Ll);

    // `ID q EOF` is `e : ID` followed by the caller's `q`...
    let mut input = tokens(&[(ID, "x"), (Q, "q")]);
    let invoking = [g.call_after_p];
    let mut scope = PredictionScope::new(&invoking, &NoPredicates).with_options(options);
    assert_eq!(g.sim.adaptive_predict(&mut input, g.e_decision, &mut scope), Ok(1));
    assert!(scope.diagnostics.iter().any(|d| matches!(d, PredictionDiagnostic::AttemptingFullContext { .. })));
    assert!(scope
        .diagnostics
        .iter()
        .any(|d| matches!(d, PredictionDiagnostic::ContextSensitivity { prediction: 1, .. })));

    // ...but `e : ID 'q'` when the caller only expects EOF.
    let mut input = tokens(&[(ID, "x"), (Q, "q")]);
    let invoking = [g.call_after_r];
    let mut scope = PredictionScope::new(&invoking, &NoPredicates).with_options(options);
    assert_eq!(g.sim.adaptive_predict(&mut input, g.e_decision, &mut scope), Ok(2));
    assert!(scope
        .diagnostics
        .iter()
        .any(|d| matches!(d, PredictionDiagnostic::ContextSensitivity { prediction: 2, .. })));

    assert!(g.sim.dfa(g.e_decision).expect("e decision").is_context_sensitive());
}

#[test]
fn test_nested_fallback_marks_decision_context_sensitive() {
    let g = context_sensitive();
    let dfa = g.sim.dfa(g.e_decision).expect("e decision");
    assert!(!dfa.is_context_sensitive());

    let mut input = tokens(&[(ID, "x"), (Q, "q")]);
    let invoking = [g.call_after_p];
    let mut scope = PredictionScope::new(&invoking, &NoPredicates);
    assert_eq!(g.sim.adaptive_predict(&mut input, g.e_decision, &mut scope), Ok(1));

    // The start state was not cached (the caller stack was not empty), yet
    // the decision did need full context.
    assert!(dfa.s0_full().is_none());
    assert!(dfa.is_context_sensitive());
}

#[test]
fn test_sll_mode_settles_conflicts_without_context() {
    let g = context_sensitive();
    let options = RuntimeOptions::default().with_prediction_mode(PredictionMode::Sll);
    let mut input = tokens(&[(ID, "x"), (Q, "q")]);
    let invoking = [g.call_after_r];
    let mut scope = PredictionScope::new(&invoking, &NoPredicates).with_options(options);
    // The lowest conflicting alternative, even though only alt 2 fits here.
    assert_eq!(g.sim.adaptive_predict(&mut input, g.e_decision, &mut scope), Ok(1));
}

#[test]
fn test_fallback_is_counted_per_decision() {
    let g = context_sensitive();
    let options = RuntimeOptions { collect_decision_stats: true, ..RuntimeOptions::default() };
    for _ in 0..2 {
        let mut input = tokens(&[(ID, "x"), (Q, "q")]);
        let invoking = [g.call_after_p];
        let mut scope = PredictionScope::new(&invoking, &NoPredicates).with_options(options);
        assert_eq!(g.sim.adaptive_predict(&mut input, g.e_decision, &mut scope), Ok(1));
    }
    let info = &g.sim.decision_info()[g.e_decision];
    assert_eq!(info.invocations, 2);
    assert_eq!(info.ll_fallbacks, 2);
    assert_eq!(info.context_sensitivities, 2);
    assert!(info.sll_atn_transitions > 0);
    // The second run walks the SLL prefix through cached edges.
    assert!(info.dfa_hits > 0);
    assert!(info.max_lookahead >= 3);
}

// ── precedence climbing ───────────────────────────────────────────────────

#[test]
fn test_left_recursion_respects_precedence() {
    let g = expr::Expr::new();
    assert_eq!(
        expr::parse_to_tree(&g, "1+2*3"),
        ("(s (e (e 1) + (e (e 2) * (e 3))) <EOF>)".to_string(), 0)
    );
    assert_eq!(
        expr::parse_to_tree(&g, "1*2+3"),
        ("(s (e (e (e 1) * (e 2)) + (e 3)) <EOF>)".to_string(), 0)
    );
    assert_eq!(
        expr::parse_to_tree(&g, "1+2+3"),
        ("(s (e (e (e 1) + (e 2)) + (e 3)) <EOF>)".to_string(), 0)
    );
    assert_eq!(
        expr::parse_to_tree(&g, "(1+2)*3"),
        ("(s (e (e ( (e (e 1) + (e 2)) )) * (e 3)) <EOF>)".to_string(), 0)
    );
}

#[test]
fn test_precedence_dfa_keeps_one_start_state_per_precedence() {
    let g = expr::Expr::new();
    expr::parse_to_tree(&g, "1+2*3");

    let ops = g.sim.dfa(g.ops_decision()).expect("operator loop");
    assert!(ops.is_precedence_dfa());
    assert!(ops.s0().is_none());
    for precedence in [0, 2, 3] {
        assert!(
            ops.precedence_start_state(precedence, false).expect("precedence DFA").is_some(),
            "no start state for precedence {}",
            precedence
        );
    }
    assert!(ops.precedence_start_state(1, false).expect("precedence DFA").is_none());

    let primary = g.sim.dfa(g.primary_decision()).expect("primary block");
    assert!(!primary.is_precedence_dfa());
    assert_eq!(
        primary.precedence_start_state(0, false).unwrap_err(),
        DfaError::NotPrecedenceDfa { decision: g.primary_decision() }
    );
}

#[test]
fn test_operator_error_reports_and_recovers() {
    let g = expr::Expr::new();
    let (mut p, listener) = parser(&g.sim, expr::lex("1+*2"), expr::vocabulary(), expr::RULE_NAMES);
    let root = g.s(&mut p).expect("default strategy never cancels");
    assert_eq!(listener.messages().len(), 1);
    assert_eq!(p.input().la(1), EOF);
    assert!(p.tree().has_errors(root));
}

fn shared_expr() -> &'static expr::Expr {
    static GRAMMAR: OnceLock<expr::Expr> = OnceLock::new();
    GRAMMAR.get_or_init(expr::Expr::new)
}

fn arb_expression() -> impl Strategy<Value = String> {
    proptest::collection::vec(prop_oneof!["1", "2", "\\*", "\\+", "\\(", "\\)"], 0..14).prop_map(|parts| parts.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// A warm DFA cache, filled by every earlier case, never changes an
    /// answer relative to a cold simulator.
    #[test]
    fn prop_cached_prediction_matches_cold_prediction(input in arb_expression()) {
        let cold = expr::Expr::new();
        let expected = expr::parse_to_tree(&cold, &input);
        prop_assert_eq!(expr::parse_to_tree(shared_expr(), &input), expected.clone());
        prop_assert_eq!(expr::parse_to_tree(shared_expr(), &input), expected);
    }
}
