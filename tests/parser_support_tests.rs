//! Integration tests for parser support
//!
//! A statement grammar drives rule bookkeeping, follow-set queries and
//! LL(1) decision lookahead the way a generated parser would.

use std::sync::Arc;

use parsanol_atn::prelude::*;
use parsanol_atn::runtime::{Ll1Analyzer, Transition, EPSILON};

const ID: i32 = 1;
const ASSIGN: i32 = 2;
const SEMI: i32 = 3;
const RETURN: i32 = 4;
const NUM: i32 = 5;

const STAT: usize = 0;
const EXPR: usize = 1;

// stat : ID '=' expr ';' | 'return' expr ';' ;
// expr : ID | NUM ;
fn statements() -> Arc<Atn> {
    let mut b = AtnBuilder::parser(NUM);
    b.parser_rule(
        "stat",
        alt(vec![
            seq(vec![token(ID), token(ASSIGN), rule_ref("expr"), token(SEMI)]),
            seq(vec![token(RETURN), rule_ref("expr"), token(SEMI)]),
        ]),
    );
    b.parser_rule("expr", alt(vec![token(ID), token(NUM)]));
    Arc::new(b.build().unwrap())
}

/// First state that invokes `rule`
fn call_site(atn: &Atn, rule: usize) -> usize {
    atn.states()
        .iter()
        .find(|s| {
            matches!(s.transitions.first(),
                Some(Transition::Rule { rule_index, .. }) if *rule_index == rule)
        })
        .map(|s| s.state_number)
        .unwrap()
}

fn inside_expr(atn: &Arc<Atn>) -> ParserSupport {
    let mut parser = ParserSupport::new(Arc::clone(atn));
    parser.enter_rule(atn.rule_to_start_state[STAT], STAT);
    parser.enter_outer_alt(atn.rule_to_start_state[STAT], 1);
    parser.set_state(call_site(atn, EXPR));
    parser.enter_rule(atn.rule_to_start_state[EXPR], EXPR);
    parser
}

// =============================================================================
// Rule Bookkeeping
// =============================================================================

#[test]
fn test_nested_rule_invocation() {
    let atn = statements();
    let parser = inside_expr(&atn);
    assert_eq!(parser.rule_invocation_stack(), vec![EXPR, STAT]);
    assert_eq!(parser.outer_alt(), 1);
    let ctx = parser.context().unwrap();
    assert_eq!(ctx.invoking_state(), Some(call_site(&atn, EXPR)));
    assert_eq!(ctx.parent().map(|p| p.rule_index()), Some(STAT));
}

#[test]
fn test_reset_clears_everything() {
    let atn = statements();
    let mut parser = inside_expr(&atn);
    parser.reset();
    assert!(parser.context().is_none());
    assert_eq!(parser.state(), -1);
    assert!(parser.rule_invocation_stack().is_empty());
}

// =============================================================================
// Expected Tokens
// =============================================================================

#[test]
fn test_expected_at_rule_start() {
    let atn = statements();
    let parser = inside_expr(&atn);
    assert!(parser.is_expected_token(ID).unwrap());
    assert!(parser.is_expected_token(NUM).unwrap());
    // expr cannot be empty, so the caller's ';' is not reachable
    assert!(!parser.is_expected_token(SEMI).unwrap());
    assert_eq!(parser.expected_tokens().unwrap().to_string(), "{1, 5}");
}

#[test]
fn test_expected_at_rule_end_follows_caller() {
    let atn = statements();
    let mut parser = inside_expr(&atn);
    parser.set_state(atn.rule_to_stop_state[EXPR]);

    let within = parser.expected_tokens_within_current_rule().unwrap();
    assert!(within.contains(EPSILON));
    assert!(parser.is_expected_token(SEMI).unwrap());
    assert!(!parser.is_expected_token(EOF).unwrap());
    assert_eq!(parser.expected_tokens().unwrap().to_string(), "3");
}

#[test]
fn test_end_of_outermost_rule_expects_eof() {
    let atn = statements();
    let mut parser = ParserSupport::new(Arc::clone(&atn));
    parser.enter_rule(atn.rule_to_start_state[STAT], STAT);
    parser.set_state(atn.rule_to_stop_state[STAT]);
    assert!(parser.is_expected_token(EOF).unwrap());
    assert_eq!(parser.expected_tokens().unwrap().to_string(), "<EOF>");
}

// =============================================================================
// LL(1) Lookahead
// =============================================================================

#[test]
fn test_statement_decision_is_ll1() {
    let atn = statements();
    let decision = atn
        .decision_to_state
        .iter()
        .copied()
        .find(|&s| atn.state(s).unwrap().rule_index == STAT)
        .unwrap();
    let looks = Ll1Analyzer::new(&atn).decision_lookahead(decision).unwrap();
    let rendered: Vec<Option<String>> = looks
        .iter()
        .map(|s| s.as_ref().map(|s| s.to_string()))
        .collect();
    assert_eq!(rendered, vec![Some("1".to_string()), Some("4".to_string())]);
}

#[test]
fn test_follow_of_expr_in_context() {
    let atn = statements();
    let parser = inside_expr(&atn);
    let ctx = parser.context().unwrap();
    let set = atn
        .next_tokens_in_context(atn.rule_to_stop_state[EXPR], Some(ctx.as_ref()))
        .unwrap();
    assert_eq!(set.to_string(), "3");
}

// =============================================================================
// Serialized Grammars
// =============================================================================

#[test]
fn test_loaded_atn_answers_queries() {
    let atn = statements();
    let loaded = Arc::new(Atn::from_json(&atn.to_json().unwrap()).unwrap());
    let parser = inside_expr(&loaded);
    assert_eq!(parser.expected_tokens().unwrap().to_string(), "{1, 5}");
    assert_eq!(loaded.num_decisions(), atn.num_decisions());
}
