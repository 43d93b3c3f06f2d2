//! Integration tests for the lexer ATN simulator
//!
//! These tests cover longest-match and priority resolution, EOF handling,
//! DFA state canonicalization, non-greedy loops, the cached edge range,
//! semantic predicates and sharing one DFA cache across threads.

use std::sync::Arc;

use parsanol_atn::runtime::atn_builder::*;
use parsanol_atn::runtime::{
    Atn, AtnConfig, AtnConfigSet, AtnError, AtnResult, CharStream, Dfa, DfaCache, DfaState,
    InputStream, LexerControl, LexerRecognizer, LexerSimulator, LexerState, LexerView,
    PredictionContext, EOF,
};

fn compile(builder: AtnBuilder) -> (Arc<Atn>, Arc<DfaCache>) {
    let atn = Arc::new(builder.build().unwrap());
    let cache = Arc::new(DfaCache::for_lexer(&atn));
    (atn, cache)
}

fn match_once(sim: &mut LexerSimulator, input: &mut InputStream) -> Result<i32, AtnError> {
    sim.match_token(input, 0, &mut LexerState::new())
}

// =============================================================================
// Longest Match and Priority
// =============================================================================

fn ab_or_a() -> (Arc<Atn>, Arc<DfaCache>) {
    let mut builder = AtnBuilder::lexer();
    builder.literal_rule("A", 1, "ab");
    builder.literal_rule("B", 2, "a");
    compile(builder)
}

#[test]
fn test_longest_match_wins() {
    let (atn, cache) = ab_or_a();
    let mut sim = LexerSimulator::new(atn, cache);
    let mut input = InputStream::new("ab");
    assert_eq!(match_once(&mut sim, &mut input).unwrap(), 1);
    assert_eq!(input.index(), 2);
}

#[test]
fn test_over_match_backtracks() {
    let (atn, cache) = ab_or_a();
    let mut sim = LexerSimulator::new(atn, cache);
    let mut input = InputStream::new("ac");
    assert_eq!(match_once(&mut sim, &mut input).unwrap(), 2);
    assert_eq!(input.index(), 1);
    assert_eq!(sim.column(), 1);
    assert_eq!(sim.text(&input), "a");
}

#[test]
fn test_earlier_rule_wins_a_tie() {
    let mut builder = AtnBuilder::lexer();
    builder.literal_rule("IF", 1, "if");
    builder.lexer_rule("ID", 2, plus(range('a', 'z')));
    let (atn, cache) = compile(builder);
    let mut sim = LexerSimulator::new(atn, cache);
    assert_eq!(match_once(&mut sim, &mut InputStream::new("if")).unwrap(), 1);
    assert_eq!(match_once(&mut sim, &mut InputStream::new("ifs")).unwrap(), 2);
}

// =============================================================================
// EOF and Failure
// =============================================================================

#[test]
fn test_empty_input_matches_eof() {
    let (atn, cache) = ab_or_a();
    let mut sim = LexerSimulator::new(atn, cache);
    let mut input = InputStream::new("");
    assert_eq!(match_once(&mut sim, &mut input).unwrap(), EOF);
    assert_eq!(input.index(), 0);
}

#[test]
fn test_no_viable_alternative_reports_start() {
    let (atn, cache) = ab_or_a();
    let mut sim = LexerSimulator::new(atn, cache);
    let mut input = InputStream::new("x");
    match match_once(&mut sim, &mut input) {
        Err(AtnError::LexerNoViableAlt { start_index, .. }) => assert_eq!(start_index, 0),
        other => panic!("expected no viable alternative, got {:?}", other),
    }
}

// =============================================================================
// DFA States
// =============================================================================

#[test]
fn test_equal_config_sets_share_a_state() {
    let build = || {
        let mut configs = AtnConfigSet::ordered();
        configs
            .add(AtnConfig::new(3, 1, PredictionContext::empty()), None)
            .unwrap();
        configs
            .add(AtnConfig::new(5, 2, PredictionContext::empty()), None)
            .unwrap();
        DfaState::new(configs)
    };
    let mut dfa = Dfa::new(0, 0, false);
    let first = dfa.add_state(build());
    let second = dfa.add_state(build());
    assert_eq!(first, second);
    assert_eq!(dfa.len(), 1);
    assert!(dfa.get(first).unwrap().configs.is_readonly());
}

#[test]
fn test_loop_iterations_reuse_one_state() {
    let mut builder = AtnBuilder::lexer();
    builder.lexer_rule("ID", 1, plus(range('a', 'z')));
    let (atn, cache) = compile(builder);
    let mut sim = LexerSimulator::new(atn, cache.clone());

    match_once(&mut sim, &mut InputStream::new("a")).unwrap();
    let short = cache.stats().states;
    match_once(&mut sim, &mut InputStream::new("abcdefgh")).unwrap();
    assert_eq!(cache.stats().states, short);
}

// =============================================================================
// Non-greedy Loops
// =============================================================================

fn comment() -> (Arc<Atn>, Arc<DfaCache>) {
    let mut builder = AtnBuilder::lexer();
    builder.lexer_rule("COMMENT", 1, seq(vec![text("/*"), non_greedy_star(any()), text("*/")]));
    compile(builder)
}

#[test]
fn test_non_greedy_stops_at_first_close() {
    let (atn, cache) = comment();
    let mut sim = LexerSimulator::new(atn, cache);
    let mut input = InputStream::new("/* a */ b */");
    assert_eq!(match_once(&mut sim, &mut input).unwrap(), 1);
    assert_eq!(input.index(), 7);
}

#[test]
fn test_non_greedy_config_sets_stay_bounded() {
    let (atn, short_cache) = comment();
    let mut sim = LexerSimulator::new(atn.clone(), short_cache.clone());
    match_once(&mut sim, &mut InputStream::new("/* x */")).unwrap();

    let long_cache = Arc::new(DfaCache::for_lexer(&atn));
    let mut sim = LexerSimulator::new(atn, long_cache.clone());
    match_once(&mut sim, &mut InputStream::new("/* xxxxxxxxxxxxxxxx */")).unwrap();

    assert_eq!(short_cache.stats().states, long_cache.stats().states);
    let dfa = long_cache.dfa(0).unwrap();
    let accepts: Vec<&DfaState> = dfa.states().iter().filter(|s| s.is_accept_state).collect();
    assert_eq!(accepts.len(), 1);
    // the loop configurations were dropped once the close matched
    assert_eq!(accepts[0].configs.len(), 1);
}

// =============================================================================
// Edge Range
// =============================================================================

#[test]
fn test_supplementary_symbols_get_no_edge() {
    let mut builder = AtnBuilder::lexer();
    builder.lexer_rule("ANY", 1, any());
    let (atn, cache) = compile(builder);
    let mut sim = LexerSimulator::new(atn, cache.clone());

    let mut input = InputStream::new("\u{1F600}");
    assert_eq!(match_once(&mut sim, &mut input).unwrap(), 1);
    assert_eq!(input.index(), 1);
    assert_eq!(cache.stats().edges, 0);

    // the same symbol misses again
    let misses = cache.stats().misses;
    match_once(&mut sim, &mut InputStream::new("\u{1F600}")).unwrap();
    assert!(cache.stats().misses > misses);
    assert_eq!(cache.stats().edges, 0);
}

#[test]
fn test_ascii_symbols_get_edges() {
    let mut builder = AtnBuilder::lexer();
    builder.lexer_rule("ANY", 1, any());
    let (atn, cache) = compile(builder);
    let mut sim = LexerSimulator::new(atn, cache.clone());
    match_once(&mut sim, &mut InputStream::new("z")).unwrap();
    assert_eq!(cache.stats().edges, 1);
}

// =============================================================================
// Semantic Predicates
// =============================================================================

/// Answers every predicate with `verdict` and records what it saw as
/// `(text, line, column, index)`
struct Gate {
    state: LexerState,
    verdict: bool,
    seen: Vec<(String, u32, u32, usize)>,
}

impl Gate {
    fn new(verdict: bool) -> Self {
        Self {
            state: LexerState::new(),
            verdict,
            seen: Vec::new(),
        }
    }
}

impl LexerControl for Gate {
    fn skip(&mut self) {
        self.state.skip();
    }

    fn more(&mut self) {
        self.state.more();
    }

    fn set_mode(&mut self, mode: usize) {
        self.state.set_mode(mode);
    }

    fn push_mode(&mut self, mode: usize) {
        self.state.push_mode(mode);
    }

    fn pop_mode(&mut self) -> AtnResult<usize> {
        self.state.pop_mode()
    }

    fn set_type(&mut self, token_type: i32) {
        self.state.set_type(token_type);
    }

    fn set_channel(&mut self, channel: i32) {
        self.state.set_channel(channel);
    }

    fn custom_action(
        &mut self,
        input: &dyn CharStream,
        rule_index: usize,
        action_index: usize,
    ) -> AtnResult<()> {
        self.state.custom_action(input, rule_index, action_index)
    }
}

impl LexerRecognizer for Gate {
    fn sempred(&mut self, view: &LexerView<'_>, _rule_index: usize, _pred_index: usize) -> bool {
        self.seen
            .push((view.text(), view.line(), view.column(), view.index()));
        self.verdict
    }
}

// AB : 'a' {p}? 'b' ;  A : 'a' ;
fn gated_ab() -> (Arc<Atn>, Arc<DfaCache>) {
    let mut builder = AtnBuilder::lexer();
    builder.lexer_rule("AB", 1, seq(vec![ch('a'), predicate(0), ch('b')]));
    builder.literal_rule("A", 2, "a");
    compile(builder)
}

#[test]
fn test_predicate_after_symbol_sees_it_consumed() {
    let (atn, cache) = gated_ab();
    let mut sim = LexerSimulator::new(atn, cache);
    let mut input = InputStream::new("ab");
    let mut gate = Gate::new(true);

    assert_eq!(sim.match_token(&mut input, 0, &mut gate).unwrap(), 1);
    assert_eq!(gate.seen, vec![("a".to_string(), 1, 1, 1)]);
    // the lookahead consume was rolled back before the real one
    assert_eq!(input.index(), 2);
    assert_eq!((sim.line(), sim.column()), (1, 2));
}

#[test]
fn test_predicate_after_newline_sees_next_line() {
    let mut builder = AtnBuilder::lexer();
    builder.lexer_rule("NL", 1, seq(vec![ch('\n'), predicate(0), ch('x')]));
    let (atn, cache) = compile(builder);
    let mut sim = LexerSimulator::new(atn, cache);
    let mut input = InputStream::new("\nx");
    let mut gate = Gate::new(true);

    assert_eq!(sim.match_token(&mut input, 0, &mut gate).unwrap(), 1);
    assert_eq!(gate.seen, vec![("\n".to_string(), 2, 0, 1)]);
    assert_eq!((sim.line(), sim.column()), (2, 1));
}

#[test]
fn test_failed_predicate_falls_back_to_shorter_rule() {
    let (atn, cache) = gated_ab();
    let mut sim = LexerSimulator::new(atn, cache);
    let mut input = InputStream::new("ab");
    let mut gate = Gate::new(false);

    assert_eq!(sim.match_token(&mut input, 0, &mut gate).unwrap(), 2);
    assert_eq!(gate.seen.len(), 1);
    assert_eq!(input.index(), 1);
    assert_eq!((sim.line(), sim.column()), (1, 1));
}

#[test]
fn test_predicated_edge_is_not_cached() {
    let (atn, cache) = gated_ab();
    let mut sim = LexerSimulator::new(atn, cache.clone());

    let mut closed = Gate::new(false);
    assert_eq!(sim.match_token(&mut InputStream::new("ab"), 0, &mut closed).unwrap(), 2);
    {
        let dfa = cache.dfa(0).unwrap();
        let s0 = dfa.s0().unwrap();
        assert_eq!(dfa.edge(s0, 'a' as usize), None);
    }

    // a cached edge would replay the first verdict
    let mut open = Gate::new(true);
    assert_eq!(sim.match_token(&mut InputStream::new("ab"), 0, &mut open).unwrap(), 1);
    assert_eq!(open.seen.len(), 1);
    assert_eq!(sim.match_token(&mut InputStream::new("ab"), 0, &mut open).unwrap(), 1);
    assert_eq!(open.seen.len(), 2);
}

#[test]
fn test_predicate_at_rule_start_leaves_s0_unset() {
    let mut builder = AtnBuilder::lexer();
    builder.lexer_rule("P", 1, seq(vec![predicate(0), ch('a')]));
    builder.literal_rule("Q", 2, "a");
    let (atn, cache) = compile(builder);
    let mut sim = LexerSimulator::new(atn, cache.clone());

    let mut closed = Gate::new(false);
    assert_eq!(sim.match_token(&mut InputStream::new("a"), 0, &mut closed).unwrap(), 2);
    // evaluated in place, before any symbol is consumed
    assert_eq!(closed.seen, vec![(String::new(), 1, 0, 0)]);
    assert_eq!(cache.dfa(0).unwrap().s0(), None);

    let mut open = Gate::new(true);
    assert_eq!(sim.match_token(&mut InputStream::new("a"), 0, &mut open).unwrap(), 1);
    assert_eq!(open.seen.len(), 1);
    assert_eq!(cache.dfa(0).unwrap().s0(), None);
}

// =============================================================================
// Shared Cache
// =============================================================================

#[test]
fn test_cache_shared_across_threads() {
    let mut builder = AtnBuilder::lexer();
    builder.lexer_rule("ID", 1, plus(range('a', 'z')));
    builder.lexer_rule("NUM", 2, plus(range('0', '9')));
    builder.lexer_rule("WS", 3, seq(vec![plus(ch(' ')), action(LexerAction::Skip)]));
    let (atn, cache) = compile(builder);

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let atn = atn.clone();
            let cache = cache.clone();
            scope.spawn(move || {
                let mut sim = LexerSimulator::new(atn, cache);
                let mut input = InputStream::new("abc 123 de 45");
                let mut types = Vec::new();
                loop {
                    let mut state = LexerState::new();
                    let t = sim.match_token(&mut input, 0, &mut state).unwrap();
                    if t == EOF {
                        break;
                    }
                    if state.token_type() != parsanol_atn::runtime::SKIP {
                        types.push(t);
                    }
                }
                assert_eq!(types, vec![1, 2, 1, 2]);
            });
        }
    });

    let mut sim = LexerSimulator::new(atn, cache.clone());
    let before = cache.stats();
    match_once(&mut sim, &mut InputStream::new("abc")).unwrap();
    let after = cache.stats();
    assert_eq!(before.states, after.states);
    assert_eq!(before.edges, after.edges);
}
