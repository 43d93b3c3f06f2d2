//! The lexer ATN simulator
//!
//! [`LexerSimulator::match_token`] recognizes one token starting at the
//! input cursor. It walks the mode's DFA while cached edges exist and falls
//! back to ATN closure for every missing edge, caching the result. Matching
//! is longest-match: each accept state reached overwrites the previous
//! snapshot, and when the walk dies the input is rewound to the last one.
//!
//! Only symbols in `0..=127` get cached DFA edges. Everything else is
//! recomputed from the ATN on every visit.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parsanol_atn::runtime::{
//!     AtnBuilder, CharStream, DfaCache, InputStream, LexerSimulator, LexerState,
//! };
//!
//! let mut builder = AtnBuilder::lexer();
//! builder.literal_rule("IF", 1, "if");
//! builder.literal_rule("I", 2, "i");
//! let atn = Arc::new(builder.build().unwrap());
//! let cache = Arc::new(DfaCache::for_lexer(&atn));
//!
//! let mut sim = LexerSimulator::new(atn, cache);
//! let mut input = InputStream::new("if");
//! let mut state = LexerState::new();
//! assert_eq!(sim.match_token(&mut input, 0, &mut state).unwrap(), 1);
//! assert_eq!(input.index(), 2);
//! ```

use std::sync::{Arc, MutexGuard};

use super::atn::{Atn, Transition};
use super::char_stream::CharStream;
use super::config::AtnConfig;
use super::config_set::AtnConfigSet;
use super::dfa::{Dfa, DfaState, DfaStateId, MAX_DFA_EDGE, MIN_DFA_EDGE};
use super::dfa_cache::DfaCache;
use super::error::{AtnError, AtnResult};
use super::lexer::{DEFAULT_MODE, MAX_CHAR_VALUE, MIN_CHAR_VALUE};
use super::lexer_action::{LexerActionExecutor, LexerControl};
use super::prediction_context::{PredictionContext, EMPTY_RETURN_STATE};
use super::token::{EOF, INVALID_ALT_NUMBER};

/// Read-only view of the lexer handed to semantic predicates
pub struct LexerView<'a> {
    input: &'a dyn CharStream,
    start_index: usize,
    line: u32,
    column: u32,
}

impl<'a> LexerView<'a> {
    /// Create a view over `input` for a token starting at `start_index`
    pub fn new(input: &'a dyn CharStream, start_index: usize, line: u32, column: u32) -> Self {
        Self {
            input,
            start_index,
            line,
            column,
        }
    }

    /// Text matched so far
    pub fn text(&self) -> String {
        self.input.text(self.start_index, self.input.index())
    }

    /// Current line (1-based)
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Current column (0-based)
    #[inline]
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Index where the current token started
    #[inline]
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Current input index
    #[inline]
    pub fn index(&self) -> usize {
        self.input.index()
    }

    /// Lookahead symbol at `offset`
    #[inline]
    pub fn la(&self, offset: isize) -> i32 {
        self.input.la(offset)
    }
}

/// The callbacks a lexer simulator needs from its lexer
pub trait LexerRecognizer: LexerControl {
    /// Evaluate predicate `pred_index` of rule `rule_index`
    fn sempred(&mut self, view: &LexerView<'_>, rule_index: usize, pred_index: usize) -> bool;
}

/// Snapshot of the last accept state
#[derive(Debug, Clone, Default)]
struct SimState {
    index: usize,
    line: u32,
    column: u32,
    dfa_state: Option<DfaStateId>,
    prediction: i32,
    executor: Option<Arc<LexerActionExecutor>>,
}

impl SimState {
    fn reset(&mut self) {
        *self = SimState::default();
    }
}

/// Outcome cached on a DFA state
struct Accept {
    prediction: i32,
    executor: Option<Arc<LexerActionExecutor>>,
}

/// Matches tokens by simulating a lexer ATN with DFA caching
#[derive(Debug, Clone)]
pub struct LexerSimulator {
    atn: Arc<Atn>,
    cache: Arc<DfaCache>,
    mode: usize,
    start_index: usize,
    line: u32,
    column: u32,
    prev_accept: SimState,
    dfa_enabled: bool,
    trace: bool,
    generation: u64,
}

impl LexerSimulator {
    /// Create a simulator sharing `cache` with other simulators of `atn`
    pub fn new(atn: Arc<Atn>, cache: Arc<DfaCache>) -> Self {
        Self {
            atn,
            cache,
            mode: DEFAULT_MODE,
            start_index: 0,
            line: 1,
            column: 0,
            prev_accept: SimState::default(),
            dfa_enabled: true,
            trace: false,
            generation: 0,
        }
    }

    /// Enable or disable DFA caching
    pub fn with_dfa(mut self, enabled: bool) -> Self {
        self.dfa_enabled = enabled;
        self
    }

    /// Log every DFA step (with the `logging` feature)
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    /// The simulated ATN
    #[inline]
    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    /// The shared DFA cache
    #[inline]
    pub fn cache(&self) -> &Arc<DfaCache> {
        &self.cache
    }

    /// Current line (1-based)
    #[inline]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Override the current line
    #[inline]
    pub fn set_line(&mut self, line: u32) {
        self.line = line;
    }

    /// Current column (0-based)
    #[inline]
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Override the current column
    #[inline]
    pub fn set_column(&mut self, column: u32) {
        self.column = column;
    }

    /// Mode of the last match
    #[inline]
    pub fn mode(&self) -> usize {
        self.mode
    }

    /// Index where the last match started
    #[inline]
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Return to line 1, column 0 in the default mode
    pub fn reset(&mut self) {
        self.prev_accept.reset();
        self.start_index = 0;
        self.line = 1;
        self.column = 0;
        self.mode = DEFAULT_MODE;
    }

    /// Take over the position of `other`
    pub fn copy_state(&mut self, other: &LexerSimulator) {
        self.column = other.column;
        self.line = other.line;
        self.mode = other.mode;
        self.start_index = other.start_index;
    }

    /// Text from the token start to the cursor
    pub fn text(&self, input: &dyn CharStream) -> String {
        input.text(self.start_index, input.index())
    }

    /// Advance past one symbol, tracking line and column
    pub fn consume(&mut self, input: &mut dyn CharStream) -> AtnResult<()> {
        if input.la(1) == '\n' as i32 {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        input.consume()
    }

    /// Match one token in `mode` and return its type
    ///
    /// On success the input sits right after the token and the token's
    /// lexer actions have run against `recog`. Returns `EOF` when the input
    /// is exhausted.
    ///
    /// If another holder of the cache clears the mode's DFA mid-match, the
    /// match starts over from the token start against the fresh DFA.
    pub fn match_token<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        mode: usize,
        recog: &mut R,
    ) -> AtnResult<i32> {
        self.mode = mode;
        let mark = input.mark();
        let (start, line, column) = (input.index(), self.line, self.column);
        let result = loop {
            match self.match_in_mode(input, recog) {
                Err(AtnError::DfaCleared { .. }) => {
                    log_debug!("mode {}: DFA cleared, restarting match", self.mode);
                    input.seek(start);
                    self.line = line;
                    self.column = column;
                }
                result => break result,
            }
        };
        input.release(mark);
        result
    }

    fn match_in_mode<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        recog: &mut R,
    ) -> AtnResult<i32> {
        self.start_index = input.index();
        self.prev_accept.reset();
        let s0 = {
            let dfa = self.cache.dfa(self.mode)?;
            self.generation = dfa.generation();
            dfa.s0()
        };
        match s0 {
            Some(s0) => {
                self.cache.record_hit();
                self.exec_atn(input, s0, recog)
            }
            None => self.match_atn(input, recog),
        }
    }

    fn match_atn<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        recog: &mut R,
    ) -> AtnResult<i32> {
        let start_state = *self
            .atn
            .mode_to_start_state
            .get(self.mode)
            .ok_or_else(|| AtnError::illegal_state(format!("unknown mode {}", self.mode)))?;
        self.cache.record_miss();

        let mut s0_closure = self.compute_start_state(input, start_state, recog)?;
        let suppress_edge = s0_closure.has_semantic_context;
        s0_closure.has_semantic_context = false;
        let next = self.add_dfa_state(s0_closure)?;
        if !suppress_edge && self.dfa_enabled {
            self.dfa()?.set_s0(next);
        }
        log_debug!(
            "mode {}: start state s{} (cached: {})",
            self.mode,
            next.index(),
            !suppress_edge && self.dfa_enabled
        );
        self.exec_atn(input, next, recog)
    }

    fn exec_atn<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        ds0: DfaStateId,
        recog: &mut R,
    ) -> AtnResult<i32> {
        if let Some(accept) = self.accept_of(ds0)? {
            self.capture_sim_state(input, ds0, accept);
        }
        let mut t = input.la(1);
        let mut s = ds0;

        loop {
            if self.trace {
                log_trace!("mode {}: s{} on {}", self.mode, s.index(), t);
            }
            let target = match self.existing_target_state(s, t)? {
                Some(target) => target,
                None => self.compute_target_state(input, s, t, recog)?,
            };
            if target.is_error() {
                break;
            }
            // EOF is never consumed
            if t != EOF {
                self.consume(input)?;
            }
            if let Some(accept) = self.accept_of(target)? {
                self.capture_sim_state(input, target, accept);
                if t == EOF {
                    break;
                }
            }
            t = input.la(1);
            s = target;
        }

        let configs = self.dfa()?.get(s)?.configs.clone();
        self.fail_or_accept(input, configs, t, recog)
    }

    /// Lock the current mode's DFA, failing if it was cleared since the
    /// match started
    fn dfa(&self) -> AtnResult<MutexGuard<'_, Dfa>> {
        let dfa = self.cache.dfa(self.mode)?;
        if dfa.generation() != self.generation {
            return Err(AtnError::DfaCleared {
                decision: self.mode,
            });
        }
        Ok(dfa)
    }

    fn accept_of(&self, id: DfaStateId) -> AtnResult<Option<Accept>> {
        let dfa = self.dfa()?;
        let state = dfa.get(id)?;
        Ok(state.is_accept_state.then(|| Accept {
            prediction: state.prediction,
            executor: state.lexer_action_executor.clone(),
        }))
    }

    fn existing_target_state(&self, s: DfaStateId, t: i32) -> AtnResult<Option<DfaStateId>> {
        if !self.dfa_enabled || !(MIN_DFA_EDGE..=MAX_DFA_EDGE).contains(&t) {
            return Ok(None);
        }
        let target = self.dfa()?.edge(s, (t - MIN_DFA_EDGE) as usize);
        if target.is_some() {
            self.cache.record_hit();
        }
        Ok(target)
    }

    fn compute_target_state<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        s: DfaStateId,
        t: i32,
        recog: &mut R,
    ) -> AtnResult<DfaStateId> {
        self.cache.record_miss();
        let closure = self.dfa()?.get(s)?.configs.clone();
        let mut reach = AtnConfigSet::ordered();
        self.get_reachable_config_set(input, &closure, &mut reach, t, recog)?;

        if reach.is_empty() {
            // a predicate may succeed next time
            if !reach.has_semantic_context {
                self.add_dfa_edge(s, t, DfaStateId::ERROR)?;
            }
            return Ok(DfaStateId::ERROR);
        }
        self.add_dfa_edge_configs(s, t, reach)
    }

    fn get_reachable_config_set<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        closure: &AtnConfigSet,
        reach: &mut AtnConfigSet,
        t: i32,
        recog: &mut R,
    ) -> AtnResult<()> {
        let atn = self.atn.clone();
        let mut skip_alt = INVALID_ALT_NUMBER;
        for c in closure.iter() {
            let current_alt_reached_accept = c.alt == skip_alt;
            if current_alt_reached_accept && c.passed_through_non_greedy_decision {
                continue;
            }
            for transition in &atn.state(c.state)?.transitions {
                if !transition.matches(t, MIN_CHAR_VALUE, MAX_CHAR_VALUE) {
                    continue;
                }
                let executor = c
                    .lexer_action_executor
                    .as_ref()
                    .map(|e| e.fix_offset_before_match(input.index() - self.start_index));
                let target = atn.state(transition.target())?;
                let treat_eof_as_epsilon = t == EOF;
                let config = c.lexer_with_executor(target, executor);
                if self.closure(
                    input,
                    config,
                    reach,
                    current_alt_reached_accept,
                    true,
                    treat_eof_as_epsilon,
                    recog,
                )? {
                    // the rest of this alternative's configs have lower priority
                    skip_alt = c.alt;
                    break;
                }
            }
        }
        Ok(())
    }

    fn compute_start_state<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        start_state: usize,
        recog: &mut R,
    ) -> AtnResult<AtnConfigSet> {
        let atn = self.atn.clone();
        let initial = PredictionContext::empty();
        let mut configs = AtnConfigSet::ordered();
        for (i, transition) in atn.state(start_state)?.transitions.iter().enumerate() {
            let target = atn.state(transition.target())?;
            let config = AtnConfig::lexer(target, (i + 1) as u32, initial.clone());
            self.closure(input, config, &mut configs, false, false, false, recog)?;
        }
        Ok(configs)
    }

    /// Add the epsilon closure of `config` to `configs`
    ///
    /// Returns whether the closure reached the end of the token rule.
    #[allow(clippy::too_many_arguments)]
    fn closure<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        config: AtnConfig,
        configs: &mut AtnConfigSet,
        mut current_alt_reached_accept: bool,
        speculative: bool,
        treat_eof_as_epsilon: bool,
        recog: &mut R,
    ) -> AtnResult<bool> {
        let atn = self.atn.clone();
        let state = atn.state(config.state)?;

        if state.is_rule_stop() {
            let context = config.context.clone();
            if context.has_empty_path() {
                if context.is_empty() {
                    configs.add(config, None)?;
                    return Ok(true);
                }
                configs.add(
                    config.lexer_with_context(state, PredictionContext::empty()),
                    None,
                )?;
                current_alt_reached_accept = true;
            }
            if !context.is_empty() {
                for i in 0..context.len() {
                    let return_state = context.return_state(i);
                    if return_state == EMPTY_RETURN_STATE {
                        continue;
                    }
                    let parent = context
                        .parent(i)
                        .cloned()
                        .unwrap_or_else(PredictionContext::empty);
                    let target = atn.state(return_state as usize)?;
                    current_alt_reached_accept = self.closure(
                        input,
                        config.lexer_with_context(target, parent),
                        configs,
                        current_alt_reached_accept,
                        speculative,
                        treat_eof_as_epsilon,
                        recog,
                    )?;
                }
            }
            return Ok(current_alt_reached_accept);
        }

        if !state.epsilon_only_transitions
            && (!current_alt_reached_accept || !config.passed_through_non_greedy_decision)
        {
            configs.add(config.clone(), None)?;
        }

        for transition in &state.transitions {
            if let Some(next) = self.epsilon_target(
                input,
                &config,
                transition,
                configs,
                speculative,
                treat_eof_as_epsilon,
                recog,
            )? {
                current_alt_reached_accept = self.closure(
                    input,
                    next,
                    configs,
                    current_alt_reached_accept,
                    speculative,
                    treat_eof_as_epsilon,
                    recog,
                )?;
            }
        }
        Ok(current_alt_reached_accept)
    }

    #[allow(clippy::too_many_arguments)]
    fn epsilon_target<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        config: &AtnConfig,
        transition: &Transition,
        configs: &mut AtnConfigSet,
        speculative: bool,
        treat_eof_as_epsilon: bool,
        recog: &mut R,
    ) -> AtnResult<Option<AtnConfig>> {
        let atn = self.atn.clone();
        let target = atn.state(transition.target())?;
        let next = match transition {
            Transition::Rule { follow_state, .. } => {
                let context =
                    PredictionContext::singleton(Some(config.context.clone()), *follow_state as i32);
                Some(config.lexer_with_context(target, context))
            }
            Transition::Precedence { .. } => {
                return Err(AtnError::PrecedencePredicateInLexer {
                    state: config.state,
                });
            }
            Transition::Predicate {
                rule_index,
                pred_index,
                ..
            } => {
                configs.has_semantic_context = true;
                if self.evaluate_predicate(input, *rule_index, *pred_index, speculative, recog)? {
                    Some(config.lexer_transition(target))
                } else {
                    None
                }
            }
            Transition::Action { action_index, .. } => {
                if config.context.has_empty_path() {
                    // actions only run for the outermost rule
                    let action = atn.lexer_actions.get(*action_index).ok_or_else(|| {
                        AtnError::invalid_atn(format!("unknown lexer action {}", action_index))
                    })?;
                    let executor = LexerActionExecutor::append(
                        config.lexer_action_executor.as_ref(),
                        action.clone(),
                    );
                    Some(config.lexer_with_executor(target, Some(executor)))
                } else {
                    Some(config.lexer_transition(target))
                }
            }
            Transition::Epsilon { .. } => Some(config.lexer_transition(target)),
            Transition::Atom { .. } | Transition::Range { .. } | Transition::Set { .. }
                if treat_eof_as_epsilon
                    && transition.matches(EOF, MIN_CHAR_VALUE, MAX_CHAR_VALUE) =>
            {
                Some(config.lexer_transition(target))
            }
            _ => None,
        };
        Ok(next)
    }

    /// Evaluate a predicate, consuming the pending symbol first when
    /// `speculative` so the predicate sees the position after it
    fn evaluate_predicate<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        rule_index: usize,
        pred_index: usize,
        speculative: bool,
        recog: &mut R,
    ) -> AtnResult<bool> {
        if !speculative {
            let view = LexerView::new(&*input, self.start_index, self.line, self.column);
            return Ok(recog.sempred(&view, rule_index, pred_index));
        }

        let saved_line = self.line;
        let saved_column = self.column;
        let index = input.index();
        let marker = input.mark();
        let mut consumed = Ok(());
        if input.la(1) != EOF {
            consumed = self.consume(input);
        }
        let result = consumed.map(|()| {
            let view = LexerView::new(&*input, self.start_index, self.line, self.column);
            recog.sempred(&view, rule_index, pred_index)
        });
        self.line = saved_line;
        self.column = saved_column;
        input.seek(index);
        input.release(marker);
        result
    }

    fn capture_sim_state(&mut self, input: &dyn CharStream, id: DfaStateId, accept: Accept) {
        self.prev_accept = SimState {
            index: input.index(),
            line: self.line,
            column: self.column,
            dfa_state: Some(id),
            prediction: accept.prediction,
            executor: accept.executor,
        };
    }

    fn fail_or_accept<R: LexerRecognizer>(
        &mut self,
        input: &mut dyn CharStream,
        reach: Arc<AtnConfigSet>,
        t: i32,
        recog: &mut R,
    ) -> AtnResult<i32> {
        if self.prev_accept.dfa_state.is_some() {
            let accept = std::mem::take(&mut self.prev_accept);
            input.seek(accept.index);
            self.line = accept.line;
            self.column = accept.column;
            if let Some(executor) = &accept.executor {
                executor.execute(recog as &mut dyn LexerControl, input, self.start_index)?;
            }
            return Ok(accept.prediction);
        }
        if t == EOF && input.index() == self.start_index {
            return Ok(EOF);
        }
        log_debug!(
            "mode {}: no viable alternative at {}..{}",
            self.mode,
            self.start_index,
            input.index()
        );
        Err(AtnError::LexerNoViableAlt {
            start_index: self.start_index,
            index: input.index(),
            dead_end_configs: reach,
        })
    }

    fn add_dfa_edge(&self, from: DfaStateId, t: i32, to: DfaStateId) -> AtnResult<()> {
        if !self.dfa_enabled || !(MIN_DFA_EDGE..=MAX_DFA_EDGE).contains(&t) {
            return Ok(());
        }
        log_debug!("mode {}: edge s{} -{}-> {}", self.mode, from.index(), t, to);
        self.dfa()?.set_edge(from, (t - MIN_DFA_EDGE) as usize, to)
    }

    fn add_dfa_edge_configs(
        &self,
        from: DfaStateId,
        t: i32,
        mut reach: AtnConfigSet,
    ) -> AtnResult<DfaStateId> {
        let suppress_edge = reach.has_semantic_context;
        reach.has_semantic_context = false;
        let to = self.add_dfa_state(reach)?;
        if suppress_edge {
            log_debug!(
                "mode {}: edge s{} -{}-> s{} suppressed (predicated)",
                self.mode,
                from.index(),
                t,
                to.index()
            );
            return Ok(to);
        }
        self.add_dfa_edge(from, t, to)?;
        Ok(to)
    }

    fn add_dfa_state(&self, configs: AtnConfigSet) -> AtnResult<DfaStateId> {
        let mut first_stop = None;
        for config in configs.iter() {
            let state = self.atn.state(config.state)?;
            if state.is_rule_stop() {
                first_stop = Some((state.rule_index, config.lexer_action_executor.clone()));
                break;
            }
        }

        let mut proposed = DfaState::new(configs);
        if let Some((rule_index, executor)) = first_stop {
            proposed.is_accept_state = true;
            proposed.lexer_action_executor = executor;
            proposed.prediction = *self.atn.rule_to_token_type.get(rule_index).ok_or_else(|| {
                AtnError::invalid_atn(format!("no token type for rule {}", rule_index))
            })?;
        }
        Ok(self.dfa()?.add_state(proposed))
    }
}
