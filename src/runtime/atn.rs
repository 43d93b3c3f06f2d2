//! The augmented transition network
//!
//! An [`Atn`] is the recognizer's graph: typed states joined by typed
//! transitions. It is built once (by [`AtnBuilder`](super::AtnBuilder) or
//! loaded from JSON) and then shared read-only by every simulator.
//!
//! Rule-stop states never carry stored transitions. [`Atn::link`] derives
//! them from the rule transitions: each call site adds an epsilon edge from
//! the called rule's stop state back to the caller's follow state.
//!
//! # Example
//!
//! ```rust
//! use parsanol_atn::runtime::Atn;
//!
//! let json = r#"{
//!     "grammar_type": "Lexer",
//!     "max_token_type": 1,
//!     "states": [
//!         { "state_number": 0, "rule_index": 0, "kind": "TokenStart",
//!           "transitions": [ { "Epsilon": { "target": 1 } } ] },
//!         { "state_number": 1, "rule_index": 0,
//!           "kind": { "RuleStart": { "stop_state": 3, "left_recursive": false } },
//!           "transitions": [ { "Atom": { "target": 2, "label": 120 } } ] },
//!         { "state_number": 2, "rule_index": 0, "kind": "Basic",
//!           "transitions": [ { "Epsilon": { "target": 3 } } ] },
//!         { "state_number": 3, "rule_index": 0, "kind": "RuleStop" }
//!     ],
//!     "decision_to_state": [0],
//!     "rule_to_start_state": [1],
//!     "rule_to_stop_state": [3],
//!     "rule_to_token_type": [1],
//!     "mode_to_start_state": [0]
//! }"#;
//!
//! let atn = Atn::from_json(json).unwrap();
//! assert!(atn.state(1).unwrap().epsilon_only_transitions == false);
//! assert_eq!(atn.num_decisions(), 1);
//! ```

use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use super::error::{AtnError, AtnResult};
use super::interval_set::IntervalSet;
use super::lexer_action::LexerAction;
use super::ll1::Ll1Analyzer;
use super::parser_support::RuleContext;
use super::token::{EOF, EPSILON};

/// Whether the ATN drives a lexer or a parser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GrammarType {
    /// Character-level recognizer
    Lexer,
    /// Token-level recognizer
    Parser,
}

/// The structural role of a state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateKind {
    /// Plain state
    Basic,
    /// Entry of a rule
    RuleStart {
        /// The rule's stop state
        stop_state: usize,
        /// Whether the rule was rewritten from left recursion
        left_recursive: bool,
    },
    /// Exit of a rule
    RuleStop,
    /// Start of a `( ... | ... )` block
    BlockStart {
        /// Matching block end
        end_state: usize,
    },
    /// Start of the block inside `( ... )+`
    PlusBlockStart {
        /// Matching block end
        end_state: usize,
        /// The loop-back decision
        loop_back_state: usize,
    },
    /// Start of the block inside `( ... )*`
    StarBlockStart {
        /// Matching block end
        end_state: usize,
    },
    /// End of a block
    BlockEnd {
        /// Matching block start
        start_state: usize,
    },
    /// The mode entry state of a lexer, one alternative per token rule
    TokenStart,
    /// The decision entering or skipping a `( ... )*` loop
    StarLoopEntry {
        /// The loop's back state
        loop_back_state: usize,
        /// Whether this decision selects precedence climbing
        precedence_decision: bool,
    },
    /// The edge back to a star loop entry
    StarLoopBack,
    /// The decision repeating or leaving a `( ... )+` loop
    PlusLoopBack,
    /// Exit of a loop
    LoopEnd {
        /// The loop's back state
        loop_back_state: usize,
    },
}

impl StateKind {
    /// Whether states of this kind choose between alternatives
    pub fn is_decision(&self) -> bool {
        matches!(
            self,
            StateKind::BlockStart { .. }
                | StateKind::PlusBlockStart { .. }
                | StateKind::StarBlockStart { .. }
                | StateKind::TokenStart
                | StateKind::StarLoopEntry { .. }
                | StateKind::PlusLoopBack
        )
    }
}

/// An edge of the ATN
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Transition {
    /// Free move
    Epsilon {
        /// Target state
        target: usize,
        /// Rule index when this edge returns from the outermost call of a
        /// left-recursive rule
        #[serde(default)]
        outermost_precedence_return: Option<usize>,
    },
    /// One symbol
    Atom {
        /// Target state
        target: usize,
        /// The symbol
        label: i32,
    },
    /// Closed symbol range
    Range {
        /// Target state
        target: usize,
        /// Lowest symbol
        start: i32,
        /// Highest symbol
        stop: i32,
    },
    /// Any symbol of a set
    Set {
        /// Target state
        target: usize,
        /// Accepted symbols
        set: IntervalSet,
    },
    /// Any vocabulary symbol outside a set
    NotSet {
        /// Target state
        target: usize,
        /// Rejected symbols
        set: IntervalSet,
    },
    /// Any vocabulary symbol
    Wildcard {
        /// Target state
        target: usize,
    },
    /// Rule invocation
    Rule {
        /// Start state of the called rule
        target: usize,
        /// Index of the called rule
        rule_index: usize,
        /// Precedence argument of a left-recursive call
        precedence: i32,
        /// State to continue from after the call returns
        follow_state: usize,
    },
    /// Semantic predicate
    Predicate {
        /// Target state
        target: usize,
        /// Rule containing the predicate
        rule_index: usize,
        /// Predicate index within the rule
        pred_index: usize,
        /// Whether the predicate reads the rule context
        ctx_dependent: bool,
    },
    /// Precedence predicate of a left-recursive rule
    Precedence {
        /// Target state
        target: usize,
        /// Minimum precedence
        precedence: i32,
    },
    /// Embedded action or lexer command
    Action {
        /// Target state
        target: usize,
        /// Rule containing the action
        rule_index: usize,
        /// Index into the lexer action table
        action_index: usize,
        /// Whether the action reads the rule context
        ctx_dependent: bool,
    },
}

impl Transition {
    /// The state this edge leads to
    pub fn target(&self) -> usize {
        match self {
            Transition::Epsilon { target, .. }
            | Transition::Atom { target, .. }
            | Transition::Range { target, .. }
            | Transition::Set { target, .. }
            | Transition::NotSet { target, .. }
            | Transition::Wildcard { target }
            | Transition::Rule { target, .. }
            | Transition::Predicate { target, .. }
            | Transition::Precedence { target, .. }
            | Transition::Action { target, .. } => *target,
        }
    }

    /// Whether following the edge consumes no input
    pub fn is_epsilon(&self) -> bool {
        matches!(
            self,
            Transition::Epsilon { .. }
                | Transition::Rule { .. }
                | Transition::Predicate { .. }
                | Transition::Precedence { .. }
                | Transition::Action { .. }
        )
    }

    /// Whether the edge accepts `symbol` within the vocabulary `[min, max]`
    pub fn matches(&self, symbol: i32, min_vocab: i32, max_vocab: i32) -> bool {
        match self {
            Transition::Atom { label, .. } => *label == symbol,
            Transition::Range { start, stop, .. } => symbol >= *start && symbol <= *stop,
            Transition::Set { set, .. } => set.contains(symbol),
            Transition::NotSet { set, .. } => {
                symbol >= min_vocab && symbol <= max_vocab && !set.contains(symbol)
            }
            Transition::Wildcard { .. } => symbol >= min_vocab && symbol <= max_vocab,
            _ => false,
        }
    }

    /// The symbols a consuming edge is labelled with
    pub fn label(&self) -> Option<IntervalSet> {
        match self {
            Transition::Atom { label, .. } => Some(IntervalSet::single(*label)),
            Transition::Range { start, stop, .. } => Some(IntervalSet::of(*start, *stop)),
            Transition::Set { set, .. } | Transition::NotSet { set, .. } => Some(set.clone()),
            _ => None,
        }
    }
}

/// A node of the ATN
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtnState {
    /// Index of the state in [`Atn::states`]
    pub state_number: usize,
    /// Rule the state belongs to
    pub rule_index: usize,
    /// Structural role
    pub kind: StateKind,
    /// Outgoing edges
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Whether every outgoing edge is an epsilon edge
    #[serde(default)]
    pub epsilon_only_transitions: bool,
    /// Decision number of a decision state
    #[serde(default)]
    pub decision: Option<usize>,
    /// Whether the decision is non-greedy (`*?`, `+?`, `??`)
    #[serde(default)]
    pub non_greedy: bool,
}

impl AtnState {
    /// Create a state without transitions
    pub fn new(state_number: usize, rule_index: usize, kind: StateKind) -> Self {
        Self {
            state_number,
            rule_index,
            kind,
            transitions: Vec::new(),
            epsilon_only_transitions: false,
            decision: None,
            non_greedy: false,
        }
    }

    /// Whether this is a rule stop state
    #[inline]
    pub fn is_rule_stop(&self) -> bool {
        matches!(self.kind, StateKind::RuleStop)
    }

    /// Whether this state chooses between alternatives
    #[inline]
    pub fn is_decision(&self) -> bool {
        self.kind.is_decision()
    }

    /// Whether this is a non-greedy decision
    #[inline]
    pub fn is_non_greedy_decision(&self) -> bool {
        self.non_greedy && self.is_decision()
    }

    /// Whether this is the precedence decision of a left-recursive rule
    #[inline]
    pub fn is_precedence_decision(&self) -> bool {
        matches!(
            self.kind,
            StateKind::StarLoopEntry {
                precedence_decision: true,
                ..
            }
        )
    }
}

#[derive(Serialize, Deserialize)]
struct AtnData {
    grammar_type: GrammarType,
    max_token_type: i32,
    states: Vec<AtnState>,
    #[serde(default)]
    decision_to_state: Vec<usize>,
    #[serde(default)]
    rule_to_start_state: Vec<usize>,
    #[serde(default)]
    rule_to_stop_state: Vec<usize>,
    #[serde(default)]
    rule_to_token_type: Vec<i32>,
    #[serde(default)]
    lexer_actions: Vec<LexerAction>,
    #[serde(default)]
    mode_to_start_state: Vec<usize>,
}

impl TryFrom<AtnData> for Atn {
    type Error = AtnError;

    fn try_from(data: AtnData) -> AtnResult<Self> {
        let mut atn = Atn {
            grammar_type: data.grammar_type,
            max_token_type: data.max_token_type,
            states: data.states,
            decision_to_state: data.decision_to_state,
            rule_to_start_state: data.rule_to_start_state,
            rule_to_stop_state: data.rule_to_stop_state,
            rule_to_token_type: data.rule_to_token_type,
            lexer_actions: data.lexer_actions,
            mode_to_start_state: data.mode_to_start_state,
            next_tokens_cache: Vec::new(),
        };
        atn.link()?;
        atn.verify()?;
        Ok(atn)
    }
}

/// A complete, linked ATN
#[derive(Debug, Serialize, Deserialize)]
#[serde(try_from = "AtnData")]
pub struct Atn {
    /// Lexer or parser
    pub grammar_type: GrammarType,
    /// Largest token type of the vocabulary
    pub max_token_type: i32,
    states: Vec<AtnState>,
    /// State number of each decision, by decision number
    pub decision_to_state: Vec<usize>,
    /// Start state of each rule
    pub rule_to_start_state: Vec<usize>,
    /// Stop state of each rule
    pub rule_to_stop_state: Vec<usize>,
    /// Token type produced by each lexer rule
    pub rule_to_token_type: Vec<i32>,
    /// Lexer command table referenced by action transitions
    pub lexer_actions: Vec<LexerAction>,
    /// Entry state of each lexer mode
    pub mode_to_start_state: Vec<usize>,
    #[serde(skip)]
    next_tokens_cache: Vec<OnceLock<IntervalSet>>,
}

impl Atn {
    /// Create an empty ATN
    pub fn new(grammar_type: GrammarType, max_token_type: i32) -> Self {
        Self {
            grammar_type,
            max_token_type,
            states: Vec::new(),
            decision_to_state: Vec::new(),
            rule_to_start_state: Vec::new(),
            rule_to_stop_state: Vec::new(),
            rule_to_token_type: Vec::new(),
            lexer_actions: Vec::new(),
            mode_to_start_state: Vec::new(),
            next_tokens_cache: Vec::new(),
        }
    }

    /// Load a linked and verified ATN from its JSON form
    pub fn from_json(json: &str) -> AtnResult<Self> {
        let mut atn: Atn = serde_json::from_str(json)?;
        atn.link()?;
        atn.verify()?;
        Ok(atn)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> AtnResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Whether this ATN drives a lexer
    #[inline]
    pub fn is_lexer(&self) -> bool {
        self.grammar_type == GrammarType::Lexer
    }

    /// All states, indexed by state number
    #[inline]
    pub fn states(&self) -> &[AtnState] {
        &self.states
    }

    pub(crate) fn states_mut(&mut self) -> &mut Vec<AtnState> {
        &mut self.states
    }

    /// Look up a state
    #[inline]
    pub fn state(&self, state_number: usize) -> AtnResult<&AtnState> {
        self.states.get(state_number).ok_or(AtnError::InvalidStateNumber {
            state: state_number as isize,
        })
    }

    /// Append a state and return its number
    pub fn add_state(&mut self, rule_index: usize, kind: StateKind) -> usize {
        let number = self.states.len();
        self.states.push(AtnState::new(number, rule_index, kind));
        self.next_tokens_cache.push(OnceLock::new());
        number
    }

    /// Register `state` as the next decision and return its number
    pub fn define_decision_state(&mut self, state: usize) -> usize {
        let decision = self.decision_to_state.len();
        self.decision_to_state.push(state);
        if let Some(s) = self.states.get_mut(state) {
            s.decision = Some(decision);
        }
        decision
    }

    /// State of decision `decision`
    pub fn decision_state(&self, decision: usize) -> Option<&AtnState> {
        self.decision_to_state
            .get(decision)
            .and_then(|&s| self.states.get(s))
    }

    /// Number of decisions
    #[inline]
    pub fn num_decisions(&self) -> usize {
        self.decision_to_state.len()
    }

    /// Number of rules
    #[inline]
    pub fn num_rules(&self) -> usize {
        self.rule_to_start_state.len()
    }

    /// Derive the rule-stop return edges, epsilon flags and lookup tables
    ///
    /// Safe to call repeatedly: derived edges are rebuilt from scratch.
    pub fn link(&mut self) -> AtnResult<()> {
        for (i, state) in self.states.iter_mut().enumerate() {
            state.state_number = i;
        }

        if self.rule_to_start_state.is_empty() || self.rule_to_stop_state.is_empty() {
            let rules = self.states.iter().map(|s| s.rule_index + 1).max().unwrap_or(0);
            let mut starts = vec![usize::MAX; rules];
            let mut stops = vec![usize::MAX; rules];
            for state in &self.states {
                match state.kind {
                    StateKind::RuleStart { .. } => starts[state.rule_index] = state.state_number,
                    StateKind::RuleStop => stops[state.rule_index] = state.state_number,
                    _ => {}
                }
            }
            if starts.iter().chain(stops.iter()).any(|&s| s == usize::MAX) {
                return Err(AtnError::invalid_atn("every rule needs a start and a stop state"));
            }
            self.rule_to_start_state = starts;
            self.rule_to_stop_state = stops;
        }
        if self.rule_to_start_state.len() != self.rule_to_stop_state.len() {
            return Err(AtnError::invalid_atn(format!(
                "{} rule start states but {} rule stop states",
                self.rule_to_start_state.len(),
                self.rule_to_stop_state.len()
            )));
        }

        for state in self.states.iter_mut() {
            if state.is_rule_stop() {
                state.transitions.clear();
            }
        }

        let mut returns: Vec<(usize, Transition)> = Vec::new();
        for state in &self.states {
            for transition in &state.transitions {
                if let Transition::Rule {
                    rule_index,
                    precedence,
                    follow_state,
                    ..
                } = transition
                {
                    let start = *self.rule_to_start_state.get(*rule_index).ok_or_else(|| {
                        AtnError::invalid_atn(format!("rule transition to unknown rule {}", rule_index))
                    })?;
                    let left_recursive = matches!(
                        self.states.get(start).map(|s| s.kind),
                        Some(StateKind::RuleStart {
                            left_recursive: true,
                            ..
                        })
                    );
                    let outermost_precedence_return = if left_recursive && *precedence == 0 {
                        Some(*rule_index)
                    } else {
                        None
                    };
                    let stop = *self.rule_to_stop_state.get(*rule_index).ok_or_else(|| {
                        AtnError::invalid_atn(format!("rule {} has no stop state", rule_index))
                    })?;
                    returns.push((
                        stop,
                        Transition::Epsilon {
                            target: *follow_state,
                            outermost_precedence_return,
                        },
                    ));
                }
            }
        }
        for (stop, transition) in returns {
            let state = self.states.get_mut(stop).ok_or(AtnError::InvalidStateNumber {
                state: stop as isize,
            })?;
            if !state.transitions.contains(&transition) {
                state.transitions.push(transition);
            }
        }

        for state in self.states.iter_mut() {
            state.epsilon_only_transitions = !state.transitions.is_empty()
                && state.transitions.iter().all(Transition::is_epsilon);
        }

        for (decision, &s) in self.decision_to_state.iter().enumerate() {
            let state = self.states.get_mut(s).ok_or(AtnError::InvalidStateNumber {
                state: s as isize,
            })?;
            state.decision = Some(decision);
        }

        self.next_tokens_cache = (0..self.states.len()).map(|_| OnceLock::new()).collect();
        Ok(())
    }

    // ========================================================================
    // Follow sets
    // ========================================================================

    /// Tokens that can follow `state` within its rule, `EPSILON` if the
    /// rule end is reachable; computed once per state
    pub fn next_tokens(&self, state: usize) -> AtnResult<&IntervalSet> {
        self.state(state)?;
        match self.next_tokens_cache.get(state) {
            Some(cell) => {
                if let Some(set) = cell.get() {
                    return Ok(set);
                }
                let computed = Ll1Analyzer::new(self).look(state, None, None)?;
                Ok(cell.get_or_init(|| computed))
            }
            None => Err(AtnError::illegal_state("ATN used before link()")),
        }
    }

    /// Tokens that can follow `state` given the invocation chain `ctx`
    pub fn next_tokens_in_context(
        &self,
        state: usize,
        ctx: Option<&RuleContext>,
    ) -> AtnResult<IntervalSet> {
        Ll1Analyzer::new(self).look(state, None, ctx)
    }

    /// Tokens that may follow `state_number` given the full invocation chain
    ///
    /// Predicates are assumed true. `EOF` is included when the outermost
    /// rule can end without consuming more input.
    pub fn expected_tokens(
        &self,
        state_number: isize,
        ctx: Option<&RuleContext>,
    ) -> AtnResult<IntervalSet> {
        if state_number < 0 || state_number as usize >= self.states.len() {
            return Err(AtnError::InvalidStateNumber {
                state: state_number,
            });
        }
        let mut following = self.next_tokens(state_number as usize)?;
        if !following.contains(EPSILON) {
            return Ok(following.clone());
        }

        let mut expected = following.clone();
        expected.remove_one(EPSILON);
        let mut ctx = ctx;
        while let Some(current) = ctx {
            let invoking = match current.invoking_state() {
                Some(s) => s,
                None => break,
            };
            if !following.contains(EPSILON) {
                break;
            }
            following = self.next_tokens(self.follow_state_of(invoking)?)?;
            expected.add_set(following);
            expected.remove_one(EPSILON);
            ctx = current.parent();
        }
        if following.contains(EPSILON) {
            expected.add_one(EOF);
        }
        Ok(expected)
    }

    /// Follow state of the rule transition leaving `invoking_state`
    pub(crate) fn follow_state_of(&self, invoking_state: usize) -> AtnResult<usize> {
        match self.state(invoking_state)?.transitions.first() {
            Some(Transition::Rule { follow_state, .. }) => Ok(*follow_state),
            _ => Err(AtnError::invalid_atn(format!(
                "invoking state {} does not start with a rule transition",
                invoking_state
            ))),
        }
    }
}
