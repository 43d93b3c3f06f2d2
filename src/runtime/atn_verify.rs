//! Structural checks for ATN graphs
//!
//! An ATN that reaches the simulators is assumed to be well formed: closure
//! relies on the epsilon flags, decisions rely on their numbers, and lexers
//! reject precedence predicates outright. [`AtnVerifier`] reports every
//! violation it finds; [`Atn::verify`] fails on the first one.
//!
//! # Example
//!
//! ```
//! use parsanol_atn::runtime::{AtnBuilder, AtnVerifier};
//!
//! let mut builder = AtnBuilder::lexer();
//! builder.literal_rule("WORD", 1, "word");
//! let atn = builder.build().unwrap();
//! assert!(AtnVerifier::new(&atn).verify().is_empty());
//! ```

use std::fmt;

use super::atn::{Atn, AtnState, StateKind, Transition};
use super::error::{AtnError, AtnResult};

/// Kind of structural violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// A state's number differs from its position
    StateNumberMismatch,
    /// The epsilon-only flag disagrees with the transitions
    EpsilonFlagMismatch,
    /// A state mixes epsilon and consuming transitions
    MixedTransitions,
    /// A non-decision state branches
    UndecidedBranch,
    /// A decision state has no transitions
    MissingTransitions,
    /// A decision state has no decision number
    MissingDecisionNumber,
    /// The non-greedy flag is set outside a decision
    NonGreedyOnNonDecision,
    /// The rule start/stop/token tables disagree with the states
    RuleTableMismatch,
    /// A state number points outside the ATN
    TargetOutOfRange,
    /// A loop or block state points at the wrong kind of partner
    LoopMisLinked,
    /// A lexer ATN contains a precedence predicate
    PrecedenceInLexer,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StateNumberMismatch => write!(f, "state number mismatch"),
            Self::EpsilonFlagMismatch => write!(f, "epsilon flag mismatch"),
            Self::MixedTransitions => write!(f, "mixed transitions"),
            Self::UndecidedBranch => write!(f, "undecided branch"),
            Self::MissingTransitions => write!(f, "missing transitions"),
            Self::MissingDecisionNumber => write!(f, "missing decision number"),
            Self::NonGreedyOnNonDecision => write!(f, "non-greedy outside decision"),
            Self::RuleTableMismatch => write!(f, "rule table mismatch"),
            Self::TargetOutOfRange => write!(f, "target out of range"),
            Self::LoopMisLinked => write!(f, "loop mislinked"),
            Self::PrecedenceInLexer => write!(f, "precedence predicate in lexer"),
        }
    }
}

/// One structural violation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtnWarning {
    /// What is wrong
    pub kind: ViolationKind,
    /// State where it was detected
    pub state: usize,
    /// Human-readable detail
    pub message: String,
}

impl AtnWarning {
    fn new(kind: ViolationKind, state: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            state,
            message: message.into(),
        }
    }
}

impl fmt::Display for AtnWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[state {}] {}: {}", self.state, self.kind, self.message)
    }
}

/// Checks an [`Atn`] for structural violations
pub struct AtnVerifier<'a> {
    atn: &'a Atn,
    warnings: Vec<AtnWarning>,
}

impl<'a> AtnVerifier<'a> {
    /// Create a verifier for `atn`
    pub fn new(atn: &'a Atn) -> Self {
        Self {
            atn,
            warnings: Vec::new(),
        }
    }

    /// Run every check and return the violations found
    pub fn verify(mut self) -> Vec<AtnWarning> {
        for (index, state) in self.atn.states().iter().enumerate() {
            self.check_state(index, state);
        }
        self.check_rule_tables();
        self.check_tables();
        self.warnings
    }

    fn warn(&mut self, kind: ViolationKind, state: usize, message: impl Into<String>) {
        self.warnings.push(AtnWarning::new(kind, state, message));
    }

    fn in_range(&self, state: usize) -> bool {
        state < self.atn.states().len()
    }

    fn kind_of(&self, state: usize) -> Option<StateKind> {
        self.atn.states().get(state).map(|s| s.kind)
    }

    fn check_state(&mut self, index: usize, state: &AtnState) {
        if state.state_number != index {
            self.warn(
                ViolationKind::StateNumberMismatch,
                index,
                format!("numbered {}", state.state_number),
            );
        }

        let epsilon_only = !state.transitions.is_empty()
            && state.transitions.iter().all(Transition::is_epsilon);
        if epsilon_only != state.epsilon_only_transitions {
            self.warn(
                ViolationKind::EpsilonFlagMismatch,
                index,
                format!("flag is {}", state.epsilon_only_transitions),
            );
        }
        if !epsilon_only && state.transitions.len() > 1 {
            self.warn(
                ViolationKind::MixedTransitions,
                index,
                format!("{} transitions", state.transitions.len()),
            );
        }

        if state.is_decision() {
            if state.transitions.is_empty() {
                self.warn(ViolationKind::MissingTransitions, index, "decision without transitions");
            }
            if state.decision.is_none() {
                self.warn(ViolationKind::MissingDecisionNumber, index, "decision not defined");
            }
        } else {
            if state.transitions.len() > 1 && !state.is_rule_stop() {
                self.warn(
                    ViolationKind::UndecidedBranch,
                    index,
                    format!("{} transitions out of a non-decision state", state.transitions.len()),
                );
            }
            if state.non_greedy {
                self.warn(ViolationKind::NonGreedyOnNonDecision, index, "non-greedy flag ignored");
            }
        }

        for transition in &state.transitions {
            let target = transition.target();
            if !self.in_range(target) {
                self.warn(
                    ViolationKind::TargetOutOfRange,
                    index,
                    format!("transition to {}", target),
                );
            }
            match transition {
                Transition::Rule { follow_state, .. } if !self.in_range(*follow_state) => {
                    self.warn(
                        ViolationKind::TargetOutOfRange,
                        index,
                        format!("follow state {}", follow_state),
                    );
                }
                Transition::Precedence { .. } if self.atn.is_lexer() => {
                    self.warn(
                        ViolationKind::PrecedenceInLexer,
                        index,
                        "lexers cannot evaluate precedence predicates",
                    );
                }
                _ => {}
            }
        }

        self.check_links(index, state.kind);
    }

    fn check_links(&mut self, index: usize, kind: StateKind) {
        match kind {
            StateKind::StarLoopEntry {
                loop_back_state, ..
            } => {
                if !matches!(self.kind_of(loop_back_state), Some(StateKind::StarLoopBack)) {
                    self.warn(
                        ViolationKind::LoopMisLinked,
                        index,
                        format!("loop back state {} is not a star loop back", loop_back_state),
                    );
                }
            }
            StateKind::LoopEnd { loop_back_state } => {
                if !matches!(
                    self.kind_of(loop_back_state),
                    Some(StateKind::StarLoopBack) | Some(StateKind::PlusLoopBack)
                ) {
                    self.warn(
                        ViolationKind::LoopMisLinked,
                        index,
                        format!("loop end not linked to a loop back ({})", loop_back_state),
                    );
                }
            }
            StateKind::PlusBlockStart {
                end_state,
                loop_back_state,
            } => {
                if !matches!(self.kind_of(loop_back_state), Some(StateKind::PlusLoopBack)) {
                    self.warn(
                        ViolationKind::LoopMisLinked,
                        index,
                        format!("loop back state {} is not a plus loop back", loop_back_state),
                    );
                }
                self.check_block_end(index, end_state);
            }
            StateKind::BlockStart { end_state } | StateKind::StarBlockStart { end_state } => {
                self.check_block_end(index, end_state);
            }
            StateKind::BlockEnd { start_state } => {
                if !self.in_range(start_state) {
                    self.warn(
                        ViolationKind::TargetOutOfRange,
                        index,
                        format!("block start {}", start_state),
                    );
                }
            }
            StateKind::RuleStart { stop_state, .. } => {
                if !matches!(self.kind_of(stop_state), Some(StateKind::RuleStop)) {
                    self.warn(
                        ViolationKind::RuleTableMismatch,
                        index,
                        format!("stop state {} is not a rule stop", stop_state),
                    );
                }
            }
            _ => {}
        }
    }

    fn check_block_end(&mut self, index: usize, end_state: usize) {
        if !matches!(self.kind_of(end_state), Some(StateKind::BlockEnd { .. })) {
            self.warn(
                ViolationKind::LoopMisLinked,
                index,
                format!("end state {} is not a block end", end_state),
            );
        }
    }

    fn check_rule_tables(&mut self) {
        let atn = self.atn;
        if atn.rule_to_start_state.len() != atn.rule_to_stop_state.len() {
            self.warn(
                ViolationKind::RuleTableMismatch,
                0,
                format!(
                    "{} start states but {} stop states",
                    atn.rule_to_start_state.len(),
                    atn.rule_to_stop_state.len()
                ),
            );
        }
        if atn.is_lexer() && atn.rule_to_token_type.len() != atn.rule_to_start_state.len() {
            self.warn(
                ViolationKind::RuleTableMismatch,
                0,
                format!(
                    "{} token types for {} rules",
                    atn.rule_to_token_type.len(),
                    atn.rule_to_start_state.len()
                ),
            );
        }
        for (rule, (&start, &stop)) in atn
            .rule_to_start_state
            .iter()
            .zip(&atn.rule_to_stop_state)
            .enumerate()
        {
            match atn.states().get(start) {
                Some(s) if s.rule_index == rule => match s.kind {
                    StateKind::RuleStart { stop_state, .. } if stop_state == stop => {}
                    _ => self.warn(
                        ViolationKind::RuleTableMismatch,
                        start,
                        format!("rule {} start does not point at stop state {}", rule, stop),
                    ),
                },
                _ => self.warn(
                    ViolationKind::RuleTableMismatch,
                    start,
                    format!("rule {} has no start state", rule),
                ),
            }
            match atn.states().get(stop) {
                Some(s) if s.is_rule_stop() && s.rule_index == rule => {}
                _ => self.warn(
                    ViolationKind::RuleTableMismatch,
                    stop,
                    format!("rule {} has no stop state", rule),
                ),
            }
        }
    }

    fn check_tables(&mut self) {
        let atn = self.atn;
        for (decision, &state) in atn.decision_to_state.iter().enumerate() {
            match atn.states().get(state) {
                Some(s) if s.decision == Some(decision) => {}
                Some(_) => self.warn(
                    ViolationKind::MissingDecisionNumber,
                    state,
                    format!("decision {} not recorded on its state", decision),
                ),
                None => self.warn(
                    ViolationKind::TargetOutOfRange,
                    state,
                    format!("decision {} out of range", decision),
                ),
            }
        }
        for (mode, &state) in atn.mode_to_start_state.iter().enumerate() {
            if !matches!(self.kind_of(state), Some(StateKind::TokenStart)) {
                self.warn(
                    ViolationKind::RuleTableMismatch,
                    state,
                    format!("mode {} does not start at a token start state", mode),
                );
            }
        }
    }
}

impl Atn {
    /// Fail with [`AtnError::InvalidAtn`] on the first structural violation
    pub fn verify(&self) -> AtnResult<()> {
        match AtnVerifier::new(self).verify().into_iter().next() {
            Some(warning) => Err(AtnError::invalid_atn(warning.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::atn::GrammarType;
    use crate::runtime::atn_builder::AtnBuilder;

    fn kinds(atn: &Atn) -> Vec<ViolationKind> {
        AtnVerifier::new(atn).verify().into_iter().map(|w| w.kind).collect()
    }

    #[test]
    fn test_built_atn_is_clean() {
        let mut builder = AtnBuilder::lexer();
        builder.literal_rule("A", 1, "ab");
        builder.literal_rule("B", 2, "a");
        let atn = builder.build().unwrap();
        assert!(kinds(&atn).is_empty());
        assert!(atn.verify().is_ok());
    }

    #[test]
    fn test_precedence_in_lexer() {
        let mut atn = Atn::new(GrammarType::Lexer, 1);
        let start = atn.add_state(0, StateKind::Basic);
        let stop = atn.add_state(0, StateKind::RuleStop);
        atn.states_mut()[start].kind = StateKind::RuleStart {
            stop_state: stop,
            left_recursive: false,
        };
        atn.states_mut()[start]
            .transitions
            .push(Transition::Precedence {
                target: stop,
                precedence: 1,
            });
        atn.rule_to_token_type.push(1);
        atn.link().unwrap();
        assert_eq!(kinds(&atn), vec![ViolationKind::PrecedenceInLexer]);
        assert!(matches!(atn.verify(), Err(AtnError::InvalidAtn { .. })));
    }

    #[test]
    fn test_stale_flags_and_bad_targets() {
        let mut atn = Atn::new(GrammarType::Parser, 1);
        let a = atn.add_state(0, StateKind::Basic);
        atn.states_mut()[a].transitions.push(Transition::Atom { target: 9, label: 1 });
        atn.states_mut()[a].epsilon_only_transitions = true;
        atn.states_mut()[a].non_greedy = true;
        let found = kinds(&atn);
        assert!(found.contains(&ViolationKind::EpsilonFlagMismatch));
        assert!(found.contains(&ViolationKind::TargetOutOfRange));
        assert!(found.contains(&ViolationKind::NonGreedyOnNonDecision));
    }

    #[test]
    fn test_decision_without_number() {
        let mut atn = Atn::new(GrammarType::Parser, 1);
        let block = atn.add_state(0, StateKind::Basic);
        let end = atn.add_state(0, StateKind::BlockEnd { start_state: block });
        atn.states_mut()[block].kind = StateKind::BlockStart { end_state: end };
        atn.states_mut()[block].transitions.push(Transition::Epsilon {
            target: end,
            outermost_precedence_return: None,
        });
        atn.states_mut()[block].epsilon_only_transitions = true;
        assert!(kinds(&atn).contains(&ViolationKind::MissingDecisionNumber));
    }
}
