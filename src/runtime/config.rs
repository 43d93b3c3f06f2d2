//! ATN configurations
//!
//! A configuration is one hypothesis of the simulator: "the recognizer may be
//! at `state`, having chosen `alt`, with return stack `context` and the
//! predicates in `semantic_context` still outstanding." Lexer configurations
//! also carry deferred actions and the non-greedy marker.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::atn::AtnState;
use super::lexer_action::LexerActionExecutor;
use super::prediction_context::PredictionContext;
use super::semantic_context::SemanticContext;

/// One simulator hypothesis
///
/// Equality and hashing cover every field. Config sets that should ignore
/// the context key on [`ConfigKey`] instead.
#[derive(Debug, Clone)]
pub struct AtnConfig {
    /// ATN state number
    pub state: usize,
    /// Predicted alternative (1-based)
    pub alt: u32,
    /// Return stack
    pub context: Arc<PredictionContext>,
    /// Outstanding predicates
    pub semantic_context: SemanticContext,
    /// How many rule stops were popped past the decision's own rule
    pub reaches_into_outer_context: i32,
    /// Exempt from the precedence filter
    pub precedence_filter_suppressed: bool,
    /// Deferred lexer actions
    pub lexer_action_executor: Option<Arc<LexerActionExecutor>>,
    /// Whether a non-greedy decision was traversed
    pub passed_through_non_greedy_decision: bool,
}

impl AtnConfig {
    /// A parser configuration without predicates
    pub fn new(state: usize, alt: u32, context: Arc<PredictionContext>) -> Self {
        Self {
            state,
            alt,
            context,
            semantic_context: SemanticContext::NONE,
            reaches_into_outer_context: 0,
            precedence_filter_suppressed: false,
            lexer_action_executor: None,
            passed_through_non_greedy_decision: false,
        }
    }

    /// A lexer start configuration
    pub fn lexer(target: &AtnState, alt: u32, context: Arc<PredictionContext>) -> Self {
        let mut config = Self::new(target.state_number, alt, context);
        config.passed_through_non_greedy_decision = target.is_non_greedy_decision();
        config
    }

    /// Copy of `self` moved to `target`, keeping context and actions
    pub fn lexer_transition(&self, target: &AtnState) -> Self {
        self.lexer_with(target, self.context.clone(), self.lexer_action_executor.clone())
    }

    /// Copy of `self` moved to `target` with a new context
    pub fn lexer_with_context(&self, target: &AtnState, context: Arc<PredictionContext>) -> Self {
        self.lexer_with(target, context, self.lexer_action_executor.clone())
    }

    /// Copy of `self` moved to `target` with a new action executor
    pub fn lexer_with_executor(
        &self,
        target: &AtnState,
        executor: Option<Arc<LexerActionExecutor>>,
    ) -> Self {
        self.lexer_with(target, self.context.clone(), executor)
    }

    fn lexer_with(
        &self,
        target: &AtnState,
        context: Arc<PredictionContext>,
        lexer_action_executor: Option<Arc<LexerActionExecutor>>,
    ) -> Self {
        Self {
            state: target.state_number,
            alt: self.alt,
            context,
            semantic_context: self.semantic_context.clone(),
            reaches_into_outer_context: self.reaches_into_outer_context,
            precedence_filter_suppressed: self.precedence_filter_suppressed,
            lexer_action_executor,
            passed_through_non_greedy_decision: self.passed_through_non_greedy_decision
                || target.is_non_greedy_decision(),
        }
    }

    /// Copy of `self` with another semantic context
    pub fn with_semantic_context(&self, semantic_context: SemanticContext) -> Self {
        Self {
            semantic_context,
            ..self.clone()
        }
    }

    /// Outer-context depth without the suppression bit
    #[inline]
    pub fn outer_context_depth(&self) -> i32 {
        self.reaches_into_outer_context
    }

    /// The key used by parser-style config sets
    #[inline]
    pub fn key(&self) -> ConfigKey {
        ConfigKey {
            state: self.state,
            alt: self.alt,
            semantic_context: self.semantic_context.clone(),
        }
    }
}

impl PartialEq for AtnConfig {
    fn eq(&self, other: &Self) -> bool {
        self.state == other.state
            && self.alt == other.alt
            && (Arc::ptr_eq(&self.context, &other.context) || self.context == other.context)
            && self.semantic_context == other.semantic_context
            && self.precedence_filter_suppressed == other.precedence_filter_suppressed
            && self.passed_through_non_greedy_decision == other.passed_through_non_greedy_decision
            && self.lexer_action_executor == other.lexer_action_executor
    }
}

impl Eq for AtnConfig {}

impl Hash for AtnConfig {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.state.hash(state);
        self.alt.hash(state);
        self.context.hash(state);
        self.semantic_context.hash(state);
        self.passed_through_non_greedy_decision.hash(state);
        self.lexer_action_executor.hash(state);
    }
}

impl fmt::Display for AtnConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},[{}]", self.state, self.alt, self.context)?;
        if !self.semantic_context.is_none() {
            write!(f, ",{}", self.semantic_context)?;
        }
        if self.reaches_into_outer_context > 0 {
            write!(f, ",up={}", self.reaches_into_outer_context)?;
        }
        write!(f, ")")
    }
}

/// Identity of a configuration inside a parser-style set
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    /// ATN state number
    pub state: usize,
    /// Predicted alternative
    pub alt: u32,
    /// Outstanding predicates
    pub semantic_context: SemanticContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::atn::StateKind;

    fn state(number: usize, kind: StateKind, non_greedy: bool) -> AtnState {
        let mut s = AtnState::new(number, 0, kind);
        s.non_greedy = non_greedy;
        s
    }

    #[test]
    fn test_non_greedy_flag_is_sticky() {
        let greedy = state(1, StateKind::Basic, false);
        let loop_entry = state(
            2,
            StateKind::StarLoopEntry {
                loop_back_state: 3,
                precedence_decision: false,
            },
            true,
        );
        let start = AtnConfig::lexer(&greedy, 1, PredictionContext::empty());
        assert!(!start.passed_through_non_greedy_decision);
        let entered = start.lexer_transition(&loop_entry);
        assert!(entered.passed_through_non_greedy_decision);
        assert!(entered.lexer_transition(&greedy).passed_through_non_greedy_decision);
    }

    #[test]
    fn test_non_greedy_needs_decision_state() {
        // the flag on a plain state has no effect
        let plain = state(4, StateKind::Basic, true);
        let config = AtnConfig::lexer(&plain, 1, PredictionContext::empty());
        assert!(!config.passed_through_non_greedy_decision);
    }

    #[test]
    fn test_key_ignores_context() {
        let a = AtnConfig::new(3, 1, PredictionContext::empty());
        let b = AtnConfig::new(
            3,
            1,
            PredictionContext::singleton(Some(PredictionContext::empty()), 9),
        );
        assert_ne!(a, b);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_display() {
        let mut config = AtnConfig::new(7, 2, PredictionContext::empty());
        config.reaches_into_outer_context = 1;
        assert_eq!(config.to_string(), "(7,2,[$],up=1)");
    }
}
