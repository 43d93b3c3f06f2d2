//! Rule bookkeeping for generated parsers
//!
//! A generated parser calls into [`ParserSupport`] as it enters and leaves
//! rules. The support object tracks the current ATN state, the chain of
//! [`RuleContext`]s and the precedence stack of left-recursive rules, and
//! answers the queries prediction and error reporting need: which tokens
//! are expected here and whether a semantic context holds.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parsanol_atn::runtime::atn_builder::*;
//! use parsanol_atn::runtime::ParserSupport;
//!
//! let mut builder = AtnBuilder::parser(2);
//! builder.parser_rule("s", seq(vec![token(1), token(2)]));
//! let atn = Arc::new(builder.build().unwrap());
//!
//! let mut parser = ParserSupport::new(atn.clone());
//! parser.enter_rule(atn.rule_to_start_state[0], 0);
//! assert!(parser.is_expected_token(1).unwrap());
//! assert!(!parser.is_expected_token(2).unwrap());
//! ```

use std::fmt;
use std::sync::Arc;

use super::atn::{Atn, Transition};
use super::error::{AtnError, AtnResult};
use super::interval_set::IntervalSet;
use super::semantic_context::{Recognizer, SemanticContext};
use super::token::{EOF, EPSILON};

/// One rule invocation
///
/// Contexts are immutable and shared: a child holds its caller through an
/// `Arc`, so prediction can keep a chain alive after the parser moved on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleContext {
    parent: Option<Arc<RuleContext>>,
    invoking_state: Option<usize>,
    rule_index: usize,
}

impl RuleContext {
    /// The outermost invocation of `rule_index`
    pub fn root(rule_index: usize) -> Arc<Self> {
        Arc::new(Self {
            parent: None,
            invoking_state: None,
            rule_index,
        })
    }

    /// An invocation of `rule_index` from `invoking_state` inside `parent`
    pub fn child(parent: &Arc<Self>, invoking_state: usize, rule_index: usize) -> Arc<Self> {
        Arc::new(Self {
            parent: Some(Arc::clone(parent)),
            invoking_state: Some(invoking_state),
            rule_index,
        })
    }

    fn with_parent(
        parent: Option<Arc<Self>>,
        invoking_state: Option<usize>,
        rule_index: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            parent,
            invoking_state,
            rule_index,
        })
    }

    /// The caller, if any
    #[inline]
    pub fn parent(&self) -> Option<&RuleContext> {
        self.parent.as_deref()
    }

    /// The caller as a shared handle
    #[inline]
    pub fn parent_arc(&self) -> Option<&Arc<RuleContext>> {
        self.parent.as_ref()
    }

    /// State holding the rule transition that invoked this rule
    ///
    /// `None` for the outermost invocation.
    #[inline]
    pub fn invoking_state(&self) -> Option<usize> {
        self.invoking_state
    }

    /// Rule being matched
    #[inline]
    pub fn rule_index(&self) -> usize {
        self.rule_index
    }

    /// Number of invocations in the chain, this one included
    pub fn depth(&self) -> usize {
        let mut depth = 1;
        let mut current = self.parent();
        while let Some(ctx) = current {
            depth += 1;
            current = ctx.parent();
        }
        depth
    }

    /// Whether this is the outermost invocation
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.invoking_state.is_none()
    }
}

impl fmt::Display for RuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        let mut current = Some(self);
        let mut first = true;
        while let Some(ctx) = current {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "{}", ctx.rule_index)?;
            first = false;
            current = ctx.parent();
        }
        write!(f, "]")
    }
}

/// Grammar-specific parser predicates
pub trait ParserHooks {
    /// Evaluate predicate `pred_index` of rule `rule_index`
    fn sempred(
        &mut self,
        _local_ctx: Option<&RuleContext>,
        _rule_index: usize,
        _pred_index: usize,
    ) -> bool {
        true
    }
}

/// Hooks for grammars without predicates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoParserHooks;

impl ParserHooks for NoParserHooks {}

/// Rule state of a generated parser
#[derive(Debug)]
pub struct ParserSupport<H = NoParserHooks> {
    atn: Arc<Atn>,
    state: isize,
    ctx: Option<Arc<RuleContext>>,
    outer_alt: u32,
    precedence_stack: Vec<i32>,
    hooks: H,
}

impl ParserSupport<NoParserHooks> {
    /// Support for `atn` without predicate hooks
    pub fn new(atn: Arc<Atn>) -> Self {
        Self::with_hooks(atn, NoParserHooks)
    }
}

impl<H: ParserHooks> ParserSupport<H> {
    /// Support for `atn` routing predicates to `hooks`
    pub fn with_hooks(atn: Arc<Atn>, hooks: H) -> Self {
        Self {
            atn,
            state: -1,
            ctx: None,
            outer_alt: 0,
            precedence_stack: vec![0],
            hooks,
        }
    }

    /// The ATN
    #[inline]
    pub fn atn(&self) -> &Arc<Atn> {
        &self.atn
    }

    /// Current ATN state, -1 before the first rule
    #[inline]
    pub fn state(&self) -> isize {
        self.state
    }

    /// Move to ATN state `state`
    pub fn set_state(&mut self, state: usize) {
        self.state = state as isize;
    }

    /// Current rule invocation
    #[inline]
    pub fn context(&self) -> Option<&Arc<RuleContext>> {
        self.ctx.as_ref()
    }

    /// Alternative chosen by the last `enter_outer_alt`
    #[inline]
    pub fn outer_alt(&self) -> u32 {
        self.outer_alt
    }

    /// The hooks
    #[inline]
    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Forget every rule and precedence level
    pub fn reset(&mut self) {
        self.state = -1;
        self.ctx = None;
        self.outer_alt = 0;
        self.precedence_stack.clear();
        self.precedence_stack.push(0);
    }

    // ========================================================================
    // Rule tracking
    // ========================================================================

    fn invoke(&mut self, state: usize, rule_index: usize) -> Arc<RuleContext> {
        let ctx = match (&self.ctx, self.state) {
            (Some(parent), invoking) if invoking >= 0 => {
                RuleContext::child(parent, invoking as usize, rule_index)
            }
            _ => RuleContext::root(rule_index),
        };
        self.ctx = Some(Arc::clone(&ctx));
        self.state = state as isize;
        ctx
    }

    /// Enter `rule_index` at `state`, invoked from the current state
    pub fn enter_rule(&mut self, state: usize, rule_index: usize) -> Arc<RuleContext> {
        self.invoke(state, rule_index)
    }

    /// Leave the current rule, returning to its invoking state
    pub fn exit_rule(&mut self) -> AtnResult<()> {
        let ctx = self
            .ctx
            .take()
            .ok_or_else(|| AtnError::illegal_state("exit_rule without a current rule"))?;
        self.state = ctx.invoking_state().map_or(-1, |s| s as isize);
        self.ctx = ctx.parent_arc().cloned();
        Ok(())
    }

    /// Record the chosen top-level alternative and move to `state`
    pub fn enter_outer_alt(&mut self, state: usize, alt: u32) {
        self.state = state as isize;
        self.outer_alt = alt;
    }

    /// Enter a left-recursive rule with precedence `precedence`
    pub fn enter_recursion_rule(
        &mut self,
        state: usize,
        rule_index: usize,
        precedence: i32,
    ) -> Arc<RuleContext> {
        self.precedence_stack.push(precedence);
        self.invoke(state, rule_index)
    }

    /// Start a new iteration of a left-recursive rule at `state`
    ///
    /// The fresh context has the same caller as the one it replaces.
    pub fn push_new_recursion_context(
        &mut self,
        state: usize,
        rule_index: usize,
    ) -> AtnResult<Arc<RuleContext>> {
        let previous = self.ctx.as_ref().ok_or_else(|| {
            AtnError::illegal_state("push_new_recursion_context without a current rule")
        })?;
        let ctx = RuleContext::with_parent(
            previous.parent_arc().cloned(),
            previous.invoking_state(),
            rule_index,
        );
        self.ctx = Some(Arc::clone(&ctx));
        self.state = state as isize;
        Ok(ctx)
    }

    /// Leave a left-recursive rule
    pub fn unroll_recursion_contexts(&mut self) -> AtnResult<()> {
        if self.precedence_stack.pop().is_none() {
            return Err(AtnError::illegal_state("precedence stack is empty"));
        }
        self.exit_rule()
    }

    // ========================================================================
    // Precedence
    // ========================================================================

    /// Precedence of the innermost left-recursive rule, -1 when none
    #[inline]
    pub fn precedence(&self) -> i32 {
        self.precedence_stack.last().copied().unwrap_or(-1)
    }

    /// Whether `precedence` may be used in the current left-recursive rule
    #[inline]
    pub fn precpred(&self, _local_ctx: Option<&RuleContext>, precedence: i32) -> bool {
        precedence >= self.precedence()
    }

    /// Whether the current rule is a left-recursive rule at `precedence` or above
    pub fn in_context(&self, precedence: i32) -> bool {
        self.precedence_stack.len() > 1 && self.precedence() <= precedence
    }

    // ========================================================================
    // Expected tokens
    // ========================================================================

    fn current_state(&self) -> AtnResult<usize> {
        if self.state < 0 || self.state as usize >= self.atn.states().len() {
            return Err(AtnError::InvalidStateNumber { state: self.state });
        }
        Ok(self.state as usize)
    }

    /// Whether `symbol` can be matched next
    ///
    /// Walks out through the callers while the current rule can end, and
    /// accepts `EOF` once the outermost rule can end.
    pub fn is_expected_token(&self, symbol: i32) -> AtnResult<bool> {
        let atn = &*self.atn;
        let mut following = atn.next_tokens(self.current_state()?)?;
        if following.contains(symbol) {
            return Ok(true);
        }
        if !following.contains(EPSILON) {
            return Ok(false);
        }
        let mut ctx = self.ctx.as_deref();
        while let Some(current) = ctx {
            let invoking = match current.invoking_state() {
                Some(s) if following.contains(EPSILON) => s,
                _ => break,
            };
            let follow = match atn.state(invoking)?.transitions.first() {
                Some(Transition::Rule { follow_state, .. }) => *follow_state,
                _ => {
                    return Err(AtnError::invalid_atn(format!(
                        "invoking state {} does not start with a rule transition",
                        invoking
                    )))
                }
            };
            following = atn.next_tokens(follow)?;
            if following.contains(symbol) {
                return Ok(true);
            }
            ctx = current.parent();
        }
        Ok(following.contains(EPSILON) && symbol == EOF)
    }

    /// Every token that can be matched next, through the callers
    pub fn expected_tokens(&self) -> AtnResult<IntervalSet> {
        self.atn.expected_tokens(self.state, self.ctx.as_deref())
    }

    /// Tokens that can be matched next without leaving the current rule
    ///
    /// Contains `EPSILON` when the rule can end here.
    pub fn expected_tokens_within_current_rule(&self) -> AtnResult<IntervalSet> {
        Ok(self.atn.next_tokens(self.current_state()?)?.clone())
    }

    /// Rule indices from the current rule out to the outermost one
    pub fn rule_invocation_stack(&self) -> Vec<usize> {
        let mut stack = Vec::new();
        let mut current = self.ctx.as_deref();
        while let Some(ctx) = current {
            stack.push(ctx.rule_index());
            current = ctx.parent();
        }
        stack
    }

    // ========================================================================
    // Predicates
    // ========================================================================

    /// Evaluate `semantic` against the current rule context
    pub fn eval_semantic_context(&mut self, semantic: &SemanticContext) -> bool {
        let ctx = self.ctx.clone();
        semantic.eval(self, ctx.as_deref())
    }
}

impl<H: ParserHooks> Recognizer for ParserSupport<H> {
    fn sempred(
        &mut self,
        local_ctx: Option<&RuleContext>,
        rule_index: usize,
        pred_index: usize,
    ) -> bool {
        self.hooks.sempred(local_ctx, rule_index, pred_index)
    }

    fn precpred(&mut self, local_ctx: Option<&RuleContext>, precedence: i32) -> bool {
        ParserSupport::precpred(self, local_ctx, precedence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::atn_builder::{alt, rule_ref, seq, token, AtnBuilder};

    // s : a 3 ;  a : 1 | 2 | ;
    fn grammar() -> Arc<Atn> {
        let mut b = AtnBuilder::parser(3);
        b.parser_rule("s", seq(vec![rule_ref("a"), token(3)]));
        b.parser_rule("a", alt(vec![token(1), token(2), seq(vec![])]));
        Arc::new(b.build().unwrap())
    }

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

    fn inside_a(atn: &Arc<Atn>) -> ParserSupport {
        let mut parser = ParserSupport::new(Arc::clone(atn));
        parser.enter_rule(atn.rule_to_start_state[0], 0);
        parser.set_state(call_site(atn, 1));
        parser.enter_rule(atn.rule_to_start_state[1], 1);
        parser
    }

    #[test]
    fn test_rule_context_chain() {
        let root = RuleContext::root(0);
        let child = RuleContext::child(&root, 4, 1);
        assert!(root.is_empty());
        assert!(!child.is_empty());
        assert_eq!(child.depth(), 2);
        assert_eq!(child.invoking_state(), Some(4));
        assert_eq!(child.parent().map(|p| p.rule_index()), Some(0));
        assert_eq!(child.to_string(), "[1 0]");
    }

    #[test]
    fn test_enter_and_exit_rule() {
        let atn = grammar();
        let mut parser = inside_a(&atn);
        assert_eq!(parser.rule_invocation_stack(), vec![1, 0]);
        assert_eq!(parser.context().map(|c| c.depth()), Some(2));

        parser.exit_rule().unwrap();
        assert_eq!(parser.state(), call_site(&atn, 1) as isize);
        assert_eq!(parser.rule_invocation_stack(), vec![0]);
        parser.exit_rule().unwrap();
        assert_eq!(parser.state(), -1);
        assert!(parser.exit_rule().is_err());
    }

    #[test]
    fn test_is_expected_token_walks_callers() {
        let atn = grammar();
        let parser = inside_a(&atn);
        assert!(parser.is_expected_token(1).unwrap());
        assert!(parser.is_expected_token(3).unwrap());
        assert!(!parser.is_expected_token(EOF).unwrap());

        let within = parser.expected_tokens_within_current_rule().unwrap();
        assert!(within.contains(EPSILON));
        assert!(!within.contains(3));

        let expected = parser.expected_tokens().unwrap();
        assert_eq!(expected.to_string(), "{1..3}");
    }

    #[test]
    fn test_expected_tokens_before_any_rule() {
        let atn = grammar();
        let parser = ParserSupport::new(atn);
        assert!(matches!(
            parser.is_expected_token(1),
            Err(AtnError::InvalidStateNumber { state: -1 })
        ));
    }

    #[test]
    fn test_precedence_stack() {
        let atn = grammar();
        let mut parser = ParserSupport::new(Arc::clone(&atn));
        assert_eq!(parser.precedence(), 0);
        assert!(!parser.in_context(0));

        parser.enter_recursion_rule(atn.rule_to_start_state[0], 0, 3);
        assert_eq!(parser.precedence(), 3);
        assert!(parser.precpred(None, 3));
        assert!(!parser.precpred(None, 2));
        assert!(parser.in_context(4));

        let replaced = parser
            .push_new_recursion_context(atn.rule_to_start_state[0], 0)
            .unwrap();
        assert!(replaced.is_empty());

        parser.unroll_recursion_contexts().unwrap();
        assert_eq!(parser.precedence(), 0);
        assert!(parser.context().is_none());
    }

    struct OnlyEven;

    impl ParserHooks for OnlyEven {
        fn sempred(&mut self, _: Option<&RuleContext>, _: usize, pred_index: usize) -> bool {
            pred_index % 2 == 0
        }
    }

    #[test]
    fn test_eval_semantic_context() {
        let atn = grammar();
        let mut parser = ParserSupport::with_hooks(atn, OnlyEven);
        let even = SemanticContext::Predicate {
            rule_index: 0,
            pred_index: 2,
            ctx_dependent: false,
        };
        let odd = SemanticContext::Predicate {
            rule_index: 0,
            pred_index: 1,
            ctx_dependent: false,
        };
        assert!(parser.eval_semantic_context(&even));
        assert!(!parser.eval_semantic_context(&odd));
        assert!(parser.eval_semantic_context(&SemanticContext::Precedence(0)));
        assert!(parser.eval_semantic_context(&SemanticContext::Empty));
    }
}
