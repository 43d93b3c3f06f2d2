//! Semantic predicate expressions attached to configurations
//!
//! A configuration is only viable while its [`SemanticContext`] holds.
//! Contexts combine with [`SemanticContext::and`] / [`SemanticContext::or`],
//! which flatten, deduplicate and reduce precedence predicates so that
//! equal conditions end up structurally equal.

use std::fmt;
use std::sync::Arc;

use super::parser_support::RuleContext;

/// Callbacks used to evaluate predicates
///
/// Generated recognizers implement this to dispatch predicate indices to
/// their predicate code. Both default to `true`.
pub trait Recognizer {
    /// Evaluate predicate `pred_index` of rule `rule_index`
    fn sempred(
        &mut self,
        _local_ctx: Option<&RuleContext>,
        _rule_index: usize,
        _pred_index: usize,
    ) -> bool {
        true
    }

    /// Whether `precedence` is allowed in the current context
    fn precpred(&mut self, _local_ctx: Option<&RuleContext>, _precedence: i32) -> bool {
        true
    }
}

/// A predicate expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SemanticContext {
    /// No condition, equivalent to `{true}?`
    #[default]
    Empty,
    /// A grammar predicate
    Predicate {
        /// Rule containing the predicate
        rule_index: usize,
        /// Predicate index within the rule
        pred_index: usize,
        /// Whether the predicate reads the rule context
        ctx_dependent: bool,
    },
    /// `{precpred(_ctx, n)}?` from left-recursion elimination
    Precedence(i32),
    /// All operands must hold
    And(Arc<[SemanticContext]>),
    /// At least one operand must hold
    Or(Arc<[SemanticContext]>),
}

impl SemanticContext {
    /// The always-true context
    pub const NONE: SemanticContext = SemanticContext::Empty;

    /// Whether this is [`SemanticContext::NONE`]
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, SemanticContext::Empty)
    }

    /// Conjunction of `a` and `b`
    pub fn and(a: &SemanticContext, b: &SemanticContext) -> SemanticContext {
        if a.is_none() {
            return b.clone();
        }
        if b.is_none() {
            return a.clone();
        }
        let mut operands = Vec::new();
        for ctx in [a, b] {
            match ctx {
                SemanticContext::And(inner) => push_unique_all(&mut operands, inner),
                other => push_unique(&mut operands, other.clone()),
            }
        }
        reduce_precedence(&mut operands, |x, y| x.min(y));
        wrap(operands, SemanticContext::And)
    }

    /// Disjunction of `a` and `b`
    pub fn or(a: &SemanticContext, b: &SemanticContext) -> SemanticContext {
        if a.is_none() || b.is_none() {
            return SemanticContext::NONE;
        }
        let mut operands = Vec::new();
        for ctx in [a, b] {
            match ctx {
                SemanticContext::Or(inner) => push_unique_all(&mut operands, inner),
                other => push_unique(&mut operands, other.clone()),
            }
        }
        reduce_precedence(&mut operands, |x, y| x.max(y));
        wrap(operands, SemanticContext::Or)
    }

    /// Evaluate against `recognizer`
    ///
    /// Context-dependent predicates receive `outer_ctx`; the others receive
    /// no context.
    pub fn eval<R: Recognizer + ?Sized>(
        &self,
        recognizer: &mut R,
        outer_ctx: Option<&RuleContext>,
    ) -> bool {
        match self {
            SemanticContext::Empty => true,
            SemanticContext::Predicate {
                rule_index,
                pred_index,
                ctx_dependent,
            } => {
                let local = if *ctx_dependent { outer_ctx } else { None };
                recognizer.sempred(local, *rule_index, *pred_index)
            }
            SemanticContext::Precedence(precedence) => recognizer.precpred(outer_ctx, *precedence),
            SemanticContext::And(operands) => {
                operands.iter().all(|op| op.eval(recognizer, outer_ctx))
            }
            SemanticContext::Or(operands) => {
                operands.iter().any(|op| op.eval(recognizer, outer_ctx))
            }
        }
    }

    /// Evaluate only the precedence predicates
    ///
    /// Returns `None` when the context is certainly false, `Some(NONE)` when
    /// it is certainly true, and otherwise the context with the precedence
    /// predicates removed.
    pub fn eval_precedence<R: Recognizer + ?Sized>(
        &self,
        recognizer: &mut R,
        outer_ctx: Option<&RuleContext>,
    ) -> Option<SemanticContext> {
        match self {
            SemanticContext::Empty | SemanticContext::Predicate { .. } => Some(self.clone()),
            SemanticContext::Precedence(precedence) => {
                if recognizer.precpred(outer_ctx, *precedence) {
                    Some(SemanticContext::NONE)
                } else {
                    None
                }
            }
            SemanticContext::And(operands) => {
                let mut differs = false;
                let mut kept = Vec::new();
                for op in operands.iter() {
                    let evaluated = op.eval_precedence(recognizer, outer_ctx)?;
                    differs |= evaluated != *op;
                    if !evaluated.is_none() {
                        kept.push(evaluated);
                    }
                }
                if !differs {
                    return Some(self.clone());
                }
                let mut iter = kept.into_iter();
                let first = match iter.next() {
                    Some(first) => first,
                    None => return Some(SemanticContext::NONE),
                };
                Some(iter.fold(first, |acc, op| SemanticContext::and(&acc, &op)))
            }
            SemanticContext::Or(operands) => {
                let mut differs = false;
                let mut kept = Vec::new();
                for op in operands.iter() {
                    let evaluated = op.eval_precedence(recognizer, outer_ctx);
                    differs |= evaluated.as_ref() != Some(op);
                    match evaluated {
                        Some(ctx) if ctx.is_none() => return Some(SemanticContext::NONE),
                        Some(ctx) => kept.push(ctx),
                        None => {}
                    }
                }
                if !differs {
                    return Some(self.clone());
                }
                let mut iter = kept.into_iter();
                let first = iter.next()?;
                Some(iter.fold(first, |acc, op| SemanticContext::or(&acc, &op)))
            }
        }
    }
}

fn push_unique(operands: &mut Vec<SemanticContext>, ctx: SemanticContext) {
    if !operands.contains(&ctx) {
        operands.push(ctx);
    }
}

fn push_unique_all(operands: &mut Vec<SemanticContext>, inner: &[SemanticContext]) {
    for ctx in inner {
        push_unique(operands, ctx.clone());
    }
}

/// Keep a single precedence predicate, chosen by `pick`, at the end
fn reduce_precedence(operands: &mut Vec<SemanticContext>, pick: impl Fn(i32, i32) -> i32) {
    let mut chosen: Option<i32> = None;
    operands.retain(|op| match op {
        SemanticContext::Precedence(p) => {
            chosen = Some(chosen.map_or(*p, |c| pick(c, *p)));
            false
        }
        _ => true,
    });
    if let Some(p) = chosen {
        operands.push(SemanticContext::Precedence(p));
    }
}

fn wrap(
    mut operands: Vec<SemanticContext>,
    build: impl Fn(Arc<[SemanticContext]>) -> SemanticContext,
) -> SemanticContext {
    if operands.len() == 1 {
        return operands.pop().unwrap_or_default();
    }
    build(operands.into())
}

impl fmt::Display for SemanticContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticContext::Empty => write!(f, "{{true}}?"),
            SemanticContext::Predicate {
                rule_index,
                pred_index,
                ..
            } => write!(f, "{{{}:{}}}?", rule_index, pred_index),
            SemanticContext::Precedence(p) => write!(f, "{{{}>=prec}}?", p),
            SemanticContext::And(operands) | SemanticContext::Or(operands) => {
                let sep = if matches!(self, SemanticContext::And(_)) {
                    "&&"
                } else {
                    "||"
                };
                let parts: Vec<String> = operands.iter().map(|op| op.to_string()).collect();
                write!(f, "{}", parts.join(sep))
            }
        }
    }
}
