//! LL(1) follow-set analysis
//!
//! [`Ll1Analyzer::look`] walks the ATN from a state and collects every
//! token that can be matched next. Rule invocations push a return state on
//! a prediction context; reaching a rule stop either pops it or, with no
//! context, records [`EPSILON`] ("the rule can end here").

use std::sync::Arc;

use hashbrown::HashSet;

use super::atn::{Atn, Transition};
use super::error::AtnResult;
use super::interval_set::IntervalSet;
use super::parser_support::RuleContext;
use super::prediction_context::{PredictionContext, EMPTY_RETURN_STATE};
use super::token::{EOF, EPSILON, INVALID_TYPE, MIN_USER_TOKEN_TYPE};

/// Marker added to a look set when a predicate blocked the walk
pub const HIT_PRED: i32 = INVALID_TYPE;

type BusyKey = (usize, Option<Arc<PredictionContext>>);

struct Walk {
    look: IntervalSet,
    busy: HashSet<BusyKey>,
    called_rules: Vec<bool>,
    see_thru_preds: bool,
    add_eof: bool,
}

impl Walk {
    fn new(see_thru_preds: bool, add_eof: bool) -> Self {
        Self {
            look: IntervalSet::new(),
            busy: HashSet::new(),
            called_rules: Vec::new(),
            see_thru_preds,
            add_eof,
        }
    }

    fn is_called(&self, rule: usize) -> bool {
        self.called_rules.get(rule).copied().unwrap_or(false)
    }

    fn set_called(&mut self, rule: usize, called: bool) {
        if rule >= self.called_rules.len() {
            self.called_rules.resize(rule + 1, false);
        }
        self.called_rules[rule] = called;
    }
}

/// Computes follow sets over an [`Atn`]
pub struct Ll1Analyzer<'a> {
    atn: &'a Atn,
}

impl<'a> Ll1Analyzer<'a> {
    /// Create an analyzer for `atn`
    pub fn new(atn: &'a Atn) -> Self {
        Self { atn }
    }

    /// Tokens that can follow `state`
    ///
    /// Without `ctx` the walk stops at the end of `state`'s rule and adds
    /// `EPSILON`. With `ctx` it returns into the callers and adds `EOF` once
    /// the outermost rule ends. Reaching `stop_state` counts as a rule end.
    /// Predicates are assumed true.
    pub fn look(
        &self,
        state: usize,
        stop_state: Option<usize>,
        ctx: Option<&RuleContext>,
    ) -> AtnResult<IntervalSet> {
        let look_ctx = match ctx {
            Some(ctx) => Some(PredictionContext::from_rule_context(self.atn, Some(ctx))?),
            None => None,
        };
        let mut walk = Walk::new(true, true);
        self.walk(state, stop_state, look_ctx, &mut walk)?;
        Ok(walk.look)
    }

    /// The lookahead of each alternative of decision state `state`
    ///
    /// An alternative whose set is empty or was cut short by a predicate
    /// yields `None`.
    pub fn decision_lookahead(&self, state: usize) -> AtnResult<Vec<Option<IntervalSet>>> {
        let transitions = &self.atn.state(state)?.transitions;
        let mut result = Vec::with_capacity(transitions.len());
        for transition in transitions {
            let mut walk = Walk::new(false, false);
            self.walk(
                transition.target(),
                None,
                Some(PredictionContext::empty()),
                &mut walk,
            )?;
            if walk.look.is_empty() || walk.look.contains(HIT_PRED) {
                result.push(None);
            } else {
                result.push(Some(walk.look));
            }
        }
        Ok(result)
    }

    fn walk(
        &self,
        state_number: usize,
        stop_state: Option<usize>,
        ctx: Option<Arc<PredictionContext>>,
        walk: &mut Walk,
    ) -> AtnResult<()> {
        if !walk.busy.insert((state_number, ctx.clone())) {
            return Ok(());
        }
        let state = self.atn.state(state_number)?;

        if Some(state_number) == stop_state || state.is_rule_stop() {
            match &ctx {
                None => {
                    walk.look.add_one(EPSILON);
                    return Ok(());
                }
                Some(c) if c.is_empty() && walk.add_eof => {
                    walk.look.add_one(EOF);
                    return Ok(());
                }
                _ => {}
            }
        }

        if state.is_rule_stop() {
            if let Some(c) = ctx.as_ref().filter(|c| !c.is_empty()) {
                let was_called = walk.is_called(state.rule_index);
                walk.set_called(state.rule_index, false);
                let mut result = Ok(());
                for i in 0..c.len() {
                    let return_state = c.return_state(i);
                    if return_state == EMPTY_RETURN_STATE {
                        if walk.add_eof {
                            walk.look.add_one(EOF);
                        }
                        continue;
                    }
                    result = self.walk(return_state as usize, stop_state, c.parent(i).cloned(), walk);
                    if result.is_err() {
                        break;
                    }
                }
                if was_called {
                    walk.set_called(state.rule_index, true);
                }
                return result;
            }
        }

        for transition in &state.transitions {
            match transition {
                Transition::Rule {
                    target,
                    rule_index,
                    follow_state,
                    ..
                } => {
                    if walk.is_called(*rule_index) {
                        continue;
                    }
                    let new_ctx = PredictionContext::singleton(ctx.clone(), *follow_state as i32);
                    walk.set_called(*rule_index, true);
                    let result = self.walk(*target, stop_state, Some(new_ctx), walk);
                    walk.set_called(*rule_index, false);
                    result?;
                }
                Transition::Predicate { target, .. } | Transition::Precedence { target, .. } => {
                    if walk.see_thru_preds {
                        self.walk(*target, stop_state, ctx.clone(), walk)?;
                    } else {
                        walk.look.add_one(HIT_PRED);
                    }
                }
                Transition::Wildcard { .. } => {
                    walk.look
                        .add_range(MIN_USER_TOKEN_TYPE, self.atn.max_token_type);
                }
                Transition::NotSet { set, .. } => {
                    let complement = set.complement(MIN_USER_TOKEN_TYPE, self.atn.max_token_type);
                    walk.look.add_set(&complement);
                }
                t if t.is_epsilon() => {
                    self.walk(t.target(), stop_state, ctx.clone(), walk)?;
                }
                t => {
                    if let Some(label) = t.label() {
                        walk.look.add_set(&label);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::atn_builder::{alt, rule_ref, seq, token, AtnBuilder};

    // s : a 3 ;  a : 1 | 2 | ;
    fn grammar() -> Atn {
        let mut b = AtnBuilder::parser(3);
        b.parser_rule("s", seq(vec![rule_ref("a"), token(3)]));
        b.parser_rule("a", alt(vec![token(1), token(2), seq(vec![])]));
        b.build().unwrap()
    }

    #[test]
    fn test_look_without_context_sees_rule_end() {
        let atn = grammar();
        let a_start = atn.rule_to_start_state[1];
        let set = Ll1Analyzer::new(&atn).look(a_start, None, None).unwrap();
        assert_eq!(set.to_string(), "{-2, 1..2}");
    }

    #[test]
    fn test_look_through_rule_call() {
        let atn = grammar();
        let s_start = atn.rule_to_start_state[0];
        let set = Ll1Analyzer::new(&atn).look(s_start, None, None).unwrap();
        assert_eq!(set.to_string(), "{1..3}");
    }

    #[test]
    fn test_look_with_outer_context_adds_eof() {
        let atn = grammar();
        let s_start = atn.rule_to_start_state[0];
        let root = RuleContext::root(0);
        let set = Ll1Analyzer::new(&atn)
            .look(atn.rule_to_stop_state[0], None, Some(&root))
            .unwrap();
        assert_eq!(set.to_string(), "<EOF>");
        let set = Ll1Analyzer::new(&atn).look(s_start, None, Some(&root)).unwrap();
        assert!(!set.contains(EOF));
    }

    #[test]
    fn test_decision_lookahead() {
        let atn = grammar();
        let decision = atn.decision_to_state[0];
        let looks = Ll1Analyzer::new(&atn).decision_lookahead(decision).unwrap();
        assert_eq!(looks.len(), 3);
        assert_eq!(looks[0].as_ref().map(|s| s.to_string()), Some("1".to_string()));
        assert_eq!(looks[1].as_ref().map(|s| s.to_string()), Some("2".to_string()));
        // the empty alternative returns into `s` and sees 3
        assert_eq!(looks[2].as_ref().map(|s| s.to_string()), Some("3".to_string()));
    }
}
