//! Programmatic ATN construction
//!
//! [`AtnBuilder`] turns rule definitions written with the [`Element`]
//! combinators into a linked, verified [`Atn`]. Loops and blocks get the
//! same state shapes a grammar tool would emit (`StarLoopEntry`,
//! `PlusLoopBack`, `BlockStart`/`BlockEnd`, ...), so the simulators see the
//! graphs they expect.
//!
//! Rules may be referenced before they are defined; `build()` fails if a
//! referenced rule never gets a body.
//!
//! # Example
//!
//! ```rust
//! use parsanol_atn::runtime::atn_builder::*;
//!
//! let mut builder = AtnBuilder::lexer();
//! builder.lexer_rule("ID", 1, plus(range('a', 'z')));
//! builder.lexer_rule("WS", 2, seq(vec![plus(ch(' ')), action(LexerAction::Skip)]));
//! let atn = builder.build().unwrap();
//!
//! assert_eq!(atn.num_rules(), 2);
//! assert_eq!(atn.rule_to_token_type, vec![1, 2]);
//! ```

use hashbrown::HashMap;

use super::atn::{Atn, GrammarType, StateKind, Transition};
use super::error::{AtnError, AtnResult};
use super::interval_set::IntervalSet;
pub use super::lexer_action::LexerAction;
use super::token::{EOF, INVALID_TYPE};

/// A grammar fragment
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// One symbol (a character in lexers, a token type in parsers)
    Atom(i32),
    /// A literal string, one atom per code point
    Text(String),
    /// A closed symbol range
    Range(i32, i32),
    /// Any symbol of a set
    Set(IntervalSet),
    /// Any symbol outside a set
    NotSet(IntervalSet),
    /// Any symbol
    Any,
    /// Elements in order
    Seq(Vec<Element>),
    /// Alternatives, first listed first
    Alt(Vec<Element>),
    /// `( ... )*` or `( ... )*?`
    Star {
        /// Loop body
        element: Box<Element>,
        /// `false` for `*?`
        greedy: bool,
    },
    /// `( ... )+` or `( ... )+?`
    Plus {
        /// Loop body
        element: Box<Element>,
        /// `false` for `+?`
        greedy: bool,
    },
    /// `( ... )?` or `( ... )??`
    Optional {
        /// Optional body
        element: Box<Element>,
        /// `false` for `??`
        greedy: bool,
    },
    /// A lexer command such as `-> skip`
    Action(LexerAction),
    /// An embedded action, by index within its rule
    CustomAction(usize),
    /// A semantic predicate, by index within its rule
    Predicate(usize),
    /// A precedence predicate `{precpred(_ctx, n)}?`
    Precedence(i32),
    /// A call to another rule
    RuleRef {
        /// Called rule
        name: String,
        /// Precedence argument (0 outside left-recursive rules)
        precedence: i32,
    },
    /// The end-of-input symbol
    Eof,
}

/// Match one character
pub fn ch(c: char) -> Element {
    Element::Atom(c as i32)
}

/// Match one token type
pub fn token(token_type: i32) -> Element {
    Element::Atom(token_type)
}

/// Match a literal string
pub fn text(s: &str) -> Element {
    Element::Text(s.to_string())
}

/// Match a character range
pub fn range(lo: char, hi: char) -> Element {
    Element::Range(lo as i32, hi as i32)
}

/// Match any character of `chars`
pub fn one_of(chars: &str) -> Element {
    let mut set = IntervalSet::new();
    for c in chars.chars() {
        set.add_one(c as i32);
    }
    Element::Set(set)
}

/// Match any member of `set`
pub fn set(set: IntervalSet) -> Element {
    Element::Set(set)
}

/// Match anything outside `set`
pub fn not_set(set: IntervalSet) -> Element {
    Element::NotSet(set)
}

/// Match any symbol
pub fn any() -> Element {
    Element::Any
}

/// Match the end of input
pub fn eof() -> Element {
    Element::Eof
}

/// Match elements in order
pub fn seq(items: Vec<Element>) -> Element {
    Element::Seq(items)
}

/// Match the first viable alternative
pub fn alt(items: Vec<Element>) -> Element {
    Element::Alt(items)
}

/// Greedy `*`
pub fn star(element: Element) -> Element {
    Element::Star {
        element: Box::new(element),
        greedy: true,
    }
}

/// Greedy `+`
pub fn plus(element: Element) -> Element {
    Element::Plus {
        element: Box::new(element),
        greedy: true,
    }
}

/// Greedy `?`
pub fn optional(element: Element) -> Element {
    Element::Optional {
        element: Box::new(element),
        greedy: true,
    }
}

/// Non-greedy `*?`
pub fn non_greedy_star(element: Element) -> Element {
    Element::Star {
        element: Box::new(element),
        greedy: false,
    }
}

/// Non-greedy `+?`
pub fn non_greedy_plus(element: Element) -> Element {
    Element::Plus {
        element: Box::new(element),
        greedy: false,
    }
}

/// Non-greedy `??`
pub fn non_greedy_optional(element: Element) -> Element {
    Element::Optional {
        element: Box::new(element),
        greedy: false,
    }
}

/// A lexer command
pub fn action(action: LexerAction) -> Element {
    Element::Action(action)
}

/// An embedded action
pub fn custom_action(action_index: usize) -> Element {
    Element::CustomAction(action_index)
}

/// A semantic predicate
pub fn predicate(pred_index: usize) -> Element {
    Element::Predicate(pred_index)
}

/// A precedence predicate
pub fn precedence(precedence: i32) -> Element {
    Element::Precedence(precedence)
}

/// Call rule `name`
pub fn rule_ref(name: &str) -> Element {
    Element::RuleRef {
        name: name.to_string(),
        precedence: 0,
    }
}

/// Call rule `name` with a precedence argument
pub fn rule_ref_prec(name: &str, precedence: i32) -> Element {
    Element::RuleRef {
        name: name.to_string(),
        precedence,
    }
}

#[derive(Debug, Clone, Copy)]
struct Handle {
    left: usize,
    right: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Plain,
    Star,
    Plus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bypass {
    None,
    First,
    Last,
}

fn epsilon(target: usize) -> Transition {
    Transition::Epsilon {
        target,
        outermost_precedence_return: None,
    }
}

fn alternatives(element: &Element) -> Vec<&Element> {
    match element {
        Element::Alt(items) if items.len() > 1 => items.iter().collect(),
        other => vec![other],
    }
}

/// Builds an [`Atn`] rule by rule
#[derive(Debug)]
pub struct AtnBuilder {
    atn: Atn,
    rules: HashMap<String, usize>,
    rule_names: Vec<String>,
    defined: Vec<bool>,
    current_mode: usize,
    error: Option<AtnError>,
}

impl AtnBuilder {
    /// Start a lexer ATN with its default mode
    pub fn lexer() -> Self {
        let mut builder = Self::with_atn(Atn::new(GrammarType::Lexer, INVALID_TYPE));
        builder.add_mode();
        builder
    }

    /// Start a parser ATN over token types `1..=max_token_type`
    pub fn parser(max_token_type: i32) -> Self {
        Self::with_atn(Atn::new(GrammarType::Parser, max_token_type))
    }

    fn with_atn(atn: Atn) -> Self {
        Self {
            atn,
            rules: HashMap::new(),
            rule_names: Vec::new(),
            defined: Vec::new(),
            current_mode: 0,
            error: None,
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        if self.error.is_none() {
            self.error = Some(AtnError::invalid_atn(message));
        }
    }

    // ========================================================================
    // Modes and rules
    // ========================================================================

    /// Add a lexer mode and make it current; returns its number
    pub fn add_mode(&mut self) -> usize {
        let start = self.atn.add_state(0, StateKind::TokenStart);
        self.atn.define_decision_state(start);
        self.atn.mode_to_start_state.push(start);
        self.current_mode = self.atn.mode_to_start_state.len() - 1;
        self.current_mode
    }

    /// Make `mode` current for the following token rules
    pub fn set_mode(&mut self, mode: usize) -> &mut Self {
        if mode < self.atn.mode_to_start_state.len() {
            self.current_mode = mode;
        } else {
            self.fail(format!("mode {} does not exist", mode));
        }
        self
    }

    /// The mode token rules are currently added to
    #[inline]
    pub fn mode(&self) -> usize {
        self.current_mode
    }

    /// Define a token rule matching `literal`
    pub fn literal_rule(&mut self, name: &str, token_type: i32, literal: &str) -> usize {
        self.lexer_rule(name, token_type, text(literal))
    }

    /// Define a token rule in the current mode
    pub fn lexer_rule(&mut self, name: &str, token_type: i32, element: Element) -> usize {
        let rule = self.define_rule(name, &element);
        if !self.atn.is_lexer() {
            self.fail(format!("token rule '{}' needs a lexer ATN", name));
            return rule;
        }
        if let Some(slot) = self.atn.rule_to_token_type.get_mut(rule) {
            *slot = token_type;
        }
        self.atn.max_token_type = self.atn.max_token_type.max(token_type);
        let mode_start = self.atn.mode_to_start_state[self.current_mode];
        let rule_start = self.atn.rule_to_start_state[rule];
        self.add_transition(mode_start, epsilon(rule_start));
        rule
    }

    /// Define a lexer rule that is only reachable from other rules
    pub fn fragment_rule(&mut self, name: &str, element: Element) -> usize {
        if !self.atn.is_lexer() {
            self.fail(format!("fragment rule '{}' needs a lexer ATN", name));
        }
        self.define_rule(name, &element)
    }

    /// Define a parser rule
    pub fn parser_rule(&mut self, name: &str, element: Element) -> usize {
        if self.atn.is_lexer() {
            self.fail(format!("parser rule '{}' needs a parser ATN", name));
        }
        self.define_rule(name, &element)
    }

    /// Mark rule `name` as rewritten from left recursion
    ///
    /// Its first star-loop entry becomes the precedence decision.
    pub fn set_left_recursive(&mut self, name: &str) -> &mut Self {
        let rule = self.declare_rule(name);
        let start = self.atn.rule_to_start_state[rule];
        let states = self.atn.states_mut();
        if let StateKind::RuleStart { stop_state, .. } = states[start].kind {
            states[start].kind = StateKind::RuleStart {
                stop_state,
                left_recursive: true,
            };
        }
        if let Some(entry) = states.iter_mut().find(|s| {
            s.rule_index == rule && matches!(s.kind, StateKind::StarLoopEntry { .. })
        }) {
            if let StateKind::StarLoopEntry {
                loop_back_state, ..
            } = entry.kind
            {
                entry.kind = StateKind::StarLoopEntry {
                    loop_back_state,
                    precedence_decision: true,
                };
            }
        }
        self
    }

    /// Index of rule `name`, if declared
    pub fn rule_index(&self, name: &str) -> Option<usize> {
        self.rules.get(name).copied()
    }

    /// Rule names by index
    #[inline]
    pub fn rule_names(&self) -> &[String] {
        &self.rule_names
    }

    // ========================================================================
    // Raw graph access
    // ========================================================================

    /// Append a state; returns its number
    pub fn add_state(&mut self, rule_index: usize, kind: StateKind) -> usize {
        self.atn.add_state(rule_index, kind)
    }

    /// Append a transition to state `from`
    pub fn add_transition(&mut self, from: usize, transition: Transition) -> &mut Self {
        match self.atn.states_mut().get_mut(from) {
            Some(state) => state.transitions.push(transition),
            None => self.fail(format!("transition from unknown state {}", from)),
        }
        self
    }

    /// Register `state` as the next decision
    pub fn define_decision(&mut self, state: usize) -> usize {
        self.atn.define_decision_state(state)
    }

    /// Link and verify the ATN
    pub fn build(mut self) -> AtnResult<Atn> {
        if let Some(err) = self.error.take() {
            return Err(err);
        }
        if let Some(missing) = self
            .defined
            .iter()
            .position(|defined| !defined)
            .and_then(|rule| self.rule_names.get(rule))
        {
            return Err(AtnError::invalid_atn(format!(
                "rule '{}' is referenced but never defined",
                missing
            )));
        }
        self.atn.link()?;
        self.atn.verify()?;
        Ok(self.atn)
    }

    // ========================================================================
    // Element construction
    // ========================================================================

    fn declare_rule(&mut self, name: &str) -> usize {
        if let Some(&rule) = self.rules.get(name) {
            return rule;
        }
        let rule = self.rule_names.len();
        let start = self.atn.add_state(rule, StateKind::Basic);
        let stop = self.atn.add_state(rule, StateKind::RuleStop);
        self.atn.states_mut()[start].kind = StateKind::RuleStart {
            stop_state: stop,
            left_recursive: false,
        };
        self.atn.rule_to_start_state.push(start);
        self.atn.rule_to_stop_state.push(stop);
        if self.atn.is_lexer() {
            self.atn.rule_to_token_type.push(INVALID_TYPE);
        }
        self.rules.insert(name.to_string(), rule);
        self.rule_names.push(name.to_string());
        self.defined.push(false);
        rule
    }

    fn define_rule(&mut self, name: &str, element: &Element) -> usize {
        let rule = self.declare_rule(name);
        if self.defined[rule] {
            self.fail(format!("rule '{}' is defined twice", name));
            return rule;
        }
        self.defined[rule] = true;
        match self.element(rule, element) {
            Ok(body) => {
                let start = self.atn.rule_to_start_state[rule];
                let stop = self.atn.rule_to_stop_state[rule];
                self.add_transition(start, epsilon(body.left));
                self.add_transition(body.right, epsilon(stop));
            }
            Err(err) => {
                if self.error.is_none() {
                    self.error = Some(err);
                }
            }
        }
        rule
    }

    fn basic(&mut self, rule: usize) -> usize {
        self.atn.add_state(rule, StateKind::Basic)
    }

    fn edge(&mut self, rule: usize, make: impl FnOnce(usize) -> Transition) -> Handle {
        let left = self.basic(rule);
        let right = self.basic(rule);
        self.add_transition(left, make(right));
        Handle { left, right }
    }

    fn action_index(&mut self, action: LexerAction) -> usize {
        match self.atn.lexer_actions.iter().position(|a| *a == action) {
            Some(index) => index,
            None => {
                self.atn.lexer_actions.push(action);
                self.atn.lexer_actions.len() - 1
            }
        }
    }

    fn element(&mut self, rule: usize, element: &Element) -> AtnResult<Handle> {
        let handle = match element {
            Element::Atom(label) => {
                let label = *label;
                self.edge(rule, |target| Transition::Atom { target, label })
            }
            Element::Eof => self.edge(rule, |target| Transition::Atom { target, label: EOF }),
            Element::Text(s) => {
                let left = self.basic(rule);
                let mut right = left;
                for c in s.chars() {
                    let next = self.basic(rule);
                    self.add_transition(
                        right,
                        Transition::Atom {
                            target: next,
                            label: c as i32,
                        },
                    );
                    right = next;
                }
                Handle { left, right }
            }
            Element::Range(start, stop) => {
                let (start, stop) = (*start, *stop);
                self.edge(rule, |target| Transition::Range {
                    target,
                    start,
                    stop,
                })
            }
            Element::Set(set) => self.edge(rule, |target| Transition::Set {
                target,
                set: set.clone(),
            }),
            Element::NotSet(set) => self.edge(rule, |target| Transition::NotSet {
                target,
                set: set.clone(),
            }),
            Element::Any => self.edge(rule, |target| Transition::Wildcard { target }),
            Element::Seq(items) => {
                let mut handle: Option<Handle> = None;
                for item in items {
                    let next = self.element(rule, item)?;
                    handle = Some(match handle {
                        None => next,
                        Some(h) => {
                            self.add_transition(h.right, epsilon(next.left));
                            Handle {
                                left: h.left,
                                right: next.right,
                            }
                        }
                    });
                }
                match handle {
                    Some(h) => h,
                    None => {
                        let state = self.basic(rule);
                        Handle {
                            left: state,
                            right: state,
                        }
                    }
                }
            }
            Element::Alt(items) => match items.len() {
                0 => {
                    let state = self.basic(rule);
                    Handle {
                        left: state,
                        right: state,
                    }
                }
                1 => self.element(rule, &items[0])?,
                _ => {
                    let alts: Vec<&Element> = items.iter().collect();
                    self.block(rule, BlockKind::Plain, &alts, Bypass::None)?
                }
            },
            Element::Star { element, greedy } => self.star(rule, element, *greedy)?,
            Element::Plus { element, greedy } => self.plus(rule, element, *greedy)?,
            Element::Optional { element, greedy } => {
                let bypass = if *greedy { Bypass::Last } else { Bypass::First };
                let block = self.block(rule, BlockKind::Plain, &alternatives(element), bypass)?;
                self.atn.states_mut()[block.left].non_greedy = !*greedy;
                block
            }
            Element::Action(lexer_action) => {
                let action_index = self.action_index(lexer_action.clone());
                self.edge(rule, |target| Transition::Action {
                    target,
                    rule_index: rule,
                    action_index,
                    ctx_dependent: false,
                })
            }
            Element::CustomAction(index) => {
                let action_index = if self.atn.is_lexer() {
                    self.action_index(LexerAction::Custom {
                        rule_index: rule,
                        action_index: *index,
                    })
                } else {
                    *index
                };
                self.edge(rule, |target| Transition::Action {
                    target,
                    rule_index: rule,
                    action_index,
                    ctx_dependent: false,
                })
            }
            Element::Predicate(pred_index) => {
                let pred_index = *pred_index;
                self.edge(rule, |target| Transition::Predicate {
                    target,
                    rule_index: rule,
                    pred_index,
                    ctx_dependent: false,
                })
            }
            Element::Precedence(precedence) => {
                let precedence = *precedence;
                self.edge(rule, |target| Transition::Precedence { target, precedence })
            }
            Element::RuleRef { name, precedence } => {
                let called = self.declare_rule(name);
                let rule_start = self.atn.rule_to_start_state[called];
                let precedence = *precedence;
                self.edge(rule, |follow_state| Transition::Rule {
                    target: rule_start,
                    rule_index: called,
                    precedence,
                    follow_state,
                })
            }
        };
        Ok(handle)
    }

    fn block(
        &mut self,
        rule: usize,
        kind: BlockKind,
        alts: &[&Element],
        bypass: Bypass,
    ) -> AtnResult<Handle> {
        let start = self.basic(rule);
        let end = self
            .atn
            .add_state(rule, StateKind::BlockEnd { start_state: start });
        self.atn.states_mut()[start].kind = match kind {
            BlockKind::Plain => StateKind::BlockStart { end_state: end },
            BlockKind::Star => StateKind::StarBlockStart { end_state: end },
            // loop back is patched in by `plus`
            BlockKind::Plus => StateKind::PlusBlockStart {
                end_state: end,
                loop_back_state: end,
            },
        };
        self.atn.define_decision_state(start);

        if bypass == Bypass::First {
            self.add_transition(start, epsilon(end));
        }
        for alt in alts {
            let h = self.element(rule, alt)?;
            self.add_transition(start, epsilon(h.left));
            self.add_transition(h.right, epsilon(end));
        }
        if bypass == Bypass::Last {
            self.add_transition(start, epsilon(end));
        }
        Ok(Handle {
            left: start,
            right: end,
        })
    }

    fn star(&mut self, rule: usize, element: &Element, greedy: bool) -> AtnResult<Handle> {
        let entry = self.basic(rule);
        self.atn.define_decision_state(entry);
        let block = self.block(rule, BlockKind::Star, &alternatives(element), Bypass::None)?;
        let loop_back = self.atn.add_state(rule, StateKind::StarLoopBack);
        let end = self.atn.add_state(
            rule,
            StateKind::LoopEnd {
                loop_back_state: loop_back,
            },
        );
        {
            let state = &mut self.atn.states_mut()[entry];
            state.kind = StateKind::StarLoopEntry {
                loop_back_state: loop_back,
                precedence_decision: false,
            };
            state.non_greedy = !greedy;
        }
        if greedy {
            self.add_transition(entry, epsilon(block.left));
            self.add_transition(entry, epsilon(end));
        } else {
            self.add_transition(entry, epsilon(end));
            self.add_transition(entry, epsilon(block.left));
        }
        self.add_transition(block.right, epsilon(loop_back));
        self.add_transition(loop_back, epsilon(entry));
        Ok(Handle {
            left: entry,
            right: end,
        })
    }

    fn plus(&mut self, rule: usize, element: &Element, greedy: bool) -> AtnResult<Handle> {
        let block = self.block(rule, BlockKind::Plus, &alternatives(element), Bypass::None)?;
        let loop_back = self.atn.add_state(rule, StateKind::PlusLoopBack);
        self.atn.define_decision_state(loop_back);
        self.atn.states_mut()[loop_back].non_greedy = !greedy;
        let end = self.atn.add_state(
            rule,
            StateKind::LoopEnd {
                loop_back_state: loop_back,
            },
        );
        self.atn.states_mut()[block.left].kind = StateKind::PlusBlockStart {
            end_state: block.right,
            loop_back_state: loop_back,
        };
        self.add_transition(block.right, epsilon(loop_back));
        if greedy {
            self.add_transition(loop_back, epsilon(block.left));
            self.add_transition(loop_back, epsilon(end));
        } else {
            self.add_transition(loop_back, epsilon(end));
            self.add_transition(loop_back, epsilon(block.left));
        }
        Ok(Handle {
            left: block.left,
            right: end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_rule_shape() {
        let mut builder = AtnBuilder::lexer();
        let rule = builder.literal_rule("AB", 7, "ab");
        let atn = builder.build().unwrap();

        assert_eq!(rule, 0);
        assert_eq!(atn.mode_to_start_state, vec![0]);
        assert_eq!(atn.rule_to_token_type, vec![7]);
        assert_eq!(atn.max_token_type, 7);
        // token start, rule start, rule stop, three chain states
        assert_eq!(atn.states().len(), 6);
        let token_start = atn.state(0).unwrap();
        assert_eq!(token_start.transitions, vec![epsilon(atn.rule_to_start_state[0])]);
        assert_eq!(token_start.decision, Some(0));
    }

    #[test]
    fn test_forward_reference_resolves() {
        let mut builder = AtnBuilder::parser(2);
        builder.parser_rule("s", seq(vec![rule_ref("a"), token(2)]));
        builder.parser_rule("a", token(1));
        assert_eq!(builder.rule_index("a"), Some(1));
        let atn = builder.build().unwrap();

        let a_start = atn.rule_to_start_state[1];
        let calls: Vec<_> = atn
            .states()
            .iter()
            .flat_map(|s| s.transitions.iter())
            .filter(|t| matches!(t, Transition::Rule { target, .. } if *target == a_start))
            .collect();
        assert_eq!(calls.len(), 1);
        // link() added the return edge
        let a_stop = atn.rule_to_stop_state[1];
        assert_eq!(atn.state(a_stop).unwrap().transitions.len(), 1);
    }

    #[test]
    fn test_undefined_rule_fails() {
        let mut builder = AtnBuilder::parser(1);
        builder.parser_rule("s", rule_ref("missing"));
        let err = builder.build().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_duplicate_rule_fails() {
        let mut builder = AtnBuilder::lexer();
        builder.literal_rule("A", 1, "a");
        builder.literal_rule("A", 2, "b");
        assert!(matches!(builder.build(), Err(AtnError::InvalidAtn { .. })));
    }

    #[test]
    fn test_non_greedy_star_prefers_exit() {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule(
            "COMMENT",
            1,
            seq(vec![text("/*"), non_greedy_star(any()), text("*/")]),
        );
        let atn = builder.build().unwrap();

        let entry = atn
            .states()
            .iter()
            .find(|s| matches!(s.kind, StateKind::StarLoopEntry { .. }))
            .unwrap();
        assert!(entry.is_non_greedy_decision());
        let first = atn.state(entry.transitions[0].target()).unwrap();
        assert!(matches!(first.kind, StateKind::LoopEnd { .. }));
    }

    #[test]
    fn test_greedy_plus_loops_first() {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule("INT", 1, plus(range('0', '9')));
        let atn = builder.build().unwrap();

        let loop_back = atn
            .states()
            .iter()
            .find(|s| matches!(s.kind, StateKind::PlusLoopBack))
            .unwrap();
        assert!(!loop_back.non_greedy);
        let first = atn.state(loop_back.transitions[0].target()).unwrap();
        assert!(matches!(first.kind, StateKind::PlusBlockStart { .. }));
        // token start, plus block start, plus loop back
        assert_eq!(atn.num_decisions(), 3);
    }

    #[test]
    fn test_actions_are_shared() {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule("WS", 1, seq(vec![ch(' '), action(LexerAction::Skip)]));
        builder.lexer_rule("NL", 2, seq(vec![ch('\n'), action(LexerAction::Skip)]));
        builder.lexer_rule("X", 3, seq(vec![ch('x'), custom_action(4)]));
        let atn = builder.build().unwrap();
        assert_eq!(
            atn.lexer_actions,
            vec![
                LexerAction::Skip,
                LexerAction::Custom {
                    rule_index: 2,
                    action_index: 4
                }
            ]
        );
    }

    #[test]
    fn test_modes_get_their_own_start() {
        let mut builder = AtnBuilder::lexer();
        builder.literal_rule("A", 1, "a");
        assert_eq!(builder.add_mode(), 1);
        builder.literal_rule("B", 2, "b");
        builder.set_mode(0);
        builder.literal_rule("C", 3, "c");
        let atn = builder.build().unwrap();

        let mode0 = atn.state(atn.mode_to_start_state[0]).unwrap();
        let mode1 = atn.state(atn.mode_to_start_state[1]).unwrap();
        assert_eq!(mode0.transitions.len(), 2);
        assert_eq!(mode1.transitions.len(), 1);
    }

    #[test]
    fn test_precedence_rejected_in_lexer() {
        let mut builder = AtnBuilder::lexer();
        builder.lexer_rule("A", 1, seq(vec![precedence(2), ch('a')]));
        assert!(builder.build().is_err());
    }

    #[test]
    fn test_left_recursive_marks_precedence_decision() {
        // e : INT ( {precpred 2}? '+' e[3] )* ;
        let mut builder = AtnBuilder::parser(2);
        builder.parser_rule(
            "e",
            seq(vec![
                token(1),
                star(seq(vec![precedence(2), token(2), rule_ref_prec("e", 3)])),
            ]),
        );
        builder.set_left_recursive("e");
        let atn = builder.build().unwrap();
        assert!(atn.states().iter().any(|s| s.is_precedence_decision()));
        assert!(matches!(
            atn.state(atn.rule_to_start_state[0]).unwrap().kind,
            StateKind::RuleStart {
                left_recursive: true,
                ..
            }
        ));
    }
}
