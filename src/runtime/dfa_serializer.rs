//! Text and GraphViz renderings of a [`Dfa`]
//!
//! The text form lists one cached edge per line:
//!
//! ```text
//! s0-'a'->s1
//! s1-'b'->:s2=>1
//! ```
//!
//! Accept states are prefixed with `:` and followed by `=>` and their
//! prediction (or predicate list); `^` marks states that need full-context
//! prediction. Dead edges are omitted.

use std::fmt;

use super::dfa::{Dfa, DfaState, DfaStateId};
use super::token::Vocabulary;

/// How edge indices turn into labels
#[derive(Debug, Clone, Copy)]
enum EdgeLabels<'a> {
    /// Edge `i` matches character `i`
    Lexer,
    /// Edge 0 is `EOF`, edge `i` is token type `i - 1`
    Parser(&'a Vocabulary),
}

/// Renders the cached states and edges of a [`Dfa`]
#[derive(Debug, Clone, Copy)]
pub struct DfaSerializer<'a> {
    dfa: &'a Dfa,
    labels: EdgeLabels<'a>,
}

impl<'a> DfaSerializer<'a> {
    /// Serializer for a lexer mode DFA
    pub fn lexer(dfa: &'a Dfa) -> Self {
        Self {
            dfa,
            labels: EdgeLabels::Lexer,
        }
    }

    /// Serializer for a parser decision DFA, naming tokens with `vocabulary`
    pub fn parser(dfa: &'a Dfa, vocabulary: &'a Vocabulary) -> Self {
        Self {
            dfa,
            labels: EdgeLabels::Parser(vocabulary),
        }
    }

    /// Whether there is nothing to render
    fn is_blank(&self) -> bool {
        self.dfa.is_empty() || (self.dfa.s0().is_none() && !self.dfa.is_precedence_dfa())
    }

    fn edge_label(&self, index: usize) -> String {
        match self.labels {
            EdgeLabels::Lexer => match char::from_u32(index as u32) {
                Some(c) => format!("'{}'", c),
                None => index.to_string(),
            },
            EdgeLabels::Parser(_) if index == 0 => "EOF".to_string(),
            EdgeLabels::Parser(vocabulary) => vocabulary.display_name(index as i32 - 1),
        }
    }

    fn state_string(state: &DfaState) -> String {
        let mut s = String::new();
        if state.is_accept_state {
            s.push(':');
        }
        s.push_str(&format!("s{}", state.state_number));
        if state.requires_full_context {
            s.push('^');
        }
        if state.is_accept_state {
            match &state.predicates {
                Some(preds) => {
                    let parts: Vec<String> = preds.iter().map(|p| p.to_string()).collect();
                    s.push_str(&format!("=>[{}]", parts.join(", ")));
                }
                None => s.push_str(&format!("=>{}", state.prediction)),
            }
        }
        s
    }

    fn live_edges(&self) -> impl Iterator<Item = (&'a DfaState, usize, &'a DfaState)> + '_ {
        let dfa = self.dfa;
        dfa.states().iter().flat_map(move |from| {
            from.edges()
                .filter(|(_, to)| !to.is_error())
                .filter_map(move |(i, to)| dfa.state(to).map(|to| (from, i, to)))
        })
    }

    /// The DFA in GraphViz DOT syntax
    pub fn to_dot(&self) -> String {
        DotView(self).to_string()
    }
}

impl fmt::Display for DfaSerializer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_blank() {
            return Ok(());
        }
        for (from, index, to) in self.live_edges() {
            writeln!(
                f,
                "{}-{}->{}",
                Self::state_string(from),
                self.edge_label(index),
                Self::state_string(to)
            )?;
        }
        Ok(())
    }
}

fn dot_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

struct DotView<'s, 'a>(&'s DfaSerializer<'a>);

impl fmt::Display for DotView<'_, '_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ser = self.0;
        writeln!(f, "digraph DFA {{")?;
        writeln!(f, "  rankdir=LR;")?;
        writeln!(f, "  node [shape=circle];")?;
        if !ser.is_blank() {
            for state in ser.dfa.states() {
                let shape = if state.is_accept_state {
                    "doublecircle"
                } else {
                    "circle"
                };
                writeln!(
                    f,
                    "  s{} [shape={}, label=\"{}\"];",
                    state.state_number,
                    shape,
                    dot_escape(DfaSerializer::state_string(state).trim_start_matches(':'))
                )?;
            }
            if let Some(s0) = ser.dfa.s0().filter(|s| *s != DfaStateId::ERROR) {
                writeln!(f, "  s{} [style=filled, fillcolor=lightblue];", s0.index())?;
            }
            for (from, index, to) in ser.live_edges() {
                writeln!(
                    f,
                    "  s{} -> s{} [label=\"{}\"];",
                    from.state_number,
                    to.state_number,
                    dot_escape(&ser.edge_label(index))
                )?;
            }
        }
        writeln!(f, "}}")
    }
}
