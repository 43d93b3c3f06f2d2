//! Error types for the ATN runtime
//!
//! Only [`AtnError::LexerNoViableAlt`] is an expected runtime condition: the
//! lexer driver reports it and recovers by dropping one input symbol. Every
//! other variant marks a broken invariant or a malformed ATN and aborts the
//! operation that hit it.

use std::fmt;
use std::sync::Arc;

use super::config_set::AtnConfigSet;

/// Errors raised by the ATN runtime
#[derive(Debug, Clone)]
pub enum AtnError {
    /// No lexer rule matched at the current position
    LexerNoViableAlt {
        /// Index where the failed token started
        start_index: usize,
        /// Input index when matching gave up
        index: usize,
        /// The configurations alive when matching stopped
        dead_end_configs: Arc<AtnConfigSet>,
    },

    /// An internal invariant was violated
    IllegalState {
        /// What went wrong
        message: String,
    },

    /// A precedence transition was reached while lexing
    PrecedencePredicateInLexer {
        /// ATN state owning the transition
        state: usize,
    },

    /// A state number outside the ATN was requested
    InvalidStateNumber {
        /// The offending state number
        state: isize,
    },

    /// A DFA was cleared while a match still held ids of its states
    ///
    /// The lexer simulator restarts the match when it sees this, so it only
    /// escapes from direct [`Dfa`](super::dfa::Dfa) users.
    DfaCleared {
        /// Mode or decision of the cleared DFA
        decision: usize,
    },

    /// `pop_mode` was called with nothing to pop
    EmptyModeStack,

    /// The ATN graph failed to load or verify
    InvalidAtn {
        /// Reason for rejecting the graph
        message: String,
    },
}

impl AtnError {
    /// Shorthand for an [`AtnError::IllegalState`]
    pub fn illegal_state(message: impl Into<String>) -> Self {
        AtnError::IllegalState {
            message: message.into(),
        }
    }

    /// Shorthand for an [`AtnError::InvalidAtn`]
    pub fn invalid_atn(message: impl Into<String>) -> Self {
        AtnError::InvalidAtn {
            message: message.into(),
        }
    }

    /// Whether the lexer driver may recover from this error
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AtnError::LexerNoViableAlt { .. })
    }
}

impl fmt::Display for AtnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtnError::LexerNoViableAlt {
                start_index,
                index,
                dead_end_configs,
            } => {
                write!(
                    f,
                    "no viable lexer alternative between {} and {} ({} dead-end configs)",
                    start_index,
                    index,
                    dead_end_configs.len()
                )
            }
            AtnError::IllegalState { message } => write!(f, "Illegal state: {}", message),
            AtnError::PrecedencePredicateInLexer { state } => {
                write!(
                    f,
                    "Precedence predicates are not supported in lexers (state {})",
                    state
                )
            }
            AtnError::InvalidStateNumber { state } => {
                write!(f, "Invalid state number: {}", state)
            }
            AtnError::DfaCleared { decision } => {
                write!(f, "DFA {} was cleared during a match", decision)
            }
            AtnError::EmptyModeStack => write!(f, "Empty mode stack"),
            AtnError::InvalidAtn { message } => write!(f, "Invalid ATN: {}", message),
        }
    }
}

impl std::error::Error for AtnError {}

impl From<serde_json::Error> for AtnError {
    fn from(err: serde_json::Error) -> Self {
        AtnError::invalid_atn(err.to_string())
    }
}

/// Result alias used throughout the runtime
pub type AtnResult<T> = Result<T, AtnError>;

/// A diagnostic recorded by the lexer when it had to drop input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexerErrorReport {
    /// Line where the bad token started (1-based)
    pub line: u32,
    /// Column where the bad token started (0-based, in code points)
    pub column: u32,
    /// Code point index of the token start
    pub start_index: usize,
    /// Code point index where recognition stopped
    pub stop_index: usize,
    /// Human readable message
    pub message: String,
}

impl fmt::Display for LexerErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}:{} {}", self.line, self.column, self.message)
    }
}

/// Escape text for a diagnostic, spelling out control characters
pub fn error_display(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
