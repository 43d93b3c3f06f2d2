//! ATN runtime core
//!
//! The pieces a generated lexer or parser needs at run time: the ATN graph,
//! the lazily built DFAs that cache its simulation, and the lexer and
//! parser drivers on top.
//!
//! # Module Organization
//!
//! ## Graph
//! - [`atn`] - States, transitions, rule tables and follow sets
//! - [`atn_builder`] - Building an ATN from grammar-like elements
//! - [`atn_verify`] - Structural checks on a built ATN
//! - [`ll1`] - LL(1) follow-set analysis
//!
//! ## Prediction
//! - [`prediction_context`] - Call stacks as shared graphs, and merging them
//! - [`semantic_context`] - Predicate expressions
//! - [`config`] / [`config_set`] - ATN configurations and their sets
//! - [`dfa`] / [`dfa_cache`] - DFA states, per-mode DFAs and the shared cache
//! - [`dfa_serializer`] - Text and DOT dumps of a DFA
//!
//! ## Lexing
//! - [`char_stream`] - Code-point input
//! - [`lexer_action`] - Lexer commands and their executor
//! - [`lexer_simulator`] - The lexer ATN simulator
//! - [`lexer`] - The token loop
//! - [`parallel`] - Tokenizing batches of inputs
//!
//! ## Parsing
//! - [`parser_support`] - Rule contexts and parser bookkeeping
//!
//! ## Shared
//! - [`token`] - Tokens, token constants and vocabularies
//! - [`interval_set`] - Sets of symbols
//! - [`error`] - Errors and lexer diagnostics

// ============================================================================
// Logging
// ============================================================================

// Defined ahead of the module declarations so every module below can use
// them. Without the `logging` feature they expand to nothing.

#[cfg(not(feature = "logging"))]
macro_rules! log_debug {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_debug {
    ($($arg:tt)*) => { log::debug!($($arg)*) };
}

#[cfg(not(feature = "logging"))]
macro_rules! log_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "logging")]
macro_rules! log_trace {
    ($($arg:tt)*) => { log::trace!($($arg)*) };
}

// ============================================================================
// Module Declarations
// ============================================================================

pub mod atn;
pub mod atn_builder;
pub mod atn_verify;
pub mod char_stream;
pub mod config;
pub mod config_set;
pub mod dfa;
pub mod dfa_cache;
pub mod dfa_serializer;
pub mod error;
pub mod interval_set;
pub mod lexer;
pub mod lexer_action;
pub mod lexer_simulator;
pub mod ll1;
pub mod parser_support;
pub mod prediction_context;
pub mod semantic_context;
pub mod token;

// Batch tokenization (always available, uses rayon when feature is enabled)
pub mod parallel;

// ============================================================================
// Graph
// ============================================================================

pub use atn::{Atn, AtnState, GrammarType, StateKind, Transition};
pub use atn_builder::{AtnBuilder, Element};
pub use atn_verify::{AtnVerifier, AtnWarning, ViolationKind};
pub use ll1::{Ll1Analyzer, HIT_PRED};

// ============================================================================
// Error Handling
// ============================================================================

pub use error::{error_display, AtnError, AtnResult, LexerErrorReport};

// ============================================================================
// Symbols and Tokens
// ============================================================================

pub use interval_set::{Interval, IntervalSet};
pub use token::{
    Token, Vocabulary, DEFAULT_CHANNEL, EOF, EPSILON, HIDDEN_CHANNEL, INVALID_ALT_NUMBER,
    INVALID_TYPE, MIN_USER_TOKEN_TYPE,
};

// ============================================================================
// Prediction
// ============================================================================

pub use config::{AtnConfig, ConfigKey};
pub use config_set::AtnConfigSet;
pub use prediction_context::{
    MergeCache, PredictionContext, PredictionContextCache, EMPTY_RETURN_STATE,
};
pub use semantic_context::{Recognizer, SemanticContext};

// ============================================================================
// DFA Caching
// ============================================================================

pub use dfa::{Dfa, DfaState, DfaStateId, PredPrediction, MAX_DFA_EDGE, MIN_DFA_EDGE};
pub use dfa_cache::{DfaCache, DfaCacheStats};
pub use dfa_serializer::DfaSerializer;

// ============================================================================
// Lexing
// ============================================================================

pub use char_stream::{CharStream, InputStream};
pub use lexer::{
    Lexer, LexerConfig, LexerHooks, LexerState, NoHooks, DEFAULT_MODE, MAX_CHAR_VALUE,
    MIN_CHAR_VALUE, MORE, SKIP,
};
pub use lexer_action::{LexerAction, LexerActionExecutor, LexerControl};
pub use lexer_simulator::{LexerRecognizer, LexerSimulator, LexerView};

// ============================================================================
// Parsing
// ============================================================================

pub use parser_support::{NoParserHooks, ParserHooks, ParserSupport, RuleContext};

// ============================================================================
// Parallel Tokenization
// ============================================================================

pub use parallel::{tokenize, tokenize_batch, ParallelConfig, Tokenized};
