//! Parsanol ATN - ANTLR-style ATN runtime for Rust
//!
//! This crate runs the augmented transition networks generated lexers and
//! parsers are built from. It provides:
//! - ATN graph model, builder, JSON loading and structural verification
//! - Lexer ATN simulation with longest-match, backtracking and lazily
//!   built, cached DFAs shared across threads
//! - Prediction contexts (graph-structured call stacks) with merging and
//!   interning
//! - Semantic and precedence predicates
//! - Lexer commands (skip, more, modes, type, channel, custom actions)
//! - LL(1) follow sets and expected-token queries
//! - A lexer driver with error recovery and a parser support layer
//! - Text and DOT dumps of cached DFAs
//! - Optional parallel batch tokenization
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use parsanol_atn::prelude::*;
//!
//! let mut builder = AtnBuilder::lexer();
//! builder.literal_rule("IF", 1, "if");
//! builder.lexer_rule("ID", 2, plus(range('a', 'z')));
//! builder.lexer_rule("WS", 3, seq(vec![plus(one_of(" \t\n")), action(LexerAction::Skip)]));
//! let atn = Arc::new(builder.build().unwrap());
//!
//! // One cache per grammar, shared by every lexer instance
//! let cache = Arc::new(DfaCache::for_lexer(&atn));
//!
//! let mut lexer = Lexer::new(atn, cache, InputStream::new("if iffy"));
//! let types: Vec<i32> = lexer
//!     .all_tokens()
//!     .unwrap()
//!     .iter()
//!     .map(|t| t.token_type)
//!     .collect();
//! assert_eq!(types, vec![1, 2]);
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` - Enable debug logging using the `log` crate
//! - `parallel` - Tokenize batches on rayon's thread pool

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]
#![allow(clippy::module_inception)]
#![allow(clippy::redundant_closure)]

// Prelude module for convenient imports
pub mod prelude;

// Runtime core
pub mod runtime;

/// Re-export commonly used types for convenience
pub use runtime::{
    Atn, AtnBuilder, AtnError, AtnResult, CharStream, DfaCache, DfaSerializer, InputStream,
    IntervalSet, Lexer, LexerConfig, LexerHooks, LexerSimulator, ParserSupport,
    PredictionContext, RuleContext, Token, Vocabulary,
};
