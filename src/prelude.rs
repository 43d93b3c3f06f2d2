//! Prelude module for convenient imports
//!
//! This module re-exports the most commonly used types and traits from
//! parsanol-atn. Importing it with a wildcard brings the core types and the
//! ATN builder helpers into scope:
//!
//! ```
//! use parsanol_atn::prelude::*;
//! ```
//!
//! # Re-exported Items
//!
//! ## Core Types
//! - [`Atn`] - The ATN graph
//! - [`DfaCache`] - DFAs shared by every recognizer of one grammar
//! - [`InputStream`] - Buffered code-point input
//! - [`Token`] - A lexed token
//! - [`AtnError`] / [`AtnResult`] - Errors
//!
//! ## Building
//! - [`AtnBuilder`] - Builder for lexer and parser ATNs
//! - [`seq()`], [`alt()`], [`star()`], [`plus()`], [`optional()`] - Structure
//! - [`ch()`], [`range()`], [`one_of()`], [`text()`], [`token()`] - Symbols
//! - [`action()`], [`predicate()`] - Commands and predicates
//!
//! ## Lexing
//! - [`Lexer`] - The token loop
//! - [`LexerHooks`] - Grammar-specific predicates and actions
//! - [`LexerAction`] - Lexer commands
//!
//! ## Parsing
//! - [`ParserSupport`] - Rule bookkeeping for generated parsers
//! - [`RuleContext`] - A rule invocation

// ============================================================================
// Core Types
// ============================================================================

pub use crate::runtime::{
    Atn, AtnError, AtnResult, CharStream, DfaCache, InputStream, IntervalSet, Token, Vocabulary,
    EOF,
};

// ============================================================================
// Building
// ============================================================================

pub use crate::runtime::atn_builder::{
    action, alt, any, ch, custom_action, non_greedy_optional, non_greedy_plus, non_greedy_star,
    not_set, one_of, optional, plus, predicate, range, rule_ref, seq, star, text, token,
    AtnBuilder, Element,
};

// ============================================================================
// Lexing
// ============================================================================

pub use crate::runtime::{
    Lexer, LexerAction, LexerConfig, LexerErrorReport, LexerHooks, LexerView, NoHooks,
};

// ============================================================================
// Parsing
// ============================================================================

pub use crate::runtime::{ParserHooks, ParserSupport, RuleContext, SemanticContext};
