//! Tokenizing many inputs at once
//!
//! Independent inputs can share one [`DfaCache`]: every lexer adds to the
//! same DFAs, so later inputs run mostly on cached edges. With the
//! `parallel` feature the batch is spread over rayon's thread pool;
//! without it the inputs are tokenized one after another. Either way the
//! results come back in input order.
//!
//! ```toml
//! [dependencies]
//! parsanol-atn = { version = "0.1", features = ["parallel"] }
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parsanol_atn::runtime::atn_builder::*;
//! use parsanol_atn::runtime::parallel::{tokenize_batch, ParallelConfig};
//! use parsanol_atn::runtime::{DfaCache, NoHooks};
//!
//! let mut builder = AtnBuilder::lexer();
//! builder.lexer_rule("ID", 1, plus(range('a', 'z')));
//! builder.lexer_rule("WS", 2, seq(vec![plus(ch(' ')), action(LexerAction::Skip)]));
//! let atn = Arc::new(builder.build().unwrap());
//! let cache = Arc::new(DfaCache::for_lexer(&atn));
//!
//! let results = tokenize_batch(&atn, &cache, &["a b", "c"], || NoHooks, &ParallelConfig::new());
//! assert_eq!(results[0].as_ref().unwrap().tokens.len(), 2);
//! assert_eq!(results[1].as_ref().unwrap().tokens.len(), 1);
//! ```

use std::sync::Arc;

use super::atn::Atn;
use super::char_stream::InputStream;
use super::dfa_cache::DfaCache;
use super::error::{AtnResult, LexerErrorReport};
use super::lexer::{Lexer, LexerConfig, LexerHooks};
use super::token::Token;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Tokens and diagnostics of one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tokenized {
    /// Every token except `EOF`
    pub tokens: Vec<Token>,
    /// Recognition errors reported while lexing
    pub errors: Vec<LexerErrorReport>,
}

/// Configuration for batch tokenization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParallelConfig {
    /// Number of threads to use (None = rayon's global pool)
    pub num_threads: Option<usize>,
    /// Batches smaller than this run sequentially
    pub min_batch: usize,
    /// Configuration of every lexer in the batch
    pub lexer: LexerConfig,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_batch: 2,
            lexer: LexerConfig::default(),
        }
    }
}

impl ParallelConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of threads to use
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n);
        self
    }

    /// Set the smallest batch worth spreading over threads
    pub fn with_min_batch(mut self, size: usize) -> Self {
        self.min_batch = size;
        self
    }

    /// Set the configuration of every lexer
    pub fn with_lexer_config(mut self, lexer: LexerConfig) -> Self {
        self.lexer = lexer;
        self
    }
}

/// Tokenize one input
pub fn tokenize<H: LexerHooks>(
    atn: &Arc<Atn>,
    cache: &Arc<DfaCache>,
    input: &str,
    hooks: H,
    config: LexerConfig,
) -> AtnResult<Tokenized> {
    let mut lexer = Lexer::with_hooks(
        Arc::clone(atn),
        Arc::clone(cache),
        InputStream::new(input),
        hooks,
    )
    .with_config(config);
    let tokens = lexer.all_tokens()?;
    Ok(Tokenized {
        tokens,
        errors: lexer.errors().to_vec(),
    })
}

fn tokenize_sequential<H, F>(
    atn: &Arc<Atn>,
    cache: &Arc<DfaCache>,
    inputs: &[&str],
    hooks: &F,
    config: LexerConfig,
) -> Vec<AtnResult<Tokenized>>
where
    H: LexerHooks,
    F: Fn() -> H,
{
    inputs
        .iter()
        .map(|input| tokenize(atn, cache, input, hooks(), config))
        .collect()
}

/// Tokenize every input, sharing `cache`
///
/// `hooks` builds a fresh set of hooks per input. Results are in the same
/// order as `inputs`.
#[cfg(feature = "parallel")]
pub fn tokenize_batch<H, F>(
    atn: &Arc<Atn>,
    cache: &Arc<DfaCache>,
    inputs: &[&str],
    hooks: F,
    config: &ParallelConfig,
) -> Vec<AtnResult<Tokenized>>
where
    H: LexerHooks,
    F: Fn() -> H + Sync + Send,
{
    if inputs.len() < config.min_batch {
        return tokenize_sequential(atn, cache, inputs, &hooks, config.lexer);
    }
    let lexer_config = config.lexer;
    let run = || -> Vec<AtnResult<Tokenized>> {
        inputs
            .par_iter()
            .map(|input| tokenize(atn, cache, input, hooks(), lexer_config))
            .collect()
    };
    match config.num_threads {
        Some(n) => match rayon::ThreadPoolBuilder::new().num_threads(n).build() {
            Ok(pool) => pool.install(run),
            Err(_) => run(),
        },
        None => run(),
    }
}

/// Tokenize every input, sharing `cache` (sequential fallback)
#[cfg(not(feature = "parallel"))]
pub fn tokenize_batch<H, F>(
    atn: &Arc<Atn>,
    cache: &Arc<DfaCache>,
    inputs: &[&str],
    hooks: F,
    config: &ParallelConfig,
) -> Vec<AtnResult<Tokenized>>
where
    H: LexerHooks,
    F: Fn() -> H + Sync + Send,
{
    tokenize_sequential(atn, cache, inputs, &hooks, config.lexer)
}
