//! Shared DFA and prediction-context cache
//!
//! A [`DfaCache`] holds the per-mode (lexer) or per-decision (parser) DFAs
//! together with the prediction-context interning table. It is meant to be
//! wrapped in an `Arc` and handed to every simulator built from the same
//! ATN, including simulators on other threads. Each DFA sits behind its own
//! mutex, so lexers working in different modes never contend.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parsanol_atn::runtime::{AtnBuilder, DfaCache};
//!
//! let mut builder = AtnBuilder::lexer();
//! builder.literal_rule("IF", 1, "if");
//! let atn = builder.build().unwrap();
//!
//! let cache = Arc::new(DfaCache::for_lexer(&atn));
//! assert_eq!(cache.len(), 1);
//! assert_eq!(cache.stats().states, 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::atn::Atn;
use super::dfa::Dfa;
use super::error::{AtnError, AtnResult};
use super::prediction_context::PredictionContextCache;

/// Counters reported by [`DfaCache::stats`]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DfaCacheStats {
    /// Steps answered by a cached DFA edge or start state
    pub hits: u64,
    /// Steps that fell back to ATN simulation
    pub misses: u64,
    /// DFA states across all DFAs
    pub states: usize,
    /// Cached edges across all DFAs
    pub edges: usize,
}

impl DfaCacheStats {
    /// Fraction of steps answered from the DFA
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total > 0 {
            self.hits as f64 / total as f64
        } else {
            0.0
        }
    }
}

/// DFAs plus the context cache, shareable across simulators
#[derive(Debug)]
pub struct DfaCache {
    dfas: Vec<Mutex<Dfa>>,
    context_cache: Mutex<PredictionContextCache>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DfaCache {
    /// One DFA per lexer mode
    pub fn for_lexer(atn: &Atn) -> Self {
        let dfas = atn
            .mode_to_start_state
            .iter()
            .enumerate()
            .map(|(mode, &start)| Mutex::new(Dfa::new(start, mode, false)))
            .collect();
        Self::with_dfas(dfas)
    }

    /// One DFA per parser decision
    pub fn for_parser(atn: &Atn) -> Self {
        let dfas = atn
            .decision_to_state
            .iter()
            .enumerate()
            .map(|(decision, &state)| {
                let precedence = atn
                    .state(state)
                    .map(|s| s.is_precedence_decision())
                    .unwrap_or(false);
                Mutex::new(Dfa::new(state, decision, precedence))
            })
            .collect();
        Self::with_dfas(dfas)
    }

    fn with_dfas(dfas: Vec<Mutex<Dfa>>) -> Self {
        Self {
            dfas,
            context_cache: Mutex::new(PredictionContextCache::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Lock the DFA of mode or decision `index`
    pub fn dfa(&self, index: usize) -> AtnResult<MutexGuard<'_, Dfa>> {
        self.dfas
            .get(index)
            .map(|m| m.lock().unwrap_or_else(PoisonError::into_inner))
            .ok_or_else(|| AtnError::illegal_state(format!("no DFA for mode or decision {}", index)))
    }

    /// Lock the prediction-context interning table
    pub fn context_cache(&self) -> MutexGuard<'_, PredictionContextCache> {
        self.context_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of DFAs
    #[inline]
    pub fn len(&self) -> usize {
        self.dfas.len()
    }

    /// Whether the cache holds no DFA
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dfas.is_empty()
    }

    #[inline]
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Hit/miss counters and DFA sizes
    pub fn stats(&self) -> DfaCacheStats {
        let mut stats = DfaCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            ..DfaCacheStats::default()
        };
        for dfa in &self.dfas {
            let dfa = dfa.lock().unwrap_or_else(PoisonError::into_inner);
            stats.states += dfa.len();
            stats.edges += dfa.edge_count();
        }
        stats
    }

    /// Drop every cached state, edge and context, and reset the counters
    ///
    /// Needs exclusive access: a cache shared through an `Arc` can only be
    /// cleared once `Arc::get_mut` succeeds, so no simulator is holding
    /// state ids into it.
    pub fn clear(&mut self) {
        for dfa in &mut self.dfas {
            dfa.get_mut().unwrap_or_else(PoisonError::into_inner).clear();
        }
        self.context_cache
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        *self.hits.get_mut() = 0;
        *self.misses.get_mut() = 0;
    }
}
