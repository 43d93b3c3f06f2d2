//! Configuration sets
//!
//! An [`AtnConfigSet`] holds configurations in insertion order, which is
//! also their priority. Two keying modes exist:
//!
//! - parser sets key on `(state, alt, semantic context)`; a second config
//!   with the same key merges its context into the stored one
//! - ordered (lexer) sets key on the full configuration, so configs that
//!   differ in context or lexer bookkeeping stay separate
//!
//! Once a set becomes the payload of a DFA state it is frozen with
//! [`AtnConfigSet::set_readonly`]; any later mutation is an
//! [`AtnError::IllegalState`].

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use super::config::{AtnConfig, ConfigKey};
use super::error::{AtnError, AtnResult};
use super::parser_support::RuleContext;
use super::prediction_context::{MergeCache, PredictionContext, PredictionContextCache};
use super::semantic_context::{Recognizer, SemanticContext};
use super::token::INVALID_ALT_NUMBER;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LookupKey {
    Key(ConfigKey),
    Full(AtnConfig),
}

/// An insertion-ordered, deduplicating set of configurations
#[derive(Debug, Clone)]
pub struct AtnConfigSet {
    configs: Vec<AtnConfig>,
    lookup: Option<HashMap<LookupKey, usize>>,
    ordered: bool,
    full_ctx: bool,
    readonly: bool,
    cached_hash: Option<u64>,
    /// Whether a configuration with a predicate was added
    pub has_semantic_context: bool,
    /// Whether a configuration popped past the decision's rule
    pub dips_into_outer_context: bool,
}

impl AtnConfigSet {
    /// A parser-style set
    ///
    /// `full_ctx` selects full-context merging, where `$` is a real return
    /// address instead of a wildcard.
    pub fn new(full_ctx: bool) -> Self {
        Self {
            configs: Vec::new(),
            lookup: Some(HashMap::new()),
            ordered: false,
            full_ctx,
            readonly: false,
            cached_hash: None,
            has_semantic_context: false,
            dips_into_outer_context: false,
        }
    }

    /// A lexer-style set keyed on full configuration equality
    pub fn ordered() -> Self {
        Self {
            ordered: true,
            ..Self::new(true)
        }
    }

    /// Add `config`, merging it into an entry with the same key
    ///
    /// Returns `true` when a new entry was appended.
    pub fn add(
        &mut self,
        config: AtnConfig,
        merge_cache: Option<&mut MergeCache>,
    ) -> AtnResult<bool> {
        if self.readonly {
            return Err(AtnError::illegal_state("This set is readonly"));
        }
        if !config.semantic_context.is_none() {
            self.has_semantic_context = true;
        }
        if config.outer_context_depth() > 0 {
            self.dips_into_outer_context = true;
        }

        let key = if self.ordered {
            LookupKey::Full(config.clone())
        } else {
            LookupKey::Key(config.key())
        };
        let lookup = self.lookup.get_or_insert_with(HashMap::new);
        let index = match lookup.get(&key) {
            Some(&index) => index,
            None => {
                lookup.insert(key, self.configs.len());
                self.configs.push(config);
                self.cached_hash = None;
                return Ok(true);
            }
        };

        let root_is_wildcard = !self.full_ctx;
        let existing = &mut self.configs[index];
        let merged = PredictionContext::merge(
            &existing.context,
            &config.context,
            root_is_wildcard,
            merge_cache,
        );
        existing.reaches_into_outer_context = existing
            .reaches_into_outer_context
            .max(config.reaches_into_outer_context);
        if config.precedence_filter_suppressed {
            existing.precedence_filter_suppressed = true;
        }
        existing.context = merged;
        self.cached_hash = None;
        Ok(false)
    }

    /// Add every configuration of `other`
    pub fn add_all(&mut self, other: &AtnConfigSet) -> AtnResult<()> {
        let mut cache = MergeCache::new();
        for config in &other.configs {
            self.add(config.clone(), Some(&mut cache))?;
        }
        Ok(())
    }

    /// Freeze or unfreeze the set
    ///
    /// Freezing drops the lookup index; unfreezing rebuilds it.
    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
        if readonly {
            self.lookup = None;
            self.cached_hash = Some(self.compute_hash());
        } else if self.lookup.is_none() {
            let ordered = self.ordered;
            let index = self
                .configs
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let key = if ordered {
                        LookupKey::Full(c.clone())
                    } else {
                        LookupKey::Key(c.key())
                    };
                    (key, i)
                })
                .collect();
            self.lookup = Some(index);
            self.cached_hash = None;
        }
    }

    /// Whether the set is frozen
    #[inline]
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Whether `$` is a real return address in merges
    #[inline]
    pub fn full_ctx(&self) -> bool {
        self.full_ctx
    }

    /// Whether the set keys on full configuration equality
    #[inline]
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Configurations in insertion order
    #[inline]
    pub fn configs(&self) -> &[AtnConfig] {
        &self.configs
    }

    /// Iterate in insertion order
    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, AtnConfig> {
        self.configs.iter()
    }

    /// Number of configurations
    #[inline]
    pub fn len(&self) -> usize {
        self.configs.len()
    }

    /// Whether the set is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    /// Every alternative represented in the set
    pub fn alts(&self) -> BTreeSet<u32> {
        self.configs.iter().map(|c| c.alt).collect()
    }

    /// Every ATN state represented in the set
    pub fn states(&self) -> HashSet<usize> {
        self.configs.iter().map(|c| c.state).collect()
    }

    /// The single alternative of every config, or `INVALID_ALT_NUMBER`
    pub fn unique_alt(&self) -> u32 {
        let mut alts = self.configs.iter().map(|c| c.alt);
        match alts.next() {
            Some(first) if alts.all(|alt| alt == first) => first,
            _ => INVALID_ALT_NUMBER,
        }
    }

    /// The non-trivial semantic contexts, in insertion order
    pub fn predicates(&self) -> Vec<SemanticContext> {
        self.configs
            .iter()
            .filter(|c| !c.semantic_context.is_none())
            .map(|c| c.semantic_context.clone())
            .collect()
    }

    /// Remove every configuration and reset the flags
    pub fn clear(&mut self) -> AtnResult<()> {
        if self.readonly {
            return Err(AtnError::illegal_state("This set is readonly"));
        }
        self.configs.clear();
        self.lookup = Some(HashMap::new());
        self.cached_hash = None;
        self.has_semantic_context = false;
        self.dips_into_outer_context = false;
        Ok(())
    }

    /// Replace every context by its interned equivalent
    pub fn optimize_configs(&mut self, cache: &mut PredictionContextCache) -> AtnResult<()> {
        if self.readonly {
            return Err(AtnError::illegal_state("This set is readonly"));
        }
        if self.configs.is_empty() {
            return Ok(());
        }
        let mut visited = HashMap::new();
        for config in &mut self.configs {
            config.context = PredictionContext::cached(&config.context, cache, &mut visited);
        }
        Ok(())
    }

    /// Filter a precedence decision's start set
    ///
    /// Alt-1 configs survive when their precedence predicates hold, with
    /// those predicates reduced away. Configs of other alts are dropped when
    /// an alt-1 config reaches the same state with an equal context, unless
    /// they are exempt from the filter.
    pub fn apply_precedence_filter<R: Recognizer + ?Sized>(
        &self,
        recognizer: &mut R,
        outer_ctx: Option<&RuleContext>,
        mut merge_cache: Option<&mut MergeCache>,
    ) -> AtnResult<AtnConfigSet> {
        let mut states_from_alt1: HashMap<usize, Arc<PredictionContext>> = HashMap::new();
        let mut filtered = AtnConfigSet::new(self.full_ctx);

        for config in self.configs.iter().filter(|c| c.alt == 1) {
            let updated = match config.semantic_context.eval_precedence(recognizer, outer_ctx) {
                Some(updated) => updated,
                None => continue,
            };
            states_from_alt1.insert(config.state, config.context.clone());
            let config = if updated != config.semantic_context {
                config.with_semantic_context(updated)
            } else {
                config.clone()
            };
            filtered.add(config, merge_cache.as_deref_mut())?;
        }

        for config in self.configs.iter().filter(|c| c.alt != 1) {
            if !config.precedence_filter_suppressed {
                if let Some(context) = states_from_alt1.get(&config.state) {
                    if **context == *config.context {
                        continue;
                    }
                }
            }
            filtered.add(config.clone(), merge_cache.as_deref_mut())?;
        }
        Ok(filtered)
    }

    /// Structural hash, cached once the set is frozen
    pub fn hash_code(&self) -> u64 {
        self.cached_hash.unwrap_or_else(|| self.compute_hash())
    }

    fn compute_hash(&self) -> u64 {
        let mut hasher = ahash::AHasher::default();
        self.configs.hash(&mut hasher);
        hasher.finish()
    }
}

impl Default for AtnConfigSet {
    fn default() -> Self {
        Self::new(true)
    }
}

impl PartialEq for AtnConfigSet {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
            || (self.full_ctx == other.full_ctx
                && self.has_semantic_context == other.has_semantic_context
                && self.dips_into_outer_context == other.dips_into_outer_context
                && self.configs == other.configs)
    }
}

impl Eq for AtnConfigSet {}

impl Hash for AtnConfigSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl<'a> IntoIterator for &'a AtnConfigSet {
    type Item = &'a AtnConfig;
    type IntoIter = std::slice::Iter<'a, AtnConfig>;

    fn into_iter(self) -> Self::IntoIter {
        self.configs.iter()
    }
}

impl fmt::Display for AtnConfigSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.configs.iter().map(|c| c.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))?;
        if self.has_semantic_context {
            write!(f, ",hasSemanticContext=true")?;
        }
        let unique = self.unique_alt();
        if unique != INVALID_ALT_NUMBER {
            write!(f, ",uniqueAlt={}", unique)?;
        }
        if self.dips_into_outer_context {
            write!(f, ",dipsIntoOuterContext")?;
        }
        Ok(())
    }
}
