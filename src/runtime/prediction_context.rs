//! Graph-structured return stacks
//!
//! A [`PredictionContext`] records where a configuration returns to once its
//! current rule finishes. Contexts form a DAG: many configurations share the
//! same invocation suffix, so nodes are reference counted, never mutated,
//! and interned through a [`PredictionContextCache`] so structurally equal
//! subgraphs collapse to one allocation.
//!
//! Three shapes exist:
//! - **Empty** (`$`): bottom of the stack
//! - **Singleton**: one parent and one return state
//! - **Array**: parallel parents/return states, sorted by return state, with
//!   the `$` entry (return state [`EMPTY_RETURN_STATE`], no parent) last
//!
//! # Example
//!
//! ```rust
//! use parsanol_atn::runtime::{MergeCache, PredictionContext};
//!
//! let empty = PredictionContext::empty();
//! let a = PredictionContext::singleton(Some(empty.clone()), 5);
//! let b = PredictionContext::singleton(Some(empty.clone()), 9);
//!
//! let mut cache = MergeCache::new();
//! let merged = PredictionContext::merge(&a, &b, true, Some(&mut cache));
//! assert_eq!(merged.len(), 2);
//! assert_eq!(merged.to_string(), "[5 $, 9 $]");
//! ```

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use hashbrown::{HashMap, HashSet};

use super::atn::{Atn, Transition};
use super::error::{AtnError, AtnResult};
use super::parser_support::RuleContext;

/// Return state marking the `$` entry of an array context
pub const EMPTY_RETURN_STATE: i32 = 0x7FFF_FFFF;

static EMPTY: OnceLock<Arc<PredictionContext>> = OnceLock::new();

#[derive(Debug)]
enum Shape {
    Empty,
    Singleton {
        parent: Option<Arc<PredictionContext>>,
        return_state: i32,
    },
    Array {
        parents: Vec<Option<Arc<PredictionContext>>>,
        return_states: Vec<i32>,
    },
}

/// An immutable node of the return-stack graph
///
/// Equality and hashing are structural; the hash is computed once at
/// construction.
#[derive(Debug)]
pub struct PredictionContext {
    cached_hash: u64,
    shape: Shape,
}

fn structural_hash<'a>(
    parents: impl Iterator<Item = Option<&'a Arc<PredictionContext>>>,
    return_states: &[i32],
) -> u64 {
    let mut hasher = ahash::AHasher::default();
    for parent in parents {
        hasher.write_u64(parent.map_or(0, |p| p.cached_hash));
    }
    for &state in return_states {
        hasher.write_i32(state);
    }
    hasher.finish()
}

#[inline]
fn same_parent(a: Option<&Arc<PredictionContext>>, b: Option<&Arc<PredictionContext>>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => Arc::ptr_eq(x, y) || **x == **y,
        (None, None) => true,
        _ => false,
    }
}

#[inline]
fn identical_parent(
    a: Option<&Arc<PredictionContext>>,
    b: Option<&Arc<PredictionContext>>,
) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        (None, None) => true,
        _ => false,
    }
}

impl PredictionContext {
    /// The shared `$` context
    pub fn empty() -> Arc<Self> {
        EMPTY
            .get_or_init(|| {
                let mut hasher = ahash::AHasher::default();
                hasher.write_i32(EMPTY_RETURN_STATE);
                Arc::new(Self {
                    cached_hash: hasher.finish(),
                    shape: Shape::Empty,
                })
            })
            .clone()
    }

    /// Push `return_state` on top of `parent`
    ///
    /// `None` with [`EMPTY_RETURN_STATE`] is the empty context. A `None`
    /// parent otherwise means "caller unknown", which follow-set analysis
    /// uses when it starts without an invocation chain.
    pub fn singleton(parent: Option<Arc<Self>>, return_state: i32) -> Arc<Self> {
        if return_state == EMPTY_RETURN_STATE && parent.is_none() {
            return Self::empty();
        }
        let cached_hash = structural_hash(std::iter::once(parent.as_ref()), &[return_state]);
        Arc::new(Self {
            cached_hash,
            shape: Shape::Singleton {
                parent,
                return_state,
            },
        })
    }

    /// Build an array context; `return_states` must be sorted ascending
    pub fn array(parents: Vec<Option<Arc<Self>>>, return_states: Vec<i32>) -> Arc<Self> {
        debug_assert_eq!(parents.len(), return_states.len());
        debug_assert!(return_states.windows(2).all(|w| w[0] <= w[1]));
        let cached_hash = structural_hash(parents.iter().map(Option::as_ref), &return_states);
        Arc::new(Self {
            cached_hash,
            shape: Shape::Array {
                parents,
                return_states,
            },
        })
    }

    /// Number of (parent, return state) entries
    pub fn len(&self) -> usize {
        match &self.shape {
            Shape::Empty | Shape::Singleton { .. } => 1,
            Shape::Array { return_states, .. } => return_states.len(),
        }
    }

    /// Parent of entry `index`
    pub fn parent(&self, index: usize) -> Option<&Arc<Self>> {
        match &self.shape {
            Shape::Empty => None,
            Shape::Singleton { parent, .. } => parent.as_ref(),
            Shape::Array { parents, .. } => parents.get(index).and_then(Option::as_ref),
        }
    }

    /// Return state of entry `index`
    pub fn return_state(&self, index: usize) -> i32 {
        match &self.shape {
            Shape::Empty => EMPTY_RETURN_STATE,
            Shape::Singleton { return_state, .. } => *return_state,
            Shape::Array { return_states, .. } => return_states
                .get(index)
                .copied()
                .unwrap_or(EMPTY_RETURN_STATE),
        }
    }

    /// Whether this is the `$` context
    pub fn is_empty(&self) -> bool {
        match &self.shape {
            Shape::Empty => true,
            Shape::Singleton { .. } => false,
            Shape::Array { return_states, .. } => {
                return_states.first() == Some(&EMPTY_RETURN_STATE)
            }
        }
    }

    /// Whether one of the entries is `$`
    #[inline]
    pub fn has_empty_path(&self) -> bool {
        self.return_state(self.len() - 1) == EMPTY_RETURN_STATE
    }

    /// The cached structural hash
    #[inline]
    pub fn hash_code(&self) -> u64 {
        self.cached_hash
    }

    #[inline]
    fn is_empty_shape(&self) -> bool {
        matches!(self.shape, Shape::Empty)
    }

    #[inline]
    fn is_array(&self) -> bool {
        matches!(self.shape, Shape::Array { .. })
    }

    /// All (parent, return state) entries
    pub fn entries(&self) -> Vec<(Option<Arc<Self>>, i32)> {
        (0..self.len())
            .map(|i| (self.parent(i).cloned(), self.return_state(i)))
            .collect()
    }

    /// Build the context of an invocation chain
    ///
    /// Each level contributes the follow state of the rule transition that
    /// invoked it; the outermost context (no parent) is `$`.
    pub fn from_rule_context(atn: &Atn, ctx: Option<&RuleContext>) -> AtnResult<Arc<Self>> {
        let ctx = match ctx {
            Some(ctx) => ctx,
            None => return Ok(Self::empty()),
        };
        let parent_ctx = match (ctx.parent(), ctx.invoking_state()) {
            (Some(parent), Some(_)) => parent,
            _ => return Ok(Self::empty()),
        };
        let parent = Self::from_rule_context(atn, Some(parent_ctx))?;
        let invoking = ctx.invoking_state().unwrap_or_default();
        let state = atn.state(invoking)?;
        match state.transitions.first() {
            Some(Transition::Rule { follow_state, .. }) => {
                Ok(Self::singleton(Some(parent), *follow_state as i32))
            }
            _ => Err(AtnError::invalid_atn(format!(
                "invoking state {} does not start with a rule transition",
                invoking
            ))),
        }
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge two contexts into one covering both return paths
    ///
    /// With `root_is_wildcard` (local-context prediction) `$` absorbs any
    /// other context; otherwise `$` is kept as an explicit entry. The merge
    /// cache memoizes results by ordered pair and is consulted in both
    /// orders.
    pub fn merge(
        a: &Arc<Self>,
        b: &Arc<Self>,
        root_is_wildcard: bool,
        mut cache: Option<&mut MergeCache>,
    ) -> Arc<Self> {
        if Arc::ptr_eq(a, b) || **a == **b {
            return a.clone();
        }
        if !a.is_array() && !b.is_array() {
            return Self::merge_singletons(a, b, root_is_wildcard, cache.as_deref_mut());
        }
        if root_is_wildcard {
            if a.is_empty_shape() {
                return a.clone();
            }
            if b.is_empty_shape() {
                return b.clone();
            }
        }
        Self::merge_arrays(a, b, root_is_wildcard, cache)
    }

    fn merge_parents(
        a: Option<&Arc<Self>>,
        b: Option<&Arc<Self>>,
        root_is_wildcard: bool,
        cache: Option<&mut MergeCache>,
    ) -> Option<Arc<Self>> {
        match (a, b) {
            (Some(x), Some(y)) => Some(Self::merge(x, y, root_is_wildcard, cache)),
            (Some(x), None) | (None, Some(x)) => Some(x.clone()),
            (None, None) => None,
        }
    }

    fn merge_singletons(
        a: &Arc<Self>,
        b: &Arc<Self>,
        root_is_wildcard: bool,
        mut cache: Option<&mut MergeCache>,
    ) -> Arc<Self> {
        if let Some(hit) = cache.as_deref().and_then(|c| c.lookup(a, b)) {
            return hit;
        }

        if let Some(root) = Self::merge_root(a, b, root_is_wildcard) {
            if let Some(c) = cache.as_deref_mut() {
                c.put(a, b, root.clone());
            }
            return root;
        }

        let (a_parent, a_state) = (a.parent(0), a.return_state(0));
        let (b_parent, b_state) = (b.parent(0), b.return_state(0));

        let merged = if a_state == b_state {
            // ax + bx = [a,b]x
            let parent = Self::merge_parents(
                a_parent,
                b_parent,
                root_is_wildcard,
                cache.as_deref_mut(),
            );
            if identical_parent(parent.as_ref(), a_parent) {
                return a.clone();
            }
            if identical_parent(parent.as_ref(), b_parent) {
                return b.clone();
            }
            Self::singleton(parent, a_state)
        } else {
            // ax + by = [ax, by]; shared parent is kept once
            let shared = Arc::ptr_eq(a, b) || (a_parent.is_some() && same_parent(a_parent, b_parent));
            let (lo, hi) = if a_state < b_state {
                ((a_parent, a_state), (b_parent, b_state))
            } else {
                ((b_parent, b_state), (a_parent, a_state))
            };
            let parents = if shared {
                vec![a_parent.cloned(), a_parent.cloned()]
            } else {
                vec![lo.0.cloned(), hi.0.cloned()]
            };
            Self::array(parents, vec![lo.1, hi.1])
        };

        if let Some(c) = cache {
            c.put(a, b, merged.clone());
        }
        merged
    }

    fn merge_root(a: &Arc<Self>, b: &Arc<Self>, root_is_wildcard: bool) -> Option<Arc<Self>> {
        if root_is_wildcard {
            // $ + x = $
            if a.is_empty_shape() || b.is_empty_shape() {
                return Some(Self::empty());
            }
            return None;
        }
        match (a.is_empty_shape(), b.is_empty_shape()) {
            (true, true) => Some(Self::empty()),
            // $ + x = [x, $]
            (true, false) => Some(Self::array(
                vec![b.parent(0).cloned(), None],
                vec![b.return_state(0), EMPTY_RETURN_STATE],
            )),
            (false, true) => Some(Self::array(
                vec![a.parent(0).cloned(), None],
                vec![a.return_state(0), EMPTY_RETURN_STATE],
            )),
            (false, false) => None,
        }
    }

    fn merge_arrays(
        a: &Arc<Self>,
        b: &Arc<Self>,
        root_is_wildcard: bool,
        mut cache: Option<&mut MergeCache>,
    ) -> Arc<Self> {
        if let Some(hit) = cache.as_deref().and_then(|c| c.lookup(a, b)) {
            return hit;
        }

        let (a_len, b_len) = (a.len(), b.len());
        let mut parents: Vec<Option<Arc<Self>>> = Vec::with_capacity(a_len + b_len);
        let mut states: Vec<i32> = Vec::with_capacity(a_len + b_len);
        let (mut i, mut j) = (0, 0);

        while i < a_len && j < b_len {
            let a_parent = a.parent(i);
            let b_parent = b.parent(j);
            let a_state = a.return_state(i);
            let b_state = b.return_state(j);
            if a_state == b_state {
                let both_dollar =
                    a_state == EMPTY_RETURN_STATE && a_parent.is_none() && b_parent.is_none();
                let same = a_parent.is_some() && b_parent.is_some() && same_parent(a_parent, b_parent);
                if both_dollar || same {
                    parents.push(a_parent.cloned());
                } else {
                    parents.push(Self::merge_parents(
                        a_parent,
                        b_parent,
                        root_is_wildcard,
                        cache.as_deref_mut(),
                    ));
                }
                states.push(a_state);
                i += 1;
                j += 1;
            } else if a_state < b_state {
                parents.push(a_parent.cloned());
                states.push(a_state);
                i += 1;
            } else {
                parents.push(b_parent.cloned());
                states.push(b_state);
                j += 1;
            }
        }
        for k in i..a_len {
            parents.push(a.parent(k).cloned());
            states.push(a.return_state(k));
        }
        for k in j..b_len {
            parents.push(b.parent(k).cloned());
            states.push(b.return_state(k));
        }

        if states.len() == 1 {
            let single = Self::singleton(parents.pop().flatten(), states[0]);
            if let Some(c) = cache {
                c.put(a, b, single.clone());
            }
            return single;
        }

        combine_common_parents(&mut parents);
        let merged = Self::array(parents, states);

        let result = if *merged == **a {
            a.clone()
        } else if *merged == **b {
            b.clone()
        } else {
            merged
        };
        if let Some(c) = cache {
            c.put(a, b, result.clone());
        }
        result
    }

    // ========================================================================
    // Interning
    // ========================================================================

    /// Rebuild `ctx` from interned nodes
    ///
    /// `visited` maps nodes already processed in this pass to their
    /// canonical replacement.
    pub fn cached(
        ctx: &Arc<Self>,
        cache: &mut PredictionContextCache,
        visited: &mut HashMap<Arc<Self>, Arc<Self>>,
    ) -> Arc<Self> {
        if ctx.is_empty() {
            return ctx.clone();
        }
        if let Some(existing) = visited.get(ctx) {
            return existing.clone();
        }
        if let Some(existing) = cache.get(ctx) {
            visited.insert(ctx.clone(), existing.clone());
            return existing;
        }

        let mut parents: Option<Vec<Option<Arc<Self>>>> = None;
        for i in 0..ctx.len() {
            let original = ctx.parent(i);
            let parent = original.map(|p| Self::cached(p, cache, visited));
            let changed = !identical_parent(parent.as_ref(), original);
            if parents.is_none() && changed {
                parents = Some((0..ctx.len()).map(|k| ctx.parent(k).cloned()).collect());
            }
            if let Some(list) = parents.as_mut() {
                list[i] = parent;
            }
        }

        let parents = match parents {
            None => {
                let canonical = cache.add(ctx.clone());
                visited.insert(ctx.clone(), canonical.clone());
                return canonical;
            }
            Some(p) => p,
        };

        let updated = if parents.len() == 1 {
            let mut parents = parents;
            Self::singleton(parents.pop().flatten(), ctx.return_state(0))
        } else {
            let states = (0..ctx.len()).map(|i| ctx.return_state(i)).collect();
            Self::array(parents, states)
        };
        let updated = cache.add(updated);
        visited.insert(updated.clone(), updated.clone());
        visited.insert(ctx.clone(), updated.clone());
        updated
    }

    /// Every distinct node reachable from `ctx`, parents after children
    pub fn all_nodes(ctx: &Arc<Self>) -> Vec<Arc<Self>> {
        fn walk(
            ctx: &Arc<PredictionContext>,
            nodes: &mut Vec<Arc<PredictionContext>>,
            seen: &mut HashSet<*const PredictionContext>,
        ) {
            if !seen.insert(Arc::as_ptr(ctx)) {
                return;
            }
            nodes.push(ctx.clone());
            for i in 0..ctx.len() {
                if let Some(parent) = ctx.parent(i) {
                    walk(parent, nodes, seen);
                }
            }
        }
        let mut nodes = Vec::new();
        walk(ctx, &mut nodes, &mut HashSet::new());
        nodes
    }
}

/// Replace structurally equal parents by one shared instance
fn combine_common_parents(parents: &mut [Option<Arc<PredictionContext>>]) {
    let mut unique: HashMap<Arc<PredictionContext>, Arc<PredictionContext>> = HashMap::new();
    for slot in parents.iter_mut() {
        if let Some(parent) = slot.take() {
            let canonical = unique.entry(parent.clone()).or_insert(parent).clone();
            *slot = Some(canonical);
        }
    }
}

impl PartialEq for PredictionContext {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.cached_hash != other.cached_hash {
            return false;
        }
        match (&self.shape, &other.shape) {
            (Shape::Empty, Shape::Empty) => true,
            (
                Shape::Singleton {
                    parent: p1,
                    return_state: r1,
                },
                Shape::Singleton {
                    parent: p2,
                    return_state: r2,
                },
            ) => r1 == r2 && same_parent(p1.as_ref(), p2.as_ref()),
            (
                Shape::Array {
                    parents: p1,
                    return_states: r1,
                },
                Shape::Array {
                    parents: p2,
                    return_states: r2,
                },
            ) => {
                r1 == r2
                    && p1
                        .iter()
                        .zip(p2.iter())
                        .all(|(x, y)| same_parent(x.as_ref(), y.as_ref()))
            }
            _ => false,
        }
    }
}

impl Eq for PredictionContext {}

impl Hash for PredictionContext {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.cached_hash);
    }
}

impl fmt::Display for PredictionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.shape {
            Shape::Empty => write!(f, "$"),
            Shape::Singleton {
                parent,
                return_state,
            } => {
                let up = parent.as_ref().map(|p| p.to_string()).unwrap_or_default();
                if up.is_empty() {
                    if *return_state == EMPTY_RETURN_STATE {
                        write!(f, "$")
                    } else {
                        write!(f, "{}", return_state)
                    }
                } else {
                    write!(f, "{} {}", return_state, up)
                }
            }
            Shape::Array {
                parents,
                return_states,
            } => {
                if self.is_empty() {
                    return write!(f, "[]");
                }
                write!(f, "[")?;
                for (i, (parent, state)) in parents.iter().zip(return_states).enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if *state == EMPTY_RETURN_STATE {
                        write!(f, "$")?;
                        continue;
                    }
                    write!(f, "{}", state)?;
                    match parent {
                        Some(p) => write!(f, " {}", p)?,
                        None => write!(f, "null")?,
                    }
                }
                write!(f, "]")
            }
        }
    }
}

// ============================================================================
// Caches
// ============================================================================

/// Memo table for [`PredictionContext::merge`], keyed by ordered pair
#[derive(Debug, Default)]
pub struct MergeCache {
    entries: HashMap<(Arc<PredictionContext>, Arc<PredictionContext>), Arc<PredictionContext>>,
}

impl MergeCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `(a, b)`, then `(b, a)`
    pub fn lookup(
        &self,
        a: &Arc<PredictionContext>,
        b: &Arc<PredictionContext>,
    ) -> Option<Arc<PredictionContext>> {
        self.entries
            .get(&(a.clone(), b.clone()))
            .or_else(|| self.entries.get(&(b.clone(), a.clone())))
            .cloned()
    }

    /// Record the merge of `(a, b)`
    pub fn put(
        &mut self,
        a: &Arc<PredictionContext>,
        b: &Arc<PredictionContext>,
        merged: Arc<PredictionContext>,
    ) {
        self.entries.insert((a.clone(), b.clone()), merged);
    }

    /// Number of memoized pairs
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is memoized
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Interning table mapping contexts to their canonical instance
#[derive(Debug, Default)]
pub struct PredictionContextCache {
    contexts: HashSet<Arc<PredictionContext>>,
}

impl PredictionContextCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern `ctx`, returning the canonical instance
    pub fn add(&mut self, ctx: Arc<PredictionContext>) -> Arc<PredictionContext> {
        if ctx.is_empty_shape() {
            return PredictionContext::empty();
        }
        if let Some(existing) = self.contexts.get(&ctx) {
            return existing.clone();
        }
        self.contexts.insert(ctx.clone());
        ctx
    }

    /// The canonical instance equal to `ctx`, if interned
    pub fn get(&self, ctx: &Arc<PredictionContext>) -> Option<Arc<PredictionContext>> {
        self.contexts.get(ctx).cloned()
    }

    /// Number of interned contexts
    #[inline]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Whether the cache is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Drop every interned context
    pub fn clear(&mut self) {
        self.contexts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(state: i32) -> Arc<PredictionContext> {
        PredictionContext::singleton(Some(PredictionContext::empty()), state)
    }

    #[test]
    fn test_singleton_with_empty_return_is_empty() {
        let ctx = PredictionContext::singleton(None, EMPTY_RETURN_STATE);
        assert!(ctx.is_empty());
        assert!(Arc::ptr_eq(&ctx, &PredictionContext::empty()));
    }

    #[test]
    fn test_structural_equality_and_hash() {
        let a = leaf(3);
        let b = leaf(3);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());
        assert_ne!(leaf(3), leaf(4));
    }

    #[test]
    fn test_merge_identical_returns_first() {
        let a = leaf(1);
        let b = leaf(1);
        let merged = PredictionContext::merge(&a, &b, false, None);
        assert!(Arc::ptr_eq(&merged, &a));
    }

    #[test]
    fn test_merge_root_wildcard_absorbs() {
        let empty = PredictionContext::empty();
        let x = leaf(7);
        let merged = PredictionContext::merge(&empty, &x, true, None);
        assert!(merged.is_empty());
    }

    #[test]
    fn test_merge_root_full_context_keeps_dollar_last() {
        let empty = PredictionContext::empty();
        let x = leaf(7);
        let merged = PredictionContext::merge(&x, &empty, false, None);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.return_state(0), 7);
        assert_eq!(merged.return_state(1), EMPTY_RETURN_STATE);
        assert!(merged.parent(1).is_none());
        assert!(merged.has_empty_path());
        assert!(!merged.is_empty());
        assert_eq!(merged.to_string(), "[7 $, $]");
    }

    #[test]
    fn test_merge_same_return_state_merges_parents() {
        let p1 = leaf(10);
        let p2 = leaf(20);
        let a = PredictionContext::singleton(Some(p1), 5);
        let b = PredictionContext::singleton(Some(p2), 5);
        let merged = PredictionContext::merge(&a, &b, false, None);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged.return_state(0), 5);
        let parent = merged.parent(0).unwrap();
        assert_eq!(parent.len(), 2);
        assert_eq!(parent.return_state(0), 10);
        assert_eq!(parent.return_state(1), 20);
    }

    #[test]
    fn test_merge_shared_parent_duplicated() {
        let shared = leaf(1);
        let a = PredictionContext::singleton(Some(shared.clone()), 9);
        let b = PredictionContext::singleton(Some(shared.clone()), 4);
        let merged = PredictionContext::merge(&a, &b, false, None);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.return_state(0), 4);
        assert_eq!(merged.return_state(1), 9);
        assert!(Arc::ptr_eq(merged.parent(0).unwrap(), &shared));
        assert!(Arc::ptr_eq(merged.parent(1).unwrap(), &shared));
    }

    #[test]
    fn test_merge_arrays_join() {
        let ab = PredictionContext::merge(&leaf(1), &leaf(3), false, None);
        let cd = PredictionContext::merge(&leaf(2), &leaf(3), false, None);
        let mut cache = MergeCache::new();
        let merged = PredictionContext::merge(&ab, &cd, false, Some(&mut cache));
        let states: Vec<i32> = (0..merged.len()).map(|i| merged.return_state(i)).collect();
        assert_eq!(states, vec![1, 2, 3]);
        assert!(!cache.is_empty());
        // parents are all `$` and collapse to one instance
        let first = merged.parent(0).unwrap();
        assert!(Arc::ptr_eq(first, merged.parent(2).unwrap()));
    }

    #[test]
    fn test_merge_array_subset_returns_input() {
        let abc = PredictionContext::merge(
            &PredictionContext::merge(&leaf(1), &leaf(2), false, None),
            &leaf(3),
            false,
            None,
        );
        let merged = PredictionContext::merge(&abc, &leaf(2), false, None);
        assert!(Arc::ptr_eq(&merged, &abc));
    }

    #[test]
    fn test_merge_cache_hit_in_reverse_order() {
        let a = leaf(1);
        let b = leaf(2);
        let mut cache = MergeCache::new();
        let first = PredictionContext::merge(&a, &b, false, Some(&mut cache));
        let second = PredictionContext::merge(&b, &a, false, Some(&mut cache));
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_context_cache_interns() {
        let mut cache = PredictionContextCache::new();
        let a = cache.add(leaf(5));
        let b = cache.add(leaf(5));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
        let empty = cache.add(PredictionContext::empty());
        assert!(empty.is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cached_rebuilds_with_canonical_parents() {
        let mut cache = PredictionContextCache::new();
        let canonical_parent = cache.add(leaf(8));
        let ctx = PredictionContext::singleton(Some(leaf(8)), 2);
        let mut visited = HashMap::new();
        let rebuilt = PredictionContext::cached(&ctx, &mut cache, &mut visited);
        assert_eq!(rebuilt, ctx);
        assert!(Arc::ptr_eq(rebuilt.parent(0).unwrap(), &canonical_parent));
        assert!(cache.get(&ctx).is_some());
    }

    #[test]
    fn test_all_nodes() {
        let shared = leaf(1);
        let a = PredictionContext::singleton(Some(shared.clone()), 9);
        let b = PredictionContext::singleton(Some(shared), 4);
        let merged = PredictionContext::merge(&a, &b, false, None);
        // array, shared leaf, `$`
        assert_eq!(PredictionContext::all_nodes(&merged).len(), 3);
    }

    #[test]
    fn test_display() {
        let ctx = PredictionContext::singleton(Some(leaf(4)), 12);
        assert_eq!(ctx.to_string(), "12 4 $");
        assert_eq!(PredictionContext::empty().to_string(), "$");
    }
}
