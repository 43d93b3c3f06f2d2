//! Integration tests for prediction contexts and configuration sets
//!
//! Contexts are mostly compared through their rendered form. `PartialEq`
//! also walks the whole graph, taking a pointer shortcut for shared
//! parents.

use std::collections::BTreeSet;
use std::sync::Arc;

use parsanol_atn::runtime::{
    AtnConfig, AtnConfigSet, MergeCache, PredictionContext, PredictionContextCache,
    EMPTY_RETURN_STATE,
};
use proptest::prelude::*;

/// Push `return_states` onto `$`, outermost first
fn chain(return_states: &[i32]) -> Arc<PredictionContext> {
    let mut ctx = PredictionContext::empty();
    for &state in return_states {
        ctx = PredictionContext::singleton(Some(ctx), state);
    }
    ctx
}

/// Full-context merge of several chains
fn graph(chains: &[Vec<i32>]) -> Arc<PredictionContext> {
    let mut iter = chains.iter();
    let mut ctx = chain(iter.next().map(Vec::as_slice).unwrap_or(&[]));
    for c in iter {
        ctx = PredictionContext::merge(&ctx, &chain(c), false, None);
    }
    ctx
}

fn top_states(ctx: &PredictionContext) -> BTreeSet<i32> {
    (0..ctx.len()).map(|i| ctx.return_state(i)).collect()
}

fn chains() -> impl Strategy<Value = Vec<Vec<i32>>> {
    prop::collection::vec(prop::collection::vec(1i32..6, 0..4), 1..4)
}

// =============================================================================
// Merge Properties
// =============================================================================

proptest! {
    /// merge(a, b) and merge(b, a) describe the same graph
    #[test]
    fn test_merge_is_commutative(a in chains(), b in chains()) {
        let a = graph(&a);
        let b = graph(&b);
        let ab = PredictionContext::merge(&a, &b, false, None);
        let ba = PredictionContext::merge(&b, &a, false, None);
        prop_assert_eq!(ab.to_string(), ba.to_string());
    }

    /// The top-level return states of a merge are the union of both sides
    #[test]
    fn test_merge_keeps_every_return_state(a in chains(), b in chains()) {
        let a = graph(&a);
        let b = graph(&b);
        let merged = PredictionContext::merge(&a, &b, false, Some(&mut MergeCache::new()));
        let mut expected = top_states(&a);
        expected.extend(top_states(&b));
        prop_assert_eq!(top_states(&merged), expected);
    }

    /// Merging a context with itself returns the same node
    #[test]
    fn test_merge_with_self_is_identity(a in chains()) {
        let a = graph(&a);
        let mut cache = MergeCache::new();
        let merged = PredictionContext::merge(&a, &a, false, Some(&mut cache));
        prop_assert!(Arc::ptr_eq(&merged, &a));
    }

    /// Merging with a structural copy changes nothing
    #[test]
    fn test_merge_with_copy_is_stable(a in chains()) {
        let left = graph(&a);
        let right = graph(&a);
        let merged = PredictionContext::merge(&left, &right, false, None);
        prop_assert_eq!(merged.to_string(), left.to_string());
    }

    /// Two configs with one key collapse into one entry holding the merge
    #[test]
    fn test_config_set_dedup(a in prop::collection::vec(1i32..6, 1..4),
                             b in prop::collection::vec(1i32..6, 1..4)) {
        let ctx_a = chain(&a);
        let ctx_b = chain(&b);
        let mut set = AtnConfigSet::new(true);
        prop_assert!(set.add(AtnConfig::new(7, 1, ctx_a.clone()), None).unwrap());
        set.add(AtnConfig::new(7, 1, ctx_b.clone()), None).unwrap();
        prop_assert_eq!(set.len(), 1);
        let expected = PredictionContext::merge(&ctx_a, &ctx_b, false, None);
        prop_assert_eq!(set.configs()[0].context.to_string(), expected.to_string());
    }
}

// =============================================================================
// Merge Examples
// =============================================================================

#[test]
fn test_wildcard_root_absorbs() {
    let x = chain(&[3]);
    let empty = PredictionContext::empty();
    let merged = PredictionContext::merge(&x, &empty, true, None);
    assert!(merged.is_empty());
    let merged = PredictionContext::merge(&empty, &x, true, None);
    assert!(merged.is_empty());
}

#[test]
fn test_full_context_keeps_root_entry() {
    let x = chain(&[3]);
    let merged = PredictionContext::merge(&x, &PredictionContext::empty(), false, None);
    assert_eq!(merged.len(), 2);
    assert!(merged.has_empty_path());
    assert_eq!(merged.return_state(1), EMPTY_RETURN_STATE);
    assert_eq!(merged.to_string(), "[3 $, $]");
}

#[test]
fn test_shared_parent_is_reused() {
    let parent = chain(&[1]);
    let a = PredictionContext::singleton(Some(parent.clone()), 4);
    let b = PredictionContext::singleton(Some(parent.clone()), 2);
    let merged = PredictionContext::merge(&a, &b, false, None);
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.return_state(0), 2);
    assert!(Arc::ptr_eq(merged.parent(0).unwrap(), &parent));
    assert!(Arc::ptr_eq(merged.parent(1).unwrap(), &parent));
}

#[test]
fn test_merge_cache_is_consulted_both_ways() {
    let a = chain(&[1, 2]);
    let b = chain(&[1, 3]);
    let mut cache = MergeCache::new();
    let first = PredictionContext::merge(&a, &b, false, Some(&mut cache));
    assert!(!cache.is_empty());
    let second = PredictionContext::merge(&b, &a, false, Some(&mut cache));
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_interning_shares_equal_graphs() {
    let mut cache = PredictionContextCache::new();
    let mut visited = hashbrown::HashMap::new();
    let left = PredictionContext::cached(&chain(&[1, 2]), &mut cache, &mut visited);
    let right = PredictionContext::cached(&chain(&[1, 2]), &mut cache, &mut visited);
    assert!(Arc::ptr_eq(&left, &right));
}

#[test]
fn test_equality_compares_parents_structurally() {
    let left = chain(&[1, 2, 3]);
    let right = chain(&[1, 2, 3]);
    assert!(!Arc::ptr_eq(&left, &right));
    assert!(*left == *right);
    // differs only in the outermost frame
    assert!(*left != *chain(&[9, 2, 3]));
}

// =============================================================================
// Config Sets
// =============================================================================

#[test]
fn test_different_alts_are_kept_apart() {
    let mut set = AtnConfigSet::new(false);
    set.add(AtnConfig::new(7, 1, chain(&[1])), None).unwrap();
    set.add(AtnConfig::new(7, 2, chain(&[1])), None).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.alts().into_iter().collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(set.unique_alt(), 0);
}

#[test]
fn test_ordered_set_keeps_contexts_apart() {
    let mut set = AtnConfigSet::ordered();
    set.add(AtnConfig::new(7, 1, chain(&[1])), None).unwrap();
    set.add(AtnConfig::new(7, 1, chain(&[2])), None).unwrap();
    assert_eq!(set.len(), 2);
    assert_eq!(set.configs()[0].context.return_state(0), 1);
}

#[test]
fn test_readonly_set_refuses_changes() {
    let mut set = AtnConfigSet::new(false);
    set.add(AtnConfig::new(7, 1, chain(&[1])), None).unwrap();
    set.set_readonly(true);
    let err = set.add(AtnConfig::new(8, 1, chain(&[1])), None).unwrap_err();
    assert_eq!(err.to_string(), "Illegal state: This set is readonly");
    assert!(set.clear().is_err());
}
