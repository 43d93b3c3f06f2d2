//! Integer sets stored as sorted, disjoint, non-adjacent intervals
//!
//! Character classes, transition labels and follow sets are all
//! [`IntervalSet`]s. Sets stay small in practice, so every mutation is a
//! linear scan that keeps the interval list normalized.
//!
//! # Example
//!
//! ```rust
//! use parsanol_atn::runtime::IntervalSet;
//!
//! let mut set = IntervalSet::of('a' as i32, 'z' as i32);
//! set.remove_one('m' as i32);
//! assert!(set.contains('a' as i32));
//! assert!(!set.contains('m' as i32));
//! assert_eq!(set.intervals().len(), 2);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use super::token::{Vocabulary, EOF, EPSILON, INVALID_TYPE};

/// Half-open integer range `[start, stop)`
///
/// Bounds are `i64` so that `stop` can sit one past `i32::MAX`; members are
/// always `i32` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// First member
    pub start: i64,
    /// One past the last member
    pub stop: i64,
}

impl Interval {
    /// Create `[start, stop)`
    #[inline]
    pub fn new(start: i64, stop: i64) -> Self {
        Self { start, stop }
    }

    /// Create the closed range `[a, b]`
    #[inline]
    pub fn closed(a: i32, b: i32) -> Self {
        Self::new(i64::from(a), i64::from(b) + 1)
    }

    /// Membership test
    #[inline]
    pub fn contains(&self, item: i32) -> bool {
        let item = i64::from(item);
        item >= self.start && item < self.stop
    }

    /// Number of members, saturating on targets where it exceeds `usize`
    #[inline]
    pub fn len(&self) -> usize {
        usize::try_from((self.stop - self.start).max(0)).unwrap_or(usize::MAX)
    }

    /// Whether the range has no members
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.stop <= self.start
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.stop - 1 {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}..{}", self.start, self.stop - 1)
        }
    }
}

/// A set of integers as sorted disjoint intervals
///
/// Invariant: intervals are sorted ascending and no two intervals overlap or
/// touch. Shared sets (for example the cached follow set of an ATN state)
/// are handed out by shared reference, so they cannot change once cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the closed range `[a, b]`
    pub fn of(a: i32, b: i32) -> Self {
        let mut set = Self::new();
        set.add_range(a, b);
        set
    }

    /// Create a set holding one value
    pub fn single(v: i32) -> Self {
        let mut set = Self::new();
        set.add_one(v);
        set
    }

    /// Build a set from closed `(lo, hi)` pairs in any order
    pub fn from_ranges(ranges: &[(i32, i32)]) -> Self {
        let mut set = Self::new();
        for &(lo, hi) in ranges {
            set.add_range(lo, hi);
        }
        set
    }

    /// The normalized intervals
    #[inline]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Smallest member, or `INVALID_TYPE` when empty
    pub fn first(&self) -> i32 {
        self.intervals
            .first()
            .map(|i| member(i.start))
            .unwrap_or(INVALID_TYPE)
    }

    /// Largest member, or `INVALID_TYPE` when empty
    pub fn max_element(&self) -> i32 {
        self.intervals
            .last()
            .map(|i| member(i.stop - 1))
            .unwrap_or(INVALID_TYPE)
    }

    /// Whether the set has no members
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.intervals
            .iter()
            .map(Interval::len)
            .fold(0, usize::saturating_add)
    }

    /// Add a single value
    #[inline]
    pub fn add_one(&mut self, v: i32) {
        self.add_interval(Interval::closed(v, v));
    }

    /// Add the closed range `[lo, hi]`
    #[inline]
    pub fn add_range(&mut self, lo: i32, hi: i32) {
        self.add_interval(Interval::closed(lo, hi));
    }

    /// Add a half-open interval, merging with overlapping or adjacent members
    pub fn add_interval(&mut self, v: Interval) {
        if v.is_empty() {
            return;
        }
        for k in 0..self.intervals.len() {
            let existing = self.intervals[k];
            if v.stop < existing.start {
                self.intervals.insert(k, v);
                return;
            }
            if v.stop == existing.start {
                self.intervals[k].start = v.start;
                return;
            }
            if v.start <= existing.stop {
                self.intervals[k] = Interval::new(
                    existing.start.min(v.start),
                    existing.stop.max(v.stop),
                );
                self.reduce(k);
                return;
            }
        }
        self.intervals.push(v);
    }

    /// Fold intervals following `k` into it while they overlap or touch
    fn reduce(&mut self, k: usize) {
        while k + 1 < self.intervals.len() {
            let left = self.intervals[k];
            let right = self.intervals[k + 1];
            if left.stop >= right.stop {
                self.intervals.remove(k + 1);
            } else if left.stop >= right.start {
                self.intervals[k].stop = right.stop;
                self.intervals.remove(k + 1);
                return;
            } else {
                return;
            }
        }
    }

    /// Union `other` into this set
    pub fn add_set(&mut self, other: &IntervalSet) -> &mut Self {
        for &interval in &other.intervals {
            self.add_interval(interval);
        }
        self
    }

    /// Remove a half-open range, splitting a straddling interval in two
    pub fn remove_range(&mut self, v: Interval) {
        if v.is_empty() {
            return;
        }
        let mut k = 0;
        while k < self.intervals.len() {
            let existing = self.intervals[k];
            if v.stop <= existing.start {
                return;
            }
            if v.start >= existing.stop {
                k += 1;
                continue;
            }
            if v.start > existing.start && v.stop < existing.stop {
                self.intervals[k] = Interval::new(existing.start, v.start);
                self.intervals
                    .insert(k + 1, Interval::new(v.stop, existing.stop));
                return;
            }
            if v.start <= existing.start && v.stop >= existing.stop {
                self.intervals.remove(k);
                continue;
            }
            if v.start > existing.start {
                self.intervals[k].stop = v.start;
                k += 1;
            } else {
                self.intervals[k].start = v.stop;
                return;
            }
        }
    }

    /// Remove a single value
    #[inline]
    pub fn remove_one(&mut self, v: i32) {
        self.remove_range(Interval::closed(v, v));
    }

    /// Remove every member of `other`
    pub fn subtract(&mut self, other: &IntervalSet) -> &mut Self {
        for &interval in &other.intervals {
            self.remove_range(interval);
        }
        self
    }

    /// The members of the closed range `[start, stop]` not in this set
    pub fn complement(&self, start: i32, stop: i32) -> IntervalSet {
        let mut result = IntervalSet::of(start, stop);
        result.subtract(self);
        result
    }

    /// Membership test (binary search over the sorted intervals)
    pub fn contains(&self, item: i32) -> bool {
        let idx = self
            .intervals
            .partition_point(|i| i.stop <= i64::from(item));
        self.intervals
            .get(idx)
            .map(|i| i.contains(item))
            .unwrap_or(false)
    }

    /// Iterate over every member in ascending order
    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.intervals
            .iter()
            .flat_map(|i| (i.start..i.stop).map(member))
    }

    /// Render members as numbers, `<EOF>` for the end marker
    pub fn to_index_string(&self) -> String {
        self.render(|interval| {
            if interval.len() == 1 {
                if interval.start == i64::from(EOF) {
                    "<EOF>".to_string()
                } else {
                    interval.start.to_string()
                }
            } else {
                format!("{}..{}", interval.start, interval.stop - 1)
            }
        })
    }

    /// Render members as quoted characters
    pub fn to_char_string(&self) -> String {
        self.render(|interval| {
            if interval.len() == 1 {
                if interval.start == i64::from(EOF) {
                    "<EOF>".to_string()
                } else {
                    format!("'{}'", char_name(interval.start))
                }
            } else {
                format!(
                    "'{}'..'{}'",
                    char_name(interval.start),
                    char_name(interval.stop - 1)
                )
            }
        })
    }

    /// Render members as token names from `vocabulary`
    pub fn to_token_string(&self, vocabulary: &Vocabulary) -> String {
        if self.intervals.is_empty() {
            return "{}".to_string();
        }
        let names: Vec<String> = self
            .iter()
            .map(|t| match t {
                EOF => "<EOF>".to_string(),
                EPSILON => "<EPSILON>".to_string(),
                _ => vocabulary.display_name(t),
            })
            .collect();
        wrap_names(names)
    }

    fn render(&self, name: impl Fn(&Interval) -> String) -> String {
        if self.intervals.is_empty() {
            return "{}".to_string();
        }
        wrap_names(self.intervals.iter().map(name).collect())
    }
}

fn wrap_names(names: Vec<String>) -> String {
    if names.len() > 1 {
        format!("{{{}}}", names.join(", "))
    } else {
        names.into_iter().next().unwrap_or_default()
    }
}

/// Narrow a bound known to lie inside `i32`
#[inline]
fn member(v: i64) -> i32 {
    i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
}

fn char_name(c: i64) -> char {
    u32::try_from(c)
        .ok()
        .and_then(char::from_u32)
        .unwrap_or(char::REPLACEMENT_CHARACTER)
}

impl fmt::Display for IntervalSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_index_string())
    }
}

impl FromIterator<i32> for IntervalSet {
    fn from_iter<T: IntoIterator<Item = i32>>(iter: T) -> Self {
        let mut set = IntervalSet::new();
        for v in iter {
            set.add_one(v);
        }
        set
    }
}
