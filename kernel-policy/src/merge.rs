//! Merge semantics for the non-boolean rule categories
//! (memory/connectivity/updates), per spec.md §4.1:
//!
//! - string/number fields: highest-authority source that sets them wins.
//! - exclusion lists (blocked domains, excluded categories): union.
//! - permissive booleans: `false` wins (any source may disable).
//! - numeric maxima: the minimum *positive* value wins; `0` = unset.
//!
//! Not directly present in the teacher (`lion_policy` evaluates a flat
//! rule list over a single subject and has no merge step of its own);
//! written directly against the spec's merge bullets, in the same
//! plain-function style the rest of this crate uses.

use std::collections::HashSet;

/// `false` wins: the result is `true` only if every source that
/// expressed an opinion said `true`. Absence of an opinion never
/// disables.
pub fn merge_bool_false_wins(values: impl IntoIterator<Item = Option<bool>>) -> bool {
    values.into_iter().flatten().all(|v| v)
}

/// The highest-authority (first, in precedence order) source that set
/// the field wins.
pub fn merge_highest_authority<T: Clone>(values: impl IntoIterator<Item = Option<T>>) -> Option<T> {
    values.into_iter().find_map(|v| v)
}

/// The minimum positive value across all sources that set one; `0`
/// means unset/unlimited and is ignored unless every source is unset.
pub fn merge_min_positive(values: impl IntoIterator<Item = Option<u32>>) -> u32 {
    values
        .into_iter()
        .flatten()
        .filter(|&v| v > 0)
        .min()
        .unwrap_or(0)
}

/// Union across all sources, deduplicated, original relative order
/// preserved.
pub fn merge_union<'a>(values: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for list in values {
        for item in list {
            if seen.insert(item.clone()) {
                out.push(item.clone());
            }
        }
    }
    out
}
