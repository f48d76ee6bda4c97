//! Precedence-ordered merge of overlapping record sets into one per-identity view.

use std::hash::Hash;

use log::debug;

use super::dedupe::dedupe_with;
use crate::records::Overlay;

/// Merges `sources`, listed from lowest to highest precedence.
///
/// The sources are concatenated in order and de-duplicated by `key`; each repeated
/// identity is overlaid field by field, so a later source overwrites the fields it
/// carries and leaves the others from earlier sources in place. The first source that
/// mentions an identity decides where it appears in the output.
///
/// Callers normalize identity fields before calling; no schema translation happens
/// here (see [`crate::records::Record::hoist`]).
pub fn merge<T, K, F, S>(sources: S, key: F) -> Vec<T>
where
    S: IntoIterator<Item = Vec<T>>,
    T: Overlay,
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let concatenated = sources.into_iter().flatten();
    let merged = dedupe_with(concatenated, key, |existing: &mut T, newer| {
        existing.overlay(newer)
    });
    debug!("[Reconcile] Merged sources into {} entities", merged.len());
    merged
}

/// Two-source roster merge: every roster member appears exactly once, enriched with its
/// activity record when one exists.
pub fn merge_roster<T, K, F>(roster: Vec<T>, activity: Vec<T>, key: F) -> Vec<T>
where
    T: Overlay,
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    merge([roster, activity], key)
}
