//! Identity-keyed de-duplication: stable position, freshest data.

use std::collections::HashMap;
use std::hash::Hash;

/// De-duplicates `records` by `key`.
///
/// One entry per distinct key is returned. For duplicated keys the **last** occurrence
/// supplies the value while the **first** occurrence fixes the position. Records whose
/// selector yields `None` share a single bucket rather than failing.
pub fn dedupe<T, K, F, I>(records: I, key: F) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    dedupe_with(records, key, |existing, newer| *existing = newer)
}

/// Same positional contract as [`dedupe`], folding duplicates through `combine`.
///
/// `combine(existing, newer)` is called once per repeated key, in input order.
pub fn dedupe_with<T, K, F, C, I>(records: I, key: F, mut combine: C) -> Vec<T>
where
    I: IntoIterator<Item = T>,
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
    C: FnMut(&mut T, T),
{
    let records = records.into_iter();
    let (lower, _) = records.size_hint();
    let mut positions: HashMap<Option<K>, usize> = HashMap::with_capacity(lower);
    let mut output: Vec<T> = Vec::with_capacity(lower);

    for record in records {
        let record_key = key(&record);
        match positions.get(&record_key) {
            Some(&idx) => combine(&mut output[idx], record),
            None => {
                positions.insert(record_key, output.len());
                output.push(record);
            }
        }
    }

    output
}
