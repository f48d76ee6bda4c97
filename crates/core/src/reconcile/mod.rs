//! Pure reconciliation over already-resolved data: de-duplication, precedence merges and
//! grouping.

pub mod dedupe;
pub mod grouping;
pub mod roster;

pub use dedupe::{dedupe, dedupe_with};
pub use grouping::{day_label, group_by, GroupedBucket, GroupingIndex, GroupingOptions};
pub use roster::{merge, merge_roster};
