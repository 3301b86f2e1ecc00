//! Bulk merging of duplicate artists that are already in the catalog.
//!
//! Groups are processed one at a time: pick a survivor by strategy, move
//! every foreign reference onto it, fill its empty fields from the
//! duplicates, then delete the duplicates. A failing group is recorded and
//! the run continues with the next one.

pub mod executor;
pub mod groups;

pub use executor::{
    merge_duplicate_groups, select_survivor, GroupError, MergeOutcome, MergeProgress,
};
pub use groups::{find_duplicate_groups, DuplicateGroup};
