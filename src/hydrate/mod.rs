//! Hydration of the live tree from storage.
//!
//! Loading walks a subtree's shape, fetching each node's blob concurrently
//! with its children, and folds the results into one nested object. That
//! object is then deep-merged into the live tree: objects merge field by
//! field, anything else (arrays included) is replaced by the stored value.

mod load;
mod merge;

pub use load::{apply_to_tree, load, parse_blob};
pub use merge::{merge_into, merged};
