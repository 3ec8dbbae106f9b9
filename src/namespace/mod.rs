//! Namespace keys.
//!
//! Every node of the state tree is addressed by the path of segment names
//! leading to it from the root. The path is flattened into a storage key by
//! joining the segments with `/` and terminating the key with a trailing
//! `/`, so `["storage", "cart"]` becomes `storage/cart/`.
//!
//! The terminator keeps prefix checks honest: `storage/cart/` is a prefix
//! of `storage/cart/items/` but not of `storage/cartography/`.

mod codec;

pub use codec::{decode, encode, validate_segment, StorageKey, SEPARATOR};
