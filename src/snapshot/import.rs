//! Snapshot reconstruction.

use super::{LoadOptions, Snapshot};
use crate::hydrate::parse_blob;
use crate::namespace::StorageKey;
use crate::types::StateMap;
use serde_json::Value;
use std::collections::BTreeSet;

/// Rebuild the nested object stored under `root` from a flat snapshot.
///
/// The blob at `root` itself becomes the base object. Every other key that
/// has `root` as a literal prefix is placed at its relative path, shortest
/// keys first, creating intermediate objects as needed. Keys outside `root`
/// are ignored.
pub fn import_keys(root: &StorageKey, snapshot: &Snapshot) -> StateMap {
    let mut out = parse_blob(root.as_str(), snapshot.get(root.as_str()));

    let mut placed: Vec<(&str, &str, Vec<String>)> = snapshot
        .iter()
        .filter_map(|(key, blob)| {
            StorageKey::from_raw(key)
                .relative_to(root)
                .map(|segments| (key, blob, segments))
        })
        .collect();
    placed.sort_by(|a, b| a.0.len().cmp(&b.0.len()).then_with(|| a.0.cmp(b.0)));

    for (key, blob, segments) in placed {
        let Some((leaf, parents)) = segments.split_last() else {
            continue;
        };
        let mut cursor = &mut out;
        for segment in parents {
            cursor = container(cursor, segment);
        }
        cursor.insert(leaf.clone(), Value::Object(parse_blob(key, Some(blob))));
    }

    out
}

/// The object under `segment`, created (or replacing a non-object) if needed.
fn container<'m>(map: &'m mut StateMap, segment: &str) -> &'m mut StateMap {
    let slot = map
        .entry(segment.to_string())
        .or_insert_with(|| Value::Object(StateMap::new()));
    if !slot.is_object() {
        *slot = Value::Object(StateMap::new());
    }
    match slot {
        Value::Object(inner) => inner,
        _ => unreachable!("slot was just made an object"),
    }
}

/// Keys to remove when reconciling storage with `incoming`.
///
/// Existing keys the snapshot no longer contains, plus `options.remove`,
/// minus `options.reserve`.
pub fn stale_keys(existing: &Snapshot, incoming: &Snapshot, options: &LoadOptions) -> Vec<String> {
    let mut stale: BTreeSet<String> = existing
        .keys()
        .filter(|key| !incoming.contains_key(key))
        .map(str::to_string)
        .collect();
    stale.extend(options.remove.iter().cloned());
    for key in &options.reserve {
        stale.remove(key);
    }
    stale.into_iter().collect()
}
