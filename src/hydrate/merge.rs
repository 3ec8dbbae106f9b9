//! JSON deep merge.

use serde_json::Value;

/// Merge `source` into `target`.
///
/// Two objects merge recursively, key by key. For every other pairing the
/// source value replaces the target outright; arrays are never merged
/// element-wise. `source` is only read.
pub fn merge_into(target: &mut Value, source: &Value) {
    match (target, source) {
        (Value::Object(target), Value::Object(source)) => {
            for (key, value) in source {
                match target.get_mut(key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, source) => *target = source.clone(),
    }
}

/// Merge `source` over a copy of `base`.
pub fn merged(base: &Value, source: &Value) -> Value {
    let mut out = base.clone();
    merge_into(&mut out, source);
    out
}
