// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use serde_json::{Map, Value};

/// String-keyed bag threaded through the whole pipeline run.
pub type Backpack = Map<String, Value>;

/// Merges `incoming` into `base`, last write wins per key.
///
/// Used wherever several predecessors converge (fan-in, merge). Apply the
/// backpacks in arrival order; the last one applied decides each contested key.
///
/// # Example
/// ```rust
/// use serde_json::json;
/// use the_switchyard::envelope::merge_backpacks;
///
/// let mut base = json!({"x": 1}).as_object().unwrap().clone();
/// let incoming = json!({"x": 2, "y": 3}).as_object().unwrap().clone();
/// merge_backpacks(&mut base, &incoming);
///
/// assert_eq!(base["x"], 2);
/// assert_eq!(base["y"], 3);
/// ```
pub fn merge_backpacks(base: &mut Backpack, incoming: &Backpack) {
    for (key, value) in incoming {
        base.insert(key.clone(), value.clone());
    }
}

/// Folds a sequence of backpacks in order.
pub fn merge_all<'a, I>(backpacks: I) -> Backpack
where
    I: IntoIterator<Item = &'a Backpack>,
{
    let mut merged = Backpack::new();
    for backpack in backpacks {
        merge_backpacks(&mut merged, backpack);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag(value: Value) -> Backpack {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_disjoint_keys_union() {
        let merged = merge_all([&bag(json!({"x": 1})), &bag(json!({"y": 2}))]);
        assert_eq!(Value::Object(merged), json!({"x": 1, "y": 2}));
    }

    #[test]
    fn test_last_applied_wins() {
        let first = bag(json!({"x": 1}));
        let second = bag(json!({"x": 2}));

        assert_eq!(merge_all([&first, &second])["x"], 2);
        assert_eq!(merge_all([&second, &first])["x"], 1);
    }

    #[test]
    fn test_empty_incoming_leaves_base() {
        let mut base = bag(json!({"keep": true}));
        merge_backpacks(&mut base, &Backpack::new());
        assert_eq!(Value::Object(base), json!({"keep": true}));
    }
}
