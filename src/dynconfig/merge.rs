//! JSON merge patch
//!
//! `null` deletes a key, an object merged into an object recurses, anything
//! else replaces. Scalars are compared by their text rendering so `"5"` and
//! `5` count as the same value.

use serde_json::{Map, Value};

fn render(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Apply `patch` to `config` in place. Returns `true` if anything changed.
pub fn patch_config(config: &mut Map<String, Value>, patch: &Map<String, Value>) -> bool {
    let mut changed = false;
    for (name, value) in patch {
        match value {
            Value::Null => {
                if let Some(old) = config.remove(name) {
                    changed |= !old.is_null();
                }
            }
            Value::Object(nested) => match config.get_mut(name) {
                Some(Value::Object(existing)) => changed |= patch_config(existing, nested),
                _ => {
                    config.insert(name.clone(), value.clone());
                    changed = true;
                }
            },
            _ => match config.get(name) {
                Some(existing) if render(existing) == render(value) => {}
                _ => {
                    config.insert(name.clone(), value.clone());
                    changed = true;
                }
            },
        }
    }
    changed
}
