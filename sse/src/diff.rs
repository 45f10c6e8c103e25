//! Structural JSON comparison producing RFC 6902 patch operations.

use crate::message::PatchOperation;
use serde_json::Value;

/// Compare two JSON values and return the patch operations that transform
/// `prev` into `next`. Returns an empty list when the values are deeply
/// equal.
///
/// Objects recurse per key. Arrays recurse over the common prefix, append
/// growth in index order and remove shrinkage from the highest index down so
/// that the emitted paths stay valid while the patch is applied in order.
/// Any other difference becomes a single `replace`.
pub fn diff(prev: &Value, next: &Value) -> Vec<PatchOperation> {
    let mut ops = Vec::new();
    collect(prev, next, "", &mut ops);
    ops
}

fn collect(prev: &Value, next: &Value, path: &str, ops: &mut Vec<PatchOperation>) {
    if prev == next {
        return;
    }
    match (prev, next) {
        (Value::Object(prev_map), Value::Object(next_map)) => {
            for (key, prev_value) in prev_map {
                let child = child_path(path, key);
                match next_map.get(key) {
                    Some(next_value) => collect(prev_value, next_value, &child, ops),
                    None => ops.push(PatchOperation::Remove { path: child }),
                }
            }
            for (key, next_value) in next_map {
                if !prev_map.contains_key(key) {
                    ops.push(PatchOperation::Add {
                        path: child_path(path, key),
                        value: next_value.clone(),
                    });
                }
            }
        }
        (Value::Array(prev_items), Value::Array(next_items)) => {
            let shared = prev_items.len().min(next_items.len());
            for index in 0..shared {
                collect(
                    &prev_items[index],
                    &next_items[index],
                    &child_path(path, &index.to_string()),
                    ops,
                );
            }
            for index in shared..next_items.len() {
                ops.push(PatchOperation::Add {
                    path: child_path(path, &index.to_string()),
                    value: next_items[index].clone(),
                });
            }
            // highest index first, so earlier removals do not shift later paths
            for index in (shared..prev_items.len()).rev() {
                ops.push(PatchOperation::Remove {
                    path: child_path(path, &index.to_string()),
                });
            }
        }
        _ => ops.push(PatchOperation::Replace {
            path: path.to_owned(),
            value: next.clone(),
        }),
    }
}

fn child_path(parent: &str, token: &str) -> String {
    format!("{parent}/{}", escape_token(token))
}

/// JSON Pointer token escaping per RFC 6901.
fn escape_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
