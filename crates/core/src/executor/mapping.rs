//! Input and output mappings.
//!
//! `inputMapping` is `{ "name": "payload.field" | "result.path" }`; each
//! entry is projected from the transaction into the handler input.
//! `outputMapping` uses the same shape to name the handler output values
//! recorded in the process log.

use serde_json::{Map, Value};

use crate::transaction::view::{TransactionView, lookup_path};

/// Projects a step's input mapping. Unresolvable paths map to `null`.
#[must_use]
pub fn project_input(mapping: &Value, view: &TransactionView<'_>) -> Value {
    let Value::Object(entries) = mapping else {
        return Value::Object(Map::new());
    };
    let input = entries
        .iter()
        .map(|(name, path)| {
            let value = path
                .as_str()
                .and_then(|p| {
                    if p == "payload" {
                        view.project("payload.transaction")
                    } else {
                        view.project(p)
                    }
                })
                .unwrap_or(Value::Null);
            (name.clone(), value)
        })
        .collect();
    Value::Object(input)
}

/// Picks the values named by an output mapping out of a handler output.
///
/// `result.` prefixes are relative to the handler output itself.
#[must_use]
pub fn record_output(mapping: &Value, output: &Value) -> Value {
    let Value::Object(entries) = mapping else {
        return Value::Object(Map::new());
    };
    let recorded = entries
        .iter()
        .filter_map(|(name, path)| {
            let path = path.as_str()?;
            let relative = path.strip_prefix("result.").unwrap_or(path);
            lookup_path(output, relative).map(|v| (name.clone(), v.clone()))
        })
        .collect();
    Value::Object(recorded)
}

/// Shallow-merges a handler output object into the run's `result` document.
///
/// Non-object outputs are stored under `key`.
pub fn merge_output(context: &mut Value, key: &str, output: &Value) {
    if output.is_null() {
        return;
    }
    if !context.is_object() {
        *context = Value::Object(Map::new());
    }
    if let Value::Object(target) = context {
        match output {
            Value::Object(fields) => {
                for (k, v) in fields {
                    target.insert(k.clone(), v.clone());
                }
            }
            other => {
                target.insert(key.to_string(), other.clone());
            }
        }
    }
}
