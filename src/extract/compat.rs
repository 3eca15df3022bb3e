//! Legacy wide-record compatibility
//!
//! Older API versions return reference fields as embedded objects,
//! `{"value": "<key>", "display_value": "<label>"}`, instead of plain keys.
//! Downstream consumers still expect the flattened form: the key under the
//! original field name plus the display label under a `dv_`-prefixed field.
//! This shim does that translation at the parsing boundary so the sync core
//! only ever sees keyed references.

use serde_json::Map;
use serde_json::Value;

/// Flatten embedded reference objects into keyed fields.
///
/// Non-reference fields pass through untouched. For each reference object,
/// the field is replaced by its key and a `dv_<field>` entry carries the
/// display label (empty when the API omitted it).
#[must_use]
pub fn flatten_record(record: &Map<String, Value>) -> Map<String, Value> {
    let mut flat = Map::with_capacity(record.len());

    for (name, value) in record {
        match value.as_object().and_then(|obj| obj.get("value")) {
            Some(key) => {
                flat.insert(name.clone(), key.clone());
                let display = value
                    .as_object()
                    .and_then(|obj| obj.get("display_value"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                flat.insert(format!("dv_{name}"), Value::String(display.to_string()));
            }
            None => {
                flat.insert(name.clone(), value.clone());
            }
        }
    }

    flat
}

/// Render a scalar JSON value as the string the field bag stores.
/// Objects, arrays and nulls have no scalar rendering and are dropped.
#[must_use]
pub fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Object(_) | Value::Array(_) => None,
    }
}

/// Interpret the API's assorted boolean renderings.
#[must_use]
pub fn value_as_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.as_str(), "true" | "True" | "1"),
        Value::Number(n) => n.as_i64() == Some(1),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn flattens_reference_objects_and_keeps_scalars() {
        let record = json!({
            "id": "INC001",
            "company": {"value": "c7", "display_value": "Acme"},
            "opened_by": {"value": "u1"},
            "priority": 3
        });

        let flat = flatten_record(record.as_object().unwrap());
        assert_eq!(flat.get("company"), Some(&json!("c7")));
        assert_eq!(flat.get("dv_company"), Some(&json!("Acme")));
        assert_eq!(flat.get("opened_by"), Some(&json!("u1")));
        assert_eq!(flat.get("dv_opened_by"), Some(&json!("")));
        assert_eq!(flat.get("priority"), Some(&json!(3)));
        assert_eq!(flat.get("id"), Some(&json!("INC001")));
    }

    #[test]
    fn objects_without_value_pass_through() {
        let record = json!({"meta": {"nested": true}});
        let flat = flatten_record(record.as_object().unwrap());
        assert_eq!(flat.get("meta"), Some(&json!({"nested": true})));
        assert!(!flat.contains_key("dv_meta"));
    }

    #[test]
    fn scalar_renderings() {
        assert_eq!(value_as_string(&json!("x")), Some("x".to_string()));
        assert_eq!(value_as_string(&json!(true)), Some("true".to_string()));
        assert_eq!(value_as_string(&json!(42)), Some("42".to_string()));
        assert_eq!(value_as_string(&json!(null)), None);
        assert_eq!(value_as_string(&json!([1])), None);
    }

    #[test]
    fn boolean_renderings() {
        assert!(value_as_bool(&json!(true)));
        assert!(value_as_bool(&json!("true")));
        assert!(value_as_bool(&json!("1")));
        assert!(value_as_bool(&json!(1)));
        assert!(!value_as_bool(&json!("false")));
        assert!(!value_as_bool(&json!(null)));
    }
}
