//! Marshalling from QuickJS values to the structured document model.

use rquickjs::Value;

/// Sentinel for values with no JSON representation (functions, symbols).
const UNSUPPORTED: &str = "<unsupported value>";

/// Recursively converts a script-returned value to JSON. Arrays map to
/// lists; objects map to maps with stringified keys; null and undefined
/// both map to JSON null; non-finite numbers degrade to null; anything
/// without a data representation becomes a sentinel string.
pub fn value_to_json(value: &Value<'_>) -> serde_json::Value {
    if value.is_null() || value.is_undefined() {
        return serde_json::Value::Null;
    }
    if let Some(b) = value.as_bool() {
        return serde_json::Value::Bool(b);
    }
    if let Some(i) = value.as_int() {
        return serde_json::Value::from(i);
    }
    if let Some(f) = value.as_float() {
        return serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null);
    }
    if let Some(s) = value.as_string() {
        return match s.to_string() {
            Ok(text) => serde_json::Value::String(text),
            Err(_) => serde_json::Value::String(UNSUPPORTED.to_string()),
        };
    }
    if let Some(array) = value.as_array() {
        let mut items = Vec::with_capacity(array.len());
        for item in array.iter::<Value>() {
            match item {
                Ok(v) => items.push(value_to_json(&v)),
                Err(_) => items.push(serde_json::Value::String(UNSUPPORTED.to_string())),
            }
        }
        return serde_json::Value::Array(items);
    }
    if value.is_function() {
        return serde_json::Value::String(UNSUPPORTED.to_string());
    }
    if let Some(object) = value.as_object() {
        let mut map = serde_json::Map::new();
        for prop in object.props::<String, Value>() {
            match prop {
                Ok((key, val)) => {
                    map.insert(key, value_to_json(&val));
                }
                Err(e) => {
                    log::debug!("skipping unconvertible script property: {e}");
                }
            }
        }
        return serde_json::Value::Object(map);
    }
    serde_json::Value::String(UNSUPPORTED.to_string())
}
