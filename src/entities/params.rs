//! Lookups in the `/params.json` list of `{name, value}` records
//!
//! The firmware wraps some values in a one-element array (`[true]`, `[16]`),
//! so every accessor unwraps that first.

use serde_json::Value;

/// Raw value of parameter `name`, with a one-element array unwrapped
pub fn find_param<'a>(params: &'a Value, name: &str) -> Option<&'a Value> {
    let value = params
        .as_array()?
        .iter()
        .find(|p| p.get("name").and_then(Value::as_str) == Some(name))?
        .get("value")?;
    match value {
        Value::Array(items) if !items.is_empty() => items.first(),
        other => Some(other),
    }
}

/// `true`, `"true"`, `1` and `"1"` are on; anything else is off
pub fn is_truthy_flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true" || s == "1",
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    }
}

/// `None` when the parameter is absent
pub fn param_bool(params: &Value, name: &str) -> Option<bool> {
    let found = params
        .as_array()?
        .iter()
        .any(|p| p.get("name").and_then(Value::as_str) == Some(name));
    if !found {
        return None;
    }
    Some(find_param(params, name).is_some_and(is_truthy_flag))
}

/// Numeric parameter truncated toward zero
pub fn param_int(params: &Value, name: &str) -> Option<i64> {
    let value = find_param(params, name)?;
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
}

pub fn param_string(params: &Value, name: &str) -> Option<String> {
    find_param(params, name)?.as_str().map(str::to_string)
}
