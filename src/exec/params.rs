//! Runtime parameter late-binding.
//!
//! Bind values compiled from `?:name` expressions and `{{ $in.foo }}`
//! templates stay as strings in the compiled statement; every execution
//! substitutes them from the caller's parameter map before dispatch.
//! Reserved pipeline keys (`$in`, `$res`, `$global`, `$out`) are ordinary
//! map keys here.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// The runtime parameter map.
pub type Params = Map<String, Value>;

static TEMPLATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").unwrap());
static WHOLE_TEMPLATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\{\{\s*([^{}]+?)\s*\}\}$").unwrap());

/// Substitute template references in a single bind value. Non-strings and
/// strings without references pass through unchanged; an unresolvable
/// reference becomes null.
pub fn resolve_value(value: &Value, params: &Params) -> Value {
    match value {
        Value::String(s) => resolve_str(s, params),
        other => other.clone(),
    }
}

fn resolve_str(s: &str, params: &Params) -> Value {
    if let Some(name) = s.strip_prefix("?:") {
        return lookup(params, name).cloned().unwrap_or(Value::Null);
    }

    // A value that is exactly one template keeps the referenced type.
    if let Some(caps) = WHOLE_TEMPLATE_RE.captures(s) {
        return lookup(params, &caps[1]).cloned().unwrap_or(Value::Null);
    }

    // Inline templates interpolate as text.
    if TEMPLATE_RE.is_match(s) {
        let replaced = TEMPLATE_RE.replace_all(s, |caps: &regex::Captures| {
            match lookup(params, &caps[1]) {
                Some(Value::String(text)) => text.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            }
        });
        return Value::String(replaced.into_owned());
    }

    Value::String(s.to_string())
}

/// Look up a dotted reference. The full text is tried as a literal key
/// first (pipeline keys like `$in` contain dots in their payloads), then
/// resolved segment by segment through nested objects and arrays.
fn lookup<'a>(params: &'a Params, path: &str) -> Option<&'a Value> {
    if let Some(value) = params.get(path) {
        return Some(value);
    }

    let mut segments = path.split('.');
    let mut current = params.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a pagination knob to an integer, applying substitution when the
/// authored value is a template string.
pub fn resolve_int(value: &Option<Value>, params: &Params) -> Option<i64> {
    let value = value.as_ref()?;
    match resolve_value(value, params) {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Resolve a flag the way the DSL treats truthiness: absent, `false`,
/// `0` and `""` are false, everything else true.
pub fn resolve_flag(value: &Option<Value>, params: &Params) -> bool {
    let value = match value.as_ref() {
        Some(value) => resolve_value(value, params),
        None => return false,
    };
    match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty() && s != "false" && s != "0",
        _ => true,
    }
}
