//! Cache key derivation.
//!
//! A key is `operation(name=value,...)` with parameter names sorted, nested
//! objects normalized the same way, booleans rendered as `0`/`1` and `null`
//! entries omitted. Delimiters inside names and string values are
//! backslash-escaped, so no value can imitate another parameter.
//! Derivation is pure: it depends only on its inputs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Parameter names that carry credentials and never become part of a key.
const SECRET_PARAMS: &[&str] = &[
    "token",
    "access_token",
    "authorization",
    "password",
    "secret",
    "client_secret",
];

/// Deterministic identifier for one logical remote operation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive a key from an operation name and its parameters.
    pub fn derive(operation: &str, params: &Map<String, Value>) -> Self {
        let mut key = String::with_capacity(operation.len() + 16);
        key.push_str(operation);
        key.push('(');
        render_map(params, &mut key);
        key.push(')');
        Self(key)
    }

    /// Derive a key from any JSON value; non-object values are treated as
    /// an empty parameter set.
    pub fn derive_value(operation: &str, params: &Value) -> Self {
        match params {
            Value::Object(map) => Self::derive(operation, map),
            _ => Self::derive(operation, &Map::new()),
        }
    }

    /// Use a precomputed string as a key verbatim.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Builder for key parameters.
#[derive(Debug, Clone, Default)]
pub struct KeyParams {
    params: Map<String, Value>,
}

impl KeyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a parameter only when a value is present.
    pub fn optional(self, name: impl Into<String>, value: Option<impl Into<Value>>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    /// Add a nested parameter group.
    pub fn nested(mut self, name: impl Into<String>, group: KeyParams) -> Self {
        self.params.insert(name.into(), Value::Object(group.params));
        self
    }

    /// Finish the key for an operation.
    pub fn key(&self, operation: &str) -> CacheKey {
        CacheKey::derive(operation, &self.params)
    }
}

fn is_secret(name: &str) -> bool {
    SECRET_PARAMS.iter().any(|s| s.eq_ignore_ascii_case(name))
}

fn render_map(map: &Map<String, Value>, out: &mut String) {
    let mut names: Vec<&String> = map
        .iter()
        .filter(|(name, value)| !value.is_null() && !is_secret(name))
        .map(|(name, _)| name)
        .collect();
    names.sort();

    for (i, name) in names.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_escaped(name, out);
        out.push('=');
        render_value(&map[name.as_str()], out);
    }
}

fn push_escaped(text: &str, out: &mut String) {
    for c in text.chars() {
        if matches!(c, '\\' | ',' | '=' | '(' | ')' | '[' | ']') {
            out.push('\\');
        }
        out.push(c);
    }
}

fn render_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push(if *b { '1' } else { '0' }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => push_escaped(s, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('(');
            render_map(map, out);
            out.push(')');
        }
    }
}
