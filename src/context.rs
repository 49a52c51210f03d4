//! # Context and Variables
//!
//! A [`Context`] is the name-to-value mapping that flows through a
//! generation run. It is used twice: first to bind a generator's declared
//! [`Variable`]s, then as the data handed to every render function.
//!
//! Contexts are cheap to clone (an `Arc` around an ordered map) because
//! each entry's render future takes its own copy.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};

/// Name-to-value mapping used for variable binding and rendering.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context(Arc<BTreeMap<String, Value>>);

impl Context {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a value by name.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the context holds `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Insert or replace a value, copying the map only if it is shared.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        Arc::make_mut(&mut self.0).insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns a new context with every key of `other` layered over `self`.
    pub fn merged(&self, other: &Context) -> Context {
        let mut out = self.clone();
        for (k, v) in other.iter() {
            out.insert(k.clone(), v.clone());
        }
        out
    }

    /// Iterate over the entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render a value the way it appears when substituted into a path:
    /// strings are inserted verbatim, everything else as JSON text.
    pub fn display_value(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| match v {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        })
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Context {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Context(Arc::new(
            iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        ))
    }
}

impl serde::Serialize for Context {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Build a [`Context`] from `key => value` pairs.
///
/// ```
/// use schematics::context;
/// let ctx = context! { "name" => "world", "count" => 2 };
/// assert_eq!(ctx.get("count"), Some(&serde_json::json!(2)));
/// ```
#[macro_export]
macro_rules! context {
    () => { $crate::context::Context::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut ctx = $crate::context::Context::new();
        $( ctx.insert($key, ::serde_json::json!($value)); )+
        ctx
    }};
}

/// The declared type of a bindable variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    String,
    Number,
    Integer,
    Boolean,
    /// Accepted as-is.
    Any,
}

impl VariableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VariableKind::String => "string",
            VariableKind::Number => "number",
            VariableKind::Integer => "integer",
            VariableKind::Boolean => "boolean",
            VariableKind::Any => "any",
        }
    }

    /// Parse the type names used in collection manifests.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(VariableKind::String),
            "number" => Some(VariableKind::Number),
            "integer" => Some(VariableKind::Integer),
            "boolean" => Some(VariableKind::Boolean),
            "any" => Some(VariableKind::Any),
            _ => None,
        }
    }

    /// Coerce `value` to this kind.
    ///
    /// Strings are parsed for numeric and boolean kinds so that options given
    /// on a command line bind the same way as typed JSON values. A number
    /// with no fractional part is kept integral so templates print `8`, not
    /// `8.0`.
    pub fn coerce(&self, variable: &str, value: &Value) -> Result<Value> {
        let fail = |message: String| Error::Coercion {
            variable: variable.to_string(),
            expected: self.as_str(),
            message,
        };
        match (self, value) {
            (VariableKind::Any, v) => Ok(v.clone()),
            (VariableKind::String, Value::String(_)) => Ok(value.clone()),
            (VariableKind::String, Value::Null) => Ok(Value::String(String::new())),
            (VariableKind::String, Value::Array(_) | Value::Object(_)) => {
                Err(fail(format!("got {}", value)))
            }
            (VariableKind::String, other) => Ok(Value::String(other.to_string())),
            (VariableKind::Number, Value::Number(_)) => Ok(value.clone()),
            (VariableKind::Number, Value::String(s)) => {
                parse_number(s.trim()).ok_or_else(|| fail(format!("'{}' is not a number", s)))
            }
            (VariableKind::Integer, Value::Number(n)) => {
                if n.is_i64() || n.is_u64() {
                    Ok(value.clone())
                } else {
                    n.as_f64()
                        .and_then(whole_i64)
                        .map(Value::from)
                        .ok_or_else(|| fail(format!("{} is not an integer in the i64 range", n)))
                }
            }
            (VariableKind::Integer, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| fail(e.to_string())),
            (VariableKind::Boolean, Value::Bool(_)) => Ok(value.clone()),
            (VariableKind::Boolean, Value::String(s)) => match s.trim() {
                "true" | "yes" | "1" | "" => Ok(Value::Bool(true)),
                "false" | "no" | "0" => Ok(Value::Bool(false)),
                other => Err(fail(format!("'{}' is not a boolean", other))),
            },
            (VariableKind::Boolean, Value::Number(n)) => Ok(Value::Bool(n.as_f64() != Some(0.0))),
            (_, other) => Err(fail(format!("got {}", other))),
        }
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = s.parse::<f64>().ok()?;
    match whole_i64(f) {
        Some(i) => Some(Value::from(i)),
        None => serde_json::Number::from_f64(f).map(Value::Number),
    }
}

/// `f` as an `i64` when it is a whole number inside the `i64` range.
fn whole_i64(f: f64) -> Option<i64> {
    // i64::MIN is exactly representable, i64::MAX rounds up to 2^63.
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.fract() == 0.0 && in_range).then_some(f as i64)
}

/// A bindable variable declared by a generator: name, type and default.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Cow<'static, str>,
    pub kind: VariableKind,
    pub default: Option<Value>,
}

impl Variable {
    pub fn new(name: impl Into<Cow<'static, str>>, kind: VariableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            default: None,
        }
    }

    pub fn string(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, VariableKind::String)
    }

    pub fn number(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, VariableKind::Number)
    }

    pub fn boolean(name: impl Into<Cow<'static, str>>) -> Self {
        Self::new(name, VariableKind::Boolean)
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_macro_and_get() {
        let ctx = context! { "str" => "world", "nb" => 4 };
        assert_eq!(ctx.get("str"), Some(&json!("world")));
        assert_eq!(ctx.get("nb"), Some(&json!(4)));
        assert_eq!(ctx.len(), 2);
        assert!(ctx.get("missing").is_none());
    }

    #[test]
    fn test_context_clone_is_copy_on_write() {
        let a = context! { "k" => 1 };
        let mut b = a.clone();
        b.insert("k", 2);
        assert_eq!(a.get("k"), Some(&json!(1)));
        assert_eq!(b.get("k"), Some(&json!(2)));
    }

    #[test]
    fn test_context_merged_overrides() {
        let base = context! { "a" => 1, "b" => 2 };
        let top = context! { "b" => 3 };
        let merged = base.merged(&top);
        assert_eq!(merged.get("a"), Some(&json!(1)));
        assert_eq!(merged.get("b"), Some(&json!(3)));
    }

    #[test]
    fn test_display_value() {
        let ctx = context! { "s" => "x", "n" => 3, "z" => serde_json::Value::Null };
        assert_eq!(ctx.display_value("s").as_deref(), Some("x"));
        assert_eq!(ctx.display_value("n").as_deref(), Some("3"));
        assert_eq!(ctx.display_value("z").as_deref(), Some(""));
        assert_eq!(ctx.display_value("missing"), None);
    }

    #[test]
    fn test_coerce_number_from_string() {
        let v = VariableKind::Number.coerce("nb", &json!("4")).unwrap();
        assert_eq!(v, json!(4));
        assert!(v.is_i64());
        let v = VariableKind::Number.coerce("nb", &json!("2.5")).unwrap();
        assert_eq!(v, json!(2.5));
    }

    #[test]
    fn test_coerce_number_rejects_garbage() {
        let err = VariableKind::Number.coerce("nb", &json!("four")).unwrap_err();
        assert!(matches!(err, Error::Coercion { expected: "number", .. }));
    }

    #[test]
    fn test_coerce_string_from_number() {
        let v = VariableKind::String.coerce("s", &json!(12)).unwrap();
        assert_eq!(v, json!("12"));
    }

    #[test]
    fn test_coerce_boolean() {
        assert_eq!(VariableKind::Boolean.coerce("b", &json!("true")).unwrap(), json!(true));
        assert_eq!(VariableKind::Boolean.coerce("b", &json!("no")).unwrap(), json!(false));
        assert_eq!(VariableKind::Boolean.coerce("b", &json!(0)).unwrap(), json!(false));
        assert!(VariableKind::Boolean.coerce("b", &json!("maybe")).is_err());
    }

    #[test]
    fn test_coerce_integer() {
        assert_eq!(VariableKind::Integer.coerce("i", &json!(3.0)).unwrap(), json!(3));
        assert!(VariableKind::Integer.coerce("i", &json!(3.5)).is_err());
    }

    #[test]
    fn test_coerce_integer_out_of_range_fails() {
        for value in [json!(1e30), json!(-1e30), json!(9223372036854775808.0)] {
            let err = VariableKind::Integer.coerce("i", &value).unwrap_err();
            assert!(
                matches!(err, Error::Coercion { ref variable, expected: "integer", .. } if variable == "i"),
                "{value} should not coerce: {err}"
            );
        }
        assert_eq!(
            VariableKind::Integer.coerce("i", &json!(-9223372036854775808.0)).unwrap(),
            json!(i64::MIN)
        );
    }

    #[test]
    fn test_parse_number_keeps_huge_floats() {
        assert_eq!(VariableKind::Number.coerce("n", &json!("1e30")).unwrap(), json!(1e30));
        assert_eq!(VariableKind::Number.coerce("n", &json!("42.0")).unwrap(), json!(42));
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!(VariableKind::parse("boolean"), Some(VariableKind::Boolean));
        assert_eq!(VariableKind::parse("object"), None);
    }
}
