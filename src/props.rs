//! Typed key/value metadata attached to bundles and to individual files.
//!
//! The canonical text form is a JSON object whose members carry an explicit
//! type tag, so integer vs. floating point never depends on how a JSON reader
//! chooses to type a number:
//!
//! ```text
//! {"main_file":{"type":"string","value":"index.html"},"size":{"type":"int","value":5}}
//! ```

use crate::error::{BundleError, Result};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};
use std::fmt;

/// A single property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PropValue::Int(v) => Some(*v),
            PropValue::Double(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Type tag and JSON value, or None when the value has no JSON encoding
    fn tagged(&self) -> Option<(&'static str, Value)> {
        match self {
            PropValue::String(s) => Some(("string", Value::String(s.clone()))),
            PropValue::Int(v) => Some(("int", Value::Number((*v).into()))),
            PropValue::Bool(b) => Some(("bool", Value::Bool(*b))),
            // Whole-number doubles are written as ints
            PropValue::Double(v) => {
                if !v.is_finite() {
                    None
                } else if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
                    Some(("int", Value::Number((*v as i64).into())))
                } else {
                    Number::from_f64(*v).map(|n| ("double", Value::Number(n)))
                }
            }
        }
    }

    fn from_tagged(key: &str, tag: Option<&str>, value: &Value) -> Result<Self> {
        let mismatch = || {
            BundleError::Parse(format!(
                "property '{}' has value {} that does not match type {:?}",
                key, value, tag
            ))
        };
        match tag {
            Some("string") => value.as_str().map(|s| PropValue::String(s.into())).ok_or_else(mismatch),
            Some("bool") => value.as_bool().map(PropValue::Bool).ok_or_else(mismatch),
            Some("int") => match value.as_i64() {
                Some(v) => Ok(PropValue::Int(v)),
                None => value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                    .map(|f| PropValue::Int(f as i64))
                    .ok_or_else(mismatch),
            },
            Some("double") => value.as_f64().map(PropValue::Double).ok_or_else(mismatch),
            Some(other) => Err(BundleError::Parse(format!(
                "property '{}' has unknown type '{}'",
                key, other
            ))),
            None => Self::from_json(value).ok_or_else(mismatch),
        }
    }

    /// Convert an untagged JSON scalar
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(PropValue::String(s.clone())),
            Value::Bool(b) => Some(PropValue::Bool(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(v) => Some(PropValue::Int(v)),
                None => n.as_f64().map(PropValue::Double),
            },
            _ => None,
        }
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::String(s.to_string())
    }
}

impl From<String> for PropValue {
    fn from(s: String) -> Self {
        PropValue::String(s)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Int(v as i64)
    }
}

impl TryFrom<u64> for PropValue {
    type Error = BundleError;

    fn try_from(v: u64) -> Result<Self> {
        i64::try_from(v)
            .map(PropValue::Int)
            .map_err(|_| BundleError::InvalidArgument(format!("{} does not fit an int property", v)))
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Double(v)
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Bool(b)
    }
}

/// Ordered, typed metadata mapping
///
/// Two instances are equal when their canonical texts are equal.
#[derive(Debug, Clone, Default)]
pub struct BundleProps {
    values: IndexMap<String, PropValue>,
}

impl BundleProps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any mapping of keys to values; later duplicates win
    pub fn from_mapping<K, V, I>(mapping: I) -> Self
    where
        K: Into<String>,
        V: Into<PropValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        let values = mapping
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self { values }
    }

    /// Build from a plain (untagged) JSON object such as `{"foo":"bar","n":42}`
    pub fn from_json_object(object: &Map<String, Value>) -> Result<Self> {
        let mut props = Self::new();
        for (key, value) in object {
            let value = PropValue::from_json(value).ok_or_else(|| {
                BundleError::Parse(format!("property '{}' is not a scalar: {}", key, value))
            })?;
            props.set(key.clone(), value);
        }
        Ok(props)
    }

    /// Parse canonical (type-tagged) text
    pub fn from_canonical_text(text: &str) -> Result<Self> {
        let root: Value = serde_json::from_str(text)
            .map_err(|e| BundleError::Parse(format!("invalid properties text: {}", e)))?;
        let object = root
            .as_object()
            .ok_or_else(|| BundleError::Parse("properties text is not a JSON object".into()))?;

        let mut props = Self::new();
        for (key, member) in object {
            let member = member.as_object().ok_or_else(|| {
                BundleError::Parse(format!("property '{}' is not a tagged object", key))
            })?;
            let value = member.get("value").ok_or_else(|| {
                BundleError::Parse(format!("property '{}' has no value", key))
            })?;
            let tag = member.get("type").and_then(Value::as_str);
            props.set(key.clone(), PropValue::from_tagged(key, tag, value)?);
        }
        Ok(props)
    }

    /// Parse canonical text stored as UTF-8 bytes; empty input yields empty props
    pub fn from_canonical_bytes(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::new());
        }
        let text = std::str::from_utf8(data)
            .map_err(|e| BundleError::Parse(format!("properties are not UTF-8: {}", e)))?;
        Self::from_canonical_text(text)
    }

    /// Serialize to canonical text
    pub fn to_canonical_text(&self) -> String {
        let mut object = Map::new();
        for (key, value) in &self.values {
            if let Some((tag, json)) = value.tagged() {
                let mut member = Map::new();
                member.insert("type".into(), Value::String(tag.into()));
                member.insert("value".into(), json);
                object.insert(key.clone(), Value::Object(member));
            }
        }
        Value::Object(object).to_string()
    }

    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(PropValue::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        self.values.insert(key.into(), value.into());
    }

    /// New instance holding `self` overlaid with `overrides`
    pub fn merged_with(&self, overrides: &BundleProps) -> BundleProps {
        let mut merged = self.clone();
        for (key, value) in &overrides.values {
            merged.values.insert(key.clone(), value.clone());
        }
        merged
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl PartialEq for BundleProps {
    fn eq(&self, other: &Self) -> bool {
        self.to_canonical_text() == other.to_canonical_text()
    }
}

impl fmt::Display for BundleProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_canonical_text())
    }
}

impl<K: Into<String>, V: Into<PropValue>> FromIterator<(K, V)> for BundleProps {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_mapping(iter)
    }
}
