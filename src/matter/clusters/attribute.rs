//! Attribute typing for cluster schemas.
//!
//! Plugins hand in loosely-typed [`AttributeValue`]s; each cluster schema
//! declares an [`AttributeSpec`] per attribute, and every write is checked
//! (and normalized) against that spec before it reaches the store.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum::Display;

/// Attribute ID within a cluster
pub type AttrId = u32;

/// Loosely-typed attribute value as exchanged with plugins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl AttributeValue {
    /// Short name of the value's shape, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! int_value_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for AttributeValue {
                fn from(value: $t) -> Self {
                    Self::Int(value as i64)
                }
            }
        )*
    };
}

int_value_from!(u8, u16, u32, i16, i32, i64);

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Wire-level type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum AttributeType {
    Bool,
    U8,
    U16,
    U32,
    I16,
    Text,
}

impl AttributeType {
    /// Inclusive integer bounds for the numeric types.
    const fn bounds(self) -> Option<(i64, i64)> {
        match self {
            Self::U8 => Some((0, u8::MAX as i64)),
            Self::U16 => Some((0, u16::MAX as i64)),
            Self::U32 => Some((0, u32::MAX as i64)),
            Self::I16 => Some((i16::MIN as i64, i16::MAX as i64)),
            Self::Bool | Self::Text => None,
        }
    }
}

/// Default value of an attribute, usable in `const` schema tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeDefault {
    Null,
    Bool(bool),
    Int(i64),
    Text(&'static str),
}

impl AttributeDefault {
    pub fn to_value(self) -> AttributeValue {
        match self {
            Self::Null => AttributeValue::Null,
            Self::Bool(b) => AttributeValue::Bool(b),
            Self::Int(i) => AttributeValue::Int(i),
            Self::Text(s) => AttributeValue::Text(s.to_string()),
        }
    }
}

/// Declaration of one attribute in a cluster schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSpec {
    pub id: AttrId,
    pub name: &'static str,
    pub kind: AttributeType,
    pub nullable: bool,
    /// Optional inclusive constraint on top of the type's own range
    pub range: Option<(i64, i64)>,
    pub default: AttributeDefault,
}

impl AttributeSpec {
    /// Declare an attribute with the type's zero value as default.
    pub const fn new(id: AttrId, name: &'static str, kind: AttributeType) -> Self {
        let default = match kind {
            AttributeType::Bool => AttributeDefault::Bool(false),
            AttributeType::Text => AttributeDefault::Text(""),
            _ => AttributeDefault::Int(0),
        };
        Self {
            id,
            name,
            kind,
            nullable: false,
            range: None,
            default,
        }
    }

    /// Mark the attribute nullable and default it to null.
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self.default = AttributeDefault::Null;
        self
    }

    pub const fn range(mut self, min: i64, max: i64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub const fn default_value(mut self, default: AttributeDefault) -> Self {
        self.default = default;
        self
    }

    /// Check `value` against this spec.
    ///
    /// Returns the value to commit, or `None` when the value does not
    /// conform. Integers `0`/`1` written to a boolean attribute are coerced
    /// to `false`/`true`.
    pub fn normalize(&self, value: AttributeValue) -> Option<AttributeValue> {
        match (self.kind, value) {
            (_, AttributeValue::Null) => self.nullable.then_some(AttributeValue::Null),
            (AttributeType::Bool, AttributeValue::Bool(b)) => Some(AttributeValue::Bool(b)),
            (AttributeType::Bool, AttributeValue::Int(0)) => Some(AttributeValue::Bool(false)),
            (AttributeType::Bool, AttributeValue::Int(1)) => Some(AttributeValue::Bool(true)),
            (AttributeType::Text, AttributeValue::Text(s)) => Some(AttributeValue::Text(s)),
            (kind, AttributeValue::Int(i)) => {
                let (min, max) = kind.bounds()?;
                let in_type = (min..=max).contains(&i);
                let in_range = self.range.is_none_or(|(lo, hi)| (lo..=hi).contains(&i));
                (in_type && in_range).then_some(AttributeValue::Int(i))
            }
            _ => None,
        }
    }

    /// Human readable form of the expected type, e.g. `u8 (nullable, 1..=254)`.
    pub fn describe(&self) -> String {
        let mut out = self.kind.to_string();
        match (self.nullable, self.range) {
            (false, None) => {}
            (true, None) => out.push_str(" (nullable)"),
            (false, Some((lo, hi))) => out.push_str(&format!(" ({}..={})", lo, hi)),
            (true, Some((lo, hi))) => out.push_str(&format!(" (nullable, {}..={})", lo, hi)),
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_accepts_zero_and_one() {
        let spec = AttributeSpec::new(0, "onOff", AttributeType::Bool);
        assert_eq!(spec.normalize(true.into()), Some(AttributeValue::Bool(true)));
        assert_eq!(spec.normalize(1i64.into()), Some(AttributeValue::Bool(true)));
        assert_eq!(spec.normalize(0i64.into()), Some(AttributeValue::Bool(false)));
        assert_eq!(spec.normalize(2i64.into()), None);
        assert_eq!(spec.normalize("on".into()), None);
        assert_eq!(spec.normalize(AttributeValue::Null), None);
    }

    #[test]
    fn test_integer_bounds_and_range() {
        let spec = AttributeSpec::new(0, "currentLevel", AttributeType::U8)
            .nullable()
            .range(1, 254);
        assert_eq!(spec.normalize(1u8.into()), Some(AttributeValue::Int(1)));
        assert_eq!(spec.normalize(0u8.into()), None);
        assert_eq!(spec.normalize(255u8.into()), None);
        assert_eq!(spec.normalize(AttributeValue::Null), Some(AttributeValue::Null));
        assert_eq!(spec.describe(), "u8 (nullable, 1..=254)");

        let spec = AttributeSpec::new(0, "measuredValue", AttributeType::I16);
        assert_eq!(spec.normalize((-4000i16).into()), Some(AttributeValue::Int(-4000)));
        assert_eq!(spec.normalize(40_000i64.into()), None);
        assert_eq!(spec.normalize(false.into()), None);

        let spec = AttributeSpec::new(0, "softwareVersion", AttributeType::U32);
        assert_eq!(spec.normalize(u32::MAX.into()), Some(AttributeValue::Int(u32::MAX as i64)));
        assert_eq!(spec.normalize((u32::MAX as i64 + 1).into()), None);
        assert_eq!(spec.normalize((-1i64).into()), None);
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(AttributeValue::from(None::<u16>), AttributeValue::Null);
        assert_eq!(AttributeValue::from(Some(5u16)), AttributeValue::Int(5));
    }
}
