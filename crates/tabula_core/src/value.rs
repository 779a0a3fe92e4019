use std::fmt;

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use crate::{TabulaError, TabulaResult};

/// Semantic type of an attribute, independent of the physical column type.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Float,
    Integer,
    String,
    Timestamp,
}

impl SemanticType {
    /// The value standing in for "absent" for this type.
    pub fn null_value(self) -> Value {
        match self {
            SemanticType::Float => Value::Float(f64::NAN),
            SemanticType::Integer => Value::Integer(i64::MIN),
            SemanticType::String => Value::String(String::new()),
            SemanticType::Timestamp => Value::Timestamp(PrimitiveDateTime::MIN),
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SemanticType::Float => "Float",
            SemanticType::Integer => "Integer",
            SemanticType::String => "String",
            SemanticType::Timestamp => "Timestamp",
        };
        f.write_str(name)
    }
}

/// A single attribute value.
///
/// Absent values are represented by the type's null sentinel (NaN,
/// `i64::MIN`, empty string, `PrimitiveDateTime::MIN`), never by a wrapper.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Float(#[serde(with = "nan_as_null")] f64),
    Integer(i64),
    String(String),
    Timestamp(#[serde(with = "timestamp_text")] PrimitiveDateTime),
}

impl Value {
    pub fn semantic_type(&self) -> SemanticType {
        match self {
            Value::Float(_) => SemanticType::Float,
            Value::Integer(_) => SemanticType::Integer,
            Value::String(_) => SemanticType::String,
            Value::Timestamp(_) => SemanticType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Float(v) => v.is_nan(),
            Value::Integer(v) => *v == i64::MIN,
            Value::String(v) => v.is_empty(),
            Value::Timestamp(v) => *v == PrimitiveDateTime::MIN,
        }
    }

    /// Equality where two null sentinels of the same type compare equal.
    pub fn same_as(&self, other: &Value) -> bool {
        if self.semantic_type() != other.semantic_type() {
            return false;
        }
        (self.is_null() && other.is_null()) || self == other
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<PrimitiveDateTime> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<PrimitiveDateTime> for Value {
    fn from(value: PrimitiveDateTime) -> Self {
        Value::Timestamp(value)
    }
}

/// Parses the timestamp spellings accepted in storage and input:
/// `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS` and `YYYY-MM-DD`.
pub fn parse_timestamp(raw: &str) -> TabulaResult<PrimitiveDateTime> {
    let raw = raw.trim();
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Ok(value);
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Ok(value);
    }
    Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .map(Date::midnight)
        .map_err(|err| TabulaError::type_mismatch(format!("invalid timestamp '{raw}': {err}")))
}

/// Canonical storage spelling, which also sorts lexicographically.
pub fn format_timestamp(value: PrimitiveDateTime) -> TabulaResult<String> {
    value
        .format(format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second]"
        ))
        .map_err(|err| TabulaError::type_mismatch(format!("format timestamp: {err}")))
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

mod timestamp_text {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::PrimitiveDateTime;

    pub fn serialize<S>(value: &PrimitiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if *value == PrimitiveDateTime::MIN {
            return serializer.serialize_none();
        }
        let text = super::format_timestamp(*value).map_err(S::Error::custom)?;
        serializer.serialize_some(&text)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<PrimitiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => super::parse_timestamp(&text).map_err(D::Error::custom),
            None => Ok(PrimitiveDateTime::MIN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn null_sentinels_match_types() {
        assert!(SemanticType::Float.null_value().is_null());
        assert_eq!(SemanticType::Integer.null_value(), Value::Integer(i64::MIN));
        assert_eq!(SemanticType::String.null_value(), Value::String(String::new()));
        assert_eq!(
            SemanticType::Timestamp.null_value(),
            Value::Timestamp(PrimitiveDateTime::MIN)
        );
        assert!(!Value::Float(0.0).is_null());
        assert!(!Value::Integer(0).is_null());
    }

    #[test]
    fn same_as_treats_nan_as_equal() {
        let a = Value::Float(f64::NAN);
        let b = Value::Float(f64::NAN);
        assert_ne!(a, b);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Value::Integer(i64::MIN)));
    }

    #[test]
    fn parses_all_timestamp_spellings() -> TabulaResult<()> {
        let expected = datetime!(2001-02-03 04:05:06);
        assert_eq!(parse_timestamp("2001-02-03T04:05:06")?, expected);
        assert_eq!(parse_timestamp("2001-02-03 04:05:06")?, expected);
        assert_eq!(
            parse_timestamp("2001-02-03")?,
            datetime!(2001-02-03 00:00:00)
        );
        assert!(parse_timestamp("03/02/2001").is_err());
        assert_eq!(format_timestamp(expected)?, "2001-02-03T04:05:06");
        Ok(())
    }

    #[test]
    fn serde_keeps_sentinels() {
        let payload = serde_json::to_string(&Value::Float(f64::NAN)).expect("serialize");
        assert_eq!(payload, r#"{"type":"float","value":null}"#);
        let back: Value = serde_json::from_str(&payload).expect("deserialize");
        assert!(back.is_null());

        let stamp = Value::Timestamp(datetime!(2000-01-01 00:00:00));
        let payload = serde_json::to_string(&stamp).expect("serialize");
        let back: Value = serde_json::from_str(&payload).expect("deserialize");
        assert_eq!(back, stamp);
    }
}
