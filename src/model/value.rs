//! Scalar attribute values and the string codec that lets them survive a
//! backend that only stores byte strings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// A single scalar attribute value.
///
/// Node and relationship attribute maps are `String -> Value`. The backend
/// only ever sees the encoded string form (see [`Value::encode`]); this type
/// is what callers and the engine work with in memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    Bool(bool),
    /// 32/64-bit integer (`$i` on the wire).
    Int(i64),
    /// Wide integer (`$l` on the wire) for values that don't fit an `Int`.
    Long(i128),
    Float(f64),
    String(String),
}

const PREFIX_BOOL: &str = "$b";
const PREFIX_INT: &str = "$i";
const PREFIX_LONG: &str = "$l";
const PREFIX_FLOAT: &str = "$f";
const ESCAPE: &str = "$$";

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::Long(_) => "LONG",
            Value::Float(_) => "FLOAT",
            Value::String(_) => "STRING",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Encode into the backend's wire representation (§4.2 of the design).
    ///
    /// A literal string starting with `$` is escaped by doubling the `$` so
    /// it never collides with a typed prefix; `decode` reverses this.
    pub fn encode(&self) -> Result<String> {
        Ok(match self {
            Value::Bool(b) => format!("{PREFIX_BOOL}{}", if *b { "True" } else { "False" }),
            Value::Int(i) => format!("{PREFIX_INT}{i}"),
            Value::Long(l) => format!("{PREFIX_LONG}{l}"),
            Value::Float(f) => format!("{PREFIX_FLOAT}{f}"),
            Value::String(s) if s.starts_with('$') => format!("{ESCAPE}{s}"),
            Value::String(s) => s.clone(),
        })
    }

    /// Decode the backend's wire representation back into a typed scalar.
    pub fn decode(raw: &str) -> Result<Value> {
        if let Some(rest) = raw.strip_prefix(ESCAPE) {
            return Ok(Value::String(rest.to_string()));
        }
        if !raw.starts_with('$') {
            return Ok(Value::String(raw.to_string()));
        }
        if raw.len() < 2 {
            return Err(CodecError::Malformed { raw: raw.to_string() }.into());
        }
        let (prefix, content) = raw.split_at(2);
        match prefix {
            PREFIX_BOOL => match content {
                "True" => Ok(Value::Bool(true)),
                "False" => Ok(Value::Bool(false)),
                _ => Err(CodecError::Malformed { raw: raw.to_string() }.into()),
            },
            PREFIX_INT => content
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| CodecError::Malformed { raw: raw.to_string() }.into()),
            PREFIX_LONG => content
                .parse::<i128>()
                .map(Value::Long)
                .map_err(|_| CodecError::Malformed { raw: raw.to_string() }.into()),
            PREFIX_FLOAT => content
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| CodecError::Malformed { raw: raw.to_string() }.into()),
            _ => Err(CodecError::UnknownPrefix { raw: raw.to_string() }.into()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::Long(v)
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Long(l) => write!(f, "{l}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trips_every_scalar_kind() {
        for v in [
            Value::Bool(true),
            Value::Bool(false),
            Value::Int(42),
            Value::Int(-7),
            Value::Long(170_141_183_460_469_231_731_687_303_715_884_105_727),
            Value::Float(3.5),
            Value::String("hi".into()),
        ] {
            let encoded = v.encode().unwrap();
            assert_eq!(Value::decode(&encoded).unwrap(), v);
        }
    }

    #[test]
    fn escapes_literal_dollar_strings() {
        let v = Value::String("$not_a_type_tag".into());
        let encoded = v.encode().unwrap();
        assert_eq!(encoded, "$$$not_a_type_tag");
        assert_eq!(Value::decode(&encoded).unwrap(), v);
    }

    #[test]
    fn plain_strings_pass_through_unprefixed() {
        let v = Value::String("plain".into());
        assert_eq!(v.encode().unwrap(), "plain");
    }

    #[test]
    fn rejects_malformed_typed_prefix() {
        assert!(Value::decode("$inot_a_number").is_err());
        assert!(Value::decode("$znope").is_err());
    }

    proptest::proptest! {
        #[test]
        fn codec_round_trip_bool(b: bool) {
            let v = Value::Bool(b);
            prop_assert_eq!(Value::decode(&v.encode().unwrap()).unwrap(), v);
        }

        #[test]
        fn codec_round_trip_int(i: i64) {
            let v = Value::Int(i);
            prop_assert_eq!(Value::decode(&v.encode().unwrap()).unwrap(), v);
        }

        #[test]
        fn codec_round_trip_float(f in proptest::num::f64::NORMAL) {
            let v = Value::Float(f);
            prop_assert_eq!(Value::decode(&v.encode().unwrap()).unwrap(), v);
        }

        #[test]
        fn codec_round_trip_string(s: String) {
            let v = Value::String(s);
            prop_assert_eq!(Value::decode(&v.encode().unwrap()).unwrap(), v);
        }
    }
}
