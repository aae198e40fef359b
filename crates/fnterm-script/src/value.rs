//! Runtime values and declared parameter types.
//!
//! [`Value`] is what flows through function bodies and what a function
//! returns. It converts losslessly to and from `serde_json::Value` apart from
//! non-finite floats, which serialize as `null`.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    /// Object fields in insertion order.
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Returns a human-readable name of the value's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Truthiness used by `if`, `&&`, `||` and `!`.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Array(items) => !items.is_empty(),
            Value::Object(fields) => !fields.is_empty(),
        }
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }

    pub fn into_json(self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(i) => serde_json::Value::from(i),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Array(items) => {
                serde_json::Value::Array(items.into_iter().map(Value::into_json).collect())
            }
            Value::Object(fields) => serde_json::Value::Object(
                fields.into_iter().map(|(k, v)| (k, v.into_json())).collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    /// Renders the value the way string concatenation and `str()` see it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => f.write_str("1"),
            Value::Bool(false) => Ok(()),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => {
                if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{}", *x as i64)
                } else {
                    write!(f, "{x}")
                }
            }
            Value::Str(s) => f.write_str(s),
            Value::Array(_) | Value::Object(_) => {
                let json = self.clone().into_json();
                write!(f, "{json}")
            }
        }
    }
}

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Int,
    Float,
    String,
    Bool,
    Array,
    Object,
    Any,
}

impl ParamType {
    pub fn from_name(name: &str) -> Option<ParamType> {
        match name {
            "int" => Some(ParamType::Int),
            "float" => Some(ParamType::Float),
            "string" => Some(ParamType::String),
            "bool" => Some(ParamType::Bool),
            "array" => Some(ParamType::Array),
            "object" => Some(ParamType::Object),
            "any" => Some(ParamType::Any),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ParamType::Int => "int",
            ParamType::Float => "float",
            ParamType::String => "string",
            ParamType::Bool => "bool",
            ParamType::Array => "array",
            ParamType::Object => "object",
            ParamType::Any => "any",
        }
    }

    /// Coerces `value` to this type.
    ///
    /// Query-string arguments always arrive as strings, so numeric and boolean
    /// types accept their textual forms. `param` names the slot in the error.
    pub fn coerce(&self, param: &str, value: Value) -> Result<Value, RuntimeError> {
        let mismatch = |value: &Value| RuntimeError::InvalidArgument {
            param: param.to_string(),
            expected: self.name().to_string(),
            got: value.type_name().to_string(),
        };

        match (self, value) {
            (ParamType::Any, v) => Ok(v),

            (ParamType::Int, Value::Int(i)) => Ok(Value::Int(i)),
            (ParamType::Int, Value::Bool(b)) => Ok(Value::Int(b as i64)),
            (ParamType::Int, Value::Float(f))
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
            {
                Ok(Value::Int(f as i64))
            }
            (ParamType::Int, Value::Str(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Ok(Value::Int(i)),
                Err(_) => Err(mismatch(&Value::Str(s))),
            },

            (ParamType::Float, Value::Float(f)) => Ok(Value::Float(f)),
            (ParamType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (ParamType::Float, Value::Str(s)) => match s.trim().parse::<f64>() {
                Ok(f) => Ok(Value::Float(f)),
                Err(_) => Err(mismatch(&Value::Str(s))),
            },

            (ParamType::String, Value::Str(s)) => Ok(Value::Str(s)),
            (ParamType::String, v @ (Value::Int(_) | Value::Float(_) | Value::Bool(_))) => {
                Ok(Value::Str(v.to_string()))
            }

            (ParamType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
            (ParamType::Bool, Value::Int(i)) => Ok(Value::Bool(i != 0)),
            (ParamType::Bool, Value::Str(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" | "" => Ok(Value::Bool(false)),
                _ => Err(mismatch(&Value::Str(s))),
            },

            (ParamType::Array, Value::Array(items)) => Ok(Value::Array(items)),
            (ParamType::Object, Value::Object(fields)) => Ok(Value::Object(fields)),
            (ParamType::Array | ParamType::Object, Value::Str(s)) => {
                match serde_json::from_str::<serde_json::Value>(&s) {
                    Ok(json @ serde_json::Value::Array(_)) if *self == ParamType::Array => {
                        Ok(Value::from_json(json))
                    }
                    Ok(json @ serde_json::Value::Object(_)) if *self == ParamType::Object => {
                        Ok(Value::from_json(json))
                    }
                    _ => Err(mismatch(&Value::Str(s))),
                }
            }

            (_, v) => Err(mismatch(&v)),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_strings_coerce_to_declared_types() {
        assert_eq!(
            ParamType::Int.coerce("a", Value::Str(" 42 ".into())).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            ParamType::Float.coerce("a", Value::Str("2.5".into())).unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            ParamType::Bool.coerce("a", Value::Str("true".into())).unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            ParamType::Array.coerce("a", Value::Str("[1,2]".into())).unwrap(),
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
    }

    #[test]
    fn non_numeric_string_is_rejected_for_int() {
        let err = ParamType::Int.coerce("a", Value::Str("abc".into())).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidArgument {
                param: "a".into(),
                expected: "int".into(),
                got: "string".into(),
            }
        );
    }

    #[test]
    fn json_conversion_keeps_field_order() {
        let json = serde_json::json!({ "z": 1, "a": [true, null, 1.5] });
        let value = Value::from_json(json.clone());
        assert_eq!(value.clone().into_json(), json);
        if let Value::Object(fields) = value {
            assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["z", "a"]);
        } else {
            panic!("expected object");
        }
    }

    #[test]
    fn display_matches_concatenation_rules() {
        assert_eq!(Value::Float(3.0).to_string(), "3");
        assert_eq!(Value::Float(0.5).to_string(), "0.5");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::Null.to_string(), "");
    }
}
