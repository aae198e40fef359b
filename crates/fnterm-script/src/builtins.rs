//! Builtin functions available to every function body.
//!
//! Builtin names are reserved: the registry refuses to register a function
//! file item that would shadow one.

use sha2::{Digest, Sha256};

use crate::error::RuntimeError;
use crate::value::{ParamType, Value};

pub const BUILTINS: &[&str] = &[
    "len",
    "upper",
    "lower",
    "trim",
    "str",
    "int",
    "float",
    "abs",
    "sqrt",
    "ln",
    "pow",
    "round",
    "floor",
    "ceil",
    "min",
    "max",
    "contains",
    "keys",
    "escape_html",
    "sha256",
    "raise",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Calls builtin `name`, or returns `None` if no such builtin exists.
pub fn call(name: &str, args: Vec<Value>) -> Option<Result<Value, RuntimeError>> {
    let result = match name {
        "len" => unary(name, args).and_then(|v| match v {
            Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
            Value::Array(items) => Ok(Value::Int(items.len() as i64)),
            Value::Object(fields) => Ok(Value::Int(fields.len() as i64)),
            other => Err(mismatch("string, array or object", &other)),
        }),
        "upper" => string_arg(name, args).map(|s| Value::Str(s.to_uppercase())),
        "lower" => string_arg(name, args).map(|s| Value::Str(s.to_lowercase())),
        "trim" => string_arg(name, args).map(|s| Value::Str(s.trim().to_string())),
        "str" => unary(name, args).map(|v| Value::Str(v.to_string())),
        "int" => unary(name, args).and_then(|v| match v {
            Value::Float(f) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
            other => ParamType::Int.coerce("value", other),
        }),
        "float" => unary(name, args).and_then(|v| ParamType::Float.coerce("value", v)),
        "abs" => unary(name, args).and_then(|v| match v {
            Value::Int(i) => i.checked_abs().map(Value::Int).ok_or(RuntimeError::IntegerOverflow),
            Value::Float(f) => Ok(Value::Float(f.abs())),
            other => Err(mismatch("number", &other)),
        }),
        "sqrt" => number_arg(name, args).map(|n| Value::Float(n.sqrt())),
        "ln" => number_arg(name, args).map(|n| Value::Float(n.ln())),
        "floor" => number_arg(name, args).map(|n| Value::Float(n.floor())),
        "ceil" => number_arg(name, args).map(|n| Value::Float(n.ceil())),
        "round" => round(args),
        "pow" => binary(name, args).and_then(|(base, exp)| power(base, exp)),
        "min" => extremum(name, args, |a, b| b < a),
        "max" => extremum(name, args, |a, b| b > a),
        "contains" => binary(name, args).and_then(|(haystack, needle)| match (haystack, needle) {
            (Value::Str(s), Value::Str(n)) => Ok(Value::Bool(s.contains(n.as_str()))),
            (Value::Array(items), needle) => Ok(Value::Bool(items.contains(&needle))),
            (Value::Object(fields), Value::Str(key)) => Ok(Value::Bool(fields.contains_key(&key))),
            (other, _) => Err(mismatch("string, array or object", &other)),
        }),
        "keys" => unary(name, args).and_then(|v| match v {
            Value::Object(fields) => Ok(Value::Array(fields.into_keys().map(Value::Str).collect())),
            other => Err(mismatch("object", &other)),
        }),
        "escape_html" => string_arg(name, args).map(|s| Value::Str(escape_html(&s))),
        "sha256" => string_arg(name, args).map(|s| {
            let digest = Sha256::digest(s.as_bytes());
            Value::Str(digest.iter().map(|b| format!("{b:02x}")).collect())
        }),
        "raise" => unary(name, args).and_then(|v| {
            Err(RuntimeError::Raised {
                message: v.to_string(),
            })
        }),
        _ => return None,
    };
    Some(result)
}

/// Exponentiation shared by `**` and `pow()`.
///
/// Integer bases with non-negative integer exponents stay integral while the
/// result fits; everything else is computed in floating point.
pub fn power(base: Value, exp: Value) -> Result<Value, RuntimeError> {
    match (&base, &exp) {
        (Value::Int(b), Value::Int(e)) if *e >= 0 => {
            let checked = u32::try_from(*e).ok().and_then(|e| b.checked_pow(e));
            Ok(match checked {
                Some(v) => Value::Int(v),
                None => Value::Float((*b as f64).powf(*e as f64)),
            })
        }
        _ => match (base.as_f64(), exp.as_f64()) {
            (Some(b), Some(e)) => Ok(Value::Float(b.powf(e))),
            (None, _) => Err(mismatch("number", &base)),
            (_, None) => Err(mismatch("number", &exp)),
        },
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            other => out.push(other),
        }
    }
    out
}

fn mismatch(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::TypeMismatch {
        expected: expected.to_string(),
        got: got.type_name().to_string(),
    }
}

fn arity(name: &str, expected: usize, got: usize) -> RuntimeError {
    RuntimeError::ArityMismatch {
        name: name.to_string(),
        expected,
        got,
    }
}

fn unary(name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let got = args.len();
    let mut iter = args.into_iter();
    match (iter.next(), iter.next()) {
        (Some(v), None) => Ok(v),
        _ => Err(arity(name, 1, got)),
    }
}

fn binary(name: &str, args: Vec<Value>) -> Result<(Value, Value), RuntimeError> {
    let got = args.len();
    let mut iter = args.into_iter();
    match (iter.next(), iter.next(), iter.next()) {
        (Some(a), Some(b), None) => Ok((a, b)),
        _ => Err(arity(name, 2, got)),
    }
}

fn string_arg(name: &str, args: Vec<Value>) -> Result<String, RuntimeError> {
    match ParamType::String.coerce("value", unary(name, args)?)? {
        Value::Str(s) => Ok(s),
        other => Err(mismatch("string", &other)),
    }
}

fn number_arg(name: &str, args: Vec<Value>) -> Result<f64, RuntimeError> {
    let value = unary(name, args)?;
    value.as_f64().ok_or_else(|| mismatch("number", &value))
}

fn round(args: Vec<Value>) -> Result<Value, RuntimeError> {
    let (value, digits) = match args.len() {
        1 => (unary("round", args)?, Value::Int(0)),
        2 => binary("round", args)?,
        got => return Err(arity("round", 1, got)),
    };
    let n = value.as_f64().ok_or_else(|| mismatch("number", &value))?;
    let digits = match digits {
        Value::Int(d) => d.clamp(-15, 15) as i32,
        other => return Err(mismatch("int", &other)),
    };
    let scale = 10f64.powi(digits);
    Ok(Value::Float((n * scale).round() / scale))
}

/// `min`/`max` over either several numbers or a single array of numbers.
fn extremum(
    name: &str,
    args: Vec<Value>,
    better: fn(f64, f64) -> bool,
) -> Result<Value, RuntimeError> {
    let single_array = matches!(args.as_slice(), [Value::Array(_)]);
    let candidates = if single_array {
        match args.into_iter().next() {
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        }
    } else {
        args
    };
    let mut best: Option<(f64, Value)> = None;
    for candidate in candidates {
        let n = candidate
            .as_f64()
            .ok_or_else(|| mismatch("number", &candidate))?;
        match &best {
            Some((current, _)) if !better(*current, n) => {}
            _ => best = Some((n, candidate)),
        }
    }
    best.map(|(_, v)| v).ok_or_else(|| arity(name, 1, 0))
}
