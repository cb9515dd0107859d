//! Value coercions shared by the normalizer and the row mapper.
//!
//! Model output is loosely typed: themes may arrive as one string or a
//! list, scores as numbers or numeric strings. These helpers fold that into
//! one representation, and fail loudly where a silent default would corrupt
//! analytics.

use serde_json::Value;
use thiserror::Error;

/// A field held a value that cannot be cast to the required numeric type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("{field}: {value} is not a number")]
    NotANumber { field: String, value: String },
    #[error("{field}: {value} is not an integer")]
    NotAnInteger { field: String, value: String },
}

impl CoercionError {
    pub fn field(&self) -> &str {
        match self {
            CoercionError::NotANumber { field, .. } | CoercionError::NotAnInteger { field, .. } => {
                field
            }
        }
    }
}

/// Fold a "maybe list, maybe scalar" value into a list of strings.
///
/// - absent, `null`, `""`, `false`, `{}` → empty
/// - array → one entry per element (`null` elements dropped, non-strings
///   rendered as JSON)
/// - any other scalar → single element
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Vec::new(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(Value::Object(o)) if o.is_empty() => Vec::new(),
        Some(Value::Array(items)) => items.iter().filter_map(scalar_text).collect(),
        Some(other) => scalar_text(other).into_iter().collect(),
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Cast to `f64`. Numbers and numeric strings succeed; absent and `null`
/// become `None`; anything else is an error.
pub fn optional_f64(field: &str, value: Option<&Value>) -> Result<Option<f64>, CoercionError> {
    let not_a_number = |v: &Value| CoercionError::NotANumber {
        field: field.to_string(),
        value: v.to_string(),
    };
    let Some(v) = value else {
        return Ok(None);
    };
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => n.as_f64().map(Some).ok_or_else(|| not_a_number(v)),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(f) if f.is_finite() => Ok(Some(f)),
            _ => Err(not_a_number(v)),
        },
        _ => Err(not_a_number(v)),
    }
}

/// Cast to `i64`. Integers, finite floats (truncated), and integer strings
/// succeed; absent and `null` become `None`.
pub fn optional_i64(field: &str, value: Option<&Value>) -> Result<Option<i64>, CoercionError> {
    let not_an_integer = |v: &Value| CoercionError::NotAnInteger {
        field: field.to_string(),
        value: v.to_string(),
    };
    let Some(v) = value else {
        return Ok(None);
    };
    match v {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Some(i));
            }
            if n.is_u64() {
                return Err(not_an_integer(v));
            }
            match n.as_f64() {
                Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => {
                    Ok(Some(f.trunc() as i64))
                }
                _ => Err(not_an_integer(v)),
            }
        }
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| not_an_integer(v)),
        _ => Err(not_an_integer(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_list_wraps_scalars() {
        assert_eq!(string_list(Some(&json!("checkout"))), vec!["checkout"]);
        assert_eq!(string_list(Some(&json!(3))), vec!["3"]);
    }

    #[test]
    fn string_list_treats_falsy_as_empty() {
        assert!(string_list(None).is_empty());
        assert!(string_list(Some(&Value::Null)).is_empty());
        assert!(string_list(Some(&json!(""))).is_empty());
        assert!(string_list(Some(&json!(false))).is_empty());
        assert!(string_list(Some(&json!({}))).is_empty());
    }

    #[test]
    fn string_list_keeps_order_and_drops_nulls() {
        let v = json!(["crash", null, "checkout", 2]);
        assert_eq!(string_list(Some(&v)), vec!["crash", "checkout", "2"]);
    }

    #[test]
    fn f64_accepts_numbers_and_numeric_strings() {
        assert_eq!(optional_f64("score", Some(&json!(-0.6))).unwrap(), Some(-0.6));
        assert_eq!(optional_f64("score", Some(&json!(1))).unwrap(), Some(1.0));
        assert_eq!(optional_f64("score", Some(&json!(" 0.25 "))).unwrap(), Some(0.25));
        assert_eq!(optional_f64("score", None).unwrap(), None);
        assert_eq!(optional_f64("score", Some(&Value::Null)).unwrap(), None);
    }

    #[test]
    fn f64_rejects_non_numeric() {
        let err = optional_f64("analysis.score", Some(&json!("not-a-number"))).unwrap_err();
        assert_eq!(err.field(), "analysis.score");
        assert_eq!(
            err.to_string(),
            "analysis.score: \"not-a-number\" is not a number"
        );
        assert!(optional_f64("score", Some(&json!(true))).is_err());
        assert!(optional_f64("score", Some(&json!([0.5]))).is_err());
        assert!(optional_f64("score", Some(&json!("NaN"))).is_err());
    }

    #[test]
    fn i64_truncates_floats_and_parses_strings() {
        assert_eq!(optional_i64("ms", Some(&json!(850))).unwrap(), Some(850));
        assert_eq!(optional_i64("ms", Some(&json!(3.9))).unwrap(), Some(3));
        assert_eq!(optional_i64("ms", Some(&json!("12"))).unwrap(), Some(12));
        assert!(optional_i64("ms", Some(&json!("1.5"))).is_err());
        assert!(optional_i64("ms", Some(&json!(u64::MAX))).is_err());
    }
}
