//! Leaf schemas.

use serde_json::{Number as JsonNumber, Value};

use super::{Context, Schema, Validation, ValidationError};

macro_rules! leaf {
    ($(#[$meta:meta])* $ty:ident, $ctor:ident, $name:literal, |$v:ident| $accepts:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Default)]
        pub struct $ty;

        $(#[$meta])*
        pub fn $ctor() -> $ty { $ty }

        impl Schema for $ty {
            fn name(&self) -> &str { $name }

            fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
                match input {
                    Some($v) if $accepts => Ok(Some($v.clone())),
                    other => ValidationError::failure(other, context),
                }
            }
        }
    };
}

leaf!(
    /// Any JSON string.
    Str, string, "string", |v| v.is_string()
);
leaf!(
    /// Any JSON number.
    Number, number, "number", |v| v.is_number()
);
leaf!(
    /// A JSON number without a fractional part.
    Integer, integer, "Integer", |v| is_integral(v)
);
leaf!(Boolean, boolean, "boolean", |v| v.is_boolean());
leaf!(
    /// JSON `null`. Absence is not null.
    Null, null, "null", |v| v.is_null()
);

fn is_integral(v: &Value) -> bool {
    match v {
        Value::Number(n) => n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    }
}

/// Accepts only absent input.
///
/// On the encode path `null` also counts as absent, since `()` and `None`
/// serialize to `null`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Undefined;

pub fn undefined() -> Undefined { Undefined }

impl Schema for Undefined {
    fn name(&self) -> &str { "undefined" }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        match input {
            None => Ok(None),
            other => ValidationError::failure(other, context),
        }
    }

    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        match value {
            None | Some(Value::Null) => Ok(None),
            other => ValidationError::failure(other, context),
        }
    }
}

/// Accepts anything, including absence.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unknown;

pub fn unknown() -> Unknown { Unknown }

impl Schema for Unknown {
    fn name(&self) -> &str { "unknown" }

    fn decode(&self, input: Option<&Value>, _context: &Context) -> Validation {
        Ok(input.cloned())
    }
}

/// Accepts exactly one JSON value.
#[derive(Clone, Debug)]
pub struct Literal {
    value: Value,
    name: String,
}

pub fn literal(value: impl Into<Value>) -> Literal {
    let value = value.into();
    let name = value.to_string();
    Literal { value, name }
}

impl Schema for Literal {
    fn name(&self) -> &str { &self.name }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        match input {
            Some(v) if *v == self.value => Ok(Some(v.clone())),
            other => ValidationError::failure(other, context),
        }
    }
}

// ── Coercing schemas ──────────────────────────────────────────────────────────
//
// Path segments and query strings only ever carry strings. These decode the
// string form into a typed JSON value and encode it back, so a route such as
// `/widgets/{id}` can declare `id` as a number.

/// A string holding a finite number, decoded to a JSON number.
#[derive(Clone, Copy, Debug, Default)]
pub struct NumberFromString;

pub fn number_from_string() -> NumberFromString { NumberFromString }

impl Schema for NumberFromString {
    fn name(&self) -> &str { "NumberFromString" }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        let parsed = input
            .and_then(Value::as_str)
            .and_then(|s| s.trim().parse::<f64>().ok())
            .and_then(JsonNumber::from_f64)
            .map(|n| match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Value::from(f as i64),
                _ => Value::Number(n),
            });
        match parsed {
            Some(v) => Ok(Some(v)),
            None => ValidationError::failure(input, context),
        }
    }

    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        match value {
            Some(Value::Number(n)) => Ok(Some(Value::String(n.to_string()))),
            other => ValidationError::failure(other, context),
        }
    }
}

/// A string holding an integer, decoded to a JSON integer.
#[derive(Clone, Copy, Debug, Default)]
pub struct IntegerFromString;

pub fn integer_from_string() -> IntegerFromString { IntegerFromString }

impl Schema for IntegerFromString {
    fn name(&self) -> &str { "IntegerFromString" }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        match input.and_then(Value::as_str).and_then(|s| s.trim().parse::<i64>().ok()) {
            Some(n) => Ok(Some(Value::from(n))),
            None => ValidationError::failure(input, context),
        }
    }

    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        match value {
            Some(v @ Value::Number(n)) if is_integral(v) => Ok(Some(Value::String(n.to_string()))),
            other => ValidationError::failure(other, context),
        }
    }
}

/// `"true"` or `"false"`, decoded to a JSON boolean.
#[derive(Clone, Copy, Debug, Default)]
pub struct BooleanFromString;

pub fn boolean_from_string() -> BooleanFromString { BooleanFromString }

impl Schema for BooleanFromString {
    fn name(&self) -> &str { "BooleanFromString" }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        match input.and_then(Value::as_str) {
            Some("true") => Ok(Some(Value::Bool(true))),
            Some("false") => Ok(Some(Value::Bool(false))),
            _ => ValidationError::failure(input, context),
        }
    }

    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        match value {
            Some(Value::Bool(b)) => Ok(Some(Value::String(b.to_string()))),
            other => ValidationError::failure(other, context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(schema: &dyn Schema, input: Option<Value>) -> Validation {
        schema.decode(input.as_ref(), &Context::root(schema.name()))
    }

    #[test]
    fn leaves_accept_their_own_kind() {
        assert_eq!(run(&string(), Some(json!("a"))), Ok(Some(json!("a"))));
        assert_eq!(run(&number(), Some(json!(1.5))), Ok(Some(json!(1.5))));
        assert_eq!(run(&boolean(), Some(json!(false))), Ok(Some(json!(false))));
        assert_eq!(run(&null(), Some(Value::Null)), Ok(Some(Value::Null)));
        assert_eq!(run(&undefined(), None), Ok(None));
        assert_eq!(run(&unknown(), None), Ok(None));
    }

    #[test]
    fn leaves_reject_other_kinds_and_absence() {
        let err = run(&string(), Some(json!(42))).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(err[0].value, Some(json!(42)));

        let err = run(&string(), None).unwrap_err();
        assert_eq!(err[0].value, None);

        assert!(run(&null(), None).is_err());
        assert!(run(&undefined(), Some(Value::Null)).is_err());
    }

    #[test]
    fn integer_rejects_fractions() {
        assert!(run(&integer(), Some(json!(3))).is_ok());
        assert!(run(&integer(), Some(json!(3.0))).is_ok());
        assert!(run(&integer(), Some(json!(3.25))).is_err());
        assert_eq!(integer().name(), "Integer");
    }

    #[test]
    fn literal_is_named_after_its_json() {
        let active = literal("active");
        assert_eq!(active.name(), "\"active\"");
        assert!(run(&active, Some(json!("active"))).is_ok());
        assert!(run(&active, Some(json!("inactive"))).is_err());
    }

    #[test]
    fn coercing_schemas_parse_strings() {
        assert_eq!(run(&number_from_string(), Some(json!("2.5"))), Ok(Some(json!(2.5))));
        assert_eq!(run(&number_from_string(), Some(json!("7"))), Ok(Some(json!(7))));
        assert!(run(&number_from_string(), Some(json!("seven"))).is_err());
        assert!(run(&number_from_string(), Some(json!(7))).is_err());

        assert_eq!(run(&integer_from_string(), Some(json!("42"))), Ok(Some(json!(42))));
        assert!(run(&integer_from_string(), Some(json!("4.2"))).is_err());

        assert_eq!(run(&boolean_from_string(), Some(json!("true"))), Ok(Some(json!(true))));
        assert!(run(&boolean_from_string(), Some(json!("yes"))).is_err());
    }

    #[test]
    fn coercing_schemas_encode_back_to_strings() {
        let ctx = Context::root("IntegerFromString");
        assert_eq!(
            integer_from_string().encode(Some(&json!(42)), &ctx),
            Ok(Some(json!("42")))
        );
        assert!(integer_from_string().encode(Some(&json!("42")), &ctx).is_err());
        assert_eq!(
            boolean_from_string().encode(Some(&json!(false)), &ctx),
            Ok(Some(json!("false")))
        );
    }

    #[test]
    fn undefined_treats_null_as_absent_when_encoding() {
        let ctx = Context::root("undefined");
        assert_eq!(undefined().encode(Some(&Value::Null), &ctx), Ok(None));
        assert!(undefined().encode(Some(&json!(1)), &ctx).is_err());
    }
}
