//! Runtime schemas: self-describing decoders for untyped JSON input.
//!
//! A [`Schema`] checks an untyped [`Value`] and either returns the (possibly
//! coerced) value or every violation it found, each tagged with the
//! [`Context`] that leads from the root schema to the offending value.
//! [`Codec`] pairs a schema with a serde type so handlers see real Rust types.
//!
//! ```rust
//! use heureux::schema::{self, Codec, SchemaExt};
//! use serde::Deserialize;
//! use serde::Serialize;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Widget { name: String, tags: Vec<String> }
//!
//! let codec: Codec<Widget> = Codec::new(
//!     schema::object()
//!         .field("name", schema::string())
//!         .field("tags", schema::array(schema::string()))
//!         .named("Widget"),
//! );
//!
//! let widget = codec.decode(Some(&serde_json::json!({ "name": "bolt", "tags": [] }))).unwrap();
//! assert_eq!(widget.name, "bolt");
//! ```
//!
//! Absent input (`None`) and JSON `null` are different things: `undefined()`
//! and `optional(..)` accept the former, `null()` the latter.

mod codec;
mod composite;
mod primitives;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

pub use codec::Codec;
pub(crate) use codec::encode_value;
pub use composite::{
    Array, Named, Object, Optional, Partial, Record, Refinement, Union, array, object, optional,
    partial, record, refine, union,
};
pub use primitives::{
    BooleanFromString, Boolean, Integer, IntegerFromString, Literal, Null, Number,
    NumberFromString, Str, Undefined, Unknown, boolean, boolean_from_string, integer,
    integer_from_string, literal, null, number, number_from_string, string, undefined, unknown,
};

/// Outcome of a decode or encode step. `Ok(None)` means the value is absent.
pub type Validation = Result<Option<Value>, Vec<ValidationError>>;

/// A shareable, type-erased schema.
pub type SchemaRef = Arc<dyn Schema>;

/// A decoder between untyped input and a validated value.
pub trait Schema: Send + Sync {
    /// Human-readable type name used in error paths (e.g. `Array<string>`).
    fn name(&self) -> &str;

    /// Checks wire-side input, returning the typed-side value.
    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation;

    /// Checks a typed-side value, returning its wire form.
    ///
    /// Only coercing schemas need to override this.
    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        self.decode(value, context)
    }
}

impl<S: Schema + ?Sized> Schema for Arc<S> {
    fn name(&self) -> &str { (**self).name() }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        (**self).decode(input, context)
    }

    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        (**self).encode(value, context)
    }
}

/// Combinator helpers available on every sized schema.
pub trait SchemaExt: Schema + Sized + 'static {
    /// Replaces the schema's name in error paths.
    fn named(self, name: impl Into<String>) -> Named {
        Named::new(name, self)
    }

    /// Accepts absence in addition to whatever `self` accepts.
    fn optional(self) -> Optional {
        optional(self)
    }

    fn boxed(self) -> SchemaRef {
        Arc::new(self)
    }
}

impl<S: Schema + Sized + 'static> SchemaExt for S {}

/// One step of the traversal from the root schema to a nested value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContextEntry {
    pub key: String,
    pub type_name: String,
}

/// The ordered traversal path of a decode call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Context(Vec<ContextEntry>);

impl Context {
    /// Starts a traversal at a root schema.
    pub fn root(type_name: &str) -> Self {
        Self(vec![ContextEntry { key: String::new(), type_name: type_name.to_owned() }])
    }

    /// Returns a new context one level deeper.
    pub fn child(&self, key: impl Into<String>, type_name: &str) -> Self {
        let mut entries = self.0.clone();
        entries.push(ContextEntry { key: key.into(), type_name: type_name.to_owned() });
        Self(entries)
    }

    pub fn entries(&self) -> &[ContextEntry] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

/// A single decode failure.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError {
    /// The offending raw value; `None` when the value was absent.
    pub value: Option<Value>,
    pub context: Context,
}

impl ValidationError {
    pub fn new(value: Option<&Value>, context: &Context) -> Self {
        Self { value: value.cloned(), context: context.clone() }
    }

    /// Convenience for the common single-failure case.
    pub fn failure(value: Option<&Value>, context: &Context) -> Validation {
        Err(vec![Self::new(value, context)])
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::validation::format_error(self))
    }
}
