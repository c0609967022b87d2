//! Typed codecs: a schema plus the serde type it decodes into.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Context, Schema, SchemaRef, ValidationError, unknown};

/// A [`Schema`] bound to the Rust type `T` it produces.
///
/// `decode` validates untyped input against the schema, then deserializes the
/// result. `encode` serializes a `T`, then checks it against the same schema,
/// so a declared codec enforces the contract in both directions.
pub struct Codec<T> {
    schema: SchemaRef,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Codec<T> {
    fn clone(&self) -> Self {
        Self { schema: Arc::clone(&self.schema), _marker: PhantomData }
    }
}

impl<T> fmt::Debug for Codec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Codec").field(&self.schema.name()).finish()
    }
}

impl<T> Codec<T> {
    pub fn new(schema: impl Schema + 'static) -> Self {
        Self { schema: Arc::new(schema), _marker: PhantomData }
    }

    pub fn from_ref(schema: SchemaRef) -> Self {
        Self { schema, _marker: PhantomData }
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }
}

impl Codec<Value> {
    /// Accepts any input and hands it over untouched.
    pub fn unknown() -> Self {
        Self::new(unknown())
    }
}

impl<T: DeserializeOwned> Codec<T> {
    pub fn decode(&self, input: Option<&Value>) -> Result<T, Vec<ValidationError>> {
        let context = Context::root(self.schema.name());
        let decoded = self.schema.decode(input, &context)?.unwrap_or(Value::Null);
        // A schema that accepts what `T` cannot represent is reported at the root.
        serde_json::from_value(decoded.clone())
            .map_err(|_| vec![ValidationError::new(Some(&decoded), &context)])
    }
}

impl<T: Serialize> Codec<T> {
    pub fn encode(&self, value: &T) -> Result<Value, Vec<ValidationError>> {
        let context = Context::root(self.schema.name());
        let raw = serde_json::to_value(value)
            .map_err(|_| vec![ValidationError::new(None, &context)])?;
        encode_value(self.schema.as_ref(), &raw)
    }
}

/// Encodes an already-serialized value against an erased schema.
pub(crate) fn encode_value(schema: &dyn Schema, value: &Value) -> Result<Value, Vec<ValidationError>> {
    let context = Context::root(schema.name());
    Ok(schema.encode(Some(value), &context)?.unwrap_or(Value::Null))
}
