//! Schemas built from other schemas.
//!
//! Every composite collects the failures of all of its children before
//! reporting, so one decode call surfaces every violation in the input.

use std::sync::Arc;

use serde_json::{Map, Value};

use super::{Context, Schema, SchemaRef, Validation, ValidationError};

#[derive(Clone, Copy)]
enum Direction {
    Decode,
    Encode,
}

fn step(schema: &dyn Schema, dir: Direction, input: Option<&Value>, context: &Context) -> Validation {
    match dir {
        Direction::Decode => schema.decode(input, context),
        Direction::Encode => schema.encode(input, context),
    }
}

macro_rules! both_directions {
    () => {
        fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
            self.run(Direction::Decode, input, context)
        }

        fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
            self.run(Direction::Encode, value, context)
        }
    };
}

// ── Array ─────────────────────────────────────────────────────────────────────

/// A JSON array whose every element matches `item`.
#[derive(Clone)]
pub struct Array {
    item: SchemaRef,
    name: String,
}

pub fn array(item: impl Schema + 'static) -> Array {
    let name = format!("Array<{}>", item.name());
    Array { item: Arc::new(item), name }
}

impl Array {
    fn run(&self, dir: Direction, input: Option<&Value>, context: &Context) -> Validation {
        let Some(Value::Array(items)) = input else {
            return ValidationError::failure(input, context);
        };

        let mut out = Vec::with_capacity(items.len());
        let mut errors = Vec::new();
        for (i, item) in items.iter().enumerate() {
            let child = context.child(i.to_string(), self.item.name());
            match step(self.item.as_ref(), dir, Some(item), &child) {
                Ok(v) => out.push(v.unwrap_or(Value::Null)),
                Err(e) => errors.extend(e),
            }
        }

        if errors.is_empty() { Ok(Some(Value::Array(out))) } else { Err(errors) }
    }
}

impl Schema for Array {
    fn name(&self) -> &str { &self.name }
    both_directions!();
}

// ── Object / Partial ──────────────────────────────────────────────────────────

/// A JSON object with declared fields. Undeclared keys are kept as-is.
///
/// Every declared field is required unless its schema accepts absence
/// (see [`optional`]).
#[derive(Clone)]
pub struct Object {
    fields: Vec<(String, SchemaRef)>,
    name: String,
}

pub fn object() -> Object {
    Object { fields: Vec::new(), name: "{}".to_owned() }
}

impl Object {
    pub fn field(mut self, key: impl Into<String>, schema: impl Schema + 'static) -> Self {
        self.fields.push((key.into(), Arc::new(schema)));
        self.name = describe_fields(&self.fields);
        self
    }

    fn run(&self, dir: Direction, input: Option<&Value>, context: &Context) -> Validation {
        run_fields(&self.fields, false, dir, input, context)
    }
}

impl Schema for Object {
    fn name(&self) -> &str { &self.name }
    both_directions!();
}

/// A JSON object whose declared fields may each be absent.
#[derive(Clone)]
pub struct Partial {
    fields: Vec<(String, SchemaRef)>,
    name: String,
}

pub fn partial() -> Partial {
    Partial { fields: Vec::new(), name: "Partial<{}>".to_owned() }
}

impl Partial {
    pub fn field(mut self, key: impl Into<String>, schema: impl Schema + 'static) -> Self {
        self.fields.push((key.into(), Arc::new(schema)));
        self.name = format!("Partial<{}>", describe_fields(&self.fields));
        self
    }

    fn run(&self, dir: Direction, input: Option<&Value>, context: &Context) -> Validation {
        run_fields(&self.fields, true, dir, input, context)
    }
}

impl Schema for Partial {
    fn name(&self) -> &str { &self.name }
    both_directions!();
}

fn describe_fields(fields: &[(String, SchemaRef)]) -> String {
    if fields.is_empty() {
        return "{}".to_owned();
    }
    let parts: Vec<String> = fields.iter().map(|(k, s)| format!("{k}: {}", s.name())).collect();
    format!("{{ {} }}", parts.join(", "))
}

fn run_fields(
    fields: &[(String, SchemaRef)],
    skip_absent: bool,
    dir: Direction,
    input: Option<&Value>,
    context: &Context,
) -> Validation {
    let empty = Map::new();
    let map = match input {
        Some(Value::Object(map)) => map,
        // Absence reads as `{}`; it only passes if no declared field is required.
        None => &empty,
        Some(_) => return ValidationError::failure(input, context),
    };

    let mut out = map.clone();
    let mut errors = Vec::new();
    for (key, schema) in fields {
        let value = map.get(key);
        if skip_absent && value.is_none() {
            continue;
        }
        let child = context.child(key.as_str(), schema.name());
        match step(schema.as_ref(), dir, value, &child) {
            Ok(Some(v)) => {
                out.insert(key.clone(), v);
            }
            Ok(None) => {
                out.remove(key);
            }
            Err(e) => errors.extend(e),
        }
    }

    match (errors.is_empty(), input) {
        (true, _) => Ok(Some(Value::Object(out))),
        (false, None) => ValidationError::failure(input, context),
        (false, Some(_)) => Err(errors),
    }
}

// ── Record ────────────────────────────────────────────────────────────────────

/// A JSON object used as a string-keyed map; every value matches `value`.
#[derive(Clone)]
pub struct Record {
    value: SchemaRef,
    name: String,
}

pub fn record(value: impl Schema + 'static) -> Record {
    let name = format!("{{ [K in string]: {} }}", value.name());
    Record { value: Arc::new(value), name }
}

impl Record {
    fn run(&self, dir: Direction, input: Option<&Value>, context: &Context) -> Validation {
        let Some(Value::Object(map)) = input else {
            return ValidationError::failure(input, context);
        };

        let mut out = Map::new();
        let mut errors = Vec::new();
        for (key, value) in map {
            let child = context.child(key.as_str(), self.value.name());
            match step(self.value.as_ref(), dir, Some(value), &child) {
                Ok(Some(v)) => {
                    out.insert(key.clone(), v);
                }
                Ok(None) => {}
                Err(e) => errors.extend(e),
            }
        }

        if errors.is_empty() { Ok(Some(Value::Object(out))) } else { Err(errors) }
    }
}

impl Schema for Record {
    fn name(&self) -> &str { &self.name }
    both_directions!();
}

// ── Union ─────────────────────────────────────────────────────────────────────

/// Matches the first member that accepts the input.
///
/// When no member matches, the failures of every member are reported, each
/// under the member's index.
#[derive(Clone)]
pub struct Union {
    members: Vec<SchemaRef>,
    name: String,
}

pub fn union(members: impl IntoIterator<Item = SchemaRef>) -> Union {
    let members: Vec<SchemaRef> = members.into_iter().collect();
    let names: Vec<&str> = members.iter().map(|m| m.name()).collect();
    let name = format!("({})", names.join(" | "));
    Union { members, name }
}

impl Union {
    fn run(&self, dir: Direction, input: Option<&Value>, context: &Context) -> Validation {
        let mut errors = Vec::new();
        for (i, member) in self.members.iter().enumerate() {
            let child = context.child(i.to_string(), member.name());
            match step(member.as_ref(), dir, input, &child) {
                Ok(v) => return Ok(v),
                Err(e) => errors.extend(e),
            }
        }
        if errors.is_empty() {
            // An empty union accepts nothing.
            return ValidationError::failure(input, context);
        }
        Err(errors)
    }
}

impl Schema for Union {
    fn name(&self) -> &str { &self.name }
    both_directions!();
}

// ── Optional ──────────────────────────────────────────────────────────────────

/// `inner`, or absent.
///
/// Unlike a union with `undefined`, a failure of `inner` is reported at the
/// current path without an extra member-index segment. On the encode path
/// `null` counts as absent.
#[derive(Clone)]
pub struct Optional {
    inner: SchemaRef,
    name: String,
}

pub fn optional(inner: impl Schema + 'static) -> Optional {
    let name = format!("({} | undefined)", inner.name());
    Optional { inner: Arc::new(inner), name }
}

impl Schema for Optional {
    fn name(&self) -> &str { &self.name }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        match input {
            None => Ok(None),
            Some(_) => self.inner.decode(input, context),
        }
    }

    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        match value {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.inner.encode(value, context),
        }
    }
}

// ── Named ─────────────────────────────────────────────────────────────────────

/// Any schema under a different name.
#[derive(Clone)]
pub struct Named {
    inner: SchemaRef,
    name: String,
}

impl Named {
    pub fn new(name: impl Into<String>, inner: impl Schema + 'static) -> Self {
        Self { inner: Arc::new(inner), name: name.into() }
    }
}

impl Schema for Named {
    fn name(&self) -> &str { &self.name }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        self.inner.decode(input, context)
    }

    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        self.inner.encode(value, context)
    }
}

// ── Refinement ────────────────────────────────────────────────────────────────

type Predicate = dyn Fn(&Value) -> bool + Send + Sync;

/// `inner` plus a predicate on the decoded value.
#[derive(Clone)]
pub struct Refinement {
    inner: SchemaRef,
    predicate: Arc<Predicate>,
    name: String,
}

pub fn refine(
    inner: impl Schema + 'static,
    predicate: impl Fn(&Value) -> bool + Send + Sync + 'static,
    name: impl Into<String>,
) -> Refinement {
    Refinement { inner: Arc::new(inner), predicate: Arc::new(predicate), name: name.into() }
}

impl Refinement {
    fn check(&self, result: Validation, input: Option<&Value>, context: &Context) -> Validation {
        match result? {
            Some(v) if !(self.predicate)(&v) => ValidationError::failure(input, context),
            other => Ok(other),
        }
    }
}

impl Schema for Refinement {
    fn name(&self) -> &str { &self.name }

    fn decode(&self, input: Option<&Value>, context: &Context) -> Validation {
        let decoded = self.inner.decode(input, context);
        self.check(decoded, input, context)
    }

    fn encode(&self, value: Option<&Value>, context: &Context) -> Validation {
        // The predicate runs on the typed side, before encoding.
        let checked = self.check(Ok(value.cloned()), value, context)?;
        self.inner.encode(checked.as_ref(), context)
    }
}
