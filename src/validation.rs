//! Request input validation and its error report.
//!
//! Each violation becomes one line of the form
//!
//! ```text
//! '<offending value as JSON>' supplied to '<path>'
//! ```
//!
//! The path starts with the root type name and lists `key: type` for every
//! named step. Array positions are dropped from the middle of the path since
//! they add noise without helping to locate the field; the final step always
//! keeps its key, numeric or not:
//!
//! ```text
//! '5' supplied to 'Order/items: Array<Item>/sku: string'
//! 'undefined' supplied to 'Widget/name: string'
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::http_error::HttpError;
use crate::schema::{Codec, Context, ValidationError};

/// Which part of the request is being validated.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Source {
    Params,
    Payload,
    Query,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Params  => "params",
            Self::Payload => "payload",
            Self::Query   => "query",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decodes `input` with `codec`, or fails with a `400` listing every violation.
pub fn validate<T: DeserializeOwned>(
    input: Option<&Value>,
    codec: &Codec<T>,
    source: Source,
) -> Result<T, HttpError> {
    codec.decode(input).map_err(|errors| {
        HttpError::bad_request(format!("Invalid request {source} input"))
            .with_data(json!({ "errors": failure(&errors) }))
    })
}

/// Formats every validation error, preserving discovery order.
pub fn failure(errors: &[ValidationError]) -> Vec<String> {
    errors.iter().map(format_error).collect()
}

pub(crate) fn format_error(error: &ValidationError) -> String {
    format!(
        "'{}' supplied to '{}'",
        stringify(error.value.as_ref()),
        context_path(&error.context)
    )
}

/// Renders an offending value. Absence reads as `undefined`.
pub fn stringify(value: Option<&Value>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "undefined".to_owned(),
    }
}

/// Builds the `/`-joined path for a traversal context.
pub fn context_path(context: &Context) -> String {
    let entries = context.entries();
    let last = entries.len().saturating_sub(1);

    entries
        .iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            if i == 0 {
                Some(entry.type_name.clone())
            } else if i == last || !is_index(&entry.key) {
                Some(format!("{}: {}", entry.key, entry.type_name))
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_index(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}
