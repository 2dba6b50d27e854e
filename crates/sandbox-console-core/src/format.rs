//! Value Formatter: runtime value to safe, highlighted markup.
//!
//! Formatting is total. [`format_value`] classifies the value once and then
//! renders each [`Kind`]; any failure along the way collapses into the fixed
//! [`FORMATTING_ERROR_MARKUP`] marker instead of propagating.

use std::collections::HashSet;

use serde_json::{Map, Number};

use crate::markup::{
    TokenClass, escape_html, highlight_structured, number_text, pre_block, span, span_raw,
};
use crate::value::{ElementValue, ErrorValue, ObjectAccessError, ObjectRef, Value};

pub const FORMATTING_ERROR_MARKUP: &str = r#"<span class="tok-error">[formatting error]</span>"#;
pub const CIRCULAR_MARKER: &str = "[Circular]";

/// Separator placed between the formatted arguments of one diagnostic call.
pub const ARGUMENT_SEPARATOR: &str = r#" <span class="tok-dim"> </span>"#;

const MAX_STRUCTURE_DEPTH: usize = 512;
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("object access failed: {0}")]
    Access(#[from] ObjectAccessError),
    #[error("structure nested deeper than {MAX_STRUCTURE_DEPTH} levels")]
    TooDeep,
    #[error("structured serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Shape of a value, decided once before rendering.
#[derive(Debug)]
pub enum Kind<'a> {
    Undefined,
    Null,
    Text(&'a str),
    Number(f64),
    BigInt(&'a str),
    Boolean(bool),
    Error(&'a ErrorValue),
    Element(&'a ElementValue),
    Structured(&'a ObjectRef),
    Other(String),
}

pub fn classify(value: &Value) -> Kind<'_> {
    match value {
        Value::Undefined => Kind::Undefined,
        Value::Null => Kind::Null,
        Value::String(text) => Kind::Text(text),
        Value::Number(number) => Kind::Number(*number),
        Value::BigInt(digits) => Kind::BigInt(digits),
        Value::Bool(flag) => Kind::Boolean(*flag),
        Value::Error(error) => Kind::Error(error),
        Value::Element(element) => Kind::Element(element),
        Value::Array(object) | Value::Object(object) => Kind::Structured(object),
        Value::Symbol(description) => Kind::Other(description.clone()),
        Value::Function(function) => Kind::Other(function.coerce_to_string()),
        Value::Opaque(text) => Kind::Other(text.clone()),
    }
}

pub fn format_value(value: &Value) -> String {
    match try_format_value(value) {
        Ok(markup) => markup,
        Err(error) => {
            tracing::debug!(%error, kind = value.type_name(), "value formatting failed");
            FORMATTING_ERROR_MARKUP.to_string()
        }
    }
}

/// Formats each argument of a diagnostic call and joins them.
pub fn format_arguments(args: &[Value]) -> String {
    args.iter()
        .map(format_value)
        .collect::<Vec<_>>()
        .join(ARGUMENT_SEPARATOR)
}

fn try_format_value(value: &Value) -> Result<String, FormatError> {
    let markup = match classify(value) {
        Kind::Undefined => span(TokenClass::Undefined, "undefined"),
        Kind::Null => span(TokenClass::Null, "null"),
        Kind::Text(text) => escape_html(text),
        Kind::Number(number) => span(TokenClass::Number, &number_text(number)),
        Kind::BigInt(digits) => span_raw(TokenClass::Number, &format!("{}n", escape_html(digits))),
        Kind::Boolean(flag) => span(TokenClass::Boolean, if flag { "true" } else { "false" }),
        Kind::Error(error) => span(TokenClass::Error, &error.trace_text()),
        Kind::Element(element) => span(TokenClass::String, &element.descriptor()),
        Kind::Structured(_) => {
            let text = structured_text(value)?;
            pre_block(&highlight_structured(&text))
        }
        Kind::Other(text) => escape_html(&text),
    };
    Ok(markup)
}

/// Serializes a value to two-space indented structured text.
///
/// Every container is recorded by identity the first time it is entered; any
/// later reference to it, cyclic or not, becomes `"[Circular]"`.
pub fn structured_text(value: &Value) -> Result<String, FormatError> {
    let mut seen = HashSet::new();
    let json = to_structured(value, &mut seen, 0)?.unwrap_or(serde_json::Value::Null);
    Ok(serde_json::to_string_pretty(&json)?)
}

fn to_structured(
    value: &Value,
    seen: &mut HashSet<usize>,
    depth: usize,
) -> Result<Option<serde_json::Value>, FormatError> {
    if depth > MAX_STRUCTURE_DEPTH {
        return Err(FormatError::TooDeep);
    }

    let json = match value {
        Value::Undefined => return Ok(None),
        Value::Null => serde_json::Value::Null,
        Value::Bool(flag) => serde_json::Value::Bool(*flag),
        Value::Number(number) => number_json(*number),
        Value::BigInt(digits) => serde_json::Value::String(format!("{digits}n")),
        Value::String(text) => serde_json::Value::String(text.clone()),
        Value::Symbol(description) => serde_json::Value::String(description.clone()),
        Value::Function(function) => {
            serde_json::Value::String(format!("[Function {}]", function.display_name()))
        }
        // Neither carries own enumerable members.
        Value::Error(_) | Value::Element(_) => serde_json::Value::Object(Map::new()),
        Value::Opaque(text) => serde_json::Value::String(text.clone()),
        Value::Array(object) => {
            if !enter(object, seen) {
                return Ok(Some(circular()));
            }
            let mut items = Vec::new();
            for (_, item) in object.entries()? {
                items.push(to_structured(&item, seen, depth + 1)?.unwrap_or(serde_json::Value::Null));
            }
            serde_json::Value::Array(items)
        }
        Value::Object(object) => {
            if !enter(object, seen) {
                return Ok(Some(circular()));
            }
            let mut map = Map::new();
            for (key, member) in object.entries()? {
                if let Some(json) = to_structured(&member, seen, depth + 1)? {
                    map.insert(key, json);
                }
            }
            serde_json::Value::Object(map)
        }
    };
    Ok(Some(json))
}

fn enter(object: &ObjectRef, seen: &mut HashSet<usize>) -> bool {
    object.is_live() && seen.insert(object.id())
}

fn circular() -> serde_json::Value {
    serde_json::Value::String(CIRCULAR_MARKER.to_string())
}

fn number_json(number: f64) -> serde_json::Value {
    if !number.is_finite() {
        return serde_json::Value::Null;
    }
    if number.fract() == 0.0 && number.abs() <= MAX_SAFE_INTEGER {
        return serde_json::Value::Number(Number::from(number as i64));
    }
    Number::from_f64(number).map_or(serde_json::Value::Null, serde_json::Value::Number)
}
