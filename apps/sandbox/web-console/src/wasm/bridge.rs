//! Conversion from live page values to the console's [`Value`] model.
//!
//! Objects are tracked by identity while converting. The first visit of an
//! object produces an owning [`ObjectRef`]; later visits, cyclic or not,
//! produce an alias of it, which the formatter renders as a circular marker.

use super::*;

use sandbox_console_core::{ElementValue, ErrorValue, FunctionValue, ObjectRef, Value};

pub(crate) fn to_value(value: &JsValue) -> Value {
    Converter::default().convert(value, 0)
}

#[derive(Default)]
struct Converter {
    /// Object identity to index in `visited`.
    identities: Option<js_sys::Map>,
    visited: Vec<(ObjectRef, bool)>,
}

impl Converter {
    fn convert(&mut self, value: &JsValue, depth: usize) -> Value {
        if value.is_undefined() {
            return Value::Undefined;
        }
        if value.is_null() {
            return Value::Null;
        }
        if let Some(flag) = value.as_bool() {
            return Value::Bool(flag);
        }
        if let Some(number) = value.as_f64() {
            return Value::Number(number);
        }
        if let Some(text) = value.as_string() {
            return Value::String(text);
        }
        if value.is_bigint() {
            let digits = value
                .unchecked_ref::<js_sys::BigInt>()
                .to_string(10)
                .map(String::from)
                .unwrap_or_default();
            return Value::BigInt(digits);
        }
        if value.is_symbol() {
            return Value::Symbol(value.unchecked_ref::<js_sys::Symbol>().to_string().into());
        }
        if let Some(function) = value.dyn_ref::<js_sys::Function>() {
            let name = String::from(function.name());
            return Value::Function(FunctionValue {
                name: (!name.is_empty()).then_some(name),
                source: Some(String::from(function.to_string())),
            });
        }
        if let Some(error) = error_value(value) {
            return Value::Error(error);
        }
        if let Some(element) = value.dyn_ref::<web_sys::Element>() {
            let mut descriptor = ElementValue::new(element.tag_name()).with_id(element.id());
            descriptor.class_name = string_property(element, "className");
            return Value::Element(descriptor);
        }
        if let Some(existing) = self.visited_alias(value) {
            return existing;
        }
        if depth >= MAX_BRIDGE_DEPTH {
            return Value::Opaque("[Object]".to_string());
        }
        if let Some(replacement) = to_json_replacement(value) {
            return self.convert(&replacement, depth + 1);
        }

        if js_sys::Array::is_array(value) {
            let array = value.unchecked_ref::<js_sys::Array>();
            let object = self.enter(value, true);
            for item in array.iter() {
                object.push(self.convert(&item, depth + 1));
            }
            return Value::Array(object);
        }

        let object = self.enter(value, false);
        let keys = js_sys::Object::keys(value.unchecked_ref::<js_sys::Object>());
        for key in keys.iter() {
            let Some(name) = key.as_string() else {
                continue;
            };
            match js_sys::Reflect::get(value, &key) {
                Ok(member) => object.insert(name, self.convert(&member, depth + 1)),
                Err(_) => tracing::debug!(key = %name, "skipping member whose getter threw"),
            }
        }
        Value::Object(object)
    }

    fn identities(&mut self) -> &js_sys::Map {
        self.identities.get_or_insert_with(js_sys::Map::new)
    }

    fn visited_alias(&mut self, value: &JsValue) -> Option<Value> {
        let index = self.identities().get(value).as_f64()?;
        let (object, is_array) = self.visited.get(index as usize)?;
        let alias = object.downgrade();
        Some(if *is_array {
            Value::Array(alias)
        } else {
            Value::Object(alias)
        })
    }

    fn enter(&mut self, value: &JsValue, is_array: bool) -> ObjectRef {
        let object = ObjectRef::new();
        let index = self.visited.len();
        self.visited.push((object.clone(), is_array));
        self.identities().set(value, &JsValue::from_f64(index as f64));
        object
    }
}

fn error_value(value: &JsValue) -> Option<ErrorValue> {
    let stack = js_sys::Reflect::get(value, &JsValue::from_str("stack"))
        .ok()
        .and_then(|stack| stack.as_string());
    let error = value.dyn_ref::<js_sys::Error>();
    if error.is_none() && stack.is_none() {
        return None;
    }

    let (name, message) = match error {
        Some(error) => (String::from(error.name()), String::from(error.message())),
        None => (
            string_property(value, "name").unwrap_or_else(|| "Error".to_string()),
            string_property(value, "message").unwrap_or_default(),
        ),
    };
    let mut error = ErrorValue::new(name, message);
    error.stack = stack;
    Some(error)
}

/// Value a `toJSON` method substitutes for the object, if it has one.
fn to_json_replacement(value: &JsValue) -> Option<JsValue> {
    let method = js_sys::Reflect::get(value, &JsValue::from_str("toJSON"))
        .ok()?
        .dyn_into::<js_sys::Function>()
        .ok()?;
    method.call0(value).ok()
}

fn string_property(value: &JsValue, name: &str) -> Option<String> {
    js_sys::Reflect::get(value, &JsValue::from_str(name))
        .ok()
        .and_then(|property| property.as_string())
}
